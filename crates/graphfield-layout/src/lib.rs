//! Texture-encoded force simulation for large point graphs.
//!
//! Point state lives in square "textures" (flat arrays addressed by
//! `index mod S, index div S`). Each tick clears a shared velocity
//! accumulator, runs the enabled forces in a fixed order with an integration
//! after each one, then cools alpha. The same semantics run on the host
//! ([`CpuBackend`]) or on a GPU through wgpu compute passes ([`GpuBackend`]).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Simulation<B>                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────────┐   │
//! │  │  GraphData  │───▶│  Adjacency  │───▶│ SimulationBack- │   │
//! │  │  + config   │    │  clusters   │    │ end (cpu / gpu) │   │
//! │  └─────────────┘    └─────────────┘    └─────────────────┘   │
//! │                 SimulationScheduler (alpha, run state)       │
//! └──────────────────────────────────────────────────────────────┘
//!                               │ per tick
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │ clear velocity → gravity → center → many-body → link out →   │
//! │ link in → cluster → collision   (integrate after each force) │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │   Read back: positions, velocities, tracked points           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Many-body repulsion aggregates points into a pyramid of quadtree levels
//! and sums accepted cells over every level, so each level is an
//! independent pass on the GPU.
//!
//! ```no_run
//! use graphfield_layout::{GraphData, Simulation, SimulationConfig};
//!
//! let mut sim = Simulation::cpu(SimulationConfig::default());
//! sim.set_graph(GraphData::new(vec![0.0, 0.0, 10.0, 0.0], vec![0, 1]))?;
//! sim.start(1.0);
//! while sim.is_running() {
//!     sim.frame();
//! }
//! let positions = sim.positions()?;
//! # Ok::<(), graphfield_layout::LayoutError>(())
//! ```

pub mod backend;
pub mod config;
pub mod cpu;
mod error;
pub mod forces;
pub mod gpu;
pub mod gpu_backend;
pub mod graph;
pub mod quadtree;
pub mod scheduler;
pub mod shaders;
mod simulation;
pub mod store;
pub mod texture;

pub use backend::{PointUpload, SimulationBackend};
pub use config::SimulationConfig;
pub use cpu::CpuBackend;
pub use error::LayoutError;
pub use forces::{ForceKind, ForceUniforms};
pub use gpu_backend::GpuBackend;
pub use graph::GraphData;
pub use scheduler::{SchedulerState, SimulationEvent};
pub use simulation::Simulation;

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, LayoutError>;

/// Alpha below which a running simulation settles.
pub const ALPHA_MIN: f32 = 0.001;

/// A 2D position in simulation space.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    bytemuck::Pod,
    bytemuck::Zeroable,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(C)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Position) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// A 2D velocity.
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}
