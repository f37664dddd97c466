//! The simulation facade.
//!
//! [`Simulation`] owns a backend, the scheduler and the graph it was given. The
//! host calls [`Simulation::frame`] once per rendered frame; everything else is
//! control surface (start, stop, pause, step), input (pointer, zoom, drag) and
//! readback.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::backend::{PointUpload, SimulationBackend};
use crate::config::SimulationConfig;
use crate::cpu::CpuBackend;
use crate::forces::cluster::ClusterState;
use crate::forces::link::{LinkAdjacency, LinkDirection};
use crate::forces::{ForceKind, ForceUniforms};
use crate::gpu_backend::GpuBackend;
use crate::graph::GraphData;
use crate::scheduler::{FrameGate, SchedulerState, SimulationEvent, SimulationScheduler};
use crate::texture::TextureLayout;
use crate::{Position, Result, Velocity};

/// A force simulation running on backend `B`.
pub struct Simulation<B: SimulationBackend> {
    backend: B,
    config: SimulationConfig,
    scheduler: SimulationScheduler,
    graph: GraphData,
    space_size: f32,
    layout: TextureLayout,
    cluster_side: u32,
    has_clusters: bool,
    max_degree: u32,
    pointer: Position,
    right_button: bool,
    zooming: bool,
    drag: Option<(u32, Position)>,
    forced_step: bool,
    tracked: Vec<u32>,
    tracked_cache: Option<Vec<(u32, Position)>>,
}

impl Simulation<CpuBackend> {
    /// A simulation on the host-memory backend.
    pub fn cpu(config: SimulationConfig) -> Self {
        Self::new(CpuBackend::new(), config)
    }
}

impl Simulation<GpuBackend> {
    /// A simulation on the first available GPU adapter.
    pub fn gpu_blocking(config: SimulationConfig) -> Result<Self> {
        Ok(Self::new(GpuBackend::new_blocking()?, config))
    }
}

impl<B: SimulationBackend> Simulation<B> {
    pub fn new(backend: B, config: SimulationConfig) -> Self {
        let config = config.validated();
        let space_size = config.adjusted_space_size(backend.max_space_size());
        let scheduler = SimulationScheduler::new(config.alpha_decay(), config.alpha_target);
        if space_size == config.space_size {
            tracing::info!(
                "simulation created on {} backend, space size {}",
                backend.label(),
                space_size
            );
        } else {
            tracing::info!(
                "simulation created on {} backend, space size {} (requested {})",
                backend.label(),
                space_size,
                config.space_size
            );
        }
        Self {
            backend,
            config,
            scheduler,
            graph: GraphData::default(),
            space_size,
            layout: TextureLayout::default(),
            cluster_side: 0,
            has_clusters: false,
            max_degree: 0,
            pointer: Position::default(),
            right_button: false,
            zooming: false,
            drag: None,
            forced_step: false,
            tracked: Vec::new(),
            tracked_cache: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn graph(&self) -> &GraphData {
        &self.graph
    }

    /// Space size after clamping to the backend's limits.
    pub fn space_size(&self) -> f32 {
        self.space_size
    }

    pub fn point_count(&self) -> usize {
        self.layout.point_count()
    }

    /// Largest per-point link count over both directions.
    pub fn max_degree(&self) -> u32 {
        self.max_degree
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn alpha(&self) -> f32 {
        self.scheduler.alpha()
    }

    pub fn progress(&self) -> f32 {
        self.scheduler.progress()
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn tick_count(&self) -> u64 {
        self.scheduler.tick_count()
    }

    /// Replace the whole graph and rebuild every resource from it.
    pub fn set_graph(&mut self, graph: GraphData) -> Result<()> {
        graph.validate()?;
        self.graph = graph;
        self.upload_points(self.graph.positions())?;
        self.upload_links()?;
        self.upload_clusters()?;
        Ok(())
    }

    /// Replace point positions. The point resource set is rebuilt; links
    /// and clusters are kept when the point count is unchanged.
    pub fn set_point_positions(&mut self, point_positions: Vec<f32>) -> Result<()> {
        let count_changed = point_positions.len() / 2 != self.graph.point_count();
        let mut graph = self.graph.clone();
        graph.point_positions = point_positions;
        if count_changed {
            graph.links.clear();
            graph.link_strength = None;
            graph.point_sizes = None;
            graph.point_clusters = None;
            graph.cluster_strength = None;
            graph.pinned_points.clear();
            return self.set_graph(graph);
        }
        graph.validate()?;
        self.graph = graph;
        self.upload_points(self.graph.positions())
    }

    /// Replace links only; positions keep evolving from where they are.
    pub fn set_links(&mut self, links: Vec<u32>, link_strength: Option<Vec<f32>>) -> Result<()> {
        let mut graph = self.graph.clone();
        graph.links = links;
        graph.link_strength = link_strength;
        graph.validate()?;
        self.graph = graph;
        self.upload_links()
    }

    /// Replace the set of pinned points.
    pub fn set_pinned(&mut self, pinned_points: Vec<u32>) -> Result<()> {
        let mut graph = self.graph.clone();
        graph.pinned_points = pinned_points;
        graph.validate()?;
        self.graph = graph;
        self.backend.set_pinned(&self.graph.pinned_mask());
        Ok(())
    }

    /// Apply a new configuration. A changed adjusted space size, seed or
    /// default point size rebuilds the point resources from current positions.
    pub fn set_config(&mut self, config: SimulationConfig) -> Result<()> {
        let config = config.validated();
        let space_size = config.adjusted_space_size(self.backend.max_space_size());
        let reseeded = config.random_seed != self.config.random_seed;
        let resized = self.graph.point_sizes.is_none() && config.point_size != self.config.point_size;

        self.config = config;
        self.scheduler
            .set_cooling(self.config.alpha_decay(), self.config.alpha_target);

        if space_size != self.space_size || reseeded || resized {
            if space_size != self.space_size {
                tracing::info!("space size changed {} -> {}", self.space_size, space_size);
            }
            self.space_size = space_size;
            let positions = self.backend.read_positions()?;
            if !positions.is_empty() {
                self.upload_points(positions)?;
            }
        }
        if reseeded {
            self.upload_links()?;
        }
        Ok(())
    }

    pub fn start(&mut self, alpha: f32) {
        self.scheduler.start(alpha);
    }

    pub fn stop(&mut self) {
        self.scheduler.stop();
    }

    pub fn pause(&mut self) {
        self.scheduler.pause();
    }

    pub fn unpause(&mut self) {
        self.scheduler.unpause();
    }

    /// Run exactly one tick now, whether or not the simulation is running.
    pub fn step(&mut self) -> bool {
        self.forced_step = true;
        self.frame()
    }

    /// Pointer position in simulation space.
    pub fn set_pointer(&mut self, position: Position) {
        self.pointer = position;
    }

    pub fn set_right_button(&mut self, pressed: bool) {
        self.right_button = pressed;
    }

    pub fn set_zooming(&mut self, zooming: bool) {
        self.zooming = zooming;
    }

    /// Hold point `index` at `position` until [`Simulation::end_drag`].
    pub fn drag(&mut self, index: u32, position: Position) {
        self.drag = Some((index, position));
    }

    pub fn end_drag(&mut self) {
        self.drag = None;
    }

    /// Whether the pointer force runs this frame.
    pub fn mouse_active(&self) -> bool {
        self.config.enable_simulation && self.config.enable_right_click_repulsion && self.right_button
    }

    /// Advance one rendered frame. Returns whether a simulation tick ran.
    pub fn frame(&mut self) -> bool {
        let forced = std::mem::take(&mut self.forced_step);
        self.apply_drag();

        self.scheduler.settle_if_cold();
        let gate = FrameGate {
            enable_simulation: self.config.enable_simulation,
            enable_simulation_during_zoom: self.config.enable_simulation_during_zoom,
            zooming: self.zooming,
        };
        let tick = self.scheduler.should_tick(gate, forced);
        let mouse = self.mouse_active();

        if tick || mouse {
            let u = self.uniforms();
            self.backend.clear_velocity();
            if mouse {
                self.backend.run_force(ForceKind::Mouse, &u);
                self.backend.integrate(&u);
            }
            if tick {
                for kind in ForceKind::TICK_ORDER {
                    if self.force_enabled(kind) {
                        self.backend.run_force(kind, &u);
                        self.backend.integrate(&u);
                    }
                }
                self.scheduler.finish_tick(mouse);
            }
            self.tracked_cache = None;
        }

        self.apply_drag();
        tick
    }

    /// Current positions, copied to host memory.
    pub fn positions(&mut self) -> Result<Vec<Position>> {
        self.backend.read_positions()
    }

    /// Velocity accumulated during the last tick.
    pub fn velocities(&mut self) -> Result<Vec<Velocity>> {
        self.backend.read_velocities()
    }

    /// Register the points [`Simulation::tracked_positions`] reports.
    pub fn track_points(&mut self, indices: Vec<u32>) {
        self.tracked = indices;
        self.tracked_cache = None;
    }

    /// Positions of the tracked points. Read back only after positions moved.
    pub fn tracked_positions(&mut self) -> Result<&[(u32, Position)]> {
        if self.tracked_cache.is_none() {
            let positions = if self.tracked.is_empty() {
                Vec::new()
            } else {
                self.backend.read_positions()?
            };
            let tracked = self
                .tracked
                .iter()
                .filter_map(|&i| positions.get(i as usize).map(|&p| (i, p)))
                .collect();
            self.tracked_cache = Some(tracked);
        }
        Ok(self.tracked_cache.as_deref().unwrap_or_default())
    }

    /// Take every lifecycle event queued since the last call.
    pub fn drain_events(&mut self) -> Vec<SimulationEvent> {
        self.scheduler.drain_events()
    }

    fn uniforms(&self) -> ForceUniforms {
        let mut u = ForceUniforms::new(
            &self.config,
            self.layout,
            self.space_size,
            self.scheduler.alpha(),
        );
        u.pointer_x = self.pointer.x;
        u.pointer_y = self.pointer.y;
        u.cluster_side = self.cluster_side;
        if let Some((index, position)) = self.drag {
            u.drag_index = index;
            u.drag_x = position.x;
            u.drag_y = position.y;
        }
        u
    }

    fn force_enabled(&self, kind: ForceKind) -> bool {
        let c = &self.config;
        match kind {
            ForceKind::Mouse => self.mouse_active(),
            ForceKind::Gravity => c.gravity != 0.0,
            ForceKind::Center => c.center_force != 0.0,
            ForceKind::ManyBody => c.repulsion != 0.0,
            ForceKind::LinkOutgoing | ForceKind::LinkIncoming => {
                c.link_spring != 0.0 && self.graph.link_count() > 0
            }
            ForceKind::Cluster => c.cluster_force != 0.0 && self.has_clusters,
            ForceKind::Collision => c.collision_strength > 0.0,
        }
    }

    fn apply_drag(&mut self) {
        if self.drag.is_some() {
            let u = self.uniforms();
            self.backend.drag(&u);
            self.tracked_cache = None;
        }
    }

    fn upload_points(&mut self, positions: Vec<Position>) -> Result<()> {
        let count = positions.len();
        let mut rng = StdRng::seed_from_u64(self.config.random_seed);
        let jitter = (0..count)
            .map(|_| {
                let angle = rng.random::<f32>() * std::f32::consts::TAU;
                [angle.cos(), angle.sin()]
            })
            .collect();
        let sizes = self
            .graph
            .point_sizes
            .clone()
            .unwrap_or_else(|| vec![self.config.point_size; count]);

        let upload = PointUpload {
            positions,
            pinned: self.graph.pinned_mask(),
            sizes,
            jitter,
            space_size: self.space_size,
        };
        self.backend.set_points(&upload)?;
        self.layout = TextureLayout::for_points(count);
        self.tracked_cache = None;
        Ok(())
    }

    fn upload_links(&mut self) -> Result<()> {
        let point_count = self.graph.point_count();
        let links: Vec<(u32, u32)> = self.graph.link_pairs().collect();
        let degrees = self.graph.degrees();
        let strength = self.graph.link_strength.as_deref();
        let seed = self.config.random_seed;

        let outgoing = LinkAdjacency::build(
            LinkDirection::Outgoing,
            point_count,
            &links,
            &degrees,
            strength,
            seed,
        );
        let incoming = LinkAdjacency::build(
            LinkDirection::Incoming,
            point_count,
            &links,
            &degrees,
            strength,
            seed,
        );

        let max_degree = outgoing.max_degree().max(incoming.max_degree());
        if max_degree != self.max_degree {
            tracing::debug!("max link degree changed {} -> {}", self.max_degree, max_degree);
            self.max_degree = max_degree;
        }
        self.backend.set_links(&outgoing, &incoming)
    }

    fn upload_clusters(&mut self) -> Result<()> {
        let clusters = ClusterState::build(
            self.graph.point_count(),
            self.graph.point_clusters.as_deref(),
            self.graph.cluster_positions.as_deref(),
            self.graph.cluster_strength.as_deref(),
        );
        self.has_clusters = !clusters.is_empty();
        self.cluster_side = clusters.layout().side() as u32;
        self.backend.set_clusters(&clusters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> SimulationConfig {
        SimulationConfig {
            gravity: 0.0,
            repulsion: 0.0,
            link_spring: 0.0,
            cluster_force: 0.0,
            space_size: 256.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_frame_without_start_does_not_tick() {
        let mut sim = Simulation::cpu(SimulationConfig::default());
        sim.set_graph(GraphData::new(vec![10.0, 10.0, 20.0, 20.0], vec![0, 1]))
            .unwrap();
        assert!(!sim.frame());
        assert_eq!(sim.tick_count(), 0);
    }

    #[test]
    fn test_max_degree_tracks_links() {
        let mut sim = Simulation::cpu(quiet_config());
        sim.set_graph(GraphData::new(vec![0.0; 8], vec![0, 1, 0, 2, 0, 3]))
            .unwrap();
        assert_eq!(sim.max_degree(), 3);
        sim.set_links(vec![0, 1], None).unwrap();
        assert_eq!(sim.max_degree(), 1);
    }

    #[test]
    fn test_invalid_links_keep_previous_graph() {
        let mut sim = Simulation::cpu(quiet_config());
        sim.set_graph(GraphData::new(vec![0.0; 4], vec![0, 1])).unwrap();
        assert!(sim.set_links(vec![0, 5], None).is_err());
        assert_eq!(sim.graph().links, vec![0, 1]);
    }

    #[test]
    fn test_mouse_repels_while_paused() {
        let config = SimulationConfig {
            enable_right_click_repulsion: true,
            ..quiet_config()
        };
        let mut sim = Simulation::cpu(config);
        sim.set_graph(GraphData::new(vec![120.0, 100.0], vec![])).unwrap();
        sim.start(1.0);
        sim.pause();
        sim.set_pointer(Position::new(100.0, 100.0));
        sim.set_right_button(true);

        assert!(!sim.frame());
        let p = sim.positions().unwrap()[0];
        assert!(p.x > 120.0);
        assert_eq!(p.y, 100.0);
    }

    #[test]
    fn test_gravity_pulls_toward_adjusted_space_center() {
        let limit = crate::cpu::CPU_MAX_SPACE_SIZE;
        let mut sim = Simulation::cpu(SimulationConfig {
            gravity: 1.0,
            space_size: limit * 2.0,
            ..quiet_config()
        });
        assert_eq!(sim.space_size(), limit);

        // Past the adjusted center, short of the requested one.
        let start = limit * 0.6;
        sim.set_graph(GraphData::new(vec![start, start], vec![])).unwrap();
        sim.start(1.0);
        assert!(sim.frame());
        let p = sim.positions().unwrap()[0];
        assert!(p.x < start && p.y < start, "{:?}", p);
    }

    #[test]
    fn test_space_size_change_rebuilds_points() {
        let mut sim = Simulation::cpu(quiet_config());
        sim.set_graph(GraphData::new(vec![10.0, 10.0, 30.0, 40.0], vec![]))
            .unwrap();
        let generation = sim.backend().store().generation();

        let config = SimulationConfig {
            space_size: 1024.0,
            ..quiet_config()
        };
        sim.set_config(config).unwrap();
        assert_eq!(sim.space_size(), 1024.0);
        assert_ne!(sim.backend().store().generation(), generation);
        assert_eq!(sim.backend().levels().unwrap().space_size(), 1024.0);
        assert_eq!(
            sim.positions().unwrap(),
            vec![Position::new(10.0, 10.0), Position::new(30.0, 40.0)]
        );
    }

    #[test]
    fn test_tracked_positions_follow_drag() {
        let mut sim = Simulation::cpu(quiet_config());
        sim.set_graph(GraphData::new(vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0], vec![]))
            .unwrap();
        sim.track_points(vec![2, 7]);
        assert_eq!(sim.tracked_positions().unwrap(), &[(2, Position::new(3.0, 3.0))]);

        sim.drag(2, Position::new(50.0, 60.0));
        sim.frame();
        assert_eq!(sim.tracked_positions().unwrap(), &[(2, Position::new(50.0, 60.0))]);
    }
}
