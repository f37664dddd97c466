//! Force kernels.
//!
//! Every force reads the current positions and adds into the shared velocity
//! accumulator; none of them writes positions. The CPU kernels here are the
//! reference for the WGSL kernels in [`crate::shaders`], and both read the
//! same [`ForceUniforms`] block.

pub mod center;
pub mod cluster;
pub mod collision;
pub mod gravity;
pub mod link;
pub mod many_body;
pub mod mouse;

use crate::config::SimulationConfig;
use crate::texture::TextureLayout;

/// One force pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForceKind {
    Mouse,
    Gravity,
    Center,
    ManyBody,
    LinkOutgoing,
    LinkIncoming,
    Cluster,
    Collision,
}

impl ForceKind {
    /// Forces of the gated block, in execution order. Mouse runs ahead of these.
    pub const TICK_ORDER: [ForceKind; 7] = [
        ForceKind::Gravity,
        ForceKind::Center,
        ForceKind::ManyBody,
        ForceKind::LinkOutgoing,
        ForceKind::LinkIncoming,
        ForceKind::Cluster,
        ForceKind::Collision,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ForceKind::Mouse => "mouse",
            ForceKind::Gravity => "gravity",
            ForceKind::Center => "center",
            ForceKind::ManyBody => "many-body",
            ForceKind::LinkOutgoing => "link-outgoing",
            ForceKind::LinkIncoming => "link-incoming",
            ForceKind::Cluster => "cluster",
            ForceKind::Collision => "collision",
        }
    }
}

/// Uniform block shared by every kernel.
///
/// Layout matches `struct Uniforms` in the WGSL sources field for field.
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct ForceUniforms {
    pub point_count: u32,
    /// Side of the point texture.
    pub side: u32,
    /// Quadtree level of the current many-body pass.
    pub level: u32,
    /// Number of quadtree levels.
    pub levels: u32,
    pub space_size: f32,
    pub alpha: f32,
    pub theta: f32,
    pub repulsion: f32,
    pub gravity: f32,
    pub center_force: f32,
    pub link_spring: f32,
    pub link_distance: f32,
    /// Lower end of the link-distance variation range.
    pub dist_min: f32,
    /// Upper end of the link-distance variation range.
    pub dist_max: f32,
    pub pointer_x: f32,
    pub pointer_y: f32,
    pub mouse_repulsion: f32,
    pub friction: f32,
    pub cluster_force: f32,
    pub collision_strength: f32,
    pub collision_radius: f32,
    pub drag_index: u32,
    pub drag_x: f32,
    pub drag_y: f32,
    /// Side of the cluster texture.
    pub cluster_side: u32,
    /// Many-body candidate window radius, in cells.
    pub window: u32,
    pub _pad0: u32,
    pub _pad1: u32,
}

impl ForceUniforms {
    /// Uniforms for one tick. Per-pass fields (`level`, pointer, drag) are
    /// filled in by the caller.
    pub fn new(
        config: &SimulationConfig,
        layout: TextureLayout,
        space_size: f32,
        alpha: f32,
    ) -> Self {
        let theta = config.repulsion_theta;
        let [dist_min, dist_max] = config.link_dist_random_variation_range;
        Self {
            point_count: layout.point_count() as u32,
            side: layout.side() as u32,
            level: 0,
            levels: crate::quadtree::level_count(space_size) as u32,
            space_size,
            alpha,
            theta,
            repulsion: config.repulsion,
            gravity: config.gravity,
            center_force: config.center_force,
            link_spring: config.link_spring,
            link_distance: config.link_distance,
            dist_min,
            dist_max,
            mouse_repulsion: config.repulsion_from_mouse,
            friction: config.friction,
            cluster_force: config.cluster_force,
            collision_strength: config.collision_strength,
            collision_radius: config.collision_radius,
            window: many_body::window_radius(theta),
            ..Default::default()
        }
    }
}

/// `(dx, dy) / |(dx, dy)|`, or `None` for a zero or non-finite vector.
pub(crate) fn unit(dx: f32, dy: f32) -> Option<[f32; 2]> {
    let len = (dx * dx + dy * dy).sqrt();
    (len > 0.0 && len.is_finite()).then(|| [dx / len, dy / len])
}
