//! Pull toward the centroid of all points.
//!
//! Two phases: every point is accumulated into a single 1x1 aggregate, then
//! each point is pulled toward `sum / count`.

use super::ForceUniforms;
use crate::texture::CellAggregate;

/// Phase (a): sum of all positions.
pub fn accumulate(positions: &[[f32; 4]], point_count: usize) -> CellAggregate {
    let mut aggregate = CellAggregate::default();
    for p in positions.iter().take(point_count) {
        aggregate.sum_x += p[0];
        aggregate.sum_y += p[1];
        aggregate.count += 1.0;
    }
    aggregate
}

/// Phase (b): attract toward the aggregate's centroid.
pub fn apply(
    positions: &[[f32; 4]],
    velocity: &mut [[f32; 2]],
    aggregate: &CellAggregate,
    u: &ForceUniforms,
) {
    let Some([cx, cy]) = aggregate.centroid() else {
        return;
    };
    let k = u.center_force * u.alpha * 0.01;
    if k == 0.0 {
        return;
    }
    for (p, v) in positions.iter().zip(velocity.iter_mut()).take(u.point_count as usize) {
        v[0] += (cx - p[0]) * k;
        v[1] += (cy - p[1]) * k;
    }
}
