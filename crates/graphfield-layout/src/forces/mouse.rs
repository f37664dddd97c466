//! Repulsion away from the pointer.
//!
//! Not scaled by alpha: pointer interaction keeps working after the layout
//! has cooled down.

use super::{unit, ForceUniforms};

/// Distance below which the pointer push stops growing.
const MIN_DISTANCE: f32 = 10.0;

pub fn apply(positions: &[[f32; 4]], velocity: &mut [[f32; 2]], u: &ForceUniforms) {
    let strength = 100.0 * u.mouse_repulsion;
    if strength == 0.0 {
        return;
    }
    for (p, v) in positions.iter().zip(velocity.iter_mut()).take(u.point_count as usize) {
        let dx = u.pointer_x - p[0];
        let dy = u.pointer_y - p[1];
        let Some([ux, uy]) = unit(dx, dy) else {
            continue;
        };
        let dist = (dx * dx + dy * dy).sqrt().max(MIN_DISTANCE);
        let push = strength / (dist * dist);
        v[0] -= ux * push;
        v[1] -= uy * push;
    }
}
