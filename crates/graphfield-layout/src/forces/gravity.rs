//! Pull toward the center of the space.

use super::ForceUniforms;

pub fn apply(positions: &[[f32; 4]], velocity: &mut [[f32; 2]], u: &ForceUniforms) {
    let center = u.space_size / 2.0;
    let k = u.gravity * u.alpha * 0.1;
    if k == 0.0 {
        return;
    }
    for (p, v) in positions.iter().zip(velocity.iter_mut()).take(u.point_count as usize) {
        v[0] += (center - p[0]) * k;
        v[1] += (center - p[1]) * k;
    }
}
