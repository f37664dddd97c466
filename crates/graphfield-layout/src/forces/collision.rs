//! Separation of overlapping points.
//!
//! Each point is a disc; every overlapping pair pushes both members apart by
//! half the overlap, scaled by strength and alpha. The CPU kernel buckets
//! points into a uniform grid sized to the largest diameter so only nearby
//! pairs are tested.

use std::collections::HashMap;

use super::{unit, ForceUniforms};

/// Collision radius of a point: the configured radius, or half the point's size.
pub fn radius(collision_radius: f32, size: f32) -> f32 {
    if collision_radius > 0.0 {
        collision_radius
    } else {
        (size / 2.0).max(0.0)
    }
}

pub fn apply(
    positions: &[[f32; 4]],
    velocity: &mut [[f32; 2]],
    sizes: &[f32],
    jitter: &[[f32; 2]],
    u: &ForceUniforms,
) {
    let k = u.collision_strength * u.alpha;
    if k <= 0.0 {
        return;
    }
    let count = (u.point_count as usize).min(positions.len());
    let radii: Vec<f32> = (0..count)
        .map(|i| radius(u.collision_radius, sizes.get(i).copied().unwrap_or(0.0)))
        .collect();
    let max_radius = radii.iter().copied().fold(0.0f32, f32::max);
    if max_radius <= 0.0 {
        return;
    }

    let bucket_size = max_radius * 2.0;
    let bucket_of = |p: &[f32; 4]| -> (i64, i64) {
        (
            (p[0] / bucket_size).floor() as i64,
            (p[1] / bucket_size).floor() as i64,
        )
    };
    let mut buckets: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (i, p) in positions.iter().enumerate().take(count) {
        if p[0].is_finite() && p[1].is_finite() {
            buckets.entry(bucket_of(p)).or_default().push(i);
        }
    }

    for i in 0..count {
        let p = positions[i];
        if !p[0].is_finite() || !p[1].is_finite() {
            continue;
        }
        let (bx, by) = bucket_of(&p);
        let mut push = [0.0f32; 2];
        for nx in bx - 1..=bx + 1 {
            for ny in by - 1..=by + 1 {
                let Some(members) = buckets.get(&(nx, ny)) else {
                    continue;
                };
                for &j in members {
                    if j == i {
                        continue;
                    }
                    let q = positions[j];
                    let reach = radii[i] + radii[j];
                    let dx = p[0] - q[0];
                    let dy = p[1] - q[1];
                    let l = (dx * dx + dy * dy).sqrt();
                    if l >= reach {
                        continue;
                    }
                    let dir = unit(dx, dy).unwrap_or_else(|| jitter.get(i).copied().unwrap_or([1.0, 0.0]));
                    let amount = (reach - l) * 0.5 * k;
                    push[0] += dir[0] * amount;
                    push[1] += dir[1] * amount;
                }
            }
        }
        velocity[i][0] += push[0];
        velocity[i][1] += push[1];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniforms(count: usize) -> ForceUniforms {
        ForceUniforms {
            point_count: count as u32,
            alpha: 1.0,
            collision_strength: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_radius_falls_back_to_size() {
        assert_eq!(radius(0.0, 8.0), 4.0);
        assert_eq!(radius(3.0, 8.0), 3.0);
    }

    #[test]
    fn test_overlapping_pair_separates() {
        let positions = [[0.0, 0.0, 0.0, 0.0], [6.0, 0.0, 1.0, 0.0], [100.0, 0.0, 2.0, 0.0]];
        let mut velocity = [[0.0; 2]; 3];
        apply(&positions, &mut velocity, &[10.0; 3], &[], &uniforms(3));
        // overlap 4, half each
        assert_eq!(velocity[0], [-2.0, 0.0]);
        assert_eq!(velocity[1], [2.0, 0.0]);
        assert_eq!(velocity[2], [0.0, 0.0]);
    }

    #[test]
    fn test_disabled_when_strength_zero() {
        let positions = [[0.0, 0.0, 0.0, 0.0], [1.0, 0.0, 1.0, 0.0]];
        let mut velocity = [[0.0; 2]; 2];
        let u = ForceUniforms {
            collision_strength: 0.0,
            ..uniforms(2)
        };
        apply(&positions, &mut velocity, &[10.0; 2], &[], &u);
        assert_eq!(velocity, [[0.0; 2]; 2]);
    }

    #[test]
    fn test_coincident_points_use_jitter() {
        let positions = [[3.0, 3.0, 0.0, 0.0], [3.0, 3.0, 1.0, 0.0]];
        let mut velocity = [[0.0; 2]; 2];
        apply(
            &positions,
            &mut velocity,
            &[2.0; 2],
            &[[0.0, 1.0], [0.0, -1.0]],
            &uniforms(2),
        );
        assert_eq!(velocity[0], [0.0, 1.0]);
        assert_eq!(velocity[1], [0.0, -1.0]);
    }
}
