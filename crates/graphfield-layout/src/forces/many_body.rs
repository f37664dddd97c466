//! Approximate many-body repulsion over the quadtree level pyramid.
//!
//! Contributions are gathered across all levels. A cell is considered for a
//! point when its parent is the point's own cell or was opened for the point;
//! it is accepted (its centroid repels the point with the cell's whole mass)
//! when `cellSize / distance < theta` or the level is the deepest, and opened
//! otherwise. Every other point is thus counted once, except those sharing
//! the point's deepest cell, which repel through the cell's centroid with the
//! point itself removed.

use super::{unit, ForceUniforms};
use crate::config::MIN_REPULSION_THETA;
use crate::quadtree::{accepts, cell_of, cell_size, QuadtreeLevels};

/// How many cells around a point's own cell can hold candidates at one level.
///
/// An opened parent lies within `parentSize / theta` of the point, which is
/// `2 / theta` cells of the child level, plus the parent's own extent.
pub fn window_radius(theta: f32) -> u32 {
    let theta = if theta.is_finite() {
        theta.max(MIN_REPULSION_THETA)
    } else {
        MIN_REPULSION_THETA
    };
    (2.0 / theta).ceil() as u32 + 3
}

/// Masses nearer than this count as coincident with the point.
pub const COINCIDENT_DISTANCE: f32 = 0.01;

/// Add the repulsion of `mass` located at `delta` away from the point.
///
/// Coincident masses push along `jitter` with unit distance.
pub(crate) fn repel(v: &mut [f32; 2], dx: f32, dy: f32, mass: f32, k: f32, jitter: [f32; 2]) {
    let l = dx * dx + dy * dy;
    let (dir, l) = match unit(dx, dy) {
        Some(dir) if l >= COINCIDENT_DISTANCE * COINCIDENT_DISTANCE => {
            (dir, if l < 1.0 { l.sqrt() } else { l })
        }
        _ => (jitter, 1.0),
    };
    let push = k * mass / l.sqrt();
    v[0] += dir[0] * push;
    v[1] += dir[1] * push;
}

/// Apply repulsion to every point. `levels` must already be built from
/// `positions`.
pub fn apply(
    positions: &[[f32; 4]],
    velocity: &mut [[f32; 2]],
    levels: &QuadtreeLevels,
    jitter: &[[f32; 2]],
    u: &ForceUniforms,
) {
    if levels.is_empty() {
        return;
    }
    let k = u.alpha * u.repulsion;
    if k == 0.0 {
        return;
    }

    let space = levels.space_size();
    let deepest = levels.len() - 1;
    let mut stack: Vec<(usize, usize, usize)> = Vec::with_capacity(64);

    for (i, (p, v)) in positions
        .iter()
        .zip(velocity.iter_mut())
        .take(u.point_count as usize)
        .enumerate()
    {
        let jitter = jitter.get(i).copied().unwrap_or([1.0, 0.0]);
        let mut acc = [0.0f32; 2];

        stack.clear();
        stack.extend([(0, 0, 0), (0, 1, 0), (0, 0, 1), (0, 1, 1)]);

        while let Some((level, cx, cy)) = stack.pop() {
            let cell = levels.cell(level, cx, cy);
            if cell.count <= 0.0 {
                continue;
            }

            if (cx, cy) == cell_of(space, level, p[0], p[1]) {
                if level == deepest {
                    // Own deepest cell: repel from everyone else in it.
                    let others = cell.count - 1.0;
                    if others >= 1.0 {
                        let ox = (cell.sum_x - p[0]) / others;
                        let oy = (cell.sum_y - p[1]) / others;
                        repel(&mut acc, p[0] - ox, p[1] - oy, others, k, jitter);
                    }
                } else {
                    push_children(&mut stack, level, cx, cy);
                }
                continue;
            }

            let Some([ox, oy]) = cell.centroid() else {
                continue;
            };
            let dx = p[0] - ox;
            let dy = p[1] - oy;
            let dist = (dx * dx + dy * dy).sqrt();
            if level == deepest || accepts(cell_size(space, level), dist, u.theta) {
                repel(&mut acc, dx, dy, cell.count, k, jitter);
            } else {
                push_children(&mut stack, level, cx, cy);
            }
        }

        v[0] += acc[0];
        v[1] += acc[1];
    }
}

fn push_children(stack: &mut Vec<(usize, usize, usize)>, level: usize, cx: usize, cy: usize) {
    let (x, y) = (cx * 2, cy * 2);
    stack.extend([
        (level + 1, x, y),
        (level + 1, x + 1, y),
        (level + 1, x, y + 1),
        (level + 1, x + 1, y + 1),
    ]);
}
