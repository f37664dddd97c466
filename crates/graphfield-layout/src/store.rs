//! Double-buffered point positions and the per-tick velocity accumulator.
//!
//! Positions are stored texel-style as `(x, y, index, unused)`. The front
//! buffer is the current state that forces read and consumers see; writes go
//! to the back buffer which then becomes the front.

use crate::texture::TextureLayout;
use crate::{Position, Velocity};

/// The point resource set. Built and torn down as one unit.
#[derive(Debug)]
pub struct PointTextures {
    generation: u64,
    layout: TextureLayout,
    front: Vec<[f32; 4]>,
    back: Vec<[f32; 4]>,
    velocity: Vec<[f32; 2]>,
    integrated: Vec<[f32; 2]>,
    pinned: Vec<bool>,
}

impl PointTextures {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn layout(&self) -> TextureLayout {
        self.layout
    }

    /// Current position texels, one per texture cell.
    pub fn current(&self) -> &[[f32; 4]] {
        &self.front
    }

    /// Velocity accumulated so far this tick.
    pub fn velocity(&self) -> &[[f32; 2]] {
        &self.velocity
    }

    /// Current positions alongside the mutable velocity accumulator.
    pub fn split_mut(&mut self) -> (&[[f32; 4]], &mut [[f32; 2]]) {
        (&self.front, &mut self.velocity)
    }

    pub fn is_pinned(&self, index: usize) -> bool {
        self.pinned.get(index).copied().unwrap_or(false)
    }
}

/// Owner of [`PointTextures`]; every operation no-ops until it has been sized.
#[derive(Debug, Default)]
pub struct PositionVelocityStore {
    textures: Option<PointTextures>,
    next_generation: u64,
}

impl PositionVelocityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the old resource set and build a new one for `positions`.
    ///
    /// An empty slice leaves the store unsized.
    pub fn resize(&mut self, positions: &[Position], pinned: &[bool]) {
        self.textures = None;
        if positions.is_empty() {
            return;
        }

        let layout = TextureLayout::for_points(positions.len());
        let mut front = vec![[0.0f32; 4]; layout.cell_count()];
        for (i, pos) in positions.iter().enumerate() {
            front[i] = [pos.x, pos.y, i as f32, 0.0];
        }
        let mut pinned_cells = vec![false; layout.cell_count()];
        for (cell, &flag) in pinned_cells.iter_mut().zip(pinned) {
            *cell = flag;
        }

        self.next_generation += 1;
        self.textures = Some(PointTextures {
            generation: self.next_generation,
            layout,
            back: front.clone(),
            front,
            velocity: vec![[0.0; 2]; layout.cell_count()],
            integrated: vec![[0.0; 2]; layout.cell_count()],
            pinned: pinned_cells,
        });

        tracing::debug!(
            "point textures rebuilt: {} points, side {}",
            layout.point_count(),
            layout.side()
        );
    }

    pub fn textures(&self) -> Option<&PointTextures> {
        self.textures.as_ref()
    }

    pub fn textures_mut(&mut self) -> Option<&mut PointTextures> {
        self.textures.as_mut()
    }

    pub fn generation(&self) -> Option<u64> {
        self.textures.as_ref().map(|t| t.generation)
    }

    pub fn is_sized_for(&self, point_count: usize) -> bool {
        self.textures
            .as_ref()
            .is_some_and(|t| t.layout.point_count() == point_count)
    }

    /// Replace the pinned flags without touching positions.
    pub fn set_pinned(&mut self, pinned: &[bool]) {
        let Some(textures) = self.textures.as_mut() else {
            return;
        };
        textures.pinned.fill(false);
        for (cell, &flag) in textures.pinned.iter_mut().zip(pinned) {
            *cell = flag;
        }
    }

    /// Zero the velocity accumulator; called once at the start of a tick.
    pub fn clear_velocity(&mut self) {
        let Some(textures) = self.textures.as_mut() else {
            return;
        };
        textures.velocity.fill([0.0; 2]);
        textures.integrated.fill([0.0; 2]);
    }

    /// Move every unpinned point by the velocity accumulated since the last
    /// integration, damped by `1 - friction`, then swap buffers.
    pub fn integrate(&mut self, friction: f32) {
        let Some(textures) = self.textures.as_mut() else {
            return;
        };
        let damping = 1.0 - friction;
        let count = textures.layout.point_count();

        for i in 0..count {
            let velocity = textures.velocity[i];
            let applied = textures.integrated[i];
            textures.integrated[i] = velocity;

            let mut texel = textures.front[i];
            if !textures.pinned[i] {
                texel[0] += (velocity[0] - applied[0]) * damping;
                texel[1] += (velocity[1] - applied[1]) * damping;
            }
            textures.back[i] = texel;
        }
        std::mem::swap(&mut textures.front, &mut textures.back);
    }

    /// Override the position of the point whose index channel equals
    /// `index`, then swap buffers.
    pub fn apply_drag(&mut self, index: u32, position: Position) {
        let Some(textures) = self.textures.as_mut() else {
            return;
        };
        let count = textures.layout.point_count();
        for i in 0..count {
            let mut texel = textures.front[i];
            if texel[2] as u32 == index {
                texel[0] = position.x;
                texel[1] = position.y;
            }
            textures.back[i] = texel;
        }
        std::mem::swap(&mut textures.front, &mut textures.back);
    }

    /// Copy of the current positions.
    pub fn positions(&self) -> Vec<Position> {
        self.textures
            .as_ref()
            .map(|t| {
                t.front[..t.layout.point_count()]
                    .iter()
                    .map(|texel| Position::new(texel[0], texel[1]))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Copy of this tick's accumulated velocity.
    pub fn velocities(&self) -> Vec<Velocity> {
        self.textures
            .as_ref()
            .map(|t| {
                t.velocity[..t.layout.point_count()]
                    .iter()
                    .map(|v| Velocity { x: v[0], y: v[1] })
                    .collect()
            })
            .unwrap_or_default()
    }
}
