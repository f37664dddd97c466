//! Spring attraction along links, one instance per direction.
//!
//! Adjacency is a CSR list: every point owns a contiguous slice of link slots,
//! addressed by `(first, count)`. Bias, strength and the distance jitter are
//! fixed when the adjacency is built and never recomputed per tick.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::ForceUniforms;

/// Which endpoint owns a link's slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkDirection {
    /// The source's slice holds the target.
    Outgoing,
    /// The target's slice holds the source.
    Incoming,
}

impl LinkDirection {
    fn seed_offset(self) -> u64 {
        match self {
            LinkDirection::Outgoing => 0,
            LinkDirection::Incoming => 1,
        }
    }
}

/// One directed link as seen from the slice owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct LinkSlot {
    /// Index of the point at the other end.
    pub other: u32,
    pub bias: f32,
    pub strength: f32,
    /// Distance jitter in `[0, 1)`.
    pub jitter: f32,
}

/// Per-direction adjacency.
#[derive(Debug, Clone, Default)]
pub struct LinkAdjacency {
    /// `(first, count)` per point.
    ranges: Vec<[u32; 2]>,
    slots: Vec<LinkSlot>,
    max_degree: u32,
}

/// Link strength derived from endpoint degrees.
pub fn default_strength(degree_a: u32, degree_b: u32) -> f32 {
    (1.0 / degree_a.min(degree_b).max(1) as f32).sqrt()
}

/// Share of the pull taken by the slice owner.
pub fn bias(degree_self: u32, degree_other: u32) -> f32 {
    let sum = degree_self + degree_other;
    if sum == 0 {
        0.5
    } else {
        degree_other as f32 / sum as f32
    }
}

impl LinkAdjacency {
    /// Build the adjacency for `direction`.
    ///
    /// `links` must reference points below `point_count`, and `degrees` must
    /// hold the total (in plus out) degree of every point. Per-link strengths
    /// are used as given when supplied.
    pub fn build(
        direction: LinkDirection,
        point_count: usize,
        links: &[(u32, u32)],
        degrees: &[u32],
        link_strength: Option<&[f32]>,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(direction.seed_offset()));

        let owner_of = |&(source, target): &(u32, u32)| match direction {
            LinkDirection::Outgoing => (source, target),
            LinkDirection::Incoming => (target, source),
        };

        let mut ranges = vec![[0u32; 2]; point_count];
        for link in links {
            let (owner, _) = owner_of(link);
            ranges[owner as usize][1] += 1;
        }
        let mut next = 0u32;
        for range in ranges.iter_mut() {
            range[0] = next;
            next += range[1];
        }
        let max_degree = ranges.iter().map(|r| r[1]).max().unwrap_or(0);

        let mut fill: Vec<u32> = ranges.iter().map(|r| r[0]).collect();
        let mut slots = vec![LinkSlot::default(); links.len()];
        for (i, link) in links.iter().enumerate() {
            let (owner, other) = owner_of(link);
            let degree_self = degrees[owner as usize];
            let degree_other = degrees[other as usize];
            let strength = link_strength
                .and_then(|s| s.get(i).copied())
                .unwrap_or_else(|| default_strength(degree_self, degree_other));

            let slot = &mut fill[owner as usize];
            slots[*slot as usize] = LinkSlot {
                other,
                bias: bias(degree_self, degree_other),
                strength,
                jitter: rng.random::<f32>(),
            };
            *slot += 1;
        }

        tracing::debug!(
            "{:?} adjacency built: {} slots, max degree {}",
            direction,
            slots.len(),
            max_degree
        );

        Self {
            ranges,
            slots,
            max_degree,
        }
    }

    /// `(first, count)` per point.
    pub fn ranges(&self) -> &[[u32; 2]] {
        &self.ranges
    }

    pub fn slots(&self) -> &[LinkSlot] {
        &self.slots
    }

    /// Slots owned by `point`.
    pub fn slice(&self, point: usize) -> &[LinkSlot] {
        match self.ranges.get(point) {
            Some(&[first, count]) => &self.slots[first as usize..(first + count) as usize],
            None => &[],
        }
    }

    /// Largest slice length.
    pub fn max_degree(&self) -> u32 {
        self.max_degree
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn point_count(&self) -> usize {
        self.ranges.len()
    }
}

/// Pull every point toward the other ends of its slice.
pub fn apply(
    positions: &[[f32; 4]],
    velocity: &mut [[f32; 2]],
    adjacency: &LinkAdjacency,
    u: &ForceUniforms,
) {
    let count = (u.point_count as usize).min(adjacency.point_count());
    let k = u.link_spring * u.alpha;
    if k == 0.0 || adjacency.is_empty() {
        return;
    }

    for i in 0..count {
        let slice = adjacency.slice(i);
        if slice.is_empty() {
            continue;
        }
        let p = positions[i];
        let mut v = [0.0f32; 2];
        for slot in slice {
            let other = positions[slot.other as usize];
            let target = u.link_distance * (u.dist_min + slot.jitter * (u.dist_max - u.dist_min));
            let dx = other[0] - (p[0] + v[0]);
            let dy = other[1] - (p[1] + v[1]);
            let l = (dx * dx + dy * dy).sqrt().max(0.99 * target);
            if l.is_nan() || l <= 0.0 {
                continue;
            }
            let pull = (l - target) / l * k * slot.strength * slot.bias;
            v[0] += dx * pull;
            v[1] += dy * pull;
        }
        velocity[i][0] += v[0];
        velocity[i][1] += v[1];
    }
}
