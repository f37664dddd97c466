//! WGSL compute kernels.
//!
//! Every kernel is [`COMMON`] followed by its own bindings and entry point.
//! Binding 0 is always the uniform block; the remaining bindings are listed
//! above each kernel in the order the backend binds them.
//!
//! Accumulators (quadtree levels, center, clusters) hold five words per cell:
//! `sumX` and `sumY` as 64-bit two's complement fixed point split over a low
//! and a high `u32`, then a `u32` count. Only `atomicAdd` is used, which every
//! wgpu backend can emit.

/// Uniform block, dispatch indexing and quadtree addressing shared by all kernels.
pub const COMMON: &str = r#"
struct Uniforms {
    point_count: u32,
    side: u32,
    level: u32,
    levels: u32,
    space_size: f32,
    alpha: f32,
    theta: f32,
    repulsion: f32,
    gravity: f32,
    center_force: f32,
    link_spring: f32,
    link_distance: f32,
    dist_min: f32,
    dist_max: f32,
    pointer_x: f32,
    pointer_y: f32,
    mouse_repulsion: f32,
    friction: f32,
    cluster_force: f32,
    collision_strength: f32,
    collision_radius: f32,
    drag_index: u32,
    drag_x: f32,
    drag_y: f32,
    cluster_side: u32,
    window: u32,
    _pad0: u32,
    _pad1: u32,
}

@group(0) @binding(0) var<uniform> u: Uniforms;

const WORKGROUP: u32 = 256u;
const FIXED_SCALE: f32 = 1024.0;
const CELL_WORDS: u32 = 5u;

fn to_fixed(value: f32) -> i32 {
    return i32(round(clamp(value * FIXED_SCALE, -2.0e9, 2.0e9)));
}

fn from_fixed(value: i32) -> f32 {
    return f32(value) / FIXED_SCALE;
}

// Dispatches wider than the per-dimension limit spill into y.
fn point_index(gid: vec3<u32>, groups: vec3<u32>) -> u32 {
    return gid.y * groups.x * WORKGROUP + gid.x;
}

fn level_side(level: u32) -> u32 {
    return 2u << level;
}

fn level_offset(level: u32) -> u32 {
    return ((1u << (2u * (level + 1u))) - 4u) / 3u;
}

fn cell_size(level: u32) -> f32 {
    return u.space_size / f32(level_side(level));
}

fn cell_of(level: u32, p: vec2<f32>) -> vec2<u32> {
    let last = f32(level_side(level) - 1u);
    let c = clamp(floor(p / cell_size(level)), vec2<f32>(0.0), vec2<f32>(last));
    return vec2<u32>(c);
}
"#;

/// Pull toward the space center. Bindings: positions, velocity.
pub const GRAVITY: &str = r#"
@group(0) @binding(1) var<storage, read> positions: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read_write> velocity: array<vec2<f32>>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = point_index(gid, groups);
    if (i >= u.point_count) {
        return;
    }
    let p = positions[i].xy;
    let center = vec2<f32>(u.space_size * 0.5);
    velocity[i] = velocity[i] + (center - p) * u.gravity * u.alpha * 0.1;
}
"#;

/// Repulsion from the pointer, not scaled by alpha. Bindings: positions, velocity.
pub const MOUSE: &str = r#"
@group(0) @binding(1) var<storage, read> positions: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read_write> velocity: array<vec2<f32>>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = point_index(gid, groups);
    if (i >= u.point_count) {
        return;
    }
    let d = vec2<f32>(u.pointer_x, u.pointer_y) - positions[i].xy;
    let len = length(d);
    if (len <= 0.0) {
        return;
    }
    let dist = max(len, 10.0);
    let push = 100.0 * u.mouse_repulsion / (dist * dist);
    velocity[i] = velocity[i] - d / len * push;
}
"#;

/// Fixed-point scatter into `acc`. The carry out of the low word is read
/// from the value `atomicAdd` returns, so concurrent adds stay exact.
const ACC_WRITE: &str = r#"
fn atomic_add_fixed(index: u32, value: i32) {
    let lo = bitcast<u32>(value);
    let old = atomicAdd(&acc[index], lo);
    var hi = select(0u, 0xffffffffu, value < 0);
    if (old + lo < old) {
        hi = hi + 1u;
    }
    if (hi != 0u) {
        atomicAdd(&acc[index + 1u], hi);
    }
}

fn scatter(cell: u32, p: vec2<f32>) {
    let base = cell * CELL_WORDS;
    atomic_add_fixed(base, to_fixed(p.x));
    atomic_add_fixed(base + 2u, to_fixed(p.y));
    atomicAdd(&acc[base + 4u], 1u);
}
"#;

/// Decoding of `acc` cells written by [`ACC_WRITE`].
const ACC_READ: &str = r#"
struct Aggregate {
    sum: vec2<f32>,
    count: f32,
}

fn decode_fixed(lo: u32, hi: u32) -> f32 {
    if (bitcast<i32>(hi) < 0) {
        let neg_lo = ~lo + 1u;
        let neg_hi = ~hi + select(0u, 1u, neg_lo == 0u);
        return -(f32(neg_hi) * 4294967296.0 + f32(neg_lo)) / FIXED_SCALE;
    }
    return (f32(hi) * 4294967296.0 + f32(lo)) / FIXED_SCALE;
}

fn aggregate(cell: u32) -> Aggregate {
    let base = cell * CELL_WORDS;
    return Aggregate(
        vec2<f32>(decode_fixed(acc[base], acc[base + 1u]), decode_fixed(acc[base + 2u], acc[base + 3u])),
        f32(acc[base + 4u]),
    );
}
"#;

/// Sum of all positions into one cell. Bindings: positions, acc.
pub const CENTER_ACCUMULATE: &str = r#"
@group(0) @binding(1) var<storage, read> positions: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read_write> acc: array<atomic<u32>>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = point_index(gid, groups);
    if (i >= u.point_count) {
        return;
    }
    scatter(0u, positions[i].xy);
}
"#;

/// Pull toward the accumulated centroid. Bindings: positions, velocity, acc.
pub const CENTER_APPLY: &str = r#"
@group(0) @binding(1) var<storage, read> positions: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read_write> velocity: array<vec2<f32>>;
@group(0) @binding(3) var<storage, read> acc: array<u32>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = point_index(gid, groups);
    if (i >= u.point_count) {
        return;
    }
    let center = aggregate(0u);
    if (center.count <= 0.0) {
        return;
    }
    let centroid = center.sum / center.count;
    let p = positions[i].xy;
    velocity[i] = velocity[i] + (centroid - p) * u.center_force * u.alpha * 0.01;
}
"#;

/// Scatter every point into its cell on every level. Bindings: positions, acc.
pub const LEVELS_BUILD: &str = r#"
@group(0) @binding(1) var<storage, read> positions: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read_write> acc: array<atomic<u32>>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = point_index(gid, groups);
    if (i >= u.point_count) {
        return;
    }
    let p = positions[i].xy;
    for (var level = 0u; level < u.levels; level = level + 1u) {
        let c = cell_of(level, p);
        scatter(level_offset(level) + c.y * level_side(level) + c.x, p);
    }
}
"#;

/// Repulsion from the candidate cells of level `u.level`.
/// Bindings: positions, velocity, levels, jitter.
pub const MANY_BODY: &str = r#"
@group(0) @binding(1) var<storage, read> positions: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read_write> velocity: array<vec2<f32>>;
@group(0) @binding(3) var<storage, read> acc: array<u32>;
@group(0) @binding(4) var<storage, read> jitter: array<vec2<f32>>;

const COINCIDENT_DISTANCE: f32 = 0.01;

fn cell_at(level: u32, c: vec2<u32>) -> Aggregate {
    return aggregate(level_offset(level) + c.y * level_side(level) + c.x);
}

fn repel(delta: vec2<f32>, mass: f32, k: f32, dir: vec2<f32>) -> vec2<f32> {
    var l = dot(delta, delta);
    if (l < COINCIDENT_DISTANCE * COINCIDENT_DISTANCE) {
        return dir * k * mass;
    }
    if (l < 1.0) {
        l = sqrt(l);
    }
    return normalize(delta) * k * mass / sqrt(l);
}

// A cell is a candidate when every ancestor up to the point's own branch was opened.
fn reachable(level: u32, c: vec2<u32>, own: vec2<u32>, p: vec2<f32>) -> bool {
    var ancestor = level;
    loop {
        if (ancestor == 0u) {
            break;
        }
        ancestor = ancestor - 1u;
        let shift = vec2<u32>(level - ancestor);
        let a = c >> shift;
        if (all(a == (own >> shift))) {
            return true;
        }
        let cell = cell_at(ancestor, a);
        let dist = length(p - cell.sum / cell.count);
        if (cell_size(ancestor) / dist < u.theta) {
            return false;
        }
    }
    return true;
}

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = point_index(gid, groups);
    if (i >= u.point_count || u.levels == 0u) {
        return;
    }
    let k = u.alpha * u.repulsion;
    if (k == 0.0) {
        return;
    }

    let p = positions[i].xy;
    let level = u.level;
    let deepest = level == u.levels - 1u;
    let side = i32(level_side(level));
    let size = cell_size(level);
    let own = cell_of(level, p);
    let r = i32(u.window);
    var push = vec2<f32>(0.0);

    for (var dy = -r; dy <= r; dy = dy + 1) {
        for (var dx = -r; dx <= r; dx = dx + 1) {
            let cx = i32(own.x) + dx;
            let cy = i32(own.y) + dy;
            if (cx < 0 || cy < 0 || cx >= side || cy >= side || (dx == 0 && dy == 0)) {
                continue;
            }
            let c = vec2<u32>(u32(cx), u32(cy));
            let cell = cell_at(level, c);
            if (cell.count <= 0.0 || !reachable(level, c, own, p)) {
                continue;
            }
            let delta = p - cell.sum / cell.count;
            if (deepest || size / length(delta) < u.theta) {
                push = push + repel(delta, cell.count, k, jitter[i]);
            }
        }
    }

    if (deepest) {
        // The point's own contribution leaves the sum exactly as it went in.
        let cell = cell_at(level, own);
        let others = cell.count - 1.0;
        if (others >= 1.0) {
            let q = vec2<f32>(from_fixed(to_fixed(p.x)), from_fixed(to_fixed(p.y)));
            let centroid = (cell.sum - q) / others;
            push = push + repel(q - centroid, others, k, jitter[i]);
        }
    }

    velocity[i] = velocity[i] + push;
}
"#;

/// Springs along one adjacency direction. Bindings: positions, velocity, ranges, slots.
pub const LINK: &str = r#"
struct LinkSlot {
    other: u32,
    bias: f32,
    strength: f32,
    jitter: f32,
}

@group(0) @binding(1) var<storage, read> positions: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read_write> velocity: array<vec2<f32>>;
@group(0) @binding(3) var<storage, read> ranges: array<vec2<u32>>;
@group(0) @binding(4) var<storage, read> slots: array<LinkSlot>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = point_index(gid, groups);
    if (i >= u.point_count) {
        return;
    }
    let range = ranges[i];
    let p = positions[i].xy;
    let k = u.link_spring * u.alpha;
    var v = vec2<f32>(0.0);
    for (var s = range.x; s < range.x + range.y; s = s + 1u) {
        let slot = slots[s];
        let other = positions[slot.other].xy;
        let target_distance = u.link_distance * (u.dist_min + slot.jitter * (u.dist_max - u.dist_min));
        let d = other - (p + v);
        let l = max(length(d), 0.99 * target_distance);
        if (l > 0.0) {
            v = v + d * (l - target_distance) / l * k * slot.strength * slot.bias;
        }
    }
    velocity[i] = velocity[i] + v;
}
"#;

/// Per-cluster position sums. Bindings: positions, cells, acc.
pub const CLUSTER_ACCUMULATE: &str = r#"
@group(0) @binding(1) var<storage, read> positions: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read> cells: array<vec2<f32>>;
@group(0) @binding(3) var<storage, read_write> acc: array<atomic<u32>>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = point_index(gid, groups);
    if (i >= u.point_count) {
        return;
    }
    let cell = cells[i];
    if (cell.x < 0.0) {
        return;
    }
    scatter(u32(cell.y) * u.cluster_side + u32(cell.x), positions[i].xy);
}
"#;

/// Pull toward the cluster target.
/// Bindings: positions, velocity, cells, cluster positions, coefficients, acc.
pub const CLUSTER_APPLY: &str = r#"
@group(0) @binding(1) var<storage, read> positions: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read_write> velocity: array<vec2<f32>>;
@group(0) @binding(3) var<storage, read> cells: array<vec2<f32>>;
@group(0) @binding(4) var<storage, read> cluster_positions: array<vec4<f32>>;
@group(0) @binding(5) var<storage, read> coefficients: array<f32>;
@group(0) @binding(6) var<storage, read> acc: array<u32>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = point_index(gid, groups);
    if (i >= u.point_count) {
        return;
    }
    let cell = cells[i];
    if (cell.x < 0.0) {
        return;
    }
    let index = u32(cell.y) * u.cluster_side + u32(cell.x);
    let fixed_position = cluster_positions[index];
    var target_position = fixed_position.xy;
    if (fixed_position.z <= 0.0) {
        let cluster = aggregate(index);
        if (cluster.count <= 0.0) {
            return;
        }
        target_position = cluster.sum / cluster.count;
    }
    let p = positions[i].xy;
    velocity[i] = velocity[i] + (target_position - p) * u.cluster_force * coefficients[i] * u.alpha;
}
"#;

/// All-pairs separation of overlapping discs. Bindings: positions, velocity, sizes, jitter.
pub const COLLISION: &str = r#"
@group(0) @binding(1) var<storage, read> positions: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read_write> velocity: array<vec2<f32>>;
@group(0) @binding(3) var<storage, read> sizes: array<f32>;
@group(0) @binding(4) var<storage, read> jitter: array<vec2<f32>>;

fn radius(index: u32) -> f32 {
    if (u.collision_radius > 0.0) {
        return u.collision_radius;
    }
    return max(sizes[index] * 0.5, 0.0);
}

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = point_index(gid, groups);
    if (i >= u.point_count) {
        return;
    }
    let k = u.collision_strength * u.alpha;
    if (k <= 0.0) {
        return;
    }
    let p = positions[i].xy;
    let r = radius(i);
    var push = vec2<f32>(0.0);
    for (var j = 0u; j < u.point_count; j = j + 1u) {
        if (j == i) {
            continue;
        }
        let reach = r + radius(j);
        let d = p - positions[j].xy;
        let l = length(d);
        if (l >= reach) {
            continue;
        }
        var dir = jitter[i];
        if (l > 0.0) {
            dir = d / l;
        }
        push = push + dir * (reach - l) * 0.5 * k;
    }
    velocity[i] = velocity[i] + push;
}
"#;

/// Fold unintegrated velocity into positions.
/// Bindings: front, back, velocity, applied, pinned.
pub const INTEGRATE: &str = r#"
@group(0) @binding(1) var<storage, read> front: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read_write> back: array<vec4<f32>>;
@group(0) @binding(3) var<storage, read> velocity: array<vec2<f32>>;
@group(0) @binding(4) var<storage, read_write> applied: array<vec2<f32>>;
@group(0) @binding(5) var<storage, read> pinned: array<u32>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = point_index(gid, groups);
    if (i >= u.point_count) {
        return;
    }
    let v = velocity[i];
    let delta = v - applied[i];
    applied[i] = v;
    var texel = front[i];
    if (pinned[i] == 0u) {
        texel = vec4<f32>(texel.xy + delta * (1.0 - u.friction), texel.zw);
    }
    back[i] = texel;
}
"#;

/// Copy positions, overriding the dragged point. Bindings: front, back.
pub const DRAG: &str = r#"
@group(0) @binding(1) var<storage, read> front: array<vec4<f32>>;
@group(0) @binding(2) var<storage, read_write> back: array<vec4<f32>>;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) gid: vec3<u32>, @builtin(num_workgroups) groups: vec3<u32>) {
    let i = point_index(gid, groups);
    if (i >= u.point_count) {
        return;
    }
    var texel = front[i];
    if (u32(texel.z) == u.drag_index) {
        texel = vec4<f32>(u.drag_x, u.drag_y, texel.zw);
    }
    back[i] = texel;
}
"#;

/// Full source of a kernel.
pub fn kernel_source(body: &str) -> String {
    let helpers = if body.contains("acc: array<atomic<u32>>") {
        ACC_WRITE
    } else if body.contains("acc: array<u32>") {
        ACC_READ
    } else {
        ""
    };
    format!("{}{}{}", COMMON, helpers, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_struct_matches_host_layout() {
        let fields = COMMON
            .lines()
            .skip_while(|l| !l.starts_with("struct Uniforms"))
            .skip(1)
            .take_while(|l| !l.starts_with('}'))
            .count();
        assert_eq!(fields * 4, std::mem::size_of::<crate::forces::ForceUniforms>());
    }

    #[test]
    fn test_accumulator_helpers_only_where_needed() {
        assert!(kernel_source(LEVELS_BUILD).contains("fn atomic_add_fixed"));
        assert!(kernel_source(CLUSTER_ACCUMULATE).contains("fn scatter"));
        assert!(kernel_source(MANY_BODY).contains("fn aggregate"));
        assert!(kernel_source(CENTER_APPLY).contains("fn decode_fixed"));
        assert!(!kernel_source(GRAVITY).contains("fn atomic_add_fixed"));
        assert!(!kernel_source(GRAVITY).contains("fn aggregate"));
    }

    #[test]
    fn test_kernels_use_only_portable_atomics() {
        for body in [CENTER_ACCUMULATE, LEVELS_BUILD, CLUSTER_ACCUMULATE] {
            let source = kernel_source(body);
            assert!(source.contains("atomicAdd"));
            assert!(!source.contains("atomicCompareExchange"));
            assert!(!source.contains("atomicLoad"));
        }
    }

    #[test]
    fn test_cell_words_match_host() {
        assert!(COMMON.contains(&format!("const CELL_WORDS: u32 = {}u;", crate::gpu::CELL_WORDS)));
        assert!(COMMON.contains(&format!("const FIXED_SCALE: f32 = {:.1};", crate::gpu::FIXED_SCALE)));
    }
}
