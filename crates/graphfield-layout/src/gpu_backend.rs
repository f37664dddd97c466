//! wgpu compute backend.
//!
//! Textures become storage buffers and additive blending becomes fixed-point
//! integer atomics. Each pass writes the uniform block and submits on its own, so a
//! later pass always sees the positions an earlier integration produced.

use crate::backend::{PointUpload, SimulationBackend};
use crate::forces::cluster::ClusterState;
use crate::forces::link::LinkAdjacency;
use crate::forces::{ForceKind, ForceUniforms};
use crate::gpu::{workgroups, ComputeKernel, GpuContext, CELL_BYTES};
use crate::quadtree::{level_count, pyramid_cells};
use crate::shaders;
use crate::texture::TextureLayout;
use crate::{Position, Result, Velocity};

struct Kernels {
    gravity: ComputeKernel,
    mouse: ComputeKernel,
    center_accumulate: ComputeKernel,
    center_apply: ComputeKernel,
    levels_build: ComputeKernel,
    many_body: ComputeKernel,
    link: ComputeKernel,
    cluster_accumulate: ComputeKernel,
    cluster_apply: ComputeKernel,
    collision: ComputeKernel,
    integrate: ComputeKernel,
    drag: ComputeKernel,
}

impl Kernels {
    fn new(ctx: &GpuContext) -> Result<Self> {
        Ok(Self {
            gravity: ComputeKernel::new(ctx, "Gravity Pass", shaders::GRAVITY)?,
            mouse: ComputeKernel::new(ctx, "Mouse Pass", shaders::MOUSE)?,
            center_accumulate: ComputeKernel::new(ctx, "Center Accumulate Pass", shaders::CENTER_ACCUMULATE)?,
            center_apply: ComputeKernel::new(ctx, "Center Apply Pass", shaders::CENTER_APPLY)?,
            levels_build: ComputeKernel::new(ctx, "Levels Build Pass", shaders::LEVELS_BUILD)?,
            many_body: ComputeKernel::new(ctx, "Many-Body Pass", shaders::MANY_BODY)?,
            link: ComputeKernel::new(ctx, "Link Pass", shaders::LINK)?,
            cluster_accumulate: ComputeKernel::new(ctx, "Cluster Accumulate Pass", shaders::CLUSTER_ACCUMULATE)?,
            cluster_apply: ComputeKernel::new(ctx, "Cluster Apply Pass", shaders::CLUSTER_APPLY)?,
            collision: ComputeKernel::new(ctx, "Collision Pass", shaders::COLLISION)?,
            integrate: ComputeKernel::new(ctx, "Integrate Pass", shaders::INTEGRATE)?,
            drag: ComputeKernel::new(ctx, "Drag Pass", shaders::DRAG)?,
        })
    }
}

/// One bind group per buffer orientation: index `i` reads positions `i`.
type Oriented = [wgpu::BindGroup; 2];

struct PointBindGroups {
    gravity: Oriented,
    mouse: Oriented,
    center_accumulate: Oriented,
    center_apply: Oriented,
    levels_build: Oriented,
    many_body: Oriented,
    collision: Oriented,
    integrate: Oriented,
    drag: Oriented,
}

fn oriented(
    positions: &[wgpu::Buffer; 2],
    bind: impl Fn(&wgpu::Buffer, &wgpu::Buffer) -> wgpu::BindGroup,
) -> Oriented {
    [
        bind(&positions[0], &positions[1]),
        bind(&positions[1], &positions[0]),
    ]
}

/// The point resource set, built and dropped as one unit.
struct PointResources {
    generation: u64,
    point_count: u32,
    space_size: f32,
    level_count: u32,
    positions: [wgpu::Buffer; 2],
    velocity: wgpu::Buffer,
    applied: wgpu::Buffer,
    pinned: wgpu::Buffer,
    levels: wgpu::Buffer,
    center: wgpu::Buffer,
    position_staging: wgpu::Buffer,
    velocity_staging: wgpu::Buffer,
    bind: PointBindGroups,
}

struct LinkResources {
    /// `[outgoing, incoming]`, each per orientation.
    bind: [Oriented; 2],
}

struct ClusterResources {
    side: u32,
    acc: wgpu::Buffer,
    accumulate: Oriented,
    apply: Oriented,
}

pub struct GpuBackend {
    ctx: GpuContext,
    kernels: Kernels,
    uniforms: wgpu::Buffer,
    max_groups: u32,
    next_generation: u64,
    /// Which of the two position buffers is current.
    front: usize,
    points: Option<PointResources>,
    links: Option<LinkResources>,
    clusters: Option<ClusterResources>,
    link_data: Option<(LinkAdjacency, LinkAdjacency)>,
    cluster_data: Option<ClusterState>,
}

impl GpuBackend {
    /// Compile every kernel on `ctx`.
    pub fn new(ctx: GpuContext) -> Result<Self> {
        let kernels = Kernels::new(&ctx)?;
        let uniforms = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Uniforms Buffer"),
            size: std::mem::size_of::<ForceUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let max_groups = ctx.device.limits().max_compute_workgroups_per_dimension;
        Ok(Self {
            ctx,
            kernels,
            uniforms,
            max_groups,
            next_generation: 0,
            front: 0,
            points: None,
            links: None,
            clusters: None,
            link_data: None,
            cluster_data: None,
        })
    }

    /// Acquire a device and compile every kernel, blocking.
    pub fn new_blocking() -> Result<Self> {
        Self::new(GpuContext::new_blocking()?)
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    fn groups(&self, count: u32) -> (u32, u32) {
        workgroups(count, self.max_groups)
    }

    fn write_uniforms(&self, u: &ForceUniforms) {
        self.ctx
            .queue
            .write_buffer(&self.uniforms, 0, bytemuck::bytes_of(u));
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Write uniforms, record one pass, submit.
    fn single_pass(&self, kernel: &ComputeKernel, bind_group: &wgpu::BindGroup, u: &ForceUniforms) {
        self.write_uniforms(u);
        let mut encoder = self.encoder("Force Encoder");
        kernel.dispatch(&mut encoder, bind_group, self.groups(u.point_count));
        self.ctx.queue.submit(Some(encoder.finish()));
    }

    fn build_points(&self, points: &PointUpload, generation: u64) -> PointResources {
        let ctx = &self.ctx;
        let layout = TextureLayout::for_points(points.positions.len());
        let cells = layout.cell_count();

        let mut texels = vec![[0.0f32; 4]; cells];
        for (i, p) in points.positions.iter().enumerate() {
            texels[i] = [p.x, p.y, i as f32, 0.0];
        }
        let mut pinned = vec![0u32; cells];
        for (flag, &p) in pinned.iter_mut().zip(&points.pinned) {
            *flag = p as u32;
        }
        let mut sizes = vec![0.0f32; cells];
        sizes[..points.sizes.len().min(cells)]
            .copy_from_slice(&points.sizes[..points.sizes.len().min(cells)]);
        let mut jitter = vec![[1.0f32, 0.0]; cells];
        jitter[..points.jitter.len().min(cells)]
            .copy_from_slice(&points.jitter[..points.jitter.len().min(cells)]);

        let level_count = level_count(points.space_size);
        let level_bytes = pyramid_cells(level_count) as u64 * CELL_BYTES;
        let position_bytes = (cells * std::mem::size_of::<[f32; 4]>()) as u64;
        let velocity_bytes = (cells * std::mem::size_of::<[f32; 2]>()) as u64;

        let positions = [
            ctx.storage_buffer_init("Positions A", &texels),
            ctx.storage_buffer_init("Positions B", &texels),
        ];
        let velocity = ctx.storage_buffer("Velocity Buffer", velocity_bytes);
        let applied = ctx.storage_buffer("Applied Velocity Buffer", velocity_bytes);
        let pinned = ctx.storage_buffer_init("Pinned Buffer", &pinned);
        let sizes = ctx.storage_buffer_init("Sizes Buffer", &sizes);
        let jitter = ctx.storage_buffer_init("Jitter Buffer", &jitter);
        let levels = ctx.storage_buffer("Quadtree Levels Buffer", level_bytes);
        let center = ctx.storage_buffer("Center Buffer", CELL_BYTES);

        let u = &self.uniforms;
        let k = &self.kernels;
        let bind = PointBindGroups {
            gravity: oriented(&positions, |front, _| k.gravity.bind(ctx, u, &[front, &velocity])),
            mouse: oriented(&positions, |front, _| k.mouse.bind(ctx, u, &[front, &velocity])),
            center_accumulate: oriented(&positions, |front, _| k.center_accumulate.bind(ctx, u, &[front, &center])),
            center_apply: oriented(&positions, |front, _| {
                k.center_apply.bind(ctx, u, &[front, &velocity, &center])
            }),
            levels_build: oriented(&positions, |front, _| k.levels_build.bind(ctx, u, &[front, &levels])),
            many_body: oriented(&positions, |front, _| {
                k.many_body.bind(ctx, u, &[front, &velocity, &levels, &jitter])
            }),
            collision: oriented(&positions, |front, _| {
                k.collision.bind(ctx, u, &[front, &velocity, &sizes, &jitter])
            }),
            integrate: oriented(&positions, |front, back| {
                k.integrate
                    .bind(ctx, u, &[front, back, &velocity, &applied, &pinned])
            }),
            drag: oriented(&positions, |front, back| k.drag.bind(ctx, u, &[front, back])),
        };

        PointResources {
            generation,
            point_count: layout.point_count() as u32,
            space_size: points.space_size,
            level_count: level_count as u32,
            position_staging: ctx.staging_buffer("Position Staging Buffer", position_bytes),
            velocity_staging: ctx.staging_buffer("Velocity Staging Buffer", velocity_bytes),
            positions,
            velocity,
            applied,
            pinned,
            levels,
            center,
            bind,
        }
    }

    fn build_links(&self, points: &PointResources, outgoing: &LinkAdjacency, incoming: &LinkAdjacency) -> Option<LinkResources> {
        let count = points.point_count as usize;
        if outgoing.point_count() != count || incoming.point_count() != count {
            tracing::debug!("link adjacency sized for a different point count, not uploading");
            return None;
        }
        let ctx = &self.ctx;
        let bind_direction = |adjacency: &LinkAdjacency, label: &str| -> Oriented {
            let ranges = ctx.storage_buffer_init(&format!("{} Ranges", label), adjacency.ranges());
            let slots = ctx.storage_buffer_init(&format!("{} Slots", label), adjacency.slots());
            [0, 1].map(|o| {
                self.kernels
                    .link
                    .bind(ctx, &self.uniforms, &[&points.positions[o], &points.velocity, &ranges, &slots])
            })
        };
        Some(LinkResources {
            bind: [
                bind_direction(outgoing, "Outgoing Links"),
                bind_direction(incoming, "Incoming Links"),
            ],
        })
    }

    fn build_clusters(&self, points: &PointResources, clusters: &ClusterState) -> Option<ClusterResources> {
        if clusters.is_empty() {
            return None;
        }
        let ctx = &self.ctx;
        let layout = clusters.layout();
        let count = points.point_count as usize;

        let mut cells = vec![crate::forces::cluster::UNCLUSTERED; count.max(1)];
        cells[..clusters.cells().len().min(count)]
            .copy_from_slice(&clusters.cells()[..clusters.cells().len().min(count)]);
        let mut coefficients = vec![1.0f32; count.max(1)];
        coefficients[..clusters.coefficients().len().min(count)]
            .copy_from_slice(&clusters.coefficients()[..clusters.coefficients().len().min(count)]);

        let cells = ctx.storage_buffer_init("Cluster Cells Buffer", &cells);
        let positions = ctx.storage_buffer_init("Cluster Positions Buffer", clusters.positions());
        let coefficients = ctx.storage_buffer_init("Cluster Coefficients Buffer", &coefficients);
        let acc = ctx.storage_buffer("Cluster Accumulator", layout.cell_count() as u64 * CELL_BYTES);

        let accumulate = [0, 1].map(|o| {
            self.kernels
                .cluster_accumulate
                .bind(ctx, &self.uniforms, &[&points.positions[o], &cells, &acc])
        });
        let apply = [0, 1].map(|o| {
            self.kernels.cluster_apply.bind(
                ctx,
                &self.uniforms,
                &[&points.positions[o], &points.velocity, &cells, &positions, &coefficients, &acc],
            )
        });

        Some(ClusterResources {
            side: layout.side() as u32,
            acc,
            accumulate,
            apply,
        })
    }

    fn rebuild_dependents(&mut self) {
        let (links, clusters) = match &self.points {
            Some(points) => (
                self.link_data
                    .as_ref()
                    .and_then(|(out, inc)| self.build_links(points, out, inc)),
                self.cluster_data
                    .as_ref()
                    .and_then(|c| self.build_clusters(points, c)),
            ),
            None => (None, None),
        };
        self.links = links;
        self.clusters = clusters;
    }

    fn read_current<T: bytemuck::Pod>(&self, velocity: bool) -> Result<Vec<T>> {
        let Some(points) = &self.points else {
            return Ok(Vec::new());
        };
        let stride = std::mem::size_of::<T>();
        let size = (points.point_count as usize * stride) as u64;
        let (source, staging) = if velocity {
            (&points.velocity, &points.velocity_staging)
        } else {
            (&points.positions[self.front], &points.position_staging)
        };
        let bytes = self.ctx.read_buffer(source, staging, size)?;
        Ok(bytes
            .chunks_exact(stride)
            .map(bytemuck::pod_read_unaligned::<T>)
            .collect())
    }
}

impl SimulationBackend for GpuBackend {
    fn label(&self) -> &str {
        "gpu"
    }

    fn max_space_size(&self) -> f32 {
        self.ctx.max_space_size()
    }

    fn set_points(&mut self, points: &PointUpload) -> Result<()> {
        // Stale handles go first so nothing can bind them during the rebuild.
        self.links = None;
        self.clusters = None;
        self.points = None;
        self.front = 0;

        if points.positions.is_empty() {
            return Ok(());
        }

        self.next_generation += 1;
        let resources = self.build_points(points, self.next_generation);
        tracing::info!(
            "gpu resources rebuilt: {} points, {} quadtree levels (generation {})",
            resources.point_count,
            resources.level_count,
            resources.generation
        );
        self.points = Some(resources);
        self.rebuild_dependents();
        Ok(())
    }

    fn set_links(&mut self, outgoing: &LinkAdjacency, incoming: &LinkAdjacency) -> Result<()> {
        self.link_data = Some((outgoing.clone(), incoming.clone()));
        self.links = match &self.points {
            Some(points) => self.build_links(points, outgoing, incoming),
            None => None,
        };
        Ok(())
    }

    fn set_clusters(&mut self, clusters: &ClusterState) -> Result<()> {
        self.cluster_data = Some(clusters.clone());
        self.clusters = match &self.points {
            Some(points) => self.build_clusters(points, clusters),
            None => None,
        };
        Ok(())
    }

    fn set_pinned(&mut self, pinned: &[bool]) {
        let Some(points) = &self.points else {
            return;
        };
        let flags: Vec<u32> = (0..points.point_count as usize)
            .map(|i| pinned.get(i).copied().unwrap_or(false) as u32)
            .collect();
        self.ctx
            .queue
            .write_buffer(&points.pinned, 0, bytemuck::cast_slice(&flags));
    }

    fn clear_velocity(&mut self) {
        let Some(points) = &self.points else {
            return;
        };
        let mut encoder = self.encoder("Clear Velocity Encoder");
        encoder.clear_buffer(&points.velocity, 0, None);
        encoder.clear_buffer(&points.applied, 0, None);
        self.ctx.queue.submit(Some(encoder.finish()));
    }

    fn run_force(&mut self, kind: ForceKind, uniforms: &ForceUniforms) {
        let Some(points) = &self.points else {
            return;
        };
        let front = self.front;
        let mut u = *uniforms;
        u.point_count = points.point_count;
        u.levels = points.level_count;
        let groups = self.groups(u.point_count);

        match kind {
            ForceKind::Mouse => self.single_pass(&self.kernels.mouse, &points.bind.mouse[front], &u),
            ForceKind::Gravity => {
                self.single_pass(&self.kernels.gravity, &points.bind.gravity[front], &u)
            }
            ForceKind::Center => {
                self.write_uniforms(&u);
                let mut encoder = self.encoder("Center Encoder");
                encoder.clear_buffer(&points.center, 0, None);
                self.kernels.center_accumulate.dispatch(
                    &mut encoder,
                    &points.bind.center_accumulate[front],
                    groups,
                );
                self.kernels
                    .center_apply
                    .dispatch(&mut encoder, &points.bind.center_apply[front], groups);
                self.ctx.queue.submit(Some(encoder.finish()));
            }
            ForceKind::ManyBody => {
                if points.level_count == 0 {
                    return;
                }
                if u.space_size != points.space_size {
                    tracing::debug!("quadtree levels stale, skipping many-body pass");
                    return;
                }
                self.write_uniforms(&u);
                let mut encoder = self.encoder("Levels Build Encoder");
                encoder.clear_buffer(&points.levels, 0, None);
                self.kernels
                    .levels_build
                    .dispatch(&mut encoder, &points.bind.levels_build[front], groups);
                self.ctx.queue.submit(Some(encoder.finish()));

                for level in 0..points.level_count {
                    u.level = level;
                    self.single_pass(&self.kernels.many_body, &points.bind.many_body[front], &u);
                }
            }
            ForceKind::LinkOutgoing | ForceKind::LinkIncoming => {
                let Some(links) = &self.links else {
                    return;
                };
                let direction = usize::from(kind == ForceKind::LinkIncoming);
                self.single_pass(&self.kernels.link, &links.bind[direction][front], &u);
            }
            ForceKind::Cluster => {
                let Some(clusters) = &self.clusters else {
                    return;
                };
                u.cluster_side = clusters.side;
                self.write_uniforms(&u);
                let mut encoder = self.encoder("Cluster Encoder");
                encoder.clear_buffer(&clusters.acc, 0, None);
                self.kernels
                    .cluster_accumulate
                    .dispatch(&mut encoder, &clusters.accumulate[front], groups);
                self.kernels
                    .cluster_apply
                    .dispatch(&mut encoder, &clusters.apply[front], groups);
                self.ctx.queue.submit(Some(encoder.finish()));
            }
            ForceKind::Collision => {
                if u.collision_strength <= 0.0 {
                    return;
                }
                self.single_pass(&self.kernels.collision, &points.bind.collision[front], &u);
            }
        }
    }

    fn integrate(&mut self, uniforms: &ForceUniforms) {
        let Some(points) = &self.points else {
            return;
        };
        let mut u = *uniforms;
        u.point_count = points.point_count;
        self.single_pass(&self.kernels.integrate, &points.bind.integrate[self.front], &u);
        self.front = 1 - self.front;
    }

    fn drag(&mut self, uniforms: &ForceUniforms) {
        let Some(points) = &self.points else {
            return;
        };
        let mut u = *uniforms;
        u.point_count = points.point_count;
        self.single_pass(&self.kernels.drag, &points.bind.drag[self.front], &u);
        self.front = 1 - self.front;
    }

    fn read_positions(&mut self) -> Result<Vec<Position>> {
        let texels: Vec<[f32; 4]> = self.read_current(false)?;
        Ok(texels.iter().map(|t| Position::new(t[0], t[1])).collect())
    }

    fn read_velocities(&mut self) -> Result<Vec<Velocity>> {
        let velocity: Vec<[f32; 2]> = self.read_current(true)?;
        Ok(velocity.iter().map(|v| Velocity { x: v[0], y: v[1] }).collect())
    }
}
