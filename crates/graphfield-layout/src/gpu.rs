//! GPU device, buffers and compute kernels.

use std::borrow::Cow;

use wgpu::util::DeviceExt;

use crate::shaders::kernel_source;
use crate::{LayoutError, Result};

/// Threads per workgroup in every kernel.
pub const WORKGROUP_SIZE: u32 = 256;

/// `u32` words per accumulator cell: two per fixed-point sum, one count.
pub const CELL_WORDS: u64 = 5;

/// Fixed-point steps per space unit in accumulator sums.
pub const FIXED_SCALE: f32 = 1024.0;

/// Bytes per accumulator cell.
pub const CELL_BYTES: u64 = CELL_WORDS * 4;

/// GPU context holding device and queue.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    adapter_name: String,
}

impl GpuContext {
    /// Acquire an adapter and a device with the adapter's own limits.
    pub async fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| LayoutError::GpuInit("No suitable GPU adapter found".into()))?;

        let info = adapter.get_info();
        tracing::info!("Using GPU adapter: {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Simulation Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| LayoutError::GpuInit(e.to_string()))?;

        Ok(Self {
            device,
            queue,
            adapter_name: info.name,
        })
    }

    /// Blocking variant of [`GpuContext::new`].
    pub fn new_blocking() -> Result<Self> {
        pollster::block_on(Self::new())
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Largest power-of-two space whose level pyramid fits one storage binding
    /// and whose side fits a texture dimension.
    pub fn max_space_size(&self) -> f32 {
        max_space_size_for(&self.device.limits())
    }

    /// A zero-initialised storage buffer of at least `size` bytes.
    pub fn storage_buffer(&self, label: &str, size: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: padded(size),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    /// A storage buffer holding `contents`.
    pub fn storage_buffer_init<T: bytemuck::Pod>(&self, label: &str, contents: &[T]) -> wgpu::Buffer {
        let bytes: &[u8] = bytemuck::cast_slice(contents);
        if bytes.len() as u64 == padded(bytes.len() as u64) {
            return self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytes,
                    usage: wgpu::BufferUsages::STORAGE
                        | wgpu::BufferUsages::COPY_DST
                        | wgpu::BufferUsages::COPY_SRC,
                });
        }
        let buffer = self.storage_buffer(label, bytes.len() as u64);
        if !bytes.is_empty() {
            self.queue.write_buffer(&buffer, 0, bytes);
        }
        buffer
    }

    /// A buffer the host can map for reading.
    pub fn staging_buffer(&self, label: &str, size: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: padded(size),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Copy `size` bytes of `source` into host memory, blocking until done.
    pub fn read_buffer(&self, source: &wgpu::Buffer, staging: &wgpu::Buffer, size: u64) -> Result<Vec<u8>> {
        if size == 0 {
            return Ok(Vec::new());
        }
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(source, 0, staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = staging.slice(..size);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|_| LayoutError::Readback("Channel closed".into()))?
            .map_err(|e| LayoutError::Readback(e.to_string()))?;

        let bytes = buffer_slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(bytes)
    }
}

/// Buffers smaller than this cannot back a binding on every adapter.
fn padded(size: u64) -> u64 {
    size.max(16).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT)
}

fn max_space_size_for(limits: &wgpu::Limits) -> f32 {
    // The pyramid holds (4^(L+1) - 4) / 3 cells, under 4/3 * side^2.
    let by_binding = ((limits.max_storage_buffer_binding_size as u64 * 3)
        / (4 * CELL_BYTES)) as f64;
    let side = by_binding.sqrt().min(limits.max_texture_dimension_2d as f64);
    if side < 2.0 {
        return 2.0;
    }
    let exponent = side.log2().floor() as i32;
    2f32.powi(exponent)
}

/// Workgroup counts covering `count` invocations, spilling into y past the
/// per-dimension limit.
pub fn workgroups(count: u32, max_per_dimension: u32) -> (u32, u32) {
    let groups = count.div_ceil(WORKGROUP_SIZE).max(1);
    let max = max_per_dimension.max(1);
    if groups <= max {
        (groups, 1)
    } else {
        (max, groups.div_ceil(max))
    }
}

/// One compute pipeline and the layout of its single bind group.
pub struct ComputeKernel {
    label: &'static str,
    pipeline: wgpu::ComputePipeline,
}

impl ComputeKernel {
    /// Compile `body` (prefixed with the shared WGSL prelude).
    ///
    /// Validation failures, including kernels the adapter's shading language
    /// cannot express, come back as [`LayoutError::GpuInit`].
    pub fn new(ctx: &GpuContext, label: &'static str, body: &str) -> Result<Self> {
        ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = ctx
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(Cow::Owned(kernel_source(body))),
            });

        let pipeline = ctx
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: None,
                module: &shader,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            });

        if let Some(error) = pollster::block_on(ctx.device.pop_error_scope()) {
            return Err(LayoutError::GpuInit(format!("{}: {}", label, error)));
        }
        Ok(Self { label, pipeline })
    }

    /// Bind `uniforms` at binding 0 and `buffers` at bindings 1.. in order.
    pub fn bind(&self, ctx: &GpuContext, uniforms: &wgpu::Buffer, buffers: &[&wgpu::Buffer]) -> wgpu::BindGroup {
        let layout = self.pipeline.get_bind_group_layout(0);
        let entries: Vec<wgpu::BindGroupEntry> = std::iter::once(uniforms)
            .chain(buffers.iter().copied())
            .enumerate()
            .map(|(binding, buffer)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();

        ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(self.label),
            layout: &layout,
            entries: &entries,
        })
    }

    /// Record one pass over `count` invocations.
    pub fn dispatch(&self, encoder: &mut wgpu::CommandEncoder, bind_group: &wgpu::BindGroup, groups: (u32, u32)) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(self.label),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(groups.0, groups.1, 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workgroups_spill_into_y() {
        assert_eq!(workgroups(0, 65535), (1, 1));
        assert_eq!(workgroups(1000, 65535), (4, 1));
        assert_eq!(workgroups(256 * 70000, 65535), (65535, 2));
    }

    #[test]
    fn test_max_space_size_is_power_of_two() {
        let limits = wgpu::Limits::default();
        let size = max_space_size_for(&limits);
        assert_eq!(size.log2().fract(), 0.0);
        let cells = crate::quadtree::pyramid_cells(crate::quadtree::level_count(size));
        assert!(cells as u64 * CELL_BYTES <= limits.max_storage_buffer_binding_size as u64);
    }

    #[test]
    fn test_padded_sizes() {
        assert_eq!(padded(0), 16);
        assert_eq!(padded(17), 20);
    }
}
