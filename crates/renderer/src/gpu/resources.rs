//! Resources shared by every program: the group 0 layout, the render target,
//! both scratch buffers and the per-slot constants.
use std::num::NonZeroU64;

use scheduler::FRAME_COUNT;

use super::uniforms::{Constants, CONSTANTS_SIZE};

/// Storage image format programs write into.
pub(crate) const RENDER_TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// `ScratchBuffer` length in `u32`s.
pub(crate) const SCRATCH_WORDS: u64 = 100 * 1024;

const BINDING_CONSTANTS: u32 = 0;
const BINDING_RENDER_TARGET: u32 = 1;
const BINDING_SCRATCH: u32 = 2;
const BINDING_PERSISTENT: u32 = 3;

/// Largest persistent scratch size the device accepts, rounded down to whole
/// `u32`s.
pub(crate) fn clamp_persistent_size(requested: u64, limits: &wgpu::Limits) -> u64 {
    let limit = u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
    let size = requested.min(limit) & !3;
    size.max(4)
}

pub(crate) struct SharedResources {
    layout: wgpu::BindGroupLayout,
    render_target: wgpu::Texture,
    render_view: wgpu::TextureView,
    scratch: wgpu::Buffer,
    persistent: wgpu::Buffer,
    constants: Vec<wgpu::Buffer>,
    bind_groups: Vec<wgpu::BindGroup>,
    size: (u32, u32),
}

impl SharedResources {
    pub fn new(device: &wgpu::Device, size: (u32, u32), persistent_bytes: u64) -> Self {
        let layout = create_layout(device);
        let (render_target, render_view) = create_render_target(device, size);

        let scratch = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("scratch buffer"),
            size: SCRATCH_WORDS * 4,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let persistent_size = clamp_persistent_size(persistent_bytes, &device.limits());
        if persistent_size < persistent_bytes {
            tracing::warn!(
                requested = persistent_bytes,
                granted = persistent_size,
                "persistent scratch buffer clamped to device limits"
            );
        }
        let persistent = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("persistent scratch buffer"),
            size: persistent_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let constants = (0..FRAME_COUNT)
            .map(|slot| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("constants slot {slot}")),
                    size: CONSTANTS_SIZE,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();

        let mut resources = Self {
            layout,
            render_target,
            render_view,
            scratch,
            persistent,
            constants,
            bind_groups: Vec::new(),
            size,
        };
        resources.rebuild_bind_groups(device);
        resources
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    pub fn bind_group(&self, slot: usize) -> &wgpu::BindGroup {
        &self.bind_groups[slot]
    }

    pub fn render_view(&self) -> &wgpu::TextureView {
        &self.render_view
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn persistent_size(&self) -> u64 {
        self.persistent.size()
    }

    /// Recreates the render target at `size` and rebinds every slot.
    pub fn resize(&mut self, device: &wgpu::Device, size: (u32, u32)) {
        let (texture, view) = create_render_target(device, size);
        self.render_target = texture;
        self.render_view = view;
        self.size = size;
        self.rebuild_bind_groups(device);
    }

    pub fn write_constants(&self, queue: &wgpu::Queue, slot: usize, constants: &Constants) {
        queue.write_buffer(&self.constants[slot], 0, constants.as_bytes());
    }

    /// Records the per-frame resets: white render target, zeroed scratch and,
    /// when asked, zeroed persistent scratch.
    pub fn record_clears(&self, encoder: &mut wgpu::CommandEncoder, clear_persistent: bool) {
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("render target clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.render_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::WHITE),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
        }
        encoder.clear_buffer(&self.scratch, 0, None);
        if clear_persistent {
            tracing::debug!(bytes = self.persistent.size(), "clearing persistent scratch");
            encoder.clear_buffer(&self.persistent, 0, None);
        }
    }

    fn rebuild_bind_groups(&mut self, device: &wgpu::Device) {
        self.bind_groups = self
            .constants
            .iter()
            .enumerate()
            .map(|(slot, constants)| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("shared bind group slot {slot}")),
                    layout: &self.layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: BINDING_CONSTANTS,
                            resource: constants.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: BINDING_RENDER_TARGET,
                            resource: wgpu::BindingResource::TextureView(&self.render_view),
                        },
                        wgpu::BindGroupEntry {
                            binding: BINDING_SCRATCH,
                            resource: self.scratch.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: BINDING_PERSISTENT,
                            resource: self.persistent.as_entire_binding(),
                        },
                    ],
                })
            })
            .collect();
        tracing::debug!(
            width = self.size.0,
            height = self.size.1,
            format = ?self.render_target.format(),
            "shared bindings rebuilt"
        );
    }
}

fn create_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let storage = |binding| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("shared program layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: BINDING_CONSTANTS,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(CONSTANTS_SIZE),
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: BINDING_RENDER_TARGET,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: RENDER_TARGET_FORMAT,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            },
            storage(BINDING_SCRATCH),
            storage(BINDING_PERSISTENT),
        ],
    })
}

fn create_render_target(
    device: &wgpu::Device,
    (width, height): (u32, u32),
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("render target"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: RENDER_TARGET_FORMAT,
        usage: wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistent_size_is_clamped_to_limits() {
        let limits = wgpu::Limits {
            max_storage_buffer_binding_size: 128 << 20,
            max_buffer_size: 256 << 20,
            ..wgpu::Limits::default()
        };
        assert_eq!(clamp_persistent_size(64 << 20, &limits), 64 << 20);
        assert_eq!(clamp_persistent_size(512 << 20, &limits), 128 << 20);
    }

    #[test]
    fn persistent_size_is_word_aligned_and_nonzero() {
        let limits = wgpu::Limits::default();
        assert_eq!(clamp_persistent_size(1027, &limits), 1024);
        assert_eq!(clamp_persistent_size(0, &limits), 4);
    }
}
