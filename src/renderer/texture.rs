use crate::environment::HdrLevel;
use crate::material::{TextureImage, WrapMode};

use super::pipeline_builder::PipelineBuilder;

pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

#[derive(Debug)]
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// Number of mip levels for a full chain down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let max_dimension = width.max(height).max(1);
    u32::BITS - max_dimension.leading_zeros()
}

/// Storage and view formats for an 8-bit texture. Colour data is stored
/// linear and viewed as sRGB so the blit pass can render into it.
pub fn formats_for_color_space(is_srgb: bool) -> (wgpu::TextureFormat, Option<wgpu::TextureFormat>) {
    if is_srgb {
        (
            wgpu::TextureFormat::Rgba8Unorm,
            Some(wgpu::TextureFormat::Rgba8UnormSrgb),
        )
    } else {
        (wgpu::TextureFormat::Rgba8Unorm, None)
    }
}

pub fn address_mode(wrap: WrapMode) -> wgpu::AddressMode {
    match wrap {
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
        WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
    }
}

pub fn create_sampler(device: &wgpu::Device, wrap: WrapMode, label: &str) -> wgpu::Sampler {
    let mode = address_mode(wrap);
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: mode,
        address_mode_v: mode,
        address_mode_w: mode,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

impl GpuTexture {
    /// Uploads a decoded material map and fills its mip chain on the GPU.
    pub fn from_image(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        blitter: &MipBlitter,
        image: &TextureImage,
        is_srgb: bool,
    ) -> Self {
        let rgba = image.image();
        Self::from_rgba8(
            device,
            queue,
            Some(blitter),
            rgba.as_raw(),
            (image.width(), image.height()),
            is_srgb,
            image.label(),
        )
    }

    /// 1x1 texture used for unbound material channels.
    pub fn placeholder(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        color: [u8; 4],
        is_srgb: bool,
        label: &str,
    ) -> Self {
        Self::from_rgba8(device, queue, None, &color, (1, 1), is_srgb, label)
    }

    fn from_rgba8(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        blitter: Option<&MipBlitter>,
        data: &[u8],
        (width, height): (u32, u32),
        is_srgb: bool,
        label: &str,
    ) -> Self {
        let (texture_format, view_format) = formats_for_color_space(is_srgb);
        let mip_level_count = match blitter {
            Some(_) => mip_level_count(width, height),
            None => 1,
        };
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let view_formats: Vec<wgpu::TextureFormat> = view_format.into_iter().collect();

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &view_formats,
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );

        if let Some(blitter) = blitter {
            blitter.generate(device, queue, &texture, mip_level_count);
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            format: view_format.or(Some(texture_format)),
            ..Default::default()
        });

        Self { texture, view }
    }

    /// Uploads a baked radiance chain, one CPU level per mip.
    pub fn from_hdr_levels(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        levels: &[HdrLevel],
        label: &str,
    ) -> Option<Self> {
        let base = levels.first()?;
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: base.width,
                height: base.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: levels.len() as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: HDR_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (mip, level) in levels.iter().enumerate() {
            let bytes = level.to_f16_bytes();
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: mip as u32,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &bytes,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(8 * level.width),
                    rows_per_image: Some(level.height),
                },
                wgpu::Extent3d {
                    width: level.width,
                    height: level.height,
                    depth_or_array_layers: 1,
                },
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Some(Self { texture, view })
    }

    /// 1x1 black HDR texture bound while no environment is loaded.
    pub fn black_hdr(device: &wgpu::Device, queue: &wgpu::Queue, label: &str) -> Self {
        let level = HdrLevel {
            width: 1,
            height: 1,
            texels: vec![[0.0, 0.0, 0.0, 1.0]],
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: HDR_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &level.to_f16_bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(8),
                rows_per_image: Some(1),
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

/// Downsamples mip levels with a fullscreen-triangle render pass.
/// Built once per device and reused for every material map.
pub struct MipBlitter {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    format: wgpu::TextureFormat,
}

impl MipBlitter {
    pub fn new(device: &wgpu::Device) -> Self {
        let format = wgpu::TextureFormat::Rgba8Unorm;
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Blit Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/blit.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blit Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blit Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = PipelineBuilder::new(device, &pipeline_layout, &shader)
            .with_label("Blit Pipeline")
            .with_color_target(format, None)
            .with_no_culling()
            .build();

        let sampler = create_sampler(device, WrapMode::ClampToEdge, "Mip Sampler");

        Self {
            pipeline,
            bind_group_layout,
            sampler,
            format,
        }
    }

    fn generate(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        texture: &wgpu::Texture,
        mip_level_count: u32,
    ) {
        if mip_level_count <= 1 {
            return;
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Mipmap Generator"),
        });

        for target_mip in 1..mip_level_count {
            let src_view = self.mip_view(texture, target_mip - 1, wgpu::TextureUsages::TEXTURE_BINDING);
            let dst_view = self.mip_view(texture, target_mip, wgpu::TextureUsages::RENDER_ATTACHMENT);

            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Mip Bind Group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&src_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });

            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Mipmap Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &dst_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            rpass.set_pipeline(&self.pipeline);
            rpass.set_bind_group(0, &bind_group, &[]);
            rpass.draw(0..3, 0..1);
        }

        queue.submit(Some(encoder.finish()));
    }

    fn mip_view(
        &self,
        texture: &wgpu::Texture,
        mip: u32,
        usage: wgpu::TextureUsages,
    ) -> wgpu::TextureView {
        texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Mip Level"),
            format: Some(self.format),
            dimension: Some(wgpu::TextureViewDimension::D2),
            aspect: wgpu::TextureAspect::All,
            base_mip_level: mip,
            mip_level_count: Some(1),
            base_array_layer: 0,
            array_layer_count: Some(1),
            usage: Some(usage),
        })
    }
}
