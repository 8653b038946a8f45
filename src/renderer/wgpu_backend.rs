// renderer/wgpu_backend.rs - the on-screen renderer
use std::collections::HashMap;
use std::sync::Arc;

use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::engine::binding::{SurfaceFlags, SurfaceMaterial};
use crate::environment::BakedEnvironment;
use crate::error::{Result, ViewerError};
use crate::material::{Channel, WrapMode};
use crate::renderer::backend::{FrameStatus, GpuMeshId, RenderBackend};
use crate::renderer::context::RenderContext;
use crate::renderer::depth::{Depth, HdrTarget};
use crate::renderer::pipeline_builder::PipelineBuilder;
use crate::renderer::shadow_map::ShadowMap;
use crate::renderer::texture::{create_sampler, GpuTexture, MipBlitter};
use crate::renderer::uniforms::{CameraUniform, FrameUniform, LightsUniform, MaterialUniform};
use crate::renderer::vertex::Vertex;
use crate::scene::camera::Camera;
use crate::scene::lights::LightRig;
use crate::scene::model::MeshData;
use crate::scene::shadow::SunShadow;
use crate::settings::ViewerSettings;

const COMMON_WGSL: &str = include_str!("shaders/common.wgsl");

fn compose_shader(device: &wgpu::Device, label: &str, body: &str) -> wgpu::ShaderModule {
    let source = format!("{COMMON_WGSL}\n{body}");
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

struct GpuMaterial {
    bind_group: wgpu::BindGroup,
    flags: SurfaceFlags,
    // Keeps the per-material textures alive while the bind group references them.
    _textures: Vec<GpuTexture>,
    _uniform: wgpu::Buffer,
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    material: Option<GpuMaterial>,
}

impl GpuMesh {
    fn new(device: &wgpu::Device, mesh: &MeshData) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(mesh.name.as_str()),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(mesh.name.as_str()),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
            material: None,
        }
    }

    fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

/// 1x1 stand-ins for unbound material channels.
struct Placeholders {
    color: GpuTexture,
    data: GpuTexture,
    normal: GpuTexture,
    black: GpuTexture,
}

impl Placeholders {
    fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self {
            color: GpuTexture::placeholder(device, queue, [255, 255, 255, 255], true, "White"),
            data: GpuTexture::placeholder(device, queue, [255, 255, 255, 255], false, "White Linear"),
            normal: GpuTexture::placeholder(device, queue, [128, 128, 255, 255], false, "Flat Normal"),
            black: GpuTexture::placeholder(device, queue, [0, 0, 0, 255], false, "Black"),
        }
    }

    fn for_channel(&self, channel: Channel) -> &GpuTexture {
        match channel {
            Channel::Albedo | Channel::Emissive => &self.color,
            Channel::Normal => &self.normal,
            Channel::Displacement => &self.black,
            _ => &self.data,
        }
    }
}

struct Pipelines {
    background: wgpu::RenderPipeline,
    opaque: wgpu::RenderPipeline,
    transparent: wgpu::RenderPipeline,
    wireframe: Option<wgpu::RenderPipeline>,
    tonemap: wgpu::RenderPipeline,
    shadow: wgpu::RenderPipeline,
    shadow_catcher: wgpu::RenderPipeline,
}

pub struct WgpuBackend {
    window: Arc<Window>,
    context: RenderContext,
    depth: Depth,
    hdr: HdrTarget,
    blitter: MipBlitter,
    placeholders: Placeholders,
    frame_layout: wgpu::BindGroupLayout,
    material_layout: wgpu::BindGroupLayout,
    tonemap_layout: wgpu::BindGroupLayout,
    pipelines: Pipelines,
    camera_buffer: wgpu::Buffer,
    lights_buffer: wgpu::Buffer,
    frame_buffer: wgpu::Buffer,
    env_sampler: wgpu::Sampler,
    hdr_sampler: wgpu::Sampler,
    repeat_sampler: wgpu::Sampler,
    clamp_sampler: wgpu::Sampler,
    radiance: GpuTexture,
    irradiance: GpuTexture,
    frame_bind_group: wgpu::BindGroup,
    tonemap_bind_group: wgpu::BindGroup,
    frame: FrameUniform,
    shadow_map: ShadowMap,
    shadow_plane: Option<GpuMesh>,
    meshes: HashMap<GpuMeshId, GpuMesh>,
    next_mesh: u64,
    surface_released: bool,
}

impl WgpuBackend {
    pub async fn new(window: Arc<Window>, settings: &ViewerSettings) -> Result<Self> {
        let context = RenderContext::new(window.clone(), settings).await?;
        let device = &context.device;
        let queue = &context.queue;
        let (width, height) = context.size();

        let depth = Depth::new(device, width, height);
        let hdr = HdrTarget::new(device, width, height);
        let blitter = MipBlitter::new(device);
        let placeholders = Placeholders::new(device, queue);

        let frame_layout = frame_layout(device);
        let material_layout = material_layout(device);
        let tonemap_layout = tonemap_layout(device);
        let shadow_pass_layout = ShadowMap::pass_layout(device);
        let pipelines = build_pipelines(
            device,
            &context,
            &frame_layout,
            &material_layout,
            &tonemap_layout,
            &shadow_pass_layout,
        );
        let shadow_map = ShadowMap::new(device, &shadow_pass_layout);

        let camera_buffer = uniform_buffer(device, "Camera Uniform", &CameraUniform::default());
        let lights_buffer = uniform_buffer(
            device,
            "Lights Uniform",
            &LightsUniform::from_rig(&LightRig::default()),
        );
        let mut frame = FrameUniform::default();
        frame.tone[1] = if context.config.format.is_srgb() { 0.0 } else { 1.0 };
        let frame_buffer = uniform_buffer(device, "Frame Uniform", &frame);

        let env_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Environment Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let hdr_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("HDR Sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let repeat_sampler = create_sampler(device, WrapMode::Repeat, "Material Repeat Sampler");
        let clamp_sampler = create_sampler(device, WrapMode::ClampToEdge, "Material Clamp Sampler");

        let radiance = GpuTexture::black_hdr(device, queue, "Empty Radiance");
        let irradiance = GpuTexture::black_hdr(device, queue, "Empty Irradiance");

        let frame_bind_group = create_frame_bind_group(
            device,
            &frame_layout,
            [&camera_buffer, &lights_buffer, &frame_buffer],
            &radiance,
            &irradiance,
            &env_sampler,
            &shadow_map,
        );
        let tonemap_bind_group =
            create_tonemap_bind_group(device, &tonemap_layout, &hdr, &hdr_sampler);

        log::info!("Renderer ready at {}x{}", width, height);

        Ok(Self {
            window,
            context,
            depth,
            hdr,
            blitter,
            placeholders,
            frame_layout,
            material_layout,
            tonemap_layout,
            pipelines,
            camera_buffer,
            lights_buffer,
            frame_buffer,
            env_sampler,
            hdr_sampler,
            repeat_sampler,
            clamp_sampler,
            radiance,
            irradiance,
            frame_bind_group,
            tonemap_bind_group,
            frame,
            shadow_map,
            shadow_plane: None,
            meshes: HashMap::new(),
            next_mesh: 0,
            surface_released: false,
        })
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    fn write_frame(&self) {
        self.context
            .queue
            .write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&self.frame));
    }

    fn create_material(&self, surface: &SurfaceMaterial) -> GpuMaterial {
        let device = &self.context.device;
        let queue = &self.context.queue;

        let mut textures = Vec::new();
        let mut slots: [Option<usize>; Channel::COUNT] = [None; Channel::COUNT];
        for channel in surface.bound_channels() {
            if let Some(image) = surface.map(channel) {
                slots[channel.index()] = Some(textures.len());
                textures.push(GpuTexture::from_image(
                    device,
                    queue,
                    &self.blitter,
                    image,
                    channel.is_color(),
                ));
            }
        }

        let uniform = uniform_buffer(
            device,
            "Material Uniform",
            &MaterialUniform::from_surface(surface),
        );
        let sampler = match surface.wrap {
            WrapMode::Repeat => &self.repeat_sampler,
            WrapMode::ClampToEdge => &self.clamp_sampler,
        };

        let views: Vec<&wgpu::TextureView> = Channel::ALL
            .iter()
            .map(|channel| match slots[channel.index()] {
                Some(slot) => &textures[slot].view,
                None => &self.placeholders.for_channel(*channel).view,
            })
            .collect();

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: uniform.as_entire_binding(),
        }];
        for (index, view) in views.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: index as u32 + 1,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: Channel::COUNT as u32 + 1,
            resource: wgpu::BindingResource::Sampler(sampler),
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(surface.name.as_str()),
            layout: &self.material_layout,
            entries: &entries,
        });

        GpuMaterial {
            bind_group,
            flags: surface.flags,
            _textures: textures,
            _uniform: uniform,
        }
    }

    fn pipeline_for(&self, flags: SurfaceFlags) -> &wgpu::RenderPipeline {
        if flags.contains(SurfaceFlags::WIREFRAME) {
            if let Some(wireframe) = &self.pipelines.wireframe {
                return wireframe;
            }
        }
        if flags.contains(SurfaceFlags::TRANSPARENT) {
            &self.pipelines.transparent
        } else {
            &self.pipelines.opaque
        }
    }
}

impl RenderBackend for WgpuBackend {
    fn upload_mesh(&mut self, mesh: &MeshData) -> Result<GpuMeshId> {
        if mesh.vertices.is_empty() || mesh.indices.is_empty() {
            return Err(ViewerError::ModelInvalid {
                reason: format!("mesh '{}' has no geometry", mesh.name),
            });
        }
        self.next_mesh += 1;
        let id = GpuMeshId(self.next_mesh);
        self.meshes
            .insert(id, GpuMesh::new(&self.context.device, mesh));
        log::debug!(
            "Uploaded mesh '{}' ({} vertices) as {:?}",
            mesh.name,
            mesh.vertices.len(),
            id
        );
        Ok(id)
    }

    fn release_mesh(&mut self, mesh: GpuMeshId) {
        if self.meshes.remove(&mesh).is_none() {
            log::warn!("Release of unknown mesh {:?}", mesh);
        }
    }

    fn bind_material(&mut self, mesh: GpuMeshId, material: &SurfaceMaterial) -> Result<()> {
        if !self.meshes.contains_key(&mesh) {
            return Err(ViewerError::Gpu(format!("mesh {:?} is not live", mesh)));
        }
        if material.flags.contains(SurfaceFlags::WIREFRAME) && self.pipelines.wireframe.is_none() {
            log::debug!("Wireframe unsupported, drawing '{}' filled", material.name);
        }
        let gpu_material = self.create_material(material);
        if let Some(slot) = self.meshes.get_mut(&mesh) {
            slot.material = Some(gpu_material);
        }
        Ok(())
    }

    fn set_environment(&mut self, environment: &BakedEnvironment) -> Result<()> {
        let device = &self.context.device;
        let queue = &self.context.queue;
        let radiance = GpuTexture::from_hdr_levels(
            device,
            queue,
            &environment.radiance,
            &format!("{} radiance", environment.label),
        )
        .ok_or_else(|| ViewerError::Gpu(format!("'{}' has no radiance levels", environment.label)))?;
        let irradiance = GpuTexture::from_hdr_levels(
            device,
            queue,
            std::slice::from_ref(&environment.irradiance),
            &format!("{} irradiance", environment.label),
        )
        .ok_or_else(|| ViewerError::Gpu(format!("'{}' has no irradiance", environment.label)))?;

        self.frame_bind_group = create_frame_bind_group(
            device,
            &self.frame_layout,
            [&self.camera_buffer, &self.lights_buffer, &self.frame_buffer],
            &radiance,
            &irradiance,
            &self.env_sampler,
            &self.shadow_map,
        );
        self.radiance = radiance;
        self.irradiance = irradiance;

        self.frame.environment[0] = 1.0;
        self.frame.environment[2] = environment.mip_count().saturating_sub(1) as f32;
        self.write_frame();
        log::info!(
            "Environment '{}' uploaded ({} radiance levels)",
            environment.label,
            environment.mip_count()
        );
        Ok(())
    }

    fn set_background_visible(&mut self, visible: bool) {
        self.frame.environment[1] = if visible { 1.0 } else { 0.0 };
        self.write_frame();
    }

    fn set_exposure(&mut self, exposure: f32) {
        self.frame.tone[0] = exposure;
        self.write_frame();
    }

    fn set_lights(&mut self, lights: &LightRig) {
        let uniform = LightsUniform::from_rig(lights);
        self.context
            .queue
            .write_buffer(&self.lights_buffer, 0, bytemuck::bytes_of(&uniform));
    }

    fn set_shadow(&mut self, shadow: Option<&SunShadow>) -> Result<()> {
        if self.surface_released {
            return Ok(());
        }
        self.shadow_map.write(&self.context.queue, shadow);
        let device = &self.context.device;
        self.shadow_plane = shadow.map(|shadow| GpuMesh::new(device, &shadow.plane.mesh()));
        match shadow {
            Some(shadow) => log::debug!(
                "Sun shadow fitted, ground plane at y={:.3} ({:.3} half extent)",
                shadow.plane.center.y,
                shadow.plane.half_extent
            ),
            None => log::debug!("Sun shadow off"),
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if !self.context.resize(width, height) {
            return;
        }
        let device = &self.context.device;
        self.depth = Depth::new(device, width, height);
        self.hdr = HdrTarget::new(device, width, height);
        self.tonemap_bind_group =
            create_tonemap_bind_group(device, &self.tonemap_layout, &self.hdr, &self.hdr_sampler);
    }

    fn draw_scene(&mut self, camera: &Camera, meshes: &[GpuMeshId]) -> Result<()> {
        if self.surface_released {
            return Ok(());
        }
        let camera_uniform = CameraUniform::from_camera(camera);
        self.context
            .queue
            .write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&camera_uniform));

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Scene Encoder"),
            });

        // Opaque surfaces first, then blended ones over them.
        let mut ordered: Vec<(&GpuMesh, &GpuMaterial)> = meshes
            .iter()
            .filter_map(|id| self.meshes.get(id))
            .filter_map(|mesh| mesh.material.as_ref().map(|material| (mesh, material)))
            .collect();
        ordered.sort_by_key(|(_, material)| material.flags.contains(SurfaceFlags::TRANSPARENT));

        if self.shadow_map.enabled {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Sun Shadow Pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.shadow_map.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipelines.shadow);
            pass.set_bind_group(0, &self.shadow_map.pass_bind_group, &[]);
            for (mesh, _) in &ordered {
                mesh.draw(&mut pass);
            }
        }

        {
            let [r, g, b, a] = self.frame.clear_color;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Background Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.hdr.view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipelines.background);
            pass.set_bind_group(0, &self.frame_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.hdr.view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_bind_group(0, &self.frame_bind_group, &[]);

            let split = ordered
                .iter()
                .position(|(_, material)| material.flags.contains(SurfaceFlags::TRANSPARENT))
                .unwrap_or(ordered.len());
            let (opaque, blended) = ordered.split_at(split);

            for (mesh, material) in opaque {
                pass.set_pipeline(self.pipeline_for(material.flags));
                pass.set_bind_group(1, &material.bind_group, &[]);
                mesh.draw(&mut pass);
            }

            // The catcher blends over opaque surfaces but sits under transparent cloth.
            if let Some(plane) = &self.shadow_plane {
                pass.set_pipeline(&self.pipelines.shadow_catcher);
                plane.draw(&mut pass);
            }

            for (mesh, material) in blended {
                pass.set_pipeline(self.pipeline_for(material.flags));
                pass.set_bind_group(1, &material.bind_group, &[]);
                mesh.draw(&mut pass);
            }
        }

        self.context.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn composite(&mut self, elapsed_seconds: f32) -> Result<FrameStatus> {
        if self.surface_released {
            return Ok(FrameStatus::Skipped);
        }
        self.frame.environment[3] = elapsed_seconds;
        self.write_frame();

        let output = match self.context.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost, reconfiguring");
                self.context.reconfigure();
                return Ok(FrameStatus::Skipped);
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Surface timeout, skipping frame");
                return Ok(FrameStatus::Skipped);
            }
            Err(err) => return Err(ViewerError::Gpu(format!("surface error: {err}"))),
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Composite Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Tone Map Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipelines.tonemap);
            pass.set_bind_group(0, &self.frame_bind_group, &[]);
            pass.set_bind_group(1, &self.tonemap_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.context.queue.submit(Some(encoder.finish()));
        self.window.pre_present_notify();
        output.present();
        Ok(FrameStatus::Presented)
    }

    fn release_surface(&mut self) {
        if self.surface_released {
            return;
        }
        let released = self.meshes.len();
        self.meshes.clear();
        self.shadow_plane = None;
        self.surface_released = true;
        log::info!("Renderer released ({} meshes freed)", released);
    }
}

fn uniform_buffer<T: bytemuck::Pod>(device: &wgpu::Device, label: &str, value: &T) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::bytes_of(value),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

fn frame_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let all = wgpu::ShaderStages::VERTEX_FRAGMENT;
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Frame Bind Group Layout"),
        entries: &[
            uniform_entry(0, all),
            uniform_entry(1, all),
            uniform_entry(2, all),
            texture_entry(3, wgpu::ShaderStages::FRAGMENT),
            texture_entry(4, wgpu::ShaderStages::FRAGMENT),
            sampler_entry(5, wgpu::ShaderStages::FRAGMENT),
            uniform_entry(6, all),
            wgpu::BindGroupLayoutEntry {
                binding: 7,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Depth,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 8,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                count: None,
            },
        ],
    })
}

fn material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let all = wgpu::ShaderStages::VERTEX_FRAGMENT;
    let mut entries = vec![uniform_entry(0, all)];
    for index in 0..Channel::COUNT as u32 {
        entries.push(texture_entry(index + 1, all));
    }
    entries.push(sampler_entry(Channel::COUNT as u32 + 1, all));
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Material Bind Group Layout"),
        entries: &entries,
    })
}

fn tonemap_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Tone Map Bind Group Layout"),
        entries: &[
            texture_entry(0, wgpu::ShaderStages::FRAGMENT),
            sampler_entry(1, wgpu::ShaderStages::FRAGMENT),
        ],
    })
}

fn create_frame_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    [camera, lights, frame]: [&wgpu::Buffer; 3],
    radiance: &GpuTexture,
    irradiance: &GpuTexture,
    sampler: &wgpu::Sampler,
    shadow: &ShadowMap,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Frame Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: camera.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: lights.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: frame.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(&radiance.view),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: wgpu::BindingResource::TextureView(&irradiance.view),
            },
            wgpu::BindGroupEntry {
                binding: 5,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 6,
                resource: shadow.uniform.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 7,
                resource: wgpu::BindingResource::TextureView(&shadow.view),
            },
            wgpu::BindGroupEntry {
                binding: 8,
                resource: wgpu::BindingResource::Sampler(&shadow.sampler),
            },
        ],
    })
}

fn create_tonemap_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    hdr: &HdrTarget,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Tone Map Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&hdr.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn build_pipelines(
    device: &wgpu::Device,
    context: &RenderContext,
    frame_layout: &wgpu::BindGroupLayout,
    material_layout: &wgpu::BindGroupLayout,
    tonemap_layout: &wgpu::BindGroupLayout,
    shadow_pass_layout: &wgpu::BindGroupLayout,
) -> Pipelines {
    let pbr_shader = compose_shader(device, "PBR Shader", include_str!("shaders/pbr.wgsl"));
    let background_shader = compose_shader(
        device,
        "Background Shader",
        include_str!("shaders/background.wgsl"),
    );
    let tonemap_shader = compose_shader(
        device,
        "Tone Map Shader",
        include_str!("shaders/tonemap.wgsl"),
    );
    let catcher_shader = compose_shader(
        device,
        "Shadow Catcher Shader",
        include_str!("shaders/shadow_catcher.wgsl"),
    );
    let shadow_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Sun Shadow Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("shaders/shadow.wgsl").into()),
    });

    let frame_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Frame Pipeline Layout"),
        bind_group_layouts: &[frame_layout],
        push_constant_ranges: &[],
    });
    let surface_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Surface Pipeline Layout"),
        bind_group_layouts: &[frame_layout, material_layout],
        push_constant_ranges: &[],
    });
    let shadow_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Sun Shadow Pipeline Layout"),
        bind_group_layouts: &[shadow_pass_layout],
        push_constant_ranges: &[],
    });
    let tonemap_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Tone Map Pipeline Layout"),
        bind_group_layouts: &[frame_layout, tonemap_layout],
        push_constant_ranges: &[],
    });

    let background = PipelineBuilder::new(device, &frame_pipeline_layout, &background_shader)
        .with_label("Background Pipeline")
        .with_color_target(HdrTarget::FORMAT, None)
        .with_no_culling()
        .build();

    // Cloth is viewed from both sides, so surfaces never cull.
    let surface = || {
        PipelineBuilder::new(device, &surface_pipeline_layout, &pbr_shader)
            .with_vertex_buffer(Vertex::layout())
            .with_no_culling()
    };

    let opaque = surface()
        .with_label("Opaque Pipeline")
        .with_color_target(HdrTarget::FORMAT, None)
        .with_depth_stencil(Depth::FORMAT, true, wgpu::CompareFunction::Less)
        .build();

    let transparent = surface()
        .with_label("Transparent Pipeline")
        .with_color_target(HdrTarget::FORMAT, Some(wgpu::BlendState::ALPHA_BLENDING))
        .with_depth_stencil(Depth::FORMAT, false, wgpu::CompareFunction::Less)
        .build();

    let wireframe = context.supports_wireframe.then(|| {
        surface()
            .with_label("Wireframe Pipeline")
            .with_wireframe()
            .with_color_target(HdrTarget::FORMAT, Some(wgpu::BlendState::ALPHA_BLENDING))
            .with_depth_stencil(Depth::FORMAT, true, wgpu::CompareFunction::Less)
            .build()
    });

    let tonemap = PipelineBuilder::new(device, &tonemap_pipeline_layout, &tonemap_shader)
        .with_label("Tone Map Pipeline")
        .with_color_target(context.config.format, None)
        .with_no_culling()
        .build();

    let shadow = PipelineBuilder::new(device, &shadow_pipeline_layout, &shadow_shader)
        .with_label("Sun Shadow Pipeline")
        .with_vertex_buffer(Vertex::layout())
        .with_no_culling()
        .with_depth_stencil(ShadowMap::FORMAT, true, wgpu::CompareFunction::LessEqual)
        .with_depth_bias(2, 2.0)
        .depth_only()
        .build();

    let shadow_catcher = PipelineBuilder::new(device, &frame_pipeline_layout, &catcher_shader)
        .with_label("Shadow Catcher Pipeline")
        .with_vertex_buffer(Vertex::layout())
        .with_no_culling()
        .with_color_target(HdrTarget::FORMAT, Some(wgpu::BlendState::ALPHA_BLENDING))
        .with_depth_stencil(Depth::FORMAT, false, wgpu::CompareFunction::LessEqual)
        .build();

    Pipelines {
        background,
        opaque,
        transparent,
        wireframe,
        tonemap,
        shadow,
        shadow_catcher,
    }
}
