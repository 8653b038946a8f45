use std::sync::Arc;

use winit::window::Window;

use crate::error::{Result, ViewerError};
use crate::settings::ViewerSettings;

/// Device, queue and the configured window surface.
pub(crate) struct RenderContext {
    pub(crate) surface: wgpu::Surface<'static>,
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    pub(crate) config: wgpu::SurfaceConfiguration,
    pub(crate) supports_wireframe: bool,
}

impl RenderContext {
    pub(crate) async fn new(window: Arc<Window>, settings: &ViewerSettings) -> Result<Self> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .map_err(|err| ViewerError::Gpu(format!("failed to create surface: {err}")))?;

        log::info!("Surface created successfully!");

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| ViewerError::Gpu(format!("no suitable adapter: {err}")))?;

        log::info!("Using adapter: {:?}", adapter.get_info());
        let adapter_features = adapter.features();

        let mut required_features = wgpu::Features::empty();
        let supports_wireframe = adapter_features.contains(wgpu::Features::POLYGON_MODE_LINE);
        if supports_wireframe {
            required_features |= wgpu::Features::POLYGON_MODE_LINE;
        } else {
            log::warn!("Wireframe materials will render filled: POLYGON_MODE_LINE unsupported");
        }

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Device"),
                required_features,
                required_limits: wgpu::Limits::default(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|err| ViewerError::Gpu(format!("failed to create device: {err}")))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| ViewerError::Gpu("surface reports no formats".into()))?;
        log::info!("Surface format: {:?}", format);

        let present_mode = settings.present_mode(&surface_caps.present_modes);
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            supports_wireframe,
        })
    }

    /// Returns false for a zero-sized request, which leaves the surface untouched.
    pub(crate) fn resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        true
    }

    pub(crate) fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub(crate) fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.config);
    }
}
