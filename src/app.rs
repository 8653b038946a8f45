// app.rs
use std::sync::Arc;
use std::time::{Duration, Instant};

use winit::{
    application::ApplicationHandler,
    dpi::{PhysicalPosition, PhysicalSize},
    event::*,
    event_loop::{ActiveEventLoop, ControlFlow},
    keyboard::{Key, NamedKey},
    window::{Window, WindowId},
};

use crate::catalog::{Catalog, MaterialEntry};
use crate::engine::{Engine, EngineEvent};
use crate::environment::ENVIRONMENT_CATALOG;
use crate::io::FsFetcher;
use crate::renderer::WgpuBackend;
use crate::scene::camera::OrbitInput;
use crate::scene::lights::{LightRig, LightSettings};
use crate::settings::ViewerSettings;

const TITLE: &str = "U3M Viewer";
const ORIENTATION_STEP: f32 = 15.0;
const EXPOSURE_STEP: f32 = 0.1;
/// Wake-up interval while loads or the loading indicator are outstanding.
const BUSY_POLL: Duration = Duration::from_millis(16);

/// Resources named on the command line, loaded instead of the catalog defaults.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub model: Option<String>,
    pub archive: Option<String>,
}

impl LaunchOptions {
    /// Reads `--model <path>` and `--archive <path>`. Unknown arguments are
    /// skipped with a warning.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = LaunchOptions::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--model" => match args.next() {
                    Some(path) => options.model = Some(path),
                    None => log::warn!("--model needs a path"),
                },
                "--archive" => match args.next() {
                    Some(path) => options.archive = Some(path),
                    None => log::warn!("--archive needs a path"),
                },
                other => log::warn!("Ignoring argument '{}'", other),
            }
        }
        options
    }
}

type ViewerEngine = Engine<WgpuBackend, FsFetcher>;

pub struct App {
    settings: ViewerSettings,
    catalog: Catalog,
    options: LaunchOptions,
    window: Option<Arc<Window>>,
    engine: Option<ViewerEngine>,
    cursor: Option<PhysicalPosition<f64>>,
    dragging: bool,
    model_index: usize,
    material_index: usize,
    environment_index: usize,
    orientation: f32,
    exposure: f32,
}

impl App {
    pub fn new(settings: ViewerSettings, catalog: Catalog, options: LaunchOptions) -> Self {
        Self {
            settings,
            catalog,
            options,
            window: None,
            engine: None,
            cursor: None,
            dragging: false,
            model_index: 0,
            material_index: 0,
            environment_index: 0,
            orientation: 0.0,
            exposure: 1.0,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) {
        let resolution = &self.settings.resolution;
        let attributes = Window::default_attributes()
            .with_title(TITLE)
            .with_inner_size(PhysicalSize::new(resolution.width, resolution.height));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("Failed to create window: {}", err);
                event_loop.exit();
                return;
            }
        };

        let backend = match pollster::block_on(WgpuBackend::new(window.clone(), &self.settings)) {
            Ok(backend) => backend,
            Err(err) => {
                log::error!("Failed to initialise the renderer: {}", err);
                event_loop.exit();
                return;
            }
        };

        let fetcher = FsFetcher::new(self.settings.asset_root.clone());
        let mut engine = Engine::new(backend, fetcher, self.settings.clone(), Instant::now());
        let size = window.inner_size();
        engine.resize(size.width, size.height);
        engine.attach_input();

        if let Err(err) = engine.set_environment(self.environment_index, false) {
            log::error!("{}", err);
        }

        match self.options.model.clone() {
            Some(path) => {
                engine.load_model(path);
            }
            None => {
                if let Some(entry) = self.catalog.models.first() {
                    log::info!("Loading model '{}'", entry.name);
                    engine.load_model(entry.source());
                }
            }
        }

        self.engine = Some(engine);
        match self.options.archive.clone() {
            Some(path) => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.load_material_archive(&path);
                }
            }
            None => self.apply_catalog_material(0),
        }

        window.request_redraw();
        self.window = Some(window);
    }

    fn apply_catalog_material(&mut self, index: usize) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let Some(entry) = self.catalog.materials.get(index) else {
            return;
        };
        log::info!("Applying material '{}'", entry.name());
        match entry {
            MaterialEntry::Archive { path, .. } => {
                engine.load_material_archive(path);
            }
            MaterialEntry::Pbr { .. } => {
                if let Some(definition) = entry.to_definition() {
                    engine.apply_material(definition);
                }
            }
        }
    }

    fn handle_events(&mut self) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        for event in engine.drain_events() {
            match event {
                EngineEvent::LoadingVisibleChanged(visible) => {
                    if let Some(window) = &self.window {
                        if visible {
                            window.set_title(&format!("{TITLE} (loading...)"));
                        } else {
                            window.set_title(TITLE);
                        }
                    }
                }
                EngineEvent::EnvironmentOrientationResolved(azimuth) => self.orientation = azimuth,
                EngineEvent::EnvironmentExposureResolved(exposure) => self.exposure = exposure,
                EngineEvent::MaterialBundleLoaded { bundle, .. } => {
                    for issue in &bundle.issues {
                        log::warn!("{}: {}", issue.source, issue.error);
                    }
                    if let Some(definition) = bundle.first() {
                        engine.apply_material(definition.clone());
                    }
                }
                EngineEvent::LoadFailed { kind, error } => {
                    log::error!("Could not load {}: {}", kind.label(), error);
                }
            }
        }
    }

    fn handle_key(&mut self, key: &Key) {
        match key {
            Key::Character(c) => match c.as_str() {
                "m" | "M" => {
                    self.material_index = (self.material_index + 1) % self.catalog.materials.len().max(1);
                    self.apply_catalog_material(self.material_index);
                }
                "n" | "N" => {
                    self.model_index = (self.model_index + 1) % self.catalog.models.len().max(1);
                    if let (Some(engine), Some(entry)) =
                        (self.engine.as_mut(), self.catalog.models.get(self.model_index))
                    {
                        log::info!("Loading model '{}'", entry.name);
                        engine.load_model(entry.source());
                    }
                }
                "e" | "E" => {
                    self.environment_index = (self.environment_index + 1) % ENVIRONMENT_CATALOG.len();
                    if let Some(engine) = self.engine.as_mut() {
                        let background = engine.scene().environment.background_enabled;
                        if let Err(err) = engine.set_environment(self.environment_index, background) {
                            log::error!("{}", err);
                        }
                    }
                }
                "b" | "B" => {
                    if let Some(engine) = self.engine.as_mut() {
                        let enabled = !engine.scene().environment.background_enabled;
                        engine.set_background_enabled(enabled);
                    }
                }
                "+" | "=" => self.change_exposure(EXPOSURE_STEP),
                "-" => self.change_exposure(-EXPOSURE_STEP),
                "1" => self.toggle_light(|lights| &mut lights.sun, |e, l| e.set_sun_light(l)),
                "2" => self.toggle_light(|lights| &mut lights.ambient1, |e, l| e.set_ambient_light1(l)),
                "3" => self.toggle_light(|lights| &mut lights.ambient2, |e, l| e.set_ambient_light2(l)),
                _ => {}
            },
            Key::Named(NamedKey::ArrowLeft) => self.rotate_environment(-ORIENTATION_STEP),
            Key::Named(NamedKey::ArrowRight) => self.rotate_environment(ORIENTATION_STEP),
            _ => {}
        }
    }

    fn change_exposure(&mut self, delta: f32) {
        if let Some(engine) = self.engine.as_mut() {
            self.exposure = (self.exposure + delta).max(0.0);
            engine.set_environment_exposure(self.exposure);
        }
    }

    fn rotate_environment(&mut self, delta: f32) {
        if let Some(engine) = self.engine.as_mut() {
            self.orientation = (self.orientation + delta).rem_euclid(360.0);
            if let Err(err) = engine.set_environment_orientation(self.environment_index, self.orientation) {
                log::error!("{}", err);
            }
        }
    }

    fn toggle_light(
        &mut self,
        pick: impl Fn(&mut LightRig) -> &mut LightSettings,
        apply: impl Fn(&mut ViewerEngine, LightSettings),
    ) {
        if let Some(engine) = self.engine.as_mut() {
            let mut lights = engine.scene().lights;
            let light = pick(&mut lights);
            light.enabled = !light.enabled;
            let light = *light;
            apply(engine, light);
        }
    }

    fn dispose(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.dispose();
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            self.start(event_loop);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        if self.window.as_ref().map(|w| w.id()) != Some(id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                self.dispose();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.resize(size.width, size.height);
                }
            }
            WindowEvent::ScaleFactorChanged { .. } => {
                if let (Some(engine), Some(window)) = (self.engine.as_mut(), &self.window) {
                    let size = window.inner_size();
                    engine.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(engine) = self.engine.as_mut() {
                    if let Err(err) = engine.render_frame(Instant::now()) {
                        log::error!("Render failed: {}", err);
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let (Some(previous), true) = (self.cursor, self.dragging) {
                    let viewport_height = self
                        .window
                        .as_ref()
                        .map(|w| w.inner_size().height as f32)
                        .unwrap_or(1.0);
                    if let Some(engine) = self.engine.as_mut() {
                        engine.handle_input(OrbitInput::Rotate {
                            dx: (position.x - previous.x) as f32,
                            dy: (position.y - previous.y) as f32,
                            viewport_height,
                        });
                    }
                }
                self.cursor = Some(position);
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                self.dragging = false;
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.dragging = state == ElementState::Pressed;
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => (pos.y / 30.0) as f32,
                };
                if let Some(engine) = self.engine.as_mut() {
                    engine.handle_input(OrbitInput::Zoom(steps));
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                self.dispose();
                event_loop.exit();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                self.handle_key(&logical_key);
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        if let Some(engine) = self.engine.as_mut() {
            engine.tick(now);
        }
        self.handle_events();

        let Some(engine) = self.engine.as_ref() else {
            return;
        };
        if engine.is_render_scheduled() {
            if let Some(window) = &self.window {
                window.request_redraw();
            }
        }

        if engine.has_pending_loads() || engine.loading_visible() || engine.is_render_scheduled() {
            event_loop.set_control_flow(ControlFlow::WaitUntil(now + BUSY_POLL));
        } else {
            event_loop.set_control_flow(ControlFlow::Wait);
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_model_and_archive() {
        let options = LaunchOptions::from_args(args(&[
            "--model",
            "models/rib.glb",
            "--archive",
            "wool.u3ma",
        ]));
        assert_eq!(options.model.as_deref(), Some("models/rib.glb"));
        assert_eq!(options.archive.as_deref(), Some("wool.u3ma"));
    }

    #[test]
    fn dangling_flag_and_unknown_args_are_ignored() {
        let options = LaunchOptions::from_args(args(&["--verbose", "--model"]));
        assert!(options.model.is_none());
        assert!(options.archive.is_none());
    }
}
