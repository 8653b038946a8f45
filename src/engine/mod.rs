// engine/mod.rs - command surface over the scene, loader and renderer
pub mod binding;
pub mod schedule;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::environment::{self, BakedEnvironment, EnvironmentState};
use crate::error::{Result, ViewerError};
use crate::io::ResourceFetcher;
use crate::loading::{
    AssetLoader, Completion, Generation, GenerationCounter, LoadJob, LoadKind, LoadOutput,
    LoadRequest, LoadTicket, LoadingTracker,
};
use crate::material::{MaterialArchiveBundle, MaterialDefinition};
use crate::renderer::backend::{FrameStatus, RenderBackend};
use crate::scene::camera::{OrbitController, OrbitInput, FIT_OFFSET};
use crate::scene::lights::{LightRig, LightSettings};
use crate::scene::model::{ModelData, ModelSource};
use crate::scene::state::SceneState;
use crate::settings::ViewerSettings;

pub use binding::{target_slot, SurfaceFlags, SurfaceMaterial};
pub use schedule::{RenderScheduler, RenderState};

/// Load steps run per `tick`. A step is one fetch, decode or bake.
const LOAD_STEPS_PER_TICK: usize = 1;

/// Notifications for whoever hosts the engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    LoadingVisibleChanged(bool),
    EnvironmentOrientationResolved(f32),
    EnvironmentExposureResolved(f32),
    MaterialBundleLoaded {
        ticket: LoadTicket,
        bundle: MaterialArchiveBundle,
    },
    LoadFailed {
        kind: LoadKind,
        error: ViewerError,
    },
}

static NEXT_REGISTRATION: AtomicU64 = AtomicU64::new(1);

/// Pointer/wheel listening held by the engine. Dropping it detaches input.
#[derive(Debug)]
pub struct InputRegistration {
    id: u64,
}

impl InputRegistration {
    fn acquire() -> Self {
        let id = NEXT_REGISTRATION.fetch_add(1, Ordering::Relaxed);
        log::debug!("Input registration {} attached", id);
        Self { id }
    }
}

impl Drop for InputRegistration {
    fn drop(&mut self) {
        log::debug!("Input registration {} detached", self.id);
    }
}

pub struct Engine<B: RenderBackend, F: ResourceFetcher> {
    settings: ViewerSettings,
    backend: B,
    loader: AssetLoader<F>,
    tracker: LoadingTracker,
    model_generation: GenerationCounter,
    material_generation: GenerationCounter,
    environment_generation: GenerationCounter,
    scheduler: RenderScheduler,
    scene: SceneState,
    orbit: OrbitController,
    input: Option<InputRegistration>,
    events: VecDeque<EngineEvent>,
    pending_size: Option<(u32, u32)>,
    started: Instant,
    disposed: bool,
}

impl<B: RenderBackend, F: ResourceFetcher> Engine<B, F> {
    pub fn new(mut backend: B, fetcher: F, settings: ViewerSettings, now: Instant) -> Self {
        let width = settings.resolution.width.max(1);
        let height = settings.resolution.height.max(1);
        let scene = SceneState::new(settings.space_size, width as f32 / height as f32);

        backend.resize(width, height);
        backend.set_lights(&scene.lights);
        backend.set_exposure(scene.environment.exposure);
        backend.set_background_visible(false);

        let mut scheduler = RenderScheduler::new();
        scheduler.request();

        log::info!(
            "Engine created ({}x{}, space size {})",
            width,
            height,
            settings.space_size
        );

        Self {
            orbit: OrbitController::new(settings.orbit, settings.space_size),
            tracker: LoadingTracker::new(settings.loading_settle()),
            settings,
            backend,
            loader: AssetLoader::new(fetcher),
            model_generation: GenerationCounter::new(),
            material_generation: GenerationCounter::new(),
            environment_generation: GenerationCounter::new(),
            scheduler,
            scene,
            input: None,
            events: VecDeque::new(),
            pending_size: None,
            started: now,
            disposed: false,
        }
    }

    // ---- inbound commands ----

    /// Replaces the mesh set with the model from `source`. The current meshes are
    /// released immediately.
    pub fn load_model(&mut self, source: impl Into<ModelSource>) -> Option<LoadTicket> {
        if !self.accepts("load_model") {
            return None;
        }

        self.clear_meshes();
        self.refresh_shadow();
        let generation = self.model_generation.advance();
        let ticket = self.enqueue(
            LoadRequest::Model {
                source: source.into(),
            },
            generation,
        );
        self.request_render();
        Some(ticket)
    }

    /// Makes `definition` the active material. Unresolved texture slots are
    /// loaded first; the newest request wins.
    pub fn apply_material(&mut self, definition: MaterialDefinition) -> Option<LoadTicket> {
        if !self.accepts("apply_material") {
            return None;
        }

        let generation = self.material_generation.advance();

        if definition.is_resolved() {
            self.activate_material(definition);
            return None;
        }

        log::info!(
            "Material '{}' has unresolved maps; loading them",
            definition.name()
        );
        Some(self.enqueue(LoadRequest::MaterialTextures { definition }, generation))
    }

    /// Fetches and parses an archive. The parsed bundle arrives as
    /// [`EngineEvent::MaterialBundleLoaded`]; nothing is bound automatically.
    pub fn load_material_archive(&mut self, path: &str) -> Option<LoadTicket> {
        if !self.accepts("load_material_archive") {
            return None;
        }

        Some(self.enqueue(
            LoadRequest::MaterialArchive {
                path: path.to_string(),
            },
            Generation::default(),
        ))
    }

    pub fn set_sun_light(&mut self, light: LightSettings) {
        self.update_lights("set_sun_light", |lights| lights.sun = light);
    }

    pub fn set_ambient_light1(&mut self, light: LightSettings) {
        self.update_lights("set_ambient_light1", |lights| lights.ambient1 = light);
    }

    pub fn set_ambient_light2(&mut self, light: LightSettings) {
        self.update_lights("set_ambient_light2", |lights| lights.ambient2 = light);
    }

    /// Switches to catalog environment `index`, applying its default orientation
    /// and exposure and reporting both back as events.
    pub fn set_environment(
        &mut self,
        index: usize,
        background_enabled: bool,
    ) -> Result<Option<LoadTicket>> {
        if !self.accepts("set_environment") {
            return Ok(None);
        }

        let definition = environment::environment(index)
            .ok_or(ViewerError::UnknownEnvironment(index))?;

        log::info!("Switching environment to '{}'", definition.name);

        self.scene.environment = EnvironmentState {
            index: Some(index),
            background_enabled,
            orientation_degrees: definition.azimuth,
            exposure: definition.exposure,
        };

        self.place_sun(definition.azimuth, definition);
        self.backend.set_exposure(definition.exposure);
        self.events
            .push_back(EngineEvent::EnvironmentOrientationResolved(definition.azimuth));
        self.events
            .push_back(EngineEvent::EnvironmentExposureResolved(definition.exposure));

        let generation = self.environment_generation.advance();
        let ticket = self.enqueue(
            LoadRequest::Environment {
                index,
                path: definition.hdr_path.to_string(),
                max_width: self.settings.environment_max_width,
            },
            generation,
        );
        self.request_render();
        Ok(Some(ticket))
    }

    pub fn set_background_enabled(&mut self, enabled: bool) {
        if !self.accepts("set_background_enabled") {
            return;
        }

        self.scene.environment.background_enabled = enabled;
        let visible = enabled && self.scene.baked_environment().is_some();
        self.backend.set_background_visible(visible);
        self.request_render();
    }

    pub fn set_environment_orientation(&mut self, index: usize, azimuth_degrees: f32) -> Result<()> {
        if !self.accepts("set_environment_orientation") {
            return Ok(());
        }

        let definition = environment::environment(index)
            .ok_or(ViewerError::UnknownEnvironment(index))?;
        self.scene.environment.orientation_degrees = azimuth_degrees;
        self.place_sun(azimuth_degrees, definition);
        self.request_render();
        Ok(())
    }

    pub fn set_environment_exposure(&mut self, exposure: f32) {
        if !self.accepts("set_environment_exposure") {
            return;
        }

        let exposure = exposure.max(0.0);
        self.scene.environment.exposure = exposure;
        self.backend.set_exposure(exposure);
        self.request_render();
    }

    /// Records a new surface size; it is applied at the start of the next render.
    pub fn resize(&mut self, width: u32, height: u32) {
        if !self.accepts("resize") {
            return;
        }

        self.pending_size = Some((width.max(1), height.max(1)));
        self.request_render();
    }

    pub fn request_render(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.scheduler.request()
    }

    pub fn attach_input(&mut self) {
        if !self.accepts("attach_input") {
            return;
        }
        if self.input.is_none() {
            self.input = Some(InputRegistration::acquire());
        }
    }

    pub fn detach_input(&mut self) {
        self.input = None;
    }

    /// Feeds orbit input. Ignored unless input is attached.
    pub fn handle_input(&mut self, input: OrbitInput) -> bool {
        if self.disposed || self.input.is_none() {
            return false;
        }
        self.orbit.handle(input);
        self.request_render();
        true
    }

    /// Runs queued loads and advances the loading indicator.
    pub fn tick(&mut self, now: Instant) {
        if self.disposed {
            return;
        }

        for completion in self.loader.pump(LOAD_STEPS_PER_TICK) {
            self.deliver_completion(completion, now);
        }

        if let Some(visible) = self.tracker.poll(now) {
            self.events
                .push_back(EngineEvent::LoadingVisibleChanged(visible));
        }
    }

    /// Applies one finished load. Results for superseded requests are dropped.
    pub fn deliver_completion(&mut self, completion: Completion, now: Instant) {
        if self.disposed {
            return;
        }

        let Completion {
            ticket,
            kind,
            generation,
            result,
        } = completion;

        self.tracker.finish(ticket, now);

        if !self.is_current(kind, generation) {
            log::debug!(
                "Discarding stale {} result (ticket {})",
                kind.label(),
                ticket.value()
            );
            return;
        }

        match result {
            Err(error) => {
                log::warn!("{} load failed: {}", kind.label(), error);
                self.events.push_back(EngineEvent::LoadFailed { kind, error });
            }
            Ok(LoadOutput::Model(model)) => self.install_model(model),
            Ok(LoadOutput::Environment { index, baked }) => self.install_environment(index, baked),
            Ok(LoadOutput::Archive(bundle)) => {
                self.events
                    .push_back(EngineEvent::MaterialBundleLoaded { ticket, bundle });
            }
            Ok(LoadOutput::Material(definition)) => self.activate_material(definition),
        }
    }

    /// Renders if a frame is scheduled. Returns whether a frame was drawn.
    pub fn render_frame(&mut self, now: Instant) -> Result<bool> {
        if self.disposed || !self.scheduler.begin_render() {
            return Ok(false);
        }

        if let Some((width, height)) = self.pending_size.take() {
            self.backend.resize(width, height);
            self.scene.camera.aspect = width as f32 / height as f32;
        }

        if self.orbit.update(&mut self.scene.camera) {
            self.scheduler.request();
        }

        for slot in self.scene.dirty_slots_mut() {
            if let Err(err) = self.backend.bind_material(slot.gpu, &slot.material) {
                log::error!("Failed to bind material to '{}': {}", slot.name, err);
            }
            slot.material.needs_update = false;
        }

        let meshes = self.scene.mesh_ids();
        self.backend.draw_scene(&self.scene.camera, &meshes)?;

        let elapsed = now.saturating_duration_since(self.started).as_secs_f32();
        if self.backend.composite(elapsed)? == FrameStatus::Skipped {
            log::debug!("Frame was not presented; rendering again");
            self.scheduler.request();
        }
        Ok(true)
    }

    /// Releases every mesh, input and the surface. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        self.input = None;
        let dropped = self.loader.clear();
        if !dropped.is_empty() {
            log::debug!("Dropped {} queued load(s) on dispose", dropped.len());
        }
        let abandoned = self.tracker.abandon_all();
        if abandoned > 0 {
            log::debug!("Abandoned {} in-flight load(s) on dispose", abandoned);
        }
        if let Some(visible) = self.tracker.take_change() {
            self.events
                .push_back(EngineEvent::LoadingVisibleChanged(visible));
        }
        self.clear_meshes();
        self.refresh_shadow();
        self.backend.release_surface();
        log::info!("Engine disposed");
    }

    // ---- queries ----

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.events.drain(..).collect()
    }

    pub fn scene(&self) -> &SceneState {
        &self.scene
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    pub fn is_render_scheduled(&self) -> bool {
        self.scheduler.is_scheduled()
    }

    pub fn loading_visible(&self) -> bool {
        self.tracker.is_visible()
    }

    pub fn has_pending_loads(&self) -> bool {
        !self.loader.is_idle()
    }

    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    // ---- internals ----

    fn accepts(&self, command: &str) -> bool {
        if self.disposed {
            log::warn!("Ignoring {} on a disposed engine", command);
        }
        !self.disposed
    }

    fn enqueue(&mut self, request: LoadRequest, generation: Generation) -> LoadTicket {
        let ticket = self.tracker.begin(request.kind());
        self.loader.enqueue(LoadJob {
            ticket,
            generation,
            request,
        });
        if let Some(visible) = self.tracker.take_change() {
            self.events
                .push_back(EngineEvent::LoadingVisibleChanged(visible));
        }
        ticket
    }

    fn is_current(&self, kind: LoadKind, generation: Generation) -> bool {
        match kind {
            LoadKind::Model => self.model_generation.is_current(generation),
            LoadKind::Environment => self.environment_generation.is_current(generation),
            LoadKind::MaterialTextures => self.material_generation.is_current(generation),
            LoadKind::MaterialArchive => true,
        }
    }

    fn clear_meshes(&mut self) {
        for slot in self.scene.take_meshes() {
            self.backend.release_mesh(slot.gpu);
        }
    }

    fn install_model(&mut self, model: ModelData) {
        self.clear_meshes();

        for mesh in &model.meshes {
            match self.backend.upload_mesh(mesh) {
                Ok(id) => self.scene.push_mesh(
                    id,
                    mesh.name.clone(),
                    mesh.bounds,
                    mesh.material.as_ref(),
                ),
                Err(err) => log::error!("Failed to upload mesh '{}': {}", mesh.name, err),
            }
        }

        log::info!(
            "Model '{}' loaded with {} mesh(es)",
            model.label,
            self.scene.mesh_count()
        );

        if let Some(slot) = self.scene.bind_active_material() {
            log::debug!("Bound cached material to mesh slot {}", slot);
        }

        if let Some(bounds) = self.scene.bounds() {
            self.orbit
                .fit_to_bounds(&mut self.scene.camera, &bounds, FIT_OFFSET);
        }
        self.refresh_shadow();

        self.request_render();
    }

    fn install_environment(&mut self, index: usize, baked: BakedEnvironment) {
        if let Err(error) = self.backend.set_environment(&baked) {
            log::error!("Failed to upload environment {}: {}", index, error);
            self.events.push_back(EngineEvent::LoadFailed {
                kind: LoadKind::Environment,
                error,
            });
            return;
        }

        self.backend
            .set_background_visible(self.scene.environment.background_enabled);
        self.scene.set_baked_environment(baked);
        self.request_render();
    }

    fn activate_material(&mut self, definition: MaterialDefinition) {
        log::info!("Activating material '{}' ({})", definition.name(), definition.id());
        self.scene.set_active_material(definition);
        match self.scene.bind_active_material() {
            Some(slot) => log::debug!("Material bound to mesh slot {}", slot),
            None => log::debug!("No mesh loaded; material cached"),
        }
        self.request_render();
    }

    fn update_lights(&mut self, command: &str, update: impl FnOnce(&mut LightRig)) {
        if !self.accepts(command) {
            return;
        }
        update(&mut self.scene.lights);
        self.backend.set_lights(&self.scene.lights);
        self.refresh_shadow();
        self.request_render();
    }

    fn place_sun(&mut self, azimuth_degrees: f32, definition: &environment::EnvironmentDefinition) {
        let space = self.settings.space_size;
        self.scene.lights.sun_position =
            environment::sun_position(definition, azimuth_degrees, space, space);
        self.backend.set_lights(&self.scene.lights);
        self.refresh_shadow();
    }

    /// Pushes the sun shadow to the backend when the meshes or the sun moved it.
    fn refresh_shadow(&mut self) {
        if !self.scene.refit_shadow() {
            return;
        }
        if let Err(err) = self.backend.set_shadow(self.scene.shadow()) {
            log::error!("Failed to update the sun shadow: {}", err);
        }
    }
}

impl<B: RenderBackend, F: ResourceFetcher> Drop for Engine<B, F> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryFetcher;
    use crate::renderer::headless::{BackendCall, HeadlessBackend};

    fn engine() -> Engine<HeadlessBackend, MemoryFetcher> {
        Engine::new(
            HeadlessBackend::new(),
            MemoryFetcher::new(),
            ViewerSettings::default(),
            Instant::now(),
        )
    }

    #[test]
    fn render_pass_runs_in_order() {
        let mut engine = engine();
        engine.resize(640, 480);
        engine.backend_mut().clear_calls();

        assert!(engine.render_frame(Instant::now()).unwrap());

        let calls = engine.backend().calls();
        assert_eq!(calls[0], BackendCall::Resize(640, 480));
        assert!(matches!(calls[1], BackendCall::DrawScene { meshes: 0 }));
        assert!(matches!(calls[2], BackendCall::Composite { .. }));
    }

    #[test]
    fn render_skipped_when_nothing_scheduled() {
        let mut engine = engine();
        let now = Instant::now();
        while engine.render_frame(now).unwrap() {}
        engine.backend_mut().clear_calls();

        assert!(!engine.render_frame(now).unwrap());
        assert!(engine.backend().calls().is_empty());
    }

    #[test]
    fn input_ignored_until_attached() {
        let mut engine = engine();
        let zoom = OrbitInput::Zoom(1.0);
        assert!(!engine.handle_input(zoom));
        engine.attach_input();
        assert!(engine.handle_input(zoom));
        engine.dispose();
        assert!(!engine.has_input());
        assert!(!engine.handle_input(zoom));
    }

    #[test]
    fn unknown_environment_is_rejected() {
        let mut engine = engine();
        assert_eq!(
            engine.set_environment(99, true).unwrap_err(),
            ViewerError::UnknownEnvironment(99)
        );
        assert!(engine.drain_events().is_empty());
    }
}
