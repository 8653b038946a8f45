mod common;

use std::time::{Duration, Instant};

use common::{drain_loads, headless_engine, png, tinted_triangle_glb, triangle_glb, zip_archive};
use u3m_viewer::engine::EngineEvent;
use u3m_viewer::environment::ENVIRONMENT_CATALOG;
use u3m_viewer::io::MemoryFetcher;
use u3m_viewer::loading::LoadKind;
use u3m_viewer::material::{Channel, MaterialDefinition, MaterialSource, TextureSlot};
use u3m_viewer::renderer::{BackendCall, GpuMeshId};
use u3m_viewer::scene::camera::OrbitInput;
use u3m_viewer::ViewerError;

const SETTLE: Duration = Duration::from_millis(600);

fn visibility_changes(events: &[EngineEvent]) -> Vec<bool> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::LoadingVisibleChanged(visible) => Some(*visible),
            _ => None,
        })
        .collect()
}

fn archive() -> Vec<u8> {
    zip_archive(&[(
        "wool.u3m",
        br#"{"material":{"name":"Wool","front":{"basecolor":{"constant":[1,0,0]}}}}"#,
    )])
}

#[test]
fn indicator_waits_for_concurrent_loads_then_settles_once() {
    let start = Instant::now();
    let fetcher = MemoryFetcher::new()
        .with("wool.u3ma", archive())
        .with("rib.glb", triangle_glb(1));
    let mut engine = headless_engine(fetcher, start);

    engine.load_material_archive("wool.u3ma");
    engine.load_model("rib.glb");
    let mut events = engine.drain_events();
    assert_eq!(visibility_changes(&events), vec![true]);

    engine.tick(start);
    events.extend(engine.drain_events());
    assert!(engine.loading_visible());
    assert_eq!(visibility_changes(&events), vec![true]);

    let done = start + Duration::from_millis(10);
    drain_loads(&mut engine, done);
    engine.tick(done + SETTLE - Duration::from_millis(1));
    events.extend(engine.drain_events());
    assert!(engine.loading_visible());
    assert_eq!(visibility_changes(&events), vec![true]);

    engine.tick(done + SETTLE);
    engine.tick(done + SETTLE * 3);
    events.extend(engine.drain_events());
    assert!(!engine.loading_visible());
    assert_eq!(visibility_changes(&events), vec![true, false]);
    assert!(events
        .iter()
        .any(|event| matches!(event, EngineEvent::MaterialBundleLoaded { .. })));
    assert_eq!(engine.scene().mesh_count(), 1);
}

#[test]
fn new_load_before_settle_keeps_indicator_visible() {
    let start = Instant::now();
    let fetcher = MemoryFetcher::new().with("rib.glb", triangle_glb(1));
    let mut engine = headless_engine(fetcher, start);

    engine.load_model("rib.glb");
    drain_loads(&mut engine, start);
    engine.load_model("rib.glb");
    drain_loads(&mut engine, start + SETTLE);
    assert!(engine.loading_visible());

    engine.tick(start + SETTLE * 2);
    let events = engine.drain_events();
    assert_eq!(visibility_changes(&events), vec![true, false]);
}

#[test]
fn failed_load_reports_and_still_clears_indicator() {
    let start = Instant::now();
    let mut engine = headless_engine(MemoryFetcher::new(), start);

    engine.load_model("missing.glb");
    engine.tick(start);
    engine.tick(start + SETTLE);

    let events = engine.drain_events();
    assert!(events.iter().any(|event| matches!(
        event,
        EngineEvent::LoadFailed {
            kind: LoadKind::Model,
            error: ViewerError::NetworkFailure { .. }
        }
    )));
    assert_eq!(visibility_changes(&events), vec![true, false]);
}

#[test]
fn disposing_twice_releases_everything_once() {
    let start = Instant::now();
    let fetcher = MemoryFetcher::new().with("pair.glb", triangle_glb(2));
    let mut engine = headless_engine(fetcher, start);
    engine.attach_input();
    engine.load_model("pair.glb");
    drain_loads(&mut engine, start);
    assert_eq!(engine.backend().live_meshes(), 2);

    engine.load_model("pair.glb");
    assert!(engine.loading_visible());
    engine.drain_events();

    engine.dispose();
    engine.dispose();

    assert!(!engine.loading_visible());
    assert_eq!(visibility_changes(&engine.drain_events()), vec![false]);

    let backend = engine.backend();
    assert_eq!(backend.live_meshes(), 0);
    assert_eq!(backend.released_meshes(), 2);
    assert_eq!(backend.double_releases(), 0);
    assert!(backend.surface_released());
    assert_eq!(
        backend
            .calls()
            .iter()
            .filter(|call| **call == BackendCall::ReleaseSurface)
            .count(),
        1
    );
    assert!(engine.is_disposed());
    assert!(!engine.has_input());
    assert!(engine.load_model("pair.glb").is_none());
    assert!(!engine.handle_input(OrbitInput::Zoom(1.0)));
}

#[test]
fn orientation_moves_sun_around_the_vertical_axis() {
    let mut engine = headless_engine(MemoryFetcher::new(), Instant::now());
    let zenith = ENVIRONMENT_CATALOG[0].zenith;
    let radius = zenith.to_radians().cos() * engine.settings().space_size;

    engine.set_environment_orientation(0, 90.0).unwrap();
    let sun = engine.scene().lights.sun_position;
    assert!((sun.x - radius).abs() < 1e-5);
    assert!(sun.z.abs() < 1e-5);

    engine.set_environment_orientation(0, 0.0).unwrap();
    let sun = engine.scene().lights.sun_position;
    assert!(sun.x.abs() < 1e-5);
    assert!((sun.z - radius).abs() < 1e-5);

    assert_eq!(
        engine.set_environment_orientation(42, 0.0),
        Err(ViewerError::UnknownEnvironment(42))
    );
}

#[test]
fn environment_switch_reports_catalog_defaults() {
    let start = Instant::now();
    let studio = &ENVIRONMENT_CATALOG[0];
    let fetcher = MemoryFetcher::new().with(studio.hdr_path, png(64, 32, [128, 128, 128, 255]));
    let mut engine = headless_engine(fetcher, start);

    engine.set_environment(0, true).unwrap();
    let events = engine.drain_events();
    assert!(events.iter().any(|event| matches!(
        event,
        EngineEvent::EnvironmentOrientationResolved(azimuth) if *azimuth == studio.azimuth
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        EngineEvent::EnvironmentExposureResolved(exposure) if *exposure == studio.exposure
    )));

    drain_loads(&mut engine, start);
    assert!(engine.scene().baked_environment().is_some());
    assert!(engine.backend().background_visible());
    assert_eq!(engine.backend().exposure(), studio.exposure);

    engine.set_background_enabled(false);
    assert!(!engine.backend().background_visible());
}

#[test]
fn newest_material_wins_when_textures_race() {
    let start = Instant::now();
    let fetcher = MemoryFetcher::new()
        .with("rib.glb", triangle_glb(1))
        .with("maps/red.png", png(2, 2, [255, 0, 0, 255]))
        .with("maps/blue.png", png(2, 2, [0, 0, 255, 255]));
    let mut engine = headless_engine(fetcher, start);
    engine.load_model("rib.glb");
    drain_loads(&mut engine, start);

    let first = MaterialDefinition::new("Red", MaterialSource::Procedural)
        .with_map(Channel::Albedo, TextureSlot::from_path("maps/red.png"));
    let second = MaterialDefinition::new("Blue", MaterialSource::Procedural)
        .with_map(Channel::Albedo, TextureSlot::from_path("maps/blue.png"));
    let second_id = second.id();

    assert!(engine.apply_material(first).is_some());
    assert!(engine.apply_material(second).is_some());
    drain_loads(&mut engine, start);
    engine.render_frame(start).unwrap();

    let slot = &engine.scene().meshes()[0];
    assert_eq!(slot.material.material_id, second_id);
    assert!(slot.material.map(Channel::Albedo).is_some());
    assert_eq!(engine.backend().bound_material(slot.gpu), Some(second_id));
    assert_eq!(engine.scene().active_material().map(|m| m.id()), Some(second_id));
}

#[test]
fn two_mesh_models_bind_the_back_slot() {
    let start = Instant::now();
    let fetcher = MemoryFetcher::new().with("pair.glb", triangle_glb(2));
    let mut engine = headless_engine(fetcher, start);

    let material = MaterialDefinition::default_constant();
    let id = material.id();
    engine.apply_material(material);
    engine.load_model("pair.glb");
    drain_loads(&mut engine, start);
    engine.render_frame(start).unwrap();

    let meshes = engine.scene().meshes();
    assert_eq!(meshes.len(), 2);
    assert_eq!(meshes[1].material.material_id, id);
    assert_ne!(meshes[0].material.material_id, id);
}

#[test]
fn front_mesh_keeps_its_authored_material() {
    let start = Instant::now();
    let fetcher =
        MemoryFetcher::new().with("painted.glb", tinted_triangle_glb(2, Some([1.0, 0.0, 0.0, 1.0])));
    let mut engine = headless_engine(fetcher, start);

    engine.load_model("painted.glb");
    drain_loads(&mut engine, start);
    let authored = engine.scene().meshes()[0].material.material_id;
    assert_eq!(engine.scene().meshes()[0].material.base_color, [1.0, 0.0, 0.0, 1.0]);
    assert_eq!(engine.scene().meshes()[1].material.base_color, [1.0, 0.0, 0.0, 1.0]);

    let fabric = MaterialDefinition::default_constant();
    let fabric_id = fabric.id();
    engine.apply_material(fabric);
    engine.render_frame(start).unwrap();

    let meshes = engine.scene().meshes();
    assert_eq!(meshes[0].material.base_color, [1.0, 0.0, 0.0, 1.0]);
    assert_eq!(meshes[0].material.material_id, authored);
    assert_eq!(meshes[1].material.material_id, fabric_id);
    assert_eq!(meshes[1].material.base_color, [1.0, 1.0, 1.0, 1.0]);
    assert_eq!(engine.backend().bound_material(meshes[0].gpu), Some(authored));
    assert_eq!(engine.backend().bound_material(meshes[1].gpu), Some(fabric_id));
}

#[test]
fn model_reload_releases_previous_meshes_first() {
    let start = Instant::now();
    let fetcher = MemoryFetcher::new()
        .with("one.glb", triangle_glb(1))
        .with("pair.glb", triangle_glb(2));
    let mut engine = headless_engine(fetcher, start);

    engine.load_model("one.glb");
    drain_loads(&mut engine, start);
    engine.load_model("pair.glb");
    assert_eq!(engine.backend().live_meshes(), 0);
    drain_loads(&mut engine, start);

    assert_eq!(engine.backend().live_meshes(), 2);
    assert_eq!(engine.backend().released_meshes(), 1);
}

#[test]
fn superseded_model_load_is_discarded() {
    let start = Instant::now();
    let fetcher = MemoryFetcher::new()
        .with("one.glb", triangle_glb(1))
        .with("pair.glb", triangle_glb(2));
    let mut engine = headless_engine(fetcher, start);

    engine.load_model("one.glb");
    engine.load_model("pair.glb");
    drain_loads(&mut engine, start);

    assert_eq!(engine.scene().mesh_count(), 2);
    assert_eq!(engine.backend().live_meshes(), 2);
}

#[test]
fn builtin_sphere_loads_without_assets() {
    let start = Instant::now();
    let mut engine = headless_engine(MemoryFetcher::new(), start);

    engine.load_model(u3m_viewer::scene::ModelSource::Sphere);
    drain_loads(&mut engine, start);

    assert_eq!(engine.scene().mesh_count(), 1);
    assert_eq!(engine.scene().meshes()[0].gpu, GpuMeshId(1));
}

#[test]
fn render_flushes_bindings_between_draw_steps() {
    let start = Instant::now();
    let fetcher = MemoryFetcher::new().with("one.glb", triangle_glb(1));
    let mut engine = headless_engine(fetcher, start);
    engine.load_model("one.glb");
    drain_loads(&mut engine, start);
    engine.resize(800, 600);
    engine.backend_mut().clear_calls();

    assert!(engine.render_frame(start + Duration::from_secs(2)).unwrap());

    let calls = engine.backend().calls();
    assert_eq!(calls[0], BackendCall::Resize(800, 600));
    assert!(matches!(calls[1], BackendCall::BindMaterial { .. }));
    assert_eq!(calls[2], BackendCall::DrawScene { meshes: 1 });
    assert!(matches!(calls[3], BackendCall::Composite { elapsed } if elapsed >= 2.0));
    assert_eq!(calls.len(), 4);
}

#[test]
fn mutations_collapse_into_one_frame() {
    let start = Instant::now();
    let mut engine = headless_engine(MemoryFetcher::new(), start);
    while engine.render_frame(start).unwrap() {}

    engine.set_environment_exposure(1.5);
    engine.request_render();
    engine.set_background_enabled(true);

    assert!(engine.render_frame(start).unwrap());
    assert!(!engine.render_frame(start).unwrap());
}

#[test]
fn skipped_frame_is_rendered_again() {
    let start = Instant::now();
    let mut engine = headless_engine(MemoryFetcher::new(), start);
    while engine.render_frame(start).unwrap() {}

    engine.backend_mut().skip_next_frames(1);
    engine.request_render();
    assert!(engine.render_frame(start).unwrap());
    assert!(engine.is_render_scheduled());

    assert!(engine.render_frame(start).unwrap());
    assert!(!engine.is_render_scheduled());
    assert!(!engine.render_frame(start).unwrap());
}

#[test]
fn shadow_plane_follows_the_loaded_model() {
    let start = Instant::now();
    let fetcher = MemoryFetcher::new()
        .with("one.glb", triangle_glb(1))
        .with("pair.glb", triangle_glb(2));
    let mut engine = headless_engine(fetcher, start);
    assert!(engine.backend().shadow().is_none());

    engine.load_model("one.glb");
    drain_loads(&mut engine, start);
    let bounds = engine.scene().bounds().unwrap();
    let shadow = *engine.backend().shadow().expect("shadow after load");
    assert_eq!(shadow.plane.center.y, bounds.min.y);
    assert_eq!(shadow.plane.center.x, bounds.center().x);
    assert_eq!(Some(&shadow), engine.scene().shadow());

    engine.load_model("pair.glb");
    assert!(engine.backend().shadow().is_none(), "cleared with the old meshes");
    drain_loads(&mut engine, start);
    let wider = *engine.backend().shadow().expect("shadow after second load");
    let bounds = engine.scene().bounds().unwrap();
    assert_eq!(wider.plane.center.x, bounds.center().x);
    assert!(wider.plane.center.x > shadow.plane.center.x);
    assert!(wider.plane.half_extent > shadow.plane.half_extent);

    let mut sun = engine.scene().lights.sun;
    sun.enabled = false;
    engine.set_sun_light(sun);
    assert!(engine.backend().shadow().is_none());
    assert!(engine
        .backend()
        .calls()
        .contains(&BackendCall::SetShadow(false)));
}
