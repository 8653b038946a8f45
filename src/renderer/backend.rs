use crate::engine::binding::SurfaceMaterial;
use crate::environment::BakedEnvironment;
use crate::error::Result;
use crate::scene::camera::Camera;
use crate::scene::lights::LightRig;
use crate::scene::model::MeshData;
use crate::scene::shadow::SunShadow;

/// Backend handle for an uploaded mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuMeshId(pub u64);

/// Outcome of presenting a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// The surface was unavailable (lost, outdated, timed out). The frame should be redrawn.
    Skipped,
}

/// Everything the engine asks of a renderer.
///
/// The engine calls these from its own thread only and never holds backend
/// objects itself, so the same engine drives a GPU or a recording backend.
pub trait RenderBackend {
    fn upload_mesh(&mut self, mesh: &MeshData) -> Result<GpuMeshId>;

    /// Frees geometry and any material resources bound to the mesh.
    fn release_mesh(&mut self, mesh: GpuMeshId);

    fn bind_material(&mut self, mesh: GpuMeshId, material: &SurfaceMaterial) -> Result<()>;

    fn set_environment(&mut self, environment: &BakedEnvironment) -> Result<()>;

    fn set_background_visible(&mut self, visible: bool);

    fn set_exposure(&mut self, exposure: f32);

    fn set_lights(&mut self, lights: &LightRig);

    /// Casts the sun's shadow onto a ground plane, or stops when `None`.
    fn set_shadow(&mut self, shadow: Option<&SunShadow>) -> Result<()>;

    fn resize(&mut self, width: u32, height: u32);

    fn draw_scene(&mut self, camera: &Camera, meshes: &[GpuMeshId]) -> Result<()>;

    /// Tone maps the scene target onto the surface and presents it.
    fn composite(&mut self, elapsed_seconds: f32) -> Result<FrameStatus>;

    /// Detaches from the window surface. Later calls may be ignored.
    fn release_surface(&mut self);
}
