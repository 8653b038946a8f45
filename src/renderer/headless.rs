use std::collections::HashSet;

use crate::engine::binding::SurfaceMaterial;
use crate::environment::BakedEnvironment;
use crate::error::{Result, ViewerError};
use crate::material::MaterialId;
use crate::renderer::backend::{FrameStatus, GpuMeshId, RenderBackend};
use crate::scene::camera::Camera;
use crate::scene::lights::LightRig;
use crate::scene::model::MeshData;
use crate::scene::shadow::SunShadow;

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    UploadMesh(GpuMeshId),
    ReleaseMesh(GpuMeshId),
    BindMaterial {
        mesh: GpuMeshId,
        material: MaterialId,
    },
    SetEnvironment(String),
    SetBackgroundVisible(bool),
    SetExposure(f32),
    SetLights,
    SetShadow(bool),
    Resize(u32, u32),
    DrawScene {
        meshes: usize,
    },
    Composite {
        elapsed: f32,
    },
    ReleaseSurface,
}

/// Renderer that records calls instead of drawing. Runs without a GPU.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_mesh: u64,
    live: HashSet<GpuMeshId>,
    calls: Vec<BackendCall>,
    released: usize,
    double_releases: usize,
    surface_released: bool,
    bound: Vec<(GpuMeshId, MaterialId)>,
    lights: Option<LightRig>,
    shadow: Option<SunShadow>,
    exposure: f32,
    background_visible: bool,
    size: (u32, u32),
    frames_to_skip: usize,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            exposure: 1.0,
            ..Self::default()
        }
    }

    /// Makes the next `count` composites report a lost surface.
    pub fn skip_next_frames(&mut self, count: usize) {
        self.frames_to_skip = count;
    }

    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn live_meshes(&self) -> usize {
        self.live.len()
    }

    pub fn released_meshes(&self) -> usize {
        self.released
    }

    pub fn double_releases(&self) -> usize {
        self.double_releases
    }

    pub fn surface_released(&self) -> bool {
        self.surface_released
    }

    /// Material most recently bound to `mesh`.
    pub fn bound_material(&self, mesh: GpuMeshId) -> Option<MaterialId> {
        self.bound
            .iter()
            .rev()
            .find(|(id, _)| *id == mesh)
            .map(|(_, material)| *material)
    }

    pub fn lights(&self) -> Option<&LightRig> {
        self.lights.as_ref()
    }

    pub fn shadow(&self) -> Option<&SunShadow> {
        self.shadow.as_ref()
    }

    pub fn exposure(&self) -> f32 {
        self.exposure
    }

    pub fn background_visible(&self) -> bool {
        self.background_visible
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}

impl RenderBackend for HeadlessBackend {
    fn upload_mesh(&mut self, mesh: &MeshData) -> Result<GpuMeshId> {
        if mesh.vertices.is_empty() {
            return Err(ViewerError::ModelInvalid {
                reason: format!("mesh '{}' has no vertices", mesh.name),
            });
        }
        self.next_mesh += 1;
        let id = GpuMeshId(self.next_mesh);
        self.live.insert(id);
        self.calls.push(BackendCall::UploadMesh(id));
        Ok(id)
    }

    fn release_mesh(&mut self, mesh: GpuMeshId) {
        if self.live.remove(&mesh) {
            self.released += 1;
            self.bound.retain(|(id, _)| *id != mesh);
        } else {
            self.double_releases += 1;
        }
        self.calls.push(BackendCall::ReleaseMesh(mesh));
    }

    fn bind_material(&mut self, mesh: GpuMeshId, material: &SurfaceMaterial) -> Result<()> {
        if !self.live.contains(&mesh) {
            return Err(ViewerError::Gpu(format!("mesh {:?} is not live", mesh)));
        }
        self.bound.push((mesh, material.material_id));
        self.calls.push(BackendCall::BindMaterial {
            mesh,
            material: material.material_id,
        });
        Ok(())
    }

    fn set_environment(&mut self, environment: &BakedEnvironment) -> Result<()> {
        self.calls
            .push(BackendCall::SetEnvironment(environment.label.clone()));
        Ok(())
    }

    fn set_background_visible(&mut self, visible: bool) {
        self.background_visible = visible;
        self.calls.push(BackendCall::SetBackgroundVisible(visible));
    }

    fn set_exposure(&mut self, exposure: f32) {
        self.exposure = exposure;
        self.calls.push(BackendCall::SetExposure(exposure));
    }

    fn set_lights(&mut self, lights: &LightRig) {
        self.lights = Some(*lights);
        self.calls.push(BackendCall::SetLights);
    }

    fn set_shadow(&mut self, shadow: Option<&SunShadow>) -> Result<()> {
        self.shadow = shadow.copied();
        self.calls.push(BackendCall::SetShadow(shadow.is_some()));
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.calls.push(BackendCall::Resize(width, height));
    }

    fn draw_scene(&mut self, _camera: &Camera, meshes: &[GpuMeshId]) -> Result<()> {
        self.calls.push(BackendCall::DrawScene {
            meshes: meshes.len(),
        });
        Ok(())
    }

    fn composite(&mut self, elapsed_seconds: f32) -> Result<FrameStatus> {
        self.calls.push(BackendCall::Composite {
            elapsed: elapsed_seconds,
        });
        if self.frames_to_skip > 0 {
            self.frames_to_skip -= 1;
            return Ok(FrameStatus::Skipped);
        }
        Ok(FrameStatus::Presented)
    }

    fn release_surface(&mut self) {
        self.surface_released = true;
        self.calls.push(BackendCall::ReleaseSurface);
    }
}
