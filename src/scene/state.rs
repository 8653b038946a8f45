use crate::engine::binding::{target_slot, SurfaceMaterial};
use crate::environment::{BakedEnvironment, EnvironmentState};
use crate::material::MaterialDefinition;
use crate::renderer::backend::GpuMeshId;
use crate::scene::camera::Camera;
use crate::scene::lights::LightRig;
use crate::scene::model::Bounds;
use crate::scene::shadow::SunShadow;

/// One uploaded mesh and the surface currently assigned to it.
#[derive(Debug, Clone)]
pub struct MeshSlot {
    pub gpu: GpuMeshId,
    pub name: String,
    pub bounds: Bounds,
    pub material: SurfaceMaterial,
}

/// The viewer's mutable scene. Only the engine touches it.
#[derive(Debug)]
pub struct SceneState {
    pub camera: Camera,
    pub lights: LightRig,
    pub environment: EnvironmentState,
    baked_environment: Option<BakedEnvironment>,
    meshes: Vec<MeshSlot>,
    active_material: Option<MaterialDefinition>,
    shadow: Option<SunShadow>,
}

impl SceneState {
    pub fn new(space_size: f32, aspect: f32) -> Self {
        Self {
            camera: Camera::for_space(space_size, aspect),
            lights: LightRig::new(space_size),
            environment: EnvironmentState::default(),
            baked_environment: None,
            meshes: Vec::new(),
            active_material: None,
            shadow: None,
        }
    }

    pub fn meshes(&self) -> &[MeshSlot] {
        &self.meshes
    }

    pub fn mesh_ids(&self) -> Vec<GpuMeshId> {
        self.meshes.iter().map(|slot| slot.gpu).collect()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Removes every mesh; the caller releases their GPU resources.
    pub fn take_meshes(&mut self) -> Vec<MeshSlot> {
        std::mem::take(&mut self.meshes)
    }

    /// Adds a slot showing `authored` until a material is bound to it.
    pub fn push_mesh(
        &mut self,
        gpu: GpuMeshId,
        name: String,
        bounds: Bounds,
        authored: Option<&MaterialDefinition>,
    ) {
        let material = authored
            .map(SurfaceMaterial::from_definition)
            .unwrap_or_default();
        self.meshes.push(MeshSlot {
            gpu,
            name,
            bounds,
            material,
        });
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.meshes
            .iter()
            .map(|slot| slot.bounds)
            .reduce(|a, b| a.union(&b))
    }

    pub fn active_material(&self) -> Option<&MaterialDefinition> {
        self.active_material.as_ref()
    }

    pub fn set_active_material(&mut self, definition: MaterialDefinition) {
        self.active_material = Some(definition);
    }

    /// Replaces the target mesh's surface with one built from the active material.
    /// Returns the slot that was bound.
    pub fn bind_active_material(&mut self) -> Option<usize> {
        let definition = self.active_material.as_ref()?;
        let slot = target_slot(self.meshes.len())?;
        self.meshes[slot].material = SurfaceMaterial::from_definition(definition);
        Some(slot)
    }

    pub fn dirty_slots_mut(&mut self) -> impl Iterator<Item = &mut MeshSlot> + '_ {
        self.meshes
            .iter_mut()
            .filter(|slot| slot.material.needs_update)
    }

    pub fn shadow(&self) -> Option<&SunShadow> {
        self.shadow.as_ref()
    }

    /// Refits the sun shadow to the current meshes and sun. Returns true when it changed.
    pub fn refit_shadow(&mut self) -> bool {
        let shadow = match self.bounds() {
            Some(bounds) if self.lights.sun.enabled => {
                Some(SunShadow::new(self.lights.sun_direction(), &bounds))
            }
            _ => None,
        };
        let changed = shadow != self.shadow;
        self.shadow = shadow;
        changed
    }

    pub fn baked_environment(&self) -> Option<&BakedEnvironment> {
        self.baked_environment.as_ref()
    }

    pub fn set_baked_environment(&mut self, baked: BakedEnvironment) {
        self.baked_environment = Some(baked);
    }
}
