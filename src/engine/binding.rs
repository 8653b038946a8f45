// engine/binding.rs - material definitions to renderer-native surfaces
use std::sync::atomic::{AtomicBool, Ordering};

use bitflags::bitflags;
use glam::{Mat3, Vec2};

use crate::material::{Channel, MaterialDefinition, MaterialId, TextureImage, TextureSlot, WrapMode};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SurfaceFlags: u32 {
        const WIREFRAME = 1 << 0;
        const TRANSPARENT = 1 << 1;
        const HAS_ALBEDO = 1 << 2;
        const HAS_NORMAL = 1 << 3;
        const HAS_DISPLACEMENT = 1 << 4;
        const HAS_ROUGHNESS = 1 << 5;
        const HAS_METALNESS = 1 << 6;
        const HAS_ALPHA = 1 << 7;
        const HAS_AO = 1 << 8;
        const HAS_EMISSIVE = 1 << 9;
    }
}

impl SurfaceFlags {
    pub const fn for_channel(channel: Channel) -> Self {
        match channel {
            Channel::Albedo => Self::HAS_ALBEDO,
            Channel::Normal => Self::HAS_NORMAL,
            Channel::Displacement => Self::HAS_DISPLACEMENT,
            Channel::Roughness => Self::HAS_ROUGHNESS,
            Channel::Metalness => Self::HAS_METALNESS,
            Channel::Alpha => Self::HAS_ALPHA,
            Channel::AmbientOcclusion => Self::HAS_AO,
            Channel::Emissive => Self::HAS_EMISSIVE,
        }
    }
}

/// Surface parameters in the form the renderer consumes.
#[derive(Debug, Clone)]
pub struct SurfaceMaterial {
    pub material_id: MaterialId,
    pub name: String,
    /// Linear RGB plus opacity.
    pub base_color: [f32; 4],
    pub roughness: f32,
    pub metalness: f32,
    pub displacement_scale: f32,
    pub displacement_bias: f32,
    pub normal_scale: Vec2,
    pub ao_intensity: f32,
    pub emissive: [f32; 3],
    pub emissive_intensity: f32,
    pub env_intensity: f32,
    pub uv_matrix: Mat3,
    pub wrap: WrapMode,
    pub maps: [Option<TextureImage>; Channel::COUNT],
    pub flags: SurfaceFlags,
    pub needs_update: bool,
}

impl SurfaceMaterial {
    /// Builds a fresh surface. Only decoded slots are bound; unresolved paths stay unbound.
    pub fn from_definition(definition: &MaterialDefinition) -> Self {
        let scalars = definition.scalars();
        let mut flags = SurfaceFlags::empty();
        let mut maps: [Option<TextureImage>; Channel::COUNT] = Default::default();

        for channel in Channel::ALL {
            if let Some(TextureSlot::Resolved(image)) = definition.map(channel) {
                maps[channel.index()] = Some(image.clone());
                flags |= SurfaceFlags::for_channel(channel);
            }
        }

        if definition.wireframe() {
            flags |= SurfaceFlags::WIREFRAME;
        }
        if definition.transparent() || scalars.opacity < 1.0 || flags.contains(SurfaceFlags::HAS_ALPHA)
        {
            flags |= SurfaceFlags::TRANSPARENT;
        }

        let [r, g, b] = definition.base_color().to_linear();

        Self {
            material_id: definition.id(),
            name: definition.name().to_string(),
            base_color: [r, g, b, scalars.opacity],
            roughness: scalars.roughness,
            metalness: scalars.metalness,
            displacement_scale: scalars.displacement_scale,
            displacement_bias: scalars.displacement_bias,
            normal_scale: scalars.normal_scale,
            ao_intensity: scalars.ao_intensity,
            emissive: scalars.emissive.to_linear(),
            emissive_intensity: scalars.emissive_intensity,
            env_intensity: scalars.env_intensity,
            uv_matrix: definition.uv().matrix(),
            wrap: definition.uv().wrap_mode(),
            maps,
            flags,
            needs_update: true,
        }
    }

    pub fn map(&self, channel: Channel) -> Option<&TextureImage> {
        self.maps[channel.index()].as_ref()
    }

    pub fn bound_channels(&self) -> impl Iterator<Item = Channel> + '_ {
        Channel::ALL
            .into_iter()
            .filter(|channel| self.maps[channel.index()].is_some())
    }
}

impl Default for SurfaceMaterial {
    fn default() -> Self {
        Self::from_definition(&MaterialDefinition::default_constant())
    }
}

static WIDE_MODEL_NOTED: AtomicBool = AtomicBool::new(false);

/// Which mesh receives the active material.
///
/// One mesh binds to itself. Two meshes follow the front/back modelling convention and
/// bind to the back slot (index 1). Larger models bind to the first mesh.
pub fn target_slot(mesh_count: usize) -> Option<usize> {
    match mesh_count {
        0 => None,
        1 => Some(0),
        2 => Some(1),
        _ => {
            if !WIDE_MODEL_NOTED.swap(true, Ordering::Relaxed) {
                log::debug!(
                    "Model has {} meshes; binding material to the first mesh",
                    mesh_count
                );
            }
            Some(0)
        }
    }
}
