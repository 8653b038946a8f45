// renderer/uniforms.rs
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::engine::binding::SurfaceMaterial;
use crate::scene::camera::Camera;
use crate::scene::lights::LightRig;
use crate::scene::shadow::SunShadow;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub inverse_view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 3],
    pub _padding: f32,
}

impl CameraUniform {
    pub fn from_camera(camera: &Camera) -> Self {
        let view_proj = camera.view_proj();
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            inverse_view_proj: view_proj.inverse().to_cols_array_2d(),
            camera_pos: camera.position().to_array(),
            _padding: 0.0,
        }
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self {
            view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            inverse_view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            camera_pos: [0.0; 3],
            _padding: 0.0,
        }
    }
}

/// Sun plus the two ambient fills, pre-multiplied by intensity.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct LightsUniform {
    /// xyz direction the light travels, w unused
    pub sun_direction: [f32; 4],
    pub sun_radiance: [f32; 4],
    pub ambient: [f32; 4],
}

impl LightsUniform {
    pub fn from_rig(rig: &LightRig) -> Self {
        let direction = rig.sun_direction();
        let sun = rig.sun.radiance();
        let ambient = rig.ambient1.radiance() + rig.ambient2.radiance();
        Self {
            sun_direction: direction.extend(0.0).to_array(),
            sun_radiance: sun.extend(0.0).to_array(),
            ambient: ambient.extend(0.0).to_array(),
        }
    }
}

/// Environment and tone mapping parameters for one frame.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct FrameUniform {
    /// x: environment present, y: background visible, z: radiance max lod, w: elapsed seconds
    pub environment: [f32; 4],
    /// x: exposure, y: surface needs manual sRGB encoding, zw unused
    pub tone: [f32; 4],
    pub clear_color: [f32; 4],
}

impl Default for FrameUniform {
    fn default() -> Self {
        Self {
            environment: [0.0, 0.0, 0.0, 0.0],
            tone: [1.0, 0.0, 0.0, 0.0],
            clear_color: [0.18, 0.18, 0.2, 1.0],
        }
    }
}

/// Sun light-space transform. The depth pass and the shading passes share it.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct ShadowUniform {
    pub view_proj: [[f32; 4]; 4],
    /// x: enabled, y: catcher opacity, z: shadow map texel size, w unused
    pub params: [f32; 4],
}

impl ShadowUniform {
    pub fn new(shadow: Option<&SunShadow>, map_size: u32) -> Self {
        let texel = 1.0 / map_size.max(1) as f32;
        match shadow {
            Some(shadow) => Self {
                view_proj: shadow.view_proj.to_cols_array_2d(),
                params: [1.0, shadow.opacity, texel, 0.0],
            },
            None => Self {
                view_proj: Mat4::IDENTITY.to_cols_array_2d(),
                params: [0.0, 0.0, texel, 0.0],
            },
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct MaterialUniform {
    pub base_color: [f32; 4],
    /// rgb emissive, a emissive intensity
    pub emissive: [f32; 4],
    /// roughness, metalness, ao intensity, env intensity
    pub factors: [f32; 4],
    /// displacement scale, displacement bias, normal scale x, normal scale y
    pub detail: [f32; 4],
    /// UV matrix columns, padded to vec4 for WGSL mat3x3 layout
    pub uv_matrix: [[f32; 4]; 3],
    pub flags: u32,
    pub _padding: [u32; 3],
}

impl MaterialUniform {
    pub fn from_surface(surface: &SurfaceMaterial) -> Self {
        let uv = surface.uv_matrix;
        let emissive = Vec3::from(surface.emissive);
        Self {
            base_color: surface.base_color,
            emissive: emissive.extend(surface.emissive_intensity).to_array(),
            factors: [
                surface.roughness,
                surface.metalness,
                surface.ao_intensity,
                surface.env_intensity,
            ],
            detail: [
                surface.displacement_scale,
                surface.displacement_bias,
                surface.normal_scale.x,
                surface.normal_scale.y,
            ],
            uv_matrix: [
                uv.x_axis.extend(0.0).to_array(),
                uv.y_axis.extend(0.0).to_array(),
                uv.z_axis.extend(0.0).to_array(),
            ],
            flags: surface.flags.bits(),
            _padding: [0; 3],
        }
    }
}
