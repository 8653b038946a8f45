//! Sun shadow: a light-space matrix fitted around the model and the ground
//! plane that catches the shadow.

use glam::{Mat4, Vec3, Vec4};

use crate::renderer::vertex::Vertex;
use crate::scene::model::{Bounds, MeshData};

/// Plane half-size relative to the model's widest horizontal extent.
const PLANE_SCALE: f32 = 1.5;
/// Darkness of a fully shadowed point on the plane.
pub const SHADOW_OPACITY: f32 = 0.4;
/// Room around the model's bounding sphere in the light frustum.
const FRUSTUM_MARGIN: f32 = 1.1;

/// Square ground plane directly under the model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowPlane {
    /// Middle of the plane; `y` is the model's lowest point.
    pub center: Vec3,
    pub half_extent: f32,
}

impl ShadowPlane {
    pub fn under(bounds: &Bounds) -> Self {
        let center = bounds.center();
        let size = bounds.size();
        let footprint = size.x.max(size.z).max(f32::EPSILON);
        Self {
            center: Vec3::new(center.x, bounds.min.y, center.z),
            half_extent: footprint * PLANE_SCALE,
        }
    }

    /// Two triangles facing +Y. UVs span the plane so the shader can fade its edges.
    pub fn mesh(&self) -> MeshData {
        let h = self.half_extent;
        let c = self.center;
        let corners = [
            (Vec3::new(c.x - h, c.y, c.z - h), [0.0, 0.0]),
            (Vec3::new(c.x - h, c.y, c.z + h), [0.0, 1.0]),
            (Vec3::new(c.x + h, c.y, c.z + h), [1.0, 1.0]),
            (Vec3::new(c.x + h, c.y, c.z - h), [1.0, 0.0]),
        ];
        let vertices = corners
            .iter()
            .map(|(pos, uv)| Vertex {
                pos: pos.to_array(),
                normal: [0.0, 1.0, 0.0],
                uv: *uv,
                tangent: [1.0, 0.0, 0.0, 1.0],
            })
            .collect();
        MeshData {
            name: "shadow plane".to_string(),
            vertices,
            indices: vec![0, 1, 2, 0, 2, 3],
            bounds: Bounds {
                min: Vec3::new(c.x - h, c.y, c.z - h),
                max: Vec3::new(c.x + h, c.y, c.z + h),
            },
            material: None,
        }
    }
}

/// Everything the renderer needs to draw the sun's shadow for one model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunShadow {
    pub view_proj: Mat4,
    pub plane: ShadowPlane,
    pub opacity: f32,
}

impl SunShadow {
    /// Fits an orthographic sun frustum around `bounds`. `direction` is the
    /// way the light travels.
    pub fn new(direction: Vec3, bounds: &Bounds) -> Self {
        let radius = (bounds.size().length() * 0.5).max(0.01) * FRUSTUM_MARGIN;
        Self {
            view_proj: directional_view_proj(direction, bounds.center(), radius),
            plane: ShadowPlane::under(bounds),
            opacity: SHADOW_OPACITY,
        }
    }
}

fn directional_view_proj(direction: Vec3, focus: Vec3, extent: f32) -> Mat4 {
    let direction = direction.normalize_or_zero();
    let direction = if direction == Vec3::ZERO {
        Vec3::NEG_Y
    } else {
        direction
    };
    let distance = extent * 4.0;
    let light_pos = focus - direction * distance;
    let view = Mat4::look_at_rh(light_pos, focus, shadow_up(direction));

    let (left, right, bottom, top) = (-extent, extent, -extent, extent);
    let near = 0.1_f32.min(distance * 0.5);
    let far = distance * 2.0;

    // Depth lands in 0..1 as wgpu expects.
    let projection = Mat4::from_cols(
        Vec4::new(2.0 / (right - left), 0.0, 0.0, 0.0),
        Vec4::new(0.0, 2.0 / (top - bottom), 0.0, 0.0),
        Vec4::new(0.0, 0.0, -1.0 / (far - near), 0.0),
        Vec4::new(
            -(right + left) / (right - left),
            -(top + bottom) / (top - bottom),
            -near / (far - near),
            1.0,
        ),
    );
    projection * view
}

fn shadow_up(direction: Vec3) -> Vec3 {
    if direction.abs().dot(Vec3::Y) > 0.95 {
        Vec3::Z
    } else {
        Vec3::Y
    }
}
