// scene/model.rs - glTF/GLB import into flat, world-space meshes
use std::f32::consts::PI;

use glam::{Mat4, Vec2, Vec3};
use image::RgbaImage;

use crate::error::{Result, ViewerError};
use crate::material::{
    Channel, Color, MaterialDefinition, MaterialSource, TextureImage, TextureSlot, UvTransform,
};
use crate::renderer::vertex::Vertex;

/// Axis-aligned bounds in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        Some(iter.fold(
            Bounds {
                min: first,
                max: first,
            },
            |bounds, p| Bounds {
                min: bounds.min.min(p),
                max: bounds.max.max(p),
            },
        ))
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

/// One drawable primitive with node transforms already applied.
#[derive(Debug, Clone)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub bounds: Bounds,
    /// Surface authored in the model file. `None` renders with the default material.
    pub material: Option<MaterialDefinition>,
}

#[derive(Debug, Clone)]
pub struct ModelData {
    pub label: String,
    pub meshes: Vec<MeshData>,
    pub bounds: Bounds,
}

/// Where a model's geometry comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// A `.gltf`/`.glb` resource fetched by path.
    File(String),
    /// The built-in UV sphere, available without any asset files.
    Sphere,
}

impl ModelSource {
    pub fn label(&self) -> &str {
        match self {
            ModelSource::File(path) => path,
            ModelSource::Sphere => "builtin sphere",
        }
    }
}

impl From<&str> for ModelSource {
    fn from(path: &str) -> Self {
        ModelSource::File(path.to_string())
    }
}

impl From<String> for ModelSource {
    fn from(path: String) -> Self {
        ModelSource::File(path)
    }
}

/// A unit-diameter UV sphere centred on the origin.
pub fn sphere_model(segments: u32, rings: u32) -> ModelData {
    let segments = segments.max(3);
    let rings = rings.max(2);
    let radius = 0.5;
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for ring in 0..=rings {
        let phi = PI * ring as f32 / rings as f32;
        let y = phi.cos();
        let ring_radius = phi.sin();

        for segment in 0..=segments {
            let theta = 2.0 * PI * segment as f32 / segments as f32;
            let normal = [ring_radius * theta.cos(), y, ring_radius * theta.sin()];

            vertices.push(Vertex {
                pos: normal.map(|c| c * radius),
                normal,
                uv: [segment as f32 / segments as f32, ring as f32 / rings as f32],
                tangent: [-theta.sin(), 0.0, theta.cos(), 1.0],
            });
        }
    }

    for ring in 0..rings {
        for segment in 0..segments {
            let current = ring * (segments + 1) + segment;
            let next = current + segments + 1;

            indices.extend_from_slice(&[current, next, current + 1]);
            indices.extend_from_slice(&[current + 1, next, next + 1]);
        }
    }

    let bounds = Bounds {
        min: Vec3::splat(-radius),
        max: Vec3::splat(radius),
    };
    ModelData {
        label: ModelSource::Sphere.label().to_string(),
        meshes: vec![MeshData {
            name: "sphere".to_string(),
            vertices,
            indices,
            bounds,
            material: None,
        }],
        bounds,
    }
}

/// Imports a `.gltf` (with embedded buffers) or `.glb` payload.
///
/// Every mesh primitive reachable from the default scene becomes one [`MeshData`],
/// in traversal order.
pub fn import_model(bytes: &[u8], label: &str) -> Result<ModelData> {
    let (document, buffers, images) =
        gltf::import_slice(bytes).map_err(|err| ViewerError::ModelInvalid {
            reason: format!("{}: {}", label, err),
        })?;

    log::info!(
        "Importing model '{}': {} meshes, {} nodes",
        label,
        document.meshes().len(),
        document.nodes().len()
    );

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| ViewerError::ModelInvalid {
            reason: format!("{}: document has no scene", label),
        })?;

    let images = decode_images(&images, label);
    let sources = Sources {
        buffers: &buffers,
        images: &images,
    };

    let mut meshes = Vec::new();
    for node in scene.nodes() {
        collect_node(&node, Mat4::IDENTITY, &sources, &mut meshes);
    }

    let bounds = meshes
        .iter()
        .map(|mesh| mesh.bounds)
        .reduce(|a, b| a.union(&b))
        .ok_or_else(|| ViewerError::ModelInvalid {
            reason: format!("{}: no drawable meshes", label),
        })?;

    Ok(ModelData {
        label: label.to_string(),
        meshes,
        bounds,
    })
}

/// Imported binary data a primitive can refer to.
struct Sources<'a> {
    buffers: &'a [gltf::buffer::Data],
    images: &'a [Option<TextureImage>],
}

fn collect_node(node: &gltf::Node, parent: Mat4, sources: &Sources, out: &mut Vec<MeshData>) {
    let local = Mat4::from_cols_array_2d(&node.transform().matrix());
    let world = parent * local;

    if let Some(mesh) = node.mesh() {
        let base_name = mesh
            .name()
            .or_else(|| node.name())
            .unwrap_or("mesh")
            .to_string();

        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!(
                    "  Skipping primitive {} of '{}': mode {:?} is not triangles",
                    primitive.index(),
                    base_name,
                    primitive.mode()
                );
                continue;
            }

            match load_primitive(&primitive, sources.buffers, world) {
                Some((vertices, indices)) => {
                    let bounds = Bounds::from_points(vertices.iter().map(|v| Vec3::from(v.pos)));
                    if let Some(bounds) = bounds {
                        out.push(MeshData {
                            name: format!("{}_{}", base_name, primitive.index()),
                            vertices,
                            indices,
                            bounds,
                            material: authored_material(&primitive.material(), sources.images),
                        });
                    }
                }
                None => log::warn!(
                    "  Skipping primitive {} of '{}': missing positions",
                    primitive.index(),
                    base_name
                ),
            }
        }
    }

    for child in node.children() {
        collect_node(&child, world, sources, out);
    }
}

/// Converts the document's images once so primitives sharing one share the pixels.
fn decode_images(images: &[gltf::image::Data], label: &str) -> Vec<Option<TextureImage>> {
    images
        .iter()
        .enumerate()
        .map(|(index, data)| {
            let image = rgba_image(data);
            if image.is_none() {
                log::warn!(
                    "  Ignoring image {} of '{}': unsupported format {:?}",
                    index,
                    label,
                    data.format
                );
            }
            image.map(|image| TextureImage::from_image(image, &format!("{}#image{}", label, index)))
        })
        .collect()
}

fn rgba_image(data: &gltf::image::Data) -> Option<RgbaImage> {
    use gltf::image::Format;

    let pixels: Vec<u8> = match data.format {
        Format::R8G8B8A8 => data.pixels.clone(),
        Format::R8G8B8 => data
            .pixels
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        Format::R8G8 => data
            .pixels
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[1], 0, 255])
            .collect(),
        Format::R8 => data.pixels.iter().flat_map(|&v| [v, v, v, 255]).collect(),
        _ => return None,
    };
    RgbaImage::from_raw(data.width, data.height, pixels)
}

/// The primitive's metallic-roughness material. The glTF default material
/// (no index) yields `None`.
fn authored_material(
    material: &gltf::Material,
    images: &[Option<TextureImage>],
) -> Option<MaterialDefinition> {
    let index = material.index()?;
    let texture = |texture: gltf::Texture| -> Option<TextureSlot> {
        let image = images.get(texture.source().index())?.clone()?;
        Some(TextureSlot::Resolved(image))
    };

    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, alpha] = pbr.base_color_factor();
    let blended = material.alpha_mode() == gltf::material::AlphaMode::Blend;
    // Roughness lives in G and metalness in B of the same texture; the shader reads those channels.
    let metallic_roughness = pbr
        .metallic_roughness_texture()
        .and_then(|info| texture(info.texture()));
    let normal = material.normal_texture();
    let occlusion = material.occlusion_texture();

    let name = material
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("material_{}", index));

    let definition = MaterialDefinition::new(name, MaterialSource::Model)
        .with_base_color(Color::from_linear_rgb([r, g, b]))
        .with_transparent(blended)
        .with_map(
            Channel::Albedo,
            pbr.base_color_texture().and_then(|info| texture(info.texture())),
        )
        .with_map(Channel::Roughness, metallic_roughness.clone())
        .with_map(Channel::Metalness, metallic_roughness)
        .with_map(
            Channel::Normal,
            normal.as_ref().and_then(|info| texture(info.texture())),
        )
        .with_map(
            Channel::AmbientOcclusion,
            occlusion.as_ref().and_then(|info| texture(info.texture())),
        )
        .with_map(
            Channel::Emissive,
            material.emissive_texture().and_then(|info| texture(info.texture())),
        )
        .with_scalars(|scalars| {
            scalars.roughness = pbr.roughness_factor();
            scalars.metalness = pbr.metallic_factor();
            scalars.opacity = if blended { alpha } else { 1.0 };
            scalars.emissive = Color::from_linear_rgb(material.emissive_factor());
            if let Some(normal) = &normal {
                scalars.normal_scale = Vec2::splat(normal.scale());
            }
            if let Some(occlusion) = &occlusion {
                scalars.ao_intensity = occlusion.strength();
            }
        });

    // glTF samplers wrap by default.
    let has_maps = Channel::ALL.into_iter().any(|channel| definition.has_map(channel));
    if has_maps {
        Some(definition.with_uv(UvTransform {
            repeat: Some(Vec2::ONE),
            ..UvTransform::default()
        }))
    } else {
        Some(definition)
    }
}

fn load_primitive(
    primitive: &gltf::Primitive,
    buffers: &[gltf::buffer::Data],
    world: Mat4,
) -> Option<(Vec<Vertex>, Vec<u32>)> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data.0[..]));

    let positions = reader.read_positions()?.collect::<Vec<_>>();

    let indices = reader
        .read_indices()
        .map(|indices| indices.into_u32().collect::<Vec<_>>())
        .unwrap_or_else(|| (0..positions.len() as u32).collect());

    if indices.iter().any(|&i| i as usize >= positions.len()) {
        log::warn!("  Primitive {} has out-of-range indices", primitive.index());
        return None;
    }

    let normals = reader
        .read_normals()
        .map(|n| n.collect::<Vec<_>>())
        .unwrap_or_else(|| {
            log::debug!("    No normals in glTF, generating them");
            generate_normals(&positions, &indices)
        });

    let uvs = reader
        .read_tex_coords(0)
        .map(|uv| uv.into_f32().collect::<Vec<_>>())
        .unwrap_or_else(|| vec![[0.0, 0.0]; positions.len()]);

    let tangents = reader
        .read_tangents()
        .map(|t| t.collect::<Vec<_>>())
        .unwrap_or_else(|| {
            log::debug!("    No tangents in glTF, generating them");
            generate_tangents(&positions, &normals, &uvs, &indices)
        });

    let normal_matrix = world.inverse().transpose();

    let vertices = positions
        .iter()
        .zip(normals.iter())
        .zip(uvs.iter())
        .zip(tangents.iter())
        .map(|(((pos, normal), uv), tangent)| {
            let pos = world.transform_point3(Vec3::from(*pos));
            let normal = normal_matrix
                .transform_vector3(Vec3::from(*normal))
                .normalize_or_zero();
            let t = world
                .transform_vector3(Vec3::new(tangent[0], tangent[1], tangent[2]))
                .normalize_or_zero();

            Vertex {
                pos: pos.to_array(),
                normal: normal.to_array(),
                uv: *uv,
                tangent: [t.x, t.y, t.z, tangent[3]],
            }
        })
        .collect::<Vec<_>>();

    log::trace!(
        "    Primitive: {} vertices, {} indices",
        vertices.len(),
        indices.len()
    );

    Some((vertices, indices))
}

fn generate_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut normals = vec![Vec3::ZERO; positions.len()];

    for triangle in indices.chunks_exact(3) {
        let [i0, i1, i2] = [
            triangle[0] as usize,
            triangle[1] as usize,
            triangle[2] as usize,
        ];
        let p0 = Vec3::from(positions[i0]);
        let face = (Vec3::from(positions[i1]) - p0).cross(Vec3::from(positions[i2]) - p0);
        normals[i0] += face;
        normals[i1] += face;
        normals[i2] += face;
    }

    normals
        .into_iter()
        .map(|n| {
            let n = n.normalize_or_zero();
            if n == Vec3::ZERO {
                [0.0, 1.0, 0.0]
            } else {
                n.to_array()
            }
        })
        .collect()
}

/// Per-vertex tangents accumulated from triangle UV gradients.
fn generate_tangents(
    positions: &[[f32; 3]],
    normals: &[[f32; 3]],
    uvs: &[[f32; 2]],
    indices: &[u32],
) -> Vec<[f32; 4]> {
    let vertex_count = positions.len();
    let mut tangents = vec![Vec3::ZERO; vertex_count];
    let mut bitangents = vec![Vec3::ZERO; vertex_count];

    for triangle in indices.chunks_exact(3) {
        let [i0, i1, i2] = [
            triangle[0] as usize,
            triangle[1] as usize,
            triangle[2] as usize,
        ];

        let p0 = Vec3::from(positions[i0]);
        let edge1 = Vec3::from(positions[i1]) - p0;
        let edge2 = Vec3::from(positions[i2]) - p0;

        let uv0 = Vec2::from(uvs[i0]);
        let delta_uv1 = Vec2::from(uvs[i1]) - uv0;
        let delta_uv2 = Vec2::from(uvs[i2]) - uv0;

        let f = 1.0 / (delta_uv1.x * delta_uv2.y - delta_uv2.x * delta_uv1.y);

        let (tangent, bitangent) = if f.is_finite() {
            (
                (edge1 * delta_uv2.y - edge2 * delta_uv1.y) * f,
                (edge2 * delta_uv1.x - edge1 * delta_uv2.x) * f,
            )
        } else {
            (Vec3::X, Vec3::Y)
        };

        for i in [i0, i1, i2] {
            tangents[i] += tangent;
            bitangents[i] += bitangent;
        }
    }

    tangents
        .iter()
        .zip(bitangents.iter())
        .zip(normals.iter())
        .map(|((t, b), n)| {
            let normal = Vec3::from(*n);

            // Gram-Schmidt
            let mut tangent = (*t - normal * normal.dot(*t)).normalize_or_zero();

            if tangent.length_squared() < 0.0001 {
                tangent = if normal.y.abs() < 0.999 {
                    Vec3::Y.cross(normal).normalize_or_zero()
                } else {
                    Vec3::X.cross(normal).normalize_or_zero()
                };
            }

            let handedness = if normal.cross(tangent).dot(*b) < 0.0 {
                -1.0
            } else {
                1.0
            };

            [tangent.x, tangent.y, tangent.z, handedness]
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A GLB with one triangle mesh instanced by `nodes` nodes, each shifted along x.
    pub(crate) fn triangle_glb(nodes: usize) -> Vec<u8> {
        tinted_triangle_glb(nodes, None)
    }

    pub(crate) fn tinted_triangle_glb(nodes: usize, base_color: Option<[f32; 4]>) -> Vec<u8> {
        let mut bin = Vec::new();
        for p in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            for c in p {
                bin.extend_from_slice(&c.to_le_bytes());
            }
        }
        for i in [0u16, 1, 2] {
            bin.extend_from_slice(&i.to_le_bytes());
        }
        while bin.len() % 4 != 0 {
            bin.push(0);
        }

        let node_json: Vec<String> = (0..nodes)
            .map(|i| format!(r#"{{"mesh":0,"translation":[{}.0,0.0,0.0]}}"#, i * 2))
            .collect();
        let node_refs: Vec<String> = (0..nodes).map(|i| i.to_string()).collect();

        let (primitive_material, materials) = match base_color {
            Some([r, g, b, a]) => (
                r#","material":0"#.to_string(),
                format!(
                    r#""materials":[{{"name":"Paint","pbrMetallicRoughness":{{"baseColorFactor":[{},{},{},{}],"metallicFactor":0.0,"roughnessFactor":0.4}}}}],"#,
                    r, g, b, a
                ),
            ),
            None => (String::new(), String::new()),
        };

        let json = format!(
            r#"{{"asset":{{"version":"2.0"}},"scene":0,"scenes":[{{"nodes":[{}]}}],"nodes":[{}],
"meshes":[{{"primitives":[{{"attributes":{{"POSITION":0}},"indices":1{}}}]}}],{}
"buffers":[{{"byteLength":{}}}],
"bufferViews":[{{"buffer":0,"byteOffset":0,"byteLength":36}},{{"buffer":0,"byteOffset":36,"byteLength":6}}],
"accessors":[{{"bufferView":0,"componentType":5126,"count":3,"type":"VEC3","min":[0,0,0],"max":[1,1,0]}},
{{"bufferView":1,"componentType":5123,"count":3,"type":"SCALAR"}}]}}"#,
            node_refs.join(","),
            node_json.join(","),
            primitive_material,
            materials,
            bin.len()
        );
        let mut json = json.into_bytes();
        while json.len() % 4 != 0 {
            json.push(b' ');
        }

        let total = 12 + 8 + json.len() + 8 + bin.len();
        let mut glb = Vec::with_capacity(total);
        glb.extend_from_slice(b"glTF");
        glb.extend_from_slice(&2u32.to_le_bytes());
        glb.extend_from_slice(&(total as u32).to_le_bytes());
        glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"JSON");
        glb.extend_from_slice(&json);
        glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
        glb.extend_from_slice(b"BIN\0");
        glb.extend_from_slice(&bin);
        glb
    }

    #[test]
    fn imports_instances_in_world_space() {
        let model = import_model(&triangle_glb(2), "pair").unwrap();

        assert_eq!(model.meshes.len(), 2);
        assert_eq!(model.meshes[0].indices, vec![0, 1, 2]);
        assert_eq!(model.bounds.min, Vec3::ZERO);
        assert_eq!(model.bounds.max, Vec3::new(3.0, 1.0, 0.0));
    }

    #[test]
    fn authored_material_is_kept_per_mesh() {
        let bytes = tinted_triangle_glb(2, Some([1.0, 0.0, 0.0, 0.5]));
        let model = import_model(&bytes, "paint").unwrap();

        for mesh in &model.meshes {
            let material = mesh.material.as_ref().unwrap();
            assert_eq!(material.name(), "Paint");
            assert_eq!(material.source(), MaterialSource::Model);
            assert_eq!(material.base_color(), Color::rgb(255, 0, 0));
            assert_eq!(material.scalars().roughness, 0.4);
            assert_eq!(material.scalars().metalness, 0.0);
            // Opaque alpha mode ignores the factor's alpha.
            assert_eq!(material.scalars().opacity, 1.0);
            assert!(material.is_resolved());
        }
    }

    #[test]
    fn primitives_without_material_use_the_default() {
        let model = import_model(&triangle_glb(1), "plain").unwrap();
        assert!(model.meshes[0].material.is_none());
        assert!(sphere_model(8, 4).meshes[0].material.is_none());
    }

    #[test]
    fn missing_normals_are_generated() {
        let model = import_model(&triangle_glb(1), "one").unwrap();
        for vertex in &model.meshes[0].vertices {
            assert!((Vec3::from(vertex.normal) - Vec3::Z).length() < 1e-5);
            assert!((Vec3::from(vertex.normal).dot(Vec3::new(
                vertex.tangent[0],
                vertex.tangent[1],
                vertex.tangent[2]
            )))
            .abs()
                < 1e-5);
        }
    }

    #[test]
    fn garbage_is_model_invalid() {
        let err = import_model(b"definitely not gltf", "junk").unwrap_err();
        assert!(matches!(err, ViewerError::ModelInvalid { .. }));
    }

    #[test]
    fn bounds_union_and_center() {
        let a = Bounds::from_points([Vec3::ZERO, Vec3::ONE]).unwrap();
        let b = Bounds::from_points([Vec3::splat(-1.0)]).unwrap();
        let u = a.union(&b);
        assert_eq!(u.center(), Vec3::ZERO);
        assert_eq!(u.size(), Vec3::splat(2.0));
        assert!(Bounds::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn builtin_sphere_is_closed_and_unit_sized() {
        let model = sphere_model(16, 8);
        let mesh = &model.meshes[0];
        assert_eq!(mesh.vertices.len(), 17 * 9);
        assert_eq!(mesh.indices.len(), 16 * 8 * 6);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
        assert_eq!(model.bounds.size(), Vec3::ONE);
        assert_eq!(model.label, "builtin sphere");
    }

    #[test]
    fn paths_convert_to_file_sources() {
        assert_eq!(ModelSource::from("a.glb"), ModelSource::File("a.glb".into()));
        assert_eq!(ModelSource::from("a.glb").label(), "a.glb");
    }
}
