// catalog.rs - models and materials offered by the viewer shell
use std::path::Path;

use glam::Vec2;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::material::{
    Channel, Color, MaterialDefinition, MaterialSource, TextureSlot, UvTransform,
};
use crate::scene::model::ModelSource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    /// Absent means the built-in sphere.
    #[serde(default)]
    pub path: Option<String>,
}

impl ModelEntry {
    pub fn source(&self) -> ModelSource {
        match self.path.as_deref() {
            Some(path) if !path.is_empty() => ModelSource::File(path.to_string()),
            _ => ModelSource::Sphere,
        }
    }
}

/// A material offered in the catalog. Texture paths are fetched when the
/// material is applied; an empty path means no map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MaterialEntry {
    Pbr {
        name: String,
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        map: String,
        #[serde(default)]
        normal_map: String,
        #[serde(default)]
        displacement_map: String,
        #[serde(default)]
        roughness_map: String,
        #[serde(default)]
        metalness_map: String,
        #[serde(default)]
        alpha_map: String,
        #[serde(default)]
        ao_map: String,
        #[serde(default)]
        emissive_map: String,
        #[serde(default)]
        roughness: Option<f32>,
        #[serde(default)]
        metalness: Option<f32>,
        #[serde(default)]
        opacity: Option<f32>,
        #[serde(default)]
        displacement_scale: Option<f32>,
        #[serde(default)]
        repeat: Option<[f32; 2]>,
        #[serde(default)]
        wireframe: bool,
    },
    Archive {
        name: String,
        path: String,
    },
}

impl MaterialEntry {
    pub fn name(&self) -> &str {
        match self {
            MaterialEntry::Pbr { name, .. } | MaterialEntry::Archive { name, .. } => name,
        }
    }

    /// Procedural definition for a `Pbr` entry, with every map still unresolved.
    /// `None` for archive entries, which load through the archive pipeline.
    pub fn to_definition(&self) -> Option<MaterialDefinition> {
        let MaterialEntry::Pbr {
            name,
            color,
            map,
            normal_map,
            displacement_map,
            roughness_map,
            metalness_map,
            alpha_map,
            ao_map,
            emissive_map,
            roughness,
            metalness,
            opacity,
            displacement_scale,
            repeat,
            wireframe,
        } = self
        else {
            return None;
        };

        let color = color.as_deref().filter(|hex| !hex.trim().is_empty());
        let base_color = match color.map(Color::from_hex) {
            Some(Some(color)) => color,
            Some(None) => {
                warn!("Material '{}' has an unreadable colour; using white", name);
                Color::WHITE
            }
            None => Color::WHITE,
        };

        let maps = [
            (Channel::Albedo, map),
            (Channel::Normal, normal_map),
            (Channel::Displacement, displacement_map),
            (Channel::Roughness, roughness_map),
            (Channel::Metalness, metalness_map),
            (Channel::Alpha, alpha_map),
            (Channel::AmbientOcclusion, ao_map),
            (Channel::Emissive, emissive_map),
        ];

        let definition = maps.into_iter().fold(
            MaterialDefinition::new(name.clone(), MaterialSource::Procedural)
                .with_base_color(base_color)
                .with_wireframe(*wireframe),
            |definition, (channel, path)| {
                definition.with_map(channel, TextureSlot::from_path(path))
            },
        );

        let definition = definition.with_scalars(|scalars| {
            if let Some(value) = roughness {
                scalars.roughness = *value;
            }
            if let Some(value) = metalness {
                scalars.metalness = *value;
            }
            if let Some(value) = opacity {
                scalars.opacity = *value;
            }
            if let Some(value) = displacement_scale {
                scalars.displacement_scale = *value;
            }
        });

        Some(definition.with_uv(UvTransform {
            repeat: repeat.map(Vec2::from),
            ..UvTransform::default()
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub models: Vec<ModelEntry>,
    #[serde(default)]
    pub materials: Vec<MaterialEntry>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Catalog {
    /// What the viewer offers with no catalog file: the sphere and the default material.
    pub fn builtin() -> Self {
        Self {
            models: vec![ModelEntry {
                name: "Sphere".to_string(),
                path: None,
            }],
            materials: vec![MaterialEntry::Pbr {
                name: "Default".to_string(),
                color: Some(Color::WHITE.to_hex()),
                map: String::new(),
                normal_map: String::new(),
                displacement_map: String::new(),
                roughness_map: String::new(),
                metalness_map: String::new(),
                alpha_map: String::new(),
                ao_map: String::new(),
                emissive_map: String::new(),
                roughness: Some(1.0),
                metalness: Some(0.0),
                opacity: None,
                displacement_scale: None,
                repeat: None,
                wireframe: false,
            }],
        }
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|err| {
                warn!(
                    "Failed to parse {:?} ({}). Falling back to the built-in catalog.",
                    path, err
                );
                Self::builtin()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("Catalog {:?} not found. Using the built-in catalog.", path);
                Self::builtin()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to the built-in catalog.",
                    path, err
                );
                Self::builtin()
            }
        }
    }

    /// Parses a catalog. Empty sections are filled from the built-in catalog.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        let mut catalog: Catalog = serde_json::from_str(contents)?;
        let builtin = Self::builtin();
        if catalog.models.is_empty() {
            catalog.models = builtin.models;
        }
        if catalog.materials.is_empty() {
            catalog.materials = builtin.materials;
        }
        info!(
            "Catalog lists {} models and {} materials",
            catalog.models.len(),
            catalog.materials.len()
        );
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::WrapMode;

    #[test]
    fn parses_both_material_kinds() {
        let catalog = Catalog::from_json(
            r##"{
                "models": [{ "name": "Rib", "path": "models/1xrib.glb" }],
                "materials": [
                    { "type": "pbr", "name": "Denim", "color": "#3b5b92",
                      "map": "textures/denim.png", "normal_map": "",
                      "roughness": 0.8, "repeat": [4, 4] },
                    { "type": "archive", "name": "Wool", "path": "materials/wool.u3ma" }
                ]
            }"##,
        )
        .unwrap();

        assert_eq!(catalog.models[0].source(), ModelSource::File("models/1xrib.glb".into()));
        assert_eq!(catalog.materials.len(), 2);
        assert_eq!(catalog.materials[1].name(), "Wool");
        assert!(catalog.materials[1].to_definition().is_none());

        let denim = catalog.materials[0].to_definition().unwrap();
        assert_eq!(denim.base_color().to_hex(), "#3b5b92");
        assert_eq!(denim.scalars().roughness, 0.8);
        assert_eq!(denim.uv().wrap_mode(), WrapMode::Repeat);
        assert_eq!(
            denim.map(Channel::Albedo).and_then(TextureSlot::path),
            Some("textures/denim.png")
        );
        assert!(!denim.has_map(Channel::Normal));
        assert!(!denim.is_resolved());
    }

    #[test]
    fn empty_sections_fall_back_to_builtin() {
        let catalog = Catalog::from_json("{}").unwrap();
        assert_eq!(catalog.models[0].source(), ModelSource::Sphere);
        let default = catalog.materials[0].to_definition().unwrap();
        assert!(default.is_resolved());
        assert_eq!(default.uv().wrap_mode(), WrapMode::ClampToEdge);
    }

    #[test]
    fn non_ascii_colour_falls_back_to_white() {
        let catalog = Catalog::from_json(
            r#"{ "materials": [{ "type": "pbr", "name": "Odd", "color": "€abc" }] }"#,
        )
        .unwrap();
        let odd = catalog.materials[0].to_definition().unwrap();
        assert_eq!(odd.base_color(), Color::WHITE);
    }

    #[test]
    fn missing_file_uses_builtin() {
        let catalog = Catalog::load_from_path("does/not/exist/catalog.json");
        assert_eq!(catalog, Catalog::builtin());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(Catalog::from_json("{ not json").is_err());
    }
}
