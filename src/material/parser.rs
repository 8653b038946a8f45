// material/parser.rs - turns a decoded archive into material definitions
use std::path::Path;

use crate::archive::{is_root_entry, normalize_entry_path, ArchiveContents};
use crate::error::{Result, ViewerError};
use crate::material::definition::{
    Channel, Color, MaterialDefinition, MaterialSource, TextureImage, TextureSlot,
};
use crate::material::u3m::{self, U3mChannel, U3mConstant, DESCRIPTOR_EXTENSION};

pub const PREVIEW_ENTRY: &str = "preview.png";

/// A problem that degraded part of a bundle without failing the whole load.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleIssue {
    /// Descriptor or entry path the issue belongs to.
    pub source: String,
    pub error: ViewerError,
}

/// One decoded archive.
#[derive(Debug, Clone)]
pub struct MaterialArchiveBundle {
    pub preview: Option<TextureImage>,
    pub materials: Vec<MaterialDefinition>,
    pub issues: Vec<BundleIssue>,
}

impl MaterialArchiveBundle {
    pub fn first(&self) -> Option<&MaterialDefinition> {
        self.materials.first()
    }
}

/// Decodes and parses raw archive bytes. Only a container failure is an error.
pub fn parse_archive_bytes(bytes: &[u8]) -> Result<MaterialArchiveBundle> {
    let contents = ArchiveContents::from_bytes(bytes)?;
    Ok(parse_archive(&contents))
}

pub fn parse_archive(contents: &ArchiveContents) -> MaterialArchiveBundle {
    let mut issues = Vec::new();

    let preview = load_preview(contents, &mut issues);

    let descriptors: Vec<&str> = contents
        .paths()
        .filter(|path| path.ends_with(DESCRIPTOR_EXTENSION))
        .collect();

    let materials = if descriptors.is_empty() {
        log::info!("Archive has no {} descriptor; using default material", DESCRIPTOR_EXTENSION);
        vec![MaterialDefinition::default_constant()]
    } else {
        descriptors
            .iter()
            .map(|path| match parse_one(contents, path, &mut issues) {
                Ok(definition) => definition,
                Err(error) => {
                    log::warn!("Descriptor '{}' degraded to default material: {}", path, error);
                    issues.push(BundleIssue {
                        source: path.to_string(),
                        error,
                    });
                    MaterialDefinition::new(descriptor_stem(path), MaterialSource::Archive)
                }
            })
            .collect()
    };

    log::info!(
        "Parsed archive: {} material(s), preview: {}, issues: {}",
        materials.len(),
        preview.is_some(),
        issues.len()
    );

    MaterialArchiveBundle {
        preview,
        materials,
        issues,
    }
}

fn load_preview(contents: &ArchiveContents, issues: &mut Vec<BundleIssue>) -> Option<TextureImage> {
    let path = contents
        .paths()
        .find(|path| is_root_entry(path) && *path == PREVIEW_ENTRY)?;
    let bytes = contents.entry(path)?;

    match TextureImage::decode(bytes, PREVIEW_ENTRY) {
        Ok(image) => Some(image),
        Err(error) => {
            log::warn!("Archive preview could not be decoded: {}", error);
            issues.push(BundleIssue {
                source: PREVIEW_ENTRY.to_string(),
                error,
            });
            None
        }
    }
}

fn descriptor_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(path)
        .to_string()
}

fn parse_one(
    contents: &ArchiveContents,
    descriptor: &str,
    issues: &mut Vec<BundleIssue>,
) -> Result<MaterialDefinition> {
    let checked = u3m::parse_descriptor(descriptor, contents.require(descriptor)?)?;
    let front = checked.front;
    let name = checked.name.unwrap_or_else(|| descriptor_stem(descriptor));

    let mut definition = MaterialDefinition::new(name, MaterialSource::Archive);

    let channels: [(Channel, &Option<U3mChannel>); 6] = [
        (Channel::Albedo, &front.basecolor),
        (Channel::Normal, &front.normal),
        (Channel::Displacement, &front.displacement),
        (Channel::Roughness, &front.roughness),
        (Channel::Metalness, &front.metalness),
        (Channel::Alpha, &front.alpha),
    ];

    for (channel, node) in channels {
        let Some(node) = node else {
            continue;
        };

        if let Some(constant) = node.constant {
            definition = apply_constant(definition, descriptor, channel, constant)?;
        }

        if let Some(raw_path) = node.texture_path() {
            let path = normalize_entry_path(raw_path);
            let bytes = contents.require(&path)?;
            match TextureImage::decode(bytes, &path) {
                Ok(image) => {
                    definition =
                        definition.with_map(channel, Some(TextureSlot::Resolved(image)));
                }
                Err(error) => {
                    log::warn!(
                        "{} texture '{}' in '{}' left absent: {}",
                        channel.label(),
                        path,
                        descriptor,
                        error
                    );
                    issues.push(BundleIssue {
                        source: path,
                        error,
                    });
                }
            }
        }
    }

    Ok(definition)
}

fn apply_constant(
    definition: MaterialDefinition,
    descriptor: &str,
    channel: Channel,
    constant: U3mConstant,
) -> Result<MaterialDefinition> {
    let wrong_shape = |expected: &str| {
        ViewerError::descriptor(
            descriptor,
            format!("{} constant must be {}", channel.label(), expected),
        )
    };

    let updated = match channel {
        Channel::Albedo => {
            let rgb = constant.as_rgb().ok_or_else(|| wrong_shape("an RGB triple"))?;
            definition.with_base_color(Color::from_unit_rgb(rgb))
        }
        Channel::Roughness => {
            let value = constant.as_scalar().ok_or_else(|| wrong_shape("a number"))?;
            definition.with_scalars(|s| s.roughness = value.clamp(0.0, 1.0))
        }
        Channel::Metalness => {
            let value = constant.as_scalar().ok_or_else(|| wrong_shape("a number"))?;
            definition.with_scalars(|s| s.metalness = value.clamp(0.0, 1.0))
        }
        Channel::Alpha => {
            let value = constant.as_scalar().ok_or_else(|| wrong_shape("a number"))?;
            definition.with_scalars(|s| s.opacity = value.clamp(0.0, 1.0))
        }
        Channel::Displacement => {
            let value = constant.as_scalar().ok_or_else(|| wrong_shape("a number"))?;
            definition.with_scalars(|s| s.displacement_bias = value)
        }
        Channel::Normal | Channel::AmbientOcclusion | Channel::Emissive => definition,
    };

    Ok(updated)
}
