// material/u3m.rs - serde model of a .u3m descriptor
use serde::Deserialize;

use crate::error::{Result, ViewerError};

pub const DESCRIPTOR_EXTENSION: &str = ".u3m";

#[derive(Debug, Deserialize)]
pub struct U3mDocument {
    pub material: Option<U3mMaterial>,
}

#[derive(Debug, Deserialize)]
pub struct U3mMaterial {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub front: Option<U3mFace>,
    /// Parsed for completeness; only the front face is rendered.
    #[serde(default)]
    pub back: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct U3mFace {
    #[serde(default)]
    pub basecolor: Option<U3mChannel>,
    #[serde(default)]
    pub normal: Option<U3mChannel>,
    #[serde(default)]
    pub displacement: Option<U3mChannel>,
    #[serde(default)]
    pub roughness: Option<U3mChannel>,
    #[serde(default)]
    pub metalness: Option<U3mChannel>,
    #[serde(default)]
    pub alpha: Option<U3mChannel>,
}

#[derive(Debug, Default, Deserialize)]
pub struct U3mChannel {
    #[serde(default)]
    pub constant: Option<U3mConstant>,
    #[serde(default)]
    pub texture: Option<U3mTexture>,
}

#[derive(Debug, Deserialize)]
pub struct U3mTexture {
    pub image: U3mImage,
}

#[derive(Debug, Deserialize)]
pub struct U3mImage {
    pub path: String,
}

/// A channel constant: a scalar, an `[r, g, b]` triple or an `{r, g, b}` object.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum U3mConstant {
    Scalar(f32),
    Triple([f32; 3]),
    Rgb { r: f32, g: f32, b: f32 },
}

impl U3mConstant {
    pub fn as_scalar(&self) -> Option<f32> {
        match *self {
            U3mConstant::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_rgb(&self) -> Option<[f32; 3]> {
        match *self {
            U3mConstant::Triple(rgb) => Some(rgb),
            U3mConstant::Rgb { r, g, b } => Some([r, g, b]),
            U3mConstant::Scalar(_) => None,
        }
    }
}

impl U3mChannel {
    pub fn texture_path(&self) -> Option<&str> {
        self.texture
            .as_ref()
            .map(|texture| texture.image.path.as_str())
            .filter(|path| !path.trim().is_empty())
    }
}

/// A descriptor with the nodes the format requires checked.
pub struct CheckedDescriptor {
    pub name: Option<String>,
    pub front: U3mFace,
}

pub fn parse_descriptor(descriptor: &str, bytes: &[u8]) -> Result<CheckedDescriptor> {
    let text = std::str::from_utf8(bytes)
        .map_err(|err| ViewerError::descriptor(descriptor, format!("not UTF-8: {err}")))?;
    let text = text.trim_start_matches('\u{feff}');

    let document: U3mDocument = serde_json::from_str(text)
        .map_err(|err| ViewerError::descriptor(descriptor, err.to_string()))?;

    let material = document
        .material
        .ok_or_else(|| ViewerError::descriptor(descriptor, "missing 'material' node"))?;

    if material.back.is_some() {
        log::debug!("Descriptor '{}' has a back face; it is not rendered", descriptor);
    }

    let front = material
        .front
        .ok_or_else(|| ViewerError::descriptor(descriptor, "missing 'front' face"))?;

    if front.basecolor.is_none() {
        return Err(ViewerError::descriptor(
            descriptor,
            "missing 'front.basecolor' node",
        ));
    }

    Ok(CheckedDescriptor {
        name: material.name.filter(|name| !name.trim().is_empty()),
        front,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_accept_all_shapes() {
        let json = r#"{"material":{"front":{
            "basecolor":{"constant":{"r":1.0,"g":0.5,"b":0.0}},
            "roughness":{"constant":0.4},
            "metalness":{"constant":[0.1,0.2,0.3]}
        }}}"#;
        let checked = parse_descriptor("m.u3m", json.as_bytes()).unwrap();
        let front = checked.front;

        assert_eq!(
            front.basecolor.unwrap().constant.unwrap().as_rgb(),
            Some([1.0, 0.5, 0.0])
        );
        assert_eq!(front.roughness.unwrap().constant.unwrap().as_scalar(), Some(0.4));
        assert_eq!(
            front.metalness.unwrap().constant.unwrap().as_rgb(),
            Some([0.1, 0.2, 0.3])
        );
    }

    #[test]
    fn missing_front_is_invalid() {
        let err = parse_descriptor("m.u3m", br#"{"material":{"name":"x"}}"#).err().unwrap();
        assert!(matches!(err, ViewerError::DescriptorInvalid { .. }));
    }

    #[test]
    fn missing_basecolor_is_invalid() {
        let err = parse_descriptor("m.u3m", br#"{"material":{"front":{}}}"#).err().unwrap();
        assert!(matches!(err, ViewerError::DescriptorInvalid { .. }));
    }

    #[test]
    fn malformed_json_is_invalid() {
        let err = parse_descriptor("m.u3m", b"{ not json").err().unwrap();
        assert!(matches!(err, ViewerError::DescriptorInvalid { .. }));
    }

    #[test]
    fn empty_texture_path_counts_as_absent() {
        let channel: U3mChannel =
            serde_json::from_str(r#"{"texture":{"image":{"path":""}}}"#).unwrap();
        assert_eq!(channel.texture_path(), None);
    }
}
