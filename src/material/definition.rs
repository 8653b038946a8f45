// material/definition.rs
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::{Mat3, Vec2};
use image::RgbaImage;

use crate::error::{Result, ViewerError};

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique material identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(u64);

impl MaterialId {
    pub fn next() -> Self {
        Self(NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MaterialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mat-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialSource {
    Procedural,
    Archive,
    /// Authored inside a glTF model.
    Model,
}

/// Physically based surface attributes a material can carry a texture for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Albedo,
    Normal,
    Displacement,
    Roughness,
    Metalness,
    Alpha,
    AmbientOcclusion,
    Emissive,
}

impl Channel {
    pub const COUNT: usize = 8;

    pub const ALL: [Channel; Self::COUNT] = [
        Channel::Albedo,
        Channel::Normal,
        Channel::Displacement,
        Channel::Roughness,
        Channel::Metalness,
        Channel::Alpha,
        Channel::AmbientOcclusion,
        Channel::Emissive,
    ];

    pub const fn index(self) -> usize {
        match self {
            Channel::Albedo => 0,
            Channel::Normal => 1,
            Channel::Displacement => 2,
            Channel::Roughness => 3,
            Channel::Metalness => 4,
            Channel::Alpha => 5,
            Channel::AmbientOcclusion => 6,
            Channel::Emissive => 7,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Channel::Albedo => "albedo",
            Channel::Normal => "normal",
            Channel::Displacement => "displacement",
            Channel::Roughness => "roughness",
            Channel::Metalness => "metalness",
            Channel::Alpha => "alpha",
            Channel::AmbientOcclusion => "ambient occlusion",
            Channel::Emissive => "emissive",
        }
    }

    /// Colour data is sRGB encoded; everything else is linear data.
    pub const fn is_color(self) -> bool {
        matches!(self, Channel::Albedo | Channel::Emissive)
    }
}

/// A decoded RGBA8 image, shared cheaply between definitions and the renderer.
#[derive(Clone)]
pub struct TextureImage {
    image: Arc<RgbaImage>,
    label: Arc<str>,
}

impl TextureImage {
    pub fn decode(bytes: &[u8], label: &str) -> Result<Self> {
        let decoded =
            image::load_from_memory(bytes).map_err(|err| ViewerError::decode(label, err))?;
        Ok(Self::from_image(decoded.to_rgba8(), label))
    }

    pub fn from_image(image: RgbaImage, label: &str) -> Self {
        Self {
            image: Arc::new(image),
            label: Arc::from(label),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// True when both handles point at the same decoded pixels.
    pub fn same_image(&self, other: &TextureImage) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

impl fmt::Debug for TextureImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureImage")
            .field("label", &self.label)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

/// A channel texture: either a path still to be fetched or decoded pixels.
#[derive(Debug, Clone)]
pub enum TextureSlot {
    Unresolved(String),
    Resolved(TextureImage),
}

impl TextureSlot {
    /// An empty path is the same as no texture at all.
    pub fn from_path(path: &str) -> Option<Self> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(TextureSlot::Unresolved(trimmed.to_string()))
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, TextureSlot::Resolved(_))
    }

    pub fn image(&self) -> Option<&TextureImage> {
        match self {
            TextureSlot::Resolved(image) => Some(image),
            TextureSlot::Unresolved(_) => None,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            TextureSlot::Unresolved(path) => Some(path),
            TextureSlot::Resolved(_) => None,
        }
    }
}

/// 8-bit sRGB encoded colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Converts a 0-1 component triple, clamping out of range values.
    pub fn from_unit_rgb(rgb: [f32; 3]) -> Self {
        let to_byte = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::rgb(to_byte(rgb[0]), to_byte(rgb[1]), to_byte(rgb[2]))
    }

    /// Encodes a linear 0-1 triple with the sRGB transfer curve.
    pub fn from_linear_rgb(rgb: [f32; 3]) -> Self {
        let encode = |c: f32| {
            let c = c.clamp(0.0, 1.0);
            if c <= 0.003_130_8 {
                c * 12.92
            } else {
                1.055 * c.powf(1.0 / 2.4) - 0.055
            }
        };
        Self::from_unit_rgb(rgb.map(encode))
    }

    /// Parses `#rrggbb`, `rrggbb` or `#rgb`. Empty or malformed input is `None`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex
            .trim()
            .trim_start_matches('#')
            .chars()
            .map(|c| c.to_digit(16).map(|d| d as u8))
            .collect::<Option<Vec<u8>>>()?;

        match digits[..] {
            [r1, r2, g1, g2, b1, b2] => Some(Self::rgb(r1 * 16 + r2, g1 * 16 + g2, b1 * 16 + b2)),
            [r, g, b] => Some(Self::rgb(r * 17, g * 17, b * 17)),
            _ => None,
        }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn to_unit_rgb(&self) -> [f32; 3] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        ]
    }

    /// Decodes the sRGB transfer curve.
    pub fn to_linear(&self) -> [f32; 3] {
        let decode = |c: f32| {
            if c <= 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            }
        };
        let [r, g, b] = self.to_unit_rgb();
        [decode(r), decode(g), decode(b)]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    Repeat,
    ClampToEdge,
}

/// UV transform shared by every bound channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvTransform {
    pub repeat: Option<Vec2>,
    pub offset: Vec2,
    pub rotation_degrees: f32,
}

impl Default for UvTransform {
    fn default() -> Self {
        Self {
            repeat: None,
            offset: Vec2::ZERO,
            rotation_degrees: 0.0,
        }
    }
}

impl UvTransform {
    pub fn wrap_mode(&self) -> WrapMode {
        if self.repeat.is_some() {
            WrapMode::Repeat
        } else {
            WrapMode::ClampToEdge
        }
    }

    /// Scale, then rotate about the origin, then offset.
    pub fn matrix(&self) -> Mat3 {
        let scale = self.repeat.unwrap_or(Vec2::ONE);
        Mat3::from_translation(self.offset)
            * Mat3::from_angle(self.rotation_degrees.to_radians())
            * Mat3::from_scale(scale)
    }
}

/// Per-channel scalar modifiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialScalars {
    pub roughness: f32,
    pub metalness: f32,
    pub opacity: f32,
    pub displacement_scale: f32,
    pub displacement_bias: f32,
    pub normal_scale: Vec2,
    pub ao_intensity: f32,
    pub emissive: Color,
    pub emissive_intensity: f32,
    pub env_intensity: f32,
}

impl Default for MaterialScalars {
    fn default() -> Self {
        Self {
            roughness: 1.0,
            metalness: 0.0,
            opacity: 1.0,
            displacement_scale: 1.0,
            displacement_bias: 0.0,
            normal_scale: Vec2::ONE,
            ao_intensity: 1.0,
            emissive: Color::BLACK,
            emissive_intensity: 1.0,
            env_intensity: 1.0,
        }
    }
}

/// Immutable description of a PBR surface.
///
/// Builders consume the value and return a new one; nothing mutates a
/// definition once another component holds it.
#[derive(Debug, Clone)]
pub struct MaterialDefinition {
    id: MaterialId,
    name: String,
    source: MaterialSource,
    base_color: Color,
    maps: [Option<TextureSlot>; Channel::COUNT],
    scalars: MaterialScalars,
    uv: UvTransform,
    wireframe: bool,
    transparent: bool,
}

impl MaterialDefinition {
    pub fn new(name: impl Into<String>, source: MaterialSource) -> Self {
        Self {
            id: MaterialId::next(),
            name: name.into(),
            source,
            base_color: Color::WHITE,
            maps: Default::default(),
            scalars: MaterialScalars::default(),
            uv: UvTransform::default(),
            wireframe: false,
            transparent: false,
        }
    }

    /// White, fully rough, untextured.
    pub fn default_constant() -> Self {
        Self::new("Default", MaterialSource::Procedural)
    }

    pub fn id(&self) -> MaterialId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> MaterialSource {
        self.source
    }

    pub fn base_color(&self) -> Color {
        self.base_color
    }

    pub fn map(&self, channel: Channel) -> Option<&TextureSlot> {
        self.maps[channel.index()].as_ref()
    }

    pub fn has_map(&self, channel: Channel) -> bool {
        self.maps[channel.index()].is_some()
    }

    pub fn scalars(&self) -> &MaterialScalars {
        &self.scalars
    }

    pub fn uv(&self) -> &UvTransform {
        &self.uv
    }

    pub fn wireframe(&self) -> bool {
        self.wireframe
    }

    pub fn transparent(&self) -> bool {
        self.transparent
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_base_color(mut self, color: Color) -> Self {
        self.base_color = color;
        self
    }

    pub fn with_map(mut self, channel: Channel, slot: Option<TextureSlot>) -> Self {
        self.maps[channel.index()] = slot;
        self
    }

    pub fn with_scalars(mut self, update: impl FnOnce(&mut MaterialScalars)) -> Self {
        update(&mut self.scalars);
        self
    }

    pub fn with_uv(mut self, uv: UvTransform) -> Self {
        self.uv = uv;
        self
    }

    pub fn with_wireframe(mut self, wireframe: bool) -> Self {
        self.wireframe = wireframe;
        self
    }

    pub fn with_transparent(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }

    /// Every present channel holds decoded pixels.
    pub fn is_resolved(&self) -> bool {
        self.maps.iter().flatten().all(TextureSlot::is_resolved)
    }

    pub fn unresolved(&self) -> impl Iterator<Item = (Channel, &str)> + '_ {
        Channel::ALL
            .into_iter()
            .filter_map(|channel| self.map(channel)?.path().map(|path| (channel, path)))
    }

    /// Resolves every `Unresolved` slot through `load`. A slot that fails to
    /// load is dropped (the channel becomes absent) and its error returned.
    pub fn resolve_with<F>(&self, load: F) -> (Self, Vec<(Channel, ViewerError)>)
    where
        F: FnMut(Channel, &str) -> Result<TextureImage>,
    {
        self.resolve_with_limit(usize::MAX, load)
    }

    /// Like [`resolve_with`](Self::resolve_with) but stops after `limit` slots,
    /// leaving the rest unresolved.
    pub fn resolve_with_limit<F>(
        &self,
        limit: usize,
        mut load: F,
    ) -> (Self, Vec<(Channel, ViewerError)>)
    where
        F: FnMut(Channel, &str) -> Result<TextureImage>,
    {
        let mut resolved = self.clone();
        let mut failures = Vec::new();

        for (channel, path) in self.unresolved().take(limit) {
            resolved.maps[channel.index()] = match load(channel, path) {
                Ok(image) => Some(TextureSlot::Resolved(image)),
                Err(err) => {
                    log::warn!(
                        "Dropping {} texture '{}' of material '{}': {}",
                        channel.label(),
                        path,
                        self.name,
                        err
                    );
                    failures.push((channel, err));
                    None
                }
            };
        }

        (resolved, failures)
    }
}

impl Default for MaterialDefinition {
    fn default() -> Self {
        Self::default_constant()
    }
}
