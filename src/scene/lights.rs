use glam::Vec3;

use crate::material::Color;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSettings {
    pub enabled: bool,
    pub color: Color,
    pub intensity: f32,
}

impl LightSettings {
    pub const fn new(color: Color, intensity: f32) -> Self {
        Self {
            enabled: true,
            color,
            intensity,
        }
    }

    /// Linear colour times intensity, zero when disabled.
    pub fn radiance(&self) -> Vec3 {
        if !self.enabled {
            return Vec3::ZERO;
        }
        Vec3::from(self.color.to_linear()) * self.intensity
    }
}

/// The scene's three lights: a directional sun aligned with the panorama and two
/// hemisphere-style ambient fills.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightRig {
    pub sun: LightSettings,
    pub ambient1: LightSettings,
    pub ambient2: LightSettings,
    pub sun_position: Vec3,
}

impl LightRig {
    pub fn new(space_size: f32) -> Self {
        Self {
            sun: LightSettings::new(Color::rgb(0xff, 0xfd, 0xec), 1.2),
            ambient1: LightSettings::new(Color::rgb(0xb1, 0xdb, 0xff), 1.0),
            ambient2: LightSettings::new(Color::rgb(0x4c, 0xad, 0xff), 0.6),
            sun_position: Vec3::new(0.0, space_size, space_size),
        }
    }

    /// Direction the sunlight travels, from its position towards the origin.
    pub fn sun_direction(&self) -> Vec3 {
        let direction = (-self.sun_position).normalize_or_zero();
        if direction == Vec3::ZERO {
            Vec3::NEG_Y
        } else {
            direction
        }
    }
}

impl Default for LightRig {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_viewer_palette() {
        let rig = LightRig::default();
        assert_eq!(rig.sun.color.to_hex(), "#fffdec");
        assert_eq!(rig.ambient1.color.to_hex(), "#b1dbff");
        assert_eq!(rig.ambient2.intensity, 0.6);
    }

    #[test]
    fn disabled_light_emits_nothing() {
        let mut light = LightRig::default().sun;
        assert!(light.radiance().x > 0.0);
        light.enabled = false;
        assert_eq!(light.radiance(), Vec3::ZERO);
    }

    #[test]
    fn sun_points_at_origin() {
        let rig = LightRig {
            sun_position: Vec3::new(0.0, 2.0, 0.0),
            ..LightRig::default()
        };
        assert_eq!(rig.sun_direction(), Vec3::NEG_Y);
    }
}
