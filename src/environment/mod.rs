pub mod bake;

use glam::Vec3;

pub use bake::{bake_environment, decode_panorama, BakedEnvironment, HdrLevel};

/// A lighting panorama from the static catalog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentDefinition {
    pub name: &'static str,
    pub hdr_path: &'static str,
    /// Angle of the panorama's sun above the horizon, in degrees.
    pub zenith: f32,
    /// Default horizontal orientation of the sun light, in degrees.
    pub azimuth: f32,
    pub exposure: f32,
}

pub const ENVIRONMENT_CATALOG: &[EnvironmentDefinition] = &[
    EnvironmentDefinition {
        name: "Studio",
        hdr_path: "environments/studio_small.hdr",
        zenith: 45.0,
        azimuth: 0.0,
        exposure: 1.0,
    },
    EnvironmentDefinition {
        name: "Park",
        hdr_path: "environments/park_afternoon.hdr",
        zenith: 30.0,
        azimuth: 120.0,
        exposure: 0.8,
    },
    EnvironmentDefinition {
        name: "Sunset",
        hdr_path: "environments/sunset_field.hdr",
        zenith: 80.0,
        azimuth: 270.0,
        exposure: 1.2,
    },
];

pub fn environment(index: usize) -> Option<&'static EnvironmentDefinition> {
    ENVIRONMENT_CATALOG.get(index)
}

/// Sun light position matching the panorama's sun for the given orientation.
///
/// The horizontal radius shrinks with the zenith angle while the height stays fixed.
pub fn sun_position(
    definition: &EnvironmentDefinition,
    azimuth_degrees: f32,
    space_size: f32,
    height: f32,
) -> Vec3 {
    let radius = definition.zenith.to_radians().cos() * space_size;
    let azimuth = azimuth_degrees.to_radians();
    Vec3::new(azimuth.sin() * radius, height, azimuth.cos() * radius)
}

/// Environment parameters the scene currently renders with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvironmentState {
    pub index: Option<usize>,
    pub background_enabled: bool,
    pub orientation_degrees: f32,
    pub exposure: f32,
}

impl Default for EnvironmentState {
    fn default() -> Self {
        Self {
            index: None,
            background_enabled: false,
            orientation_degrees: 0.0,
            exposure: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_sun() -> EnvironmentDefinition {
        EnvironmentDefinition {
            zenith: 0.0,
            ..ENVIRONMENT_CATALOG[0]
        }
    }

    #[test]
    fn orientation_ninety_puts_sun_on_x() {
        let p = sun_position(&flat_sun(), 90.0, 2.0, 5.0);
        assert!((p.x - 2.0).abs() < 1e-5);
        assert!(p.z.abs() < 1e-5);
        assert_eq!(p.y, 5.0);
    }

    #[test]
    fn orientation_zero_puts_sun_on_z() {
        let p = sun_position(&flat_sun(), 0.0, 2.0, 5.0);
        assert!(p.x.abs() < 1e-5);
        assert!((p.z - 2.0).abs() < 1e-5);
    }

    #[test]
    fn high_zenith_shrinks_radius() {
        let def = EnvironmentDefinition {
            zenith: 60.0,
            ..ENVIRONMENT_CATALOG[0]
        };
        let p = sun_position(&def, 0.0, 1.0, 1.0);
        assert!((p.z - 0.5).abs() < 1e-5);
    }

    #[test]
    fn catalog_lookup() {
        assert!(environment(0).is_some());
        assert!(environment(ENVIRONMENT_CATALOG.len()).is_none());
    }
}
