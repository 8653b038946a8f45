use std::path::PathBuf;

use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerSettings {
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub present_mode: PresentModeSetting,
    /// Delay before the loading indicator hides once every load has finished.
    #[serde(default = "ViewerSettings::default_loading_settle_ms")]
    pub loading_settle_ms: u64,
    /// Scene scale used for camera placement, sun placement and orbit limits.
    #[serde(default = "ViewerSettings::default_space_size")]
    pub space_size: f32,
    #[serde(default = "ViewerSettings::default_asset_root")]
    pub asset_root: PathBuf,
    #[serde(default = "ViewerSettings::default_catalog_path")]
    pub catalog_path: PathBuf,
    #[serde(default = "ViewerSettings::default_environment_max_width")]
    pub environment_max_width: u32,
    #[serde(default)]
    pub orbit: OrbitSettings,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            present_mode: PresentModeSetting::default(),
            loading_settle_ms: Self::default_loading_settle_ms(),
            space_size: Self::default_space_size(),
            asset_root: Self::default_asset_root(),
            catalog_path: Self::default_catalog_path(),
            environment_max_width: Self::default_environment_max_width(),
            orbit: OrbitSettings::default(),
        }
    }
}

impl ViewerSettings {
    pub fn load() -> Self {
        Self::load_from_path("settings.json")
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<ViewerSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded viewer settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default viewer settings.",
                        path, err
                    );
                    ViewerSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Viewer settings file {:?} not found. Using default settings.",
                    path
                );
                ViewerSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default viewer settings.",
                    path, err
                );
                ViewerSettings::default()
            }
        }
    }

    fn validate(mut self) -> Self {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            warn!("Resolution must be greater than zero. Using default resolution.");
            self.resolution = Resolution::default();
        }

        if !(self.space_size.is_finite() && self.space_size > 0.0) {
            warn!("Space size must be positive. Using default value.");
            self.space_size = Self::default_space_size();
        }

        if self.environment_max_width < 8 {
            warn!("Environment width must be at least 8 pixels. Using default value.");
            self.environment_max_width = Self::default_environment_max_width();
        }

        self.orbit = self.orbit.validate();
        self
    }

    pub fn loading_settle(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.loading_settle_ms)
    }

    pub fn present_mode(&self, available: &[wgpu::PresentMode]) -> wgpu::PresentMode {
        let desired = self.present_mode.to_wgpu();
        if available.contains(&desired) {
            return desired;
        }

        warn!(
            "Requested present mode {:?} is not supported. Falling back to FIFO.",
            desired
        );

        if available.contains(&wgpu::PresentMode::Fifo) {
            wgpu::PresentMode::Fifo
        } else {
            available
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo)
        }
    }

    const fn default_loading_settle_ms() -> u64 {
        600
    }

    const fn default_space_size() -> f32 {
        1.0
    }

    fn default_asset_root() -> PathBuf {
        PathBuf::from("assets")
    }

    fn default_catalog_path() -> PathBuf {
        PathBuf::from("catalog.json")
    }

    const fn default_environment_max_width() -> u32 {
        1024
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Orbit camera limits. Distances are multiples of the scene space size.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitSettings {
    pub damping_factor: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar: f32,
    pub max_polar: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
}

impl Default for OrbitSettings {
    fn default() -> Self {
        Self {
            damping_factor: 0.05,
            min_distance: 0.3,
            max_distance: 1.0,
            min_polar: 0.1,
            max_polar: std::f32::consts::FRAC_PI_2,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
        }
    }
}

impl OrbitSettings {
    fn validate(mut self) -> Self {
        let defaults = OrbitSettings::default();

        if !(self.damping_factor > 0.0 && self.damping_factor <= 1.0) {
            warn!("Orbit damping must be in (0, 1]. Using default value.");
            self.damping_factor = defaults.damping_factor;
        }

        if !(self.min_distance > 0.0 && self.min_distance <= self.max_distance) {
            warn!("Orbit distance limits are inconsistent. Using default limits.");
            self.min_distance = defaults.min_distance;
            self.max_distance = defaults.max_distance;
        }

        if !(self.min_polar >= 0.0
            && self.min_polar < self.max_polar
            && self.max_polar <= std::f32::consts::PI)
        {
            warn!("Orbit polar limits are inconsistent. Using default limits.");
            self.min_polar = defaults.min_polar;
            self.max_polar = defaults.max_polar;
        }

        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeSetting {
    Fifo,
    FifoRelaxed,
    Immediate,
    Mailbox,
    AutoVsync,
    AutoNoVsync,
}

impl PresentModeSetting {
    fn to_wgpu(&self) -> wgpu::PresentMode {
        match self {
            PresentModeSetting::Fifo => wgpu::PresentMode::Fifo,
            PresentModeSetting::FifoRelaxed => wgpu::PresentMode::FifoRelaxed,
            PresentModeSetting::Immediate => wgpu::PresentMode::Immediate,
            PresentModeSetting::Mailbox => wgpu::PresentMode::Mailbox,
            PresentModeSetting::AutoVsync => wgpu::PresentMode::AutoVsync,
            PresentModeSetting::AutoNoVsync => wgpu::PresentMode::AutoNoVsync,
        }
    }
}

impl Default for PresentModeSetting {
    fn default() -> Self {
        PresentModeSetting::Fifo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let invalid = ViewerSettings {
            resolution: Resolution {
                width: 0,
                height: 0,
            },
            space_size: -1.0,
            environment_max_width: 2,
            orbit: OrbitSettings {
                min_distance: 2.0,
                max_distance: 1.0,
                min_polar: 2.0,
                max_polar: 1.0,
                ..OrbitSettings::default()
            },
            ..ViewerSettings::default()
        };

        let validated = invalid.validate();
        let defaults = ViewerSettings::default();

        assert_eq!(validated.resolution.width, defaults.resolution.width);
        assert_eq!(validated.space_size, defaults.space_size);
        assert_eq!(
            validated.environment_max_width,
            defaults.environment_max_width
        );
        assert_eq!(validated.orbit.min_distance, defaults.orbit.min_distance);
        assert_eq!(validated.orbit.max_polar, defaults.orbit.max_polar);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let settings: ViewerSettings =
            serde_json::from_str(r#"{"loading_settle_ms": 250}"#).unwrap();
        assert_eq!(settings.loading_settle_ms, 250);
        assert_eq!(settings.space_size, 1.0);
        assert_eq!(settings.orbit.damping_factor, 0.05);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let settings = ViewerSettings::load_from_path("does/not/exist/settings.json");
        assert_eq!(settings.loading_settle_ms, 600);
    }

    #[test]
    fn present_mode_falls_back_to_fifo_when_desired_missing() {
        let settings = ViewerSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..ViewerSettings::default()
        };

        let available = [wgpu::PresentMode::Fifo, wgpu::PresentMode::Immediate];

        assert_eq!(settings.present_mode(&available), wgpu::PresentMode::Fifo);
    }

    #[test]
    fn present_mode_uses_first_available_when_fifo_missing() {
        let settings = ViewerSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..ViewerSettings::default()
        };

        let available = [wgpu::PresentMode::Immediate];

        assert_eq!(
            settings.present_mode(&available),
            wgpu::PresentMode::Immediate
        );
    }
}
