use glam::{Mat4, Vec3};

use crate::scene::model::Bounds;
use crate::settings::OrbitSettings;

/// Distance multiplier applied when framing a freshly loaded model.
pub const FIT_OFFSET: f32 = 1.5;
const MOTION_EPSILON: f32 = 1e-5;

#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y_radians: f32,
    pub near: f32,
    pub far: f32,
    pub aspect: f32,
}

impl Camera {
    /// Viewer camera for a scene of the given scale: 35 degree FOV, looking at the origin.
    pub fn for_space(space_size: f32, aspect: f32) -> Self {
        Self {
            eye: Vec3::new(-space_size * 0.2, space_size, space_size),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y_radians: 35f32.to_radians(),
            near: 0.01,
            far: space_size * 100.0,
            aspect,
        }
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }
    pub fn proj(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_radians, self.aspect, self.near, self.far)
    }
    pub fn view_proj(&self) -> Mat4 {
        self.proj() * self.view()
    }
    pub fn position(&self) -> Vec3 {
        self.eye
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::for_space(1.0, 16.0 / 9.0)
    }
}

/// Orbit camera input accepted by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrbitInput {
    /// Pointer drag in pixels, relative to a viewport of `viewport_height` pixels.
    Rotate {
        dx: f32,
        dy: f32,
        viewport_height: f32,
    },
    /// Wheel steps; positive zooms in.
    Zoom(f32),
}

/// Damped orbit around a target in spherical coordinates. No panning.
#[derive(Debug, Clone)]
pub struct OrbitController {
    settings: OrbitSettings,
    min_distance: f32,
    max_distance: f32,
    theta_delta: f32,
    phi_delta: f32,
    zoom_scale: f32,
}

impl OrbitController {
    pub fn new(settings: OrbitSettings, space_size: f32) -> Self {
        Self {
            settings,
            min_distance: settings.min_distance * space_size,
            max_distance: settings.max_distance * space_size,
            theta_delta: 0.0,
            phi_delta: 0.0,
            zoom_scale: 1.0,
        }
    }

    pub fn handle(&mut self, input: OrbitInput) {
        match input {
            OrbitInput::Rotate {
                dx,
                dy,
                viewport_height,
            } => {
                let height = viewport_height.max(1.0);
                let speed = self.settings.rotate_speed;
                self.theta_delta -= std::f32::consts::TAU * dx / height * speed;
                self.phi_delta -= std::f32::consts::TAU * dy / height * speed;
            }
            OrbitInput::Zoom(steps) => {
                self.zoom_scale *= 0.95f32.powf(steps * self.settings.zoom_speed);
            }
        }
    }

    pub fn is_moving(&self) -> bool {
        self.theta_delta.abs() > MOTION_EPSILON
            || self.phi_delta.abs() > MOTION_EPSILON
            || (self.zoom_scale - 1.0).abs() > MOTION_EPSILON
    }

    /// Advances one damped step. Returns true while motion remains.
    pub fn update(&mut self, camera: &mut Camera) -> bool {
        let offset = camera.eye - camera.target;
        let mut radius = offset.length().max(f32::EPSILON);
        let mut theta = offset.x.atan2(offset.z);
        let mut phi = (offset.y / radius).clamp(-1.0, 1.0).acos();

        let damping = self.settings.damping_factor;
        theta += self.theta_delta * damping;
        phi += self.phi_delta * damping;
        phi = phi.clamp(self.settings.min_polar, self.settings.max_polar);

        radius = (radius * self.zoom_scale).clamp(self.min_distance, self.max_distance);

        camera.eye = camera.target
            + Vec3::new(
                radius * phi.sin() * theta.sin(),
                radius * phi.cos(),
                radius * phi.sin() * theta.cos(),
            );

        self.theta_delta *= 1.0 - damping;
        self.phi_delta *= 1.0 - damping;
        self.zoom_scale = 1.0;

        if self.theta_delta.abs() <= MOTION_EPSILON {
            self.theta_delta = 0.0;
        }
        if self.phi_delta.abs() <= MOTION_EPSILON {
            self.phi_delta = 0.0;
        }

        self.is_moving()
    }

    /// Frames `bounds` along the current view direction.
    pub fn fit_to_bounds(&mut self, camera: &mut Camera, bounds: &Bounds, offset: f32) {
        let size = bounds.size();
        let center = bounds.center();
        let max_size = size.x.max(size.y).max(size.z).max(f32::EPSILON);

        let fit_height = max_size / (2.0 * (camera.fov_y_radians * 0.5).tan());
        let fit_width = fit_height / camera.aspect.max(f32::EPSILON);
        let distance = offset * fit_height.max(fit_width);

        let direction = (camera.target - camera.eye).normalize_or_zero();
        let direction = if direction == Vec3::ZERO {
            Vec3::NEG_Z
        } else {
            direction
        };

        self.max_distance = self.max_distance.max(distance * 10.0);
        camera.target = center;
        camera.eye = center - direction * distance;
        camera.near = distance / 100.0;
        camera.far = distance * 100.0;

        log::debug!(
            "Fitted camera to bounds {:?}..{:?} at distance {:.3}",
            bounds.min,
            bounds.max,
            distance
        );
    }

    pub fn distance_limits(&self) -> (f32, f32) {
        (self.min_distance, self.max_distance)
    }
}
