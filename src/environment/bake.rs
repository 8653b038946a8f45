// environment/bake.rs - CPU prefiltering of equirectangular HDR panoramas
use std::f32::consts::PI;

use glam::Vec3;
use half::f16;
use image::Rgba32FImage;

use crate::error::{Result, ViewerError};

/// Width of the smallest radiance level.
pub const MIN_RADIANCE_WIDTH: u32 = 8;
pub const IRRADIANCE_WIDTH: u32 = 32;
pub const IRRADIANCE_HEIGHT: u32 = 16;
/// Radiance levels wider than this are downsampled before the irradiance convolution.
const CONVOLUTION_SOURCE_WIDTH: u32 = 64;

/// One level of an equirectangular image in linear RGBA.
#[derive(Debug, Clone, PartialEq)]
pub struct HdrLevel {
    pub width: u32,
    pub height: u32,
    pub texels: Vec<[f32; 4]>,
}

impl HdrLevel {
    pub fn from_image(image: Rgba32FImage) -> Self {
        let (width, height) = image.dimensions();
        let texels = image
            .into_raw()
            .chunks_exact(4)
            .map(|c| [c[0], c[1], c[2], c[3]])
            .collect();
        Self {
            width,
            height,
            texels,
        }
    }

    pub fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        self.texels[(y * self.width + x) as usize]
    }

    /// 2x2 box filter. Odd edges clamp.
    pub fn downsample(&self) -> HdrLevel {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let mut texels = Vec::with_capacity((width * height) as usize);

        for y in 0..height {
            for x in 0..width {
                let mut sum = [0.0f32; 4];
                for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    let sx = (x * 2 + dx).min(self.width - 1);
                    let sy = (y * 2 + dy).min(self.height - 1);
                    let t = self.texel(sx, sy);
                    for c in 0..4 {
                        sum[c] += t[c];
                    }
                }
                texels.push(sum.map(|c| c * 0.25));
            }
        }

        HdrLevel {
            width,
            height,
            texels,
        }
    }

    /// Flattens to RGBA16F texel data for GPU upload.
    pub fn to_f16_bytes(&self) -> Vec<u8> {
        let halves: Vec<u16> = self
            .texels
            .iter()
            .flat_map(|t| t.iter().map(|&c| f16::from_f32(c).to_bits()))
            .collect();
        bytemuck::cast_slice(&halves).to_vec()
    }
}

/// Prefiltered lighting derived from one panorama.
#[derive(Debug, Clone)]
pub struct BakedEnvironment {
    pub label: String,
    /// Base level first, each next level half the size.
    pub radiance: Vec<HdrLevel>,
    pub irradiance: HdrLevel,
}

impl BakedEnvironment {
    pub fn mip_count(&self) -> u32 {
        self.radiance.len() as u32
    }
}

pub fn decode_panorama(bytes: &[u8], label: &str) -> Result<Rgba32FImage> {
    let image = image::load_from_memory(bytes).map_err(|err| ViewerError::decode(label, err))?;
    Ok(image.to_rgba32f())
}

/// Builds the radiance chain and the irradiance map, consuming the source pixels.
pub fn bake_environment(image: Rgba32FImage, max_width: u32, label: &str) -> BakedEnvironment {
    let mut base = HdrLevel::from_image(image);
    while base.width > max_width.max(MIN_RADIANCE_WIDTH) {
        base = base.downsample();
    }

    let mut radiance = vec![base];
    loop {
        let last = &radiance[radiance.len() - 1];
        if last.width <= MIN_RADIANCE_WIDTH || last.height <= 1 {
            break;
        }
        let next = last.downsample();
        radiance.push(next);
    }

    let source = radiance
        .iter()
        .find(|level| level.width <= CONVOLUTION_SOURCE_WIDTH)
        .unwrap_or(&radiance[radiance.len() - 1]);
    let irradiance = convolve_irradiance(source);

    log::info!(
        "Baked environment '{}': base {}x{}, {} radiance levels",
        label,
        radiance[0].width,
        radiance[0].height,
        radiance.len()
    );

    BakedEnvironment {
        label: label.to_string(),
        radiance,
        irradiance,
    }
}

/// Unit direction for equirectangular coordinates in [0, 1]. v = 0 is straight up.
pub fn direction_for_uv(u: f32, v: f32) -> Vec3 {
    let phi = (u - 0.5) * 2.0 * PI;
    let theta = v * PI;
    Vec3::new(theta.sin() * phi.sin(), theta.cos(), -theta.sin() * phi.cos())
}

fn convolve_irradiance(source: &HdrLevel) -> HdrLevel {
    let samples: Vec<(Vec3, Vec3, f32)> = (0..source.height)
        .flat_map(|y| (0..source.width).map(move |x| (x, y)))
        .map(|(x, y)| {
            let u = (x as f32 + 0.5) / source.width as f32;
            let v = (y as f32 + 0.5) / source.height as f32;
            let solid_angle = (2.0 * PI / source.width as f32)
                * (PI / source.height as f32)
                * (v * PI).sin();
            let t = source.texel(x, y);
            (
                direction_for_uv(u, v),
                Vec3::new(t[0], t[1], t[2]) * solid_angle,
                solid_angle,
            )
        })
        .collect();

    let mut texels = Vec::with_capacity((IRRADIANCE_WIDTH * IRRADIANCE_HEIGHT) as usize);
    for y in 0..IRRADIANCE_HEIGHT {
        for x in 0..IRRADIANCE_WIDTH {
            let normal = direction_for_uv(
                (x as f32 + 0.5) / IRRADIANCE_WIDTH as f32,
                (y as f32 + 0.5) / IRRADIANCE_HEIGHT as f32,
            );

            let mut sum = Vec3::ZERO;
            let mut weight = 0.0;
            for (direction, radiance, solid_angle) in &samples {
                let cos = normal.dot(*direction);
                if cos > 0.0 {
                    sum += *radiance * cos;
                    weight += cos * solid_angle;
                }
            }

            // Normalising by the discrete cosine integral keeps a flat panorama flat.
            let value = if weight > 0.0 { sum / weight } else { Vec3::ZERO };
            texels.push([value.x, value.y, value.z, 1.0]);
        }
    }

    HdrLevel {
        width: IRRADIANCE_WIDTH,
        height: IRRADIANCE_HEIGHT,
        texels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(width: u32, height: u32, value: f32) -> Rgba32FImage {
        Rgba32FImage::from_pixel(width, height, image::Rgba([value, value, value, 1.0]))
    }

    #[test]
    fn uniform_panorama_bakes_uniform_irradiance() {
        let baked = bake_environment(uniform(128, 64, 0.5), 1024, "flat");

        for texel in &baked.irradiance.texels {
            for c in &texel[..3] {
                assert!((c - 0.5).abs() < 1e-3, "irradiance {} drifted", c);
            }
        }
    }

    #[test]
    fn radiance_chain_ends_at_minimum_width() {
        let baked = bake_environment(uniform(256, 128, 1.0), 1024, "chain");
        let widths: Vec<u32> = baked.radiance.iter().map(|l| l.width).collect();
        assert_eq!(widths, vec![256, 128, 64, 32, 16, 8]);
        assert_eq!(baked.mip_count(), 6);
    }

    #[test]
    fn base_level_respects_max_width() {
        let baked = bake_environment(uniform(512, 256, 1.0), 128, "capped");
        assert_eq!(baked.radiance[0].width, 128);
        assert_eq!(baked.radiance[0].height, 64);
    }

    #[test]
    fn bright_sky_lights_upward_normals_more() {
        let mut image = uniform(64, 32, 0.0);
        for (_, y, pixel) in image.enumerate_pixels_mut() {
            if y < 16 {
                *pixel = image::Rgba([1.0, 1.0, 1.0, 1.0]);
            }
        }
        let baked = bake_environment(image, 1024, "sky");
        let top = baked.irradiance.texel(0, 0)[0];
        let bottom = baked.irradiance.texel(0, IRRADIANCE_HEIGHT - 1)[0];
        assert!(top > bottom);
    }

    #[test]
    fn direction_poles() {
        assert!((direction_for_uv(0.5, 0.0) - Vec3::Y).length() < 1e-5);
        assert!((direction_for_uv(0.5, 0.5) - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn f16_upload_size() {
        let level = HdrLevel::from_image(uniform(4, 2, 1.0));
        assert_eq!(level.to_f16_bytes().len(), 4 * 2 * 4 * 2);
    }

    #[test]
    fn undecodable_panorama_fails() {
        let err = decode_panorama(b"nope", "env.hdr").unwrap_err();
        assert!(matches!(err, ViewerError::DecodeFailed { .. }));
    }
}
