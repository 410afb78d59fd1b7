//! Synthetic star fields and frames for tests.

use glam::DVec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::raster::{CoordinateTransform, Filter, Frame, Raster, SkyCoordinate};

/// Sky position of the reference pixel of every synthetic frame.
pub const FIELD_CENTER: SkyCoordinate = SkyCoordinate {
    ra: 150.0,
    dec: 2.0,
};

pub const PIXEL_SCALE_ARCSEC: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
pub struct SyntheticStar {
    pub position: DVec2,
    pub amplitude: f32,
    pub sigma: f32,
}

impl SyntheticStar {
    pub fn new(x: f64, y: f64, amplitude: f32, sigma: f32) -> Self {
        Self {
            position: DVec2::new(x, y),
            amplitude,
            sigma,
        }
    }
}

fn gaussian_noise(rng: &mut StdRng) -> f32 {
    // Box-Muller
    let u1: f64 = rng.random::<f64>().max(1e-12);
    let u2: f64 = rng.random::<f64>();
    ((-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()) as f32
}

/// Constant background plus circular Gaussian stars plus Gaussian noise.
pub fn star_field(
    width: usize,
    height: usize,
    background: f32,
    stars: &[SyntheticStar],
    noise: f32,
    seed: u64,
) -> Raster {
    let mut rng = StdRng::seed_from_u64(seed);
    Raster::from_fn(width, height, |x, y| {
        let p = DVec2::new(x as f64, y as f64);
        let signal: f32 = stars
            .iter()
            .map(|s| {
                let r2 = (p - s.position).length_squared() as f32;
                s.amplitude * (-r2 / (2.0 * s.sigma * s.sigma)).exp()
            })
            .sum();
        let n = if noise > 0.0 {
            noise * gaussian_noise(&mut rng)
        } else {
            0.0
        };
        background + signal + n
    })
}

pub fn test_transform(width: usize, height: usize) -> CoordinateTransform {
    CoordinateTransform::from_scale(
        DVec2::new((width / 2) as f64, (height / 2) as f64),
        DVec2::new(FIELD_CENTER.ra, FIELD_CENTER.dec),
        PIXEL_SCALE_ARCSEC,
    )
}

pub fn test_frame(name: &str, pixels: Raster, wavelength: Option<f64>) -> Frame {
    let transform = test_transform(pixels.width(), pixels.height());
    Frame::new(name, pixels, transform, Filter::new(name, wavelength))
}

/// Sky coordinate of a pixel position in any frame built by [`test_frame`]
/// with the given size.
pub fn sky_at(width: usize, height: usize, pixel: DVec2) -> SkyCoordinate {
    test_transform(width, height).pixel_to_sky(pixel)
}
