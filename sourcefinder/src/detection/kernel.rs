//! Gaussian smoothing kernels for matched filtering.

use crate::math::fwhm_to_sigma;
use crate::raster::Raster;

/// Normalized, separable, square Gaussian kernel with an odd side length.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel {
    weights: Vec<f32>,
    sigma: f64,
}

impl GaussianKernel {
    /// Kernel of the given `size` (forced odd) for a Gaussian of `fwhm` pixels.
    pub fn new(fwhm: f64, size: usize) -> Self {
        assert!(fwhm > 0.0, "kernel FWHM must be positive, got {}", fwhm);
        let sigma = fwhm_to_sigma(fwhm);
        let size = if size % 2 == 0 { size + 1 } else { size.max(1) };
        let radius = (size / 2) as f64;

        let two_sigma_sq = 2.0 * sigma * sigma;
        let mut weights: Vec<f32> = (0..size)
            .map(|i| {
                let x = i as f64 - radius;
                (-x * x / two_sigma_sq).exp() as f32
            })
            .collect();
        let sum: f32 = weights.iter().sum();
        for w in &mut weights {
            *w /= sum;
        }

        Self { weights, sigma }
    }

    /// Kernel truncated at `sigma_level` standard deviations.
    pub fn truncated(fwhm: f64, sigma_level: f64) -> Self {
        let radius = (sigma_level * fwhm_to_sigma(fwhm)).ceil() as usize;
        Self::new(fwhm, 2 * radius + 1)
    }

    pub fn size(&self) -> usize {
        self.weights.len()
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// 2-D weight at kernel offset `(i, j)`.
    pub fn weight(&self, i: usize, j: usize) -> f32 {
        self.weights[i] * self.weights[j]
    }

    /// Convolves `data` with the kernel. Edges are clamped; non-finite pixels
    /// are skipped and the remaining weights renormalized.
    pub fn convolve(&self, data: &Raster) -> Raster {
        let radius = (self.size() / 2) as i64;
        let (w, h) = (data.width() as i64, data.height() as i64);

        Raster::from_fn(data.width(), data.height(), |x, y| {
            let mut sum = 0.0f64;
            let mut weight_sum = 0.0f64;
            for (j, &wy) in self.weights.iter().enumerate() {
                let sy = (y as i64 + j as i64 - radius).clamp(0, h - 1) as usize;
                for (i, &wx) in self.weights.iter().enumerate() {
                    let sx = (x as i64 + i as i64 - radius).clamp(0, w - 1) as usize;
                    let value = data[(sx, sy)];
                    if value.is_finite() {
                        let weight = (wx * wy) as f64;
                        sum += weight * value as f64;
                        weight_sum += weight;
                    }
                }
            }
            if weight_sum > 0.0 {
                (sum / weight_sum) as f32
            } else {
                f32::NAN
            }
        })
    }
}
