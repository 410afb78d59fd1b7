//! Third-order 2-D polynomial surfaces for local background modelling.

use super::linear_solver::solve;
use crate::error::DetectionError;
use crate::raster::Raster;

const TERMS: usize = 10;

/// `c0 + c1 u + c2 v + c3 u² + c4 uv + c5 v² + c6 u³ + c7 u²v + c8 uv² + c9 v³`
/// with `u`, `v` the pixel coordinates mapped to [-1, 1] over the fitted box.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial2D {
    coefficients: [f64; TERMS],
    center: (f64, f64),
    half_size: (f64, f64),
}

/// Minimum number of samples for a fit.
pub const MIN_POLYNOMIAL_SAMPLES: usize = 2 * TERMS;

#[inline]
fn basis(u: f64, v: f64) -> [f64; TERMS] {
    [
        1.0,
        u,
        v,
        u * u,
        u * v,
        v * v,
        u * u * u,
        u * u * v,
        u * v * v,
        v * v * v,
    ]
}

impl Polynomial2D {
    /// Least-squares fit to `(x, y, value)` samples on a `width x height` box.
    #[allow(clippy::needless_range_loop)]
    pub fn fit(
        samples: &[(usize, usize, f32)],
        width: usize,
        height: usize,
    ) -> Result<Self, DetectionError> {
        if samples.len() < MIN_POLYNOMIAL_SAMPLES {
            return Err(DetectionError::InsufficientBackground {
                available: samples.len(),
                required: MIN_POLYNOMIAL_SAMPLES,
            });
        }

        let center = ((width as f64 - 1.0) / 2.0, (height as f64 - 1.0) / 2.0);
        let half_size = (center.0.max(1.0), center.1.max(1.0));
        let mut surface = Self {
            coefficients: [0.0; TERMS],
            center,
            half_size,
        };

        let mut normal = [[0.0f64; TERMS]; TERMS];
        let mut rhs = [0.0f64; TERMS];
        for &(x, y, value) in samples {
            let (u, v) = surface.normalize(x as f64, y as f64);
            let row = basis(u, v);
            for i in 0..TERMS {
                rhs[i] += row[i] * value as f64;
                for j in i..TERMS {
                    normal[i][j] += row[i] * row[j];
                }
            }
        }
        for i in 1..TERMS {
            for j in 0..i {
                normal[i][j] = normal[j][i];
            }
        }

        surface.coefficients = solve(&normal, &rhs).ok_or(DetectionError::SingularFit)?;
        Ok(surface)
    }

    #[inline]
    fn normalize(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.center.0) / self.half_size.0,
            (y - self.center.1) / self.half_size.1,
        )
    }

    pub fn coefficients(&self) -> &[f64; TERMS] {
        &self.coefficients
    }

    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        let (u, v) = self.normalize(x, y);
        basis(u, v)
            .iter()
            .zip(&self.coefficients)
            .map(|(b, c)| b * c)
            .sum()
    }

    pub fn evaluate_grid(&self, width: usize, height: usize) -> Raster {
        Raster::from_fn(width, height, |x, y| self.evaluate(x as f64, y as f64) as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovers_cubic_surface() {
        let truth = |x: f64, y: f64| 5.0 + 0.1 * x - 0.05 * y + 0.002 * x * y + 1e-4 * x * x * x;
        let samples: Vec<(usize, usize, f32)> = (0..20)
            .flat_map(|y| (0..20).map(move |x| (x, y)))
            .map(|(x, y)| (x, y, truth(x as f64, y as f64) as f32))
            .collect();

        let surface = Polynomial2D::fit(&samples, 20, 20).unwrap();

        for (x, y) in [(0.0, 0.0), (7.0, 13.0), (19.0, 19.0)] {
            let got = surface.evaluate(x, y);
            let want = truth(x, y);
            assert!((got - want).abs() < 1e-3, "({}, {}): {} vs {}", x, y, got, want);
        }
    }

    #[test]
    fn test_too_few_samples() {
        let samples = vec![(0, 0, 1.0f32); MIN_POLYNOMIAL_SAMPLES - 1];
        assert!(matches!(
            Polynomial2D::fit(&samples, 10, 10),
            Err(DetectionError::InsufficientBackground { available: 19, required: 20 })
        ));
    }

    #[test]
    fn test_degenerate_geometry_is_singular() {
        // All samples on one row: y terms are unconstrained.
        let samples: Vec<(usize, usize, f32)> = (0..30).map(|x| (x, 0, 1.0)).collect();
        assert!(matches!(
            Polynomial2D::fit(&samples, 30, 5),
            Err(DetectionError::SingularFit)
        ));
    }
}
