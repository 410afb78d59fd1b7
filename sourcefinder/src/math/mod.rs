pub mod linear_solver;
pub mod polynomial;
pub mod statistics;

pub use polynomial::{Polynomial2D, MIN_POLYNOMIAL_SAMPLES};
pub use statistics::{
    fwhm_to_sigma, median_and_sigma, median_f32, sigma_clip_mask, sigma_clipped_statistics,
    sigma_to_fwhm, ClippedStatistics, FWHM_TO_SIGMA, MAD_TO_SIGMA,
};
