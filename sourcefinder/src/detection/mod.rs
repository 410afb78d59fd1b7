//! Low-level detection: smoothing kernels, threshold segmentation, peak finding.

mod kernel;
mod labeling;
mod peaks;

#[cfg(test)]
mod tests;

pub use kernel::GaussianKernel;
pub use labeling::{detect_sources, label_above_threshold};
pub use peaks::find_peaks;
