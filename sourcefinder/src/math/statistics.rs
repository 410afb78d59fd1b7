//! Robust statistics: median, MAD, sigma clipping.

/// MAD to standard deviation conversion factor for a normal distribution.
pub const MAD_TO_SIGMA: f32 = 1.4826022;

/// `σ = FWHM × FWHM_TO_SIGMA` for a Gaussian profile.
pub const FWHM_TO_SIGMA: f64 = 0.424_660_900_144_009_5;

#[inline]
pub fn fwhm_to_sigma(fwhm: f64) -> f64 {
    fwhm * FWHM_TO_SIGMA
}

#[inline]
pub fn sigma_to_fwhm(sigma: f64) -> f64 {
    sigma / FWHM_TO_SIGMA
}

/// Median of `data`, reordering it. NaN must be filtered out by the caller.
pub fn median_f32_mut(data: &mut [f32]) -> f32 {
    debug_assert!(!data.is_empty());

    let len = data.len();
    let mid = len / 2;
    let (left_part, median, _) = data.select_nth_unstable_by(mid, f32::total_cmp);
    let upper = *median;
    if len % 2 == 1 {
        return upper;
    }
    let lower = left_part.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    (lower + upper) * 0.5
}

/// Median of a slice without touching it.
pub fn median_f32(data: &[f32]) -> Option<f32> {
    if data.is_empty() {
        return None;
    }
    let mut scratch = data.to_vec();
    Some(median_f32_mut(&mut scratch))
}

/// Median and MAD-based sigma.
pub fn median_and_sigma(data: &[f32]) -> Option<(f32, f32)> {
    let median = median_f32(data)?;
    let mut deviations: Vec<f32> = data.iter().map(|v| (v - median).abs()).collect();
    Some((median, median_f32_mut(&mut deviations) * MAD_TO_SIGMA))
}

fn mean_and_std(values: &[f32]) -> (f32, f32) {
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = values
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    (mean as f32, variance.sqrt() as f32)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClippedStatistics {
    pub mean: f32,
    pub median: f32,
    pub std: f32,
    /// Number of values that survived clipping.
    pub count: usize,
}

/// Iteratively rejects values further than `sigma` standard deviations from
/// the median, recomputing the median and deviation from the survivors.
///
/// Non-finite values are ignored. Returns a flag per input value, `true` for
/// rejected (or non-finite) values.
pub fn sigma_clip_mask(values: &[f32], sigma: f32, max_iterations: usize) -> Vec<bool> {
    let mut rejected: Vec<bool> = values.iter().map(|v| !v.is_finite()).collect();
    let mut survivors: Vec<f32> = Vec::with_capacity(values.len());

    for _ in 0..max_iterations {
        survivors.clear();
        survivors.extend(
            values
                .iter()
                .zip(&rejected)
                .filter(|(_, &r)| !r)
                .map(|(&v, _)| v),
        );
        if survivors.len() < 3 {
            break;
        }
        let (_, std) = mean_and_std(&survivors);
        let median = median_f32_mut(&mut survivors);
        let limit = sigma * std;

        let mut changed = false;
        for (value, flag) in values.iter().zip(rejected.iter_mut()) {
            if !*flag && (value - median).abs() > limit {
                *flag = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    rejected
}

/// Mean, median and standard deviation of the values surviving [`sigma_clip_mask`].
pub fn sigma_clipped_statistics(
    values: &[f32],
    sigma: f32,
    max_iterations: usize,
) -> Option<ClippedStatistics> {
    let rejected = sigma_clip_mask(values, sigma, max_iterations);
    let mut survivors: Vec<f32> = values
        .iter()
        .zip(&rejected)
        .filter(|(_, &r)| !r)
        .map(|(&v, _)| v)
        .collect();
    if survivors.is_empty() {
        return None;
    }
    let (mean, std) = mean_and_std(&survivors);
    let median = median_f32_mut(&mut survivors);
    Some(ClippedStatistics {
        mean,
        median,
        std,
        count: survivors.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median_f32(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median_f32(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median_f32(&[]), None);
    }

    #[test]
    fn test_mad_sigma_of_constant_is_zero() {
        let (median, sigma) = median_and_sigma(&[5.0; 9]).unwrap();
        assert_eq!(median, 5.0);
        assert_eq!(sigma, 0.0);
    }

    #[test]
    fn test_sigma_clip_rejects_outlier() {
        let mut values: Vec<f32> = (0..100).map(|i| 10.0 + (i % 5) as f32 * 0.1).collect();
        values.push(1000.0);

        let rejected = sigma_clip_mask(&values, 3.0, 5);

        assert!(rejected[100], "outlier should be clipped");
        assert_eq!(rejected.iter().filter(|&&r| r).count(), 1);
    }

    #[test]
    fn test_clipped_statistics_ignore_outliers_and_nan() {
        let mut values: Vec<f32> = (0..200).map(|i| if i % 2 == 0 { 9.0 } else { 11.0 }).collect();
        values.extend([500.0, -400.0, f32::NAN]);

        let stats = sigma_clipped_statistics(&values, 3.0, 5).unwrap();

        assert!((stats.mean - 10.0).abs() < 1e-4, "mean = {}", stats.mean);
        assert!((stats.median - 10.0).abs() < 1e-4, "median = {}", stats.median);
        assert!((stats.std - 1.0).abs() < 1e-4, "std = {}", stats.std);
        assert_eq!(stats.count, 200);
    }

    #[test]
    fn test_fwhm_sigma_conversion() {
        let sigma = fwhm_to_sigma(2.354_820_045);
        assert!((sigma - 1.0).abs() < 1e-8);
        assert!((sigma_to_fwhm(1.0) - 2.354_820_045).abs() < 1e-8);
    }
}
