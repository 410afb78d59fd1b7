//! A candidate detection region: a cutout around a position plus a larger
//! background box whose annulus drives background estimation.
//!
//! Geometry is fixed at construction. `estimated_background`, `subtracted`,
//! `mask` and `peak` are derived from it and reset whenever it changes.

#[cfg(test)]
mod tests;

use glam::DVec2;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::detection::{detect_sources, find_peaks, GaussianKernel};
use crate::error::DetectionError;
use crate::math::{sigma_clip_mask, sigma_clipped_statistics, Polynomial2D};
use crate::raster::{Cutout, Ellipse, Mask, Raster};

/// Neighborhood used for local maximum detection.
const PEAK_BOX_SIZE: usize = 5;
/// Clipping level for the statistics behind segmentation and peak thresholds.
const STATS_CLIP_SIGMA: f32 = 3.0;
const CLIP_ITERATIONS: usize = 5;
const MIN_MEAN_SAMPLES: usize = 3;

/// How the background under a source is modelled.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BackgroundMethod {
    /// Third-order polynomial surface fitted to the annulus.
    #[default]
    Polynomial,
    /// Mean of the annulus pixels.
    LocalMean,
}

#[derive(Debug, Clone)]
pub struct Source {
    pub center: DVec2,
    pub radius: DVec2,
    pub angle: f64,
    inner_factor: f64,
    outer_factor: f64,

    pub cutout: Cutout,
    pub background: Cutout,
    /// On the background box; `true` excludes the inner ellipse from the annulus.
    pub background_mask: Mask,

    /// Pixels of the source itself, on the cutout.
    pub mask: Option<Mask>,
    /// On the background box.
    pub estimated_background: Option<Raster>,
    /// On the cutout.
    pub estimated_background_cutout: Option<Raster>,
    pub subtracted: Option<Raster>,
    pub peak: Option<DVec2>,
}

impl Source {
    /// Builds the cutout (`radius`), the background box (`radius × outer_factor`)
    /// and the annulus mask excluding `radius × inner_factor`.
    pub fn new(
        frame: &Raster,
        center: DVec2,
        radius: DVec2,
        angle: f64,
        inner_factor: f64,
        outer_factor: f64,
    ) -> Result<Self, DetectionError> {
        assert!(
            inner_factor > 1.0,
            "inner_factor must be greater than 1, got {}",
            inner_factor
        );
        assert!(
            outer_factor > inner_factor,
            "outer_factor ({}) must exceed inner_factor ({})",
            outer_factor,
            inner_factor
        );
        assert!(
            radius.x > 0.0 && radius.y > 0.0,
            "source radius must be positive, got {:?}",
            radius
        );

        let ellipse = Ellipse::new(center, radius, angle);
        let background = Cutout::from_frame(frame, &ellipse.scaled(outer_factor))?;
        Self::with_geometry(ellipse, inner_factor, outer_factor, background)
    }

    fn with_geometry(
        ellipse: Ellipse,
        inner_factor: f64,
        outer_factor: f64,
        background: Cutout,
    ) -> Result<Self, DetectionError> {
        let cutout = Cutout::within(&background, &ellipse)?;
        let background_mask = background.ellipse_mask(&ellipse.scaled(inner_factor));
        Ok(Self {
            center: ellipse.center,
            radius: ellipse.radius,
            angle: ellipse.angle,
            inner_factor,
            outer_factor,
            cutout,
            background,
            background_mask,
            mask: None,
            estimated_background: None,
            estimated_background_cutout: None,
            subtracted: None,
            peak: None,
        })
    }

    pub fn ellipse(&self) -> Ellipse {
        Ellipse::new(self.center, self.radius, self.angle)
    }

    pub fn has_background(&self) -> bool {
        self.estimated_background_cutout.is_some()
    }

    pub fn is_subtracted(&self) -> bool {
        self.subtracted.is_some()
    }

    /// Annulus pixels as `(x, y, value)` on the background box, NaN excluded.
    fn annulus_samples(&self) -> Vec<(usize, usize, f32)> {
        self.background
            .pixels
            .iter_xy()
            .filter(|&(x, y, v)| !self.background_mask[(x, y)] && v.is_finite())
            .map(|(x, y, &v)| (x, y, v))
            .collect()
    }

    /// Models the background over the box from the annulus pixels and crops it
    /// to the cutout. Deterministic: repeated calls produce identical values.
    pub fn estimate_background(
        &mut self,
        method: BackgroundMethod,
        sigma_clip: bool,
        sigma: f32,
    ) -> Result<(), DetectionError> {
        let mut samples = self.annulus_samples();
        if sigma_clip {
            let values: Vec<f32> = samples.iter().map(|s| s.2).collect();
            let rejected = sigma_clip_mask(&values, sigma, CLIP_ITERATIONS);
            samples = samples
                .into_iter()
                .zip(rejected)
                .filter(|(_, rejected)| !rejected)
                .map(|(sample, _)| sample)
                .collect();
        }

        let (width, height) = self.background.pixels.shape();
        let estimated = match method {
            BackgroundMethod::Polynomial => {
                Polynomial2D::fit(&samples, width, height)?.evaluate_grid(width, height)
            }
            BackgroundMethod::LocalMean => {
                if samples.len() < MIN_MEAN_SAMPLES {
                    return Err(DetectionError::InsufficientBackground {
                        available: samples.len(),
                        required: MIN_MEAN_SAMPLES,
                    });
                }
                let mean = samples.iter().map(|s| s.2 as f64).sum::<f64>() / samples.len() as f64;
                Raster::new_filled(width, height, mean as f32)
            }
        };

        self.estimated_background_cutout = Some(self.background.crop_like(&estimated, &self.cutout));
        self.estimated_background = Some(estimated);
        self.subtracted = None;
        Ok(())
    }

    pub fn subtract_background(&mut self) -> Result<(), DetectionError> {
        let background = self
            .estimated_background_cutout
            .as_ref()
            .ok_or(DetectionError::BackgroundNotEstimated)?;
        let pixels = self
            .cutout
            .pixels
            .pixels()
            .iter()
            .zip(background.pixels())
            .map(|(c, b)| c - b)
            .collect();
        self.subtracted = Some(Raster::new(self.cutout.width(), self.cutout.height(), pixels));
        Ok(())
    }

    /// Segments the smoothed cutout against `mean + std × threshold_sigmas` of
    /// the clipped annulus and keeps the segment under the nominal center.
    ///
    /// Returns `Ok(false)` and leaves `mask` unset when no segment covers the center.
    pub fn find_center_segment(
        &mut self,
        threshold_sigmas: f32,
        kernel_fwhm: f64,
        kernel_size: usize,
        min_pixels: usize,
    ) -> Result<bool, DetectionError> {
        let values: Vec<f32> = self.annulus_samples().into_iter().map(|s| s.2).collect();
        let stats = sigma_clipped_statistics(&values, STATS_CLIP_SIGMA, CLIP_ITERATIONS)
            .filter(|s| s.count >= MIN_MEAN_SAMPLES)
            .ok_or(DetectionError::InsufficientBackground {
                available: values.len(),
                required: MIN_MEAN_SAMPLES,
            })?;
        let threshold = stats.mean + stats.std * threshold_sigmas;

        let kernel = GaussianKernel::new(kernel_fwhm, kernel_size);
        let segments = detect_sources(&self.cutout.pixels, threshold, min_pixels, Some(&kernel));

        let rel = self.cutout.rel_position(self.center).round();
        let label = segments
            .get_checked(rel.x as i64, rel.y as i64)
            .copied()
            .unwrap_or(0);
        if label == 0 {
            self.mask = None;
            return Ok(false);
        }
        self.mask = Some(Mask::from_label(&segments, label));
        Ok(true)
    }

    /// Local maxima above `median + threshold_sigmas × std` of the subtracted
    /// cutout (raw cutout if not subtracted), in frame coordinates.
    ///
    /// Caches `peak` only when exactly one maximum is found.
    pub fn locate_peaks(&mut self, threshold_sigmas: f32) -> Vec<DVec2> {
        let data = self.subtracted.as_ref().unwrap_or(&self.cutout.pixels);
        let Some(stats) = sigma_clipped_statistics(data.pixels(), STATS_CLIP_SIGMA, CLIP_ITERATIONS)
        else {
            return Vec::new();
        };
        let threshold = stats.median + threshold_sigmas * stats.std;

        let peaks: Vec<DVec2> = find_peaks(data, threshold, PEAK_BOX_SIZE)
            .into_iter()
            .map(|p| self.cutout.abs_position(p))
            .collect();
        if let [single] = peaks.as_slice() {
            self.peak = Some(*single);
        }
        peaks
    }

    /// Independent copy with every radius divided by `factor`, re-cropped
    /// around the same center. Derived fields are reset.
    pub fn zoom(&self, factor: f64) -> Result<Source, DetectionError> {
        assert!(factor > 0.0, "zoom factor must be positive, got {}", factor);
        let ellipse = Ellipse::new(self.center, self.radius / factor, self.angle);
        let background = Cutout::within(&self.background, &ellipse.scaled(self.outer_factor))?;
        Self::with_geometry(ellipse, self.inner_factor, self.outer_factor, background)
    }

    /// Marks the whole elliptical aperture as the source's pixels.
    pub fn use_aperture_mask(&mut self) {
        self.mask = Some(self.cutout.ellipse_mask(&self.ellipse()));
    }

    /// Pixels replaced on removal: the segment if known, else the aperture.
    pub fn removal_mask(&self) -> Mask {
        match &self.mask {
            Some(mask) => mask.clone(),
            None => self.cutout.ellipse_mask(&self.ellipse()),
        }
    }

    /// Sum over the removal mask of the subtracted (else raw) cutout.
    pub fn flux(&self) -> f64 {
        let data = self.subtracted.as_ref().unwrap_or(&self.cutout.pixels);
        self.removal_mask()
            .pixels()
            .iter()
            .zip(data.pixels())
            .filter(|(&m, v)| m && v.is_finite())
            .map(|(_, &v)| v as f64)
            .sum()
    }

    /// Writes the estimated background into `frame` under the removal mask.
    pub fn replace_in(&self, frame: &mut Raster) -> Result<usize, DetectionError> {
        let background = self
            .estimated_background_cutout
            .as_ref()
            .ok_or(DetectionError::BackgroundNotEstimated)?;
        Ok(self.cutout.replace(frame, background, &self.removal_mask()))
    }

    /// Ellipse with the second moments of the segment, in frame coordinates.
    pub fn segment_ellipse(&self) -> Option<Ellipse> {
        let mask = self.mask.as_ref()?;
        let points: Vec<DVec2> = mask
            .iter_xy()
            .filter(|(_, _, &m)| m)
            .map(|(x, y, _)| DVec2::new(x as f64, y as f64))
            .collect();
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let mean = points.iter().fold(DVec2::ZERO, |acc, p| acc + *p) / n;
        let (mut cxx, mut cyy, mut cxy) = (0.0, 0.0, 0.0);
        for p in &points {
            let d = *p - mean;
            cxx += d.x * d.x;
            cyy += d.y * d.y;
            cxy += d.x * d.y;
        }
        // Pixels are unit squares: add their own variance so single-pixel segments stay finite.
        let (cxx, cyy, cxy) = (cxx / n + 1.0 / 12.0, cyy / n + 1.0 / 12.0, cxy / n);

        let half_trace = (cxx + cyy) / 2.0;
        let spread = (((cxx - cyy) / 2.0).powi(2) + cxy * cxy).sqrt();
        let major = (half_trace + spread).sqrt();
        let minor = (half_trace - spread).max(0.0).sqrt();
        let angle = 0.5 * (2.0 * cxy).atan2(cxx - cyy);

        Some(Ellipse::new(
            self.cutout.abs_position(mean),
            DVec2::new(major, minor.max(f64::EPSILON)),
            angle,
        ))
    }
}
