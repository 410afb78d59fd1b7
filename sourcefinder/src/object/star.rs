use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::CatalogObject;
use crate::catalog::PointSourceEntry;
use crate::error::{DetectionError, FitError};
use crate::extraction::{ApertureConfig, RemovalConfig, SaturationConfig};
use crate::fitting::{fit_first, FitConfig, ModelFamily};
use crate::math::fwhm_to_sigma;
use crate::raster::{Ellipse, Frame};
use crate::source::{BackgroundMethod, Source};

/// Clipping level used when estimating backgrounds for removal.
const REMOVAL_CLIP_SIGMA: f32 = 3.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarInfo {
    pub catalog: String,
    pub id: String,
    /// Arcseconds.
    pub ra_error: Option<f64>,
    pub dec_error: Option<f64>,
    pub b_mag: Option<f64>,
    pub v_mag: Option<f64>,
    pub r_mag: Option<f64>,
    pub i_mag: Option<f64>,
    pub j_mag: Option<f64>,
    pub h_mag: Option<f64>,
    pub k_mag: Option<f64>,
}

impl From<&PointSourceEntry> for StarInfo {
    fn from(entry: &PointSourceEntry) -> Self {
        Self {
            catalog: entry.catalog.clone(),
            id: entry.id.clone(),
            ra_error: entry.ra_error,
            dec_error: entry.dec_error,
            b_mag: entry.b_mag,
            v_mag: entry.v_mag,
            r_mag: entry.r_mag,
            i_mag: entry.i_mag,
            j_mag: entry.j_mag,
            h_mag: entry.h_mag,
            k_mag: entry.k_mag,
        }
    }
}

impl CatalogObject {
    /// FWHM of the fitted model, if any.
    pub fn fwhm(&self) -> Option<f64> {
        self.detection.model.map(|m| m.fwhm)
    }

    /// Fits the configured model families in order against `source` (the
    /// stored source when `None`). The first family that fits is kept; the
    /// failures of the others are returned.
    pub fn fit_model(
        &mut self,
        config: &FitConfig,
        source: Option<&Source>,
    ) -> Vec<(ModelFamily, FitError)> {
        let Some(source) = source.or(self.detection.source.as_ref()) else {
            return Vec::new();
        };
        let (model, failures) = fit_first(source, config);
        self.detection.model = model;
        failures
    }

    /// A circular source whose radius is `sigma_level` model widths (or
    /// default widths without a model), centered on the best known position.
    /// Its pixel mask is the full aperture.
    pub fn source_at_sigma_level(
        &self,
        frame: &Frame,
        default_fwhm: f64,
        sigma_level: f64,
        inner_factor: f64,
        outer_factor: f64,
    ) -> Result<Source, DetectionError> {
        let sigma = self
            .detection
            .model
            .map(|m| m.sigma())
            .unwrap_or_else(|| fwhm_to_sigma(default_fwhm));
        let radius = sigma * sigma_level;
        let center = self.best_position(frame);
        let mut source = Source::new(
            &frame.pixels,
            center,
            DVec2::splat(radius),
            0.0,
            inner_factor,
            outer_factor,
        )?;
        source.use_aperture_mask();
        Ok(source)
    }

    /// Replaces the star's aperture with the local background. Undetected
    /// stars are only removed when the config allows it.
    ///
    /// Returns whether any pixels were replaced.
    pub fn remove(
        &self,
        frame: &mut Frame,
        config: &RemovalConfig,
        default_fwhm: f64,
        method: BackgroundMethod,
        sigma_clip: bool,
    ) -> Result<bool, DetectionError> {
        if !self.is_detected() && !config.remove_if_undetected {
            return Ok(false);
        }
        let mut source = self.source_at_sigma_level(
            frame,
            default_fwhm,
            config.sigma_level,
            config.inner_factor,
            config.outer_factor,
        )?;
        source.estimate_background(method, sigma_clip, REMOVAL_CLIP_SIGMA)?;
        Ok(source.replace_in(&mut frame.pixels)? > 0)
    }

    /// Looks for a saturation blob around the catalog position. When one is
    /// found it replaces the stored source and is removed from the frame.
    /// The detected flag is left as it was.
    ///
    /// `Ok(false)` means no blob covers the position, which is not an error.
    pub fn remove_saturation(
        &mut self,
        frame: &mut Frame,
        config: &SaturationConfig,
        default_fwhm: f64,
        method: BackgroundMethod,
        sigma_clip: bool,
    ) -> Result<bool, DetectionError> {
        let sigma = self
            .detection
            .model
            .map(|m| m.sigma())
            .unwrap_or_else(|| fwhm_to_sigma(default_fwhm));
        let mut source = Source::new(
            &frame.pixels,
            self.pixel_position(frame),
            DVec2::splat(sigma * config.sigmas),
            0.0,
            config.inner_factor,
            config.outer_factor,
        )?;
        if !source.find_center_segment(
            config.threshold_sigmas,
            config.kernel_fwhm,
            config.kernel_size,
            config.min_pixels,
        )? {
            return Ok(false);
        }
        source.estimate_background(method, sigma_clip, REMOVAL_CLIP_SIGMA)?;
        source.subtract_background()?;
        source.replace_in(&mut frame.pixels)?;
        self.detection.source = Some(source);
        self.detection.has_saturation = true;
        Ok(true)
    }

    /// Stores and returns the ellipse enclosing the saturation segment.
    pub fn find_aperture(&mut self, sigma_level: f64) -> Option<Ellipse> {
        if !self.detection.has_saturation {
            return None;
        }
        let aperture = self
            .detection
            .source
            .as_ref()?
            .segment_ellipse()?
            .scaled(sigma_level);
        self.detection.aperture = Some(aperture);
        Some(aperture)
    }

    /// Replaces the pixels inside the stored aperture with the local background.
    pub fn remove_aperture(
        &self,
        frame: &mut Frame,
        config: &ApertureConfig,
        method: BackgroundMethod,
        sigma_clip: bool,
    ) -> Result<bool, DetectionError> {
        let Some(aperture) = self.detection.aperture else {
            return Ok(false);
        };
        let mut source = Source::new(
            &frame.pixels,
            aperture.center,
            aperture.radius,
            aperture.angle,
            config.inner_factor,
            config.outer_factor,
        )?;
        source.use_aperture_mask();
        source.estimate_background(method, sigma_clip, REMOVAL_CLIP_SIGMA)?;
        Ok(source.replace_in(&mut frame.pixels)? > 0)
    }
}
