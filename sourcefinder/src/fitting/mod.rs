//! Analytic profile fitting of detected sources.

mod lm_optimizer;
mod models;

#[cfg(test)]
mod tests;

use glam::DVec2;
use serde::{Deserialize, Serialize};

pub use lm_optimizer::{optimize, FitData, LmSettings, Optimum, ProfileModel};
pub use models::{CircularGaussian, CircularMoffat, ModelFamily, PROFILE_PARAMS};

use crate::error::{ConfigError, FitError};
use crate::math::{fwhm_to_sigma, median_f32};
use crate::source::Source;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Tried in order; the first successful fit is kept.
    pub model_families: Vec<ModelFamily>,
    /// Starting FWHM in pixels.
    pub initial_fwhm: f64,
    pub min_fwhm: f64,
    pub max_fwhm: f64,
    /// Wing slope of the Moffat family.
    pub moffat_beta: f64,
    pub max_iterations: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            model_families: vec![ModelFamily::Gaussian, ModelFamily::Moffat],
            initial_fwhm: 3.0,
            min_fwhm: 1.0,
            max_fwhm: 20.0,
            moffat_beta: 2.5,
            max_iterations: 100,
        }
    }
}

impl FitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_fwhm <= 0.0 {
            return Err(ConfigError::invalid(
                "fitting.initial_fwhm",
                format!("must be positive, got {}", self.initial_fwhm),
            ));
        }
        if !(self.min_fwhm > 0.0 && self.min_fwhm < self.max_fwhm) {
            return Err(ConfigError::invalid(
                "fitting.min_fwhm",
                format!(
                    "need 0 < min_fwhm < max_fwhm, got {} and {}",
                    self.min_fwhm, self.max_fwhm
                ),
            ));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::invalid(
                "fitting.max_iterations",
                "must be at least 1",
            ));
        }
        if self.moffat_beta <= 0.0 || self.moffat_beta > 10.0 {
            return Err(ConfigError::invalid(
                "fitting.moffat_beta",
                format!("must be in (0, 10], got {}", self.moffat_beta),
            ));
        }
        Ok(())
    }
}

/// A successfully fitted profile. `center` is in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub family: ModelFamily,
    pub amplitude: f64,
    pub center: DVec2,
    pub fwhm: f64,
    pub offset: f64,
}

impl FittedModel {
    /// Gaussian-equivalent width.
    pub fn sigma(&self) -> f64 {
        fwhm_to_sigma(self.fwhm)
    }
}

/// Fits one model family to the subtracted cutout (raw cutout if the
/// background has not been subtracted), starting at the detected peak.
pub fn fit_profile(
    source: &Source,
    family: ModelFamily,
    config: &FitConfig,
) -> Result<FittedModel, FitError> {
    let raster = source.subtracted.as_ref().unwrap_or(&source.cutout.pixels);
    let mut data = FitData::default();
    let mut values = Vec::with_capacity(raster.len());
    for (x, y, &v) in raster.iter_xy() {
        if v.is_finite() {
            data.push(x as f64, y as f64, v as f64);
            values.push(v);
        }
    }
    let required = 2 * PROFILE_PARAMS;
    if data.len() < required {
        return Err(FitError::TooFewPixels {
            available: data.len(),
            required,
        });
    }

    let start = source
        .peak
        .map(|p| source.cutout.rel_position(p))
        .unwrap_or_else(|| source.cutout.rel_position(source.center));
    let offset = median_f32(&values).unwrap_or(0.0) as f64;
    let maximum = values.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    let amplitude = maximum - offset;

    let settings = LmSettings {
        max_iterations: config.max_iterations,
        ..LmSettings::default()
    };
    let (optimum, fwhm) = match family {
        ModelFamily::Gaussian => {
            let initial = [start.x, start.y, amplitude, fwhm_to_sigma(config.initial_fwhm), offset];
            let optimum = optimize(&CircularGaussian, &data, initial, &settings);
            (optimum, CircularGaussian::fwhm(optimum.params[3]))
        }
        ModelFamily::Moffat => {
            let model = CircularMoffat::new(config.moffat_beta);
            let initial = [start.x, start.y, amplitude, model.alpha(config.initial_fwhm), offset];
            let optimum = optimize(&model, &data, initial, &settings);
            (optimum, model.fwhm(optimum.params[3]))
        }
    };
    if !optimum.converged {
        return Err(FitError::NotConverged {
            iterations: optimum.iterations,
        });
    }
    let params = optimum.params;

    if params.iter().any(|p| !p.is_finite()) || !fwhm.is_finite() {
        return Err(FitError::NonFinite);
    }
    let (x0, y0) = (params[0], params[1]);
    let max_x = (source.cutout.width() - 1) as f64;
    let max_y = (source.cutout.height() - 1) as f64;
    if !(0.0..=max_x).contains(&x0) || !(0.0..=max_y).contains(&y0) {
        return Err(FitError::CenterOutside { x: x0, y: y0 });
    }
    if params[2] <= 0.0 {
        return Err(FitError::NonPositiveAmplitude(params[2]));
    }
    if fwhm < config.min_fwhm || fwhm > config.max_fwhm {
        return Err(FitError::FwhmOutOfRange {
            fwhm,
            min: config.min_fwhm,
            max: config.max_fwhm,
        });
    }

    Ok(FittedModel {
        family,
        amplitude: params[2],
        center: source.cutout.abs_position(DVec2::new(x0, y0)),
        fwhm,
        offset: params[4],
    })
}

/// Tries each configured family in order and returns the first that fits,
/// along with the failures of the families tried before it.
pub fn fit_first(
    source: &Source,
    config: &FitConfig,
) -> (Option<FittedModel>, Vec<(ModelFamily, FitError)>) {
    let mut failures = Vec::new();
    for &family in &config.model_families {
        match fit_profile(source, family, config) {
            Ok(model) => return (Some(model), failures),
            Err(err) => failures.push((family, err)),
        }
    }
    (None, failures)
}
