use std::path::Path;

use serde::{Deserialize, Serialize};

use common::file_format::read_file;

use crate::error::ConfigError;
use crate::extraction::{ExtendedSourceConfig, OtherSourcesConfig, PointSourceConfig};

/// Accepted range of the colour `-2.5 log10(F_first / F_second)` for star candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColourWindow {
    pub first: String,
    pub second: String,
    pub min: f64,
    pub max: f64,
}

impl ColourWindow {
    pub fn new(first: impl Into<String>, second: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
            min,
            max,
        }
    }

    /// `None` when either flux is missing or not positive.
    pub fn colour(&self, first_flux: Option<f64>, second_flux: Option<f64>) -> Option<f64> {
        match (first_flux, second_flux) {
            (Some(f1), Some(f2)) if f1 > 0.0 && f2 > 0.0 => Some(-2.5 * (f1 / f2).log10()),
            _ => None,
        }
    }

    pub fn accepts(&self, colour: f64) -> bool {
        (self.min..=self.max).contains(&colour)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinderConfig {
    /// Worker threads per stage.
    pub processes: usize,
    pub find_galaxies: bool,
    pub find_stars: bool,
    pub find_other_sources: bool,
    /// Frames above this wavelength (micron) are skipped by the star stage.
    pub star_wavelength_cutoff: f64,
    pub colour_windows: Vec<ColourWindow>,
    pub extended: ExtendedSourceConfig,
    pub point: PointSourceConfig,
    pub other_sources: OtherSourcesConfig,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            processes: 4,
            find_galaxies: true,
            find_stars: true,
            find_other_sources: true,
            star_wavelength_cutoff: 25.0,
            colour_windows: Vec::new(),
            extended: ExtendedSourceConfig::default(),
            point: PointSourceConfig::default(),
            other_sources: OtherSourcesConfig::default(),
        }
    }
}

impl FinderConfig {
    /// Loads a YAML or JSON file and validates it.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processes == 0 {
            return Err(ConfigError::invalid("processes", "must be at least 1"));
        }
        if self.star_wavelength_cutoff.is_nan() || self.star_wavelength_cutoff <= 0.0 {
            return Err(ConfigError::invalid(
                "star_wavelength_cutoff",
                format!("must be positive, got {}", self.star_wavelength_cutoff),
            ));
        }
        for window in &self.colour_windows {
            if window.first == window.second {
                return Err(ConfigError::invalid(
                    "colour_windows",
                    format!("window compares band '{}' with itself", window.first),
                ));
            }
            if window.min > window.max {
                return Err(ConfigError::invalid(
                    "colour_windows",
                    format!(
                        "{}-{}: min {} exceeds max {}",
                        window.first, window.second, window.min, window.max
                    ),
                ));
            }
        }
        self.extended.validate()?;
        self.point.validate()?;
        self.other_sources.validate()
    }
}
