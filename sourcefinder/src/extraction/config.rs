//! Settings of the per-frame extractors.
//!
//! Every struct deserializes with `#[serde(default)]`, so configuration files
//! only list what they change. Enum-valued settings fail at load time on
//! unknown names; `validate` checks numeric ranges.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::ConfigError;
use crate::fitting::FitConfig;
use crate::region::{Color, RegionAnnotation};
use crate::source::BackgroundMethod;

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must be positive, got {}", value)))
    }
}

fn check_factors(field: &'static str, inner: f64, outer: f64) -> Result<(), ConfigError> {
    if inner > 1.0 && outer > inner {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("need 1 < inner_factor < outer_factor, got {} and {}", inner, outer),
        ))
    }
}

fn check_kernel(field: &'static str, fwhm: f64, size: usize) -> Result<(), ConfigError> {
    check_positive(field, fwhm)?;
    if size == 0 {
        return Err(ConfigError::invalid(field, "kernel size must be at least 1"));
    }
    Ok(())
}

/// Peak search around a catalog position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Search radius in pixels for objects without a catalog extent.
    pub initial_radius: f64,
    pub inner_factor: f64,
    pub outer_factor: f64,
    pub background_method: BackgroundMethod,
    pub sigma_clip: bool,
    pub sigma: f32,
    pub peak_threshold_sigmas: f32,
    pub max_zooms: usize,
    pub zoom_factor: f64,
    /// Largest accepted distance in pixels between the peak and the catalog position.
    pub max_peak_offset: f64,
    /// Also require a segment under the source center.
    pub find_segment: bool,
    pub segment_threshold_sigmas: f32,
    pub kernel_fwhm: f64,
    pub kernel_size: usize,
    pub min_pixels: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            initial_radius: 10.0,
            inner_factor: 1.2,
            outer_factor: 2.0,
            background_method: BackgroundMethod::Polynomial,
            sigma_clip: true,
            sigma: 3.0,
            peak_threshold_sigmas: 5.0,
            max_zooms: 3,
            zoom_factor: 1.5,
            max_peak_offset: 4.0,
            find_segment: false,
            segment_threshold_sigmas: 2.0,
            kernel_fwhm: 3.0,
            kernel_size: 5,
            min_pixels: 5,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("detection.initial_radius", self.initial_radius)?;
        check_factors("detection.inner_factor", self.inner_factor, self.outer_factor)?;
        check_positive("detection.sigma", self.sigma as f64)?;
        check_positive("detection.peak_threshold_sigmas", self.peak_threshold_sigmas as f64)?;
        if self.zoom_factor <= 1.0 {
            return Err(ConfigError::invalid(
                "detection.zoom_factor",
                format!("must exceed 1, got {}", self.zoom_factor),
            ));
        }
        check_positive("detection.max_peak_offset", self.max_peak_offset)?;
        check_kernel("detection.kernel_fwhm", self.kernel_fwhm, self.kernel_size)?;
        Ok(())
    }
}

/// Model-sized removal of detected stars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    /// Aperture radius in model widths.
    pub sigma_level: f64,
    pub inner_factor: f64,
    pub outer_factor: f64,
    pub remove_if_undetected: bool,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            sigma_level: 4.0,
            inner_factor: 1.2,
            outer_factor: 2.0,
            remove_if_undetected: false,
        }
    }
}

impl RemovalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("removal.sigma_level", self.sigma_level)?;
        check_factors("removal.inner_factor", self.inner_factor, self.outer_factor)
    }
}

/// Which stars are searched for saturation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SaturationMethod {
    /// Every detected star that is not ignored.
    #[default]
    All,
    /// Only the brightest detected stars, see `brightest_percentile`.
    Brightest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaturationConfig {
    pub method: SaturationMethod,
    /// Share of detected stars, by flux, searched with `Brightest`, in percent.
    pub brightest_percentile: f64,
    /// Also search stars whose detection failed. They stay undetected in the table.
    pub remove_if_undetected: bool,
    /// Search radius in model widths.
    pub sigmas: f64,
    pub inner_factor: f64,
    pub outer_factor: f64,
    pub threshold_sigmas: f32,
    pub kernel_fwhm: f64,
    pub kernel_size: usize,
    pub min_pixels: usize,
}

impl Default for SaturationConfig {
    fn default() -> Self {
        Self {
            method: SaturationMethod::All,
            brightest_percentile: 10.0,
            remove_if_undetected: false,
            sigmas: 10.0,
            inner_factor: 1.2,
            outer_factor: 2.0,
            threshold_sigmas: 5.0,
            kernel_fwhm: 2.0,
            kernel_size: 5,
            min_pixels: 5,
        }
    }
}

impl SaturationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.brightest_percentile > 0.0 && self.brightest_percentile <= 100.0) {
            return Err(ConfigError::invalid(
                "saturation.brightest_percentile",
                format!("must be in (0, 100], got {}", self.brightest_percentile),
            ));
        }
        check_positive("saturation.sigmas", self.sigmas)?;
        check_factors("saturation.inner_factor", self.inner_factor, self.outer_factor)?;
        check_positive("saturation.threshold_sigmas", self.threshold_sigmas as f64)?;
        check_kernel("saturation.kernel_fwhm", self.kernel_fwhm, self.kernel_size)
    }
}

/// Ellipses enclosing saturation segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApertureConfig {
    /// Ellipse axes in units of the segment's second-moment widths.
    pub sigma_level: f64,
    pub inner_factor: f64,
    pub outer_factor: f64,
    pub remove: bool,
}

impl Default for ApertureConfig {
    fn default() -> Self {
        Self {
            sigma_level: 3.0,
            inner_factor: 1.2,
            outer_factor: 2.0,
            remove: true,
        }
    }
}

impl ApertureConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("aperture.sigma_level", self.sigma_level)?;
        check_factors("aperture.inner_factor", self.inner_factor, self.outer_factor)
    }
}

/// How the frame's default FWHM is derived from the fitted models.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FwhmMeasure {
    Max,
    Mean,
    #[default]
    Median,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StarRegionConfig {
    /// Circle radius in model widths.
    pub sigma_level: f64,
    pub annotation: RegionAnnotation,
}

impl Default for StarRegionConfig {
    fn default() -> Self {
        Self {
            sigma_level: 3.0,
            annotation: RegionAnnotation::None,
        }
    }
}

/// Thresholding of pixels not claimed by any catalog object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtherSourcesConfig {
    pub threshold_sigmas: f32,
    pub min_pixels: usize,
    /// Matched-filter kernel extent in kernel sigmas.
    pub kernel_sigma_level: f64,
    /// Used when the frame carries no PSF width.
    pub default_kernel_fwhm: f64,
    pub remove: bool,
    pub inner_factor: f64,
    pub outer_factor: f64,
    pub region_color: Color,
}

impl Default for OtherSourcesConfig {
    fn default() -> Self {
        Self {
            threshold_sigmas: 3.0,
            min_pixels: 5,
            kernel_sigma_level: 3.0,
            default_kernel_fwhm: 3.0,
            remove: true,
            inner_factor: 1.2,
            outer_factor: 2.0,
            region_color: Color::Magenta,
        }
    }
}

impl OtherSourcesConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_positive("other_sources.threshold_sigmas", self.threshold_sigmas as f64)?;
        if self.min_pixels == 0 {
            return Err(ConfigError::invalid("other_sources.min_pixels", "must be at least 1"));
        }
        check_positive("other_sources.kernel_sigma_level", self.kernel_sigma_level)?;
        check_positive("other_sources.default_kernel_fwhm", self.default_kernel_fwhm)?;
        check_factors("other_sources.inner_factor", self.inner_factor, self.outer_factor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointSourceConfig {
    /// Catalog names to query; empty means all.
    pub catalogs: Vec<String>,
    pub detection: DetectionConfig,
    pub fitting: FitConfig,
    pub fit_if_undetected: bool,
    /// Stars closer than this many pixels to the principal galaxy center are dropped.
    pub principal_exclusion_radius: f64,
    pub fwhm_measure: FwhmMeasure,
    /// Fallback when no star could be modelled and the frame has no PSF width.
    pub default_fwhm: f64,
    pub background_method: BackgroundMethod,
    pub sigma_clip: bool,
    pub remove: bool,
    pub removal: RemovalConfig,
    /// Also remove stars lying on galaxy segments.
    pub remove_foreground: bool,
    pub find_saturation: bool,
    pub saturation: SaturationConfig,
    pub find_apertures: bool,
    pub aperture: ApertureConfig,
    pub region: StarRegionConfig,
    /// Run the uncataloged-source scan inside the star task as well.
    pub scan_uncataloged: bool,
    pub other_sources: OtherSourcesConfig,
}

impl Default for PointSourceConfig {
    fn default() -> Self {
        Self {
            catalogs: Vec::new(),
            detection: DetectionConfig::default(),
            fitting: FitConfig::default(),
            fit_if_undetected: false,
            principal_exclusion_radius: 10.0,
            fwhm_measure: FwhmMeasure::Median,
            default_fwhm: 3.0,
            background_method: BackgroundMethod::Polynomial,
            sigma_clip: true,
            remove: true,
            removal: RemovalConfig::default(),
            remove_foreground: false,
            find_saturation: true,
            saturation: SaturationConfig::default(),
            find_apertures: true,
            aperture: ApertureConfig::default(),
            region: StarRegionConfig::default(),
            scan_uncataloged: false,
            other_sources: OtherSourcesConfig::default(),
        }
    }
}

impl PointSourceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detection.validate()?;
        self.fitting.validate()?;
        if self.principal_exclusion_radius < 0.0 {
            return Err(ConfigError::invalid(
                "point.principal_exclusion_radius",
                format!("must not be negative, got {}", self.principal_exclusion_radius),
            ));
        }
        check_positive("point.default_fwhm", self.default_fwhm)?;
        self.removal.validate()?;
        self.saturation.validate()?;
        self.aperture.validate()?;
        check_positive("point.region.sigma_level", self.region.sigma_level)?;
        self.other_sources.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtendedSourceConfig {
    pub detection: DetectionConfig,
    /// Build sources straight from the catalog extent when it is known.
    pub use_d25: bool,
    pub d25_expansion_factor: f64,
    pub background_method: BackgroundMethod,
    pub sigma_clip: bool,
    pub remove: bool,
    pub remove_principal: bool,
}

impl Default for ExtendedSourceConfig {
    fn default() -> Self {
        Self {
            detection: DetectionConfig {
                initial_radius: 20.0,
                max_peak_offset: 10.0,
                find_segment: true,
                ..DetectionConfig::default()
            },
            use_d25: true,
            d25_expansion_factor: 1.2,
            background_method: BackgroundMethod::Polynomial,
            sigma_clip: true,
            remove: false,
            remove_principal: false,
        }
    }
}

impl ExtendedSourceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detection.validate()?;
        check_positive("extended.d25_expansion_factor", self.d25_expansion_factor)
    }
}
