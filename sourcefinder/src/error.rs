use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use common::SerdeFormatError;

/// Recoverable failures of a single object's detection, background or removal step.
///
/// These never abort a frame: they are recorded in the frame's diagnostics and
/// the batch continues with the next object.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum DetectionError {
    #[error("too few background pixels: {available} available, {required} required")]
    InsufficientBackground { available: usize, required: usize },

    #[error("background has not been estimated")]
    BackgroundNotEstimated,

    #[error("position ({x:.1}, {y:.1}) lies outside the frame")]
    OutsideFrame { x: f64, y: f64 },

    #[error("no peak above threshold")]
    NoPeak,

    #[error("{count} peaks found after zooming, expected one")]
    MultiplePeaks { count: usize },

    #[error("peak lies {distance:.1} px from the expected position (max {max_distance:.1})")]
    PeakTooFar { distance: f64, max_distance: f64 },

    #[error("no segment found at the source center")]
    NoSegment,

    #[error("background surface fit is singular")]
    SingularFit,
}

/// Failures of analytic profile fitting.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum FitError {
    #[error("too few valid pixels for fitting: {available}, need {required}")]
    TooFewPixels { available: usize, required: usize },

    #[error("fitted center ({x:.1}, {y:.1}) lies outside the cutout")]
    CenterOutside { x: f64, y: f64 },

    #[error("fitted amplitude must be positive, got {0}")]
    NonPositiveAmplitude(f64),

    #[error("fitted FWHM {fwhm:.2} outside [{min:.2}, {max:.2}]")]
    FwhmOutOfRange { fwhm: f64, min: f64, max: f64 },

    #[error("fit produced non-finite parameters")]
    NonFinite,

    #[error("fit did not converge within {iterations} iterations")]
    NotConverged { iterations: usize },
}

/// Invalid frame content. A frame task that hits one of these fails as a whole.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum FrameError {
    #[error("frame '{frame}': pixel count {actual} does not match {width}x{height}")]
    ShapeMismatch {
        frame: String,
        width: usize,
        height: usize,
        actual: usize,
    },

    #[error("frame '{frame}': error map shape differs from the frame")]
    ErrorMapShape { frame: String },

    #[error("frame '{frame}' contains no finite pixels")]
    NoFinitePixels { frame: String },

    #[error("mask '{mask}' shape differs from frame '{frame}'")]
    MaskShape { frame: String, mask: String },
}

/// Invalid configuration values, detected before any processing starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("failed to load configuration: {0}")]
    Load(#[from] SerdeFormatError),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Failures at the catalog-service boundary. Fatal to the stage that needs the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog service unavailable: {0}")]
    Unavailable(String),

    #[error("failed to read catalog '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed catalog table: {0}")]
    Csv(#[from] csv::Error),
}

/// Terminal failure of one frame's task in a worker pool.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum TaskError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task result channel closed before a result was sent")]
    Disconnected,
}

/// Crate-level error for setup, input and output.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Format(#[from] SerdeFormatError),

    #[error("failed to write table: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("FITS error on '{path}': {source}")]
    Fits {
        path: PathBuf,
        source: fitsio::errors::Error,
    },

    #[error("unsupported FITS image in '{path}': {reason}")]
    FitsLayout { path: PathBuf, reason: String },

    #[error("frame '{frame}': {reason}")]
    Descriptor { frame: String, reason: String },

    #[error("frame '{0}' is not loaded")]
    UnknownFrame(String),

    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, Error>;
