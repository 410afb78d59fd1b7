//! Sourcefinder - multi-frame astronomical source detection and removal.
//!
//! Given co-registered frames (one per band) and catalogs of known objects,
//! the pipeline:
//! - finds galaxies and stars near their catalog positions
//! - fits analytic profiles and removes the objects with local backgrounds
//! - removes saturation blobs and the apertures enclosing them
//! - detects uncataloged sources
//! - merges per-frame results into cross-band tables
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sourcefinder::{FinderConfig, FrameSet, SourceFinder, StaticCatalogSource};
//!
//! let catalogs = StaticCatalogSource::from_files(Some(extended), Some(point))?;
//! let mut finder = SourceFinder::new(FinderConfig::default(), Box::new(catalogs))?;
//! finder.add_frame_set(FrameSet::from_directory(frames_dir)?);
//! finder.run();
//! finder.write(output_dir)?;
//! ```

pub mod catalog;
pub(crate) mod detection;
pub mod diagnostics;
pub mod error;
pub mod extraction;
pub mod finder;
pub(crate) mod fitting;
pub(crate) mod math;
pub mod object;
pub mod raster;
pub mod region;
pub mod source;
pub mod table;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Frames and rasters
// ============================================================================

pub use raster::{
    Buffer2, CoordinateTransform, Cutout, Ellipse, Filter, Frame, Mask, Raster, SegmentationMap,
    SkyBox, SkyCoordinate,
};

// ============================================================================
// Detection units
// ============================================================================

pub use fitting::{FitConfig, FittedModel, ModelFamily};
pub use object::{CatalogObject, DetectionState, GalaxyInfo, ObjectKind, StarInfo};
pub use source::{BackgroundMethod, Source};

// ============================================================================
// Per-frame extraction
// ============================================================================

pub use extraction::{
    DetectionConfig, ExtendedSourceConfig, ExtendedTask, Extractor, FrameMasks, FrameOutput,
    FrameTask, FwhmMeasure, OtherSourcesConfig, OtherTask, PointSourceConfig, PointTask,
    SaturationMethod, SourceClass,
};

// ============================================================================
// Orchestration
// ============================================================================

pub use catalog::{CatalogSource, ExtendedSourceEntry, PointSourceEntry, StaticCatalogSource};
pub use diagnostics::{Diagnostics, ObjectFailure, RunDiagnostics, Stage};
pub use error::{CatalogError, ConfigError, DetectionError, Error, FitError, FrameError, TaskError};
pub use finder::{ColourWindow, CrossBandEntry, FinderConfig, FrameSet, SourceFinder};
pub use region::{Color, Region, RegionAnnotation, RegionList};
pub use table::{FrameRow, FrameTable};
