//! Per-frame extraction.
//!
//! A task is an owned, serializable value holding one frame, the catalog rows
//! it needs and its configuration. Running it yields a [`FrameOutput`] that
//! carries no reference back to the orchestrator.

mod config;
mod extended;
mod other;
mod point;


use glam::DVec2;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

pub use config::{
    ApertureConfig, DetectionConfig, ExtendedSourceConfig, FwhmMeasure, OtherSourcesConfig,
    PointSourceConfig, RemovalConfig, SaturationConfig, SaturationMethod, StarRegionConfig,
};
pub use extended::ExtendedTask;
pub use other::OtherTask;
pub use point::{aggregate_fwhm, PointTask};

use crate::diagnostics::Diagnostics;
use crate::error::{FrameError, TaskError};
use crate::object::CatalogObject;
use crate::raster::{Cutout, Frame, Mask, Raster, SegmentationMap};
use crate::region::RegionList;
use crate::table::FrameTable;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceClass {
    Galaxies,
    Stars,
    Other,
}

/// Optional per-frame masks, each the shape of the frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameMasks {
    /// Objects under it get extra logging.
    pub special: Option<Mask>,
    /// Objects under it are skipped; its pixels are excluded from the uncataloged scan.
    pub ignore: Option<Mask>,
    /// Objects under it are dropped (principal galaxies excepted).
    pub bad: Option<Mask>,
}

impl FrameMasks {
    pub fn validate(&self, frame: &Frame) -> Result<(), FrameError> {
        let masks = [
            ("special", &self.special),
            ("ignore", &self.ignore),
            ("bad", &self.bad),
        ];
        for (name, mask) in masks {
            if let Some(mask) = mask {
                if !mask.same_shape(&frame.pixels) || !mask.is_consistent() {
                    return Err(FrameError::MaskShape {
                        frame: frame.name.clone(),
                        mask: name.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn is_bad(&self, position: DVec2) -> bool {
        self.bad.as_ref().is_some_and(|m| m.masks(position))
    }

    /// Sets the `special` and `ignore` flags from the object positions.
    pub fn flag(&self, objects: &mut [CatalogObject], frame: &Frame) {
        for object in objects {
            let position = object.pixel_position(frame);
            object.special = self.special.as_ref().is_some_and(|m| m.masks(position));
            object.ignore = self.ignore.as_ref().is_some_and(|m| m.masks(position));
        }
    }
}

/// Result of one frame's extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameOutput {
    pub frame: String,
    pub class: SourceClass,
    pub table: FrameTable,
    pub regions: RegionList,
    pub saturation_regions: Option<RegionList>,
    pub segments: SegmentationMap,
    /// Uncataloged segments found by the star task, when it scans for them.
    pub other_segments: Option<SegmentationMap>,
    /// Frame pixels after removal.
    pub pixels: Raster,
    /// Frame FWHM derived from the fitted stars.
    pub fwhm: Option<f64>,
    pub diagnostics: Diagnostics,
}

impl FrameOutput {
    fn empty(frame: &Frame, class: SourceClass) -> Self {
        Self {
            frame: frame.name.clone(),
            class,
            table: FrameTable::default(),
            regions: RegionList::new(),
            saturation_regions: None,
            segments: SegmentationMap::new_default(frame.width(), frame.height()),
            other_segments: None,
            pixels: frame.pixels.clone(),
            fwhm: None,
            diagnostics: Diagnostics::new(frame.name.clone()),
        }
    }
}

pub trait Extractor {
    fn frame(&self) -> &Frame;

    /// Checks that the inputs are consistent before extraction starts.
    fn validate(&self) -> Result<(), FrameError>;

    /// Runs every stage of the extraction. Per-object failures end up in the
    /// output diagnostics.
    fn extract(self) -> FrameOutput;
}

/// Message sent to a worker: one frame's work for one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FrameTask {
    Extended(ExtendedTask),
    Point(PointTask),
    Other(OtherTask),
}

impl FrameTask {
    pub fn frame_name(&self) -> &str {
        match self {
            FrameTask::Extended(task) => &task.frame().name,
            FrameTask::Point(task) => &task.frame().name,
            FrameTask::Other(task) => &task.frame().name,
        }
    }

    pub fn run(self) -> Result<FrameOutput, TaskError> {
        match self {
            FrameTask::Extended(task) => run_validated(task),
            FrameTask::Point(task) => run_validated(task),
            FrameTask::Other(task) => run_validated(task),
        }
    }
}

fn run_validated<E: Extractor>(task: E) -> Result<FrameOutput, TaskError> {
    task.frame().validate()?;
    task.validate()?;
    Ok(task.extract())
}

fn check_segments(
    frame: &Frame,
    segments: Option<&SegmentationMap>,
    name: &str,
) -> Result<(), FrameError> {
    match segments {
        Some(segments) if !segments.same_shape(&frame.pixels) || !segments.is_consistent() => {
            Err(FrameError::MaskShape {
                frame: frame.name.clone(),
                mask: name.to_string(),
            })
        }
        _ => Ok(()),
    }
}

/// Writes `label` into `segments` wherever `mask` (laid out on `cutout`) is set.
fn paint_label(segments: &mut SegmentationMap, cutout: &Cutout, mask: &Mask, label: u32) {
    for (x, y, &covered) in mask.iter_xy() {
        let (fx, fy) = (cutout.x_min + x, cutout.y_min + y);
        if covered && fx < segments.width() && fy < segments.height() {
            segments[(fx, fy)] = label;
        }
    }
}
