//! Catalog objects and their per-frame detection state.
//!
//! A [`CatalogObject`] is the immutable catalog value plus pipeline flags.
//! Star- and galaxy-specific capabilities live in `star.rs` and `galaxy.rs`
//! and are reached through [`ObjectKind`].

mod galaxy;
mod star;


use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::catalog::{ExtendedSourceEntry, PointSourceEntry};
use crate::error::DetectionError;
use crate::extraction::DetectionConfig;
use crate::fitting::FittedModel;
use crate::raster::{Ellipse, Frame, SkyCoordinate};
use crate::source::Source;

pub use galaxy::GalaxyInfo;
pub use star::StarInfo;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectKind {
    Star(StarInfo),
    Galaxy(GalaxyInfo),
}

/// Everything attached to an object while one frame is processed.
#[derive(Debug, Clone, Default)]
pub struct DetectionState {
    pub source: Option<Source>,
    /// Set by a successful search or a catalog-parameter source. A saturation
    /// source attached to an undetected object leaves it unset.
    pub detected: bool,
    pub model: Option<FittedModel>,
    pub has_saturation: bool,
    /// Ellipse enclosing the saturation segment, in frame coordinates.
    pub aperture: Option<Ellipse>,
}

#[derive(Debug, Clone)]
pub struct CatalogObject {
    /// Row of the catalog this object was created from.
    pub index: usize,
    pub position: SkyCoordinate,
    pub kind: ObjectKind,
    pub ignore: bool,
    pub special: bool,
    pub detection: DetectionState,
}

impl CatalogObject {
    fn new(index: usize, position: SkyCoordinate, kind: ObjectKind) -> Self {
        Self {
            index,
            position,
            kind,
            ignore: false,
            special: false,
            detection: DetectionState::default(),
        }
    }

    pub fn from_extended(index: usize, entry: &ExtendedSourceEntry) -> Self {
        Self::new(index, entry.position(), ObjectKind::Galaxy(GalaxyInfo::from(entry)))
    }

    pub fn from_point(index: usize, entry: &PointSourceEntry) -> Self {
        Self::new(index, entry.position(), ObjectKind::Star(StarInfo::from(entry)))
    }

    pub fn star(&self) -> Option<&StarInfo> {
        match &self.kind {
            ObjectKind::Star(info) => Some(info),
            ObjectKind::Galaxy(_) => None,
        }
    }

    pub fn galaxy(&self) -> Option<&GalaxyInfo> {
        match &self.kind {
            ObjectKind::Galaxy(info) => Some(info),
            ObjectKind::Star(_) => None,
        }
    }

    pub fn pixel_position(&self, frame: &Frame) -> DVec2 {
        frame.pixel_position(self.position)
    }

    pub fn has_source(&self) -> bool {
        self.detection.source.is_some()
    }

    pub fn is_detected(&self) -> bool {
        self.detection.detected && self.has_source()
    }

    /// Attaches a source built from catalog parameters rather than a search.
    pub fn set_parameter_source(&mut self, source: Option<Source>) {
        self.detection.detected = source.is_some();
        self.detection.source = source;
    }

    pub fn has_model(&self) -> bool {
        self.detection.model.is_some()
    }

    /// Best known position: model center, detected peak, then catalog position.
    pub fn best_position(&self, frame: &Frame) -> DVec2 {
        if let Some(model) = &self.detection.model {
            return model.center;
        }
        self.detection
            .source
            .as_ref()
            .and_then(|s| s.peak)
            .unwrap_or_else(|| self.pixel_position(frame))
    }

    /// Search ellipse in pixels. Galaxies with a known extent use it; everything
    /// else gets a circle of `default_radius`.
    pub fn ellipse_parameters(&self, frame: &Frame, default_radius: f64) -> Ellipse {
        let center = self.pixel_position(frame);
        match &self.kind {
            ObjectKind::Galaxy(info) => info
                .pixel_ellipse(center, frame.pixel_scale_arcsec())
                .unwrap_or_else(|| Ellipse::circle(center, default_radius)),
            ObjectKind::Star(_) => Ellipse::circle(center, default_radius),
        }
    }

    /// Searches for a single peak near the catalog position, zooming in when
    /// the cutout holds several. On success the source is stored on the object.
    pub fn find_source(
        &mut self,
        frame: &Frame,
        config: &DetectionConfig,
    ) -> Result<(), DetectionError> {
        self.detection.source = None;
        self.detection.detected = false;
        let expected = self.pixel_position(frame);
        let ellipse = self.ellipse_parameters(frame, config.initial_radius);
        let mut source = Source::new(
            &frame.pixels,
            ellipse.center,
            ellipse.radius,
            ellipse.angle,
            config.inner_factor,
            config.outer_factor,
        )?;

        let mut zooms = 0;
        let peak = loop {
            source.estimate_background(config.background_method, config.sigma_clip, config.sigma)?;
            source.subtract_background()?;
            let peaks = source.locate_peaks(config.peak_threshold_sigmas);
            match peaks.len() {
                0 => return Err(DetectionError::NoPeak),
                1 => break peaks[0],
                count if zooms >= config.max_zooms => {
                    return Err(DetectionError::MultiplePeaks { count })
                }
                _ => {
                    source = source.zoom(config.zoom_factor)?;
                    zooms += 1;
                }
            }
        };

        let distance = peak.distance(expected);
        if distance > config.max_peak_offset {
            return Err(DetectionError::PeakTooFar {
                distance,
                max_distance: config.max_peak_offset,
            });
        }

        if config.find_segment
            && !source.find_center_segment(
                config.segment_threshold_sigmas,
                config.kernel_fwhm,
                config.kernel_size,
                config.min_pixels,
            )?
        {
            return Err(DetectionError::NoSegment);
        }

        self.detection.source = Some(source);
        self.detection.detected = true;
        Ok(())
    }
}
