use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{paint_label, ExtendedSourceConfig, Extractor, FrameMasks, FrameOutput, SourceClass};
use crate::catalog::ExtendedSourceEntry;
use crate::diagnostics::{Diagnostics, Stage};
use crate::error::{DetectionError, FrameError};
use crate::object::CatalogObject;
use crate::raster::{Frame, Raster, SegmentationMap};
use crate::region::{Color, Region, RegionList};
use crate::source::Source;
use crate::table::{FrameRow, FrameTable};

pub const PRINCIPAL_LABEL: u32 = 1;
pub const COMPANION_LABEL: u32 = 2;
pub const OTHER_GALAXY_LABEL: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedTask {
    pub frame: Frame,
    pub catalog: Vec<ExtendedSourceEntry>,
    pub masks: FrameMasks,
    pub config: ExtendedSourceConfig,
}

fn label_of(object: &CatalogObject) -> u32 {
    if object.is_principal() {
        PRINCIPAL_LABEL
    } else if object.is_companion() {
        COMPANION_LABEL
    } else {
        OTHER_GALAXY_LABEL
    }
}

impl ExtendedTask {
    /// Parameter-derived source with its background estimated and subtracted.
    fn parameter_source(
        &self,
        object: &CatalogObject,
    ) -> Result<Option<Source>, DetectionError> {
        let config = &self.config;
        let Some(mut source) = object.source_from_parameters(
            &self.frame,
            config.d25_expansion_factor,
            config.detection.inner_factor,
            config.detection.outer_factor,
        )?
        else {
            return Ok(None);
        };
        source.estimate_background(
            config.background_method,
            config.sigma_clip,
            config.detection.sigma,
        )?;
        source.subtract_background()?;
        Ok(Some(source))
    }

    fn load_galaxies(&self) -> Vec<CatalogObject> {
        let mut objects = Vec::new();
        for (index, entry) in self.catalog.iter().enumerate() {
            let object = CatalogObject::from_extended(index, entry);
            let position = object.pixel_position(&self.frame);
            if !self.frame.contains(position) {
                debug!(frame = %self.frame.name, galaxy = %entry.name, "outside the frame");
                continue;
            }
            if self.masks.is_bad(position) && !object.is_principal() {
                debug!(frame = %self.frame.name, galaxy = %entry.name, "on a bad pixel");
                continue;
            }
            objects.push(object);
        }
        self.masks.flag(&mut objects, &self.frame);
        objects
    }

    fn find_sources(&self, objects: &mut [CatalogObject], diagnostics: &mut Diagnostics) {
        for object in objects.iter_mut().filter(|o| !o.ignore) {
            let index = object.index;
            let from_parameters = self.config.use_d25 && object.has_extent();
            let result = if from_parameters {
                self.parameter_source(object)
                    .map(|source| object.set_parameter_source(source))
            } else {
                object.find_source(&self.frame, &self.config.detection)
            };
            if let Err(err) = result {
                diagnostics.record(Some(index), Stage::Detection, err);
            }
            if object.special {
                debug!(frame = %self.frame.name, index, found = object.has_source(), "special galaxy");
            }

            // The principal galaxy and companions with a known extent always get a source.
            let forced = object.is_principal() || (object.is_companion() && object.has_extent());
            if !object.has_source() && forced && !from_parameters {
                match self.parameter_source(object) {
                    Ok(source) => object.set_parameter_source(source),
                    Err(err) => diagnostics.record(Some(index), Stage::Detection, err),
                }
            }
        }
    }

    fn remove(
        &self,
        objects: &[CatalogObject],
        pixels: &mut Raster,
        diagnostics: &mut Diagnostics,
    ) {
        for object in objects {
            if object.is_principal() && !self.config.remove_principal {
                continue;
            }
            let Some(source) = &object.detection.source else {
                continue;
            };
            match source.replace_in(pixels) {
                Ok(_) => diagnostics.counters.removed += 1,
                Err(err) => diagnostics.record(Some(object.index), Stage::Removal, err),
            }
        }
    }

    fn table(&self, objects: &[CatalogObject], diagnostics: &Diagnostics) -> FrameTable {
        let mut rows: Vec<FrameRow> = (0..self.catalog.len()).map(FrameRow::undetected).collect();
        for object in objects.iter().filter(|o| o.is_detected()) {
            let Some(source) = &object.detection.source else {
                continue;
            };
            let row = &mut rows[object.index];
            let position = source.peak.unwrap_or(source.center);
            row.detected = true;
            row.x = Some(position.x);
            row.y = Some(position.y);
            row.flux = Some(source.flux());
        }
        for row in &mut rows {
            row.failure = diagnostics.last_failure(row.index).map(|f| f.reason.clone());
        }
        FrameTable::new(rows)
    }

    fn regions(&self, objects: &[CatalogObject]) -> RegionList {
        let mut regions = RegionList::new();
        for object in objects {
            let ellipse = object.ellipse_parameters(&self.frame, self.config.detection.initial_radius);
            let color = if object.has_extent() {
                Color::Green
            } else {
                Color::Red
            };
            let mut text = object.name().unwrap_or_default().to_string();
            if object.is_principal() {
                text.push_str(" (principal)");
            }
            regions.push(Region::point(ellipse.center, color));
            regions.push(Region::ellipse(ellipse, color).with_text(text));
        }
        regions
    }

    fn segments(&self, objects: &[CatalogObject]) -> SegmentationMap {
        let mut segments = SegmentationMap::new_default(self.frame.width(), self.frame.height());
        // Lower labels are painted last so they win where sources overlap.
        for label in [OTHER_GALAXY_LABEL, COMPANION_LABEL, PRINCIPAL_LABEL] {
            for object in objects.iter().filter(|o| label_of(o) == label) {
                if let Some(source) = &object.detection.source {
                    paint_label(&mut segments, &source.cutout, &source.removal_mask(), label);
                }
            }
        }
        segments
    }
}

impl Extractor for ExtendedTask {
    fn frame(&self) -> &Frame {
        &self.frame
    }

    fn validate(&self) -> Result<(), FrameError> {
        self.masks.validate(&self.frame)
    }

    fn extract(self) -> FrameOutput {
        let mut output = FrameOutput::empty(&self.frame, SourceClass::Galaxies);
        let diagnostics = &mut output.diagnostics;

        let mut objects = self.load_galaxies();
        diagnostics.counters.objects = objects.len();
        diagnostics.counters.ignored = objects.iter().filter(|o| o.ignore).count();

        self.find_sources(&mut objects, diagnostics);
        diagnostics.counters.detected = objects.iter().filter(|o| o.is_detected()).count();

        if self.config.remove {
            self.remove(&objects, &mut output.pixels, diagnostics);
        }

        output.table = self.table(&objects, diagnostics);
        output.regions = self.regions(&objects);
        output.segments = self.segments(&objects);

        info!(
            frame = %self.frame.name,
            galaxies = objects.len(),
            detected = diagnostics.counters.detected,
            failures = diagnostics.failures.len(),
            "extended sources done"
        );
        output
    }
}
