use glam::DVec2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::extended::PRINCIPAL_LABEL;
use super::other::{remove_segments, scan_uncataloged};
use super::{
    check_segments, paint_label, Extractor, FrameMasks, FrameOutput, FwhmMeasure,
    PointSourceConfig, SaturationMethod, SourceClass,
};
use crate::catalog::PointSourceEntry;
use crate::diagnostics::{Diagnostics, Stage};
use crate::error::{DetectionError, FrameError};
use crate::math::fwhm_to_sigma;
use crate::object::CatalogObject;
use crate::raster::{Cutout, Frame, Mask, SegmentationMap};
use crate::region::{Color, Region, RegionAnnotation, RegionList};
use crate::source::Source;
use crate::table::{FrameRow, FrameTable};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointTask {
    pub frame: Frame,
    pub catalog: Vec<PointSourceEntry>,
    pub galaxy_segments: Option<SegmentationMap>,
    pub masks: FrameMasks,
    pub config: PointSourceConfig,
}

/// Aggregates the fitted FWHMs of one frame.
pub fn aggregate_fwhm(measure: FwhmMeasure, values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let value = match measure {
        FwhmMeasure::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        FwhmMeasure::Mean => values.iter().sum::<f64>() / values.len() as f64,
        FwhmMeasure::Median => {
            let mut sorted = values.to_vec();
            sorted.sort_by(f64::total_cmp);
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 0 {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            } else {
                sorted[mid]
            }
        }
    };
    Some(value)
}

impl PointTask {
    fn principal_center(&self) -> Option<DVec2> {
        let segments = self.galaxy_segments.as_ref()?;
        let (sum, count) = segments
            .iter_xy()
            .filter(|&(_, _, &label)| label == PRINCIPAL_LABEL)
            .fold((DVec2::ZERO, 0usize), |(sum, count), (x, y, _)| {
                (sum + DVec2::new(x as f64, y as f64), count + 1)
            });
        (count > 0).then(|| sum / count as f64)
    }

    fn on_galaxy(&self, position: DVec2) -> bool {
        self.galaxy_segments.as_ref().is_some_and(|segments| {
            segments
                .get_checked(position.x.round() as i64, position.y.round() as i64)
                .is_some_and(|&label| label != 0)
        })
    }

    fn load_stars(&self) -> Vec<CatalogObject> {
        let principal = self.principal_center();
        let mut objects = Vec::new();
        for (index, entry) in self.catalog.iter().enumerate() {
            let object = CatalogObject::from_point(index, entry);
            let position = object.pixel_position(&self.frame);
            if !self.frame.contains(position) || self.masks.is_bad(position) {
                continue;
            }
            if principal.is_some_and(|c| c.distance(position) < self.config.principal_exclusion_radius)
            {
                debug!(frame = %self.frame.name, index, "too close to the principal galaxy");
                continue;
            }
            objects.push(object);
        }
        self.masks.flag(&mut objects, &self.frame);
        objects
    }

    fn detect(&self, objects: &mut [CatalogObject], diagnostics: &mut Diagnostics) {
        for object in objects.iter_mut().filter(|o| !o.ignore) {
            if let Err(err) = object.find_source(&self.frame, &self.config.detection) {
                diagnostics.record(Some(object.index), Stage::Detection, err);
            }
            if object.special {
                debug!(frame = %self.frame.name, index = object.index, found = object.is_detected(), "special star");
            }
        }
    }

    /// Blind source at the catalog position, used to fit undetected stars.
    fn blind_source(&self, object: &CatalogObject) -> Result<Source, DetectionError> {
        let detection = &self.config.detection;
        let mut source = Source::new(
            &self.frame.pixels,
            object.pixel_position(&self.frame),
            DVec2::splat(detection.initial_radius),
            0.0,
            detection.inner_factor,
            detection.outer_factor,
        )?;
        source.estimate_background(detection.background_method, detection.sigma_clip, detection.sigma)?;
        source.subtract_background()?;
        source.locate_peaks(detection.peak_threshold_sigmas);
        Ok(source)
    }

    fn fit(&self, objects: &mut [CatalogObject], diagnostics: &mut Diagnostics) {
        for object in objects.iter_mut().filter(|o| !o.ignore) {
            let failures = if object.is_detected() {
                object.fit_model(&self.config.fitting, None)
            } else if self.config.fit_if_undetected {
                match self.blind_source(object) {
                    Ok(source) => object.fit_model(&self.config.fitting, Some(&source)),
                    Err(err) => {
                        diagnostics.record(Some(object.index), Stage::Fitting, err);
                        continue;
                    }
                }
            } else {
                continue;
            };
            if !object.has_model() {
                let reason = failures
                    .iter()
                    .map(|(family, err)| format!("{}: {}", family, err))
                    .collect::<Vec<_>>()
                    .join("; ");
                diagnostics.record(Some(object.index), Stage::Fitting, reason);
            }
        }
    }

    /// Stars on galaxy segments are left alone unless foreground removal is on.
    fn removable(&self, object: &CatalogObject) -> bool {
        !object.ignore
            && (self.config.remove_foreground || !self.on_galaxy(object.pixel_position(&self.frame)))
    }

    fn saturation_candidates(&self, objects: &[CatalogObject]) -> Vec<usize> {
        let saturation = &self.config.saturation;
        let mut candidates: Vec<usize> = (0..objects.len())
            .filter(|&i| self.removable(&objects[i]))
            .filter(|&i| objects[i].is_detected() || saturation.remove_if_undetected)
            .collect();
        if saturation.method == SaturationMethod::Brightest {
            let flux = |i: usize| {
                objects[i]
                    .detection
                    .source
                    .as_ref()
                    .map(Source::flux)
                    .unwrap_or(f64::NEG_INFINITY)
            };
            candidates.retain(|&i| objects[i].is_detected());
            candidates.sort_by(|&a, &b| flux(b).total_cmp(&flux(a)));
            let keep =
                (candidates.len() as f64 * saturation.brightest_percentile / 100.0).ceil() as usize;
            candidates.truncate(keep);
        }
        candidates
    }

    fn annotation(&self, object: &CatalogObject) -> Option<String> {
        let source = object.detection.source.as_ref();
        match self.config.region.annotation {
            RegionAnnotation::None => None,
            RegionAnnotation::Flux => source
                .filter(|_| object.is_detected())
                .map(|s| format!("{:.3}", s.flux())),
            RegionAnnotation::HasSource => Some(object.is_detected().to_string()),
            RegionAnnotation::HasBackground => {
                Some(source.is_some_and(Source::has_background).to_string())
            }
        }
    }

    fn regions(&self, objects: &[CatalogObject], default_fwhm: f64) -> RegionList {
        let mut regions = RegionList::new();
        for object in objects.iter().filter(|o| !o.ignore) {
            let sigma = object
                .detection
                .model
                .map(|m| m.sigma())
                .unwrap_or_else(|| fwhm_to_sigma(default_fwhm));
            let color = if object.has_model() {
                Color::Blue
            } else if object.is_detected() {
                Color::Green
            } else {
                Color::Red
            };
            let mut circle = Region::circle(
                object.best_position(&self.frame),
                sigma * self.config.region.sigma_level,
                color,
            );
            if let Some(text) = self.annotation(object) {
                circle = circle.with_text(text);
            }
            regions.push(circle);
            if let Some(peak) = object.detection.source.as_ref().and_then(|s| s.peak) {
                regions.push(Region::point(peak, color));
            }
            if let Some(aperture) = object.detection.aperture {
                regions.push(Region::ellipse(aperture, Color::White));
            }
        }
        regions
    }

    fn segments(&self, objects: &[CatalogObject]) -> SegmentationMap {
        let mut segments = SegmentationMap::new_default(self.frame.width(), self.frame.height());
        for object in objects {
            let label = object.index as u32 + 1;
            if let Some(source) = &object.detection.source {
                paint_label(&mut segments, &source.cutout, &source.removal_mask(), label);
            }
            if let Some(aperture) = object.detection.aperture {
                if let Ok(cutout) = Cutout::from_frame(&self.frame.pixels, &aperture) {
                    paint_label(&mut segments, &cutout, &cutout.ellipse_mask(&aperture), label);
                }
            }
        }
        segments
    }

    fn table(&self, objects: &[CatalogObject], diagnostics: &Diagnostics) -> FrameTable {
        let mut rows: Vec<FrameRow> = (0..self.catalog.len()).map(FrameRow::undetected).collect();
        for object in objects {
            let row = &mut rows[object.index];
            row.detected = object.is_detected();
            row.modeled = object.has_model();
            row.saturation = object.detection.has_saturation;
            if row.detected || row.modeled {
                let position = object.best_position(&self.frame);
                row.x = Some(position.x);
                row.y = Some(position.y);
            }
            if row.detected {
                row.flux = object.detection.source.as_ref().map(Source::flux);
            }
            row.fwhm = object.fwhm();
        }
        for row in &mut rows {
            row.failure = diagnostics.last_failure(row.index).map(|f| f.reason.clone());
        }
        FrameTable::new(rows)
    }
}

impl Extractor for PointTask {
    fn frame(&self) -> &Frame {
        &self.frame
    }

    fn validate(&self) -> Result<(), FrameError> {
        self.masks.validate(&self.frame)?;
        check_segments(&self.frame, self.galaxy_segments.as_ref(), "galaxy_segments")
    }

    fn extract(mut self) -> FrameOutput {
        let mut diagnostics = Diagnostics::new(self.frame.name.clone());
        let config = self.config.clone();

        let mut objects = self.load_stars();
        diagnostics.counters.objects = objects.len();
        diagnostics.counters.ignored = objects.iter().filter(|o| o.ignore).count();

        self.detect(&mut objects, &mut diagnostics);
        self.fit(&mut objects, &mut diagnostics);
        diagnostics.counters.detected = objects.iter().filter(|o| o.is_detected()).count();
        diagnostics.counters.modeled = objects.iter().filter(|o| o.has_model()).count();

        let fitted: Vec<f64> = objects.iter().filter_map(CatalogObject::fwhm).collect();
        let measured = aggregate_fwhm(config.fwhm_measure, &fitted);
        let default_fwhm = measured
            .or(self.frame.psf_fwhm)
            .unwrap_or(config.default_fwhm);
        debug!(frame = %self.frame.name, fwhm = default_fwhm, from_models = fitted.len(), "default FWHM");

        if config.remove {
            for object in &objects {
                if !self.removable(object) {
                    continue;
                }
                match object.remove(
                    &mut self.frame,
                    &config.removal,
                    default_fwhm,
                    config.background_method,
                    config.sigma_clip,
                ) {
                    Ok(true) => diagnostics.counters.removed += 1,
                    Ok(false) => {}
                    Err(err) => diagnostics.record(Some(object.index), Stage::Removal, err),
                }
            }
        }

        let mut saturation_regions = None;
        if config.find_saturation {
            let mut regions = RegionList::new();
            for i in self.saturation_candidates(&objects) {
                let object = &mut objects[i];
                match object.remove_saturation(
                    &mut self.frame,
                    &config.saturation,
                    default_fwhm,
                    config.background_method,
                    config.sigma_clip,
                ) {
                    Ok(true) => {
                        diagnostics.counters.saturated += 1;
                        if let Some(source) = &object.detection.source {
                            let ellipse = source.segment_ellipse().unwrap_or_else(|| source.ellipse());
                            regions.push(
                                Region::ellipse(ellipse, Color::Cyan).with_text(object.index.to_string()),
                            );
                        }
                    }
                    Ok(false) => {}
                    Err(err) => diagnostics.record(Some(object.index), Stage::Saturation, err),
                }
            }
            saturation_regions = Some(regions);
        }

        if config.find_apertures {
            for object in objects.iter_mut().filter(|o| o.detection.has_saturation) {
                if object.find_aperture(config.aperture.sigma_level).is_none() {
                    continue;
                }
                diagnostics.counters.apertures += 1;
                if !config.aperture.remove {
                    continue;
                }
                if let Err(err) = object.remove_aperture(
                    &mut self.frame,
                    &config.aperture,
                    config.background_method,
                    config.sigma_clip,
                ) {
                    diagnostics.record(Some(object.index), Stage::Aperture, err);
                }
            }
        }

        let segments = self.segments(&objects);
        let other_segments = config.scan_uncataloged.then(|| {
            let mut exclusion = Mask::from_segments(&segments);
            if let Some(galaxies) = &self.galaxy_segments {
                exclusion.union_in_place(&Mask::from_segments(galaxies));
            }
            if let Some(ignore) = &self.masks.ignore {
                exclusion.union_in_place(ignore);
            }
            let found = scan_uncataloged(
                &self.frame.pixels,
                &exclusion,
                self.galaxy_segments.as_ref(),
                &config.other_sources,
                default_fwhm,
                &mut diagnostics,
            );
            diagnostics.counters.other = found.max_label() as usize;
            if config.other_sources.remove {
                remove_segments(&mut self.frame.pixels, &found, &config.other_sources, &mut diagnostics);
            }
            found
        });

        let table = self.table(&objects, &diagnostics);
        let regions = self.regions(&objects, default_fwhm);
        info!(
            frame = %self.frame.name,
            stars = objects.len(),
            detected = diagnostics.counters.detected,
            modeled = diagnostics.counters.modeled,
            removed = diagnostics.counters.removed,
            saturated = diagnostics.counters.saturated,
            failures = diagnostics.failures.len(),
            "point sources done"
        );

        FrameOutput {
            frame: self.frame.name.clone(),
            class: SourceClass::Stars,
            table,
            regions,
            saturation_regions,
            segments,
            other_segments,
            pixels: self.frame.pixels,
            fwhm: measured,
            diagnostics,
        }
    }
}
