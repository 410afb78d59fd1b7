//! Multi-frame orchestration: one worker pool per stage, one task per frame,
//! results merged into cross-band tables.

mod config;
mod input;
mod merge;
mod output;
mod pool;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;

use tracing::{info, warn};

pub use config::{ColourWindow, FinderConfig};
pub use input::{FrameDescriptor, FrameSet, FrameSetDescriptor, MaskFiles};
pub use merge::{apply_colour_windows, merge, CrossBandEntry};
pub use pool::{TaskHandle, TaskState, WorkerPool};

use crate::catalog::{CatalogSource, ExtendedSourceEntry, PointSourceEntry};
use crate::diagnostics::{ObjectFailure, RunDiagnostics, Stage};
use crate::error::{ConfigError, Error};
use crate::extraction::{
    ExtendedTask, FrameMasks, FrameOutput, FrameTask, OtherTask, PointTask, SourceClass,
};
use crate::raster::{Frame, SkyBox};

pub struct SourceFinder {
    config: FinderConfig,
    catalog_source: Box<dyn CatalogSource>,
    frames: BTreeMap<String, Frame>,
    masks: BTreeMap<String, FrameMasks>,

    extended_catalog: Vec<ExtendedSourceEntry>,
    point_catalog: Vec<PointSourceEntry>,
    outputs: BTreeMap<SourceClass, BTreeMap<String, FrameOutput>>,
    galaxies: Vec<CrossBandEntry<ExtendedSourceEntry>>,
    stars: Vec<CrossBandEntry<PointSourceEntry>>,
    diagnostics: RunDiagnostics,
}

fn bounding_box<'a>(frames: impl Iterator<Item = &'a Frame>) -> Option<SkyBox> {
    frames
        .map(Frame::bounding_box)
        .reduce(|acc, b| acc.union(&b))
}

impl SourceFinder {
    pub fn new(
        config: FinderConfig,
        catalog_source: Box<dyn CatalogSource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            catalog_source,
            frames: BTreeMap::new(),
            masks: BTreeMap::new(),
            extended_catalog: Vec::new(),
            point_catalog: Vec::new(),
            outputs: BTreeMap::new(),
            galaxies: Vec::new(),
            stars: Vec::new(),
            diagnostics: RunDiagnostics::default(),
        })
    }

    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Adds or replaces a frame by name.
    pub fn add_frame(&mut self, frame: Frame) {
        self.frames.insert(frame.name.clone(), frame);
    }

    /// Adds the loaded frames and records the ones that failed to load.
    pub fn add_frame_set(&mut self, set: FrameSet) {
        for frame in set.frames {
            self.add_frame(frame);
        }
        self.masks.extend(set.masks);
        self.diagnostics.load_failures.extend(set.failures);
    }

    pub fn set_masks(&mut self, frame: &str, masks: FrameMasks) -> Result<(), Error> {
        if !self.frames.contains_key(frame) {
            return Err(Error::UnknownFrame(frame.to_string()));
        }
        self.masks.insert(frame.to_string(), masks);
        Ok(())
    }

    pub fn frames(&self) -> &BTreeMap<String, Frame> {
        &self.frames
    }

    pub fn frame(&self, name: &str) -> Option<&Frame> {
        self.frames.get(name)
    }

    pub fn extended_catalog(&self) -> &[ExtendedSourceEntry] {
        &self.extended_catalog
    }

    pub fn point_catalog(&self) -> &[PointSourceEntry] {
        &self.point_catalog
    }

    /// Completed outputs of one stage, keyed by frame.
    pub fn outputs(&self, class: SourceClass) -> Option<&BTreeMap<String, FrameOutput>> {
        self.outputs.get(&class)
    }

    fn output(&self, class: SourceClass, frame: &str) -> Option<&FrameOutput> {
        self.outputs.get(&class).and_then(|o| o.get(frame))
    }

    pub fn galaxies(&self) -> &[CrossBandEntry<ExtendedSourceEntry>] {
        &self.galaxies
    }

    pub fn stars(&self) -> &[CrossBandEntry<PointSourceEntry>] {
        &self.stars
    }

    pub fn diagnostics(&self) -> &RunDiagnostics {
        &self.diagnostics
    }

    fn masks_for(&self, frame: &str) -> FrameMasks {
        self.masks.get(frame).cloned().unwrap_or_default()
    }

    /// Dispatches one task per frame on a fresh pool, drains it, closes it and
    /// writes completed pixels back into the frames.
    fn run_stage(
        &mut self,
        class: SourceClass,
        stage: &'static str,
        tasks: Vec<FrameTask>,
    ) -> Result<(), Error> {
        let mut pool = WorkerPool::new(stage, self.config.processes)?;
        let handles: Vec<TaskHandle> = tasks.into_iter().map(|t| pool.dispatch(t)).collect();
        let states = pool.collect(handles);
        pool.close();

        let mut outputs = BTreeMap::new();
        for (name, state) in states {
            let key = format!("{}/{}", class, name);
            match state {
                TaskState::Completed(output) => {
                    if let Some(frame) = self.frames.get_mut(&name) {
                        frame.pixels = output.pixels.clone();
                    }
                    self.diagnostics.frames.insert(key, output.diagnostics.clone());
                    outputs.insert(name, *output);
                }
                TaskState::Failed(err) => {
                    self.diagnostics.task_failures.insert(key, err);
                }
            }
        }
        self.outputs.insert(class, outputs);
        Ok(())
    }

    /// Extended sources in every frame, merged into [`Self::galaxies`].
    pub fn find_galaxies(&mut self) -> Result<(), Error> {
        let Some(sky_box) = bounding_box(self.frames.values()) else {
            info!("no frames loaded, skipping galaxies");
            return Ok(());
        };
        let catalog = self.catalog_source.get_extended_source_catalog(&sky_box)?;
        info!(galaxies = catalog.len(), frames = self.frames.len(), "finding galaxies");

        let tasks = self
            .frames
            .iter()
            .map(|(name, frame)| {
                FrameTask::Extended(ExtendedTask {
                    frame: frame.clone(),
                    catalog: catalog.clone(),
                    masks: self.masks_for(name),
                    config: self.config.extended.clone(),
                })
            })
            .collect();
        self.run_stage(SourceClass::Galaxies, "galaxies", tasks)?;

        let empty = BTreeMap::new();
        let outputs = self.outputs.get(&SourceClass::Galaxies).unwrap_or(&empty);
        self.galaxies = merge(&catalog, outputs);
        self.extended_catalog = catalog;
        Ok(())
    }

    /// Point sources in every frame up to the wavelength cutoff, merged and
    /// filtered by the colour windows into [`Self::stars`].
    pub fn find_stars(&mut self) -> Result<(), Error> {
        let cutoff = self.config.star_wavelength_cutoff;
        let eligible: Vec<&Frame> = self
            .frames
            .values()
            .filter(|f| f.filter.wavelength.map_or(true, |w| w <= cutoff))
            .collect();
        let Some(sky_box) = bounding_box(eligible.iter().copied()) else {
            info!(cutoff, "no frames below the wavelength cutoff, skipping stars");
            return Ok(());
        };
        let min_pixelscale = eligible
            .iter()
            .map(|f| f.pixel_scale_arcsec())
            .fold(f64::INFINITY, f64::min);
        let catalog = self.catalog_source.get_point_source_catalog(
            &sky_box,
            min_pixelscale,
            &self.config.point.catalogs,
        )?;
        info!(stars = catalog.len(), frames = eligible.len(), "finding stars");

        let tasks = eligible
            .iter()
            .map(|frame| {
                FrameTask::Point(PointTask {
                    frame: (*frame).clone(),
                    catalog: catalog.clone(),
                    galaxy_segments: self
                        .output(SourceClass::Galaxies, &frame.name)
                        .map(|o| o.segments.clone()),
                    masks: self.masks_for(&frame.name),
                    config: self.config.point.clone(),
                })
            })
            .collect();
        self.run_stage(SourceClass::Stars, "stars", tasks)?;

        let empty = BTreeMap::new();
        let outputs = self.outputs.get(&SourceClass::Stars).unwrap_or(&empty);
        let (stars, rejected) =
            apply_colour_windows(merge(&catalog, outputs), &self.config.colour_windows);
        if rejected > 0 {
            info!(rejected, "candidates rejected by colour windows");
        }
        self.stars = stars;
        self.point_catalog = catalog;
        Ok(())
    }

    /// Uncataloged sources in every frame, with galaxies and stars masked out.
    pub fn find_other_sources(&mut self) -> Result<(), Error> {
        let tasks = self
            .frames
            .iter()
            .map(|(name, frame)| {
                let stars = self.output(SourceClass::Stars, name);
                FrameTask::Other(OtherTask {
                    frame: frame.clone(),
                    galaxy_segments: self
                        .output(SourceClass::Galaxies, name)
                        .map(|o| o.segments.clone()),
                    star_segments: stars.map(|o| o.segments.clone()),
                    kernel_fwhm: stars.and_then(|o| o.fwhm),
                    masks: self.masks_for(name),
                    config: self.config.other_sources.clone(),
                })
            })
            .collect();
        self.run_stage(SourceClass::Other, "other", tasks)
    }

    fn record_stage_failure(&mut self, stage: &str, err: Error) {
        let kind = match err {
            Error::Catalog(_) => Stage::Catalog,
            _ => Stage::Task,
        };
        warn!(stage, "stage failed: {}", err);
        self.diagnostics.stage_failures.push(ObjectFailure {
            index: None,
            stage: kind,
            reason: format!("{}: {}", stage, err),
        });
    }

    /// Runs the enabled stages in order. A failed stage is recorded and the
    /// next stages still run with whatever inputs are available.
    pub fn run(&mut self) -> &RunDiagnostics {
        if self.config.find_galaxies {
            if let Err(err) = self.find_galaxies() {
                self.record_stage_failure("find_galaxies", err);
            }
        }
        if self.config.find_stars {
            if let Err(err) = self.find_stars() {
                self.record_stage_failure("find_stars", err);
            }
        }
        if self.config.find_other_sources {
            if let Err(err) = self.find_other_sources() {
                self.record_stage_failure("find_other_sources", err);
            }
        }
        info!(
            frames_not_loaded = self.diagnostics.load_failures.len(),
            tasks_failed = self.diagnostics.task_failures.len(),
            stages_failed = self.diagnostics.stage_failures.len(),
            object_failures = self.diagnostics.object_failure_count(),
            "source finding done"
        );
        &self.diagnostics
    }
}
