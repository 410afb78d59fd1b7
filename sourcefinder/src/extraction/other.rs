//! Sources in neither catalog: threshold segmentation of the frame with every
//! known object masked out.

use glam::DVec2;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::extended::{COMPANION_LABEL, PRINCIPAL_LABEL};
use super::{check_segments, Extractor, FrameMasks, FrameOutput, OtherSourcesConfig, SourceClass};
use crate::detection::{label_above_threshold, GaussianKernel};
use crate::diagnostics::{Diagnostics, Stage};
use crate::error::{DetectionError, FrameError};
use crate::math::sigma_clipped_statistics;
use crate::raster::{Frame, Mask, Raster, SegmentationMap};
use crate::region::{Region, RegionList};
use crate::source::{BackgroundMethod, Source};
use crate::table::{FrameRow, FrameTable};

const STATS_CLIP_SIGMA: f32 = 3.0;
const STATS_CLIP_ITERATIONS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtherTask {
    pub frame: Frame,
    pub galaxy_segments: Option<SegmentationMap>,
    pub star_segments: Option<SegmentationMap>,
    /// Matched-filter width; falls back to the frame PSF, then the config default.
    pub kernel_fwhm: Option<f64>,
    pub masks: FrameMasks,
    pub config: OtherSourcesConfig,
}

/// Per-label summary of a segmentation map.
#[derive(Debug, Clone, Copy)]
struct SegmentSummary {
    count: usize,
    sum: f64,
    centroid_sum: DVec2,
    min: (usize, usize),
    max: (usize, usize),
}

impl SegmentSummary {
    fn centroid(&self) -> DVec2 {
        self.centroid_sum / self.count as f64
    }
}

fn summarize(segments: &SegmentationMap, pixels: &Raster) -> Vec<SegmentSummary> {
    let mut summaries: Vec<Option<SegmentSummary>> = vec![None; segments.max_label() as usize];
    for (x, y, &label) in segments.iter_xy() {
        if label == 0 {
            continue;
        }
        let value = pixels[(x, y)];
        let value = if value.is_finite() { value as f64 } else { 0.0 };
        let p = DVec2::new(x as f64, y as f64);
        let summary = summaries[label as usize - 1].get_or_insert(SegmentSummary {
            count: 0,
            sum: 0.0,
            centroid_sum: DVec2::ZERO,
            min: (x, y),
            max: (x, y),
        });
        summary.count += 1;
        summary.sum += value;
        summary.centroid_sum += p;
        summary.min = (summary.min.0.min(x), summary.min.1.min(y));
        summary.max = (summary.max.0.max(x), summary.max.1.max(y));
    }
    summaries.into_iter().flatten().collect()
}

/// Labels with a pixel on or 8-adjacent to a principal or companion galaxy pixel.
fn labels_touching_main_galaxies(segments: &SegmentationMap, galaxies: &SegmentationMap) -> Vec<bool> {
    let mut touching = vec![false; segments.max_label() as usize + 1];
    for (x, y, &label) in segments.iter_xy() {
        if label == 0 || touching[label as usize] {
            continue;
        }
        touching[label as usize] = (-1i64..=1).any(|dy| {
            (-1i64..=1).any(|dx| {
                matches!(
                    galaxies.get_checked(x as i64 + dx, y as i64 + dy),
                    Some(&PRINCIPAL_LABEL) | Some(&COMPANION_LABEL)
                )
            })
        });
    }
    touching
}

/// Thresholds the smoothed frame outside `exclusion` and returns the
/// surviving segments labeled 1..=n in raster order.
pub(crate) fn scan_uncataloged(
    pixels: &Raster,
    exclusion: &Mask,
    galaxy_segments: Option<&SegmentationMap>,
    config: &OtherSourcesConfig,
    kernel_fwhm: f64,
    diagnostics: &mut Diagnostics,
) -> SegmentationMap {
    let empty = SegmentationMap::new_default(pixels.width(), pixels.height());
    let values: Vec<f32> = pixels
        .pixels()
        .iter()
        .zip(exclusion.pixels())
        .filter(|&(v, &excluded)| !excluded && v.is_finite())
        .map(|(&v, _)| v)
        .collect();
    let Some(stats) = sigma_clipped_statistics(&values, STATS_CLIP_SIGMA, STATS_CLIP_ITERATIONS)
    else {
        diagnostics.record(
            None,
            Stage::OtherSources,
            DetectionError::InsufficientBackground {
                available: values.len(),
                required: 3,
            },
        );
        return empty;
    };
    let threshold = stats.median + config.threshold_sigmas * stats.std;

    let hide_excluded = |data: &Raster| {
        Raster::from_fn(data.width(), data.height(), |x, y| {
            if exclusion[(x, y)] {
                f32::NAN
            } else {
                data[(x, y)]
            }
        })
    };
    let kernel = GaussianKernel::truncated(kernel_fwhm, config.kernel_sigma_level);
    let smoothed = hide_excluded(&kernel.convolve(&hide_excluded(pixels)));
    let segments = label_above_threshold(&smoothed, threshold, config.min_pixels);

    let Some(galaxies) = galaxy_segments else {
        return segments;
    };
    let touching = labels_touching_main_galaxies(&segments, galaxies);
    let mut renumbered = vec![0u32; touching.len()];
    let mut next = 0;
    for (label, &touches) in touching.iter().enumerate().skip(1) {
        if !touches {
            next += 1;
            renumbered[label] = next;
        }
    }
    segments.map(|&label| renumbered[label as usize])
}

/// Replaces each segment with a polynomial background fitted around it.
/// Returns the number of removed segments.
pub(crate) fn remove_segments(
    pixels: &mut Raster,
    segments: &SegmentationMap,
    config: &OtherSourcesConfig,
    diagnostics: &mut Diagnostics,
) -> usize {
    let mut removed = 0;
    for (i, summary) in summarize(segments, pixels).iter().enumerate() {
        let label = i as u32 + 1;
        let min = DVec2::new(summary.min.0 as f64, summary.min.1 as f64);
        let max = DVec2::new(summary.max.0 as f64, summary.max.1 as f64);
        let center = (min + max) / 2.0;
        let radius = (max - min).length() / 2.0 + 1.0;

        let result = Source::new(
            pixels,
            center,
            DVec2::splat(radius),
            0.0,
            config.inner_factor,
            config.outer_factor,
        )
        .and_then(|mut source| {
            let cutout = &source.cutout;
            let segment = segments
                .crop(cutout.x_min, cutout.y_min, cutout.width(), cutout.height())
                .map(|&l| l == label);
            source.mask = Some(segment);
            source.estimate_background(BackgroundMethod::Polynomial, true, STATS_CLIP_SIGMA)?;
            source.replace_in(pixels)
        });
        match result {
            Ok(_) => removed += 1,
            Err(err) => diagnostics.record(Some(label as usize), Stage::OtherSources, err),
        }
    }
    removed
}

impl OtherTask {
    fn exclusion(&self) -> Mask {
        let mut exclusion = Mask::empty(self.frame.width(), self.frame.height());
        for segments in [&self.galaxy_segments, &self.star_segments].into_iter().flatten() {
            exclusion.union_in_place(&Mask::from_segments(segments));
        }
        if let Some(ignore) = &self.masks.ignore {
            exclusion.union_in_place(ignore);
        }
        exclusion
    }

    fn kernel_fwhm(&self) -> f64 {
        self.kernel_fwhm
            .or(self.frame.psf_fwhm)
            .unwrap_or(self.config.default_kernel_fwhm)
    }
}

impl Extractor for OtherTask {
    fn frame(&self) -> &Frame {
        &self.frame
    }

    fn validate(&self) -> Result<(), FrameError> {
        self.masks.validate(&self.frame)?;
        check_segments(&self.frame, self.galaxy_segments.as_ref(), "galaxy_segments")?;
        check_segments(&self.frame, self.star_segments.as_ref(), "star_segments")
    }

    fn extract(self) -> FrameOutput {
        let mut output = FrameOutput::empty(&self.frame, SourceClass::Other);
        let diagnostics = &mut output.diagnostics;

        let segments = scan_uncataloged(
            &self.frame.pixels,
            &self.exclusion(),
            self.galaxy_segments.as_ref(),
            &self.config,
            self.kernel_fwhm(),
            diagnostics,
        );

        let summaries = summarize(&segments, &self.frame.pixels);
        let mut rows = Vec::with_capacity(summaries.len());
        let mut regions = RegionList::new();
        for (i, summary) in summaries.iter().enumerate() {
            let centroid = summary.centroid();
            let radius = (summary.count as f64 / std::f64::consts::PI).sqrt();
            regions.push(Region::circle(centroid, radius, self.config.region_color));
            rows.push(FrameRow {
                detected: true,
                x: Some(centroid.x),
                y: Some(centroid.y),
                flux: Some(summary.sum),
                ..FrameRow::undetected(i + 1)
            });
        }
        diagnostics.counters.other = summaries.len();

        if self.config.remove {
            diagnostics.counters.removed =
                remove_segments(&mut output.pixels, &segments, &self.config, diagnostics);
        }

        output.table = FrameTable::new(rows);
        output.regions = regions;
        output.segments = segments;
        info!(
            frame = %self.frame.name,
            found = diagnostics.counters.other,
            removed = diagnostics.counters.removed,
            "uncataloged sources done"
        );
        output
    }
}
