//! Persisted results of a run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use common::file_format::write_file;

use super::{CrossBandEntry, SourceFinder};
use crate::catalog::write_table;
use crate::error::Error;
use crate::extraction::SourceClass;
use crate::raster::fits::write_fits;
use crate::raster::raw::write_raw;
use crate::raster::SegmentationMap;

pub const SEGMENT_MANIFEST: &str = "segments.yaml";
pub const DIAGNOSTICS_FILE: &str = "diagnostics.yaml";

/// Entry of the segmentation manifest: a raw `u32` raster and its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentFile {
    pub frame: String,
    pub class: String,
    pub file: PathBuf,
    pub width: usize,
    pub height: usize,
}

fn write_cross_band<E>(
    path: &Path,
    entries: &[CrossBandEntry<E>],
    bands: &[String],
    columns: &[&str],
    values: impl Fn(&E) -> Vec<String>,
) -> Result<(), Error> {
    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["index".to_string()];
    header.extend(columns.iter().map(|c| c.to_string()));
    header.extend(bands.iter().map(|b| format!("flux_{}", b)));
    writer.write_record(&header)?;

    for entry in entries {
        let mut record = vec![entry.index.to_string()];
        record.extend(values(&entry.catalog));
        record.extend(
            bands
                .iter()
                .map(|b| entry.flux(b).map(|f| f.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }
    writer.flush().map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl SourceFinder {
    fn bands(&self, class: SourceClass) -> Vec<String> {
        self.outputs(class)
            .map(|outputs| outputs.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn write_segments(
        dir: &Path,
        frame: &str,
        name: &str,
        segments: &SegmentationMap,
        manifest: &mut Vec<SegmentFile>,
    ) -> Result<(), Error> {
        let file = PathBuf::from(format!("{}_{}_segments.raw", frame, name));
        write_raw(&dir.join(&file), segments)?;
        manifest.push(SegmentFile {
            frame: frame.to_string(),
            class: name.to_string(),
            file,
            width: segments.width(),
            height: segments.height(),
        });
        Ok(())
    }

    /// Frames after removal, as FITS with their transform. Frames that fail
    /// validation are skipped.
    fn write_frames(&self, dir: &Path) -> Result<usize, Error> {
        let mut written = 0;
        for (name, frame) in self.frames() {
            if frame.validate().is_err() {
                continue;
            }
            write_fits(
                &dir.join(format!("{}_cleaned.fits", name)),
                &frame.pixels,
                Some(&frame.transform),
            )?;
            written += 1;
        }
        Ok(written)
    }

    /// Writes catalogs, cross-band tables, region files, segmentation maps,
    /// the cleaned frames and the run diagnostics into `dir`.
    pub fn write(&self, dir: &Path) -> Result<(), Error> {
        std::fs::create_dir_all(dir).map_err(|source| Error::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        write_table(&dir.join("extended_sources.csv"), self.extended_catalog())?;
        write_table(&dir.join("point_sources.csv"), self.point_catalog())?;
        write_cross_band(
            &dir.join("galaxies.csv"),
            self.galaxies(),
            &self.bands(SourceClass::Galaxies),
            &["name", "ra", "dec", "principal"],
            |g| {
                vec![
                    g.name.clone(),
                    g.ra.to_string(),
                    g.dec.to_string(),
                    g.principal.to_string(),
                ]
            },
        )?;
        write_cross_band(
            &dir.join("stars.csv"),
            self.stars(),
            &self.bands(SourceClass::Stars),
            &["catalog", "id", "ra", "dec"],
            |s| vec![s.catalog.clone(), s.id.clone(), s.ra.to_string(), s.dec.to_string()],
        )?;

        let mut manifest = Vec::new();
        for class in [SourceClass::Galaxies, SourceClass::Stars, SourceClass::Other] {
            let Some(outputs) = self.outputs(class) else {
                continue;
            };
            for (frame, output) in outputs {
                let name = class.to_string();
                output
                    .regions
                    .write(&dir.join(format!("{}_{}.reg", frame, name)))?;
                if let Some(saturation) = &output.saturation_regions {
                    saturation.write(&dir.join(format!("{}_saturation.reg", frame)))?;
                }
                Self::write_segments(dir, frame, &name, &output.segments, &mut manifest)?;
                if let Some(other) = &output.other_segments {
                    Self::write_segments(dir, frame, "uncataloged", other, &mut manifest)?;
                }
            }
        }
        write_file(&dir.join(SEGMENT_MANIFEST), &manifest)?;
        let frames = self.write_frames(dir)?;
        write_file(&dir.join(DIAGNOSTICS_FILE), self.diagnostics())?;

        info!(
            dir = %dir.display(),
            segment_maps = manifest.len(),
            frames,
            "results written"
        );
        Ok(())
    }
}
