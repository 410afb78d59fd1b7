//! Frame sets on disk: a `frames.yaml` (or `.json`) descriptor listing FITS
//! images or headerless little-endian rasters.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use common::file_format::read_file;

use crate::error::Error;
use crate::extraction::FrameMasks;
use crate::raster::fits::{is_fits, read_fits};
use crate::raster::raw::read_raw;
use crate::raster::{CoordinateTransform, Filter, Frame, Mask, Raster};

pub const DESCRIPTOR_NAMES: [&str; 3] = ["frames.yaml", "frames.yml", "frames.json"];

/// Mask files, FITS or raw `u8`. Non-zero means covered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskFiles {
    pub special: Option<PathBuf>,
    pub ignore: Option<PathBuf>,
    pub bad: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDescriptor {
    pub name: String,
    /// FITS image or raw `f32` pixels, relative to the descriptor.
    pub file: PathBuf,
    /// Shape of raw files. FITS files carry their own.
    #[serde(default)]
    pub width: Option<usize>,
    #[serde(default)]
    pub height: Option<usize>,
    /// Takes precedence over the FITS header. Required for raw files.
    #[serde(default)]
    pub transform: Option<CoordinateTransform>,
    pub filter: Filter,
    #[serde(default)]
    pub errors: Option<PathBuf>,
    #[serde(default)]
    pub psf_fwhm: Option<f64>,
    #[serde(default)]
    pub masks: MaskFiles,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameSetDescriptor {
    pub frames: Vec<FrameDescriptor>,
}

#[derive(Debug, Clone, Default)]
pub struct FrameSet {
    pub frames: Vec<Frame>,
    pub masks: BTreeMap<String, FrameMasks>,
    /// Listed frames that could not be loaded, with the reason.
    pub failures: BTreeMap<String, String>,
}

fn read_plane(path: &Path, width: usize, height: usize) -> Result<Raster, Error> {
    if is_fits(path) {
        Ok(read_fits(path)?.pixels)
    } else {
        read_raw::<f32>(path, width, height)
    }
}

fn read_mask(path: &Path, width: usize, height: usize) -> Result<Mask, Error> {
    if is_fits(path) {
        Ok(read_fits(path)?.pixels.map(|&v| v != 0.0))
    } else {
        Ok(read_raw::<u8>(path, width, height)?.map(|&v| v != 0))
    }
}

fn descriptor_error(entry: &FrameDescriptor, reason: &str) -> Error {
    Error::Descriptor {
        frame: entry.name.clone(),
        reason: reason.to_string(),
    }
}

/// Size mismatches are not checked here; they fail the frame's task later.
fn load_frame(dir: &Path, entry: &FrameDescriptor) -> Result<(Frame, FrameMasks), Error> {
    let path = dir.join(&entry.file);
    let (pixels, header_transform) = if is_fits(&path) {
        let image = read_fits(&path)?;
        (image.pixels, image.transform)
    } else {
        let (width, height) = entry
            .width
            .zip(entry.height)
            .ok_or_else(|| descriptor_error(entry, "raw rasters need `width` and `height`"))?;
        (read_raw::<f32>(&path, width, height)?, None)
    };
    let transform = entry
        .transform
        .clone()
        .or(header_transform)
        .ok_or_else(|| descriptor_error(entry, "no transform in the descriptor or the FITS header"))?;

    let (w, h) = (pixels.width(), pixels.height());
    let mut frame = Frame::new(&entry.name, pixels, transform, entry.filter.clone());
    if let Some(errors) = &entry.errors {
        frame = frame.with_errors(read_plane(&dir.join(errors), w, h)?);
    }
    frame.psf_fwhm = entry.psf_fwhm;

    let mask = |file: &Option<PathBuf>| {
        file.as_ref()
            .map(|file| read_mask(&dir.join(file), w, h))
            .transpose()
    };
    let masks = FrameMasks {
        special: mask(&entry.masks.special)?,
        ignore: mask(&entry.masks.ignore)?,
        bad: mask(&entry.masks.bad)?,
    };
    Ok((frame, masks))
}

impl FrameSet {
    /// Loads the frames listed in the directory's descriptor. Only a missing
    /// or malformed descriptor is an error; unreadable frames are recorded
    /// in [`FrameSet::failures`] and the rest still load.
    pub fn from_directory(dir: &Path) -> Result<Self, Error> {
        let path = DESCRIPTOR_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| Error::Io {
                path: dir.join(DESCRIPTOR_NAMES[0]),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no frame descriptor"),
            })?;
        let descriptor: FrameSetDescriptor = read_file(&path)?;
        Ok(Self::load(dir, &descriptor))
    }

    pub fn load(dir: &Path, descriptor: &FrameSetDescriptor) -> Self {
        let mut set = FrameSet::default();
        for entry in &descriptor.frames {
            match load_frame(dir, entry) {
                Ok((frame, masks)) => {
                    if masks != FrameMasks::default() {
                        set.masks.insert(entry.name.clone(), masks);
                    }
                    set.frames.push(frame);
                }
                Err(err) => {
                    warn!(frame = %entry.name, "frame not loaded: {}", err);
                    set.failures.insert(entry.name.clone(), err.to_string());
                }
            }
        }
        info!(
            dir = %dir.display(),
            frames = set.frames.len(),
            failed = set.failures.len(),
            "frame set loaded"
        );
        set
    }
}
