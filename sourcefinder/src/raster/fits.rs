//! FITS images with a TAN world coordinate header.
//!
//! FITS pixel `(1, 1)` is raster pixel `(0, 0)`; `CRPIX` is shifted by one on
//! the way in and out. Rows are kept in file order.

use std::path::Path;

use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::images::{ImageDescription, ImageType};
use fitsio::FitsFile;
use glam::DVec2;
use tracing::warn;

use super::buffer2::{Buffer2, Raster};
use super::transform::CoordinateTransform;
use crate::error::Error;

const EXTENSIONS: [&str; 3] = ["fits", "fit", "fts"];

fn fits_error(path: &Path) -> impl FnOnce(fitsio::errors::Error) -> Error + '_ {
    move |source| Error::Fits {
        path: path.to_path_buf(),
        source,
    }
}

pub fn is_fits(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Primary image of a FITS file and its transform, when the header has one.
#[derive(Debug, Clone)]
pub struct FitsImage {
    pub pixels: Raster,
    pub transform: Option<CoordinateTransform>,
}

pub fn read_fits(path: &Path) -> Result<FitsImage, Error> {
    let mut fptr = FitsFile::open(path).map_err(fits_error(path))?;
    let hdu = fptr.primary_hdu().map_err(fits_error(path))?;

    let layout_error = |reason: String| Error::FitsLayout {
        path: path.to_path_buf(),
        reason,
    };
    // Shape comes back as [NAXIS2, NAXIS1].
    let (width, height) = match &hdu.info {
        HduInfo::ImageInfo { shape, .. } if shape.len() == 2 => (shape[1], shape[0]),
        HduInfo::ImageInfo { shape, .. } => {
            return Err(layout_error(format!("expected 2 axes, got {}", shape.len())))
        }
        _ => return Err(layout_error("primary HDU is not an image".to_string())),
    };

    let pixels: Vec<f32> = hdu.read_image(&mut fptr).map_err(fits_error(path))?;
    let transform = read_transform(&hdu, &mut fptr);
    if transform.is_none() {
        warn!(path = %path.display(), "no usable WCS keywords");
    }
    Ok(FitsImage {
        pixels: Buffer2::from_parts_unchecked(width, height, pixels),
        transform,
    })
}

fn read_key<T: fitsio::headers::ReadsKey>(hdu: &FitsHdu, fptr: &mut FitsFile, key: &str) -> Option<T> {
    hdu.read_key(fptr, key).ok()
}

/// Reads `CRPIX`/`CRVAL` and the linear part from `CD`, `PC` + `CDELT`, or
/// `CDELT` + `CROTA2`, in that order.
pub fn read_transform(hdu: &FitsHdu, fptr: &mut FitsFile) -> Option<CoordinateTransform> {
    if let Some(ctype) = read_key::<String>(hdu, fptr, "CTYPE1") {
        if !ctype.trim().ends_with("TAN") {
            warn!(ctype = %ctype.trim(), "projection is not TAN, treating it as TAN");
        }
    }
    let crpix = DVec2::new(
        read_key(hdu, fptr, "CRPIX1")?,
        read_key(hdu, fptr, "CRPIX2")?,
    ) - DVec2::ONE;
    let crval = DVec2::new(
        read_key(hdu, fptr, "CRVAL1")?,
        read_key(hdu, fptr, "CRVAL2")?,
    );
    let cd = read_cd(hdu, fptr)?;
    Some(CoordinateTransform::new(crpix, crval, cd))
}

fn read_cd(hdu: &FitsHdu, fptr: &mut FitsFile) -> Option<[[f64; 2]; 2]> {
    let mut key = |name: &str| read_key::<f64>(hdu, fptr, name);

    if let Some(cd1_1) = key("CD1_1") {
        let cd1_2 = key("CD1_2").unwrap_or(0.0);
        let cd2_1 = key("CD2_1").unwrap_or(0.0);
        let cd2_2 = key("CD2_2")?;
        return Some([[cd1_1, cd1_2], [cd2_1, cd2_2]]);
    }

    let cdelt1 = key("CDELT1")?;
    let cdelt2 = key("CDELT2")?;
    if let Some(pc1_1) = key("PC1_1") {
        let pc1_2 = key("PC1_2").unwrap_or(0.0);
        let pc2_1 = key("PC2_1").unwrap_or(0.0);
        let pc2_2 = key("PC2_2").unwrap_or(1.0);
        return Some([
            [cdelt1 * pc1_1, cdelt1 * pc1_2],
            [cdelt2 * pc2_1, cdelt2 * pc2_2],
        ]);
    }
    let (sin, cos) = key("CROTA2").unwrap_or(0.0).to_radians().sin_cos();
    Some([
        [cdelt1 * cos, -cdelt2 * sin],
        [cdelt1 * sin, cdelt2 * cos],
    ])
}

fn write_transform(
    hdu: &FitsHdu,
    fptr: &mut FitsFile,
    transform: &CoordinateTransform,
) -> fitsio::errors::Result<()> {
    hdu.write_key(fptr, "CTYPE1", "RA---TAN")?;
    hdu.write_key(fptr, "CTYPE2", "DEC--TAN")?;
    let crpix = transform.crpix + DVec2::ONE;
    let values = [
        ("CRPIX1", crpix.x),
        ("CRPIX2", crpix.y),
        ("CRVAL1", transform.crval.x),
        ("CRVAL2", transform.crval.y),
        ("CD1_1", transform.cd[0][0]),
        ("CD1_2", transform.cd[0][1]),
        ("CD2_1", transform.cd[1][0]),
        ("CD2_2", transform.cd[1][1]),
    ];
    for (key, value) in values {
        hdu.write_key(fptr, key, value)?;
    }
    Ok(())
}

/// Writes a float image, replacing any existing file.
pub fn write_fits(
    path: &Path,
    pixels: &Raster,
    transform: Option<&CoordinateTransform>,
) -> Result<(), Error> {
    if path.exists() {
        std::fs::remove_file(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }
    let description = ImageDescription {
        data_type: ImageType::Float,
        dimensions: &[pixels.height(), pixels.width()],
    };
    let mut fptr = FitsFile::create(path)
        .with_custom_primary(&description)
        .open()
        .map_err(fits_error(path))?;
    let hdu = fptr.primary_hdu().map_err(fits_error(path))?;
    hdu.write_image(&mut fptr, pixels.pixels())
        .map_err(fits_error(path))?;
    if let Some(transform) = transform {
        write_transform(&hdu, &mut fptr, transform).map_err(fits_error(path))?;
    }
    Ok(())
}
