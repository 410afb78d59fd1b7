use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::buffer2::Raster;
use super::transform::{CoordinateTransform, SkyBox, SkyCoordinate};
use crate::error::FrameError;

/// Photometric band identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub name: String,
    /// Characteristic wavelength in micron.
    pub wavelength: Option<f64>,
}

impl Filter {
    pub fn new(name: impl Into<String>, wavelength: Option<f64>) -> Self {
        Self {
            name: name.into(),
            wavelength,
        }
    }
}

/// One band's image. Identity (name, transform, filter) is fixed; removal
/// steps mutate `pixels` in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    pub name: String,
    pub pixels: Raster,
    pub transform: CoordinateTransform,
    pub filter: Filter,
    pub errors: Option<Raster>,
    /// PSF FWHM in pixels, when known.
    pub psf_fwhm: Option<f64>,
}

impl Frame {
    pub fn new(
        name: impl Into<String>,
        pixels: Raster,
        transform: CoordinateTransform,
        filter: Filter,
    ) -> Self {
        Self {
            name: name.into(),
            pixels,
            transform,
            filter,
            errors: None,
            psf_fwhm: None,
        }
    }

    pub fn with_errors(mut self, errors: Raster) -> Self {
        self.errors = Some(errors);
        self
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.pixels.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.pixels.height()
    }

    /// Rejects frames that cannot be processed: inconsistent buffers,
    /// mismatched error maps, or no finite pixel at all.
    pub fn validate(&self) -> Result<(), FrameError> {
        if !self.pixels.is_consistent() {
            return Err(FrameError::ShapeMismatch {
                frame: self.name.clone(),
                width: self.pixels.width(),
                height: self.pixels.height(),
                actual: self.pixels.len(),
            });
        }
        if let Some(errors) = &self.errors {
            if !errors.is_consistent() || !errors.same_shape(&self.pixels) {
                return Err(FrameError::ErrorMapShape {
                    frame: self.name.clone(),
                });
            }
        }
        if !self.pixels.pixels().iter().any(|v| v.is_finite()) {
            return Err(FrameError::NoFinitePixels {
                frame: self.name.clone(),
            });
        }
        Ok(())
    }

    pub fn pixel_position(&self, coordinate: SkyCoordinate) -> DVec2 {
        self.transform.sky_to_pixel(coordinate)
    }

    /// Whether `position` falls on a pixel of this frame.
    pub fn contains(&self, position: DVec2) -> bool {
        let x = position.x.round();
        let y = position.y.round();
        x >= 0.0 && y >= 0.0 && (x as usize) < self.width() && (y as usize) < self.height()
    }

    pub fn bounding_box(&self) -> SkyBox {
        self.transform.bounding_box(self.width(), self.height())
    }

    pub fn pixel_scale_arcsec(&self) -> f64 {
        self.transform.pixel_scale_arcsec()
    }
}
