use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::buffer2::{Buffer2, Raster};
use super::ellipse::Ellipse;
use super::mask::Mask;
use crate::error::DetectionError;

/// Rectangular piece of a frame that remembers where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cutout {
    pub pixels: Raster,
    pub x_min: usize,
    pub y_min: usize,
}

impl Cutout {
    /// Bounding box of `ellipse` (absolute coordinates) cropped out of `frame`.
    pub fn from_frame(frame: &Raster, ellipse: &Ellipse) -> Result<Self, DetectionError> {
        Self::around_ellipse(frame, 0, 0, ellipse)
    }

    /// Bounding box of `ellipse` cropped out of a larger cutout.
    pub fn within(parent: &Cutout, ellipse: &Ellipse) -> Result<Self, DetectionError> {
        Self::around_ellipse(&parent.pixels, parent.x_min, parent.y_min, ellipse)
    }

    fn around_ellipse(
        parent: &Raster,
        origin_x: usize,
        origin_y: usize,
        ellipse: &Ellipse,
    ) -> Result<Self, DetectionError> {
        let outside = DetectionError::OutsideFrame {
            x: ellipse.center.x,
            y: ellipse.center.y,
        };
        if parent.is_empty() {
            return Err(outside);
        }
        let rel = ellipse.center - DVec2::new(origin_x as f64, origin_y as f64);
        let (w, h) = (parent.width() as f64, parent.height() as f64);
        if rel.x.round() < 0.0 || rel.y.round() < 0.0 || rel.x.round() >= w || rel.y.round() >= h
        {
            return Err(outside);
        }

        let half = ellipse.half_extent();
        let x_lo = (rel.x - half.x).floor().clamp(0.0, w - 1.0) as usize;
        let x_hi = (rel.x + half.x).ceil().clamp(0.0, w - 1.0) as usize;
        let y_lo = (rel.y - half.y).floor().clamp(0.0, h - 1.0) as usize;
        let y_hi = (rel.y + half.y).ceil().clamp(0.0, h - 1.0) as usize;

        Ok(Self {
            pixels: parent.crop(x_lo, y_lo, x_hi - x_lo + 1, y_hi - y_lo + 1),
            x_min: origin_x + x_lo,
            y_min: origin_y + y_lo,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.pixels.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.pixels.height()
    }

    #[inline]
    pub fn origin(&self) -> DVec2 {
        DVec2::new(self.x_min as f64, self.y_min as f64)
    }

    pub fn rel_position(&self, position: DVec2) -> DVec2 {
        position - self.origin()
    }

    pub fn abs_position(&self, position: DVec2) -> DVec2 {
        position + self.origin()
    }

    /// Whether `other` lies entirely inside this cutout's footprint.
    pub fn encloses(&self, other: &Cutout) -> bool {
        other.x_min >= self.x_min
            && other.y_min >= self.y_min
            && other.x_min + other.width() <= self.x_min + self.width()
            && other.y_min + other.height() <= self.y_min + self.height()
    }

    /// Crops `data` (laid out on this cutout's footprint) to the footprint of `target`.
    pub fn crop_like<T: Clone>(&self, data: &Buffer2<T>, target: &Cutout) -> Buffer2<T> {
        assert!(
            data.width() == self.width() && data.height() == self.height(),
            "data does not match the cutout footprint"
        );
        assert!(self.encloses(target), "target footprint is not enclosed");
        data.crop(
            target.x_min - self.x_min,
            target.y_min - self.y_min,
            target.width(),
            target.height(),
        )
    }

    /// Mask of `ellipse` (absolute coordinates) on this cutout's footprint.
    pub fn ellipse_mask(&self, ellipse: &Ellipse) -> Mask {
        let rel = Ellipse {
            center: self.rel_position(ellipse.center),
            ..*ellipse
        };
        Mask::from_ellipse(self.width(), self.height(), &rel)
    }

    /// Writes `values` into `frame` wherever `mask` is set. Returns the number
    /// of replaced pixels; nothing outside the mask is touched.
    pub fn replace(&self, frame: &mut Raster, values: &Raster, mask: &Mask) -> usize {
        assert!(
            values.same_shape(&self.pixels) && mask.same_shape(&self.pixels),
            "values and mask must match the cutout footprint"
        );
        let mut replaced = 0;
        for (x, y, &covered) in mask.iter_xy() {
            if !covered {
                continue;
            }
            let (fx, fy) = (self.x_min + x, self.y_min + y);
            if fx < frame.width() && fy < frame.height() {
                frame[(fx, fy)] = values[(x, y)];
                replaced += 1;
            }
        }
        replaced
    }
}
