use glam::DVec2;

use super::buffer2::{Buffer2, SegmentationMap};
use super::ellipse::Ellipse;

/// Boolean raster aligned to a frame. `true` marks a covered pixel.
pub type Mask = Buffer2<bool>;

impl Buffer2<bool> {
    pub fn empty(width: usize, height: usize) -> Self {
        Self::new_filled(width, height, false)
    }

    /// Pixels whose centers fall inside `ellipse` (coordinates relative to this mask).
    pub fn from_ellipse(width: usize, height: usize, ellipse: &Ellipse) -> Self {
        Self::from_fn(width, height, |x, y| {
            ellipse.contains(DVec2::new(x as f64, y as f64))
        })
    }

    pub fn from_label(segments: &SegmentationMap, label: u32) -> Self {
        segments.map(|&l| l == label)
    }

    /// Any non-zero label.
    pub fn from_segments(segments: &SegmentationMap) -> Self {
        segments.map(|&l| l != 0)
    }

    pub fn union(&self, other: &Mask) -> Mask {
        self.combine(other, |a, b| a || b)
    }

    pub fn intersection(&self, other: &Mask) -> Mask {
        self.combine(other, |a, b| a && b)
    }

    pub fn inverted(&self) -> Mask {
        self.map(|&v| !v)
    }

    pub fn union_in_place(&mut self, other: &Mask) {
        assert!(self.same_shape(other), "mask shapes differ");
        for (a, &b) in self.pixels_mut().iter_mut().zip(other.pixels()) {
            *a |= b;
        }
    }

    /// Whether the pixel containing `position` is covered. Positions outside are not.
    pub fn masks(&self, position: DVec2) -> bool {
        let x = position.x.round() as i64;
        let y = position.y.round() as i64;
        self.get_checked(x, y).copied().unwrap_or(false)
    }

    pub fn count(&self) -> usize {
        self.pixels().iter().filter(|&&v| v).count()
    }

    pub fn any(&self) -> bool {
        self.pixels().iter().any(|&v| v)
    }

    fn combine(&self, other: &Mask, op: impl Fn(bool, bool) -> bool) -> Mask {
        assert!(
            self.same_shape(other),
            "mask shapes differ: {:?} vs {:?}",
            self.shape(),
            other.shape()
        );
        let pixels = self
            .pixels()
            .iter()
            .zip(other.pixels())
            .map(|(&a, &b)| op(a, b))
            .collect();
        Mask::new(self.width(), self.height(), pixels)
    }
}
