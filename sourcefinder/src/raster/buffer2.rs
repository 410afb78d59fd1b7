use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Row-major 2-D buffer. Pixel `(x, y)` is stored at `y * width + x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Buffer2<T> {
    pixels: Vec<T>,
    width: usize,
    height: usize,
}

impl<T> Buffer2<T> {
    pub fn new(width: usize, height: usize, pixels: Vec<T>) -> Self {
        assert_eq!(
            pixels.len(),
            width * height,
            "pixels length must equal width * height"
        );
        Self {
            pixels,
            width,
            height,
        }
    }

    /// Builds a buffer without checking the pixel count. Callers validate
    /// with [`Buffer2::is_consistent`] before indexing.
    pub(crate) fn from_parts_unchecked(width: usize, height: usize, pixels: Vec<T>) -> Self {
        Self {
            pixels,
            width,
            height,
        }
    }

    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self {
            pixels,
            width,
            height,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> &T {
        debug_assert!(x < self.width && y < self.height);
        &self.pixels[y * self.width + x]
    }

    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize) -> &mut T {
        debug_assert!(x < self.width && y < self.height);
        &mut self.pixels[y * self.width + x]
    }

    /// Bounds-checked access with signed coordinates.
    #[inline]
    pub fn get_checked(&self, x: i64, y: i64) -> Option<&T> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }
        Some(&self.pixels[y as usize * self.width + x as usize])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    #[inline]
    pub fn same_shape<U>(&self, other: &Buffer2<U>) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// True when the declared shape matches the stored pixel count.
    /// Only deserialized buffers can violate this.
    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.pixels.len() == self.width * self.height
    }

    #[inline]
    pub fn pixels(&self) -> &[T] {
        &self.pixels
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [T] {
        &mut self.pixels
    }

    #[inline]
    pub fn into_pixels(self) -> Vec<T> {
        self.pixels
    }

    /// Iterates `(x, y, &value)` in row-major order.
    pub fn iter_xy(&self) -> impl Iterator<Item = (usize, usize, &T)> {
        let width = self.width;
        self.pixels
            .iter()
            .enumerate()
            .map(move |(i, v)| (i % width, i / width, v))
    }

    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Buffer2<U> {
        Buffer2 {
            pixels: self.pixels.iter().map(f).collect(),
            width: self.width,
            height: self.height,
        }
    }

    #[inline]
    pub fn copy_from(&mut self, other: &Self)
    where
        T: Copy,
    {
        assert_eq!(self.width, other.width, "width mismatch");
        assert_eq!(self.height, other.height, "height mismatch");
        self.pixels.copy_from_slice(&other.pixels);
    }

    /// Copies the `width x height` window starting at `(x_min, y_min)`.
    pub fn crop(&self, x_min: usize, y_min: usize, width: usize, height: usize) -> Self
    where
        T: Clone,
    {
        assert!(
            x_min + width <= self.width && y_min + height <= self.height,
            "crop window {}x{} at ({}, {}) exceeds {}x{}",
            width,
            height,
            x_min,
            y_min,
            self.width,
            self.height
        );
        let mut pixels = Vec::with_capacity(width * height);
        for y in y_min..y_min + height {
            let start = y * self.width + x_min;
            pixels.extend_from_slice(&self.pixels[start..start + width]);
        }
        Self {
            pixels,
            width,
            height,
        }
    }
}

impl<T: Default + Clone> Buffer2<T> {
    pub fn new_default(width: usize, height: usize) -> Self {
        Self {
            pixels: vec![T::default(); width * height],
            width,
            height,
        }
    }
}

impl<T: Clone> Buffer2<T> {
    pub fn new_filled(width: usize, height: usize, value: T) -> Self {
        Self {
            pixels: vec![value; width * height],
            width,
            height,
        }
    }
}

impl<T> Index<(usize, usize)> for Buffer2<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &Self::Output {
        &self.pixels[y * self.width + x]
    }
}

impl<T> IndexMut<(usize, usize)> for Buffer2<T> {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut Self::Output {
        &mut self.pixels[y * self.width + x]
    }
}

impl<T> Index<usize> for Buffer2<T> {
    type Output = T;

    #[inline]
    fn index(&self, idx: usize) -> &Self::Output {
        &self.pixels[idx]
    }
}

impl<T> IndexMut<usize> for Buffer2<T> {
    #[inline]
    fn index_mut(&mut self, idx: usize) -> &mut Self::Output {
        &mut self.pixels[idx]
    }
}

/// Single-precision image raster.
pub type Raster = Buffer2<f32>;

/// Integer label map. 0 is background, labels start at 1.
pub type SegmentationMap = Buffer2<u32>;

impl Buffer2<u32> {
    /// Largest label present, 0 for an empty map.
    pub fn max_label(&self) -> u32 {
        self.pixels.iter().copied().max().unwrap_or(0)
    }
}
