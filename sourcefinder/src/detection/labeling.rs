//! Threshold segmentation with 8-connected component labeling.

use super::kernel::GaussianKernel;
use crate::raster::{Raster, SegmentationMap};

struct UnionFind {
    parent: Vec<u32>,
}

impl UnionFind {
    fn new() -> Self {
        // Label 0 is background.
        Self { parent: vec![0] }
    }

    fn make_set(&mut self) -> u32 {
        let label = self.parent.len() as u32;
        self.parent.push(label);
        label
    }

    fn find(&mut self, mut label: u32) -> u32 {
        while self.parent[label as usize] != label {
            let grandparent = self.parent[self.parent[label as usize] as usize];
            self.parent[label as usize] = grandparent;
            label = grandparent;
        }
        label
    }

    fn union(&mut self, a: u32, b: u32) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[high as usize] = low;
        }
    }
}

/// Labels 8-connected groups of pixels strictly above `threshold`.
///
/// Components with fewer than `min_pixels` pixels are dropped. Surviving
/// labels are renumbered 1..=n in raster order of their first pixel.
pub fn label_above_threshold(data: &Raster, threshold: f32, min_pixels: usize) -> SegmentationMap {
    let (width, height) = data.shape();
    let mut labels = SegmentationMap::new_default(width, height);
    let mut sets = UnionFind::new();

    for y in 0..height {
        for x in 0..width {
            let value = data[(x, y)];
            if !(value.is_finite() && value > threshold) {
                continue;
            }
            let mut neighbors = [0u32; 4];
            if x > 0 {
                neighbors[0] = labels[(x - 1, y)];
            }
            if y > 0 {
                neighbors[1] = labels[(x, y - 1)];
                if x > 0 {
                    neighbors[2] = labels[(x - 1, y - 1)];
                }
                if x + 1 < width {
                    neighbors[3] = labels[(x + 1, y - 1)];
                }
            }

            let label = match neighbors.iter().copied().filter(|&l| l != 0).min() {
                Some(first) => {
                    for &other in neighbors.iter().filter(|&&l| l != 0) {
                        sets.union(first, other);
                    }
                    first
                }
                None => sets.make_set(),
            };
            labels[(x, y)] = label;
        }
    }

    let mut sizes = vec![0usize; sets.parent.len()];
    for i in 0..labels.len() {
        if labels[i] != 0 {
            let root = sets.find(labels[i]);
            labels[i] = root;
            sizes[root as usize] += 1;
        }
    }

    let mut renumbered = vec![0u32; sets.parent.len()];
    let mut next = 0u32;
    for i in 0..labels.len() {
        let root = labels[i] as usize;
        if root == 0 {
            continue;
        }
        if sizes[root] < min_pixels {
            labels[i] = 0;
            continue;
        }
        if renumbered[root] == 0 {
            next += 1;
            renumbered[root] = next;
        }
        labels[i] = renumbered[root];
    }

    labels
}

/// Optionally smooths `data` with `kernel`, then labels it against `threshold`.
pub fn detect_sources(
    data: &Raster,
    threshold: f32,
    min_pixels: usize,
    kernel: Option<&GaussianKernel>,
) -> SegmentationMap {
    match kernel {
        Some(kernel) => label_above_threshold(&kernel.convolve(data), threshold, min_pixels),
        None => label_above_threshold(data, threshold, min_pixels),
    }
}
