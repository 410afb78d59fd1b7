use glam::DVec2;

use super::*;
use crate::raster::Raster;

fn blobs() -> Raster {
    let mut data = Raster::new_filled(20, 12, 0.0);
    // 3x3 blob touching a diagonal neighbour.
    for y in 2..5 {
        for x in 2..5 {
            data[(x, y)] = 10.0;
        }
    }
    data[(5, 5)] = 10.0;
    // Separate 2x2 blob.
    for y in 8..10 {
        for x in 14..16 {
            data[(x, y)] = 10.0;
        }
    }
    // Single hot pixel.
    data[(18, 1)] = 10.0;
    data
}

#[test]
fn test_kernel_is_normalized_and_odd() {
    let kernel = GaussianKernel::new(3.0, 8);
    assert_eq!(kernel.size(), 9);

    let mut total = 0.0f32;
    for j in 0..kernel.size() {
        for i in 0..kernel.size() {
            total += kernel.weight(i, j);
        }
    }
    assert!((total - 1.0).abs() < 1e-5, "kernel sum = {}", total);
    assert!(kernel.weight(4, 4) > kernel.weight(0, 4));
}

#[test]
fn test_convolution_preserves_constant_and_skips_nan() {
    let mut data = Raster::new_filled(15, 15, 2.0);
    data[(7, 7)] = f32::NAN;

    let smoothed = GaussianKernel::new(2.0, 5).convolve(&data);

    for &v in smoothed.pixels() {
        assert!((v - 2.0).abs() < 1e-5, "value {}", v);
    }
}

#[test]
fn test_eight_connected_labeling() {
    let labels = label_above_threshold(&blobs(), 5.0, 1);

    assert_eq!(labels.max_label(), 3);
    assert_eq!(labels[(18, 1)], 1, "labels follow raster order");
    assert_eq!(labels[(2, 2)], 2);
    assert_eq!(labels[(5, 5)], 2, "diagonal pixel joins the square blob");
    assert_eq!(labels[(14, 8)], 3);
    assert_eq!(labels[(0, 0)], 0);
}

#[test]
fn test_min_pixels_drops_small_components() {
    let labels = label_above_threshold(&blobs(), 5.0, 4);

    assert_eq!(labels.max_label(), 2);
    assert_eq!(labels[(18, 1)], 0);
    assert_eq!(labels[(2, 2)], 1);
    assert_eq!(labels[(15, 9)], 2);
}

#[test]
fn test_u_shape_merges_into_one_label() {
    let mut data = Raster::new_filled(7, 5, 0.0);
    for y in 0..5 {
        data[(1, y)] = 1.0;
        data[(5, y)] = 1.0;
    }
    for x in 1..6 {
        data[(x, 4)] = 1.0;
    }

    let labels = label_above_threshold(&data, 0.5, 1);

    assert_eq!(labels.max_label(), 1);
    assert_eq!(labels[(1, 0)], labels[(5, 0)]);
}

#[test]
fn test_find_peaks_box_and_threshold() {
    let mut data = Raster::new_filled(20, 20, 0.0);
    data[(5, 5)] = 10.0;
    data[(7, 5)] = 8.0; // inside the 5x5 box of the brighter peak
    data[(15, 15)] = 6.0;
    data[(15, 3)] = 1.0; // below threshold

    let peaks = find_peaks(&data, 2.0, 5);

    assert_eq!(peaks, vec![DVec2::new(5.0, 5.0), DVec2::new(15.0, 15.0)]);
}

#[test]
fn test_find_peaks_plateau_reports_once() {
    let mut data = Raster::new_filled(10, 10, 0.0);
    data[(4, 4)] = 5.0;
    data[(5, 4)] = 5.0;

    let peaks = find_peaks(&data, 1.0, 5);

    assert_eq!(peaks, vec![DVec2::new(4.0, 4.0)]);
}
