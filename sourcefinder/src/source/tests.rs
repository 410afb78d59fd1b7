//! Tests for source background estimation, segmentation and peak finding.

use glam::DVec2;

use super::*;
use crate::testing::{star_field, SyntheticStar};

const SIZE: usize = 101;

fn single_star_frame(noise: f32) -> Raster {
    star_field(
        SIZE,
        SIZE,
        100.0,
        &[SyntheticStar::new(50.3, 49.6, 200.0, 2.0)],
        noise,
        7,
    )
}

fn source_at(frame: &Raster, center: DVec2, radius: f64) -> Source {
    Source::new(frame, center, DVec2::splat(radius), 0.0, 1.2, 2.0).unwrap()
}

#[test]
fn test_geometry_nesting() {
    let frame = single_star_frame(1.0);
    let source = source_at(&frame, DVec2::new(50.0, 50.0), 8.0);

    assert!(source.background.encloses(&source.cutout));
    assert_eq!((source.cutout.width(), source.cutout.height()), (17, 17));
    assert_eq!((source.background.width(), source.background.height()), (33, 33));
    // Annulus mask covers the inner ellipse only.
    let rel = source.background.rel_position(source.center);
    assert!(source.background_mask[(rel.x as usize, rel.y as usize)]);
    assert!(!source.background_mask[(0, 0)]);
}

#[test]
#[should_panic(expected = "outer_factor")]
fn test_invalid_factors_panic() {
    let frame = single_star_frame(0.0);
    let _ = Source::new(&frame, DVec2::new(50.0, 50.0), DVec2::splat(5.0), 0.0, 1.5, 1.2);
}

#[test]
fn test_estimate_background_is_idempotent() {
    let frame = single_star_frame(2.0);
    let mut source = source_at(&frame, DVec2::new(50.0, 50.0), 8.0);

    source
        .estimate_background(BackgroundMethod::Polynomial, true, 3.0)
        .unwrap();
    let first = source.estimated_background.clone();
    let first_cutout = source.estimated_background_cutout.clone();
    source
        .estimate_background(BackgroundMethod::Polynomial, true, 3.0)
        .unwrap();

    assert_eq!(source.estimated_background, first);
    assert_eq!(source.estimated_background_cutout, first_cutout);
}

#[test]
fn test_polynomial_background_follows_gradient() {
    let mut frame = single_star_frame(0.0);
    for (i, v) in frame.pixels_mut().iter_mut().enumerate() {
        let (x, y) = ((i % SIZE) as f32, (i / SIZE) as f32);
        *v += 0.5 * x + 0.2 * y;
    }
    let mut source = source_at(&frame, DVec2::new(50.0, 50.0), 8.0);

    source
        .estimate_background(BackgroundMethod::Polynomial, true, 3.0)
        .unwrap();

    let background = source.estimated_background_cutout.as_ref().unwrap();
    let rel = source.cutout.rel_position(DVec2::new(50.0, 50.0));
    let value = background[(rel.x as usize, rel.y as usize)];
    let expected = 100.0 + 0.5 * 50.0 + 0.2 * 50.0;
    assert!(
        (value - expected).abs() < 0.05,
        "background at center = {}, expected {}",
        value,
        expected
    );
}

#[test]
fn test_local_mean_background() {
    let frame = single_star_frame(1.0);
    let mut source = source_at(&frame, DVec2::new(50.0, 50.0), 8.0);

    source
        .estimate_background(BackgroundMethod::LocalMean, true, 3.0)
        .unwrap();

    let background = source.estimated_background_cutout.as_ref().unwrap();
    assert!((background[(0, 0)] - 100.0).abs() < 0.3, "mean = {}", background[(0, 0)]);
}

#[test]
fn test_too_few_background_pixels() {
    let frame = single_star_frame(1.0);
    let mut source = Source::new(
        &frame,
        DVec2::new(50.0, 50.0),
        DVec2::splat(0.5),
        0.0,
        1.2,
        1.5,
    )
    .unwrap();

    let result = source.estimate_background(BackgroundMethod::Polynomial, false, 3.0);

    assert!(matches!(
        result,
        Err(DetectionError::InsufficientBackground { required: 20, .. })
    ));
    assert!(!source.has_background());
}

#[test]
fn test_subtract_requires_background() {
    let frame = single_star_frame(1.0);
    let mut source = source_at(&frame, DVec2::new(50.0, 50.0), 8.0);

    assert_eq!(
        source.subtract_background(),
        Err(DetectionError::BackgroundNotEstimated)
    );
}

#[test]
fn test_locate_single_peak() {
    let frame = single_star_frame(1.0);
    let mut source = source_at(&frame, DVec2::new(48.0, 52.0), 8.0);
    source
        .estimate_background(BackgroundMethod::Polynomial, true, 3.0)
        .unwrap();
    source.subtract_background().unwrap();

    let peaks = source.locate_peaks(5.0);

    assert_eq!(peaks.len(), 1, "peaks: {:?}", peaks);
    let peak = source.peak.unwrap();
    assert!(
        (peak - DVec2::new(50.3, 49.6)).length() < 1.0,
        "peak at {:?}",
        peak
    );
}

#[test]
fn test_two_peaks_leave_peak_unset() {
    let frame = star_field(
        SIZE,
        SIZE,
        100.0,
        &[
            SyntheticStar::new(46.0, 50.0, 200.0, 1.5),
            SyntheticStar::new(55.0, 50.0, 150.0, 1.5),
        ],
        1.0,
        11,
    );
    let mut source = source_at(&frame, DVec2::new(50.0, 50.0), 8.0);
    source
        .estimate_background(BackgroundMethod::Polynomial, true, 3.0)
        .unwrap();
    source.subtract_background().unwrap();

    let peaks = source.locate_peaks(5.0);

    assert_eq!(peaks.len(), 2, "peaks: {:?}", peaks);
    assert!(source.peak.is_none());
}

#[test]
fn test_find_center_segment() {
    let frame = single_star_frame(1.0);
    let mut source = source_at(&frame, DVec2::new(50.0, 50.0), 8.0);

    let found = source.find_center_segment(2.0, 3.0, 5, 5).unwrap();

    assert!(found);
    let mask = source.mask.as_ref().unwrap();
    let rel = source.cutout.rel_position(source.center);
    assert!(mask[(rel.x as usize, rel.y as usize)]);
    assert!(mask.count() >= 5 && mask.count() < mask.len());
}

#[test]
fn test_no_segment_on_blank_sky() {
    let frame = star_field(SIZE, SIZE, 100.0, &[], 1.0, 3);
    let mut source = source_at(&frame, DVec2::new(50.0, 50.0), 8.0);

    let found = source.find_center_segment(3.0, 3.0, 5, 5).unwrap();

    assert!(!found);
    assert!(source.mask.is_none());
}

#[test]
fn test_zoom_shrinks_and_resets_derived_fields() {
    let frame = single_star_frame(1.0);
    let mut source = source_at(&frame, DVec2::new(50.0, 50.0), 10.0);
    source
        .estimate_background(BackgroundMethod::Polynomial, true, 3.0)
        .unwrap();
    source.subtract_background().unwrap();
    source.locate_peaks(5.0);
    source.find_center_segment(2.0, 3.0, 5, 5).unwrap();
    assert!(source.peak.is_some() && source.mask.is_some());

    let zoomed = source.zoom(2.0).unwrap();

    assert!(zoomed.cutout.width() < source.cutout.width());
    assert!(zoomed.cutout.height() < source.cutout.height());
    assert!(zoomed.background.width() < source.background.width());
    assert!(zoomed.background.height() < source.background.height());
    assert_eq!(zoomed.center, source.center);
    assert!(zoomed.background.encloses(&zoomed.cutout));
    assert!(zoomed.mask.is_none());
    assert!(zoomed.estimated_background.is_none());
    assert!(zoomed.estimated_background_cutout.is_none());
    assert!(zoomed.subtracted.is_none());
    assert!(zoomed.peak.is_none());
    // The original is untouched.
    assert!(source.peak.is_some());
}

#[test]
fn test_replace_in_writes_background_under_mask_only() {
    let mut frame = single_star_frame(1.0);
    let original = frame.clone();
    let mut source = source_at(&frame, DVec2::new(50.0, 50.0), 8.0);
    source
        .estimate_background(BackgroundMethod::Polynomial, true, 3.0)
        .unwrap();
    source.use_aperture_mask();

    let replaced = source.replace_in(&mut frame).unwrap();

    let mask = source.removal_mask();
    assert_eq!(replaced, mask.count());
    let changed = frame
        .pixels()
        .iter()
        .zip(original.pixels())
        .filter(|(a, b)| a.to_bits() != b.to_bits())
        .count();
    assert!(changed <= replaced);
    assert!((frame[(50, 50)] - 100.0).abs() < 1.0, "center = {}", frame[(50, 50)]);
}

#[test]
fn test_segment_ellipse_of_round_star() {
    let frame = single_star_frame(0.5);
    let mut source = source_at(&frame, DVec2::new(50.0, 50.0), 8.0);
    source.find_center_segment(2.0, 3.0, 5, 5).unwrap();

    let ellipse = source.segment_ellipse().unwrap();

    assert!((ellipse.center - DVec2::new(50.3, 49.6)).length() < 0.5);
    assert!(ellipse.radius.x / ellipse.radius.y < 1.3);
}
