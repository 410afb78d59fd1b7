use glam::DVec2;

use super::*;
use crate::math::sigma_to_fwhm;
use crate::raster::Raster;
use crate::source::{BackgroundMethod, Source};
use crate::testing::{star_field, SyntheticStar};

fn prepared_source(frame: &Raster, center: DVec2) -> Source {
    let mut source = Source::new(frame, center, DVec2::splat(8.0), 0.0, 1.2, 2.0).unwrap();
    source
        .estimate_background(BackgroundMethod::Polynomial, true, 3.0)
        .unwrap();
    source.subtract_background().unwrap();
    source.locate_peaks(5.0);
    source
}

#[test]
fn test_gaussian_fit_recovers_parameters() {
    let truth = SyntheticStar::new(40.4, 39.7, 300.0, 1.8);
    let frame = star_field(81, 81, 50.0, &[truth], 1.0, 21);
    let source = prepared_source(&frame, DVec2::new(40.0, 40.0));

    let model = fit_profile(&source, ModelFamily::Gaussian, &FitConfig::default()).unwrap();

    let true_fwhm = sigma_to_fwhm(truth.sigma as f64);
    assert!(
        (model.amplitude - 300.0).abs() / 300.0 < 0.05,
        "amplitude = {}",
        model.amplitude
    );
    assert!(
        (model.fwhm - true_fwhm).abs() / true_fwhm < 0.05,
        "fwhm = {}, expected {}",
        model.fwhm,
        true_fwhm
    );
    assert!((model.center - truth.position).length() < 0.1, "center = {:?}", model.center);
    assert!((model.sigma() - 1.8).abs() < 0.09);
}

#[test]
fn test_moffat_fit_recovers_fwhm() {
    let moffat = CircularMoffat::new(2.5);
    let alpha = 3.0;
    let center = DVec2::new(30.2, 29.8);
    let frame = Raster::from_fn(61, 61, |x, y| {
        let r2 = (DVec2::new(x as f64, y as f64) - center).length_squared();
        (10.0 + 200.0 * (1.0 + r2 / (alpha * alpha)).powf(-2.5)) as f32
    });
    let source = prepared_source(&frame, DVec2::new(30.0, 30.0));
    let config = FitConfig {
        model_families: vec![ModelFamily::Moffat],
        ..FitConfig::default()
    };

    let (model, failures) = fit_first(&source, &config);

    let model = model.unwrap();
    assert!(failures.is_empty());
    assert_eq!(model.family, ModelFamily::Moffat);
    let true_fwhm = moffat.fwhm(alpha);
    assert!(
        (model.fwhm - true_fwhm).abs() / true_fwhm < 0.05,
        "fwhm = {}, expected {}",
        model.fwhm,
        true_fwhm
    );
}

#[test]
fn test_first_successful_family_wins() {
    let frame = star_field(81, 81, 50.0, &[SyntheticStar::new(40.0, 40.0, 300.0, 2.0)], 1.0, 5);
    let source = prepared_source(&frame, DVec2::new(40.0, 40.0));

    let (model, failures) = fit_first(&source, &FitConfig::default());

    assert_eq!(model.unwrap().family, ModelFamily::Gaussian);
    assert!(failures.is_empty());
}

#[test]
fn test_all_families_rejected() {
    let frame = star_field(81, 81, 50.0, &[SyntheticStar::new(40.0, 40.0, 300.0, 2.0)], 1.0, 5);
    let source = prepared_source(&frame, DVec2::new(40.0, 40.0));
    let config = FitConfig {
        min_fwhm: 10.0,
        max_fwhm: 20.0,
        ..FitConfig::default()
    };

    let (model, failures) = fit_first(&source, &config);

    assert!(model.is_none());
    assert_eq!(failures.len(), 2);
    assert!(failures
        .iter()
        .all(|(_, e)| matches!(e, FitError::FwhmOutOfRange { .. })));
}

#[test]
fn test_too_few_pixels() {
    let frame = star_field(41, 41, 50.0, &[], 1.0, 5);
    let source = Source::new(&frame, DVec2::new(20.0, 20.0), DVec2::splat(0.9), 0.0, 1.2, 2.0).unwrap();

    let result = fit_profile(&source, ModelFamily::Gaussian, &FitConfig::default());

    assert!(matches!(result, Err(FitError::TooFewPixels { required: 10, .. })));
}

#[test]
fn test_unconverged_fit_is_rejected() {
    let frame = star_field(81, 81, 50.0, &[SyntheticStar::new(40.4, 39.7, 300.0, 1.8)], 1.0, 8);
    let source = prepared_source(&frame, DVec2::new(40.0, 40.0));
    let config = FitConfig {
        max_iterations: 1,
        ..FitConfig::default()
    };

    let (model, failures) = fit_first(&source, &config);

    assert!(model.is_none());
    assert_eq!(failures.len(), 2);
    assert!(failures
        .iter()
        .all(|(_, e)| matches!(e, FitError::NotConverged { iterations: 1 })));
}

#[test]
fn test_config_validation() {
    assert!(FitConfig::default().validate().is_ok());
    let bad = FitConfig {
        min_fwhm: 5.0,
        max_fwhm: 2.0,
        ..FitConfig::default()
    };
    assert!(bad.validate().is_err());
    let bad = FitConfig {
        max_iterations: 0,
        ..FitConfig::default()
    };
    assert!(bad.validate().is_err());
}
