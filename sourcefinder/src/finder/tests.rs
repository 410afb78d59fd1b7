use std::collections::BTreeMap;

use glam::DVec2;

use super::output::{SegmentFile, DIAGNOSTICS_FILE, SEGMENT_MANIFEST};
use super::*;
use crate::catalog::StaticCatalogSource;
use crate::error::{FrameError, TaskError};
use crate::extraction::PointSourceConfig;
use crate::raster::fits::{read_fits, write_fits};
use crate::raster::raw::write_raw;
use crate::raster::{Buffer2, Frame, Mask, Raster};
use crate::testing::{sky_at, star_field, test_frame, test_transform, SyntheticStar};
use common::file_format::{read_file, write_file};
use common::test_utils::test_output_dir;

const SIZE: usize = 100;
const A: DVec2 = DVec2::new(30.0, 30.0);
const B: DVec2 = DVec2::new(70.0, 60.0);
const BLANK: DVec2 = DVec2::new(30.0, 75.0);

fn band(name: &str, wavelength: f64, stars: &[SyntheticStar], seed: u64) -> Frame {
    test_frame(name, star_field(SIZE, SIZE, 10.0, stars, 1.0, seed), Some(wavelength))
}

fn point_catalog() -> Vec<PointSourceEntry> {
    [("a", A), ("b", B), ("blank", BLANK)]
        .into_iter()
        .map(|(id, p)| PointSourceEntry::new("2MASS", id, sky_at(SIZE, SIZE, p)))
        .collect()
}

fn finder(config: FinderConfig, catalog: StaticCatalogSource) -> SourceFinder {
    SourceFinder::new(config, Box::new(catalog)).unwrap()
}

fn stars_only() -> FinderConfig {
    FinderConfig {
        processes: 2,
        find_galaxies: false,
        find_other_sources: false,
        ..FinderConfig::default()
    }
}

fn star(p: DVec2, amplitude: f32) -> SyntheticStar {
    SyntheticStar::new(p.x, p.y, amplitude, 1.5)
}

#[test]
fn test_merged_rows_match_frame_detections() {
    let mut finder = finder(stars_only(), StaticCatalogSource::new(None, Some(point_catalog())));
    finder.add_frame(band("g", 0.47, &[star(A, 500.0), star(B, 300.0)], 1));
    finder.add_frame(band("r", 0.65, &[star(A, 400.0)], 2));

    finder.find_stars().unwrap();

    let outputs = finder.outputs(SourceClass::Stars).unwrap();
    assert_eq!(outputs.len(), 2);
    let stars = finder.stars();
    assert_eq!(stars.len(), 3);
    for (index, entry) in stars.iter().enumerate() {
        assert_eq!(entry.index, index);
        for (name, output) in outputs {
            let detected = output.table.row(index).unwrap().detected;
            assert_eq!(entry.flux(name).is_some(), detected, "row {} band {}", index, name);
        }
    }
    assert_eq!(stars[0].fluxes.len(), 2);
    assert_eq!(stars[1].fluxes.keys().collect::<Vec<_>>(), vec!["g"]);
    assert!(stars[2].fluxes.is_empty());
    assert_eq!(finder.point_catalog().len(), 3);
}

#[test]
fn test_colour_windows_reject_candidates() {
    let config = FinderConfig {
        colour_windows: vec![ColourWindow::new("g", "r", -1.0, 1.0)],
        ..stars_only()
    };
    let mut finder = finder(config, StaticCatalogSource::new(None, Some(point_catalog())));
    // A is five times brighter in g (colour about -1.75), B is flat.
    finder.add_frame(band("g", 0.47, &[star(A, 500.0), star(B, 300.0)], 3));
    finder.add_frame(band("r", 0.65, &[star(A, 100.0), star(B, 300.0)], 4));

    finder.find_stars().unwrap();

    let kept: Vec<usize> = finder.stars().iter().map(|s| s.index).collect();
    assert_eq!(kept, vec![1, 2]);
}

#[test]
fn test_colour_of_missing_flux_is_not_evaluated() {
    let window = ColourWindow::new("g", "r", -1.0, 1.0);
    assert!(window.colour(Some(10.0), None).is_none());
    assert!(window.colour(Some(10.0), Some(-1.0)).is_none());
    let colour = window.colour(Some(100.0), Some(10.0)).unwrap();
    assert!((colour + 2.5).abs() < 1e-12, "colour {}", colour);
    assert!(!window.accepts(colour));

    let entry = CrossBandEntry {
        index: 0,
        catalog: (),
        fluxes: BTreeMap::from([("g".to_string(), 5.0)]),
    };
    assert!(entry.passes(&[window]));
}

#[test]
fn test_wavelength_cutoff_skips_long_bands() {
    let mut finder = finder(stars_only(), StaticCatalogSource::new(None, Some(point_catalog())));
    finder.add_frame(band("g", 0.47, &[star(A, 500.0)], 5));
    finder.add_frame(band("w4", 22.0, &[star(A, 500.0)], 6));
    finder.add_frame(band("pacs", 70.0, &[], 7));

    finder.find_stars().unwrap();

    let outputs = finder.outputs(SourceClass::Stars).unwrap();
    assert_eq!(outputs.keys().collect::<Vec<_>>(), vec!["g", "w4"]);
}

#[test]
fn test_empty_catalogs_run_cleanly() {
    let config = FinderConfig {
        processes: 2,
        ..FinderConfig::default()
    };
    let mut finder = finder(config, StaticCatalogSource::new(Some(Vec::new()), Some(Vec::new())));
    finder.add_frame(band("g", 0.47, &[], 8));
    finder.add_frame(band("r", 0.65, &[], 9));

    let diagnostics = finder.run().clone();

    assert!(diagnostics.is_clean(), "{:?}", diagnostics);
    assert!(finder.galaxies().is_empty());
    assert!(finder.stars().is_empty());
    for class in [SourceClass::Galaxies, SourceClass::Stars, SourceClass::Other] {
        let outputs = finder.outputs(class).unwrap();
        assert_eq!(outputs.len(), 2, "{}", class);
        for output in outputs.values() {
            assert!(output.table.is_empty());
            assert!(output.regions.is_empty());
            assert_eq!(output.segments.max_label(), 0);
        }
    }
}

#[test]
fn test_corrupted_frame_fails_alone() {
    let mut finder = finder(stars_only(), StaticCatalogSource::new(None, Some(point_catalog())));
    finder.add_frame(band("g", 0.47, &[star(A, 500.0)], 10));
    finder.add_frame(band("r", 0.65, &[star(A, 500.0)], 11));
    let mut broken = band("i", 0.8, &[star(A, 500.0)], 12);
    broken.pixels = Buffer2::from_parts_unchecked(SIZE, SIZE, vec![10.0; SIZE]);
    finder.add_frame(broken);

    finder.find_stars().unwrap();

    let outputs = finder.outputs(SourceClass::Stars).unwrap();
    assert_eq!(outputs.keys().collect::<Vec<_>>(), vec!["g", "r"]);
    let failures = &finder.diagnostics().task_failures;
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        failures.get("stars/i"),
        Some(TaskError::Frame(FrameError::ShapeMismatch { .. }))
    ));
    assert_eq!(finder.stars().len(), 3);
    assert_eq!(finder.stars()[0].fluxes.len(), 2);
}

#[test]
fn test_missing_catalog_does_not_block_later_stages() {
    let config = FinderConfig {
        processes: 1,
        ..FinderConfig::default()
    };
    let mut finder = finder(config, StaticCatalogSource::new(Some(Vec::new()), None));
    finder.add_frame(band("g", 0.47, &[star(A, 500.0)], 13));

    let diagnostics = finder.run().clone();

    assert!(!diagnostics.is_clean());
    assert_eq!(diagnostics.stage_failures.len(), 1);
    assert_eq!(diagnostics.stage_failures[0].stage, Stage::Catalog);
    assert!(finder.outputs(SourceClass::Stars).is_none());
    // The uncataloged scan picks up the star instead.
    let other = &finder.outputs(SourceClass::Other).unwrap()["g"];
    assert_eq!(other.segments.max_label(), 1);
    assert!(other.segments[(30, 30)] > 0);
}

#[test]
fn test_removed_stars_feed_later_stages() {
    let mut finder = finder(
        FinderConfig {
            processes: 2,
            ..FinderConfig::default()
        },
        StaticCatalogSource::new(Some(Vec::new()), Some(point_catalog())),
    );
    finder.add_frame(band("g", 0.47, &[star(A, 500.0), star(B, 300.0)], 14));

    let diagnostics = finder.run().clone();

    assert!(diagnostics.task_failures.is_empty());
    let frame = finder.frame("g").unwrap();
    assert!(frame.pixels[(30, 30)] < 15.0, "residual {}", frame.pixels[(30, 30)]);
    let other = &finder.outputs(SourceClass::Other).unwrap()["g"];
    assert_eq!(other.segments.max_label(), 0);
    assert!(diagnostics.frames.contains_key("stars/g"));
    assert!(diagnostics.frames.contains_key("other/g"));
}

#[test]
fn test_set_masks_requires_known_frame() {
    let mut finder = finder(stars_only(), StaticCatalogSource::default());
    finder.add_frame(band("g", 0.47, &[], 15));

    assert!(finder.set_masks("g", FrameMasks::default()).is_ok());
    assert!(finder.set_masks("nope", FrameMasks::default()).is_err());
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = FinderConfig {
        processes: 0,
        ..FinderConfig::default()
    };
    assert!(SourceFinder::new(config, Box::new(StaticCatalogSource::default())).is_err());

    let config = FinderConfig {
        colour_windows: vec![ColourWindow::new("g", "g", 0.0, 1.0)],
        ..FinderConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_pool_isolates_failed_tasks() {
    let good = band("g", 0.47, &[star(A, 500.0)], 16);
    let mut bad = band("r", 0.65, &[], 17);
    bad.pixels = Raster::new_filled(SIZE, SIZE, f32::NAN);
    let task = |frame: Frame| {
        FrameTask::Point(PointTask {
            frame,
            catalog: point_catalog(),
            galaxy_segments: None,
            masks: FrameMasks::default(),
            config: PointSourceConfig::default(),
        })
    };

    let mut pool = WorkerPool::new("test", 2).unwrap();
    let handles = vec![pool.dispatch(task(good)), pool.dispatch(task(bad))];
    assert_eq!(handles[1].frame(), "r");
    let states = pool.collect(handles);
    pool.close();

    assert!(states["g"].is_completed());
    assert!(matches!(
        &states["r"],
        TaskState::Failed(TaskError::Frame(FrameError::NoFinitePixels { .. }))
    ));
}

#[test]
fn test_task_survives_serialization() {
    let frame = band("g", 0.47, &[star(A, 500.0), star(B, 300.0)], 18);
    let task = FrameTask::Point(PointTask {
        frame,
        catalog: point_catalog(),
        galaxy_segments: None,
        masks: FrameMasks::default(),
        config: PointSourceConfig::default(),
    });

    let message = serde_json::to_string(&task).unwrap();
    let received: FrameTask = serde_json::from_str(&message).unwrap();

    assert_eq!(received.frame_name(), "g");
    assert_eq!(received.run().unwrap(), task.run().unwrap());
}

#[test]
fn test_frame_set_round_trip() {
    let dir = test_output_dir("finder_frame_set");
    let frame = band("g", 0.47, &[star(A, 500.0)], 19);
    write_raw(&dir.join("g.raw"), &frame.pixels).unwrap();
    let mut bad = Mask::empty(SIZE, SIZE);
    bad[(1, 2)] = true;
    write_raw(&dir.join("g_bad.raw"), &bad.map(|&b| b as u8)).unwrap();
    let descriptor = FrameSetDescriptor {
        frames: vec![FrameDescriptor {
            name: "g".to_string(),
            file: "g.raw".into(),
            width: Some(SIZE),
            height: Some(SIZE),
            transform: Some(test_transform(SIZE, SIZE)),
            filter: frame.filter.clone(),
            errors: None,
            psf_fwhm: Some(3.5),
            masks: MaskFiles {
                bad: Some("g_bad.raw".into()),
                ..MaskFiles::default()
            },
        }],
    };
    write_file(&dir.join("frames.yaml"), &descriptor).unwrap();

    let set = FrameSet::from_directory(&dir).unwrap();

    assert_eq!(set.frames.len(), 1);
    assert!(set.failures.is_empty());
    let loaded = &set.frames[0];
    assert_eq!(loaded.pixels, frame.pixels);
    assert_eq!(loaded.psf_fwhm, Some(3.5));
    assert!(loaded.validate().is_ok());
    assert_eq!(set.masks["g"].bad.as_ref(), Some(&bad));
    assert!(set.masks["g"].ignore.is_none());
}

fn descriptor(name: &str, file: &str, frame: &Frame) -> FrameDescriptor {
    FrameDescriptor {
        name: name.to_string(),
        file: file.into(),
        width: None,
        height: None,
        transform: None,
        filter: frame.filter.clone(),
        errors: None,
        psf_fwhm: None,
        masks: MaskFiles::default(),
    }
}

#[test]
fn test_fits_frames_take_their_transform_from_the_header() {
    let dir = test_output_dir("finder_fits_frames");
    let frame = band("g", 0.47, &[star(A, 500.0)], 21);
    write_fits(&dir.join("g.fits"), &frame.pixels, Some(&frame.transform)).unwrap();
    let mut ignore = Mask::empty(SIZE, SIZE);
    ignore[(5, 6)] = true;
    write_fits(&dir.join("g_ignore.fits"), &ignore.map(|&b| b as u8 as f32), None).unwrap();
    let mut entry = descriptor("g", "g.fits", &frame);
    entry.masks.ignore = Some("g_ignore.fits".into());
    write_file(&dir.join("frames.yaml"), &FrameSetDescriptor { frames: vec![entry] }).unwrap();

    let set = FrameSet::from_directory(&dir).unwrap();

    assert!(set.failures.is_empty(), "{:?}", set.failures);
    let loaded = &set.frames[0];
    assert_eq!(loaded.pixels, frame.pixels);
    assert!((loaded.transform.crpix - frame.transform.crpix).length() < 1e-9);
    assert!((loaded.transform.crval - frame.transform.crval).length() < 1e-6);
    assert!((loaded.pixel_scale_arcsec() - frame.pixel_scale_arcsec()).abs() < 1e-6);
    let a = sky_at(SIZE, SIZE, A);
    assert!((loaded.pixel_position(a) - A).length() < 0.01);
    assert_eq!(set.masks["g"].ignore.as_ref(), Some(&ignore));
}

#[test]
fn test_unreadable_frame_does_not_sink_the_set() {
    let dir = test_output_dir("finder_frame_set_partial");
    let frame = band("g", 0.47, &[star(A, 500.0)], 22);
    write_fits(&dir.join("g.fits"), &frame.pixels, Some(&frame.transform)).unwrap();
    write_raw(&dir.join("i.raw"), &frame.pixels).unwrap();
    let descriptor = FrameSetDescriptor {
        frames: vec![
            descriptor("g", "g.fits", &frame),
            descriptor("r", "missing.raw", &frame),
            // Raw without shape or transform.
            descriptor("i", "i.raw", &frame),
        ],
    };
    write_file(&dir.join("frames.yaml"), &descriptor).unwrap();

    let set = FrameSet::from_directory(&dir).unwrap();

    assert_eq!(set.frames.len(), 1);
    assert_eq!(set.frames[0].name, "g");
    assert_eq!(set.failures.keys().collect::<Vec<_>>(), vec!["i", "r"]);
    assert!(set.failures["r"].contains("missing.raw"));

    let mut finder = finder(stars_only(), StaticCatalogSource::new(None, Some(point_catalog())));
    finder.add_frame_set(set);
    let diagnostics = finder.run().clone();

    assert!(!diagnostics.is_clean());
    assert_eq!(diagnostics.load_failures.len(), 2);
    assert!(diagnostics.task_failures.is_empty());
    assert!(finder.outputs(SourceClass::Stars).unwrap()["g"]
        .table
        .detected_flux(0)
        .is_some());
}

#[test]
fn test_missing_descriptor_is_an_error() {
    let dir = test_output_dir("finder_no_descriptor");
    assert!(FrameSet::from_directory(&dir).is_err());
}

#[test]
fn test_write_results() {
    let galaxies = vec![{
        let mut entry = ExtendedSourceEntry::new("NGC 1", sky_at(SIZE, SIZE, DVec2::new(60.0, 30.0)));
        entry.major = Some(0.3);
        entry.principal = true;
        entry
    }];
    let mut finder = finder(
        FinderConfig {
            processes: 2,
            ..FinderConfig::default()
        },
        StaticCatalogSource::new(Some(galaxies), Some(point_catalog())),
    );
    finder.add_frame(band("g", 0.47, &[star(A, 500.0)], 20));
    finder.run();
    let dir = test_output_dir("finder_write");

    finder.write(&dir).unwrap();

    for file in [
        "extended_sources.csv",
        "point_sources.csv",
        "galaxies.csv",
        "stars.csv",
        "g_galaxies.reg",
        "g_stars.reg",
        "g_saturation.reg",
        "g_other.reg",
    ] {
        assert!(dir.join(file).is_file(), "{} missing", file);
    }
    let manifest: Vec<SegmentFile> = read_file(&dir.join(SEGMENT_MANIFEST)).unwrap();
    assert_eq!(manifest.len(), 3);
    assert!(manifest.iter().all(|s| s.width == SIZE && s.height == SIZE));
    let segments = std::fs::read(dir.join(&manifest[0].file)).unwrap();
    assert_eq!(segments.len(), SIZE * SIZE * 4);

    let mut reader = csv::Reader::from_path(dir.join("stars.csv")).unwrap();
    let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(header, vec!["index", "catalog", "id", "ra", "dec", "flux_g"]);
    assert_eq!(reader.records().count(), 3);

    let cleaned = read_fits(&dir.join("g_cleaned.fits")).unwrap();
    assert_eq!(cleaned.pixels, finder.frame("g").unwrap().pixels);
    assert!(cleaned.transform.is_some());

    let diagnostics: RunDiagnostics = read_file(&dir.join(DIAGNOSTICS_FILE)).unwrap();
    assert_eq!(&diagnostics, finder.diagnostics());
}
