//! Runs the full pipeline on a frame directory.
//!
//! Usage: `find_sources <frames-dir> <output-dir> [config] [extended.csv] [point.csv]`

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use sourcefinder::{FinderConfig, FrameSet, SourceFinder, StaticCatalogSource};

fn main() -> Result<()> {
    let args: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    if args.len() < 2 {
        bail!("usage: find_sources <frames-dir> <output-dir> [config] [extended.csv] [point.csv]");
    }
    let (frames_dir, output_dir) = (&args[0], &args[1]);

    common::setup_logging("info", &output_dir.join("logs")).context("failed to set up logging")?;

    let config = match args.get(2) {
        Some(path) => FinderConfig::from_file(path)
            .with_context(|| format!("failed to load config '{}'", path.display()))?,
        None => FinderConfig::default(),
    };
    let catalogs = StaticCatalogSource::from_files(
        args.get(3).map(PathBuf::as_path),
        args.get(4).map(PathBuf::as_path),
    )
    .context("failed to read catalogs")?;

    let frames = FrameSet::from_directory(frames_dir)
        .with_context(|| format!("failed to load frames from '{}'", frames_dir.display()))?;

    let mut finder = SourceFinder::new(config, Box::new(catalogs))?;
    finder.add_frame_set(frames);
    let diagnostics = finder.run();
    if !diagnostics.is_clean() {
        tracing::warn!(
            frames_not_loaded = diagnostics.load_failures.len(),
            tasks_failed = diagnostics.task_failures.len(),
            stages_failed = diagnostics.stage_failures.len(),
            "run finished with failures, see diagnostics.yaml"
        );
    }

    write_results(&finder, output_dir)
}

fn write_results(finder: &SourceFinder, dir: &Path) -> Result<()> {
    finder
        .write(dir)
        .with_context(|| format!("failed to write results to '{}'", dir.display()))
}
