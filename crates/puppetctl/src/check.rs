//! `puppetctl check`: validates a stage configuration and, unless told otherwise, opens every
//! model it declares to confirm the manifests and their files resolve.
//!
//! Functions:
//!
//! - `run` backs the subcommand.
//! - `resolve_model_location` anchors relative model paths at the config file's directory.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use modelpack::{ModelLocator, BLOB_SCHEME};
use renderer::{ModelOptions, PointerMode};
use stageconfig::{ModelLocation, StageConfig};
use tracing::{info, warn};

use crate::cli::CheckArgs;
use crate::inspect::inspect_locator;
use crate::paths::AppPaths;
use crate::run::open_fetcher;

pub fn run(args: CheckArgs) -> Result<()> {
    let path = match args.config {
        Some(path) => path,
        None => AppPaths::discover()?.stage_file(),
    };
    let config = StageConfig::load(&path)?;
    info!(
        path = %path.display(),
        models = config.models.len(),
        "stage configuration is valid"
    );
    let canvas = &config.canvas;
    println!(
        "{}: canvas {}x{}, pointer {:?}, frame interval {:?}, {} model(s)",
        path.display(),
        canvas.width,
        canvas.height,
        PointerMode::from(canvas.pointer),
        config.runner.frame_interval,
        config.models.len()
    );
    println!(
        "  offset ({}, {}), clear colour {:?}, hit areas {}",
        canvas.offset[0],
        canvas.offset[1],
        canvas.clear_color,
        if canvas.show_hit_areas { "shown" } else { "hidden" }
    );
    for entry in &config.models {
        println!("  {}: {}", entry.name, describe_options(&ModelOptions::from(entry)));
    }

    if args.skip_models {
        return Ok(());
    }

    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let fetcher = open_fetcher()?;
    let mut failed = 0usize;
    for entry in &config.models {
        let Some(location) = entry.location() else {
            continue;
        };
        let locator = resolve_model_location(&base, &location);
        match inspect_locator(&locator, &fetcher) {
            Ok(report) if report.problem_count() == 0 => {
                println!("  {}: ok ({})", entry.name, report.manifest);
            }
            Ok(report) => {
                failed += 1;
                println!("  {}: {} problem(s)", entry.name, report.problem_count());
                for line in report.issues.iter().chain(report.missing.iter()) {
                    println!("    {line}");
                }
            }
            Err(err) => {
                failed += 1;
                warn!(model = %entry.name, error = %format!("{err:#}"), "model failed to open");
                println!("  {}: {err:#}", entry.name);
            }
        }
    }

    if failed > 0 {
        bail!("{failed} model(s) in {} failed validation", path.display());
    }
    Ok(())
}

fn describe_options(options: &ModelOptions) -> String {
    format!(
        "scale {}, position ({}, {}), gaze speed {}, body speed {}",
        options.scale,
        options.position.x,
        options.position.y,
        options.gaze_speed,
        options.body_speed
    )
}

pub fn resolve_model_location(base: &Path, location: &ModelLocation<'_>) -> ModelLocator {
    match location {
        ModelLocation::Manifest(value) => ModelLocator::Manifest(anchor(base, value)),
        ModelLocation::Archive(value) => ModelLocator::Archive(anchor(base, value)),
    }
}

fn anchor(base: &Path, value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.contains("://") || trimmed.starts_with(BLOB_SCHEME) {
        return trimmed.to_string();
    }
    let path = PathBuf::from(trimmed);
    if path.is_absolute() {
        trimmed.to_string()
    } else {
        base.join(path).to_string_lossy().into_owned()
    }
}
