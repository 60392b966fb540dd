//! `puppetctl inspect`: opens a model through the same asset sources the runtime uses and
//! reports what its manifest declares, plus any file that fails to resolve.
//!
//! Types:
//!
//! - `ModelReport` is the serialisable summary printed as text or JSON.
//!
//! Functions:
//!
//! - `run` backs the subcommand.
//! - `inspect_locator` builds a report for any model locator; `check` reuses it.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Context, Result};
use modelpack::{load_settings, AssetSource, ModelLocator, ModelSettings, ResourceFetcher};
use serde::Serialize;
use tracing::debug;

use crate::cli::InspectArgs;
use crate::run::open_fetcher;

#[derive(Debug, Clone, Serialize)]
pub struct ModelReport {
    pub source: String,
    pub manifest: String,
    pub moc: Option<String>,
    pub textures: Vec<String>,
    pub physics: Option<String>,
    pub pose: Option<String>,
    pub user_data: Option<String>,
    pub expressions: Vec<String>,
    pub motion_groups: BTreeMap<String, usize>,
    pub sounds: Vec<String>,
    pub hit_areas: Vec<String>,
    pub eye_blink_ids: Vec<String>,
    pub lip_sync_ids: Vec<String>,
    /// Problems found in the manifest itself.
    pub issues: Vec<String>,
    /// Referenced files that could not be read, with the reason.
    pub missing: Vec<String>,
}

impl ModelReport {
    pub fn problem_count(&self) -> usize {
        self.issues.len() + self.missing.len()
    }
}

pub fn run(args: InspectArgs) -> Result<()> {
    let fetcher = open_fetcher()?;
    let report = inspect_locator(&ModelLocator::from_input(&args.model), &fetcher)?;

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("failed to encode report")?;
        println!("{json}");
    } else {
        print_report(&report);
    }

    let problems = report.problem_count();
    if problems > 0 {
        bail!("model '{}' has {problems} problem(s)", args.model);
    }
    Ok(())
}

pub fn inspect_locator(locator: &ModelLocator, fetcher: &ResourceFetcher) -> Result<ModelReport> {
    let source = locator
        .open(fetcher)
        .with_context(|| format!("failed to open model {locator:?}"))?;
    let result = inspect_source(source.as_ref());
    source.dispose();
    result
}

fn inspect_source(source: &dyn AssetSource) -> Result<ModelReport> {
    let settings = load_settings(source)
        .with_context(|| format!("failed to read manifest from {}", source.describe()))?;

    let mut missing = Vec::new();
    for file in referenced_files(&settings) {
        match source.fetch_bytes(&file) {
            Ok(bytes) => debug!(file = %file, bytes = bytes.len(), "resolved"),
            Err(err) => missing.push(format!("{file}: {err}")),
        }
    }

    let files = &settings.file_references;
    Ok(ModelReport {
        source: source.describe(),
        manifest: source.manifest_path().to_string(),
        moc: settings.moc_file().map(str::to_string),
        textures: settings.textures().to_vec(),
        physics: non_empty(files.physics.as_deref()),
        pose: non_empty(files.pose.as_deref()),
        user_data: non_empty(files.user_data.as_deref()),
        expressions: settings
            .expressions()
            .iter()
            .map(|entry| entry.name.clone())
            .collect(),
        motion_groups: settings
            .motion_groups()
            .map(|(group, entries)| (group.to_string(), entries.len()))
            .collect(),
        sounds: motion_sounds(&settings).into_iter().collect(),
        hit_areas: settings
            .hit_areas()
            .iter()
            .map(|area| area.name.clone())
            .collect(),
        eye_blink_ids: settings.eye_blink_ids().to_vec(),
        lip_sync_ids: settings.lip_sync_ids().to_vec(),
        issues: settings.validate(),
        missing,
    })
}

/// Every file the runtime would read while loading, deduplicated, in load order.
fn referenced_files(settings: &ModelSettings) -> Vec<String> {
    let files = &settings.file_references;
    let mut seen = BTreeSet::new();
    let mut ordered = Vec::new();
    let mut push = |name: Option<&str>| {
        if let Some(name) = name.map(str::trim).filter(|name| !name.is_empty()) {
            if seen.insert(name.to_string()) {
                ordered.push(name.to_string());
            }
        }
    };

    push(settings.moc_file());
    for entry in settings.expressions() {
        push(Some(&entry.file));
    }
    push(files.physics.as_deref());
    push(files.pose.as_deref());
    push(files.user_data.as_deref());
    for (_, entries) in settings.motion_groups() {
        for entry in entries {
            push(Some(&entry.file));
            push(entry.sound.as_deref());
        }
    }
    for texture in settings.textures() {
        push(Some(texture));
    }
    ordered
}

fn motion_sounds(settings: &ModelSettings) -> BTreeSet<String> {
    settings
        .motion_groups()
        .flat_map(|(_, entries)| entries.iter())
        .filter_map(|entry| non_empty(entry.sound.as_deref()))
        .collect()
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub fn print_report(report: &ModelReport) {
    println!("Model {} ({})", report.manifest, report.source);
    println!("  moc:        {}", report.moc.as_deref().unwrap_or("<none>"));
    println!("  physics:    {}", report.physics.as_deref().unwrap_or("-"));
    println!("  pose:       {}", report.pose.as_deref().unwrap_or("-"));
    println!("  user data:  {}", report.user_data.as_deref().unwrap_or("-"));
    println!("Textures:");
    for (slot, texture) in report.textures.iter().enumerate() {
        println!("  [{slot}] {texture}");
    }
    println!("Motion groups:");
    for (group, count) in &report.motion_groups {
        println!("  {group}: {count}");
    }
    print_list("Expressions", &report.expressions);
    print_list("Sounds", &report.sounds);
    print_list("Hit areas", &report.hit_areas);
    print_list("Eye blink parameters", &report.eye_blink_ids);
    print_list("Lip sync parameters", &report.lip_sync_ids);

    if !report.issues.is_empty() {
        println!("Manifest issues:");
        for issue in &report.issues {
            println!("  {issue}");
        }
    }
    if !report.missing.is_empty() {
        println!("Unresolved files:");
        for missing in &report.missing {
            println!("  {missing}");
        }
    }
}

fn print_list(title: &str, items: &[String]) {
    if items.is_empty() {
        println!("{title}: none");
    } else {
        println!("{title}: {}", items.join(", "));
    }
}
