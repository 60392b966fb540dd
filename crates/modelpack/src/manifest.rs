//! Model manifest (`*.model3.json`) schema. The load pipeline reads every file
//! reference from here; nothing in the manifest is mutated after parsing.
//!
//! Types:
//!
//! - `ModelSettings` is the parsed manifest plus lookup helpers for the
//!   parameter groups, motions and hit areas the runtime wires up.
//! - `FileReferences` lists the binary model, textures, and optional physics,
//!   pose, user-data, expression and motion files.
//! - `MotionEntry` carries one motion file with its optional bundled sound and
//!   fade times.
//! - `HitAreaEntry` pairs a drawable id with the display name reported to
//!   callers.
//!
//! Functions:
//!
//! - `ModelSettings::from_slice` parses manifest bytes.
//! - `ModelSettings::validate` returns human-readable issues so inspection
//!   tooling can report problems without aborting.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::AssetError;

/// File name suffix identifying a model manifest.
pub const MANIFEST_SUFFIX: &str = ".model3.json";

const EYE_BLINK_GROUP: &str = "EyeBlink";
const LIP_SYNC_GROUP: &str = "LipSync";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModelSettings {
    #[serde(default)]
    pub version: u32,
    pub file_references: FileReferences,
    #[serde(default)]
    pub groups: Vec<ParameterGroup>,
    #[serde(default)]
    pub hit_areas: Vec<HitAreaEntry>,
    #[serde(default)]
    pub layout: BTreeMap<String, f32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileReferences {
    #[serde(default)]
    pub moc: String,
    #[serde(default)]
    pub textures: Vec<String>,
    #[serde(default)]
    pub physics: Option<String>,
    #[serde(default)]
    pub pose: Option<String>,
    #[serde(default)]
    pub user_data: Option<String>,
    #[serde(default)]
    pub display_info: Option<String>,
    #[serde(default)]
    pub expressions: Vec<ExpressionEntry>,
    #[serde(default)]
    pub motions: BTreeMap<String, Vec<MotionEntry>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExpressionEntry {
    pub name: String,
    pub file: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MotionEntry {
    pub file: String,
    #[serde(default)]
    pub sound: Option<String>,
    #[serde(default)]
    pub fade_in_time: Option<f32>,
    #[serde(default)]
    pub fade_out_time: Option<f32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParameterGroup {
    #[serde(default)]
    pub target: String,
    pub name: String,
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HitAreaEntry {
    pub id: String,
    pub name: String,
}

impl ModelSettings {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, AssetError> {
        serde_json::from_slice(bytes).map_err(AssetError::ManifestParse)
    }

    pub fn moc_file(&self) -> Option<&str> {
        let moc = self.file_references.moc.trim();
        (!moc.is_empty()).then_some(moc)
    }

    pub fn textures(&self) -> &[String] {
        &self.file_references.textures
    }

    pub fn expressions(&self) -> &[ExpressionEntry] {
        &self.file_references.expressions
    }

    pub fn motion_groups(&self) -> impl Iterator<Item = (&str, &[MotionEntry])> {
        self.file_references
            .motions
            .iter()
            .map(|(name, entries)| (name.as_str(), entries.as_slice()))
    }

    pub fn motion_count(&self, group: &str) -> usize {
        self.file_references
            .motions
            .get(group)
            .map_or(0, |entries| entries.len())
    }

    pub fn motion(&self, group: &str, index: usize) -> Option<&MotionEntry> {
        self.file_references.motions.get(group)?.get(index)
    }

    /// Bundled sound file of a motion, ignoring blank entries.
    pub fn motion_sound(&self, group: &str, index: usize) -> Option<&str> {
        self.motion(group, index)?
            .sound
            .as_deref()
            .map(str::trim)
            .filter(|sound| !sound.is_empty())
    }

    pub fn eye_blink_ids(&self) -> &[String] {
        self.group_ids(EYE_BLINK_GROUP)
    }

    pub fn lip_sync_ids(&self) -> &[String] {
        self.group_ids(LIP_SYNC_GROUP)
    }

    fn group_ids(&self, name: &str) -> &[String] {
        self.groups
            .iter()
            .find(|group| group.name == name)
            .map_or(&[], |group| group.ids.as_slice())
    }

    pub fn hit_areas(&self) -> &[HitAreaEntry] {
        &self.hit_areas
    }

    pub fn layout(&self) -> &BTreeMap<String, f32> {
        &self.layout
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if self.moc_file().is_none() {
            issues.push("manifest does not reference a model file (FileReferences.Moc)".into());
        }
        for (index, texture) in self.textures().iter().enumerate() {
            if texture.trim().is_empty() {
                issues.push(format!("texture slot {index} has an empty file name"));
            }
        }
        for expression in self.expressions() {
            if expression.file.trim().is_empty() {
                issues.push(format!("expression '{}' has no file", expression.name));
            }
        }
        for (group, entries) in self.motion_groups() {
            for (index, entry) in entries.iter().enumerate() {
                if entry.file.trim().is_empty() {
                    issues.push(format!("motion {group}#{index} has no file"));
                }
            }
        }
        let mut seen = std::collections::HashSet::new();
        for area in self.hit_areas() {
            if !seen.insert(area.id.as_str()) {
                issues.push(format!("hit area id '{}' declared more than once", area.id));
            }
        }
        issues
    }
}
