//! Applies a parsed [`StageConfig`](stageconfig::StageConfig) to the runtime:
//! the `[canvas]` table to a [`CanvasManager`], each `[[models]]` entry to the
//! [`ModelOptions`] and [`LoadRequest`] of its load.

use stageconfig::{CanvasSection, ModelEntry, ModelLocation, PointerSetting};
use tracing::debug;

use crate::canvas::{CanvasManager, PointerMode};
use crate::math::Vec2;
use crate::model::load::LoadRequest;
use crate::model::ModelOptions;

impl From<PointerSetting> for PointerMode {
    fn from(setting: PointerSetting) -> Self {
        match setting {
            PointerSetting::Off => PointerMode::Off,
            PointerSetting::Follow => PointerMode::Follow,
            PointerSetting::Click => PointerMode::Click,
        }
    }
}

impl From<&ModelEntry> for ModelOptions {
    fn from(entry: &ModelEntry) -> Self {
        Self {
            name: Some(entry.name.clone()),
            scale: entry.scale,
            position: Vec2::new(entry.position[0], entry.position[1]),
            gaze_speed: entry.gaze_speed,
            body_speed: entry.body_speed,
            ..ModelOptions::default()
        }
    }
}

impl From<ModelLocation<'_>> for LoadRequest {
    fn from(location: ModelLocation<'_>) -> Self {
        match location {
            ModelLocation::Manifest(url) => LoadRequest::manifest(url.trim()),
            ModelLocation::Archive(location) => LoadRequest::archive_location(location.trim()),
        }
    }
}

impl CanvasManager {
    /// Resizes the canvas to the configured size and applies its pointer
    /// mode, offset, clear colour and hit-area overlay. Models already on the
    /// canvas pick up the overlay setting too.
    pub fn apply_config(&mut self, section: &CanvasSection) {
        self.resize(section.width, section.height);
        self.set_pointer_mode(section.pointer.into());
        self.set_offset(section.offset[0], section.offset[1]);
        self.set_clear_color(section.clear_color);
        self.set_show_hit_areas(section.show_hit_areas);
        debug!(
            width = section.width,
            height = section.height,
            pointer = ?section.pointer,
            show_hit_areas = section.show_hit_areas,
            "canvas configured"
        );
    }
}

#[cfg(test)]
mod tests {
    use stageconfig::StageConfig;

    use super::*;
    use crate::model::load::ArchiveInput;

    #[test]
    fn model_entry_fills_options_and_keeps_premultiplied_default() {
        let config = StageConfig::from_toml_str(
            r#"
version = 1

[[models]]
name = "mark"
archive = " models/mark.zip "
scale = 0.75
position = [0.5, -0.25]
gaze_speed = 2.0
body_speed = 1.5
"#,
        )
        .unwrap();
        let entry = &config.models[0];

        let options = ModelOptions::from(entry);
        assert_eq!(options.name.as_deref(), Some("mark"));
        assert_eq!(options.scale, 0.75);
        assert_eq!(options.position, Vec2::new(0.5, -0.25));
        assert_eq!(options.gaze_speed, 2.0);
        assert_eq!(options.body_speed, 1.5);
        assert!(options.premultiplied_alpha);

        let request = LoadRequest::from(entry.location().unwrap());
        assert!(request.manifest_url.is_none());
        assert!(matches!(
            request.archive,
            Some(ArchiveInput::Location(ref location)) if location == "models/mark.zip"
        ));
    }

    #[test]
    fn pointer_settings_map_one_to_one() {
        assert_eq!(PointerMode::from(PointerSetting::Off), PointerMode::Off);
        assert_eq!(PointerMode::from(PointerSetting::Follow), PointerMode::Follow);
        assert_eq!(PointerMode::from(PointerSetting::Click), PointerMode::Click);
    }
}
