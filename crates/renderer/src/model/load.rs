//! Model load pipeline.
//!
//! Stages run strictly in order on a worker thread and any failure rejects
//! the whole load:
//!
//! ```text
//!   manifest ─▶ model ─▶ expressions ─▶ physics ─▶ pose ─▶ user data
//!       ─▶ eye blink ─▶ breath ─▶ lip sync ids ─▶ layout ─▶ motions
//!       ─▶ texture bytes           (worker thread, PreparedModel)
//!   PreparedModel::finish ─▶ texture upload ─▶ ModelRuntime   (frame thread)
//! ```
//!
//! Only `finish` touches the graphics device, so the GPU context never leaves
//! the frame thread.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver};
use lipsync::{AudioOutput, LipSync};
use modelpack::{
    load_settings, ArchiveSource, AssetError, ModelLocator, ModelSettings, ResourceFetcher,
    SharedSource, MANIFEST_SUFFIX,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::device::GraphicsDevice;
use crate::math::ModelMatrix;
use crate::orientation::Orientation;
use crate::puppet::{
    BreathChannel, EngineError, MotionQueue, MotionSpec, ParameterEffect, Puppet, PuppetEngine,
    SharedMotion,
};
use crate::texture::{TextureCache, TextureEntry, TextureError};

use super::{params, ModelOptions, ModelRuntime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Source,
    Manifest,
    Model,
    Expressions,
    Physics,
    Pose,
    UserData,
    Motions,
    Textures,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadStage::Source => "source",
            LoadStage::Manifest => "manifest",
            LoadStage::Model => "model",
            LoadStage::Expressions => "expressions",
            LoadStage::Physics => "physics",
            LoadStage::Pose => "pose",
            LoadStage::UserData => "user data",
            LoadStage::Motions => "motions",
            LoadStage::Textures => "textures",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("no model source given: provide a manifest url or an archive")]
    NoSource,

    #[error("{stage} stage failed: {source}")]
    Asset {
        stage: LoadStage,
        #[source]
        source: AssetError,
    },

    #[error("{stage} stage failed: {source}")]
    Engine {
        stage: LoadStage,
        #[source]
        source: EngineError,
    },

    #[error(transparent)]
    Texture(#[from] TextureError),

    #[error("manifest does not reference a model file")]
    MissingModelFile,

    #[error("failed to parse user data: {0}")]
    UserData(#[source] serde_json::Error),

    #[error("failed to start load worker: {0}")]
    Worker(#[source] std::io::Error),

    #[error("load worker exited without reporting a result")]
    WorkerDisconnected,
}

impl LoadError {
    fn asset(stage: LoadStage) -> impl FnOnce(AssetError) -> LoadError {
        move |source| LoadError::Asset { stage, source }
    }

    fn engine(stage: LoadStage) -> impl FnOnce(EngineError) -> LoadError {
        move |source| LoadError::Engine { stage, source }
    }
}

/// An archive given either by location (URL, path, blob URI) or by content.
#[derive(Debug, Clone)]
pub enum ArchiveInput {
    Location(String),
    Bytes(Vec<u8>),
}

/// What to load. When both are set the archive wins.
#[derive(Debug, Clone, Default)]
pub struct LoadRequest {
    pub manifest_url: Option<String>,
    pub archive: Option<ArchiveInput>,
}

static MEMORY_ARCHIVES: AtomicU64 = AtomicU64::new(0);

impl From<ModelLocator> for LoadRequest {
    fn from(locator: ModelLocator) -> Self {
        match locator {
            ModelLocator::Archive(location) => Self::archive_location(location),
            ModelLocator::Manifest(location) => Self::manifest(location),
        }
    }
}

impl LoadRequest {
    pub fn manifest(url: impl Into<String>) -> Self {
        Self {
            manifest_url: Some(url.into()),
            archive: None,
        }
    }

    pub fn archive_location(location: impl Into<String>) -> Self {
        Self {
            manifest_url: None,
            archive: Some(ArchiveInput::Location(location.into())),
        }
    }

    pub fn archive_bytes(bytes: Vec<u8>) -> Self {
        Self {
            manifest_url: None,
            archive: Some(ArchiveInput::Bytes(bytes)),
        }
    }

    /// Builds a request from free-form input, treating `.zip` as an archive.
    pub fn from_input(input: &str) -> Self {
        ModelLocator::from_input(input).into()
    }

    pub fn has_source(&self) -> bool {
        self.archive.is_some()
            || self
                .manifest_url
                .as_deref()
                .is_some_and(|url| !url.trim().is_empty())
    }

    /// Opens the asset source. Archive locations are fetched here.
    pub fn open(self, fetcher: &ResourceFetcher) -> Result<SharedSource, LoadError> {
        let stage = LoadStage::Source;
        match (self.archive, self.manifest_url) {
            (Some(ArchiveInput::Bytes(bytes)), _) => {
                let label = format!(
                    "memory-archive-{}",
                    MEMORY_ARCHIVES.fetch_add(1, Ordering::Relaxed)
                );
                let source = ArchiveSource::from_bytes(bytes, label, fetcher.blobs().clone())
                    .map_err(LoadError::asset(stage))?;
                Ok(Arc::new(source))
            }
            (Some(ArchiveInput::Location(location)), _) => {
                ModelLocator::Archive(location).open(fetcher).map_err(LoadError::asset(stage))
            }
            (None, Some(url)) if !url.trim().is_empty() => ModelLocator::Manifest(url)
                .open(fetcher)
                .map_err(LoadError::asset(stage)),
            _ => Err(LoadError::NoSource),
        }
    }
}

/// Free-form key/value pairs attached to drawables by the model author.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserData {
    #[serde(default, rename = "UserData")]
    pub entries: Vec<UserDataEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserDataEntry {
    #[serde(default)]
    pub target: String,
    pub id: String,
    #[serde(default)]
    pub value: String,
}

impl UserData {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Fixed breath profile: (parameter, offset, peak, cycle seconds, weight).
pub fn breath_profile() -> Vec<BreathChannel> {
    vec![
        BreathChannel::new(params::ANGLE_X, 0.0, 15.0, 6.5345, 0.5),
        BreathChannel::new(params::ANGLE_Y, 0.0, 8.0, 3.5345, 0.5),
        BreathChannel::new(params::ANGLE_Z, 0.0, 10.0, 5.5345, 0.5),
        BreathChannel::new(params::BODY_ANGLE_X, 0.0, 4.0, 15.5345, 0.5),
        BreathChannel::new(params::BREATH, 0.5, 0.5, 3.2345, 1.0),
    ]
}

/// Texture file bytes fetched on the worker, uploaded by `finish`.
pub struct TextureFile {
    pub path: String,
    pub cache_key: String,
    pub bytes: Vec<u8>,
}

/// Output of the worker half of the pipeline. Everything except textures.
pub struct PreparedModel {
    pub(crate) name: String,
    pub(crate) settings: ModelSettings,
    pub(crate) source: SharedSource,
    pub(crate) puppet: Box<dyn Puppet>,
    pub(crate) expressions: Vec<(String, SharedMotion)>,
    pub(crate) motions: HashMap<(String, usize), SharedMotion>,
    pub(crate) motion_groups: BTreeMap<String, usize>,
    pub(crate) motion_queue: Box<dyn MotionQueue>,
    pub(crate) expression_queue: Box<dyn MotionQueue>,
    pub(crate) eye_blink: Option<Box<dyn ParameterEffect>>,
    pub(crate) breath: Box<dyn ParameterEffect>,
    pub(crate) physics: Option<Box<dyn ParameterEffect>>,
    pub(crate) pose: Option<Box<dyn ParameterEffect>>,
    pub(crate) user_data: Option<UserData>,
    pub(crate) lip_sync_ids: Vec<String>,
    pub(crate) model_matrix: ModelMatrix,
    pub(crate) textures: Vec<Option<TextureFile>>,
}

impl PreparedModel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    pub fn motion_groups(&self) -> &BTreeMap<String, usize> {
        &self.motion_groups
    }

    pub fn expression_names(&self) -> impl Iterator<Item = &str> {
        self.expressions.iter().map(|(name, _)| name.as_str())
    }

    /// Final stage: uploads textures through the shared cache and assembles
    /// the runtime. Must run on the thread that owns `device`.
    pub fn finish(
        self,
        device: &mut dyn GraphicsDevice,
        cache: &mut TextureCache,
        audio: Box<dyn AudioOutput>,
        fetcher: ResourceFetcher,
        options: &ModelOptions,
    ) -> Result<ModelRuntime, LoadError> {
        let premultiply = options.premultiplied_alpha;
        let mut textures: Vec<Option<TextureEntry>> = Vec::with_capacity(self.textures.len());
        // Entries this load inserted; entries already cached belong to other
        // models and survive a rollback.
        let mut inserted: Vec<TextureEntry> = Vec::new();
        for file in self.textures {
            let Some(file) = file else {
                textures.push(None);
                continue;
            };
            let TextureFile {
                path,
                cache_key,
                bytes,
            } = file;
            let cached = cache.get(&cache_key, premultiply).is_some();
            match cache.load(device, &cache_key, premultiply, false, move || Ok(bytes)) {
                Ok(entry) => {
                    if !cached {
                        inserted.push(entry.clone());
                    }
                    textures.push(Some(entry));
                }
                Err(err) => {
                    debug!(
                        texture = %path,
                        rolled_back = inserted.len(),
                        "texture upload failed"
                    );
                    for entry in &inserted {
                        cache.unload(device, entry);
                    }
                    self.source.dispose();
                    return Err(LoadError::Texture(err));
                }
            }
        }

        let name = options.name.clone().unwrap_or(self.name);
        info!(
            model = %name,
            expressions = self.expressions.len(),
            motions = self.motions.len(),
            textures = textures.iter().flatten().count(),
            "model loaded"
        );

        let mut gaze = Orientation::default();
        gaze.set_target(Default::default(), options.gaze_speed);
        let mut body = Orientation::default();
        body.set_target(Default::default(), options.body_speed);

        Ok(ModelRuntime {
            name,
            settings: self.settings,
            source: self.source,
            fetcher,
            puppet: self.puppet,
            expressions: self.expressions,
            motions: self.motions,
            motion_groups: self.motion_groups,
            motion_queue: self.motion_queue,
            expression_queue: self.expression_queue,
            eye_blink: self.eye_blink,
            breath: self.breath,
            physics: self.physics,
            pose: self.pose,
            user_data: self.user_data,
            lip_sync_ids: self.lip_sync_ids,
            textures,
            premultiplied: premultiply,
            model_matrix: self.model_matrix,
            gaze,
            body,
            gaze_speed: options.gaze_speed,
            body_speed: options.body_speed,
            lip_sync: LipSync::new(audio),
            pending_sound: None,
            scale: options.scale,
            pan: options.position,
            show_hit_areas: false,
            snapshot: None,
            pending_events: Vec::new(),
            active_motion: None,
            disposed: false,
        })
    }
}

fn optional_file(path: Option<&str>) -> Option<&str> {
    path.map(str::trim).filter(|path| !path.is_empty())
}

/// Runs every worker-side stage against an opened source.
pub fn prepare_model(
    engine: &dyn PuppetEngine,
    source: SharedSource,
) -> Result<PreparedModel, LoadError> {
    let label = source.describe();
    let settings = load_settings(source.as_ref()).map_err(LoadError::asset(LoadStage::Manifest))?;

    let moc = settings.moc_file().ok_or(LoadError::MissingModelFile)?;
    let bytes = source
        .fetch_bytes(moc)
        .map_err(LoadError::asset(LoadStage::Model))?;
    let mut puppet = engine
        .load_model(&bytes)
        .map_err(LoadError::engine(LoadStage::Model))?;
    debug!(model = %label, file = moc, "model binary loaded");

    let mut expressions: Vec<(String, SharedMotion)> = Vec::new();
    for entry in settings.expressions() {
        let bytes = source
            .fetch_bytes(&entry.file)
            .map_err(LoadError::asset(LoadStage::Expressions))?;
        let expression = engine
            .load_expression(&bytes, &entry.name)
            .map_err(LoadError::engine(LoadStage::Expressions))?;
        match expressions.iter_mut().find(|(name, _)| *name == entry.name) {
            Some(existing) => existing.1 = expression,
            None => expressions.push((entry.name.clone(), expression)),
        }
    }
    debug!(model = %label, count = expressions.len(), "expressions loaded");

    let physics = match optional_file(settings.file_references.physics.as_deref()) {
        Some(path) => {
            let bytes = source
                .fetch_bytes(path)
                .map_err(LoadError::asset(LoadStage::Physics))?;
            Some(
                engine
                    .load_physics(&bytes)
                    .map_err(LoadError::engine(LoadStage::Physics))?,
            )
        }
        None => {
            debug!(model = %label, "no physics file");
            None
        }
    };

    let pose = match optional_file(settings.file_references.pose.as_deref()) {
        Some(path) => {
            let bytes = source
                .fetch_bytes(path)
                .map_err(LoadError::asset(LoadStage::Pose))?;
            Some(
                engine
                    .load_pose(&bytes)
                    .map_err(LoadError::engine(LoadStage::Pose))?,
            )
        }
        None => {
            debug!(model = %label, "no pose file");
            None
        }
    };

    let user_data = match optional_file(settings.file_references.user_data.as_deref()) {
        Some(path) => {
            let bytes = source
                .fetch_bytes(path)
                .map_err(LoadError::asset(LoadStage::UserData))?;
            Some(UserData::from_slice(&bytes).map_err(LoadError::UserData)?)
        }
        None => None,
    };

    let eye_blink_ids = settings.eye_blink_ids().to_vec();
    let eye_blink = if eye_blink_ids.is_empty() {
        None
    } else {
        Some(engine.create_eye_blink(&eye_blink_ids))
    };

    let breath = engine.create_breath(&breath_profile());

    let lip_sync_ids = settings.lip_sync_ids().to_vec();

    let (canvas_width, canvas_height) = puppet.canvas_size();
    let mut model_matrix = ModelMatrix::new(canvas_width, canvas_height);
    model_matrix.setup_from_layout(
        settings
            .layout()
            .iter()
            .map(|(key, value)| (key.as_str(), *value)),
    );

    let mut motion_queue = engine.create_motion_queue();
    let expression_queue = engine.create_motion_queue();
    puppet.save_parameters();
    let mut motions = HashMap::new();
    let mut motion_groups = BTreeMap::new();
    for (group, entries) in settings.motion_groups() {
        for (index, entry) in entries.iter().enumerate() {
            let bytes = source
                .fetch_bytes(&entry.file)
                .map_err(LoadError::asset(LoadStage::Motions))?;
            let spec = MotionSpec {
                name: format!("{group}_{index}"),
                group: group.to_string(),
                index,
                fade_in: entry.fade_in_time,
                fade_out: entry.fade_out_time,
                eye_blink_ids: eye_blink_ids.clone(),
                lip_sync_ids: lip_sync_ids.clone(),
            };
            let motion = engine
                .load_motion(&bytes, &spec)
                .map_err(LoadError::engine(LoadStage::Motions))?;
            motions.insert((group.to_string(), index), motion);
        }
        motion_groups.insert(group.to_string(), settings.motion_count(group));
    }
    motion_queue.stop_all();
    debug!(model = %label, groups = motion_groups.len(), motions = motions.len(), "motions loaded");

    let mut textures = Vec::with_capacity(settings.textures().len());
    for (index, path) in settings.textures().iter().enumerate() {
        let path = path.trim();
        if path.is_empty() {
            warn!(model = %label, index, "texture entry has an empty file name; skipping");
            textures.push(None);
            continue;
        }
        let bytes = source
            .fetch_bytes(path)
            .map_err(LoadError::asset(LoadStage::Textures))?;
        textures.push(Some(TextureFile {
            path: path.to_string(),
            cache_key: source.cache_key(path),
            bytes,
        }));
    }

    let name = source
        .manifest_path()
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .trim_end_matches(MANIFEST_SUFFIX)
        .to_string();

    Ok(PreparedModel {
        name,
        settings,
        source,
        puppet,
        expressions,
        motions,
        motion_groups,
        motion_queue,
        expression_queue,
        eye_blink,
        breath,
        physics,
        pose,
        user_data,
        lip_sync_ids,
        model_matrix,
        textures,
    })
}

/// Opens the request's source and runs the worker stages on this thread.
/// The source is released again if a later stage fails.
pub fn load_blocking(
    engine: &dyn PuppetEngine,
    request: LoadRequest,
    fetcher: &ResourceFetcher,
) -> Result<PreparedModel, LoadError> {
    let source = request.open(fetcher)?;
    prepare_model(engine, source.clone()).inspect_err(|_| source.dispose())
}

pub type LoadOutcome = Result<PreparedModel, LoadError>;

/// Starts the worker half of the pipeline on its own thread.
///
/// A request without any source is rejected here, before a thread or any
/// network activity is started.
pub fn spawn_load(
    engine: Arc<dyn PuppetEngine>,
    request: LoadRequest,
    fetcher: ResourceFetcher,
) -> Result<Receiver<LoadOutcome>, LoadError> {
    if !request.has_source() {
        return Err(LoadError::NoSource);
    }
    let (tx, rx) = bounded(1);
    thread::Builder::new()
        .name("model-load".into())
        .spawn(move || {
            let outcome = load_blocking(engine.as_ref(), request, &fetcher);
            // The receiver is gone when the load was cancelled.
            let _ = tx.send(outcome);
        })
        .map_err(LoadError::Worker)?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_without_source_is_rejected_immediately() {
        let fetcher = ResourceFetcher::new().unwrap();
        assert!(!LoadRequest::default().has_source());
        assert!(!LoadRequest::manifest("  ").has_source());
        let engine: Arc<dyn PuppetEngine> = Arc::new(NoEngine);
        let err = spawn_load(engine, LoadRequest::default(), fetcher).unwrap_err();
        assert!(matches!(err, LoadError::NoSource));
        assert!(err.to_string().contains("manifest url or an archive"));
    }

    #[test]
    fn from_input_routes_archives() {
        assert!(matches!(
            LoadRequest::from_input("models/haru.zip").archive,
            Some(ArchiveInput::Location(_))
        ));
        assert_eq!(
            LoadRequest::from_input("Haru/Haru.model3.json").manifest_url.as_deref(),
            Some("Haru/Haru.model3.json")
        );
    }

    #[test]
    fn breath_profile_matches_channel_set() {
        let profile = breath_profile();
        let ids: Vec<&str> = profile.iter().map(|c| c.parameter.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "ParamAngleX",
                "ParamAngleY",
                "ParamAngleZ",
                "ParamBodyAngleX",
                "ParamBreath"
            ]
        );
        assert_eq!(profile[4].offset, 0.5);
        assert_eq!(profile[4].weight, 1.0);
    }

    #[test]
    fn parses_user_data() {
        let data = UserData::from_slice(
            br#"{"Version":3,"Meta":{"UserDataCount":1},"UserData":[{"Target":"ArtMesh","Id":"ArtMesh7","Value":"hat"}]}"#,
        )
        .unwrap();
        assert_eq!(data.entries.len(), 1);
        assert_eq!(data.entries[0].id, "ArtMesh7");
        assert_eq!(data.entries[0].value, "hat");
    }

    struct NoEngine;

    impl PuppetEngine for NoEngine {
        fn load_model(&self, _bytes: &[u8]) -> crate::puppet::EngineResult<Box<dyn Puppet>> {
            Err(EngineError::new("unused"))
        }

        fn load_expression(
            &self,
            _bytes: &[u8],
            _name: &str,
        ) -> crate::puppet::EngineResult<SharedMotion> {
            Err(EngineError::new("unused"))
        }

        fn load_motion(
            &self,
            _bytes: &[u8],
            _spec: &MotionSpec,
        ) -> crate::puppet::EngineResult<SharedMotion> {
            Err(EngineError::new("unused"))
        }

        fn load_physics(
            &self,
            _bytes: &[u8],
        ) -> crate::puppet::EngineResult<Box<dyn ParameterEffect>> {
            Err(EngineError::new("unused"))
        }

        fn load_pose(
            &self,
            _bytes: &[u8],
        ) -> crate::puppet::EngineResult<Box<dyn ParameterEffect>> {
            Err(EngineError::new("unused"))
        }

        fn create_eye_blink(&self, _parameter_ids: &[String]) -> Box<dyn ParameterEffect> {
            unreachable!()
        }

        fn create_breath(&self, _channels: &[BreathChannel]) -> Box<dyn ParameterEffect> {
            unreachable!()
        }

        fn create_motion_queue(&self) -> Box<dyn MotionQueue> {
            unreachable!()
        }
    }
}
