#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{ImageFormat, Rgba, RgbaImage};
use lipsync::{AudioOutput, ManualOutput};
use modelpack::ResourceFetcher;
use renderer::math::Rect;
use renderer::{
    BlendMode, BreathChannel, CanvasManager, DrawableView, EngineError, EngineResult, GpuError,
    GraphicsDevice, HitEvent, LoadError, LoadRequest, MeshDraw, ModelId, ModelListener,
    ModelOptions, Motion, MotionControl, MotionEvent, MotionPriority, MotionQueue, MotionSpec,
    ParameterEffect, Puppet, PuppetEngine, RuntimeContext, SharedMotion, TextureHandle,
    TextureUpload,
};
use serde::Deserialize;
use zip::write::FileOptions;
use zip::ZipWriter;

pub const CANVAS_SIZE: u32 = 200;
pub const MOTION_PARAM: &str = "ParamMotion";
pub const EYE_BLINK_PARAM: &str = "ParamEyeLOpen";
pub const MOUTH_PARAM: &str = "ParamMouthOpenY";

// ---------------------------------------------------------------------------
// Puppet engine

/// Parameter values and engine calls observed by the test.
#[derive(Debug, Default)]
pub struct EngineState {
    pub params: HashMap<String, f32>,
    pub motion_specs: Vec<MotionSpec>,
    pub expressions: Vec<String>,
    pub breath_channels: Vec<BreathChannel>,
    pub eye_blinks: u32,
}

#[derive(Clone, Default)]
pub struct FakeEngine {
    pub state: Arc<Mutex<EngineState>>,
}

impl FakeEngine {
    pub fn param(&self, id: &str) -> f32 {
        self.state
            .lock()
            .unwrap()
            .params
            .get(id)
            .copied()
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct PuppetFile {
    canvas: [f32; 2],
    drawables: Vec<DrawableFile>,
}

#[derive(Debug, Deserialize)]
struct DrawableFile {
    id: String,
    texture: usize,
    order: i32,
    /// x, y, width, height in model units.
    rect: [f32; 4],
    #[serde(default = "visible_default")]
    visible: bool,
}

fn visible_default() -> bool {
    true
}

struct FakeDrawable {
    id: String,
    texture_index: usize,
    render_order: i32,
    visible: bool,
    positions: Vec<[f32; 2]>,
    uvs: Vec<[f32; 2]>,
    indices: Vec<u16>,
}

impl FakeDrawable {
    fn from_file(file: DrawableFile) -> Self {
        let [x, y, w, h] = file.rect;
        Self {
            id: file.id,
            texture_index: file.texture,
            render_order: file.order,
            visible: file.visible,
            positions: vec![[x, y], [x + w, y], [x + w, y + h], [x, y + h]],
            uvs: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }
}

pub struct FakePuppet {
    state: Arc<Mutex<EngineState>>,
    saved: HashMap<String, f32>,
    canvas: (f32, f32),
    drawables: Vec<FakeDrawable>,
}

impl Puppet for FakePuppet {
    fn canvas_size(&self) -> (f32, f32) {
        self.canvas
    }

    fn parameter(&self, id: &str) -> Option<f32> {
        self.state.lock().unwrap().params.get(id).copied()
    }

    fn set_parameter(&mut self, id: &str, value: f32, weight: f32) {
        let mut state = self.state.lock().unwrap();
        let current = state.params.entry(id.to_string()).or_default();
        *current += (value - *current) * weight;
    }

    fn add_parameter(&mut self, id: &str, value: f32, weight: f32) {
        *self
            .state
            .lock()
            .unwrap()
            .params
            .entry(id.to_string())
            .or_default() += value * weight;
    }

    fn load_parameters(&mut self) {
        self.state.lock().unwrap().params = self.saved.clone();
    }

    fn save_parameters(&mut self) {
        self.saved = self.state.lock().unwrap().params.clone();
    }

    fn update(&mut self) {}

    fn drawables(&self) -> Vec<DrawableView<'_>> {
        self.drawables
            .iter()
            .map(|drawable| DrawableView {
                id: &drawable.id,
                texture_index: drawable.texture_index,
                render_order: drawable.render_order,
                opacity: 1.0,
                blend: BlendMode::Normal,
                visible: drawable.visible,
                positions: &drawable.positions,
                uvs: &drawable.uvs,
                indices: &drawable.indices,
            })
            .collect()
    }

    fn drawable_bounds(&self, id: &str) -> Option<Rect> {
        let drawable = self.drawables.iter().find(|d| d.id == id)?;
        Rect::from_points(&drawable.positions)
    }

    fn hit_drawable(&self, id: &str, x: f32, y: f32) -> bool {
        self.drawable_bounds(id)
            .is_some_and(|bounds| bounds.contains(x, y))
    }
}

pub struct FakeMotion {
    duration: Option<f32>,
}

impl Motion for FakeMotion {
    fn duration(&self) -> Option<f32> {
        self.duration
    }
}

/// Plays one motion at a time, writing `MOTION_PARAM` while active.
#[derive(Default)]
pub struct FakeQueue {
    active: Option<(Option<f32>, MotionPriority)>,
}

impl MotionQueue for FakeQueue {
    fn start(&mut self, motion: SharedMotion, priority: MotionPriority) -> bool {
        if let Some((_, current)) = self.active {
            if priority <= current && priority != MotionPriority::Force {
                return false;
            }
        }
        self.active = Some((motion.duration(), priority));
        true
    }

    fn update(&mut self, puppet: &mut dyn Puppet, dt: f32) -> bool {
        let Some((remaining, priority)) = self.active else {
            return false;
        };
        puppet.set_parameter(MOTION_PARAM, 1.0, 1.0);
        self.active = match remaining {
            Some(left) if left - dt <= 0.0 => None,
            Some(left) => Some((Some(left - dt), priority)),
            None => Some((None, priority)),
        };
        true
    }

    fn is_finished(&self) -> bool {
        self.active.is_none()
    }

    fn stop_all(&mut self) {
        self.active = None;
    }
}

struct EyeBlink {
    state: Arc<Mutex<EngineState>>,
}

impl ParameterEffect for EyeBlink {
    fn apply(&mut self, puppet: &mut dyn Puppet, _dt: f32) {
        self.state.lock().unwrap().eye_blinks += 1;
        puppet.set_parameter(EYE_BLINK_PARAM, 0.5, 1.0);
    }
}

struct AddEffect(&'static str);

impl ParameterEffect for AddEffect {
    fn apply(&mut self, puppet: &mut dyn Puppet, _dt: f32) {
        puppet.add_parameter(self.0, 1.0, 1.0);
    }
}

fn motion_duration(bytes: &[u8]) -> EngineResult<Option<f32>> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|err| EngineError::new(err.to_string()))?;
    Ok(value
        .get("Duration")
        .and_then(serde_json::Value::as_f64)
        .map(|d| d as f32))
}

impl PuppetEngine for FakeEngine {
    fn load_model(&self, bytes: &[u8]) -> EngineResult<Box<dyn Puppet>> {
        let file: PuppetFile =
            serde_json::from_slice(bytes).map_err(|err| EngineError::new(err.to_string()))?;
        Ok(Box::new(FakePuppet {
            state: self.state.clone(),
            saved: HashMap::new(),
            canvas: (file.canvas[0], file.canvas[1]),
            drawables: file.drawables.into_iter().map(FakeDrawable::from_file).collect(),
        }))
    }

    fn load_expression(&self, bytes: &[u8], name: &str) -> EngineResult<SharedMotion> {
        self.state.lock().unwrap().expressions.push(name.to_string());
        Ok(Arc::new(FakeMotion {
            duration: motion_duration(bytes)?,
        }))
    }

    fn load_motion(&self, bytes: &[u8], spec: &MotionSpec) -> EngineResult<SharedMotion> {
        let duration = motion_duration(bytes)?;
        self.state.lock().unwrap().motion_specs.push(spec.clone());
        Ok(Arc::new(FakeMotion { duration }))
    }

    fn load_physics(&self, _bytes: &[u8]) -> EngineResult<Box<dyn ParameterEffect>> {
        Ok(Box::new(AddEffect("ParamPhysics")))
    }

    fn load_pose(&self, _bytes: &[u8]) -> EngineResult<Box<dyn ParameterEffect>> {
        Ok(Box::new(AddEffect("ParamPose")))
    }

    fn create_eye_blink(&self, _parameter_ids: &[String]) -> Box<dyn ParameterEffect> {
        Box::new(EyeBlink {
            state: self.state.clone(),
        })
    }

    fn create_breath(&self, channels: &[BreathChannel]) -> Box<dyn ParameterEffect> {
        self.state.lock().unwrap().breath_channels = channels.to_vec();
        Box::new(AddEffect("ParamBreath"))
    }

    fn create_motion_queue(&self) -> Box<dyn MotionQueue> {
        Box::new(FakeQueue::default())
    }
}

// ---------------------------------------------------------------------------
// Graphics device

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMesh {
    pub texture: Option<TextureHandle>,
    pub vertices: usize,
    pub premultiplied: bool,
    pub mvp: [f32; 16],
}

/// Draws of the most recent frame plus lifetime texture traffic.
#[derive(Debug, Default)]
pub struct DeviceLog {
    pub uploads: Vec<String>,
    pub released: Vec<TextureHandle>,
    pub frames: u32,
    pub clear: [f32; 4],
    pub meshes: Vec<RecordedMesh>,
    pub outlines: Vec<Rect>,
}

pub struct RecordingDevice {
    log: Rc<RefCell<DeviceLog>>,
    size: (u32, u32),
    next: u64,
}

impl RecordingDevice {
    pub fn new(width: u32, height: u32) -> (Self, Rc<RefCell<DeviceLog>>) {
        let log = Rc::new(RefCell::new(DeviceLog::default()));
        let device = Self {
            log: log.clone(),
            size: (width, height),
            next: 0,
        };
        (device, log)
    }
}

impl GraphicsDevice for RecordingDevice {
    fn upload_texture(&mut self, upload: &TextureUpload) -> Result<TextureHandle, GpuError> {
        self.next += 1;
        self.log.borrow_mut().uploads.push(upload.label.clone());
        Ok(TextureHandle(self.next))
    }

    fn release_texture(&mut self, handle: TextureHandle) {
        self.log.borrow_mut().released.push(handle);
    }

    fn begin_frame(&mut self, clear: [f32; 4]) -> Result<(), GpuError> {
        let mut log = self.log.borrow_mut();
        log.frames += 1;
        log.clear = clear;
        log.meshes.clear();
        log.outlines.clear();
        Ok(())
    }

    fn draw_mesh(&mut self, draw: &MeshDraw<'_>) {
        self.log.borrow_mut().meshes.push(RecordedMesh {
            texture: draw.texture,
            vertices: draw.positions.len(),
            premultiplied: draw.premultiplied,
            mvp: draw.mvp,
        });
    }

    fn draw_outline(&mut self, _mvp: &[f32; 16], rect: Rect, _color: [f32; 4]) {
        self.log.borrow_mut().outlines.push(rect);
    }

    fn end_frame(&mut self) -> Result<(), GpuError> {
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }
}

// ---------------------------------------------------------------------------
// Listener

#[derive(Debug, Default)]
pub struct ListenerLog {
    pub control: Option<MotionControl>,
    pub errors: Vec<String>,
    pub stages: Vec<String>,
    pub motions: Vec<MotionEvent>,
    pub hits: Vec<HitEvent>,
}

pub struct RecordingListener(pub Rc<RefCell<ListenerLog>>);

impl ModelListener for RecordingListener {
    fn on_load(&mut self, control: MotionControl) {
        self.0.borrow_mut().control = Some(control);
    }

    fn on_error(&mut self, error: &LoadError) {
        let stage = match error {
            LoadError::Asset { stage, .. } | LoadError::Engine { stage, .. } => stage.to_string(),
            _ => String::new(),
        };
        let mut log = self.0.borrow_mut();
        log.errors.push(error.to_string());
        log.stages.push(stage);
    }

    fn on_motion(&mut self, event: &MotionEvent) {
        self.0.borrow_mut().motions.push(event.clone());
    }

    fn on_hit(&mut self, event: &HitEvent) {
        self.0.borrow_mut().hits.push(event.clone());
    }
}

// ---------------------------------------------------------------------------
// Fixtures

pub fn png(width: u32, height: u32, pixel: [u8; 4]) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba(pixel));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

pub fn wav_bytes(sample_rate: u32, samples: &[i16]) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// Half a second of a loud square wave.
pub fn loud_wav() -> Vec<u8> {
    let samples: Vec<i16> = (0..4000)
        .map(|i| if i % 2 == 0 { i16::MAX / 2 } else { -(i16::MAX / 2) })
        .collect();
    wav_bytes(8000, &samples)
}

const MANIFEST: &str = r#"{
    "Version": 3,
    "FileReferences": {
        "Moc": "Haru.moc3",
        "Textures": ["textures/body.png", "", "textures/body.png"],
        "Physics": "Haru.physics3.json",
        "UserData": "Haru.userdata3.json",
        "Expressions": [{"Name": "F01", "File": "expressions/F01.exp3.json"}],
        "Motions": {
            "Idle": [
                {"File": "motions/idle_0.motion3.json", "FadeInTime": 0.5},
                {"File": "motions/idle_1.motion3.json", "Sound": "sounds/idle.wav"}
            ]
        }
    },
    "Groups": [
        {"Target": "Parameter", "Name": "EyeBlink", "Ids": ["ParamEyeLOpen"]},
        {"Target": "Parameter", "Name": "LipSync", "Ids": ["ParamMouthOpenY"]}
    ],
    "HitAreas": [
        {"Id": "HitAreaHead", "Name": "Head"},
        {"Id": "HitAreaBody", "Name": "Body"}
    ]
}"#;

/// Canvas 2x2 model units: with no layout hints the model spans the logical
/// square [-1, 1] on a square canvas.
const PUPPET: &str = r#"{
    "canvas": [2.0, 2.0],
    "drawables": [
        {"id": "HitAreaBody", "texture": 0, "order": 1, "rect": [-1.0, -1.0, 2.0, 1.0]},
        {"id": "HitAreaHead", "texture": 2, "order": 0, "rect": [0.0, 0.0, 1.0, 1.0]},
        {"id": "Hidden", "texture": 0, "order": 5, "rect": [0.0, 0.0, 0.1, 0.1], "visible": false}
    ]
}"#;

/// Every file of the test model, keyed by archive path.
pub fn haru_files() -> Vec<(String, Vec<u8>)> {
    let files: Vec<(&str, Vec<u8>)> = vec![
        ("Haru/Haru.model3.json", MANIFEST.as_bytes().to_vec()),
        ("Haru/Haru.moc3", PUPPET.as_bytes().to_vec()),
        ("Haru/Haru.physics3.json", b"{}".to_vec()),
        (
            "Haru/Haru.userdata3.json",
            br#"{"Version":3,"UserData":[{"Target":"ArtMesh","Id":"HitAreaHead","Value":"hat"}]}"#
                .to_vec(),
        ),
        ("Haru/expressions/F01.exp3.json", br#"{"Duration": 0.5}"#.to_vec()),
        ("Haru/motions/idle_0.motion3.json", br#"{"Duration": 0.05}"#.to_vec()),
        ("Haru/motions/idle_1.motion3.json", br#"{"Duration": 2.0}"#.to_vec()),
        ("Haru/sounds/idle.wav", loud_wav()),
        ("Haru/textures/body.png", png(4, 4, [200, 100, 50, 128])),
    ];
    files
        .into_iter()
        .map(|(name, bytes)| (name.to_string(), bytes))
        .collect()
}

pub fn build_archive(files: &[(String, Vec<u8>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in files {
        writer
            .start_file(name.as_str(), FileOptions::default())
            .expect("start entry");
        writer.write_all(contents).expect("write entry");
    }
    writer.finish().expect("finish archive").into_inner()
}

pub fn haru_archive() -> Vec<u8> {
    build_archive(&haru_files())
}

/// Writes the model's files under `root`, dropping the archive folder.
pub fn write_model_dir(root: &Path, files: &[(String, Vec<u8>)]) {
    for (name, contents) in files {
        let relative = name.strip_prefix("Haru/").unwrap_or(name);
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
}

/// Rewrites the manifest inside `files` with `edit`.
pub fn edit_manifest(files: &mut [(String, Vec<u8>)], edit: impl Fn(&str) -> String) {
    for (name, contents) in files.iter_mut() {
        if name.ends_with(".model3.json") {
            let manifest = String::from_utf8(contents.clone()).unwrap();
            *contents = edit(&manifest).into_bytes();
        }
    }
}

// ---------------------------------------------------------------------------
// Canvas

pub struct Stage {
    pub canvas: CanvasManager,
    pub engine: FakeEngine,
    pub device: Rc<RefCell<DeviceLog>>,
    pub audio: ManualOutput,
}

impl Stage {
    pub fn new() -> Self {
        let engine = FakeEngine::default();
        let (device, log) = RecordingDevice::new(CANVAS_SIZE, CANVAS_SIZE);
        let audio = ManualOutput::new();
        let factory_audio = audio.clone();
        let context = RuntimeContext::new(
            Arc::new(engine.clone()),
            ResourceFetcher::new().expect("fetcher"),
        )
        .with_audio(Rc::new(move || {
            Box::new(factory_audio.clone()) as Box<dyn AudioOutput>
        }));
        Self {
            canvas: CanvasManager::new(context, Box::new(device)),
            engine,
            device: log,
            audio,
        }
    }

    /// Starts a load and blocks until its listener has been called.
    pub fn load(
        &mut self,
        request: LoadRequest,
        options: ModelOptions,
    ) -> (ModelId, Rc<RefCell<ListenerLog>>) {
        let log = Rc::new(RefCell::new(ListenerLog::default()));
        let id = self
            .canvas
            .load_model(request, options, Box::new(RecordingListener(log.clone())))
            .expect("load accepted");
        let remaining = self.canvas.wait_for_loads(Duration::from_secs(30));
        assert_eq!(remaining, 0, "load did not finish");
        (id, log)
    }

    /// Loads the test model and returns its control handle.
    pub fn load_haru(&mut self) -> (ModelId, MotionControl, Rc<RefCell<ListenerLog>>) {
        let (id, log) = self.load(
            LoadRequest::archive_bytes(haru_archive()),
            ModelOptions::default(),
        );
        let control = log
            .borrow()
            .control
            .clone()
            .unwrap_or_else(|| panic!("load failed: {:?}", log.borrow().errors));
        (id, control, log)
    }
}
