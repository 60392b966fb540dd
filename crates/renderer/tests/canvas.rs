mod support;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use renderer::math::{Rect, Vec2};
use renderer::{LoadRequest, ModelOptions, PointerMode};
use scheduler::{FixedTicker, Runner, TargetId};
use stageconfig::StageConfig;
use support::{haru_archive, ListenerLog, RecordingListener, Stage};

#[test]
fn follow_mode_retargets_on_every_move() {
    let mut stage = Stage::new();
    stage.load_haru();
    stage.canvas.set_pointer_mode(PointerMode::Follow);

    stage.canvas.pointer_moved(200.0, 100.0);
    stage.canvas.render(0.016);
    assert!((stage.engine.param("ParamEyeBallX") - 1.0).abs() < 1e-4);
    assert!((stage.engine.param("ParamAngleX") - 30.0).abs() < 1e-2);
}

#[test]
fn click_mode_ignores_moves_and_reports_hits() {
    let mut stage = Stage::new();
    let (_, _, log) = stage.load_haru();
    stage.canvas.set_pointer_mode(PointerMode::Click);
    stage.canvas.render(0.016);

    stage.canvas.pointer_moved(200.0, 100.0);
    stage.canvas.render(0.016);
    assert!(stage.engine.param("ParamEyeBallX").abs() < 1e-4);

    stage.canvas.pointer_down(150.0, 50.0);
    {
        let log = log.borrow();
        assert_eq!(log.hits.len(), 1);
        assert_eq!(log.hits[0].areas, vec!["Head".to_string()]);
    }
    stage.canvas.render(0.016);
    assert!((stage.engine.param("ParamEyeBallX") - 0.5).abs() < 1e-4);
    assert!((stage.engine.param("ParamEyeBallY") - 0.5).abs() < 1e-4);

    // Misses are not reported.
    stage.canvas.pointer_down(20.0, 20.0);
    assert_eq!(log.borrow().hits.len(), 1);
}

#[test]
fn absolute_targets_subtract_the_canvas_offset() {
    let mut stage = Stage::new();
    let (_, control, _) = stage.load_haru();
    stage.canvas.set_offset(40.0, 10.0);

    control.set_gaze_target(140.0, 110.0, 0.0);
    stage.canvas.render(0.016);
    assert!(stage.engine.param("ParamEyeBallX").abs() < 1e-4);
    assert!(stage.engine.param("ParamEyeBallY").abs() < 1e-4);
}

#[test]
fn hit_area_outlines_follow_the_toggle() {
    let mut stage = Stage::new();
    let (_, control, _) = stage.load_haru();

    stage.canvas.render(0.016);
    assert!(stage.device.borrow().outlines.is_empty());

    stage.canvas.set_show_hit_areas(true);
    stage.canvas.render(0.016);
    assert_eq!(
        stage.device.borrow().outlines,
        vec![
            Rect {
                x: 0.0,
                y: 0.0,
                width: 1.0,
                height: 1.0
            },
            Rect {
                x: -1.0,
                y: -1.0,
                width: 2.0,
                height: 1.0
            },
        ]
    );

    control.set_show_hit_areas(false);
    stage.canvas.render(0.016);
    assert!(stage.device.borrow().outlines.is_empty());
}

#[test]
fn resize_rebuilds_view_for_new_aspect_ratio() {
    let mut stage = Stage::new();
    assert_eq!(stage.canvas.view().screen_rect(), [-1.0, 1.0, -1.0, 1.0]);

    stage.canvas.resize(400, 200);
    assert_eq!(stage.canvas.size(), (400, 200));
    assert_eq!(stage.canvas.view().screen_rect(), [-2.0, 2.0, -1.0, 1.0]);

    let right_middle = stage
        .canvas
        .device_to_canvas()
        .transform(Vec2::new(400.0, 100.0));
    assert!((right_middle.x - 2.0).abs() < 1e-5);
    assert!(right_middle.y.abs() < 1e-5);

    // Zero sizes are ignored.
    stage.canvas.resize(0, 100);
    assert_eq!(stage.canvas.size(), (400, 200));
}

#[test]
fn cancelled_load_never_reaches_the_listener() {
    let mut stage = Stage::new();
    let log = Rc::new(RefCell::new(ListenerLog::default()));
    let id = stage
        .canvas
        .load_model(
            LoadRequest::archive_bytes(haru_archive()),
            ModelOptions::default(),
            Box::new(RecordingListener(log.clone())),
        )
        .unwrap();
    assert_eq!(stage.canvas.pending_loads(), 1);
    assert!(stage.canvas.cancel_load(id));
    assert!(!stage.canvas.cancel_load(id));

    assert_eq!(stage.canvas.wait_for_loads(Duration::from_secs(1)), 0);
    stage.canvas.render(0.016);
    assert!(log.borrow().control.is_none());
    assert!(log.borrow().errors.is_empty());
    assert!(stage.canvas.model_ids().is_empty());
}

#[test]
fn options_name_scale_and_position_apply_on_load() {
    let mut stage = Stage::new();
    let options = ModelOptions {
        name: Some("haru-left".to_string()),
        scale: 0.5,
        position: Vec2::new(0.25, 0.0),
        premultiplied_alpha: false,
        ..ModelOptions::default()
    };
    let (id, log) = stage.load(LoadRequest::archive_bytes(haru_archive()), options);
    let control = stage.canvas.model(id).expect("registered");
    assert_eq!(control.name().as_deref(), Some("haru-left"));
    assert!(log.borrow().control.is_some());

    stage.canvas.render(0.016);
    let device = stage.device.borrow();
    assert!(device.meshes.iter().all(|mesh| !mesh.premultiplied));
    // Scale 0.5 on the model, pan of 0.25 device units on x.
    let mvp = device.meshes[0].mvp;
    assert!((mvp[0] - 0.5).abs() < 1e-5);
    assert!((mvp[12] - 0.25).abs() < 1e-5);
}

#[test]
fn stage_config_sets_up_canvas_and_model_options() {
    let config = StageConfig::from_toml_str(
        r#"
version = 1

[canvas]
width = 200
height = 200
offset = [40.0, 10.0]
clear_color = [0.1, 0.2, 0.3, 1.0]
show_hit_areas = true
pointer = "follow"

[[models]]
name = "haru-left"
archive = "models/haru.zip"
scale = 0.5
position = [0.25, 0.0]
gaze_speed = 1.0
"#,
    )
    .unwrap();

    let mut stage = Stage::new();
    stage.canvas.resize(320, 240);
    stage.canvas.apply_config(&config.canvas);
    assert_eq!(stage.canvas.size(), (200, 200));
    assert_eq!(stage.canvas.pointer_mode(), PointerMode::Follow);
    assert_eq!(stage.canvas.offset(), Vec2::new(40.0, 10.0));
    assert_eq!(stage.canvas.clear_color(), [0.1, 0.2, 0.3, 1.0]);
    assert!(stage.canvas.show_hit_areas());

    let entry = config.model("haru-left").unwrap();
    let options = ModelOptions::from(entry);
    assert_eq!(options.gaze_speed, 1.0);
    assert_eq!(options.body_speed, 0.0);
    let (id, _) = stage.load(LoadRequest::archive_bytes(haru_archive()), options);
    let control = stage.canvas.model(id).expect("registered");
    assert_eq!(control.name().as_deref(), Some("haru-left"));

    // Canvas-local (175, 100) after the offset and a pan of a quarter canvas;
    // gaze covers half the way from the centre at speed 1 over 0.5 s.
    stage.canvas.pointer_moved(240.0, 110.0);
    stage.canvas.render(0.5);
    assert!((stage.engine.param("ParamEyeBallX") - 0.375).abs() < 1e-4);

    let device = stage.device.borrow();
    assert_eq!(device.clear, [0.1, 0.2, 0.3, 1.0]);
    assert_eq!(device.outlines.len(), 2);
    assert!(device.meshes.iter().all(|mesh| mesh.premultiplied));
    let mvp = device.meshes[0].mvp;
    assert!((mvp[0] - 0.5).abs() < 1e-5);
    assert!((mvp[12] - 0.25).abs() < 1e-5);
}

#[test]
fn dispose_releases_cached_textures_once() {
    let mut stage = Stage::new();
    let (_, control, _) = stage.load_haru();
    assert_eq!(stage.canvas.texture_cache().len(), 1);

    stage.canvas.dispose();
    stage.canvas.dispose();
    assert_eq!(stage.device.borrow().released.len(), 1);
    assert!(stage.canvas.texture_cache().is_empty());
    assert!(!control.is_attached());

    let frames = stage.device.borrow().frames;
    stage.canvas.render(0.016);
    assert_eq!(stage.device.borrow().frames, frames);
}

#[test]
fn runner_drives_registered_canvas() {
    let stage = Stage::new();
    let device = stage.device.clone();
    let canvas = Rc::new(RefCell::new(stage.canvas));

    let mut runner = Runner::new(Box::new(FixedTicker::new(0.016)), Duration::ZERO);
    let id = TargetId::new("main");
    runner.register(id.clone(), canvas.clone()).unwrap();
    runner.tick();
    runner.tick();
    assert_eq!(device.borrow().frames, 2);

    runner.unregister(&id).unwrap();
    runner.tick();
    assert_eq!(device.borrow().frames, 2);
}
