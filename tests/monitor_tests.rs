//! 推理调度 + 进度中继 + 展示层 端到端测试

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver};
use predict_monitor::predict::{ControlSet, ScriptOutcome, ScriptStep, ScriptedEngine};
use predict_monitor::{
    FailurePolicy, LiveSinks, MonitorConfig, MonitorError, Orchestrator, Presentation,
    ProgressEvent, ProgressKind, RelayConfig, RunFailure, RunRequest, RunResult, UiEvent,
};

/// 记录所有界面调用
struct Recorder {
    controls: HashMap<String, bool>,
    live: Vec<bool>,
    sinks: Option<(PathBuf, PathBuf)>,
    progress: Vec<ProgressEvent>,
    raw: Vec<String>,
    started: usize,
    completed: Option<RunResult>,
}

impl Recorder {
    fn new() -> Self {
        // 导入媒体后所有控件处于启用状态
        let controls = ControlSet::default()
            .all()
            .into_iter()
            .map(|name| (name, true))
            .collect();
        Self {
            controls,
            live: Vec::new(),
            sinks: None,
            progress: Vec::new(),
            raw: Vec::new(),
            started: 0,
            completed: None,
        }
    }

    fn enabled(&self, name: &str) -> bool {
        self.controls[name]
    }

    fn all_enabled(&self) -> bool {
        self.controls.values().all(|enabled| *enabled)
    }

    fn all_disabled(&self) -> bool {
        self.controls.values().all(|enabled| !*enabled)
    }
}

impl Presentation for Recorder {
    fn set_controls_enabled(&mut self, names: &[String], enabled: bool) {
        for name in names {
            self.controls.insert(name.clone(), enabled);
        }
    }

    fn show_live_preview(&mut self, enabled: bool) {
        self.live.push(enabled);
    }

    fn set_media_sinks(&mut self, input: &Path, output: &Path) {
        self.sinks = Some((input.to_path_buf(), output.to_path_buf()));
    }

    fn on_progress(&mut self, event: &ProgressEvent) {
        self.progress.push(event.clone());
    }

    fn on_run_started(&mut self, _request: &RunRequest) {
        self.started += 1;
    }

    fn on_raw_message(&mut self, message: &str) {
        self.raw.push(message.to_string());
    }

    fn on_run_complete(&mut self, result: &RunResult) {
        self.completed = Some(result.clone());
    }
}

fn fast_relay() -> RelayConfig {
    RelayConfig {
        tick: Duration::from_millis(2),
        idle_timeout: Duration::from_secs(30),
    }
}

fn msg(text: &str) -> ScriptStep {
    ScriptStep::Message(text.to_string())
}

fn pause(ms: u64) -> ScriptStep {
    ScriptStep::Pause(Duration::from_millis(ms))
}

/// 运行到结束, 返回 (记录, 结果, 全部事件)
fn run_to_end(
    orchestrator: &Orchestrator,
    rx: &Receiver<UiEvent>,
    request: RunRequest,
) -> (Recorder, RunResult, Vec<UiEvent>) {
    let handle = orchestrator.start(request).expect("start should succeed");
    let result = handle.join();
    let events: Vec<UiEvent> = rx.try_iter().collect();
    let mut recorder = Recorder::new();
    for event in &events {
        event.apply(&mut recorder);
    }
    (recorder, result, events)
}

fn assert_fps(event: &ProgressEvent, expected: f64) {
    let fps = event.fps.expect("fps should be present");
    assert!((fps - expected).abs() < 1e-6, "fps {} != {}", fps, expected);
}

#[test]
fn test_video_run_scenario() {
    let engine = ScriptedEngine::new(
        vec![
            pause(30),
            msg("video (10/50) done (0.04s)"),
            pause(60),
            msg("video (49/50) done (0.02s)"),
            pause(30),
        ],
        ScriptOutcome::Output(PathBuf::from("out.mp4")),
    );
    let (tx, rx) = unbounded();
    let orchestrator = Orchestrator::new(engine, tx).with_relay_config(fast_relay());

    let (recorder, result, _) = run_to_end(&orchestrator, &rx, RunRequest::new("clip.mp4", false));

    assert_eq!(recorder.progress.len(), 2);
    assert_eq!(recorder.progress[0].kind, ProgressKind::VideoFrame);
    assert_eq!(recorder.progress[0].percent, 20);
    assert_fps(&recorder.progress[0], 25.0);
    assert_eq!(recorder.progress[1].percent, 100);
    assert_fps(&recorder.progress[1], 50.0);

    assert!(result.succeeded());
    assert_eq!(result.output_path, Some(PathBuf::from("out.mp4")));
    assert_eq!(
        recorder.sinks,
        Some((PathBuf::from("clip.mp4"), PathBuf::from("out.mp4")))
    );
    assert!(recorder.all_enabled());
    assert!(recorder.enabled("play") && recorder.enabled("pause"));
    assert_eq!(recorder.completed, Some(result));
    assert_eq!(recorder.started, 1);
}

#[test]
fn test_event_order_around_run() {
    let engine = ScriptedEngine::new(
        vec![pause(20), msg("video 1/1 (5/10) a.mp4: Done. (0.030s)"), pause(20)],
        ScriptOutcome::Output(PathBuf::from("a_out.mp4")),
    );
    let (tx, rx) = unbounded();
    let orchestrator = Orchestrator::new(engine, tx).with_relay_config(fast_relay());
    let (_, _, events) = run_to_end(&orchestrator, &rx, RunRequest::new("a.mp4", false));

    assert!(matches!(events.first(), Some(UiEvent::RunStarted(_))));
    assert!(matches!(
        events.get(1),
        Some(UiEvent::ControlsEnabled { enabled: false, .. })
    ));
    assert!(matches!(events.last(), Some(UiEvent::RunComplete(_))));

    let position =
        |pred: &dyn Fn(&UiEvent) -> bool| events.iter().position(|e| pred(e)).unwrap();
    let progress = position(&|e: &UiEvent| matches!(e, UiEvent::Progress(_)));
    let sinks = position(&|e: &UiEvent| matches!(e, UiEvent::MediaSinks { .. }));
    let restore = position(&|e: &UiEvent| {
        matches!(e, UiEvent::ControlsEnabled { enabled: true, .. })
    });
    assert!(progress < sinks);
    assert!(sinks < restore);
}

#[test]
fn test_image_run_keeps_transport_disabled() {
    let engine = ScriptedEngine::new(
        vec![msg("image 1/1 /data/site.JPG: 384x640 2 persons, Done. (0.012s)"), pause(20)],
        ScriptOutcome::Output(PathBuf::from("inference/output/site.JPG")),
    );
    let (tx, rx) = unbounded();
    let orchestrator = Orchestrator::new(engine, tx).with_relay_config(fast_relay());
    let (recorder, result, _) =
        run_to_end(&orchestrator, &rx, RunRequest::new("/data/site.JPG", true));

    assert!(result.succeeded());
    assert_eq!(recorder.progress.len(), 1);
    assert_eq!(recorder.progress[0].kind, ProgressKind::ImageSingleShot);
    assert_eq!(recorder.progress[0].percent, 100);
    assert!(!recorder.enabled("play"));
    assert!(!recorder.enabled("pause"));
    assert!(recorder.enabled("import_media"));
    assert!(recorder.enabled("start_predict"));
    // 图片源不进入实时预览
    assert!(recorder.live.is_empty());
}

#[test]
fn test_empty_output_keep_disabled_policy() {
    let engine = ScriptedEngine::new(vec![pause(10)], ScriptOutcome::NoOutput);
    let (tx, rx) = unbounded();
    let orchestrator = Orchestrator::new(engine, tx)
        .with_relay_config(fast_relay())
        .with_failure_policy(FailurePolicy::KeepDisabled);
    let (recorder, result, _) = run_to_end(&orchestrator, &rx, RunRequest::new("clip.mp4", false));

    assert!(!result.succeeded());
    assert_eq!(result.failure, Some(RunFailure::NoOutput));
    assert_eq!(result.output_path, None);
    assert!(recorder.all_disabled());
    assert_eq!(recorder.sinks, None);
    assert_eq!(recorder.completed, Some(result));
}

#[test]
fn test_empty_output_restore_policy() {
    let engine = ScriptedEngine::new(vec![pause(10)], ScriptOutcome::NoOutput);
    let (tx, rx) = unbounded();
    let orchestrator = Orchestrator::new(engine, tx)
        .with_relay_config(fast_relay())
        .with_failure_policy(FailurePolicy::RestoreControls);
    let (recorder, result, _) = run_to_end(&orchestrator, &rx, RunRequest::new("clip.mp4", false));

    assert_eq!(result.failure, Some(RunFailure::NoOutput));
    assert!(recorder.all_enabled());
    assert_eq!(recorder.sinks, None);
}

#[test]
fn test_blank_output_path_is_no_output() {
    for policy in [FailurePolicy::RestoreControls, FailurePolicy::KeepDisabled] {
        let engine = ScriptedEngine::new(
            vec![msg("video 1/1 (4/10) a.mp4: Done. (0.020s)"), pause(10)],
            ScriptOutcome::Output(PathBuf::new()),
        );
        let (tx, rx) = unbounded();
        let orchestrator = Orchestrator::new(engine, tx)
            .with_relay_config(fast_relay())
            .with_failure_policy(policy);
        let (recorder, result, events) =
            run_to_end(&orchestrator, &rx, RunRequest::new("clip.mp4", false));

        assert_eq!(result.failure, Some(RunFailure::NoOutput));
        assert_eq!(result.output_path, None);
        assert!(!events
            .iter()
            .any(|e| matches!(e, UiEvent::MediaSinks { .. })));
        assert_eq!(recorder.sinks, None);
        match policy {
            FailurePolicy::RestoreControls => assert!(recorder.all_enabled()),
            FailurePolicy::KeepDisabled => assert!(recorder.all_disabled()),
        }
    }
}

#[test]
fn test_image_failure_restores_without_transport() {
    let engine = ScriptedEngine::new(vec![pause(10)], ScriptOutcome::NoOutput);
    let (tx, rx) = unbounded();
    let orchestrator = Orchestrator::new(engine, tx)
        .with_relay_config(fast_relay())
        .with_failure_policy(FailurePolicy::RestoreControls);
    let (recorder, result, _) =
        run_to_end(&orchestrator, &rx, RunRequest::new("/data/site.png", false));

    assert_eq!(result.failure, Some(RunFailure::NoOutput));
    assert_eq!(recorder.sinks, None);
    assert!(!recorder.enabled("play"));
    assert!(!recorder.enabled("pause"));
    assert!(recorder.enabled("import_media"));
    assert!(recorder.enabled("start_predict"));
    assert!(recorder.enabled("open_predict_file"));
    assert!(recorder.enabled("real_time"));
}

#[test]
fn test_engine_error_becomes_failed_result() {
    let engine = ScriptedEngine::new(
        vec![msg("video 1/1 (1/100) a.mp4: Done. (0.040s)"), pause(20)],
        ScriptOutcome::Fail("CUDA out of memory".to_string()),
    );
    let (tx, rx) = unbounded();
    let orchestrator = Orchestrator::new(engine, tx).with_relay_config(fast_relay());
    let (recorder, result, _) = run_to_end(&orchestrator, &rx, RunRequest::new("a.mp4", false));

    match &result.failure {
        Some(RunFailure::Engine(reason)) => assert!(reason.contains("CUDA out of memory")),
        other => panic!("unexpected failure: {:?}", other),
    }
    assert_eq!(recorder.progress.len(), 1);
    assert!(recorder.all_enabled());
    assert!(!orchestrator.is_running());
}

#[test]
fn test_engine_panic_is_contained() {
    let engine = ScriptedEngine::new(vec![pause(5)], ScriptOutcome::Panic("boom".to_string()));
    let (tx, rx) = unbounded();
    let orchestrator = Orchestrator::new(engine, tx).with_relay_config(fast_relay());

    let (recorder, result, _) = run_to_end(&orchestrator, &rx, RunRequest::new("a.mp4", false));
    assert_eq!(result.failure, Some(RunFailure::Panicked("boom".to_string())));
    assert!(recorder.all_enabled());
    assert!(!orchestrator.is_running());

    // 引擎锁中毒后仍可继续运行
    let (_, second, _) = run_to_end(&orchestrator, &rx, RunRequest::new("b.mp4", false));
    assert_eq!(second.failure, Some(RunFailure::Panicked("boom".to_string())));
}

#[test]
fn test_second_start_rejected_while_running() {
    let engine = ScriptedEngine::new(
        vec![pause(300)],
        ScriptOutcome::Output(PathBuf::from("out.mp4")),
    );
    let (tx, rx) = unbounded();
    let orchestrator = Orchestrator::new(engine, tx).with_relay_config(fast_relay());

    let handle = orchestrator.start(RunRequest::new("a.mp4", false)).unwrap();
    assert_eq!(handle.source_path(), Path::new("a.mp4"));
    assert!(orchestrator.is_running());
    assert!(matches!(
        orchestrator.start(RunRequest::new("b.mp4", false)),
        Err(MonitorError::RunInProgress)
    ));
    assert!(handle.join().succeeded());
    assert!(!orchestrator.is_running());

    let _ = rx.try_iter().count();
    let (_, again, _) = run_to_end(&orchestrator, &rx, RunRequest::new("c.mp4", false));
    assert!(again.succeeded());
}

#[test]
fn test_live_preview_for_video() {
    let engine = ScriptedEngine::new(
        vec![
            pause(10),
            msg("video 1/1 (1/3) a.mp4: Done. (0.010s)"),
            pause(10),
            msg("video 1/1 (3/3) a.mp4: Done. (0.010s)"),
            pause(10),
        ],
        ScriptOutcome::Output(PathBuf::from("out.mp4")),
    );
    let (tx, rx) = unbounded();
    let (tx_in, rx_in) = crossbeam_channel::bounded(8);
    let (tx_out, rx_out) = crossbeam_channel::bounded(8);
    let orchestrator = Orchestrator::new(engine, tx)
        .with_relay_config(fast_relay())
        .with_live_sinks(LiveSinks::new(tx_in, tx_out));

    let (recorder, result, events) =
        run_to_end(&orchestrator, &rx, RunRequest::new("a.mp4", true));
    assert!(result.succeeded());
    assert_eq!(recorder.live, vec![true, false]);
    assert_eq!(rx_in.try_iter().count(), 2);
    assert_eq!(rx_out.try_iter().count(), 2);

    let live_on = events
        .iter()
        .position(|e| *e == UiEvent::LivePreview(true))
        .unwrap();
    let first_progress = events
        .iter()
        .position(|e| matches!(e, UiEvent::Progress(_)))
        .unwrap();
    assert!(live_on < first_progress);
}

#[test]
fn test_live_requested_without_sinks() {
    let engine = ScriptedEngine::new(
        vec![pause(10)],
        ScriptOutcome::Output(PathBuf::from("o.mp4")),
    );
    let (tx, rx) = unbounded();
    let orchestrator = Orchestrator::new(engine, tx).with_relay_config(fast_relay());
    let (recorder, result, _) = run_to_end(&orchestrator, &rx, RunRequest::new("a.mp4", true));
    assert!(result.succeeded());
    assert!(recorder.live.is_empty());
}

#[test]
fn test_last_message_before_return_is_delivered() {
    // detect 写完最后一条立即返回
    let engine = ScriptedEngine::new(
        vec![msg("video 1/1 (120/120) a.mp4: Done. (0.025s)")],
        ScriptOutcome::Output(PathBuf::from("out.mp4")),
    );
    let (tx, rx) = unbounded();
    let orchestrator = Orchestrator::new(engine, tx).with_relay_config(RelayConfig {
        tick: Duration::from_millis(50),
        idle_timeout: Duration::from_secs(30),
    });
    let (recorder, _, _) = run_to_end(&orchestrator, &rx, RunRequest::new("a.mp4", false));
    assert_eq!(recorder.progress.len(), 1);
    assert_eq!(recorder.progress[0].percent, 100);
    assert_fps(&recorder.progress[0], 40.0);
}

#[test]
fn test_simulated_video_progress_monotonic() {
    let times = vec![Duration::from_millis(15); 12];
    let engine = ScriptedEngine::simulate_video(Path::new("clip.mp4"), Path::new("out"), &times);
    let (tx, rx) = unbounded();
    let orchestrator = Orchestrator::new(engine, tx).with_relay_config(fast_relay());
    let (recorder, result, _) = run_to_end(&orchestrator, &rx, RunRequest::new("clip.mp4", false));

    assert!(result.succeeded());
    assert!(!recorder.progress.is_empty());
    assert!(recorder
        .progress
        .windows(2)
        .all(|w| w[0].percent <= w[1].percent));
    assert_eq!(recorder.progress.last().map(|e| e.percent), Some(100));
    // "Results saved to" 只作为原始消息转发
    assert!(recorder.raw.iter().any(|m| m.starts_with("Results saved to")));
}

#[test]
fn test_orchestrator_from_config() {
    let mut config = MonitorConfig::default();
    config.image_extensions = vec!["heic".to_string()];
    config.controls = vec!["start".to_string(), "play".to_string()];
    config.transport_controls = vec!["play".to_string()];
    config.failure_policy = FailurePolicy::KeepDisabled;
    config.tick_ms = 2;

    let engine = ScriptedEngine::new(
        vec![msg("image 1/1 x.heic: Done. (0.010s)"), pause(10)],
        ScriptOutcome::Output(PathBuf::from("x_out.heic")),
    );
    let (tx, rx) = unbounded();
    let orchestrator = Orchestrator::from_config(engine, tx, &config);
    let handle = orchestrator.start(RunRequest::new("x.heic", false)).unwrap();
    assert!(handle.join().succeeded());

    let restored: Vec<Vec<String>> = rx
        .try_iter()
        .filter_map(|e| match e {
            UiEvent::ControlsEnabled { names, enabled: true } => Some(names),
            _ => None,
        })
        .collect();
    assert_eq!(restored, vec![vec!["start".to_string()]]);
}
