/// 推理监控 (Predict Monitor)
///
/// 控制台版前端: 模拟检测引擎 + 进度中继 + 推理调度
///
/// 线程架构:
/// 1. 推理线程: 模拟逐帧检测, 写入进度邮箱
/// 2. 进度线程: 每10ms读取邮箱 → 解析 → 发送进度事件
/// 3. 主线程:   定时 drain 事件并打印 (模拟界面刷新)
///
/// 运行: cargo run --bin predict-monitor -- --source clip.mp4 --frames 200
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, unbounded, Receiver};
use log::{debug, info, warn};
use rand::Rng;

use predict_monitor::predict::{PreviewFrame, ScriptOutcome, ScriptedEngine};
use predict_monitor::{
    drain_events, Args, LiveSinks, MediaKind, MonitorConfig, Orchestrator, Presentation,
    ProgressEvent, RunRequest, RunResult, SimulatedFailure,
};

const REFRESH_INTERVAL: Duration = Duration::from_millis(50); // 界面刷新间隔
const PROGRESS_BAR_WIDTH: usize = 30;

/// 控制台展示层
struct ConsolePresentation {
    controls: BTreeMap<String, bool>,
    live_preview: bool,
    last_percent: Option<u8>,
    preview_frames: usize,
    finished: Option<RunResult>,
}

impl ConsolePresentation {
    fn new(controls: &[String]) -> Self {
        Self {
            controls: controls.iter().map(|name| (name.clone(), true)).collect(),
            live_preview: false,
            last_percent: None,
            preview_frames: 0,
            finished: None,
        }
    }

    /// 实时预览帧只计数, 不渲染
    fn consume_previews(
        &mut self,
        rx_input: &Receiver<PreviewFrame>,
        rx_output: &Receiver<PreviewFrame>,
    ) {
        let input = rx_input.try_iter().count();
        let output = rx_output.try_iter().count();
        if self.live_preview {
            self.preview_frames += input.max(output);
        }
    }

    fn enabled_controls(&self) -> Vec<&str> {
        self.controls
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

impl Presentation for ConsolePresentation {
    fn set_controls_enabled(&mut self, names: &[String], enabled: bool) {
        for name in names {
            self.controls.insert(name.clone(), enabled);
        }
        debug!("🎛️  控件 {:?} → {}", names, if enabled { "启用" } else { "禁用" });
    }

    fn show_live_preview(&mut self, enabled: bool) {
        self.live_preview = enabled;
        info!("{}", if enabled { "📺 切换到实时预览" } else { "📺 退出实时预览" });
    }

    fn set_media_sinks(&mut self, input: &Path, output: &Path) {
        info!("🎬 输入: {} (暂停)", input.display());
        info!("🎬 输出: {} (暂停)", output.display());
    }

    fn on_progress(&mut self, event: &ProgressEvent) {
        // 相同进度不重复打印
        if self.last_percent == Some(event.percent) && event.percent < 100 {
            return;
        }
        self.last_percent = Some(event.percent);

        let filled = PROGRESS_BAR_WIDTH * event.percent as usize / 100;
        let bar = format!(
            "{}{}",
            "#".repeat(filled),
            ".".repeat(PROGRESS_BAR_WIDTH - filled)
        );
        match event.fps {
            Some(fps) => info!("[{}] {:>3}% --> {:.1} FPS", bar, event.percent, fps),
            None => info!("[{}] {:>3}%", bar, event.percent),
        }
    }

    fn on_run_started(&mut self, request: &RunRequest) {
        self.last_percent = None;
        info!("🔍 推理开始: {}", request.source_path.display());
    }

    fn on_raw_message(&mut self, message: &str) {
        debug!("📝 {}", message);
    }

    fn on_run_complete(&mut self, result: &RunResult) {
        self.finished = Some(result.clone());
    }
}

fn build_engine(args: &Args, kind: MediaKind, out_dir: &Path) -> ScriptedEngine {
    let mut rng = rand::thread_rng();
    // 单帧耗时 ±30% 抖动
    let mut jitter =
        |ms: u64| Duration::from_secs_f64(ms as f64 * rng.gen_range(0.7..1.3) / 1000.0);

    let engine = match kind {
        MediaKind::Image => {
            ScriptedEngine::simulate_image(&args.source, out_dir, jitter(args.frame_ms))
        }
        MediaKind::Video => {
            let frame_times: Vec<Duration> = (0..args.frames.max(1))
                .map(|_| jitter(args.frame_ms))
                .collect();
            ScriptedEngine::simulate_video(&args.source, out_dir, &frame_times)
        }
    };

    match args.fail {
        None => engine,
        Some(SimulatedFailure::NoOutput) => engine.with_outcome(ScriptOutcome::NoOutput),
        Some(SimulatedFailure::Error) => {
            engine.with_outcome(ScriptOutcome::Fail("模拟推理失败".to_string()))
        }
        Some(SimulatedFailure::Panic) => {
            engine.with_outcome(ScriptOutcome::Panic("模拟引擎崩溃".to_string()))
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = MonitorConfig::load(&args.config);
    if let Some(dir) = &args.out_dir {
        config.out_dir = dir.display().to_string();
    }
    if args.no_live {
        config.live_preview = false;
    }
    config.print_summary();

    let out_dir = Path::new(&config.out_dir);
    fs::create_dir_all(out_dir).with_context(|| format!("创建输出目录失败: {}", out_dir.display()))?;

    let kind = MediaKind::classify(&args.source, &config.image_extensions);
    info!("📦 输入源: {} ({:?})", args.source.display(), kind);
    let engine = build_engine(&args, kind, out_dir);

    // Channel 1: 推理/进度线程 → 主线程 (界面事件)
    let (tx_ui, rx_ui) = unbounded();
    // Channel 2/3: 推理线程 → 主线程 (实时预览帧, 满则丢帧)
    let (tx_input, rx_input) = bounded::<PreviewFrame>(2);
    let (tx_output, rx_output) = bounded::<PreviewFrame>(2);

    let orchestrator = Orchestrator::from_config(engine, tx_ui, &config)
        .with_live_sinks(LiveSinks::new(tx_input, tx_output));
    let mut console = ConsolePresentation::new(&config.controls);

    let handle = orchestrator.start(RunRequest::new(args.source.clone(), config.live_preview))?;
    debug!("🧵 推理线程已启动: {}", handle.source_path().display());

    // 主线程: 定时刷新, 从不阻塞在推理上
    while console.finished.is_none() && !handle.is_finished() {
        drain_events(&rx_ui, &mut console);
        console.consume_previews(&rx_input, &rx_output);
        thread::sleep(REFRESH_INTERVAL);
    }
    let joined = handle.join();
    drain_events(&rx_ui, &mut console);
    let result = console.finished.take().unwrap_or(joined);

    if console.preview_frames > 0 {
        info!("📺 实时预览帧: {}", console.preview_frames);
    }
    info!("🎛️  可用控件: {}", console.enabled_controls().join(", "));

    match &result.failure {
        None => {
            info!(
                "✅ 推理完成, 耗时 {:.2}s → {}",
                result.elapsed.as_secs_f64(),
                result.output_path.as_deref().map(|p| p.display().to_string()).unwrap_or_default()
            );
            Ok(())
        }
        Some(failure) => {
            warn!("⚠️  推理未产生结果");
            bail!("推理失败: {}", failure)
        }
    }
}
