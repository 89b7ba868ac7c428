/// 推理调度 (Orchestrator)
/// 职责: 在独立线程上完整运行一次推理, 并在前后切换控件状态与媒体输出
///
/// 运行流程:
/// 1. 禁用全部控件, 启动新的进度线程
/// 2. 非图片源且开启实时预览 → 切换到实时预览, 把预览目标交给引擎
/// 3. InferenceEngine::detect (阻塞推理线程, 不可取消)
/// 4. 成功: 输入/输出媒体切换为 原始文件/结果文件 (暂停), 退出实时预览, 恢复控件
///    (图片源不恢复 play/pause)
/// 5. 失败: 按 FailurePolicy 决定是否恢复控件
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::media::DEFAULT_IMAGE_EXTENSIONS;
use super::{
    InferenceEngine, LiveSinks, MediaKind, ProgressMailbox, ProgressRelay, RelayConfig,
    RunFailure, RunRequest, RunResult, UiEvent,
};
use crate::ui_config::MonitorConfig;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("a run is already in progress")]
    RunInProgress,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// 推理失败后的控件策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    RestoreControls, // 恢复控件, 不切换媒体
    KeepDisabled,    // 保持全部禁用 (旧版行为)
}

/// 默认控件
pub const DEFAULT_CONTROLS: [&str; 6] = [
    "import_media",
    "start_predict",
    "open_predict_file",
    "play",
    "pause",
    "real_time",
];
pub const DEFAULT_TRANSPORT_CONTROLS: [&str; 2] = ["play", "pause"];

/// 运行期间需要禁用的控件名称
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlSet {
    names: Vec<String>,
    transport: Vec<String>, // 播放控制, 图片源不可用
}

impl Default for ControlSet {
    fn default() -> Self {
        Self::new(DEFAULT_CONTROLS, DEFAULT_TRANSPORT_CONTROLS)
    }
}

impl ControlSet {
    pub fn new<N, T>(names: N, transport: T) -> Self
    where
        N: IntoIterator,
        N::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            transport: transport.into_iter().map(Into::into).collect(),
        }
    }

    pub fn all(&self) -> Vec<String> {
        self.names.clone()
    }

    pub fn is_transport(&self, name: &str) -> bool {
        self.transport.iter().any(|t| t == name)
    }

    /// 运行结束后应恢复的控件
    pub fn enabled_after_run(&self, kind: MediaKind) -> Vec<String> {
        self.names
            .iter()
            .filter(|name| !(kind.is_image() && self.is_transport(name)))
            .cloned()
            .collect()
    }
}

pub struct Orchestrator {
    engine: Arc<Mutex<Box<dyn InferenceEngine>>>,
    mailbox: ProgressMailbox,
    controls: ControlSet,
    image_extensions: Vec<String>,
    relay_config: RelayConfig,
    failure_policy: FailurePolicy,
    live_sinks: Option<LiveSinks>,
    tx: Sender<UiEvent>,
    running: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new<E: InferenceEngine + 'static>(engine: E, tx: Sender<UiEvent>) -> Self {
        let mailbox = engine.mailbox();
        let engine: Box<dyn InferenceEngine> = Box::new(engine);
        Self {
            engine: Arc::new(Mutex::new(engine)),
            mailbox,
            controls: ControlSet::default(),
            image_extensions: DEFAULT_IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            relay_config: RelayConfig::default(),
            failure_policy: FailurePolicy::default(),
            live_sinks: None,
            tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config<E: InferenceEngine + 'static>(
        engine: E,
        tx: Sender<UiEvent>,
        config: &MonitorConfig,
    ) -> Self {
        Self::new(engine, tx)
            .with_controls(ControlSet::new(
                config.controls.clone(),
                config.transport_controls.clone(),
            ))
            .with_image_extensions(config.image_extensions.clone())
            .with_relay_config(config.relay_config())
            .with_failure_policy(config.failure_policy)
    }

    pub fn with_controls(mut self, controls: ControlSet) -> Self {
        self.controls = controls;
        self
    }

    pub fn with_image_extensions(mut self, extensions: Vec<String>) -> Self {
        self.image_extensions = extensions;
        self
    }

    pub fn with_relay_config(mut self, config: RelayConfig) -> Self {
        self.relay_config = config;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_live_sinks(mut self, sinks: LiveSinks) -> Self {
        self.live_sinks = Some(sinks);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// 启动一次推理, 立即返回; 已有推理在运行时返回 `RunInProgress`
    pub fn start(&self, request: RunRequest) -> Result<RunHandle, MonitorError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("⚠️  推理进行中, 忽略新的请求: {}", request.source_path.display());
            return Err(MonitorError::RunInProgress);
        }
        let running = RunningFlag(self.running.clone());

        let job = RunJob {
            engine: self.engine.clone(),
            mailbox: self.mailbox.clone(),
            controls: self.controls.clone(),
            image_extensions: self.image_extensions.clone(),
            relay_config: self.relay_config,
            failure_policy: self.failure_policy,
            live_sinks: self.live_sinks.clone(),
            tx: self.tx.clone(),
        };

        let source_path = request.source_path.clone();
        // spawn 失败时闭包被丢弃, RunningFlag 随之释放
        let handle = thread::Builder::new()
            .name("predict-run".to_string())
            .spawn(move || job.run(request, running))?;

        Ok(RunHandle {
            handle,
            source_path,
        })
    }
}

/// 正在运行的推理
pub struct RunHandle {
    handle: JoinHandle<RunResult>,
    source_path: PathBuf,
}

impl RunHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// 阻塞等待; 仅用于后台线程或测试, 展示线程应等待 RunComplete 事件
    pub fn join(self) -> RunResult {
        let source_path = self.source_path;
        self.handle.join().unwrap_or_else(|payload| RunResult {
            source_path,
            output_path: None,
            failure: Some(RunFailure::Panicked(panic_message(payload.as_ref()))),
            elapsed: Duration::ZERO,
        })
    }
}

/// 释放单次运行标志
struct RunningFlag(Arc<AtomicBool>);

impl Drop for RunningFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 控件恢复守卫: 未解除时在退出作用域时恢复控件
struct ControlRestore<'a> {
    tx: &'a Sender<UiEvent>,
    names: Vec<String>,
    armed: bool,
}

impl ControlRestore<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ControlRestore<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.tx.send(UiEvent::ControlsEnabled {
                names: std::mem::take(&mut self.names),
                enabled: true,
            });
        }
    }
}

struct RunJob {
    engine: Arc<Mutex<Box<dyn InferenceEngine>>>,
    mailbox: ProgressMailbox,
    controls: ControlSet,
    image_extensions: Vec<String>,
    relay_config: RelayConfig,
    failure_policy: FailurePolicy,
    live_sinks: Option<LiveSinks>,
    tx: Sender<UiEvent>,
}

impl RunJob {
    fn run(self, request: RunRequest, running: RunningFlag) -> RunResult {
        let started = Instant::now();
        let source = request.source_path.clone();
        let kind = MediaKind::classify(&source, &self.image_extensions);
        info!("🚀 开始推理: {} ({:?})", source.display(), kind);

        self.post(UiEvent::RunStarted(request.clone()));
        self.post(UiEvent::ControlsEnabled {
            names: self.controls.all(),
            enabled: false,
        });
        let mut restore = ControlRestore {
            tx: &self.tx,
            names: self.controls.enabled_after_run(kind),
            armed: true,
        };

        // 每次运行使用新的进度线程, 并在释放运行标志之前停止
        let relay = match ProgressRelay::spawn(
            self.mailbox.clone(),
            self.tx.clone(),
            self.relay_config,
        ) {
            Ok(relay) => Some(relay),
            Err(e) => {
                error!("❌ 进度线程启动失败: {}", e);
                None
            }
        };

        let live = if !kind.is_image() && request.live_sinks_enabled {
            if self.live_sinks.is_none() {
                warn!("⚠️  未配置实时预览目标, 推理结束后再显示结果");
            }
            self.live_sinks.clone()
        } else {
            None
        };
        if live.is_some() {
            self.post(UiEvent::LivePreview(true));
        }

        let outcome = self.invoke(&source, live.as_ref());

        if let Some(relay) = relay {
            let stats = relay.stop();
            debug!(
                "📡 进度统计: 转发{}条 | 丢弃{}条 | {:?}",
                stats.delivered, stats.dropped, stats.exit
            );
        }

        let result = match outcome {
            Ok(output) => {
                self.post(UiEvent::MediaSinks {
                    input: source.clone(),
                    output: output.clone(),
                });
                if live.is_some() {
                    self.post(UiEvent::LivePreview(false));
                }
                info!("✅ 推理完成: {} → {}", source.display(), output.display());
                RunResult {
                    source_path: source,
                    output_path: Some(output),
                    failure: None,
                    elapsed: started.elapsed(),
                }
            }
            Err(failure) => {
                if live.is_some() {
                    self.post(UiEvent::LivePreview(false));
                }
                error!("❌ 推理失败: {} | {}", source.display(), failure);
                if self.failure_policy == FailurePolicy::KeepDisabled {
                    restore.disarm();
                }
                RunResult {
                    source_path: source,
                    output_path: None,
                    failure: Some(failure),
                    elapsed: started.elapsed(),
                }
            }
        };

        // 先恢复控件并释放运行标志, 再通知运行结束
        drop(restore);
        drop(running);
        self.post(UiEvent::RunComplete(result.clone()));
        result
    }

    fn invoke(&self, source: &Path, sinks: Option<&LiveSinks>) -> Result<PathBuf, RunFailure> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut engine = self.engine.lock().unwrap_or_else(|poisoned| {
                warn!("⚠️  上一次推理异常退出, 继续使用引擎");
                poisoned.into_inner()
            });
            engine.detect(source, sinks)
        }));

        match outcome {
            Ok(Ok(Some(path))) if !path.as_os_str().is_empty() => Ok(path),
            Ok(Ok(_)) => Err(RunFailure::NoOutput),
            Ok(Err(e)) => Err(RunFailure::Engine(format!("{:#}", e))),
            Err(payload) => Err(RunFailure::Panicked(panic_message(payload.as_ref()))),
        }
    }

    fn post(&self, event: UiEvent) {
        // 展示线程已退出时丢弃
        let _ = self.tx.send(event);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
