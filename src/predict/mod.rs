/// 推理监控核心 (Predict Monitor Core)
/// Progress relay and run orchestration
///
/// 三线程架构(通过crossbeam channel通信):
/// 1. 展示线程: 界面/控制台 → 定时 drain UiEvent (从不阻塞)
/// 2. 进度线程: 每个tick读取并清空 ProgressMailbox → 解析 → 发送 Progress
/// 3. 推理线程: 禁用控件 → InferenceEngine::detect (阻塞) → 切换媒体 → 恢复控件
pub mod engine;
pub mod mailbox;
pub mod media;
pub mod orchestrator;
pub mod parser;
pub mod presentation;
pub mod relay;
pub mod scripted;

use std::path::PathBuf;
use std::time::Duration;

// ========== 重新导出常用类型 ==========

pub use engine::{InferenceEngine, LiveSinks, PreviewFrame};
pub use mailbox::ProgressMailbox;
pub use media::MediaKind;
pub use orchestrator::{ControlSet, FailurePolicy, MonitorError, Orchestrator, RunHandle};
pub use parser::{parse_message, ParseError};
pub use presentation::{drain_events, Presentation, UiEvent};
pub use relay::{ProgressRelay, RelayConfig, RelayExit, RelayStats};
pub use scripted::{ScriptOutcome, ScriptStep, ScriptedEngine};

// ========== 进度消息类型定义 ==========

/// 进度来源
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressKind {
    VideoFrame,      // 视频/流: 按帧推进
    ImageSingleShot, // 单张图片: 一次完成
}

/// 进度事件 (进度线程 → 展示线程)
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressEvent {
    pub kind: ProgressKind,
    pub percent: u8,      // 0..=100
    pub fps: Option<f64>, // 耗时为0或无法解析时为空
}

/// 推理请求, 每次运行创建一次
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunRequest {
    pub source_path: PathBuf,
    pub live_sinks_enabled: bool,
}

impl RunRequest {
    pub fn new(source_path: impl Into<PathBuf>, live_sinks_enabled: bool) -> Self {
        Self {
            source_path: source_path.into(),
            live_sinks_enabled,
        }
    }
}

/// 运行失败原因
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunFailure {
    NoOutput,         // detect 返回空路径
    Engine(String),   // detect 返回错误
    Panicked(String), // detect 线程内 panic
}

impl std::fmt::Display for RunFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunFailure::NoOutput => write!(f, "engine produced no output"),
            RunFailure::Engine(e) => write!(f, "engine failed: {}", e),
            RunFailure::Panicked(e) => write!(f, "engine panicked: {}", e),
        }
    }
}

/// 运行结果 (推理线程 → 展示线程)
#[derive(Clone, Debug, PartialEq)]
pub struct RunResult {
    pub source_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub failure: Option<RunFailure>,
    pub elapsed: Duration,
}

impl RunResult {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none() && self.output_path.is_some()
    }
}
