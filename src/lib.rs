// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 命令行参数
pub mod predict; // 推理调度与进度中继
pub mod ui_config; // 监控配置文件

pub use crate::config::{Args, SimulatedFailure};
pub use crate::predict::{
    drain_events, parse_message, ControlSet, FailurePolicy, InferenceEngine, LiveSinks,
    MediaKind, MonitorError, Orchestrator, Presentation, ProgressEvent, ProgressKind,
    ProgressMailbox, ProgressRelay, RelayConfig, RunFailure, RunHandle, RunRequest, RunResult,
    UiEvent,
};
pub use crate::ui_config::MonitorConfig;

pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}
