/// 展示层接口 (外部协作方)
///
/// 进度线程和推理线程从不直接修改界面状态, 只发送 `UiEvent`;
/// 展示线程按自己的节奏调用 `drain_events` 批量应用。
use std::path::{Path, PathBuf};

use crossbeam_channel::Receiver;

use super::{ProgressEvent, RunRequest, RunResult};

/// 发往展示线程的消息
#[derive(Clone, Debug, PartialEq)]
pub enum UiEvent {
    RunStarted(RunRequest),
    ControlsEnabled { names: Vec<String>, enabled: bool },
    LivePreview(bool),
    MediaSinks { input: PathBuf, output: PathBuf }, // 两个播放器都处于暂停状态
    RawMessage(String),
    Progress(ProgressEvent),
    RunComplete(RunResult),
}

pub trait Presentation {
    fn set_controls_enabled(&mut self, names: &[String], enabled: bool);
    fn show_live_preview(&mut self, enabled: bool);
    fn set_media_sinks(&mut self, input: &Path, output: &Path);
    fn on_progress(&mut self, event: &ProgressEvent);
    fn on_run_complete(&mut self, result: &RunResult);

    /// 进度条归零
    fn on_run_started(&mut self, _request: &RunRequest) {}

    /// 原始消息 (日志窗口)
    fn on_raw_message(&mut self, _message: &str) {}
}

impl UiEvent {
    pub fn apply<P: Presentation + ?Sized>(&self, presentation: &mut P) {
        match self {
            UiEvent::RunStarted(request) => presentation.on_run_started(request),
            UiEvent::ControlsEnabled { names, enabled } => {
                presentation.set_controls_enabled(names, *enabled)
            }
            UiEvent::LivePreview(enabled) => presentation.show_live_preview(*enabled),
            UiEvent::MediaSinks { input, output } => presentation.set_media_sinks(input, output),
            UiEvent::RawMessage(message) => presentation.on_raw_message(message),
            UiEvent::Progress(event) => presentation.on_progress(event),
            UiEvent::RunComplete(result) => presentation.on_run_complete(result),
        }
    }
}

/// 应用所有缓冲事件, 不阻塞; 返回处理数量
pub fn drain_events<P: Presentation + ?Sized>(
    rx: &Receiver<UiEvent>,
    presentation: &mut P,
) -> usize {
    let mut processed_count = 0;
    while let Ok(event) = rx.try_recv() {
        event.apply(presentation);
        processed_count += 1;
    }
    processed_count
}
