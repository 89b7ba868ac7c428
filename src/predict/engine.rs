/// 推理引擎接口 (外部协作方)
///
/// 引擎拥有一个进度邮箱, 运行期间不断覆盖写入最新进度;
/// `detect` 阻塞直到整个源处理完毕。
use std::path::{Path, PathBuf};

use anyhow::Result;
use crossbeam_channel::Sender;

use super::ProgressMailbox;

/// 实时预览帧 (推理线程 → 展示线程)
#[derive(Clone, Debug)]
pub struct PreviewFrame {
    pub rgba_data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub frame_id: u64, // 帧序号
}

/// 实时预览目标: 原始画面 + 检测结果画面
#[derive(Clone, Debug)]
pub struct LiveSinks {
    pub input: Sender<PreviewFrame>,
    pub output: Sender<PreviewFrame>,
}

impl LiveSinks {
    pub fn new(input: Sender<PreviewFrame>, output: Sender<PreviewFrame>) -> Self {
        Self { input, output }
    }

    /// 非阻塞推送; 展示线程来不及消费时直接丢帧
    pub fn push(&self, input: PreviewFrame, output: PreviewFrame) {
        let _ = self.input.try_send(input);
        let _ = self.output.try_send(output);
    }
}

pub trait InferenceEngine: Send {
    /// 进度邮箱 (与引擎同生命周期)
    fn mailbox(&self) -> ProgressMailbox;

    /// 阻塞运行到结束; `Ok(None)` 表示没有产生输出文件
    fn detect(&mut self, source: &Path, sinks: Option<&LiveSinks>) -> Result<Option<PathBuf>>;
}
