/// 脚本引擎 (Scripted Engine)
///
/// 按脚本回放进度消息, 用于演示程序和测试; 消息格式与真实检测引擎一致。
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};

use super::{InferenceEngine, LiveSinks, ProgressMailbox, PreviewFrame};
use crate::gen_time_string;

const PREVIEW_SIZE: u32 = 8; // 占位预览帧尺寸

#[derive(Clone, Debug)]
pub enum ScriptStep {
    Message(String),
    Pause(Duration),
}

#[derive(Clone, Debug)]
pub enum ScriptOutcome {
    Output(PathBuf),
    NoOutput,
    Fail(String),
    Panic(String),
}

pub struct ScriptedEngine {
    mailbox: ProgressMailbox,
    steps: Vec<ScriptStep>,
    outcome: ScriptOutcome,
    runs: usize,
}

impl ScriptedEngine {
    pub fn new(steps: Vec<ScriptStep>, outcome: ScriptOutcome) -> Self {
        Self {
            mailbox: ProgressMailbox::new(),
            steps,
            outcome,
            runs: 0,
        }
    }

    /// 模拟逐帧视频推理, 每帧耗时取自 `frame_times`
    pub fn simulate_video(source: &Path, out_dir: &Path, frame_times: &[Duration]) -> Self {
        let total = frame_times.len();
        let mut steps = Vec::with_capacity(total * 2 + 1);
        for (i, frame_time) in frame_times.iter().enumerate() {
            steps.push(ScriptStep::Pause(*frame_time));
            steps.push(ScriptStep::Message(format!(
                "video 1/1 ({}/{}) {}: 384x640 {} persons, Done. ({:.3}s)",
                i + 1,
                total,
                source.display(),
                1 + i % 3,
                frame_time.as_secs_f64()
            )));
        }
        steps.push(ScriptStep::Message(format!(
            "Results saved to {}",
            out_dir.display()
        )));
        Self::new(steps, ScriptOutcome::Output(output_path_for(source, out_dir)))
    }

    /// 模拟单张图片推理
    pub fn simulate_image(source: &Path, out_dir: &Path, elapsed: Duration) -> Self {
        let steps = vec![
            ScriptStep::Pause(elapsed),
            ScriptStep::Message(format!(
                "image 1/1 {}: 384x640 1 person, Done. ({:.3}s)",
                source.display(),
                elapsed.as_secs_f64()
            )),
        ];
        Self::new(steps, ScriptOutcome::Output(output_path_for(source, out_dir)))
    }

    pub fn with_outcome(mut self, outcome: ScriptOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// 已执行的 detect 次数
    pub fn runs(&self) -> usize {
        self.runs
    }
}

impl InferenceEngine for ScriptedEngine {
    fn mailbox(&self) -> ProgressMailbox {
        self.mailbox.clone()
    }

    fn detect(&mut self, _source: &Path, sinks: Option<&LiveSinks>) -> Result<Option<PathBuf>> {
        self.runs += 1;
        let mut frame_id = 0u64;

        for step in &self.steps {
            match step {
                ScriptStep::Message(message) => {
                    self.mailbox.post(message.as_str());
                    if let Some(sinks) = sinks {
                        frame_id += 1;
                        sinks.push(preview_frame(frame_id, 96), preview_frame(frame_id, 160));
                    }
                }
                ScriptStep::Pause(duration) => thread::sleep(*duration),
            }
        }

        match &self.outcome {
            ScriptOutcome::Output(path) => Ok(Some(path.clone())),
            ScriptOutcome::NoOutput => Ok(None),
            ScriptOutcome::Fail(reason) => Err(anyhow!("{}", reason)),
            ScriptOutcome::Panic(reason) => panic!("{}", reason),
        }
    }
}

/// 输出文件: <out_dir>/<stem>_<时间戳>.<ext>
pub fn output_path_for(source: &Path, out_dir: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("predict");
    let name = match source.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_{}.{}", stem, gen_time_string("_"), ext),
        None => format!("{}_{}.mp4", stem, gen_time_string("_")),
    };
    out_dir.join(name)
}

fn preview_frame(frame_id: u64, shade: u8) -> PreviewFrame {
    let pixels = (PREVIEW_SIZE * PREVIEW_SIZE) as usize;
    let mut rgba_data = Vec::with_capacity(pixels * 4);
    for _ in 0..pixels {
        rgba_data.extend_from_slice(&[shade, shade, shade, 255]);
    }
    PreviewFrame {
        rgba_data,
        width: PREVIEW_SIZE,
        height: PREVIEW_SIZE,
        frame_id,
    }
}
