use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// 模拟引擎的失败方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SimulatedFailure {
    NoOutput, // 返回空路径
    Error,    // detect 返回错误
    Panic,    // detect 内 panic
}

/// 推理监控参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "检测推理进度监控", long_about = None)]
pub struct Args {
    /// 输入媒体 (图片/视频/流地址)
    #[arg(short, long)]
    pub source: PathBuf,

    /// 监控配置文件 (JSON)
    #[arg(short, long, default_value = "monitor.json")]
    pub config: PathBuf,

    /// 关闭实时预览
    #[arg(long)]
    pub no_live: bool,

    /// 结果输出目录 (覆盖配置文件)
    #[arg(short, long)]
    pub out_dir: Option<PathBuf>,

    /// 模拟视频总帧数
    #[arg(long, default_value_t = 120)]
    pub frames: usize,

    /// 模拟单帧耗时(毫秒)
    #[arg(long, default_value_t = 40)]
    pub frame_ms: u64,

    /// 模拟推理失败
    #[arg(long, value_enum)]
    pub fail: Option<SimulatedFailure>,
}
