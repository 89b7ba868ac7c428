//! 监控配置 - 通过JSON文件调整参数

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::predict::media::DEFAULT_IMAGE_EXTENSIONS;
use crate::predict::orchestrator::{DEFAULT_CONTROLS, DEFAULT_TRANSPORT_CONTROLS};
use crate::predict::{FailurePolicy, RelayConfig};

/// 推理监控参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    // === 媒体分类 ===
    pub image_extensions: Vec<String>, // 图片扩展名(不区分大小写)

    // === 控件 ===
    pub controls: Vec<String>,           // 运行期间禁用的控件
    pub transport_controls: Vec<String>, // 播放控制, 图片源保持禁用
    pub failure_policy: FailurePolicy,   // 推理失败后是否恢复控件

    // === 进度线程 ===
    pub tick_ms: u64,           // 轮询间隔
    pub idle_timeout_secs: u64, // 空闲自动退出

    // === 输出 ===
    pub live_preview: bool, // 视频推理时实时预览
    pub out_dir: String,    // 结果输出目录
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            image_extensions: DEFAULT_IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),

            controls: DEFAULT_CONTROLS.iter().map(|c| c.to_string()).collect(),
            transport_controls: DEFAULT_TRANSPORT_CONTROLS.iter().map(|c| c.to_string()).collect(),
            failure_policy: FailurePolicy::RestoreControls,

            tick_ms: 10,
            idle_timeout_secs: 1000,

            live_preview: true,
            out_dir: "inference/output".to_string(),
        }
    }
}

impl MonitorConfig {
    /// 从JSON文件加载配置; 文件不存在时写入默认配置
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!("❌ 保存配置失败: {:#}", e);
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("序列化配置失败")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("创建目录失败: {}", parent.display()))?;
        }
        fs::write(path, json).with_context(|| format!("写入失败: {}", path.display()))?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            tick: Duration::from_millis(self.tick_ms.max(1)),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
        }
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  当前监控配置:");
        info!("  图片格式: {}", self.image_extensions.join(" "));
        info!("  控件: {}", self.controls.join(", "));
        info!("  轮询间隔: {}ms | 空闲退出: {}s", self.tick_ms, self.idle_timeout_secs);
        info!("  失败策略: {:?}", self.failure_policy);
        info!("  实时预览: {}", self.live_preview);
    }
}
