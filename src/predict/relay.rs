/// 进度中继线程 (Progress Relay)
///
/// 固定间隔轮询 ProgressMailbox, 读取并清空后解析, 把结果发往展示线程。
/// 长时间无消息自动退出; `stop()` 退出前会再读一次邮箱, 保证尾部消息不丢。
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use log::{debug, info, warn};

use super::{parse_message, ProgressMailbox, UiEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    pub tick: Duration,
    pub idle_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(10),
            idle_timeout: Duration::from_secs(1000), // 100000 次 tick
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayExit {
    Stopped,      // 调用方主动停止
    IdleTimeout,  // 空闲超时
    Disconnected, // 展示线程已关闭
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RelayStats {
    pub delivered: u64, // 解析成功的进度事件
    pub dropped: u64,   // 无法解析的消息
    pub exit: RelayExit,
}

pub struct ProgressRelay {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<RelayStats>>,
}

impl ProgressRelay {
    pub fn spawn(
        mailbox: ProgressMailbox,
        tx: Sender<UiEvent>,
        config: RelayConfig,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let handle = thread::Builder::new()
            .name("progress-relay".to_string())
            .spawn(move || relay_loop(mailbox, tx, config, stop_flag))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// 请求停止并等待线程退出
    pub fn stop(mut self) -> RelayStats {
        self.stop.store(true, Ordering::Release);
        self.wait()
    }

    /// 等待线程自行退出 (空闲超时或展示线程关闭)
    pub fn join(mut self) -> RelayStats {
        self.wait()
    }

    fn wait(&mut self) -> RelayStats {
        let fallback = RelayStats {
            delivered: 0,
            dropped: 0,
            exit: RelayExit::Stopped,
        };
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                warn!("⚠️  进度线程异常退出");
                fallback
            }),
            None => fallback,
        }
    }
}

impl Drop for ProgressRelay {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop.store(true, Ordering::Release);
            self.wait();
        }
    }
}

fn relay_loop(
    mailbox: ProgressMailbox,
    tx: Sender<UiEvent>,
    config: RelayConfig,
    stop: Arc<AtomicBool>,
) -> RelayStats {
    debug!("📡 进度线程启动 (tick {:?})", config.tick);

    let mut stats = RelayStats {
        delivered: 0,
        dropped: 0,
        exit: RelayExit::Stopped,
    };
    let mut last_activity = Instant::now();

    loop {
        let stopping = stop.load(Ordering::Acquire);

        if let Some(message) = mailbox.take() {
            last_activity = Instant::now();
            if !forward(&tx, message, &mut stats) {
                stats.exit = RelayExit::Disconnected;
                break;
            }
        } else if last_activity.elapsed() >= config.idle_timeout {
            info!("⏱️  进度线程空闲 {:?}, 自动退出", config.idle_timeout);
            stats.exit = RelayExit::IdleTimeout;
            break;
        }

        // 停止标志在本轮读取之前已设置, 邮箱已清空
        if stopping {
            stats.exit = RelayExit::Stopped;
            break;
        }

        thread::sleep(config.tick);
    }

    debug!(
        "📡 进度线程退出: {:?} | 转发{}条 | 丢弃{}条",
        stats.exit, stats.delivered, stats.dropped
    );
    stats
}

/// 发送原始消息与解析结果; 接收端已关闭时返回 false
fn forward(tx: &Sender<UiEvent>, message: String, stats: &mut RelayStats) -> bool {
    let parsed = parse_message(&message);
    if tx.send(UiEvent::RawMessage(message)).is_err() {
        return false;
    }
    match parsed {
        Ok(event) => {
            stats.delivered += 1;
            tx.send(UiEvent::Progress(event)).is_ok()
        }
        Err(e) => {
            debug!("进度消息未解析: {}", e);
            stats.dropped += 1;
            true
        }
    }
}
