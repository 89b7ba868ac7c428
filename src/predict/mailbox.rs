/// 进度邮箱 (单槽, 后写覆盖)
///
/// 推理引擎写入, 进度线程读取并清空。不是队列: tick 之间的多次写入只保留最后一条。
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone, Debug, Default)]
pub struct ProgressMailbox {
    slot: Arc<Mutex<Option<String>>>,
}

impl ProgressMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// 覆盖写入; 空字符串等同于清空
    pub fn post(&self, message: impl Into<String>) {
        let message = message.into();
        *self.lock() = if message.is_empty() {
            None
        } else {
            Some(message)
        };
    }

    /// 原子地读取并清空
    pub fn take(&self) -> Option<String> {
        self.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    // 槽内只有一个 Option<String>, 中毒后的数据依然完整
    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
