//! 批號產生

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

/// 批號產生器
pub trait BatchCodeGenerator: Send + Sync {
    /// 產生一個新批號
    fn next_code(&self, prefix: &str, now: DateTime<Utc>) -> String;
}

/// 時間戳 + 單調遞增序號的批號產生器
///
/// 格式：`{prefix}-{yyyymmddHHMMSSmmm}-{序號:06}`，序號取六位循環。
///
/// 序號只在同一個產生器實例內遞增。多個服務要避免同毫秒撞號時，
/// 以 `Arc` 共用同一個產生器；各自建立的產生器只能靠唯一約束重試。
#[derive(Debug, Default)]
pub struct SequentialBatchCodeGenerator {
    counter: AtomicU64,
}

impl SequentialBatchCodeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 從指定序號開始（例如重啟後接續）
    pub fn starting_at(start: u64) -> Self {
        Self {
            counter: AtomicU64::new(start),
        }
    }
}

impl BatchCodeGenerator for SequentialBatchCodeGenerator {
    fn next_code(&self, prefix: &str, now: DateTime<Utc>) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!(
            "{}-{}-{:06}",
            prefix,
            now.format("%Y%m%d%H%M%S%3f"),
            seq % 1_000_000
        )
    }
}

impl<G: BatchCodeGenerator + ?Sized> BatchCodeGenerator for std::sync::Arc<G> {
    fn next_code(&self, prefix: &str, now: DateTime<Utc>) -> String {
        (**self).next_code(prefix, now)
    }
}
