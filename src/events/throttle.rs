//! 进度事件节流器
//!
//! 控制进度事件的发布频率，避免事件风暴。存储中的进度不受节流影响，
//! 只有推送给订阅者的 Progress 事件会被合并。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// 默认节流间隔（毫秒）
pub const DEFAULT_THROTTLE_INTERVAL_MS: u64 = 200;

/// 尚未发布过事件
const NEVER: u64 = u64::MAX;

/// 进度事件节流器
///
/// 时间戳以相对 `origin` 的纳秒数保存在原子变量中，`should_emit` 可在多个任务间共享调用
#[derive(Debug)]
pub struct ProgressThrottler {
    origin: Instant,
    last_emit_nanos: AtomicU64,
    interval_nanos: u64,
}

impl ProgressThrottler {
    /// 创建新的节流器
    pub fn new(interval: Duration) -> Self {
        Self {
            origin: Instant::now(),
            last_emit_nanos: AtomicU64::new(NEVER),
            interval_nanos: interval.as_nanos().min(u64::MAX as u128) as u64,
        }
    }

    /// 使用指定毫秒间隔创建节流器
    pub fn with_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }

    /// 检查是否应该发布事件
    ///
    /// 第一次调用总是返回 true；之后距离上次发布超过间隔才返回 true
    pub fn should_emit(&self) -> bool {
        let now = self.elapsed_nanos();
        let last = self.last_emit_nanos.load(Ordering::Relaxed);

        if last != NEVER && now.saturating_sub(last) < self.interval_nanos {
            return false;
        }

        // 被其他调用方抢先更新时本次不发布
        self.last_emit_nanos
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// 强制发布（最后一次进度）
    pub fn force_emit(&self) -> bool {
        self.last_emit_nanos
            .store(self.elapsed_nanos(), Ordering::Relaxed);
        true
    }

    fn elapsed_nanos(&self) -> u64 {
        // NEVER 保留为哨兵值
        (self.origin.elapsed().as_nanos() as u64).min(NEVER - 1)
    }
}

impl Default for ProgressThrottler {
    fn default() -> Self {
        Self::with_millis(DEFAULT_THROTTLE_INTERVAL_MS)
    }
}
