//! 事件总线
//!
//! 单写多读的广播通道：上传管理器与批量协调器发布事件，视图层订阅。
//! 数据变更通知附带单调递增的版本号，订阅者可据此判断是否需要重新拉取。

use super::types::{AppEvent, ChangeNotice, ChangeSource, TransferEvent};
use crate::config::{UploadConfig, DEFAULT_EVENT_CHANNEL_CAPACITY};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// 事件总线（可克隆，克隆体共享同一通道）
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
    data_version: Arc<AtomicU64>,
}

impl EventBus {
    /// 创建事件总线
    ///
    /// `capacity` 为每个订阅者的缓冲容量，落后过多的订阅者会收到 `Lagged`
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            data_version: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 按上传配置的容量创建事件总线
    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(config.event_channel_capacity)
    }

    /// 订阅所有事件
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }

    /// 发布事件，没有订阅者时直接丢弃
    pub fn publish(&self, event: AppEvent) {
        if self.tx.send(event).is_err() {
            debug!("事件总线无订阅者，事件已丢弃");
        }
    }

    /// 发布上传事件
    pub fn publish_transfer(&self, event: TransferEvent) {
        self.publish(AppEvent::Transfer(event));
    }

    /// 发布数据变更通知，返回新的数据版本号
    pub fn notify_data_changed(&self, source: ChangeSource) -> u64 {
        let version = self.data_version.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("数据变更通知: version={}, source={:?}", version, source);
        self.publish(AppEvent::DataChanged(ChangeNotice {
            version,
            changed_at: chrono::Utc::now().timestamp(),
            source,
        }));
        version
    }

    /// 当前数据版本号（从未变更时为 0）
    pub fn data_version(&self) -> u64 {
        self.data_version.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new(8);
        bus.publish_transfer(TransferEvent::Removed {
            task_id: "t".to_string(),
        });
        assert_eq!(bus.data_version(), 0);
    }

    #[tokio::test]
    async fn test_capacity_comes_from_upload_config() {
        let config: UploadConfig = toml::from_str("event_channel_capacity = 2").unwrap();
        let bus = EventBus::from_config(&config);
        let mut rx = bus.subscribe();

        for i in 0..3 {
            bus.publish_transfer(TransferEvent::Removed {
                task_id: format!("t{i}"),
            });
        }

        // 容量为 2：最早的事件被挤掉
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(1))
        ));
        let next = rx.try_recv().unwrap();
        assert_eq!(next.as_transfer().map(|e| e.task_id()), Some("t1"));
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_notice() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let version = bus.notify_data_changed(ChangeSource::Batch {
            operation: "move".to_string(),
            affected: 2,
        });
        assert_eq!(version, 1);
        assert_eq!(bus.data_version(), 1);

        for rx in [&mut a, &mut b] {
            let event = rx.recv().await.unwrap();
            let notice = event.as_data_changed().unwrap();
            assert_eq!(notice.version, 1);
        }
    }

    #[tokio::test]
    async fn test_versions_increase_across_clones() {
        let bus = EventBus::new(8);
        let clone = bus.clone();

        bus.notify_data_changed(ChangeSource::Transfer {
            task_id: "a".to_string(),
            status: crate::uploader::TransferStatus::Completed,
        });
        let v = clone.notify_data_changed(ChangeSource::Transfer {
            task_id: "b".to_string(),
            status: crate::uploader::TransferStatus::Failed,
        });

        assert_eq!(v, 2);
        assert_eq!(bus.data_version(), 2);
    }
}
