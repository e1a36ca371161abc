// 上传管理器
//
// 负责上传任务的创建、暂停、恢复、取消与清理：
// - 每个 active 任务恰好对应一个执行实例，其他状态没有
// - 执行器事件带执行 ID，与当前登记的执行实例不一致的事件直接丢弃
// - 完成后记录保留一段时间再自动移除，失败记录保留到用户清理
// - 完成或失败时发布一次数据变更通知
//
// 锁顺序：slots -> store

use super::error::TransferError;
use super::estimator::{estimate_rate, estimate_time_remaining, CALCULATING, ZERO_RATE};
use super::executor::{ExecutionHandle, ExecutorEvent, ExecutorEventKind, TransferExecutor};
use super::store::TransferStore;
use super::task::{TransferPatch, TransferStatus, UploadTask};
use crate::backend::{Destination, FilePayload, StorageBackend, StoredItem};
use crate::config::UploadConfig;
use crate::events::{AppEvent, ChangeSource, EventBus, ProgressThrottler, TransferEvent};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 任务的原始输入，恢复上传时重新使用
#[derive(Debug)]
struct TransferSource {
    payload: FilePayload,
    destination: Destination,
}

/// 正在运行的执行实例
#[derive(Debug)]
struct RunningExecution {
    handle: ExecutionHandle,
    throttler: ProgressThrottler,
}

/// 管理器为每个未结束任务保留的槽位
#[derive(Debug)]
struct TransferSlot {
    source: TransferSource,
    running: Option<RunningExecution>,
}

struct ManagerInner {
    store: TransferStore,
    slots: Mutex<HashMap<String, TransferSlot>>,
    backend: Arc<dyn StorageBackend>,
    sink: mpsc::UnboundedSender<ExecutorEvent>,
    bus: EventBus,
    config: UploadConfig,
}

/// 上传管理器
///
/// 所有方法必须在 tokio 运行时内调用。丢弃管理器会中止全部进行中的上传
pub struct UploadManager {
    inner: Arc<ManagerInner>,
    event_loop: JoinHandle<()>,
}

impl UploadManager {
    /// 创建上传管理器
    pub fn new(backend: Arc<dyn StorageBackend>, bus: EventBus, config: UploadConfig) -> Self {
        let (sink, events) = mpsc::unbounded_channel();
        let inner = Arc::new(ManagerInner {
            store: TransferStore::new(),
            slots: Mutex::new(HashMap::new()),
            backend,
            sink,
            bus,
            config,
        });

        let event_loop = tokio::spawn(run_event_loop(Arc::downgrade(&inner), events));

        info!(
            "上传管理器初始化完成: 完成保留={}ms, 进度间隔={}ms",
            inner.config.completion_grace_ms, inner.config.progress_event_interval_ms
        );

        Self { inner, event_loop }
    }

    /// 添加上传任务并立即开始上传，返回任务 ID
    pub fn add(&self, file: FilePayload, destination: Destination) -> Result<String, TransferError> {
        let inner = &self.inner;

        let mut task = UploadTask::new(file.name.clone(), file.size(), destination.label.clone());
        task.content_type = file.content_type.clone();
        task.thumbnail = derive_thumbnail(&file, inner.config.thumbnail_max_bytes);
        let task_id = task.id.clone();

        let mut slots = inner.slots.lock();
        inner.store.insert(task.clone())?;

        inner.bus.publish_transfer(TransferEvent::Created {
            task_id: task_id.clone(),
            name: task.name.clone(),
            total_bytes: task.total_bytes,
            destination_label: task.destination_label.clone(),
        });

        let running = inner.start_execution(&task_id, &file, &destination);
        slots.insert(
            task_id.clone(),
            TransferSlot {
                source: TransferSource {
                    payload: file,
                    destination,
                },
                running: Some(running),
            },
        );

        inner
            .store
            .upsert(&task_id, TransferPatch::status(TransferStatus::Active))?;
        drop(slots);

        inner.publish_status(&task_id, TransferStatus::Queued, TransferStatus::Active);

        info!(
            "创建上传任务: id={}, 文件={}, 大小={}, 目标={}",
            task_id, task.name, task.total_bytes, task.destination_label
        );

        Ok(task_id)
    }

    /// 暂停上传
    ///
    /// 只能暂停 active 任务。执行实例被中止，已上传的进度在恢复时不会保留
    pub fn pause(&self, task_id: &str) -> Result<UploadTask, TransferError> {
        let inner = &self.inner;
        let mut slots = inner.slots.lock();

        let task = inner.require(task_id)?;
        if task.status != TransferStatus::Active {
            return Err(invalid_state(&task, "pause"));
        }

        if let Some(running) = slots.get_mut(task_id).and_then(|slot| slot.running.take()) {
            running.handle.cancel();
        }

        let updated = inner.store.upsert(
            task_id,
            TransferPatch::status(TransferStatus::Paused).with_rate(ZERO_RATE, CALCULATING),
        )?;
        drop(slots);

        info!("暂停上传任务: {}", task_id);

        // 🔥 发送状态变更事件
        inner.publish_status(task_id, TransferStatus::Active, TransferStatus::Paused);
        inner.bus.publish_transfer(TransferEvent::Paused {
            task_id: task_id.to_string(),
        });

        Ok(updated)
    }

    /// 恢复上传
    ///
    /// 保留任务 ID，启动新的执行实例并从 0 字节重新上传
    pub fn resume(&self, task_id: &str) -> Result<UploadTask, TransferError> {
        let inner = &self.inner;
        let mut slots = inner.slots.lock();

        let task = inner.require(task_id)?;
        if task.status != TransferStatus::Paused {
            return Err(invalid_state(&task, "resume"));
        }
        let slot = slots
            .get_mut(task_id)
            .ok_or_else(|| TransferError::NotFound(task_id.to_string()))?;

        let running =
            inner.start_execution(task_id, &slot.source.payload, &slot.source.destination);
        let execution_id = running.handle.execution_id();
        slot.running = Some(running);

        let updated = inner.store.upsert(
            task_id,
            TransferPatch::status(TransferStatus::Active)
                .with_bytes(0)
                .with_rate(ZERO_RATE, CALCULATING)
                .clear_error(),
        )?;
        drop(slots);

        info!("恢复上传任务: {} (execution={})", task_id, execution_id);

        inner.publish_status(task_id, TransferStatus::Paused, TransferStatus::Active);
        inner.bus.publish_transfer(TransferEvent::Resumed {
            task_id: task_id.to_string(),
        });

        Ok(updated)
    }

    /// 取消上传并立即移除记录
    ///
    /// 仅对 queued / active / paused 任务有效
    pub fn cancel(&self, task_id: &str) -> Result<(), TransferError> {
        let inner = &self.inner;
        let mut slots = inner.slots.lock();

        let task = inner.require(task_id)?;
        if task.status.is_terminal() {
            return Err(invalid_state(&task, "cancel"));
        }

        inner.cancel_locked(&mut slots, &task)
    }

    /// 移除任务记录
    ///
    /// 任意状态均可移除，未结束的任务先取消
    pub fn remove(&self, task_id: &str) -> Result<(), TransferError> {
        let inner = &self.inner;
        let mut slots = inner.slots.lock();

        let task = inner.require(task_id)?;
        if !task.status.is_terminal() {
            return inner.cancel_locked(&mut slots, &task);
        }

        slots.remove(task_id);
        inner.store.remove(task_id);
        drop(slots);

        info!("删除上传任务: {}", task_id);
        inner.bus.publish_transfer(TransferEvent::Removed {
            task_id: task_id.to_string(),
        });

        Ok(())
    }

    /// 清除所有已完成的任务，返回清除数量
    pub fn clear_completed(&self) -> usize {
        let inner = &self.inner;
        let mut slots = inner.slots.lock();

        let removed = inner
            .store
            .remove_where(|task| task.status == TransferStatus::Completed);
        for task in &removed {
            slots.remove(&task.id);
        }
        drop(slots);

        for task in &removed {
            inner.bus.publish_transfer(TransferEvent::Removed {
                task_id: task.id.clone(),
            });
        }

        if !removed.is_empty() {
            info!("清除了 {} 个已完成的上传任务", removed.len());
        }

        removed.len()
    }

    /// 获取任务快照
    pub fn get(&self, task_id: &str) -> Option<UploadTask> {
        self.inner.store.get(task_id)
    }

    /// 获取所有任务快照（按创建时间排序）
    pub fn list(&self) -> Vec<UploadTask> {
        self.inner.store.list()
    }

    /// 正在上传的任务数
    pub fn active_count(&self) -> usize {
        self.inner
            .store
            .list()
            .iter()
            .filter(|task| task.status == TransferStatus::Active)
            .count()
    }

    /// 任务当前是否登记了执行实例
    pub fn is_executing(&self, task_id: &str) -> bool {
        self.inner
            .slots
            .lock()
            .get(task_id)
            .is_some_and(|slot| slot.running.is_some())
    }

    /// 订阅上传事件与数据变更通知
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.inner.bus.subscribe()
    }

    /// 事件总线
    pub fn event_bus(&self) -> &EventBus {
        &self.inner.bus
    }
}

impl Drop for UploadManager {
    fn drop(&mut self) {
        self.event_loop.abort();
        for slot in self.inner.slots.lock().values() {
            if let Some(running) = &slot.running {
                running.handle.cancel();
            }
        }
    }
}

async fn run_event_loop(inner: Weak<ManagerInner>, mut events: mpsc::UnboundedReceiver<ExecutorEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.handle_event(event);
    }
    debug!("上传事件循环退出");
}

impl ManagerInner {
    fn require(&self, task_id: &str) -> Result<UploadTask, TransferError> {
        self.store
            .get(task_id)
            .ok_or_else(|| TransferError::NotFound(task_id.to_string()))
    }

    fn start_execution(
        &self,
        task_id: &str,
        payload: &FilePayload,
        destination: &Destination,
    ) -> RunningExecution {
        let executor =
            TransferExecutor::new(task_id.to_string(), payload.clone(), destination.clone());
        let handle = executor.spawn(self.backend.clone(), self.sink.clone());
        RunningExecution {
            handle,
            throttler: ProgressThrottler::with_millis(self.config.progress_event_interval_ms),
        }
    }

    fn cancel_locked(
        &self,
        slots: &mut HashMap<String, TransferSlot>,
        task: &UploadTask,
    ) -> Result<(), TransferError> {
        if let Some(running) = slots.remove(&task.id).and_then(|slot| slot.running) {
            running.handle.cancel();
        }

        self.store
            .upsert(&task.id, TransferPatch::status(TransferStatus::Canceled))?;
        self.store.remove(&task.id);

        info!("取消上传任务: {}", task.id);

        self.publish_status(&task.id, task.status, TransferStatus::Canceled);
        self.bus.publish_transfer(TransferEvent::Canceled {
            task_id: task.id.clone(),
        });
        self.bus.publish_transfer(TransferEvent::Removed {
            task_id: task.id.clone(),
        });

        Ok(())
    }

    fn publish_status(&self, task_id: &str, old_status: TransferStatus, new_status: TransferStatus) {
        self.bus.publish_transfer(TransferEvent::StatusChanged {
            task_id: task_id.to_string(),
            old_status,
            new_status,
        });
    }

    /// 处理执行器事件
    pub(crate) fn handle_event(self: &Arc<Self>, event: ExecutorEvent) {
        let ExecutorEvent {
            transfer_id,
            execution_id,
            kind,
        } = event;

        let mut slots = self.slots.lock();
        let is_current = slots
            .get(&transfer_id)
            .and_then(|slot| slot.running.as_ref())
            .is_some_and(|running| running.handle.execution_id() == execution_id);
        if !is_current {
            debug!(
                "忽略过期的执行器事件: task={}, execution={}",
                transfer_id, execution_id
            );
            return;
        }

        match kind {
            ExecutorEventKind::Progress {
                transferred_bytes, ..
            } => {
                let Some(running) = slots.get(&transfer_id).and_then(|slot| slot.running.as_ref())
                else {
                    return;
                };
                self.on_progress(&transfer_id, transferred_bytes, running);
            }
            ExecutorEventKind::Completed(item) => {
                slots.remove(&transfer_id);
                drop(slots);
                self.on_completed(&transfer_id, item);
            }
            ExecutorEventKind::Failed(error) => {
                slots.remove(&transfer_id);
                drop(slots);
                self.on_failed(&transfer_id, error);
            }
        }
    }

    fn on_progress(&self, task_id: &str, transferred_bytes: u64, running: &RunningExecution) {
        let started_at = running.handle.started_at().into_std();
        let now = Instant::now().into_std();

        let Some(total_bytes) = self.store.get(task_id).map(|t| t.total_bytes) else {
            return;
        };
        let rate = estimate_rate(transferred_bytes, started_at, now);
        let time_remaining = estimate_time_remaining(transferred_bytes, total_bytes, started_at, now);

        match self.store.upsert(
            task_id,
            TransferPatch::progress(transferred_bytes, rate, time_remaining),
        ) {
            Ok(task) => {
                // 进度事件节流，最后一次进度总是发送
                let emit = if transferred_bytes == total_bytes {
                    running.throttler.force_emit()
                } else {
                    running.throttler.should_emit()
                };
                if emit {
                    self.bus.publish_transfer(TransferEvent::Progress {
                        task_id: task.id.clone(),
                        transferred_bytes: task.transferred_bytes,
                        total_bytes: task.total_bytes,
                        progress: task.progress(),
                        rate: task.rate.clone(),
                        time_remaining: task.time_remaining.clone(),
                    });
                }
            }
            Err(e) => warn!("更新上传进度失败: task={}, 错误: {}", task_id, e),
        }
    }

    fn on_completed(self: &Arc<Self>, task_id: &str, item: StoredItem) {
        let Some(total_bytes) = self.store.get(task_id).map(|t| t.total_bytes) else {
            return;
        };
        let completed_at = chrono::Utc::now().timestamp();

        let task = match self.store.upsert(
            task_id,
            TransferPatch::status(TransferStatus::Completed)
                .with_bytes(total_bytes)
                .with_rate(ZERO_RATE, "0s")
                .with_completed_at(completed_at),
        ) {
            Ok(task) => task,
            Err(e) => {
                warn!("标记上传完成失败: task={}, 错误: {}", task_id, e);
                return;
            }
        };

        info!("上传任务完成: {} -> {}", task.name, item.id);

        self.publish_status(task_id, TransferStatus::Active, TransferStatus::Completed);
        self.bus.publish_transfer(TransferEvent::Completed {
            task_id: task_id.to_string(),
            item_id: item.id,
            completed_at,
        });
        self.bus.notify_data_changed(ChangeSource::Transfer {
            task_id: task_id.to_string(),
            status: TransferStatus::Completed,
        });

        self.schedule_completed_removal(task_id.to_string());
    }

    fn on_failed(&self, task_id: &str, error: TransferError) {
        let message = match error {
            TransferError::Transport(message) => message,
            other => other.to_string(),
        };

        if let Err(e) = self.store.upsert(
            task_id,
            TransferPatch::status(TransferStatus::Failed)
                .with_rate(ZERO_RATE, CALCULATING)
                .with_error(message.clone()),
        ) {
            warn!("标记上传失败状态失败: task={}, 错误: {}", task_id, e);
            return;
        }

        warn!("上传任务失败: {}, 错误: {}", task_id, message);

        self.publish_status(task_id, TransferStatus::Active, TransferStatus::Failed);
        self.bus.publish_transfer(TransferEvent::Failed {
            task_id: task_id.to_string(),
            error: message,
        });
        self.bus.notify_data_changed(ChangeSource::Transfer {
            task_id: task_id.to_string(),
            status: TransferStatus::Failed,
        });
    }

    /// 完成记录在保留期后自动移除（期间被手动移除则什么都不做）
    fn schedule_completed_removal(self: &Arc<Self>, task_id: String) {
        let inner = Arc::downgrade(self);
        let grace = Duration::from_millis(self.config.completion_grace_ms);

        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let removed = inner
                .store
                .remove_if(&task_id, |task| task.status == TransferStatus::Completed);
            if removed.is_some() {
                debug!("自动移除已完成的上传记录: {}", task_id);
                inner.bus.publish_transfer(TransferEvent::Removed { task_id });
            }
        });
    }
}

fn invalid_state(task: &UploadTask, action: &'static str) -> TransferError {
    TransferError::InvalidState {
        id: task.id.clone(),
        status: task.status,
        action,
    }
}

/// 为不超过上限的图片生成 data URL 缩略图
fn derive_thumbnail(file: &FilePayload, max_bytes: u64) -> Option<String> {
    if !file.is_image() || file.size() == 0 || file.size() > max_bytes {
        return None;
    }
    let content_type = file.content_type.as_deref()?;
    Some(format!(
        "data:{};base64,{}",
        content_type,
        STANDARD.encode(&file.data)
    ))
}
