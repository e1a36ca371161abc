// 上传记录存储
//
// 所有 UploadTask 的唯一数据源。写入统一经过 upsert：
// 补丁先整体校验，通过后在同一把写锁内一次性应用，不会出现部分写入

use super::task::{TransferPatch, TransferStatus, UploadTask};
use parking_lot::RwLock;
use std::collections::HashMap;

/// 存储错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("上传记录不存在: {0}")]
    NotFound(String),

    #[error("非法状态转换: {id} {from} -> {to}")]
    IllegalTransition {
        id: String,
        from: TransferStatus,
        to: TransferStatus,
    },

    #[error("已传输字节数超过文件大小: {id} ({transferred} > {total})")]
    BytesExceedTotal {
        id: String,
        transferred: u64,
        total: u64,
    },

    #[error("上传中的字节数不能回退: {id} ({current} -> {requested})")]
    BytesWentBackwards {
        id: String,
        current: u64,
        requested: u64,
    },

    #[error("上传记录已存在: {0}")]
    AlreadyExists(String),
}

/// 上传记录存储
#[derive(Debug, Default)]
pub struct TransferStore {
    records: RwLock<HashMap<String, UploadTask>>,
}

impl TransferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入新记录
    pub fn insert(&self, task: UploadTask) -> Result<(), StoreError> {
        let mut records = self.records.write();
        if records.contains_key(&task.id) {
            return Err(StoreError::AlreadyExists(task.id));
        }
        records.insert(task.id.clone(), task);
        Ok(())
    }

    /// 合并部分更新，返回更新后的快照
    pub fn upsert(&self, id: &str, patch: TransferPatch) -> Result<UploadTask, StoreError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        validate(record, &patch)?;
        apply(record, patch);

        Ok(record.clone())
    }

    pub fn get(&self, id: &str) -> Option<UploadTask> {
        self.records.read().get(id).cloned()
    }

    /// 全部记录的快照，按创建时间排序
    pub fn list(&self) -> Vec<UploadTask> {
        let mut tasks: Vec<UploadTask> = self.records.read().values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    /// 删除记录，不存在时返回 None
    pub fn remove(&self, id: &str) -> Option<UploadTask> {
        self.records.write().remove(id)
    }

    /// 仅在条件成立时删除
    pub fn remove_if(&self, id: &str, predicate: impl FnOnce(&UploadTask) -> bool) -> Option<UploadTask> {
        let mut records = self.records.write();
        if records.get(id).is_some_and(predicate) {
            records.remove(id)
        } else {
            None
        }
    }

    /// 删除所有满足条件的记录，返回被删除的记录
    pub fn remove_where(&self, predicate: impl Fn(&UploadTask) -> bool) -> Vec<UploadTask> {
        let mut records = self.records.write();
        let ids: Vec<String> = records
            .values()
            .filter(|task| predicate(task))
            .map(|task| task.id.clone())
            .collect();
        ids.iter().filter_map(|id| records.remove(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

fn validate(record: &UploadTask, patch: &TransferPatch) -> Result<(), StoreError> {
    let next_status = patch.status.unwrap_or(record.status);

    if let Some(next) = patch.status {
        if next != record.status && !record.status.can_transition_to(next) {
            return Err(StoreError::IllegalTransition {
                id: record.id.clone(),
                from: record.status,
                to: next,
            });
        }
    }

    if let Some(bytes) = patch.transferred_bytes {
        if bytes > record.total_bytes {
            return Err(StoreError::BytesExceedTotal {
                id: record.id.clone(),
                transferred: bytes,
                total: record.total_bytes,
            });
        }
        // 同一次执行内进度单调；状态切换（如恢复后从 0 重传）不受限
        let same_run = record.status == TransferStatus::Active && next_status == TransferStatus::Active;
        if same_run && bytes < record.transferred_bytes {
            return Err(StoreError::BytesWentBackwards {
                id: record.id.clone(),
                current: record.transferred_bytes,
                requested: bytes,
            });
        }
    }

    Ok(())
}

fn apply(record: &mut UploadTask, patch: TransferPatch) {
    if let Some(status) = patch.status {
        record.status = status;
    }
    if let Some(bytes) = patch.transferred_bytes {
        record.transferred_bytes = bytes;
    }
    if let Some(rate) = patch.rate {
        record.rate = rate;
    }
    if let Some(eta) = patch.time_remaining {
        record.time_remaining = eta;
    }
    if let Some(completed_at) = patch.completed_at {
        record.completed_at = Some(completed_at);
    }
    // 缩略图只生成一次
    if record.thumbnail.is_none() {
        record.thumbnail = patch.thumbnail;
    }
    if let Some(error) = patch.error {
        record.error = error;
    }
}
