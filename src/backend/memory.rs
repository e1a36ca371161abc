// 进程内后端
//
// 同时实现 StorageBackend 与 ItemMutator：
// - 上传按固定分片报告进度，可配置每片延迟
// - 条目保存在 DashMap 中（工作区 / 项目 / 文件夹 / 标签 / 收藏）
// - 支持按文件名或条目 ID 注入失败

use super::{BackendError, Destination, FilePayload, ItemMutator, StorageBackend, StoredItem};
use crate::batch::BatchOperation;
use crate::uploader::ProgressReporter;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// 默认上传分片大小：1 MiB
pub const DEFAULT_MEMORY_CHUNK_SIZE: u64 = 1024 * 1024;

/// 内存中的文件条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryItem {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub workspace_id: String,
    pub project_id: Option<String>,
    pub folder_id: Option<String>,
    pub tags: Vec<String>,
    pub favorite: bool,
}

impl MemoryItem {
    /// 创建工作区根目录下的条目
    pub fn new(id: impl Into<String>, name: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size: 0,
            workspace_id: workspace_id.into(),
            project_id: None,
            folder_id: None,
            tags: Vec::new(),
            favorite: false,
        }
    }
}

/// 进程内后端
pub struct MemoryBackend {
    items: DashMap<String, MemoryItem>,
    chunk_size: u64,
    chunk_delay: Duration,
    /// 文件名 -> 错误信息
    failing_uploads: DashMap<String, String>,
    /// 条目 ID -> 错误信息
    failing_items: DashMap<String, String>,
    upload_calls: AtomicUsize,
    /// (条目 ID, 操作名)，按调用顺序记录
    mutation_log: Mutex<Vec<(String, &'static str)>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_chunking(DEFAULT_MEMORY_CHUNK_SIZE, Duration::ZERO)
    }

    /// 指定分片大小和每片延迟
    pub fn with_chunking(chunk_size: u64, chunk_delay: Duration) -> Self {
        Self {
            items: DashMap::new(),
            chunk_size: chunk_size.max(1),
            chunk_delay,
            failing_uploads: DashMap::new(),
            failing_items: DashMap::new(),
            upload_calls: AtomicUsize::new(0),
            mutation_log: Mutex::new(Vec::new()),
        }
    }

    /// 写入条目（覆盖同 ID 条目）
    pub fn insert_item(&self, item: MemoryItem) {
        self.items.insert(item.id.clone(), item);
    }

    pub fn item(&self, id: &str) -> Option<MemoryItem> {
        self.items.get(id).map(|entry| entry.clone())
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// 让指定文件名的上传在首个分片后失败
    pub fn fail_uploads_named(&self, name: impl Into<String>, message: impl Into<String>) {
        self.failing_uploads.insert(name.into(), message.into());
    }

    /// 让指定条目的所有变更失败
    pub fn fail_mutations_for(&self, item_id: impl Into<String>, message: impl Into<String>) {
        self.failing_items.insert(item_id.into(), message.into());
    }

    /// 清除条目的失败注入
    pub fn clear_mutation_failure(&self, item_id: &str) {
        self.failing_items.remove(item_id);
    }

    /// 上传调用次数
    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    /// 变更调用过的条目 ID（按调用顺序）
    pub fn mutated_ids(&self) -> Vec<String> {
        self.mutation_log
            .lock()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn apply(&self, item_id: &str, operation: &BatchOperation) -> Result<(), BackendError> {
        match operation {
            BatchOperation::Delete => self
                .items
                .remove(item_id)
                .map(|_| ())
                .ok_or_else(|| BackendError::NotFound(item_id.to_string())),
            BatchOperation::Move {
                project_id,
                folder_id,
            } => self.update(item_id, |item| {
                if project_id.is_some() {
                    item.project_id = project_id.clone();
                }
                item.folder_id = folder_id.clone();
            }),
            BatchOperation::AddTags { tags } => self.update(item_id, |item| {
                for tag in tags {
                    if !item.tags.contains(tag) {
                        item.tags.push(tag.clone());
                    }
                }
            }),
            BatchOperation::RemoveTags { tags } => {
                self.update(item_id, |item| item.tags.retain(|t| !tags.contains(t)))
            }
            BatchOperation::SetFavorite { favorite } => {
                self.update(item_id, |item| item.favorite = *favorite)
            }
        }
    }

    fn update(
        &self,
        item_id: &str,
        f: impl FnOnce(&mut MemoryItem),
    ) -> Result<(), BackendError> {
        let mut item = self
            .items
            .get_mut(item_id)
            .ok_or_else(|| BackendError::NotFound(item_id.to_string()))?;
        f(item.value_mut());
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn upload_file(
        &self,
        file: &FilePayload,
        destination: &Destination,
        progress: ProgressReporter,
    ) -> Result<StoredItem, BackendError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);

        let total = file.size();
        let failure = self
            .failing_uploads
            .get(&file.name)
            .map(|entry| entry.value().clone());

        let mut sent = 0u64;
        while sent < total {
            if !self.chunk_delay.is_zero() {
                tokio::time::sleep(self.chunk_delay).await;
            }
            sent = (sent + self.chunk_size).min(total);
            progress.report(sent);

            if let Some(message) = failure.as_ref() {
                return Err(BackendError::Transport(message.clone()));
            }
        }

        if let Some(message) = failure {
            return Err(BackendError::Transport(message));
        }

        let item = MemoryItem {
            id: Uuid::new_v4().to_string(),
            name: file.name.clone(),
            size: total,
            workspace_id: destination.workspace_id.clone(),
            project_id: destination.project_id.clone(),
            folder_id: destination.folder_id.clone(),
            tags: Vec::new(),
            favorite: false,
        };
        let stored = StoredItem {
            id: item.id.clone(),
            name: item.name.clone(),
            size: total,
            destination: destination.clone(),
        };
        self.insert_item(item);

        Ok(stored)
    }
}

#[async_trait]
impl ItemMutator for MemoryBackend {
    async fn mutate_item(
        &self,
        item_id: &str,
        operation: &BatchOperation,
    ) -> Result<(), BackendError> {
        self.mutation_log
            .lock()
            .push((item_id.to_string(), operation.kind()));

        if let Some(message) = self.failing_items.get(item_id) {
            return Err(BackendError::Rejected(message.value().clone()));
        }

        self.apply(item_id, operation)
    }
}
