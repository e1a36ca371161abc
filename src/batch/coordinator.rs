// 批量操作协调器
//
// 对选中的每个条目调用一次 ItemMutator：
// - 单项失败只记录，不中断其余条目
// - 结果顺序与输入顺序一致（并发执行时也一样）
// - 删除不存在的条目视为成功，便于重试部分失败的批次
// - 至少一项成功时发布一次数据变更通知

use super::types::{BatchError, BatchItemError, BatchOperation, BatchResult};
use crate::backend::{BackendError, ItemMutator};
use crate::config::BatchConfig;
use crate::events::{ChangeSource, EventBus};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 批量操作协调器
pub struct BatchCoordinator {
    mutator: Arc<dyn ItemMutator>,
    bus: EventBus,
    config: BatchConfig,
}

impl BatchCoordinator {
    pub fn new(mutator: Arc<dyn ItemMutator>, bus: EventBus, config: BatchConfig) -> Self {
        Self {
            mutator,
            bus,
            config,
        }
    }

    /// 对选中的条目执行同一操作
    ///
    /// 任一条目失败时返回 `BatchError::ItemsFailed`，其中包含全部失败项
    pub async fn apply(
        &self,
        selection: &[String],
        operation: BatchOperation,
    ) -> Result<BatchResult, BatchError> {
        let operation = operation.normalized()?;
        if selection.is_empty() {
            debug!("批量操作 {} 未选中任何条目", operation.kind());
            return Ok(BatchResult::empty());
        }

        let concurrency = self.config.concurrency.max(1);
        let outcomes: Vec<Result<(), BatchItemError>> = stream::iter(selection)
            .map(|item_id| self.apply_one(item_id, &operation))
            .buffered(concurrency)
            .collect()
            .await;

        let attempted = outcomes.len();
        let failures: Vec<BatchItemError> = outcomes.into_iter().filter_map(Result::err).collect();
        let succeeded = attempted - failures.len();

        info!(
            "批量操作完成: {}, 共 {} 项, 成功 {} 项, 失败 {} 项",
            operation.kind(),
            attempted,
            succeeded,
            failures.len()
        );

        // 🔥 整批只通知一次
        if succeeded > 0 {
            self.bus.notify_data_changed(ChangeSource::Batch {
                operation: operation.kind().to_string(),
                affected: succeeded,
            });
        }

        if failures.is_empty() {
            Ok(BatchResult {
                attempted,
                succeeded,
                failures,
            })
        } else {
            Err(BatchError::ItemsFailed {
                attempted,
                failures,
            })
        }
    }

    async fn apply_one(&self, item_id: &str, operation: &BatchOperation) -> Result<(), BatchItemError> {
        match self.mutator.mutate_item(item_id, operation).await {
            Ok(()) => Ok(()),
            Err(BackendError::NotFound(_)) if *operation == BatchOperation::Delete => {
                debug!("条目已不存在，删除视为成功: {}", item_id);
                Ok(())
            }
            Err(e) => {
                warn!("批量操作单项失败: {} {}, 错误: {}", operation.kind(), item_id, e);
                Err(BatchItemError {
                    item_id: item_id.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// 批量移动
    pub async fn move_items(
        &self,
        selection: &[String],
        project_id: Option<String>,
        folder_id: Option<String>,
    ) -> Result<BatchResult, BatchError> {
        self.apply(
            selection,
            BatchOperation::Move {
                project_id,
                folder_id,
            },
        )
        .await
    }

    /// 批量添加标签
    pub async fn add_tags(&self, selection: &[String], tags: Vec<String>) -> Result<BatchResult, BatchError> {
        self.apply(selection, BatchOperation::AddTags { tags }).await
    }

    /// 批量移除标签
    pub async fn remove_tags(
        &self,
        selection: &[String],
        tags: Vec<String>,
    ) -> Result<BatchResult, BatchError> {
        self.apply(selection, BatchOperation::RemoveTags { tags }).await
    }

    /// 批量设置收藏
    pub async fn set_favorite(&self, selection: &[String], favorite: bool) -> Result<BatchResult, BatchError> {
        self.apply(selection, BatchOperation::SetFavorite { favorite })
            .await
    }

    /// 批量删除
    pub async fn delete_items(&self, selection: &[String]) -> Result<BatchResult, BatchError> {
        self.apply(selection, BatchOperation::Delete).await
    }
}
