// 批量操作类型定义

use serde::{Deserialize, Serialize};

/// 对单个条目执行的变更
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BatchOperation {
    /// 移动到指定项目 / 文件夹（project_id 为 None 时保持原项目）
    Move {
        #[serde(default)]
        project_id: Option<String>,
        #[serde(default)]
        folder_id: Option<String>,
    },
    /// 添加标签
    AddTags { tags: Vec<String> },
    /// 移除标签
    RemoveTags { tags: Vec<String> },
    /// 设置收藏
    SetFavorite { favorite: bool },
    /// 删除
    Delete,
}

impl BatchOperation {
    /// 操作名
    pub fn kind(&self) -> &'static str {
        match self {
            BatchOperation::Move { .. } => "move",
            BatchOperation::AddTags { .. } => "add_tags",
            BatchOperation::RemoveTags { .. } => "remove_tags",
            BatchOperation::SetFavorite { .. } => "set_favorite",
            BatchOperation::Delete => "delete",
        }
    }

    /// 规范化参数
    ///
    /// 标签去除首尾空白、丢弃空串、去重（保留首次出现的顺序）；
    /// 规范化后没有可用标签时返回 `InvalidParameters`
    pub fn normalized(self) -> Result<Self, BatchError> {
        match self {
            BatchOperation::AddTags { tags } => Ok(BatchOperation::AddTags {
                tags: normalize_tags(tags)?,
            }),
            BatchOperation::RemoveTags { tags } => Ok(BatchOperation::RemoveTags {
                tags: normalize_tags(tags)?,
            }),
            other => Ok(other),
        }
    }
}

fn normalize_tags(tags: Vec<String>) -> Result<Vec<String>, BatchError> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !normalized.iter().any(|t| t == tag) {
            normalized.push(tag.to_string());
        }
    }

    if normalized.is_empty() {
        return Err(BatchError::InvalidParameters("标签不能为空".to_string()));
    }
    Ok(normalized)
}

/// 单个条目的失败记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{item_id}: {message}")]
pub struct BatchItemError {
    /// 条目 ID
    pub item_id: String,
    /// 失败原因
    pub message: String,
}

/// 批量操作总体结果分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    Success,
    Partial,
    TotalFailure,
}

/// 一次批量操作的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// 尝试的条目数
    pub attempted: usize,
    /// 成功数
    pub succeeded: usize,
    /// 失败项（按输入顺序）
    pub failures: Vec<BatchItemError>,
}

impl BatchResult {
    /// 空选择的结果
    pub fn empty() -> Self {
        Self {
            attempted: 0,
            succeeded: 0,
            failures: Vec::new(),
        }
    }

    pub fn outcome(&self) -> BatchOutcome {
        if self.failures.is_empty() {
            BatchOutcome::Success
        } else if self.succeeded == 0 {
            BatchOutcome::TotalFailure
        } else {
            BatchOutcome::Partial
        }
    }

    /// 失败的条目 ID（按输入顺序），便于只重试失败项
    pub fn failed_ids(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.item_id.clone()).collect()
    }
}

/// 批量操作错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    /// 至少一项失败；其余条目已全部执行
    #[error("批量操作失败: {} / {attempted} 项失败", .failures.len())]
    ItemsFailed {
        attempted: usize,
        failures: Vec<BatchItemError>,
    },

    /// 参数无效，未执行任何条目
    #[error("批量操作参数无效: {0}")]
    InvalidParameters(String),
}

impl BatchError {
    /// 失败项数量
    pub fn failure_count(&self) -> usize {
        match self {
            BatchError::ItemsFailed { failures, .. } => failures.len(),
            BatchError::InvalidParameters(_) => 0,
        }
    }

    /// 转回完整结果（参数错误时为 None）
    pub fn into_result(self) -> Option<BatchResult> {
        match self {
            BatchError::ItemsFailed {
                attempted,
                failures,
            } => Some(BatchResult {
                attempted,
                succeeded: attempted - failures.len(),
                failures,
            }),
            BatchError::InvalidParameters(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(id: &str) -> BatchItemError {
        BatchItemError {
            item_id: id.to_string(),
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_tag_normalization() {
        let op = BatchOperation::AddTags {
            tags: vec![
                " red ".to_string(),
                "".to_string(),
                "blue".to_string(),
                "red".to_string(),
                "   ".to_string(),
            ],
        };
        assert_eq!(
            op.normalized().unwrap(),
            BatchOperation::AddTags {
                tags: vec!["red".to_string(), "blue".to_string()]
            }
        );

        let empty = BatchOperation::RemoveTags {
            tags: vec![" ".to_string()],
        };
        assert!(matches!(
            empty.normalized(),
            Err(BatchError::InvalidParameters(_))
        ));

        assert_eq!(
            BatchOperation::Delete.normalized().unwrap(),
            BatchOperation::Delete
        );
    }

    #[test]
    fn test_outcome_classification() {
        let mut result = BatchResult {
            attempted: 3,
            succeeded: 3,
            failures: vec![],
        };
        assert_eq!(result.outcome(), BatchOutcome::Success);

        result.succeeded = 1;
        result.failures = vec![failure("a"), failure("b")];
        assert_eq!(result.outcome(), BatchOutcome::Partial);
        assert_eq!(result.failed_ids(), vec!["a", "b"]);

        result.succeeded = 0;
        result.failures.push(failure("c"));
        assert_eq!(result.outcome(), BatchOutcome::TotalFailure);

        assert_eq!(BatchResult::empty().outcome(), BatchOutcome::Success);
    }

    #[test]
    fn test_error_message_and_conversion() {
        let err = BatchError::ItemsFailed {
            attempted: 5,
            failures: vec![failure("2"), failure("4")],
        };
        assert_eq!(err.to_string(), "批量操作失败: 2 / 5 项失败");
        assert_eq!(err.failure_count(), 2);

        let result = err.into_result().unwrap();
        assert_eq!(result.succeeded, 3);
        assert_eq!(result.outcome(), BatchOutcome::Partial);
    }

    #[test]
    fn test_operation_serialization() {
        let op = BatchOperation::SetFavorite { favorite: true };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "set_favorite");
        assert_eq!(json["favorite"], true);
        assert_eq!(op.kind(), "set_favorite");

        let parsed: BatchOperation =
            serde_json::from_str(r#"{"op":"move","folder_id":"f-1"}"#).unwrap();
        assert_eq!(
            parsed,
            BatchOperation::Move {
                project_id: None,
                folder_id: Some("f-1".to_string())
            }
        );
    }
}
