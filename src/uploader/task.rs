// 上传任务定义
//
// UploadTask 是存储中的唯一记录，所有字段变更通过 TransferPatch 经 TransferStore::upsert 落地

use super::estimator::{CALCULATING, ZERO_RATE};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 上传任务状态
///
/// 合法转换：
/// - queued → active | canceled
/// - active → paused | completed | failed | canceled
/// - paused → active | canceled
///
/// completed / failed / canceled 为终态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    /// 已创建，执行器尚未启动
    Queued,
    /// 上传中
    Active,
    /// 已暂停
    Paused,
    /// 已完成
    Completed,
    /// 失败
    Failed,
    /// 已取消
    Canceled,
}

impl TransferStatus {
    /// 所有状态
    pub const ALL: [TransferStatus; 6] = [
        TransferStatus::Queued,
        TransferStatus::Active,
        TransferStatus::Paused,
        TransferStatus::Completed,
        TransferStatus::Failed,
        TransferStatus::Canceled,
    ];

    /// 是否允许转换到 `next`（状态不变不算转换）
    pub fn can_transition_to(self, next: TransferStatus) -> bool {
        use TransferStatus::*;
        matches!(
            (self, next),
            (Queued, Active)
                | (Queued, Canceled)
                | (Active, Paused)
                | (Active, Completed)
                | (Active, Failed)
                | (Active, Canceled)
                | (Paused, Active)
                | (Paused, Canceled)
        )
    }

    /// 是否为终态
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Failed | TransferStatus::Canceled
        )
    }

    /// 状态名（与序列化一致）
    pub fn as_str(self) -> &'static str {
        match self {
            TransferStatus::Queued => "queued",
            TransferStatus::Active => "active",
            TransferStatus::Paused => "paused",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
            TransferStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 上传任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadTask {
    /// 任务ID
    pub id: String,
    /// 文件名
    pub name: String,
    /// MIME 类型
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// 文件大小
    pub total_bytes: u64,
    /// 已上传大小
    pub transferred_bytes: u64,
    /// 任务状态
    pub status: TransferStatus,
    /// 上传速度（如 "1.5 MB/s"）
    pub rate: String,
    /// 剩余时间（如 "5s"，或 "calculating"）
    pub time_remaining: String,
    /// 创建时间 (Unix timestamp)
    pub created_at: i64,
    /// 完成时间 (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    /// 缩略图（data URL，仅在创建时生成一次）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// 目标位置展示名
    pub destination_label: String,
    /// 错误信息
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadTask {
    /// 创建新的排队任务
    pub fn new(name: String, total_bytes: u64, destination_label: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            content_type: None,
            total_bytes,
            transferred_bytes: 0,
            status: TransferStatus::Queued,
            rate: ZERO_RATE.to_string(),
            time_remaining: CALCULATING.to_string(),
            created_at: chrono::Utc::now().timestamp(),
            completed_at: None,
            thumbnail: None,
            destination_label,
            error: None,
        }
    }

    /// 计算进度百分比
    pub fn progress(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.transferred_bytes as f64 / self.total_bytes as f64) * 100.0
    }
}

/// 任务字段的部分更新
///
/// 每个字段为 None 表示不修改；`TransferStore::upsert` 校验通过后整体应用
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferPatch {
    pub status: Option<TransferStatus>,
    pub transferred_bytes: Option<u64>,
    pub rate: Option<String>,
    pub time_remaining: Option<String>,
    pub completed_at: Option<i64>,
    pub thumbnail: Option<String>,
    /// `Some(None)` 清除错误信息
    pub error: Option<Option<String>>,
}

impl TransferPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// 仅修改状态
    pub fn status(status: TransferStatus) -> Self {
        Self::new().with_status(status)
    }

    /// 进度更新
    pub fn progress(transferred_bytes: u64, rate: String, time_remaining: String) -> Self {
        Self {
            transferred_bytes: Some(transferred_bytes),
            rate: Some(rate),
            time_remaining: Some(time_remaining),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: TransferStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_bytes(mut self, transferred_bytes: u64) -> Self {
        self.transferred_bytes = Some(transferred_bytes);
        self
    }

    pub fn with_rate(mut self, rate: impl Into<String>, time_remaining: impl Into<String>) -> Self {
        self.rate = Some(rate.into());
        self.time_remaining = Some(time_remaining.into());
        self
    }

    pub fn with_completed_at(mut self, completed_at: i64) -> Self {
        self.completed_at = Some(completed_at);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: String) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(Some(error.into()));
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = Some(None);
        self
    }

    /// 补丁是否为空
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
