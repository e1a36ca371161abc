//! 事件类型定义
//!
//! 上传生命周期事件与数据变更通知，供视图层订阅

use crate::uploader::TransferStatus;
use serde::{Deserialize, Serialize};

/// 上传任务事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum TransferEvent {
    /// 任务创建
    Created {
        task_id: String,
        name: String,
        total_bytes: u64,
        destination_label: String,
    },
    /// 进度更新
    Progress {
        task_id: String,
        transferred_bytes: u64,
        total_bytes: u64,
        progress: f64,
        rate: String,
        time_remaining: String,
    },
    /// 状态变更
    StatusChanged {
        task_id: String,
        old_status: TransferStatus,
        new_status: TransferStatus,
    },
    /// 上传完成
    Completed {
        task_id: String,
        item_id: String,
        completed_at: i64,
    },
    /// 上传失败
    Failed { task_id: String, error: String },
    /// 已暂停
    Paused { task_id: String },
    /// 已恢复（从头重新上传）
    Resumed { task_id: String },
    /// 已取消
    Canceled { task_id: String },
    /// 记录已移除
    Removed { task_id: String },
}

impl TransferEvent {
    /// 获取任务 ID
    pub fn task_id(&self) -> &str {
        match self {
            TransferEvent::Created { task_id, .. }
            | TransferEvent::Progress { task_id, .. }
            | TransferEvent::StatusChanged { task_id, .. }
            | TransferEvent::Completed { task_id, .. }
            | TransferEvent::Failed { task_id, .. }
            | TransferEvent::Paused { task_id }
            | TransferEvent::Resumed { task_id }
            | TransferEvent::Canceled { task_id }
            | TransferEvent::Removed { task_id } => task_id,
        }
    }
}

/// 数据变更来源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ChangeSource {
    /// 单个上传进入完成或失败状态
    Transfer {
        task_id: String,
        status: TransferStatus,
    },
    /// 一次批量操作结束（至少一项成功）
    Batch { operation: String, affected: usize },
}

/// 数据变更通知
///
/// 视图层收到后重新拉取数据，`version` 单调递增
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotice {
    pub version: u64,
    pub changed_at: i64,
    #[serde(flatten)]
    pub source: ChangeSource,
}

/// 统一应用事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", content = "event")]
pub enum AppEvent {
    /// 上传事件
    #[serde(rename = "transfer")]
    Transfer(TransferEvent),
    /// 数据变更通知
    #[serde(rename = "data_changed")]
    DataChanged(ChangeNotice),
}

impl AppEvent {
    /// 取出上传事件
    pub fn as_transfer(&self) -> Option<&TransferEvent> {
        match self {
            AppEvent::Transfer(e) => Some(e),
            AppEvent::DataChanged(_) => None,
        }
    }

    /// 取出数据变更通知
    pub fn as_data_changed(&self) -> Option<&ChangeNotice> {
        match self {
            AppEvent::DataChanged(n) => Some(n),
            AppEvent::Transfer(_) => None,
        }
    }
}
