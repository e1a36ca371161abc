// 外部数据访问接口
//
// 上传执行器与批量协调器只通过这里定义的 trait 与后端交互：
// - StorageBackend: 单文件上传（流式进度）
// - ItemMutator: 单项变更（移动 / 标签 / 收藏 / 删除）
//
// memory 子模块提供进程内实现，用于测试和嵌入场景

pub mod memory;

use crate::batch::BatchOperation;
use crate::uploader::ProgressReporter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use memory::{MemoryBackend, MemoryItem};

/// 后端调用错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// 目标不存在
    #[error("项目不存在: {0}")]
    NotFound(String),
    /// 网络或传输层错误
    #[error("传输失败: {0}")]
    Transport(String),
    /// 服务端拒绝（权限、校验等）
    #[error("请求被拒绝: {0}")]
    Rejected(String),
}

/// 上传目标描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    /// 工作区 ID
    pub workspace_id: String,
    /// 项目 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// 文件夹 ID，None 表示项目根目录
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    /// 展示用名称（如工作区名）
    pub label: String,
}

impl Destination {
    /// 创建工作区根目录目标
    pub fn workspace(workspace_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            project_id: None,
            folder_id: None,
            label: label.into(),
        }
    }

    /// 指定项目
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// 指定文件夹
    pub fn with_folder(mut self, folder_id: impl Into<String>) -> Self {
        self.folder_id = Some(folder_id.into());
        self
    }
}

/// 待上传文件
#[derive(Debug, Clone)]
pub struct FilePayload {
    /// 文件名
    pub name: String,
    /// MIME 类型
    pub content_type: Option<String>,
    /// 文件内容
    pub data: Arc<[u8]>,
}

impl FilePayload {
    pub fn new(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// 文件大小（字节）
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// 是否为图片
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
    }
}

/// 上传成功后的持久化条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredItem {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub destination: Destination,
}

/// 文件存储后端
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// 上传单个文件
    ///
    /// 通过 `progress` 报告已上传字节数，成功时返回持久化条目
    async fn upload_file(
        &self,
        file: &FilePayload,
        destination: &Destination,
        progress: ProgressReporter,
    ) -> Result<StoredItem, BackendError>;
}

/// 单项变更接口
#[async_trait]
pub trait ItemMutator: Send + Sync {
    /// 对单个条目执行一次变更
    async fn mutate_item(
        &self,
        item_id: &str,
        operation: &BatchOperation,
    ) -> Result<(), BackendError>;
}
