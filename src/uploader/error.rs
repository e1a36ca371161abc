// 上传错误类型

use super::store::StoreError;
use super::task::TransferStatus;

/// 上传生命周期错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// 任务不存在
    #[error("上传任务不存在: {0}")]
    NotFound(String),

    /// 当前状态不支持该操作
    #[error("任务 {id} 当前状态为 {status}，不支持 {action}")]
    InvalidState {
        id: String,
        status: TransferStatus,
        action: &'static str,
    },

    /// 底层上传失败（网络、服务端拒绝），原样保存后端错误信息
    #[error("{0}")]
    Transport(String),

    /// 被暂停或取消中止，不计为失败
    #[error("上传已中止")]
    Canceled,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TransferError {
    /// 是否为取消（而非传输失败）
    pub fn is_canceled(&self) -> bool {
        matches!(self, TransferError::Canceled)
    }
}
