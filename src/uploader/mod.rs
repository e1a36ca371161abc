// 上传模块
//
// - store: 上传记录的唯一数据源，集中校验状态转换
// - executor: 单次上传执行，向管理器报告进度与结果
// - estimator: 速度与剩余时间估算
// - manager: 生命周期控制（暂停 / 恢复 / 取消 / 清理）

pub mod error;
pub mod estimator;
pub mod executor;
pub mod manager;
pub mod store;
pub mod task;

pub use error::TransferError;
pub use estimator::{
    estimate_rate, estimate_time_remaining, format_bytes, format_duration, format_speed,
    CALCULATING, ZERO_RATE,
};
pub use executor::{
    ExecutionHandle, ExecutionId, ExecutorEvent, ExecutorEventKind, ProgressReporter,
    TransferExecutor,
};
pub use manager::UploadManager;
pub use store::{StoreError, TransferStore};
pub use task::{TransferPatch, TransferStatus, UploadTask};
