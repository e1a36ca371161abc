// FMS 客户端核心库
// 上传生命周期管理与批量变更协调

// 配置管理模块
pub mod config;

// 日志模块
pub mod logging;

// 事件模块（上传事件、数据变更通知）
pub mod events;

// 外部数据访问接口
pub mod backend;

// 上传模块
pub mod uploader;

// 批量操作模块
pub mod batch;

// 导出常用类型
pub use backend::{
    BackendError, Destination, FilePayload, ItemMutator, MemoryBackend, StorageBackend,
    StoredItem,
};
pub use batch::{
    BatchCoordinator, BatchError, BatchItemError, BatchOperation, BatchOutcome, BatchResult,
};
pub use config::{AppConfig, BatchConfig, LogConfig, UploadConfig};
pub use events::{AppEvent, ChangeNotice, ChangeSource, EventBus, TransferEvent};
pub use logging::{init_logging, LogGuard};
pub use uploader::{
    ProgressReporter, TransferError, TransferPatch, TransferStatus, TransferStore, UploadManager,
    UploadTask,
};
