// 批量操作模块

pub mod coordinator;
pub mod types;

pub use coordinator::BatchCoordinator;
pub use types::{BatchError, BatchItemError, BatchOperation, BatchOutcome, BatchResult};
