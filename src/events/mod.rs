//! 事件模块
//!
//! - `types.rs`: 上传事件与数据变更通知
//! - `throttle.rs`: 进度事件节流
//! - `bus.rs`: 广播事件总线

mod bus;
mod throttle;
mod types;

pub use bus::*;
pub use throttle::*;
pub use types::*;
