//! Matrix Lab 桌面端的后端进程监督
//!
//! 负责启动计算后端、心跳检测，以及退出前的优雅关闭与强制结束。
//! Tauri 外壳在 `desktop` feature 下的 main.rs 中。

pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod utils;

pub use error::{BackendError, ConfigError};
pub use services::{BackendConfig, BackendSupervisor, ExitDecision, ExitGuard, HealthPoller};
