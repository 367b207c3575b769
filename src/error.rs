use crate::models::BackendState;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend entry script {} does not exist", .0.display())]
    EntryScriptMissing(PathBuf),

    #[error("Failed to spawn backend with {}: {source}", .interpreter.display())]
    Spawn {
        interpreter: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Backend process is already {0}")]
    AlreadyActive(BackendState),

    #[error("Backend supervisor is shutting down")]
    ShuttingDown,

    #[error("Backend rejected shutdown request: HTTP {0}")]
    ShutdownRejected(u16),

    #[error("Backend request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("解析配置失败: {0}")]
    Json(#[from] serde_json::Error),

    #[error("无法获取用户主目录")]
    NoHomeDir,
}
