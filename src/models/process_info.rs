use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// 后端进程生命周期状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendState {
    NotStarted,
    Starting,
    Running,
    FailedToStart,
    Stopping,
    Stopped,
}

impl fmt::Display for BackendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not started",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::FailedToStart => "failed to start",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendProcessInfo {
    pub generation: u64,
    pub pid: Option<u32>,
    pub state: BackendState,
    pub interpreter: PathBuf,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// 推送给前端的一行后端输出
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMessage {
    pub generation: u64,
    pub stream: OutputStream,
    pub message: String,
    pub is_error: bool,
}

/// 子进程退出的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Code(i32),
    Signal(i32),
    Unknown,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "exited with code {}", code),
            Self::Signal(signal) => write!(f, "terminated by signal {}", signal),
            Self::Unknown => f.write_str("exited without an exit code"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_reason_message() {
        assert_eq!(ExitReason::Code(3).to_string(), "exited with code 3");
        assert_eq!(ExitReason::Signal(9).to_string(), "terminated by signal 9");
    }

    #[test]
    fn state_serializes_snake_case() {
        let json = serde_json::to_string(&BackendState::FailedToStart).unwrap();
        assert_eq!(json, "\"failed_to_start\"");
    }
}
