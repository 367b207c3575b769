use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 后端连接状态快照，每次更新整体替换
///
/// `connected == true` 时 `error` 必为 `None`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BackendStatus {
    pub connected: bool,
    pub error: Option<String>,
}

impl BackendStatus {
    pub fn connected() -> Self {
        Self {
            connected: true,
            error: None,
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            connected: false,
            error: Some(error.into()),
        }
    }
}

/// 单次心跳检测的结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl HealthReport {
    pub fn healthy(data: Value) -> Self {
        Self {
            connected: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn unreachable(error: impl Into<String>) -> Self {
        Self {
            connected: false,
            error: Some(error.into()),
            data: None,
        }
    }
}

/// 重启请求的应答，不等待新进程就绪
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RestartAck {
    pub success: bool,
}
