use crate::models::BackendStatus;
use std::sync::Arc;
use tokio::sync::watch;

/// 后端状态单元：只有监督器写入，界面侧只读快照
#[derive(Clone)]
pub struct StatusCell {
    tx: Arc<watch::Sender<BackendStatus>>,
}

impl StatusCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BackendStatus::disconnected());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> BackendStatus {
        self.tx.borrow().clone()
    }

    /// 订阅状态变化，用于推送给前端
    pub fn subscribe(&self) -> watch::Receiver<BackendStatus> {
        self.tx.subscribe()
    }

    pub(crate) fn set(&self, status: BackendStatus) {
        debug_assert!(!status.connected || status.error.is_none());
        self.tx.send_replace(status);
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected_without_error() {
        let cell = StatusCell::new();
        assert_eq!(cell.snapshot(), BackendStatus::disconnected());
    }

    #[tokio::test]
    async fn subscribers_see_replacements() {
        let cell = StatusCell::new();
        let mut rx = cell.subscribe();

        cell.set(BackendStatus::failed("exited with code 1"));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().error.as_deref(), Some("exited with code 1"));

        cell.set(BackendStatus::connected());
        assert!(cell.snapshot().connected);
    }
}
