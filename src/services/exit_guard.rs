use crate::services::BackendSupervisor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    /// 没有后端进程，允许退出
    Proceed,
    /// 调用方必须阻止本次退出，执行 `drain` 后再退出
    Drain,
    /// 正在停止后端，继续阻止退出
    Wait,
}

/// 应用退出协调：只要还持有后端进程或有未完成的重启，就先停止后端再退出
#[derive(Clone)]
pub struct ExitGuard {
    supervisor: BackendSupervisor,
    draining: Arc<AtomicBool>,
}

impl ExitGuard {
    pub fn new(supervisor: BackendSupervisor) -> Self {
        Self {
            supervisor,
            draining: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn on_exit_requested(&self) -> ExitDecision {
        if self.draining.load(Ordering::SeqCst) {
            return ExitDecision::Wait;
        }

        // 排空之后重启任务无法再拉起进程
        let restart_pending =
            self.supervisor.restart_pending() && !self.supervisor.is_shutting_down();
        if !self.supervisor.owns_process() && !restart_pending {
            return ExitDecision::Proceed;
        }

        if self.draining.swap(true, Ordering::SeqCst) {
            ExitDecision::Wait
        } else {
            tracing::info!("[Backend] 应用退出前先停止后端");
            ExitDecision::Drain
        }
    }

    pub async fn drain(&self) {
        self.supervisor.begin_shutdown();
        self.supervisor.stop().await;
        self.draining.store(false, Ordering::SeqCst);
    }
}
