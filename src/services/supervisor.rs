use crate::error::BackendError;
use crate::models::{BackendProcessInfo, BackendState, BackendStatus, LogMessage, RestartAck};
use crate::services::backend_process::{BackendProcess, ProcessEvent};
use crate::services::{BackendConfig, HealthClient, StatusCell};
use crate::utils::{interpreter_candidates, is_error_output, is_port_available, select_interpreter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex};

const FORCE_KILL_TIMEOUT: Duration = Duration::from_secs(5);
const LOG_CHANNEL_CAPACITY: usize = 256;

/// 后端进程监督器
///
/// 同一时刻最多持有一个后端进程。启动、停止在生命周期锁下串行执行；
/// 子进程的输出和退出事件经由单一的 `apply_event` 写入状态。
#[derive(Clone)]
pub struct BackendSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    config: BackendConfig,
    status: StatusCell,
    slot: Mutex<Slot>,
    lifecycle: Mutex<()>,
    generation: AtomicU64,
    restart_pending: AtomicBool,
    /// 应用退出中，之后不再启动新进程
    shutting_down: AtomicBool,
    health: HealthClient,
    logs: broadcast::Sender<LogMessage>,
}

struct Slot {
    process: Option<BackendProcess>,
    /// 没有活动进程时对外报告的状态
    last_state: BackendState,
}

impl BackendSupervisor {
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let health = HealthClient::new(&config)?;
        let (logs, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);

        tracing::info!(
            "[Backend] 后端地址: {} | 入口: {}",
            config.base_url(),
            config.entry_script
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                status: StatusCell::new(),
                slot: Mutex::new(Slot {
                    process: None,
                    last_state: BackendState::NotStarted,
                }),
                lifecycle: Mutex::new(()),
                generation: AtomicU64::new(0),
                restart_pending: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
                health,
                logs,
            }),
        })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.inner.config
    }

    pub fn health(&self) -> &HealthClient {
        &self.inner.health
    }

    /// 当前状态快照
    pub fn status(&self) -> BackendStatus {
        self.inner.status.snapshot()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<BackendStatus> {
        self.inner.status.subscribe()
    }

    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogMessage> {
        self.inner.logs.subscribe()
    }

    pub async fn state(&self) -> BackendState {
        let slot = self.inner.slot.lock().await;
        slot.process
            .as_ref()
            .map(BackendProcess::state)
            .unwrap_or(slot.last_state)
    }

    pub async fn process_info(&self) -> Option<BackendProcessInfo> {
        self.inner.slot.lock().await.process.as_ref().map(BackendProcess::info)
    }

    pub async fn is_running(&self) -> bool {
        self.inner.slot.lock().await.process.is_some()
    }

    /// 同步检查是否持有进程；锁被占用时视为持有
    pub fn owns_process(&self) -> bool {
        self.inner
            .slot
            .try_lock()
            .map(|slot| slot.process.is_some())
            .unwrap_or(true)
    }

    /// 已接受的重启是否还没有完成
    pub fn restart_pending(&self) -> bool {
        self.inner.restart_pending.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// 进入退出流程：之后的 `start` 和 `restart` 都会被拒绝
    pub fn begin_shutdown(&self) {
        if !self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            tracing::info!("[Backend] 应用正在退出，不再启动后端");
        }
    }

    /// 启动后端，并在宽限期结束后标记为就绪
    ///
    /// 已有活动进程时返回 `AlreadyActive`，不会再启动第二个进程
    pub async fn start(&self) -> Result<(), BackendError> {
        let generation = self.spawn_process().await?;

        tokio::time::sleep(self.inner.config.startup_grace()).await;
        self.promote(generation).await;
        Ok(())
    }

    async fn spawn_process(&self) -> Result<u64, BackendError> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let mut slot = self.inner.slot.lock().await;

        if self.is_shutting_down() {
            return Err(BackendError::ShuttingDown);
        }

        if let Some(process) = slot.process.as_ref() {
            tracing::warn!("[Backend] 后端已在运行 (PID: {:?})，拒绝重复启动", process.pid());
            return Err(BackendError::AlreadyActive(process.state()));
        }

        let config = &self.inner.config;
        let root = config.backend_root();
        let entry = config.entry_script_path();
        if !entry.exists() {
            let err = BackendError::EntryScriptMissing(entry);
            tracing::error!("[Backend] {}", err);
            slot.last_state = BackendState::FailedToStart;
            self.inner.status.set(BackendStatus::failed(err.to_string()));
            return Err(err);
        }

        if !is_port_available(&config.host, config.port) {
            tracing::warn!(
                "[Backend] 端口 {} 已被占用，可能存在残留的后端进程",
                config.port
            );
        }

        let interpreter =
            select_interpreter(&interpreter_candidates(&root, config.interpreter.as_deref()));
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let process = match BackendProcess::spawn(
            generation,
            interpreter,
            &config.entry_script,
            &root,
            events_tx,
        ) {
            Ok(process) => process,
            Err(err) => {
                tracing::error!("[Backend] {}", err);
                slot.last_state = BackendState::FailedToStart;
                self.inner.status.set(BackendStatus::failed(err.to_string()));
                return Err(err);
            }
        };

        tracing::info!("[Backend] 后端进程已启动 (PID: {:?})", process.pid());
        slot.process = Some(process);
        self.inner.status.set(BackendStatus::disconnected());
        self.spawn_event_pump(generation, events_rx);

        Ok(generation)
    }

    fn spawn_event_pump(&self, generation: u64, mut events: mpsc::UnboundedReceiver<ProcessEvent>) {
        let supervisor = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                supervisor.apply_event(generation, event).await;
            }
        });
    }

    /// 宽限期结束：进程仍存活则进入 Running
    async fn promote(&self, generation: u64) {
        let mut slot = self.inner.slot.lock().await;
        let Some(process) = slot
            .process
            .as_mut()
            .filter(|p| p.generation() == generation)
        else {
            return;
        };

        if process.state() != BackendState::Starting || !process.is_alive() {
            return;
        }

        process.set_state(BackendState::Running);
        if process.error_seen() {
            tracing::warn!("[Backend] 启动期间出现错误输出，保持断开状态");
        } else {
            tracing::info!("[Backend] 后端已就绪");
            self.inner.status.set(BackendStatus::connected());
        }
    }

    /// 所有子进程事件在这里串行写入状态
    async fn apply_event(&self, generation: u64, event: ProcessEvent) {
        let mut slot = self.inner.slot.lock().await;
        let is_current = slot
            .process
            .as_ref()
            .is_some_and(|p| p.generation() == generation);

        match event {
            ProcessEvent::Output { stream, line } => {
                let is_error = is_error_output(&line);
                if is_error {
                    tracing::error!(target: "backend", "{}", line);
                } else {
                    tracing::info!(target: "backend", "{}", line);
                }

                let _ = self.inner.logs.send(LogMessage {
                    generation,
                    stream,
                    message: line.clone(),
                    is_error,
                });

                if is_error && is_current {
                    if let Some(process) = slot.process.as_mut() {
                        process.mark_error();
                    }
                    self.inner.status.set(BackendStatus::failed(line));
                }
            }
            ProcessEvent::Exited(reason) => {
                if !is_current {
                    tracing::debug!("[Backend] 已退役进程退出: {}", reason);
                    return;
                }
                tracing::warn!("[Backend] 后端进程退出: {}", reason);
                slot.process = None;
                slot.last_state = BackendState::Stopped;
                self.inner.status.set(BackendStatus::failed(reason.to_string()));
            }
        }
    }

    /// 停止后端：先请求后端自行退出，无法确认时强制结束
    ///
    /// 没有活动进程时直接返回
    pub async fn stop(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;

        {
            let mut slot = self.inner.slot.lock().await;
            match slot.process.as_mut() {
                Some(process) => {
                    tracing::info!("[Backend] 正在停止后端 (PID: {:?})", process.pid());
                    process.set_state(BackendState::Stopping);
                }
                None => {
                    tracing::debug!("[Backend] 没有运行中的后端");
                    return;
                }
            }
        }

        match self.inner.health.request_shutdown().await {
            Ok(()) => {
                tracing::info!("[Backend] 已发送关闭请求，等待后端退出");
                tokio::time::sleep(self.inner.config.shutdown_settle()).await;
            }
            Err(e) => tracing::warn!("[Backend] 优雅关闭失败: {}", e),
        }

        let process = self.inner.slot.lock().await.process.take();
        if let Some(mut process) = process {
            if process.is_alive() {
                tracing::warn!("[Backend] 后端仍在运行，强制结束 (PID: {:?})", process.pid());
                if !process.terminate(FORCE_KILL_TIMEOUT).await {
                    tracing::error!("[Backend] 强制结束后进程仍未退出 (PID: {:?})", process.pid());
                }
            }
        }

        let mut slot = self.inner.slot.lock().await;
        slot.last_state = BackendState::Stopped;
        self.inner.status.set(BackendStatus::disconnected());
        tracing::info!("[Backend] 后端已停止");
    }

    /// 停止后延迟重新启动，立即返回
    ///
    /// 上一次重启尚未完成时返回 `success: false`
    pub fn restart(&self) -> RestartAck {
        if self.is_shutting_down() {
            tracing::warn!("[Backend] 应用正在退出，忽略重启请求");
            return RestartAck { success: false };
        }

        if self.inner.restart_pending.swap(true, Ordering::SeqCst) {
            tracing::warn!("[Backend] 重启正在进行中，忽略本次请求");
            return RestartAck { success: false };
        }

        tracing::info!("[Backend] 正在重启后端");
        let supervisor = self.clone();
        tokio::spawn(async move {
            supervisor.stop().await;
            tokio::time::sleep(supervisor.inner.config.restart_delay()).await;
            match supervisor.start().await {
                Ok(()) => {}
                Err(BackendError::ShuttingDown) => {
                    tracing::info!("[Backend] 应用正在退出，取消重启");
                }
                Err(e) => tracing::error!("[Backend] 重启失败: {}", e),
            }
            supervisor.inner.restart_pending.store(false, Ordering::SeqCst);
        });

        RestartAck { success: true }
    }
}
