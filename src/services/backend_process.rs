use crate::error::BackendError;
use crate::models::{BackendProcessInfo, BackendState, ExitReason, OutputStream};
use crate::utils::{decode_line, kill_descendants};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, watch};

/// 子进程异步产生的事件，按产生顺序交给监督器处理
#[derive(Debug)]
pub enum ProcessEvent {
    Output { stream: OutputStream, line: String },
    Exited(ExitReason),
}

/// 一个后端进程句柄
///
/// 子进程本身由后台等待任务持有，句柄只保留 pid 和结束通道
pub struct BackendProcess {
    generation: u64,
    pid: Option<u32>,
    state: BackendState,
    interpreter: PathBuf,
    started_at: DateTime<Utc>,
    error_seen: bool,
    kill_tx: Option<oneshot::Sender<()>>,
    exited: watch::Receiver<bool>,
}

impl BackendProcess {
    /// 启动后端进程，并开始转发 stdout/stderr 与退出事件
    pub fn spawn(
        generation: u64,
        interpreter: PathBuf,
        entry_script: &str,
        working_dir: &Path,
        events: mpsc::UnboundedSender<ProcessEvent>,
    ) -> Result<Self, BackendError> {
        let mut command = Command::new(&interpreter);
        command
            .arg(entry_script)
            .current_dir(working_dir)
            .env("PYTHONIOENCODING", "utf-8")
            .env("PYTHONUTF8", "1")
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        tracing::info!("[Backend] 解释器: {}", interpreter.display());
        tracing::info!("[Backend] 工作目录: {}", working_dir.display());

        let mut child = command.spawn().map_err(|source| BackendError::Spawn {
            interpreter: interpreter.clone(),
            source,
        })?;

        let pid = child.id();

        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, OutputStream::Stdout, events.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, OutputStream::Stderr, events.clone());
        }

        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        let (exit_tx, exit_rx) = watch::channel(false);

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                Ok(()) = &mut kill_rx => {
                    if let Err(e) = child.start_kill() {
                        tracing::warn!("[Backend] 发送终止信号失败: {}", e);
                    }
                    child.wait().await
                }
            };

            let reason = match status {
                Ok(status) => exit_reason(status),
                Err(e) => {
                    tracing::warn!("[Backend] 等待进程退出失败: {}", e);
                    ExitReason::Unknown
                }
            };

            exit_tx.send_replace(true);
            let _ = events.send(ProcessEvent::Exited(reason));
        });

        Ok(Self {
            generation,
            pid,
            state: BackendState::Starting,
            interpreter,
            started_at: Utc::now(),
            error_seen: false,
            kill_tx: Some(kill_tx),
            exited: exit_rx,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> BackendState {
        self.state
    }

    pub fn set_state(&mut self, state: BackendState) {
        self.state = state;
    }

    /// 记录出现过错误输出
    pub fn mark_error(&mut self) {
        self.error_seen = true;
    }

    pub fn error_seen(&self) -> bool {
        self.error_seen
    }

    pub fn is_alive(&self) -> bool {
        !*self.exited.borrow()
    }

    pub fn info(&self) -> BackendProcessInfo {
        BackendProcessInfo {
            generation: self.generation,
            pid: self.pid,
            state: self.state,
            interpreter: self.interpreter.clone(),
            started_at: self.started_at,
        }
    }

    /// 强制结束进程（含其后代），等待最多 `timeout` 确认退出
    pub async fn terminate(&mut self, timeout: Duration) -> bool {
        if !self.is_alive() {
            return true;
        }

        if let Some(pid) = self.pid {
            let _ = tokio::task::spawn_blocking(move || kill_descendants(pid)).await;
        }

        if let Some(kill_tx) = self.kill_tx.take() {
            let _ = kill_tx.send(());
        }

        let mut exited = self.exited.clone();
        let confirmed = tokio::time::timeout(timeout, exited.wait_for(|done| *done))
            .await
            .is_ok();
        confirmed && !self.is_alive()
    }
}

fn spawn_reader<R>(reader: R, stream: OutputStream, events: mpsc::UnboundedSender<ProcessEvent>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = decode_line(&buf);
                    if line.trim().is_empty() {
                        continue;
                    }
                    if events.send(ProcessEvent::Output { stream, line }).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("[Backend] 读取进程输出失败: {}", e);
                    break;
                }
            }
        }
    });
}

fn exit_reason(status: ExitStatus) -> ExitReason {
    if let Some(code) = status.code() {
        return ExitReason::Code(code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return ExitReason::Signal(signal);
        }
    }

    ExitReason::Unknown
}
