#![cfg_attr(
    all(not(debug_assertions), target_os = "windows"),
    windows_subsystem = "windows"
)]

mod commands;
mod state;

use matrix_lab::{BackendConfig, BackendSupervisor, ExitDecision, ExitGuard, HealthPoller};
use state::AppState;
use tauri::{Manager, RunEvent, Window};
use tokio::sync::broadcast::error::RecvError;

/// 把状态变化和后端输出推送给前端
fn forward_backend_events(supervisor: &BackendSupervisor, window: Window) {
    let mut status_rx = supervisor.subscribe_status();
    let status_window = window.clone();
    tauri::async_runtime::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().clone();
            let _ = status_window.emit("backend_status", &status);
        }
    });

    let mut log_rx = supervisor.subscribe_logs();
    tauri::async_runtime::spawn(async move {
        loop {
            match log_rx.recv().await {
                Ok(message) => {
                    let _ = window.emit("backend_log", &message);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("[Backend] 日志推送落后，丢弃 {} 条", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn main() {
    matrix_lab::logging::init();

    let config = BackendConfig::load().unwrap_or_else(|e| {
        tracing::warn!("[Config] {}，使用默认配置", e);
        BackendConfig::default()
    });

    let supervisor = match BackendSupervisor::new(config) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            tracing::error!("[Backend] 初始化失败: {}", e);
            std::process::exit(1);
        }
    };
    let exit_guard = ExitGuard::new(supervisor.clone());

    let app = tauri::Builder::default()
        .setup(move |app| {
            let window = app.get_window("main").ok_or("找不到主窗口")?;

            forward_backend_events(&supervisor, window.clone());

            let health_client = supervisor.health().clone();
            let interval = supervisor.config().health_interval();
            let health_poller = tauri::async_runtime::block_on(async move {
                HealthPoller::spawn(health_client, interval, move |report| {
                    let _ = window.emit("backend_health", &report);
                })
            });

            app.manage(AppState::new(supervisor.clone(), health_poller));

            // 启动时在后台拉起后端
            let starter = supervisor.clone();
            tauri::async_runtime::spawn(async move {
                if let Err(e) = starter.start().await {
                    tracing::error!("[Backend] 启动失败: {}", e);
                }
            });

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::get_backend_status,
            commands::restart_backend,
            commands::check_backend_health,
            commands::get_backend_process,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(move |app_handle, event| {
        if let RunEvent::ExitRequested { api, .. } = event {
            match exit_guard.on_exit_requested() {
                ExitDecision::Proceed => {
                    if let Some(state) = app_handle.try_state::<AppState>() {
                        state.health_poller.cancel();
                    }
                }
                ExitDecision::Wait => api.prevent_exit(),
                ExitDecision::Drain => {
                    api.prevent_exit();
                    if let Some(state) = app_handle.try_state::<AppState>() {
                        state.health_poller.cancel();
                    }

                    let guard = exit_guard.clone();
                    let app_handle = app_handle.clone();
                    tauri::async_runtime::spawn(async move {
                        guard.drain().await;
                        app_handle.exit(0);
                    });
                }
            }
        }
    });
}
