use crate::state::AppState;
use matrix_lab::models::{BackendProcessInfo, BackendStatus, HealthReport, RestartAck};
use tauri::State;

#[tauri::command]
pub async fn get_backend_status(state: State<'_, AppState>) -> Result<BackendStatus, String> {
    Ok(state.supervisor.status())
}

#[tauri::command]
pub async fn restart_backend(state: State<'_, AppState>) -> Result<RestartAck, String> {
    Ok(state.supervisor.restart())
}

/// 直接请求后端心跳接口，失败时返回 `connected: false`
#[tauri::command]
pub async fn check_backend_health(state: State<'_, AppState>) -> Result<HealthReport, String> {
    Ok(state.supervisor.health().check().await)
}

#[tauri::command]
pub async fn get_backend_process(
    state: State<'_, AppState>,
) -> Result<Option<BackendProcessInfo>, String> {
    Ok(state.supervisor.process_info().await)
}
