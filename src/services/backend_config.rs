use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 覆盖后端项目根目录的环境变量
pub const BACKEND_DIR_ENV: &str = "MATRIX_LAB_BACKEND_DIR";

const CONFIG_DIR: &str = ".matrix-lab";
const CONFIG_FILE: &str = "backend.json";
const DEFAULT_BACKEND_DIR: &str = "middleware";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    /// 后端项目根目录，为空时自动查找
    pub project_root: Option<PathBuf>,
    pub entry_script: String,
    /// 显式指定的解释器，优先于虚拟环境
    pub interpreter: Option<PathBuf>,
    pub startup_grace_ms: u64,
    pub shutdown_timeout_ms: u64,
    pub shutdown_settle_ms: u64,
    pub restart_delay_ms: u64,
    pub health_interval_ms: u64,
    pub health_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 11459,
            project_root: None,
            entry_script: "app.py".to_string(),
            interpreter: None,
            startup_grace_ms: 3000,
            shutdown_timeout_ms: 2000,
            shutdown_settle_ms: 1000,
            restart_delay_ms: 500,
            health_interval_ms: 5000,
            health_timeout_ms: 2000,
        }
    }
}

impl BackendConfig {
    /// 配置文件路径: ~/.matrix-lab/backend.json
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let home = dirs_next::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// 加载配置，文件不存在时使用默认值，并应用环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match Self::config_path() {
            Ok(path) => Self::load_from(&path)?,
            Err(ConfigError::NoHomeDir) => {
                tracing::warn!("[Config] 无法获取用户主目录，使用默认配置");
                Self::default()
            }
            Err(e) => return Err(e),
        };

        if let Some(dir) = std::env::var_os(BACKEND_DIR_ENV) {
            config.project_root = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        tracing::info!("[Config] 已加载配置: {}", path.display());
        Ok(config)
    }

    /// 后端项目根目录（工作目录）
    pub fn backend_root(&self) -> PathBuf {
        self.project_root
            .clone()
            .unwrap_or_else(|| discover_backend_root(&self.entry_script))
    }

    pub fn entry_script_path(&self) -> PathBuf {
        self.backend_root().join(&self.entry_script)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url())
    }

    pub fn shutdown_url(&self) -> String {
        format!("{}/shutdown", self.base_url())
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn shutdown_settle(&self) -> Duration {
        Duration::from_millis(self.shutdown_settle_ms)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }
}

/// 查找包含 middleware/<entry_script> 的目录
///
/// 依次检查可执行文件所在目录、当前目录及其最多三层父目录
fn discover_backend_root(entry_script: &str) -> PathBuf {
    let has_entry = |dir: &Path| dir.join(DEFAULT_BACKEND_DIR).join(entry_script).exists();

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
    {
        if has_entry(&exe_dir) {
            return exe_dir.join(DEFAULT_BACKEND_DIR);
        }
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().take(4) {
            if has_entry(dir) {
                return dir.join(DEFAULT_BACKEND_DIR);
            }
        }
        return cwd.join(DEFAULT_BACKEND_DIR);
    }

    PathBuf::from(DEFAULT_BACKEND_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_backend_contract() {
        let config = BackendConfig::default();
        assert_eq!(config.health_url(), "http://127.0.0.1:11459/health");
        assert_eq!(config.shutdown_url(), "http://127.0.0.1:11459/shutdown");
        assert_eq!(config.startup_grace(), Duration::from_secs(3));
        assert_eq!(config.shutdown_settle(), Duration::from_secs(1));
        assert_eq!(config.restart_delay(), Duration::from_millis(500));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BackendConfig::load_from(&dir.path().join("backend.json")).unwrap();
        assert_eq!(config.port, 11459);
        assert_eq!(config.entry_script, "app.py");
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backend.json");
        fs::write(&path, r#"{ "port": 12000, "project_root": "/opt/matrix/middleware" }"#).unwrap();

        let config = BackendConfig::load_from(&path).unwrap();
        assert_eq!(config.port, 12000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(
            config.entry_script_path(),
            PathBuf::from("/opt/matrix/middleware/app.py")
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backend.json");
        fs::write(&path, "{ port: ").unwrap();

        let result = BackendConfig::load_from(&path);
        assert!(matches!(result, Err(ConfigError::Json(_))));
    }
}
