use std::path::{Path, PathBuf};

/// 找不到任何候选路径时直接使用的命令名
#[cfg(target_os = "windows")]
pub const FALLBACK_INTERPRETER: &str = "python";
#[cfg(not(target_os = "windows"))]
pub const FALLBACK_INTERPRETER: &str = "python3";

const VENV_DIRS: [&str; 2] = [".venv", "venv"];

/// 按优先级列出解释器候选路径
///
/// 显式指定 > 后端目录下的虚拟环境 > 平台常见安装位置
pub fn interpreter_candidates(backend_root: &Path, explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }

    for venv in VENV_DIRS {
        let venv_root = backend_root.join(venv);
        #[cfg(target_os = "windows")]
        candidates.push(venv_root.join("Scripts").join("python.exe"));
        #[cfg(not(target_os = "windows"))]
        {
            candidates.push(venv_root.join("bin").join("python3"));
            candidates.push(venv_root.join("bin").join("python"));
        }
    }

    candidates.extend(platform_candidates());
    candidates
}

#[cfg(target_os = "windows")]
fn platform_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(local) = std::env::var_os("LOCALAPPDATA") {
        let programs = PathBuf::from(local).join("Programs").join("Python");
        for version in ["Python312", "Python311", "Python310"] {
            paths.push(programs.join(version).join("python.exe"));
        }
    }
    paths
}

#[cfg(not(target_os = "windows"))]
fn platform_candidates() -> Vec<PathBuf> {
    [
        "/opt/homebrew/bin/python3",
        "/usr/local/bin/python3",
        "/usr/bin/python3",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

/// 选出第一个存在的候选路径，否则回退到命令名
pub fn select_interpreter(candidates: &[PathBuf]) -> PathBuf {
    candidates
        .iter()
        .find(|path| path.exists())
        .cloned()
        .unwrap_or_else(|| PathBuf::from(FALLBACK_INTERPRETER))
}
