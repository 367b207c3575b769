use std::process::Command;

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

#[cfg(not(target_os = "windows"))]
fn get_child_pids(pid: u32) -> Vec<u32> {
    let output = Command::new("pgrep")
        .args(["-P", &pid.to_string()])
        .output();

    match output {
        Ok(output) => String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.trim().parse::<u32>().ok())
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// 强制结束 pid 的所有后代进程，不包括 pid 本身
///
/// 后端本身由持有 Child 的任务负责结束并回收
#[cfg(not(target_os = "windows"))]
pub fn kill_descendants(pid: u32) {
    // 深度优先，先处理孙进程
    for child_pid in get_child_pids(pid) {
        kill_descendants(child_pid);
        tracing::debug!("[Backend] 结束子进程 {}", child_pid);
        let _ = Command::new("kill")
            .args(["-9", &child_pid.to_string()])
            .output();
    }
}

#[cfg(target_os = "windows")]
pub fn kill_descendants(pid: u32) {
    // taskkill /T 会连同 pid 本身一起结束
    let mut kill_command = Command::new("taskkill");
    kill_command.args(["/PID", &pid.to_string(), "/T", "/F"]);

    const CREATE_NO_WINDOW: u32 = 0x08000000;
    kill_command.creation_flags(CREATE_NO_WINDOW);

    if let Err(e) = kill_command.output() {
        tracing::warn!("[Backend] taskkill 执行失败: {}", e);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Duration;

    #[test]
    fn kills_grandchildren_but_not_parent() {
        if Command::new("pgrep").arg("-V").output().is_err() {
            return;
        }

        let mut parent = Command::new("/bin/sh")
            .args(["-c", "sleep 30 & wait; sleep 30"])
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        std::thread::sleep(Duration::from_millis(300));

        kill_descendants(parent.id());
        std::thread::sleep(Duration::from_millis(300));

        // 第一个 sleep 已被杀掉，shell 进入第二个 sleep，自身仍然存活
        assert!(parent.try_wait().unwrap().is_none());

        parent.kill().unwrap();
        parent.wait().unwrap();
    }
}
