// src/process.rs
use log::{debug, error};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::error::{FleetError, Result};

/// The per-server lifecycle script and the literal arguments it accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleScript {
    pub file_name: String,
    pub start_arg: String,
    pub stop_arg: String,
}

impl LifecycleScript {
    pub fn path_in(&self, server_dir: &Path) -> PathBuf {
        server_dir.join(&self.file_name)
    }
}

impl Default for LifecycleScript {
    fn default() -> Self {
        Self {
            file_name: "tmux.sh".to_string(),
            start_arg: "sstart".to_string(),
            stop_arg: "sstop".to_string(),
        }
    }
}

/// Run a lifecycle script with one literal argument and wait at most `limit`
/// for it to exit.
///
/// Exit code 0 is success. A script that outlives `limit` is killed together
/// with its whole process group and reported as a timeout carrying whatever
/// stderr it wrote before the kill. Success only means the launcher ran; it
/// says nothing about whether the server it launched will come up.
///
/// Stderr is read until it closes, so a script that backgrounds the server
/// must redirect that process's stderr or the call will time out.
pub async fn run_script(script: &Path, arg: &str, limit: Duration) -> Result<()> {
    // Own process group, so a timeout can take down everything the script spawned.
    let mut std_cmd = std::process::Command::new(script);
    std_cmd
        .arg(arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .process_group(0);
    if let Some(dir) = script.parent() {
        std_cmd.current_dir(dir);
    }
    let mut cmd = Command::from(std_cmd);
    cmd.kill_on_drop(true);

    debug!("Running {} {}", script.display(), arg);
    let mut child = cmd.spawn().map_err(|e| {
        error!("Failed to spawn {}: {}", script.display(), e);
        FleetError::CommandExecution {
            script: script.to_path_buf(),
            arg: arg.to_string(),
            code: -1,
            stderr: e.to_string(),
        }
    })?;

    let mut stderr_pipe = child.stderr.take();
    let mut stderr = Vec::new();
    let outcome = tokio::time::timeout(limit, async {
        if let Some(pipe) = stderr_pipe.as_mut() {
            pipe.read_to_end(&mut stderr).await?;
        }
        Ok::<_, std::io::Error>(child.wait().await?)
    })
    .await;

    let stderr_text = String::from_utf8_lossy(&stderr).into_owned();
    match outcome {
        Ok(Ok(status)) if status.success() => {
            debug!("{} {} exited cleanly", script.display(), arg);
            Ok(())
        }
        Ok(Ok(status)) => {
            let code = status.code().unwrap_or(-1);
            error!(
                "{} {} failed with exit code {}: {}",
                script.display(),
                arg,
                code,
                stderr_text.trim_end()
            );
            Err(FleetError::CommandExecution {
                script: script.to_path_buf(),
                arg: arg.to_string(),
                code,
                stderr: stderr_text,
            })
        }
        Ok(Err(e)) => {
            error!("Failed waiting on {} {}: {}", script.display(), arg, e);
            Err(FleetError::CommandExecution {
                script: script.to_path_buf(),
                arg: arg.to_string(),
                code: -1,
                stderr: e.to_string(),
            })
        }
        Err(_) => {
            if let Some(pid) = child.id() {
                if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                    debug!("killpg({}) failed: {}", pid, e);
                }
            }
            if let Err(e) = child.kill().await {
                debug!("Failed to reap timed out child: {}", e);
            }
            error!(
                "{} {} timed out after {:?}: {}",
                script.display(),
                arg,
                limit,
                stderr_text.trim_end()
            );
            Err(FleetError::CommandTimeout {
                script: script.to_path_buf(),
                arg: arg.to_string(),
                timeout: limit,
                stderr: stderr_text,
            })
        }
    }
}
