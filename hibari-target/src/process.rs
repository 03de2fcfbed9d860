//! デバッガプロセスの制御

use crate::{LaunchConfig, Result};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

/// デバッガの標準入出力
///
/// 標準エラーは親プロセスに継承されるため含まれません。
pub struct ProcessIo {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
}

/// 起動済みのデバッガプロセス
pub struct DebuggerProcess {
    child: Child,
    pid: Option<u32>,
}

impl DebuggerProcess {
    /// デバッガを起動する
    ///
    /// 標準入出力はパイプで接続され、標準エラーは継承されます。
    /// ハンドルが破棄されるとプロセスは強制終了されます。
    pub fn spawn(config: &LaunchConfig) -> Result<(Self, ProcessIo)> {
        let mut cmd = Command::new(&config.debugger);
        cmd.args(config.command_line())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        if let Some(dir) = &config.current_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &config.envs {
            cmd.env(key, value);
        }

        info!(
            debugger = %config.debugger.display(),
            target = %config.target.display(),
            "Spawning debugger"
        );
        let mut child = cmd.spawn().map_err(|e| {
            anyhow::anyhow!("Failed to spawn '{}': {}", config.debugger.display(), e)
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to capture debugger stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("Failed to capture debugger stdout"))?;

        let pid = child.id();
        debug!(?pid, "Debugger started");

        Ok((Self { child, pid }, ProcessIo { stdin, stdout }))
    }

    /// プロセスIDを取得する（終了済みならNone）
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// プロセスを強制終了する
    pub async fn kill(&mut self) -> Result<()> {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "Failed to kill debugger");
            return Err(e.into());
        }
        self.pid = None;
        Ok(())
    }

    /// プロセスの終了を待つ
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        let status = self.child.wait().await?;
        self.pid = None;
        info!(?status, "Debugger exited");
        Ok(status)
    }
}

/// プロセスIDを指定してSIGINTを送る
///
/// 実行中のデバッグ対象が停止し、`*stopped` が通知されます。
pub fn interrupt(pid: u32) -> Result<()> {
    let pid = i32::try_from(pid)?;
    debug!(pid, "Sending SIGINT to debugger");
    signal::kill(Pid::from_raw(pid), Signal::SIGINT)?;
    Ok(())
}
