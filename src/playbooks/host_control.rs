//! Host-control backend (§4.8): the platform-specific half of the action registry,
//! abstracted behind a trait so the executor and action logic never branch on OS.
//!
//! Windows is the primary backend (`netsh advfirewall`/`taskkill`); Linux
//! (`iptables`/`kill`) is implemented to the same contract so the test suite can run on a
//! Linux CI host. `DryRunHostControl` backs `execution.mode = "dry_run"` and tests that
//! don't want to touch the host at all.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::process::Command;

#[async_trait]
pub trait HostControl: Send + Sync {
    async fn isolate_host(&self) -> Result<()>;
    async fn restore_host(&self) -> Result<()>;
    /// Returns `true` if a live process was killed, `false` if it was already gone
    /// (§4.8: "Process not found" is idempotent success, not an error).
    async fn kill_process(&self, pid: i64) -> Result<bool>;
    async fn block_ip(&self, ip: &str) -> Result<()>;
    async fn unblock_ip(&self, ip: &str) -> Result<()>;
}

async fn run(program: &str, args: &[&str]) -> Result<std::process::Output> {
    Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| AppError::ActionFailed(format!("failed to spawn {program}: {e}")))
}

fn stderr_lossy(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

pub struct WindowsHostControl;

const ISOLATE_IN: &str = "edr-isolate-in";
const ISOLATE_OUT: &str = "edr-isolate-out";

#[async_trait]
impl HostControl for WindowsHostControl {
    async fn isolate_host(&self) -> Result<()> {
        self.restore_host().await.ok();
        for (name, dir) in [(ISOLATE_IN, "in"), (ISOLATE_OUT, "out")] {
            let rule = format!("name={name}");
            let dir_arg = format!("dir={dir}");
            let output = run(
                "netsh",
                &["advfirewall", "firewall", "add", "rule", &rule, &dir_arg, "action=block", "enable=yes"],
            )
            .await?;
            if !output.status.success() {
                return Err(AppError::ActionFailed(format!("netsh add rule {name} failed: {}", stderr_lossy(&output))));
            }
        }
        Ok(())
    }

    async fn restore_host(&self) -> Result<()> {
        for name in [ISOLATE_IN, ISOLATE_OUT] {
            let rule = format!("name={name}");
            run("netsh", &["advfirewall", "firewall", "delete", "rule", &rule]).await.ok();
        }
        Ok(())
    }

    async fn kill_process(&self, pid: i64) -> Result<bool> {
        let pid_arg = pid.to_string();
        let output = run("taskkill", &["/PID", &pid_arg, "/F", "/T"]).await?;
        if output.status.success() {
            return Ok(true);
        }
        let stderr = stderr_lossy(&output);
        if stderr.to_lowercase().contains("not found") {
            return Ok(false);
        }
        Err(AppError::ActionFailed(format!("taskkill PID {pid} failed: {stderr}")))
    }

    async fn block_ip(&self, ip: &str) -> Result<()> {
        self.unblock_ip(ip).await.ok();
        for dir in ["in", "out"] {
            let name = format!("name=edr-block-{ip}-{dir}");
            let dir_arg = format!("dir={dir}");
            let remote = format!("remoteip={ip}");
            let output = run(
                "netsh",
                &["advfirewall", "firewall", "add", "rule", &name, &dir_arg, "action=block", &remote],
            )
            .await?;
            if !output.status.success() {
                return Err(AppError::ActionFailed(format!("netsh block {ip} failed: {}", stderr_lossy(&output))));
            }
        }
        Ok(())
    }

    async fn unblock_ip(&self, ip: &str) -> Result<()> {
        for dir in ["in", "out"] {
            let name = format!("name=edr-block-{ip}-{dir}");
            run("netsh", &["advfirewall", "firewall", "delete", "rule", &name]).await.ok();
        }
        Ok(())
    }
}

pub struct LinuxHostControl;

#[async_trait]
impl HostControl for LinuxHostControl {
    async fn isolate_host(&self) -> Result<()> {
        self.restore_host().await.ok();
        for direction in ["INPUT", "OUTPUT"] {
            let output = run("iptables", &["-A", direction, "-j", "DROP"]).await?;
            if !output.status.success() {
                return Err(AppError::ActionFailed(format!("iptables isolate {direction} failed: {}", stderr_lossy(&output))));
            }
        }
        Ok(())
    }

    async fn restore_host(&self) -> Result<()> {
        for direction in ["INPUT", "OUTPUT"] {
            run("iptables", &["-D", direction, "-j", "DROP"]).await.ok();
        }
        Ok(())
    }

    async fn kill_process(&self, pid: i64) -> Result<bool> {
        let pid_arg = pid.to_string();
        let output = run("kill", &["-9", &pid_arg]).await?;
        if output.status.success() {
            return Ok(true);
        }
        let stderr = stderr_lossy(&output);
        if stderr.to_lowercase().contains("no such process") {
            return Ok(false);
        }
        Err(AppError::ActionFailed(format!("kill -9 {pid} failed: {stderr}")))
    }

    async fn block_ip(&self, ip: &str) -> Result<()> {
        self.unblock_ip(ip).await.ok();
        for direction in ["INPUT", "OUTPUT"] {
            let addr_flag = if direction == "INPUT" { "-s" } else { "-d" };
            let output = run("iptables", &["-A", direction, addr_flag, ip, "-j", "DROP"]).await?;
            if !output.status.success() {
                return Err(AppError::ActionFailed(format!("iptables block {ip} failed: {}", stderr_lossy(&output))));
            }
        }
        Ok(())
    }

    async fn unblock_ip(&self, ip: &str) -> Result<()> {
        for direction in ["INPUT", "OUTPUT"] {
            let addr_flag = if direction == "INPUT" { "-s" } else { "-d" };
            run("iptables", &["-D", direction, addr_flag, ip, "-j", "DROP"]).await.ok();
        }
        Ok(())
    }
}

/// Picks the backend for the running OS, or the no-op backend under dry-run mode.
pub fn select_host_control(mode: crate::config::ExecutionMode) -> Arc<dyn HostControl> {
    if matches!(mode, crate::config::ExecutionMode::DryRun) {
        return Arc::new(DryRunHostControl);
    }
    if cfg!(target_os = "windows") {
        Arc::new(WindowsHostControl)
    } else {
        Arc::new(LinuxHostControl)
    }
}

/// Used under `execution.mode = dry_run`: records nothing, touches nothing, always succeeds.
pub struct DryRunHostControl;

#[async_trait]
impl HostControl for DryRunHostControl {
    async fn isolate_host(&self) -> Result<()> {
        tracing::info!("dry-run: would isolate host");
        Ok(())
    }

    async fn restore_host(&self) -> Result<()> {
        tracing::info!("dry-run: would restore host");
        Ok(())
    }

    async fn kill_process(&self, pid: i64) -> Result<bool> {
        tracing::info!(pid, "dry-run: would kill process");
        Ok(true)
    }

    async fn block_ip(&self, ip: &str) -> Result<()> {
        tracing::info!(ip, "dry-run: would block ip");
        Ok(())
    }

    async fn unblock_ip(&self, ip: &str) -> Result<()> {
        tracing::info!(ip, "dry-run: would unblock ip");
        Ok(())
    }
}
