//! Transfer daemon process supervision.
//!
//! Starts the daemon binary with its RPC flags and can kill/respawn it when
//! the RPC endpoint stops answering. When no binary is configured the
//! daemon counts as unavailable and the engine uses the HTTP fallback path.

use crate::config::DaemonConfig;
use crate::Result;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Supervises the external transfer daemon process.
pub struct DaemonSupervisor {
    binary: Option<PathBuf>,
    port: u16,
    secret: String,
    extra_flags: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl DaemonSupervisor {
    /// Supervisor for a daemon binary. Pass `None` on platforms without a
    /// bundled daemon; `available()` then reports false.
    pub fn new(binary: Option<PathBuf>) -> Self {
        Self {
            binary,
            port: DaemonConfig::RPC_PORT,
            secret: DaemonConfig::RPC_SECRET.to_string(),
            extra_flags: Vec::new(),
            child: Mutex::new(None),
        }
    }

    /// Additional command-line flags passed through to the daemon.
    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.extra_flags = flags;
        self
    }

    /// Whether a daemon binary is configured for this host.
    pub fn available(&self) -> bool {
        self.binary.is_some()
    }

    /// Start the daemon if this supervisor has not started it yet.
    pub async fn ensure_started(&self) -> Result<()> {
        let mut child = self.child.lock().await;
        if child.is_none() {
            *child = Some(self.spawn()?);
            tokio::time::sleep(DaemonConfig::RESTART_SETTLE).await;
        }
        Ok(())
    }

    /// Kill the current daemon process and start a fresh one.
    ///
    /// Used during unreachable-recovery; jobs are resubmitted by the caller.
    pub async fn restart(&self) -> Result<()> {
        let mut child = self.child.lock().await;

        if let Some(mut old) = child.take() {
            if let Err(e) = old.kill().await {
                warn!("Could not kill daemon process: {}", e);
            }
            let _ = old.wait().await;
        }

        *child = Some(self.spawn()?);
        drop(child);

        tokio::time::sleep(DaemonConfig::RESTART_SETTLE).await;
        info!("Transfer daemon restarted");
        Ok(())
    }

    /// Stop the daemon process if this supervisor owns one.
    pub async fn stop(&self) {
        let mut child = self.child.lock().await;
        if let Some(mut process) = child.take() {
            let _ = process.kill().await;
            let _ = process.wait().await;
        }
    }

    fn spawn(&self) -> Result<Child> {
        let binary = self.binary.as_ref().ok_or_else(|| {
            crate::CurioError::Config {
                message: "No transfer daemon binary configured for this platform".into(),
            }
        })?;

        let mut command = Command::new(binary);
        command
            .arg("--enable-rpc")
            .arg("--rpc-listen-all")
            .arg(format!("--rpc-listen-port={}", self.port))
            .arg("--rpc-secret")
            .arg(&self.secret)
            .arg("--check-certificate=false")
            .arg("--file-allocation=none")
            .args(&self.extra_flags)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| crate::CurioError::Io {
            message: format!("Failed to start transfer daemon: {}", e),
            path: Some(binary.clone()),
            source: Some(e),
        })?;

        info!("Transfer daemon started (pid {:?})", child.id());
        Ok(child)
    }
}
