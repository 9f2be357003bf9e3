//! Subprocess lifecycle for the captive stellar-core child.
//!
//! The runner spawns and tears down the child and hands out its stdout; it
//! never parses records. A captive core still needs a working directory for
//! its config file, downloaded archive files, and bucket state; the runner
//! owns a temporary directory for that and removes it on close.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tracing::debug;

use captive_core_history::first_replayable_ledger;

use crate::error::BackendError;

/// Byte stream carrying the child's framed metadata output.
pub type MetaPipe = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Grace period for reaping the child after the kill signal.
const REAP_TIMEOUT: Duration = Duration::from_secs(10);

/// Process-and-pipe manager for the captive child.
///
/// The production implementation is [`StellarCoreRunner`]; tests substitute
/// in-memory fakes that frame records into a pipe directly.
#[async_trait]
pub trait CoreRunner: Send + Sync {
    /// Spawn the child replaying the inclusive range
    /// `[checkpoint start of from, to]`. Fails if a child is already live.
    async fn run(&mut self, from: u32, to: u32) -> Result<(), BackendError>;

    /// Take ownership of the child's metadata pipe. Returns `None` if no
    /// child is running or the pipe was already taken for this incarnation.
    fn take_meta_pipe(&mut self) -> Option<MetaPipe>;

    /// Terminate and reap the child, releasing the pipe and the working
    /// directory. Idempotent; must not block indefinitely.
    async fn close(&mut self) -> Result<(), BackendError>;
}

/// Runs a real stellar-core executable as the captive child.
pub struct StellarCoreRunner {
    executable_path: PathBuf,
    network_passphrase: String,
    history_urls: Vec<String>,
    child: Option<Child>,
    meta_pipe: Option<MetaPipe>,
    working_dir: Option<tempfile::TempDir>,
}

impl StellarCoreRunner {
    pub fn new(
        executable_path: impl Into<PathBuf>,
        network_passphrase: impl Into<String>,
        history_urls: Vec<String>,
    ) -> Self {
        Self {
            executable_path: executable_path.into(),
            network_passphrase: network_passphrase.into(),
            history_urls,
            child: None,
            meta_pipe: None,
            working_dir: None,
        }
    }

    /// Render the captive config: the network passphrase plus one read-only
    /// archive section per URL. The child never publishes history.
    fn render_config(&self) -> String {
        let mut cfg = String::new();
        cfg.push_str("# Written by captive-core-ledgerbackend; changes are discarded.\n");
        cfg.push_str("HTTP_PORT=0\n");
        cfg.push_str("LOG_FILE_PATH=\"\"\n");
        cfg.push_str(&format!(
            "NETWORK_PASSPHRASE=\"{}\"\n",
            self.network_passphrase
        ));
        for (i, url) in self.history_urls.iter().enumerate() {
            cfg.push_str(&format!(
                "\n[HISTORY.h{i}]\nget=\"curl -sf {url}/{{0}} -o {{1}}\"\n"
            ));
        }
        cfg
    }
}

#[async_trait]
impl CoreRunner for StellarCoreRunner {
    async fn run(&mut self, from: u32, to: u32) -> Result<(), BackendError> {
        if self.child.is_some() {
            return Err(BackendError::Setup("subprocess already running".into()));
        }

        let dir = tempfile::TempDir::with_prefix("captive-core-")
            .map_err(|e| BackendError::Setup(format!("creating working directory: {e}")))?;
        let conf_path = dir.path().join("captive-core.cfg");
        std::fs::write(&conf_path, self.render_config())
            .map_err(|e| BackendError::Setup(format!("writing config: {e}")))?;

        // stellar-core's catchup destination is `<last>/<count>`; it replays
        // from the checkpoint before the implied start ledger.
        let start = first_replayable_ledger(from);
        let count = to.saturating_sub(start).saturating_add(1);
        let range = format!("{to}/{count}");
        debug!(
            exe = %self.executable_path.display(),
            range = %range,
            "starting captive stellar-core"
        );

        let mut child = Command::new(&self.executable_path)
            .arg("--conf")
            .arg(&conf_path)
            .arg("--metadata-output-stream")
            .arg("fd:1")
            .arg("catchup")
            .arg(&range)
            .current_dir(dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BackendError::Setup(format!(
                    "running {}: {e}",
                    self.executable_path.display()
                ))
            })?;

        let stdout = child.stdout.take().ok_or(BackendError::MissingMetaPipe)?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        self.meta_pipe = Some(Box::new(stdout));
        self.child = Some(child);
        self.working_dir = Some(dir);
        Ok(())
    }

    fn take_meta_pipe(&mut self) -> Option<MetaPipe> {
        self.meta_pipe.take()
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                // The child already exited; it still needs reaping below.
                debug!(error = %e, "kill signal not delivered");
            }
            match tokio::time::timeout(REAP_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => debug!(%status, "captive stellar-core exited"),
                Ok(Err(e)) => {
                    return Err(BackendError::Close(format!("reaping subprocess: {e}")))
                }
                Err(_) => {
                    return Err(BackendError::Close(format!(
                        "subprocess did not exit within {}s",
                        REAP_TIMEOUT.as_secs()
                    )))
                }
            }
        }
        self.meta_pipe = None;
        // Dropping the TempDir removes the child's working files.
        self.working_dir = None;
        Ok(())
    }
}

/// Forward the child's stderr to the trace log, line by line. The task ends
/// when the child closes its stderr.
async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "captive_core_ledgerbackend::subprocess", "{line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner_for(exe: &str) -> StellarCoreRunner {
        StellarCoreRunner::new(
            exe,
            "Test SDF Network ; September 2015",
            vec![
                "https://history.stellar.org/prd/core-testnet/core_testnet_001".into(),
                "https://history.stellar.org/prd/core-testnet/core_testnet_002".into(),
            ],
        )
    }

    #[test]
    fn test_render_config() {
        let cfg = runner_for("stellar-core").render_config();
        assert!(cfg.contains("NETWORK_PASSPHRASE=\"Test SDF Network ; September 2015\""));
        assert!(cfg.contains("HTTP_PORT=0"));
        assert!(cfg.contains("[HISTORY.h0]"));
        assert!(cfg.contains("[HISTORY.h1]"));
        assert!(cfg.contains(
            "get=\"curl -sf https://history.stellar.org/prd/core-testnet/core_testnet_001/{0} -o {1}\""
        ));
    }

    #[tokio::test]
    async fn test_run_take_pipe_close_cycle() {
        // `true` ignores its arguments and exits 0: enough to exercise the
        // spawn/pipe/reap plumbing without a real stellar-core.
        let mut runner = runner_for("true");
        runner.run(100, 200).await.unwrap();

        assert!(runner.take_meta_pipe().is_some());
        assert!(runner.take_meta_pipe().is_none());

        runner.close().await.unwrap();
        // close is idempotent.
        runner.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_fails_if_already_running() {
        let mut runner = runner_for("true");
        runner.run(100, 200).await.unwrap();
        let err = runner.run(300, 400).await.unwrap_err();
        assert!(matches!(err, BackendError::Setup(_)));
        runner.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_fails_for_missing_executable() {
        let mut runner = runner_for("/nonexistent/stellar-core");
        let err = runner.run(100, 200).await.unwrap_err();
        assert!(matches!(err, BackendError::Setup(_)));
    }
}
