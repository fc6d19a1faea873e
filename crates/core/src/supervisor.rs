//! Process supervisor: lifecycle of exactly one test-runner subprocess per
//! run.
//!
//! The runner is started in its own process group so cancellation can
//! signal the whole tree, not just the immediate child (test runners
//! commonly fork workers). Output chunks flow through an mpsc channel into
//! a single ingestion task that owns the parser, so one run's output is
//! never parsed out of arrival order.

use crate::error::{Error, Result};
use crate::parser::{OutputParser, StreamKind};
use crate::store::RunStore;
use crate::types::{LogKind, RunStatus, ScenarioPatch, ScenarioStatus};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Supervisor configuration
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// How long to wait after SIGTERM before escalating to SIGKILL
    pub grace_period: Duration,
    /// Hard ceiling on waiting for a killed process to be reaped
    pub kill_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            kill_timeout: Duration::from_secs(10),
        }
    }
}

/// The external test-runner invocation for a run
#[derive(Debug, Clone)]
pub struct RunnerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

impl RunnerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// A `sh -c` wrapper, mostly useful in tests and ad-hoc runs
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("/bin/sh").arg("-c").arg(script)
    }
}

#[derive(Clone)]
struct ActiveRun {
    run_id: String,
    pgid: Pid,
    cancelled: Arc<AtomicBool>,
    done: watch::Receiver<bool>,
}

/// Supervises at most one runner subprocess at a time.
///
/// Cloneable handle; all clones share the same active-run slot.
#[derive(Clone)]
pub struct ProcessSupervisor {
    store: RunStore,
    config: SupervisorConfig,
    active: Arc<Mutex<Option<ActiveRun>>>,
}

impl ProcessSupervisor {
    pub fn new(store: RunStore, config: SupervisorConfig) -> Self {
        Self {
            store,
            config,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Start a run: spawn the runner, wire its output into the parser, and
    /// return immediately with the new run id.
    ///
    /// Fails fast with `AlreadyRunning` while a run is active; callers must
    /// cancel first. A spawn failure surfaces as an immediately failed run
    /// with a synthetic log entry.
    pub async fn spawn(&self, command: RunnerCommand) -> Result<String> {
        let run_id = self.store.start_run()?;

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }
        // New session => new process group, so the whole runner tree can be
        // signalled as one unit on cancel.
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid().map_err(std::io::Error::from)?;
                Ok(())
            });
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let msg = format!("failed to spawn {}: {}", command.program, e);
                warn!("{}", msg);
                self.store.append_log(LogKind::Error, &msg);
                self.store.finish_run(RunStatus::Failed, None);
                return Err(Error::SpawnFailure(msg));
            }
        };

        let pid = child
            .id()
            .ok_or_else(|| Error::Internal("spawned child has no pid".into()))?;
        let pgid = Pid::from_raw(pid as i32);
        info!(run_id = %run_id, pid, program = %command.program, "runner spawned");

        let (chunk_tx, chunk_rx) = mpsc::channel::<(StreamKind, Vec<u8>)>(256);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump(stdout, StreamKind::Stdout, chunk_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump(stderr, StreamKind::Stderr, chunk_tx));
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = watch::channel(false);
        *self.active.lock() = Some(ActiveRun {
            run_id: run_id.clone(),
            pgid,
            cancelled: cancelled.clone(),
            done: done_rx,
        });

        let store = self.store.clone();
        let active = self.active.clone();
        let monitor_run_id = run_id.clone();
        tokio::spawn(async move {
            monitor(store, child, chunk_rx, cancelled).await;
            // Only vacate the slot if it still belongs to this run; a new
            // run may have claimed it between finish and here.
            let mut slot = active.lock();
            if slot.as_ref().map(|a| a.run_id == monitor_run_id).unwrap_or(false) {
                *slot = None;
            }
            drop(slot);
            let _ = done_tx.send(true);
        });

        Ok(run_id)
    }

    /// Cancel the active run.
    ///
    /// Idempotent: cancelling when nothing is running (or the run already
    /// finished) is a no-op. Returns only once the subprocess tree is dead
    /// and the run has its terminal status, so a subsequent start cannot
    /// race with orphaned output.
    pub async fn cancel(&self) -> Result<()> {
        let Some(active) = self.active.lock().clone() else {
            return Ok(());
        };
        if *active.done.borrow() {
            return Ok(());
        }

        info!(run_id = %active.run_id, "cancelling run");
        active.cancelled.store(true, Ordering::SeqCst);
        // ESRCH just means the group already exited
        let _ = killpg(active.pgid, Signal::SIGTERM);

        let mut done = active.done.clone();
        if timeout(self.config.grace_period, done.wait_for(|d| *d))
            .await
            .is_err()
        {
            warn!(run_id = %active.run_id, "grace period elapsed; sending SIGKILL");
            let _ = killpg(active.pgid, Signal::SIGKILL);
            if timeout(self.config.kill_timeout, done.wait_for(|d| *d))
                .await
                .is_err()
            {
                return Err(Error::Timeout {
                    seconds: self.config.kill_timeout.as_secs(),
                });
            }
        }
        Ok(())
    }

    /// Whether a runner subprocess is currently active
    pub fn is_active(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .map(|a| !*a.done.borrow())
            .unwrap_or(false)
    }
}

/// Read one subprocess stream into the ingestion channel, chunk by chunk
async fn pump(
    mut reader: impl AsyncReadExt + Unpin,
    stream: StreamKind,
    tx: mpsc::Sender<(StreamKind, Vec<u8>)>,
) {
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send((stream, buf[..n].to_vec())).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(?stream, error = %e, "runner stream read error");
                break;
            }
        }
    }
}

/// Drain the ingestion channel in arrival order, then reconcile and finish
/// the run once the subprocess has exited.
async fn monitor(
    store: RunStore,
    mut child: tokio::process::Child,
    mut chunk_rx: mpsc::Receiver<(StreamKind, Vec<u8>)>,
    cancelled: Arc<AtomicBool>,
) {
    let mut parser = OutputParser::new(store.clone());

    while let Some((stream, chunk)) = chunk_rx.recv().await {
        parser.feed(stream, &chunk);
    }
    parser.finish();

    let exit_code = match child.wait().await {
        Ok(status) => status.code(),
        Err(e) => {
            warn!(error = %e, "failed to await runner exit");
            None
        }
    };

    if cancelled.load(Ordering::SeqCst) {
        let run = store.finish_run(RunStatus::Cancelled, exit_code);
        info!(status = %run.status, "run cancelled");
        return;
    }

    // Scenarios the runner started but never resolved: the process is gone,
    // so they can only be failures now.
    let leftover = store.running_scenarios();
    for id in &leftover {
        store.update_scenario(
            id,
            ScenarioPatch::status(ScenarioStatus::Failed).with_error(format!(
                "process exited unexpectedly (exit code {}) before reporting a result",
                exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
            )),
        );
    }
    if !leftover.is_empty() {
        store.append_log(
            LogKind::Info,
            format!(
                "runner exited with {} scenario(s) still running",
                leftover.len()
            ),
        );
    }

    let counts = store.run().counts;
    let failed = exit_code != Some(0) || !leftover.is_empty() || counts.failed > 0;
    let status = if failed {
        RunStatus::Failed
    } else {
        RunStatus::Completed
    };
    let run = store.finish_run(status, exit_code);
    info!(
        status = %run.status,
        exit_code = ?exit_code,
        passed = counts.passed,
        failed = counts.failed,
        skipped = counts.skipped,
        "run finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SupervisorConfig::default();
        assert_eq!(config.grace_period, Duration::from_secs(5));
    }

    #[test]
    fn test_shell_command_builder() {
        let cmd = RunnerCommand::shell("echo hi");
        assert_eq!(cmd.program, "/bin/sh");
        assert_eq!(cmd.args, vec!["-c".to_string(), "echo hi".to_string()]);
    }
}
