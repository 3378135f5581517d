//! A single worker: one long-lived interpreter process running the bootstrap
//! loop, driven over its stdin/stdout.

use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use super::pool::PoolConfig;
use super::protocol::{WorkerOutcome, WorkerReply, WorkerRequest};
use crate::process_guard::{CommandProcessGroup, SharedRegistry};

/// Python side of the protocol, passed to the interpreter with `-c`
pub const BOOTSTRAP: &str = include_str!("bootstrap.py");

/// How long to wait for an exit status after the worker closed its channel
const REAP_TIMEOUT: Duration = Duration::from_secs(1);

/// The worker stopped speaking the protocol; it must be discarded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerFailure {
    pub detail: String,
}

impl From<WorkerFailure> for WorkerOutcome {
    fn from(failure: WorkerFailure) -> Self {
        WorkerOutcome::Crashed {
            detail: failure.detail,
        }
    }
}

pub struct Worker {
    id: usize,
    pid: u32,
    child: Child,
    stdin: Option<ChildStdin>,
    replies: Lines<BufReader<ChildStdout>>,
    executions: u64,
    registry: SharedRegistry,
}

impl Worker {
    /// Start an interpreter running the bootstrap loop
    pub fn spawn(id: usize, config: &PoolConfig, registry: &SharedRegistry) -> std::io::Result<Self> {
        let mut command = Command::new(&config.interpreter);
        command
            .args(&config.interpreter_args)
            .arg("-c")
            .arg(BOOTSTRAP)
            .arg(crate::assembler::RESULT_BINDING)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .in_new_process_group();

        let mut child = command.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| std::io::Error::other("worker exited during spawn"))?;
        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("worker stdout not captured"))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(id, stderr));
        }

        if let Ok(mut guard) = registry.lock() {
            guard.register(pid);
        }
        tracing::debug!(worker = id, pid, "Worker started");

        Ok(Self {
            id,
            pid,
            child,
            stdin,
            replies: BufReader::new(stdout).lines(),
            executions: 0,
            registry: registry.clone(),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn executions(&self) -> u64 {
        self.executions
    }

    /// `false` once the process has exited; an exited process is reaped
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Run one program and wait for its reply.
    ///
    /// `Err` means the worker is unusable (exited, pipe broken, protocol
    /// violated) and must not be returned to the pool.
    pub async fn run(&mut self, program: &str) -> Result<WorkerOutcome, WorkerFailure> {
        self.executions += 1;

        let line = WorkerRequest { program }.to_line().map_err(|e| WorkerFailure {
            detail: format!("could not encode program: {}", e),
        })?;

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(WorkerFailure {
                detail: "worker input already closed".to_string(),
            });
        };
        let delivered = async {
            stdin.write_all(&line).await?;
            stdin.flush().await
        }
        .await;
        if let Err(e) = delivered {
            tracing::debug!(worker = self.id, error = %e, "Failed to deliver program");
            return Err(self.lost().await);
        }

        match self.replies.next_line().await {
            Ok(Some(reply)) => match WorkerReply::parse(&reply) {
                Ok(reply) => Ok(reply.into()),
                Err(e) => Err(WorkerFailure {
                    detail: format!("worker sent a malformed reply: {}", e),
                }),
            },
            Ok(None) => Err(self.lost().await),
            Err(e) => Err(WorkerFailure {
                detail: format!("failed to read worker reply: {}", e),
            }),
        }
    }

    /// Describe a worker whose channel closed
    async fn lost(&mut self) -> WorkerFailure {
        let detail = match tokio::time::timeout(REAP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => describe_exit(status),
            Ok(Err(e)) => format!("worker process state unknown: {}", e),
            Err(_) => {
                let _ = self.child.start_kill();
                "worker closed its channel without exiting".to_string()
            }
        };
        WorkerFailure { detail }
    }

    /// Close the worker's input and wait for it to exit, killing it after
    /// `grace`
    pub async fn terminate(mut self, grace: Duration) {
        drop(self.stdin.take());
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(worker = self.id, pid = self.pid, %status, "Worker exited");
            }
            _ => {
                tracing::warn!(worker = self.id, pid = self.pid, "Worker did not exit, killing");
                let _ = self.child.kill().await;
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // kill_on_drop takes care of a still-running process
        if let Ok(mut registry) = self.registry.lock() {
            registry.unregister(self.pid);
        }
    }
}

fn describe_exit(status: ExitStatus) -> String {
    match (status.code(), status.signal()) {
        (Some(code), _) => format!("worker process exited unexpectedly with status {}", code),
        (None, Some(signal)) => format!("worker process was terminated by signal {}", signal),
        (None, None) => "worker process terminated unexpectedly".to_string(),
    }
}

/// Anything the program prints ends up here.
///
/// Output is drained until EOF whatever its encoding; the worker would hit a
/// broken pipe on its next write if this reader went away.
async fn forward_stderr(worker: usize, stderr: ChildStderr) {
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                tracing::debug!(target: "pydsl::worker", worker, "{}", text.trim_end_matches(['\n', '\r']));
            }
            Err(e) => {
                tracing::warn!(worker, error = %e, "Lost worker output stream");
                break;
            }
        }
    }
}
