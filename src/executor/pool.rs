//! Fixed-size pool of worker processes.
//!
//! Submissions take a permit from a fair semaphore, so anything beyond the
//! pool size waits in FIFO order. A permit is only released after its worker
//! is back on the idle list (or replaced), which keeps every permit holder
//! guaranteed a worker.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Semaphore;

use super::protocol::WorkerOutcome;
use super::worker::Worker;
use crate::error::{PyDslError, Result};
use crate::process_guard::{ChildRegistry, ProcessGuard, SharedRegistry};

/// Upper bound on workers in one pool
pub const MAX_POOL_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Interpreter executable, looked up on PATH when not absolute
    pub interpreter: PathBuf,
    /// Flags placed before the bootstrap
    pub interpreter_args: Vec<String>,
    pub size: usize,
    /// How long a worker gets to exit at shutdown before it is killed
    pub shutdown_grace: Duration,
}

impl PoolConfig {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn with_interpreter_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interpreter_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.size == 0 || self.size > MAX_POOL_SIZE {
            return Err(PyDslError::config(format!(
                "pool size must be between 1 and {}, got {}",
                MAX_POOL_SIZE, self.size
            )));
        }
        if self.interpreter.as_os_str().is_empty() {
            return Err(PyDslError::config("interpreter path is empty"));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("python3"),
            interpreter_args: vec!["-I".to_string(), "-B".to_string()],
            size: num_cpus::get().clamp(1, MAX_POOL_SIZE),
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

/// Point-in-time view of the pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub size: usize,
    pub idle: usize,
    pub running: u64,
    pub peak_running: u64,
    /// Programs handed to a worker
    pub dispatched: u64,
    /// Programs that got a protocol reply
    pub completed: u64,
    pub crashed: u64,
    pub replaced: u64,
}

#[derive(Debug, Default)]
struct Counters {
    running: AtomicU64,
    peak_running: AtomicU64,
    dispatched: AtomicU64,
    completed: AtomicU64,
    crashed: AtomicU64,
    replaced: AtomicU64,
}

/// Counts a submission as running until dropped, including when the
/// submitting future is cancelled mid-execution
struct Running<'a>(&'a Counters);

impl<'a> Running<'a> {
    fn enter(counters: &'a Counters) -> Self {
        counters.dispatched.fetch_add(1, Ordering::Relaxed);
        let now = counters.running.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_running.fetch_max(now, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
    }
}

struct PoolInner {
    // Declared first so worker process groups are signalled while the
    // workers below are still registered
    guard: ProcessGuard,
    config: PoolConfig,
    permits: Semaphore,
    idle: Mutex<Vec<Worker>>,
    next_id: AtomicUsize,
    closed: AtomicBool,
    counters: Counters,
}

impl PoolInner {
    fn spawn_worker(&self) -> Result<Worker> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Worker::spawn(id, &self.config, self.guard.registry()).map_err(|e| {
            PyDslError::worker_spawn(format!(
                "failed to start '{}': {}",
                self.config.interpreter.display(),
                e
            ))
        })
    }

    /// Take an idle worker, starting a fresh one if a slot was lost or the
    /// idle worker has exited since its last reply
    fn checkout(&self) -> Result<Worker> {
        let idle = self.idle.lock().pop();
        let Some(mut worker) = idle else {
            tracing::debug!("No idle worker, starting one");
            return self.spawn_worker();
        };
        if worker.is_alive() {
            return Ok(worker);
        }

        tracing::warn!(
            worker = worker.id(),
            pid = worker.pid(),
            executions = worker.executions(),
            "Idle worker exited, replacing it before dispatch"
        );
        drop(worker);
        let replacement = self.spawn_worker()?;
        self.counters.replaced.fetch_add(1, Ordering::Relaxed);
        Ok(replacement)
    }

    fn checkin(&self, worker: Worker) {
        self.idle.lock().push(worker);
    }

    fn replace(&self, lost: usize) {
        match self.spawn_worker() {
            Ok(worker) => {
                self.counters.replaced.fetch_add(1, Ordering::Relaxed);
                tracing::info!(lost, replacement = worker.id(), "Replaced crashed worker");
                self.checkin(worker);
            }
            Err(e) => {
                // The slot refills on the next checkout
                tracing::warn!(lost, error = %e, "Could not replace crashed worker");
            }
        }
    }
}

/// Handle to a running pool; clones share the same workers.
///
/// Call [`WorkerPool::shutdown`] before dropping the last clone. Dropping a
/// pool that is still open falls back to the process guard, which signals
/// every worker group and then blocks the dropping thread for up to
/// `shutdown_grace` before killing the stragglers.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Start `config.size` workers.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let inner = Arc::new(PoolInner {
            guard: ProcessGuard::new(ChildRegistry::shared(), config.shutdown_grace),
            permits: Semaphore::new(config.size),
            idle: Mutex::new(Vec::with_capacity(config.size)),
            next_id: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            counters: Counters::default(),
            config,
        });

        for _ in 0..inner.config.size {
            let worker = inner.spawn_worker()?;
            inner.checkin(worker);
        }

        tracing::info!(
            size = inner.config.size,
            interpreter = %inner.config.interpreter.display(),
            "Worker pool started"
        );

        Ok(Self { inner })
    }

    pub fn size(&self) -> usize {
        self.inner.config.size
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Registry of live worker PIDs, for signal-driven cleanup
    pub fn registry(&self) -> &SharedRegistry {
        self.inner.guard.registry()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Run `program` on the next free worker.
    ///
    /// Waits in line when every worker is busy. A worker that dies comes back
    /// as [`WorkerOutcome::Crashed`] and is replaced before the slot is
    /// released; only a closed pool or a worker that cannot be started is an
    /// `Err`.
    pub async fn submit(&self, program: &str) -> Result<WorkerOutcome> {
        if self.is_closed() {
            return Err(PyDslError::PoolClosed);
        }
        let inner = &*self.inner;
        let permit = inner
            .permits
            .acquire()
            .await
            .map_err(|_| PyDslError::PoolClosed)?;

        let mut worker = inner.checkout()?;
        let running = Running::enter(&inner.counters);
        tracing::debug!(worker = worker.id(), bytes = program.len(), "Dispatching program");

        let outcome = match worker.run(program).await {
            Ok(outcome) => {
                inner.counters.completed.fetch_add(1, Ordering::Relaxed);
                inner.checkin(worker);
                outcome
            }
            Err(failure) => {
                inner.counters.crashed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    worker = worker.id(),
                    pid = worker.pid(),
                    executions = worker.executions(),
                    detail = %failure.detail,
                    "Worker crashed"
                );
                let lost = worker.id();
                drop(worker);
                inner.replace(lost);
                failure.into()
            }
        };

        drop(running);
        drop(permit);
        Ok(outcome)
    }

    pub fn stats(&self) -> PoolStats {
        let counters = &self.inner.counters;
        PoolStats {
            size: self.inner.config.size,
            idle: self.inner.idle.lock().len(),
            running: counters.running.load(Ordering::SeqCst),
            peak_running: counters.peak_running.load(Ordering::SeqCst),
            dispatched: counters.dispatched.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            crashed: counters.crashed.load(Ordering::Relaxed),
            replaced: counters.replaced.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting work, let queued and in-flight submissions finish, then
    /// stop every worker. Later submissions fail with
    /// [`PyDslError::PoolClosed`].
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Shutting down worker pool");

        let inner = &*self.inner;
        let drained = inner.permits.acquire_many(inner.config.size as u32).await;
        inner.permits.close();

        let workers = std::mem::take(&mut *inner.idle.lock());
        for worker in workers {
            worker.terminate(inner.config.shutdown_grace).await;
        }
        drop(drained);

        tracing::info!(stats = ?self.stats(), "Worker pool stopped");
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}
