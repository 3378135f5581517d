//! Process lifecycle management for worker processes
//!
//! Worker interpreters must never outlive the engine that started them, even
//! when the engine is killed or panics mid-execution.
//!
//! # Solution
//! - Spawn workers in their own process group with a parent-death signal
//! - Track every worker PID in the owning pool's [`ChildRegistry`]
//! - On pool drop or SIGTERM/SIGINT/SIGHUP, send SIGTERM to every group
//! - Groups get a grace period to exit before SIGKILL

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Registry tracking the worker processes of one pool
#[derive(Debug, Default)]
pub struct ChildRegistry {
    /// Set of worker PIDs currently running
    pids: HashSet<u32>,
    /// Whether cleanup has already been initiated (prevent double-cleanup)
    cleanup_initiated: bool,
}

/// Registry handle shared between a pool, its workers and signal handlers
pub type SharedRegistry = Arc<Mutex<ChildRegistry>>;

impl ChildRegistry {
    /// Create an empty registry behind a shared handle
    pub fn shared() -> SharedRegistry {
        Arc::new(Mutex::new(ChildRegistry::default()))
    }

    /// Register a new worker process
    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        tracing::debug!(pid, "Registered worker process");
    }

    /// Unregister a worker process (called once it has been reaped)
    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        tracing::debug!(pid, "Unregistered worker process");
    }

    /// Get count of tracked workers
    pub fn count(&self) -> usize {
        self.pids.len()
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.pids.contains(&pid)
    }

    /// Tracked PIDs in ascending order
    pub fn pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.pids.iter().copied().collect();
        pids.sort_unstable();
        pids
    }

    /// Terminate all tracked worker processes
    /// Sends SIGTERM first, waits up to `grace_period`, then SIGKILL
    pub fn terminate_all(&mut self, grace_period: Duration) {
        if self.cleanup_initiated {
            tracing::debug!("Cleanup already initiated, skipping");
            return;
        }
        self.cleanup_initiated = true;

        if self.pids.is_empty() {
            return;
        }

        tracing::info!("Terminating {} worker process(es)...", self.pids.len());

        // Group signal first so anything the program forked goes too
        let pids_to_kill: Vec<u32> = self.pids.iter().copied().collect();
        for &pid in &pids_to_kill {
            if let Err(e) = send_signal_to_group(pid, Signal::SIGTERM) {
                tracing::warn!("Failed to send SIGTERM to process group {}: {}", pid, e);
                if let Err(e2) = send_signal(pid, Signal::SIGTERM) {
                    tracing::warn!("Failed to send SIGTERM to PID {}: {}", pid, e2);
                }
            }
        }

        let start = Instant::now();
        while start.elapsed() < grace_period {
            if pids_to_kill.iter().all(|&pid| !is_process_alive(pid)) {
                tracing::info!("All worker processes terminated gracefully");
                self.pids.clear();
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        for &pid in &pids_to_kill {
            if is_process_alive(pid) {
                tracing::warn!("Process group {} did not terminate, sending SIGKILL", pid);
                if let Err(e) = send_signal_to_group(pid, Signal::SIGKILL) {
                    tracing::error!("Failed to send SIGKILL to process group {}: {}", pid, e);
                    let _ = send_signal(pid, Signal::SIGKILL);
                }
            }
        }

        self.pids.clear();
        tracing::info!("Worker process cleanup complete");
    }
}

/// Send a signal to a process
fn send_signal(pid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid as i32), signal)
}

/// Send a signal to an entire process group (negative PID)
fn send_signal_to_group(pgid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-(pgid as i32)), signal)
}

/// Check if a process is still alive (not dead or zombie)
pub fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    // Field 3 of /proc/pid/stat is the state; Z and X are not running
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        let fields: Vec<&str> = stat.split_whitespace().collect();
        if fields.len() > 2 {
            return !matches!(fields[2], "Z" | "X");
        }
    }

    true
}

/// RAII guard that terminates all registered workers on drop
pub struct ProcessGuard {
    registry: SharedRegistry,
    grace_period: Duration,
}

impl ProcessGuard {
    pub fn new(registry: SharedRegistry, grace_period: Duration) -> Self {
        Self {
            registry,
            grace_period,
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn register_child(&self, pid: u32) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.register(pid);
        }
    }

    pub fn unregister_child(&self, pid: u32) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.unregister(pid);
        }
    }

    /// Get the number of tracked workers
    pub fn child_count(&self) -> usize {
        self.registry.lock().map(|r| r.count()).unwrap_or(0)
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        tracing::debug!("ProcessGuard dropped, initiating cleanup");
        if let Ok(mut registry) = self.registry.lock() {
            registry.terminate_all(self.grace_period);
        }
    }
}

/// Install handlers for SIGINT, SIGTERM and SIGHUP that terminate every
/// worker in `registry` and exit with `128 + signal`.
/// Call this once at program start.
pub fn init_signal_handlers(registry: SharedRegistry) -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::thread;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            let signal_name = match sig {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                SIGHUP => "SIGHUP",
                _ => "UNKNOWN",
            };

            tracing::info!("Received {} signal, cleaning up...", signal_name);

            if let Ok(mut registry) = registry.lock() {
                registry.terminate_all(Duration::from_secs(3));
            }

            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension trait for commands to set up process groups
pub trait CommandProcessGroup {
    /// Run the command in its own process group and deliver SIGTERM to it
    /// when the spawning thread's process dies
    fn in_new_process_group(&mut self) -> &mut Self;
}

fn isolate_process_group() -> std::io::Result<()> {
    // Leader of a new group, PGID = own PID
    nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0)).map_err(std::io::Error::other)?;

    // SAFETY: prctl with PR_SET_PDEATHSIG only reads its integer arguments
    if unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) } == -1 {
        return Err(std::io::Error::last_os_error());
    }

    Ok(())
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        // SAFETY: the hook only calls async-signal-safe syscalls
        unsafe {
            self.pre_exec(isolate_process_group);
        }
        self
    }
}

impl CommandProcessGroup for tokio::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        // SAFETY: the hook only calls async-signal-safe syscalls
        unsafe {
            self.pre_exec(isolate_process_group);
        }
        self
    }
}
