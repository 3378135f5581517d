//! Isolated executor: a pool of interpreter processes that run assembled
//! programs and report what happened.
//!
//! Each worker runs a small bootstrap loop (see `bootstrap.py`) that reads one
//! program per line, executes it in a fresh namespace and replies with the
//! bound result or the raised exception. Anything else (the process exiting,
//! a broken pipe, an unparseable reply) is treated as a crash.

pub mod pool;
pub mod protocol;
pub mod worker;

pub use pool::{PoolConfig, PoolStats, WorkerPool};
pub use protocol::WorkerOutcome;
