//! Shared helpers for the integration tests
//!
//! Tests that need a real interpreter call [`python`] (or one of the `start_*`
//! helpers) and return early when none is installed.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use pydsl::{
    CodeFragment, CollectionId, EngineConfig, ExecutionEngine, PoolConfig, WorkerPool,
};
use tempfile::TempDir;

/// Interpreter used by the tests: `PYDSL_TEST_PYTHON` or `python3`, if it runs
pub fn python() -> Option<PathBuf> {
    let candidate = std::env::var_os("PYDSL_TEST_PYTHON")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("python3"));

    let usable = Command::new(&candidate)
        .args(["-c", "import sys; sys.exit(0 if sys.version_info >= (3, 8) else 1)"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false);

    if !usable {
        eprintln!("skipping: no usable python3 interpreter found");
        return None;
    }
    Some(candidate)
}

pub fn pool_config(python: &Path, size: usize) -> PoolConfig {
    PoolConfig::new(size)
        .with_interpreter(python)
        .with_shutdown_grace(Duration::from_millis(500))
}

pub async fn start_pool(size: usize) -> Option<WorkerPool> {
    let python = python()?;
    Some(
        WorkerPool::start(pool_config(&python, size))
            .await
            .expect("pool should start"),
    )
}

pub async fn start_engine(size: usize) -> Option<ExecutionEngine> {
    let python = python()?;
    let config = EngineConfig {
        interpreter: python,
        pool_size: size,
        shutdown_grace_ms: 500,
        ..EngineConfig::default()
    };
    Some(
        ExecutionEngine::start(&config)
            .await
            .expect("engine should start"),
    )
}

/// Fragments of one throwaway collection, in the given order
pub fn fragments(sources: &[&str]) -> Vec<CodeFragment> {
    let collection = CollectionId::new();
    sources
        .iter()
        .map(|source| CodeFragment::new(collection, *source))
        .collect()
}

/// A worker stand-in: a shell script run as `sh <script> -c <bootstrap> ...`.
///
/// The script is never executed directly, so it does not need to be
/// executable.
pub struct FakeWorker {
    _dir: TempDir,
    script: PathBuf,
}

impl FakeWorker {
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("worker.sh");
        std::fs::write(&script, body).expect("write fake worker");
        Self { _dir: dir, script }
    }

    /// Answers every request with the same line
    pub fn replying(line: &str) -> Self {
        Self::new(&format!(
            "while read -r request; do\n  printf '%s\\n' '{}'\ndone\n",
            line
        ))
    }

    /// Keeps reading requests and never answers until its input closes
    pub fn idle() -> Self {
        Self::new("while read -r request; do :; done\n")
    }

    pub fn pool_config(&self, size: usize) -> PoolConfig {
        PoolConfig::new(size)
            .with_interpreter("/bin/sh")
            .with_interpreter_args([self.script.to_string_lossy().into_owned()])
            .with_shutdown_grace(Duration::from_millis(500))
    }

    pub fn engine_config(&self, size: usize) -> EngineConfig {
        let pool = self.pool_config(size);
        EngineConfig {
            interpreter: pool.interpreter,
            interpreter_args: pool.interpreter_args,
            pool_size: size,
            shutdown_grace_ms: 500,
            ..EngineConfig::default()
        }
    }
}
