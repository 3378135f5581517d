//! Execution engine: the assemble -> execute -> translate pipeline.
//!
//! The engine owns the worker pool and the assembler. Callers hand it a
//! snapshot of a collection's fragments plus an invocation request and get
//! back a value or a fault.

use crate::assembler::ProgramAssembler;
use crate::config::EngineConfig;
use crate::error::{PyDslError, Result};
use crate::executor::{PoolStats, WorkerPool};
use crate::models::CodeFragment;
use crate::translator::translate;
use crate::types::{InvocationRequest, InvocationResult};

#[derive(Debug, Clone)]
pub struct ExecutionEngine {
    pool: WorkerPool,
    assembler: ProgramAssembler,
}

impl ExecutionEngine {
    /// Wrap an already started pool
    pub fn new(pool: WorkerPool, assembler: ProgramAssembler) -> Self {
        Self { pool, assembler }
    }

    /// Start a pool from `config` and build an engine around it
    pub async fn start(config: &EngineConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| PyDslError::config(e.to_string()))?;
        let pool = WorkerPool::start(config.pool_config()).await?;
        Ok(Self::new(
            pool,
            ProgramAssembler::new(config.max_literal_depth),
        ))
    }

    /// Run `request` against `fragments`.
    ///
    /// Faults raised by the program or by a crashed worker come back as
    /// `Ok(InvocationResult::Fault(..))`. `Err` is reserved for requests that
    /// never reached a worker: assembly failures, a closed pool or a worker
    /// that could not be started.
    pub async fn execute(
        &self,
        fragments: &[CodeFragment],
        request: &InvocationRequest,
    ) -> Result<InvocationResult> {
        let program = self.assembler.assemble(fragments, request)?;

        tracing::debug!(
            entry_point = %request.entry_point,
            fragments = fragments.len(),
            args = request.args.len(),
            kwargs = request.kwargs.len(),
            "Executing invocation"
        );

        let outcome = self.pool.submit(&program).await?;
        let result = translate(&request.entry_point, outcome);

        if let InvocationResult::Fault(fault) = &result {
            tracing::debug!(
                entry_point = %fault.entry_point,
                category = %fault.category,
                "Invocation faulted"
            );
        }

        Ok(result)
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn assembler(&self) -> &ProgramAssembler {
        &self.assembler
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Drain in-flight work and stop the workers
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}
