//! PyDSL execution engine
//!
//! Stores Python code fragments in collections and runs a callable defined by
//! them: the fragments are concatenated with a synthesized call statement, the
//! resulting program runs in a pool of isolated interpreter processes, and the
//! outcome comes back as a plain value or a structured fault.

pub mod assembler;
pub mod batch;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod models;
pub mod process_guard;
pub mod service;
pub mod store;
pub mod translator;
pub mod types;
pub mod value;

// Re-export main types for convenience
pub use assembler::{ProgramAssembler, RESULT_BINDING};
pub use config::EngineConfig;
pub use engine::ExecutionEngine;
pub use error::{AssemblyError, PyDslError};
pub use executor::{PoolConfig, PoolStats, WorkerOutcome, WorkerPool};
pub use models::{
    CodeFragment, Collection, CollectionDraft, CollectionId, CollectionUpdate, FragmentId, Page,
};
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use service::CollectionService;
pub use store::{FragmentStore, InMemoryFragmentStore};
pub use translator::translate;
pub use types::{EngineFaultCategory, ExecutionFault, InvocationRequest, InvocationResult};
pub use value::TransportValue;
