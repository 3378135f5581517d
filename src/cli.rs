use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// PyDSL - run stored Python fragments in isolated worker processes
#[derive(Parser, Debug)]
#[command(name = "pydsl")]
#[command(about = "Assemble Python code fragments and execute them in a worker pool")]
#[command(version)]
pub struct Cli {
    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of worker processes (overrides config and PYDSL_POOL_SIZE)
    #[arg(long, global = true)]
    pub pool_size: Option<usize>,

    /// Python interpreter used by the workers (overrides config and
    /// PYDSL_INTERPRETER)
    #[arg(long, global = true)]
    pub interpreter: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute one entry point defined by a set of fragment files
    Exec {
        /// Fragment source file; repeat to concatenate several in order
        #[arg(short, long = "fragment", required = true)]
        fragments: Vec<PathBuf>,

        /// Name of the callable to invoke
        #[arg(short, long)]
        entry: String,

        /// Positional arguments as a JSON array
        #[arg(short, long, default_value = "[]")]
        args: String,

        /// Keyword arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        kwargs: String,
    },
    /// Load a manifest of fragments and invocations and run them concurrently
    Batch {
        /// Path to the manifest (JSON)
        manifest: PathBuf,
    },
    /// Validate a configuration file
    CheckConfig {
        /// Path to configuration file to validate
        config: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
