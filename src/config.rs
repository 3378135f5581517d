//! Engine configuration: loading, saving and validating the JSON config file.
//!
//! Every field is optional in the file; missing ones take their defaults.
//! Environment variables override file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::assembler::{DEFAULT_MAX_LITERAL_DEPTH, MAX_LITERAL_DEPTH};
use crate::executor::PoolConfig;
use crate::executor::pool::MAX_POOL_SIZE;

/// Overrides `interpreter`
pub const ENV_INTERPRETER: &str = "PYDSL_INTERPRETER";
/// Overrides `pool_size`
pub const ENV_POOL_SIZE: &str = "PYDSL_POOL_SIZE";

/// Deepest literal nesting a config may allow; anything deeper would not
/// survive the interpreter's parser
pub const MAX_LITERAL_DEPTH_LIMIT: usize = MAX_LITERAL_DEPTH;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub interpreter: PathBuf,
    pub interpreter_args: Vec<String>,
    pub pool_size: usize,
    pub max_literal_depth: usize,
    pub shutdown_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let pool = PoolConfig::default();
        Self {
            interpreter: pool.interpreter,
            interpreter_args: pool.interpreter_args,
            pool_size: pool.size,
            max_literal_depth: DEFAULT_MAX_LITERAL_DEPTH,
            shutdown_grace_ms: pool.shutdown_grace.as_millis() as u64,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 || self.pool_size > MAX_POOL_SIZE {
            anyhow::bail!("Pool size must be between 1 and {}", MAX_POOL_SIZE);
        }

        if self.interpreter.as_os_str().is_empty() {
            anyhow::bail!("Interpreter must be specified");
        }

        if self.max_literal_depth == 0 || self.max_literal_depth > MAX_LITERAL_DEPTH_LIMIT {
            anyhow::bail!(
                "Maximum literal depth must be between 1 and {}",
                MAX_LITERAL_DEPTH_LIMIT
            );
        }

        if self.interpreter_args.iter().any(|arg| arg == "-c") {
            anyhow::bail!("Interpreter arguments cannot contain -c");
        }

        Ok(())
    }

    /// Apply `PYDSL_*` environment variables on top of the current values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in
    /// production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(interpreter) = lookup(ENV_INTERPRETER).filter(|v| !v.trim().is_empty()) {
            self.interpreter = PathBuf::from(interpreter);
        }

        if let Some(size) = lookup(ENV_POOL_SIZE) {
            self.pool_size = size
                .trim()
                .parse()
                .with_context(|| format!("{} must be a positive integer, got {:?}", ENV_POOL_SIZE, size))?;
        }

        Ok(())
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Pool settings derived from this configuration
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            interpreter: self.interpreter.clone(),
            interpreter_args: self.interpreter_args.clone(),
            size: self.pool_size,
            shutdown_grace: self.shutdown_grace(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::NamedTempFile;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.interpreter, PathBuf::from("python3"));
        assert_eq!(config.interpreter_args, vec!["-I", "-B"]);
        assert!(config.pool_size >= 1);
        assert_eq!(config.max_literal_depth, 64);
        assert_eq!(config.shutdown_grace_ms, 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_new_equals_default() {
        assert_eq!(EngineConfig::new(), EngineConfig::default());
    }

    #[test]
    fn test_save_and_load_json_config() {
        let mut config = EngineConfig::default();
        config.pool_size = 3;
        config.interpreter = PathBuf::from("/usr/bin/python3");

        let temp_file = NamedTempFile::new().unwrap();
        config.save_to_file(temp_file.path()).unwrap();

        let loaded = EngineConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_partial_file_uses_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), r#"{"pool_size": 2}"#).unwrap();

        let loaded = EngineConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(loaded.pool_size, 2);
        assert_eq!(loaded.interpreter, PathBuf::from("python3"));
        assert_eq!(loaded.max_literal_depth, DEFAULT_MAX_LITERAL_DEPTH);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = EngineConfig::load_from_file("/nonexistent/path/pydsl.json");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_json() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "{ pool_size: ").unwrap();

        let err = EngineConfig::load_from_file(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse configuration JSON"));
    }

    #[test]
    fn test_load_json_wrong_type_fails() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), r#"{"pool_size": "four"}"#).unwrap();

        assert!(EngineConfig::load_from_file(temp_file.path()).is_err());
    }

    #[test]
    fn test_validation_pool_size() {
        let mut config = EngineConfig::default();
        config.pool_size = 0;
        assert!(config.validate().is_err());
        config.pool_size = MAX_POOL_SIZE + 1;
        assert!(config.validate().is_err());
        config.pool_size = MAX_POOL_SIZE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_empty_interpreter() {
        let mut config = EngineConfig::default();
        config.interpreter = PathBuf::new();
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "Interpreter must be specified");
    }

    #[test]
    fn test_validation_literal_depth() {
        let mut config = EngineConfig::default();
        config.max_literal_depth = 0;
        assert!(config.validate().is_err());
        config.max_literal_depth = MAX_LITERAL_DEPTH_LIMIT + 1;
        assert!(config.validate().is_err());
        config.max_literal_depth = 512;
        assert!(config.validate().is_err());
        config.max_literal_depth = MAX_LITERAL_DEPTH_LIMIT;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_command_flag() {
        let mut config = EngineConfig::default();
        config.interpreter_args.push("-c".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_INTERPRETER, "/opt/python/bin/python3.12"),
            (ENV_POOL_SIZE, " 7 "),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.interpreter, PathBuf::from("/opt/python/bin/python3.12"));
        assert_eq!(config.pool_size, 7);
    }

    #[test]
    fn test_override_bad_pool_size() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides(|key| (key == ENV_POOL_SIZE).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_POOL_SIZE));
    }

    #[test]
    fn test_pool_config() {
        let mut config = EngineConfig::default();
        config.pool_size = 2;
        config.shutdown_grace_ms = 250;

        let pool = config.pool_config();
        assert_eq!(pool.size, 2);
        assert_eq!(pool.shutdown_grace, Duration::from_millis(250));
        assert_eq!(pool.interpreter, config.interpreter);
    }
}
