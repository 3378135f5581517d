//! Invocation request and result types shared by every layer of the engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::value::TransportValue;

/// Request to invoke one callable from a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    /// Name of the callable defined or imported by the fragments
    #[serde(alias = "callable")]
    pub entry_point: String,
    #[serde(default)]
    pub args: Vec<TransportValue>,
    #[serde(default)]
    pub kwargs: BTreeMap<String, TransportValue>,
}

impl InvocationRequest {
    pub fn new(entry_point: impl Into<String>) -> Self {
        Self {
            entry_point: entry_point.into(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<TransportValue>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<TransportValue>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }
}

/// Structured description of a failed invocation
///
/// Carries only the entry point, a category and a message; never a traceback
/// or any part of the assembled program.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Error occurred while executing \"{entry_point}\": {category}: {message}")]
pub struct ExecutionFault {
    pub entry_point: String,
    pub category: String,
    pub message: String,
}

/// Outcome of one invocation; exactly one side is populated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationResult {
    Value(TransportValue),
    Fault(ExecutionFault),
}

impl InvocationResult {
    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    pub fn value(&self) -> Option<&TransportValue> {
        match self {
            Self::Value(value) => Some(value),
            Self::Fault(_) => None,
        }
    }

    pub fn fault(&self) -> Option<&ExecutionFault> {
        match self {
            Self::Value(_) => None,
            Self::Fault(fault) => Some(fault),
        }
    }

    /// Convert into a `Result`, treating the fault as the error side
    pub fn into_result(self) -> Result<TransportValue, ExecutionFault> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Fault(fault) => Err(fault),
        }
    }
}

/// Fault categories produced by the engine itself rather than by user code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum EngineFaultCategory {
    /// The program completed without binding a result
    Internal,
    /// The worker process terminated abnormally
    Infrastructure,
}

impl EngineFaultCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::Infrastructure => "infrastructure",
        }
    }
}
