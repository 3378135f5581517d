//! Pool <-> worker wire protocol.
//!
//! Newline-delimited JSON over the worker's stdin and its reserved stdout
//! channel: one request line in, exactly one reply line out.

use serde::{Deserialize, Serialize};

use crate::value::TransportValue;

/// Request line sent to a worker
#[derive(Debug, Serialize)]
pub struct WorkerRequest<'a> {
    pub program: &'a str,
}

impl WorkerRequest<'_> {
    /// Encode as one protocol line, newline included
    pub fn to_line(&self) -> serde_json::Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Reply line received from a worker
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerReply {
    Ok { value: TransportValue },
    Raised { category: String, message: String },
    MissingResult,
}

impl WorkerReply {
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

/// Everything a submission can come back with
///
/// The first three variants are reported by a live worker; `Crashed` is
/// detected by the pool when the worker stops speaking the protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutcome {
    Returned(TransportValue),
    Raised { category: String, message: String },
    MissingResult,
    Crashed { detail: String },
}

impl From<WorkerReply> for WorkerOutcome {
    fn from(reply: WorkerReply) -> Self {
        match reply {
            WorkerReply::Ok { value } => Self::Returned(value),
            WorkerReply::Raised { category, message } => Self::Raised { category, message },
            WorkerReply::MissingResult => Self::MissingResult,
        }
    }
}
