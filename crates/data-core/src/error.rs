//! Error types for LLM Data Core
//!
//! `TerminalFailure` is the fatal outcome of a rejected persistence and is
//! kept apart from every infrastructure error so callers can tell
//! "simulation invalidated" from "something broke".

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::ClientError;
use crate::contracts::Subsystem;

/// One subsystem that rejected a persistence request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsystemFailure {
    pub subsystem: Subsystem,
    pub error: String,
}

/// A persistence request that was not accepted by every subsystem.
///
/// The simulation it belongs to is invalid. Fields are private and the
/// value is only ever built once, so the diagnostics cannot change after
/// it has been raised.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("[INVALID SIMULATION] {message}")]
#[serde(rename_all = "camelCase")]
pub struct TerminalFailure {
    simulation_id: String,
    operation_id: String,
    message: String,
    subsystem_failures: Vec<SubsystemFailure>,
}

impl TerminalFailure {
    pub fn new(
        simulation_id: impl Into<String>,
        operation_id: impl Into<String>,
        message: impl Into<String>,
        subsystem_failures: Vec<SubsystemFailure>,
    ) -> Self {
        Self {
            simulation_id: simulation_id.into(),
            operation_id: operation_id.into(),
            message: message.into(),
            subsystem_failures,
        }
    }

    pub fn simulation_id(&self) -> &str {
        &self.simulation_id
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Rejecting subsystems only; accepting ones never appear here
    pub fn subsystem_failures(&self) -> &[SubsystemFailure] {
        &self.subsystem_failures
    }

    pub fn failed_subsystems(&self) -> Vec<Subsystem> {
        self.subsystem_failures.iter().map(|f| f.subsystem).collect()
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main error type for Data Core operations
#[derive(Error, Debug)]
pub enum DataCoreError {
    /// The simulation was invalidated by a rejected persistence
    #[error(transparent)]
    Terminal(#[from] Box<TerminalFailure>),

    /// Invalid input data or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A subsystem failed a read; reads never invalidate a simulation
    #[error("{subsystem} read failed: {source}")]
    Subsystem {
        subsystem: Subsystem,
        #[source]
        source: ClientError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// File access or I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DataCoreError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        DataCoreError::InvalidInput(msg.into())
    }

    pub fn subsystem(subsystem: Subsystem, source: ClientError) -> Self {
        DataCoreError::Subsystem { subsystem, source }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DataCoreError::Terminal(_))
    }

    pub fn terminal_failure(&self) -> Option<&TerminalFailure> {
        match self {
            DataCoreError::Terminal(failure) => Some(failure.as_ref()),
            _ => None,
        }
    }

    /// Check if this is a user-facing error (vs infrastructure)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            DataCoreError::InvalidInput(_) | DataCoreError::Config(_)
        )
    }
}

impl From<TerminalFailure> for DataCoreError {
    fn from(failure: TerminalFailure) -> Self {
        DataCoreError::Terminal(Box::new(failure))
    }
}

/// Find a `TerminalFailure` anywhere in an error's source chain.
///
/// Works for bare `TerminalFailure`s, `DataCoreError::Terminal` and errors
/// wrapping either (including `anyhow::Error` via `as_ref()`).
pub fn as_terminal_failure<'a>(
    err: &'a (dyn std::error::Error + 'static),
) -> Option<&'a TerminalFailure> {
    let mut current: Option<&'a (dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(failure) = e.downcast_ref::<TerminalFailure>() {
            return Some(failure);
        }
        if let Some(failure) = e
            .downcast_ref::<DataCoreError>()
            .and_then(DataCoreError::terminal_failure)
        {
            return Some(failure);
        }
        current = e.source();
    }
    None
}

/// Result type alias for Data Core operations
pub type Result<T> = std::result::Result<T, DataCoreError>;
