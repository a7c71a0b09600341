//! LLM Data Core
//!
//! Two-phase persistence gateway for simulation data. A request is only
//! persisted if the context graph, the secure store and the artifact
//! registry all accept it; otherwise the simulation it belongs to is
//! invalidated with a `TerminalFailure`. Accepted requests get best-effort
//! post-validation tasks that never affect the outcome.
//!
//! Every subsystem call a session makes is recorded in its span graph
//! (`data-core-span`), which is validated when the session finalizes.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use data_core::{DataCore, DataCoreConfig, OperationType, PersistenceRequest, SubsystemClients, TaskSupervisor};
//!
//! # async fn example() -> data_core::Result<()> {
//! let config = DataCoreConfig::default();
//! let core = DataCore::new(
//!     SubsystemClients::in_memory(),
//!     &config,
//!     None,
//!     Arc::new(TaskSupervisor::default()),
//! );
//!
//! let request = PersistenceRequest::new("op-1", OperationType::ContextPersist, "sim-1", "entity-1");
//! let result = core.persist(request).await?;
//! let execution = core.execution_result();
//! assert!(result.success && execution.success);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod instrument;
pub mod lineage;
pub mod session;
pub mod tasks;

#[path = "../contracts/mod.rs"]
pub mod contracts;

pub use contracts::*;

pub use cli::{DataCoreCli, ExitCode};
pub use client::{ArtifactRegistry, ClientError, ContextGraph, SecureStore, SubsystemClients};
pub use config::DataCoreConfig;
pub use error::{as_terminal_failure, DataCoreError, Result, SubsystemFailure, TerminalFailure};
pub use gateway::PersistenceGateway;
pub use instrument::{finalize_subsystem_spans, Instrumented};
pub use lineage::LineageFanout;
pub use session::DataCore;
pub use tasks::{PostValidationHook, TaskSupervisor, TracingHook};

/// Service version (from Cargo.toml)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the CLI application and map any escaped error to an exit code
pub async fn run_cli(cli: DataCoreCli) -> ExitCode {
    match cli::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from_error(&e)
        }
    }
}
