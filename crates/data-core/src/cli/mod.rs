//! CLI module for LLM Data Core
//!
//! Runs the HTTP server, persists a single request from a file, reads back
//! context, artifacts or stored data, or checks a serialized execution graph. Exit codes let scripts tell an invalidated
//! simulation apart from an infrastructure failure.

pub mod commands;

pub use commands::{DataCoreCli, DataCoreCommands, LogFormat, ReadCommand};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::DataCoreConfig;
use crate::error::{as_terminal_failure, DataCoreError, Result};

/// Exit codes for CLI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Infrastructure or internal error
    InternalError = 1,
    /// Invalid input, arguments or configuration
    InvalidInput = 2,
    /// A subsystem rejected the request; the simulation is invalid
    SimulationInvalid = 3,
    /// The execution graph failed validation
    GraphInvalid = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Exit code for an error that escaped a command
    pub fn from_error(err: &DataCoreError) -> Self {
        if as_terminal_failure(err).is_some() {
            ExitCode::SimulationInvalid
        } else if err.is_user_error() {
            ExitCode::InvalidInput
        } else {
            ExitCode::InternalError
        }
    }
}

/// Install the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    if let Err(e) = result {
        eprintln!("Tracing already initialized: {}", e);
    }
}

/// Run the CLI and return the exit code
pub async fn run(cli: DataCoreCli) -> Result<ExitCode> {
    match cli.command {
        DataCoreCommands::ValidateGraph { file } => commands::execute_validate_graph(&file),
        DataCoreCommands::Serve { host, port } => {
            let config = DataCoreConfig::load(cli.config.as_deref())?;
            commands::execute_serve(config, host, port).await
        }
        DataCoreCommands::Persist { file } => {
            let config = DataCoreConfig::load(cli.config.as_deref())?;
            commands::execute_persist(config, &file).await
        }
        DataCoreCommands::QueryContext { entity_id } => {
            read(cli.config.as_deref(), ReadCommand::QueryContext(entity_id)).await
        }
        DataCoreCommands::LookupArtifact { artifact_id } => {
            read(cli.config.as_deref(), ReadCommand::LookupArtifact(artifact_id)).await
        }
        DataCoreCommands::GetData { key } => {
            read(cli.config.as_deref(), ReadCommand::GetData(key)).await
        }
    }
}

async fn read(config: Option<&std::path::Path>, command: ReadCommand) -> Result<ExitCode> {
    let config = DataCoreConfig::load(config)?;
    commands::execute_read(config, command).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TerminalFailure;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(i32::from(ExitCode::Success), 0);
        assert_eq!(i32::from(ExitCode::InternalError), 1);
        assert_eq!(i32::from(ExitCode::InvalidInput), 2);
        assert_eq!(i32::from(ExitCode::SimulationInvalid), 3);
        assert_eq!(i32::from(ExitCode::GraphInvalid), 4);
    }

    #[test]
    fn test_exit_code_from_error() {
        let terminal = DataCoreError::from(TerminalFailure::new("sim", "op", "rejected", vec![]));
        assert_eq!(ExitCode::from_error(&terminal), ExitCode::SimulationInvalid);
        assert_eq!(
            ExitCode::from_error(&DataCoreError::invalid_input("x")),
            ExitCode::InvalidInput
        );
        assert_eq!(
            ExitCode::from_error(&DataCoreError::Internal("x".into())),
            ExitCode::InternalError
        );
    }
}
