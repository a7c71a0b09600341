//! CLI command definitions for LLM Data Core

use clap::{Parser, Subcommand, ValueEnum};
use data_core_span::{validate_execution_graph, ExecutionGraph, ExecutionResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::ExitCode;
use crate::client::SubsystemClients;
use crate::config::DataCoreConfig;
use crate::contracts::{PersistenceRequest, PersistenceResult};
use crate::error::{DataCoreError, Result, TerminalFailure};
use crate::handler::{create_router, AppState};
use crate::session::DataCore;
use crate::tasks::TaskSupervisor;

/// LLM Data Core CLI
#[derive(Parser, Debug)]
#[command(name = "data-core")]
#[command(about = "LLM Data Core - two-phase simulation persistence gateway", long_about = None)]
#[command(version)]
pub struct DataCoreCli {
    /// Configuration file (JSON, YAML or TOML)
    #[arg(short, long, global = true, env = "DATA_CORE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, global = true, default_value = "json")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: DataCoreCommands,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum DataCoreCommands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides the config file)
        #[arg(short, long, env = "PORT")]
        port: Option<u16>,
    },

    /// Persist one request in a fresh session and print the outcome
    Persist {
        /// Path to the persistence request (JSON or YAML)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Print the context history of an entity
    QueryContext {
        /// Entity whose history to read
        #[arg(long)]
        entity_id: String,
    },

    /// Print a registered artifact descriptor
    LookupArtifact {
        #[arg(long)]
        artifact_id: String,
    },

    /// Print the payload stored under a storage key
    GetData {
        /// Storage key (`sim:{simulationId}:{entityId}`)
        #[arg(long)]
        key: String,
    },

    /// Validate a serialized execution graph
    ValidateGraph {
        /// Path to the execution graph (JSON)
        #[arg(short, long)]
        file: PathBuf,
    },
}

/// Output of the `persist` command
#[derive(Debug, Serialize)]
struct PersistOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<PersistenceResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<TerminalFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    execution: ExecutionResult,
}

/// Output of the read commands
#[derive(Debug, Serialize)]
struct ReadOutput<T> {
    /// `null` when nothing is found
    result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    execution: ExecutionResult,
}

/// Which read a command performs
#[derive(Debug, Clone)]
pub enum ReadCommand {
    QueryContext(String),
    LookupArtifact(String),
    GetData(String),
}

/// Read a JSON or YAML document, picking the format from the extension
fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DataCoreError::invalid_input(format!("Cannot read {}: {}", path.display(), e))
    })?;

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        serde_yaml::from_str(&content)
            .map_err(|e| DataCoreError::invalid_input(format!("Invalid YAML: {}", e)))
    } else {
        serde_json::from_str(&content)
            .map_err(|e| DataCoreError::invalid_input(format!("Invalid JSON: {}", e)))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn execute_serve(
    mut config: DataCoreConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<ExitCode> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let addr = config.server.bind_address();
    let state = Arc::new(AppState::from_config(config)?);
    let router = create_router(state.clone());

    tracing::info!(
        address = %addr,
        simulator = state.config.simulator,
        "Starting LLM Data Core"
    );

    let listener = tokio::net::TcpListener::bind(addr.as_str()).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("Waiting for post-validation tasks");
    state.supervisor.drain().await;
    Ok(ExitCode::Success)
}

pub async fn execute_persist(config: DataCoreConfig, file: &Path) -> Result<ExitCode> {
    let request: PersistenceRequest = read_document(file)?;

    let clients = SubsystemClients::from_config(&config)?;
    let supervisor = Arc::new(TaskSupervisor::new(config.max_tracked_tasks));
    let core = DataCore::new(clients, &config, None, supervisor);

    let outcome = core.persist(request).await;
    let execution = core.execution_result();
    core.supervisor().drain().await;

    let graph_valid = execution.success;
    let (output, code) = match outcome {
        Ok(result) => (
            PersistOutput {
                result: Some(result),
                failure: None,
                error: None,
                execution,
            },
            ExitCode::Success,
        ),
        Err(DataCoreError::Terminal(failure)) => (
            PersistOutput {
                result: None,
                error: Some(failure.to_string()),
                failure: Some(*failure),
                execution,
            },
            ExitCode::SimulationInvalid,
        ),
        Err(err) if err.is_user_error() => (
            PersistOutput {
                result: None,
                failure: None,
                error: Some(err.to_string()),
                execution,
            },
            ExitCode::InvalidInput,
        ),
        Err(err) => return Err(err),
    };

    print_json(&output)?;

    if code == ExitCode::Success && !graph_valid {
        return Ok(ExitCode::GraphInvalid);
    }
    Ok(code)
}

pub async fn execute_read(config: DataCoreConfig, read: ReadCommand) -> Result<ExitCode> {
    let clients = SubsystemClients::from_config(&config)?;
    let supervisor = Arc::new(TaskSupervisor::new(config.max_tracked_tasks));
    let core = DataCore::new(clients, &config, None, supervisor);

    match read {
        ReadCommand::QueryContext(entity_id) => {
            let outcome = core.query_context(&entity_id).await.map(Some);
            print_read(outcome, &core)
        }
        ReadCommand::LookupArtifact(artifact_id) => {
            let outcome = core.lookup_artifact(&artifact_id).await;
            print_read(outcome, &core)
        }
        ReadCommand::GetData(key) => {
            let outcome = core.get_data(&key).await;
            print_read(outcome, &core)
        }
    }
}

fn print_read<T: Serialize>(outcome: Result<Option<T>>, core: &DataCore) -> Result<ExitCode> {
    let execution = core.execution_result();
    let graph_valid = execution.success;

    let (output, code) = match outcome {
        Ok(result) => (
            ReadOutput {
                result,
                error: None,
                execution,
            },
            ExitCode::Success,
        ),
        Err(err) if err.is_user_error() => (
            ReadOutput {
                result: None,
                error: Some(err.to_string()),
                execution,
            },
            ExitCode::InvalidInput,
        ),
        Err(err) => return Err(err),
    };

    print_json(&output)?;

    if code == ExitCode::Success && !graph_valid {
        return Ok(ExitCode::GraphInvalid);
    }
    Ok(code)
}

pub fn execute_validate_graph(file: &Path) -> Result<ExitCode> {
    let graph: ExecutionGraph = read_document(file)?;
    let result = validate_execution_graph(&graph);
    print_json(&result)?;

    Ok(if result.valid {
        ExitCode::Success
    } else {
        ExitCode::GraphInvalid
    })
}
