//! LLM Data Core entry point
//!
//! # Usage
//!
//! ```bash
//! # Run the HTTP server
//! data-core --config data-core.yaml serve --port 8080
//!
//! # Persist one request in a fresh session
//! data-core persist --file request.json
//!
//! # Read back what a session persisted
//! data-core query-context --entity-id entity-1
//! data-core lookup-artifact --artifact-id entity-1
//! data-core get-data --key sim:sim-1:entity-1
//!
//! # Validate a serialized execution graph
//! data-core validate-graph --file graph.json
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Internal or infrastructure error
//! - 2: Invalid input or configuration
//! - 3: Simulation invalidated (a subsystem rejected the request)
//! - 4: Execution graph invalid

use clap::Parser;
use data_core::cli::init_tracing;
use data_core::{run_cli, DataCoreCli};

#[tokio::main]
async fn main() {
    let cli = DataCoreCli::parse();
    init_tracing(cli.log_format);

    let exit_code = run_cli(cli).await;
    std::process::exit(exit_code.into());
}
