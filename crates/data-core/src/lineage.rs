//! Lineage record fan-out
//!
//! A lineage record is acknowledged immediately and delivered in the
//! background to the memory graph, the registry and the data vault.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::config::FanoutConfig;
use crate::contracts::{LineageRecordPayload, LineageRecordResult, TaskType, LINEAGE_TARGETS};
use crate::error::{DataCoreError, Result};
use crate::tasks::TaskSupervisor;

/// One delivery: target name, URL and JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub target: &'static str,
    pub url: String,
    pub body: serde_json::Value,
}

/// Routes lineage records to the downstream services
#[derive(Debug, Clone)]
pub struct LineageFanout {
    config: FanoutConfig,
    client: reqwest::Client,
    supervisor: Arc<TaskSupervisor>,
}

impl LineageFanout {
    pub fn new(config: FanoutConfig, supervisor: Arc<TaskSupervisor>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| DataCoreError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            supervisor,
        })
    }

    /// Build the three deliveries for a record, in `LINEAGE_TARGETS` order
    pub fn deliveries(&self, payload: &LineageRecordPayload) -> Vec<Delivery> {
        let timestamp = Utc::now().to_rfc3339();
        let base = |url: &str| url.trim_end_matches('/').to_string();

        vec![
            Delivery {
                target: LINEAGE_TARGETS[0],
                url: format!("{}/prompt-lineage", base(&self.config.memory_graph_url)),
                body: json!({
                    "execution_id": payload.execution_id,
                    "parent_span_id": payload.parent_span_id,
                    "source": payload.source,
                    "layers": payload.layers_executed,
                    "timestamp": timestamp,
                }),
            },
            Delivery {
                target: LINEAGE_TARGETS[1],
                url: format!("{}/api/v1/executions", base(&self.config.registry_url)),
                body: json!({
                    "execution_id": payload.execution_id,
                    "source": payload.source,
                    "checksum": payload.output_hash,
                    "timestamp": timestamp,
                }),
            },
            Delivery {
                target: LINEAGE_TARGETS[2],
                url: format!("{}/metadata", base(&self.config.data_vault_url)),
                body: json!({
                    "execution_id": payload.execution_id,
                    "source": payload.source,
                    "event": payload.event,
                    "timestamp": timestamp,
                }),
            },
        ]
    }

    /// Accept a lineage record and schedule its delivery.
    ///
    /// Returns as soon as the delivery task is scheduled; poll the
    /// supervisor with the returned `task_id` for the outcome.
    pub fn record(&self, payload: LineageRecordPayload) -> Result<LineageRecordResult> {
        if payload.execution_id.trim().is_empty() {
            return Err(DataCoreError::invalid_input("execution_id is required"));
        }
        if payload.source.trim().is_empty() {
            return Err(DataCoreError::invalid_input("source is required"));
        }

        let deliveries = self.deliveries(&payload);
        let client = self.client.clone();
        let execution_id = payload.execution_id.clone();

        let task = self.supervisor.spawn(TaskType::Notify, async move {
            let sends = deliveries.iter().map(|d| post_json(&client, d));
            let outcomes = futures::future::join_all(sends).await;

            let failed: Vec<&str> = deliveries
                .iter()
                .zip(outcomes)
                .filter_map(|(delivery, outcome)| match outcome {
                    Ok(()) => None,
                    Err(error) => {
                        tracing::error!(
                            execution_id = %execution_id,
                            target = delivery.target,
                            error = %error,
                            "Failed to route lineage record"
                        );
                        Some(delivery.target)
                    }
                })
                .collect();

            if failed.is_empty() {
                Ok(())
            } else {
                Err(format!("Failed to route to: {}", failed.join(", ")))
            }
        });

        tracing::info!(
            execution_id = %payload.execution_id,
            source = %payload.source,
            task_id = %task.task_id,
            "Lineage record accepted"
        );

        Ok(LineageRecordResult {
            accepted: true,
            routed_to: LINEAGE_TARGETS.iter().map(|t| t.to_string()).collect(),
            task_id: task.task_id,
        })
    }
}

async fn post_json(client: &reqwest::Client, delivery: &Delivery) -> std::result::Result<(), String> {
    let response = client
        .post(&delivery.url)
        .json(&delivery.body)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    let status = response.status();
    // Read the body so the connection goes back to the pool.
    let text = response.text().await.unwrap_or_default();
    if status.is_success() {
        Ok(())
    } else {
        Err(format!("HTTP {}: {}", status.as_u16(), text))
    }
}
