// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WMS adapter: pulls logical work and reports completion.
//!
//! The WMS is polled, never pushed to. Each assignment names an external
//! work item, a stock, a cell and a logical command; the poll loop picks a
//! shuttle, submits through the scheduler, and stamps the external ID onto
//! the shuttle's state. Completion is observed, not signalled: when a
//! stamped shuttle returns to FREE the integration reports the item done
//! and clears the stamp.

use crate::dispatch::Dispatcher;
use crate::engine::StateEngine;
use crate::scheduler::CommandScheduler;
use crate::util::{retry_async, CircuitBreaker, RetryPolicy};
use crate::WmsConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use sg_core::{Clock, CommandKind, ShuttleCommand, ShuttleStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pause before the next poll after an error.
const ERROR_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Commands the WMS is allowed to originate. Probes (BATTERY, WDH, WLH)
/// and the ack are gateway-internal.
const WMS_COMMANDS: &[CommandKind] = &[
    CommandKind::PalletIn,
    CommandKind::PalletOut,
    CommandKind::Fifo,
    CommandKind::Filo,
    CommandKind::StackIn,
    CommandKind::StackOut,
    CommandKind::Home,
    CommandKind::Count,
    CommandKind::Status,
];

/// Errors from the WMS API.
#[derive(Debug, Error)]
pub enum WmsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WMS returned status {status}: {body}")]
    Api { status: u16, body: String },
}

/// One unit of logical work pulled from the WMS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WmsAssignment {
    #[serde(rename = "externalId")]
    pub external_id: String,
    /// `shipment` or `transfer`.
    #[serde(rename = "documentType")]
    pub document_type: String,
    #[serde(rename = "warehouse")]
    pub stock_name: String,
    #[serde(default, rename = "cell")]
    pub cell_id: Option<String>,
    /// Wire name of the shuttle command (`PALLET_IN`, `FIFO`, …).
    #[serde(rename = "shuttleCommand")]
    pub command: String,
    #[serde(default)]
    pub params: Option<String>,
}

/// Completion callback payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionReport {
    #[serde(rename = "externalId")]
    pub external_id: String,
    #[serde(rename = "documentType")]
    pub document_type: String,
    pub status: String,
}

/// The WMS interaction contract.
#[async_trait]
pub trait WmsApi: Send + Sync {
    async fn fetch_assignments(&self) -> Result<Vec<WmsAssignment>, WmsError>;
    async fn report_completion(&self, report: &CompletionReport) -> Result<(), WmsError>;
}

/// HTTP client against the WMS IncomeApi-style endpoint.
pub struct HttpWmsClient {
    http: reqwest::Client,
    api_url: String,
    username: String,
    password: String,
}

impl HttpWmsClient {
    pub fn new(config: &WmsConfig) -> Result<Self, WmsError> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    async fn fetch_for_document_type(
        &self,
        document_type: &str,
    ) -> Result<Vec<WmsAssignment>, WmsError> {
        let url = format!(
            "{}/exec?action=IncomeApi.getShuttleAssignments&p={document_type}",
            self.api_url
        );
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(WmsError::Api {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        #[derive(Deserialize)]
        struct Envelope {
            #[serde(default)]
            assignments: Vec<WmsAssignment>,
        }
        let envelope: Envelope = response.json().await?;
        Ok(envelope.assignments)
    }
}

#[async_trait]
impl WmsApi for HttpWmsClient {
    async fn fetch_assignments(&self) -> Result<Vec<WmsAssignment>, WmsError> {
        let mut assignments = self.fetch_for_document_type("shipment").await?;
        assignments.extend(self.fetch_for_document_type("transfer").await?);
        Ok(assignments)
    }

    async fn report_completion(&self, report: &CompletionReport) -> Result<(), WmsError> {
        let url = format!("{}/exec?action=IncomeApi.setCommandStatus", self.api_url);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(report)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(WmsError::Api {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// The poll loop tying the WMS to the scheduler.
pub struct WmsIntegration<C: Clock> {
    api: Arc<dyn WmsApi>,
    dispatcher: Arc<Dispatcher<C>>,
    scheduler: Arc<CommandScheduler<C>>,
    engine: Arc<StateEngine<C>>,
    poll_interval: Duration,
    retry: RetryPolicy,
    circuit: CircuitBreaker,
    /// External IDs already turned into commands; survives across polls so
    /// the WMS re-listing an item does not re-dispatch it.
    processed: Mutex<HashSet<String>>,
}

impl<C: Clock> WmsIntegration<C> {
    pub fn new(
        api: Arc<dyn WmsApi>,
        dispatcher: Arc<Dispatcher<C>>,
        scheduler: Arc<CommandScheduler<C>>,
        engine: Arc<StateEngine<C>>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            api,
            dispatcher,
            scheduler,
            engine,
            poll_interval,
            retry: RetryPolicy::default(),
            circuit: CircuitBreaker::new("wms_api"),
            processed: Mutex::new(HashSet::new()),
        }
    }

    /// Override the backoff policy (tests use millisecond delays).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        info!(interval_secs = self.poll_interval.as_secs(), "WMS poll loop started");
        loop {
            let delay = match self.poll_once().await {
                Ok(dispatched) => {
                    if dispatched > 0 {
                        info!(dispatched, "WMS poll dispatched work");
                    }
                    self.poll_interval
                }
                Err(e) => {
                    warn!(error = %e, "WMS poll failed");
                    ERROR_RETRY_DELAY
                }
            };
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("WMS poll loop stopped");
    }

    /// One poll: fetch assignments, dispatch what can be placed, report
    /// completions. Returns how many commands were submitted.
    pub async fn poll_once(&self) -> Result<usize, WmsError> {
        if let Err(open) = self.circuit.check() {
            warn!(error = %open, "skipping WMS poll");
            return Ok(0);
        }

        let fetched =
            retry_async(&self.retry, "fetch_assignments", || self.api.fetch_assignments()).await;
        let assignments = match fetched {
            Ok(assignments) => {
                self.circuit.record_success();
                assignments
            }
            Err(e) => {
                self.circuit.record_failure();
                return Err(e);
            }
        };

        let mut dispatched = 0;
        for assignment in assignments {
            if self.process_assignment(&assignment).await {
                dispatched += 1;
            }
        }

        self.report_completions().await;
        Ok(dispatched)
    }

    /// Turn one assignment into a submitted command. Returns false when
    /// the item was skipped (already processed, malformed, or no shuttle
    /// available — the latter retries on the next poll).
    async fn process_assignment(&self, assignment: &WmsAssignment) -> bool {
        if self.processed.lock().contains(&assignment.external_id) {
            return false;
        }

        let Ok(kind) = assignment.command.parse::<CommandKind>() else {
            warn!(
                external_id = %assignment.external_id,
                command = %assignment.command,
                "unknown command in assignment"
            );
            return false;
        };
        if !WMS_COMMANDS.contains(&kind) {
            warn!(external_id = %assignment.external_id, command = %kind, "command not placeable from WMS");
            return false;
        }

        let shuttle = self.dispatcher.find_free_shuttle(
            &assignment.stock_name,
            assignment.cell_id.as_deref(),
            Some(kind),
            Some(&assignment.external_id),
        );
        let Some(shuttle) = shuttle else {
            debug!(
                external_id = %assignment.external_id,
                stock = %assignment.stock_name,
                "no shuttle available, will retry next poll"
            );
            return false;
        };

        let mut command = ShuttleCommand::new(kind, shuttle.clone())
            .external_id(assignment.external_id.clone())
            .document_type(assignment.document_type.clone())
            .stock_name(assignment.stock_name.clone());
        if let Some(cell) = &assignment.cell_id {
            command = command.cell_id(cell.clone());
        }
        if let Some(params) = assignment.params.clone().or_else(|| assignment.cell_id.clone()) {
            command = command.params(params);
        }

        match self.scheduler.submit(command).await {
            Ok(id) => {
                info!(external_id = %assignment.external_id, shuttle = %shuttle, id = %id, "assignment submitted");
                self.processed.lock().insert(assignment.external_id.clone());
                true
            }
            Err(e) => {
                warn!(external_id = %assignment.external_id, error = %e, "submission failed, will retry next poll");
                false
            }
        }
    }

    /// Report every stamped shuttle that has come back to FREE, clearing
    /// the stamp on success so the item is reported once.
    async fn report_completions(&self) {
        let mut done = Vec::new();
        for (shuttle, state) in self.engine.states() {
            let state = state.lock();
            if state.status == ShuttleStatus::Free && state.current_command.is_none() {
                if let Some(external_id) = &state.external_id {
                    done.push((
                        shuttle.clone(),
                        CompletionReport {
                            external_id: external_id.clone(),
                            document_type: state
                                .document_type
                                .clone()
                                .unwrap_or_else(|| "shipment".to_string()),
                            status: "completed".to_string(),
                        },
                    ));
                }
            }
        }

        for (shuttle, report) in done {
            match self.api.report_completion(&report).await {
                Ok(()) => {
                    info!(external_id = %report.external_id, shuttle = %shuttle, "completion reported");
                    if let Some(state) = self.engine.state(&shuttle) {
                        state.lock().clear_wms_context();
                    }
                }
                Err(e) => {
                    warn!(external_id = %report.external_id, error = %e, "completion report failed");
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "wms_tests.rs"]
mod tests;
