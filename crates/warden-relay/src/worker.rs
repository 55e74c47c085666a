//! In-process outbox consumer.
//!
//! Rows are routed to local handlers by event-name prefix and marked
//! PROCESSED on success. Unrouted rows go to a fallback handler that
//! acknowledges them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use warden_storage::{DeliveryOutcome, OutboxStore};
use warden_types::{OutboxEvent, OutboxStatus};

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::poller::{BatchProcessor, BatchReport};

/// Local side-effect executor for outbox rows.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &OutboxEvent) -> Result<(), RelayError>;
}

/// Acknowledges without doing anything.
#[derive(Clone, Debug, Default)]
pub struct AcknowledgeHandler;

#[async_trait]
impl EventHandler for AcknowledgeHandler {
    async fn handle(&self, event: &OutboxEvent) -> Result<(), RelayError> {
        debug!(event = %event.event_name, id = event.id, "No handler registered; acknowledged");
        Ok(())
    }
}

/// Records `USER:*` events in the audit log.
#[derive(Clone, Debug, Default)]
pub struct AuditLogHandler;

#[async_trait]
impl EventHandler for AuditLogHandler {
    async fn handle(&self, event: &OutboxEvent) -> Result<(), RelayError> {
        let data = &event.payload.data;
        info!(
            event = %event.event_name,
            id = event.id,
            email = data.get("email").and_then(serde_json::Value::as_str).unwrap_or_default(),
            trace_id = %event.payload.meta.trace_id,
            "Audit event"
        );
        Ok(())
    }
}

/// Dispatches `WORKFLOW:*` rows on their `data.action`.
///
/// Rows whose action is missing or has no registered executor are logged
/// and acknowledged.
#[derive(Clone, Default)]
pub struct WorkflowActionHandler {
    actions: HashMap<String, Arc<dyn EventHandler>>,
}

impl WorkflowActionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, action: impl Into<String>, executor: Arc<dyn EventHandler>) -> Self {
        self.actions.insert(action.into(), executor);
        self
    }
}

#[async_trait]
impl EventHandler for WorkflowActionHandler {
    async fn handle(&self, event: &OutboxEvent) -> Result<(), RelayError> {
        let action = event.payload.data.get("action").and_then(Value::as_str);

        match action.and_then(|action| self.actions.get(action)) {
            Some(executor) => {
                info!(action = ?action, entity_id = ?event.entity_id, "Executing workflow action");
                executor.handle(event).await
            }
            None => {
                warn!(action = ?action, entity_id = ?event.entity_id, "Unknown workflow action");
                Ok(())
            }
        }
    }
}

/// Event-name prefix routing table.
#[derive(Clone)]
pub struct HandlerRegistry {
    routes: Vec<(String, Arc<dyn EventHandler>)>,
    fallback: Arc<dyn EventHandler>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            fallback: Arc::new(AcknowledgeHandler),
        }
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `WORKFLOW:` and `USER:` routes with the built-in handlers.
    pub fn with_defaults() -> Self {
        Self::new()
            .route("WORKFLOW:", Arc::new(WorkflowActionHandler::new()))
            .route("USER:", Arc::new(AuditLogHandler))
    }

    /// Route names starting with `prefix`; the longest matching prefix wins.
    pub fn route(mut self, prefix: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        let prefix = prefix.into();
        self.routes.retain(|(existing, _)| *existing != prefix);
        self.routes.push((prefix, handler));
        self.routes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    pub fn with_fallback(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.fallback = handler;
        self
    }

    pub fn resolve(&self, event_name: &str) -> &Arc<dyn EventHandler> {
        self.routes
            .iter()
            .find(|(prefix, _)| event_name.starts_with(prefix.as_str()))
            .map(|(_, handler)| handler)
            .unwrap_or(&self.fallback)
    }
}

/// Executes PENDING rows locally and marks them PROCESSED or FAILED.
pub struct OutboxWorker {
    store: Arc<dyn OutboxStore>,
    registry: HandlerRegistry,
    config: RelayConfig,
}

impl OutboxWorker {
    pub fn new(store: Arc<dyn OutboxStore>, registry: HandlerRegistry, config: RelayConfig) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }
}

#[async_trait]
impl BatchProcessor for OutboxWorker {
    fn name(&self) -> &str {
        "worker"
    }

    async fn process_batch(&self) -> Result<BatchReport, RelayError> {
        let rows = self.store.pending_outbox(self.config.worker_batch_size).await?;
        if rows.is_empty() {
            return Ok(BatchReport::default());
        }

        let mut report = BatchReport {
            fetched: rows.len(),
            ..BatchReport::default()
        };
        let mut outcomes = Vec::with_capacity(rows.len());

        for row in &rows {
            debug!(event = %row.event_name, id = row.id, "Executing event");
            match self.registry.resolve(&row.event_name).handle(row).await {
                Ok(()) => {
                    report.delivered += 1;
                    outcomes.push(DeliveryOutcome::Delivered {
                        id: row.id,
                        status: OutboxStatus::Processed,
                        at: Utc::now(),
                    });
                }
                Err(e) => {
                    error!(event = %row.event_name, id = row.id, error = %e, "Event handler failed");
                    report.failed += 1;
                    outcomes.push(DeliveryOutcome::Failed {
                        id: row.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        self.store.settle_outbox(outcomes).await?;
        Ok(report)
    }
}
