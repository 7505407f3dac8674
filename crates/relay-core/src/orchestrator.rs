use crate::config::RelayConfig;
use crate::dispatch::Dispatcher;
use crate::error::{RelayError, Result};
use crate::hub::OutcomeHub;
use crate::store::{ActionStore, Resolution};
use crate::types::{
    ActionRequest, ActionStatus, EntityRef, EventStatus, Outcome, OutcomeEvent, TriggerRequest,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Result of applying a worker callback, surfaced to the callback endpoint.
/// Duplicates are acknowledged, never errored back to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackAck {
    Applied,
    Duplicate,
}

/// Ties the guard, store, dispatcher and hub together into the trigger /
/// callback / subscribe operations the HTTP surface exposes.
///
/// Store calls are synchronous sqlite work and hop through
/// `tokio::task::spawn_blocking`; the dispatcher call is the only awaited
/// network I/O on the trigger path.
pub struct Orchestrator {
    store: ActionStore,
    hub: Arc<dyn OutcomeHub>,
    dispatcher: Dispatcher,
    config: RelayConfig,
}

impl Orchestrator {
    pub fn new(
        store: ActionStore,
        hub: Arc<dyn OutcomeHub>,
        dispatcher: Dispatcher,
        config: RelayConfig,
    ) -> Self {
        Self {
            store,
            hub,
            dispatcher,
            config,
        }
    }

    pub fn store(&self) -> &ActionStore {
        &self.store
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Accept a trigger: acquire the idempotency key, persist the PENDING
    /// record, then fire the job at the worker. A failed dispatch releases
    /// the key before the error is returned, so the caller can retry
    /// immediately.
    pub async fn trigger(&self, request: TriggerRequest) -> Result<ActionRequest> {
        let correlation_id = request
            .correlation_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let entity = EntityRef::new(request.entity_type, request.entity_id);
        let action_type = request.action_type;

        info!(
            correlation_id = %correlation_id,
            action_type = %action_type,
            entity = %entity,
            "trigger received"
        );

        let acquired = {
            let store = self.store.clone();
            let entity = entity.clone();
            let correlation_id = correlation_id.clone();
            let payload = request.payload.clone();
            tokio::task::spawn_blocking(move || {
                store.try_acquire(&entity, action_type, &correlation_id, &payload)
            })
            .await
            .map_err(|e| RelayError::Task(e.to_string()))??
        };

        // The record exists before dispatch is attempted: a crash here
        // leaves an accurate (if stuck) PENDING row for the stale sweep.
        if let Err(e) = self.dispatcher.dispatch(&acquired).await {
            let reason = e.to_string();
            let store = self.store.clone();
            let id = correlation_id.clone();
            let mark = tokio::task::spawn_blocking(move || store.mark_dispatch_failed(&id, &reason))
                .await
                .map_err(|e| RelayError::Task(e.to_string()))?;
            if let Err(mark_err) = mark {
                warn!(correlation_id = %correlation_id, error = %mark_err, "failed to release key after dispatch failure");
            }
            return Err(e);
        }

        Ok(acquired)
    }

    /// Apply a worker callback and, on first application, hand the outcome
    /// to the hub for live delivery. Duplicate callbacks are logged and
    /// acknowledged without touching the store or the hub.
    pub async fn receive_callback(
        &self,
        correlation_id: &str,
        outcome: Outcome,
        result_payload: Option<serde_json::Value>,
    ) -> Result<CallbackAck> {
        let resolution = {
            let store = self.store.clone();
            let id = correlation_id.to_string();
            tokio::task::spawn_blocking(move || {
                store.resolve(&id, outcome, result_payload.as_ref())
            })
            .await
            .map_err(|e| RelayError::Task(e.to_string()))??
        };

        match resolution {
            Resolution::Applied(request) => {
                let delivered = self.hub.publish(
                    &request.correlation_id,
                    OutcomeEvent::from_outcome(outcome, request.result.clone()),
                );
                info!(
                    correlation_id = %request.correlation_id,
                    status = %request.status,
                    delivered,
                    "callback applied"
                );
                Ok(CallbackAck::Applied)
            }
            Resolution::Duplicate(request) => {
                warn!(
                    correlation_id = %request.correlation_id,
                    status = %request.status,
                    "duplicate callback ignored"
                );
                Ok(CallbackAck::Duplicate)
            }
        }
    }

    /// Open a live channel for a correlation id, TTL'd per the action type.
    ///
    /// A subscriber attaching after the request already resolved gets the
    /// stored outcome immediately — the store, not the hub, is the source
    /// of truth for anything terminal.
    pub async fn subscribe(
        &self,
        correlation_id: &str,
    ) -> Result<broadcast::Receiver<OutcomeEvent>> {
        let request = {
            let store = self.store.clone();
            let id = correlation_id.to_string();
            tokio::task::spawn_blocking(move || store.get_by_correlation(&id))
                .await
                .map_err(|e| RelayError::Task(e.to_string()))??
        }
        .ok_or_else(|| RelayError::UnknownCorrelation(correlation_id.to_string()))?;

        if request.status.is_terminal() {
            let (tx, rx) = broadcast::channel(1);
            let _ = tx.send(terminal_event(&request));
            return Ok(rx);
        }

        let ttl = self.config.delivery_timeouts.for_action(request.action_type);
        Ok(self.hub.subscribe(correlation_id, ttl))
    }
}

fn terminal_event(request: &ActionRequest) -> OutcomeEvent {
    let status = match request.status {
        ActionStatus::Succeeded => EventStatus::Success,
        ActionStatus::Failed => EventStatus::Error,
        // TimedOut in the store only ever comes from reconciliation.
        ActionStatus::TimedOut => EventStatus::Timeout,
        ActionStatus::Pending => unreachable!("terminal_event called on pending request"),
    };
    OutcomeEvent {
        status,
        result_payload: request.result.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
