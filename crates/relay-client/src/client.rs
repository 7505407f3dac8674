use std::time::Duration;

use relay_core::{ActionRequest, ActionType, TriggerRequest};
use tracing::debug;

use crate::error::RelayClientError;
use crate::events::EventStream;
use crate::types::{ListenOutcome, TriggerAccepted};
use crate::Result;

// ─── RelayClient ──────────────────────────────────────────────────────────

/// HTTP client for the orchestration service, implementing the listener
/// contract: trigger, subscribe, await one terminal event with a bounded
/// timeout, always unsubscribe.
#[derive(Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    base_url: String,
}

impl RelayClient {
    /// `base_url` without a trailing slash, e.g. `http://localhost:3141`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        // No global timeout: subscribe connections are long-lived and get
        // bounded per-wait in `await_outcome`.
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Fresh correlation id for a trigger. The initiator generates it so it
    /// can subscribe before, during, or after the trigger round-trip.
    pub fn new_correlation_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// POST /api/actions. A 409 surfaces as [`RelayClientError::Conflict`]
    /// carrying the existing pending request for "already in progress" UI.
    pub async fn trigger(&self, request: &TriggerRequest) -> Result<TriggerAccepted> {
        let response = self
            .http
            .post(format!("{}/api/actions", self.base_url))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::CONFLICT {
            let body: serde_json::Value = response.json().await?;
            let existing = body
                .get("existingRequest")
                .cloned()
                .and_then(|v| serde_json::from_value::<ActionRequest>(v).ok())
                .map(Box::new);
            return Err(RelayClientError::Conflict {
                message: body
                    .get("error")
                    .and_then(|e| e.as_str())
                    .unwrap_or("action already in progress")
                    .to_string(),
                existing,
            });
        }
        if !status.is_success() {
            return Err(server_error(status, response).await);
        }
        Ok(response.json().await?)
    }

    /// GET /api/actions/{correlation_id}.
    pub async fn status_by_correlation(&self, correlation_id: &str) -> Result<ActionRequest> {
        let response = self
            .http
            .get(format!("{}/api/actions/{correlation_id}", self.base_url))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(server_error(status, response).await);
        }
        Ok(response.json().await?)
    }

    /// GET /api/actions?entityType=&entityId=&actionType= — reconciliation
    /// query for the most recent attempt on an idempotency key.
    pub async fn status_by_key(
        &self,
        entity_type: &str,
        entity_id: &str,
        action_type: ActionType,
    ) -> Result<ActionRequest> {
        let response = self
            .http
            .get(format!("{}/api/actions", self.base_url))
            .query(&[
                ("entityType", entity_type),
                ("entityId", entity_id),
                ("actionType", action_type.as_str()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(server_error(status, response).await);
        }
        Ok(response.json().await?)
    }

    /// Open the SSE subscription for a correlation id. Dropping the stream
    /// unsubscribes.
    pub async fn subscribe(&self, correlation_id: &str) -> Result<EventStream> {
        let response = self
            .http
            .get(format!(
                "{}/api/actions/{correlation_id}/events",
                self.base_url
            ))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(server_error(status, response).await);
        }
        debug!(correlation_id, "subscribed");
        Ok(EventStream::open(response))
    }

    /// Subscribe and await exactly one terminal event, bounded by `timeout`.
    /// Resolution, timeout, and drop all tear the subscription down.
    pub async fn await_outcome(
        &self,
        correlation_id: &str,
        timeout: Duration,
    ) -> Result<ListenOutcome> {
        let stream = self.subscribe(correlation_id).await?;
        stream.await_terminal(timeout).await
    }

    /// Convenience: trigger, then wait for the outcome with the action
    /// type's default delivery timeout.
    pub async fn run(&self, request: &TriggerRequest) -> Result<(TriggerAccepted, ListenOutcome)> {
        let timeout = Duration::from_secs(request.action_type.default_delivery_timeout_secs());
        let accepted = self.trigger(request).await?;
        let outcome = self.await_outcome(&accepted.correlation_id, timeout).await?;
        Ok((accepted, outcome))
    }
}

async fn server_error(status: reqwest::StatusCode, response: reqwest::Response) -> RelayClientError {
    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| status.to_string());
    RelayClientError::Server {
        status: status.as_u16(),
        message,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn send_message_request(correlation_id: &str) -> TriggerRequest {
        TriggerRequest {
            correlation_id: Some(correlation_id.to_string()),
            action_type: ActionType::SendMessage,
            entity_type: "candidate".to_string(),
            entity_id: "42".to_string(),
            payload: serde_json::json!({"subject": "hello"}),
        }
    }

    #[tokio::test]
    async fn trigger_parses_202_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/actions")
            .with_status(202)
            .with_header("content-type", "application/json")
            .with_body(r#"{"correlationId":"c1","actionRequestId":7}"#)
            .create_async()
            .await;

        let client = RelayClient::new(server.url()).unwrap();
        let accepted = client.trigger(&send_message_request("c1")).await.unwrap();
        assert_eq!(accepted.correlation_id, "c1");
        assert_eq!(accepted.action_request_id, 7);
    }

    #[tokio::test]
    async fn trigger_conflict_carries_existing_request() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/actions")
            .with_status(409)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"error":"an action of this type is already in progress for this entity",
                    "existingRequest":{"id":1,"correlationId":"c0","actionType":"send-message",
                    "entityType":"candidate","entityId":"42","payload":null,"status":"PENDING",
                    "result":null,"error":null,"createdAt":"2026-08-30T10:00:00Z","resolvedAt":null}}"#,
            )
            .create_async()
            .await;

        let client = RelayClient::new(server.url()).unwrap();
        let err = client
            .trigger(&send_message_request("c1"))
            .await
            .unwrap_err();
        match err {
            RelayClientError::Conflict { existing, .. } => {
                assert_eq!(existing.unwrap().correlation_id, "c0");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn status_query_deserializes_snapshot() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/actions/c1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id":1,"correlationId":"c1","actionType":"generate-quote",
                    "entityType":"prospect","entityId":"7","payload":{},"status":"SUCCEEDED",
                    "result":{"quoteId":"q-9"},"error":null,
                    "createdAt":"2026-08-30T10:00:00Z","resolvedAt":"2026-08-30T10:00:05Z"}"#,
            )
            .create_async()
            .await;

        let client = RelayClient::new(server.url()).unwrap();
        let snapshot = client.status_by_correlation("c1").await.unwrap();
        assert_eq!(snapshot.status, relay_core::ActionStatus::Succeeded);
        assert_eq!(snapshot.result.unwrap()["quoteId"], "q-9");
    }

    #[tokio::test]
    async fn unknown_correlation_is_a_server_error_with_404() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/actions/ghost")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"no action request for this correlation id"}"#)
            .create_async()
            .await;

        let client = RelayClient::new(server.url()).unwrap();
        let err = client.status_by_correlation("ghost").await.unwrap_err();
        match err {
            RelayClientError::Server { status, message } => {
                assert_eq!(status, 404);
                assert!(message.contains("correlation id"));
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn await_outcome_resolves_from_sse_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/actions/c1/events")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body("event: outcome\ndata: {\"status\":\"success\",\"resultPayload\":{\"sent\":true}}\n\n")
            .create_async()
            .await;

        let client = RelayClient::new(server.url()).unwrap();
        let outcome = client
            .await_outcome("c1", Duration::from_secs(2))
            .await
            .unwrap();
        match outcome {
            ListenOutcome::Success(Some(result)) => assert_eq!(result["sent"], true),
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn await_outcome_propagates_subscribe_404() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/actions/ghost/events")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"unknown correlation id: ghost"}"#)
            .create_async()
            .await;

        let client = RelayClient::new(server.url()).unwrap();
        let err = client
            .await_outcome("ghost", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayClientError::Server { status: 404, .. }));
    }

    #[test]
    fn correlation_ids_are_unique() {
        assert_ne!(
            RelayClient::new_correlation_id(),
            RelayClient::new_correlation_id()
        );
    }
}
