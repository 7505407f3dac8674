use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::types::ActionRequest;
use serde::Serialize;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Job envelope POSTed to the external worker. Carries the callback URL so
/// the worker knows where to report the terminal outcome.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobEnvelope<'a> {
    correlation_id: &'a str,
    action_type: &'a str,
    entity_type: &'a str,
    entity_id: &'a str,
    payload: &'a serde_json::Value,
    callback_url: &'a str,
}

/// Fire-and-forget sender. One POST per action, bounded by a short
/// network-level timeout that only confirms the worker accepted the job;
/// business completion arrives later on the callback endpoint. No retries
/// at this layer — retry policy belongs to the worker.
#[derive(Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    worker_url: String,
    callback_url: String,
}

impl Dispatcher {
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.dispatch_timeout())
            .build()
            .map_err(|e| RelayError::DispatchFailed(e.to_string()))?;
        Ok(Self {
            client,
            worker_url: config.worker_url.clone(),
            callback_url: config.callback_url.clone(),
        })
    }

    /// Send the job once. Transport errors and non-2xx responses both come
    /// back as `DispatchFailed` — the caller marks the record FAILED and the
    /// idempotency key is released.
    pub async fn dispatch(&self, request: &ActionRequest) -> Result<()> {
        let envelope = JobEnvelope {
            correlation_id: &request.correlation_id,
            action_type: request.action_type.as_str(),
            entity_type: &request.entity.entity_type,
            entity_id: &request.entity.entity_id,
            payload: &request.payload,
            callback_url: &self.callback_url,
        };

        let response = self
            .client
            .post(&self.worker_url)
            .json(&envelope)
            .send()
            .await
            .map_err(|e| {
                warn!(correlation_id = %request.correlation_id, error = %e, "dispatch send failed");
                RelayError::DispatchFailed(e.to_string())
            })?;

        if !response.status().is_success() {
            warn!(
                correlation_id = %request.correlation_id,
                status = %response.status(),
                "worker rejected job"
            );
            return Err(RelayError::DispatchFailed(format!(
                "worker returned {}",
                response.status()
            )));
        }

        debug!(correlation_id = %request.correlation_id, "job accepted by worker");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionStatus, ActionType, EntityRef};

    fn request(correlation_id: &str) -> ActionRequest {
        ActionRequest {
            id: 1,
            correlation_id: correlation_id.to_string(),
            action_type: ActionType::SendMessage,
            entity: EntityRef::new("candidate", "42"),
            payload: serde_json::json!({"subject": "hello"}),
            status: ActionStatus::Pending,
            result: None,
            error: None,
            created_at: chrono::Utc::now(),
            resolved_at: None,
        }
    }

    fn config_for(server: &mockito::ServerGuard) -> RelayConfig {
        RelayConfig {
            worker_url: format!("{}/jobs", server.url()),
            callback_url: "http://localhost:3141/api/callbacks".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn dispatch_posts_envelope_and_accepts_2xx() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/jobs")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "correlationId": "c1",
                "actionType": "send-message",
                "entityType": "candidate",
                "entityId": "42",
                "callbackUrl": "http://localhost:3141/api/callbacks",
            })))
            .with_status(202)
            .create_async()
            .await;

        let dispatcher = Dispatcher::new(&config_for(&server)).unwrap();
        dispatcher.dispatch(&request("c1")).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_2xx_is_a_dispatch_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/jobs")
            .with_status(503)
            .create_async()
            .await;

        let dispatcher = Dispatcher::new(&config_for(&server)).unwrap();
        let err = dispatcher.dispatch(&request("c1")).await.unwrap_err();
        assert!(matches!(err, RelayError::DispatchFailed(_)));
    }

    #[tokio::test]
    async fn unreachable_worker_is_a_dispatch_failure() {
        let config = RelayConfig {
            // Nothing listens here.
            worker_url: "http://127.0.0.1:1/jobs".to_string(),
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(&config).unwrap();
        let err = dispatcher.dispatch(&request("c1")).await.unwrap_err();
        assert!(matches!(err, RelayError::DispatchFailed(_)));
    }
}
