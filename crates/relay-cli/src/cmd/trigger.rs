use std::time::Duration;

use anyhow::{anyhow, Result};
use relay_client::{RelayClient, RelayClientError};
use relay_core::{ActionType, TriggerRequest};

use crate::output::print_json;

pub struct TriggerArgs {
    pub action_type: ActionType,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: Option<String>,
    pub correlation_id: Option<String>,
    pub wait: bool,
    pub timeout_secs: Option<u64>,
}

pub fn run(server: &str, args: TriggerArgs, json: bool) -> Result<()> {
    let payload = match &args.payload {
        Some(raw) => serde_json::from_str(raw).map_err(|e| anyhow!("invalid --payload: {e}"))?,
        None => serde_json::Value::Null,
    };
    let request = TriggerRequest {
        correlation_id: args.correlation_id.clone(),
        action_type: args.action_type,
        entity_type: args.entity_type.clone(),
        entity_id: args.entity_id.clone(),
        payload,
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let client = RelayClient::new(server)?;

        let accepted = match client.trigger(&request).await {
            Ok(accepted) => accepted,
            Err(RelayClientError::Conflict { existing, .. }) => {
                let detail = existing
                    .map(|r| {
                        format!(
                            " (correlation {}, pending for {}s)",
                            r.correlation_id,
                            r.pending_for(chrono::Utc::now()).num_seconds()
                        )
                    })
                    .unwrap_or_default();
                return Err(anyhow!(
                    "a {} action is already in progress for {}:{}{detail}",
                    args.action_type,
                    args.entity_type,
                    args.entity_id,
                ));
            }
            Err(e) => return Err(e.into()),
        };

        if json && !args.wait {
            return print_json(&serde_json::json!({
                "correlationId": accepted.correlation_id,
                "actionRequestId": accepted.action_request_id,
            }));
        }
        if !json {
            println!(
                "Accepted: {} #{} (correlation {})",
                args.action_type, accepted.action_request_id, accepted.correlation_id
            );
        }

        if args.wait {
            let timeout = Duration::from_secs(
                args.timeout_secs
                    .unwrap_or_else(|| args.action_type.default_delivery_timeout_secs()),
            );
            let outcome = client
                .await_outcome(&accepted.correlation_id, timeout)
                .await?;
            crate::cmd::watch::report(&accepted.correlation_id, outcome, json)?;
        }
        Ok(())
    })
}
