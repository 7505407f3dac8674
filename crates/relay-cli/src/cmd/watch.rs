use std::time::Duration;

use anyhow::Result;
use relay_client::{ListenOutcome, RelayClient};

use crate::output::print_json;

pub fn run(server: &str, correlation_id: &str, timeout_secs: u64, json: bool) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let client = RelayClient::new(server)?;
        let outcome = client
            .await_outcome(correlation_id, Duration::from_secs(timeout_secs))
            .await?;
        report(correlation_id, outcome, json)
    })
}

/// Render a listener outcome. Shared by `watch` and `trigger --wait`.
pub fn report(correlation_id: &str, outcome: ListenOutcome, json: bool) -> Result<()> {
    if json {
        let value = match &outcome {
            ListenOutcome::Success(result) => serde_json::json!({
                "correlationId": correlation_id,
                "outcome": "success",
                "result": result,
            }),
            ListenOutcome::Failure { reason, result } => serde_json::json!({
                "correlationId": correlation_id,
                "outcome": "failure",
                "reason": reason,
                "result": result,
            }),
            ListenOutcome::TimedOut => serde_json::json!({
                "correlationId": correlation_id,
                "outcome": "timeout",
            }),
        };
        return print_json(&value);
    }

    match outcome {
        ListenOutcome::Success(Some(result)) => {
            println!("Succeeded: {}", serde_json::to_string(&result)?);
        }
        ListenOutcome::Success(None) => println!("Succeeded."),
        ListenOutcome::Failure { reason, .. } => println!("Failed: {reason}"),
        ListenOutcome::TimedOut => {
            // Not a failure: the worker may still complete. Point at the
            // status query instead of rendering an error.
            println!(
                "No outcome within the wait window. Check later with:\n  relay status {correlation_id}"
            );
        }
    }
    Ok(())
}
