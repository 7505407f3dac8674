use anyhow::{anyhow, Result};
use relay_client::RelayClient;
use relay_core::{ActionRequest, ActionType};

use crate::output::{print_json, print_table};

pub enum StatusLookup {
    ByCorrelation(String),
    ByKey {
        entity_type: String,
        entity_id: String,
        action_type: ActionType,
    },
}

pub fn run(server: &str, lookup: StatusLookup, json: bool) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let client = RelayClient::new(server)?;
        let request = match lookup {
            StatusLookup::ByCorrelation(id) => client.status_by_correlation(&id).await?,
            StatusLookup::ByKey {
                entity_type,
                entity_id,
                action_type,
            } => {
                client
                    .status_by_key(&entity_type, &entity_id, action_type)
                    .await?
            }
        };

        if json {
            return print_json(&request);
        }
        print_request(&request);
        Ok(())
    })
}

fn print_request(request: &ActionRequest) {
    let headers = &["FIELD", "VALUE"];
    let mut rows = vec![
        vec!["correlation".to_string(), request.correlation_id.clone()],
        vec!["action".to_string(), request.action_type.to_string()],
        vec!["entity".to_string(), request.entity.to_string()],
        vec!["status".to_string(), request.status.to_string()],
        vec![
            "created".to_string(),
            request.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ],
    ];
    if let Some(resolved_at) = request.resolved_at {
        rows.push(vec![
            "resolved".to_string(),
            resolved_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ]);
    }
    if let Some(error) = &request.error {
        rows.push(vec!["error".to_string(), error.clone()]);
    }
    if let Some(result) = &request.result {
        rows.push(vec!["result".to_string(), result.to_string()]);
    }
    print_table(headers, rows);
}

pub fn parse_action_type(raw: &str) -> Result<ActionType> {
    raw.parse::<ActionType>().map_err(|_| {
        anyhow!(
            "unknown action type '{raw}' (expected one of: {})",
            ActionType::all()
                .iter()
                .map(|at| at.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    })
}
