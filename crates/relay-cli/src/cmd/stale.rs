use anyhow::Result;
use relay_core::{ActionStore, RelayConfig};

use crate::output::{print_json, print_table};

/// Operator reconciliation: list PENDING requests older than the threshold.
/// Reads the store directly so it works even when the server is down.
pub fn run(db_path: Option<&str>, older_than_secs: i64, json: bool) -> Result<()> {
    let config = RelayConfig::from_env();
    let db_path = db_path.unwrap_or(&config.db_path);

    let store = ActionStore::open(std::path::Path::new(db_path))?;
    let stale = store.stale_pending(chrono::Duration::seconds(older_than_secs))?;

    if json {
        return print_json(&stale);
    }
    if stale.is_empty() {
        println!("No pending actions older than {older_than_secs}s.");
        return Ok(());
    }

    let now = chrono::Utc::now();
    let headers = &["CORRELATION", "ACTION", "ENTITY", "PENDING FOR"];
    let rows: Vec<Vec<String>> = stale
        .iter()
        .map(|r| {
            vec![
                r.correlation_id.clone(),
                r.action_type.to_string(),
                r.entity.to_string(),
                format!("{}s", r.pending_for(now).num_seconds()),
            ]
        })
        .collect();
    print_table(headers, rows);
    Ok(())
}
