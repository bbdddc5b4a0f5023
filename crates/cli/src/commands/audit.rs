//! Audit trail CLI commands

use anyhow::Result;
use sentinel_lib::AuditEvent;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{format_time, print_json, print_warning, OutputFormat};

/// Row for audit table
#[derive(Tabled)]
struct AuditRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Time")]
    at: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Notification")]
    target_id: i64,
    #[tabled(rename = "Details")]
    details: String,
}

/// Show audit events, optionally for one notification or action
pub async fn show_audit(
    client: &ApiClient,
    notification_id: Option<i64>,
    action: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let mut query = Vec::new();
    if let Some(id) = notification_id {
        query.push(("target_id", id.to_string()));
    }
    if let Some(action) = action {
        query.push(("action", action_name(&action)));
    }

    let events: Vec<AuditEvent> = client.get("api/audit", &query).await?;

    match format {
        OutputFormat::Json => print_json(&events)?,
        OutputFormat::Table => {
            if events.is_empty() {
                print_warning("No audit events found");
                return Ok(());
            }

            let rows: Vec<AuditRow> = events
                .iter()
                .map(|e| AuditRow {
                    id: e.id,
                    at: format_time(Some(e.at)),
                    action: e.action.to_string(),
                    target_id: e.target_id,
                    details: e.metadata.to_string(),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} events", events.len());
        }
    }

    Ok(())
}

/// Accept `created` as shorthand for `NOTIFICATION_CREATED`
fn action_name(action: &str) -> String {
    let upper = action.trim().to_uppercase();
    if upper.starts_with("NOTIFICATION_") {
        upper
    } else {
        format!("NOTIFICATION_{upper}")
    }
}
