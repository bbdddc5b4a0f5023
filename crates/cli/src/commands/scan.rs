//! Scan and service status CLI commands

use anyhow::Result;
use colored::Colorize;
use sentinel_lib::scheduler::ScanSummary;
use sentinel_lib::HealthResponse;

use crate::client::{ApiClient, ApiError};
use crate::output::{
    color_status, print_info, print_json, print_success, print_warning, OutputFormat,
};

/// Trigger a reconciliation pass now
pub async fn run_scan(client: &ApiClient, format: OutputFormat) -> Result<()> {
    print_info("Running reconciliation pass...");

    let summary: ScanSummary = match client.post("api/scan", &serde_json::json!({})).await {
        Ok(summary) => summary,
        Err(e) => {
            if let Some(api_err) = e.downcast_ref::<ApiError>() {
                if api_err.is_conflict() {
                    print_warning("A pass is already running; try again when it finishes");
                    return Ok(());
                }
            }
            return Err(e);
        }
    };

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            let report = &summary.report;
            print_success(&format!(
                "Pass finished: {} samples, {} candidates",
                summary.samples, summary.candidates
            ));
            println!("  Created:   {}", report.created.to_string().red());
            println!("  Updated:   {}", report.updated.to_string().yellow());
            println!("  Cleared:   {}", report.cleared.to_string().green());
            println!("  Unchanged: {}", report.preserved);
            if report.suppressed > 0 {
                println!("  Held back: {} (cleared earlier this hour)", report.suppressed);
            }
            if summary.rejected > 0 {
                print_warning(&format!("{} invalid candidates skipped", summary.rejected));
            }
        }
    }

    Ok(())
}

/// Show sentinel component health
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthResponse = client.get("healthz", &[]).await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            println!("{}", "Sentinel Status".bold());
            println!("{}", "=".repeat(40));
            println!("Overall: {}", color_status(&status_name(&health.status)));

            let mut names: Vec<_> = health.components.keys().collect();
            names.sort();
            for name in names {
                let component = &health.components[name];
                print!("  {:<10} {}", name, color_status(&status_name(&component.status)));
                match &component.message {
                    Some(message) => println!("  {}", message.dimmed()),
                    None => println!(),
                }
            }
        }
    }

    Ok(())
}

fn status_name<T: serde::Serialize>(status: &T) -> String {
    serde_json::to_value(status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}
