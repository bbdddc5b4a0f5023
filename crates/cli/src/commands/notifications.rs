//! Notification CLI commands

use anyhow::Result;
use colored::Colorize;
use sentinel_lib::store::Page;
use sentinel_lib::{Notification, NotificationStatus};
use tabled::Tabled;

use crate::client::{AckRequest, ApiClient, ApiError};
use crate::output::{
    color_pct, color_status, format_pct, format_time, print_json, print_success, print_warning,
    OutputFormat,
};

/// Row for notifications table
#[derive(Tabled)]
struct NotificationRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "VM")]
    vm_name: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Env")]
    env: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Observed")]
    observed: String,
}

impl From<&Notification> for NotificationRow {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id,
            provider: n.provider.to_string(),
            vm_name: n.vm_name.clone(),
            metric: n.metric.to_string(),
            value: color_pct(n.value_pct, n.threshold_pct),
            env: n.env.clone().unwrap_or_else(|| "-".to_string()),
            status: color_status(n.status.as_str()),
            observed: format_time(Some(n.at)),
        }
    }
}

/// Filters accepted by `vms list`
#[derive(Debug, Default)]
pub struct ListArgs {
    pub status: Option<String>,
    pub provider: Option<String>,
    pub metric: Option<String>,
    pub vm_name: Option<String>,
    pub env: Option<String>,
    pub include_archived: bool,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListArgs {
    /// Query parameters, normalized to the API's wire casing
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        if let Some(status) = &self.status {
            query.push(("status", status.to_uppercase()));
        }
        if let Some(provider) = &self.provider {
            query.push(("provider", provider.to_lowercase()));
        }
        if let Some(metric) = &self.metric {
            query.push(("metric", metric.to_uppercase()));
        }
        if let Some(vm_name) = &self.vm_name {
            query.push(("vm_name", vm_name.clone()));
        }
        if let Some(env) = &self.env {
            query.push(("env", env.clone()));
        }
        if self.include_archived {
            query.push(("include_archived", "true".to_string()));
        }
        if let Some(limit) = self.limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(offset) = self.offset {
            query.push(("offset", offset.to_string()));
        }
        query
    }
}

/// List notifications with optional filters
pub async fn list_notifications(
    client: &ApiClient,
    args: ListArgs,
    format: OutputFormat,
) -> Result<()> {
    let page: Page<Notification> = client.get("api/notifications", &args.query()).await?;

    match format {
        OutputFormat::Json => print_json(&page)?,
        OutputFormat::Table => {
            if page.items.is_empty() {
                print_warning("No notifications found");
                return Ok(());
            }

            let rows: Vec<NotificationRow> = page.items.iter().map(NotificationRow::from).collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!(
                "\nShowing {}-{} of {} notifications",
                page.offset + 1,
                page.offset + page.items.len(),
                page.total
            );
        }
    }

    Ok(())
}

/// Show one notification in detail
pub async fn show_notification(client: &ApiClient, id: i64, format: OutputFormat) -> Result<()> {
    let notification: Notification = client.get(&format!("api/notifications/{id}"), &[]).await?;

    match format {
        OutputFormat::Json => print_json(&notification)?,
        OutputFormat::Table => print_details(&notification),
    }

    Ok(())
}

fn print_details(n: &Notification) {
    println!("{}", format!("Notification #{}", n.id).bold());
    println!("{}", "=".repeat(50));
    println!("VM:          {} ({})", n.vm_name.cyan(), n.provider);
    if let Some(vm_id) = &n.vm_id {
        println!("VM ID:       {}", vm_id);
    }
    println!("Environment: {}", n.env.as_deref().unwrap_or("-"));
    println!(
        "Metric:      {} at {} (threshold {})",
        n.metric,
        color_pct(n.value_pct, n.threshold_pct),
        format_pct(n.threshold_pct)
    );
    println!("Status:      {}", color_status(n.status.as_str()));
    println!("Observed:    {}", format_time(Some(n.at)));
    println!("Created:     {}", format_time(Some(n.created_at)));

    if let Some(by) = &n.ack_by {
        println!("Acked by:    {} at {}", by, format_time(n.ack_at));
    }
    if n.status == NotificationStatus::Cleared {
        println!("Cleared:     {}", format_time(n.cleared_at));
    }

    if let Some(disks) = n.disks.as_ref().filter(|d| !d.is_empty()) {
        println!("\n{}", "Disks".bold());
        for (i, disk) in disks.iter().enumerate() {
            let used = disk.used_pct.map(format_pct).unwrap_or_else(|| "-".to_string());
            let size = disk
                .size_gib
                .map(|s| format!("{s:.1} GiB"))
                .unwrap_or_else(|| "-".to_string());
            println!("  #{:<2} {:>7} of {}", i + 1, used, size);
        }
    }
}

/// Acknowledge an open notification
pub async fn acknowledge(
    client: &ApiClient,
    id: i64,
    by: &str,
    format: OutputFormat,
) -> Result<()> {
    let request = AckRequest { by: by.to_string() };
    let result: Result<Notification> = client
        .post(&format!("api/notifications/{id}/ack"), &request)
        .await;

    let notification = match result {
        Ok(n) => n,
        Err(e) => {
            if let Some(api_err) = e.downcast_ref::<ApiError>() {
                if api_err.is_conflict() {
                    print_warning(&api_err.message);
                    anyhow::bail!("notification {id} was not acknowledged");
                }
            }
            return Err(e);
        }
    };

    match format {
        OutputFormat::Json => print_json(&notification)?,
        OutputFormat::Table => print_success(&format!(
            "Notification {} ({} {} on {}) acknowledged by {}",
            notification.id,
            notification.provider,
            notification.metric,
            notification.vm_name,
            notification.ack_by.as_deref().unwrap_or(by)
        )),
    }

    Ok(())
}
