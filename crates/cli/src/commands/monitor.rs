//! Monitoring status, dashboard and manual stepping

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{Alert, ApiClient, MonitoringStatus};
use crate::output::{
    color_health, color_running, color_severity, format_confidence, format_duration,
    format_timestamp, print_heading, print_json, print_rows, print_success, OutputFormat,
};

/// Row for the recent alerts table
#[derive(Tabled)]
struct RecentAlertRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Sensor")]
    sensor: String,
    #[tabled(rename = "Type")]
    anomaly_type: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
}

impl From<&Alert> for RecentAlertRow {
    fn from(alert: &Alert) -> Self {
        Self {
            time: format_timestamp(&alert.timestamp),
            sensor: alert.sensor_id.clone(),
            anomaly_type: alert.anomaly_type.clone(),
            severity: color_severity(&alert.severity),
            confidence: format_confidence(alert.confidence),
        }
    }
}

fn print_status_block(status: &MonitoringStatus) {
    println!("Building:               {}", status.building_name.cyan());
    println!("State:                  {}", color_running(status.is_running));
    if let Some(start) = &status.start_time {
        println!("Started:                {}", format_timestamp(start));
    }
    if let Some(runtime) = status.runtime_seconds {
        println!("Runtime:                {}", format_duration(runtime));
    }
    println!(
        "Sensors:                {} in {} zones",
        status.sensor_count, status.zone_count
    );
    println!("Total readings:         {}", status.total_readings);
    println!("Total anomalies:        {}", status.total_anomalies);
    println!("Alerts (24h):           {}", status.recent_alerts_count);
}

/// Show monitoring status
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status = client.status().await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            print_heading("Monitoring Status");
            print_status_block(&status);
        }
    }

    Ok(())
}

/// Show the building dashboard
pub async fn show_dashboard(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let dashboard = client.dashboard().await?;

    match format {
        OutputFormat::Json => print_json(&dashboard)?,
        OutputFormat::Table => {
            print_heading(&format!("{} Dashboard", dashboard.building.name));
            println!("Zones:                  {}", dashboard.building.zones);
            println!(
                "Sensors active:         {}/{} ({})",
                dashboard.sensors.active,
                dashboard.sensors.total,
                color_health(dashboard.sensors.health_percentage)
            );
            println!();

            println!("{}", "Alerts (24h)".bold());
            println!("{}", "-".repeat(50));
            println!("Total:                  {}", dashboard.alerts.total_24h);
            println!(
                "Critical:               {}",
                dashboard.alerts.critical.to_string().red().bold()
            );
            println!(
                "High:                   {}",
                dashboard.alerts.high.to_string().red()
            );
            println!();

            let rows: Vec<RecentAlertRow> =
                dashboard.alerts.recent.iter().map(RecentAlertRow::from).collect();
            print_rows(rows, "No recent alerts");
            println!();

            println!("{}", "Monitoring".bold());
            println!("{}", "-".repeat(50));
            print_status_block(&dashboard.monitoring);

            if !dashboard.anomaly_summary.critical_sensors.is_empty() {
                println!();
                println!(
                    "{} {}",
                    "Critical sensors:".red().bold(),
                    dashboard.anomaly_summary.critical_sensors.join(", ")
                );
            }
        }
    }

    Ok(())
}

/// Run one sampling and detection pass on the daemon
pub async fn step(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status = client.step().await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            print_success("Ran one monitoring step");
            println!("Total readings:         {}", status.total_readings);
            println!("Total anomalies:        {}", status.total_anomalies);
        }
    }

    Ok(())
}
