//! Alert and anomaly commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_severity, format_confidence, format_timestamp, print_heading, print_info, print_json,
    print_rows, OutputFormat,
};

/// Row for alerts table
#[derive(Tabled)]
struct AlertRow {
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
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Expected")]
    expected: String,
}

/// Row for count tables
#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Count")]
    count: usize,
}

/// List alerts raised within the window, newest first
pub async fn list_alerts(client: &ApiClient, hours: i64, format: OutputFormat) -> Result<()> {
    let mut alerts = client.alerts(hours).await?;
    alerts.reverse();

    match format {
        OutputFormat::Json => print_json(&alerts)?,
        OutputFormat::Table => {
            let rows: Vec<AlertRow> = alerts
                .iter()
                .map(|a| AlertRow {
                    time: format_timestamp(&a.timestamp),
                    sensor: a.sensor_id.clone(),
                    anomaly_type: a.anomaly_type.clone(),
                    severity: color_severity(&a.severity),
                    confidence: format_confidence(a.confidence),
                    value: format!("{:.2}", a.value),
                    expected: format!("{:.2} .. {:.2}", a.expected_range.0, a.expected_range.1),
                })
                .collect();

            print_rows(rows, &format!("No alerts in the last {}h", hours));

            if let Some(first) = alerts.first() {
                if !first.recommendations.is_empty() {
                    println!();
                    print_info(&format!("Latest alert ({}):", first.sensor_id));
                    for recommendation in &first.recommendations {
                        println!("  - {}", recommendation);
                    }
                }
            }
        }
    }

    Ok(())
}

/// Show the anomaly summary for the window
pub async fn show_summary(client: &ApiClient, hours: i64, format: OutputFormat) -> Result<()> {
    let summary = client.anomaly_summary(hours).await?;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            print_heading(&format!("Anomalies (last {}h)", hours));
            println!("Total:                  {}", summary.total_anomalies);
            if let Some(most_recent) = &summary.most_recent {
                println!("Most recent:            {}", format_timestamp(most_recent));
            }
            println!();

            println!("{}", "By severity".bold());
            let rows: Vec<CountRow> = summary
                .by_severity
                .iter()
                .map(|(severity, count)| CountRow {
                    category: color_severity(severity),
                    count: *count,
                })
                .collect();
            print_rows(rows, "No severities reported");
            println!();

            println!("{}", "By type".bold());
            let rows: Vec<CountRow> = summary
                .by_type
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(anomaly_type, count)| CountRow {
                    category: anomaly_type.clone(),
                    count: *count,
                })
                .collect();
            print_rows(rows, "No anomalies detected");

            if !summary.critical_sensors.is_empty() {
                println!();
                println!(
                    "{} {}",
                    "Critical sensors:".red().bold(),
                    summary.critical_sensors.join(", ")
                );
            }
        }
    }

    Ok(())
}
