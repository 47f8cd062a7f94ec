//! Reading history and per-sensor statistics

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    format_timestamp, format_value, print_heading, print_json, print_rows, print_warning,
    OutputFormat,
};

/// Row for the latest-readings table
#[derive(Tabled)]
struct ReadingRow {
    #[tabled(rename = "Sensor")]
    sensor: String,
    #[tabled(rename = "Type")]
    sensor_type: String,
    #[tabled(rename = "Zone")]
    zone: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Quality")]
    quality: String,
}

fn as_str(entry: &serde_json::Value, key: &str) -> String {
    entry
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("-")
        .to_string()
}

fn reading_row(sensor_id: &str, entry: &serde_json::Value) -> ReadingRow {
    if let Some(error) = entry.get("error").and_then(|e| e.as_str()) {
        return ReadingRow {
            sensor: sensor_id.to_string(),
            sensor_type: "-".to_string(),
            zone: "-".to_string(),
            value: error.red().to_string(),
            quality: "-".to_string(),
        };
    }

    let value = entry.get("value").and_then(|v| v.as_f64()).unwrap_or(f64::NAN);
    let unit = entry.get("unit").and_then(|v| v.as_str()).unwrap_or("");
    let quality = entry
        .get("quality")
        .and_then(|v| v.as_f64())
        .map(|q| format!("{:.2}", q))
        .unwrap_or_else(|| "-".to_string());

    ReadingRow {
        sensor: sensor_id.to_string(),
        sensor_type: as_str(entry, "sensor_type"),
        zone: as_str(entry, "zone_id"),
        value: format_value(value, unit),
        quality,
    }
}

/// Show reading snapshots; the table view lists the latest one
pub async fn show_readings(client: &ApiClient, hours: i64, format: OutputFormat) -> Result<()> {
    let snapshots = client.readings(hours).await?;

    match format {
        OutputFormat::Json => print_json(&snapshots)?,
        OutputFormat::Table => {
            let Some(latest) = snapshots.last() else {
                print_warning(&format!("No readings in the last {}h", hours));
                return Ok(());
            };

            print_heading(&format!(
                "Latest readings ({})",
                format_timestamp(&latest.timestamp)
            ));
            println!(
                "Snapshots in window:    {}",
                snapshots.len()
            );
            println!(
                "Active sensors:         {}/{}",
                latest.building_summary.active_sensors, latest.building_summary.total_sensors
            );
            if latest.building_summary.failed_readings > 0 {
                println!(
                    "Failed readings:        {}",
                    latest.building_summary.failed_readings.to_string().red()
                );
            }
            println!();

            let rows: Vec<ReadingRow> = latest
                .readings
                .iter()
                .map(|(id, entry)| reading_row(id, entry))
                .collect();
            print_rows(rows, "Snapshot is empty");
        }
    }

    Ok(())
}

/// Show one sensor's description and window statistics
pub async fn show_sensor(
    client: &ApiClient,
    sensor_id: &str,
    hours: i64,
    format: OutputFormat,
) -> Result<()> {
    let stats = client.sensor_statistics(sensor_id, hours).await?;

    match format {
        OutputFormat::Json => print_json(&stats)?,
        OutputFormat::Table => {
            let info = &stats.sensor_info;
            print_heading(&format!("Sensor {}", info.sensor_id));
            println!("Type:                   {}", info.sensor_type);
            println!(
                "Zone:                   {}",
                info.zone_id.as_deref().unwrap_or("-")
            );
            println!(
                "Position:               ({:.1}, {:.1}, {:.1})",
                info.position.0, info.position.1, info.position.2
            );
            println!(
                "Active:                 {}",
                if stats.is_active {
                    "yes".green()
                } else {
                    "no".yellow()
                }
            );
            println!();

            match &stats.statistics {
                None => print_warning(&format!("No readings in the last {}h", hours)),
                Some(w) => {
                    println!("{}", format!("Statistics (last {}h)", hours).bold());
                    println!("{}", "-".repeat(50));
                    println!("Readings:               {}", w.count);
                    println!("Current:                {}", format_value(w.current, &info.unit));
                    println!("Mean:                   {}", format_value(w.mean, &info.unit));
                    println!("Median:                 {}", format_value(w.median, &info.unit));
                    println!("Std deviation:          {:.3}", w.std);
                    println!(
                        "Range:                  {} .. {}",
                        format_value(w.min, &info.unit),
                        format_value(w.max, &info.unit)
                    );
                    println!("Recent anomalies:       {}", w.recent_anomalies);
                    if let Some(last) = &w.last_anomaly {
                        println!("Last anomaly:           {}", format_timestamp(last));
                    }
                }
            }
        }
    }

    Ok(())
}
