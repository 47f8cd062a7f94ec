//! Export of monitoring data

use anyhow::{Context, Result};

use crate::client::ApiClient;
use crate::output::{print_heading, print_info, print_success, OutputFormat};

fn array_len(document: &serde_json::Value, key: &str) -> usize {
    document
        .get(key)
        .and_then(|v| v.as_array())
        .map(|a| a.len())
        .unwrap_or(0)
}

/// Fetch the export document and write it to `output`, or print it
pub async fn export_data(
    client: &ApiClient,
    hours: Option<i64>,
    output: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let document = client.export(hours).await?;
    let json = serde_json::to_string_pretty(&document)?;
    let readings = array_len(&document, "readings");
    let alerts = array_len(&document, "alerts");

    if let Some(output_path) = output {
        std::fs::write(&output_path, &json)
            .with_context(|| format!("Failed to write {}", output_path))?;
        print_success(&format!("Monitoring data exported to {}", output_path));
        println!("Exported {} snapshots and {} alerts", readings, alerts);
        return Ok(());
    }

    match format {
        OutputFormat::Json => println!("{}", json),
        OutputFormat::Table => {
            print_heading("Monitoring Export");
            match hours {
                Some(hours) => println!("Window:     last {}h", hours),
                None => println!("Window:     full history"),
            }
            println!("Snapshots:  {}", readings);
            println!("Alerts:     {}", alerts);
            println!(
                "Sensors:    {}",
                document
                    .get("sensor_summary")
                    .and_then(|v| v.as_object())
                    .map(|o| o.len())
                    .unwrap_or(0)
            );
            println!();
            print_info("Use --output <file> to save to a file");
            print_info("Use --format json to see full data");
        }
    }

    Ok(())
}
