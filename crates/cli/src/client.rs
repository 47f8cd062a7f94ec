//! API client for the building monitor daemon

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the building monitor daemon
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    /// Make a POST request without a body
    pub async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn status(&self) -> Result<MonitoringStatus> {
        self.get("api/v1/status").await
    }

    pub async fn dashboard(&self) -> Result<Dashboard> {
        self.get("api/v1/dashboard").await
    }

    pub async fn alerts(&self, hours: i64) -> Result<Vec<Alert>> {
        self.get(&format!("api/v1/alerts?hours={}", hours)).await
    }

    pub async fn anomaly_summary(&self, hours: i64) -> Result<AnomalySummary> {
        self.get(&format!("api/v1/anomalies/summary?hours={}", hours))
            .await
    }

    pub async fn readings(&self, hours: i64) -> Result<Vec<ReadingSnapshot>> {
        self.get(&format!("api/v1/readings?hours={}", hours)).await
    }

    pub async fn sensor_statistics(&self, sensor_id: &str, hours: i64) -> Result<SensorStatistics> {
        self.get(&format!("api/v1/sensors/{}/stats?hours={}", sensor_id, hours))
            .await
    }

    /// Export document, kept as raw JSON so it can be written out unchanged
    pub async fn export(&self, hours: Option<i64>) -> Result<serde_json::Value> {
        let path = match hours {
            Some(hours) => format!("api/v1/export?hours={}", hours),
            None => "api/v1/export".to_string(),
        };
        self.get(&path).await
    }

    pub async fn step(&self) -> Result<MonitoringStatus> {
        self.post("api/v1/step").await
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringStatus {
    pub is_running: bool,
    pub start_time: Option<String>,
    pub runtime_seconds: Option<f64>,
    pub total_readings: u64,
    pub total_anomalies: u64,
    pub building_name: String,
    pub sensor_count: usize,
    pub zone_count: usize,
    pub recent_alerts_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub timestamp: String,
    pub sensor_id: String,
    pub anomaly_type: String,
    pub severity: String,
    pub confidence: f64,
    pub description: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub value: f64,
    pub expected_range: (f64, f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub total_anomalies: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub most_recent: Option<String>,
    pub critical_sensors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingSummary {
    pub active_sensors: usize,
    pub total_sensors: usize,
    pub failed_readings: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingSnapshot {
    pub timestamp: String,
    /// Either `{value, unit, quality, sensor_type, zone_id}` or `{error}`
    pub readings: BTreeMap<String, serde_json::Value>,
    pub building_summary: BuildingSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorInfo {
    pub sensor_id: String,
    pub sensor_type: String,
    pub unit: String,
    pub zone_id: Option<String>,
    pub position: (f64, f64, f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowStatistics {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    pub current: f64,
    pub recent_anomalies: usize,
    pub last_anomaly: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorStatistics {
    pub sensor_info: SensorInfo,
    pub is_active: bool,
    pub statistics: Option<WindowStatistics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingOverview {
    pub name: String,
    pub zones: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorHealth {
    pub total: usize,
    pub active: usize,
    pub health_percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertOverview {
    pub total_24h: usize,
    pub critical: usize,
    pub high: usize,
    pub recent: Vec<Alert>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub timestamp: String,
    pub building: BuildingOverview,
    pub sensors: SensorHealth,
    pub alerts: AlertOverview,
    pub monitoring: MonitoringStatus,
    pub anomaly_summary: AnomalySummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const STATUS_BODY: &str = r#"{
        "is_running": true,
        "start_time": "2024-06-01T12:00:00Z",
        "runtime_seconds": 120.5,
        "total_readings": 48,
        "total_anomalies": 3,
        "building_name": "HQ",
        "sensor_count": 16,
        "zone_count": 4,
        "recent_alerts_count": 2
    }"#;

    #[tokio::test]
    async fn test_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/status")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(STATUS_BODY)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let status = client.status().await.unwrap();

        mock.assert_async().await;
        assert!(status.is_running);
        assert_eq!(status.total_readings, 48);
        assert_eq!(status.building_name, "HQ");
    }

    #[tokio::test]
    async fn test_alerts_sends_hours() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v1/alerts")
            .match_query(Matcher::UrlEncoded("hours".into(), "6".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{
                    "timestamp": "2024-06-01T12:00:00Z",
                    "sensor_id": "energy_zone_1",
                    "anomaly_type": "energy_spike",
                    "severity": "high",
                    "confidence": 0.9,
                    "description": "Energy spike detected",
                    "recommendations": ["Check equipment"],
                    "value": 150.0,
                    "expected_range": [40.0, 60.0]
                }]"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let alerts = client.alerts(6).await.unwrap();

        mock.assert_async().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, "high");
        assert_eq!(alerts[0].expected_range, (40.0, 60.0));
    }

    #[tokio::test]
    async fn test_not_found_surfaces_error_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v1/sensors/ghost/stats")
            .match_query(Matcher::Any)
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "sensor 'ghost' not found"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.sensor_statistics("ghost", 24).await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("404"));
        assert!(message.contains("sensor 'ghost' not found"));
    }

    #[tokio::test]
    async fn test_step_posts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/step")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(STATUS_BODY)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let status = client.step().await.unwrap();

        mock.assert_async().await;
        assert_eq!(status.sensor_count, 16);
    }

    #[test]
    fn test_invalid_url() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
