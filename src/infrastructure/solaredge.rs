// SolarEdge monitoring inverter adapter
use crate::application::ports::{AdapterError, InverterTelemetry};
use crate::domain::policy::DeviceCredentials;
use crate::domain::telemetry::{InverterReading, InverterStatistic, StatisticsRange};
use crate::infrastructure::http_client::ensure_success;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;

const SERVICE: &str = "solaredge";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Site {
    site_id: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PowerFlow {
    updated_at: String,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    pv: FlowNode,
    #[serde(default)]
    load: FlowNode,
    #[serde(default)]
    storage: FlowNode,
    #[serde(default)]
    grid: FlowNode,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FlowNode {
    power: f64,
    status: Option<String>,
    charge_level: Option<f64>,
}

impl FlowNode {
    fn power_when(&self, status: &str, divisor: f64) -> f64 {
        if self.status.as_deref() == Some(status) {
            self.power / divisor
        } else {
            0.0
        }
    }
}

pub struct SolarEdgeClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    account_key: String,
}

impl SolarEdgeClient {
    pub fn new(client: reqwest::Client, base_url: &str, credentials: &DeviceCredentials) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: credentials.solar_edge_api_key.clone(),
            account_key: credentials.solar_edge_account_key.clone(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, AdapterError> {
        let response = self
            .client
            .get(url)
            .header("X-API-KEY", &self.api_key)
            .header("X-Account-Key", &self.account_key)
            .header("Accept", "application/json")
            .send()
            .await?;
        Ok(ensure_success(SERVICE, response).await?.json().await?)
    }

    async fn site_id(&self) -> Result<String, AdapterError> {
        let sites: Vec<Site> = self.get(&format!("{}/sites", self.base_url)).await?;
        let site = sites
            .first()
            .ok_or_else(|| unexpected("account has no sites".to_string()))?;
        Ok(match &site.site_id {
            serde_json::Value::String(id) => id.clone(),
            other => other.to_string(),
        })
    }
}

#[async_trait]
impl InverterTelemetry for SolarEdgeClient {
    async fn real_time_data(&self) -> Result<InverterReading, AdapterError> {
        let site_id = self.site_id().await?;
        let url = format!("{}/sites/{}/power-flow", self.base_url, site_id);
        let flow: PowerFlow = self.get(&url).await?;
        to_reading(&flow)
    }

    /// History is not read from SolarEdge. The site lookup still runs so
    /// credential errors surface.
    async fn time_frame_data(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<InverterReading>, AdapterError> {
        let site_id = self.site_id().await?;
        tracing::debug!(%site_id, %from, %to, "no SolarEdge history available");
        Ok(Vec::new())
    }

    async fn statistics(
        &self,
        reference: NaiveDate,
        range: StatisticsRange,
    ) -> Result<Vec<InverterStatistic>, AdapterError> {
        let site_id = self.site_id().await?;
        tracing::debug!(%site_id, %reference, ?range, "no SolarEdge statistics available");
        Ok(Vec::new())
    }
}

fn to_reading(flow: &PowerFlow) -> Result<InverterReading, AdapterError> {
    let divisor = match flow.unit.as_deref() {
        Some("W") => 1000.0,
        _ => 1.0,
    };
    Ok(InverterReading {
        timestamp: parse_updated_at(&flow.updated_at)?,
        battery_soc_pct: flow.storage.charge_level.unwrap_or(0.0),
        power_production_kw: flow.pv.power / divisor,
        power_usage_kw: flow.load.power / divisor,
        power_from_grid_kw: flow.grid.power_when("IMPORT", divisor),
        power_to_grid_kw: flow.grid.power_when("EXPORT", divisor),
        power_from_battery_kw: flow.storage.power_when("DISCHARGE", divisor),
        power_to_battery_kw: flow.storage.power_when("CHARGE", divisor),
    })
}

/// RFC 3339 when an offset is given, otherwise the server's local time
fn parse_updated_at(value: &str) -> Result<DateTime<Utc>, AdapterError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| unexpected(format!("invalid updatedAt {value:?}: {e}")))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| unexpected(format!("updatedAt {value:?} does not exist locally")))
}

fn unexpected(detail: String) -> AdapterError {
    AdapterError::UnexpectedResponse {
        service: SERVICE,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use serde_json::json;

    fn credentials() -> DeviceCredentials {
        DeviceCredentials {
            solar_edge_api_key: "api-key".to_string(),
            solar_edge_account_key: "account-key".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_power_flow_of_first_site() {
        let mut server = Server::new_async().await;
        let sites = server
            .mock("GET", "/sites")
            .match_header("x-api-key", "api-key")
            .match_header("x-account-key", "account-key")
            .with_status(200)
            .with_body(json!([{ "siteId": 123 }, { "siteId": 456 }]).to_string())
            .create_async()
            .await;
        let flow = server
            .mock("GET", "/sites/123/power-flow")
            .with_status(200)
            .with_body(
                json!({
                    "updatedAt": "2024-06-01T11:00:00Z",
                    "unit": "kW",
                    "pv": { "active": true, "power": 6.5 },
                    "load": { "active": true, "power": 2.0 },
                    "storage": { "active": true, "power": 1.5, "status": "CHARGE", "chargeLevel": 72.0 },
                    "grid": { "active": true, "power": 3.0, "status": "EXPORT" }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = SolarEdgeClient::new(reqwest::Client::new(), &server.url(), &credentials());
        let reading = client.real_time_data().await.unwrap();

        assert_eq!(
            reading.timestamp,
            Utc.with_ymd_and_hms(2024, 6, 1, 11, 0, 0).unwrap()
        );
        assert_eq!(reading.power_production_kw, 6.5);
        assert_eq!(reading.power_usage_kw, 2.0);
        assert_eq!(reading.battery_soc_pct, 72.0);
        assert_eq!(reading.power_to_battery_kw, 1.5);
        assert_eq!(reading.power_from_battery_kw, 0.0);
        assert_eq!(reading.power_to_grid_kw, 3.0);
        assert_eq!(reading.power_from_grid_kw, 0.0);
        sites.assert_async().await;
        flow.assert_async().await;
    }

    #[tokio::test]
    async fn test_account_without_sites() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/sites")
            .with_body("[]")
            .create_async()
            .await;

        let client = SolarEdgeClient::new(reqwest::Client::new(), &server.url(), &credentials());
        let err = client.real_time_data().await.unwrap_err();
        assert!(matches!(err, AdapterError::UnexpectedResponse { .. }));
    }

    #[tokio::test]
    async fn test_history_is_empty_once_site_resolves() {
        let mut server = Server::new_async().await;
        let sites = server
            .mock("GET", "/sites")
            .with_body(json!([{ "siteId": "A-1" }]).to_string())
            .expect(2)
            .create_async()
            .await;

        let client = SolarEdgeClient::new(reqwest::Client::new(), &server.url(), &credentials());
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert!(client.time_frame_data(day, day).await.unwrap().is_empty());
        assert!(client
            .statistics(day, StatisticsRange::Day)
            .await
            .unwrap()
            .is_empty());
        sites.assert_async().await;
    }

    #[test]
    fn test_watt_units_are_converted() {
        let flow: PowerFlow = serde_json::from_value(json!({
            "updatedAt": "2024-06-01T11:00:00+02:00",
            "unit": "W",
            "pv": { "power": 4200.0 },
            "grid": { "power": 800.0, "status": "IMPORT" }
        }))
        .unwrap();

        let reading = to_reading(&flow).unwrap();
        assert_eq!(reading.power_production_kw, 4.2);
        assert_eq!(reading.power_from_grid_kw, 0.8);
        assert_eq!(reading.timestamp.timestamp(), 1_717_232_400);
    }

    #[test]
    fn test_local_timestamp_without_offset() {
        let parsed = parse_updated_at("2024-06-01 11:00:00").unwrap();
        let expected = Local
            .with_ymd_and_hms(2024, 6, 1, 11, 0, 0)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parsed, expected);
        assert!(parse_updated_at("yesterday").is_err());
    }
}
