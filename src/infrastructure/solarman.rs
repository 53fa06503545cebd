// Solarman cloud inverter adapter
use crate::application::ports::{AdapterError, InverterTelemetry};
use crate::domain::policy::DeviceCredentials;
use crate::domain::telemetry::{InverterReading, InverterStatistic, StatisticsRange};
use crate::infrastructure::http_client::ensure_success;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

const SERVICE: &str = "solarman";

/// Grid export below this many kW is treated as noise
const GRID_NOISE_KW: f64 = 0.01;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StationList {
    #[serde(default)]
    station_list: Vec<Station>,
}

#[derive(Debug, Deserialize)]
struct Station {
    id: i64,
}

/// Power values are in watts
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RealTimeInfo {
    success: Option<bool>,
    // history items carry `dateTime` instead
    #[serde(alias = "dateTime")]
    last_update_time: Option<i64>,
    battery_soc: Option<f64>,
    generation_power: Option<f64>,
    use_power: Option<f64>,
    grid_power: Option<f64>,
    purchase_power: Option<f64>,
    charge_power: Option<f64>,
    discharge_power: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct History<T> {
    success: Option<bool>,
    #[serde(default = "Vec::new")]
    station_data_items: Vec<T>,
}

/// Energy values are in kWh
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StatisticItem {
    generation_value: Option<f64>,
    use_value: Option<f64>,
    buy_value: Option<f64>,
    grid_value: Option<f64>,
    discharge_value: Option<f64>,
    charge_value: Option<f64>,
}

impl From<StatisticItem> for InverterStatistic {
    fn from(item: StatisticItem) -> Self {
        Self {
            production_kwh: item.generation_value.unwrap_or(0.0),
            usage_kwh: item.use_value.unwrap_or(0.0),
            from_grid_kwh: item.buy_value.unwrap_or(0.0),
            to_grid_kwh: item.grid_value.unwrap_or(0.0),
            from_battery_kwh: item.discharge_value.unwrap_or(0.0),
            to_battery_kwh: item.charge_value.unwrap_or(0.0),
        }
    }
}

/// Solarman `timeType` and the date format of its start/end fields
fn history_period(range: StatisticsRange) -> (u8, &'static str) {
    match range {
        StatisticsRange::Day => (2, "%Y-%m-%d"),
        StatisticsRange::Month => (3, "%Y-%m"),
        StatisticsRange::Year => (4, "%Y"),
    }
}

pub struct SolarmanClient {
    client: reqwest::Client,
    base_url: String,
    app_id: String,
    app_secret: String,
    email: String,
    password: String,
}

impl SolarmanClient {
    pub fn new(client: reqwest::Client, base_url: &str, credentials: &DeviceCredentials) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            app_id: credentials.solarman_app_id.clone(),
            app_secret: credentials.solarman_app_secret.clone(),
            email: credentials.solarman_app_email.clone(),
            password: credentials.solarman_app_pw.clone(),
        }
    }

    async fn post<T: DeserializeOwned>(
        &self,
        url: &str,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> Result<T, AdapterError> {
        let mut request = self.client.post(url).json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        Ok(ensure_success(SERVICE, response).await?.json().await?)
    }

    async fn auth_token(&self) -> Result<String, AdapterError> {
        let url = format!(
            "{}/account/v1.0/token?appId={}",
            self.base_url,
            urlencoding::encode(&self.app_id)
        );
        let body = json!({
            "appSecret": self.app_secret,
            "email": self.email,
            "password": self.password,
        });
        let token: TokenResponse = self.post(&url, None, body).await?;
        token
            .access_token
            .ok_or_else(|| unexpected("token response without access_token"))
    }

    async fn station_id(&self, token: &str) -> Result<i64, AdapterError> {
        let url = format!("{}/station/v1.0/list", self.base_url);
        let stations: StationList = self.post(&url, Some(token), json!({})).await?;
        stations
            .station_list
            .first()
            .map(|station| station.id)
            .ok_or_else(|| unexpected("account has no stations"))
    }

    async fn history<T: DeserializeOwned>(
        &self,
        time_type: u8,
        start: String,
        end: String,
    ) -> Result<Vec<T>, AdapterError> {
        let token = self.auth_token().await?;
        let station_id = self.station_id(&token).await?;

        let url = format!("{}/station/v1.0/history?language=en", self.base_url);
        let body = json!({
            "stationId": station_id,
            "timeType": time_type,
            "startTime": start,
            "endTime": end,
        });
        let history: History<T> = self.post(&url, Some(&token), body).await?;
        if history.success != Some(true) {
            return Err(unexpected("history request was not successful"));
        }
        Ok(history.station_data_items)
    }
}

#[async_trait]
impl InverterTelemetry for SolarmanClient {
    async fn real_time_data(&self) -> Result<InverterReading, AdapterError> {
        let token = self.auth_token().await?;
        let station_id = self.station_id(&token).await?;

        let url = format!("{}/station/v1.0/realTime?language=en", self.base_url);
        let info: RealTimeInfo = self
            .post(&url, Some(&token), json!({ "stationId": station_id }))
            .await?;
        if info.success != Some(true) {
            return Err(unexpected("real-time request was not successful"));
        }
        to_reading(&info)
    }

    async fn time_frame_data(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<InverterReading>, AdapterError> {
        let items: Vec<RealTimeInfo> = self
            .history(1, from.to_string(), to.to_string())
            .await?;
        items.iter().map(to_reading).collect()
    }

    async fn statistics(
        &self,
        reference: NaiveDate,
        range: StatisticsRange,
    ) -> Result<Vec<InverterStatistic>, AdapterError> {
        let (time_type, format) = history_period(range);
        let period = reference.format(format).to_string();
        let items: Vec<StatisticItem> = self.history(time_type, period.clone(), period).await?;
        if items.is_empty() {
            // no production recorded yet for the period
            return Ok(vec![InverterStatistic::default()]);
        }
        Ok(items.into_iter().map(InverterStatistic::from).collect())
    }
}

fn to_reading(info: &RealTimeInfo) -> Result<InverterReading, AdapterError> {
    let seconds = info
        .last_update_time
        .ok_or_else(|| unexpected("missing lastUpdateTime"))?;
    let timestamp: DateTime<Utc> = DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| unexpected(format!("invalid lastUpdateTime {seconds}")))?;

    let kw = |watts: Option<f64>| watts.unwrap_or(0.0) / 1000.0;
    let to_grid = kw(info.grid_power);

    Ok(InverterReading {
        timestamp,
        battery_soc_pct: info.battery_soc.unwrap_or(0.0),
        power_production_kw: kw(info.generation_power),
        power_usage_kw: kw(info.use_power),
        power_from_grid_kw: kw(info.purchase_power).abs(),
        power_to_grid_kw: if to_grid <= GRID_NOISE_KW { 0.0 } else { to_grid },
        power_from_battery_kw: kw(info.discharge_power).abs(),
        power_to_battery_kw: kw(info.charge_power),
    })
}

fn unexpected(detail: impl Into<String>) -> AdapterError {
    AdapterError::UnexpectedResponse {
        service: SERVICE,
        detail: detail.into(),
    }
}
