// go-e Charger cloud API adapter
use crate::application::ports::{AdapterError, WallboxTelemetry};
use crate::domain::telemetry::{CarStatus, WallboxCommandResult, WallboxReading};
use crate::infrastructure::http_client::ensure_success;
use async_trait::async_trait;
use serde::Deserialize;

const SERVICE: &str = "go-e";
const STATUS_KEYS: &str = "nrg,amp,psm,alw,car,utc,loc";

const SINGLE_PHASE_VOLTAGE: f64 = 230.0;
const THREE_PHASE_VOLTAGE: f64 = 400.0;
const MAX_SINGLE_PHASE_AMPERE: f64 = 16.0;
const MIN_AMPERE: u32 = 6;
const MAX_AMPERE: u32 = 32;
const MIN_CHARGING_KW: f64 = 1.0;

/// Index of the total power (W) in the `nrg` array
const NRG_TOTAL_POWER: usize = 11;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StatusResponse {
    nrg: Vec<f64>,
    amp: f64,
    psm: u8,
    alw: bool,
    car: Option<u8>,
}

/// Phase count and current the wallbox should use for `kw`. `(0, 0)` stops
/// charging.
pub fn phase_and_ampere_from_kw(kw: f64, max_kw_for_one_phase: f64) -> (u8, u32) {
    if kw < MIN_CHARGING_KW {
        return (0, 0);
    }

    let single_phase_current = kw * 1000.0 / SINGLE_PHASE_VOLTAGE;
    let (phase, current) = if single_phase_current > MAX_SINGLE_PHASE_AMPERE {
        (3, kw * 1000.0 / (THREE_PHASE_VOLTAGE * 3f64.sqrt()))
    } else {
        (1, single_phase_current)
    };
    let ampere = (current.round() as u32).clamp(MIN_AMPERE, MAX_AMPERE);

    if phase == 1 && kw > max_kw_for_one_phase {
        return (3, MIN_AMPERE);
    }
    (phase, ampere)
}

fn car_status(code: Option<u8>) -> CarStatus {
    match code {
        Some(2) => CarStatus::Charging,
        Some(3) => CarStatus::Waiting,
        Some(4) => CarStatus::Charged,
        _ => CarStatus::Unknown,
    }
}

pub struct GoeClient {
    client: reqwest::Client,
    endpoint: String,
    api_token: String,
    max_kw_for_one_phase: f64,
}

impl GoeClient {
    /// `url_template` contains `snr`, which is replaced by the charger serial
    pub fn new(
        client: reqwest::Client,
        url_template: &str,
        serial: &str,
        api_token: &str,
        max_kw_for_one_phase: f64,
    ) -> Self {
        Self {
            client,
            endpoint: url_template
                .replace("snr", serial)
                .trim_end_matches('/')
                .to_string(),
            api_token: api_token.to_string(),
            max_kw_for_one_phase,
        }
    }

    async fn get(&self, path_and_query: &str) -> Result<reqwest::Response, AdapterError> {
        let response = self
            .client
            .get(format!("{}{}", self.endpoint, path_and_query))
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        ensure_success(SERVICE, response).await
    }
}

#[async_trait]
impl WallboxTelemetry for GoeClient {
    async fn real_time_data(&self) -> Result<WallboxReading, AdapterError> {
        let status: StatusResponse = self
            .get(&format!("/api/status?filter={STATUS_KEYS}"))
            .await?
            .json()
            .await?;

        Ok(WallboxReading {
            kw: status.nrg.get(NRG_TOTAL_POWER).copied().unwrap_or(0.0) / 1000.0,
            ampere: status.amp,
            // psm 2 is the three phase mode
            phase: if status.psm == 2 { 3 } else { status.psm },
            charging_allowed: status.alw,
            car_status: car_status(status.car),
        })
    }

    async fn set_charging_speed(&self, kw: f64) -> Result<WallboxCommandResult, AdapterError> {
        let (phase, ampere) = phase_and_ampere_from_kw(kw, self.max_kw_for_one_phase);
        let query = if phase == 0 || ampere == 0 {
            "/api/set?frc=1".to_string()
        } else {
            let psm = if phase == 3 { 2 } else { 1 };
            format!("/api/set?amp={ampere}&psm={psm}&frc=2")
        };

        tracing::info!(kw, phase, ampere, "sending go-e charging command");
        match self.get(&query).await {
            Ok(_) => Ok(WallboxCommandResult::success()),
            Err(AdapterError::Status { status, body, .. }) => Ok(WallboxCommandResult::error(
                format!("go-e rejected command with status {status}: {body}"),
            )),
            Err(e) => Err(e),
        }
    }
}
