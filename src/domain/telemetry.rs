// Telemetry domain models
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Normalized real-time reading from an inverter adapter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InverterReading {
    pub timestamp: DateTime<Utc>,
    pub battery_soc_pct: f64,
    pub power_production_kw: f64,
    pub power_usage_kw: f64,
    pub power_from_grid_kw: f64,
    pub power_to_grid_kw: f64,
    pub power_from_battery_kw: f64,
    pub power_to_battery_kw: f64,
}

/// Bucket size of an inverter statistics query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatisticsRange {
    Day,
    Month,
    Year,
}

/// Energy totals of one history bucket, in kWh
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InverterStatistic {
    pub production_kwh: f64,
    pub usage_kwh: f64,
    pub from_grid_kwh: f64,
    pub to_grid_kwh: f64,
    pub from_battery_kwh: f64,
    pub to_battery_kwh: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarStatus {
    Waiting,
    Charging,
    Charged,
    #[default]
    Unknown,
}

/// Normalized real-time reading from a wallbox adapter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WallboxReading {
    pub kw: f64,
    pub ampere: f64,
    pub phase: u8,
    pub charging_allowed: bool,
    pub car_status: CarStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WallboxCommandResult {
    pub status: CommandStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WallboxCommandResult {
    pub fn success() -> Self {
        Self {
            status: CommandStatus::Success,
            message: None,
        }
    }

    pub fn success_with(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Success,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Error,
            message: Some(message.into()),
        }
    }
}

/// One hourly market price. Prices are in cents per kWh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceEntry {
    pub time: DateTime<Utc>,
    pub net_price_cents: f64,
    pub gross_price_cents: f64,
}

/// Start of the hour `time` falls into, as used for market price entries
pub fn start_of_hour<Tz: TimeZone>(time: DateTime<Tz>) -> DateTime<Utc> {
    let utc = time.with_timezone(&Utc);
    let seconds = utc.timestamp();
    DateTime::from_timestamp(seconds - seconds.rem_euclid(3600), 0).unwrap_or(utc)
}

/// Snapshot the suggestion engine works on. Always constructible: a failed
/// adapter leaves its fields at zero / unknown.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargingStatus {
    pub got_inverter_data: bool,
    pub inverter_timestamp: DateTime<Utc>,
    pub power_production_kw: f64,
    pub power_usage_kw: f64,
    pub battery_soc_pct: f64,

    pub got_wallbox_data: bool,
    pub kw: f64,
    pub ampere: f64,
    pub phase: u8,
    pub charging_allowed: bool,
    pub car_status: CarStatus,

    pub current_price_cents: Option<f64>,
}

impl ChargingStatus {
    pub fn assemble(
        inverter: Option<InverterReading>,
        wallbox: Option<WallboxReading>,
        current_price_cents: Option<f64>,
        now: DateTime<FixedOffset>,
    ) -> Self {
        let mut status = Self {
            got_inverter_data: inverter.is_some(),
            inverter_timestamp: now.with_timezone(&Utc),
            power_production_kw: 0.0,
            power_usage_kw: 0.0,
            battery_soc_pct: 0.0,
            got_wallbox_data: wallbox.is_some(),
            kw: 0.0,
            ampere: 0.0,
            phase: 0,
            charging_allowed: false,
            car_status: CarStatus::Unknown,
            current_price_cents,
        };

        if let Some(reading) = inverter {
            status.inverter_timestamp = reading.timestamp;
            status.power_production_kw = reading.power_production_kw;
            status.power_usage_kw = reading.power_usage_kw;
            status.battery_soc_pct = reading.battery_soc_pct;
        }

        if let Some(reading) = wallbox {
            status.kw = reading.kw;
            status.ampere = reading.ampere;
            status.phase = reading.phase;
            status.charging_allowed = reading.charging_allowed;
            status.car_status = reading.car_status;
        }

        status
    }

    /// Solar production not consumed by the house, ignoring the car's own draw
    pub fn exceeding_kw(&self) -> f64 {
        let usage_without_car = self.power_usage_kw - self.kw;
        self.power_production_kw - usage_without_car
    }
}
