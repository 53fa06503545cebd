// User charging policy: persisted settings plus the default overlay
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InverterKind {
    #[default]
    #[serde(rename = "")]
    None,
    Solarman,
    SolarEdge,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WallboxKind {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "goe")]
    GoE,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceCredentials {
    pub solarman_app_id: String,
    pub solarman_app_secret: String,
    pub solarman_app_email: String,
    pub solarman_app_pw: String,
    pub solar_edge_api_key: String,
    pub solar_edge_account_key: String,
    pub goe_serial: String,
    pub goe_api_token: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CarBattery {
    pub capacity_kwh: f64,
    pub current_pct: f64,
    pub target_pct: f64,
    /// Local hour of day (0-23) by which the target should be reached
    pub target_hour: u32,
}

/// Settings as stored per user. Optional values are filled from
/// [`PolicyDefaults`] when the policy is resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub inverter_kind: InverterKind,
    pub wallbox_kind: WallboxKind,
    pub use_awattar: bool,
    pub charge_with_excess_is_on: bool,
    pub force_charge_is_on: bool,
    pub pause_charging: bool,
    pub charge_until_min_battery_pct: Option<f64>,
    pub force_charge_under_cents: Option<f64>,
    pub force_charge_kw: Option<f64>,
    pub car: CarBattery,
    pub auto_execute_suggestions: bool,
    pub auto_turn_off_force_charging: bool,
    pub last_force_charge_reset: Option<DateTime<FixedOffset>>,
    pub credentials: DeviceCredentials,
}

/// Fixed policy constants overlaid on every loaded [`UserSettings`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyDefaults {
    pub force_charge_kw: f64,
    pub charge_until_min_battery_pct: f64,
    pub force_charge_under_cents: f64,
    pub current_price_fallback_cents: f64,
    pub kw_from_battery: f64,
    pub min_charging_power_kw: f64,
    pub max_charging_power_kw: f64,
    pub min_minutes_old_for_action: i64,
    pub kw_hysteresis_threshold: f64,
    pub max_kw_for_one_phase: f64,
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        Self {
            force_charge_kw: 5.0,
            charge_until_min_battery_pct: 100.0,
            force_charge_under_cents: 10.0,
            current_price_fallback_cents: 99.0,
            kw_from_battery: 2.0,
            min_charging_power_kw: 1.5,
            max_charging_power_kw: 9.0,
            min_minutes_old_for_action: 10,
            kw_hysteresis_threshold: 0.5,
            max_kw_for_one_phase: 4.0,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("minimum charging power {min} kW exceeds maximum {max} kW")]
    PowerBoundsInverted { min: f64, max: f64 },
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: f64 },
    #[error("target hour {0} is outside 0..=23")]
    TargetHourOutOfRange(u32),
}

impl PolicyDefaults {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.min_charging_power_kw > self.max_charging_power_kw {
            return Err(PolicyError::PowerBoundsInverted {
                min: self.min_charging_power_kw,
                max: self.max_charging_power_kw,
            });
        }
        for (field, value) in [
            ("force_charge_kw", self.force_charge_kw),
            ("kw_from_battery", self.kw_from_battery),
            ("min_charging_power_kw", self.min_charging_power_kw),
            ("kw_hysteresis_threshold", self.kw_hysteresis_threshold),
        ] {
            if value < 0.0 {
                return Err(PolicyError::Negative { field, value });
            }
        }
        Ok(())
    }
}

impl UserSettings {
    /// Checked before settings are persisted
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.car.target_hour > 23 {
            return Err(PolicyError::TargetHourOutOfRange(self.car.target_hour));
        }
        for (field, value) in [
            ("forceChargeKw", self.force_charge_kw),
            ("forceChargeUnderCents", self.force_charge_under_cents),
            ("chargeUntilMinBatteryPct", self.charge_until_min_battery_pct),
        ] {
            if let Some(value) = value.filter(|v| *v < 0.0) {
                return Err(PolicyError::Negative { field, value });
            }
        }
        if self.car.capacity_kwh < 0.0 {
            return Err(PolicyError::Negative {
                field: "capacityKwh",
                value: self.car.capacity_kwh,
            });
        }
        Ok(())
    }
}

/// Effective policy seen by the engine, optimizer and auto-reset.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPolicy {
    pub inverter_kind: InverterKind,
    pub wallbox_kind: WallboxKind,
    pub use_awattar: bool,
    pub charge_with_excess: bool,
    pub force_charge: bool,
    pub pause_charging: bool,
    pub charge_until_min_battery_pct: f64,
    pub force_charge_under_cents: f64,
    pub force_charge_kw: f64,
    pub current_price_fallback_cents: f64,
    pub kw_from_battery: f64,
    pub min_charging_power_kw: f64,
    pub max_charging_power_kw: f64,
    pub min_minutes_old_for_action: i64,
    pub kw_hysteresis_threshold: f64,
    pub max_kw_for_one_phase: f64,
    pub car: CarBattery,
    pub auto_execute_suggestions: bool,
    pub auto_turn_off_force_charging: bool,
    pub last_force_charge_reset: Option<DateTime<FixedOffset>>,
    #[serde(skip)]
    pub credentials: DeviceCredentials,
}

impl UserPolicy {
    pub fn resolve(settings: UserSettings, defaults: &PolicyDefaults) -> Self {
        Self {
            inverter_kind: settings.inverter_kind,
            wallbox_kind: settings.wallbox_kind,
            use_awattar: settings.use_awattar,
            charge_with_excess: settings.charge_with_excess_is_on,
            force_charge: settings.force_charge_is_on,
            pause_charging: settings.pause_charging,
            charge_until_min_battery_pct: settings
                .charge_until_min_battery_pct
                .unwrap_or(defaults.charge_until_min_battery_pct),
            force_charge_under_cents: settings
                .force_charge_under_cents
                .unwrap_or(defaults.force_charge_under_cents),
            force_charge_kw: settings.force_charge_kw.unwrap_or(defaults.force_charge_kw),
            current_price_fallback_cents: defaults.current_price_fallback_cents,
            kw_from_battery: defaults.kw_from_battery,
            min_charging_power_kw: defaults.min_charging_power_kw,
            max_charging_power_kw: defaults.max_charging_power_kw,
            min_minutes_old_for_action: defaults.min_minutes_old_for_action,
            kw_hysteresis_threshold: defaults.kw_hysteresis_threshold,
            max_kw_for_one_phase: defaults.max_kw_for_one_phase,
            car: settings.car,
            auto_execute_suggestions: settings.auto_execute_suggestions,
            auto_turn_off_force_charging: settings.auto_turn_off_force_charging,
            last_force_charge_reset: settings.last_force_charge_reset,
            credentials: settings.credentials,
        }
    }
}
