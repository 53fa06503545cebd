// Ports to the device, price and settings collaborators
use crate::domain::policy::{UserPolicy, UserSettings};
use crate::domain::telemetry::{
    InverterReading, InverterStatistic, PriceEntry, StatisticsRange, WallboxCommandResult,
    WallboxReading,
};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("no {0} configured")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{service} responded with status {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("unexpected response from {service}: {detail}")]
    UnexpectedResponse {
        service: &'static str,
        detail: String,
    },
}

#[async_trait]
pub trait InverterTelemetry: Send + Sync {
    async fn real_time_data(&self) -> Result<InverterReading, AdapterError>;

    /// Recorded readings for the days `from..=to`
    async fn time_frame_data(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<InverterReading>, AdapterError>;

    /// Energy totals of the day, month or year containing `reference`
    async fn statistics(
        &self,
        reference: NaiveDate,
        range: StatisticsRange,
    ) -> Result<Vec<InverterStatistic>, AdapterError>;
}

#[async_trait]
pub trait WallboxTelemetry: Send + Sync {
    async fn real_time_data(&self) -> Result<WallboxReading, AdapterError>;

    /// Asks the wallbox to draw `kw`; 0 stops charging
    async fn set_charging_speed(&self, kw: f64) -> Result<WallboxCommandResult, AdapterError>;
}

#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Hourly prices from `offset_hours` before the current hour up to
    /// `hours` after it (0 = no upper bound). `None` on upstream failure.
    async fn prices(
        &self,
        now: DateTime<FixedOffset>,
        hours: i64,
        offset_hours: i64,
    ) -> Option<Vec<PriceEntry>>;

    /// Gross price of the hour `now` falls into
    async fn current_price(&self, now: DateTime<FixedOffset>) -> Option<f64> {
        let hour = crate::domain::telemetry::start_of_hour(now);
        self.prices(now, 5, 1)
            .await?
            .into_iter()
            .find(|entry| entry.time == hour)
            .map(|entry| entry.gross_price_cents)
    }
}

/// Resolves the configured adapters for a user once per request
pub trait DeviceFactory: Send + Sync {
    fn inverter(&self, policy: &UserPolicy) -> Box<dyn InverterTelemetry>;
    fn wallbox(&self, policy: &UserPolicy) -> Box<dyn WallboxTelemetry>;
}

#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// `None` for an unknown user
    async fn load(&self, user: &str) -> anyhow::Result<Option<UserSettings>>;

    async fn save(&self, user: &str, settings: &UserSettings) -> anyhow::Result<()>;

    /// Clears the force charge flag and stamps the reset time
    async fn record_force_charge_reset(
        &self,
        user: &str,
        at: DateTime<FixedOffset>,
    ) -> anyhow::Result<()>;

    async fn set_pause_charging(&self, user: &str, paused: bool) -> anyhow::Result<()>;
}
