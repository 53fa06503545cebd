// Adapter selection keyed on the user's configured devices
use crate::application::ports::{
    AdapterError, DeviceFactory, InverterTelemetry, WallboxTelemetry,
};
use crate::domain::policy::{InverterKind, UserPolicy, WallboxKind};
use crate::domain::telemetry::{
    InverterReading, InverterStatistic, StatisticsRange, WallboxCommandResult, WallboxReading,
};
use crate::infrastructure::config::EndpointSettings;
use crate::infrastructure::goe::GoeClient;
use crate::infrastructure::solaredge::SolarEdgeClient;
use crate::infrastructure::solarman::SolarmanClient;
use async_trait::async_trait;
use chrono::NaiveDate;

pub enum InverterAdapter {
    Solarman(SolarmanClient),
    SolarEdge(SolarEdgeClient),
    Unconfigured,
}

#[async_trait]
impl InverterTelemetry for InverterAdapter {
    async fn real_time_data(&self) -> Result<InverterReading, AdapterError> {
        match self {
            InverterAdapter::Solarman(client) => client.real_time_data().await,
            InverterAdapter::SolarEdge(client) => client.real_time_data().await,
            InverterAdapter::Unconfigured => Err(AdapterError::NotConfigured("inverter")),
        }
    }

    async fn time_frame_data(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<InverterReading>, AdapterError> {
        match self {
            InverterAdapter::Solarman(client) => client.time_frame_data(from, to).await,
            InverterAdapter::SolarEdge(client) => client.time_frame_data(from, to).await,
            InverterAdapter::Unconfigured => Err(AdapterError::NotConfigured("inverter")),
        }
    }

    async fn statistics(
        &self,
        reference: NaiveDate,
        range: StatisticsRange,
    ) -> Result<Vec<InverterStatistic>, AdapterError> {
        match self {
            InverterAdapter::Solarman(client) => client.statistics(reference, range).await,
            InverterAdapter::SolarEdge(client) => client.statistics(reference, range).await,
            InverterAdapter::Unconfigured => Err(AdapterError::NotConfigured("inverter")),
        }
    }
}

pub enum WallboxAdapter {
    GoE(GoeClient),
    Unconfigured,
}

#[async_trait]
impl WallboxTelemetry for WallboxAdapter {
    async fn real_time_data(&self) -> Result<WallboxReading, AdapterError> {
        match self {
            WallboxAdapter::GoE(client) => client.real_time_data().await,
            WallboxAdapter::Unconfigured => Err(AdapterError::NotConfigured("wallbox")),
        }
    }

    async fn set_charging_speed(&self, kw: f64) -> Result<WallboxCommandResult, AdapterError> {
        match self {
            WallboxAdapter::GoE(client) => client.set_charging_speed(kw).await,
            WallboxAdapter::Unconfigured => Err(AdapterError::NotConfigured("wallbox")),
        }
    }
}

/// Builds HTTP adapters sharing one reqwest client
#[derive(Clone)]
pub struct HttpDeviceFactory {
    client: reqwest::Client,
    endpoints: EndpointSettings,
}

impl HttpDeviceFactory {
    pub fn new(client: reqwest::Client, endpoints: EndpointSettings) -> Self {
        Self { client, endpoints }
    }

    fn inverter_adapter(&self, policy: &UserPolicy) -> InverterAdapter {
        let credentials = &policy.credentials;
        match policy.inverter_kind {
            InverterKind::Solarman => InverterAdapter::Solarman(SolarmanClient::new(
                self.client.clone(),
                &self.endpoints.solarman,
                credentials,
            )),
            InverterKind::SolarEdge => InverterAdapter::SolarEdge(SolarEdgeClient::new(
                self.client.clone(),
                &self.endpoints.solaredge,
                credentials,
            )),
            InverterKind::None => InverterAdapter::Unconfigured,
        }
    }

    fn wallbox_adapter(&self, policy: &UserPolicy) -> WallboxAdapter {
        match policy.wallbox_kind {
            WallboxKind::GoE => WallboxAdapter::GoE(GoeClient::new(
                self.client.clone(),
                &self.endpoints.goe,
                &policy.credentials.goe_serial,
                &policy.credentials.goe_api_token,
                policy.max_kw_for_one_phase,
            )),
            WallboxKind::None => WallboxAdapter::Unconfigured,
        }
    }
}

impl DeviceFactory for HttpDeviceFactory {
    fn inverter(&self, policy: &UserPolicy) -> Box<dyn InverterTelemetry> {
        Box::new(self.inverter_adapter(policy))
    }

    fn wallbox(&self, policy: &UserPolicy) -> Box<dyn WallboxTelemetry> {
        Box::new(self.wallbox_adapter(policy))
    }
}
