use crate::domain::policy::PolicyDefaults;
use serde::Deserialize;
use std::path::PathBuf;

const CONFIG_FILE: &str = "config/advisor";
const ENV_PREFIX: &str = "ADVISOR";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub endpoints: EndpointSettings,
    pub store: StoreSettings,
    pub prices: PriceSettings,
    pub policy: PolicyDefaults,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Base URLs of the vendor APIs. The go-e URL contains the literal `snr`,
/// which is replaced by the charger serial.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EndpointSettings {
    pub awattar: String,
    pub solarman: String,
    pub solaredge: String,
    pub goe: String,
    pub request_timeout_secs: u64,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            awattar: "https://api.awattar.at/v1".to_string(),
            solarman: "https://globalapi.solarmanpv.com".to_string(),
            solaredge: "https://monitoringapi.solaredge.com/v2".to_string(),
            goe: "https://snr.api.v3.go-e.io".to_string(),
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreSettings {
    pub settings_dir: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            settings_dir: PathBuf::from("data/users"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PriceSettings {
    pub cache_ttl_secs: u64,
    pub vat_factor: f64,
}

impl Default for PriceSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 3600,
            vat_factor: 1.2,
        }
    }
}

/// Built-in defaults, then `config/advisor.toml` if present, then
/// `ADVISOR__SECTION__KEY` environment variables.
pub fn load_config() -> anyhow::Result<AppConfig> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(CONFIG_FILE).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );
    build(builder)
}

fn build(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> anyhow::Result<AppConfig> {
    let config: AppConfig = builder.build()?.try_deserialize()?;
    config.policy.validate()?;
    Ok(config)
}
