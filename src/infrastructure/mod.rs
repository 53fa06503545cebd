// Infrastructure layer - External dependencies and adapters
pub mod awattar;
pub mod config;
pub mod devices;
pub mod goe;
pub mod http_client;
pub mod http_response;
pub mod policy_store;
pub mod price_cache;
pub mod solaredge;
pub mod solarman;
