// Application layer - use cases and the ports they depend on
pub mod charging_service;
pub mod ports;
