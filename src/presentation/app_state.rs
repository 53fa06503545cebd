// Application state for HTTP handlers
use crate::application::charging_service::ChargingService;

#[derive(Clone)]
pub struct AppState {
    pub charging_service: ChargingService,
}
