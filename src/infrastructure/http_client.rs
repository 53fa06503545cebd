// Shared reqwest client and response checks for the vendor adapters
use crate::application::ports::AdapterError;
use std::time::Duration;

pub fn build_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Turns a non-2xx response into [`AdapterError::Status`] with the body attached
pub async fn ensure_success(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, AdapterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AdapterError::Status {
        service,
        status: status.as_u16(),
        body,
    })
}
