// aWATTar market price client
use crate::application::ports::{AdapterError, PriceProvider};
use crate::domain::telemetry::{PriceEntry, start_of_hour};
use crate::infrastructure::http_client::ensure_success;
use crate::infrastructure::price_cache::TtlCache;
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::Deserialize;

const SERVICE: &str = "awattar";

/// Hours of history always requested so short offsets hit the same cache entry
const LOOKBACK_HOURS: i64 = 12;

#[derive(Debug, Deserialize)]
struct MarketData {
    data: Vec<MarketEntry>,
}

#[derive(Debug, Deserialize)]
struct MarketEntry {
    start_timestamp: i64,
    /// EUR per MWh
    marketprice: f64,
}

pub struct AwattarClient {
    client: reqwest::Client,
    base_url: String,
    vat_factor: f64,
    cache: TtlCache<Vec<PriceEntry>>,
}

impl AwattarClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        vat_factor: f64,
        cache_ttl: std::time::Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            vat_factor,
            cache: TtlCache::new(cache_ttl),
        }
    }

    async fn fetch(
        &self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<PriceEntry>, AdapterError> {
        let mut url = format!(
            "{}/marketdata?start={}",
            self.base_url,
            start.timestamp_millis()
        );
        if let Some(end) = end {
            url.push_str(&format!("&end={}", end.timestamp_millis()));
        }

        tracing::debug!(%url, "fetching market prices");
        let response = self.client.get(&url).send().await?;
        let market: MarketData = ensure_success(SERVICE, response).await?.json().await?;

        market
            .data
            .into_iter()
            .map(|entry| self.to_price_entry(entry))
            .collect()
    }

    fn to_price_entry(&self, entry: MarketEntry) -> Result<PriceEntry, AdapterError> {
        let time = DateTime::from_timestamp_millis(entry.start_timestamp).ok_or_else(|| {
            AdapterError::UnexpectedResponse {
                service: SERVICE,
                detail: format!("invalid start_timestamp {}", entry.start_timestamp),
            }
        })?;
        let net_price_cents = entry.marketprice / 10.0;
        Ok(PriceEntry {
            time,
            net_price_cents,
            gross_price_cents: net_price_cents * self.vat_factor,
        })
    }
}

/// Requested range around the current hour. `end` is `None` when the
/// upper end is left open.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PriceWindow {
    fetch_start: DateTime<Utc>,
    valid_start: DateTime<Utc>,
    end: Option<DateTime<Utc>>,
}

impl PriceWindow {
    /// `None` when an hour count does not fit into a timestamp
    fn around(hour: DateTime<Utc>, hours: i64, offset_hours: i64) -> Option<Self> {
        let end = match hours {
            0 => None,
            hours => Some(shift(hour, hours)?),
        };
        Some(Self {
            fetch_start: shift(hour, -LOOKBACK_HOURS)?,
            valid_start: shift(hour, offset_hours.checked_neg()?)?,
            end,
        })
    }

    fn cache_key(&self) -> String {
        match self.end {
            Some(end) => format!(
                "{}_{}",
                self.fetch_start.timestamp_millis(),
                end.timestamp_millis()
            ),
            None => self.fetch_start.timestamp_millis().to_string(),
        }
    }

    /// Keeps entries from `valid_start` up to `end`
    fn select(&self, entries: Vec<PriceEntry>) -> Vec<PriceEntry> {
        entries
            .into_iter()
            .filter(|entry| entry.time >= self.valid_start)
            .filter(|entry| self.end.is_none_or(|end| entry.time <= end))
            .collect()
    }
}

fn shift(hour: DateTime<Utc>, hours: i64) -> Option<DateTime<Utc>> {
    hour.checked_add_signed(Duration::try_hours(hours)?)
}

#[async_trait]
impl PriceProvider for AwattarClient {
    async fn prices(
        &self,
        now: DateTime<FixedOffset>,
        hours: i64,
        offset_hours: i64,
    ) -> Option<Vec<PriceEntry>> {
        let Some(window) = PriceWindow::around(start_of_hour(now), hours, offset_hours) else {
            tracing::warn!(hours, offset_hours, "price window out of range");
            return None;
        };
        let key = window.cache_key();

        match self
            .cache
            .get_or_try_fetch(&key, || self.fetch(window.fetch_start, window.end))
            .await
        {
            Ok(entries) => Some(window.select(entries)),
            Err(e) => {
                tracing::warn!(%key, "market prices unavailable: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 4, 13, 20, 0)
            .unwrap()
    }

    /// Hourly market data from `hour - 3h` to `hour + 8h`, price rising 10 EUR/MWh per hour
    fn market_body(hour: DateTime<Utc>) -> String {
        let data: Vec<_> = (-3..=8)
            .map(|i| {
                let start = hour + Duration::hours(i);
                json!({
                    "start_timestamp": start.timestamp_millis(),
                    "end_timestamp": (start + Duration::hours(1)).timestamp_millis(),
                    "marketprice": 100.0 + 10.0 * i as f64,
                    "unit": "Eur/MWh"
                })
            })
            .collect();
        json!({ "object": "list", "data": data }).to_string()
    }

    fn client(server: &Server) -> AwattarClient {
        AwattarClient::new(
            reqwest::Client::new(),
            server.url(),
            1.2,
            std::time::Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn test_prices_are_filtered_and_cached() {
        let hour = start_of_hour(now());
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Regex(r"^/marketdata\?start=\d+&end=\d+$".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(market_body(hour))
            .expect(1)
            .create_async()
            .await;
        let awattar = client(&server);

        let prices = awattar.prices(now(), 5, 1).await.unwrap();

        // hour - 1 through hour + 5
        assert_eq!(prices.len(), 7);
        assert_eq!(prices[0].time, hour - Duration::hours(1));
        assert_eq!(prices[6].time, hour + Duration::hours(5));
        assert!((prices[1].net_price_cents - 10.0).abs() < 1e-9);
        assert!((prices[1].gross_price_cents - 12.0).abs() < 1e-9);

        let current = awattar.current_price(now()).await.unwrap();
        assert!((current - 12.0).abs() < 1e-9);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", Matcher::Regex(r"^/marketdata".to_string()))
            .with_status(500)
            .with_body("maintenance")
            .expect(2)
            .create_async()
            .await;
        let awattar = client(&server);

        assert!(awattar.prices(now(), 5, 1).await.is_none());
        assert!(awattar.prices(now(), 5, 1).await.is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_out_of_range_hours_are_rejected() {
        let server = Server::new_async().await;
        let awattar = client(&server);

        assert!(awattar.prices(now(), 10_000_000_000_000_000, 0).await.is_none());
        assert!(awattar.prices(now(), 5, i64::MIN).await.is_none());
        assert!(awattar.prices(now(), i64::MAX / 3600, 1).await.is_none());
    }

    #[test]
    fn test_window_without_upper_bound() {
        let hour = Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap();
        let entries: Vec<PriceEntry> = (-4..40)
            .map(|i| PriceEntry {
                time: hour + Duration::hours(i),
                net_price_cents: 1.0,
                gross_price_cents: 1.2,
            })
            .collect();

        let open = PriceWindow::around(hour, 0, 2).unwrap().select(entries.clone());
        assert_eq!(open.len(), 42);
        assert_eq!(open[0].time, hour - Duration::hours(2));

        let bounded = PriceWindow::around(hour, 3, 0).unwrap().select(entries);
        assert_eq!(bounded.len(), 4);
        assert_eq!(bounded[3].time, hour + Duration::hours(3));
    }
}
