use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::core::cache::KeyValueCollection;
use crate::core::dataset::AnnualSeries;
use crate::core::fx::{FxProvider, FxSeries};
use crate::core::indicator::{Indicator, IndicatorProvider};
use crate::providers::util::get_text;

#[derive(Deserialize, Debug)]
struct IndicatorRow {
    date: String,
    value: Option<f64>,
}

/// Parses a `[page_meta, rows]` indicator response. Error-shaped payloads and
/// `null` rows yield `None`.
fn parse_series(body: &str) -> Result<Option<AnnualSeries>> {
    let payload: Value = serde_json::from_str(body).context("World Bank response is not JSON")?;
    let Some(pages) = payload.as_array() else {
        return Err(anyhow!("Unexpected World Bank response shape"));
    };
    if let Some(message) = pages.first().and_then(|meta| meta.get("message")) {
        warn!("World Bank returned an error message: {}", message);
        return Ok(None);
    }

    let rows: Vec<IndicatorRow> = match pages.get(1) {
        Some(Value::Array(_)) => serde_json::from_value(pages[1].clone())
            .context("Failed to parse World Bank rows")?,
        _ => return Ok(None),
    };

    Ok(Some(rows
        .into_iter()
        .filter_map(|row| {
            let year = row.date.trim().parse::<i32>().ok()?;
            let value = row.value.filter(|v| v.is_finite())?;
            Some((year, value))
        })
        .collect()))
}

pub struct WorldBankProvider {
    base_url: String,
    retries: usize,
    retry_delay_ms: u64,
    cache: Option<Arc<dyn KeyValueCollection>>,
    ttl: Option<Duration>,
}

impl WorldBankProvider {
    pub fn new(base_url: &str, retries: usize, retry_delay_ms: u64) -> Self {
        WorldBankProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            retries,
            retry_delay_ms,
            cache: None,
            ttl: None,
        }
    }

    /// Memoizes raw responses, keyed by request URL.
    pub fn with_cache(mut self, cache: Arc<dyn KeyValueCollection>, ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.ttl = Some(ttl);
        self
    }

    fn url(&self, country: &str, indicator: Indicator, start: i32, end: i32) -> String {
        format!(
            "{}/v2/country/{}/indicator/{}?format=json&per_page=2000&date={}:{}",
            self.base_url, country, indicator, start, end
        )
    }
}

#[async_trait]
impl IndicatorProvider for WorldBankProvider {
    #[instrument(
        name = "WorldBankFetch",
        skip(self),
        fields(country = %country, indicator = %indicator)
    )]
    async fn fetch_series(
        &self,
        country: &str,
        indicator: Indicator,
        start: i32,
        end: i32,
    ) -> Result<AnnualSeries> {
        let url = self.url(country, indicator, start, end);

        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(url.as_bytes()).await {
                match parse_series(&String::from_utf8_lossy(&cached)) {
                    Ok(Some(series)) => {
                        debug!("Cache hit for {}", url);
                        return Ok(series);
                    }
                    _ => {
                        debug!("Dropping unusable cached response for {}", url);
                        cache.remove(url.as_bytes()).await;
                    }
                }
            }
        }

        debug!("Requesting indicator data from {}", url);
        let body = get_text(&url, self.retries, self.retry_delay_ms)
            .await
            .map_err(|e| anyhow!("Request error: {} for {} {}", e, country, indicator))?;
        let Some(series) = parse_series(&body)? else {
            return Ok(AnnualSeries::new());
        };

        if let Some(cache) = &self.cache {
            cache.put(url.as_bytes(), body.as_bytes(), self.ttl).await;
        }
        Ok(series)
    }
}

/// FX fallback built on the official exchange rate of a reference country
/// per currency (e.g. EUR -> DE), inverted to USD per unit.
pub struct WorldBankFxProvider {
    indicators: Arc<dyn IndicatorProvider>,
    reference_countries: BTreeMap<String, String>,
}

impl WorldBankFxProvider {
    pub fn new(
        indicators: Arc<dyn IndicatorProvider>,
        reference_countries: BTreeMap<String, String>,
    ) -> Self {
        WorldBankFxProvider {
            indicators,
            reference_countries,
        }
    }
}

#[async_trait]
impl FxProvider for WorldBankFxProvider {
    fn name(&self) -> &str {
        "worldbank"
    }

    async fn usd_per_currency(&self, currency: &str, start: i32, end: i32) -> Result<FxSeries> {
        let reference = self
            .reference_countries
            .get(currency)
            .ok_or_else(|| anyhow!("No reference country for currency: {}", currency))?;

        let lcu_per_usd = self
            .indicators
            .fetch_series(reference, Indicator::OfficialFxRate, start, end)
            .await?;
        let usd_per_unit = lcu_per_usd
            .into_iter()
            .filter(|(_, v)| *v > 0.0)
            .map(|(year, v)| (year, 1.0 / v))
            .collect();

        Ok(FxSeries {
            usd_per_unit,
            source: format!("worldbank:{}:{}", Indicator::OfficialFxRate, reference),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCollection;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BROAD_MONEY: &str = r#"[
        {"page": 1, "pages": 1, "per_page": 2000, "total": 3},
        [
            {"indicator": {"id": "FM.LBL.BMNY.CN"}, "country": {"id": "JP"}, "date": "2021", "value": 1250000000000000.0},
            {"indicator": {"id": "FM.LBL.BMNY.CN"}, "country": {"id": "JP"}, "date": "2020", "value": null},
            {"indicator": {"id": "FM.LBL.BMNY.CN"}, "country": {"id": "JP"}, "date": "2019", "value": 1100000000000000.0}
        ]
    ]"#;

    async fn mount(server: &MockServer, country: &str, indicator: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/v2/country/{country}/indicator/{indicator}")))
            .and(query_param("format", "json"))
            .and(query_param("date", "2019:2021"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[test_log::test(tokio::test)]
    async fn test_fetch_skips_null_values() {
        let server = MockServer::start().await;
        mount(&server, "JP", "FM.LBL.BMNY.CN", BROAD_MONEY).await;

        let provider = WorldBankProvider::new(&server.uri(), 0, 1);
        let series = provider
            .fetch_series("JP", Indicator::BroadMoney, 2019, 2021)
            .await
            .unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series[&2019], 1.1e15);
        assert!(!series.contains_key(&2020));
    }

    #[test_log::test(tokio::test)]
    async fn test_error_message_and_null_rows_are_empty() {
        let server = MockServer::start().await;
        mount(
            &server,
            "XX",
            "FR.INR.LEND",
            r#"[{"message": [{"id": "120", "key": "Invalid value", "value": "The provided parameter value is not valid"}]}]"#,
        )
        .await;
        mount(
            &server,
            "DE",
            "FR.INR.LEND",
            r#"[{"page": 0, "pages": 0, "per_page": 2000, "total": 0}, null]"#,
        )
        .await;

        let provider = WorldBankProvider::new(&server.uri(), 0, 1);
        for country in ["XX", "DE"] {
            let series = provider
                .fetch_series(country, Indicator::LendingRate, 2019, 2021)
                .await
                .unwrap();
            assert!(series.is_empty(), "{country}");
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_transport_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let provider = WorldBankProvider::new(&server.uri(), 1, 1);
        let result = provider
            .fetch_series("US", Indicator::BroadMoney, 2019, 2021)
            .await;
        assert!(result.is_err());
    }

    #[test_log::test(tokio::test)]
    async fn test_cached_response_is_reused() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/country/JP/indicator/FM.LBL.BMNY.CN"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BROAD_MONEY))
            .expect(1)
            .mount(&server)
            .await;

        let provider = WorldBankProvider::new(&server.uri(), 0, 1)
            .with_cache(Arc::new(MemoryCollection::new()), Duration::from_secs(60));
        let first = provider
            .fetch_series("JP", Indicator::BroadMoney, 2019, 2021)
            .await
            .unwrap();
        let second = provider
            .fetch_series("JP", Indicator::BroadMoney, 2019, 2021)
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[test_log::test(tokio::test)]
    async fn test_error_payload_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/country/XX/indicator/FR.INR.LEND"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"[{"message": [{"id": "120", "key": "Invalid value"}]}]"#),
            )
            .expect(2)
            .mount(&server)
            .await;

        let cache = Arc::new(MemoryCollection::new());
        let provider = WorldBankProvider::new(&server.uri(), 0, 1)
            .with_cache(cache.clone(), Duration::from_secs(60));
        for _ in 0..2 {
            let series = provider
                .fetch_series("XX", Indicator::LendingRate, 2019, 2021)
                .await
                .unwrap();
            assert!(series.is_empty());
        }
        let url = provider.url("XX", Indicator::LendingRate, 2019, 2021);
        assert!(cache.get(url.as_bytes()).await.is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_stale_error_payload_in_cache_is_refetched() {
        let server = MockServer::start().await;
        mount(&server, "JP", "FM.LBL.BMNY.CN", BROAD_MONEY).await;

        let cache = Arc::new(MemoryCollection::new());
        let provider = WorldBankProvider::new(&server.uri(), 0, 1)
            .with_cache(cache.clone(), Duration::from_secs(60));
        let url = provider.url("JP", Indicator::BroadMoney, 2019, 2021);
        cache
            .put(url.as_bytes(), br#"[{"message": []}]"#, None)
            .await;

        let series = provider
            .fetch_series("JP", Indicator::BroadMoney, 2019, 2021)
            .await
            .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(
            cache.get(url.as_bytes()).await,
            Some(BROAD_MONEY.as_bytes().to_vec())
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_fx_fallback_inverts_official_rate() {
        let server = MockServer::start().await;
        mount(
            &server,
            "DE",
            "PA.NUS.FCRF",
            r#"[{"page": 1}, [
                {"date": "2021", "value": 0.845},
                {"date": "2020", "value": 0.877},
                {"date": "2019", "value": 0.0}
            ]]"#,
        )
        .await;

        let indicators = Arc::new(WorldBankProvider::new(&server.uri(), 0, 1));
        let fx = WorldBankFxProvider::new(
            indicators,
            BTreeMap::from([("EUR".to_string(), "DE".to_string())]),
        );
        let series = fx.usd_per_currency("EUR", 2019, 2021).await.unwrap();

        assert_eq!(series.source, "worldbank:PA.NUS.FCRF:DE");
        assert_eq!(series.usd_per_unit.len(), 2);
        assert!((series.usd_per_unit[&2021] - 1.0 / 0.845).abs() < 1e-12);

        let err = fx.usd_per_currency("CHF", 2019, 2021).await.unwrap_err();
        assert!(err.to_string().contains("No reference country"));
    }
}
