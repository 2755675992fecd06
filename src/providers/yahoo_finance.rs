use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{Datelike, TimeZone, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::core::dataset::AnnualSeries;
use crate::core::fx::{FxProvider, FxSeries};
use crate::providers::util::http_client;

#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
}

#[derive(Debug, Deserialize)]
struct ChartItem {
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

/// Averages monthly closes per calendar year. Years whose mean is not a
/// positive number are dropped.
fn annual_mean_close(item: &ChartItem) -> AnnualSeries {
    let (Some(timestamps), Some(closes)) = (
        item.timestamp.as_ref(),
        item.indicators
            .as_ref()
            .and_then(|inds| inds.quote.first())
            .and_then(|q| q.close.as_ref()),
    ) else {
        return AnnualSeries::new();
    };

    let mut sums: BTreeMap<i32, (f64, usize)> = BTreeMap::new();
    for (ts, close) in timestamps.iter().zip(closes) {
        let (Some(close), Some(dt)) = (close, Utc.timestamp_opt(*ts, 0).single()) else {
            continue;
        };
        if !close.is_finite() {
            continue;
        }
        let entry = sums.entry(dt.year()).or_insert((0.0, 0));
        entry.0 += close;
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|(year, (sum, n))| (year, sum / n as f64))
        .filter(|(_, mean)| *mean > 0.0 && mean.is_finite())
        .collect()
}

/// Annual FX from the Yahoo Finance chart API. Tries `{CCY}USD=X` first and
/// falls back to the inverse pair `USD{CCY}=X`.
pub struct YahooFxProvider {
    base_url: String,
}

impl YahooFxProvider {
    pub fn new(base_url: &str) -> Self {
        YahooFxProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn annual_closes(&self, symbol: &str, start: i32, end: i32) -> Result<AnnualSeries> {
        let period1 = Utc
            .with_ymd_and_hms(start, 1, 1, 0, 0, 0)
            .single()
            .ok_or_else(|| anyhow!("Invalid start year: {}", start))?
            .timestamp();
        let period2 = Utc
            .with_ymd_and_hms(end + 1, 1, 1, 0, 0, 0)
            .single()
            .ok_or_else(|| anyhow!("Invalid end year: {}", end))?
            .timestamp();
        let url = format!(
            "{}/v8/finance/chart/{}?interval=1mo&period1={}&period2={}",
            self.base_url, symbol, period1, period2
        );
        debug!("Requesting FX history from {}", url);

        let client = http_client()?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for currency pair: {}", e, symbol))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for currency pair: {}",
                response.status(),
                symbol
            ));
        }

        let text = response.text().await?;
        let data: YahooChartResponse = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Failed to parse JSON response for {}: {}", symbol, e))?;

        let item = data
            .chart
            .result
            .and_then(|items| items.into_iter().next())
            .ok_or_else(|| anyhow!("No rate data found for currency pair: {}", symbol))?;

        Ok(annual_mean_close(&item)
            .into_iter()
            .filter(|(year, _)| (start..=end).contains(year))
            .collect())
    }
}

#[async_trait]
impl FxProvider for YahooFxProvider {
    fn name(&self) -> &str {
        "yahoo"
    }

    #[instrument(name = "YahooFxFetch", skip(self), fields(currency = %currency))]
    async fn usd_per_currency(&self, currency: &str, start: i32, end: i32) -> Result<FxSeries> {
        let mut reasons = Vec::new();

        let direct = format!("{currency}USD=X");
        match self.annual_closes(&direct, start, end).await {
            Ok(series) if !series.is_empty() => {
                return Ok(FxSeries {
                    usd_per_unit: series,
                    source: format!("yahoo:{direct}"),
                });
            }
            Ok(_) => reasons.push(format!("{direct}: no closes")),
            Err(e) => reasons.push(e.to_string()),
        }

        let inverse = format!("USD{currency}=X");
        match self.annual_closes(&inverse, start, end).await {
            Ok(series) if !series.is_empty() => {
                return Ok(FxSeries {
                    usd_per_unit: series.into_iter().map(|(y, v)| (y, 1.0 / v)).collect(),
                    source: format!("yahoo:{inverse}"),
                });
            }
            Ok(_) => reasons.push(format!("{inverse}: no closes")),
            Err(e) => reasons.push(e.to_string()),
        }

        Err(anyhow!(reasons.join("; ")))
    }
}
