//! Assembles the long-history dataset from indicator and FX sources.
//!
//! Indicator cells are copied as published: a missing value stays `None`.
//! FX series come from the primary source when it has data and from the
//! fallback otherwise; the substitution is recorded in `fx.fallbacks`. Years
//! the primary lacks are taken from the fallback where it has them and listed
//! in `fx.supplementedYears`. Remaining FX gaps inside the year range are
//! filled (see [`fill_years`]) and every filled year is listed in
//! `fx.filledYears`.

use crate::core::config::{AppConfig, CountryConfig};
use crate::core::dataset::{
    AnnualRecord, AnnualSeries, CountryRecord, Dataset, DatasetMeta, FxFallback, FxSection,
    SourceRef,
};
use crate::core::fx::{FxProvider, FxSeries, USD, fill_years};
use crate::core::indicator::{Indicator, IndicatorProvider};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

pub const UNIT_POLICY: &str = "All comparisons rendered as billions of selected base currency.";

/// Source label for a currency neither FX source could supply.
pub const UNAVAILABLE: &str = "unavailable";

struct ResolvedFx {
    series: FxSeries,
    fallback: Option<FxFallback>,
    supplemented: Vec<i32>,
}

pub struct DatasetBuilder<'a> {
    config: &'a AppConfig,
    indicators: &'a dyn IndicatorProvider,
    fx_primary: &'a dyn FxProvider,
    fx_fallback: &'a dyn FxProvider,
}

impl<'a> DatasetBuilder<'a> {
    pub fn new(
        config: &'a AppConfig,
        indicators: &'a dyn IndicatorProvider,
        fx_primary: &'a dyn FxProvider,
        fx_fallback: &'a dyn FxProvider,
    ) -> Self {
        DatasetBuilder {
            config,
            indicators,
            fx_primary,
            fx_fallback,
        }
    }

    /// Number of source requests a build makes, for progress reporting.
    pub fn steps(&self) -> u64 {
        (self.config.currencies().len() + self.config.countries.len()) as u64
    }

    /// Fetches everything sequentially and merges it into one document.
    /// `on_step` is invoked once per currency and once per country.
    pub async fn build(
        &self,
        generated_at: DateTime<Utc>,
        on_step: &dyn Fn(&str),
    ) -> Result<Dataset> {
        let start = self.config.start_year;
        let end = self.config.end_year();
        info!("Building dataset for {start}-{end}");

        let mut usd_per_currency = BTreeMap::new();
        let mut sources = BTreeMap::new();
        let mut filled_years = BTreeMap::new();
        let mut supplemented_years = BTreeMap::new();
        let mut fallbacks = Vec::new();

        for currency in self.config.currencies() {
            on_step(&currency);
            let resolved = self.resolve_fx(&currency, start, end).await;
            if !resolved.supplemented.is_empty() {
                supplemented_years.insert(currency.clone(), resolved.supplemented);
            }
            let (series, filled) = fill_years(&resolved.series.usd_per_unit, start, end);
            if !filled.is_empty() {
                debug!("{currency}: filled FX for {:?}", filled);
                filled_years.insert(currency.clone(), filled);
            }
            usd_per_currency.insert(currency.clone(), series);
            sources.insert(currency.clone(), resolved.series.source);
            fallbacks.extend(resolved.fallback);
        }

        let mut countries = BTreeMap::new();
        for country in &self.config.countries {
            on_step(&country.code);
            countries.insert(country.code.clone(), self.country_record(country).await);
        }

        Ok(Dataset {
            meta: DatasetMeta {
                generated_at,
                start_year: start,
                end_year: end,
                unit_policy: UNIT_POLICY.to_string(),
                notes: vec![
                    format!(
                        "M2 proxy uses World Bank broad money ({}).",
                        Indicator::BroadMoney.code()
                    ),
                    format!(
                        "FX conversion uses {} annual average close where available; World Bank {} fallback otherwise.",
                        self.fx_primary.name(),
                        Indicator::OfficialFxRate.code()
                    ),
                    "FX years the primary source lacks are taken from the fallback where available; those years are listed in fx.supplementedYears.".to_string(),
                    "FX years without a quote are linearly interpolated between neighbouring years and held flat at the edges; filled years are listed in fx.filledYears.".to_string(),
                    "Missing indicator values are left as null and never interpolated.".to_string(),
                    "Cross-country comparability is indicative because national aggregate definitions differ.".to_string(),
                ],
            },
            countries,
            fx: FxSection {
                usd_per_currency,
                sources,
                base_currencies: self.config.base_currencies.clone(),
                filled_years,
                supplemented_years,
                fallbacks,
            },
            events: self.config.events.clone(),
            sources: source_refs(),
        })
    }

    #[instrument(name = "ResolveFx", skip(self), fields(currency = %currency))]
    async fn resolve_fx(&self, currency: &str, start: i32, end: i32) -> ResolvedFx {
        if currency == USD {
            return ResolvedFx {
                series: FxSeries::fixed_usd(start, end),
                fallback: None,
                supplemented: Vec::new(),
            };
        }

        let reason = match self.fx_primary.usd_per_currency(currency, start, end).await {
            Ok(mut series) if !series.is_empty() => {
                debug!("FX for {currency} from {}", series.source);
                let supplemented = self.supplement(&mut series, currency, start, end).await;
                return ResolvedFx {
                    series,
                    fallback: None,
                    supplemented,
                };
            }
            Ok(_) => format!("{} returned no data", self.fx_primary.name()),
            Err(e) => e.to_string(),
        };
        warn!("Primary FX source failed for {currency}: {reason}");

        let (series, substitute) = match self.fx_fallback.usd_per_currency(currency, start, end).await
        {
            Ok(series) if !series.is_empty() => {
                let source = series.source.clone();
                (series, source)
            }
            Ok(_) => {
                warn!("Fallback FX source has no data for {currency}");
                (unavailable(), UNAVAILABLE.to_string())
            }
            Err(e) => {
                warn!("Fallback FX source failed for {currency}: {e}");
                (unavailable(), UNAVAILABLE.to_string())
            }
        };

        ResolvedFx {
            series,
            fallback: Some(FxFallback {
                currency: currency.to_string(),
                primary: self.fx_primary.name().to_string(),
                substitute,
                reason,
            }),
            supplemented: Vec::new(),
        }
    }

    /// Copies fallback values into the years of `[start, end]` the primary
    /// series lacks. Returns the years taken from the fallback.
    async fn supplement(
        &self,
        series: &mut FxSeries,
        currency: &str,
        start: i32,
        end: i32,
    ) -> Vec<i32> {
        let missing: Vec<i32> = (start..=end)
            .filter(|y| !series.usd_per_unit.contains_key(y))
            .collect();
        if missing.is_empty() {
            return missing;
        }

        let extra = match self.fx_fallback.usd_per_currency(currency, start, end).await {
            Ok(extra) => extra,
            Err(e) => {
                debug!("No fallback FX to supplement {currency}: {e}");
                return Vec::new();
            }
        };
        let taken: Vec<i32> = missing
            .into_iter()
            .filter(|year| match extra.usd_per_unit.get(year) {
                Some(v) if v.is_finite() && *v > 0.0 => {
                    series.usd_per_unit.insert(*year, *v);
                    true
                }
                _ => false,
            })
            .collect();
        if !taken.is_empty() {
            debug!("{currency}: took {:?} from {}", taken, extra.source);
        }
        taken
    }

    /// One row per year of the range; a failed fetch leaves the whole
    /// indicator column empty.
    async fn country_record(&self, country: &CountryConfig) -> CountryRecord {
        let m2 = self.series(country, Indicator::BroadMoney).await;
        let growth = self.series(country, Indicator::BroadMoneyGrowth).await;
        let lending = self.series(country, Indicator::LendingRate).await;

        let annual = self
            .config
            .years()
            .map(|year| AnnualRecord {
                year,
                m2_local: m2.get(&year).copied(),
                m2_growth_pct: growth.get(&year).copied(),
                lending_rate_pct: lending.get(&year).copied(),
            })
            .collect();

        CountryRecord {
            name: country.name.clone(),
            wb: country.wb.clone(),
            currency: country.currency.clone(),
            gdp_rank: country.gdp_rank,
            annual,
        }
    }

    async fn series(&self, country: &CountryConfig, indicator: Indicator) -> AnnualSeries {
        match self
            .indicators
            .fetch_series(
                &country.wb,
                indicator,
                self.config.start_year,
                self.config.end_year(),
            )
            .await
        {
            Ok(series) => {
                debug!("{} {}: {} values", country.code, indicator, series.len());
                series
            }
            Err(e) => {
                warn!(
                    "Fetching {} for {} failed, recording as gap: {e}",
                    indicator, country.code
                );
                AnnualSeries::new()
            }
        }
    }
}

fn unavailable() -> FxSeries {
    FxSeries {
        usd_per_unit: AnnualSeries::new(),
        source: UNAVAILABLE.to_string(),
    }
}

fn source_refs() -> Vec<SourceRef> {
    let mut refs: Vec<SourceRef> = Indicator::all()
        .into_iter()
        .map(|i| SourceRef {
            name: format!("World Bank - {}", i.description()),
            url: i.source_url(),
        })
        .collect();
    refs.push(SourceRef {
        name: "Yahoo Finance".to_string(),
        url: "https://finance.yahoo.com/".to_string(),
    });
    refs
}
