//! The long-history dataset document and the views derived from it

use crate::core::fx::FxTable;
use crate::core::output::read_json;
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Countries shown when a selection names none the dataset knows.
pub const DEFAULT_SELECTION: [&str; 2] = ["US", "CN"];

/// Year -> value. Ordered so serialized output is stable.
pub type AnnualSeries = BTreeMap<i32, f64>;

/// A historical macro event, shown in chart tooltips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTag {
    pub year: i32,
    pub title: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetMeta {
    pub generated_at: DateTime<Utc>,
    pub start_year: i32,
    pub end_year: i32,
    pub unit_policy: String,
    pub notes: Vec<String>,
}

/// One country-year cell. `None` marks a gap in the source, never a guess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualRecord {
    pub year: i32,
    pub m2_local: Option<f64>,
    pub m2_growth_pct: Option<f64>,
    pub lending_rate_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryRecord {
    pub name: String,
    pub wb: String,
    pub currency: String,
    pub gdp_rank: u32,
    pub annual: Vec<AnnualRecord>,
}

/// Records that a currency's FX series did not come from the primary source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxFallback {
    pub currency: String,
    pub primary: String,
    pub substitute: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FxSection {
    pub usd_per_currency: BTreeMap<String, AnnualSeries>,
    pub sources: BTreeMap<String, String>,
    pub base_currencies: Vec<String>,
    #[serde(default)]
    pub filled_years: BTreeMap<String, Vec<i32>>,
    #[serde(default)]
    pub supplemented_years: BTreeMap<String, Vec<i32>>,
    #[serde(default)]
    pub fallbacks: Vec<FxFallback>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub meta: DatasetMeta,
    pub countries: BTreeMap<String, CountryRecord>,
    pub fx: FxSection,
    pub events: Vec<EventTag>,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertedPoint {
    pub year: i32,
    /// Billions of the base currency
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertedSeries {
    pub code: String,
    pub name: String,
    pub currency: String,
    pub base: String,
    pub points: Vec<ConvertedPoint>,
}

impl Dataset {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_json(path.as_ref()).with_context(|| {
            format!(
                "Failed to load dataset: {}. Run `m2tracker build` first",
                path.as_ref().display()
            )
        })
    }

    pub fn fx_table(&self) -> FxTable<'_> {
        FxTable::new(&self.fx.usd_per_currency)
    }

    /// Whether `base` can be used as a display currency.
    pub fn supports_base(&self, base: &str) -> bool {
        base == crate::core::fx::USD || self.fx.usd_per_currency.contains_key(base)
    }

    /// Resolves a comma separated list of country codes. Codes are matched
    /// case-insensitively, unknown codes and repeats are dropped, and an
    /// empty result falls back to [`DEFAULT_SELECTION`].
    pub fn select(&self, countries: &str) -> Vec<String> {
        let mut selected: Vec<String> = Vec::new();
        for code in countries.split(',').map(|c| c.trim().to_uppercase()) {
            if self.countries.contains_key(&code) && !selected.contains(&code) {
                selected.push(code);
            }
        }
        if selected.is_empty() {
            selected = DEFAULT_SELECTION
                .iter()
                .filter(|code| self.countries.contains_key(**code))
                .map(|code| code.to_string())
                .collect();
        }
        selected
    }

    /// Broad money of `code` for every year, in billions of `base`.
    pub fn converted_series(&self, code: &str, base: &str) -> Result<ConvertedSeries> {
        let country = self
            .countries
            .get(code)
            .ok_or_else(|| anyhow!("Unknown country: {}", code))?;
        if !self.supports_base(base) {
            return Err(anyhow!("Unsupported base currency: {}", base));
        }

        let fx = self.fx_table();
        let points: Vec<ConvertedPoint> = country
            .annual
            .iter()
            .map(|row| ConvertedPoint {
                year: row.year,
                value: row
                    .m2_local
                    .and_then(|v| fx.to_billions(v, &country.currency, base, row.year)),
            })
            .collect();
        debug!(
            "Converted {code} from {} to {base}: {} of {} years have values",
            country.currency,
            points.iter().filter(|p| p.value.is_some()).count(),
            points.len()
        );

        Ok(ConvertedSeries {
            code: code.to_string(),
            name: country.name.clone(),
            currency: country.currency.clone(),
            base: base.to_string(),
            points,
        })
    }
}
