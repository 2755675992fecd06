//! Gap accounting for a built dataset and the run summary written by `update`

use crate::core::dataset::{Dataset, FxFallback};
use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryCoverage {
    pub rows: usize,
    pub expected_rows: usize,
    pub valid_m2: usize,
    pub valid_growth: usize,
    pub missing_m2: usize,
    /// First and last year with a broad money level
    pub first_year: Option<i32>,
    pub last_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coverage {
    pub start_year: i32,
    pub end_year: i32,
    pub expected_years_per_country: usize,
    pub country_count: usize,
    pub total_missing_m2: usize,
    pub currencies_without_fx: Vec<String>,
    pub by_country: BTreeMap<String, CountryCoverage>,
}

impl Coverage {
    pub fn of(dataset: &Dataset) -> Self {
        let start_year = dataset.meta.start_year;
        let end_year = dataset.meta.end_year;
        let expected = usize::try_from(end_year - start_year + 1).unwrap_or(0);

        let mut total_missing_m2 = 0;
        let by_country = dataset
            .countries
            .iter()
            .map(|(code, country)| {
                let in_range = |year: i32| (start_year..=end_year).contains(&year);
                let m2_years: Vec<i32> = country
                    .annual
                    .iter()
                    .filter(|r| in_range(r.year) && is_valid(r.m2_local))
                    .map(|r| r.year)
                    .collect();
                let valid_growth = country
                    .annual
                    .iter()
                    .filter(|r| in_range(r.year) && is_valid(r.m2_growth_pct))
                    .count();
                let missing_m2 = expected.saturating_sub(m2_years.len());
                total_missing_m2 += missing_m2;

                (
                    code.clone(),
                    CountryCoverage {
                        rows: country.annual.len(),
                        expected_rows: expected,
                        valid_m2: m2_years.len(),
                        valid_growth,
                        missing_m2,
                        first_year: m2_years.iter().min().copied(),
                        last_year: m2_years.iter().max().copied(),
                    },
                )
            })
            .collect();

        let currencies_without_fx = dataset
            .fx
            .usd_per_currency
            .iter()
            .filter(|(_, series)| series.is_empty())
            .map(|(ccy, _)| ccy.clone())
            .collect();

        Coverage {
            start_year,
            end_year,
            expected_years_per_country: expected,
            country_count: dataset.countries.len(),
            total_missing_m2,
            currencies_without_fx,
            by_country,
        }
    }

    pub fn has_gaps(&self) -> bool {
        self.total_missing_m2 > 0
    }

    /// Fails when `strict` is set and broad money gaps remain.
    pub fn enforce(&self, strict: bool) -> Result<()> {
        if strict && self.has_gaps() {
            bail!(
                "Strict mode failed: totalMissingM2={}",
                self.total_missing_m2
            );
        }
        Ok(())
    }
}

fn is_valid(value: Option<f64>) -> bool {
    value.is_some_and(f64::is_finite)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSummary {
    pub updated_at: DateTime<Utc>,
    pub data_files: Vec<PathBuf>,
    pub analysis_file: Option<PathBuf>,
    pub ran_analysis: bool,
    pub strict: bool,
    pub coverage: Coverage,
    pub fx_fallbacks: Vec<FxFallback>,
    pub notes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dataset::tests::sample_dataset;

    #[test]
    fn test_coverage_counts_gaps_per_country() {
        let coverage = Coverage::of(&sample_dataset());

        assert_eq!(coverage.expected_years_per_country, 3);
        assert_eq!(coverage.country_count, 2);
        assert_eq!(coverage.total_missing_m2, 1);

        let jp = &coverage.by_country["JP"];
        assert_eq!(jp.valid_m2, 2);
        assert_eq!(jp.valid_growth, 2);
        assert_eq!(jp.missing_m2, 1);
        assert_eq!(jp.first_year, Some(2019));
        assert_eq!(jp.last_year, Some(2021));

        let us = &coverage.by_country["US"];
        assert_eq!(us.missing_m2, 0);
        assert!(coverage.currencies_without_fx.is_empty());
    }

    #[test]
    fn test_strict_mode_fails_only_with_gaps() {
        let mut dataset = sample_dataset();
        let coverage = Coverage::of(&dataset);
        assert!(coverage.enforce(false).is_ok());
        let err = coverage.enforce(true).unwrap_err();
        assert_eq!(err.to_string(), "Strict mode failed: totalMissingM2=1");

        dataset.countries.get_mut("JP").unwrap().annual[1].m2_local = Some(1.2e15);
        let complete = Coverage::of(&dataset);
        assert!(!complete.has_gaps());
        assert!(complete.enforce(true).is_ok());
    }

    #[test]
    fn test_coverage_json_shape() {
        let json = serde_json::to_value(Coverage::of(&sample_dataset())).unwrap();
        assert_eq!(json["totalMissingM2"], 1);
        assert_eq!(json["expectedYearsPerCountry"], 3);
        assert_eq!(json["byCountry"]["JP"]["missing_m2"], 1);
    }
}
