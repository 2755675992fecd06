//! Links broad money growth with lending rates and FX moves across the panel.
//!
//! Produces per-country correlations, a pooled OLS with country fixed effects,
//! event-window averages and a recent-period summary. The computation is a
//! pure function of the dataset: the same input always yields the same
//! summary, down to the serialized bytes.

use crate::core::dataset::{Dataset, DatasetMeta};
use crate::core::stats::{self, finite, mean, pearson};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

pub const RECENT_START_YEAR: i32 = 2015;
pub const RECENT_END_YEAR: i32 = 2025;

const REGRESSORS: [&str; 3] = ["lending_rate_pct", "fx_change_pct", "m2_growth_lag1"];

/// One country-year observation with the derived regressors attached.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelRow {
    pub code: String,
    pub country: String,
    pub year: i32,
    pub m2_growth_pct: Option<f64>,
    pub lending_rate_pct: Option<f64>,
    /// Positive when the local currency appreciated against USD
    pub fx_change_pct: Option<f64>,
    pub m2_growth_lag1: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub rows: usize,
    pub countries: usize,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryCorrelation {
    pub code: String,
    pub country: String,
    pub corr_m2_interest: Option<f64>,
    pub corr_m2_fx: Option<f64>,
    pub obs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub variable: String,
    pub coef: Option<f64>,
    pub std_err: Option<f64>,
    pub t_stat: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PooledOls {
    pub n_obs: usize,
    pub n_params: usize,
    pub r2: Option<f64>,
    pub coefficients: Vec<Coefficient>,
    pub formula: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventWindow {
    pub year: i32,
    pub title: String,
    pub mean_m2_growth_event_year: Option<f64>,
    pub mean_m2_growth_window_pm1: Option<f64>,
    pub mean_lending_rate_window_pm1: Option<f64>,
    pub mean_fx_change_window_pm1: Option<f64>,
    pub obs_window: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentCountry {
    pub code: String,
    pub country: String,
    pub mean_m2_growth_pct: Option<f64>,
    pub mean_lending_rate_pct: Option<f64>,
    pub mean_fx_change_pct: Option<f64>,
    pub obs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentSummary {
    pub start_year: i32,
    pub end_year: i32,
    pub countries: Vec<RecentCountry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub meta: DatasetMeta,
    pub sample: Sample,
    pub country_correlations: Vec<CountryCorrelation>,
    pub pooled_ols: Option<PooledOls>,
    pub event_windows: Vec<EventWindow>,
    pub recent_summary: RecentSummary,
}

/// Flattens the dataset into panel rows: every country-year with a broad
/// money level, ordered by country code then year.
pub fn panel(dataset: &Dataset) -> Vec<PanelRow> {
    let fx = dataset.fx_table();
    let mut rows = Vec::new();

    for (code, country) in &dataset.countries {
        let growth_by_year: BTreeMap<i32, Option<f64>> = country
            .annual
            .iter()
            .map(|r| (r.year, r.m2_growth_pct))
            .collect();

        let mut annual: Vec<_> = country.annual.iter().collect();
        annual.sort_by_key(|r| r.year);

        for record in annual.into_iter().filter(|r| r.m2_local.is_some()) {
            let year = record.year;
            let fx_change_pct = match (
                fx.usd_per(&country.currency, year),
                fx.usd_per(&country.currency, year - 1),
            ) {
                (Some(now), Some(prev)) => finite(100.0 * (now / prev - 1.0)),
                _ => None,
            };

            rows.push(PanelRow {
                code: code.clone(),
                country: country.name.clone(),
                year,
                m2_growth_pct: record.m2_growth_pct,
                lending_rate_pct: record.lending_rate_pct,
                fx_change_pct,
                m2_growth_lag1: growth_by_year.get(&(year - 1)).copied().flatten(),
            });
        }
    }
    rows
}

pub fn analyze(dataset: &Dataset) -> AnalysisSummary {
    let rows = panel(dataset);
    debug!("Built panel with {} rows", rows.len());

    AnalysisSummary {
        meta: dataset.meta.clone(),
        sample: sample(&rows),
        country_correlations: country_correlations(&rows),
        pooled_ols: pooled_ols(&rows),
        event_windows: dataset
            .events
            .iter()
            .map(|ev| event_window(&rows, ev.year, &ev.title))
            .collect(),
        recent_summary: recent_summary(&rows, RECENT_START_YEAR, RECENT_END_YEAR),
    }
}

fn sample(rows: &[PanelRow]) -> Sample {
    let codes: BTreeSet<&str> = rows.iter().map(|r| r.code.as_str()).collect();
    Sample {
        rows: rows.len(),
        countries: codes.len(),
        start_year: rows.iter().map(|r| r.year).min(),
        end_year: rows.iter().map(|r| r.year).max(),
    }
}

/// Rows grouped by country code, preserving the panel's order.
fn by_country(rows: &[PanelRow]) -> BTreeMap<&str, Vec<&PanelRow>> {
    let mut groups: BTreeMap<&str, Vec<&PanelRow>> = BTreeMap::new();
    for row in rows {
        groups.entry(row.code.as_str()).or_default().push(row);
    }
    groups
}

fn country_correlations(rows: &[PanelRow]) -> Vec<CountryCorrelation> {
    by_country(rows)
        .into_iter()
        .map(|(code, group)| CountryCorrelation {
            code: code.to_string(),
            country: group[0].country.clone(),
            corr_m2_interest: pearson(group.iter().map(|r| (r.m2_growth_pct, r.lending_rate_pct))),
            corr_m2_fx: pearson(group.iter().map(|r| (r.m2_growth_pct, r.fx_change_pct))),
            obs: group
                .iter()
                .filter(|r| {
                    r.m2_growth_pct.is_some()
                        && r.lending_rate_pct.is_some()
                        && r.fx_change_pct.is_some()
                })
                .count(),
        })
        .collect()
}

/// `m2_growth_pct ~ const + lending + fx change + lagged growth + country
/// dummies`, dropping the alphabetically first country as the baseline.
fn pooled_ols(rows: &[PanelRow]) -> Option<PooledOls> {
    let complete: Vec<(&PanelRow, [f64; 4])> = rows
        .iter()
        .filter_map(|r| {
            Some((
                r,
                [
                    r.m2_growth_pct?,
                    r.lending_rate_pct?,
                    r.fx_change_pct?,
                    r.m2_growth_lag1?,
                ],
            ))
        })
        .collect();

    let codes: BTreeSet<&str> = complete.iter().map(|(r, _)| r.code.as_str()).collect();
    let dummies: Vec<&str> = codes.into_iter().skip(1).collect();

    let mut x = Vec::with_capacity(complete.len());
    let mut y = Vec::with_capacity(complete.len());
    for (row, [growth, lending, fx_change, lag]) in &complete {
        let mut features = vec![1.0, *lending, *fx_change, *lag];
        features.extend(
            dummies
                .iter()
                .map(|code| if row.code == *code { 1.0 } else { 0.0 }),
        );
        x.push(features);
        y.push(*growth);
    }

    let Some(fit) = stats::ols(&x, &y) else {
        warn!(
            "Pooled regression skipped: {} complete rows cannot identify {} parameters",
            y.len(),
            1 + REGRESSORS.len() + dummies.len()
        );
        return None;
    };

    let names = std::iter::once("const".to_string())
        .chain(REGRESSORS.iter().map(|s| s.to_string()))
        .chain(dummies.iter().map(|s| s.to_string()));
    let coefficients = names
        .enumerate()
        .map(|(i, variable)| Coefficient {
            variable,
            coef: finite(fit.beta[i]),
            std_err: finite(fit.std_err[i]),
            t_stat: finite(fit.t_stat[i]),
        })
        .collect();

    Some(PooledOls {
        n_obs: fit.n_obs,
        n_params: fit.n_params,
        r2: fit.r2,
        coefficients,
        formula: format!(
            "m2_growth_pct ~ {} + country_fixed_effects",
            REGRESSORS.join(" + ")
        ),
    })
}

fn event_window(rows: &[PanelRow], year: i32, title: &str) -> EventWindow {
    let window: Vec<&PanelRow> = rows
        .iter()
        .filter(|r| (year - 1..=year + 1).contains(&r.year))
        .collect();

    EventWindow {
        year,
        title: title.to_string(),
        mean_m2_growth_event_year: mean(
            rows.iter()
                .filter(|r| r.year == year)
                .map(|r| r.m2_growth_pct),
        ),
        mean_m2_growth_window_pm1: mean(window.iter().map(|r| r.m2_growth_pct)),
        mean_lending_rate_window_pm1: mean(window.iter().map(|r| r.lending_rate_pct)),
        mean_fx_change_window_pm1: mean(window.iter().map(|r| r.fx_change_pct)),
        obs_window: window.iter().filter(|r| r.m2_growth_pct.is_some()).count(),
    }
}

fn recent_summary(rows: &[PanelRow], start_year: i32, end_year: i32) -> RecentSummary {
    let recent: Vec<PanelRow> = rows
        .iter()
        .filter(|r| (start_year..=end_year).contains(&r.year))
        .cloned()
        .collect();

    let mut countries: Vec<RecentCountry> = by_country(&recent)
        .into_iter()
        .map(|(code, group)| RecentCountry {
            code: code.to_string(),
            country: group[0].country.clone(),
            mean_m2_growth_pct: mean(group.iter().map(|r| r.m2_growth_pct)),
            mean_lending_rate_pct: mean(group.iter().map(|r| r.lending_rate_pct)),
            mean_fx_change_pct: mean(group.iter().map(|r| r.fx_change_pct)),
            obs: group.len(),
        })
        .collect();

    // highest growth first, countries without growth data last
    countries.sort_by(|a, b| match (a.mean_m2_growth_pct, b.mean_m2_growth_pct) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    RecentSummary {
        start_year,
        end_year,
        countries,
    }
}
