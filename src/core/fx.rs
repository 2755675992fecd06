//! Currency conversion abstractions and the USD-chained conversion table

use crate::core::dataset::AnnualSeries;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Reference currency every conversion chains through.
pub const USD: &str = "USD";

pub const BILLION: f64 = 1e9;

/// Annual USD value of one unit of a currency, tagged with where it came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FxSeries {
    pub usd_per_unit: AnnualSeries,
    pub source: String,
}

impl FxSeries {
    pub fn fixed_usd(start: i32, end: i32) -> Self {
        FxSeries {
            usd_per_unit: (start..=end).map(|y| (y, 1.0)).collect(),
            source: "fixed".to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.usd_per_unit.is_empty()
    }
}

#[async_trait]
pub trait FxProvider: Send + Sync {
    /// Short label used when recording which source supplied a series.
    fn name(&self) -> &str;

    /// Annual USD per one unit of `currency` within `[start, end]`.
    async fn usd_per_currency(&self, currency: &str, start: i32, end: i32) -> Result<FxSeries>;
}

/// Converts amounts between currencies for a given year. Every rate is
/// derived from USD-per-unit quotes, so `a -> b` is always `a -> USD -> b`.
#[derive(Debug, Clone, Copy)]
pub struct FxTable<'a> {
    usd_per_currency: &'a BTreeMap<String, AnnualSeries>,
}

impl<'a> FxTable<'a> {
    pub fn new(usd_per_currency: &'a BTreeMap<String, AnnualSeries>) -> Self {
        FxTable { usd_per_currency }
    }

    pub fn usd_per(&self, currency: &str, year: i32) -> Option<f64> {
        if currency == USD {
            return Some(1.0);
        }
        self.usd_per_currency
            .get(currency)
            .and_then(|series| series.get(&year))
            .copied()
            .filter(|v| v.is_finite() && *v > 0.0)
    }

    /// Units of `to` per one unit of `from` in `year`.
    pub fn rate(&self, from: &str, to: &str, year: i32) -> Option<f64> {
        if from == to {
            return Some(1.0);
        }
        Some(self.usd_per(from, year)? / self.usd_per(to, year)?)
    }

    pub fn convert(&self, amount: f64, from: &str, to: &str, year: i32) -> Option<f64> {
        Some(amount * self.rate(from, to, year)?)
    }

    /// Converts a local-currency amount into billions of `base`.
    pub fn to_billions(&self, amount: f64, from: &str, base: &str, year: i32) -> Option<f64> {
        self.convert(amount, from, base, year).map(|v| v / BILLION)
    }
}

/// Fills every year of `[start, end]` missing from `series`: linear
/// interpolation between the nearest known years, nearest known value at the
/// edges. Returns the filled series and the years that were filled. An empty
/// input stays empty.
pub fn fill_years(series: &AnnualSeries, start: i32, end: i32) -> (AnnualSeries, Vec<i32>) {
    let known: AnnualSeries = series
        .range(start..=end)
        .filter(|(_, v)| v.is_finite())
        .map(|(y, v)| (*y, *v))
        .collect();
    if known.is_empty() {
        return (AnnualSeries::new(), Vec::new());
    }

    let mut filled = AnnualSeries::new();
    let mut filled_years = Vec::new();
    for year in start..=end {
        if let Some(v) = known.get(&year) {
            filled.insert(year, *v);
            continue;
        }
        let before = known.range(..year).next_back();
        let after = known.range(year + 1..).next();
        let value = match (before, after) {
            (Some((y0, v0)), Some((y1, v1))) => {
                let t = f64::from(year - y0) / f64::from(y1 - y0);
                v0 + (v1 - v0) * t
            }
            (Some((_, v)), None) | (None, Some((_, v))) => *v,
            (None, None) => continue,
        };
        filled.insert(year, value);
        filled_years.push(year);
    }
    (filled, filled_years)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn table_fixture() -> BTreeMap<String, AnnualSeries> {
        let mut map = BTreeMap::new();
        map.insert(
            "EUR".to_string(),
            AnnualSeries::from([(2020, 1.14), (2021, 1.18)]),
        );
        map.insert(
            "JPY".to_string(),
            AnnualSeries::from([(2020, 0.0094), (2021, 0.0091)]),
        );
        map.insert("GBP".to_string(), AnnualSeries::from([(2020, 1.28)]));
        map
    }

    #[test]
    fn test_conversion_chains_through_usd() {
        let map = table_fixture();
        let table = FxTable::new(&map);

        assert_eq!(table.convert(100.0, "USD", "USD", 2020), Some(100.0));
        assert_relative_eq!(
            table.convert(100.0, "EUR", "USD", 2020).unwrap(),
            114.0,
            epsilon = 1e-9
        );
        assert_relative_eq!(
            table.convert(1000.0, "JPY", "EUR", 2021).unwrap(),
            1000.0 * 0.0091 / 1.18,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_round_trip_reproduces_value() {
        let map = table_fixture();
        let table = FxTable::new(&map);

        for (from, to) in [("EUR", "JPY"), ("JPY", "GBP"), ("USD", "EUR")] {
            let original = 21_345_678_901_234.5;
            let there = table.convert(original, from, to, 2020).unwrap();
            let back = table.convert(there, to, from, 2020).unwrap();
            assert_relative_eq!(back, original, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_conversion_is_linear() {
        let map = table_fixture();
        let table = FxTable::new(&map);
        let a = 4.2e12;
        let b = 7.9e11;

        let separate = table.to_billions(a, "EUR", "JPY", 2021).unwrap()
            + table.to_billions(b, "EUR", "JPY", 2021).unwrap();
        let combined = table.to_billions(a + b, "EUR", "JPY", 2021).unwrap();
        assert_relative_eq!(separate, combined, max_relative = 1e-12);
    }

    #[test]
    fn test_missing_rate_yields_none() {
        let map = table_fixture();
        let table = FxTable::new(&map);

        assert_eq!(table.convert(1.0, "GBP", "USD", 2021), None);
        assert_eq!(table.convert(1.0, "USD", "CHF", 2020), None);
        assert_eq!(table.rate("CHF", "CHF", 2020), Some(1.0));
    }

    #[test]
    fn test_fill_years_interpolates_and_holds_edges() {
        let series = AnnualSeries::from([(2001, 2.0), (2004, 5.0)]);
        let (filled, filled_years) = fill_years(&series, 2000, 2006);

        assert_eq!(filled.len(), 7);
        assert_eq!(filled[&2000], 2.0);
        assert_relative_eq!(filled[&2002], 3.0);
        assert_relative_eq!(filled[&2003], 4.0);
        assert_eq!(filled[&2005], 5.0);
        assert_eq!(filled[&2006], 5.0);
        assert_eq!(filled_years, vec![2000, 2002, 2003, 2005, 2006]);
    }

    #[test]
    fn test_fill_years_leaves_empty_series_empty() {
        let (filled, filled_years) = fill_years(&AnnualSeries::new(), 2000, 2002);
        assert!(filled.is_empty());
        assert!(filled_years.is_empty());
    }
}
