//! Indicator series abstractions

use crate::core::dataset::AnnualSeries;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Display;

/// World Bank indicators the dataset is assembled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum Indicator {
    /// Broad money, current LCU
    BroadMoney,
    /// Broad money growth, annual %
    BroadMoneyGrowth,
    /// Lending interest rate, %
    LendingRate,
    /// Official exchange rate, LCU per USD
    OfficialFxRate,
}

impl Indicator {
    pub fn code(&self) -> &'static str {
        match self {
            Indicator::BroadMoney => "FM.LBL.BMNY.CN",
            Indicator::BroadMoneyGrowth => "FM.LBL.BMNY.ZG",
            Indicator::LendingRate => "FR.INR.LEND",
            Indicator::OfficialFxRate => "PA.NUS.FCRF",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Indicator::BroadMoney => "Broad Money (Current LCU)",
            Indicator::BroadMoneyGrowth => "Broad Money Growth (Annual %)",
            Indicator::LendingRate => "Lending Interest Rate (%)",
            Indicator::OfficialFxRate => "Official Exchange Rate (LCU per USD)",
        }
    }

    pub fn source_url(&self) -> String {
        format!("https://data.worldbank.org/indicator/{}", self.code())
    }

    pub fn all() -> [Indicator; 4] {
        [
            Indicator::BroadMoney,
            Indicator::BroadMoneyGrowth,
            Indicator::OfficialFxRate,
            Indicator::LendingRate,
        ]
    }
}

impl Display for Indicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[async_trait]
pub trait IndicatorProvider: Send + Sync {
    /// Annual observations of `indicator` for `country` within `[start, end]`.
    /// Years without a published value are absent from the result.
    async fn fetch_series(
        &self,
        country: &str,
        indicator: Indicator,
        start: i32,
        end: i32,
    ) -> Result<AnnualSeries>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicator_codes() {
        let codes: Vec<String> = Indicator::all().iter().map(|i| i.to_string()).collect();
        assert_eq!(
            codes,
            vec!["FM.LBL.BMNY.CN", "FM.LBL.BMNY.ZG", "PA.NUS.FCRF", "FR.INR.LEND"]
        );
    }

    #[test]
    fn test_source_url() {
        assert_eq!(
            Indicator::LendingRate.source_url(),
            "https://data.worldbank.org/indicator/FR.INR.LEND"
        );
    }
}
