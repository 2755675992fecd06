pub mod util;
pub mod world_bank;
pub mod yahoo_finance;

use crate::core::cache::KeyValueCollection;
use crate::core::config::AppConfig;
use std::sync::Arc;
use std::time::Duration;
use world_bank::{WorldBankFxProvider, WorldBankProvider};
use yahoo_finance::YahooFxProvider;

/// The concrete sources a dataset build reads from.
pub struct Sources {
    pub indicators: Arc<WorldBankProvider>,
    pub fx_primary: YahooFxProvider,
    pub fx_fallback: WorldBankFxProvider,
}

impl Sources {
    pub fn from_config(
        config: &AppConfig,
        cache: Option<Arc<dyn KeyValueCollection>>,
    ) -> Self {
        let wb_config = config
            .providers
            .world_bank
            .clone()
            .unwrap_or_default();
        let yahoo_config = config
            .providers
            .yahoo
            .clone()
            .unwrap_or_default();

        let mut world_bank = WorldBankProvider::new(
            &wb_config.base_url,
            wb_config.retries,
            wb_config.retry_delay_ms,
        );
        if let Some(cache) = cache {
            let ttl = Duration::from_secs(config.cache.ttl_hours * 3600);
            world_bank = world_bank.with_cache(cache, ttl);
        }
        let indicators = Arc::new(world_bank);

        Sources {
            fx_primary: YahooFxProvider::new(&yahoo_config.base_url),
            fx_fallback: WorldBankFxProvider::new(
                indicators.clone(),
                config.currency_reference_countries.clone(),
            ),
            indicators,
        }
    }
}
