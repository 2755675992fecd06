use crate::core::dataset::EventTag;
use anyhow::{Context, Result, bail};
use chrono::{Datelike, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::RangeInclusive;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Configuration shipped with the binary, used when no config file exists.
pub const DEFAULT_CONFIG: &str = include_str!("../../docs/example_config.yaml");

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CountryConfig {
    pub code: String,
    pub name: String,
    /// World Bank country code
    pub wb: String,
    pub currency: String,
    pub gdp_rank: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorldBankProviderConfig {
    pub base_url: String,
    #[serde(default = "default_retries")]
    pub retries: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for WorldBankProviderConfig {
    fn default() -> Self {
        WorldBankProviderConfig {
            base_url: "https://api.worldbank.org".to_string(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_retries() -> usize {
    2
}

fn default_retry_delay_ms() -> u64 {
    1500
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

impl Default for YahooProviderConfig {
    fn default() -> Self {
        YahooProviderConfig {
            base_url: "https://query1.finance.yahoo.com".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub world_bank: Option<WorldBankProviderConfig>,
    pub yahoo: Option<YahooProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            world_bank: Some(WorldBankProviderConfig::default()),
            yahoo: Some(YahooProviderConfig::default()),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OutputConfig {
    /// Every path receives an identical copy of the long-history dataset.
    pub data_paths: Vec<PathBuf>,
    pub analysis_path: PathBuf,
    pub summary_path: PathBuf,
    pub static_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            data_paths: vec![
                PathBuf::from("docs/data/m2_long_history.json"),
                PathBuf::from("static/data/m2_long_history.json"),
            ],
            analysis_path: PathBuf::from("reports/m2_macro_analysis_summary.json"),
            summary_path: PathBuf::from("reports/data_update_summary.json"),
            static_dir: PathBuf::from("static"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            ttl_hours: 12,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub start_year: i32,
    pub end_year: Option<i32>,
    pub countries: Vec<CountryConfig>,
    #[serde(default)]
    pub currency_reference_countries: BTreeMap<String, String>,
    #[serde(default = "default_base_currencies")]
    pub base_currencies: Vec<String>,
    #[serde(default)]
    pub events: Vec<EventTag>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub data_path: Option<String>,
}

fn default_base_currencies() -> Vec<String> {
    vec!["USD".to_string()]
}

impl AppConfig {
    /// Loads the config from the default location, falling back to the
    /// embedded default when none has been set up.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        if config_path.exists() {
            debug!("Loading config from {}", config_path.display());
            return Self::load_from_path(&config_path);
        }
        debug!("No config at {}, using built-in default", config_path.display());
        Self::from_yaml(DEFAULT_CONFIG)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "m2tracker", "m2tracker")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("org", "m2tracker", "m2tracker")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config = Self::from_yaml(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.countries.is_empty() {
            bail!("At least one country must be configured");
        }

        let mut seen = HashSet::new();
        for country in &self.countries {
            if !seen.insert(country.code.as_str()) {
                bail!("Duplicate country code: {}", country.code);
            }
        }

        let end_year = self.end_year();
        if self.start_year > end_year {
            bail!(
                "start_year {} is after end_year {}",
                self.start_year,
                end_year
            );
        }

        if self.output.data_paths.is_empty() {
            bail!("output.data_paths must name at least one file");
        }
        Ok(())
    }

    /// Configured end year, or the last completed calendar year.
    pub fn end_year(&self) -> i32 {
        self.end_year.unwrap_or_else(|| Utc::now().year() - 1)
    }

    pub fn years(&self) -> RangeInclusive<i32> {
        self.start_year..=self.end_year()
    }

    /// Every currency that needs an FX series: country currencies plus
    /// base currencies offered for display.
    pub fn currencies(&self) -> BTreeSet<String> {
        self.countries
            .iter()
            .map(|c| c.currency.clone())
            .chain(self.base_currencies.iter().cloned())
            .collect()
    }

    /// Primary dataset file; the analysis and server read from here.
    pub fn dataset_path(&self) -> &Path {
        // validate() guarantees at least one entry
        &self.output.data_paths[0]
    }
}
