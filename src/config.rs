use std::path::PathBuf;

use chrono::Weekday;
use tracing::warn;

use crate::persist::StoreConfig;
use crate::week::{SameDayPolicy, parse_weekday};

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_SELECTORS: &[&str] = &["Alan", "Bernie", "Chris", "Dave", "Eddie", "Frank"];

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub fallback_dir: Option<PathBuf>,
    pub reference_weekday: Weekday,
    pub same_day: SameDayPolicy,
    pub selectors: Vec<String>,
    pub competitions: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            fallback_dir: None,
            reference_weekday: Weekday::Sat,
            same_day: SameDayPolicy::default(),
            selectors: DEFAULT_SELECTORS.iter().map(|s| s.to_string()).collect(),
            competitions: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Reads `BTTS_*` variables, after loading a `.env` file if one is present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let data_dir = env_non_empty("BTTS_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let fallback_dir = env_non_empty("BTTS_FALLBACK_DIR").map(PathBuf::from);
        let reference_weekday = match env_non_empty("BTTS_REFERENCE_WEEKDAY") {
            Some(raw) => parse_weekday(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "unknown BTTS_REFERENCE_WEEKDAY, using Saturday");
                defaults.reference_weekday
            }),
            None => defaults.reference_weekday,
        };
        let same_day = match env_non_empty("BTTS_SAME_DAY") {
            Some(raw) => raw.parse().unwrap_or_else(|err| {
                warn!(error = %err, "invalid BTTS_SAME_DAY, using include");
                defaults.same_day
            }),
            None => defaults.same_day,
        };
        let selectors = env_non_empty("BTTS_SELECTORS")
            .map(|raw| split_list(&raw))
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.selectors);
        let competitions = env_non_empty("BTTS_COMPETITIONS")
            .map(|raw| split_list(&raw))
            .unwrap_or_default();

        Self {
            data_dir,
            fallback_dir,
            reference_weekday,
            same_day,
            selectors,
            competitions,
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        let config = StoreConfig::new(&self.data_dir);
        match self.fallback_dir.as_ref() {
            Some(fallback) => config.with_fallback(fallback),
            None => config,
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
