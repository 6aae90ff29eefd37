use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::AppConfig;
use crate::fixtures_fetch::BbcFixtureSource;
use crate::persist::{SelectionStore, scratch_name};
use crate::week::{SameDayPolicy, weekday_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unavailable,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilesystemStatus {
    pub base_path: Option<PathBuf>,
    pub using_fallback: bool,
    pub selections_readable: bool,
    pub selections_writable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentInfo {
    pub data_dir: PathBuf,
    pub fallback_dir: Option<PathBuf>,
    pub reference_weekday: &'static str,
    pub same_day: &'static str,
    pub selectors: Vec<String>,
    pub competitions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServicesStatus {
    pub selection_store: HealthStatus,
    pub fixture_cache: bool,
    /// Upstream fixture page; reachability is only known once a fetch runs.
    pub fixture_source: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub environment: EnvironmentInfo,
    pub services: ServicesStatus,
    pub filesystem: FilesystemStatus,
    pub weeks_stored: Option<usize>,
    pub initialization_errors: Vec<String>,
    pub working_directory: Option<PathBuf>,
}

pub fn check(store: &SelectionStore, config: &AppConfig) -> HealthReport {
    let initialization_errors = store.initialization_errors();
    let working_directory = std::env::current_dir().ok();
    let environment = environment_info(config);
    let fixture_source = BbcFixtureSource::new().base_url().to_string();

    let Ok(layout) = store.layout() else {
        return HealthReport {
            status: HealthStatus::Unavailable,
            environment,
            services: ServicesStatus {
                selection_store: HealthStatus::Unavailable,
                fixture_cache: false,
                fixture_source,
            },
            filesystem: FilesystemStatus {
                base_path: None,
                using_fallback: false,
                selections_readable: false,
                selections_writable: false,
            },
            weeks_stored: None,
            initialization_errors,
            working_directory,
        };
    };

    let weeks_stored = store.list_weeks().ok().map(|w| w.len());
    let selections_readable = weeks_stored.is_some();
    let selections_writable = probe_writable(&layout.selections);
    let status = if !selections_readable || !selections_writable {
        HealthStatus::Unavailable
    } else if layout.is_fallback || !initialization_errors.is_empty() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    HealthReport {
        status,
        environment,
        services: ServicesStatus {
            selection_store: status,
            fixture_cache: probe_writable(&layout.fixtures),
            fixture_source,
        },
        filesystem: FilesystemStatus {
            base_path: Some(layout.base.clone()),
            using_fallback: layout.is_fallback,
            selections_readable,
            selections_writable,
        },
        weeks_stored,
        initialization_errors,
        working_directory,
    }
}

fn environment_info(config: &AppConfig) -> EnvironmentInfo {
    EnvironmentInfo {
        data_dir: config.data_dir.clone(),
        fallback_dir: config.fallback_dir.clone(),
        reference_weekday: weekday_name(config.reference_weekday),
        same_day: match config.same_day {
            SameDayPolicy::Include => "include",
            SameDayPolicy::Exclude => "exclude",
        },
        selectors: config.selectors.clone(),
        competitions: config.competitions.clone(),
    }
}

fn probe_writable(dir: &Path) -> bool {
    let probe = dir.join(scratch_name(".health_probe"));
    fs::write(&probe, b"ok").is_ok() && fs::remove_file(&probe).is_ok()
}
