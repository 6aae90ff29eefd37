use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::week::WeekKey;

pub const SELECTIONS_DIR: &str = "selections";
pub const FIXTURES_DIR: &str = "fixtures";
pub const BACKUPS_DIR: &str = "backups";

const WEEK_FILE_PREFIX: &str = "week_";
const WEEK_FILE_SUFFIX: &str = ".json";
const PROBE_FILE: &str = ".write_probe";
const RESERVED_FIELDS: [&str; 4] = ["home_team", "away_team", "kickoff", "match_id"];

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("selection file {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage unavailable at {}: {reason}", .path.display())]
    StorageUnavailable { path: PathBuf, reason: String },
    #[error("failed to write {}: {source}", .path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchAssignment {
    pub home_team: String,
    pub away_team: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kickoff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,
    // Whatever else the web layer stored alongside the pick; kept as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MatchAssignment {
    pub fn new(home_team: impl Into<String>, away_team: impl Into<String>) -> Self {
        Self {
            home_team: home_team.into(),
            away_team: away_team.into(),
            kickoff: None,
            match_id: None,
            extra: Map::new(),
        }
    }

    pub fn label(&self) -> String {
        format!("{} vs {}", self.home_team, self.away_team)
    }

    /// Drops `extra` keys that shadow the named fields, so the serialized object has
    /// no duplicate keys. A string `kickoff`/`match_id` fills its field when unset.
    pub fn normalized(mut self) -> Self {
        for (name, slot) in [
            ("kickoff", &mut self.kickoff),
            ("match_id", &mut self.match_id),
        ] {
            if slot.is_none() {
                if let Some(Value::String(text)) = self.extra.get(name) {
                    *slot = Some(text.clone());
                }
            }
        }
        for name in RESERVED_FIELDS {
            self.extra.remove(name);
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionDocument {
    entries: BTreeMap<String, MatchAssignment>,
}

impl SelectionDocument {
    pub fn get(&self, selector: &str) -> Option<&MatchAssignment> {
        self.entries.get(selector)
    }

    pub fn contains(&self, selector: &str) -> bool {
        self.entries.contains_key(selector)
    }

    pub fn insert(
        &mut self,
        selector: impl Into<String>,
        assignment: MatchAssignment,
    ) -> Option<MatchAssignment> {
        self.entries.insert(selector.into(), assignment)
    }

    pub fn remove(&mut self, selector: &str) -> Option<MatchAssignment> {
        self.entries.remove(selector)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn selectors(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MatchAssignment)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub base_path: PathBuf,
    pub fallback_path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            fallback_path: None,
        }
    }

    pub fn with_fallback(mut self, fallback_path: impl Into<PathBuf>) -> Self {
        self.fallback_path = Some(fallback_path.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub base: PathBuf,
    pub selections: PathBuf,
    pub fixtures: PathBuf,
    pub backups: PathBuf,
    pub is_fallback: bool,
}

impl StorageLayout {
    fn under(base: &Path, is_fallback: bool) -> Self {
        Self {
            base: base.to_path_buf(),
            selections: base.join(SELECTIONS_DIR),
            fixtures: base.join(FIXTURES_DIR),
            backups: base.join(BACKUPS_DIR),
            is_fallback,
        }
    }

    pub fn week_file(&self, week: WeekKey) -> PathBuf {
        self.selections.join(week_file_name(week))
    }
}

pub fn week_file_name(week: WeekKey) -> String {
    format!("{WEEK_FILE_PREFIX}{week}{WEEK_FILE_SUFFIX}")
}

pub fn week_from_file_name(name: &str) -> Option<WeekKey> {
    name.strip_prefix(WEEK_FILE_PREFIX)?
        .strip_suffix(WEEK_FILE_SUFFIX)?
        .parse()
        .ok()
}

pub struct SelectionStore {
    config: StoreConfig,
    layout: RwLock<Option<StorageLayout>>,
    week_locks: Mutex<HashMap<WeekKey, Arc<Mutex<()>>>>,
    init_errors: Mutex<Vec<String>>,
}

impl SelectionStore {
    /// Builds the store and prepares its directories. Preparation failures do not
    /// abort construction: they land in `initialization_errors` and every later
    /// operation reports `StorageUnavailable` until `ensure_storage_ready` succeeds.
    pub fn open(config: StoreConfig) -> Self {
        let store = Self {
            config,
            layout: RwLock::new(None),
            week_locks: Mutex::new(HashMap::new()),
            init_errors: Mutex::new(Vec::new()),
        };
        if let Err(err) = store.ensure_storage_ready() {
            warn!(error = %err, "selection storage is unavailable");
        }
        store
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn ensure_storage_ready(&self) -> Result<StorageLayout, StoreError> {
        let primary_err = match prepare_layout(&self.config.base_path, false) {
            Ok(layout) => return Ok(self.activate(layout)),
            Err(err) => err,
        };
        warn!(error = %primary_err, "primary storage could not be prepared");
        self.record_error(primary_err.to_string());

        let Some(fallback) = self.config.fallback_path.as_deref() else {
            self.deactivate();
            return Err(primary_err);
        };
        match prepare_layout(fallback, true) {
            Ok(layout) => {
                warn!(path = %fallback.display(), "using fallback storage location");
                Ok(self.activate(layout))
            }
            Err(fallback_err) => {
                warn!(error = %fallback_err, "fallback storage could not be prepared");
                self.record_error(fallback_err.to_string());
                self.deactivate();
                Err(fallback_err)
            }
        }
    }

    pub fn base_path(&self) -> Result<PathBuf, StoreError> {
        Ok(self.layout()?.base)
    }

    pub fn selections_path(&self) -> Result<PathBuf, StoreError> {
        Ok(self.layout()?.selections)
    }

    pub fn fixtures_path(&self) -> Result<PathBuf, StoreError> {
        Ok(self.layout()?.fixtures)
    }

    pub fn backups_path(&self) -> Result<PathBuf, StoreError> {
        Ok(self.layout()?.backups)
    }

    pub fn week_file_path(&self, week: WeekKey) -> Result<PathBuf, StoreError> {
        Ok(self.layout()?.week_file(week))
    }

    pub fn layout(&self) -> Result<StorageLayout, StoreError> {
        let guard = self.layout.read().unwrap_or_else(PoisonError::into_inner);
        guard.clone().ok_or_else(|| StoreError::StorageUnavailable {
            path: self.config.base_path.clone(),
            reason: "storage is not initialised".to_string(),
        })
    }

    pub fn initialization_errors(&self) -> Vec<String> {
        lock(&self.init_errors).clone()
    }

    pub fn load(&self, week: WeekKey) -> Result<Option<SelectionDocument>, StoreError> {
        let layout = self.layout()?;
        let path = layout.week_file(week);
        let doc = read_document(&path)?;
        debug!(%week, found = doc.is_some(), "loaded selections");
        Ok(doc)
    }

    pub fn save(
        &self,
        week: WeekKey,
        selector: &str,
        assignment: MatchAssignment,
    ) -> Result<SelectionDocument, StoreError> {
        let layout = self.layout()?;
        let path = layout.week_file(week);
        let week_lock = self.week_lock(week);
        let _guard = lock(&*week_lock);

        // A corrupt document aborts the save instead of being overwritten.
        let mut doc = read_document(&path)?.unwrap_or_default();
        doc.insert(selector, assignment.normalized());
        write_json_atomic(&path, &doc)?;
        debug!(%week, selector, entries = doc.len(), "saved selection");
        Ok(doc)
    }

    pub fn remove_selection(&self, week: WeekKey, selector: &str) -> Result<bool, StoreError> {
        let layout = self.layout()?;
        let path = layout.week_file(week);
        let week_lock = self.week_lock(week);
        let _guard = lock(&*week_lock);

        let Some(mut doc) = read_document(&path)? else {
            return Ok(false);
        };
        if doc.remove(selector).is_none() {
            return Ok(false);
        }
        if doc.is_empty() {
            remove_file_if_present(&path)?;
        } else {
            write_json_atomic(&path, &doc)?;
        }
        debug!(%week, selector, "removed selection");
        Ok(true)
    }

    pub fn list_weeks(&self) -> Result<Vec<WeekKey>, StoreError> {
        let layout = self.layout()?;
        let entries = fs::read_dir(&layout.selections).map_err(|source| StoreError::Io {
            path: layout.selections.clone(),
            source,
        })?;

        let mut weeks = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: layout.selections.clone(),
                source,
            })?;
            let name = entry.file_name();
            if let Some(week) = name.to_str().and_then(week_from_file_name) {
                weeks.push(week);
            }
        }
        weeks.sort();
        weeks.dedup();
        Ok(weeks)
    }

    pub fn backup_week(&self, week: WeekKey) -> Result<Option<PathBuf>, StoreError> {
        let layout = self.layout()?;
        let source = layout.week_file(week);
        let stamp = Local::now().format("%Y%m%dT%H%M%S%3f");
        let dest = layout.backups.join(format!("{WEEK_FILE_PREFIX}{week}_{stamp}.json"));
        match fs::copy(&source, &dest) {
            Ok(_) => {
                info!(%week, path = %dest.display(), "backed up week");
                Ok(Some(dest))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::WriteFailure { path: dest, source }),
        }
    }

    pub fn prune_weeks_before(&self, cutoff: WeekKey) -> Result<Vec<WeekKey>, StoreError> {
        let layout = self.layout()?;
        let mut removed = Vec::new();
        for week in self.list_weeks()?.into_iter().filter(|w| *w < cutoff) {
            let week_lock = self.week_lock(week);
            let _guard = lock(&*week_lock);
            remove_file_if_present(&layout.week_file(week))?;
            removed.push(week);
        }
        if !removed.is_empty() {
            info!(count = removed.len(), %cutoff, "pruned old weeks");
        }
        Ok(removed)
    }

    fn week_lock(&self, week: WeekKey) -> Arc<Mutex<()>> {
        lock(&self.week_locks).entry(week).or_default().clone()
    }

    fn activate(&self, layout: StorageLayout) -> StorageLayout {
        let mut guard = self.layout.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(layout.clone());
        layout
    }

    fn deactivate(&self) {
        let mut guard = self.layout.write().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }

    fn record_error(&self, message: String) {
        lock(&self.init_errors).push(message);
    }
}

fn prepare_layout(base: &Path, is_fallback: bool) -> Result<StorageLayout, StoreError> {
    let layout = StorageLayout::under(base, is_fallback);
    for dir in [&layout.selections, &layout.fixtures, &layout.backups] {
        fs::create_dir_all(dir).map_err(|err| StoreError::StorageUnavailable {
            path: dir.clone(),
            reason: err.to_string(),
        })?;
    }
    let probe = layout.selections.join(scratch_name(PROBE_FILE));
    fs::write(&probe, b"ok")
        .and_then(|_| fs::remove_file(&probe))
        .map_err(|err| StoreError::StorageUnavailable {
            path: layout.selections.clone(),
            reason: format!("not writable: {err}"),
        })?;
    Ok(layout)
}

fn read_document(path: &Path) -> Result<Option<SelectionDocument>, StoreError> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_slice::<SelectionDocument>(&raw)
        .map(Some)
        .map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Unique per call within the process and across processes sharing a directory.
pub(crate) fn scratch_name(prefix: &str) -> String {
    let seq = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}.{}-{seq}", std::process::id())
}

/// Callers must hold the lock for `path`: the temp file name is fixed.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    write_json_via(path, &path.with_extension("json.tmp"), value)
}

/// Lock-free variant for caches; each call writes through its own temp file.
pub(crate) fn write_json_atomic_unlocked<T: Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), StoreError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!("{}.tmp", scratch_name(&name)));
    write_json_via(path, &tmp, value)
}

fn write_json_via<T: Serialize>(path: &Path, tmp: &Path, value: &T) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(value).map_err(|err| StoreError::WriteFailure {
        path: path.to_path_buf(),
        source: io::Error::other(err),
    })?;
    if let Err(source) = write_then_swap(tmp, path, &json) {
        let _ = fs::remove_file(tmp);
        return Err(StoreError::WriteFailure {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

fn write_then_swap(tmp: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(tmp, path)
}

fn remove_file_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StoreError::WriteFailure {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
