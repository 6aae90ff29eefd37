use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::persist::{MatchAssignment, write_json_atomic_unlocked};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureRecord {
    pub home_team: String,
    pub away_team: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kickoff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,
}

impl FixtureRecord {
    pub fn new(home_team: impl Into<String>, away_team: impl Into<String>) -> Self {
        Self {
            home_team: home_team.into(),
            away_team: away_team.into(),
            kickoff: None,
            competition: None,
            match_id: None,
        }
    }

    pub fn to_assignment(&self) -> MatchAssignment {
        let mut assignment = MatchAssignment::new(&self.home_team, &self.away_team);
        assignment.kickoff = self.kickoff.clone();
        assignment.match_id = self.match_id.clone();
        if let Some(competition) = self.competition.as_ref() {
            assignment
                .extra
                .insert("league".to_string(), competition.clone().into());
        }
        assignment
    }

    pub fn involves(&self, team: &str) -> bool {
        let needle = team.trim().to_lowercase();
        self.home_team.to_lowercase() == needle || self.away_team.to_lowercase() == needle
    }
}

pub trait FixtureSource {
    fn fixtures_for(&self, date: NaiveDate) -> Result<Vec<FixtureRecord>>;
}

#[derive(Debug, Clone)]
pub struct FixtureCache {
    dir: PathBuf,
}

impl FixtureCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("fixtures_{}.json", date.format("%Y-%m-%d")))
    }

    /// Cached fixtures for `date`; a date never cached yields an empty list.
    pub fn get_fixtures(&self, date: NaiveDate) -> Result<Vec<FixtureRecord>> {
        let path = self.file_for(date);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read {}", path.display()));
            }
        };
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid fixture cache {}", path.display()))
    }

    pub fn store_fixtures(&self, date: NaiveDate, fixtures: &[FixtureRecord]) -> Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| format!("create {}", self.dir.display()))?;
        write_json_atomic_unlocked(&self.file_for(date), &fixtures)?;
        debug!(%date, count = fixtures.len(), "cached fixtures");
        Ok(())
    }
}

impl FixtureSource for FixtureCache {
    fn fixtures_for(&self, date: NaiveDate) -> Result<Vec<FixtureRecord>> {
        self.get_fixtures(date)
    }
}

/// Read-through cache in front of an upstream source such as the BBC scraper.
pub struct CachedFixtures<S> {
    cache: FixtureCache,
    upstream: S,
}

impl<S: FixtureSource> CachedFixtures<S> {
    pub fn new(cache: FixtureCache, upstream: S) -> Self {
        Self { cache, upstream }
    }

    pub fn upstream(&self) -> &S {
        &self.upstream
    }

    pub fn refresh(&self, date: NaiveDate) -> Result<Vec<FixtureRecord>> {
        let fresh = self.upstream.fixtures_for(date)?;
        if !fresh.is_empty() {
            self.cache.store_fixtures(date, &fresh)?;
        }
        Ok(fresh)
    }
}

impl<S: FixtureSource> FixtureSource for CachedFixtures<S> {
    fn fixtures_for(&self, date: NaiveDate) -> Result<Vec<FixtureRecord>> {
        match self.cache.get_fixtures(date) {
            Ok(cached) if !cached.is_empty() => return Ok(cached),
            Ok(_) => {}
            Err(err) => warn!(error = %err, %date, "ignoring unreadable fixture cache"),
        }
        self.refresh(date)
    }
}
