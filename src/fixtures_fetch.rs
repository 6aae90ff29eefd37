use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use crate::fixtures::{FixtureRecord, FixtureSource};
use crate::http_client::fetch_text;

const BBC_FIXTURES_URL: &str = "https://www.bbc.co.uk/sport/football/scores-fixtures";

// Headings and both generations of fixture markup, so document order gives the
// competition a fixture sits under.
const BLOCKS_CSS: &str = "h2, h3, article.sp-c-fixture, li[data-testid=\"match-list-item\"]";
const LEGACY_HOME_CSS: &str = ".sp-c-fixture__team--home .qa-full-team-name";
const LEGACY_AWAY_CSS: &str = ".sp-c-fixture__team--away .qa-full-team-name";
const LEGACY_TIME_CSS: &str = ".sp-c-fixture__number--time";
const TEAM_NAME_CSS: &str = "[class*=\"TeamNameWrapper\"], [data-testid=\"team-name\"]";
const TIME_CSS: &str = "time";

#[derive(Debug, Clone)]
pub struct BbcFixtureSource {
    base_url: String,
    competitions: Vec<String>,
}

impl Default for BbcFixtureSource {
    fn default() -> Self {
        Self {
            base_url: BBC_FIXTURES_URL.to_string(),
            competitions: Vec::new(),
        }
    }
}

impl BbcFixtureSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Keep only fixtures whose competition heading contains one of these names.
    pub fn with_competitions(mut self, competitions: Vec<String>) -> Self {
        self.competitions = competitions;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, date: NaiveDate) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            date.format("%Y-%m-%d")
        )
    }
}

impl FixtureSource for BbcFixtureSource {
    fn fixtures_for(&self, date: NaiveDate) -> Result<Vec<FixtureRecord>> {
        let url = self.url_for(date);
        let body = fetch_text(&url)?;
        let mut fixtures = parse_bbc_fixtures_html(&body)?;
        if !self.competitions.is_empty() {
            fixtures.retain(|f| competition_matches(f, &self.competitions));
        }
        info!(%date, count = fixtures.len(), "fetched bbc fixtures");
        Ok(fixtures)
    }
}

pub fn parse_bbc_fixtures_html(raw: &str) -> Result<Vec<FixtureRecord>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let blocks = selector(BLOCKS_CSS)?;
    let legacy_home = selector(LEGACY_HOME_CSS)?;
    let legacy_away = selector(LEGACY_AWAY_CSS)?;
    let legacy_time = selector(LEGACY_TIME_CSS)?;
    let team_name = selector(TEAM_NAME_CSS)?;
    let time = selector(TIME_CSS)?;

    let document = Html::parse_document(raw);
    let mut competition: Option<String> = None;
    let mut out = Vec::new();
    for el in document.select(&blocks) {
        let tag = el.value().name();
        if tag == "h2" || tag == "h3" {
            competition = Some(element_text(el)).filter(|t| !t.is_empty());
            continue;
        }

        let (home, away, kickoff) = if tag == "article" {
            (
                first_text(el, &legacy_home),
                first_text(el, &legacy_away),
                first_text(el, &legacy_time),
            )
        } else {
            let mut names = el.select(&team_name).map(element_text).filter(|t| !t.is_empty());
            (names.next(), names.next(), first_text(el, &time))
        };
        let (Some(home_team), Some(away_team)) = (home, away) else {
            debug!("skipping fixture block without both team names");
            continue;
        };

        out.push(FixtureRecord {
            home_team,
            away_team,
            kickoff,
            competition: competition.clone(),
            match_id: el
                .value()
                .attr("data-event-id")
                .or_else(|| el.value().id())
                .map(|s| s.to_string()),
        });
    }
    Ok(out)
}

fn competition_matches(fixture: &FixtureRecord, wanted: &[String]) -> bool {
    let Some(name) = fixture.competition.as_deref() else {
        return false;
    };
    let name = name.to_lowercase();
    wanted.iter().any(|w| name.contains(&w.to_lowercase()))
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|_| anyhow!("invalid css selector {css:?}"))
}

fn first_text(el: ElementRef<'_>, sel: &Selector) -> Option<String> {
    el.select(sel).map(element_text).find(|t| !t.is_empty())
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
