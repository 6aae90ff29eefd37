use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const WEEK_KEY_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeekKey(NaiveDate);

impl WeekKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(WEEK_KEY_FORMAT))
    }
}

impl FromStr for WeekKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let date = NaiveDate::parse_from_str(s, WEEK_KEY_FORMAT)
            .map_err(|err| anyhow!("invalid week key {s:?}: {err}"))?;
        // NaiveDate accepts signs, padding and unpadded fields; keys must round-trip to
        // the same file name.
        if date.format(WEEK_KEY_FORMAT).to_string() != s {
            return Err(anyhow!("invalid week key {s:?}, expected YYYY-MM-DD"));
        }
        Ok(Self(date))
    }
}

impl Serialize for WeekKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WeekKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameDayPolicy {
    /// On the reference weekday itself, today is the current round.
    #[default]
    Include,
    /// On the reference weekday itself, the round a week later is current.
    Exclude,
}

impl FromStr for SameDayPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "include" | "same" | "today" => Ok(Self::Include),
            "exclude" | "next" => Ok(Self::Exclude),
            other => Err(anyhow!("unknown same-day policy {other:?}")),
        }
    }
}

pub fn prediction_week(today: NaiveDate, reference: Weekday, policy: SameDayPolicy) -> WeekKey {
    let today_idx = today.weekday().num_days_from_monday() as i64;
    let target_idx = reference.num_days_from_monday() as i64;
    let mut days_ahead = (target_idx - today_idx).rem_euclid(7);
    if days_ahead == 0 && policy == SameDayPolicy::Exclude {
        days_ahead = 7;
    }
    WeekKey(today + Duration::days(days_ahead))
}

pub fn current_prediction_week(reference: Weekday, policy: SameDayPolicy) -> WeekKey {
    prediction_week(Local::now().date_naive(), reference, policy)
}

pub fn parse_weekday(raw: &str) -> Option<Weekday> {
    let lower = raw.trim().to_ascii_lowercase();
    let day = match lower.as_str() {
        "mon" | "monday" => Weekday::Mon,
        "tue" | "tues" | "tuesday" => Weekday::Tue,
        "wed" | "wednesday" => Weekday::Wed,
        "thu" | "thur" | "thurs" | "thursday" => Weekday::Thu,
        "fri" | "friday" => Weekday::Fri,
        "sat" | "saturday" => Weekday::Sat,
        "sun" | "sunday" => Weekday::Sun,
        _ => return None,
    };
    Some(day)
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}
