use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use tracing::info;

use btts_tracker::config::AppConfig;
use btts_tracker::fixtures::{CachedFixtures, FixtureCache, FixtureSource};
use btts_tracker::fixtures_fetch::BbcFixtureSource;
use btts_tracker::persist::{MatchAssignment, SelectionStore};
use btts_tracker::tracker::{TrackerSlot, assemble};
use btts_tracker::week::{WeekKey, current_prediction_week};
use btts_tracker::{health, logging};

const USAGE: &str = "\
usage: btts_tracker <command> [options]

commands:
  tracker  [--week YYYY-MM-DD] [--json]
  save     --selector NAME --home TEAM --away TEAM [--week YYYY-MM-DD] [--kickoff HH:MM]
  remove   --selector NAME [--week YYYY-MM-DD]
  weeks
  fixtures [--date YYYY-MM-DD] [--refresh]
  backup   [--week YYYY-MM-DD]
  prune    --before YYYY-MM-DD
  health";

fn main() -> Result<()> {
    logging::init();
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let Some(command) = args.first().cloned() else {
        println!("{USAGE}");
        return Ok(());
    };
    let rest = &args[1..];

    let config = AppConfig::from_env();
    let store = SelectionStore::open(config.store_config());

    match command.as_str() {
        "tracker" => run_tracker(&config, &store, rest),
        "save" => run_save(&config, &store, rest),
        "remove" => run_remove(&config, &store, rest),
        "weeks" => run_weeks(&store),
        "fixtures" => run_fixtures(&config, &store, rest),
        "backup" => run_backup(&config, &store, rest),
        "prune" => run_prune(&store, rest),
        "health" => {
            let report = health::check(&store, &config);
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        "help" | "--help" | "-h" => {
            println!("{USAGE}");
            Ok(())
        }
        other => Err(anyhow!("unknown command {other:?}\n\n{USAGE}")),
    }
}

fn run_tracker(config: &AppConfig, store: &SelectionStore, args: &[String]) -> Result<()> {
    let week = week_arg(config, args)?;
    let doc = store.load(week)?;
    let report = assemble(week, doc.as_ref(), &config.selectors);

    if has_flag(args, "--json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("BTTS tracker for week {week}");
    for slot in &report.slots {
        match slot {
            TrackerSlot::Assigned {
                selector,
                assignment,
            } => println!("  {selector:<16} {}", assignment.label()),
            TrackerSlot::Placeholder { selector } => {
                println!("  {selector:<16} -- awaiting pick --")
            }
        }
    }
    println!(
        "Selected {}/{} ({}%)",
        report.selected_count,
        report.slots.len(),
        report.completion_percent
    );
    if !report.unrostered.is_empty() {
        println!("Not on roster: {}", report.unrostered.join(", "));
    }
    Ok(())
}

fn run_save(config: &AppConfig, store: &SelectionStore, args: &[String]) -> Result<()> {
    let week = week_arg(config, args)?;
    let selector = required(args, "--selector")?;
    let mut assignment = MatchAssignment::new(required(args, "--home")?, required(args, "--away")?);
    assignment.kickoff = arg_value(args, "--kickoff");

    let doc = store.save(week, &selector, assignment)?;
    info!(%week, selector = %selector, "selection saved");
    println!("Saved {selector} for {week} ({} selection(s) this week)", doc.len());
    Ok(())
}

fn run_remove(config: &AppConfig, store: &SelectionStore, args: &[String]) -> Result<()> {
    let week = week_arg(config, args)?;
    let selector = required(args, "--selector")?;
    if store.remove_selection(week, &selector)? {
        println!("Removed {selector} from {week}");
    } else {
        println!("{selector} had no selection for {week}");
    }
    Ok(())
}

fn run_weeks(store: &SelectionStore) -> Result<()> {
    for week in store.list_weeks()? {
        match store.load(week) {
            Ok(Some(doc)) => println!("{week}  {} selection(s)", doc.len()),
            Ok(None) => println!("{week}  (removed)"),
            Err(err) => println!("{week}  error: {err}"),
        }
    }
    Ok(())
}

fn run_fixtures(config: &AppConfig, store: &SelectionStore, args: &[String]) -> Result<()> {
    let date = match arg_value(args, "--date") {
        Some(raw) => parse_date(&raw)?,
        None => week_arg(config, args)?.date(),
    };
    let layout = store.layout()?;
    let upstream = BbcFixtureSource::new().with_competitions(config.competitions.clone());
    let source = CachedFixtures::new(FixtureCache::new(layout.fixtures), upstream);
    let fixtures = if has_flag(args, "--refresh") {
        source.refresh(date)?
    } else {
        source.fixtures_for(date)?
    };

    if fixtures.is_empty() {
        println!("No fixtures found for {date}");
    }
    for fixture in &fixtures {
        println!(
            "{:<6} {} vs {}  [{}]",
            fixture.kickoff.as_deref().unwrap_or("TBC"),
            fixture.home_team,
            fixture.away_team,
            fixture.competition.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn run_backup(config: &AppConfig, store: &SelectionStore, args: &[String]) -> Result<()> {
    let week = week_arg(config, args)?;
    match store.backup_week(week)? {
        Some(path) => println!("Backed up {week} to {}", path.display()),
        None => println!("Nothing to back up for {week}"),
    }
    Ok(())
}

fn run_prune(store: &SelectionStore, args: &[String]) -> Result<()> {
    let cutoff: WeekKey = required(args, "--before")?.parse()?;
    let removed = store.prune_weeks_before(cutoff)?;
    println!("Pruned {} week(s) before {cutoff}", removed.len());
    Ok(())
}

fn week_arg(config: &AppConfig, args: &[String]) -> Result<WeekKey> {
    match arg_value(args, "--week") {
        Some(raw) => raw.parse(),
        None => Ok(current_prediction_week(
            config.reference_weekday,
            config.same_day,
        )),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date {raw:?}, expected YYYY-MM-DD"))
}

fn required(args: &[String], flag: &str) -> Result<String> {
    arg_value(args, flag).ok_or_else(|| anyhow!("missing {flag}\n\n{USAGE}"))
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let prefix = format!("{flag}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == flag {
            let Some(next) = args.get(idx + 1) else {
                continue;
            };
            if !next.trim().is_empty() {
                return Some(next.trim().to_string());
            }
        }
    }
    None
}
