use std::fs;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Datelike, Local};

use btts_tracker::config::AppConfig;
use btts_tracker::logging;
use btts_tracker::persist::{SelectionStore, StoreError, week_file_name, week_from_file_name};
use btts_tracker::tracker::{TrackerSlot, assemble};
use btts_tracker::week::{current_prediction_week, weekday_name};

const RULE: &str =
    "================================================================================";

fn main() -> Result<()> {
    logging::init();
    let config = AppConfig::from_env();
    let store = SelectionStore::open(config.store_config());

    println!("{RULE}");
    println!("BTTS TRACKER DIAGNOSTIC");
    println!("{RULE}");

    let now = Local::now();
    let week = current_prediction_week(config.reference_weekday, config.same_day);
    println!("\n1. DATE CALCULATION");
    println!("   Now: {}", now.format("%Y-%m-%d %H:%M:%S"));
    println!("   Today: {}", weekday_name(now.weekday()));
    println!(
        "   Current week (next {}, same-day {:?}): {week}",
        weekday_name(config.reference_weekday),
        config.same_day
    );

    println!("\n2. STORAGE");
    let errors = store.initialization_errors();
    if errors.is_empty() {
        println!("   Initialization errors: none");
    } else {
        println!("   Initialization errors:");
        for err in &errors {
            println!("     - {err}");
        }
    }
    let layout = match store.layout() {
        Ok(layout) => layout,
        Err(err) => {
            println!("   Storage unavailable: {err}");
            println!("\n{RULE}");
            return Ok(());
        }
    };
    println!("   Base path: {}", layout.base.display());
    println!("   Using fallback: {}", layout.is_fallback);
    list_files(&layout.selections);

    println!("\n3. LOADING SELECTIONS FOR {week}");
    let loaded = store.load(week);
    match &loaded {
        Ok(Some(doc)) => {
            println!("   Loaded {} selection(s)", doc.len());
            for (selector, assignment) in doc.iter() {
                println!("     - {selector}: {}", assignment.label());
            }
        }
        Ok(None) => println!("   No file yet: {}", week_file_name(week)),
        Err(err) => println!("   Load failed: {err}"),
    }

    println!("\n4. ALL STORED WEEKS");
    for stored in store.list_weeks()? {
        match store.load(stored) {
            Ok(Some(doc)) => {
                let names = doc.selectors().collect::<Vec<_>>().join(", ");
                println!("   {stored}: {} selection(s) [{names}]", doc.len());
            }
            Ok(None) => println!("   {stored}: removed while listing"),
            Err(err) => println!("   {stored}: {err}"),
        }
    }

    println!("\n5. TRACKER VIEW");
    let doc = loaded.as_ref().ok().and_then(|d| d.as_ref());
    let report = assemble(week, doc, &config.selectors);
    for slot in &report.slots {
        match slot {
            TrackerSlot::Assigned {
                selector,
                assignment,
            } => println!("   + {selector}: ASSIGNED {}", assignment.label()),
            TrackerSlot::Placeholder { selector } => println!("   - {selector}: PLACEHOLDER"),
        }
    }
    println!(
        "   Selected {}/{}, placeholders {}, completion {}%",
        report.selected_count,
        report.slots.len(),
        report.placeholder_count,
        report.completion_percent
    );

    println!("\n6. DIAGNOSIS");
    match loaded {
        Ok(Some(_)) if report.is_complete() => println!("   All selectors have assignments"),
        Ok(Some(_)) => println!("   Missing assignments for: {}", report.missing().join(", ")),
        Ok(None) => {
            println!("   No selections for {week}. Picks may have been saved under another week.")
        }
        Err(StoreError::Corrupt { path, .. }) => {
            println!("   {} exists but cannot be parsed (corrupt)", path.display())
        }
        Err(err) => println!("   Storage problem: {err}"),
    }
    if !report.unrostered.is_empty() {
        println!("   Selections from names not on the roster: {}", report.unrostered.join(", "));
    }
    println!("\n{RULE}");
    Ok(())
}

fn list_files(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        println!("   Selections directory missing: {}", dir.display());
        return;
    };
    let mut rows = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        let modified = meta
            .modified()
            .ok()
            .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "?".to_string());
        let marker = if week_from_file_name(&name).is_some() { "" } else { " (ignored)" };
        rows.push(format!("     - {name} ({} bytes, modified {modified}){marker}", meta.len()));
    }
    rows.sort();
    println!("   Selections directory: {} ({} file(s))", dir.display(), rows.len());
    for row in rows {
        println!("{row}");
    }
}
