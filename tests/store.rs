use std::fs;
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;

use btts_tracker::persist::{MatchAssignment, SelectionStore, StoreConfig, StoreError};
use btts_tracker::week::WeekKey;

fn key(raw: &str) -> WeekKey {
    raw.parse().expect("valid week key")
}

fn open_store() -> (TempDir, SelectionStore) {
    let dir = tempfile::tempdir().expect("temp dir");
    let store = SelectionStore::open(StoreConfig::new(dir.path().join("data")));
    (dir, store)
}

#[test]
fn open_creates_directory_layout() {
    let (dir, store) = open_store();
    let base = dir.path().join("data");
    assert!(base.join("selections").is_dir());
    assert!(base.join("fixtures").is_dir());
    assert!(base.join("backups").is_dir());
    assert!(store.initialization_errors().is_empty());
    assert!(!store.layout().expect("layout").is_fallback);
}

#[test]
fn never_saved_week_is_absent() {
    let (_dir, store) = open_store();
    assert!(store.load(key("2025-10-25")).expect("load").is_none());
}

#[test]
fn selectors_merge_into_one_document() {
    let (_dir, store) = open_store();
    let week = key("2025-10-25");
    store
        .save(week, "Alice", MatchAssignment::new("Arsenal", "Chelsea"))
        .expect("save alice");
    store
        .save(week, "Bob", MatchAssignment::new("Leeds", "Spurs"))
        .expect("save bob");

    let doc = store.load(week).expect("load").expect("document present");
    assert_eq!(doc.len(), 2);
    assert_eq!(doc.get("Alice"), Some(&MatchAssignment::new("Arsenal", "Chelsea")));
    assert_eq!(doc.get("Bob"), Some(&MatchAssignment::new("Leeds", "Spurs")));
}

#[test]
fn saved_assignment_round_trips_unchanged() {
    let (_dir, store) = open_store();
    let week = key("2025-10-25");
    let mut pick = MatchAssignment::new("Brentford", "Fulham");
    pick.kickoff = Some("12:30".to_string());
    pick.match_id = Some("EFBO2547".to_string());
    pick.extra.insert("league".to_string(), "Premier League".into());

    store.save(week, "Carol", pick.clone()).expect("save");
    let doc = store.load(week).expect("load").expect("present");
    assert_eq!(doc.get("Carol"), Some(&pick));
}

#[test]
fn resaving_a_selector_overwrites_only_that_selector() {
    let (_dir, store) = open_store();
    let week = key("2025-10-25");
    store
        .save(week, "Alice", MatchAssignment::new("Arsenal", "Chelsea"))
        .expect("first");
    store
        .save(week, "Bob", MatchAssignment::new("Leeds", "Spurs"))
        .expect("bob");
    store
        .save(week, "Alice", MatchAssignment::new("Everton", "Wolves"))
        .expect("second");

    let doc = store.load(week).expect("load").expect("present");
    assert_eq!(doc.len(), 2);
    assert_eq!(doc.get("Alice"), Some(&MatchAssignment::new("Everton", "Wolves")));
    assert_eq!(doc.get("Bob"), Some(&MatchAssignment::new("Leeds", "Spurs")));
}

#[test]
fn concurrent_saves_for_one_week_keep_every_selector() {
    let (_dir, store) = open_store();
    let store = Arc::new(store);
    let week = key("2025-11-01");

    let handles = (0..16)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                store
                    .save(
                        week,
                        &format!("selector-{i}"),
                        MatchAssignment::new(format!("Home {i}"), format!("Away {i}")),
                    )
                    .expect("concurrent save");
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().expect("thread finished");
    }

    let doc = store.load(week).expect("load").expect("present");
    assert_eq!(doc.len(), 16);
    for i in 0..16 {
        let pick = doc.get(&format!("selector-{i}")).expect("selector kept");
        assert_eq!(pick.home_team, format!("Home {i}"));
    }
}

#[test]
fn list_weeks_is_sorted_and_ignores_other_files() {
    let (dir, store) = open_store();
    for raw in ["2025-11-01", "2025-10-18", "2025-10-25"] {
        store
            .save(key(raw), "Alice", MatchAssignment::new("A", "B"))
            .expect("save");
    }
    let selections = dir.path().join("data").join("selections");
    fs::write(selections.join("notes.txt"), "hello").expect("stray file");
    fs::write(selections.join("week_2025-10-25.json.tmp"), "{").expect("stray tmp");

    let weeks = store.list_weeks().expect("list");
    assert_eq!(
        weeks,
        vec![key("2025-10-18"), key("2025-10-25"), key("2025-11-01")]
    );
}

#[test]
fn list_weeks_is_empty_for_fresh_store() {
    let (_dir, store) = open_store();
    assert!(store.list_weeks().expect("list").is_empty());
}

#[test]
fn malformed_file_is_reported_as_corrupt() {
    let (dir, store) = open_store();
    let week = key("2025-10-25");
    let path = dir
        .path()
        .join("data")
        .join("selections")
        .join("week_2025-10-25.json");
    fs::write(&path, "{\"Alice\": {\"home_team\": ").expect("write garbage");

    let err = store.load(week).expect_err("corrupt file must not load");
    assert!(matches!(err, StoreError::Corrupt { .. }), "got {err:?}");
}

#[test]
fn save_refuses_to_overwrite_corrupt_document() {
    let (dir, store) = open_store();
    let week = key("2025-10-25");
    let path = dir
        .path()
        .join("data")
        .join("selections")
        .join("week_2025-10-25.json");
    fs::write(&path, "not json").expect("write garbage");

    let err = store
        .save(week, "Alice", MatchAssignment::new("Arsenal", "Chelsea"))
        .expect_err("save must fail");
    assert!(matches!(err, StoreError::Corrupt { .. }));
    assert_eq!(fs::read_to_string(&path).expect("still there"), "not json");
}

#[test]
fn file_layout_is_plain_selector_map() {
    let (dir, store) = open_store();
    let week = key("2025-10-25");
    store
        .save(week, "Alice", MatchAssignment::new("Arsenal", "Chelsea"))
        .expect("save");

    let path = dir
        .path()
        .join("data")
        .join("selections")
        .join("week_2025-10-25.json");
    let raw = fs::read_to_string(path).expect("file written");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    assert_eq!(value["Alice"]["home_team"], "Arsenal");
    assert_eq!(value["Alice"]["away_team"], "Chelsea");
}

#[test]
fn remove_drops_one_selector_and_deletes_empty_weeks() {
    let (_dir, store) = open_store();
    let week = key("2025-10-25");
    store
        .save(week, "Alice", MatchAssignment::new("Arsenal", "Chelsea"))
        .expect("alice");
    store
        .save(week, "Bob", MatchAssignment::new("Leeds", "Spurs"))
        .expect("bob");

    assert!(store.remove_selection(week, "Alice").expect("remove"));
    assert!(!store.remove_selection(week, "Alice").expect("remove again"));
    let doc = store.load(week).expect("load").expect("present");
    assert!(!doc.contains("Alice"));
    assert!(doc.contains("Bob"));

    assert!(store.remove_selection(week, "Bob").expect("remove bob"));
    assert!(store.load(week).expect("load").is_none());
    assert!(store.list_weeks().expect("list").is_empty());
}

#[test]
fn prune_is_explicit_and_respects_cutoff() {
    let (_dir, store) = open_store();
    for raw in ["2025-10-11", "2025-10-18", "2025-10-25"] {
        store
            .save(key(raw), "Alice", MatchAssignment::new("A", "B"))
            .expect("save");
    }
    let removed = store.prune_weeks_before(key("2025-10-25")).expect("prune");
    assert_eq!(removed, vec![key("2025-10-11"), key("2025-10-18")]);
    assert_eq!(store.list_weeks().expect("list"), vec![key("2025-10-25")]);
}

#[test]
fn backup_copies_current_document() {
    let (_dir, store) = open_store();
    let week = key("2025-10-25");
    assert!(store.backup_week(week).expect("backup missing week").is_none());

    store
        .save(week, "Alice", MatchAssignment::new("Arsenal", "Chelsea"))
        .expect("save");
    let backup = store.backup_week(week).expect("backup").expect("backup path");
    assert!(backup.starts_with(store.layout().expect("layout").backups));
    let copied = fs::read_to_string(backup).expect("backup readable");
    assert!(copied.contains("Arsenal"));
    assert_eq!(store.list_weeks().expect("list"), vec![week]);
}

#[test]
fn unusable_base_without_fallback_fails_operations_explicitly() {
    let dir = tempfile::tempdir().expect("temp dir");
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "a file, not a directory").expect("blocker");

    let store = SelectionStore::open(StoreConfig::new(blocker.join("data")));
    assert_eq!(store.initialization_errors().len(), 1);
    assert!(matches!(
        store.load(key("2025-10-25")),
        Err(StoreError::StorageUnavailable { .. })
    ));
    assert!(matches!(
        store.save(key("2025-10-25"), "Alice", MatchAssignment::new("A", "B")),
        Err(StoreError::StorageUnavailable { .. })
    ));
    assert!(matches!(
        store.list_weeks(),
        Err(StoreError::StorageUnavailable { .. })
    ));
}

#[test]
fn configured_fallback_is_used_and_recorded() {
    let dir = tempfile::tempdir().expect("temp dir");
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "a file, not a directory").expect("blocker");
    let fallback = dir.path().join("fallback");

    let store =
        SelectionStore::open(StoreConfig::new(blocker.join("data")).with_fallback(&fallback));
    let layout = store.layout().expect("fallback layout");
    assert!(layout.is_fallback);
    assert_eq!(layout.base, fallback);
    assert_eq!(store.initialization_errors().len(), 1);

    let week = key("2025-10-25");
    store
        .save(week, "Alice", MatchAssignment::new("Arsenal", "Chelsea"))
        .expect("save to fallback");
    assert!(fallback.join("selections").join("week_2025-10-25.json").is_file());
}

#[test]
fn storage_can_recover_after_the_problem_is_fixed() {
    let dir = tempfile::tempdir().expect("temp dir");
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "a file, not a directory").expect("blocker");

    let store = SelectionStore::open(StoreConfig::new(blocker.join("data")));
    assert!(store.layout().is_err());

    fs::remove_file(&blocker).expect("remove blocker");
    store.ensure_storage_ready().expect("ready now");
    assert!(store.load(key("2025-10-25")).expect("load").is_none());
}

#[test]
fn extras_shadowing_named_fields_do_not_break_the_week() {
    let (_dir, store) = open_store();
    let week = key("2025-10-25");
    let mut pick = MatchAssignment::new("Arsenal", "Chelsea");
    pick.extra.insert("home_team".to_string(), "Spurs".into());
    pick.extra.insert("kickoff".to_string(), "17:30".into());
    pick.extra.insert("league".to_string(), "Premier League".into());

    let saved = store.save(week, "Alice", pick).expect("save");
    let doc = store.load(week).expect("load").expect("present");
    assert_eq!(doc, saved);
    let alice = doc.get("Alice").expect("alice kept");
    assert_eq!(alice.home_team, "Arsenal");
    assert_eq!(alice.kickoff.as_deref(), Some("17:30"));
    assert!(!alice.extra.contains_key("home_team"));
    assert!(!alice.extra.contains_key("kickoff"));
    assert_eq!(alice.extra["league"], "Premier League");

    store
        .save(week, "Bob", MatchAssignment::new("Leeds", "Spurs"))
        .expect("later save still works");
    assert_eq!(store.load(week).expect("load").expect("present").len(), 2);
}

#[test]
fn failed_save_leaves_previous_document_intact() {
    let (dir, store) = open_store();
    let week = key("2025-10-25");
    store
        .save(week, "Alice", MatchAssignment::new("Arsenal", "Chelsea"))
        .expect("save alice");
    let selections = dir.path().join("data").join("selections");
    fs::create_dir(selections.join("week_2025-10-25.json.tmp")).expect("block temp file");

    let err = store
        .save(week, "Bob", MatchAssignment::new("Leeds", "Spurs"))
        .expect_err("write must fail");
    assert!(matches!(err, StoreError::WriteFailure { .. }), "got {err:?}");

    let doc = store.load(week).expect("load").expect("present");
    assert_eq!(doc.len(), 1);
    assert_eq!(doc.get("Alice"), Some(&MatchAssignment::new("Arsenal", "Chelsea")));
}

#[test]
fn path_accessors_follow_active_layout() {
    let (dir, store) = open_store();
    let base = dir.path().join("data");
    assert_eq!(store.base_path().expect("base"), base);
    assert_eq!(store.selections_path().expect("selections"), base.join("selections"));
    assert_eq!(store.fixtures_path().expect("fixtures"), base.join("fixtures"));
    assert_eq!(store.backups_path().expect("backups"), base.join("backups"));
    assert_eq!(
        store.week_file_path(key("2025-10-25")).expect("week file"),
        base.join("selections").join("week_2025-10-25.json")
    );
}

#[test]
fn path_accessors_fail_when_storage_is_unavailable() {
    let dir = tempfile::tempdir().expect("temp dir");
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "a file, not a directory").expect("blocker");
    let store = SelectionStore::open(StoreConfig::new(blocker.join("data")));
    assert!(matches!(
        store.selections_path(),
        Err(StoreError::StorageUnavailable { .. })
    ));
}
