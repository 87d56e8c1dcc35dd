#[path = "common/mod.rs"]
mod common;
use common::*;

use killboard::{
    format_mean, match_artifact_path, operator_artifact_path, render_match_top, render_operator_top, write_rolling, DailyResult,
    DayStamp, MatchMean, MatchTotal, Metric, OperatorTop, ResultStore, TopKPair,
};
use std::fs;
use std::time::{Duration, Instant, SystemTime};

fn sample_top() -> TopKPair {
    let mut operators = OperatorTop::new();
    operators.insert(14, vec![MatchMean::new(uuid(1), 7.5), MatchMean::new(uuid(2), 3.0)]);
    operators.insert(237, vec![MatchMean::new(uuid(3), 1.0 / 3.0)]);
    TopKPair {
        operators,
        matches: vec![MatchTotal::new(uuid(4), 31), MatchTotal::new(uuid(1), 12)],
    }
}

/// Scenario: a day's rankings stored and loaded back.
/// Outcome: identical rankings; files sit under the per-metric directories with the documented headers.
#[test]
fn daily_results_round_trip() {
    let root = scratch().join("daily");
    let store = ResultStore::new(&root);
    let day = DayStamp::new(2024, 10, 27);
    let daily = DailyResult { day, top: sample_top() };

    let (ops_path, match_path) = store.store_daily(&daily).unwrap();
    assert_eq!(ops_path, root.join("operator_top_100").join("20241027.csv"));
    assert_eq!(match_path, root.join("match_top_10").join("20241027.csv"));

    let ops_lines = read_lines(&ops_path);
    assert_eq!(ops_lines[0], "operator_id,match_ids,nb_kills");
    assert_eq!(ops_lines[1], format!("14,{};{},7.5;3.0", uuid(1), uuid(2)));
    assert_eq!(read_lines(&match_path)[0], "match_id,nb_kills");

    assert_eq!(ResultStore::load_operator_top(&ops_path).unwrap(), daily.top.operators);
    assert_eq!(ResultStore::load_match_top(&match_path).unwrap(), daily.top.matches);

    // No temp or lock files are left behind.
    let leftovers: Vec<_> = fs::read_dir(root.join("operator_top_100"))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(leftovers, vec!["20241027.csv".to_string()]);
}

/// Scenario: a day with no accepted records.
/// Outcome: header-only files that load back as empty rankings.
#[test]
fn empty_day_writes_header_only() {
    let store = ResultStore::new(scratch());
    let day = DayStamp::new(2024, 1, 2);
    let (ops, matches) = store.store_daily(&DailyResult { day, top: TopKPair::default() }).unwrap();
    assert_eq!(read_lines(&ops), vec!["operator_id,match_ids,nb_kills".to_string()]);
    assert_eq!(read_lines(&matches), vec!["match_id,nb_kills".to_string()]);
    assert!(ResultStore::load_operator_top(&ops).unwrap().is_empty());
    assert!(ResultStore::load_match_top(&matches).unwrap().is_empty());
}

/// Scenario: reprocessing a date.
/// Outcome: the previous file is replaced, not appended to.
#[test]
fn restoring_a_date_replaces_it() {
    let store = ResultStore::new(scratch());
    let day = DayStamp::new(2024, 3, 9);
    store.store_match_top(day, &vec![MatchTotal::new(uuid(1), 5), MatchTotal::new(uuid(2), 4)]).unwrap();
    let path = store.store_match_top(day, &vec![MatchTotal::new(uuid(3), 9)]).unwrap();
    assert_eq!(ResultStore::load_match_top(&path).unwrap(), vec![MatchTotal::new(uuid(3), 9)]);
}

/// Scenario: nine persisted days plus stray temp and lock files; ask for the last 7.
/// Outcome: the 7 latest `.csv` files, oldest first; strays ignored; a missing metric dir lists nothing.
#[test]
fn list_recent_returns_latest_days_ascending() {
    let store = ResultStore::new(scratch());
    assert!(store.list_recent(Metric::MatchTop10, 7).unwrap().is_empty());

    let mut day = DayStamp::new(2024, 12, 27);
    for _ in 0..9 {
        store.store_match_top(day, &vec![MatchTotal::new(uuid(1), 1)]).unwrap();
        day = day.next().unwrap();
    }
    let dir = store.metric_dir(Metric::MatchTop10);
    fs::write(dir.join("20990101.csv.inprogress"), "partial").unwrap();
    fs::write(dir.join("20990101.lock"), "1").unwrap();

    let recent = store.list_recent(Metric::MatchTop10, 7).unwrap();
    let names: Vec<String> = recent
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec![
            "20241229.csv", "20241230.csv", "20241231.csv", "20250101.csv", "20250102.csv", "20250103.csv",
            "20250104.csv",
        ]
    );
    assert_eq!(store.list_recent(Metric::MatchTop10, 50).unwrap().len(), 9);
    assert!(store.list_recent(Metric::OperatorTop100, 7).unwrap().is_empty());
}

/// Scenario: another writer holds the lock for a date.
/// Outcome: the store refuses with an error naming the date; once released the write succeeds.
#[test]
fn held_date_lock_blocks_second_writer() {
    let store = ResultStore::new(scratch());
    let day = DayStamp::new(2024, 10, 27);
    let dir = store.metric_dir(Metric::OperatorTop100);
    fs::create_dir_all(&dir).unwrap();
    let lock = dir.join("20241027.lock");
    fs::write(&lock, std::process::id().to_string()).unwrap();

    let err = store.store_operator_top(day, &sample_top().operators).unwrap_err();
    let msg = format!("{err:#}");
    assert!(msg.contains("20241027"), "{msg}");
    assert!(msg.contains("another run"), "{msg}");
    assert!(!store.path_for(Metric::OperatorTop100, day).exists());

    fs::remove_file(&lock).unwrap();
    store.store_operator_top(day, &sample_top().operators).unwrap();
    assert!(!lock.exists());
}

/// Scenario: a persisted operator file whose list cells disagree in length.
/// Outcome: loading fails with the path and row number.
#[test]
fn malformed_operator_file_is_reported() {
    let dir = scratch();
    let path = dir.join("20240101.csv");
    fs::write(&path, "operator_id,match_ids,nb_kills\n14,a;b,1\n").unwrap();
    let msg = format!("{:#}", ResultStore::load_operator_top(&path).unwrap_err());
    assert!(msg.contains("20240101.csv"), "{msg}");
    assert!(msg.contains("row 1"), "{msg}");
}

/// Scenario: rendering the rolling rankings.
/// Outcome: `op|match:mean,...` per operator in ascending operator id, `match:kills` per match.
#[test]
fn renders_rolling_text_artifacts() {
    let top = sample_top();
    let ops = render_operator_top(&top.operators);
    assert_eq!(
        ops,
        format!("14|{}:7.5,{}:3.0\n237|{}:{}\n", uuid(1), uuid(2), uuid(3), 1.0f64 / 3.0)
    );
    let matches = render_match_top(&top.matches);
    assert_eq!(matches, format!("{}:31\n{}:12\n", uuid(4), uuid(1)));
    assert_eq!(render_match_top(&Vec::new()), "");
}

/// Scenario: writing rolling artifacts into a directory that does not exist yet.
/// Outcome: the directory is created and both artifacts hold the rendered text, named by date.
#[test]
fn write_rolling_creates_named_artifacts() {
    let dir = scratch().join("rolling_seven_days");
    let day = DayStamp::new(2024, 10, 27);
    let top = sample_top();
    let (ops, matches) = write_rolling(&dir, day, &top, 8 * 1024).unwrap();

    assert_eq!(ops, operator_artifact_path(&dir, day));
    assert_eq!(matches, match_artifact_path(&dir, day));
    assert!(ops.ends_with("operator_top100_20241027.txt"));
    assert!(matches.ends_with("match_top10_20241027.txt"));
    assert_eq!(fs::read_to_string(&ops).unwrap(), render_operator_top(&top.operators));
    assert_eq!(fs::read_to_string(&matches).unwrap(), render_match_top(&top.matches));
    assert_eq!(fs::read_dir(&dir).unwrap().count(), 2);
}

/// Scenario: parsing and printing day stamps.
/// Outcome: fixed-width YYYYMMDD; impossible dates are refused.
#[test]
fn day_stamps_are_fixed_width() {
    let d: DayStamp = "20240305".parse().unwrap();
    assert_eq!(d, DayStamp::new(2024, 3, 5));
    assert_eq!(d.to_string(), "20240305");
    assert_eq!(d.prev().unwrap().to_string(), "20240304");
    assert!("2024035".parse::<DayStamp>().is_err());
    assert!("20240230".parse::<DayStamp>().is_err());
    assert!("2024-3-5".parse::<DayStamp>().is_err());
}

/// Scenario: a lock left behind by a run that is no longer alive.
/// Outcome: the lock is taken over and the day is written.
#[test]
fn lock_of_dead_writer_is_taken_over() {
    let store = ResultStore::new(scratch());
    let day = DayStamp::new(2024, 10, 27);
    let dir = store.metric_dir(Metric::MatchTop10);
    fs::create_dir_all(&dir).unwrap();
    // Above any pid_max, so no process can hold it.
    fs::write(dir.join("20241027.lock"), "999999999").unwrap();

    let path = store.store_match_top(day, &vec![MatchTotal::new(uuid(1), 3)]).unwrap();
    assert_eq!(ResultStore::load_match_top(&path).unwrap(), vec![MatchTotal::new(uuid(1), 3)]);
    assert!(!dir.join("20241027.lock").exists());
}

/// Scenario: an unreadable lock file that is many hours old.
/// Outcome: treated as abandoned and taken over.
#[test]
fn old_lock_is_taken_over() {
    let store = ResultStore::new(scratch());
    let day = DayStamp::new(2024, 10, 27);
    let dir = store.metric_dir(Metric::OperatorTop100);
    fs::create_dir_all(&dir).unwrap();
    let lock = dir.join("20241027.lock");
    fs::write(&lock, "").unwrap();
    let f = fs::File::options().write(true).open(&lock).unwrap();
    f.set_modified(SystemTime::now() - Duration::from_secs(24 * 60 * 60)).unwrap();
    drop(f);

    store.store_operator_top(day, &sample_top().operators).unwrap();
    assert!(!lock.exists());

    // A fresh empty lock may belong to a writer that has not recorded its PID yet.
    fs::write(&lock, "").unwrap();
    assert!(store.store_operator_top(day, &sample_top().operators).is_err());
}

/// Scenario: the match metric is locked by a live run when a whole day is stored.
/// Outcome: nothing is written for that day, not even the operator file.
#[test]
fn daily_store_writes_nothing_when_either_lock_is_held() {
    let store = ResultStore::new(scratch());
    let day = DayStamp::new(2024, 10, 27);
    let dir = store.metric_dir(Metric::MatchTop10);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("20241027.lock"), std::process::id().to_string()).unwrap();

    let err = store.store_daily(&DailyResult { day, top: sample_top() }).unwrap_err();
    assert!(format!("{err:#}").contains("match_top_10"));
    assert!(!store.path_for(Metric::OperatorTop100, day).exists());
    assert!(!store.path_for(Metric::MatchTop10, day).exists());
    // The operator lock taken first is released again.
    assert!(!store.metric_dir(Metric::OperatorTop100).join("20241027.lock").exists());
}

/// Scenario: whole and fractional means.
/// Outcome: whole means keep one decimal; others print in full.
#[test]
fn means_are_rendered_as_floats() {
    assert_eq!(format_mean(2.0), "2.0");
    assert_eq!(format_mean(0.0), "0.0");
    assert_eq!(format_mean(3.5), "3.5");
    assert_eq!(format_mean(0.00001), "0.00001");
    assert_eq!(format_mean(1.0 / 3.0), (1.0f64 / 3.0).to_string());
}

/// Scenario: the temp path of a rolling artifact is occupied by a directory.
/// Outcome: the write fails at once instead of retrying as if the error were transient.
#[cfg(unix)]
#[test]
fn non_transient_errors_fail_fast() {
    let dir = scratch();
    let day = DayStamp::new(2024, 10, 27);
    let blocked = operator_artifact_path(&dir, day).with_extension("txt.inprogress");
    fs::create_dir_all(&blocked).unwrap();

    let started = Instant::now();
    assert!(write_rolling(&dir, day, &sample_top(), 8 * 1024).is_err());
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
}
