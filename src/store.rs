//! Durable per-date storage of daily rankings.
//!
//! Layout:
//!   <root>/operator_top_100/<YYYYMMDD>.csv   operator_id,match_ids,nb_kills
//!   <root>/match_top_10/<YYYYMMDD>.csv       match_id,nb_kills
//!
//! List cells hold `;`-joined values in rank order. Files are written to a
//! `.inprogress` sibling and renamed into place, so a visible `.csv` is always
//! complete. Reprocessing a date replaces its file.

use crate::date::DayStamp;
use crate::format::format_mean;
use crate::spill::inprogress_path;
use crate::topk::{MatchMean, MatchTop, MatchTotal, OperatorTop, TopKPair};
use crate::util::{create_new_with_backoff, create_with_backoff, ensure_dir, open_with_backoff, remove_with_backoff, replace_file_atomic};
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{Pid, PidExt, System, SystemExt};

const LIST_SEP: char = ';';

/// A lock older than this is abandoned whatever its recorded holder.
const STALE_LOCK_AGE: Duration = Duration::from_secs(6 * 60 * 60);

/// Which ranking a persisted file holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    OperatorTop100,
    MatchTop10,
}

impl Metric {
    pub fn dir_name(self) -> &'static str {
        match self {
            Metric::OperatorTop100 => "operator_top_100",
            Metric::MatchTop10 => "match_top_10",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Both rankings for one calendar day. Immutable once persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct DailyResult {
    pub day: DayStamp,
    pub top: TopKPair,
}

#[derive(Serialize, Deserialize)]
struct OperatorRow {
    operator_id: u32,
    match_ids: String,
    nb_kills: String,
}

#[derive(Serialize, Deserialize)]
struct MatchRow {
    match_id: String,
    nb_kills: u64,
}

/// Exclusive marker held while a date's file is being written. A second writer
/// for the same date fails instead of interleaving. Removed on drop.
///
/// The file holds the writer's PID. A lock whose writer is gone, or that is
/// older than `STALE_LOCK_AGE`, is left over from a killed run and is taken over.
struct DateLock {
    path: PathBuf,
}

impl DateLock {
    fn acquire(dir: &Path, metric: Metric, day: DayStamp) -> Result<Self> {
        let path = dir.join(format!("{day}.lock"));
        let mut created = create_new_with_backoff(&path);
        if matches!(&created, Err(e) if e.kind() == io::ErrorKind::AlreadyExists) && lock_is_stale(&path) {
            tracing::warn!("store {metric} {day}: taking over stale lock {}", path.display());
            remove_with_backoff(&path)?;
            created = create_new_with_backoff(&path);
        }
        match created {
            Ok(mut f) => {
                let _ = writeln!(f, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(anyhow!(
                "store {metric} {day}: another run holds {}",
                path.display()
            )),
            Err(e) => Err(e).with_context(|| format!("store {metric} {day}: create lock {}", path.display())),
        }
    }
}

fn lock_is_stale(path: &Path) -> bool {
    let age = fs::metadata(path).and_then(|m| m.modified()).ok().and_then(|t| t.elapsed().ok());
    if age.map_or(false, |a| a > STALE_LOCK_AGE) {
        return true;
    }
    // An empty or unparsable file may belong to a writer that has not recorded its PID yet.
    match fs::read_to_string(path).ok().and_then(|s| s.trim().parse::<u32>().ok()) {
        Some(pid) => !process_alive(pid),
        None => false,
    }
}

fn process_alive(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_process(Pid::from_u32(pid))
}

impl Drop for DateLock {
    fn drop(&mut self) {
        if let Err(e) = remove_with_backoff(&self.path) {
            tracing::warn!("failed to release lock {}: {:#}", self.path.display(), e);
        }
    }
}

#[derive(Clone, Debug)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn metric_dir(&self, metric: Metric) -> PathBuf {
        self.root.join(metric.dir_name())
    }

    pub fn path_for(&self, metric: Metric, day: DayStamp) -> PathBuf {
        self.metric_dir(metric).join(format!("{day}.csv"))
    }

    /// Persist a day's per-operator ranking. Returns the final path.
    pub fn store_operator_top(&self, day: DayStamp, top: &OperatorTop) -> Result<PathBuf> {
        let _lock = self.lock(Metric::OperatorTop100, day)?;
        self.write_operator_top(day, top)
    }

    /// Persist a day's match ranking. Returns the final path.
    pub fn store_match_top(&self, day: DayStamp, top: &MatchTop) -> Result<PathBuf> {
        let _lock = self.lock(Metric::MatchTop10, day)?;
        self.write_match_top(day, top)
    }

    /// Persist both metrics of a day. Returns `(operator file, match file)`.
    /// Both locks are taken before either file is written.
    pub fn store_daily(&self, daily: &DailyResult) -> Result<(PathBuf, PathBuf)> {
        let _ops_lock = self.lock(Metric::OperatorTop100, daily.day)?;
        let _match_lock = self.lock(Metric::MatchTop10, daily.day)?;
        let ops = self.write_operator_top(daily.day, &daily.top.operators)?;
        let matches = self.write_match_top(daily.day, &daily.top.matches)?;
        Ok((ops, matches))
    }

    fn lock(&self, metric: Metric, day: DayStamp) -> Result<DateLock> {
        let dir = self.metric_dir(metric);
        ensure_dir(&dir).with_context(|| format!("store {metric} {day}"))?;
        DateLock::acquire(&dir, metric, day)
    }

    fn write_operator_top(&self, day: DayStamp, top: &OperatorTop) -> Result<PathBuf> {
        self.write_rows(Metric::OperatorTop100, day, top.iter().map(|(op, entries)| OperatorRow {
            operator_id: *op,
            match_ids: join_list(entries.iter().map(|e| e.match_id.as_str())),
            nb_kills: join_list(entries.iter().map(|e| format_mean(e.mean_kills))),
        }))
    }

    fn write_match_top(&self, day: DayStamp, top: &MatchTop) -> Result<PathBuf> {
        self.write_rows(Metric::MatchTop10, day, top.iter().map(|e| MatchRow {
            match_id: e.match_id.clone(),
            nb_kills: e.kills,
        }))
    }

    /// Caller holds the date lock, which also created the metric directory.
    fn write_rows<R: Serialize>(&self, metric: Metric, day: DayStamp, rows: impl IntoIterator<Item = R>) -> Result<PathBuf> {
        let final_path = self.path_for(metric, day);
        let tmp = inprogress_path(&final_path);
        let written = (|| -> Result<()> {
            let f = create_with_backoff(&tmp).with_context(|| format!("create {}", tmp.display()))?;
            let mut w = csv::WriterBuilder::new().has_headers(true).from_writer(f);
            let mut any = false;
            for row in rows {
                w.serialize(row)?;
                any = true;
            }
            if !any {
                write_header_only(&mut w, metric)?;
            }
            w.flush()?;
            Ok(())
        })();
        if let Err(e) = written {
            let _ = remove_with_backoff(&tmp);
            return Err(e).with_context(|| format!("store {metric} {day}: write {}", tmp.display()));
        }
        replace_file_atomic(&tmp, &final_path).with_context(|| format!("store {metric} {day}"))?;
        tracing::info!("stored {metric} for {day} -> {}", final_path.display());
        Ok(final_path)
    }

    /// The `n` most recent persisted files of `metric`, oldest first. Ordering
    /// is lexicographic on file name, which is chronological for `YYYYMMDD`.
    pub fn list_recent(&self, metric: Metric, n: usize) -> Result<Vec<PathBuf>> {
        let dir = self.metric_dir(metric);
        let entries = match fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("list {}", dir.display())),
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|x| x.to_str()) == Some("csv"))
            .collect();
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        let skip = files.len().saturating_sub(n);
        Ok(files.split_off(skip))
    }

    pub fn load_operator_top(path: &Path) -> Result<OperatorTop> {
        let mut out = OperatorTop::new();
        for (i, row) in read_rows::<OperatorRow>(path)?.into_iter().enumerate() {
            let ids = split_list(&row.match_ids);
            let kills = split_list(&row.nb_kills);
            if ids.len() != kills.len() {
                bail!(
                    "{} row {}: {} match ids but {} kill values",
                    path.display(),
                    i + 1,
                    ids.len(),
                    kills.len()
                );
            }
            let mut entries = Vec::with_capacity(ids.len());
            for (id, k) in ids.into_iter().zip(kills) {
                let mean_kills: f64 = k
                    .parse()
                    .with_context(|| format!("{} row {}: bad kill value {k:?}", path.display(), i + 1))?;
                entries.push(MatchMean { match_id: id.to_string(), mean_kills });
            }
            out.entry(row.operator_id).or_default().extend(entries);
        }
        Ok(out)
    }

    pub fn load_match_top(path: &Path) -> Result<MatchTop> {
        Ok(read_rows::<MatchRow>(path)?
            .into_iter()
            .map(|r| MatchTotal { match_id: r.match_id, kills: r.nb_kills })
            .collect())
    }
}

fn join_list<S: AsRef<str>>(items: impl Iterator<Item = S>) -> String {
    let mut out = String::new();
    for (i, s) in items.enumerate() {
        if i > 0 { out.push(LIST_SEP); }
        out.push_str(s.as_ref());
    }
    out
}

fn split_list(cell: &str) -> Vec<&str> {
    if cell.is_empty() { return Vec::new(); }
    cell.split(LIST_SEP).collect()
}

/// Serde only emits a header together with the first row; empty days still
/// get one so every persisted file is self-describing.
fn write_header_only(w: &mut csv::Writer<fs::File>, metric: Metric) -> Result<()> {
    match metric {
        Metric::OperatorTop100 => w.write_record(["operator_id", "match_ids", "nb_kills"])?,
        Metric::MatchTop10 => w.write_record(["match_id", "nb_kills"])?,
    }
    Ok(())
}

fn read_rows<R: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<R>> {
    let f = open_with_backoff(path).with_context(|| format!("open {}", path.display()))?;
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(f);
    let mut out = Vec::new();
    for (i, rec) in rdr.deserialize::<R>().enumerate() {
        out.push(rec.with_context(|| format!("parse {} record #{}", path.display(), i + 1))?);
    }
    Ok(out)
}
