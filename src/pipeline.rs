use crate::config::RollupOptions;
use crate::date::DayStamp;
use crate::format::write_rolling;
use crate::partition::{PartitionHandle, PartitionStore, Partitions};
use crate::progress::ProgressScope;
use crate::reduce::reduce_partition;
use crate::scanner::{ChunkedScanner, ScanStats};
use crate::store::{DailyResult, Metric, ResultStore};
use crate::topk::{merge_match_top_10, merge_operator_top_100, TopKPair};
use crate::util::init_tracing_once;
use crate::validate::Validator;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Daily and rolling top-K rankings over a match log.
///
/// ```no_run
/// # use killboard::{Rollup, DayStamp};
/// let summary = Rollup::new()
///     .data_dir("data")
///     .log_path("data/logs/r6-matches.log")
///     .chunk_size(10_000)
///     .run(DayStamp::today_utc())?;
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Clone, Default)]
pub struct Rollup {
    pub(crate) opts: RollupOptions,
}

/// What one daily pass produced.
#[derive(Clone, Debug)]
pub struct DailyRun {
    pub result: DailyResult,
    pub scan: ScanStats,
    pub partitions: usize,
    pub operator_file: PathBuf,
    pub match_file: PathBuf,
}

/// The merge of the most recent persisted daily results.
#[derive(Clone, Debug, PartialEq)]
pub struct RollingResult {
    pub top: TopKPair,
    pub operator_sources: Vec<PathBuf>,
    pub match_sources: Vec<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct RollingRun {
    pub result: RollingResult,
    pub operator_artifact: PathBuf,
    pub match_artifact: PathBuf,
}

/// Serializable report of a full run.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub day: String,
    pub scan: Option<ScanStats>,
    pub partitions: usize,
    pub daily_files: Vec<PathBuf>,
    pub window_files: usize,
    pub operators_ranked: usize,
    pub matches_ranked: usize,
    pub operator_artifact: PathBuf,
    pub match_artifact: PathBuf,
}

impl Rollup {
    pub fn new() -> Self {
        Self { opts: RollupOptions::default() }
    }

    pub fn with_options(opts: RollupOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &RollupOptions {
        &self.opts
    }

    // -------- Builder methods --------
    pub fn data_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_data_dir(dir); self }
    pub fn log_path(mut self, path: impl AsRef<Path>) -> Self { self.opts = self.opts.with_log_path(path); self }
    pub fn daily_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_daily_dir(dir); self }
    pub fn rolling_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_rolling_dir(dir); self }
    pub fn work_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_work_dir(dir); self }
    pub fn chunk_size(mut self, rows: usize) -> Self { self.opts = self.opts.with_chunk_size(rows); self }
    pub fn window_days(mut self, days: usize) -> Self { self.opts = self.opts.with_window_days(days); self }
    pub fn operators(mut self, ops: impl IntoIterator<Item = u32>) -> Self { self.opts = self.opts.with_operators(ops); self }
    pub fn kill_bounds(mut self, min: u32, max: u32) -> Self { self.opts = self.opts.with_kill_bounds(min, max); self }
    pub fn parallelism(mut self, threads: usize) -> Self { self.opts = self.opts.with_parallelism(threads); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn io_buffers(mut self, read: usize, write: usize) -> Self { self.opts = self.opts.with_io_buffers(read, write); self }

    pub fn validator(&self) -> Validator {
        Validator::new(&self.opts.operators, self.opts.kill_bounds)
    }

    pub fn store(&self) -> ResultStore {
        ResultStore::new(&self.opts.daily_dir)
    }

    /// Scan, validate and spill the log into consolidated partitions.
    /// The returned `Partitions` owns the spill files; dropping it deletes them.
    pub fn partition_log(&self) -> Result<(Partitions, ScanStats)> {
        self.opts.validate()?;
        let log = &self.opts.log_path;
        let total = fs::metadata(log).map(|m| m.len()).unwrap_or(0);
        let pb = ProgressScope::bytes("Scan log", total, self.opts.progress);

        let mut scanner = ChunkedScanner::open_with_progress(
            log,
            self.opts.chunk_size,
            self.validator(),
            self.opts.read_buffer_bytes,
            pb.clone(),
        )?;

        let mut store = PartitionStore::create(&self.opts.work_dir, self.opts.write_buffer_bytes)
            .context("partition: set up spill storage")?;
        for batch in scanner.by_ref() {
            let batch = batch?;
            store.spill_batch(&batch).context("partition: spill batch")?;
        }
        let stats = scanner.stats();
        pb.finish("scan done");

        let parts = store.consolidate().context("partition: consolidate fragments")?;
        tracing::info!(
            lines = stats.lines,
            accepted = stats.accepted,
            rejected = stats.rejected,
            batches = stats.batches,
            partitions = parts.len(),
            "partitioned {}",
            log.display()
        );
        Ok((parts, stats))
    }

    /// Reduce every partition on the worker pool and fold the partials into
    /// one pair. Partials are merged as they arrive; the fold is associative
    /// and the ranking total, so arrival order does not change the result.
    pub fn reduce_partitions(&self, parts: &Partitions) -> Result<TopKPair> {
        let handles: Vec<&PartitionHandle> = parts.handles().collect();
        let pb = ProgressScope::count("Reduce partitions", handles.len() as u64, self.opts.progress);
        let read_buf = self.opts.read_buffer_bytes;
        let acc = Mutex::new(TopKPair::default());

        let work = || -> Result<()> {
            handles.par_iter().try_for_each(|h| -> Result<()> {
                let part = reduce_partition(h, read_buf)
                    .with_context(|| format!("reduce partition {}", h.key))?;
                let mut guard = acc.lock();
                let prev = std::mem::take(&mut *guard);
                *guard = TopKPair::merge_all([prev, part]);
                pb.inc(1);
                Ok(())
            })
        };

        match self.opts.parallelism {
            Some(n) => rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .context("build reduce thread pool")?
                .install(work)?,
            None => work()?,
        }
        pb.finish("reduce done");
        Ok(acc.into_inner())
    }

    /// Daily rankings from already partitioned data (nothing is persisted).
    pub fn compute_daily(&self, day: DayStamp, parts: &Partitions) -> Result<DailyResult> {
        let top = self.reduce_partitions(parts)?;
        Ok(DailyResult { day, top })
    }

    /// Partition, reduce and persist one day's log. Spill files are gone when
    /// this returns, whatever the outcome.
    pub fn process_daily_log(&self, day: DayStamp) -> Result<DailyRun> {
        init_tracing_once();
        let (parts, scan) = self.partition_log()?;
        let partitions = parts.len();
        let result = self.compute_daily(day, &parts)?;
        drop(parts);

        let (operator_file, match_file) = self.store().store_daily(&result)?;
        Ok(DailyRun { result, scan, partitions, operator_file, match_file })
    }

    /// Merge the last `window_days` persisted daily results without writing.
    pub fn merge_rolling(&self) -> Result<RollingResult> {
        self.opts.validate()?;
        let store = self.store();
        let n = self.opts.window_days;
        let operator_sources = store.list_recent(Metric::OperatorTop100, n)?;
        let match_sources = store.list_recent(Metric::MatchTop10, n)?;

        let ops = operator_sources
            .iter()
            .map(|p| ResultStore::load_operator_top(p).with_context(|| format!("rolling: load {}", p.display())))
            .collect::<Result<Vec<_>>>()?;
        let matches = match_sources
            .iter()
            .map(|p| ResultStore::load_match_top(p).with_context(|| format!("rolling: load {}", p.display())))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            operator_files = operator_sources.len(),
            match_files = match_sources.len(),
            "merging rolling window of {n} days"
        );
        let top = TopKPair {
            operators: merge_operator_top_100(ops),
            matches: merge_match_top_10(matches),
        };
        Ok(RollingResult { top, operator_sources, match_sources })
    }

    /// Merge the rolling window and write its artifacts, named by `day`.
    pub fn update_rolling(&self, day: DayStamp) -> Result<RollingRun> {
        init_tracing_once();
        let result = self.merge_rolling()?;
        let (operator_artifact, match_artifact) =
            write_rolling(&self.opts.rolling_dir, day, &result.top, self.opts.write_buffer_bytes)?;
        tracing::info!(
            "rolling artifacts: {} {}",
            operator_artifact.display(),
            match_artifact.display()
        );
        Ok(RollingRun { result, operator_artifact, match_artifact })
    }

    /// Daily pass followed by the rolling update.
    pub fn run(&self, day: DayStamp) -> Result<RunSummary> {
        self.opts.validate()?;
        let daily = self.process_daily_log(day)?;
        let rolling = self.update_rolling(day)?;
        Ok(summarize(day, Some(&daily), &rolling))
    }

    /// Rolling update only, from whatever daily files exist.
    pub fn run_rolling_only(&self, day: DayStamp) -> Result<RunSummary> {
        let rolling = self.update_rolling(day)?;
        Ok(summarize(day, None, &rolling))
    }
}

fn summarize(day: DayStamp, daily: Option<&DailyRun>, rolling: &RollingRun) -> RunSummary {
    RunSummary {
        day: day.to_string(),
        scan: daily.map(|d| d.scan),
        partitions: daily.map(|d| d.partitions).unwrap_or(0),
        daily_files: daily
            .map(|d| vec![d.operator_file.clone(), d.match_file.clone()])
            .unwrap_or_default(),
        window_files: rolling.result.operator_sources.len().max(rolling.result.match_sources.len()),
        operators_ranked: rolling.result.top.operators.len(),
        matches_ranked: rolling.result.top.matches.len(),
        operator_artifact: rolling.operator_artifact.clone(),
        match_artifact: rolling.match_artifact.clone(),
    }
}
