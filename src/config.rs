use crate::validate::{KillBounds, OPERATORS};
use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

pub const DEFAULT_CHUNK_SIZE: usize = 10_000;
pub const DEFAULT_WINDOW_DAYS: usize = 7;

/// User-facing options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct RollupOptions {
    pub log_path: PathBuf,
    pub daily_dir: PathBuf,        // <daily>/operator_top_100, <daily>/match_top_10
    pub rolling_dir: PathBuf,      // rendered rolling artifacts
    pub work_dir: PathBuf,         // per-run spill directories are created here
    pub chunk_size: usize,         // raw rows per scanner batch, must be > 0
    pub window_days: usize,        // daily files folded into the rolling view
    pub operators: Vec<u32>,
    pub kill_bounds: KillBounds,
    pub parallelism: Option<usize>, // Some(N) for a dedicated N-thread reduce pool
    pub progress: bool,

    // IO tuning
    pub read_buffer_bytes: usize,
    pub write_buffer_bytes: usize,
}

impl Default for RollupOptions {
    fn default() -> Self {
        let data = PathBuf::from("data");
        Self {
            log_path: data.join("logs").join("r6-matches.log"),
            daily_dir: data.join("daily"),
            rolling_dir: data.join("rolling_seven_days"),
            work_dir: data.join("work"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            window_days: DEFAULT_WINDOW_DAYS,
            operators: OPERATORS.to_vec(),
            kill_bounds: KillBounds::default(),
            parallelism: None,
            progress: false,
            read_buffer_bytes: 256 * 1024,
            write_buffer_bytes: 64 * 1024,
        }
    }
}

impl RollupOptions {
    /// Lay out daily, rolling and work directories under one data root.
    pub fn with_data_dir(mut self, data_dir: impl AsRef<Path>) -> Self {
        let data = data_dir.as_ref();
        self.daily_dir = data.join("daily");
        self.rolling_dir = data.join("rolling_seven_days");
        self.work_dir = data.join("work");
        self
    }
    pub fn with_log_path(mut self, path: impl AsRef<Path>) -> Self {
        self.log_path = path.as_ref().to_path_buf();
        self
    }
    pub fn with_daily_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.daily_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_rolling_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.rolling_dir = dir.as_ref().to_path_buf();
        self
    }
    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = dir.as_ref().to_path_buf();
        self
    }
    // Not clamped: a zero chunk size is reported by `validate`.
    pub fn with_chunk_size(mut self, rows: usize) -> Self {
        self.chunk_size = rows;
        self
    }
    pub fn with_window_days(mut self, days: usize) -> Self {
        self.window_days = days;
        self
    }
    pub fn with_operators(mut self, ops: impl IntoIterator<Item = u32>) -> Self {
        self.operators = ops.into_iter().collect();
        self
    }
    pub fn with_kill_bounds(mut self, min: u32, max: u32) -> Self {
        self.kill_bounds = KillBounds { min, max };
        self
    }
    pub fn with_parallelism(mut self, threads: usize) -> Self {
        self.parallelism = Some(threads.max(1));
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self {
        self.read_buffer_bytes = read_bytes.max(8 * 1024);
        self.write_buffer_bytes = write_bytes.max(8 * 1024);
        self
    }

    /// Reject configurations that cannot produce a run. Performs no I/O.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("configuration: chunk size must be a positive integer greater than zero");
        }
        if self.window_days == 0 {
            bail!("configuration: rolling window must cover at least one day");
        }
        if self.operators.is_empty() {
            bail!("configuration: operator set is empty");
        }
        if self.kill_bounds.min > self.kill_bounds.max {
            bail!(
                "configuration: kill bounds are inverted ({} > {})",
                self.kill_bounds.min,
                self.kill_bounds.max
            );
        }
        Ok(())
    }
}
