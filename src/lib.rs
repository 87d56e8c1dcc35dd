mod config;
mod date;
mod util;
mod progress;

mod record;
mod validate;
mod spill;
mod scanner;
mod partition;
mod reduce;
mod topk;

mod store;
mod format;
mod pipeline;

pub use crate::config::{RollupOptions, DEFAULT_CHUNK_SIZE, DEFAULT_WINDOW_DAYS};
pub use crate::date::DayStamp;
pub use crate::pipeline::{DailyRun, Rollup, RollingResult, RollingRun, RunSummary};

// Records and validation.
pub use crate::record::{MatchRecord, RawRecord};
pub use crate::validate::{KillBounds, Rejection, Validator, MAX_KILLS, MIN_KILLS, OPERATORS};

// Ingestion: chunked scanning and disk-backed partitioning.
pub use crate::scanner::{ChunkedScanner, ScanStats};
pub use crate::partition::{partition_key, PartitionHandle, PartitionStore, Partitions, PARTITION_KEY_LEN};

// Reduction and the top-K merge algebra.
pub use crate::reduce::{match_top_10, operator_top_100, reduce_partition, MatchBestPlayer, OperatorMeans};
pub use crate::topk::{
    merge_match_top, merge_match_top_10, merge_operator_top, merge_operator_top_100, top_k, MatchMean, MatchTop,
    MatchTotal, OperatorTop, Ranked, TopKPair, MATCH_TOP_WIDTH, OPERATOR_TOP_WIDTH,
};

// Persistence and rendering.
pub use crate::store::{DailyResult, Metric, ResultStore};
pub use crate::format::{format_mean, match_artifact_path, operator_artifact_path, render_match_top, render_operator_top, write_rolling};

pub use crate::progress::ProgressScope;
pub use crate::util::{init_tracing_once, replace_file_atomic};
