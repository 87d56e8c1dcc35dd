//! Top-K merge algebra.
//!
//! One operation, *concatenate → rank → (regroup) → truncate*, folds partition
//! results into a daily result and daily results into the rolling result.
//! For inputs that are each an exact top-K of disjoint or overlapping record
//! sets, the fold is associative and idempotent:
//!
//! - `merge([merge([a, b]), c]) == merge([a, merge([b, c])]) == merge([a, b, c])`
//! - `merge([x]) == x`, hence `merge([merge(xs)]) == merge(xs)`
//!
//! Ranking is a total order (value descending, then `match_id` ascending), so
//! results do not depend on input order or hash-map iteration order.
//! Entries are never deduplicated: the same `match_id` coming from two inputs
//! is ranked twice, so `merge([x, x])` holds each entry of `x` twice (up to `K`).

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub const OPERATOR_TOP_WIDTH: usize = 100;
pub const MATCH_TOP_WIDTH: usize = 10;

/// A total ranking order; `Less` means "ranks higher".
pub trait Ranked {
    fn rank_cmp(&self, other: &Self) -> Ordering;
}

/// One match's mean kills per row for a given operator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchMean {
    pub match_id: String,
    pub mean_kills: f64,
}

impl MatchMean {
    pub fn new(match_id: impl Into<String>, mean_kills: f64) -> Self {
        Self { match_id: match_id.into(), mean_kills }
    }
}

impl Ranked for MatchMean {
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .mean_kills
            .total_cmp(&self.mean_kills)
            .then_with(|| self.match_id.cmp(&other.match_id))
    }
}

/// A match's best single-player kill total.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchTotal {
    pub match_id: String,
    pub kills: u64,
}

impl MatchTotal {
    pub fn new(match_id: impl Into<String>, kills: u64) -> Self {
        Self { match_id: match_id.into(), kills }
    }
}

impl Ranked for MatchTotal {
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other.kills.cmp(&self.kills).then_with(|| self.match_id.cmp(&other.match_id))
    }
}

/// Per-operator ranked matches, ≤ `OPERATOR_TOP_WIDTH` each, best first.
pub type OperatorTop = BTreeMap<u32, Vec<MatchMean>>;

/// Ranked matches, ≤ `MATCH_TOP_WIDTH`, best first.
pub type MatchTop = Vec<MatchTotal>;

/// Rank `items` and keep the best `k`.
pub fn top_k<T: Ranked>(items: impl IntoIterator<Item = T>, k: usize) -> Vec<T> {
    let mut v: Vec<T> = items.into_iter().collect();
    if k == 0 {
        return Vec::new();
    }
    if v.len() > k {
        // Partition first so the full sort only touches the survivors.
        v.select_nth_unstable_by(k - 1, |a, b| a.rank_cmp(b));
        v.truncate(k);
    }
    v.sort_unstable_by(|a, b| a.rank_cmp(b));
    v
}

/// Fold any number of per-operator rankings into one, keeping `k` per operator.
pub fn merge_operator_top(inputs: impl IntoIterator<Item = OperatorTop>, k: usize) -> OperatorTop {
    let mut grouped: BTreeMap<u32, Vec<MatchMean>> = BTreeMap::new();
    for top in inputs {
        for (op, entries) in top {
            grouped.entry(op).or_default().extend(entries);
        }
    }
    grouped
        .into_iter()
        .map(|(op, entries)| (op, top_k(entries, k)))
        .filter(|(_, entries)| !entries.is_empty())
        .collect()
}

pub fn merge_operator_top_100(inputs: impl IntoIterator<Item = OperatorTop>) -> OperatorTop {
    merge_operator_top(inputs, OPERATOR_TOP_WIDTH)
}

pub fn merge_match_top(inputs: impl IntoIterator<Item = MatchTop>, k: usize) -> MatchTop {
    top_k(inputs.into_iter().flatten(), k)
}

pub fn merge_match_top_10(inputs: impl IntoIterator<Item = MatchTop>) -> MatchTop {
    merge_match_top(inputs, MATCH_TOP_WIDTH)
}

/// Both rankings for one unit of work (a partition, a day, or a window).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TopKPair {
    pub operators: OperatorTop,
    pub matches: MatchTop,
}

impl TopKPair {
    /// Merge both metrics of many pairs at once.
    pub fn merge_all(pairs: impl IntoIterator<Item = TopKPair>) -> TopKPair {
        let (ops, matches): (Vec<_>, Vec<_>) =
            pairs.into_iter().map(|p| (p.operators, p.matches)).unzip();
        TopKPair {
            operators: merge_operator_top_100(ops),
            matches: merge_match_top_10(matches),
        }
    }
}
