//! Per-partition reduction into local top-K rankings.
//!
//! Grouping is explicit: each record is folded into an accumulator keyed by
//! its group, then the groups are ranked with the same [`top_k`] used by the
//! global merge. Because a partition holds every record of its matches, the
//! local rankings are exact and keep every candidate the global result needs.

use crate::partition::PartitionHandle;
use crate::record::MatchRecord;
use crate::topk::{top_k, MatchMean, MatchTop, MatchTotal, OperatorTop, TopKPair, MATCH_TOP_WIDTH, OPERATOR_TOP_WIDTH};
use ahash::AHashMap;
use anyhow::Result;
use std::collections::BTreeMap;

/// Mean kills per `(match_id, operator_id)`.
#[derive(Default)]
pub struct OperatorMeans {
    groups: AHashMap<(String, u32), (u64, u64)>, // (kill sum, rows)
}

impl OperatorMeans {
    pub fn ingest(&mut self, rec: &MatchRecord) {
        let acc = self
            .groups
            .entry((rec.match_id.clone(), rec.operator_id))
            .or_insert((0, 0));
        acc.0 += rec.nb_kills as u64;
        acc.1 += 1;
    }

    /// Keep the best `k` matches per operator.
    pub fn finish(self, k: usize) -> OperatorTop {
        let mut by_op: BTreeMap<u32, Vec<MatchMean>> = BTreeMap::new();
        for ((match_id, op), (sum, rows)) in self.groups {
            by_op
                .entry(op)
                .or_default()
                .push(MatchMean { match_id, mean_kills: sum as f64 / rows as f64 });
        }
        by_op.into_iter().map(|(op, v)| (op, top_k(v, k))).collect()
    }
}

/// Kill totals per `(match_id, player_id)`, reduced to each match's best player.
#[derive(Default)]
pub struct MatchBestPlayer {
    groups: AHashMap<(String, String), u64>,
}

impl MatchBestPlayer {
    pub fn ingest(&mut self, rec: &MatchRecord) {
        *self
            .groups
            .entry((rec.match_id.clone(), rec.player_id.clone()))
            .or_insert(0) += rec.nb_kills as u64;
    }

    /// Keep the best `k` matches by their top player's total.
    pub fn finish(self, k: usize) -> MatchTop {
        let mut best: AHashMap<String, u64> = AHashMap::new();
        for ((match_id, _player), total) in self.groups {
            let slot = best.entry(match_id).or_insert(0);
            *slot = (*slot).max(total);
        }
        top_k(best.into_iter().map(|(match_id, kills)| MatchTotal { match_id, kills }), k)
    }
}

/// Local top-100 matches by mean kills, per operator.
pub fn operator_top_100(records: &[MatchRecord]) -> OperatorTop {
    let mut acc = OperatorMeans::default();
    records.iter().for_each(|r| acc.ingest(r));
    acc.finish(OPERATOR_TOP_WIDTH)
}

/// Local top-10 matches by best single-player kill total.
pub fn match_top_10(records: &[MatchRecord]) -> MatchTop {
    let mut acc = MatchBestPlayer::default();
    records.iter().for_each(|r| acc.ingest(r));
    acc.finish(MATCH_TOP_WIDTH)
}

/// Reduce one consolidated partition in a single pass over its file.
pub fn reduce_partition(handle: &PartitionHandle, read_buf: usize) -> Result<TopKPair> {
    let mut ops = OperatorMeans::default();
    let mut best = MatchBestPlayer::default();
    let n = handle.for_each_record(read_buf, |rec| {
        ops.ingest(&rec);
        best.ingest(&rec);
    })?;
    tracing::debug!(partition = %handle.key, records = n, "reduced partition");
    Ok(TopKPair {
        operators: ops.finish(OPERATOR_TOP_WIDTH),
        matches: best.finish(MATCH_TOP_WIDTH),
    })
}
