//! Rendering of the rolling rankings into their line-oriented text artifacts.
//!
//! operator artifact: `operatorId|match:kills,match:kills,...` (one line per operator)
//! match artifact:    `matchId:killTotal` (one line per match)

use crate::date::DayStamp;
use crate::spill::{inprogress_path, LineWriter};
use crate::topk::{MatchTop, OperatorTop, TopKPair};
use crate::util::ensure_dir;
use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Means are float-typed even when whole: `2.0`, never `2`.
pub fn format_mean(mean: f64) -> String {
    if mean.is_finite() && mean.fract() == 0.0 {
        format!("{mean:.1}")
    } else {
        mean.to_string()
    }
}

/// One line per operator, entries in rank order as produced by the merge.
pub fn operator_lines(top: &OperatorTop) -> impl Iterator<Item = String> + '_ {
    top.iter().map(|(op, entries)| {
        let mut line = format!("{op}|");
        for (i, e) in entries.iter().enumerate() {
            if i > 0 { line.push(','); }
            let _ = write!(line, "{}:{}", e.match_id, format_mean(e.mean_kills));
        }
        line
    })
}

pub fn match_lines(top: &MatchTop) -> impl Iterator<Item = String> + '_ {
    top.iter().map(|e| format!("{}:{}", e.match_id, e.kills))
}

pub fn render_operator_top(top: &OperatorTop) -> String {
    operator_lines(top).map(|l| l + "\n").collect()
}

pub fn render_match_top(top: &MatchTop) -> String {
    match_lines(top).map(|l| l + "\n").collect()
}

pub fn operator_artifact_path(dir: &Path, day: DayStamp) -> PathBuf {
    dir.join(format!("operator_top100_{day}.txt"))
}

pub fn match_artifact_path(dir: &Path, day: DayStamp) -> PathBuf {
    dir.join(format!("match_top10_{day}.txt"))
}

fn write_lines(path: &Path, lines: impl Iterator<Item = String>, write_buf: usize) -> Result<()> {
    let tmp = inprogress_path(path);
    let mut w = LineWriter::create(&tmp, write_buf).with_context(|| format!("create {}", tmp.display()))?;
    for line in lines {
        w.write_line(&line).with_context(|| format!("write {}", tmp.display()))?;
    }
    w.finish_atomic(path)
}

/// Write both rolling artifacts for `day` into `dir`. Returns
/// `(operator artifact, match artifact)`.
pub fn write_rolling(dir: &Path, day: DayStamp, top: &TopKPair, write_buf: usize) -> Result<(PathBuf, PathBuf)> {
    ensure_dir(dir)?;
    let ops_path = operator_artifact_path(dir, day);
    let match_path = match_artifact_path(dir, day);
    write_lines(&ops_path, operator_lines(&top.operators), write_buf)
        .with_context(|| format!("format: operator artifact for {day}"))?;
    write_lines(&match_path, match_lines(&top.matches), write_buf)
        .with_context(|| format!("format: match artifact for {day}"))?;
    Ok((ops_path, match_path))
}
