use crate::record::MatchRecord;
use crate::spill::{inprogress_path, LineReader, LineWriter};
use crate::util::{ensure_dir, remove_with_backoff};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Characters of `match_id` that select its partition.
pub const PARTITION_KEY_LEN: usize = 3;

/// Partition key of a match: its first three characters. Every record of one
/// match lands in the same partition, so per-match aggregates never span two.
#[inline]
pub fn partition_key(match_id: &str) -> &str {
    match match_id.char_indices().nth(PARTITION_KEY_LEN) {
        Some((idx, _)) => &match_id[..idx],
        None => match_id,
    }
}

/// Disk-backed spill state for one run, keyed by partition key.
///
/// File layout (all under a private temp directory inside `work_dir`):
///   run-XXXX/fragments/<key>/<batch:06>.csv   one fragment per key per batch
///   run-XXXX/partitions/<key>.csv             after `consolidate()`
///
/// Each `spill_batch` opens and closes its fragment writers, so at most one
/// spill file is open at a time regardless of how many keys exist.
/// Everything is deleted when the store (or the `Partitions` it becomes) is dropped.
pub struct PartitionStore {
    root: TempDir,
    fragments: BTreeMap<String, Vec<PathBuf>>,
    records: BTreeMap<String, u64>,
    batches: u64,
    write_buf: usize,
}

impl PartitionStore {
    pub fn create(work_dir: &Path, write_buf: usize) -> Result<Self> {
        ensure_dir(work_dir)?;
        let root = tempfile::Builder::new()
            .prefix("run-")
            .tempdir_in(work_dir)
            .with_context(|| format!("partition: create spill directory in {}", work_dir.display()))?;
        ensure_dir(&root.path().join("fragments"))?;
        ensure_dir(&root.path().join("partitions"))?;
        Ok(Self { root, fragments: BTreeMap::new(), records: BTreeMap::new(), batches: 0, write_buf })
    }

    pub fn dir(&self) -> &Path {
        self.root.path()
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Keys seen so far.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fragments.keys().map(|k| k.as_str())
    }

    /// Route one validated batch into per-key fragments.
    pub fn spill_batch(&mut self, batch: &[MatchRecord]) -> Result<()> {
        let batch_idx = self.batches;
        self.batches += 1;
        if batch.is_empty() { return Ok(()); }

        let mut groups: BTreeMap<&str, Vec<&MatchRecord>> = BTreeMap::new();
        for rec in batch {
            groups.entry(partition_key(&rec.match_id)).or_default().push(rec);
        }

        for (key, recs) in groups {
            let key_dir = self.root.path().join("fragments").join(key);
            if !self.fragments.contains_key(key) {
                ensure_dir(&key_dir)?;
            }
            let frag = key_dir.join(format!("{:06}.csv", batch_idx));
            let mut w = LineWriter::create(&frag, self.write_buf)
                .with_context(|| format!("partition: create fragment {}", frag.display()))?;
            let n = recs.len();
            for rec in recs {
                w.write_line(&rec.to_line())
                    .with_context(|| format!("partition: write fragment {}", frag.display()))?;
            }
            w.finish()?;
            *self.records.entry(key.to_string()).or_default() += n as u64;
            self.fragments.entry(key.to_string()).or_default().push(frag);
        }
        Ok(())
    }

    /// Concatenate each key's fragments into one partition file. Consumes the
    /// store, so consolidation happens exactly once per run.
    pub fn consolidate(self) -> Result<Partitions> {
        let PartitionStore { root, fragments, records, batches: _, write_buf } = self;
        let part_dir = root.path().join("partitions");
        let mut handles = BTreeMap::new();

        for (key, frags) in fragments {
            let final_path = part_dir.join(format!("{key}.csv"));
            let tmp = inprogress_path(&final_path);
            let mut w = LineWriter::create(&tmp, write_buf)
                .with_context(|| format!("partition: create {}", tmp.display()))?;
            for frag in &frags {
                w.append_file(frag)?;
            }
            w.finish_atomic(&final_path)?;
            for frag in &frags {
                remove_with_backoff(frag)?;
            }
            let _ = fs::remove_dir(root.path().join("fragments").join(&key));
            let n = records.get(&key).copied().unwrap_or(0);
            handles.insert(key.clone(), PartitionHandle { key, path: final_path, records: n });
        }

        Ok(Partitions { root, handles })
    }
}

/// A consolidated partition file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionHandle {
    pub key: String,
    pub path: PathBuf,
    pub records: u64,
}

impl PartitionHandle {
    /// Stream the partition's records back. Lines were validated on the way in,
    /// so a line that no longer parses means the spill file was damaged.
    pub fn for_each_record(&self, read_buf: usize, mut on_rec: impl FnMut(MatchRecord)) -> Result<u64> {
        let mut rdr = LineReader::open(&self.path, read_buf)
            .with_context(|| format!("reduce: open partition {}", self.path.display()))?;
        let mut buf = String::with_capacity(128);
        let mut n = 0u64;
        loop {
            if rdr.read_line(&mut buf)? == 0 { break; }
            if buf.is_empty() { continue; }
            let rec = parse_spilled(&buf)
                .with_context(|| format!("reduce: corrupt spill line {} in {}", n + 1, self.path.display()))?;
            on_rec(rec);
            n += 1;
        }
        Ok(n)
    }

    pub fn read_all(&self, read_buf: usize) -> Result<Vec<MatchRecord>> {
        let mut out = Vec::new();
        self.for_each_record(read_buf, |r| out.push(r))?;
        Ok(out)
    }
}

fn parse_spilled(line: &str) -> Result<MatchRecord> {
    let mut it = line.splitn(4, ',');
    let (Some(player), Some(matchid), Some(op), Some(kills)) = (it.next(), it.next(), it.next(), it.next()) else {
        anyhow::bail!("expected 4 fields");
    };
    Ok(MatchRecord {
        player_id: player.to_string(),
        match_id: matchid.to_string(),
        operator_id: op.parse().context("operator_id")?,
        nb_kills: kills.parse().context("nb_kills")?,
    })
}

/// The consolidated partitions of one run: `partition key → handle`.
/// Owns the spill directory; dropping it removes every partition file.
pub struct Partitions {
    root: TempDir,
    handles: BTreeMap<String, PartitionHandle>,
}

impl Partitions {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&PartitionHandle> {
        self.handles.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(|k| k.as_str())
    }

    pub fn handles(&self) -> impl Iterator<Item = &PartitionHandle> {
        self.handles.values()
    }

    pub fn total_records(&self) -> u64 {
        self.handles.values().map(|h| h.records).sum()
    }

    pub fn as_map(&self) -> &BTreeMap<String, PartitionHandle> {
        &self.handles
    }

    pub fn dir(&self) -> &Path {
        self.root.path()
    }
}
