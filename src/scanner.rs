//! Chunked scanning of the match log.
//!
//! The scanner reads the log in source order and yields batches covering at most
//! `chunk_size` raw rows each, already filtered through the [`Validator`].
//! Rows are read as bytes, so a row that is not UTF-8 is one more rejection
//! rather than a failed read. Exhaustion of the source simply ends the iteration.

use crate::progress::ProgressScope;
use crate::record::{MatchRecord, RawRecord};
use crate::spill::decoded;
use crate::util::open_with_backoff;
use crate::validate::Validator;
use anyhow::{bail, Context, Result};
use csv::{ByteRecord, Reader, ReaderBuilder, Trim};
use serde::Serialize;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Running totals for one scan.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub lines: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub batches: u64,
}

/// Forwards the number of bytes read from the underlying file to a progress bar.
struct CountingReader<R: Read> {
    inner: R,
    pb: ProgressScope,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pb.inc(n as u64);
        Ok(n)
    }
}

pub struct ChunkedScanner {
    path: PathBuf,
    reader: Option<Reader<Box<dyn Read + Send>>>, // None once exhausted or after an I/O error
    chunk_size: usize,
    validator: Validator,
    stats: ScanStats,
    record: ByteRecord,
}

impl ChunkedScanner {
    /// Open `path` for chunked scanning. A zero `chunk_size` is a configuration
    /// error reported before the file is touched.
    pub fn open(path: &Path, chunk_size: usize, validator: Validator, read_buf: usize) -> Result<Self> {
        Self::open_with_progress(path, chunk_size, validator, read_buf, ProgressScope::hidden())
    }

    pub fn open_with_progress(
        path: &Path,
        chunk_size: usize,
        validator: Validator,
        read_buf: usize,
        pb: ProgressScope,
    ) -> Result<Self> {
        if chunk_size == 0 {
            bail!("configuration: chunk size must be a positive integer greater than zero");
        }
        let f = open_with_backoff(path).with_context(|| format!("scan: open log {}", path.display()))?;
        let counted = CountingReader { inner: f, pb };
        let source = decoded(path, counted).with_context(|| format!("scan: open log {}", path.display()))?;
        // Headerless and ragged: short rows become nulls, extra fields are ignored.
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .buffer_capacity(read_buf.max(8 * 1024))
            .from_reader(source);
        Ok(Self {
            path: path.to_path_buf(),
            reader: Some(reader),
            chunk_size,
            validator,
            stats: ScanStats::default(),
            record: ByteRecord::new(),
        })
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Read up to `chunk_size` non-blank rows. `Ok(None)` once the source is exhausted.
    fn next_batch(&mut self) -> Result<Option<Vec<MatchRecord>>> {
        let Some(reader) = self.reader.as_mut() else { return Ok(None) };
        let mut batch = Vec::with_capacity(self.chunk_size.min(64 * 1024));
        let mut rows = 0usize;
        while rows < self.chunk_size {
            let more = reader
                .read_byte_record(&mut self.record)
                .with_context(|| format!("scan: read {} near line {}", self.path.display(), self.stats.lines + 1))?;
            if !more {
                self.reader = None;
                break;
            }
            if self.record.iter().all(|f| f.is_empty()) {
                continue;
            }
            rows += 1;
            self.stats.lines += 1;
            let verdict = RawRecord::from_byte_record(&self.record).and_then(|raw| self.validator.check(&raw));
            match verdict {
                Ok(rec) => {
                    self.stats.accepted += 1;
                    batch.push(rec);
                }
                Err(why) => {
                    self.stats.rejected += 1;
                    tracing::trace!(line = self.stats.lines, reason = ?why, "dropped record");
                }
            }
        }
        if rows == 0 {
            return Ok(None);
        }
        self.stats.batches += 1;
        Ok(Some(batch))
    }
}

impl Iterator for ChunkedScanner {
    type Item = Result<Vec<MatchRecord>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => None,
            Err(e) => {
                // Stop after reporting the failure once.
                self.reader = None;
                Some(Err(e))
            }
        }
    }
}
