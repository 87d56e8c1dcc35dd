use crate::util::{create_with_backoff, open_with_backoff, replace_file_atomic};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const MIN_BUF: usize = 8 * 1024;

/// Buffered line reader over a plain or zstd-compressed file.
/// Strips the trailing `\r?\n`.
pub struct LineReader {
    rdr: BufReader<Box<dyn Read + Send>>,
}

impl LineReader {
    /// Open `path`; `.zst` files are decompressed on the fly.
    pub fn open(path: &Path, buf_bytes: usize) -> io::Result<Self> {
        let f = open_with_backoff(path)?;
        Self::from_reader(path, f, buf_bytes)
    }

    /// Wrap an already-open file (or a byte-counting wrapper around one).
    pub fn from_reader<R: Read + Send + 'static>(path: &Path, inner: R, buf_bytes: usize) -> io::Result<Self> {
        Ok(Self { rdr: BufReader::with_capacity(buf_bytes.max(MIN_BUF), decoded(path, inner)?) })
    }

    /// Read the next line into `buf`. Returns the raw byte count (0 on EOF).
    pub fn read_line(&mut self, buf: &mut String) -> io::Result<usize> {
        buf.clear();
        let n = self.rdr.read_line(buf)?;
        if n == 0 { return Ok(0); }
        if buf.ends_with('\n') {
            buf.pop();
            if buf.ends_with('\r') { buf.pop(); }
        }
        Ok(n)
    }
}

/// `inner` as-is, or behind a zstd decoder when `path` ends in `.zst`.
pub fn decoded<R: Read + Send + 'static>(path: &Path, inner: R) -> io::Result<Box<dyn Read + Send>> {
    if is_zstd_path(path) {
        let mut dec = zstd::stream::read::Decoder::new(inner)?;
        dec.window_log_max(31)?;
        Ok(Box::new(dec))
    } else {
        Ok(Box::new(inner))
    }
}

fn is_zstd_path(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("zst")).unwrap_or(false)
}

/// Buffered line writer. Writes `\n` after every line.
pub struct LineWriter {
    path: PathBuf,
    w: Option<BufWriter<File>>,
}

impl LineWriter {
    pub fn create(path: &Path, buf_bytes: usize) -> io::Result<Self> {
        let f = create_with_backoff(path)?;
        Ok(Self { path: path.to_path_buf(), w: Some(BufWriter::with_capacity(buf_bytes.max(MIN_BUF), f)) })
    }

    #[inline]
    pub fn write_line(&mut self, s: &str) -> io::Result<()> {
        if let Some(w) = &mut self.w {
            w.write_all(s.as_bytes())?;
            w.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Append the full contents of another file.
    pub fn append_file(&mut self, src: &Path) -> Result<u64> {
        let mut r = open_with_backoff(src).with_context(|| format!("open {}", src.display()))?;
        match &mut self.w {
            Some(w) => io::copy(&mut r, w).with_context(|| format!("append {} -> {}", src.display(), self.path.display())),
            None => Ok(0),
        }
    }

    pub fn finish(mut self) -> Result<()> {
        if let Some(mut w) = self.w.take() {
            w.flush().with_context(|| format!("flush {}", self.path.display()))?;
        }
        Ok(())
    }

    /// Flush, close and promote the file to `final_path`.
    pub fn finish_atomic(mut self, final_path: &Path) -> Result<()> {
        if let Some(mut w) = self.w.take() {
            w.flush().with_context(|| format!("flush {}", self.path.display()))?;
        }
        replace_file_atomic(&self.path, final_path)
    }
}

/// Temp sibling used while a final file is being written: `<name>.inprogress`.
pub fn inprogress_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".inprogress");
    final_path.with_file_name(name)
}
