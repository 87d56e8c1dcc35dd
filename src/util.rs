//! Process-level helpers: one-shot tracing setup and file operations that
//! retry transient OS errors before giving up.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

const RETRY_TRIES: usize = 16;
const RETRY_DELAY_MS: u64 = 50;

static INIT_ONCE: std::sync::Once = std::sync::Once::new();

/// Install a fmt subscriber honoring `RUST_LOG` (default `info`).
/// Later calls, or calls after another subscriber was installed, are no-ops.
pub fn init_tracing_once() {
    INIT_ONCE.call_once(|| {
        let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
    });
}

/// Transient errors seen on network volumes and under AV/backup filter drivers.
/// Raw OS codes are only meaningful on Windows.
fn is_retriable_io_error(e: &io::Error) -> bool {
    if matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock) {
        return true;
    }
    is_retriable_os_code(e)
}

// Access denied (AV), sharing violation, lock violation, device not ready.
#[cfg(windows)]
fn is_retriable_os_code(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(5) | Some(21) | Some(32) | Some(33))
}

#[cfg(not(windows))]
fn is_retriable_os_code(_e: &io::Error) -> bool {
    false
}

/// Run `op` up to `tries` times, sleeping with linear backoff between
/// retriable failures. Non-retriable errors return immediately.
fn with_backoff<T>(tries: usize, delay_ms: u64, mut op: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    let tries = tries.max(1);
    let mut attempt = 0;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if is_retriable_io_error(&e) && attempt + 1 < tries => {
                attempt += 1;
                sleep(Duration::from_millis(delay_ms.saturating_mul(attempt as u64)));
            }
            Err(e) => return Err(e),
        }
    }
}

pub fn open_with_backoff(path: &Path) -> io::Result<File> {
    with_backoff(RETRY_TRIES, RETRY_DELAY_MS, || File::open(path))
}

pub fn create_with_backoff(path: &Path) -> io::Result<File> {
    with_backoff(RETRY_TRIES, RETRY_DELAY_MS, || File::create(path))
}

/// Create `path` exclusively. Fails with `AlreadyExists` if something holds it.
pub fn create_new_with_backoff(path: &Path) -> io::Result<File> {
    with_backoff(RETRY_TRIES, RETRY_DELAY_MS, || {
        OpenOptions::new().write(true).create_new(true).open(path)
    })
}

/// Remove a file; a file that is already gone counts as success.
pub fn remove_with_backoff(path: &Path) -> Result<()> {
    match with_backoff(RETRY_TRIES, RETRY_DELAY_MS, || fs::remove_file(path)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
    }
}

/// Promote a fully written `tmp` file to `dest`, replacing any previous file.
/// Falls back to copy+remove when rename is refused (cross-device, sharing).
pub fn replace_file_atomic(tmp: &Path, dest: &Path) -> Result<()> {
    match with_backoff(RETRY_TRIES, RETRY_DELAY_MS, || fs::rename(tmp, dest)) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            tracing::debug!(
                "rename {} -> {} failed ({}), falling back to copy",
                tmp.display(),
                dest.display(),
                rename_err
            );
            with_backoff(RETRY_TRIES, RETRY_DELAY_MS, || fs::copy(tmp, dest))
                .with_context(|| format!("copy {} -> {}", tmp.display(), dest.display()))?;
            remove_with_backoff(tmp)
        }
    }
}

/// Create `dir` (and parents) with a contextual error.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))
}
