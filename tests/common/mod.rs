#![allow(dead_code)]

use killboard::MatchRecord;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// A valid lowercase UUIDv4 whose first group starts with `prefix` (≤ 8 hex chars).
pub fn uuid_with_prefix(prefix: &str, n: u64) -> String {
    assert!(prefix.len() <= 8);
    let width = 8 - prefix.len();
    let head = if width == 0 {
        prefix.to_string()
    } else {
        format!("{prefix}{:0width$x}", n % 16u64.pow(width as u32), width = width)
    };
    format!("{head}-{:04x}-4{:03x}-8{:03x}-{:012x}", n & 0xffff, n & 0xfff, (n >> 12) & 0xfff, n)
}

/// A valid UUIDv4 derived from `n`; distinct `n` give distinct ids.
pub fn uuid(n: u64) -> String {
    format!("{:08x}-{:04x}-4{:03x}-a{:03x}-{:012x}", (n * 2654435761) & 0xffff_ffff, n & 0xffff, n & 0xfff, n & 0xfff, n)
}

pub fn rec(player: &str, match_id: &str, op: u32, kills: u32) -> MatchRecord {
    MatchRecord {
        player_id: player.to_string(),
        match_id: match_id.to_string(),
        operator_id: op,
        nb_kills: kills,
    }
}

/// Write log lines (no header) to `path`, creating parent directories.
pub fn write_log(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut f = File::create(path).unwrap();
    for l in lines {
        writeln!(f, "{}", l).unwrap();
    }
}

pub fn write_log_bytes(path: &Path, bytes: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

pub fn write_zst_log(path: &Path, lines: &[String]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let f = File::create(path).unwrap();
    let mut enc = zstd::stream::write::Encoder::new(f, 3).unwrap();
    for l in lines {
        writeln!(&mut enc, "{}", l).unwrap();
    }
    enc.finish().unwrap();
}

pub fn read_lines(path: &Path) -> Vec<String> {
    let f = File::open(path).unwrap();
    BufReader::new(f).lines().map(|l| l.unwrap()).filter(|s| !s.is_empty()).collect()
}

/// Fresh scratch directory kept for the lifetime of the test process.
pub fn scratch() -> PathBuf {
    tempfile::tempdir().unwrap().into_path()
}

/// A small day of matches:
/// - match A (prefix "abc"): p1 kills 3+4 with op 14, p2 kills 2 with op 24
/// - match B (prefix "def"): p1 kills 5 with op 14, p3 kills 1+1+1 with op 14
/// - match C (prefix "abc"): p2 kills 9 with op 24
/// plus three junk lines that must be dropped.
pub struct SmallDay {
    pub match_a: String,
    pub match_b: String,
    pub match_c: String,
    pub p1: String,
    pub p2: String,
    pub p3: String,
    pub lines: Vec<String>,
}

pub fn small_day() -> SmallDay {
    let match_a = uuid_with_prefix("abc", 1);
    let match_b = uuid_with_prefix("def", 2);
    let match_c = uuid_with_prefix("abc", 3);
    let (p1, p2, p3) = (uuid(11), uuid(12), uuid(13));
    let lines = vec![
        format!("{p1},{match_a},14,3"),
        format!("{p1},{match_a},14,4"),
        format!("{p2},{match_a},24,2"),
        "not-a-uuid,also-not,14,1".to_string(),
        format!("{p1},{match_b},14,5"),
        format!("{p3},{match_b},14,1"),
        format!("{p3},{match_b},14,1"),
        format!("{p2},{match_b},999,1"),
        format!("{p3},{match_b},14,1"),
        format!("{p2},{match_c},24,9"),
        format!("{p2},{match_c}"),
    ];
    SmallDay { match_a, match_b, match_c, p1, p2, p3, lines }
}
