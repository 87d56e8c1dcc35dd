//! Match log records: the raw positional view of one log line and the typed
//! record that survives validation.

use crate::validate::Rejection;
use csv::ByteRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const FIELD_COUNT: usize = 4;

/// One validated gameplay event.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchRecord {
    pub player_id: String,
    pub match_id: String,
    pub operator_id: u32,
    pub nb_kills: u32,
}

impl MatchRecord {
    /// Encode back to the headerless log line form (no trailing newline).
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MatchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.player_id, self.match_id, self.operator_id, self.nb_kills)
    }
}

/// The four positional fields of a log line before any typing.
/// `None` marks a null field: missing from a short line, or empty.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawRecord<'a> {
    pub fields: [Option<&'a str>; FIELD_COUNT],
}

impl<'a> RawRecord<'a> {
    /// Split a single headerless CSV line. Extra fields are truncated, missing
    /// fields become null, each field is trimmed and one pair of enclosing
    /// double quotes is removed.
    pub fn from_line(line: &'a str) -> Self {
        let mut fields = [None; FIELD_COUNT];
        for (slot, raw) in fields.iter_mut().zip(line.split(',')) {
            let v = raw.trim();
            let v = v.strip_prefix('"').and_then(|q| q.strip_suffix('"')).unwrap_or(v).trim();
            if !v.is_empty() {
                *slot = Some(v);
            }
        }
        Self { fields }
    }

    /// View a record read by the `csv` reader (already unquoted). Only the
    /// first four fields are decoded; one that is not UTF-8 rejects the row.
    pub fn from_byte_record(rec: &'a ByteRecord) -> Result<Self, Rejection> {
        let mut fields = [None; FIELD_COUNT];
        for (slot, raw) in fields.iter_mut().zip(rec.iter()) {
            let v = std::str::from_utf8(raw).map_err(|_| Rejection::NotUtf8)?.trim();
            if !v.is_empty() {
                *slot = Some(v);
            }
        }
        Ok(Self { fields })
    }

    pub fn new(
        player_id: Option<&'a str>,
        match_id: Option<&'a str>,
        operator_id: Option<&'a str>,
        nb_kills: Option<&'a str>,
    ) -> Self {
        Self { fields: [player_id, match_id, operator_id, nb_kills] }
    }

    #[inline] pub fn player_id(&self) -> Option<&'a str> { self.fields[0] }
    #[inline] pub fn match_id(&self) -> Option<&'a str> { self.fields[1] }
    #[inline] pub fn operator_id(&self) -> Option<&'a str> { self.fields[2] }
    #[inline] pub fn nb_kills(&self) -> Option<&'a str> { self.fields[3] }
}
