//! Record validation: a raw record is accepted only when every field passes.
//! Rejections are not errors; callers count and drop them.

use crate::record::{MatchRecord, RawRecord};
use regex::Regex;

/// Operator ids present in the game's roster.
pub const OPERATORS: [u32; 24] = [
    14, 24, 30, 46, 64, 72, 73, 84, 100, 107, 109, 112, 130, 132, 173, 193, 194, 211, 230, 233,
    237, 241, 245, 253,
];

pub const MIN_KILLS: u32 = 0;
pub const MAX_KILLS: u32 = 100;

const UUID_V4_PATTERN: &str =
    r"^[a-f0-9]{8}-[a-f0-9]{4}-4[a-f0-9]{3}-[89ab][a-f0-9]{3}-[a-f0-9]{12}$";

/// Inclusive kill-count range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KillBounds {
    pub min: u32,
    pub max: u32,
}

impl Default for KillBounds {
    fn default() -> Self {
        Self { min: MIN_KILLS, max: MAX_KILLS }
    }
}

impl KillBounds {
    #[inline]
    pub fn contains(&self, kills: u32) -> bool {
        (self.min..=self.max).contains(&kills)
    }
}

/// Why a record was rejected. Only used for trace logging and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    NotUtf8,
    NullField,
    BadPlayerId,
    BadMatchId,
    UnknownOperator,
    KillsOutOfRange,
}

#[derive(Clone, Debug)]
pub struct Validator {
    uuid: Regex,
    operators: Vec<u32>, // sorted for binary_search
    bounds: KillBounds,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(&OPERATORS, KillBounds::default())
    }
}

impl Validator {
    pub fn new(operators: &[u32], bounds: KillBounds) -> Self {
        let mut ops = operators.to_vec();
        ops.sort_unstable();
        ops.dedup();
        Self {
            uuid: Regex::new(UUID_V4_PATTERN).expect("static uuid pattern"),
            operators: ops,
            bounds,
        }
    }

    pub fn bounds(&self) -> KillBounds {
        self.bounds
    }

    #[inline]
    pub fn is_uuid_v4(&self, s: &str) -> bool {
        self.uuid.is_match(s)
    }

    #[inline]
    pub fn is_known_operator(&self, op: u32) -> bool {
        self.operators.binary_search(&op).is_ok()
    }

    /// Check every constraint, reporting the first failing one.
    pub fn check(&self, raw: &RawRecord<'_>) -> Result<MatchRecord, Rejection> {
        let (Some(player), Some(matchid), Some(op), Some(kills)) =
            (raw.player_id(), raw.match_id(), raw.operator_id(), raw.nb_kills())
        else {
            return Err(Rejection::NullField);
        };
        if !self.is_uuid_v4(player) {
            return Err(Rejection::BadPlayerId);
        }
        if !self.is_uuid_v4(matchid) {
            return Err(Rejection::BadMatchId);
        }
        // A value that does not parse as an unsigned integer is treated like
        // an out-of-domain value for its column.
        let operator_id = match op.parse::<u32>() {
            Ok(v) if self.is_known_operator(v) => v,
            _ => return Err(Rejection::UnknownOperator),
        };
        let nb_kills = match kills.parse::<u32>() {
            Ok(v) if self.bounds.contains(v) => v,
            _ => return Err(Rejection::KillsOutOfRange),
        };
        Ok(MatchRecord {
            player_id: player.to_string(),
            match_id: matchid.to_string(),
            operator_id,
            nb_kills,
        })
    }

    /// Accept or drop.
    #[inline]
    pub fn accept(&self, raw: &RawRecord<'_>) -> Option<MatchRecord> {
        self.check(raw).ok()
    }

    /// Parse and validate one log line.
    #[inline]
    pub fn accept_line(&self, line: &str) -> Option<MatchRecord> {
        self.accept(&RawRecord::from_line(line))
    }
}
