use std::fmt;
use std::str::FromStr;
use time::{Date, Month, OffsetDateTime};

/// A calendar day rendered as fixed-width `YYYYMMDD`, so lexicographic order of
/// file names equals chronological order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayStamp(Date);

impl DayStamp {
    /// Panics on an impossible calendar date; use `FromStr` for untrusted input.
    pub fn new(year: i32, month: u8, day: u8) -> Self {
        let month = Month::try_from(month).expect("month must be 1..=12");
        Self(Date::from_calendar_date(year, month, day).expect("invalid calendar date"))
    }

    pub fn today_utc() -> Self {
        Self(OffsetDateTime::now_utc().date())
    }

    pub fn date(self) -> Date {
        self.0
    }

    pub fn prev(self) -> Option<Self> {
        self.0.previous_day().map(Self)
    }

    pub fn next(self) -> Option<Self> {
        self.0.next_day().map(Self)
    }
}

impl From<Date> for DayStamp {
    fn from(d: Date) -> Self {
        Self(d)
    }
}

impl fmt::Display for DayStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}{:02}", self.0.year(), u8::from(self.0.month()), self.0.day())
    }
}

impl FromStr for DayStamp {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("expected YYYYMMDD, got {s:?}"));
        }
        let year: i32 = s[0..4].parse().map_err(|_| "invalid year")?;
        let month: u8 = s[4..6].parse().map_err(|_| "invalid month")?;
        let day: u8 = s[6..8].parse().map_err(|_| "invalid day")?;
        let month = Month::try_from(month).map_err(|e| format!("invalid date {s:?}: {e}"))?;
        Date::from_calendar_date(year, month, day)
            .map(Self)
            .map_err(|e| format!("invalid date {s:?}: {e}"))
    }
}
