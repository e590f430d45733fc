//! Temporal codec: nanosecond instants <-> timezone-naive storage timestamps.
//!
//! The engine keeps `created`/`updated` in columns without a timezone, holding
//! the wall-clock digits of the zone the engine writes in. Drivers that read such
//! a column and must produce an aware value tag the digits as UTC purely because
//! no offset was present. Decoding therefore drops that tag and reinterprets the
//! same digits in the storage wall-clock zone. Encoding renders an instant's
//! digits in that same zone without an offset marker, so that
//! `decode(label_utc(encode(t))) == t` for every zone offset.

use std::fmt;
use std::str::FromStr;

use chrono::offset::LocalResult;
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::StoreError;

/// Wire format: `YYYY-MM-DD HH:MM:SS[.fffffffff]`, no offset.
pub const NAIVE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Zone whose wall-clock digits the engine stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum WallClock {
    /// The process's local zone.
    #[default]
    Local,
    Utc,
    Fixed(FixedOffset),
}

impl FromStr for WallClock {
    type Err = StoreError;

    /// Accepts `local`, `utc`, or an offset such as `+09:00`, `-0530`, `+02`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(WallClock::Local),
            "utc" | "z" => Ok(WallClock::Utc),
            other => parse_offset(other).map(WallClock::Fixed),
        }
    }
}

fn parse_offset(s: &str) -> Result<FixedOffset, StoreError> {
    let invalid = || StoreError::Configuration(format!("invalid wall clock zone {s:?}"));
    let (sign, digits) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => return Err(invalid()),
    };
    let digits: String = digits.chars().filter(|c| *c != ':').collect();
    if !(digits.len() == 2 || digits.len() == 4) || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = if digits.len() == 4 {
        digits[2..].parse().map_err(|_| invalid())?
    } else {
        0
    };
    if minutes >= 60 {
        return Err(invalid());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

impl TryFrom<String> for WallClock {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WallClock> for String {
    fn from(zone: WallClock) -> Self {
        zone.to_string()
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WallClock::Local => f.write_str("local"),
            WallClock::Utc => f.write_str("utc"),
            WallClock::Fixed(offset) => offset.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TemporalCodec {
    zone: WallClock,
}

impl TemporalCodec {
    pub fn new(zone: WallClock) -> Self {
        Self { zone }
    }

    /// Wall-clock digits of `nanos` in the storage zone.
    pub fn to_naive(&self, nanos: i64) -> NaiveDateTime {
        let instant = DateTime::from_timestamp_nanos(nanos);
        match self.zone {
            WallClock::Local => instant.with_timezone(&Local).naive_local(),
            WallClock::Utc => instant.naive_utc(),
            WallClock::Fixed(offset) => instant.with_timezone(&offset).naive_local(),
        }
    }

    /// Renders `nanos` for binding against a naive timestamp column.
    pub fn encode(&self, nanos: i64) -> String {
        self.to_naive(nanos).format(NAIVE_FORMAT).to_string()
    }

    /// Decodes a value a driver has tagged as UTC only because it carried no offset.
    pub fn decode(&self, labelled: DateTime<Utc>) -> Result<i64, StoreError> {
        self.decode_naive(labelled.naive_utc())
    }

    /// Interprets stored wall-clock digits in the storage zone.
    ///
    /// Digits that fall into a DST fold resolve to the earlier instant; digits in
    /// a DST gap name no instant and are rejected.
    pub fn decode_naive(&self, naive: NaiveDateTime) -> Result<i64, StoreError> {
        let instant = match self.zone {
            WallClock::Local => resolve(Local.from_local_datetime(&naive), naive)?,
            WallClock::Utc => naive.and_utc(),
            WallClock::Fixed(offset) => resolve(offset.from_local_datetime(&naive), naive)?,
        };
        instant
            .timestamp_nanos_opt()
            .ok_or_else(|| StoreError::timestamp(naive, "outside the nanosecond range"))
    }

    pub fn decode_text(&self, text: &str) -> Result<i64, StoreError> {
        self.decode_naive(parse_naive(text)?)
    }
}

fn resolve<Tz: TimeZone>(
    mapped: LocalResult<DateTime<Tz>>,
    naive: NaiveDateTime,
) -> Result<DateTime<Utc>, StoreError> {
    mapped
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| StoreError::timestamp(naive, "wall-clock time does not exist in zone"))
}

/// Parses the fixed naive format. A trailing ` +0000 UTC`-style label is not accepted.
pub fn parse_naive(text: &str) -> Result<NaiveDateTime, StoreError> {
    NaiveDateTime::parse_from_str(text, NAIVE_FORMAT)
        .map_err(|e| StoreError::timestamp(text, e.to_string()))
}
