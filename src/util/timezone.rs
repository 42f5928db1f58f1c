//! Civil-time projection for promotion windows.
//!
//! Promotion windows are authored as local wall-clock times in the store's
//! civil zone. Every comparison projects the UTC instant into that zone first,
//! so the outcome never depends on the host's `TZ` setting.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;
use time::{OffsetDateTime, UtcOffset};

pub const DEFAULT_CIVIL_ZONE: Tz = chrono_tz::America::Sao_Paulo;

const LOCAL_INPUT_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CivilTimeError {
    #[error("`{input}` is not a local timestamp (expected YYYY-MM-DDTHH:MM[:SS])")]
    Unparseable { input: String },
    #[error("local time {local} does not exist in {zone}")]
    Nonexistent { local: NaiveDateTime, zone: Tz },
    #[error("local time {local} is outside the supported range")]
    OutOfRange { local: NaiveDateTime },
}

pub fn localized_datetime(instant: OffsetDateTime, tz: Tz) -> DateTime<Tz> {
    let utc = instant.to_offset(UtcOffset::UTC);
    let datetime_utc = DateTime::<Utc>::from_timestamp(utc.unix_timestamp(), utc.nanosecond())
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    datetime_utc.with_timezone(&tz)
}

/// A fixed civil zone used to evaluate promotion windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CivilTime {
    zone: Tz,
}

impl Default for CivilTime {
    fn default() -> Self {
        Self::new(DEFAULT_CIVIL_ZONE)
    }
}

impl CivilTime {
    pub fn new(zone: Tz) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    /// Wall-clock reading of `instant` in this zone.
    pub fn local(&self, instant: OffsetDateTime) -> NaiveDateTime {
        localized_datetime(instant, self.zone).naive_local()
    }

    /// Inclusive on both ends: `start <= now <= end` in local wall-clock time.
    pub fn is_within_window(
        &self,
        now: OffsetDateTime,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> bool {
        let now = self.local(now);
        now >= self.local(start) && now <= self.local(end)
    }

    /// Window check gated by the manual kill-switch.
    pub fn is_live(
        &self,
        active: bool,
        now: OffsetDateTime,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> bool {
        active && self.is_within_window(now, start, end)
    }

    /// Converts an author-facing local timestamp into an instant.
    ///
    /// Ambiguous readings (clocks turned back) resolve to the earlier instant;
    /// readings inside a forward gap are rejected.
    pub fn instant_from_local(&self, local: NaiveDateTime) -> Result<OffsetDateTime, CivilTimeError> {
        let resolved = self
            .zone
            .from_local_datetime(&local)
            .earliest()
            .ok_or(CivilTimeError::Nonexistent {
                local,
                zone: self.zone,
            })?;

        let nanos = i128::from(resolved.timestamp()) * 1_000_000_000
            + i128::from(resolved.timestamp_subsec_nanos());
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map_err(|_| CivilTimeError::OutOfRange { local })
    }

    /// Parses `YYYY-MM-DDTHH:MM[:SS]` as local wall-clock time in this zone.
    pub fn parse_local(&self, input: &str) -> Result<OffsetDateTime, CivilTimeError> {
        let trimmed = input.trim();
        let local = LOCAL_INPUT_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
            .ok_or_else(|| CivilTimeError::Unparseable {
                input: input.to_string(),
            })?;
        self.instant_from_local(local)
    }
}
