//! Time values with extended years and explicit precision
//!
//! The wire form is `±YYYY…-MM-DDThh:mm:ssZ` with at least four year digits.
//! Two quirks make this more than a date parse:
//!
//! - Years use historical numbering: there is no year 0 and `-0001` is 1 BCE.
//!   [`Timestamp::year`] is astronomical (1 BCE is 0), so negative years are
//!   shifted by one in each direction.
//! - Month and day may be `00` when they are below the stated precision. They
//!   are stored as 1 and restored to `00` from the precision on encode.

use super::tokens::{CalendarModel, TimePrecision};
use super::{CodecError, Result};
use regex::Regex;
use serde::{Serialize, Serializer};
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([+-][0-9]{4,})-([0-9]{2})-([0-9]{2})T([0-9]{2}):([0-9]{2}):([0-9]{2})Z$")
        .expect("time pattern is a valid regex")
});

/// Calendar fields of a time value, with an astronomical year
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub year: i64,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl Timestamp {
    /// Parse the wire form
    pub fn parse(text: &str) -> Result<Self> {
        let captures = TIME_PATTERN
            .captures(text)
            .ok_or_else(|| CodecError::InvalidTime(format!("unable to parse time \"{}\"", text)))?;

        let year: i64 = captures[1]
            .parse()
            .map_err(|_| CodecError::InvalidTime(format!("unable to parse year \"{}\"", text)))?;
        let year = match year {
            0 => return Err(CodecError::InvalidTime("year cannot be 0".to_string())),
            y if y < 0 => y + 1,
            y => y,
        };

        let field = |index: usize, name: &str, max: u8| -> Result<u8> {
            let value: u8 = captures[index].parse().map_err(|_| {
                CodecError::InvalidTime(format!("unable to parse {} \"{}\"", name, text))
            })?;
            if value > max {
                return Err(CodecError::InvalidTime(format!(
                    "{} out of range in \"{}\"",
                    name, text
                )));
            }
            Ok(value)
        };

        // 00 marks an insignificant month or day; the precision keeps that fact.
        let month = field(2, "month", 12)?.max(1);
        let day = field(3, "day", 31)?.max(1);

        Ok(Self {
            year,
            month,
            day,
            hour: field(4, "hour", 23)?,
            minute: field(5, "minute", 59)?,
            second: field(6, "second", 59)?,
        })
    }

    /// Render the wire form, blanking fields below `precision`
    pub fn format(&self, precision: TimePrecision) -> String {
        let year = if self.year < 1 { self.year - 1 } else { self.year };
        let month = if precision < TimePrecision::Month { 0 } else { self.month };
        let day = if precision < TimePrecision::Day { 0 } else { self.day };
        format!(
            "{:+05}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            year, month, day, self.hour, self.minute, self.second
        )
    }
}

/// A decoded `time` data value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimeValue {
    pub timestamp: Timestamp,
    pub precision: TimePrecision,
    pub calendar: CalendarModel,
}

impl TimeValue {
    pub fn new(timestamp: Timestamp, precision: TimePrecision, calendar: CalendarModel) -> Self {
        Self {
            timestamp,
            precision,
            calendar,
        }
    }

    /// Wire text of the timestamp at this value's precision
    pub fn time_text(&self) -> String {
        self.timestamp.format(self.precision)
    }
}

impl Serialize for TimeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire {
            time: String,
            precision: TimePrecision,
            calendarmodel: CalendarModel,
        }

        Wire {
            time: self.time_text(),
            precision: self.precision,
            calendarmodel: self.calendar,
        }
        .serialize(serializer)
    }
}
