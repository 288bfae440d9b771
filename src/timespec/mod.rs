use std::fmt;
use std::str::FromStr;

use crate::{ClipError, Result};

/// A non-negative clip offset in whole seconds.
///
/// Parsed from `ss`, `mm:ss`, or `hh:mm:ss`. Minute and second components of
/// the multi-part forms must be below 60; the hour component is unbounded.
/// No sub-second precision is modeled, matching the granularity of the
/// downstream trim operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeSpec {
    secs: u64,
}

impl TimeSpec {
    /// Parse a human time string into an offset.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ClipError::InvalidFormat("empty time string".to_string()));
        }

        let parts: Vec<&str> = trimmed.split(':').collect();
        if parts.len() > 3 {
            return Err(ClipError::InvalidFormat(format!(
                "too many components in \"{}\"",
                trimmed
            )));
        }

        let mut values = Vec::with_capacity(parts.len());
        for part in &parts {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(ClipError::InvalidFormat(format!(
                    "non-numeric component in \"{}\"",
                    trimmed
                )));
            }
            let value: u64 = part.parse().map_err(|_| {
                ClipError::InvalidFormat(format!("component too large in \"{}\"", trimmed))
            })?;
            values.push(value);
        }

        // Sub-minute and sub-second components are bounded; hours are not.
        let secs = match values.as_slice() {
            [s] => *s,
            [m, s] => {
                if *m > 59 || *s > 59 {
                    return Err(ClipError::InvalidFormat(format!(
                        "minutes and seconds must be below 60 in \"{}\"",
                        trimmed
                    )));
                }
                m * 60 + s
            }
            [h, m, s] => {
                if *m > 59 || *s > 59 {
                    return Err(ClipError::InvalidFormat(format!(
                        "minutes and seconds must be below 60 in \"{}\"",
                        trimmed
                    )));
                }
                h * 3600 + m * 60 + s
            }
            _ => unreachable!("length checked above"),
        };

        Ok(Self { secs })
    }

    /// Total offset in whole seconds.
    pub fn as_secs(&self) -> u64 {
        self.secs
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.secs / 3600;
        let minutes = (self.secs % 3600) / 60;
        let seconds = self.secs % 60;

        if hours > 0 {
            write!(f, "{}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            write!(f, "{}:{:02}", minutes, seconds)
        }
    }
}

impl FromStr for TimeSpec {
    type Err = ClipError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
