use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_ROW_SELECTOR: &str = "table tr:not(:first-child)";
pub const DEFAULT_CELL_SELECTOR: &str = "td";
pub const DEFAULT_COLUMN: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown time zone {0:?}: use 'local', 'utc' or an offset like '+02:00'")]
    Zone(String),
    #[error("invalid CSS selector {selector:?}: {message}")]
    Selector { selector: String, message: String },
}

/// Zone used both to interpret a cell timestamp and to display it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    #[default]
    Local,
    Utc,
    /// Seconds east of UTC.
    Fixed(i32),
}

impl Zone {
    pub fn fixed_offset(self) -> Option<FixedOffset> {
        match self {
            Zone::Fixed(secs) => FixedOffset::east_opt(secs),
            _ => None,
        }
    }
}

impl FromStr for Zone {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ConfigError::Zone(s.to_string());
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => return Ok(Zone::Local),
            "utc" | "z" => return Ok(Zone::Utc),
            _ => {}
        }

        let s = s.trim();
        let sign = match s.as_bytes().first() {
            Some(b'+') => 1,
            Some(b'-') => -1,
            _ => return Err(err()),
        };
        let (hours, minutes) = s[1..].split_once(':').ok_or_else(err)?;
        if hours.len() != 2
            || minutes.len() != 2
            || !hours.bytes().chain(minutes.bytes()).all(|b| b.is_ascii_digit())
        {
            return Err(err());
        }
        let hours: i32 = hours.parse().map_err(|_| err())?;
        let minutes: i32 = minutes.parse().map_err(|_| err())?;
        if hours > 23 || minutes > 59 {
            return Err(err());
        }
        Ok(Zone::Fixed(sign * (hours * 3600 + minutes * 60)))
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Local => f.write_str("local"),
            Zone::Utc => f.write_str("utc"),
            Zone::Fixed(secs) => {
                let sign = if *secs < 0 { '-' } else { '+' };
                let abs = secs.unsigned_abs();
                write!(f, "{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub row_selector: String,
    pub cell_selector: String,
    /// Zero-based index of the timestamp cell within a row.
    pub column: usize,
    pub zone: Zone,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            row_selector: DEFAULT_ROW_SELECTOR.to_string(),
            cell_selector: DEFAULT_CELL_SELECTOR.to_string(),
            column: DEFAULT_COLUMN,
            zone: Zone::Local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_named_zones() {
        assert_eq!("local".parse::<Zone>().unwrap(), Zone::Local);
        assert_eq!("UTC".parse::<Zone>().unwrap(), Zone::Utc);
        assert_eq!(" z ".parse::<Zone>().unwrap(), Zone::Utc);
    }

    #[test]
    fn parse_fixed_offsets() {
        assert_eq!("+02:00".parse::<Zone>().unwrap(), Zone::Fixed(7200));
        assert_eq!("-05:30".parse::<Zone>().unwrap(), Zone::Fixed(-19800));
        assert_eq!(Zone::Fixed(-19800).to_string(), "-05:30");
        assert_eq!(Zone::Fixed(7200).fixed_offset().unwrap().local_minus_utc(), 7200);
    }

    #[test]
    fn reject_bad_zones() {
        for bad in ["", "Europe/Paris", "+2:00", "+24:00", "+02:60", "02:00"] {
            assert_eq!(
                bad.parse::<Zone>(),
                Err(ConfigError::Zone(bad.to_string())),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn defaults_target_fourth_cell() {
        let s = Settings::default();
        assert_eq!(s.column, 3);
        assert_eq!(s.row_selector, "table tr:not(:first-child)");
        assert_eq!(s.zone, Zone::Local);
    }
}
