use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone,
    Timelike,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// `YYYY-MM-DD HH:MM:SS` with an optional `.digits` suffix, anchored at the start.
static TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{4}-[0-9]{2}-[0-9]{2} [0-9]{2}:[0-9]{2}:[0-9]{2})(\.[0-9]+)?")
        .expect("timestamp pattern")
});

const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Dot plus at most three digits.
const MAX_FRACTION_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Skip {
    MissingCell,
    NoMatch,
    InvalidDate,
}

impl Skip {
    pub fn as_str(self) -> &'static str {
        match self {
            Skip::MissingCell => "missing_cell",
            Skip::NoMatch => "no_match",
            Skip::InvalidDate => "invalid_date",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The cell keeps its original content.
    Unchanged { reason: Skip },
    Reformatted { text: String },
}

impl Outcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Unchanged { .. } => "unchanged",
            Outcome::Reformatted { .. } => "reformatted",
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Outcome::Reformatted { text } => Some(text),
            Outcome::Unchanged { .. } => None,
        }
    }

    pub fn skip(&self) -> Option<Skip> {
        match self {
            Outcome::Unchanged { reason } => Some(*reason),
            Outcome::Reformatted { .. } => None,
        }
    }

    fn unchanged(reason: Skip) -> Self {
        Outcome::Unchanged { reason }
    }
}

/// Rewrites a leading `YYYY-MM-DD HH:MM:SS[.fff...]` timestamp as
/// `YYYY-MM-DD HH:MM:SS.mmm`, interpreting and displaying it in `tz`.
///
/// Fractional seconds are truncated to milliseconds, never rounded. Anything
/// after the timestamp is dropped.
pub fn reformat<Tz: TimeZone>(raw: &str, tz: &Tz) -> Outcome {
    let trimmed = trim(raw);
    let Some(caps) = TIMESTAMP.captures(trimmed) else {
        return Outcome::unchanged(Skip::NoMatch);
    };

    let base = &caps[1];
    let fraction = caps
        .get(2)
        .map(|m| &m.as_str()[..m.len().min(MAX_FRACTION_LEN)])
        .unwrap_or("");
    let iso = format!("{base}{fraction}").replacen(' ', "T", 1);

    match parse_local(&iso, tz) {
        Some(dt) => Outcome::Reformatted {
            text: display(&dt),
        },
        None => Outcome::unchanged(Skip::InvalidDate),
    }
}

/// ECMAScript `trim`: `Zs`, TAB, VT, FF, BOM and the four line terminators.
/// U+0085 is not included.
fn trim(s: &str) -> &str {
    s.trim_matches(is_ecma_space)
}

fn is_ecma_space(c: char) -> bool {
    matches!(
        c,
        '\t' | '\u{b}'
            | '\u{c}'
            | '\n'
            | '\r'
            | '\u{2028}'
            | '\u{2029}'
            | '\u{feff}'
            | ' '
            | '\u{a0}'
            | '\u{1680}'
            | '\u{2000}'..='\u{200a}'
            | '\u{202f}'
            | '\u{205f}'
            | '\u{3000}'
    )
}

fn parse_local<Tz: TimeZone>(iso: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let naive = match end_of_day(iso) {
        Some(midnight) => midnight,
        None => NaiveDateTime::parse_from_str(iso, ISO_FORMAT).ok()?,
    };
    // chrono accepts :60 as a leap second
    if naive.nanosecond() >= 1_000_000_000 {
        return None;
    }
    resolve_local(tz, naive)
}

/// `T24:00:00` with no fraction (or an all-zero one) is midnight of the
/// following day. Any other hour 24 stays invalid.
fn end_of_day(iso: &str) -> Option<NaiveDateTime> {
    let (date, time) = iso.split_once('T')?;
    let rest = time.strip_prefix("24:00:00")?;
    let zero_fraction = match rest.strip_prefix('.') {
        Some(digits) => digits.bytes().all(|b| b == b'0'),
        None => rest.is_empty(),
    };
    if !zero_fraction {
        return None;
    }
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()?
        .succ_opt()?
        .and_hms_opt(0, 0, 0)
}

/// Ambiguous wall-clock times resolve to the earlier instant. Skipped ones
/// (spring-forward gaps) use the offset in force before the transition, which
/// pushes them forward past the gap.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => {
            let before = naive.checked_sub_signed(Duration::days(1))?;
            let offset = tz.offset_from_utc_datetime(&before).fix();
            let utc =
                naive.checked_sub_signed(Duration::seconds(offset.local_minus_utc() as i64))?;
            Some(tz.from_utc_datetime(&utc))
        }
    }
}

fn display<Tz: TimeZone>(dt: &DateTime<Tz>) -> String {
    format!(
        "{}-{:02}-{:02} {:02}:{:02}:{:02}.{:03}",
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
        dt.timestamp_subsec_millis()
    )
}
