//! Date and time display patterns.
//!
//! Patterns use the familiar letter runs (`yyyy-MM-dd`, `h:mm AP`, ...) and
//! are compiled into chrono strftime strings, which then drive both
//! formatting and parsing. Quoted text (`'at'`) is literal; `''` is a quote.

use chrono::{NaiveDate, NaiveTime};
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{anychar, char},
    combinator::{map, verify},
    multi::many0,
    sequence::delimited,
};
use std::fmt::Write;

pub(crate) const DATE_STORAGE: &str = "%Y-%m-%d";
pub(crate) const TIME_STORAGE: &str = "%H:%M:%S%.3f";
const TIME_STORAGE_INPUTS: &[&str] = &["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Temporal {
    Date,
    Time,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Letters(char, usize),
    AmPm { upper: bool },
}

type PResult<'a, T> = IResult<&'a str, T>;

fn quoted(i: &str) -> PResult<'_, Token> {
    map(
        delimited(
            char('\''),
            many0(alt((
                map(tag("''"), |_| "'".to_string()),
                map(take_while1(|c| c != '\''), |s: &str| s.to_string()),
            ))),
            char('\''),
        ),
        |parts: Vec<String>| {
            if parts.is_empty() {
                Token::Literal("'".into())
            } else {
                Token::Literal(parts.concat())
            }
        },
    )(i)
}

fn am_pm(i: &str) -> PResult<'_, Token> {
    alt((
        map(tag("AP"), |_| Token::AmPm { upper: true }),
        map(tag("ap"), |_| Token::AmPm { upper: false }),
    ))(i)
}

fn letter_run(i: &str) -> PResult<'_, Token> {
    let (rest, first) = verify(anychar, |c: &char| c.is_ascii_alphabetic())(i)?;
    let (rest, more) = take_while(|c| c == first)(rest)?;
    Ok((rest, Token::Letters(first, 1 + more.len())))
}

fn literal(i: &str) -> PResult<'_, Token> {
    map(
        take_while1(|c: char| !c.is_ascii_alphabetic() && c != '\''),
        |s: &str| Token::Literal(s.to_string()),
    )(i)
}

fn tokens(i: &str) -> PResult<'_, Vec<Token>> {
    many0(alt((
        quoted,
        am_pm,
        letter_run,
        literal,
    )))(i)
}

/// Compile a display pattern into a chrono format string.
pub(crate) fn compile(pattern: &str, kind: Temporal) -> Result<String, String> {
    if pattern.trim().is_empty() {
        return Err("empty pattern".into());
    }
    let (rest, toks) = tokens(pattern).map_err(|e| format!("unreadable pattern: {e}"))?;
    if !rest.is_empty() {
        return Err(format!("unterminated quote near {rest:?}"));
    }

    let mut out = String::new();
    let mut has_field = false;
    for tok in toks {
        match tok {
            Token::Literal(text) => out.push_str(&text.replace('%', "%%")),
            Token::AmPm { upper } => {
                if kind == Temporal::Date {
                    return Err("AM/PM marker in a date pattern".into());
                }
                out.push_str(if upper { "%p" } else { "%P" });
            }
            Token::Letters(letter, width) => {
                let spec = spec_for(letter, width, kind)?;
                has_field = true;
                out.push_str(spec);
            }
        }
    }
    if !has_field {
        return Err("pattern has no date or time fields".into());
    }
    Ok(out)
}

fn spec_for(letter: char, width: usize, kind: Temporal) -> Result<&'static str, String> {
    let date_spec = match (letter, width) {
        ('d', 1) => Some("%-d"),
        ('d', 2) => Some("%d"),
        ('d', 3) => Some("%a"),
        ('d', 4) => Some("%A"),
        ('M', 1) => Some("%-m"),
        ('M', 2) => Some("%m"),
        ('M', 3) => Some("%b"),
        ('M', 4) => Some("%B"),
        ('y', 2) => Some("%y"),
        ('y', 4) => Some("%Y"),
        _ => None,
    };
    let time_spec = match (letter, width) {
        ('H', 1) => Some("%-H"),
        ('H', 2) => Some("%H"),
        ('h', 1) => Some("%-I"),
        ('h', 2) => Some("%I"),
        ('m', 1) => Some("%-M"),
        ('m', 2) => Some("%M"),
        ('s', 1) => Some("%-S"),
        ('s', 2) => Some("%S"),
        ('z', 1) | ('z', 3) => Some("%3f"),
        _ => None,
    };
    match (kind, date_spec, time_spec) {
        (Temporal::Date, Some(spec), _) | (Temporal::Time, _, Some(spec)) => Ok(spec),
        (Temporal::Date, None, Some(_)) => Err(format!("time field {letter:?} in a date pattern")),
        (Temporal::Time, Some(_), None) => Err(format!("date field {letter:?} in a time pattern")),
        _ => Err(format!(
            "unsupported field {:?}",
            std::iter::repeat_n(letter, width).collect::<String>()
        )),
    }
}

pub(crate) fn format_date(date: NaiveDate, spec: &str) -> Result<String, String> {
    let mut out = String::new();
    write!(out, "{}", date.format(spec)).map_err(|_| "date cannot be displayed".to_string())?;
    Ok(out)
}

pub(crate) fn format_time(time: NaiveTime, spec: &str) -> Result<String, String> {
    let mut out = String::new();
    write!(out, "{}", time.format(spec)).map_err(|_| "time cannot be displayed".to_string())?;
    Ok(out)
}

pub(crate) fn parse_stored_date(stored: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(stored.trim(), DATE_STORAGE).ok()
}

pub(crate) fn parse_stored_time(stored: &str) -> Option<NaiveTime> {
    TIME_STORAGE_INPUTS
        .iter()
        .find_map(|spec| NaiveTime::parse_from_str(stored.trim(), spec).ok())
}

pub(crate) fn store_date(date: NaiveDate) -> String {
    date.format(DATE_STORAGE).to_string()
}

pub(crate) fn store_time(time: NaiveTime) -> String {
    time.format(TIME_STORAGE).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_common_date_patterns() {
        assert_eq!(compile("yyyy-MM-dd", Temporal::Date).unwrap(), "%Y-%m-%d");
        assert_eq!(compile("MMMM d, yyyy", Temporal::Date).unwrap(), "%B %-d, %Y");
        assert_eq!(compile("dddd 'the' d", Temporal::Date).unwrap(), "%A the %-d");
    }

    #[test]
    fn compiles_time_patterns() {
        assert_eq!(compile("h:mm AP", Temporal::Time).unwrap(), "%-I:%M %p");
        assert_eq!(compile("HH:mm:ss.zzz", Temporal::Time).unwrap(), "%H:%M:%S.%3f");
    }

    #[test]
    fn escapes_percent_and_quotes() {
        assert_eq!(compile("d'%'", Temporal::Date).unwrap(), "%-d%%");
        assert_eq!(compile("d 'o''clock'", Temporal::Date).unwrap(), "%-d o'clock");
    }

    #[test]
    fn rejects_mixed_or_unknown_fields() {
        assert!(compile("yyyy HH", Temporal::Date).is_err());
        assert!(compile("HH:mm yyyy", Temporal::Time).is_err());
        assert!(compile("yyy", Temporal::Date).is_err());
        assert!(compile("Q", Temporal::Date).is_err());
        assert!(compile("'open", Temporal::Date).is_err());
        assert!(compile("---", Temporal::Date).is_err());
    }

    #[test]
    fn round_trips_display_through_chrono() {
        let spec = compile("MMMM d, yyyy", Temporal::Date).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let shown = format_date(date, &spec).unwrap();
        assert_eq!(shown, "March 5, 2024");
        assert_eq!(NaiveDate::parse_from_str(&shown, &spec).unwrap(), date);
    }

    #[test]
    fn stored_time_accepts_short_forms() {
        let t = parse_stored_time("14:30").unwrap();
        assert_eq!(store_time(t), "14:30:00.000");
        assert!(parse_stored_time("14:30:05.25").is_some());
    }

    #[test]
    fn stored_time_keeps_milliseconds() {
        let t = parse_stored_time("09:15:42.123456").unwrap();
        assert_eq!(store_time(t), "09:15:42.123");
        assert_eq!(store_time(parse_stored_time("09:15:42.5").unwrap()), "09:15:42.500");
    }
}
