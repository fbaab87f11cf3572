//! Numeric display patterns.
//!
//! A pattern is literal lead text, a contiguous core of `0` (required digit),
//! `#` (optional digit), `,` (grouping) and `.` (decimal point), then literal
//! trail text. A `%` anywhere in the literal text scales the value by 100.

use crate::settings::FormatSettings;
use std::cmp::Ordering;

const CORE_CHARS: &[char] = &['0', '#', ',', '.'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NumberPattern {
    lead: String,
    trail: String,
    min_int: usize,
    grouping: bool,
    min_frac: usize,
    max_frac: usize,
    percent: bool,
}

impl NumberPattern {
    pub(crate) fn compile(pattern: &str) -> Result<Self, String> {
        let chars: Vec<char> = pattern.chars().collect();
        let start = chars
            .iter()
            .position(|c| *c == '0' || *c == '#')
            .ok_or_else(|| "no digit placeholder".to_string())?;
        // Grouping or decimal marks directly before the first digit belong to the core.
        let mut core_start = start;
        while core_start > 0 && CORE_CHARS.contains(&chars[core_start - 1]) {
            core_start -= 1;
        }
        let mut core_end = start;
        while core_end < chars.len() && CORE_CHARS.contains(&chars[core_end]) {
            core_end += 1;
        }

        let lead: String = chars[..core_start].iter().collect();
        let core: String = chars[core_start..core_end].iter().collect();
        let trail: String = chars[core_end..].iter().collect();
        if trail.contains(['0', '#']) {
            return Err("digit placeholders must be contiguous".into());
        }

        let mut halves = core.split('.');
        let int_part = halves.next().unwrap_or_default();
        let frac_part = halves.next().unwrap_or_default();
        if halves.next().is_some() {
            return Err("more than one decimal point".into());
        }
        if frac_part.contains(',') {
            return Err("grouping mark after the decimal point".into());
        }

        let min_frac = frac_part.chars().filter(|c| *c == '0').count();
        Ok(Self {
            min_int: int_part.chars().filter(|c| *c == '0').count().max(1),
            grouping: int_part.contains(','),
            min_frac,
            max_frac: min_frac + frac_part.chars().filter(|c| *c == '#').count(),
            percent: lead.contains('%') || trail.contains('%'),
            lead,
            trail,
        })
    }

    pub(crate) fn format(&self, value: f64, settings: &FormatSettings) -> String {
        let value = if self.percent { value * 100.0 } else { value };
        let fixed = format!("{:.*}", self.max_frac, value.abs());
        let (int_digits, frac_digits) = match fixed.split_once('.') {
            Some((i, f)) => (i.to_string(), f.to_string()),
            None => (fixed.clone(), String::new()),
        };

        let mut frac = frac_digits;
        while frac.len() > self.min_frac && frac.ends_with('0') {
            frac.pop();
        }

        let mut int = int_digits.trim_start_matches('0').to_string();
        while int.len() < self.min_int {
            int.insert(0, '0');
        }
        if self.grouping {
            int = group_digits(&int, settings.grouping_separator);
        }

        let is_zero = !fixed.chars().any(|c| c.is_ascii_digit() && c != '0');
        let mut out = String::with_capacity(self.lead.len() + int.len() + frac.len() + 4);
        out.push_str(&self.lead);
        if value < 0.0 && !is_zero {
            out.push('-');
        }
        out.push_str(&int);
        if !frac.is_empty() {
            out.push(settings.decimal_point);
            out.push_str(&frac);
        }
        out.push_str(&self.trail);
        out
    }

    pub(crate) fn parse(&self, input: &str, settings: &FormatSettings) -> Option<f64> {
        let mut text = input.trim();
        let lead = self.lead.trim();
        let trail = self.trail.trim();
        if !lead.is_empty() {
            text = text.strip_prefix(lead).unwrap_or(text).trim_start();
        }
        if !trail.is_empty() {
            text = text.strip_suffix(trail).unwrap_or(text).trim_end();
        }
        let cleaned: String = text
            .chars()
            .filter(|c| *c != settings.grouping_separator && !c.is_whitespace() && *c != '%')
            .map(|c| if c == settings.decimal_point { '.' } else { c })
            .collect();
        let value: f64 = cleaned.parse().ok()?;
        if !value.is_finite() {
            return None;
        }
        Some(if self.percent { value / 100.0 } else { value })
    }
}

fn group_digits(digits: &str, separator: char) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (len - idx) % 3 == 0 {
            out.push(separator);
        }
        out.push(ch);
    }
    out
}

/// Canonical stored form of a number.
pub(crate) fn canonical(value: f64) -> String {
    if value == 0.0 {
        return "0".into();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

pub(crate) fn parse_stored(stored: &str) -> Option<f64> {
    stored.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub(crate) fn compare_stored(a: &str, b: &str) -> Ordering {
    match (parse_stored(a), parse_stored(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(pattern: &str, value: f64) -> String {
        NumberPattern::compile(pattern)
            .expect("pattern")
            .format(value, &FormatSettings::default())
    }

    #[test]
    fn formats_plain_integer_pattern() {
        assert_eq!(fmt("0", 2020.0), "2020");
        assert_eq!(fmt("0", 0.4), "0");
        assert_eq!(fmt("000", 7.0), "007");
    }

    #[test]
    fn formats_grouping_and_fraction() {
        assert_eq!(fmt("#,##0.00", 1234567.891), "1,234,567.89");
        assert_eq!(fmt("#.##", 3.1), "3.1");
        assert_eq!(fmt("#.##", 3.0), "3");
        assert_eq!(fmt("$#,##0.00", -12.5), "$-12.50");
    }

    #[test]
    fn percent_scales_by_hundred() {
        assert_eq!(fmt("0%", 0.25), "25%");
        let p = NumberPattern::compile("0%").unwrap();
        assert_eq!(p.parse("25%", &FormatSettings::default()), Some(0.25));
    }

    #[test]
    fn honours_settings_for_marks() {
        let settings = FormatSettings {
            decimal_point: ',',
            grouping_separator: '.',
        };
        let p = NumberPattern::compile("#,##0.00").unwrap();
        assert_eq!(p.format(1234.5, &settings), "1.234,50");
        assert_eq!(p.parse("1.234,50", &settings), Some(1234.5));
    }

    #[test]
    fn rejects_bad_patterns() {
        assert!(NumberPattern::compile("abc").is_err());
        assert!(NumberPattern::compile("0.0.0").is_err());
        assert!(NumberPattern::compile("0 and 0").is_err());
    }

    #[test]
    fn canonical_drops_trailing_fraction() {
        assert_eq!(canonical(2020.0), "2020");
        assert_eq!(canonical(-0.0), "0");
        assert_eq!(canonical(2.5), "2.5");
    }

    #[test]
    fn unparseable_values_sort_first() {
        assert_eq!(compare_stored("", "1"), Ordering::Less);
        assert_eq!(compare_stored("10", "9"), Ordering::Greater);
    }
}
