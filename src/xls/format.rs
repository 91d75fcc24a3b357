//! Number formats: classification, date rendering and numeric display
//!
//! An XF record points at a number format. Built-in indices map onto fixed
//! tables; custom formats come from FORMAT records and are classified by
//! looking at their tokens. Date formats are translated once into a `chrono`
//! strftime pattern, numeric formats are kept in Excel syntax and applied by
//! [`format_number`].

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDateTime};
use indexmap::IndexMap;
use std::fmt::Write;

/// Built-in date formats, already in strftime syntax
pub const BUILTIN_DATE_FORMATS: &[(u16, &str)] = &[
    (0x0e, "%m/%d/%Y"),
    (0x0f, "%b-%d-%Y"),
    (0x10, "%d-%b"),
    (0x11, "%b-%Y"),
    (0x12, "%I:%M %P"),
    (0x13, "%I:%M:%S %P"),
    (0x14, "%H:%M"),
    (0x15, "%H:%M:%S"),
    (0x16, "%d/%m/%Y %H:%M"),
    (0x2d, "%M:%S"),
    (0x2e, "%H:%M:%S"),
    (0x2f, "%M:%S"),
];

/// Built-in numeric formats in Excel syntax
pub const BUILTIN_NUMBER_FORMATS: &[(u16, &str)] = &[
    (0x01, "0"),
    (0x02, "0.00"),
    (0x03, "#,##0"),
    (0x04, "#,##0.00"),
    (0x05, "$#,##0;($#,##0)"),
    (0x06, "$#,##0;[Red]($#,##0)"),
    (0x07, "$#,##0.00;($#,##0.00)"),
    (0x08, "$#,##0.00;[Red]($#,##0.00)"),
    (0x09, "0%"),
    (0x0a, "0.00%"),
    (0x0b, "0.00E+00"),
    (0x25, "#,##0;(#,##0)"),
    (0x26, "#,##0;[Red](#,##0)"),
    (0x27, "#,##0.00;(#,##0.00)"),
    (0x28, "#,##0.00;[Red](#,##0.00)"),
    // accounting formats, approximated
    (0x29, "#,##0;(#,##0)"),
    (0x2a, "$#,##0;($#,##0)"),
    (0x2b, "#,##0.00;(#,##0.00)"),
    (0x2c, "$#,##0.00;($#,##0.00)"),
    (0x30, "##0.0E+0"),
];

/// The "@" text format
pub const TEXT_FORMAT_INDEX: u16 = 49;

/// Day offset between the 1900 serial epoch and 1970-01-01
const EPOCH_OFFSET_1900: f64 = 25569.0;
/// Day offset between the 1904 serial epoch and 1970-01-01
const EPOCH_OFFSET_1904: f64 = 24107.0;

const COLOR_NAMES: &[&str] = &[
    "BLACK", "BLUE", "CYAN", "GREEN", "MAGENTA", "RED", "WHITE", "YELLOW",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Date,
    Number,
    Other,
}

/// Resolved number format of an XF record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberFormat {
    pub index: u16,
    pub kind: FormatKind,
    /// strftime pattern for dates, Excel pattern otherwise
    pub pattern: String,
}

impl NumberFormat {
    pub fn general() -> Self {
        NumberFormat {
            index: 0,
            kind: FormatKind::Other,
            pattern: String::new(),
        }
    }

    /// Resolve format `index` against the built-in tables and custom FORMAT records
    pub fn classify(index: u16, custom: &IndexMap<u16, String>) -> Self {
        if let Some((_, pattern)) = BUILTIN_DATE_FORMATS.iter().find(|(i, _)| *i == index) {
            return NumberFormat {
                index,
                kind: FormatKind::Date,
                pattern: pattern.to_string(),
            };
        }
        if let Some((_, pattern)) = BUILTIN_NUMBER_FORMATS.iter().find(|(i, _)| *i == index) {
            return NumberFormat {
                index,
                kind: FormatKind::Number,
                pattern: pattern.to_string(),
            };
        }

        let source = match custom.get(&index) {
            Some(s) if index > 0 && !s.is_empty() => s,
            _ => {
                return NumberFormat {
                    index,
                    ..NumberFormat::general()
                }
            }
        };

        if is_date_pattern(source) {
            NumberFormat {
                index,
                kind: FormatKind::Date,
                pattern: translate_date_pattern(date_section(source)),
            }
        } else if source.contains('0') || source.contains('#') {
            NumberFormat {
                index,
                kind: FormatKind::Number,
                pattern: source.clone(),
            }
        } else {
            NumberFormat {
                index,
                kind: FormatKind::Other,
                pattern: source.clone(),
            }
        }
    }
}

/// First section of a format without a leading `[...]` qualifier
fn date_section(pattern: &str) -> &str {
    let first = pattern.split(';').next().unwrap_or("");
    if first.starts_with('[') {
        match first.find(']') {
            Some(end) => &first[end + 1..],
            None => first,
        }
    } else {
        first
    }
}

/// Whether a custom format only holds day/time tokens and separators
pub fn is_date_pattern(pattern: &str) -> bool {
    let section = date_section(pattern);
    !section.is_empty()
        && section.chars().all(|c| {
            matches!(
                c.to_ascii_lowercase(),
                'h' | 'm' | 's' | 'd' | 'a' | 'y' | 'p' | '/' | '-' | ':' | '\\' | ','
            ) || c.is_whitespace()
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateToken {
    Year(usize),
    Month(usize),
    Day(usize),
    Hour(usize),
    Second(usize),
    AmPm,
    Literal(char),
}

/// Translate Excel date tokens into a strftime pattern
///
/// A run of `m` means minutes right after an hour token or right before a
/// seconds token (an optional `:` in between), months everywhere else.
pub fn translate_date_pattern(excel: &str) -> String {
    let chars: Vec<char> = excel.chars().collect();
    let twelve_hour = excel.to_ascii_uppercase().contains("AM/PM");

    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let lower = c.to_ascii_lowercase();

        if lower == 'a' && chars.len() >= i + 5 {
            let word: String = chars[i..i + 5].iter().collect();
            if word.eq_ignore_ascii_case("am/pm") {
                tokens.push(DateToken::AmPm);
                i += 5;
                continue;
            }
        }

        if c == '\\' {
            if let Some(&next) = chars.get(i + 1) {
                tokens.push(DateToken::Literal(next));
            }
            i += 2;
            continue;
        }

        if matches!(lower, 'y' | 'm' | 'd' | 'h' | 's') {
            let mut run = 1;
            while chars
                .get(i + run)
                .is_some_and(|n| n.to_ascii_lowercase() == lower)
            {
                run += 1;
            }
            tokens.push(match lower {
                'y' => DateToken::Year(run),
                'm' => DateToken::Month(run),
                'd' => DateToken::Day(run),
                'h' => DateToken::Hour(run),
                _ => DateToken::Second(run),
            });
            i += run;
            continue;
        }

        tokens.push(DateToken::Literal(c));
        i += 1;
    }

    let mut out = String::new();
    for (idx, token) in tokens.iter().enumerate() {
        match *token {
            DateToken::Year(n) if n <= 2 => out.push_str("%y"),
            DateToken::Year(_) => out.push_str("%Y"),
            DateToken::Month(n) if n <= 2 && is_minute(&tokens, idx) => out.push_str("%M"),
            DateToken::Month(1) => out.push_str("%-m"),
            DateToken::Month(2) => out.push_str("%m"),
            DateToken::Month(3) => out.push_str("%b"),
            DateToken::Month(_) => out.push_str("%B"),
            DateToken::Day(1) => out.push_str("%-d"),
            DateToken::Day(2) => out.push_str("%d"),
            DateToken::Day(3) => out.push_str("%a"),
            DateToken::Day(_) => out.push_str("%A"),
            DateToken::Hour(1) if twelve_hour => out.push_str("%-I"),
            DateToken::Hour(_) if twelve_hour => out.push_str("%I"),
            DateToken::Hour(1) => out.push_str("%-H"),
            DateToken::Hour(_) => out.push_str("%H"),
            DateToken::Second(_) => out.push_str("%S"),
            DateToken::AmPm => out.push_str("%p"),
            DateToken::Literal('%') => out.push_str("%%"),
            DateToken::Literal(c) => out.push(c),
        }
    }
    out
}

fn is_minute(tokens: &[DateToken], idx: usize) -> bool {
    let before = match idx.checked_sub(1).map(|i| tokens[i]) {
        Some(DateToken::Literal(':')) => idx.checked_sub(2).map(|i| tokens[i]),
        other => other,
    };
    let after = match tokens.get(idx + 1) {
        Some(DateToken::Literal(':')) => tokens.get(idx + 2).copied(),
        other => other.copied(),
    };
    matches!(before, Some(DateToken::Hour(_))) || matches!(after, Some(DateToken::Second(_)))
}

/// Decode an RK value
///
/// Bit 1 marks a 30-bit signed integer; otherwise the upper 30 bits are the
/// top of an IEEE754 double, rebuilt from sign, exponent and the 20 kept
/// mantissa bits. Bit 0 divides the result by 100.
pub fn decode_rk(rk: u32) -> f64 {
    let mut value = if rk & 0x02 != 0 {
        ((rk as i32) >> 2) as f64
    } else {
        let sign = (rk & 0x8000_0000) >> 31;
        let exp = ((rk & 0x7ff0_0000) >> 20) as i32;
        let mantissa = 0x10_0000 | (rk & 0x000f_fffc);
        let magnitude = mantissa as f64 / 2f64.powi(20 - (exp - 1023));
        if sign == 1 {
            -magnitude
        } else {
            magnitude
        }
    };
    if rk & 0x01 != 0 {
        value /= 100.0;
    }
    value
}

/// Convert a serial date to a timestamp
///
/// Seconds come from the fractional day plus a small epsilon that absorbs
/// floating round-trip error (0.99999999 days is midnight of the next day).
pub fn serial_to_datetime(value: f64, is_1904: bool) -> Option<NaiveDateTime> {
    let offset = if is_1904 {
        EPOCH_OFFSET_1904
    } else {
        EPOCH_OFFSET_1900
    };
    let utc_days = (value - offset).floor();
    let fractional_day = value - value.floor() + 0.000_000_1;
    let total_seconds = (86400.0 * fractional_day).floor();

    let timestamp = utc_days * 86400.0 + total_seconds;
    if !timestamp.is_finite() || timestamp.abs() > 1e15 {
        return None;
    }
    DateTime::from_timestamp(timestamp as i64, 0).map(|dt| dt.naive_utc())
}

/// Render a serial date with a strftime pattern
///
/// Values outside chrono's range fall back to the plain number.
pub fn format_date(value: f64, is_1904: bool, pattern: &str) -> String {
    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return general_number(value);
    }

    match serial_to_datetime(value, is_1904) {
        Some(dt) => {
            let mut out = String::new();
            match write!(out, "{}", dt.format_with_items(items.into_iter())) {
                Ok(()) => out,
                Err(_) => general_number(value),
            }
        }
        None => general_number(value),
    }
}

/// Plain rendering of a number: integers without a fraction, others with up
/// to 15 significant digits
pub fn general_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        let mut buffer = itoa::Buffer::new();
        return buffer.format(value as i64).to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }

    let magnitude = value.abs().log10().floor() as i32;
    let decimals = 14 - magnitude;
    if (0..=20).contains(&decimals) {
        let fixed = format!("{:.*}", decimals as usize, value);
        let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
        trimmed.to_string()
    } else {
        format!("{:e}", value)
    }
}

/// Apply an Excel numeric pattern
///
/// Returns the display text and the lowercase color named by a `[Red]`-style
/// prefix of the chosen section.
pub fn format_number(pattern: &str, num: f64, format_index: u16) -> (String, Option<String>) {
    if pattern.is_empty()
        || pattern == "%s"
        || format_index == TEXT_FORMAT_INDEX
        || pattern.eq_ignore_ascii_case("general")
    {
        return (general_number(num), None);
    }

    let sections: Vec<&str> = pattern.split(';').collect();
    let mut num = num;
    let mut section = sections[0];
    if sections.len() > 2 && num == 0.0 {
        section = sections[2];
    } else if sections.len() > 1 && num < 0.0 {
        section = sections[1];
        num = num.abs();
    }

    let (color, section) = split_color(section);

    let mut cleaned = String::with_capacity(section.len());
    let mut chars = section.chars();
    while let Some(c) = chars.next() {
        match c {
            // "_x" reserves the width of x
            '_' => {
                chars.next();
            }
            '\\' | '"' => {}
            '#' => cleaned.push('0'),
            c => cleaned.push(c),
        }
    }

    let has_commas = cleaned.contains(',');
    if has_commas {
        cleaned.retain(|c| c != ',');
    }

    if has_percent_token(&cleaned) {
        num *= 100.0;
    }

    let text = match find_number_token(&cleaned) {
        Some((start, end, decimals)) => {
            let formatted = if has_commas {
                group_thousands(num, decimals)
            } else {
                fixed(num, decimals)
            };
            format!("{}{}{}", &cleaned[..start], formatted, &cleaned[end..])
        }
        None => cleaned,
    };

    (text, color)
}

fn split_color(section: &str) -> (Option<String>, &str) {
    if let Some(rest) = section.strip_prefix('[') {
        if let Some(end) = rest.find(']') {
            let name = &rest[..end];
            if COLOR_NAMES.iter().any(|c| c.eq_ignore_ascii_case(name)) {
                return (Some(name.to_ascii_lowercase()), &rest[end + 1..]);
            }
        }
    }
    (None, section)
}

/// A digit directly followed by a single `%`
fn has_percent_token(pattern: &str) -> bool {
    let bytes = pattern.as_bytes();
    bytes.windows(2).enumerate().any(|(i, w)| {
        w[0].is_ascii_digit() && w[1] == b'%' && bytes.get(i + 2) != Some(&b'%')
    })
}

/// Span of the first `digits[.digits]` placeholder and its decimal count
fn find_number_token(pattern: &str) -> Option<(usize, usize, usize)> {
    let bytes = pattern.as_bytes();
    let start = bytes.iter().position(u8::is_ascii_digit)?;
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut decimals = 0;
    if bytes.get(end) == Some(&b'.') {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
            decimals += 1;
        }
    }
    Some((start, end, decimals))
}

/// Round half away from zero, then print with a fixed number of decimals
fn fixed(num: f64, decimals: usize) -> String {
    let factor = 10f64.powi(decimals as i32);
    let mut rounded = (num * factor).round() / factor;
    if rounded == 0.0 {
        rounded = 0.0;
    }
    format!("{:.*}", decimals, rounded)
}

fn group_thousands(num: f64, decimals: usize) -> String {
    let plain = fixed(num.abs(), decimals);
    let (int_part, frac_part) = match plain.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (plain.as_str(), None),
    };

    let mut grouped = String::with_capacity(plain.len() + int_part.len() / 3 + 1);
    if num < 0.0 && plain.bytes().any(|b| b.is_ascii_digit() && b != b'0') {
        grouped.push('-');
    }
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if let Some(frac) = frac_part {
        grouped.push('.');
        grouped.push_str(frac);
    }
    grouped
}
