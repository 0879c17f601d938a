//! Textual type descriptor parsing.
//!
//! The grammar is recursive. Wrapper prefixes are tried longest first,
//! so `DateTime64(` wins over `DateTime(` and `Enum16(` over `Enum8(`.
//! In the column header enum dictionaries are represented as
//! `"Enum8('title1' = 0, 'title2' = 2, ...)"`; Enum8 values range is
//! -128..=127, Enum16 covers -32768..=32767.
use std::str::FromStr;

use chrono_tz::Tz;

use super::{EnumIndex, SqlType};
use crate::errors::{ConversionError, Result};

macro_rules! unknown {
    ($t: expr) => {
        Err(ConversionError::UnknownColumnType($t.to_owned()).into())
    };
}

/// Parse a server-side type descriptor from its textual form.
pub fn parse_type(type_str: &str) -> Result<SqlType> {
    parse_nested(type_str.trim(), true)
}

/// Strip `prefix` + trailing `)` and return the inner expression.
fn unwrap_prefix<'a>(t: &'a str, prefix: &str) -> Option<&'a str> {
    if t.starts_with(prefix) && t.ends_with(')') {
        Some(&t[prefix.len()..t.len() - 1])
    } else {
        None
    }
}

fn parse_nested(t: &str, allow_nullable: bool) -> Result<SqlType> {
    if let Some(inner) = unwrap_prefix(t, "Nullable(") {
        if !allow_nullable {
            return unknown!(t);
        }
        // Nullable(Array(..)) is accepted, nothing below a Nullable
        // may be Nullable again
        let inner = parse_nested(inner.trim(), false)?;
        return Ok(SqlType::Nullable(Box::new(inner)));
    }
    if let Some(inner) = unwrap_prefix(t, "Array(") {
        let inner = parse_nested(inner.trim(), false)?;
        return Ok(SqlType::Array(Box::new(inner)));
    }
    if let Some(inner) = unwrap_prefix(t, "Map(") {
        let (key, value) = split_map_args(inner).ok_or_else(|| {
            crate::errors::Error::from(ConversionError::UnknownColumnType(t.to_owned()))
        })?;
        let key = parse_nested(key.trim(), false)?;
        let value = parse_nested(value.trim(), false)?;
        // only the string-to-string flavor is understood
        if key != SqlType::String || value != SqlType::String {
            return unknown!(t);
        }
        return Ok(SqlType::Map(Box::new(key), Box::new(value)));
    }
    if let Some(inner) = unwrap_prefix(t, "FixedString(") {
        if let Ok(len) = u32::from_str(inner.trim()) {
            return Ok(SqlType::FixedString(len));
        }
        return unknown!(t);
    }
    if let Some(inner) = unwrap_prefix(t, "DateTime64(") {
        return parse_datetime64(t, inner);
    }
    if let Some(inner) = unwrap_prefix(t, "DateTime(") {
        let tz = parse_timezone(inner.trim()).ok_or_else(|| {
            crate::errors::Error::from(ConversionError::UnknownColumnType(t.to_owned()))
        })?;
        return Ok(SqlType::DateTime(Some(tz)));
    }
    if let Some(inner) = unwrap_prefix(t, "Enum16(") {
        let entries = parse_enum_entries(inner, i16::MIN, i16::MAX)?;
        return Ok(SqlType::Enum16(EnumIndex::new(entries)));
    }
    if let Some(inner) = unwrap_prefix(t, "Enum8(") {
        let entries = parse_enum_entries(inner, i8::MIN as i16, i8::MAX as i16)?;
        return Ok(SqlType::Enum8(EnumIndex::new(entries)));
    }

    match t {
        "UInt8" => Ok(SqlType::UInt8),
        "UInt16" => Ok(SqlType::UInt16),
        "UInt32" => Ok(SqlType::UInt32),
        "UInt64" => Ok(SqlType::UInt64),
        "Int8" => Ok(SqlType::Int8),
        "Int16" => Ok(SqlType::Int16),
        "Int32" => Ok(SqlType::Int32),
        "Int64" => Ok(SqlType::Int64),
        "Float32" => Ok(SqlType::Float32),
        "Float64" => Ok(SqlType::Float64),
        "Bool" => Ok(SqlType::Bool),
        "String" => Ok(SqlType::String),
        "UUID" => Ok(SqlType::Uuid),
        "Date" => Ok(SqlType::Date),
        "Date32" => Ok(SqlType::Date32),
        "DateTime" => Ok(SqlType::DateTime(None)),
        _ => unknown!(t),
    }
}

/// Split `Map(K, V)` arguments at the top-level comma.
/// Nested parentheses and quoted strings hide their commas.
fn split_map_args(inner: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    let mut quoted = false;
    let mut escape = false;
    for (i, c) in inner.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match c {
            '\\' if quoted => escape = true,
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth = depth.checked_sub(1)?,
            ',' if !quoted && depth == 0 => {
                return Some((&inner[..i], &inner[i + 1..]));
            }
            _ => {}
        }
    }
    None
}

fn parse_datetime64(t: &str, inner: &str) -> Result<SqlType> {
    let mut args = inner.splitn(2, ',');
    let precision = match args.next().map(str::trim).map(u8::from_str) {
        Some(Ok(p)) if p <= 9 => p,
        _ => return unknown!(t),
    };
    let timezone = match args.next().map(str::trim) {
        None => None,
        Some(tz_str) => match parse_timezone(tz_str) {
            Some(tz) => Some(tz),
            None => return unknown!(t),
        },
    };
    Ok(SqlType::DateTime64(precision, timezone))
}

/// Timezone argument, a name in single quotes like `'Europe/Moscow'`.
fn parse_timezone(quoted: &str) -> Option<Tz> {
    let name = quoted.strip_prefix('\'')?.strip_suffix('\'')?;
    name.parse().ok()
}

enum EnumParser<'a> {
    Start,
    Name(usize),
    BeforeEqual(&'a str),
    AfterEqual(&'a str),
    Value(i16, i16, &'a str),
}

/// Walk the `'name' = N, ...` list of an enum dictionary.
/// Escaped characters stay raw in the stored name, exactly as the server
/// printed them, so the descriptor formats back identically.
fn parse_enum_entries(inner: &str, min: i16, max: i16) -> Result<Vec<(String, i16)>> {
    let mut entries: Vec<(String, i16)> = Vec::new();
    let mut state = EnumParser::Start;
    let mut chars = inner.char_indices();

    macro_rules! malformed {
        () => {
            return Err(ConversionError::UnknownColumnType("Enum(..)".to_owned()).into())
        };
    }

    while let Some((i, c)) = chars.next() {
        match state {
            EnumParser::Start => {
                if c == '\'' {
                    state = EnumParser::Name(i + 1);
                } else if !c.is_whitespace() && c != ',' {
                    malformed!();
                }
            }
            EnumParser::Name(start) => {
                if c == '\\' {
                    chars.next();
                } else if c == '\'' {
                    state = EnumParser::BeforeEqual(&inner[start..i]);
                }
            }
            EnumParser::BeforeEqual(name) => {
                if c == '=' {
                    state = EnumParser::AfterEqual(name);
                } else if !c.is_whitespace() {
                    malformed!();
                }
            }
            EnumParser::AfterEqual(name) => {
                if c.is_whitespace() {
                    // eat whitespace before digits
                } else if c == '-' {
                    state = EnumParser::Value(-1, 0, name);
                } else if let Some(digit) = c.to_digit(10) {
                    state = EnumParser::Value(1, digit as i16, name);
                } else {
                    malformed!();
                }
            }
            EnumParser::Value(sign, value, name) => {
                if let Some(digit) = c.to_digit(10) {
                    match value.checked_mul(10).and_then(|v| v.checked_add(digit as i16)) {
                        Some(v) => state = EnumParser::Value(sign, v, name),
                        None => malformed!(),
                    }
                } else if c == ',' || c.is_whitespace() {
                    entries.push((name.to_owned(), sign * value));
                    state = EnumParser::Start;
                } else {
                    malformed!();
                }
            }
        }
    }

    match state {
        EnumParser::Value(sign, value, name) => {
            entries.push((name.to_owned(), sign * value));
        }
        EnumParser::Start if !entries.is_empty() => {}
        _ => malformed!(),
    }

    if entries.iter().any(|(_, v)| *v < min || *v > max) {
        malformed!();
    }
    Ok(entries)
}
