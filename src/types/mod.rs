//! Column type descriptors.
//!
//! `SqlType` mirrors the textual type grammar of the server
//! (`Nullable(UInt32)`, `Array(Enum8('a' = 1))`, `Map(String, String)`,
//! `DateTime64(3, 'GMT')` ...). Its `Display` implementation emits exactly
//! the text the server sends in block column headers, so a parsed
//! descriptor formats back byte for byte.
use std::fmt;

use chrono_tz::Tz;

use crate::errors::{ConversionError, Result};

mod parser;
pub use parser::parse_type;

/// Enum dictionary of a `Enum8`/`Enum16` descriptor.
///
/// Entries keep the raw name bytes exactly as they appear in the textual
/// form, escapes included, and are sorted by value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumIndex {
    pub(crate) entries: Vec<(String, i16)>,
}

impl EnumIndex {
    pub(crate) fn new(mut entries: Vec<(String, i16)>) -> EnumIndex {
        entries.sort_unstable_by_key(|item| item.1);
        EnumIndex { entries }
    }

    /// Map an enum title to its wire code.
    /// Unknown titles are data errors, the caller made them up.
    #[inline]
    pub(crate) fn value_by_name(&self, name: &str) -> Result<i16> {
        self.entries
            .iter()
            .find(|item| item.0 == name)
            .map(|item| item.1)
            .ok_or_else(|| ConversionError::EnumMismatch(name.to_owned()).into())
    }

    /// Map a wire code back to the enum title.
    #[inline]
    pub(crate) fn name_by_value(&self, value: i16) -> Result<&str> {
        let index = self
            .entries
            .binary_search_by_key(&value, |item| item.1)
            .map_err(|_| ConversionError::EnumValueMissing(value))?;
        Ok(self.entries[index].0.as_str())
    }

    pub fn entries(&self) -> &[(String, i16)] {
        &self.entries
    }
}

impl fmt::Display for EnumIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut iter = self.entries.iter();
        if let Some((name, value)) = iter.next() {
            write!(f, "'{}' = {}", name, value)?;
        }
        for (name, value) in iter {
            write!(f, ", '{}' = {}", name, value)?;
        }
        Ok(())
    }
}

/// Recursive column type descriptor.
///
/// Composition invariants, enforced by the parser:
/// * `Nullable` is never nested inside `Nullable`;
/// * `Array` and `Map` cannot contain `Nullable`;
/// * `Map` supports `(String, String)` only.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlType {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
    String,
    FixedString(u32),
    Uuid,
    Date,
    Date32,
    DateTime(Option<Tz>),
    DateTime64(u8, Option<Tz>),
    Enum8(EnumIndex),
    Enum16(EnumIndex),
    Array(Box<SqlType>),
    Nullable(Box<SqlType>),
    Map(Box<SqlType>, Box<SqlType>),
}

impl SqlType {
    #[inline]
    pub fn is_nullable(&self) -> bool {
        matches!(self, SqlType::Nullable(_))
    }

    /// Descriptor of the values under a `Nullable` wrapper, self otherwise.
    #[inline]
    pub fn base_type(&self) -> &SqlType {
        match self {
            SqlType::Nullable(inner) => inner,
            other => other,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SqlType::UInt8 => "UInt8",
            SqlType::UInt16 => "UInt16",
            SqlType::UInt32 => "UInt32",
            SqlType::UInt64 => "UInt64",
            SqlType::Int8 => "Int8",
            SqlType::Int16 => "Int16",
            SqlType::Int32 => "Int32",
            SqlType::Int64 => "Int64",
            SqlType::Float32 => "Float32",
            SqlType::Float64 => "Float64",
            SqlType::Bool => "Bool",
            SqlType::String => "String",
            SqlType::Uuid => "UUID",
            SqlType::Date => "Date",
            SqlType::Date32 => "Date32",
            SqlType::DateTime(None) => "DateTime",
            SqlType::DateTime(Some(tz)) => {
                return write!(f, "DateTime('{}')", tz.name());
            }
            SqlType::DateTime64(precision, None) => {
                return write!(f, "DateTime64({})", precision);
            }
            SqlType::DateTime64(precision, Some(tz)) => {
                return write!(f, "DateTime64({}, '{}')", precision, tz.name());
            }
            SqlType::FixedString(len) => {
                return write!(f, "FixedString({})", len);
            }
            SqlType::Enum8(index) => {
                return write!(f, "Enum8({})", index);
            }
            SqlType::Enum16(index) => {
                return write!(f, "Enum16({})", index);
            }
            SqlType::Array(inner) => {
                return write!(f, "Array({})", inner);
            }
            SqlType::Nullable(inner) => {
                return write!(f, "Nullable({})", inner);
            }
            SqlType::Map(key, value) => {
                return write!(f, "Map({}, {})", key, value);
            }
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    macro_rules! index {
        ($(($name:expr, $value:expr)),+) => {
            EnumIndex::new(vec![$(($name.to_owned(), $value)),+])
        };
    }

    #[test]
    fn test_enum_index_transcode() {
        let index = index![("yes", 1), ("n/a", -1), ("no", 0), ("unknown", -2)];
        assert_eq!(index.entries[0].1, -2);
        assert_eq!(index.entries[3].1, 1);

        assert_eq!(index.value_by_name("n/a").unwrap(), -1);
        assert_eq!(index.value_by_name("yes").unwrap(), 1);
        assert!(index.value_by_name("some other").is_err());

        assert_eq!(index.name_by_value(0).unwrap(), "no");
        assert_eq!(index.name_by_value(-2).unwrap(), "unknown");
        assert!(index.name_by_value(100).is_err());
    }

    #[test]
    fn test_display_basic() {
        assert_eq!(SqlType::UInt32.to_string(), "UInt32");
        assert_eq!(SqlType::Uuid.to_string(), "UUID");
        assert_eq!(SqlType::FixedString(16).to_string(), "FixedString(16)");
        assert_eq!(
            SqlType::Nullable(Box::new(SqlType::String)).to_string(),
            "Nullable(String)"
        );
        assert_eq!(
            SqlType::Map(Box::new(SqlType::String), Box::new(SqlType::String)).to_string(),
            "Map(String, String)"
        );
    }

    #[test]
    fn test_display_datetime() {
        assert_eq!(SqlType::DateTime(None).to_string(), "DateTime");
        assert_eq!(
            SqlType::DateTime(Some(Tz::Europe__Moscow)).to_string(),
            "DateTime('Europe/Moscow')"
        );
        assert_eq!(SqlType::DateTime64(3, None).to_string(), "DateTime64(3)");
        assert_eq!(
            SqlType::DateTime64(3, Some(Tz::GMT)).to_string(),
            "DateTime64(3, 'GMT')"
        );
    }

    #[test]
    fn test_display_enum() {
        let t = SqlType::Array(Box::new(SqlType::Enum8(index![("hi", -1), ("bye", 5)])));
        assert_eq!(t.to_string(), "Array(Enum8('hi' = -1, 'bye' = 5))");
    }
}
