//! Column value containers.
//!
//! `ColumnData` is a tagged container over the supported element types.
//! Four capabilities drive the whole codec: length, merge with a fragment
//! of the same shape, encode against a type descriptor, decode against a
//! type descriptor and a row count. Composite types recurse over the
//! descriptor, not over a type hierarchy.
use byteorder::{ByteOrder, LittleEndian};
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use super::decoder::ByteReader;
use super::encoder::{swap_uuid_halves, WriteAware};
use crate::errors::{ConversionError, DriverError, Result};
use crate::types::SqlType;

/// 1900-01-01T00:00:00, the lower bound of the server's DateTime64 range
const DATETIME64_MIN_SECONDS: i64 = -2_208_988_800;
/// 2299-12-31T23:59:59, the upper bound; sub-second ticks may go up to .9
const DATETIME64_MAX_SECONDS: i64 = 10_413_791_999;

/// Tick bounds of `DateTime64(precision)`. Out-of-range encoded values
/// are clamped on read so they render as the endpoint timestamps, the
/// same way the server displays them.
fn datetime64_range(precision: u8) -> (i64, i64) {
    let scale = 10i64.pow(u32::from(precision));
    let min = DATETIME64_MIN_SECONDS.saturating_mul(scale);
    let max = DATETIME64_MAX_SECONDS
        .saturating_mul(scale)
        .saturating_add(9 * (scale / 10));
    (min, max)
}

/// Homogeneous vector of column values.
///
/// Enum columns are carried as their string titles, the descriptor's
/// dictionary does the transcoding on the wire. Fixed strings are raw
/// bytes since byte-wise truncation may cut a code point in half.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnData {
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    UInt32(Vec<u32>),
    UInt64(Vec<u64>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Bool(Vec<bool>),
    String(Vec<String>),
    FixedString(Vec<Vec<u8>>),
    Uuid(Vec<Uuid>),
    /// days since epoch
    Date(Vec<u16>),
    /// days since epoch, signed
    Date32(Vec<i32>),
    /// seconds since epoch
    DateTime(Vec<u32>),
    /// ticks of 10^-precision seconds since epoch
    DateTime64(Vec<i64>),
    /// one inner container per row
    Array(Vec<ColumnData>),
    /// null flags (1 = null) and a full-length payload with defaults
    /// in the null slots
    Nullable {
        nulls: Vec<u8>,
        values: Box<ColumnData>,
    },
    /// one key-value entry list per row
    Map(Vec<Vec<(String, String)>>),
}

macro_rules! write_scalars {
    ($values:expr, $buf:expr, $ty:ty, $write:ident) => {{
        let start = $buf.len();
        $buf.resize(start + $values.len() * std::mem::size_of::<$ty>(), 0);
        LittleEndian::$write($values, &mut $buf[start..]);
    }};
}

macro_rules! read_scalars {
    ($reader:expr, $rows:expr, $ty:ty, $read:ident) => {{
        let bytes = $reader.read_bytes($rows * std::mem::size_of::<$ty>())?;
        let mut values = vec![<$ty>::default(); $rows];
        LittleEndian::$read(bytes, &mut values);
        values
    }};
}

macro_rules! chunk_rows {
    ($values:expr, $lens:expr, $variant:path) => {{
        let mut out = Vec::with_capacity($lens.len());
        let mut iter = $values.into_iter();
        for len in $lens {
            out.push($variant(iter.by_ref().take(*len as usize).collect()));
        }
        out
    }};
}

impl ColumnData {
    /// The number of rows
    pub fn len(&self) -> usize {
        match self {
            ColumnData::UInt8(v) => v.len(),
            ColumnData::UInt16(v) => v.len(),
            ColumnData::UInt32(v) => v.len(),
            ColumnData::UInt64(v) => v.len(),
            ColumnData::Int8(v) => v.len(),
            ColumnData::Int16(v) => v.len(),
            ColumnData::Int32(v) => v.len(),
            ColumnData::Int64(v) => v.len(),
            ColumnData::Float32(v) => v.len(),
            ColumnData::Float64(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::String(v) => v.len(),
            ColumnData::FixedString(v) => v.len(),
            ColumnData::Uuid(v) => v.len(),
            ColumnData::Date(v) => v.len(),
            ColumnData::Date32(v) => v.len(),
            ColumnData::DateTime(v) => v.len(),
            ColumnData::DateTime64(v) => v.len(),
            ColumnData::Array(v) => v.len(),
            ColumnData::Nullable { nulls, .. } => nulls.len(),
            ColumnData::Map(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn variant_name(&self) -> &'static str {
        match self {
            ColumnData::UInt8(_) => "UInt8",
            ColumnData::UInt16(_) => "UInt16",
            ColumnData::UInt32(_) => "UInt32",
            ColumnData::UInt64(_) => "UInt64",
            ColumnData::Int8(_) => "Int8",
            ColumnData::Int16(_) => "Int16",
            ColumnData::Int32(_) => "Int32",
            ColumnData::Int64(_) => "Int64",
            ColumnData::Float32(_) => "Float32",
            ColumnData::Float64(_) => "Float64",
            ColumnData::Bool(_) => "Bool",
            ColumnData::String(_) => "String",
            ColumnData::FixedString(_) => "FixedString",
            ColumnData::Uuid(_) => "UUID",
            ColumnData::Date(_) => "Date",
            ColumnData::Date32(_) => "Date32",
            ColumnData::DateTime(_) => "DateTime",
            ColumnData::DateTime64(_) => "DateTime64",
            ColumnData::Array(_) => "Array",
            ColumnData::Nullable { .. } => "Nullable",
            ColumnData::Map(_) => "Map",
        }
    }

    /// Empty container of the shape the descriptor prescribes
    pub(crate) fn empty(sql_type: &SqlType) -> ColumnData {
        match sql_type {
            SqlType::UInt8 => ColumnData::UInt8(Vec::new()),
            SqlType::UInt16 => ColumnData::UInt16(Vec::new()),
            SqlType::UInt32 => ColumnData::UInt32(Vec::new()),
            SqlType::UInt64 => ColumnData::UInt64(Vec::new()),
            SqlType::Int8 => ColumnData::Int8(Vec::new()),
            SqlType::Int16 => ColumnData::Int16(Vec::new()),
            SqlType::Int32 => ColumnData::Int32(Vec::new()),
            SqlType::Int64 => ColumnData::Int64(Vec::new()),
            SqlType::Float32 => ColumnData::Float32(Vec::new()),
            SqlType::Float64 => ColumnData::Float64(Vec::new()),
            SqlType::Bool => ColumnData::Bool(Vec::new()),
            SqlType::String | SqlType::Enum8(_) | SqlType::Enum16(_) => {
                ColumnData::String(Vec::new())
            }
            SqlType::FixedString(_) => ColumnData::FixedString(Vec::new()),
            SqlType::Uuid => ColumnData::Uuid(Vec::new()),
            SqlType::Date => ColumnData::Date(Vec::new()),
            SqlType::Date32 => ColumnData::Date32(Vec::new()),
            SqlType::DateTime(_) => ColumnData::DateTime(Vec::new()),
            SqlType::DateTime64(..) => ColumnData::DateTime64(Vec::new()),
            SqlType::Array(_) => ColumnData::Array(Vec::new()),
            SqlType::Nullable(inner) => ColumnData::Nullable {
                nulls: Vec::new(),
                values: Box::new(ColumnData::empty(inner)),
            },
            SqlType::Map(..) => ColumnData::Map(Vec::new()),
        }
    }

    /// Check before transmission that the data can be serialized as the
    /// server-declared column type.
    pub(crate) fn is_compatible(&self, sql_type: &SqlType) -> bool {
        match (self, sql_type) {
            (ColumnData::UInt8(_), SqlType::UInt8)
            | (ColumnData::UInt16(_), SqlType::UInt16)
            | (ColumnData::UInt32(_), SqlType::UInt32)
            | (ColumnData::UInt64(_), SqlType::UInt64)
            | (ColumnData::Int8(_), SqlType::Int8)
            | (ColumnData::Int16(_), SqlType::Int16)
            | (ColumnData::Int32(_), SqlType::Int32)
            | (ColumnData::Int64(_), SqlType::Int64)
            | (ColumnData::Float32(_), SqlType::Float32)
            | (ColumnData::Float64(_), SqlType::Float64)
            | (ColumnData::Bool(_), SqlType::Bool)
            | (ColumnData::String(_), SqlType::String)
            | (ColumnData::String(_), SqlType::FixedString(_))
            | (ColumnData::String(_), SqlType::Enum8(_))
            | (ColumnData::String(_), SqlType::Enum16(_))
            | (ColumnData::FixedString(_), SqlType::FixedString(_))
            | (ColumnData::Uuid(_), SqlType::Uuid)
            | (ColumnData::Date(_), SqlType::Date)
            | (ColumnData::Date32(_), SqlType::Date32)
            | (ColumnData::DateTime(_), SqlType::DateTime(_))
            | (ColumnData::DateTime64(_), SqlType::DateTime64(..))
            | (ColumnData::Map(_), SqlType::Map(..)) => true,
            (ColumnData::Array(rows), SqlType::Array(inner)) => {
                rows.iter().all(|row| row.is_compatible(inner))
            }
            (ColumnData::Nullable { values, .. }, SqlType::Nullable(inner)) => {
                values.is_compatible(inner)
            }
            _ => false,
        }
    }

    /// Append a fragment of the same shape
    pub(crate) fn merge(&mut self, other: ColumnData) -> Result<()> {
        match (self, other) {
            (ColumnData::UInt8(a), ColumnData::UInt8(b)) => a.extend(b),
            (ColumnData::UInt16(a), ColumnData::UInt16(b)) => a.extend(b),
            (ColumnData::UInt32(a), ColumnData::UInt32(b)) => a.extend(b),
            (ColumnData::UInt64(a), ColumnData::UInt64(b)) => a.extend(b),
            (ColumnData::Int8(a), ColumnData::Int8(b)) => a.extend(b),
            (ColumnData::Int16(a), ColumnData::Int16(b)) => a.extend(b),
            (ColumnData::Int32(a), ColumnData::Int32(b)) => a.extend(b),
            (ColumnData::Int64(a), ColumnData::Int64(b)) => a.extend(b),
            (ColumnData::Float32(a), ColumnData::Float32(b)) => a.extend(b),
            (ColumnData::Float64(a), ColumnData::Float64(b)) => a.extend(b),
            (ColumnData::Bool(a), ColumnData::Bool(b)) => a.extend(b),
            (ColumnData::String(a), ColumnData::String(b)) => a.extend(b),
            (ColumnData::FixedString(a), ColumnData::FixedString(b)) => a.extend(b),
            (ColumnData::Uuid(a), ColumnData::Uuid(b)) => a.extend(b),
            (ColumnData::Date(a), ColumnData::Date(b)) => a.extend(b),
            (ColumnData::Date32(a), ColumnData::Date32(b)) => a.extend(b),
            (ColumnData::DateTime(a), ColumnData::DateTime(b)) => a.extend(b),
            (ColumnData::DateTime64(a), ColumnData::DateTime64(b)) => a.extend(b),
            (ColumnData::Array(a), ColumnData::Array(b)) => a.extend(b),
            (ColumnData::Map(a), ColumnData::Map(b)) => a.extend(b),
            (
                ColumnData::Nullable { nulls, values },
                ColumnData::Nullable {
                    nulls: other_nulls,
                    values: other_values,
                },
            ) => {
                nulls.extend(other_nulls);
                values.merge(*other_values)?;
            }
            (a, b) => {
                return Err(ConversionError::MergeMismatch(
                    a.variant_name().to_owned(),
                    b.variant_name().to_owned(),
                )
                .into());
            }
        }
        Ok(())
    }

    /// Concatenate per-row fragments into one container, `template` gives
    /// the shape when the fragment list is empty.
    pub(crate) fn concat(template: &SqlType, rows: &[ColumnData]) -> Result<ColumnData> {
        let mut merged = ColumnData::empty(template);
        for row in rows {
            merged.merge(row.clone())?;
        }
        Ok(merged)
    }

    /// Encode the payload the way the descriptor prescribes
    pub(crate) fn write(&self, sql_type: &SqlType, buf: &mut BytesMut) -> Result<()> {
        match (self, sql_type) {
            (ColumnData::UInt8(v), SqlType::UInt8) => buf.put_slice(v),
            (ColumnData::UInt16(v), SqlType::UInt16) => {
                write_scalars!(v, buf, u16, write_u16_into)
            }
            (ColumnData::UInt32(v), SqlType::UInt32) => {
                write_scalars!(v, buf, u32, write_u32_into)
            }
            (ColumnData::UInt64(v), SqlType::UInt64) => {
                write_scalars!(v, buf, u64, write_u64_into)
            }
            (ColumnData::Int8(v), SqlType::Int8) => {
                for value in v {
                    buf.put_i8(*value);
                }
            }
            (ColumnData::Int16(v), SqlType::Int16) => {
                write_scalars!(v, buf, i16, write_i16_into)
            }
            (ColumnData::Int32(v), SqlType::Int32) => {
                write_scalars!(v, buf, i32, write_i32_into)
            }
            (ColumnData::Int64(v), SqlType::Int64) => {
                write_scalars!(v, buf, i64, write_i64_into)
            }
            (ColumnData::Float32(v), SqlType::Float32) => {
                write_scalars!(v, buf, f32, write_f32_into)
            }
            (ColumnData::Float64(v), SqlType::Float64) => {
                write_scalars!(v, buf, f64, write_f64_into)
            }
            (ColumnData::Bool(v), SqlType::Bool) => {
                for value in v {
                    buf.put_u8(*value as u8);
                }
            }
            (ColumnData::String(v), SqlType::String) => {
                for value in v {
                    buf.write_str(value);
                }
            }
            (ColumnData::String(v), SqlType::FixedString(len)) => {
                for value in v {
                    buf.write_fixed_str(value.as_bytes(), *len as usize);
                }
            }
            (ColumnData::FixedString(v), SqlType::FixedString(len)) => {
                for value in v {
                    buf.write_fixed_str(value, *len as usize);
                }
            }
            (ColumnData::String(v), SqlType::Enum8(index)) => {
                for name in v {
                    buf.put_i8(index.value_by_name(name)? as i8);
                }
            }
            (ColumnData::String(v), SqlType::Enum16(index)) => {
                for name in v {
                    buf.put_i16_le(index.value_by_name(name)?);
                }
            }
            (ColumnData::Uuid(v), SqlType::Uuid) => {
                for value in v {
                    buf.write_uuid(value);
                }
            }
            (ColumnData::Date(v), SqlType::Date) => {
                write_scalars!(v, buf, u16, write_u16_into)
            }
            (ColumnData::Date32(v), SqlType::Date32) => {
                write_scalars!(v, buf, i32, write_i32_into)
            }
            (ColumnData::DateTime(v), SqlType::DateTime(_)) => {
                write_scalars!(v, buf, u32, write_u32_into)
            }
            (ColumnData::DateTime64(v), SqlType::DateTime64(..)) => {
                write_scalars!(v, buf, i64, write_i64_into)
            }
            (ColumnData::Array(rows), SqlType::Array(inner)) => {
                let mut total = 0u64;
                for row in rows {
                    total += row.len() as u64;
                    buf.put_u64_le(total);
                }
                ColumnData::concat(inner, rows)?.write(inner, buf)?;
            }
            (ColumnData::Nullable { nulls, values }, SqlType::Nullable(inner)) => {
                buf.put_slice(nulls);
                values.write(inner, buf)?;
            }
            (ColumnData::Map(rows), SqlType::Map(..)) => {
                let mut total = 0u64;
                for row in rows {
                    total += row.len() as u64;
                    buf.put_u64_le(total);
                }
                for row in rows {
                    for (key, _) in row {
                        buf.write_str(key);
                    }
                }
                for row in rows {
                    for (_, value) in row {
                        buf.write_str(value);
                    }
                }
            }
            _ => return Err(ConversionError::TypeMismatch(sql_type.clone()).into()),
        }
        Ok(())
    }

    /// Decode `rows` values of the descriptor's shape
    pub(crate) fn read(
        reader: &mut ByteReader<'_>,
        sql_type: &SqlType,
        rows: u64,
    ) -> Result<ColumnData> {
        let rows = rows as usize;
        let data = match sql_type {
            SqlType::UInt8 => ColumnData::UInt8(reader.read_bytes(rows)?.to_vec()),
            SqlType::UInt16 => ColumnData::UInt16(read_scalars!(reader, rows, u16, read_u16_into)),
            SqlType::UInt32 => ColumnData::UInt32(read_scalars!(reader, rows, u32, read_u32_into)),
            SqlType::UInt64 => ColumnData::UInt64(read_scalars!(reader, rows, u64, read_u64_into)),
            SqlType::Int8 => {
                ColumnData::Int8(reader.read_bytes(rows)?.iter().map(|b| *b as i8).collect())
            }
            SqlType::Int16 => ColumnData::Int16(read_scalars!(reader, rows, i16, read_i16_into)),
            SqlType::Int32 => ColumnData::Int32(read_scalars!(reader, rows, i32, read_i32_into)),
            SqlType::Int64 => ColumnData::Int64(read_scalars!(reader, rows, i64, read_i64_into)),
            SqlType::Float32 => {
                ColumnData::Float32(read_scalars!(reader, rows, f32, read_f32_into))
            }
            SqlType::Float64 => {
                ColumnData::Float64(read_scalars!(reader, rows, f64, read_f64_into))
            }
            SqlType::Bool => {
                ColumnData::Bool(reader.read_bytes(rows)?.iter().map(|b| *b != 0).collect())
            }
            SqlType::String => {
                let mut values = Vec::with_capacity(rows);
                for _ in 0..rows {
                    values.push(reader.read_string()?);
                }
                ColumnData::String(values)
            }
            SqlType::FixedString(len) => {
                let len = *len as usize;
                let mut values = Vec::with_capacity(rows);
                for _ in 0..rows {
                    let bytes = reader.read_bytes(len)?;
                    // the first NUL terminates the value, padding and
                    // embedded NULs are indistinguishable
                    let end = bytes.iter().position(|b| *b == 0).unwrap_or(len);
                    values.push(bytes[..end].to_vec());
                }
                ColumnData::FixedString(values)
            }
            SqlType::Uuid => {
                let mut values = Vec::with_capacity(rows);
                for _ in 0..rows {
                    let bytes = reader.read_bytes(16)?;
                    let mut raw = [0u8; 16];
                    raw.copy_from_slice(bytes);
                    swap_uuid_halves(&mut raw);
                    values.push(Uuid::from_bytes(raw));
                }
                ColumnData::Uuid(values)
            }
            SqlType::Date => ColumnData::Date(read_scalars!(reader, rows, u16, read_u16_into)),
            SqlType::Date32 => ColumnData::Date32(read_scalars!(reader, rows, i32, read_i32_into)),
            SqlType::DateTime(_) => {
                ColumnData::DateTime(read_scalars!(reader, rows, u32, read_u32_into))
            }
            SqlType::DateTime64(precision, _) => {
                let mut values = read_scalars!(reader, rows, i64, read_i64_into);
                let (min, max) = datetime64_range(*precision);
                for value in values.iter_mut() {
                    *value = (*value).clamp(min, max);
                }
                ColumnData::DateTime64(values)
            }
            SqlType::Enum8(index) => {
                let mut values = Vec::with_capacity(rows);
                for byte in reader.read_bytes(rows)? {
                    values.push(index.name_by_value(*byte as i8 as i16)?.to_owned());
                }
                ColumnData::String(values)
            }
            SqlType::Enum16(index) => {
                let codes = read_scalars!(reader, rows, i16, read_i16_into);
                let mut values = Vec::with_capacity(rows);
                for code in codes {
                    values.push(index.name_by_value(code)?.to_owned());
                }
                ColumnData::String(values)
            }
            SqlType::Array(inner) => {
                let (lens, total) = read_offsets(reader, rows)?;
                let merged = ColumnData::read(reader, inner, total)?;
                ColumnData::Array(merged.split_rows(&lens)?)
            }
            SqlType::Nullable(inner) => {
                let nulls = reader.read_bytes(rows)?.to_vec();
                let values = ColumnData::read(reader, inner, rows as u64)?;
                ColumnData::Nullable {
                    nulls,
                    values: Box::new(values),
                }
            }
            SqlType::Map(..) => {
                let (lens, total) = read_offsets(reader, rows)?;
                let mut keys = Vec::with_capacity(total as usize);
                for _ in 0..total {
                    keys.push(reader.read_string()?);
                }
                let mut values = Vec::with_capacity(total as usize);
                for _ in 0..total {
                    values.push(reader.read_string()?);
                }
                let mut rows_out = Vec::with_capacity(lens.len());
                let mut entries = keys.into_iter().zip(values.into_iter());
                for len in &lens {
                    let row: Vec<(String, String)> =
                        entries.by_ref().take(*len as usize).collect();
                    if row.len() != *len as usize {
                        return Err(DriverError::BrokenData.into());
                    }
                    rows_out.push(row);
                }
                ColumnData::Map(rows_out)
            }
        };
        Ok(data)
    }

    /// Split a flattened container back into per-row fragments.
    /// `Nullable` never appears under `Array`/`Map`, the parser rejects it.
    fn split_rows(self, lens: &[u64]) -> Result<Vec<ColumnData>> {
        let rows = match self {
            ColumnData::UInt8(v) => chunk_rows!(v, lens, ColumnData::UInt8),
            ColumnData::UInt16(v) => chunk_rows!(v, lens, ColumnData::UInt16),
            ColumnData::UInt32(v) => chunk_rows!(v, lens, ColumnData::UInt32),
            ColumnData::UInt64(v) => chunk_rows!(v, lens, ColumnData::UInt64),
            ColumnData::Int8(v) => chunk_rows!(v, lens, ColumnData::Int8),
            ColumnData::Int16(v) => chunk_rows!(v, lens, ColumnData::Int16),
            ColumnData::Int32(v) => chunk_rows!(v, lens, ColumnData::Int32),
            ColumnData::Int64(v) => chunk_rows!(v, lens, ColumnData::Int64),
            ColumnData::Float32(v) => chunk_rows!(v, lens, ColumnData::Float32),
            ColumnData::Float64(v) => chunk_rows!(v, lens, ColumnData::Float64),
            ColumnData::Bool(v) => chunk_rows!(v, lens, ColumnData::Bool),
            ColumnData::String(v) => chunk_rows!(v, lens, ColumnData::String),
            ColumnData::FixedString(v) => chunk_rows!(v, lens, ColumnData::FixedString),
            ColumnData::Uuid(v) => chunk_rows!(v, lens, ColumnData::Uuid),
            ColumnData::Date(v) => chunk_rows!(v, lens, ColumnData::Date),
            ColumnData::Date32(v) => chunk_rows!(v, lens, ColumnData::Date32),
            ColumnData::DateTime(v) => chunk_rows!(v, lens, ColumnData::DateTime),
            ColumnData::DateTime64(v) => chunk_rows!(v, lens, ColumnData::DateTime64),
            ColumnData::Array(v) => chunk_rows!(v, lens, ColumnData::Array),
            ColumnData::Map(v) => chunk_rows!(v, lens, ColumnData::Map),
            ColumnData::Nullable { .. } => {
                return Err(ConversionError::UnsupportedConversion.into());
            }
        };
        Ok(rows)
    }
}

/// Offsets array of a `Array`/`Map` column: entry i is the cumulative
/// element count through row i. Returns per-row lengths and the total.
fn read_offsets(reader: &mut ByteReader<'_>, rows: usize) -> Result<(Vec<u64>, u64)> {
    let offsets = read_scalars!(reader, rows, u64, read_u64_into);
    let mut lens = Vec::with_capacity(rows);
    let mut previous = 0u64;
    for offset in offsets {
        if offset < previous {
            return Err(DriverError::BrokenData.into());
        }
        lens.push(offset - previous);
        previous = offset;
    }
    // a corrupted offsets array must not drive allocations
    if previous > u64::from(u32::MAX) {
        return Err(DriverError::BrokenData.into());
    }
    Ok((lens, previous))
}

// Typed views of the container, `None` when the shape does not match.
macro_rules! impl_as_slice {
    ($fn_name:ident, $ty:ty, $variant:path) => {
        impl ColumnData {
            pub fn $fn_name(&self) -> Option<&[$ty]> {
                match self {
                    $variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_as_slice!(as_u8, u8, ColumnData::UInt8);
impl_as_slice!(as_u16, u16, ColumnData::UInt16);
impl_as_slice!(as_u32, u32, ColumnData::UInt32);
impl_as_slice!(as_u64, u64, ColumnData::UInt64);
impl_as_slice!(as_i8, i8, ColumnData::Int8);
impl_as_slice!(as_i16, i16, ColumnData::Int16);
impl_as_slice!(as_i32, i32, ColumnData::Int32);
impl_as_slice!(as_i64, i64, ColumnData::Int64);
impl_as_slice!(as_f32, f32, ColumnData::Float32);
impl_as_slice!(as_f64, f64, ColumnData::Float64);
impl_as_slice!(as_bool, bool, ColumnData::Bool);
impl_as_slice!(as_strings, String, ColumnData::String);
impl_as_slice!(as_fixed_strings, Vec<u8>, ColumnData::FixedString);
impl_as_slice!(as_uuids, Uuid, ColumnData::Uuid);
impl_as_slice!(as_maps, Vec<(String, String)>, ColumnData::Map);

impl ColumnData {
    /// Null flags and the values container of a `Nullable` column
    pub fn as_nullable(&self) -> Option<(&[u8], &ColumnData)> {
        match self {
            ColumnData::Nullable { nulls, values } => Some((nulls, values)),
            _ => None,
        }
    }

    /// Per-row containers of an `Array` column
    pub fn as_rows(&self) -> Option<&[ColumnData]> {
        match self {
            ColumnData::Array(rows) => Some(rows),
            _ => None,
        }
    }

    /// `Date` values as calendar dates
    pub fn as_dates(&self) -> Option<Vec<NaiveDate>> {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
        match self {
            ColumnData::Date(v) => Some(
                v.iter()
                    .map(|days| epoch + Duration::days(i64::from(*days)))
                    .collect(),
            ),
            ColumnData::Date32(v) => Some(
                v.iter()
                    .map(|days| epoch + Duration::days(i64::from(*days)))
                    .collect(),
            ),
            _ => None,
        }
    }

    /// `DateTime` values as UTC timestamps
    pub fn as_datetimes(&self) -> Option<Vec<DateTime<Utc>>> {
        match self {
            ColumnData::DateTime(v) => v
                .iter()
                .map(|secs| Utc.timestamp_opt(i64::from(*secs), 0).single())
                .collect(),
            _ => None,
        }
    }

    /// `DateTime64` ticks as UTC timestamps, `precision` comes from the
    /// column descriptor
    pub fn as_datetimes64(&self, precision: u8) -> Option<Vec<DateTime<Utc>>> {
        let scale = 10i64.pow(u32::from(precision));
        let nanos_per_tick = 1_000_000_000 / scale;
        match self {
            ColumnData::DateTime64(v) => v
                .iter()
                .map(|ticks| {
                    let secs = ticks.div_euclid(scale);
                    let nanos = ticks.rem_euclid(scale) * nanos_per_tick;
                    Utc.timestamp_opt(secs, nanos as u32).single()
                })
                .collect(),
            _ => None,
        }
    }
}

macro_rules! impl_from_vec {
    ($ty:ty, $variant:path) => {
        impl From<Vec<$ty>> for ColumnData {
            fn from(values: Vec<$ty>) -> Self {
                $variant(values)
            }
        }

        impl From<Vec<Option<$ty>>> for ColumnData {
            fn from(values: Vec<Option<$ty>>) -> Self {
                let mut nulls = Vec::with_capacity(values.len());
                let mut plain = Vec::with_capacity(values.len());
                for value in values {
                    nulls.push(value.is_none() as u8);
                    plain.push(value.unwrap_or_default());
                }
                ColumnData::Nullable {
                    nulls,
                    values: Box::new($variant(plain)),
                }
            }
        }

        impl From<Vec<Vec<$ty>>> for ColumnData {
            fn from(rows: Vec<Vec<$ty>>) -> Self {
                ColumnData::Array(rows.into_iter().map(|row| $variant(row)).collect())
            }
        }
    };
}

impl_from_vec!(u16, ColumnData::UInt16);
impl_from_vec!(u32, ColumnData::UInt32);
impl_from_vec!(u64, ColumnData::UInt64);
impl_from_vec!(i8, ColumnData::Int8);
impl_from_vec!(i16, ColumnData::Int16);
impl_from_vec!(i32, ColumnData::Int32);
impl_from_vec!(i64, ColumnData::Int64);
impl_from_vec!(f32, ColumnData::Float32);
impl_from_vec!(f64, ColumnData::Float64);
impl_from_vec!(bool, ColumnData::Bool);
impl_from_vec!(String, ColumnData::String);
impl_from_vec!(Uuid, ColumnData::Uuid);

// Vec<u8> doubles as a fixed-string value, so the nested-vec flavor is
// left out for u8 and the scalar pair is written by hand.
impl From<Vec<u8>> for ColumnData {
    fn from(values: Vec<u8>) -> Self {
        ColumnData::UInt8(values)
    }
}

impl From<Vec<Option<u8>>> for ColumnData {
    fn from(values: Vec<Option<u8>>) -> Self {
        let mut nulls = Vec::with_capacity(values.len());
        let mut plain = Vec::with_capacity(values.len());
        for value in values {
            nulls.push(value.is_none() as u8);
            plain.push(value.unwrap_or_default());
        }
        ColumnData::Nullable {
            nulls,
            values: Box::new(ColumnData::UInt8(plain)),
        }
    }
}

impl From<Vec<&str>> for ColumnData {
    fn from(values: Vec<&str>) -> Self {
        ColumnData::String(values.into_iter().map(str::to_owned).collect())
    }
}

impl From<Vec<Option<&str>>> for ColumnData {
    fn from(values: Vec<Option<&str>>) -> Self {
        let mut nulls = Vec::with_capacity(values.len());
        let mut plain = Vec::with_capacity(values.len());
        for value in values {
            nulls.push(value.is_none() as u8);
            plain.push(value.unwrap_or_default().to_owned());
        }
        ColumnData::Nullable {
            nulls,
            values: Box::new(ColumnData::String(plain)),
        }
    }
}

impl From<Vec<Vec<&str>>> for ColumnData {
    fn from(rows: Vec<Vec<&str>>) -> Self {
        ColumnData::Array(rows.into_iter().map(ColumnData::from).collect())
    }
}

impl From<Vec<Vec<(String, String)>>> for ColumnData {
    fn from(rows: Vec<Vec<(String, String)>>) -> Self {
        ColumnData::Map(rows)
    }
}
