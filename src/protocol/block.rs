//! Data blocks.
//!
//! A block is a set of equally sized columns plus two header fields the
//! server uses for distributed aggregation. An empty block (no columns,
//! no rows) marks the end of a data transfer in both directions.
use bytes::{BufMut, BytesMut};

use super::code::*;
use super::column::ColumnData;
use super::decoder::ByteReader;
use super::encoder::WriteAware;
use crate::errors::{ConversionError, DriverError, Result};
use crate::types::{parse_type, SqlType};

/// Named, typed, homogeneous vector of values.
///
/// Columns built by the caller for an insert have no descriptor yet,
/// the server-declared schema attaches one before serialization.
#[derive(Clone, Debug)]
pub struct Column {
    pub(crate) name: String,
    pub(crate) sql_type: Option<SqlType>,
    pub(crate) data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: impl Into<ColumnData>) -> Column {
        Column {
            name: name.into(),
            sql_type: None,
            data: data.into(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element type of the column, present on everything that went over
    /// the wire
    #[inline]
    pub fn sql_type(&self) -> Option<&SqlType> {
        self.sql_type.as_ref()
    }

    #[inline]
    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    #[inline]
    pub fn into_data(self) -> ColumnData {
        self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One wire block
#[derive(Clone, Debug, Default)]
pub struct Block {
    pub(crate) table: String,
    pub(crate) columns: Vec<Column>,
    pub(crate) rows: u64,
    pub(crate) overflow: u8,
    pub(crate) bucket: i32,
}

impl Block {
    pub(crate) fn from_columns(table: String, columns: Vec<Column>) -> Block {
        let rows = columns.first().map_or(0, |c| c.len() as u64);
        Block {
            table,
            columns,
            rows,
            overflow: 0,
            bucket: -1,
        }
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn row_count(&self) -> u64 {
        self.rows
    }

    pub(crate) fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Decode a block, the leading opcode is already consumed
    pub(crate) fn read(reader: &mut ByteReader<'_>, revision: u64) -> Result<Block> {
        let table = if revision >= DBMS_MIN_REVISION_WITH_TEMPORARY_TABLES {
            reader.read_string()?
        } else {
            String::new()
        };

        let mut overflow = 0u8;
        let mut bucket = -1i32;
        if revision >= DBMS_MIN_REVISION_WITH_BLOCK_INFO {
            // field pairs (num, value), closed by field num 0
            reader.read_varint()?;
            overflow = reader.read_u8()?;
            reader.read_varint()?;
            bucket = reader.read_i32_le()?;
            reader.read_varint()?;
        }

        let cols = reader.read_varint()?;
        let rows = reader.read_varint()?;
        if cols > u64::from(u16::MAX) || rows > crate::MAX_BLOCK_SIZE as u64 {
            return Err(DriverError::RowCountTooMany(rows).into());
        }

        let mut columns = Vec::with_capacity(cols as usize);
        for _ in 0..cols {
            let name = reader.read_string()?;
            let type_str = reader.read_string()?;
            let sql_type = parse_type(&type_str)?;
            let data = ColumnData::read(reader, &sql_type, rows)?;
            columns.push(Column {
                name,
                sql_type: Some(sql_type),
                data,
            });
        }

        Ok(Block {
            table,
            columns,
            rows,
            overflow,
            bucket,
        })
    }

    /// Serialize the block as a CLIENT_DATA frame.
    /// Every column must carry a descriptor by now.
    pub(crate) fn write(&self, buf: &mut BytesMut, revision: u64) -> Result<()> {
        buf.write_varint(CLIENT_DATA);
        if revision >= DBMS_MIN_REVISION_WITH_TEMPORARY_TABLES {
            buf.write_str(&self.table);
        }
        if revision >= DBMS_MIN_REVISION_WITH_BLOCK_INFO {
            buf.write_varint(1);
            buf.put_u8(self.overflow);
            buf.write_varint(2);
            buf.put_i32_le(self.bucket);
            buf.write_varint(0);
        }
        buf.write_varint(self.columns.len() as u64);
        buf.write_varint(self.rows);

        for column in &self.columns {
            let sql_type = column
                .sql_type
                .as_ref()
                .ok_or(ConversionError::UnsupportedConversion)?;
            buf.write_str(&column.name);
            buf.write_str(&sql_type.to_string());
            column.data.write(sql_type, buf)?;
        }
        Ok(())
    }

    /// The end-of-data marker as a CLIENT_DATA frame
    pub(crate) fn write_empty(buf: &mut BytesMut, revision: u64) {
        buf.write_varint(CLIENT_DATA);
        if revision >= DBMS_MIN_REVISION_WITH_TEMPORARY_TABLES {
            buf.write_str("");
        }
        if revision >= DBMS_MIN_REVISION_WITH_BLOCK_INFO {
            buf.write_varint(1);
            buf.put_u8(0);
            buf.write_varint(2);
            buf.put_i32_le(-1);
            buf.write_varint(0);
        }
        buf.write_varint(0);
        buf.write_varint(0);
    }
}

/// Rows of a finished query.
#[derive(Debug, Default)]
pub struct QueryResult {
    pub(crate) columns: Vec<Column>,
    pub(crate) rows: u64,
}

impl QueryResult {
    #[inline]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    #[inline]
    pub fn row_count(&self) -> u64 {
        self.rows
    }

    #[inline]
    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    /// Synthesize the result from the accumulated response blocks.
    ///
    /// The first block carries the schema with zero rows. A single block
    /// is returned as-is, the schema block plus exactly one data block
    /// shortcut to the data block, anything longer concatenates row-wise
    /// per column position.
    pub(crate) fn from_blocks(mut blocks: Vec<Block>) -> Result<QueryResult> {
        if blocks.is_empty() {
            return Ok(QueryResult::default());
        }
        if blocks.len() == 1 {
            let block = blocks.pop().unwrap_or_default();
            return Ok(QueryResult {
                rows: block.rows,
                columns: block.columns,
            });
        }
        if blocks.len() == 2 && blocks[0].rows == 0 {
            let block = blocks.pop().unwrap_or_default();
            return Ok(QueryResult {
                rows: block.rows,
                columns: block.columns,
            });
        }

        let mut blocks = blocks.into_iter();
        let first = match blocks.next() {
            Some(block) => block,
            None => return Ok(QueryResult::default()),
        };
        let mut rows = first.rows;
        let mut columns = first.columns;
        for block in blocks {
            if block.columns.len() != columns.len() {
                return Err(DriverError::BrokenData.into());
            }
            rows += block.rows;
            for (target, fragment) in columns.iter_mut().zip(block.columns) {
                target.data.merge(fragment.data)?;
            }
        }
        Ok(QueryResult { columns, rows })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_block(rows: Vec<u64>, names: Vec<&str>) -> Block {
        let rows_len = rows.len() as u64;
        let mut block = Block::from_columns(
            String::new(),
            vec![
                {
                    let mut c = Column::new("id", rows);
                    c.sql_type = Some(SqlType::UInt64);
                    c
                },
                {
                    let mut c = Column::new("name", names);
                    c.sql_type = Some(SqlType::String);
                    c
                },
            ],
        );
        block.rows = rows_len;
        block
    }

    #[test]
    fn test_empty_block_bytes() {
        let mut buf = BytesMut::new();
        Block::write_empty(&mut buf, crate::REVISION);
        assert_eq!(
            &buf[..],
            &[0x02, 0x00, 0x01, 0x00, 0x02, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_block_roundtrip() {
        let block = sample_block(vec![1, 2, 3], vec!["a", "b", "c"]);
        let mut buf = BytesMut::new();
        block.write(&mut buf, crate::REVISION).unwrap();

        let mut reader = ByteReader::new(&buf[..]);
        // opcode is handled by the frame decoder
        assert_eq!(reader.read_varint().unwrap(), CLIENT_DATA);
        let decoded = Block::read(&mut reader, crate::REVISION).unwrap();
        assert_eq!(reader.consumed(), buf.len());

        assert_eq!(decoded.row_count(), 3);
        assert_eq!(decoded.column_count(), 2);
        assert_eq!(decoded.columns[0].name(), "id");
        assert_eq!(decoded.columns[0].sql_type(), Some(&SqlType::UInt64));
        assert_eq!(decoded.columns[0].data().as_u64().unwrap(), &[1, 2, 3]);
        assert_eq!(
            decoded.columns[1].data().as_strings().unwrap(),
            &["a".to_owned(), "b".to_owned(), "c".to_owned()]
        );
    }

    #[test]
    fn test_merge_sums_rows() {
        let mut schema = sample_block(vec![], vec![]);
        schema.rows = 0;
        let blocks = vec![
            schema,
            sample_block(vec![1, 2], vec!["a", "b"]),
            sample_block(vec![3], vec!["c"]),
            sample_block(vec![4, 5], vec!["d", "e"]),
        ];
        let result = QueryResult::from_blocks(blocks).unwrap();
        assert_eq!(result.row_count(), 5);
        assert_eq!(result.columns()[0].data().as_u64().unwrap(), &[1, 2, 3, 4, 5]);
        assert_eq!(result.column("name").unwrap().len(), 5);
    }

    #[test]
    fn test_merge_single_data_block_shortcut() {
        let mut schema = sample_block(vec![], vec![]);
        schema.rows = 0;
        let blocks = vec![schema, sample_block(vec![7, 8], vec!["x", "y"])];
        let result = QueryResult::from_blocks(blocks).unwrap();
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.columns()[0].data().as_u64().unwrap(), &[7, 8]);
    }

    #[test]
    fn test_merge_heterogeneous_types_fails() {
        let mut schema = sample_block(vec![], vec![]);
        schema.rows = 0;
        let mut odd = sample_block(vec![3], vec!["c"]);
        odd.columns[0].data = ColumnData::from(vec![3i32]);
        let blocks = vec![schema, sample_block(vec![1, 2], vec!["a", "b"]), odd];
        assert!(QueryResult::from_blocks(blocks).is_err());
    }
}
