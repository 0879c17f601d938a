//! Outbound protocol frames.
//!
//! Every request starts with a client opcode VarInt64. Queries carry a
//! client-info block behind the CLIENT_INFO revision gate and always end
//! with an empty data block that closes the query preamble.
use bytes::BytesMut;
use uuid::Uuid;

use super::block::{Block, Column};
use super::code::*;
use super::encoder::WriteAware;
use crate::errors::Result;
use crate::options::Options;

/// Random 64-bit query id, 16 hex characters
pub(crate) fn query_id() -> String {
    let uuid = Uuid::new_v4();
    let mut id = uuid.simple().to_string();
    id.truncate(16);
    id
}

pub(crate) fn write_hello(buf: &mut BytesMut, options: &Options) {
    buf.write_varint(CLIENT_HELLO);
    buf.write_str(crate::CLIENT_NAME);
    buf.write_varint(crate::DBMS_VERSION_MAJOR);
    buf.write_varint(crate::DBMS_VERSION_MINOR);
    buf.write_varint(crate::REVISION);
    buf.write_str(options.database());
    buf.write_str(options.username());
    buf.write_str(options.password());
}

pub(crate) fn write_ping(buf: &mut BytesMut) {
    buf.write_varint(CLIENT_PING);
}

/// Query frame: id, client info, settings terminator, stage, compression
/// negotiation, the statement, then the end-of-preamble empty block.
pub(crate) fn write_query(buf: &mut BytesMut, revision: u64, sql: &str) {
    buf.write_varint(CLIENT_QUERY);
    buf.write_str(&query_id());

    if revision >= DBMS_MIN_REVISION_WITH_CLIENT_INFO {
        buf.write_varint(QUERY_KIND_INITIAL);
        // initial user, initial query id, initial address
        buf.write_str("");
        buf.write_str("");
        buf.write_str("");
        buf.write_varint(IFACE_TYPE_TCP);
        // os user, hostname
        buf.write_str("");
        buf.write_str("");
        buf.write_str(crate::CLIENT_NAME);
        buf.write_varint(crate::DBMS_VERSION_MAJOR);
        buf.write_varint(crate::DBMS_VERSION_MINOR);
        buf.write_varint(revision);
        if revision >= DBMS_MIN_REVISION_WITH_QUOTA_KEY_IN_CLIENT_INFO {
            // quota key
            buf.write_str("");
        }
    }

    // empty string ends the settings block
    buf.write_str("");
    buf.write_varint(STAGE_COMPLETE);
    buf.write_varint(COMPRESSION_DISABLE);
    buf.write_str(sql);

    Block::write_empty(buf, revision);
}

/// The user data followed by the end-of-data marker
pub(crate) fn write_insert_data(buf: &mut BytesMut, revision: u64, block: &Block) -> Result<()> {
    block.write(buf, revision)?;
    Block::write_empty(buf, revision);
    Ok(())
}

/// `INSERT INTO t (c1,...) VALUES` statement from the column names.
/// Column order must match the order the data is sent in.
pub(crate) fn insert_statement(table: &str, columns: &[Column]) -> String {
    let mut query = format!("INSERT INTO {} (", table);
    query.reserve(256);
    let mut iter = columns.iter();
    if let Some(column) = iter.next() {
        query.push_str(column.name());
        for column in iter {
            query.push(',');
            query.push_str(column.name());
        }
    }
    query.push_str(") VALUES");
    query
}
