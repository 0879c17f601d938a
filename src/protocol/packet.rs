//! Inbound protocol frames.
use chrono_tz::Tz;

use super::block::Block;
use super::code::*;
use super::decoder::ByteReader;
use crate::errors::{DriverError, Exception, Result, ServerError};

/// Peer identity established by the handshake
#[derive(Clone, Debug)]
pub struct ServerInfo {
    pub name: String,
    pub version_major: u64,
    pub version_minor: u64,
    pub revision: u64,
    pub timezone: Option<Tz>,
}

/// Query execution progress: rows read, bytes read
#[derive(Clone, Copy, Debug, Default)]
pub struct Progress {
    pub rows: u64,
    pub bytes: u64,
    pub total_rows: Option<u64>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ProfileInfo {
    pub rows: u64,
    pub blocks: u64,
    pub bytes: u64,
    pub applied_limit: bool,
    pub rows_before_limit: u64,
    pub calculated_rows_before_limit: bool,
}

/// Tagged inbound frame
#[derive(Debug)]
pub(crate) enum Packet {
    Hello(ServerInfo),
    Data(Block),
    Exception(ServerError),
    Progress(Progress),
    Pong,
    EndOfStream,
    ProfileInfo(ProfileInfo),
}

impl Packet {
    pub(crate) fn code(&self) -> u64 {
        match self {
            Packet::Hello(_) => SERVER_HELLO,
            Packet::Data(_) => SERVER_DATA,
            Packet::Exception(_) => SERVER_EXCEPTION,
            Packet::Progress(_) => SERVER_PROGRESS,
            Packet::Pong => SERVER_PONG,
            Packet::EndOfStream => SERVER_END_OF_STREAM,
            Packet::ProfileInfo(_) => SERVER_PROFILE_INFO,
        }
    }

    /// Decode one frame: opcode VarInt64, then the payload.
    /// `revision` gates the optional fields of Data and Progress.
    pub(crate) fn read(reader: &mut ByteReader<'_>, revision: u64) -> Result<Packet> {
        let packet = match reader.read_varint()? {
            SERVER_HELLO => Packet::Hello(read_hello(reader)?),
            SERVER_DATA => Packet::Data(Block::read(reader, revision)?),
            SERVER_EXCEPTION => Packet::Exception(read_exception(reader)?),
            SERVER_PROGRESS => Packet::Progress(read_progress(reader, revision)?),
            SERVER_PONG => Packet::Pong,
            SERVER_END_OF_STREAM => Packet::EndOfStream,
            SERVER_PROFILE_INFO => Packet::ProfileInfo(read_profile(reader)?),
            code @ (SERVER_TOTALS | SERVER_EXTREMES) => {
                return Err(DriverError::UnsupportedPacket(code).into());
            }
            code => return Err(DriverError::UnknownPacket(code).into()),
        };
        Ok(packet)
    }
}

fn read_hello(reader: &mut ByteReader<'_>) -> Result<ServerInfo> {
    let name = reader.read_string()?;
    let version_major = reader.read_varint()?;
    let version_minor = reader.read_varint()?;
    let revision = reader.read_varint()?;

    // Fields past the revision are sent only when our advertised
    // revision asks for them.
    let timezone = if revision >= DBMS_MIN_REVISION_WITH_SERVER_TIMEZONE {
        let name = reader.read_string()?;
        Some(name.parse().unwrap_or(Tz::UTC))
    } else {
        None
    };

    Ok(ServerInfo {
        name,
        version_major,
        version_minor,
        revision,
        timezone,
    })
}

/// The exception chain: code, three strings, a nested flag, recursively
/// one nested exception while the flag is set.
fn read_exception(reader: &mut ByteReader<'_>) -> Result<ServerError> {
    let mut chain = Vec::with_capacity(1);
    loop {
        let code = reader.read_u32_le()?;
        let name = reader.read_string()?;
        let message = reader.read_string()?;
        let trace = reader.read_string()?;
        let nested = reader.read_u8()?;

        chain.push(Exception {
            code,
            name,
            message,
            trace,
        });
        if nested == 0 {
            return Ok(ServerError(chain.into_boxed_slice()));
        }
    }
}

fn read_progress(reader: &mut ByteReader<'_>, revision: u64) -> Result<Progress> {
    let rows = reader.read_varint()?;
    let bytes = reader.read_varint()?;
    let total_rows = if revision >= DBMS_MIN_REVISION_WITH_TOTAL_ROWS_IN_PROGRESS {
        Some(reader.read_varint()?)
    } else {
        None
    };
    Ok(Progress {
        rows,
        bytes,
        total_rows,
    })
}

fn read_profile(reader: &mut ByteReader<'_>) -> Result<ProfileInfo> {
    let rows = reader.read_varint()?;
    let blocks = reader.read_varint()?;
    let bytes = reader.read_varint()?;
    let applied_limit = reader.read_u8()? != 0;
    let rows_before_limit = reader.read_varint()?;
    let calculated_rows_before_limit = reader.read_u8()? != 0;
    Ok(ProfileInfo {
        rows,
        blocks,
        bytes,
        applied_limit,
        rows_before_limit,
        calculated_rows_before_limit,
    })
}
