//! Connection state machine.
//!
//! The machine consumes outbound commands and decoded inbound frames and
//! is the only place protocol state lives. Transitions are total: every
//! frame in every state is either acted upon, ignored, or a protocol
//! error that closes the connection. Server exceptions are the one
//! non-fatal inbound failure, they return the machine to `Ready`.
use std::mem;

use bytes::BytesMut;

use super::block::{Block, Column, QueryResult};
use super::command;
use super::packet::{Packet, ServerInfo};
use crate::errors::{ConversionError, DriverError, Result};
use crate::options::Options;

/// Outbound command, valid only in `Ready` except `Connect`
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Query(String),
    Execute(String),
    Insert {
        table: String,
        columns: Vec<Column>,
    },
    Ping,
}

/// Terminal emission handed to the correlator. Intermediate progress and
/// profile frames never produce one.
#[derive(Debug)]
pub(crate) enum Emission {
    ServerInfo(ServerInfo),
    Result(QueryResult),
    Executed,
    Pong,
}

/// What a transition asks the connection to do
#[derive(Debug, Default)]
pub(crate) struct Effect {
    /// complete the oldest waiter
    pub(crate) reply: Option<Result<Emission>>,
    /// bytes to put on the socket
    pub(crate) write: Option<BytesMut>,
    /// fatal, tear the connection down
    pub(crate) close: bool,
}

impl Effect {
    fn none() -> Effect {
        Effect::default()
    }

    fn reply(reply: Result<Emission>) -> Effect {
        Effect {
            reply: Some(reply),
            ..Effect::default()
        }
    }

    fn fatal(err: crate::errors::Error) -> Effect {
        Effect {
            reply: Some(Err(err)),
            write: None,
            close: true,
        }
    }
}

#[derive(Debug)]
enum ConnState {
    NotConnected,
    Connecting,
    Ready,
    AwaitingQueryResult { blocks: Vec<Block> },
    AwaitingEndOfStream { result: Result<QueryResult> },
    AwaitingInsertHeader { columns: Vec<Column> },
    AwaitingConfirmation,
    AwaitingPong,
    Closed,
}

pub(crate) struct StateMachine {
    state: ConnState,
    revision: u64,
    options: Options,
}

impl StateMachine {
    pub(crate) fn new(options: Options) -> StateMachine {
        StateMachine {
            state: ConnState::NotConnected,
            revision: crate::REVISION,
            options,
        }
    }

    /// Revision both sides honor, `min(ours, server)` after the handshake
    #[inline]
    pub(crate) fn revision(&self) -> u64 {
        self.revision
    }

    #[inline]
    pub(crate) fn is_ready(&self) -> bool {
        matches!(self.state, ConnState::Ready)
    }

    #[inline]
    pub(crate) fn close(&mut self) {
        self.state = ConnState::Closed;
    }

    /// Encode an outbound command and transition, or reject it without
    /// touching the wire.
    pub(crate) fn on_command(&mut self, command: Command) -> Result<BytesMut> {
        if matches!(self.state, ConnState::Closed) {
            return Err(DriverError::ConnectionClosed.into());
        }
        match command {
            Command::Connect => {
                if !matches!(self.state, ConnState::NotConnected) {
                    return Err(DriverError::ConnectionNotReady.into());
                }
                let mut buf = BytesMut::with_capacity(256);
                command::write_hello(&mut buf, &self.options);
                self.state = ConnState::Connecting;
                Ok(buf)
            }
            command => {
                if !self.is_ready() {
                    return Err(DriverError::ConnectionNotReady.into());
                }
                let mut buf = BytesMut::with_capacity(512);
                self.state = match command {
                    Command::Query(sql) => {
                        command::write_query(&mut buf, self.revision, &sql);
                        ConnState::AwaitingQueryResult { blocks: Vec::new() }
                    }
                    Command::Execute(sql) => {
                        command::write_query(&mut buf, self.revision, &sql);
                        ConnState::AwaitingConfirmation
                    }
                    Command::Insert { table, columns } => {
                        let sql = command::insert_statement(&table, &columns);
                        command::write_query(&mut buf, self.revision, &sql);
                        ConnState::AwaitingInsertHeader { columns }
                    }
                    Command::Ping => {
                        command::write_ping(&mut buf);
                        ConnState::AwaitingPong
                    }
                    Command::Connect => unreachable!("handled above"),
                };
                Ok(buf)
            }
        }
    }

    /// Feed one decoded frame through the transition table.
    pub(crate) fn on_packet(&mut self, packet: Packet) -> Effect {
        if matches!(self.state, ConnState::Closed) {
            // closed connections drop all frames silently
            return Effect::none();
        }
        let packet = match packet {
            Packet::Exception(err) => {
                // the connection survives server-side query errors
                self.state = ConnState::Ready;
                return Effect::reply(Err(err.into()));
            }
            other => other,
        };

        let state = mem::replace(&mut self.state, ConnState::Closed);
        match (state, packet) {
            (ConnState::Connecting, Packet::Hello(info)) => {
                self.revision = info.revision.min(crate::REVISION);
                self.state = ConnState::Ready;
                Effect::reply(Ok(Emission::ServerInfo(info)))
            }

            (ConnState::AwaitingQueryResult { mut blocks }, Packet::Data(block)) => {
                if block.column_count() == 0 {
                    // the empty block closes the data stream, only
                    // end-of-stream may follow
                    let result = QueryResult::from_blocks(blocks);
                    self.state = ConnState::AwaitingEndOfStream { result };
                } else {
                    blocks.push(block);
                    self.state = ConnState::AwaitingQueryResult { blocks };
                }
                Effect::none()
            }
            (
                state @ ConnState::AwaitingQueryResult { .. },
                Packet::Progress(_) | Packet::ProfileInfo(_),
            ) => {
                self.state = state;
                Effect::none()
            }

            (ConnState::AwaitingEndOfStream { result }, Packet::EndOfStream) => {
                self.state = ConnState::Ready;
                Effect::reply(result.map(Emission::Result))
            }
            (
                state @ ConnState::AwaitingEndOfStream { .. },
                Packet::Progress(_) | Packet::ProfileInfo(_),
            ) => {
                self.state = state;
                Effect::none()
            }

            (
                state @ ConnState::AwaitingInsertHeader { .. },
                Packet::Progress(_) | Packet::ProfileInfo(_),
            ) => {
                self.state = state;
                Effect::none()
            }
            (ConnState::AwaitingInsertHeader { columns }, Packet::Data(header)) => {
                match self.prepare_insert(&header, columns) {
                    Ok(buf) => {
                        self.state = ConnState::AwaitingConfirmation;
                        Effect {
                            reply: None,
                            write: Some(buf),
                            close: false,
                        }
                    }
                    // the server already awaits data, there is no way
                    // to back out of the statement
                    Err(err) => Effect::fatal(err),
                }
            }

            (
                ConnState::AwaitingConfirmation,
                Packet::Progress(_) | Packet::ProfileInfo(_) | Packet::Data(_),
            ) => {
                self.state = ConnState::AwaitingConfirmation;
                Effect::none()
            }
            (ConnState::AwaitingConfirmation, Packet::EndOfStream) => {
                self.state = ConnState::Ready;
                Effect::reply(Ok(Emission::Executed))
            }

            (ConnState::AwaitingPong, Packet::Pong) => {
                self.state = ConnState::Ready;
                Effect::reply(Ok(Emission::Pong))
            }

            (_, packet) => Effect::fatal(DriverError::UnexpectedPacket(packet.code()).into()),
        }
    }

    /// The received header block carries the target schema with zero
    /// rows. Validate the user columns against it, attach the declared
    /// descriptors and serialize the data plus the end-of-data marker.
    fn prepare_insert(&self, header: &Block, mut columns: Vec<Column>) -> Result<BytesMut> {
        if header.column_count() != columns.len() {
            return Err(DriverError::BrokenData.into());
        }
        let rows = columns.first().map_or(0, |c| c.len());
        if rows > crate::MAX_BLOCK_SIZE {
            return Err(DriverError::RowCountTooMany(rows as u64).into());
        }

        for (declared, column) in header.columns().iter().zip(columns.iter_mut()) {
            let sql_type = declared
                .sql_type()
                .ok_or(ConversionError::UnsupportedConversion)?;
            if declared.name() != column.name() || !column.data.is_compatible(sql_type) {
                return Err(ConversionError::UnsupportedConversion.into());
            }
            column.sql_type = Some(sql_type.clone());
        }

        let block = Block::from_columns(String::new(), columns);
        let mut buf = BytesMut::with_capacity(4 * 1024);
        command::write_insert_data(&mut buf, self.revision, &block)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::errors::{Error, Exception, ServerError};
    use crate::protocol::column::ColumnData;
    use crate::types::SqlType;

    fn machine_in_ready() -> StateMachine {
        let mut machine = StateMachine::new(Options::default());
        machine.on_command(Command::Connect).unwrap();
        let effect = machine.on_packet(Packet::Hello(server_info(54441)));
        assert!(matches!(effect.reply, Some(Ok(Emission::ServerInfo(_)))));
        machine
    }

    fn server_info(revision: u64) -> ServerInfo {
        ServerInfo {
            name: "ClickHouse".into(),
            version_major: 21,
            version_minor: 8,
            revision,
            timezone: Some(chrono_tz::UTC),
        }
    }

    fn server_exception() -> Packet {
        Packet::Exception(ServerError(Box::new([Exception {
            code: 62,
            name: "DB::Exception".into(),
            message: "DB::Exception: Syntax error: failed at position 1".into(),
            trace: String::new(),
        }])))
    }

    fn data_block(values: Vec<u64>) -> Packet {
        let rows = values.len() as u64;
        let mut column = Column::new("x", values);
        column.sql_type = Some(SqlType::UInt64);
        let mut block = Block::from_columns(String::new(), vec![column]);
        block.rows = rows;
        Packet::Data(block)
    }

    fn empty_block() -> Packet {
        Packet::Data(Block::default())
    }

    #[test]
    fn test_handshake_takes_min_revision() {
        let mut machine = StateMachine::new(Options::default());
        machine.on_command(Command::Connect).unwrap();
        machine.on_packet(Packet::Hello(server_info(54441)));
        assert_eq!(machine.revision(), crate::REVISION);
        assert!(machine.is_ready());

        let mut machine = StateMachine::new(Options::default());
        machine.on_command(Command::Connect).unwrap();
        machine.on_packet(Packet::Hello(server_info(54059)));
        assert_eq!(machine.revision(), 54059);
    }

    #[test]
    fn test_query_lifecycle() {
        let mut machine = machine_in_ready();
        let frame = machine.on_command(Command::Query("SELECT x".into())).unwrap();
        assert!(!frame.is_empty());

        // progress and profile frames stay internal
        assert!(machine
            .on_packet(Packet::Progress(Default::default()))
            .reply
            .is_none());
        assert!(machine.on_packet(data_block(vec![])).reply.is_none());
        assert!(machine.on_packet(data_block(vec![1, 2])).reply.is_none());
        assert!(machine
            .on_packet(Packet::ProfileInfo(Default::default()))
            .reply
            .is_none());
        assert!(machine.on_packet(data_block(vec![3])).reply.is_none());
        assert!(machine.on_packet(empty_block()).reply.is_none());

        let effect = machine.on_packet(Packet::EndOfStream);
        match effect.reply {
            Some(Ok(Emission::Result(result))) => {
                assert_eq!(result.row_count(), 3);
                assert_eq!(result.columns()[0].data().as_u64().unwrap(), &[1, 2, 3]);
            }
            other => panic!("unexpected effect reply {:?}", other),
        }
        assert!(machine.is_ready());
    }

    #[test]
    fn test_second_command_rejected_while_busy() {
        let mut machine = machine_in_ready();
        machine.on_command(Command::Ping).unwrap();
        let err = machine.on_command(Command::Query("SELECT 1".into())).unwrap_err();
        assert!(matches!(
            err,
            Error::Driver(e) if *e == DriverError::ConnectionNotReady
        ));
        // the outstanding ping still completes
        let effect = machine.on_packet(Packet::Pong);
        assert!(matches!(effect.reply, Some(Ok(Emission::Pong))));
    }

    #[test]
    fn test_exception_returns_to_ready() {
        let mut machine = machine_in_ready();
        machine.on_command(Command::Execute("something wrong".into())).unwrap();
        let effect = machine.on_packet(server_exception());
        match effect.reply {
            Some(Err(Error::Server(err))) => {
                assert_eq!(err.0[0].name, "DB::Exception");
            }
            other => panic!("unexpected effect reply {:?}", other),
        }
        assert!(!effect.close);
        assert!(machine.is_ready());
        // the connection survives and can ping
        machine.on_command(Command::Ping).unwrap();
        let effect = machine.on_packet(Packet::Pong);
        assert!(matches!(effect.reply, Some(Ok(Emission::Pong))));
    }

    #[test]
    fn test_command_lifecycle_ignores_interleaved_frames() {
        let mut machine = machine_in_ready();
        machine.on_command(Command::Execute("CREATE TABLE t(x Int64)".into())).unwrap();
        assert!(machine.on_packet(Packet::Progress(Default::default())).reply.is_none());
        assert!(machine.on_packet(empty_block()).reply.is_none());
        let effect = machine.on_packet(Packet::EndOfStream);
        assert!(matches!(effect.reply, Some(Ok(Emission::Executed))));
    }

    #[test]
    fn test_insert_round_trip() {
        let mut machine = machine_in_ready();
        machine
            .on_command(Command::Insert {
                table: "t".into(),
                columns: vec![Column::new("x", vec![1u64, 2, 3])],
            })
            .unwrap();

        // server answers with the schema block, zero rows
        let mut declared = Column::new("x", Vec::<u64>::new());
        declared.sql_type = Some(SqlType::UInt64);
        let header = Block::from_columns(String::new(), vec![declared]);
        let effect = machine.on_packet(Packet::Data(header));
        assert!(effect.reply.is_none());
        let written = effect.write.expect("insert data frame");
        // data block and the end-of-data marker
        assert!(written.len() > 12);
        assert_eq!(
            &written[written.len() - 12..],
            &[0x02, 0x00, 0x01, 0x00, 0x02, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00]
        );

        let effect = machine.on_packet(Packet::EndOfStream);
        assert!(matches!(effect.reply, Some(Ok(Emission::Executed))));
        assert!(machine.is_ready());
    }

    #[test]
    fn test_insert_schema_mismatch_is_fatal() {
        let mut machine = machine_in_ready();
        machine
            .on_command(Command::Insert {
                table: "t".into(),
                columns: vec![Column::new("wrong_name", vec![1u64])],
            })
            .unwrap();

        let mut declared = Column::new("x", Vec::<u64>::new());
        declared.sql_type = Some(SqlType::UInt64);
        let header = Block::from_columns(String::new(), vec![declared]);
        let effect = machine.on_packet(Packet::Data(header));
        assert!(effect.close);
        assert!(matches!(effect.reply, Some(Err(_))));
    }

    #[test]
    fn test_unexpected_frame_closes() {
        let mut machine = machine_in_ready();
        let effect = machine.on_packet(data_block(vec![1]));
        assert!(effect.close);
        assert!(matches!(
            effect.reply,
            Some(Err(Error::Driver(e))) if *e == DriverError::UnexpectedPacket(1)
        ));
    }

    #[test]
    fn test_closed_drops_frames() {
        let mut machine = machine_in_ready();
        machine.close();
        let effect = machine.on_packet(Packet::Pong);
        assert!(effect.reply.is_none());
        assert!(!effect.close);
        let err = machine.on_command(Command::Ping).unwrap_err();
        assert!(matches!(
            err,
            Error::Driver(e) if *e == DriverError::ConnectionClosed
        ));
    }

    #[test]
    fn test_merge_error_delivered_at_end_of_stream() {
        let mut machine = machine_in_ready();
        machine.on_command(Command::Query("SELECT x".into())).unwrap();
        machine.on_packet(data_block(vec![]));
        machine.on_packet(data_block(vec![1]));
        // a block with a different element type in the same position
        let mut odd = Column::new("x", vec![1i32]);
        odd.sql_type = Some(SqlType::Int32);
        let mut block = Block::from_columns(String::new(), vec![odd]);
        block.rows = 1;
        machine.on_packet(Packet::Data(block));
        assert!(machine.on_packet(empty_block()).reply.is_none());

        let effect = machine.on_packet(Packet::EndOfStream);
        assert!(matches!(effect.reply, Some(Err(Error::Conversion(_)))));
        assert!(!effect.close);
        assert!(machine.is_ready());
    }
}
