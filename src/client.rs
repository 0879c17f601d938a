//! Connection facade.
//!
//! One `Connection` owns one socket. All reads, writes, state
//! transitions and waiter completions run on a single task; the public
//! methods hand a command plus a oneshot waiter to that task and await
//! the outcome under a deadline. The protocol allows one outstanding
//! request at a time, a second command issued before the first returns
//! fails with `ConnectionNotReady` while the connection stays usable.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use futures::TryFutureExt;
use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time;

use crate::correlator::{Correlator, Waiter};
use crate::errors::{DriverError, Error, Result};
use crate::options::Options;
use crate::protocol::block::Column;
pub use crate::protocol::block::QueryResult;
use crate::protocol::decoder;
use crate::protocol::packet::ServerInfo;
use crate::protocol::state::{Command, Emission, StateMachine};

pub trait AsyncReadWrite: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncReadWrite for T {}

const DEFAULT_READ_BUF_SIZE: usize = 8 * 1024;

enum Request {
    Call { command: Command, waiter: Waiter },
    Shutdown,
}

/// An established client connection.
///
/// Construction succeeds only after the protocol handshake. The
/// connection closes exactly once, either through [`Connection::close`],
/// a deadline, or a fatal transport error; afterwards every operation
/// fails with `ConnectionClosed`.
pub struct Connection {
    sender: mpsc::UnboundedSender<Request>,
    closed: Arc<AtomicBool>,
    info: ServerInfo,
    options: Options,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("server", &self.info.name)
            .field("revision", &self.info.revision)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    /// Open a socket, run the handshake and return a ready connection.
    ///
    /// The TCP connect is bounded by `connect_timeout`; with a TLS
    /// configuration present the TLS handshake runs before the first
    /// protocol byte.
    pub async fn connect(options: Options) -> Result<Connection> {
        let endpoint = options.endpoint();
        let socket = time::timeout(options.connect_timeout, TcpStream::connect(&endpoint))
            .map_ok_or_else(
                |_elapsed| Err(DriverError::ConnectTimeout.into()),
                |connect| connect.map_err(Error::from),
            )
            .await?;
        socket.set_nodelay(true)?;
        info!("connection established to: {}", endpoint);

        let stream = wrap_stream(socket, &options).await?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        tokio::spawn(io_loop(
            stream,
            receiver,
            StateMachine::new(options.clone()),
            options.read_timeout,
            Arc::clone(&closed),
        ));

        // the handshake runs through the same pipeline as every other
        // exchange
        let reply = call(&sender, &closed, Command::Connect, options.connect_timeout).await?;
        let info = match reply {
            Emission::ServerInfo(info) => info,
            _ => return Err(Error::Other("handshake yielded no server info".into())),
        };
        debug!(
            "handshake complete: {} revision {}",
            info.name, info.revision
        );

        Ok(Connection {
            sender,
            closed,
            info,
            options,
        })
    }

    /// Name, version and timezone the server announced
    #[inline]
    pub fn server_info(&self) -> &ServerInfo {
        &self.info
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed) || self.sender.is_closed()
    }

    /// Ping-pong connection verification
    pub async fn ping(&mut self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.unwrap_or_else(|| self.options.ping_deadline());
        match self.call(Command::Ping, deadline).await? {
            Emission::Pong => Ok(()),
            other => Err(unexpected_reply(other)),
        }
    }

    /// Execute a SELECT-like statement and collect its result rows
    pub async fn query(
        &mut self,
        sql: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<QueryResult> {
        let deadline = timeout.unwrap_or(self.options.query_timeout);
        match self.call(Command::Query(sql.into()), deadline).await? {
            Emission::Result(result) => Ok(result),
            other => Err(unexpected_reply(other)),
        }
    }

    /// Execute a statement that returns no rows (DDL, SET, USE ...)
    pub async fn command(
        &mut self,
        sql: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let deadline = timeout.unwrap_or(self.options.query_timeout);
        match self.call(Command::Execute(sql.into()), deadline).await? {
            Emission::Executed => Ok(()),
            other => Err(unexpected_reply(other)),
        }
    }

    /// Insert a columnar batch.
    ///
    /// Column names must match the table schema in insertion order; the
    /// declared element types are taken from the server, not guessed
    /// from the data.
    pub async fn insert(
        &mut self,
        table: impl Into<String>,
        columns: Vec<Column>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let rows = columns.first().map_or(0, Column::len);
        if columns.iter().any(|c| c.len() != rows) {
            return Err(DriverError::BrokenData.into());
        }
        if columns.iter().any(|c| c.name().is_empty()) {
            return Err(DriverError::BrokenData.into());
        }

        let deadline = timeout.unwrap_or(self.options.query_timeout);
        let command = Command::Insert {
            table: table.into(),
            columns,
        };
        match self.call(command, deadline).await? {
            Emission::Executed => Ok(()),
            other => Err(unexpected_reply(other)),
        }
    }

    /// Close the connection. Outstanding waiters fail with a transport
    /// error.
    pub async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::Relaxed);
        let _ = self.sender.send(Request::Shutdown);
        Ok(())
    }

    async fn call(&self, command: Command, deadline: Duration) -> Result<Emission> {
        call(&self.sender, &self.closed, command, deadline).await
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.sender.send(Request::Shutdown);
    }
}

fn unexpected_reply(emission: Emission) -> Error {
    warn!("mismatched terminal emission: {:?}", emission);
    Error::Other("mismatched terminal emission".into())
}

/// Hand a command to the connection task and await its outcome.
///
/// A fired deadline closes the whole channel: this protocol subset has
/// no targeted cancellation, so the socket goes down with the request.
async fn call(
    sender: &mpsc::UnboundedSender<Request>,
    closed: &Arc<AtomicBool>,
    command: Command,
    deadline: Duration,
) -> Result<Emission> {
    if closed.load(Ordering::Relaxed) {
        return Err(DriverError::ConnectionClosed.into());
    }
    let (waiter, outcome) = oneshot::channel();
    sender
        .send(Request::Call { command, waiter })
        .map_err(|_| DriverError::ConnectionClosed)?;

    match time::timeout(deadline, outcome).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_recv)) => Err(DriverError::ConnectionClosed.into()),
        Err(_elapsed) => {
            closed.store(true, Ordering::Relaxed);
            let _ = sender.send(Request::Shutdown);
            Err(DriverError::QueryTimeout.into())
        }
    }
}

#[cfg(feature = "tls")]
async fn wrap_stream(socket: TcpStream, options: &Options) -> Result<Box<dyn AsyncReadWrite>> {
    use std::convert::TryFrom;
    use tokio_rustls::rustls::ServerName;
    use tokio_rustls::TlsConnector;

    let tls = match &options.tls {
        Some(tls) => tls,
        None => return Ok(Box::new(socket)),
    };
    let name = tls
        .server_name
        .clone()
        .unwrap_or_else(|| options.hostname.clone());
    let server_name = ServerName::try_from(name.as_str())
        .map_err(|_| Error::Other("invalid TLS server name".into()))?;
    let connector = TlsConnector::from(Arc::clone(&tls.config));
    let stream = connector.connect(server_name, socket).await?;
    debug!("TLS handshake complete");
    Ok(Box::new(stream))
}

#[cfg(not(feature = "tls"))]
async fn wrap_stream(socket: TcpStream, _options: &Options) -> Result<Box<dyn AsyncReadWrite>> {
    Ok(Box::new(socket))
}

/// The per-connection event loop.
///
/// Everything that touches the socket or the protocol state happens
/// here, loop-confined, so no locks guard the buffers. The loop ends on
/// shutdown, transport failure, a fatal protocol error, or a read-idle
/// timeout outside `Ready`; whatever the cause, every waiter the
/// correlator still holds is failed before the task exits.
async fn io_loop(
    mut stream: Box<dyn AsyncReadWrite>,
    mut requests: mpsc::UnboundedReceiver<Request>,
    mut machine: StateMachine,
    read_timeout: Duration,
    closed: Arc<AtomicBool>,
) {
    let mut correlator = Correlator::new();
    let mut buf = BytesMut::with_capacity(DEFAULT_READ_BUF_SIZE);

    let failure: DriverError = 'conn: loop {
        let idle = time::sleep(read_timeout);
        tokio::pin!(idle);

        tokio::select! {
            request = requests.recv() => match request {
                None | Some(Request::Shutdown) => break 'conn DriverError::ConnectionClosed,
                Some(Request::Call { command, waiter }) => {
                    match machine.on_command(command) {
                        Ok(frame) => {
                            correlator.push(waiter);
                            if let Err(err) = stream.write_all(&frame).await {
                                warn!("write failed: {}", err);
                                break 'conn DriverError::ConnectionClosed;
                            }
                        }
                        // rejected before anything went out, the
                        // connection stays usable
                        Err(err) => {
                            let _ = waiter.send(Err(err));
                        }
                    }
                }
            },
            read = stream.read_buf(&mut buf) => match read {
                Ok(0) => {
                    if !buf.is_empty() {
                        // the server may leave debris behind a rejected
                        // query, discard it and signal end-of-input
                        debug!("discarding {} unread bytes at stream close", buf.len());
                        buf.clear();
                    }
                    break 'conn DriverError::ConnectionClosed;
                }
                Ok(_) => {
                    if let Err(failure) =
                        drain_packets(&mut stream, &mut buf, &mut machine, &mut correlator).await
                    {
                        break 'conn failure;
                    }
                }
                Err(err) => {
                    warn!("read failed: {}", err);
                    break 'conn DriverError::ConnectionClosed;
                }
            },
            _ = &mut idle => {
                if machine.is_ready() {
                    // an idle Ready connection is healthy, keep waiting
                    continue;
                }
                warn!("no data from server for {:?} mid-exchange", read_timeout);
                break 'conn DriverError::ReadTimeout;
            }
        }
    };

    machine.close();
    if correlator.len() > 0 {
        debug!("failing {} outstanding waiters: {}", correlator.len(), failure);
    }
    correlator.fail_all(failure);
    closed.store(true, Ordering::Relaxed);
    debug!("connection task finished");
}

/// Decode every whole frame the buffer holds and apply it.
async fn drain_packets(
    stream: &mut Box<dyn AsyncReadWrite>,
    buf: &mut BytesMut,
    machine: &mut StateMachine,
    correlator: &mut Correlator,
) -> std::result::Result<(), DriverError> {
    loop {
        let packet = match decoder::next_packet(buf, machine.revision()) {
            Ok(Some(packet)) => packet,
            Ok(None) => return Ok(()),
            Err(err) => {
                warn!("protocol failure: {}", err);
                // the outstanding waiter learns the real cause, everyone
                // behind it gets the transport error
                correlator.complete(Err(err));
                return Err(DriverError::ConnectionClosed);
            }
        };

        let effect = machine.on_packet(packet);
        if let Some(frame) = effect.write {
            if let Err(err) = stream.write_all(&frame).await {
                warn!("write failed: {}", err);
                return Err(DriverError::ConnectionClosed);
            }
        }
        if let Some(reply) = effect.reply {
            if !correlator.complete(reply) {
                warn!("terminal emission with no outstanding request");
                return Err(DriverError::ConnectionClosed);
            }
        }
        if effect.close {
            return Err(DriverError::ConnectionClosed);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::errors::Error;
    use crate::protocol::code::*;
    use crate::protocol::column::ColumnData;
    use crate::protocol::encoder::WriteAware;
    use bytes::BufMut;
    use tokio::net::TcpListener;

    fn hello_frame() -> BytesMut {
        let mut frame = BytesMut::new();
        frame.write_varint(SERVER_HELLO);
        frame.write_str("MockHouse");
        frame.write_varint(21);
        frame.write_varint(8);
        frame.write_varint(54441);
        frame.write_str("UTC");
        frame
    }

    fn pong_frame() -> BytesMut {
        let mut frame = BytesMut::new();
        frame.write_varint(SERVER_PONG);
        frame
    }

    fn end_of_stream_frame() -> BytesMut {
        let mut frame = BytesMut::new();
        frame.write_varint(SERVER_END_OF_STREAM);
        frame
    }

    fn exception_frame() -> BytesMut {
        let mut frame = BytesMut::new();
        frame.write_varint(SERVER_EXCEPTION);
        frame.put_u32_le(62);
        frame.write_str("DB::Exception");
        frame.write_str("DB::Exception: Syntax error: failed at position 1");
        frame.write_str("");
        frame.put_u8(0);
        frame
    }

    /// Server data frame with one UInt64 column, zero rows marks the
    /// schema block
    fn data_frame(name: &str, values: &[u64]) -> BytesMut {
        let mut frame = BytesMut::new();
        frame.write_varint(SERVER_DATA);
        frame.write_str("");
        frame.write_varint(1);
        frame.put_u8(0);
        frame.write_varint(2);
        frame.put_i32_le(-1);
        frame.write_varint(0);
        frame.write_varint(1);
        frame.write_varint(values.len() as u64);
        frame.write_str(name);
        frame.write_str("UInt64");
        ColumnData::from(values.to_vec())
            .write(&crate::types::SqlType::UInt64, &mut frame)
            .unwrap();
        frame
    }

    /// The truly empty block (no columns, no rows) that terminates a
    /// result stream
    fn terminal_data_frame() -> BytesMut {
        let mut frame = BytesMut::new();
        frame.write_varint(SERVER_DATA);
        frame.write_str("");
        frame.write_varint(1);
        frame.put_u8(0);
        frame.write_varint(2);
        frame.put_i32_le(-1);
        frame.write_varint(0);
        frame.write_varint(0);
        frame.write_varint(0);
        frame
    }

    async fn read_some(socket: &mut TcpStream) -> usize {
        let mut sink = [0u8; 4096];
        socket.read(&mut sink).await.unwrap()
    }

    async fn options_for(listener: &TcpListener) -> Options {
        let addr = listener.local_addr().unwrap();
        Options::default()
            .with_addr(addr)
            .with_read_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_handshake_and_ping() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let options = options_for(&listener).await;

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_some(&mut socket).await;
            socket.write_all(&hello_frame()).await.unwrap();
            read_some(&mut socket).await;
            socket.write_all(&pong_frame()).await.unwrap();
            socket
        });

        let mut conn = Connection::connect(options).await.unwrap();
        assert_eq!(conn.server_info().name, "MockHouse");
        assert_eq!(conn.server_info().revision, 54441);
        assert!(!conn.is_closed());

        conn.ping(None).await.unwrap();
        conn.close().await.unwrap();
        drop(server);
    }

    #[tokio::test]
    async fn test_query_collects_blocks() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let options = options_for(&listener).await;

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_some(&mut socket).await;
            socket.write_all(&hello_frame()).await.unwrap();
            read_some(&mut socket).await;
            let mut response = data_frame("x", &[]);
            response.extend_from_slice(&data_frame("x", &[1, 2]));
            response.extend_from_slice(&data_frame("x", &[3]));
            response.extend_from_slice(&terminal_data_frame());
            response.extend_from_slice(&end_of_stream_frame());
            socket.write_all(&response).await.unwrap();
            socket
        });

        let mut conn = Connection::connect(options).await.unwrap();
        let result = conn.query("SELECT x FROM t", None).await.unwrap();
        assert_eq!(result.row_count(), 3);
        assert_eq!(result.columns()[0].data().as_u64().unwrap(), &[1, 2, 3]);
        drop(server);
    }

    #[tokio::test]
    async fn test_server_exception_keeps_connection_alive() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let options = options_for(&listener).await;

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_some(&mut socket).await;
            socket.write_all(&hello_frame()).await.unwrap();
            read_some(&mut socket).await;
            socket.write_all(&exception_frame()).await.unwrap();
            read_some(&mut socket).await;
            socket.write_all(&pong_frame()).await.unwrap();
            socket
        });

        let mut conn = Connection::connect(options).await.unwrap();
        let err = conn.command("something wrong", None).await.unwrap_err();
        match err {
            Error::Server(server_err) => {
                assert_eq!(server_err.0[0].name, "DB::Exception");
                assert!(server_err.0[0]
                    .message
                    .starts_with("DB::Exception: Syntax error: failed at position 1"));
            }
            other => panic!("unexpected error {:?}", other),
        }

        // still usable
        conn.ping(None).await.unwrap();
        assert!(!conn.is_closed());
        drop(server);
    }

    #[tokio::test]
    async fn test_query_timeout_closes_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let options = options_for(&listener).await;

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_some(&mut socket).await;
            socket.write_all(&hello_frame()).await.unwrap();
            // swallow the query, never answer
            read_some(&mut socket).await;
            tokio::time::sleep(Duration::from_secs(30)).await;
            socket
        });

        let mut conn = Connection::connect(options).await.unwrap();
        let err = conn
            .command("SELECT sleep(3)", Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(conn.is_closed());

        // every later call fails fast
        let err = conn.ping(None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Driver(e) if *e == DriverError::ConnectionClosed
        ));
        server.abort();
    }

    #[tokio::test]
    async fn test_second_command_while_busy_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let options = options_for(&listener).await;

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_some(&mut socket).await;
            socket.write_all(&hello_frame()).await.unwrap();
            read_some(&mut socket).await;
            tokio::time::sleep(Duration::from_millis(300)).await;
            socket.write_all(&pong_frame()).await.unwrap();
            socket
        });

        let conn = Connection::connect(options).await.unwrap();
        let slow = call(
            &conn.sender,
            &conn.closed,
            Command::Ping,
            Duration::from_secs(5),
        );
        let fast = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            call(
                &conn.sender,
                &conn.closed,
                Command::Query("SELECT 1".into()),
                Duration::from_secs(5),
            )
            .await
        };
        let (slow, fast) = tokio::join!(slow, fast);
        assert!(matches!(slow, Ok(Emission::Pong)));
        assert!(matches!(
            fast,
            Err(Error::Driver(e)) if *e == DriverError::ConnectionNotReady
        ));
        drop(server);
    }

    #[tokio::test]
    async fn test_server_close_fails_outstanding_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let options = options_for(&listener).await;

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_some(&mut socket).await;
            socket.write_all(&hello_frame()).await.unwrap();
            read_some(&mut socket).await;
            // half a frame, then the socket dies
            socket.write_all(&[0x03, 0x01]).await.unwrap();
        });

        let mut conn = Connection::connect(options).await.unwrap();
        let err = conn.query("SELECT 1", None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Driver(e) if *e == DriverError::ConnectionClosed
        ));
        assert!(conn.is_closed());
        drop(server);
    }
}
