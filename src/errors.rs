use std::str::Utf8Error;
use std::{borrow::Cow, io, result};

use thiserror::Error;
use url::ParseError;

use crate::types::SqlType;

/// Single server-side exception.
/// The server may chain several of them, outermost first.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[error("{} {} {}", name, code, message)]
pub struct Exception {
    pub code: u32,
    pub name: String,
    pub message: String,
    pub trace: String,
}

/// This type represents a ClickHouse server error.
/// The boxed slice keeps the nested exception chain, outermost first.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
#[error("Server exception {}", _0[0])]
pub struct ServerError(pub Box<[Exception]>);

/// This type enumerates configuration URL errors.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum UrlError {
    #[error("Connection URL parameter `{}' requires feature `{}'", param, feature)]
    FeatureRequired { feature: String, param: String },

    #[error("Invalid or incomplete connection URL")]
    Invalid,

    #[error("Invalid value `{}' for connection URL parameter `{}'.", value, param)]
    InvalidParamValue { param: String, value: String },

    #[error("URL parse error: {}", _0)]
    Parse(#[source] ParseError),

    #[error("Unknown connection URL parameter `{}'.", param)]
    UnknownParameter { param: String },

    #[error("Unsupported connection URL scheme `{}'.", scheme)]
    UnsupportedScheme { scheme: String },
}

/// This type enumerates driver own errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DriverError {
    #[error("Connection to the server is closed.")]
    ConnectionClosed,

    #[error("Connection timeout.")]
    ConnectTimeout,

    #[error("Read timeout. No data received from server.")]
    ReadTimeout,

    #[error("Query timeout.")]
    QueryTimeout,

    #[error("Connection is not ready. Other operation in progress.")]
    ConnectionNotReady,

    #[error("Unexpected packet {} in current connection state.", _0)]
    UnexpectedPacket(u64),

    #[error("Unknown packet {}.", _0)]
    UnknownPacket(u64),

    #[error("Unsupported packet {}.", _0)]
    UnsupportedPacket(u64),

    #[error("Packet is not complete.")]
    IncompleteWireFormat,

    #[error("Malformed packet data.")]
    BrokenData,

    #[error("String too long.")]
    StringTooLong,

    #[error("Block row count {} exceed the limit.", _0)]
    RowCountTooMany(u64),
}

/// This type enumerates data conversion errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConversionError {
    #[error("Conversion unsupported")]
    UnsupportedConversion,
    #[error("column data does not match column type '{}'", _0)]
    TypeMismatch(SqlType),
    #[error("column fragments of '{}' and '{}' cannot be merged", _0, _1)]
    MergeMismatch(String, String),
    #[error("string value '{}' doesn't match enum value", _0)]
    EnumMismatch(String),
    #[error("enum value {} is not present in enum index", _0)]
    EnumValueMissing(i16),
    #[error("Unknown column type '{}'", _0)]
    UnknownColumnType(String),
    #[error("Incorrect utf8 byte sequence")]
    Utf8,
}

/// Consolidation of errors
#[derive(Debug, Error)]
pub enum Error {
    #[error("Driver error: `{}'", _0)]
    Driver(#[source] Box<DriverError>),

    #[error("io error: `{}`", _0)]
    Io(#[source] io::Error),

    #[error("Server error: `{}'", _0)]
    Server(#[source] ServerError),

    #[error("URL error: `{}'", _0)]
    Url(#[source] UrlError),

    #[error("Conversion error: `{}`", _0)]
    Conversion(#[source] ConversionError),

    #[error("Other error: `{}`", _0)]
    Other(Cow<'static, str>),
}

impl Error {
    /// True for any of the three deadline errors.
    /// All of them leave the connection closed.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Driver(berr) if matches!(
                **berr,
                DriverError::ConnectTimeout
                    | DriverError::ReadTimeout
                    | DriverError::QueryTimeout
            )
        )
    }

    pub fn is_server_exception(&self) -> bool {
        matches!(self, Error::Server(_))
    }

    /// Internal decoder marker. A frame is buffered only partially,
    /// the caller has to wait for more bytes and retry.
    pub(crate) fn is_incomplete(&self) -> bool {
        matches!(
            self,
            Error::Driver(berr) if **berr == DriverError::IncompleteWireFormat
        )
    }
}

pub type Result<T> = result::Result<T, Error>;

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(error) => error,
            e => io::Error::new(io::ErrorKind::Other, e.to_string()),
        }
    }
}

impl From<ParseError> for UrlError {
    fn from(err: ParseError) -> Self {
        UrlError::Parse(err)
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Url(err.into())
    }
}

impl From<Utf8Error> for Error {
    fn from(_err: Utf8Error) -> Self {
        Error::Conversion(ConversionError::Utf8)
    }
}

impl From<DriverError> for Error {
    fn from(err: DriverError) -> Self {
        Error::Driver(Box::new(err))
    }
}

impl From<ServerError> for Error {
    fn from(err: ServerError) -> Self {
        Error::Server(err)
    }
}

impl From<UrlError> for Error {
    fn from(err: UrlError) -> Self {
        Error::Url(err)
    }
}

impl From<ConversionError> for Error {
    fn from(err: ConversionError) -> Self {
        Error::Conversion(err)
    }
}

impl From<&'static str> for Error {
    fn from(err: &'static str) -> Self {
        Error::Other(Cow::Borrowed(err))
    }
}
