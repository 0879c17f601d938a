pub use crate::{
    client::{Connection, QueryResult},
    options::Options,
    protocol::block::{Block, Column},
    protocol::column::ColumnData,
    protocol::packet::{Progress, ServerInfo},
};

#[cfg(feature = "tls")]
pub use crate::options::TlsOptions;

pub mod types {
    pub use crate::types::{parse_type, EnumIndex, SqlType};
}

pub mod errors {
    pub use crate::errors::*;
}
