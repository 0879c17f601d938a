#![allow(dead_code)]
use std::convert::TryInto;
use std::env;

use clickhouse_client::prelude::*;

pub fn db_url() -> String {
    env::var("DATABASE_URL")
        .unwrap_or_else(|_| "tcp://default:@localhost:9000?query_timeout=20s".into())
}

pub fn get_options() -> Options {
    db_url().try_into().unwrap()
}

pub async fn get_connection() -> Connection {
    let _ = env_logger::builder().is_test(true).try_init();
    Connection::connect(get_options()).await.expect("connection")
}
