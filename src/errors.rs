// SPDX-License-Identifier: BSD-3-Clause-LBNL
//! Common `Error` and `Result` types used throughout the library and application. Serves as a reference for all that can go wrong.
//!
//! PDU decoding itself never fails at this level: malformed PDUs are reported inside the
//! decode result (see [`crate::rsi::codec::DecodeError`]).
use crate::config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("usage error: {0}")]
    Usage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid hex input: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, Error>;
