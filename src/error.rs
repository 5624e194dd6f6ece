use thiserror::Error;

use crate::protocol::{packet::ErrPayloadBytes, response::ErrPayload};

/// Which kind of definition packet a count refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Parameter,
    Column,
}

impl std::fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parameter => f.write_str("parameter"),
            Self::Column => f.write_str("column"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Server Error: {0}")]
    ServerError(#[from] ErrPayload),

    #[error("Bad config error: {0}")]
    BadConfigError(String),

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Expected {declared} {kind} definitions, observed {observed}")]
    ProtocolCountMismatch {
        kind: DefinitionKind,
        declared: usize,
        observed: usize,
    },

    #[error("Unexpected packet: {0}")]
    UnexpectedPacket(String),

    #[error("Promise already completed")]
    AlreadyCompleted,

    #[error("A prepare request is already in flight for this statement")]
    PrepareInFlight,

    #[error("Another command is in flight on this session")]
    CommandInFlight,

    #[error("No command is waiting for a packet")]
    NoCommandInFlight,

    #[error("Statement is not ready")]
    StatementNotReady,

    #[error("Parameter index {index} out of range (statement has {count} parameters)")]
    ParameterIndexOutOfRange { index: usize, count: usize },

    #[error("Expected {expected} bound parameters, got {got}")]
    ParameterCountMismatch { expected: usize, got: usize },

    #[error("Column index {index} out of range (result set has {count} columns)")]
    ColumnIndexOutOfRange { index: usize, count: usize },

    #[error("{0}")]
    Failed(String),
}

impl Error {
    pub(crate) fn malformed(what: impl Into<String>) -> Self {
        Self::MalformedPacket(what.into())
    }
}

impl<'a> From<ErrPayloadBytes<'a>> for Error {
    fn from(value: ErrPayloadBytes) -> Self {
        match ErrPayload::try_from(value) {
            Ok(err_payload) => Error::ServerError(err_payload),
            Err(err) => err,
        }
    }
}

impl From<std::convert::Infallible> for Error {
    fn from(err: std::convert::Infallible) -> Self {
        match err {}
    }
}

pub type Result<T> = std::result::Result<T, Error>;
