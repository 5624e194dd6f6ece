//! Backend side of a MySQL proxy: capability negotiation, the prepared
//! statement exchange, and one-shot completion of every command.
//!
//! The crate performs no I/O of its own. Bytes leave through a [`Transport`]
//! and come back through [`BackendSession::feed`].

pub mod collector;
pub mod constant;
pub mod error;
mod opts;
pub mod prepared;
pub mod promise;
pub mod protocol;
pub mod session;

pub use collector::{ResultSetCollector, Rows};
pub use error::{Error, Result};
pub use opts::Opts;
pub use prepared::PreparedStatement;
pub use promise::{Future, Promise};
pub use protocol::param::BindValue;
pub use protocol::value::Value;
pub use session::{BackendSession, Connecting, ExecuteOutcome, Transport};

#[cfg(test)]
mod constant_test;
#[cfg(test)]
mod opts_test;
