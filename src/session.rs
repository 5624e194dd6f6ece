use auto_impl::auto_impl;

use crate::Opts;
use crate::collector::ResultSetCollector;
use crate::constant::CapabilityFlags;
use crate::error::{Error, Result};
use crate::prepared::{Binding, PreparedStatement};
use crate::promise::{Future, Promise};
use crate::protocol::command::prepared::{
    Prepare, PrepareState, write_close_statement, write_execute, write_reset_statement,
    write_send_long_data,
};
use crate::protocol::command::query::write_query;
use crate::protocol::command::resultset::{ResultSet, ResultSetEvent, RowFormat};
use crate::protocol::handshake::{Handshake, HandshakeResult};
use crate::protocol::packet::{
    ErrPayloadBytes, MAX_PAYLOAD_LENGTH, header_byte, split_packet, write_packets,
};
use crate::protocol::param::BindValue;
use crate::protocol::resolver::PacketResolver;
use crate::protocol::response::OkPayload;

/// Byte sink of a backend connection.
///
/// `send` receives complete framed packets. Responses come back through
/// [`BackendSession::feed`] or [`BackendSession::on_packet`].
#[auto_impl(&mut, Box)]
pub trait Transport {
    fn send(&mut self, bytes: &[u8]) -> Result<()>;
}

impl Transport for Vec<u8> {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// Outcome of `COM_STMT_EXECUTE` or `COM_QUERY`
#[derive(Debug, Clone)]
pub enum ExecuteOutcome {
    /// No result set: affected rows, last insert id
    Ok(OkPayload),
    ResultSet(ResultSetCollector),
}

enum Command {
    Prepare {
        machine: Prepare,
        promise: Promise<PreparedStatement>,
    },
    ResultSet {
        reader: ResultSet,
        promise: Promise<ExecuteOutcome>,
    },
    Reset {
        promise: Promise<()>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Prepare { .. } => "COM_STMT_PREPARE",
            Command::ResultSet { .. } => "result set command",
            Command::Reset { .. } => "COM_STMT_RESET",
        }
    }

    fn fail(self, err: Error) {
        tracing::warn!(command = self.name(), error = %err, "command failed");
        match self {
            Command::Prepare { promise, .. } => promise.try_fail(err),
            Command::ResultSet { promise, .. } => promise.try_fail(err),
            Command::Reset { promise } => promise.try_fail(err),
        };
    }
}

/// One authenticated backend connection.
///
/// Commands are strictly sequential: a new command is rejected until the
/// response of the previous one has been consumed. Every command hands back a
/// [`Future`] that is completed from `on_packet` when its last packet arrives.
pub struct BackendSession<T> {
    transport: T,
    capability_flags: CapabilityFlags,
    resolver: PacketResolver,
    command: Option<Command>,
    inbound: Vec<u8>,
    payload: Vec<u8>,
}

impl<T: Transport> BackendSession<T> {
    /// `capability_flags` must be the negotiated set; it is fixed from here on.
    pub fn new(transport: T, capability_flags: CapabilityFlags) -> Self {
        Self {
            transport,
            capability_flags,
            resolver: PacketResolver::new(capability_flags.is_deprecate_eof()),
            command: None,
            inbound: Vec::new(),
            payload: Vec::new(),
        }
    }

    pub fn capability_flags(&self) -> CapabilityFlags {
        self.capability_flags
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Whether a command is waiting for its response
    pub fn is_busy(&self) -> bool {
        self.command.is_some()
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.command {
            None => Ok(()),
            Some(Command::Prepare { .. }) => Err(Error::PrepareInFlight),
            Some(_) => Err(Error::CommandInFlight),
        }
    }

    fn send_command(&mut self, payload: &[u8]) -> Result<()> {
        let mut out = Vec::with_capacity(payload.len() + 4);
        write_packets(&mut out, 0, payload);
        self.transport.send(&out)
    }

    /// Send `COM_STMT_PREPARE`.
    ///
    /// The future completes with the statement once every parameter and
    /// column definition has arrived.
    #[tracing::instrument(skip_all)]
    pub fn prepare(&mut self, sql: &str) -> Result<Future<PreparedStatement>> {
        self.ensure_idle()?;
        let mut machine = Prepare::new();
        let mut payload = Vec::new();
        machine.start(&mut payload, sql)?;
        self.send_command(&payload)?;
        self.resolver.begin();

        let promise = Promise::pending();
        let future = promise.future();
        self.command = Some(Command::Prepare { machine, promise });
        Ok(future)
    }

    /// Buffer one chunk of long data for parameter `index` of `stmt`.
    ///
    /// Chunks are sent with the next `execute` that binds the parameter as
    /// `BindValue::LongData`.
    pub fn send_long_data(
        &mut self,
        stmt: &mut PreparedStatement,
        index: usize,
        chunk: &[u8],
    ) -> Result<()> {
        stmt.append_long_data(index, chunk)?;
        tracing::debug!(
            statement_id = stmt.id(),
            index,
            len = chunk.len(),
            "buffered long data"
        );
        Ok(())
    }

    /// Send buffered long data followed by `COM_STMT_EXECUTE`.
    #[tracing::instrument(skip_all)]
    pub fn execute(
        &mut self,
        stmt: &mut PreparedStatement,
        params: &[BindValue],
    ) -> Result<Future<ExecuteOutcome>> {
        self.ensure_idle()?;
        let Binding {
            send_types,
            long_data,
            types,
        } = stmt.bind(params)?;

        let mut out = Vec::new();
        let mut payload = Vec::new();
        for &(index, data) in &long_data {
            let param_id = u16::try_from(index).map_err(|_| Error::ParameterIndexOutOfRange {
                index,
                count: stmt.num_params(),
            })?;
            payload.clear();
            write_send_long_data(&mut payload, stmt.id(), param_id, data);
            write_packets(&mut out, 0, &payload);
        }
        let chunks = long_data.len();
        payload.clear();
        write_execute(&mut payload, stmt.id(), params, send_types);
        write_packets(&mut out, 0, &payload);
        self.transport.send(&out)?;
        stmt.commit(types);
        tracing::debug!(
            statement_id = stmt.id(),
            send_types,
            long_data = chunks,
            "sent COM_STMT_EXECUTE"
        );

        let promise = Promise::pending();
        let future = promise.future();
        self.command = Some(Command::ResultSet {
            reader: ResultSet::new(RowFormat::Binary, self.capability_flags.is_deprecate_eof()),
            promise,
        });
        Ok(future)
    }

    /// Send `COM_QUERY`; text rows are collected like binary ones.
    #[tracing::instrument(skip_all)]
    pub fn query(&mut self, sql: &str) -> Result<Future<ExecuteOutcome>> {
        self.ensure_idle()?;
        let mut payload = Vec::new();
        write_query(&mut payload, sql);
        self.send_command(&payload)?;

        let promise = Promise::pending();
        let future = promise.future();
        self.command = Some(Command::ResultSet {
            reader: ResultSet::new(RowFormat::Text, self.capability_flags.is_deprecate_eof()),
            promise,
        });
        Ok(future)
    }

    /// Send `COM_STMT_CLOSE` and drop the handle with its long data.
    ///
    /// The server does not answer.
    #[tracing::instrument(skip_all)]
    pub fn close(&mut self, stmt: PreparedStatement) -> Result<()> {
        self.ensure_idle()?;
        let mut payload = Vec::new();
        write_close_statement(&mut payload, stmt.id());
        self.send_command(&payload)?;
        tracing::debug!(statement_id = stmt.id(), "closed statement");
        Ok(())
    }

    /// Send `COM_STMT_RESET`, discarding long data on both sides.
    #[tracing::instrument(skip_all)]
    pub fn reset(&mut self, stmt: &mut PreparedStatement) -> Result<Future<()>> {
        self.ensure_idle()?;
        let mut payload = Vec::new();
        write_reset_statement(&mut payload, stmt.id());
        self.send_command(&payload)?;
        stmt.clear_long_data();

        let promise = Promise::pending();
        let future = promise.future();
        self.command = Some(Command::Reset { promise });
        Ok(future)
    }

    /// Append raw bytes from the connection and dispatch every complete packet.
    ///
    /// Payloads split over several 16 MiB packets are joined first.
    pub fn feed(&mut self, data: &[u8]) -> Result<()> {
        self.inbound.extend_from_slice(data);
        let mut consumed = 0;
        let mut result = Ok(());
        while let Some((header, chunk, _rest)) = split_packet(&self.inbound[consumed..]) {
            let length = header.length();
            self.payload.extend_from_slice(chunk);
            consumed += 4 + length;
            if length == MAX_PAYLOAD_LENGTH {
                continue;
            }
            let payload = std::mem::take(&mut self.payload);
            result = self.on_packet(&payload);
            if result.is_err() {
                break;
            }
        }
        self.inbound.drain(..consumed);
        result
    }

    /// Route one packet payload to the command in flight.
    ///
    /// Failures of the command itself are delivered through its future; an
    /// error is returned only when no command expects a packet.
    #[tracing::instrument(skip_all)]
    pub fn on_packet(&mut self, payload: &[u8]) -> Result<()> {
        let Some(command) = self.command.take() else {
            return Err(Error::NoCommandInFlight);
        };
        self.command = self.dispatch(command, payload);
        Ok(())
    }

    fn dispatch(&mut self, command: Command, payload: &[u8]) -> Option<Command> {
        match command {
            Command::Prepare {
                mut machine,
                promise,
            } => {
                let step = match self.resolver.resolve(payload) {
                    Ok(Some(packet)) => machine.transition(packet),
                    Ok(None) => Ok(machine.state()),
                    Err(err) => Err(err),
                };
                match step {
                    Ok(PrepareState::Ready) if self.resolver.is_idle() => {
                        self.finish_prepare(machine, promise);
                        None
                    }
                    Ok(_) => Some(Command::Prepare { machine, promise }),
                    Err(err) => {
                        self.resolver.reset();
                        Command::Prepare { machine, promise }.fail(err);
                        None
                    }
                }
            }

            Command::ResultSet {
                mut reader,
                promise,
            } => match reader.drive(payload) {
                Ok(ResultSetEvent::NeedPayload) => Some(Command::ResultSet { reader, promise }),
                Ok(ResultSetEvent::NoResultSet(ok)) => {
                    tracing::debug!(affected_rows = ok.affected_rows, "command finished");
                    promise.try_complete(ExecuteOutcome::Ok(ok));
                    None
                }
                Ok(ResultSetEvent::Finished { .. }) => {
                    let collector = reader.into_collector();
                    tracing::debug!(rows = collector.row_count(), "result set finished");
                    promise.try_complete(ExecuteOutcome::ResultSet(collector));
                    None
                }
                Err(err) => {
                    Command::ResultSet { reader, promise }.fail(err);
                    None
                }
            },

            Command::Reset { promise } => {
                match header_byte(payload) {
                    Ok(0x00) => {
                        promise.try_complete_unit();
                    }
                    Ok(0xFF) => Command::Reset { promise }.fail(ErrPayloadBytes(payload).into()),
                    Ok(header) => Command::Reset { promise }.fail(Error::UnexpectedPacket(
                        format!("COM_STMT_RESET response header 0x{:02X}", header),
                    )),
                    Err(err) => Command::Reset { promise }.fail(err),
                }
                None
            }
        }
    }

    fn finish_prepare(&mut self, mut machine: Prepare, promise: Promise<PreparedStatement>) {
        match machine.finish() {
            Ok(stmt) => {
                tracing::debug!(
                    statement_id = stmt.id(),
                    params = stmt.num_params(),
                    columns = stmt.num_columns(),
                    "prepared statement ready"
                );
                promise.try_complete(stmt);
            }
            Err(err) => Command::Prepare { machine, promise }.fail(err),
        }
    }

    /// The transport will deliver no further packets for the current exchange.
    ///
    /// A prepare still waiting for definitions fails with
    /// `ProtocolCountMismatch`; any other unfinished command fails as well.
    pub fn end_of_sequence(&mut self) {
        let Some(command) = self.command.take() else {
            return;
        };
        self.resolver.reset();
        match command {
            Command::Prepare {
                mut machine,
                promise,
            } => match machine.end_of_sequence() {
                Ok(()) if machine.state() == PrepareState::Ready => {
                    self.finish_prepare(machine, promise);
                }
                Ok(()) => Command::Prepare { machine, promise }.fail(Error::UnexpectedPacket(
                    "sequence ended without a prepared statement".to_string(),
                )),
                Err(err) => Command::Prepare { machine, promise }.fail(err),
            },
            command => command.fail(Error::UnexpectedPacket(
                "sequence ended before the response was complete".to_string(),
            )),
        }
    }

    /// The owning connection is going away: fail the command in flight.
    ///
    /// Statements keep their own long data; nothing else is touched.
    pub fn teardown(&mut self, reason: &str) {
        self.resolver.reset();
        self.inbound.clear();
        self.payload.clear();
        if let Some(command) = self.command.take() {
            command.fail(Error::Failed(reason.to_string()));
        }
    }
}

/// A backend connection that has not finished authenticating.
pub struct Connecting<T> {
    transport: T,
    handshake: Handshake,
    capability_flags: Option<CapabilityFlags>,
    connection_id: u32,
}

impl<T: Transport> Connecting<T> {
    pub fn new(transport: T, opts: Opts) -> Self {
        Self {
            transport,
            handshake: Handshake::new(opts),
            capability_flags: None,
            connection_id: 0,
        }
    }

    /// Feed one packet of the connection phase. Returns true once authenticated.
    #[tracing::instrument(skip_all)]
    pub fn on_packet(&mut self, sequence_id: u8, payload: &[u8]) -> Result<bool> {
        match self.handshake.drive(payload)? {
            HandshakeResult::Write(response) => {
                let mut out = Vec::with_capacity(response.len() + 4);
                write_packets(&mut out, sequence_id.wrapping_add(1), &response);
                self.transport.send(&out)?;
                Ok(false)
            }
            HandshakeResult::Connected {
                capability_flags,
                connection_id,
            } => {
                self.capability_flags = Some(capability_flags);
                self.connection_id = connection_id;
                Ok(true)
            }
        }
    }

    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    /// Switch to the command phase with the negotiated capabilities.
    pub fn into_session(self) -> Result<BackendSession<T>> {
        let capability_flags = self.capability_flags.ok_or_else(|| {
            Error::UnexpectedPacket("handshake has not finished".to_string())
        })?;
        Ok(BackendSession::new(self.transport, capability_flags))
    }
}
