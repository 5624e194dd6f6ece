use crate::constant::CommandByte;
use crate::error::{DefinitionKind, Error, Result};
use crate::prepared::PreparedStatement;
use crate::protocol::command::{ColumnDefinition, ParameterDefinition};
use crate::protocol::param::{BindValue, write_null_bitmap};
use crate::protocol::primitive::*;
use crate::protocol::resolver::PreparePacket;
use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// Prepared statement OK response (zero-copy)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct PrepareOk {
    statement_id: U32LE,
    num_columns: U16LE,
    num_params: U16LE,
    _reserved: u8,
    warning_count: U16LE,
}

impl PrepareOk {
    pub fn statement_id(&self) -> u32 {
        self.statement_id.get()
    }

    pub fn num_columns(&self) -> u16 {
        self.num_columns.get()
    }

    pub fn num_params(&self) -> u16 {
        self.num_params.get()
    }

    pub fn warning_count(&self) -> u16 {
        self.warning_count.get()
    }
}

/// Write COM_STMT_PREPARE command
pub fn write_prepare(out: &mut Vec<u8>, sql: &str) {
    write_int_1(out, CommandByte::StmtPrepare as u8);
    out.extend_from_slice(sql.as_bytes());
}

/// Read COM_STMT_PREPARE response
///
/// Servers may append a metadata-follows byte; it is ignored.
pub fn read_prepare_ok(payload: &[u8]) -> Result<&PrepareOk> {
    let (status, data) = read_int_1(payload)?;
    if status != 0x00 {
        return Err(Error::malformed(format!(
            "COM_STMT_PREPARE_OK header 0x{:02X}",
            status
        )));
    }
    PrepareOk::ref_from_prefix(data)
        .map(|(ok, _)| ok)
        .map_err(|_| Error::malformed("COM_STMT_PREPARE_OK shorter than 12 bytes"))
}

/// Write COM_STMT_SEND_LONG_DATA command
pub fn write_send_long_data(out: &mut Vec<u8>, statement_id: u32, param_id: u16, data: &[u8]) {
    write_int_1(out, CommandByte::StmtSendLongData as u8);
    write_int_4(out, statement_id);
    write_int_2(out, param_id);
    out.extend_from_slice(data);
}

/// Write COM_STMT_EXECUTE command
///
/// With `send_types` off the server reuses the types of the previous execution.
pub fn write_execute(out: &mut Vec<u8>, statement_id: u32, params: &[BindValue], send_types: bool) {
    write_int_1(out, CommandByte::StmtExecute as u8);
    write_int_4(out, statement_id);

    // flags (1 byte) - CURSOR_TYPE_NO_CURSOR
    write_int_1(out, 0x00);

    // iteration count (4 bytes) - always 1
    write_int_4(out, 1);

    if params.is_empty() {
        return;
    }

    write_null_bitmap(out, params);

    // new-params-bound-flag (1 byte)
    if send_types {
        write_int_1(out, 0x01);
        for param in params {
            param.encode_type(out);
        }
    } else {
        write_int_1(out, 0x00);
    }

    for param in params {
        param.encode_value(out);
    }
}

/// Write COM_STMT_CLOSE command
pub fn write_close_statement(out: &mut Vec<u8>, statement_id: u32) {
    write_int_1(out, CommandByte::StmtClose as u8);
    write_int_4(out, statement_id);
}

/// Write COM_STMT_RESET command
pub fn write_reset_statement(out: &mut Vec<u8>, statement_id: u32) {
    write_int_1(out, CommandByte::StmtReset as u8);
    write_int_4(out, statement_id);
}

// ============================================================================
// State Machine API for COM_STMT_PREPARE
// ============================================================================

/// Phase of a prepare exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareState {
    Idle,
    AwaitingPrepareAck,
    AwaitingParameterDefs,
    AwaitingColumnDefs,
    Ready,
    Failed,
}

impl PrepareState {
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            Self::AwaitingPrepareAck | Self::AwaitingParameterDefs | Self::AwaitingColumnDefs
        )
    }
}

/// Assembles a [`PreparedStatement`] from the tagged packets of a prepare exchange.
///
/// The server announces `P` parameters and `C` columns, then streams the
/// definitions with a decreasing remaining count. A definition reported with
/// `remaining` outstanding belongs at `total - remaining`.
#[derive(Debug)]
pub struct Prepare {
    state: PrepareState,
    statement_id: u32,
    warning_count: u16,
    num_params: usize,
    num_columns: usize,
    params: Vec<ParameterDefinition>,
    columns: Vec<ColumnDefinition>,
}

impl Default for Prepare {
    fn default() -> Self {
        Self::new()
    }
}

impl Prepare {
    pub fn new() -> Self {
        Self {
            state: PrepareState::Idle,
            statement_id: 0,
            warning_count: 0,
            num_params: 0,
            num_columns: 0,
            params: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub fn state(&self) -> PrepareState {
        self.state
    }

    /// Write the `COM_STMT_PREPARE` payload and wait for the acknowledgement.
    ///
    /// Only one prepare may be outstanding at a time.
    pub fn start(&mut self, out: &mut Vec<u8>, sql: &str) -> Result<()> {
        if self.state.is_in_flight() {
            return Err(Error::PrepareInFlight);
        }
        *self = Self::new();
        write_prepare(out, sql);
        self.state = PrepareState::AwaitingPrepareAck;
        Ok(())
    }

    /// Feed the next tagged packet.
    ///
    /// Any error moves the machine to `Failed` and is returned to the caller.
    pub fn transition(&mut self, packet: PreparePacket<'_>) -> Result<PrepareState> {
        match self.step(packet) {
            Ok(()) => {
                tracing::debug!(state = ?self.state, "prepare transition");
                Ok(self.state)
            }
            Err(err) => {
                self.state = PrepareState::Failed;
                Err(err)
            }
        }
    }

    /// The packet stream ended; fail if definitions are still outstanding.
    pub fn end_of_sequence(&mut self) -> Result<()> {
        let result = match self.state {
            PrepareState::AwaitingPrepareAck => Err(Error::UnexpectedPacket(
                "sequence ended before the COM_STMT_PREPARE response".to_string(),
            )),
            PrepareState::AwaitingParameterDefs => Err(self.param_mismatch(self.params.len())),
            PrepareState::AwaitingColumnDefs => Err(self.column_mismatch(self.columns.len())),
            PrepareState::Idle | PrepareState::Ready | PrepareState::Failed => Ok(()),
        };
        if result.is_err() {
            self.state = PrepareState::Failed;
        }
        result
    }

    /// Hand out the finished statement and return to `Idle`.
    pub fn finish(&mut self) -> Result<PreparedStatement> {
        if self.state != PrepareState::Ready {
            return Err(Error::StatementNotReady);
        }
        let prepare = std::mem::take(self);
        Ok(PreparedStatement::new(
            prepare.statement_id,
            prepare.warning_count,
            prepare.params,
            prepare.columns,
        ))
    }

    fn param_mismatch(&self, observed: usize) -> Error {
        Error::ProtocolCountMismatch {
            kind: DefinitionKind::Parameter,
            declared: self.num_params,
            observed,
        }
    }

    fn column_mismatch(&self, observed: usize) -> Error {
        Error::ProtocolCountMismatch {
            kind: DefinitionKind::Column,
            declared: self.num_columns,
            observed,
        }
    }

    fn after_parameters(&self) -> PrepareState {
        if self.num_columns > 0 {
            PrepareState::AwaitingColumnDefs
        } else {
            PrepareState::Ready
        }
    }

    fn step(&mut self, packet: PreparePacket<'_>) -> Result<()> {
        match (self.state, packet) {
            (_, PreparePacket::Error(err)) => Err(err.into()),

            (PrepareState::AwaitingPrepareAck, PreparePacket::PrepareOk(ok)) => {
                self.statement_id = ok.statement_id();
                self.warning_count = ok.warning_count();
                self.num_params = usize::from(ok.num_params());
                self.num_columns = usize::from(ok.num_columns());
                self.params = Vec::with_capacity(self.num_params);
                self.columns = Vec::with_capacity(self.num_columns);
                self.state = if self.num_params > 0 {
                    PrepareState::AwaitingParameterDefs
                } else {
                    self.after_parameters()
                };
                Ok(())
            }

            (
                PrepareState::AwaitingParameterDefs,
                PreparePacket::ParameterDefinition { remaining, payload },
            ) => {
                if !is_next_slot(self.num_params, remaining, self.params.len()) {
                    return Err(self.param_mismatch(self.params.len() + 1));
                }
                let param = ParameterDefinition::decode(payload, 0, payload.len())?;
                self.params.push(param);
                if self.params.len() == self.num_params {
                    self.state = self.after_parameters();
                }
                Ok(())
            }

            (
                PrepareState::AwaitingColumnDefs,
                PreparePacket::ColumnDefinition { remaining, payload },
            ) => {
                if !is_next_slot(self.num_columns, remaining, self.columns.len()) {
                    return Err(self.column_mismatch(self.columns.len() + 1));
                }
                let column = ColumnDefinition::decode(payload, 0, payload.len())?;
                self.columns.push(column);
                if self.columns.len() == self.num_columns {
                    self.state = PrepareState::Ready;
                }
                Ok(())
            }

            // declared definitions were not all described
            (
                PrepareState::AwaitingParameterDefs,
                PreparePacket::ColumnDefinition { .. } | PreparePacket::EndOfDefinitions,
            ) => Err(self.param_mismatch(self.params.len())),
            (PrepareState::AwaitingColumnDefs, PreparePacket::EndOfDefinitions) => {
                Err(self.column_mismatch(self.columns.len()))
            }

            // more definitions than declared
            (
                PrepareState::AwaitingColumnDefs | PrepareState::Ready,
                PreparePacket::ParameterDefinition { .. },
            ) => Err(self.param_mismatch(self.num_params + 1)),
            (PrepareState::Ready, PreparePacket::ColumnDefinition { .. }) => {
                Err(self.column_mismatch(self.num_columns + 1))
            }

            (state, packet) => Err(Error::UnexpectedPacket(format!(
                "{} while {:?}",
                describe(&packet),
                state
            ))),
        }
    }
}

/// A definition reported with `remaining` outstanding out of `total` belongs
/// at `total - remaining`; it must be the next unfilled slot.
fn is_next_slot(total: usize, remaining: usize, filled: usize) -> bool {
    remaining != 0 && remaining <= total && total - remaining == filled
}

fn describe(packet: &PreparePacket<'_>) -> String {
    match packet {
        PreparePacket::PrepareOk(_) => "COM_STMT_PREPARE_OK".to_string(),
        PreparePacket::ParameterDefinition { .. } => "parameter definition".to_string(),
        PreparePacket::ColumnDefinition { .. } => "column definition".to_string(),
        PreparePacket::EndOfDefinitions => "end of definitions".to_string(),
        PreparePacket::Error(_) => "ERR packet".to_string(),
        PreparePacket::Unexpected { header } => format!("packet with header 0x{:02X}", header),
    }
}
