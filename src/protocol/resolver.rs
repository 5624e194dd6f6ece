use crate::error::Result;
use crate::protocol::command::prepared::{PrepareOk, read_prepare_ok};
use crate::protocol::packet::{ErrPayloadBytes, header_byte, is_eof_packet};

/// One packet of the `COM_STMT_PREPARE` response, tagged by its role.
#[derive(Debug, Clone, Copy)]
pub enum PreparePacket<'a> {
    PrepareOk(&'a PrepareOk),
    /// `remaining` counts this packet: the first of `P` parameters reports `P`
    ParameterDefinition { remaining: usize, payload: &'a [u8] },
    ColumnDefinition { remaining: usize, payload: &'a [u8] },
    /// A terminator arrived while definitions were still outstanding
    EndOfDefinitions,
    Error(ErrPayloadBytes<'a>),
    Unexpected { header: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    AwaitingAck,
    Parameters { remaining: usize, columns: usize },
    ParametersEof { columns: usize },
    Columns { remaining: usize },
    ColumnsEof,
}

/// Tags the packets of a prepare exchange for the `Prepare` state machine.
///
/// The server announces how many definitions follow, then streams them; the
/// resolver keeps the outstanding counts and consumes the EOF packet closing
/// each block when `CLIENT_DEPRECATE_EOF` is off.
#[derive(Debug, Clone)]
pub struct PacketResolver {
    deprecate_eof: bool,
    phase: Phase,
}

impl PacketResolver {
    pub fn new(deprecate_eof: bool) -> Self {
        Self {
            deprecate_eof,
            phase: Phase::Idle,
        }
    }

    /// Start resolving the response of a freshly sent `COM_STMT_PREPARE`.
    pub fn begin(&mut self) {
        self.phase = Phase::AwaitingAck;
    }

    /// No packet of the current exchange is outstanding.
    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
    }

    fn after_parameters(&self, columns: usize) -> Phase {
        if !self.deprecate_eof {
            Phase::ParametersEof { columns }
        } else {
            self.columns_or_idle(columns)
        }
    }

    fn columns_or_idle(&self, columns: usize) -> Phase {
        if columns > 0 {
            Phase::Columns { remaining: columns }
        } else {
            Phase::Idle
        }
    }

    /// Tag `payload`. Returns `None` for a block terminator that was expected.
    pub fn resolve<'a>(&mut self, payload: &'a [u8]) -> Result<Option<PreparePacket<'a>>> {
        let header = header_byte(payload)?;
        if header == 0xFF {
            self.phase = Phase::Idle;
            return Ok(Some(PreparePacket::Error(ErrPayloadBytes(payload))));
        }
        let eof = is_eof_packet(payload);

        let packet = match self.phase {
            Phase::Idle => PreparePacket::Unexpected { header },

            Phase::AwaitingAck => {
                if header != 0x00 {
                    self.phase = Phase::Idle;
                    return Ok(Some(PreparePacket::Unexpected { header }));
                }
                let ok = read_prepare_ok(payload)?;
                let params = usize::from(ok.num_params());
                let columns = usize::from(ok.num_columns());
                self.phase = if params > 0 {
                    Phase::Parameters {
                        remaining: params,
                        columns,
                    }
                } else {
                    self.columns_or_idle(columns)
                };
                PreparePacket::PrepareOk(ok)
            }

            Phase::Parameters { .. } | Phase::Columns { .. } if eof => {
                self.phase = Phase::Idle;
                PreparePacket::EndOfDefinitions
            }

            Phase::Parameters { remaining, columns } => {
                self.phase = if remaining == 1 {
                    self.after_parameters(columns)
                } else {
                    Phase::Parameters {
                        remaining: remaining - 1,
                        columns,
                    }
                };
                PreparePacket::ParameterDefinition { remaining, payload }
            }

            Phase::ParametersEof { columns } => {
                if eof {
                    self.phase = self.columns_or_idle(columns);
                    return Ok(None);
                }
                PreparePacket::ParameterDefinition {
                    remaining: 0,
                    payload,
                }
            }

            Phase::Columns { remaining } => {
                self.phase = if remaining > 1 {
                    Phase::Columns {
                        remaining: remaining - 1,
                    }
                } else if !self.deprecate_eof {
                    Phase::ColumnsEof
                } else {
                    Phase::Idle
                };
                PreparePacket::ColumnDefinition { remaining, payload }
            }

            Phase::ColumnsEof => {
                if eof {
                    self.phase = Phase::Idle;
                    return Ok(None);
                }
                PreparePacket::ColumnDefinition {
                    remaining: 0,
                    payload,
                }
            }
        };
        Ok(Some(packet))
    }
}
