use crate::collector::ResultSetCollector;
use crate::constant::ServerStatusFlags;
use crate::error::{Error, Result};
use crate::protocol::command::ColumnDefinition;
use crate::protocol::packet::{ErrPayloadBytes, MAX_PAYLOAD_LENGTH, OkPayloadBytes, header_byte};
use crate::protocol::primitive::*;
use crate::protocol::response::{OkPayload, read_terminator_status};
use crate::protocol::value::{NullBitmap, Value};

/// Row encoding of a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFormat {
    /// `COM_STMT_EXECUTE` rows
    Binary,
    /// `COM_QUERY` rows
    Text,
}

/// Result of driving the result set state machine
#[derive(Debug)]
pub enum ResultSetEvent {
    /// Need more payload data
    NeedPayload,
    /// The first response was an OK packet; later results were drained
    NoResultSet(OkPayload),
    /// The last terminator arrived; the collector holds every row of the first result set
    Finished { status_flags: ServerStatusFlags },
}

#[derive(Debug)]
enum State {
    Start,
    ReadingColumns { remaining: usize },
    ColumnsEof,
    ReadingRows,
    Finished,
}

/// What the first result of the response was
#[derive(Debug)]
enum First {
    Ok(OkPayload),
    Rows,
}

/// Reads the response of `COM_QUERY` or `COM_STMT_EXECUTE` into a collector.
///
/// While `SERVER_MORE_RESULTS_EXISTS` is set the response continues. Only the
/// first result is kept; the rest are read and dropped so the connection stays
/// in step.
#[derive(Debug)]
pub struct ResultSet {
    format: RowFormat,
    deprecate_eof: bool,
    state: State,
    first: Option<First>,
    columns: Vec<ColumnDefinition>,
    row: Vec<Value>,
    collector: ResultSetCollector,
}

impl ResultSet {
    pub fn new(format: RowFormat, deprecate_eof: bool) -> Self {
        Self {
            format,
            deprecate_eof,
            state: State::Start,
            first: None,
            columns: Vec::new(),
            row: Vec::new(),
            collector: ResultSetCollector::new(),
        }
    }

    pub fn into_collector(self) -> ResultSetCollector {
        self.collector
    }

    /// Rows of the current result set are collected
    fn is_collecting(&self) -> bool {
        self.first.is_none()
    }

    fn is_terminator(&self, payload: &[u8]) -> bool {
        if payload.first() != Some(&0xFE) {
            return false;
        }
        if self.deprecate_eof {
            payload.len() < MAX_PAYLOAD_LENGTH
        } else {
            payload.len() < 9
        }
    }

    /// Drive the state machine with the next payload
    pub fn drive(&mut self, payload: &[u8]) -> Result<ResultSetEvent> {
        match self.state {
            State::Start => match header_byte(payload)? {
                0x00 => {
                    let ok = OkPayload::try_from(OkPayloadBytes(payload))?;
                    let status_flags = ok.status_flags;
                    if self.first.is_none() {
                        self.first = Some(First::Ok(ok));
                    }
                    Ok(self.end_of_result(status_flags))
                }
                0xFF => Err(ErrPayloadBytes(payload).into()),
                0xFB => Err(Error::UnexpectedPacket(
                    "LOCAL INFILE requests are not supported".to_string(),
                )),
                _ => {
                    let (column_count, _rest) = read_int_lenenc(payload)?;
                    let num_columns = usize::try_from(column_count)
                        .map_err(|_| Error::malformed("column count overflow"))?;
                    if !self.is_collecting() {
                        tracing::debug!(columns = num_columns, "dropping extra result set");
                    }
                    self.columns = Vec::with_capacity(num_columns.min(4096));
                    self.state = if num_columns == 0 {
                        self.start_rows()
                    } else {
                        State::ReadingColumns {
                            remaining: num_columns,
                        }
                    };
                    Ok(ResultSetEvent::NeedPayload)
                }
            },

            State::ReadingColumns { remaining } => {
                if self.is_collecting() {
                    let column = ColumnDefinition::decode(payload, 0, payload.len())?;
                    self.columns.push(column);
                }
                self.state = if remaining > 1 {
                    State::ReadingColumns {
                        remaining: remaining - 1,
                    }
                } else {
                    self.start_rows()
                };
                Ok(ResultSetEvent::NeedPayload)
            }

            State::ColumnsEof => {
                if !self.is_terminator(payload) {
                    return Err(Error::UnexpectedPacket(
                        "expected EOF after column definitions".to_string(),
                    ));
                }
                self.state = State::ReadingRows;
                Ok(ResultSetEvent::NeedPayload)
            }

            State::ReadingRows => {
                if self.is_terminator(payload) {
                    let status_flags = read_terminator_status(payload, self.deprecate_eof)?;
                    if self.first.is_none() {
                        self.first = Some(First::Rows);
                    }
                    return Ok(self.end_of_result(status_flags));
                }
                if header_byte(payload)? == 0xFF {
                    return Err(ErrPayloadBytes(payload).into());
                }
                if self.is_collecting() {
                    match self.format {
                        RowFormat::Binary => self.read_binary_row(payload)?,
                        RowFormat::Text => self.read_text_row(payload)?,
                    }
                }
                Ok(ResultSetEvent::NeedPayload)
            }

            State::Finished => Err(Error::UnexpectedPacket(
                "packet after the end of the result set".to_string(),
            )),
        }
    }

    /// One result ended; wait for the next one or report the first.
    fn end_of_result(&mut self, status_flags: ServerStatusFlags) -> ResultSetEvent {
        if status_flags.contains(ServerStatusFlags::SERVER_MORE_RESULTS_EXISTS) {
            self.state = State::Start;
            return ResultSetEvent::NeedPayload;
        }
        self.state = State::Finished;
        match self.first.take() {
            Some(First::Ok(ok)) => ResultSetEvent::NoResultSet(ok),
            Some(First::Rows) | None => ResultSetEvent::Finished { status_flags },
        }
    }

    fn start_rows(&mut self) -> State {
        if self.is_collecting() {
            self.collector.begin_columns(std::mem::take(&mut self.columns));
        }
        if self.deprecate_eof {
            State::ReadingRows
        } else {
            State::ColumnsEof
        }
    }

    fn read_binary_row(&mut self, payload: &[u8]) -> Result<()> {
        let (header, data) = read_int_1(payload)?;
        if header != 0x00 {
            return Err(Error::malformed(format!("binary row header 0x{:02X}", header)));
        }
        let columns = self.collector.columns();
        let (null_bitmap, mut data) =
            read_string_fix(data, NullBitmap::result_set_len(columns.len()))?;
        let null_bitmap = NullBitmap::for_result_set(null_bitmap);

        for (i, column) in columns.iter().enumerate() {
            if null_bitmap.is_null(i) {
                self.row.push(Value::Null);
                continue;
            }
            let (value, rest) = Value::parse_binary(column, data)?;
            self.row.push(value);
            data = rest;
        }
        self.flush_row()
    }

    fn read_text_row(&mut self, payload: &[u8]) -> Result<()> {
        let mut data = payload;
        for column in self.collector.columns() {
            let (value, rest) = Value::parse_text(column, data)?;
            self.row.push(value);
            data = rest;
        }
        self.flush_row()
    }

    fn flush_row(&mut self) -> Result<()> {
        for (i, value) in self.row.drain(..).enumerate() {
            self.collector.add_value(i, value)?;
        }
        Ok(())
    }
}
