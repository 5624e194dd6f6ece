use crate::constant::{ColumnFlags, ColumnType};
use crate::error::{Error, Result};
use crate::protocol::primitive::*;
use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

/// Length of the fixed-size block every column definition ends with
const FIXED_FIELDS_LENGTH: u64 = 0x0c;

/// Fixed-size tail of Column Definition packet (12 bytes)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct ColumnDefinitionTail {
    charset: U16LE,
    column_length: U32LE,
    column_type: u8,
    flags: U16LE,
    decimals: u8,
    reserved: U16LE,
}

impl ColumnDefinitionTail {
    pub fn charset(&self) -> u16 {
        self.charset.get()
    }

    pub fn column_length(&self) -> u32 {
        self.column_length.get()
    }

    pub fn column_type(&self) -> Result<ColumnType> {
        ColumnType::from_u8(self.column_type).ok_or_else(|| {
            Error::malformed(format!("unknown column type: 0x{:02X}", self.column_type))
        })
    }

    /// Unknown bits are kept; servers set bits newer than this table.
    pub fn flags(&self) -> ColumnFlags {
        ColumnFlags::from_bits_retain(self.flags.get())
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }
}

/// Borrowed view of a Protocol::ColumnDefinition41 payload
#[derive(Debug, Clone, Copy)]
pub struct ColumnDefinitionBytes<'a>(pub &'a [u8]);

impl<'a> ColumnDefinitionBytes<'a> {
    /// Restrict decoding to `buffer[start..end]`.
    pub fn from_range(buffer: &'a [u8], start: usize, end: usize) -> Result<Self> {
        buffer.get(start..end).map(Self).ok_or_else(|| {
            Error::malformed(format!(
                "definition range {}..{} outside of {}-byte buffer",
                start,
                end,
                buffer.len()
            ))
        })
    }

    /// Walk the variable-length names and return them with the fixed tail.
    ///
    /// Bytes after the tail (the `COM_FIELD_LIST` default value) are ignored.
    pub fn parse(&self) -> Result<RawColumnDefinition<'a>> {
        let data = self.0;
        let (catalog, data) = read_string_lenenc(data)?;
        let (schema, data) = read_string_lenenc(data)?;
        let (table, data) = read_string_lenenc(data)?;
        let (org_table, data) = read_string_lenenc(data)?;
        let (name, data) = read_string_lenenc(data)?;
        let (org_name, data) = read_string_lenenc(data)?;

        let (fixed_length, data) = read_int_lenenc(data)?;
        if fixed_length < FIXED_FIELDS_LENGTH {
            return Err(Error::malformed(format!(
                "fixed fields length {} < 12",
                fixed_length
            )));
        }
        let (tail, _rest) = ColumnDefinitionTail::ref_from_prefix(data).map_err(|_| {
            Error::malformed(format!("column definition tail: {} < 12 bytes", data.len()))
        })?;

        Ok(RawColumnDefinition {
            catalog,
            schema,
            table,
            org_table,
            name,
            org_name,
            tail,
        })
    }
}

/// Column definition fields borrowed from the packet buffer
#[derive(Debug, Clone, Copy)]
pub struct RawColumnDefinition<'a> {
    pub catalog: &'a [u8],
    pub schema: &'a [u8],
    pub table: &'a [u8],
    pub org_table: &'a [u8],
    pub name: &'a [u8],
    pub org_name: &'a [u8],
    pub tail: &'a ColumnDefinitionTail,
}

/// Column metadata of a result set or a prepared statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub catalog: String,
    pub schema: String,
    pub table: String,
    pub org_table: String,
    pub name: String,
    pub org_name: String,
    pub charset: u16,
    pub column_length: u32,
    pub column_type: ColumnType,
    pub flags: ColumnFlags,
    pub decimals: u8,
}

fn to_string(bytes: &[u8]) -> String {
    match simdutf8::basic::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

impl ColumnDefinition {
    /// Decode the definition packet stored in `buffer[start..end]`.
    pub fn decode(buffer: &[u8], start: usize, end: usize) -> Result<Self> {
        Self::try_from(ColumnDefinitionBytes::from_range(buffer, start, end)?)
    }

    pub fn is_unsigned(&self) -> bool {
        self.flags.contains(ColumnFlags::UNSIGNED_FLAG)
    }
}

impl TryFrom<ColumnDefinitionBytes<'_>> for ColumnDefinition {
    type Error = Error;

    fn try_from(bytes: ColumnDefinitionBytes<'_>) -> Result<Self> {
        let raw = bytes.parse()?;
        Ok(Self {
            catalog: to_string(raw.catalog),
            schema: to_string(raw.schema),
            table: to_string(raw.table),
            org_table: to_string(raw.org_table),
            name: to_string(raw.name),
            org_name: to_string(raw.org_name),
            charset: raw.tail.charset(),
            column_length: raw.tail.column_length(),
            column_type: raw.tail.column_type()?,
            flags: raw.tail.flags(),
            decimals: raw.tail.decimals(),
        })
    }
}

/// Parameter metadata of a prepared statement.
///
/// Sent in the same record layout as a column, but only the type is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterDefinition {
    pub column_type: ColumnType,
    pub flags: ColumnFlags,
}

impl ParameterDefinition {
    /// Decode the definition packet stored in `buffer[start..end]`.
    pub fn decode(buffer: &[u8], start: usize, end: usize) -> Result<Self> {
        Self::try_from(ColumnDefinitionBytes::from_range(buffer, start, end)?)
    }

    pub fn is_unsigned(&self) -> bool {
        self.flags.contains(ColumnFlags::UNSIGNED_FLAG)
    }
}

impl TryFrom<ColumnDefinitionBytes<'_>> for ParameterDefinition {
    type Error = Error;

    fn try_from(bytes: ColumnDefinitionBytes<'_>) -> Result<Self> {
        let raw = bytes.parse()?;
        Ok(Self {
            column_type: raw.tail.column_type()?,
            flags: raw.tail.flags(),
        })
    }
}

/// Build a definition packet payload. Used by tests and by mock backends.
pub fn write_column_definition(out: &mut Vec<u8>, def: &ColumnDefinition) {
    write_bytes_lenenc(out, def.catalog.as_bytes());
    write_bytes_lenenc(out, def.schema.as_bytes());
    write_bytes_lenenc(out, def.table.as_bytes());
    write_bytes_lenenc(out, def.org_table.as_bytes());
    write_bytes_lenenc(out, def.name.as_bytes());
    write_bytes_lenenc(out, def.org_name.as_bytes());
    write_int_lenenc(out, FIXED_FIELDS_LENGTH);
    write_int_2(out, def.charset);
    write_int_4(out, def.column_length);
    write_int_1(out, def.column_type as u8);
    write_int_2(out, def.flags.bits());
    write_int_1(out, def.decimals);
    write_int_2(out, 0);
}
