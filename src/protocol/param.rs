use crate::constant::ColumnType;
use crate::protocol::primitive::*;

/// Unsigned flag of the second type byte
const UNSIGNED: u8 = 0x80;

/// Wire type of one bound parameter: MySQL type plus unsigned flag.
///
/// Two executions with equal `ParamType` lists may skip resending the types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamType {
    pub column_type: ColumnType,
    pub unsigned: bool,
    /// Value is supplied through `COM_STMT_SEND_LONG_DATA`
    pub long_data: bool,
}

/// A value bound to a prepared statement parameter for one execution.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Null,
    SignedInt(i64),
    UnsignedInt(u64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    Text(String),
    /// Content was streamed with `append_long_data`; no inline value is sent
    LongData,
}

impl BindValue {
    pub fn is_null(&self) -> bool {
        matches!(self, BindValue::Null)
    }

    pub fn is_long_data(&self) -> bool {
        matches!(self, BindValue::LongData)
    }

    pub fn param_type(&self) -> ParamType {
        let (column_type, unsigned) = match self {
            BindValue::Null => (ColumnType::MYSQL_TYPE_NULL, false),
            BindValue::SignedInt(_) => (ColumnType::MYSQL_TYPE_LONGLONG, false),
            BindValue::UnsignedInt(_) => (ColumnType::MYSQL_TYPE_LONGLONG, true),
            BindValue::Float(_) => (ColumnType::MYSQL_TYPE_FLOAT, false),
            BindValue::Double(_) => (ColumnType::MYSQL_TYPE_DOUBLE, false),
            BindValue::Bytes(_) | BindValue::LongData => (ColumnType::MYSQL_TYPE_BLOB, false),
            BindValue::Text(_) => (ColumnType::MYSQL_TYPE_VAR_STRING, false),
        };
        ParamType {
            column_type,
            unsigned,
            long_data: self.is_long_data(),
        }
    }

    /// Encode parameter type
    ///
    /// Format:
    /// - Byte 0: MySQL type (MYSQL_TYPE_*)
    /// - Byte 1: Unsigned flag (0x80 if unsigned, 0x00 otherwise)
    pub fn encode_type(&self, out: &mut Vec<u8>) {
        let param_type = self.param_type();
        out.push(param_type.column_type as u8);
        out.push(if param_type.unsigned { UNSIGNED } else { 0x00 });
    }

    /// Encode parameter value (binary encoded)
    ///
    /// NULL and long data parameters write nothing.
    pub fn encode_value(&self, out: &mut Vec<u8>) {
        match self {
            BindValue::Null | BindValue::LongData => {}
            BindValue::SignedInt(v) => write_int_8(out, *v as u64),
            BindValue::UnsignedInt(v) => write_int_8(out, *v),
            BindValue::Float(v) => write_int_4(out, v.to_bits()),
            BindValue::Double(v) => write_int_8(out, v.to_bits()),
            BindValue::Bytes(v) => write_bytes_lenenc(out, v),
            BindValue::Text(v) => write_bytes_lenenc(out, v.as_bytes()),
        }
    }
}

impl From<i64> for BindValue {
    fn from(value: i64) -> Self {
        BindValue::SignedInt(value)
    }
}

impl From<i32> for BindValue {
    fn from(value: i32) -> Self {
        BindValue::SignedInt(i64::from(value))
    }
}

impl From<u64> for BindValue {
    fn from(value: u64) -> Self {
        BindValue::UnsignedInt(value)
    }
}

impl From<u32> for BindValue {
    fn from(value: u32) -> Self {
        BindValue::UnsignedInt(u64::from(value))
    }
}

impl From<f32> for BindValue {
    fn from(value: f32) -> Self {
        BindValue::Float(value)
    }
}

impl From<f64> for BindValue {
    fn from(value: f64) -> Self {
        BindValue::Double(value)
    }
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        BindValue::Text(value.to_owned())
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        BindValue::Text(value)
    }
}

impl From<&[u8]> for BindValue {
    fn from(value: &[u8]) -> Self {
        BindValue::Bytes(value.to_vec())
    }
}

impl From<Vec<u8>> for BindValue {
    fn from(value: Vec<u8>) -> Self {
        BindValue::Bytes(value)
    }
}

impl<T: Into<BindValue>> From<Option<T>> for BindValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(BindValue::Null, Into::into)
    }
}

/// Write the NULL bitmap for `params`: `(len + 7) / 8` bytes, bit set for NULL.
pub fn write_null_bitmap(out: &mut Vec<u8>, params: &[BindValue]) {
    let start = out.len();
    out.resize(start + params.len().div_ceil(8), 0);
    for (i, param) in params.iter().enumerate() {
        if param.is_null() {
            out[start + (i >> 3)] |= 1 << (i & 7);
        }
    }
}
