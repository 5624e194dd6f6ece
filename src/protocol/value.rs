//! Owned cell values decoded from binary and text result rows

use crate::constant::ColumnType;
use crate::error::{Error, Result};
use crate::protocol::command::ColumnDefinition;
use crate::protocol::primitive::*;

/// One cell of a result row.
///
/// `Null` is a present cell holding SQL NULL; a missing cell is simply absent
/// from the column buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    /// TINYINT, SMALLINT, MEDIUMINT, INT, BIGINT, YEAR
    SignedInt(i64),
    /// Unsigned integer columns
    UnsignedInt(u64),
    Float(f32),
    Double(f64),
    /// DATE/DATETIME/TIMESTAMP
    Timestamp(Timestamp),
    /// TIME
    Time(Time),
    /// Strings, BLOBs, DECIMAL, JSON, ENUM, SET, BIT, GEOMETRY
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub microsecond: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Time {
    pub negative: bool,
    pub days: u32,
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub microseconds: u32,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Parse one binary protocol value
    ///
    /// Returns the parsed value and the remaining bytes
    pub fn parse_binary<'a>(column: &ColumnDefinition, data: &'a [u8]) -> Result<(Self, &'a [u8])> {
        let unsigned = column.is_unsigned();
        match column.column_type {
            ColumnType::MYSQL_TYPE_NULL => Ok((Value::Null, data)),

            ColumnType::MYSQL_TYPE_TINY => {
                let (val, rest) = read_int_1(data)?;
                let value = if unsigned {
                    Value::UnsignedInt(u64::from(val))
                } else {
                    Value::SignedInt(i64::from(val as i8))
                };
                Ok((value, rest))
            }

            ColumnType::MYSQL_TYPE_SHORT | ColumnType::MYSQL_TYPE_YEAR => {
                let (val, rest) = read_int_2(data)?;
                let value = if unsigned {
                    Value::UnsignedInt(u64::from(val))
                } else {
                    Value::SignedInt(i64::from(val as i16))
                };
                Ok((value, rest))
            }

            ColumnType::MYSQL_TYPE_INT24 | ColumnType::MYSQL_TYPE_LONG => {
                let (val, rest) = read_int_4(data)?;
                let value = if unsigned {
                    Value::UnsignedInt(u64::from(val))
                } else {
                    Value::SignedInt(i64::from(val as i32))
                };
                Ok((value, rest))
            }

            ColumnType::MYSQL_TYPE_LONGLONG => {
                let (val, rest) = read_int_8(data)?;
                let value = if unsigned {
                    Value::UnsignedInt(val)
                } else {
                    Value::SignedInt(val as i64)
                };
                Ok((value, rest))
            }

            ColumnType::MYSQL_TYPE_FLOAT => {
                let (val, rest) = read_int_4(data)?;
                Ok((Value::Float(f32::from_bits(val)), rest))
            }

            ColumnType::MYSQL_TYPE_DOUBLE => {
                let (val, rest) = read_int_8(data)?;
                Ok((Value::Double(f64::from_bits(val)), rest))
            }

            ColumnType::MYSQL_TYPE_DATE
            | ColumnType::MYSQL_TYPE_DATETIME
            | ColumnType::MYSQL_TYPE_TIMESTAMP
            | ColumnType::MYSQL_TYPE_TIMESTAMP2
            | ColumnType::MYSQL_TYPE_DATETIME2
            | ColumnType::MYSQL_TYPE_NEWDATE => {
                let (len, rest) = read_int_1(data)?;
                let (body, rest) = read_string_fix(rest, usize::from(len))?;
                Ok((Value::Timestamp(parse_timestamp(body)?), rest))
            }

            ColumnType::MYSQL_TYPE_TIME | ColumnType::MYSQL_TYPE_TIME2 => {
                let (len, rest) = read_int_1(data)?;
                let (body, rest) = read_string_fix(rest, usize::from(len))?;
                Ok((Value::Time(parse_time(body)?), rest))
            }

            ColumnType::MYSQL_TYPE_VARCHAR
            | ColumnType::MYSQL_TYPE_VAR_STRING
            | ColumnType::MYSQL_TYPE_STRING
            | ColumnType::MYSQL_TYPE_BLOB
            | ColumnType::MYSQL_TYPE_TINY_BLOB
            | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
            | ColumnType::MYSQL_TYPE_LONG_BLOB
            | ColumnType::MYSQL_TYPE_GEOMETRY
            | ColumnType::MYSQL_TYPE_JSON
            | ColumnType::MYSQL_TYPE_DECIMAL
            | ColumnType::MYSQL_TYPE_NEWDECIMAL
            | ColumnType::MYSQL_TYPE_ENUM
            | ColumnType::MYSQL_TYPE_SET
            | ColumnType::MYSQL_TYPE_BIT
            | ColumnType::MYSQL_TYPE_TYPED_ARRAY => {
                let (bytes, rest) = read_string_lenenc(data)?;
                Ok((Value::Bytes(bytes.to_vec()), rest))
            }
        }
    }

    /// Parse one text protocol cell
    ///
    /// Numeric columns are converted from their decimal text; everything else
    /// keeps its raw bytes.
    pub fn parse_text<'a>(column: &ColumnDefinition, data: &'a [u8]) -> Result<(Self, &'a [u8])> {
        if let Some((&0xFB, rest)) = data.split_first() {
            return Ok((Value::Null, rest));
        }
        let (bytes, rest) = read_string_lenenc(data)?;

        let value = match column.column_type {
            t if t.is_integer() => {
                let text = ascii(bytes)?;
                if column.is_unsigned() {
                    Value::UnsignedInt(text.parse().map_err(|_| invalid_number(text))?)
                } else {
                    Value::SignedInt(text.parse().map_err(|_| invalid_number(text))?)
                }
            }
            ColumnType::MYSQL_TYPE_FLOAT => {
                let text = ascii(bytes)?;
                Value::Float(text.parse().map_err(|_| invalid_number(text))?)
            }
            ColumnType::MYSQL_TYPE_DOUBLE => {
                let text = ascii(bytes)?;
                Value::Double(text.parse().map_err(|_| invalid_number(text))?)
            }
            _ => Value::Bytes(bytes.to_vec()),
        };
        Ok((value, rest))
    }
}

fn ascii(bytes: &[u8]) -> Result<&str> {
    simdutf8::basic::from_utf8(bytes).map_err(|_| Error::malformed("numeric cell is not UTF-8"))
}

fn invalid_number(text: &str) -> Error {
    Error::malformed(format!("invalid numeric cell '{}'", text))
}

fn parse_timestamp(body: &[u8]) -> Result<Timestamp> {
    let mut ts = Timestamp::default();
    match body.len() {
        0 => {}
        4 | 7 | 11 => {
            let (year, rest) = read_int_2(body)?;
            ts.year = year;
            ts.month = rest[0];
            ts.day = rest[1];
            if body.len() >= 7 {
                ts.hour = rest[2];
                ts.minute = rest[3];
                ts.second = rest[4];
            }
            if body.len() == 11 {
                let (micro, _) = read_int_4(&rest[5..])?;
                ts.microsecond = micro;
            }
        }
        len => return Err(Error::malformed(format!("invalid timestamp length: {}", len))),
    }
    Ok(ts)
}

fn parse_time(body: &[u8]) -> Result<Time> {
    let mut time = Time::default();
    match body.len() {
        0 => {}
        8 | 12 => {
            time.negative = body[0] == 1;
            let (days, rest) = read_int_4(&body[1..])?;
            time.days = days;
            time.hours = rest[0];
            time.minutes = rest[1];
            time.seconds = rest[2];
            if body.len() == 12 {
                let (micro, _) = read_int_4(&rest[3..])?;
                time.microseconds = micro;
            }
        }
        len => return Err(Error::malformed(format!("invalid time length: {}", len))),
    }
    Ok(time)
}

/// NULL bitmap of a binary result row
///
/// Result set rows reserve the first two bits.
#[derive(Debug, Clone, Copy)]
pub struct NullBitmap<'a> {
    bitmap: &'a [u8],
}

impl<'a> NullBitmap<'a> {
    pub fn for_result_set(bitmap: &'a [u8]) -> Self {
        Self { bitmap }
    }

    /// Number of bitmap bytes for `count` columns
    pub fn result_set_len(count: usize) -> usize {
        (count + 7 + 2) >> 3
    }

    pub fn is_null(&self, idx: usize) -> bool {
        let bit = idx + 2;
        self.bitmap
            .get(bit >> 3)
            .is_some_and(|byte| byte & (1 << (bit & 7)) != 0)
    }
}
