use crate::catalog::{DataType, TableSchema};
use crate::error::{GranaryError, GranaryResult};
use crate::storage::codec::CommonCodec;
use bytes::{BufMut, BytesMut};
use std::fmt::{Display, Formatter};

/// Reserved tuple header, zero-initialized.
pub const TUPLE_HEADER_SIZE: usize = 8;

const ALIGNMENT: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i32),
    Char(String),
    Varchar(String),
}

impl Value {
    pub fn matches(&self, data_type: &DataType) -> bool {
        matches!(
            (self, data_type),
            (Value::Int(_), DataType::Int)
                | (Value::Char(_), DataType::Char(_))
                | (Value::Varchar(_), DataType::Varchar(_))
        )
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Char(s) | Value::Varchar(s) => write!(f, "{s}"),
        }
    }
}

/**
 * Tuple wire format:
 * ```text
 *  -----------------------------------------------------
 *  | Header (8, zeroed) | Attr_1 | pad | Attr_2 | pad | ... |
 *  -----------------------------------------------------
 * ```
 *
 * INT is a 4-byte big-endian two's-complement integer. CHAR(n) occupies n
 * bytes right-padded with 0x00. VARCHAR(n) is a one-byte length followed by
 * the content. After each attribute the cursor (length byte included) is
 * advanced to the next multiple of 4 with 0x00 padding; encoder and decoder
 * share this rule.
 */
pub struct TupleCodec;

impl TupleCodec {
    pub fn encode(schema: &TableSchema, values: &[Value]) -> GranaryResult<Vec<u8>> {
        if values.len() != schema.attr_count() {
            return Err(GranaryError::Storage(format!(
                "tuple has {} values but table {} has {} attributes",
                values.len(),
                schema.name,
                schema.attr_count()
            )));
        }
        let mut buf = BytesMut::new();
        buf.put_bytes(0, TUPLE_HEADER_SIZE);
        for (attr, value) in schema.attributes.iter().zip(values) {
            if !value.matches(&attr.data_type) {
                return Err(GranaryError::Storage(format!(
                    "value {} does not match attribute {} of type {}",
                    value, attr.name, attr.data_type
                )));
            }
            match (&attr.data_type, value) {
                (DataType::Int, Value::Int(v)) => buf.put_i32(*v),
                (DataType::Char(n), Value::Char(s)) => {
                    if s.len() > *n {
                        return Err(GranaryError::Storage(format!(
                            "value '{}' exceeds CHAR({}) in attribute {}",
                            s, n, attr.name
                        )));
                    }
                    buf.put_slice(s.as_bytes());
                    buf.put_bytes(0, n - s.len());
                }
                (DataType::Varchar(n), Value::Varchar(s)) => {
                    if s.len() > *n || s.len() > u8::MAX as usize {
                        return Err(GranaryError::Storage(format!(
                            "value '{}' exceeds VARCHAR({}) in attribute {}",
                            s, n, attr.name
                        )));
                    }
                    buf.put_u8(s.len() as u8);
                    buf.put_slice(s.as_bytes());
                }
                _ => unreachable!("checked by Value::matches"),
            }
            let misaligned = buf.len() % ALIGNMENT;
            if misaligned != 0 {
                buf.put_bytes(0, ALIGNMENT - misaligned);
            }
        }
        Ok(buf.to_vec())
    }

    pub fn decode(schema: &TableSchema, bytes: &[u8]) -> GranaryResult<Vec<Value>> {
        let mut cursor = TUPLE_HEADER_SIZE;
        let mut values = Vec::with_capacity(schema.attr_count());
        for attr in &schema.attributes {
            let value = match attr.data_type {
                DataType::Int => {
                    let raw = Self::take(bytes, cursor, 4, &attr.name)?;
                    let (v, consumed) = CommonCodec::decode_i32(raw)?;
                    cursor += consumed;
                    Value::Int(v)
                }
                DataType::Char(n) => {
                    let raw = Self::take(bytes, cursor, n, &attr.name)?;
                    cursor += n;
                    let trimmed = match raw.iter().rposition(|&b| b != 0) {
                        Some(last) => &raw[..=last],
                        None => &[],
                    };
                    Value::Char(Self::utf8(trimmed, &attr.name)?)
                }
                DataType::Varchar(_) => {
                    let len = Self::take(bytes, cursor, 1, &attr.name)?[0] as usize;
                    cursor += 1;
                    let raw = Self::take(bytes, cursor, len, &attr.name)?;
                    cursor += len;
                    Value::Varchar(Self::utf8(raw, &attr.name)?)
                }
            };
            values.push(value);
            let misaligned = cursor % ALIGNMENT;
            if misaligned != 0 {
                cursor += ALIGNMENT - misaligned;
            }
        }
        Ok(values)
    }

    /// Join-key bytes for the given attribute ordinals: the attributes as
    /// they appear on disk, with the VARCHAR length prefix and padding
    /// stripped. Two tuples match iff these bytes are equal.
    pub fn join_key(
        schema: &TableSchema,
        values: &[Value],
        ordinals: &[usize],
    ) -> GranaryResult<Vec<u8>> {
        let mut key = Vec::new();
        for &ordinal in ordinals {
            let attr = schema.attribute(ordinal)?;
            let value = values.get(ordinal).ok_or_else(|| {
                GranaryError::Internal(format!("no value at ordinal {ordinal}"))
            })?;
            match (&attr.data_type, value) {
                (DataType::Int, Value::Int(v)) => {
                    key.extend_from_slice(&CommonCodec::encode_i32(*v))
                }
                (DataType::Char(n), Value::Char(s)) => {
                    key.extend_from_slice(s.as_bytes());
                    key.extend(std::iter::repeat(0u8).take(n.saturating_sub(s.len())));
                }
                (DataType::Varchar(_), Value::Varchar(s)) => key.extend_from_slice(s.as_bytes()),
                _ => {
                    return Err(GranaryError::Internal(format!(
                        "value {} does not match attribute {}",
                        value, attr.name
                    )))
                }
            }
        }
        Ok(key)
    }

    fn take<'a>(bytes: &'a [u8], cursor: usize, len: usize, attr: &str) -> GranaryResult<&'a [u8]> {
        bytes.get(cursor..cursor + len).ok_or_else(|| {
            GranaryError::Storage(format!(
                "tuple truncated while decoding attribute {attr}"
            ))
        })
    }

    fn utf8(bytes: &[u8], attr: &str) -> GranaryResult<String> {
        String::from_utf8(bytes.to_vec()).map_err(|e| {
            GranaryError::Storage(format!("attribute {attr} is not valid utf-8: {e}"))
        })
    }
}
