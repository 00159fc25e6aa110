//! Type codec: logical values to and from their fixed binary representation.
//!
//! Numeric types have a per-value encoding (`int32` = 4 bytes, `float64` = 8
//! bytes, both little-endian). Strings only exist in the batched column form:
//! a payload buffer of concatenated UTF-8 bytes plus an offsets buffer of
//! `u32` cumulative end positions, one per row.

use std::fmt;
use std::str::FromStr;

use crate::error::{CcolError, Result};

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColumnType {
    Int32 = 0,
    Float64 = 1,
    Utf8 = 2,
}

/// How a type lays its values out in a raw block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Every value occupies exactly this many bytes.
    Fixed(usize),
    /// Payload + offsets pair; values have no individual width.
    Variable,
}

struct TypeRule {
    column_type: ColumnType,
    name: &'static str,
    encoding: Encoding,
}

/// Indexed by on-disk type tag.
static TYPE_RULES: [TypeRule; 3] = [
    TypeRule {
        column_type: ColumnType::Int32,
        name: "int32",
        encoding: Encoding::Fixed(4),
    },
    TypeRule {
        column_type: ColumnType::Float64,
        name: "float64",
        encoding: Encoding::Fixed(8),
    },
    TypeRule {
        column_type: ColumnType::Utf8,
        name: "string",
        encoding: Encoding::Variable,
    },
];

impl ColumnType {
    fn rule(self) -> &'static TypeRule {
        &TYPE_RULES[self as usize]
    }

    /// Tag stored in the metadata table.
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        TYPE_RULES.get(tag as usize).map(|r| r.column_type)
    }

    /// Schema-level name (`int32`, `float64`, `string`).
    pub fn name(self) -> &'static str {
        self.rule().name
    }

    pub fn encoding(self) -> Encoding {
        self.rule().encoding
    }

    /// Number of blocks a column of this type occupies in a file.
    pub fn block_count(self) -> usize {
        match self.encoding() {
            Encoding::Fixed(_) => 1,
            Encoding::Variable => 2,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColumnType {
    type Err = CcolError;

    fn from_str(s: &str) -> Result<Self> {
        TYPE_RULES
            .iter()
            .find(|r| r.name == s)
            .map(|r| r.column_type)
            .ok_or_else(|| CcolError::SchemaMismatch(format!("unknown column type '{}'", s)))
    }
}

// ── Values ─────────────────────────────────────────────────────────────────

/// A logical source value handed to the encoder.
///
/// Integers are carried as `i64` so that values wider than the declared
/// column type are caught by the codec instead of being truncated upstream.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(v) => f.write_str(v),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// A decoded column, owned by the caller after a read.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int32(Vec<i32>),
    Float64(Vec<f64>),
    Utf8(Vec<String>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int32(v) => v.len(),
            ColumnData::Float64(v) => v.len(),
            ColumnData::Utf8(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnData::Int32(_) => ColumnType::Int32,
            ColumnData::Float64(_) => ColumnType::Float64,
            ColumnData::Utf8(_) => ColumnType::Utf8,
        }
    }

    /// Value at `row`, or `None` past the end.
    pub fn value(&self, row: usize) -> Option<Value> {
        match self {
            ColumnData::Int32(v) => v.get(row).map(|&x| Value::Int(x as i64)),
            ColumnData::Float64(v) => v.get(row).map(|&x| Value::Float(x)),
            ColumnData::Utf8(v) => v.get(row).map(|x| Value::Str(x.clone())),
        }
    }

    /// Logical values, suitable for feeding back into the encoder.
    pub fn to_values(&self) -> Vec<Value> {
        match self {
            ColumnData::Int32(v) => v.iter().map(|&x| Value::Int(x as i64)).collect(),
            ColumnData::Float64(v) => v.iter().map(|&x| Value::Float(x)).collect(),
            ColumnData::Utf8(v) => v.iter().map(|x| Value::Str(x.clone())).collect(),
        }
    }
}

// ── Encoding ───────────────────────────────────────────────────────────────

/// A single value that the declared type cannot represent.
///
/// Carries no column/row context; attach it with [`ValueError::at`].
#[derive(Debug, Clone, PartialEq)]
pub enum ValueError {
    Coercion(String),
    OutOfRange { value: String, type_name: &'static str },
}

impl ValueError {
    pub fn at(self, column: &str, row: usize) -> CcolError {
        match self {
            ValueError::Coercion(message) => CcolError::TypeCoercion {
                column: column.to_string(),
                row,
                message,
            },
            ValueError::OutOfRange { value, type_name } => CcolError::OutOfRange {
                column: column.to_string(),
                row,
                value,
                type_name,
            },
        }
    }
}

fn coercion(value: &Value, column_type: ColumnType) -> ValueError {
    ValueError::Coercion(format!(
        "{} value '{}' is not representable as {}",
        value.kind(),
        value,
        column_type
    ))
}

fn to_i32(value: &Value) -> std::result::Result<i32, ValueError> {
    match value {
        Value::Int(v) => i32::try_from(*v).map_err(|_| ValueError::OutOfRange {
            value: v.to_string(),
            type_name: ColumnType::Int32.name(),
        }),
        other => Err(coercion(other, ColumnType::Int32)),
    }
}

fn to_f64(value: &Value) -> std::result::Result<f64, ValueError> {
    match value {
        Value::Float(v) => Ok(*v),
        Value::Int(v) => Ok(*v as f64),
        other => Err(coercion(other, ColumnType::Float64)),
    }
}

/// Append the fixed-width encoding of one numeric value to `out`.
///
/// Strings have no per-value encoding and are rejected.
pub fn encode_value(
    value: &Value,
    column_type: ColumnType,
    out: &mut Vec<u8>,
) -> std::result::Result<(), ValueError> {
    match column_type {
        ColumnType::Int32 => out.extend_from_slice(&to_i32(value)?.to_le_bytes()),
        ColumnType::Float64 => out.extend_from_slice(&to_f64(value)?.to_le_bytes()),
        ColumnType::Utf8 => {
            return Err(ValueError::Coercion(
                "string values are only encoded column-at-a-time".to_string(),
            ))
        }
    }
    Ok(())
}

/// Decode one numeric value from the front of `buf`, advancing it by exactly
/// the type's width.
///
/// The reader decodes whole blocks through [`decode_fixed_column`]; this is
/// the per-value form of the same layout.
pub fn decode_value(buf: &mut &[u8], column_type: ColumnType) -> Result<Value> {
    let width = match column_type.encoding() {
        Encoding::Fixed(w) => w,
        Encoding::Variable => {
            return Err(corrupt(
                "string values have no fixed-width encoding",
            ))
        }
    };
    if buf.len() < width {
        return Err(corrupt(format!(
            "need {} bytes for {}, {} remain",
            width,
            column_type,
            buf.len()
        )));
    }
    let (head, rest) = buf.split_at(width);
    *buf = rest;
    Ok(match column_type {
        ColumnType::Int32 => Value::Int(i32::from_le_bytes(le_array(head)) as i64),
        ColumnType::Float64 => Value::Float(f64::from_le_bytes(le_array(head))),
        ColumnType::Utf8 => unreachable!("variable-width types return above"),
    })
}

fn corrupt(msg: impl Into<String>) -> CcolError {
    CcolError::CorruptBlock(msg.into())
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// Raw (uncompressed) buffers for one column, in on-disk block order.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedColumn {
    Fixed(Vec<u8>),
    Strings { payload: Vec<u8>, offsets: Vec<u8> },
}

impl EncodedColumn {
    pub fn into_buffers(self) -> Vec<Vec<u8>> {
        match self {
            EncodedColumn::Fixed(raw) => vec![raw],
            EncodedColumn::Strings { payload, offsets } => vec![payload, offsets],
        }
    }
}

/// Encode every value of a column into its raw block buffer(s).
pub fn encode_column(name: &str, column_type: ColumnType, values: &[Value]) -> Result<EncodedColumn> {
    match column_type.encoding() {
        Encoding::Fixed(width) => {
            let mut raw = Vec::with_capacity(values.len() * width);
            for (row, value) in values.iter().enumerate() {
                encode_value(value, column_type, &mut raw).map_err(|e| e.at(name, row))?;
            }
            Ok(EncodedColumn::Fixed(raw))
        }
        Encoding::Variable => {
            let mut payload = Vec::new();
            let mut offsets = Vec::with_capacity(values.len() * 4);
            for (row, value) in values.iter().enumerate() {
                let s = match value {
                    Value::Str(s) => s,
                    other => return Err(coercion(other, column_type).at(name, row)),
                };
                payload.extend_from_slice(s.as_bytes());
                let end = u32::try_from(payload.len()).map_err(|_| CcolError::OutOfRange {
                    column: name.to_string(),
                    row,
                    value: format!("payload offset {}", payload.len()),
                    type_name: "u32 string offset",
                })?;
                offsets.extend_from_slice(&end.to_le_bytes());
            }
            Ok(EncodedColumn::Strings { payload, offsets })
        }
    }
}

// ── Decoding ───────────────────────────────────────────────────────────────

/// Decode a fixed-width raw block holding exactly `rows` values.
pub fn decode_fixed_column(column_type: ColumnType, raw: &[u8], rows: usize) -> Result<ColumnData> {
    let width = match column_type.encoding() {
        Encoding::Fixed(w) => w,
        Encoding::Variable => {
            return Err(corrupt(format!(
                "{} is not a fixed-width type",
                column_type
            )))
        }
    };
    if rows.checked_mul(width) != Some(raw.len()) {
        return Err(corrupt(format!(
            "{} block holds {} bytes, expected {} rows × {} bytes",
            column_type,
            raw.len(),
            rows,
            width
        )));
    }
    Ok(match column_type {
        ColumnType::Int32 => ColumnData::Int32(
            raw.chunks_exact(4)
                .map(|c| i32::from_le_bytes(le_array(c)))
                .collect(),
        ),
        ColumnType::Float64 => ColumnData::Float64(
            raw.chunks_exact(8)
                .map(|c| f64::from_le_bytes(le_array(c)))
                .collect(),
        ),
        ColumnType::Utf8 => unreachable!("variable-width types return above"),
    })
}

/// Parse an offsets block: exactly `rows` non-decreasing `u32` end positions.
pub fn decode_offsets(raw: &[u8], rows: usize) -> Result<Vec<u32>> {
    if rows.checked_mul(4) != Some(raw.len()) {
        return Err(corrupt(format!(
            "offsets block holds {} bytes, expected {} entries",
            raw.len(),
            rows
        )));
    }
    let offsets: Vec<u32> = raw
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes(le_array(c)))
        .collect();
    if let Some(row) = offsets.windows(2).position(|w| w[1] < w[0]) {
        return Err(corrupt(format!(
            "string offsets decrease at row {}",
            row + 1
        )));
    }
    Ok(offsets)
}

/// Slice a payload/offsets pair back into `rows` strings.
pub fn decode_strings(payload: &[u8], offsets_raw: &[u8], rows: usize) -> Result<Vec<String>> {
    let offsets = decode_offsets(offsets_raw, rows)?;
    let last = offsets.last().copied().unwrap_or(0) as usize;
    if last != payload.len() {
        return Err(corrupt(format!(
            "final string offset {} does not match payload length {}",
            last,
            payload.len()
        )));
    }

    let mut out = Vec::with_capacity(rows);
    let mut start = 0usize;
    for (row, &end) in offsets.iter().enumerate() {
        let end = end as usize;
        let s = std::str::from_utf8(&payload[start..end]).map_err(|e| {
            corrupt(format!("row {} is not valid UTF-8: {}", row, e))
        })?;
        out.push(s.to_string());
        start = end;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_table_is_consistent() {
        for tag in 0..3u8 {
            let ty = ColumnType::from_tag(tag).unwrap();
            assert_eq!(ty.tag(), tag);
            assert_eq!(ty.name().parse::<ColumnType>().unwrap(), ty);
        }
        assert_eq!(ColumnType::from_tag(3), None);
        assert_eq!(ColumnType::Int32.encoding(), Encoding::Fixed(4));
        assert_eq!(ColumnType::Float64.encoding(), Encoding::Fixed(8));
        assert_eq!(ColumnType::Utf8.block_count(), 2);
        assert!("int64".parse::<ColumnType>().is_err());
    }

    #[test]
    fn int32_is_little_endian_twos_complement() {
        let mut out = Vec::new();
        encode_value(&Value::Int(-2), ColumnType::Int32, &mut out).unwrap();
        assert_eq!(out, vec![0xfe, 0xff, 0xff, 0xff]);

        let mut cursor = out.as_slice();
        assert_eq!(decode_value(&mut cursor, ColumnType::Int32).unwrap(), Value::Int(-2));
        assert!(cursor.is_empty());
    }

    #[test]
    fn int32_rejects_out_of_range() {
        let mut out = Vec::new();
        let err = encode_value(&Value::Int(4_294_967_296), ColumnType::Int32, &mut out).unwrap_err();
        assert!(matches!(err, ValueError::OutOfRange { .. }));
        assert!(out.is_empty());

        encode_value(&Value::Int(i32::MIN as i64), ColumnType::Int32, &mut out).unwrap();
        encode_value(&Value::Int(i32::MAX as i64), ColumnType::Int32, &mut out).unwrap();
        assert!(encode_value(&Value::Int(i32::MAX as i64 + 1), ColumnType::Int32, &mut out).is_err());
    }

    #[test]
    fn int32_rejects_non_integers() {
        let mut out = Vec::new();
        let err = encode_value(&Value::Float(1.5), ColumnType::Int32, &mut out).unwrap_err();
        assert!(matches!(err, ValueError::Coercion(_)));
        let err = encode_value(&"7".into(), ColumnType::Int32, &mut out).unwrap_err();
        assert!(matches!(err, ValueError::Coercion(_)));
    }

    #[test]
    fn float64_passes_special_values_bit_for_bit() {
        let nan = f64::from_bits(0x7ff8_0000_dead_beef);
        let mut out = Vec::new();
        for v in [nan, f64::INFINITY, f64::NEG_INFINITY, -0.0] {
            encode_value(&Value::Float(v), ColumnType::Float64, &mut out).unwrap();
        }
        let decoded = decode_fixed_column(ColumnType::Float64, &out, 4).unwrap();
        let ColumnData::Float64(values) = decoded else {
            panic!("expected float64 column");
        };
        assert_eq!(values[0].to_bits(), nan.to_bits());
        assert_eq!(values[1], f64::INFINITY);
        assert_eq!(values[2], f64::NEG_INFINITY);
        assert_eq!(values[3].to_bits(), (-0.0f64).to_bits());
    }

    #[test]
    fn float64_widens_integers() {
        let mut out = Vec::new();
        encode_value(&Value::Int(3), ColumnType::Float64, &mut out).unwrap();
        assert_eq!(out, 3.0f64.to_le_bytes());
    }

    #[test]
    fn decode_value_needs_full_width() {
        let mut cursor: &[u8] = &[1, 2, 3];
        assert!(matches!(
            decode_value(&mut cursor, ColumnType::Int32),
            Err(CcolError::CorruptBlock(_))
        ));
        assert!(decode_value(&mut cursor, ColumnType::Utf8).is_err());
    }

    #[test]
    fn strings_encode_as_payload_and_offsets() {
        let values: Vec<Value> = vec!["apple".into(), "".into(), "banana".into()];
        let encoded = encode_column("name", ColumnType::Utf8, &values).unwrap();
        let EncodedColumn::Strings { payload, offsets } = encoded else {
            panic!("expected payload/offsets pair");
        };
        assert_eq!(payload, b"applebanana");
        assert_eq!(decode_offsets(&offsets, 3).unwrap(), vec![5, 5, 11]);

        let strings = decode_strings(&payload, &offsets, 3).unwrap();
        assert_eq!(strings, vec!["apple", "", "banana"]);
    }

    #[test]
    fn multibyte_utf8_survives() {
        let values: Vec<Value> = vec!["héllo".into(), "日本".into()];
        let EncodedColumn::Strings { payload, offsets } =
            encode_column("s", ColumnType::Utf8, &values).unwrap()
        else {
            panic!("expected payload/offsets pair");
        };
        assert_eq!(decode_strings(&payload, &offsets, 2).unwrap(), vec!["héllo", "日本"]);
    }

    #[test]
    fn string_column_rejects_numbers() {
        let err = encode_column("name", ColumnType::Utf8, &[Value::Int(1)]).unwrap_err();
        assert!(matches!(err, CcolError::TypeCoercion { row: 0, .. }));
    }

    #[test]
    fn encode_column_reports_row() {
        let values = vec![Value::Int(1), Value::Int(2), Value::Int(1 << 40)];
        match encode_column("id", ColumnType::Int32, &values).unwrap_err() {
            CcolError::OutOfRange { column, row, .. } => {
                assert_eq!(column, "id");
                assert_eq!(row, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn corrupt_offsets_are_rejected() {
        let payload = b"abc";
        let decreasing: Vec<u8> = [2u32, 1, 3].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert!(decode_strings(payload, &decreasing, 3).is_err());

        let short_last: Vec<u8> = [1u32, 2].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert!(decode_strings(payload, &short_last, 2).is_err());

        let wrong_count: Vec<u8> = 3u32.to_le_bytes().to_vec();
        assert!(decode_strings(payload, &wrong_count, 2).is_err());

        let split_char = "é".as_bytes();
        let mid: Vec<u8> = [1u32, 2].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert!(decode_strings(split_char, &mid, 2).is_err());
    }

    #[test]
    fn empty_string_column() {
        let EncodedColumn::Strings { payload, offsets } =
            encode_column("s", ColumnType::Utf8, &[]).unwrap()
        else {
            panic!("expected payload/offsets pair");
        };
        assert!(payload.is_empty() && offsets.is_empty());
        assert!(decode_strings(&payload, &offsets, 0).unwrap().is_empty());
    }

    #[test]
    fn fixed_column_length_must_match_rows() {
        assert!(decode_fixed_column(ColumnType::Int32, &[0; 8], 3).is_err());
        assert_eq!(
            decode_fixed_column(ColumnType::Int32, &[1, 0, 0, 0, 2, 0, 0, 0], 2).unwrap(),
            ColumnData::Int32(vec![1, 2])
        );
    }
}
