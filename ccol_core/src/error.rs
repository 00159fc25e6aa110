use std::io;

use thiserror::Error;

/// Every way an encode or decode call can fail.
///
/// None of these are transient: the call that produced one has stopped and
/// returned nothing partial.
#[derive(Debug, Error)]
pub enum CcolError {
    #[error("invalid CCOL magic bytes {0:?}: not a CCOL file")]
    BadMagic([u8; 4]),

    #[error("unsupported CCOL version {0} (only version 1 is supported)")]
    UnsupportedVersion(u8),

    #[error("unsupported endianness flag {0} (only 0 = little-endian is supported)")]
    UnsupportedEndianness(u8),

    #[error("corrupt block: {0}")]
    CorruptBlock(String),

    #[error("corrupt metadata table: {0}")]
    CorruptMetadata(String),

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("column '{column}' row {row}: {message}")]
    TypeCoercion {
        column: String,
        row: usize,
        message: String,
    },

    #[error("column '{column}' row {row}: value {value} out of range for {type_name}")]
    OutOfRange {
        column: String,
        row: usize,
        value: String,
        type_name: &'static str,
    },

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("cannot encode a file with zero columns")]
    EmptyColumnSet,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, CcolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = CcolError::OutOfRange {
            column: "id".into(),
            row: 3,
            value: "4294967296".into(),
            type_name: "int32",
        };
        let msg = err.to_string();
        assert!(msg.contains("'id'"));
        assert!(msg.contains("row 3"));
        assert!(msg.contains("int32"));

        let err = CcolError::BadMagic(*b"PAR1");
        assert!(err.to_string().contains("not a CCOL file"));
    }

    #[test]
    fn io_errors_convert() {
        let err: CcolError = io::Error::new(io::ErrorKind::Other, "disk gone").into();
        assert!(matches!(err, CcolError::Io(_)));
    }
}
