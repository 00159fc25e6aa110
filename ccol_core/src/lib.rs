pub mod compression;
pub mod error;
pub mod format;
pub mod reader;
pub mod schema;
pub mod types;
pub mod writer;

pub use error::{CcolError, Result};
pub use format::{BlockDescriptor, ColumnMeta, FileHeader, HEADER_SIZE, MAGIC};
pub use reader::{decode, read_file, Reader};
pub use schema::{Field, Schema};
pub use types::{ColumnData, ColumnType, Value};
pub use writer::{encode, write_file, ColumnMap, FileSummary, Writer};
