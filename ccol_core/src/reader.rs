use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

use crate::compression;
use crate::error::{CcolError, Result};
use crate::format::{decode_metadata, BlockDescriptor, ColumnMeta, FileHeader, HEADER_SIZE};
use crate::schema::Schema;
use crate::types::{decode_fixed_column, decode_strings, ColumnData, Encoding};

/// Selective-column reader for CCOL files.
///
/// # Open sequence
/// 1. Read the 30-byte header (magic, version, endianness, row/column counts).
/// 2. Seek to `metadata_offset`, read exactly `metadata_len` bytes, parse the
///    column table into RAM.
///
/// # Access pattern
/// [`read_column`](Reader::read_column) seeks straight to that column's
/// block(s) and reads exactly `comp_size` bytes each. Blocks belonging to
/// other columns are never touched, so I/O is proportional to the columns
/// requested rather than to the file.
pub struct Reader<R: Read + Seek> {
    inner: R,
    pub header: FileHeader,
    /// Length of the underlying stream, taken once at open.
    file_len: u64,
    schema: Schema,
    columns: Vec<ColumnMeta>,
}

impl Reader<File> {
    /// Open a CCOL file on disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(File::open(path)?)
    }
}

impl<R: Read + Seek> Reader<R> {
    /// Parse header and metadata from `inner`.
    pub fn new(mut inner: R) -> Result<Self> {
        // ── Header ──────────────────────────────────────────────────────────
        let mut header_buf = [0u8; HEADER_SIZE as usize];
        inner.seek(SeekFrom::Start(0))?;
        inner.read_exact(&mut header_buf).map_err(|e| truncated(e, "file header"))?;
        let header = FileHeader::from_bytes(&header_buf)?;

        // ── Metadata table ──────────────────────────────────────────────────
        if header.metadata_offset < HEADER_SIZE {
            return Err(CcolError::CorruptMetadata(format!(
                "metadata offset {} points inside the header",
                header.metadata_offset
            )));
        }
        let file_len = inner.seek(SeekFrom::End(0))?;
        let data_start = header
            .metadata_offset
            .checked_add(header.metadata_len as u64)
            .ok_or_else(|| {
                CcolError::CorruptMetadata(format!(
                    "metadata offset {} plus length {} overflows",
                    header.metadata_offset, header.metadata_len
                ))
            })?;
        if data_start > file_len {
            return Err(CcolError::CorruptMetadata(format!(
                "metadata table ends at {} but the file is {} bytes",
                data_start, file_len
            )));
        }
        inner.seek(SeekFrom::Start(header.metadata_offset))?;
        let mut table = vec![0u8; header.metadata_len as usize];
        inner.read_exact(&mut table).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => CcolError::CorruptMetadata(format!(
                "file ends before the {}-byte metadata table",
                header.metadata_len
            )),
            _ => CcolError::Io(e),
        })?;
        let columns = decode_metadata(&table, header.column_count, data_start)?;
        let schema = Schema::new(columns.iter().map(ColumnMeta::field).collect())?;

        debug!(
            rows = header.row_count,
            columns = columns.len(),
            "opened CCOL file"
        );

        Ok(Self {
            inner,
            header,
            file_len,
            schema,
            columns,
        })
    }

    pub fn row_count(&self) -> u64 {
        self.header.row_count
    }

    /// Schema in on-disk metadata order.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }

    pub fn column_meta(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Total uncompressed size of all blocks.
    pub fn raw_size(&self) -> u64 {
        self.columns.iter().fold(0, |acc, c| acc.saturating_add(c.raw_size()))
    }

    /// Total compressed size of all blocks (excluding header and metadata).
    pub fn compressed_size(&self) -> u64 {
        self.columns.iter().fold(0, |acc, c| acc.saturating_add(c.compressed_size()))
    }

    /// Compression ratio (raw / compressed).
    pub fn ratio(&self) -> f64 {
        let compressed = self.compressed_size();
        if compressed == 0 {
            return 1.0;
        }
        self.raw_size() as f64 / compressed as f64
    }

    /// Read, verify, and decompress a single block.
    fn read_block(&mut self, column: &str, block: &BlockDescriptor) -> Result<Vec<u8>> {
        if block.end() > self.file_len {
            return Err(CcolError::CorruptBlock(format!(
                "column '{}' block at {} runs past end of file ({} + {} > {})",
                column, block.offset, block.offset, block.comp_size, self.file_len
            )));
        }
        self.inner.seek(SeekFrom::Start(block.offset))?;

        let len = usize::try_from(block.comp_size).map_err(|_| {
            CcolError::CorruptBlock(format!(
                "column '{}': block size {} does not fit in memory",
                column, block.comp_size
            ))
        })?;
        let mut compressed = vec![0u8; len];
        self.inner
            .read_exact(&mut compressed)
            .map_err(|e| truncated(e, &format!("block of column '{}'", column)))?;

        let computed = xxh3_64(&compressed);
        if computed != block.checksum {
            return Err(CcolError::CorruptBlock(format!(
                "column '{}' block at {} checksum mismatch: expected {:016x}, got {:016x}",
                column, block.offset, block.checksum, computed
            )));
        }

        let raw = compression::decompress(&compressed, usize::try_from(block.raw_size).ok())
            .map_err(|e| match e {
                CcolError::CorruptBlock(msg) => {
                    CcolError::CorruptBlock(format!("column '{}': {}", column, msg))
                }
                other => other,
            })?;
        if raw.len() as u64 != block.raw_size {
            return Err(CcolError::CorruptBlock(format!(
                "column '{}' block at {} decompressed to {} bytes but metadata says {}",
                column,
                block.offset,
                raw.len(),
                block.raw_size
            )));
        }

        debug!(column, offset = block.offset, comp_size = block.comp_size, "read block");
        Ok(raw)
    }

    /// Decode one column, touching only its own blocks.
    pub fn read_column(&mut self, name: &str) -> Result<ColumnData> {
        let meta = self
            .column_meta(name)
            .cloned()
            .ok_or_else(|| CcolError::UnknownColumn(name.to_string()))?;
        let rows = usize::try_from(self.header.row_count).map_err(|_| {
            CcolError::CorruptMetadata(format!("row count {} exceeds usize", self.header.row_count))
        })?;

        let data = match meta.column_type.encoding() {
            Encoding::Fixed(_) => {
                let raw = self.read_block(name, &meta.blocks[0])?;
                decode_fixed_column(meta.column_type, &raw, rows)
            }
            Encoding::Variable => {
                let payload = self.read_block(name, &meta.blocks[0])?;
                let offsets = self.read_block(name, &meta.blocks[1])?;
                decode_strings(&payload, &offsets, rows).map(ColumnData::Utf8)
            }
        };
        data.map_err(|e| match e {
            CcolError::CorruptBlock(msg) => {
                CcolError::CorruptBlock(format!("column '{}': {}", name, msg))
            }
            other => other,
        })
    }

    /// Decode `wanted` columns, or every column when `wanted` is `None`.
    ///
    /// Every requested name is checked before any block is read.
    pub fn read(&mut self, wanted: Option<&[&str]>) -> Result<HashMap<String, ColumnData>> {
        let names: Vec<String> = match wanted {
            Some(names) => {
                if let Some(missing) = names.iter().find(|n| self.column_meta(n).is_none()) {
                    return Err(CcolError::UnknownColumn(missing.to_string()));
                }
                names.iter().map(|n| n.to_string()).collect()
            }
            None => self.columns.iter().map(|c| c.name.clone()).collect(),
        };

        let mut out = HashMap::with_capacity(names.len());
        for name in names {
            if out.contains_key(&name) {
                continue;
            }
            let data = self.read_column(&name)?;
            out.insert(name, data);
        }
        Ok(out)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

fn truncated(e: io::Error, what: &str) -> CcolError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            CcolError::CorruptBlock(format!("file ends inside {}", what))
        }
        _ => CcolError::Io(e),
    }
}

/// Decode an in-memory CCOL file.
pub fn decode(bytes: &[u8], wanted: Option<&[&str]>) -> Result<HashMap<String, ColumnData>> {
    Reader::new(Cursor::new(bytes))?.read(wanted)
}

/// Open `path` and decode the requested columns.
pub fn read_file(path: impl AsRef<Path>, wanted: Option<&[&str]>) -> Result<HashMap<String, ColumnData>> {
    Reader::open(path)?.read(wanted)
}
