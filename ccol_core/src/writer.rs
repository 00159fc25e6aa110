use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Cursor, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, info, warn};
use xxhash_rust::xxh3::xxh3_64;

use crate::compression;
use crate::error::{CcolError, Result};
use crate::format::{
    encode_metadata, metadata_len, BlockDescriptor, ColumnMeta, FileHeader, FORMAT_VERSION,
    HEADER_SIZE,
};
use crate::schema::Schema;
use crate::types::{encode_column, Value};

/// Column name → values, as handed to the encoder.
pub type ColumnMap = HashMap<String, Vec<Value>>;

/// What a completed write produced.
#[derive(Debug, Clone)]
pub struct FileSummary {
    pub row_count: u64,
    pub columns: Vec<ColumnMeta>,
    /// Total bytes written, header included.
    pub file_size: u64,
}

/// One-pass writer for CCOL files.
///
/// # Format layout written
/// ```text
/// [HEADER: 30 bytes, metadata_offset = 30]
/// [METADATA TABLE: reserved as zeros, size known from the schema]
/// [BLOCK 0] [BLOCK 1] ... [BLOCK N-1]      ← schema order, strings = payload + offsets
/// ← seek back to 30, overwrite the reserved region with the real table
/// ```
pub struct Writer<W: Write + Seek> {
    inner: W,
    schema: Schema,
    /// Current write position in the output (mirrors the cursor).
    current_offset: u64,
}

impl Writer<BufWriter<File>> {
    /// Create (or truncate) a CCOL file at `path`.
    pub fn create(path: impl AsRef<Path>, schema: Schema) -> Result<Self> {
        if schema.is_empty() {
            return Err(CcolError::EmptyColumnSet);
        }
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), schema)
    }
}

impl<W: Write + Seek> Writer<W> {
    /// Wrap `inner`. The file is written from position 0.
    pub fn new(inner: W, schema: Schema) -> Result<Self> {
        if schema.is_empty() {
            return Err(CcolError::EmptyColumnSet);
        }
        Ok(Self {
            inner,
            schema,
            current_offset: 0,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Check that `columns` matches the schema exactly; returns the row count.
    fn validate(&self, columns: &ColumnMap) -> Result<usize> {
        let mut row_count = None;
        for field in self.schema.fields() {
            let values = columns.get(&field.name).ok_or_else(|| {
                CcolError::SchemaMismatch(format!("no data supplied for column '{}'", field.name))
            })?;
            match row_count {
                None => row_count = Some(values.len()),
                Some(n) if n != values.len() => {
                    return Err(CcolError::SchemaMismatch(format!(
                        "column '{}' has {} rows, expected {}",
                        field.name,
                        values.len(),
                        n
                    )))
                }
                Some(_) => {}
            }
        }
        if let Some(extra) = columns.keys().find(|k| self.schema.field(k).is_none()) {
            return Err(CcolError::SchemaMismatch(format!(
                "column '{}' is not in the schema",
                extra
            )));
        }
        row_count.ok_or(CcolError::EmptyColumnSet)
    }

    /// Compress `raw` as a single block and append it.
    fn flush_block(&mut self, raw: &[u8]) -> Result<BlockDescriptor> {
        let compressed = compression::compress(raw)?;
        let descriptor = BlockDescriptor {
            offset: self.current_offset,
            comp_size: compressed.len() as u64,
            raw_size: raw.len() as u64,
            checksum: xxh3_64(&compressed),
        };
        self.inner.write_all(&compressed)?;
        self.current_offset += descriptor.comp_size;
        Ok(descriptor)
    }

    /// Encode every column, write all blocks and the metadata table.
    ///
    /// Returns the summary together with the underlying writer.
    pub fn write(mut self, columns: &ColumnMap) -> Result<(FileSummary, W)> {
        let row_count = self.validate(columns)?;

        let meta_len = metadata_len(&self.schema);
        let header = FileHeader {
            version: FORMAT_VERSION,
            row_count: row_count as u64,
            column_count: u32::try_from(self.schema.len()).map_err(|_| {
                CcolError::SchemaMismatch(format!("{} columns exceed u32", self.schema.len()))
            })?,
            metadata_offset: HEADER_SIZE,
            metadata_len: u32::try_from(meta_len).map_err(|_| {
                CcolError::SchemaMismatch(format!("metadata table of {} bytes exceeds u32", meta_len))
            })?,
        };

        // ── Header + reserved metadata region ───────────────────────────────
        self.inner.seek(SeekFrom::Start(0))?;
        self.inner.write_all(&header.to_bytes())?;
        self.inner.write_all(&vec![0u8; meta_len])?;
        self.current_offset = HEADER_SIZE + meta_len as u64;

        // ── Column blocks ───────────────────────────────────────────────────
        let fields = self.schema.fields().to_vec();
        let mut metas = Vec::with_capacity(fields.len());
        for field in &fields {
            let values = &columns[&field.name];
            let encoded = encode_column(&field.name, field.column_type, values)?;
            let mut blocks = Vec::with_capacity(field.column_type.block_count());
            for raw in encoded.into_buffers() {
                let block = self.flush_block(&raw)?;
                debug!(
                    column = %field.name,
                    offset = block.offset,
                    comp_size = block.comp_size,
                    raw_size = block.raw_size,
                    "wrote block"
                );
                blocks.push(block);
            }
            metas.push(ColumnMeta {
                name: field.name.clone(),
                column_type: field.column_type,
                blocks,
            });
        }

        // ── Metadata table into the reserved region ─────────────────────────
        let table = encode_metadata(&metas)?;
        debug_assert_eq!(table.len(), meta_len);
        self.inner.seek(SeekFrom::Start(header.metadata_offset))?;
        self.inner.write_all(&table)?;
        self.inner.seek(SeekFrom::Start(self.current_offset))?;
        self.inner.flush()?;

        info!(
            rows = row_count,
            columns = metas.len(),
            bytes = self.current_offset,
            "finished writing CCOL file"
        );

        Ok((
            FileSummary {
                row_count: row_count as u64,
                columns: metas,
                file_size: self.current_offset,
            },
            self.inner,
        ))
    }
}

/// Encode `columns` into an in-memory CCOL file.
pub fn encode(schema: &Schema, columns: &ColumnMap) -> Result<Vec<u8>> {
    let writer = Writer::new(Cursor::new(Vec::new()), schema.clone())?;
    let (_, cursor) = writer.write(columns)?;
    Ok(cursor.into_inner())
}

/// Write a CCOL file at `path`.
///
/// On failure the partially written file is removed before the error is
/// returned.
pub fn write_file(path: impl AsRef<Path>, schema: &Schema, columns: &ColumnMap) -> Result<FileSummary> {
    let path = path.as_ref();
    // Nothing to clean up until `create` has opened the file.
    let writer = Writer::create(path, schema.clone())?;
    match writer.write(columns) {
        Ok((summary, _)) => Ok(summary),
        Err(e) => {
            if let Err(rm) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %rm, "could not remove partial file");
            }
            Err(e)
        }
    }
}
