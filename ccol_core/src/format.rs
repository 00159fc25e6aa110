use std::collections::HashSet;

use crate::error::{CcolError, Result};
use crate::schema::{Field, Schema};
use crate::types::ColumnType;

/// Magic bytes at offset 0 of every CCOL file.
pub const MAGIC: &[u8; 4] = b"CCOL";

pub const FORMAT_VERSION: u8 = 1;

/// Endianness flag value for little-endian; the only one written or accepted.
pub const ENDIAN_LITTLE: u8 = 0;

/// Fixed size of the file header in bytes.
///   magic[4] + version:u8 + endian:u8 + row_count:u64 + column_count:u32
///   + metadata_offset:u64 + metadata_len:u32
///   = 4 + 1 + 1 + 8 + 4 + 8 + 4 = 30
pub const HEADER_SIZE: u64 = 30;

/// Size of one serialized [`BlockDescriptor`].
///   offset:u64 + comp_size:u64 + raw_size:u64 + checksum:u64 = 32
pub const BLOCK_DESCRIPTOR_SIZE: usize = 32;

/// Smallest possible metadata entry: empty name, one block.
///   name_len:u16 + tag:u8 + block_count:u8 + one descriptor = 36
const MIN_ENTRY_SIZE: usize = 2 + 1 + 1 + BLOCK_DESCRIPTOR_SIZE;

// ── Header ─────────────────────────────────────────────────────────────────

/// Decoded representation of the 30-byte header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u8,
    pub row_count: u64,
    pub column_count: u32,
    /// Absolute position of the metadata table.
    pub metadata_offset: u64,
    pub metadata_len: u32,
}

impl FileHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE as usize] {
        let mut buf = [0u8; HEADER_SIZE as usize];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4] = self.version;
        buf[5] = ENDIAN_LITTLE;
        buf[6..14].copy_from_slice(&self.row_count.to_le_bytes());
        buf[14..18].copy_from_slice(&self.column_count.to_le_bytes());
        buf[18..26].copy_from_slice(&self.metadata_offset.to_le_bytes());
        buf[26..30].copy_from_slice(&self.metadata_len.to_le_bytes());
        buf
    }

    /// Deserialize, checking magic, version, and endianness.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE as usize]) -> Result<Self> {
        let magic: [u8; 4] = fixed(&buf[0..4]);
        if &magic != MAGIC {
            return Err(CcolError::BadMagic(magic));
        }
        if buf[4] != FORMAT_VERSION {
            return Err(CcolError::UnsupportedVersion(buf[4]));
        }
        if buf[5] != ENDIAN_LITTLE {
            return Err(CcolError::UnsupportedEndianness(buf[5]));
        }
        Ok(Self {
            version: buf[4],
            row_count: u64::from_le_bytes(fixed(&buf[6..14])),
            column_count: u32::from_le_bytes(fixed(&buf[14..18])),
            metadata_offset: u64::from_le_bytes(fixed(&buf[18..26])),
            metadata_len: u32::from_le_bytes(fixed(&buf[26..30])),
        })
    }
}

fn fixed<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

// ── Block descriptors ──────────────────────────────────────────────────────

/// Locates and describes one compressed block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockDescriptor {
    /// Absolute byte offset of the block from the start of the file.
    pub offset: u64,
    pub comp_size: u64,
    /// Length of the block after decompression.
    pub raw_size: u64,
    /// xxh3-64 of the compressed bytes.
    pub checksum: u64,
}

impl BlockDescriptor {
    pub fn to_bytes(&self) -> [u8; BLOCK_DESCRIPTOR_SIZE] {
        let mut buf = [0u8; BLOCK_DESCRIPTOR_SIZE];
        buf[0..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..16].copy_from_slice(&self.comp_size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.raw_size.to_le_bytes());
        buf[24..32].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; BLOCK_DESCRIPTOR_SIZE]) -> Self {
        Self {
            offset: u64::from_le_bytes(fixed(&buf[0..8])),
            comp_size: u64::from_le_bytes(fixed(&buf[8..16])),
            raw_size: u64::from_le_bytes(fixed(&buf[16..24])),
            checksum: u64::from_le_bytes(fixed(&buf[24..32])),
        }
    }

    /// One past the last byte of the block.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.comp_size)
    }
}

// ── Metadata table ─────────────────────────────────────────────────────────

/// Metadata for one column: its type and where its blocks live.
///
/// Numeric columns have one block. String columns have two, payload first
/// and offsets second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub column_type: ColumnType,
    pub blocks: Vec<BlockDescriptor>,
}

impl ColumnMeta {
    pub fn compressed_size(&self) -> u64 {
        self.blocks.iter().fold(0, |acc, b| acc.saturating_add(b.comp_size))
    }

    pub fn raw_size(&self) -> u64 {
        self.blocks.iter().fold(0, |acc, b| acc.saturating_add(b.raw_size))
    }

    pub fn field(&self) -> Field {
        Field::new(self.name.clone(), self.column_type)
    }
}

/// Serialized size of a single metadata entry.
fn entry_len(name: &str, column_type: ColumnType) -> usize {
    2 + name.len() + 1 + 1 + column_type.block_count() * BLOCK_DESCRIPTOR_SIZE
}

/// Exact size of the metadata table for `schema`.
///
/// Descriptors are fixed width, so this is known before any block is written,
/// which lets the writer reserve the region up front.
pub fn metadata_len(schema: &Schema) -> usize {
    schema
        .fields()
        .iter()
        .map(|f| entry_len(&f.name, f.column_type))
        .sum()
}

pub fn encode_metadata(columns: &[ColumnMeta]) -> Result<Vec<u8>> {
    let total = columns
        .iter()
        .map(|c| entry_len(&c.name, c.column_type))
        .sum();
    let mut buf = Vec::with_capacity(total);
    for col in columns {
        let name_len = u16::try_from(col.name.len()).map_err(|_| {
            CcolError::SchemaMismatch(format!(
                "column name of {} bytes exceeds the 65535-byte limit",
                col.name.len()
            ))
        })?;
        if col.blocks.len() != col.column_type.block_count() {
            return Err(CcolError::SchemaMismatch(format!(
                "column '{}' has {} blocks, {} expects {}",
                col.name,
                col.blocks.len(),
                col.column_type,
                col.column_type.block_count()
            )));
        }
        buf.extend_from_slice(&name_len.to_le_bytes());
        buf.extend_from_slice(col.name.as_bytes());
        buf.push(col.column_type.tag());
        buf.push(col.blocks.len() as u8);
        for block in &col.blocks {
            buf.extend_from_slice(&block.to_bytes());
        }
    }
    Ok(buf)
}

/// Cursor over the raw metadata table.
struct MetaCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> MetaCursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.buf.len());
        match end {
            Some(end) => {
                let out = &self.buf[self.pos..end];
                self.pos = end;
                Ok(out)
            }
            None => Err(CcolError::CorruptMetadata(format!(
                "table ends at byte {} while reading {} more",
                self.buf.len(),
                n
            ))),
        }
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(fixed(self.take(2)?)))
    }
}

/// Parse and validate a metadata table.
///
/// `data_start` is the first byte after the table; every block must lie at or
/// beyond it and no two blocks may overlap.
pub fn decode_metadata(buf: &[u8], column_count: u32, data_start: u64) -> Result<Vec<ColumnMeta>> {
    let count = usize::try_from(column_count).unwrap_or(usize::MAX);
    if count > buf.len() / MIN_ENTRY_SIZE {
        return Err(CcolError::CorruptMetadata(format!(
            "{} columns cannot fit in a {}-byte table",
            column_count,
            buf.len()
        )));
    }
    let mut cursor = MetaCursor { buf, pos: 0 };
    let mut columns = Vec::with_capacity(count);
    let mut names = HashSet::new();

    for _ in 0..column_count {
        let name_len = cursor.u16()? as usize;
        let name = std::str::from_utf8(cursor.take(name_len)?)
            .map_err(|e| CcolError::CorruptMetadata(format!("column name is not UTF-8: {}", e)))?
            .to_string();
        if !names.insert(name.clone()) {
            return Err(CcolError::CorruptMetadata(format!(
                "duplicate column name '{}'",
                name
            )));
        }

        let tag = cursor.u8()?;
        let column_type = ColumnType::from_tag(tag).ok_or_else(|| {
            CcolError::CorruptMetadata(format!("column '{}' has unknown type tag {}", name, tag))
        })?;

        let block_count = cursor.u8()? as usize;
        if block_count != column_type.block_count() {
            return Err(CcolError::CorruptMetadata(format!(
                "column '{}' ({}) lists {} blocks, expected {}",
                name,
                column_type,
                block_count,
                column_type.block_count()
            )));
        }

        let mut blocks = Vec::with_capacity(block_count);
        for _ in 0..block_count {
            blocks.push(BlockDescriptor::from_bytes(&fixed(
                cursor.take(BLOCK_DESCRIPTOR_SIZE)?,
            )));
        }
        columns.push(ColumnMeta {
            name,
            column_type,
            blocks,
        });
    }

    if cursor.pos != buf.len() {
        return Err(CcolError::CorruptMetadata(format!(
            "{} unexpected trailing bytes",
            buf.len() - cursor.pos
        )));
    }

    check_block_ranges(&columns, data_start)?;
    Ok(columns)
}

fn check_block_ranges(columns: &[ColumnMeta], data_start: u64) -> Result<()> {
    let mut ranges: Vec<(u64, u64, &str)> = columns
        .iter()
        .flat_map(|c| c.blocks.iter().map(move |b| (b.offset, b.end(), c.name.as_str())))
        .collect();
    ranges.sort_unstable();

    let mut prev_end = data_start;
    let mut prev_name = "<metadata>";
    for (start, end, name) in ranges {
        if start < prev_end {
            return Err(CcolError::CorruptMetadata(format!(
                "block of column '{}' at {} overlaps '{}' ending at {}",
                name, start, prev_name, prev_end
            )));
        }
        prev_end = end;
        prev_name = name;
    }
    Ok(())
}
