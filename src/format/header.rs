//! File header: the root record at byte offset zero.
//!
//! # Layout (38 bytes)
//!
//! ```text
//! Bytes 0-3:   Magic word 0x49726973 ("Iris")
//! Bytes 4-5:   Recovery tag (0x5501)
//! Bytes 6-13:  File size (u64) — must equal the OS-reported size
//! Bytes 14-15: Extension major version (u16)
//! Bytes 16-17: Extension minor version (u16)
//! Bytes 18-21: File revision number (u32)
//! Bytes 22-29: Tile table offset (u64, required)
//! Bytes 30-37: Metadata offset (u64, required even when empty)
//! ```
//!
//! Unlike every other block, the header stores the magic word where the
//! validation word would sit; its identity check is magic + tag rather
//! than the self-offset word.

use crate::error::IrisError;
use crate::format::block::{store_target, DataBlock};
use crate::format::metadata::MetadataBlock;
use crate::format::tags::{
    RecoveryTag, EXTENSION_MAJOR, EXTENSION_MINOR, EXTENSION_VERSION, MAGIC_BYTES,
};
use crate::format::tile_table::TileTableBlock;
use crate::io::primitive::{load_u16, load_u32, load_u64, store_u16, store_u32, store_u64};
use crate::io::Region;
use crate::slide::abstraction::Header;

const MAGIC: u64 = 0;
const RECOVERY: u64 = 4;
const FILE_SIZE: u64 = 6;
const EXT_MAJOR: u64 = 14;
const EXT_MINOR: u64 = 16;
const REVISION: u64 = 18;
const TILE_TABLE_OFFSET: u64 = 22;
const METADATA_OFFSET: u64 = 30;

/// On-disk size of the v1.0 file header.
pub const FILE_HEADER_SIZE: u64 = 38;

/// Descriptor of the root file header record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeaderBlock {
    desc: DataBlock,
}

impl FileHeaderBlock {
    /// Create the root descriptor for a file of `file_size` bytes.
    ///
    /// The header always lives at offset zero; the file size must be the
    /// size reported by the operating system for the mapped file.
    pub fn new(file_size: u64) -> Self {
        FileHeaderBlock {
            desc: DataBlock::new(0, file_size, EXTENSION_VERSION),
        }
    }

    #[inline]
    pub fn descriptor(&self) -> &DataBlock {
        &self.desc
    }

    /// On-disk size of the header record.
    pub fn size<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        let version = self.version(base)?;
        let size = FILE_HEADER_SIZE;
        if version > crate::format::tags::EXTENSION_1_0 {
            // Extension slot: revision 2+ fields extend the size here.
        }
        Ok(size)
    }

    /// Packed extension version (`major << 16 | minor`) stored in the file.
    pub fn version<R: Region + ?Sized>(&self, base: &R) -> Result<u32, IrisError> {
        let header = base.get(0, FILE_HEADER_SIZE)?;
        Ok((load_u16(&header[EXT_MAJOR as usize..]) as u32) << 16
            | load_u16(&header[EXT_MINOR as usize..]) as u32)
    }

    /// Validate the header record against the byte region.
    ///
    /// Checks the magic word, the recovery tag, and reconciles the stored
    /// file size with the OS-reported size; any mismatch is fatal (it
    /// indicates truncation or appending). A file written by a newer
    /// extension version is not an error: the check returns a warning and
    /// readers proceed using the v1.0 field prefix.
    pub fn validate_header<R: Region + ?Sized>(
        &self,
        base: &R,
    ) -> Result<Option<String>, IrisError> {
        if self.desc.file_size == 0 {
            return Err(IrisError::InvalidBlockOffset {
                block: "FILE_HEADER",
                offset: 0,
                file_size: 0,
            });
        }
        let header = base.get(0, FILE_HEADER_SIZE)?;

        let magic = load_u32(&header[MAGIC as usize..]);
        if magic != MAGIC_BYTES {
            return Err(IrisError::InvalidMagic(magic));
        }
        let tag = load_u16(&header[RECOVERY as usize..]);
        if tag != RecoveryTag::FileHeader.as_u16() {
            return Err(IrisError::RecoveryTagMismatch {
                block: "FILE_HEADER",
                expected: RecoveryTag::FileHeader.as_u16(),
                found: tag,
            });
        }
        let stored = load_u64(&header[FILE_SIZE as usize..]);
        if stored != self.desc.file_size {
            return Err(IrisError::FileSizeMismatch {
                stored,
                actual: self.desc.file_size,
            });
        }

        let major = load_u16(&header[EXT_MAJOR as usize..]);
        let minor = load_u16(&header[EXT_MINOR as usize..]);
        if major > EXTENSION_MAJOR || (major == EXTENSION_MAJOR && minor > EXTENSION_MINOR) {
            return Ok(Some(format!(
                "this Iris extension implementation ({}.{}) is older than the extension version \
                 used to generate the slide file ({}.{}); decoding is restricted to the fields \
                 defined by version {}.{}",
                EXTENSION_MAJOR, EXTENSION_MINOR, major, minor, EXTENSION_MAJOR, EXTENSION_MINOR,
            )));
        }
        Ok(None)
    }

    /// Validate the header and both child offsets.
    ///
    /// Children are checked with their own offset validation; the full
    /// recursion into their tails belongs to the depth-first walk in
    /// [`validate_file_structure`](crate::validate_file_structure).
    pub fn validate_full<R: Region + ?Sized>(&self, base: &R) -> Result<Option<String>, IrisError> {
        use crate::format::block::Block;

        let warning = self.validate_header(base)?;
        let version = self.version(base)?;
        let header = base.get(0, FILE_HEADER_SIZE)?;

        let tile_table = TileTableBlock::new(
            load_u64(&header[TILE_TABLE_OFFSET as usize..]),
            self.desc.file_size,
            version,
        );
        tile_table.validate_offset(base)?;

        let metadata = MetadataBlock::new(
            load_u64(&header[METADATA_OFFSET as usize..]),
            self.desc.file_size,
            version,
        );
        metadata.validate_offset(base)?;

        if version > crate::format::tags::EXTENSION_1_0 {
            // Extension slot: revision 2+ validations are added here.
        }
        Ok(warning)
    }

    /// Lift the header fields.
    pub fn read_header<R: Region + ?Sized>(&self, base: &R) -> Result<Header, IrisError> {
        self.validate_header(base)?;
        let header = base.get(0, FILE_HEADER_SIZE)?;
        Ok(Header {
            file_size: load_u64(&header[FILE_SIZE as usize..]),
            extension_version: (load_u16(&header[EXT_MAJOR as usize..]) as u32) << 16
                | load_u16(&header[EXT_MINOR as usize..]) as u32,
            revision: load_u32(&header[REVISION as usize..]),
        })
    }

    /// Stored tile table offset.
    pub fn tile_table_offset<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        Ok(load_u64(base.get(TILE_TABLE_OFFSET, 8)?))
    }

    /// Stored metadata offset.
    pub fn metadata_offset<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        Ok(load_u64(base.get(METADATA_OFFSET, 8)?))
    }

    /// Descriptor of the tile table block, offset-validated.
    pub fn tile_table<R: Region + ?Sized>(&self, base: &R) -> Result<TileTableBlock, IrisError> {
        use crate::format::block::Block;

        let version = self.version(base)?;
        let block = TileTableBlock::new(
            self.tile_table_offset(base)?,
            self.desc.file_size,
            version,
        );
        block.validate_offset(base)?;
        Ok(block)
    }

    /// Descriptor of the metadata block, offset-validated.
    pub fn metadata<R: Region + ?Sized>(&self, base: &R) -> Result<MetadataBlock, IrisError> {
        use crate::format::block::Block;

        let version = self.version(base)?;
        let block = MetadataBlock::new(
            self.metadata_offset(base)?,
            self.desc.file_size,
            version,
        );
        block.validate_offset(base)?;
        Ok(block)
    }
}

/// Parameters for [`store_file_header`].
#[derive(Debug, Clone)]
pub struct HeaderCreateInfo {
    /// Final size of the file in bytes
    pub file_size: u64,
    /// File revision number
    pub revision: u32,
    /// Offset of an already-stored, valid tile table block
    pub tile_table_offset: u64,
    /// Offset of an already-stored, valid metadata block
    pub metadata_offset: u64,
}

/// Serialize the file header at offset zero.
///
/// Both child offsets must already point at fully valid blocks; storing a
/// header whose children would then fail to parse is refused. The version
/// fields are always this implementation's compiled extension version.
pub fn store_file_header(base: &mut [u8], info: &HeaderCreateInfo) -> Result<(), IrisError> {
    if info.file_size == 0 {
        return Err(IrisError::StorePrecondition {
            block: "FILE_HEADER",
            message: "no file size provided; per the IFE specification Section 2.3.1, the \
                      file size shall be encoded as an unsigned 64-bit integer identical to \
                      the operating system query for the file size in bytes"
                .to_string(),
        });
    }

    let existing: &[u8] = base;
    let tile_table = TileTableBlock::new(info.tile_table_offset, info.file_size, EXTENSION_VERSION);
    tile_table
        .validate_full(existing)
        .map_err(|source| IrisError::StorePrecondition {
            block: "FILE_HEADER",
            message: format!(
                "per the IFE specification Section 2.3.1, the tile table offset shall contain \
                 the file offset location of a valid tile table header (Section 2.3.2): {source}"
            ),
        })?;

    let metadata = MetadataBlock::new(info.metadata_offset, info.file_size, EXTENSION_VERSION);
    metadata
        .validate_full(existing)
        .map_err(|source| IrisError::StorePrecondition {
            block: "FILE_HEADER",
            message: format!(
                "per the IFE specification Section 2.3.1, the metadata offset shall contain \
                 the file offset location of a valid metadata header (Section 2.3.3): {source}"
            ),
        })?;

    let header = store_target(base, 0, FILE_HEADER_SIZE, "FILE_HEADER")?;
    store_u32(&mut header[MAGIC as usize..], MAGIC_BYTES);
    store_u16(
        &mut header[RECOVERY as usize..],
        RecoveryTag::FileHeader.as_u16(),
    );
    store_u64(&mut header[FILE_SIZE as usize..], info.file_size);
    store_u16(&mut header[EXT_MAJOR as usize..], EXTENSION_MAJOR);
    store_u16(&mut header[EXT_MINOR as usize..], EXTENSION_MINOR);
    store_u32(&mut header[REVISION as usize..], info.revision);
    store_u64(
        &mut header[TILE_TABLE_OFFSET as usize..],
        info.tile_table_offset,
    );
    store_u64(&mut header[METADATA_OFFSET as usize..], info.metadata_offset);
    Ok(())
}

/// Cheap check that a byte region starts with an Iris file header.
///
/// This does not validate: it only tests the magic word and the header
/// recovery tag.
pub fn quick_check(bytes: &[u8]) -> bool {
    if (bytes.len() as u64) < FILE_HEADER_SIZE {
        return false;
    }
    load_u32(&bytes[MAGIC as usize..]) == MAGIC_BYTES
        && load_u16(&bytes[RECOVERY as usize..]) == RecoveryTag::FileHeader.as_u16()
}
