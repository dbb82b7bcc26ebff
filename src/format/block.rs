//! Common data-block discipline shared by every block below the file header.
//!
//! Every non-root block begins with a 10-byte prefix:
//!
//! ```text
//! Bytes 0-7: Validation word (u64) — the block's own absolute offset
//! Bytes 8-9: Recovery tag (u16)   — constant identifying the block kind
//! ```
//!
//! A block is reached through its parent's offset field; before any other
//! field is read, the validation word must equal the offset used to reach
//! it and the recovery tag must equal the kind's constant. Array- and
//! byte-type blocks extend the prefix with a shared counting header, also
//! defined here.

use crate::error::IrisError;
use crate::format::tags::{RecoveryTag, NULL_OFFSET};
use crate::io::primitive::{load_u16, load_u32, load_u64};
use crate::io::Region;

/// Byte size of the validation word + recovery tag prefix.
pub const BLOCK_PREFIX_SIZE: u64 = 10;

/// Byte size of the header shared by array-type blocks:
/// prefix + entry size (u16) + entry count (u32).
pub const ARRAY_HEADER_SIZE: u64 = 16;

/// Byte size of the header shared by byte-type blocks:
/// prefix + byte count (u32).
pub const BYTE_BLOCK_HEADER_SIZE: u64 = 14;

const ENTRY_SIZE: u64 = 10;
const ENTRY_NUMBER: u64 = 12;
const BYTE_NUMBER: u64 = 10;

/// Shared preamble of every block descriptor.
///
/// A descriptor is a lightweight view: it owns no bytes, only the offset
/// it was reached through, the file size bounds are checked against, and
/// the packed extension version governing which fields exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DataBlock {
    /// Absolute byte offset of the block within the file
    pub offset: u64,
    /// Total file size in bytes, as reported by the operating system
    pub file_size: u64,
    /// Packed extension version (`major << 16 | minor`) of the file
    pub version: u32,
}

impl DataBlock {
    pub fn new(offset: u64, file_size: u64, version: u32) -> Self {
        DataBlock {
            offset,
            file_size,
            version,
        }
    }

    /// Whether the descriptor points inside the file at all.
    #[inline]
    pub fn in_bounds(&self) -> bool {
        self.offset != NULL_OFFSET && self.offset < self.file_size
    }
}

/// Capability interface of a typed block descriptor.
///
/// Implementors supply the kind constants and the preamble; the offset
/// validation shared by every kind is provided here. Kind-specific
/// `validate_full`, `size` and readers are inherent methods on each type.
pub trait Block {
    /// Recovery tag constant for this block kind.
    const TAG: RecoveryTag;

    /// Human-readable kind name used in error messages.
    const NAME: &'static str;

    fn descriptor(&self) -> &DataBlock;

    /// Check that the descriptor points at a block of this kind.
    ///
    /// Verifies, in order: the offset is non-null and strictly inside the
    /// file, the u64 at the block start stores the block's own offset,
    /// and the u16 after it is the kind's recovery tag.
    fn validate_offset<R: Region + ?Sized>(&self, base: &R) -> Result<(), IrisError> {
        let desc = self.descriptor();
        if !desc.in_bounds() {
            return Err(IrisError::InvalidBlockOffset {
                block: Self::NAME,
                offset: desc.offset,
                file_size: desc.file_size,
            });
        }
        let prefix = base.get(desc.offset, BLOCK_PREFIX_SIZE)?;
        let stored = load_u64(prefix);
        if stored != desc.offset {
            return Err(IrisError::ValidationWordMismatch {
                block: Self::NAME,
                offset: desc.offset,
                stored,
            });
        }
        let tag = load_u16(&prefix[8..]);
        if tag != Self::TAG.as_u16() {
            return Err(IrisError::RecoveryTagMismatch {
                block: Self::NAME,
                expected: Self::TAG.as_u16(),
                found: tag,
            });
        }
        Ok(())
    }
}

/// Counting header of an array-type block (layer extents, tile offsets,
/// attribute sizes, image array, annotation array, group sizes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayHeader {
    /// On-disk stride of one entry in bytes
    pub entry_size: u16,
    /// Number of entries in the tail
    pub entry_count: u32,
}

impl ArrayHeader {
    /// Read the counting header of an array block.
    pub fn read<R: Region + ?Sized>(base: &R, desc: &DataBlock) -> Result<Self, IrisError> {
        let header = base.get(desc.offset, ARRAY_HEADER_SIZE)?;
        Ok(ArrayHeader {
            entry_size: load_u16(&header[ENTRY_SIZE as usize..]),
            entry_count: load_u32(&header[ENTRY_NUMBER as usize..]),
        })
    }

    /// Require the declared stride to hold at least one whole entry of
    /// this kind; a smaller stride cannot be walked.
    pub fn require_stride(
        &self,
        min: u64,
        block_name: &'static str,
    ) -> Result<(), IrisError> {
        if (self.entry_size as u64) < min {
            return Err(IrisError::InvalidLength {
                block: block_name,
                field: "entry size",
                message: format!(
                    "declared stride ({}) is smaller than the entry layout ({min} bytes)",
                    self.entry_size
                ),
            });
        }
        Ok(())
    }

    /// Absolute offset of the first entry.
    #[inline]
    pub fn entries_start(&self, desc: &DataBlock) -> u64 {
        desc.offset + ARRAY_HEADER_SIZE
    }

    /// Total byte length of the entry tail.
    #[inline]
    pub fn entries_len(&self) -> u64 {
        self.entry_count as u64 * self.entry_size as u64
    }

    /// Borrow the full entry tail, failing if it extends past the file end.
    pub fn entries<'r, R: Region + ?Sized>(
        &self,
        base: &'r R,
        desc: &DataBlock,
        block_name: &'static str,
    ) -> Result<&'r [u8], IrisError> {
        let start = self.entries_start(desc);
        let len = self.entries_len();
        if start + len > desc.file_size {
            return Err(IrisError::OutOfBounds {
                block: block_name,
                start,
                end: start + len,
                file_size: desc.file_size,
            });
        }
        base.get(start, len)
    }
}

/// Read the declared byte count of a byte-type block (attribute bytes,
/// ICC profile, annotation bytes, group bytes).
pub fn read_byte_count<R: Region + ?Sized>(base: &R, desc: &DataBlock) -> Result<u32, IrisError> {
    let header = base.get(desc.offset, BYTE_BLOCK_HEADER_SIZE)?;
    Ok(load_u32(&header[BYTE_NUMBER as usize..]))
}

/// Check that a byte-type block's payload lies inside the file without
/// touching the payload bytes themselves.
pub fn byte_block_bounds(
    desc: &DataBlock,
    byte_count: u32,
    block_name: &'static str,
) -> Result<(), IrisError> {
    let start = desc.offset + BYTE_BLOCK_HEADER_SIZE;
    let end = start + byte_count as u64;
    if end > desc.file_size {
        return Err(IrisError::OutOfBounds {
            block: block_name,
            start,
            end,
            file_size: desc.file_size,
        });
    }
    Ok(())
}

/// Borrow the payload of a byte-type block, failing if it extends past
/// the file end.
pub fn byte_block_payload<'r, R: Region + ?Sized>(
    base: &'r R,
    desc: &DataBlock,
    byte_count: u32,
    block_name: &'static str,
) -> Result<&'r [u8], IrisError> {
    byte_block_bounds(desc, byte_count, block_name)?;
    base.get(desc.offset + BYTE_BLOCK_HEADER_SIZE, byte_count as u64)
}

/// Borrow a mutable store target of `len` bytes at `offset`, failing with
/// a store precondition error when the region cannot hold it.
pub fn store_target<'a>(
    base: &'a mut [u8],
    offset: u64,
    len: u64,
    block: &'static str,
) -> Result<&'a mut [u8], IrisError> {
    let end = offset.checked_add(len);
    match end {
        Some(end) if end <= base.len() as u64 => {
            Ok(&mut base[offset as usize..end as usize])
        }
        _ => Err(IrisError::StorePrecondition {
            block,
            message: format!(
                "target range {}..{} does not fit the {} byte region",
                offset,
                offset.saturating_add(len),
                base.len()
            ),
        }),
    }
}
