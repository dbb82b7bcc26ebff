//! On-slide annotations: per-identifier overlays and named groups.
//!
//! The annotation array maps 24-bit identifiers to visual objects whose
//! byte streams live in separate *annotation bytes* blocks. Groups are an
//! optional pair of blocks referenced from the array header: a sizes
//! array declaring a label length and member count per group, and a
//! bytes block holding `label || (24-bit id) × count` runs.
//!
//! # Annotation array header layout (32 bytes)
//!
//! ```text
//! Bytes 0-9:   Data block prefix (validation word + recovery tag)
//! Bytes 10-11: Entry size (u16)
//! Bytes 12-15: Entry count (u32)
//! Bytes 16-23: Group sizes offset (u64, optional)
//! Bytes 24-31: Group bytes offset (u64, optional)
//! ```
//!
//! # Annotation entry layout (39 bytes)
//!
//! ```text
//! Bytes 0-2:   Identifier (24-bit)
//! Bytes 3-10:  Annotation bytes offset (u64)
//! Byte  11:    Format (u8)
//! Bytes 12-15: X location (f32)    Bytes 16-19: Y location (f32)
//! Bytes 20-23: X size (f32)        Bytes 24-27: Y size (f32)
//! Bytes 28-31: Pixel width (u32)   Bytes 32-35: Pixel height (u32)
//! Bytes 36-38: Parent identifier (24-bit, may be the null identifier)
//! ```

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::error::IrisError;
use crate::format::block::{
    byte_block_bounds, byte_block_payload, read_byte_count, store_target, ArrayHeader, Block,
    DataBlock, ARRAY_HEADER_SIZE, BYTE_BLOCK_HEADER_SIZE,
};
use crate::format::tags::{AnnotationFormat, RecoveryTag, NULL_ID, NULL_OFFSET};
use crate::io::primitive::{
    load_f32, load_u16, load_u24, load_u32, load_u64, load_u8, store_f32, store_u16, store_u24,
    store_u32, store_u64, store_u8,
};
use crate::io::Region;
use crate::slide::abstraction::{Annotation, AnnotationGroup, Annotations};

const ENTRY_SIZE_FIELD: u64 = 10;
const ENTRY_NUMBER_FIELD: u64 = 12;
const GROUP_SIZES_OFFSET: u64 = 16;
const GROUP_BYTES_OFFSET: u64 = 24;

/// On-disk size of the annotation array header.
pub const ANNOTATION_ARRAY_HEADER_SIZE: u64 = 32;

/// On-disk stride of one annotation entry.
pub const ANNOTATION_ENTRY_SIZE: u64 = 39;

const ENTRY_IDENTIFIER: usize = 0;
const ENTRY_BYTES_OFFSET: usize = 3;
const ENTRY_FORMAT: usize = 11;
const ENTRY_X_LOCATION: usize = 12;
const ENTRY_Y_LOCATION: usize = 16;
const ENTRY_X_SIZE: usize = 20;
const ENTRY_Y_SIZE: usize = 24;
const ENTRY_WIDTH: usize = 28;
const ENTRY_HEIGHT: usize = 32;
const ENTRY_PARENT: usize = 36;

/// On-disk stride of one group sizes entry: label length u16, member count u32.
pub const GROUP_SIZE_ENTRY: u64 = 6;

const GROUP_LABEL_SIZE: usize = 0;
const GROUP_ENTRY_NUMBER: usize = 2;

/// Byte size of one serialized group member identifier.
const MEMBER_ID_SIZE: u64 = 3;

// =============================================================================
// AnnotationArrayBlock
// =============================================================================

/// Descriptor of the annotation array block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationArrayBlock {
    desc: DataBlock,
}

impl Block for AnnotationArrayBlock {
    const TAG: RecoveryTag = RecoveryTag::Annotations;
    const NAME: &'static str = "ANNOTATION_ARRAY";

    fn descriptor(&self) -> &DataBlock {
        &self.desc
    }
}

impl AnnotationArrayBlock {
    pub fn new(offset: u64, file_size: u64, version: u32) -> Self {
        AnnotationArrayBlock {
            desc: DataBlock::new(offset, file_size, version),
        }
    }

    fn counts<R: Region + ?Sized>(&self, base: &R) -> Result<(u16, u32), IrisError> {
        let header = base.get(self.desc.offset, ANNOTATION_ARRAY_HEADER_SIZE)?;
        Ok((
            load_u16(&header[ENTRY_SIZE_FIELD as usize..]),
            load_u32(&header[ENTRY_NUMBER_FIELD as usize..]),
        ))
    }

    /// On-disk size of the block including its entry tail.
    pub fn size<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        let (step, entries) = self.counts(base)?;
        Ok(ANNOTATION_ARRAY_HEADER_SIZE + step as u64 * entries as u64)
    }

    /// Whether both group blocks are referenced from the header.
    pub fn has_groups<R: Region + ?Sized>(&self, base: &R) -> Result<bool, IrisError> {
        let header = base.get(self.desc.offset, ANNOTATION_ARRAY_HEADER_SIZE)?;
        let sizes = load_u64(&header[GROUP_SIZES_OFFSET as usize..]);
        let bytes = load_u64(&header[GROUP_BYTES_OFFSET as usize..]);
        Ok(sizes != NULL_OFFSET
            && sizes < self.desc.file_size
            && bytes != NULL_OFFSET
            && bytes < self.desc.file_size)
    }

    /// Stored group sizes offset.
    pub fn group_sizes_offset<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        Ok(load_u64(base.get(self.desc.offset + GROUP_SIZES_OFFSET, 8)?))
    }

    /// Stored group bytes offset.
    pub fn group_bytes_offset<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        Ok(load_u64(base.get(self.desc.offset + GROUP_BYTES_OFFSET, 8)?))
    }

    /// Descriptor of the group sizes array, offset-validated.
    pub fn group_sizes<R: Region + ?Sized>(
        &self,
        base: &R,
    ) -> Result<AnnotationGroupSizesBlock, IrisError> {
        let block = AnnotationGroupSizesBlock::new(
            self.group_sizes_offset(base)?,
            self.desc.file_size,
            self.desc.version,
        );
        block.validate_offset(base)?;
        Ok(block)
    }

    /// Descriptor of the group bytes block, offset-validated.
    pub fn group_bytes<R: Region + ?Sized>(
        &self,
        base: &R,
    ) -> Result<AnnotationGroupBytesBlock, IrisError> {
        let block = AnnotationGroupBytesBlock::new(
            self.group_bytes_offset(base)?,
            self.desc.file_size,
            self.desc.version,
        );
        block.validate_offset(base)?;
        Ok(block)
    }

    fn entry_tail<'r, R: Region + ?Sized>(
        &self,
        base: &'r R,
        step: u16,
        entries: u32,
    ) -> Result<&'r [u8], IrisError> {
        if (step as u64) < ANNOTATION_ENTRY_SIZE {
            return Err(IrisError::InvalidLength {
                block: Self::NAME,
                field: "entry size",
                message: format!(
                    "declared stride ({step}) is smaller than the entry layout \
                     ({ANNOTATION_ENTRY_SIZE} bytes)"
                ),
            });
        }
        let start = self.desc.offset + ANNOTATION_ARRAY_HEADER_SIZE;
        let len = step as u64 * entries as u64;
        if start + len > self.desc.file_size {
            return Err(IrisError::OutOfBounds {
                block: Self::NAME,
                start,
                end: start + len,
                file_size: self.desc.file_size,
            });
        }
        base.get(start, len)
    }

    /// Validate the array bounds, every entry, and the optional group pair.
    pub fn validate_full<R: Region + ?Sized>(&self, base: &R) -> Result<(), IrisError> {
        self.validate_offset(base)?;

        if self.has_groups(base)? {
            let sizes = AnnotationGroupSizesBlock::new(
                self.group_sizes_offset(base)?,
                self.desc.file_size,
                self.desc.version,
            );
            let expected = sizes.validate_full(base)?;

            let bytes = AnnotationGroupBytesBlock::new(
                self.group_bytes_offset(base)?,
                self.desc.file_size,
                self.desc.version,
            );
            bytes.validate_full(base, expected)?;
        }

        let (step, entries) = self.counts(base)?;
        let tail = self.entry_tail(base, step, entries)?;

        let mut seen = HashSet::with_capacity(entries as usize);
        for index in 0..entries as usize {
            let entry = &tail[index * step as usize..];

            let bytes_offset = load_u64(&entry[ENTRY_BYTES_OFFSET..]);
            if bytes_offset == NULL_OFFSET || bytes_offset >= self.desc.file_size {
                return Err(IrisError::InvalidBlockOffset {
                    block: AnnotationBytesBlock::NAME,
                    offset: bytes_offset,
                    file_size: self.desc.file_size,
                });
            }
            let bytes_block =
                AnnotationBytesBlock::new(bytes_offset, self.desc.file_size, self.desc.version);
            bytes_block.validate_full(base)?;

            let identifier = load_u24(&entry[ENTRY_IDENTIFIER..]);
            if !seen.insert(identifier) {
                warn!(
                    identifier,
                    "duplicate annotation identifier; each annotation shall be referenced by a \
                     unique 24-bit identifier"
                );
            }

            let format = load_u8(&entry[ENTRY_FORMAT..]);
            if AnnotationFormat::from_u8(format, self.desc.version).is_none() {
                return Err(IrisError::UndefinedEnum {
                    block: Self::NAME,
                    field: "annotation format",
                    value: format,
                });
            }
        }
        Ok(())
    }

    /// Lift the identifier-keyed annotation map and any groups.
    ///
    /// Duplicate identifiers warn and keep the first occurrence; a parent
    /// identifier above the 24-bit range cannot occur on disk, and the
    /// null identifier marks an annotation without a parent. Annotation
    /// payloads are located, never copied.
    pub fn read_annotations<R: Region + ?Sized>(&self, base: &R) -> Result<Annotations, IrisError> {
        let (step, entries) = self.counts(base)?;
        let tail = self.entry_tail(base, step, entries)?;

        let mut annotations = Annotations {
            entries: HashMap::with_capacity(entries as usize),
            groups: HashMap::new(),
        };
        for index in 0..entries as usize {
            let entry = &tail[index * step as usize..];

            let bytes_offset = load_u64(&entry[ENTRY_BYTES_OFFSET..]);
            if bytes_offset == NULL_OFFSET || bytes_offset >= self.desc.file_size {
                return Err(IrisError::InvalidBlockOffset {
                    block: AnnotationBytesBlock::NAME,
                    offset: bytes_offset,
                    file_size: self.desc.file_size,
                });
            }
            let bytes_block =
                AnnotationBytesBlock::new(bytes_offset, self.desc.file_size, self.desc.version);
            bytes_block.validate_offset(base)?;
            let (payload_offset, byte_size) = bytes_block.read_bytes(base)?;

            let identifier = load_u24(&entry[ENTRY_IDENTIFIER..]);
            if annotations.entries.contains_key(&identifier) {
                warn!(
                    identifier,
                    "duplicate annotation identifier; skipping duplicate entry"
                );
                continue;
            }

            let format_raw = load_u8(&entry[ENTRY_FORMAT..]);
            let format = AnnotationFormat::from_u8(format_raw, self.desc.version).ok_or(
                IrisError::UndefinedEnum {
                    block: Self::NAME,
                    field: "annotation format",
                    value: format_raw,
                },
            )?;

            annotations.entries.insert(
                identifier,
                Annotation {
                    offset: payload_offset,
                    byte_size,
                    format,
                    x_location: load_f32(&entry[ENTRY_X_LOCATION..]),
                    y_location: load_f32(&entry[ENTRY_Y_LOCATION..]),
                    x_size: load_f32(&entry[ENTRY_X_SIZE..]),
                    y_size: load_f32(&entry[ENTRY_Y_SIZE..]),
                    width: load_u32(&entry[ENTRY_WIDTH..]),
                    height: load_u32(&entry[ENTRY_HEIGHT..]),
                    parent: load_u24(&entry[ENTRY_PARENT..]),
                },
            );
        }

        if self.has_groups(base)? {
            let sizes_block = self.group_sizes(base)?;
            let sizes = sizes_block.read_group_sizes(base)?;

            let bytes_block = self.group_bytes(base)?;
            annotations.groups = bytes_block.read_groups(base, &sizes)?;
        }
        Ok(annotations)
    }

    /// Bytes-block offsets referenced by each entry, unvalidated.
    pub fn entry_bytes_offsets<R: Region + ?Sized>(
        &self,
        base: &R,
    ) -> Result<Vec<u64>, IrisError> {
        let (step, entries) = self.counts(base)?;
        let tail = self.entry_tail(base, step, entries)?;
        Ok((0..entries as usize)
            .map(|index| load_u64(&tail[index * step as usize + ENTRY_BYTES_OFFSET..]))
            .collect())
    }

    /// Descriptors of every referenced annotation bytes block, in array order.
    pub fn bytes_blocks<R: Region + ?Sized>(
        &self,
        base: &R,
    ) -> Result<Vec<AnnotationBytesBlock>, IrisError> {
        let (step, entries) = self.counts(base)?;
        let tail = self.entry_tail(base, step, entries)?;

        let mut blocks = Vec::with_capacity(entries as usize);
        for index in 0..entries as usize {
            let entry = &tail[index * step as usize..];
            let block = AnnotationBytesBlock::new(
                load_u64(&entry[ENTRY_BYTES_OFFSET..]),
                self.desc.file_size,
                self.desc.version,
            );
            block.validate_offset(base)?;
            blocks.push(block);
        }
        Ok(blocks)
    }
}

// =============================================================================
// AnnotationBytesBlock
// =============================================================================

/// Descriptor of an annotation bytes block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationBytesBlock {
    desc: DataBlock,
}

impl Block for AnnotationBytesBlock {
    const TAG: RecoveryTag = RecoveryTag::AnnotationBytes;
    const NAME: &'static str = "ANNOTATION_BYTES";

    fn descriptor(&self) -> &DataBlock {
        &self.desc
    }
}

impl AnnotationBytesBlock {
    pub fn new(offset: u64, file_size: u64, version: u32) -> Self {
        AnnotationBytesBlock {
            desc: DataBlock::new(offset, file_size, version),
        }
    }

    /// On-disk size of the block including the payload.
    pub fn size<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        Ok(BYTE_BLOCK_HEADER_SIZE + read_byte_count(base, &self.desc)? as u64)
    }

    /// Validate the payload bounds.
    pub fn validate_full<R: Region + ?Sized>(&self, base: &R) -> Result<(), IrisError> {
        self.validate_offset(base)?;
        let count = read_byte_count(base, &self.desc)?;
        byte_block_bounds(&self.desc, count, Self::NAME)
    }

    /// Locate the payload: `(payload offset, payload byte count)`.
    pub fn read_bytes<R: Region + ?Sized>(&self, base: &R) -> Result<(u64, u32), IrisError> {
        let count = read_byte_count(base, &self.desc)?;
        byte_block_bounds(&self.desc, count, Self::NAME)?;
        Ok((self.desc.offset + BYTE_BLOCK_HEADER_SIZE, count))
    }
}

// =============================================================================
// Annotation groups
// =============================================================================

/// Descriptor of the annotation group sizes array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationGroupSizesBlock {
    desc: DataBlock,
}

impl Block for AnnotationGroupSizesBlock {
    const TAG: RecoveryTag = RecoveryTag::AnnotationGroupSizes;
    const NAME: &'static str = "ANNOTATION_GROUP_SIZES";

    fn descriptor(&self) -> &DataBlock {
        &self.desc
    }
}

impl AnnotationGroupSizesBlock {
    pub fn new(offset: u64, file_size: u64, version: u32) -> Self {
        AnnotationGroupSizesBlock {
            desc: DataBlock::new(offset, file_size, version),
        }
    }

    /// On-disk size of the block including its entry tail.
    pub fn size<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        let header = ArrayHeader::read(base, &self.desc)?;
        Ok(ARRAY_HEADER_SIZE + header.entries_len())
    }

    /// Validate the array bounds and return the byte total the group
    /// bytes block must declare: Σ(labelLen + 3·memberCount).
    pub fn validate_full<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        self.validate_offset(base)?;
        let header = ArrayHeader::read(base, &self.desc)?;
        header.require_stride(GROUP_SIZE_ENTRY, Self::NAME)?;
        let entries = header.entries(base, &self.desc, Self::NAME)?;

        let step = header.entry_size as usize;
        let mut expected = 0u64;
        for index in 0..header.entry_count as usize {
            let entry = &entries[index * step..];
            expected += load_u16(&entry[GROUP_LABEL_SIZE..]) as u64;
            expected += load_u32(&entry[GROUP_ENTRY_NUMBER..]) as u64 * MEMBER_ID_SIZE;
        }
        Ok(expected)
    }

    /// Lift the per-group label and member counts in on-disk order.
    pub fn read_group_sizes<R: Region + ?Sized>(
        &self,
        base: &R,
    ) -> Result<Vec<(u16, u32)>, IrisError> {
        let header = ArrayHeader::read(base, &self.desc)?;
        header.require_stride(GROUP_SIZE_ENTRY, Self::NAME)?;
        let entries = header.entries(base, &self.desc, Self::NAME)?;

        let step = header.entry_size as usize;
        let mut sizes = Vec::with_capacity(header.entry_count as usize);
        for index in 0..header.entry_count as usize {
            let entry = &entries[index * step..];
            sizes.push((
                load_u16(&entry[GROUP_LABEL_SIZE..]),
                load_u32(&entry[GROUP_ENTRY_NUMBER..]),
            ));
        }
        Ok(sizes)
    }
}

/// Descriptor of the annotation group bytes block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationGroupBytesBlock {
    desc: DataBlock,
}

impl Block for AnnotationGroupBytesBlock {
    const TAG: RecoveryTag = RecoveryTag::AnnotationGroupBytes;
    const NAME: &'static str = "ANNOTATION_GROUP_BYTES";

    fn descriptor(&self) -> &DataBlock {
        &self.desc
    }
}

impl AnnotationGroupBytesBlock {
    pub fn new(offset: u64, file_size: u64, version: u32) -> Self {
        AnnotationGroupBytesBlock {
            desc: DataBlock::new(offset, file_size, version),
        }
    }

    /// On-disk size of the block including the payload.
    pub fn size<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        Ok(BYTE_BLOCK_HEADER_SIZE + read_byte_count(base, &self.desc)? as u64)
    }

    /// Validate the declared byte count against the total expected from
    /// the group sizes array, and the payload bounds.
    pub fn validate_full<R: Region + ?Sized>(
        &self,
        base: &R,
        expected: u64,
    ) -> Result<(), IrisError> {
        self.validate_offset(base)?;
        let declared = read_byte_count(base, &self.desc)? as u64;
        if declared != expected {
            return Err(IrisError::ByteCountMismatch {
                block: Self::NAME,
                expected,
                declared,
            });
        }
        byte_block_bounds(&self.desc, declared as u32, Self::NAME)
    }

    /// Lift the label-keyed groups declared by `sizes`.
    ///
    /// Each group records where its member identifier run starts and how
    /// many members it holds; members are decoded on demand.
    pub fn read_groups<R: Region + ?Sized>(
        &self,
        base: &R,
        sizes: &[(u16, u32)],
    ) -> Result<HashMap<String, AnnotationGroup>, IrisError> {
        let declared = read_byte_count(base, &self.desc)?;
        let expected: u64 = sizes
            .iter()
            .map(|(label, count)| *label as u64 + *count as u64 * MEMBER_ID_SIZE)
            .sum();
        if expected != declared as u64 {
            return Err(IrisError::ByteCountMismatch {
                block: Self::NAME,
                expected,
                declared: declared as u64,
            });
        }

        let payload = byte_block_payload(base, &self.desc, declared, Self::NAME)?;
        let payload_start = self.desc.offset + BYTE_BLOCK_HEADER_SIZE;

        let mut groups = HashMap::with_capacity(sizes.len());
        let mut cursor = 0usize;
        for (label_len, count) in sizes {
            let label_end = cursor + *label_len as usize;
            let label = String::from_utf8_lossy(&payload[cursor..label_end]).into_owned();
            groups.insert(
                label,
                AnnotationGroup {
                    offset: payload_start + label_end as u64,
                    count: *count,
                },
            );
            cursor = label_end + *count as usize * MEMBER_ID_SIZE as usize;
        }
        Ok(groups)
    }
}

// =============================================================================
// Stores
// =============================================================================

/// One annotation entry for [`store_annotation_array`].
#[derive(Debug, Clone)]
pub struct AnnotationEntryCreateInfo {
    /// Unique 24-bit identifier
    pub identifier: u32,
    /// Offset of an already-stored annotation bytes block
    pub bytes_offset: u64,
    pub format: AnnotationFormat,
    pub x_location: f32,
    pub y_location: f32,
    pub x_size: f32,
    pub y_size: f32,
    pub width: u32,
    pub height: u32,
    /// Parent identifier; values above the 24-bit range are replaced by
    /// the null identifier with a warning
    pub parent: u32,
}

impl AnnotationEntryCreateInfo {
    fn is_storable(&self) -> bool {
        self.identifier < NULL_ID && self.bytes_offset != NULL_OFFSET
    }
}

/// Parameters for [`store_annotation_array`].
#[derive(Debug, Clone)]
pub struct AnnotationArrayCreateInfo {
    /// Offset at which the annotation array is stored
    pub offset: u64,
    pub annotations: Vec<AnnotationEntryCreateInfo>,
    /// Offset of an already-stored group sizes array, or the null sentinel
    pub group_sizes_offset: u64,
    /// Offset of an already-stored group bytes block, or the null sentinel
    pub group_bytes_offset: u64,
}

/// Total on-disk size of the annotation array `info` would produce.
///
/// Entries that would be skipped by the store (invalid identifier or
/// null bytes offset) do not contribute.
pub fn annotation_array_size(info: &AnnotationArrayCreateInfo) -> u64 {
    let storable = info
        .annotations
        .iter()
        .filter(|entry| entry.is_storable())
        .count() as u64;
    ANNOTATION_ARRAY_HEADER_SIZE + storable * ANNOTATION_ENTRY_SIZE
}

/// Serialize the annotation array.
///
/// Entries with an invalid identifier or a null bytes offset are skipped
/// with a warning; the stored entry count reflects what was written.
/// Group offsets, when non-null, must reference already-stored group
/// blocks.
pub fn store_annotation_array(
    base: &mut [u8],
    info: &AnnotationArrayCreateInfo,
) -> Result<(), IrisError> {
    if info.offset == NULL_OFFSET {
        return Err(IrisError::StorePrecondition {
            block: "ANNOTATION_ARRAY",
            message: "null offset provided as location".to_string(),
        });
    }
    let file_size = base.len() as u64;
    let existing: &[u8] = base;
    let version = crate::format::tags::EXTENSION_VERSION;
    if info.group_sizes_offset != NULL_OFFSET {
        AnnotationGroupSizesBlock::new(info.group_sizes_offset, file_size, version)
            .validate_offset(existing)
            .map_err(|source| IrisError::StorePrecondition {
                block: "ANNOTATION_ARRAY",
                message: format!("group sizes offset shall reference a stored block: {source}"),
            })?;
    }
    if info.group_bytes_offset != NULL_OFFSET {
        AnnotationGroupBytesBlock::new(info.group_bytes_offset, file_size, version)
            .validate_offset(existing)
            .map_err(|source| IrisError::StorePrecondition {
                block: "ANNOTATION_ARRAY",
                message: format!("group bytes offset shall reference a stored block: {source}"),
            })?;
    }

    let total = annotation_array_size(info);
    let target = store_target(base, info.offset, total, "ANNOTATION_ARRAY")?;
    store_u64(target, info.offset);
    store_u16(&mut target[8..], RecoveryTag::Annotations.as_u16());
    store_u16(
        &mut target[ENTRY_SIZE_FIELD as usize..],
        ANNOTATION_ENTRY_SIZE as u16,
    );
    store_u64(
        &mut target[GROUP_SIZES_OFFSET as usize..],
        info.group_sizes_offset,
    );
    store_u64(
        &mut target[GROUP_BYTES_OFFSET as usize..],
        info.group_bytes_offset,
    );

    let mut cursor = ANNOTATION_ARRAY_HEADER_SIZE as usize;
    let mut written = 0u32;
    for annotation in &info.annotations {
        if annotation.identifier >= NULL_ID {
            warn!(
                identifier = annotation.identifier,
                "annotation does not carry a valid 24-bit identifier; skipping entry"
            );
            continue;
        }
        if annotation.bytes_offset == NULL_OFFSET {
            warn!(
                identifier = annotation.identifier,
                "annotation does not carry a valid byte array offset; skipping entry"
            );
            continue;
        }
        let parent = if annotation.parent > NULL_ID {
            warn!(
                identifier = annotation.identifier,
                parent = annotation.parent,
                "annotation parent identifier is out of the 24-bit range; storing the null \
                 identifier instead"
            );
            NULL_ID
        } else {
            annotation.parent
        };

        let entry = &mut target[cursor..];
        store_u24(&mut entry[ENTRY_IDENTIFIER..], annotation.identifier);
        store_u64(&mut entry[ENTRY_BYTES_OFFSET..], annotation.bytes_offset);
        store_u8(&mut entry[ENTRY_FORMAT..], annotation.format.as_u8());
        store_f32(&mut entry[ENTRY_X_LOCATION..], annotation.x_location);
        store_f32(&mut entry[ENTRY_Y_LOCATION..], annotation.y_location);
        store_f32(&mut entry[ENTRY_X_SIZE..], annotation.x_size);
        store_f32(&mut entry[ENTRY_Y_SIZE..], annotation.y_size);
        store_u32(&mut entry[ENTRY_WIDTH..], annotation.width);
        store_u32(&mut entry[ENTRY_HEIGHT..], annotation.height);
        store_u24(&mut entry[ENTRY_PARENT..], parent);
        cursor += ANNOTATION_ENTRY_SIZE as usize;
        written += 1;
    }
    // The stored count reflects the entries actually written
    store_u32(&mut target[ENTRY_NUMBER_FIELD as usize..], written);
    Ok(())
}

/// Total on-disk size of an annotation bytes block for `len` payload bytes.
pub fn annotation_bytes_size(len: usize) -> u64 {
    BYTE_BLOCK_HEADER_SIZE + len as u64
}

/// Serialize an annotation bytes block at `offset`.
pub fn store_annotation_bytes(base: &mut [u8], offset: u64, data: &[u8]) -> Result<(), IrisError> {
    if offset == NULL_OFFSET {
        return Err(IrisError::StorePrecondition {
            block: "ANNOTATION_BYTES",
            message: "null offset provided as location".to_string(),
        });
    }
    if data.len() as u64 > u32::MAX as u64 {
        return Err(IrisError::StorePrecondition {
            block: "ANNOTATION_BYTES",
            message: "annotation byte stream exceeds the 32-bit size limit of IFE \
                      specification Section 2.4.9"
                .to_string(),
        });
    }

    let total = annotation_bytes_size(data.len());
    let target = store_target(base, offset, total, "ANNOTATION_BYTES")?;
    store_u64(target, offset);
    store_u16(&mut target[8..], RecoveryTag::AnnotationBytes.as_u16());
    store_u32(&mut target[10..], data.len() as u32);
    target[BYTE_BLOCK_HEADER_SIZE as usize..].copy_from_slice(data);
    Ok(())
}

/// One named group for the group stores.
#[derive(Debug, Clone)]
pub struct AnnotationGroupCreateInfo {
    pub label: String,
    /// 24-bit member identifiers
    pub members: Vec<u32>,
}

/// Total on-disk size of a group sizes array for `groups`.
pub fn annotation_group_sizes_size(groups: &[AnnotationGroupCreateInfo]) -> u64 {
    ARRAY_HEADER_SIZE + groups.len() as u64 * GROUP_SIZE_ENTRY
}

/// Total on-disk size of a group bytes block for `groups`.
pub fn annotation_group_bytes_size(groups: &[AnnotationGroupCreateInfo]) -> u64 {
    let payload: u64 = groups
        .iter()
        .map(|group| group.label.len() as u64 + group.members.len() as u64 * MEMBER_ID_SIZE)
        .sum();
    BYTE_BLOCK_HEADER_SIZE + payload
}

fn check_groups(groups: &[AnnotationGroupCreateInfo]) -> Result<(), IrisError> {
    for group in groups {
        if group.label.is_empty() || group.label.len() > u16::MAX as usize {
            return Err(IrisError::StorePrecondition {
                block: "ANNOTATION_GROUP_SIZES",
                message: format!(
                    "group label length ({}) shall be between one byte and the 16-bit limit",
                    group.label.len()
                ),
            });
        }
        for member in &group.members {
            if *member >= NULL_ID {
                return Err(IrisError::StorePrecondition {
                    block: "ANNOTATION_GROUP_BYTES",
                    message: format!(
                        "group \"{}\" member ({member}) is not a valid 24-bit identifier",
                        group.label
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Serialize the group sizes array at `offset`.
pub fn store_annotation_group_sizes(
    base: &mut [u8],
    offset: u64,
    groups: &[AnnotationGroupCreateInfo],
) -> Result<(), IrisError> {
    if offset == NULL_OFFSET {
        return Err(IrisError::StorePrecondition {
            block: "ANNOTATION_GROUP_SIZES",
            message: "null offset provided as location".to_string(),
        });
    }
    check_groups(groups)?;

    let total = annotation_group_sizes_size(groups);
    let target = store_target(base, offset, total, "ANNOTATION_GROUP_SIZES")?;
    store_u64(target, offset);
    store_u16(&mut target[8..], RecoveryTag::AnnotationGroupSizes.as_u16());
    store_u16(&mut target[10..], GROUP_SIZE_ENTRY as u16);
    store_u32(&mut target[12..], groups.len() as u32);

    let mut cursor = ARRAY_HEADER_SIZE as usize;
    for group in groups {
        store_u16(
            &mut target[cursor + GROUP_LABEL_SIZE..],
            group.label.len() as u16,
        );
        store_u32(
            &mut target[cursor + GROUP_ENTRY_NUMBER..],
            group.members.len() as u32,
        );
        cursor += GROUP_SIZE_ENTRY as usize;
    }
    Ok(())
}

/// Serialize the group bytes block at `offset`: `label || members` runs.
pub fn store_annotation_group_bytes(
    base: &mut [u8],
    offset: u64,
    groups: &[AnnotationGroupCreateInfo],
) -> Result<(), IrisError> {
    if offset == NULL_OFFSET {
        return Err(IrisError::StorePrecondition {
            block: "ANNOTATION_GROUP_BYTES",
            message: "null offset provided as location".to_string(),
        });
    }
    check_groups(groups)?;

    let total = annotation_group_bytes_size(groups);
    let payload_len = total - BYTE_BLOCK_HEADER_SIZE;
    if payload_len > u32::MAX as u64 {
        return Err(IrisError::StorePrecondition {
            block: "ANNOTATION_GROUP_BYTES",
            message: "group byte payload exceeds the 32-bit size limit".to_string(),
        });
    }

    let target = store_target(base, offset, total, "ANNOTATION_GROUP_BYTES")?;
    store_u64(target, offset);
    store_u16(&mut target[8..], RecoveryTag::AnnotationGroupBytes.as_u16());
    store_u32(&mut target[10..], payload_len as u32);

    let mut cursor = BYTE_BLOCK_HEADER_SIZE as usize;
    for group in groups {
        target[cursor..cursor + group.label.len()].copy_from_slice(group.label.as_bytes());
        cursor += group.label.len();
        for member in &group.members {
            store_u24(&mut target[cursor..], *member);
            cursor += MEMBER_ID_SIZE as usize;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::tags::EXTENSION_VERSION;

    fn entry(identifier: u32, bytes_offset: u64) -> AnnotationEntryCreateInfo {
        AnnotationEntryCreateInfo {
            identifier,
            bytes_offset,
            format: AnnotationFormat::Svg,
            x_location: 10.5,
            y_location: 20.5,
            x_size: 64.0,
            y_size: 32.0,
            width: 640,
            height: 320,
            parent: NULL_ID,
        }
    }

    #[test]
    fn test_annotation_round_trip() {
        let mut bytes = vec![0u8; 1024];
        store_annotation_bytes(&mut bytes, 600, b"<svg/>").unwrap();
        store_annotation_array(
            &mut bytes,
            &AnnotationArrayCreateInfo {
                offset: 100,
                annotations: vec![entry(0x000001, 600)],
                group_sizes_offset: NULL_OFFSET,
                group_bytes_offset: NULL_OFFSET,
            },
        )
        .unwrap();

        let block = AnnotationArrayBlock::new(100, 1024, EXTENSION_VERSION);
        block.validate_full(bytes.as_slice()).unwrap();

        let annotations = block.read_annotations(bytes.as_slice()).unwrap();
        assert_eq!(annotations.entries.len(), 1);
        let annotation = &annotations.entries[&0x000001];
        assert_eq!(annotation.format, AnnotationFormat::Svg);
        assert_eq!(annotation.x_location, 10.5);
        assert_eq!(annotation.width, 640);
        assert_eq!(annotation.parent, NULL_ID);
        assert_eq!(annotation.offset, 600 + BYTE_BLOCK_HEADER_SIZE);
        assert_eq!(annotation.byte_size, 6);
        assert!(annotations.groups.is_empty());
    }

    #[test]
    fn test_duplicate_identifier_keeps_first() {
        let mut bytes = vec![0u8; 1024];
        store_annotation_bytes(&mut bytes, 600, b"first").unwrap();
        store_annotation_bytes(&mut bytes, 700, b"second!").unwrap();
        store_annotation_array(
            &mut bytes,
            &AnnotationArrayCreateInfo {
                offset: 100,
                annotations: vec![entry(0x000001, 600), entry(0x000001, 700)],
                group_sizes_offset: NULL_OFFSET,
                group_bytes_offset: NULL_OFFSET,
            },
        )
        .unwrap();

        let block = AnnotationArrayBlock::new(100, 1024, EXTENSION_VERSION);
        let annotations = block.read_annotations(bytes.as_slice()).unwrap();
        assert_eq!(annotations.entries.len(), 1);
        assert_eq!(annotations.entries[&0x000001].byte_size, 5);
    }

    #[test]
    fn test_store_skips_invalid_entries() {
        let mut bytes = vec![0u8; 1024];
        store_annotation_bytes(&mut bytes, 600, b"payload").unwrap();
        let info = AnnotationArrayCreateInfo {
            offset: 100,
            annotations: vec![
                entry(NULL_ID, 600),      // invalid identifier
                entry(0x000002, NULL_OFFSET), // missing byte stream
                entry(0x000003, 600),
            ],
            group_sizes_offset: NULL_OFFSET,
            group_bytes_offset: NULL_OFFSET,
        };
        assert_eq!(
            annotation_array_size(&info),
            ANNOTATION_ARRAY_HEADER_SIZE + ANNOTATION_ENTRY_SIZE
        );
        store_annotation_array(&mut bytes, &info).unwrap();

        let block = AnnotationArrayBlock::new(100, 1024, EXTENSION_VERSION);
        let annotations = block.read_annotations(bytes.as_slice()).unwrap();
        assert_eq!(annotations.entries.len(), 1);
        assert!(annotations.entries.contains_key(&0x000003));
    }

    #[test]
    fn test_store_replaces_out_of_range_parent() {
        let mut bytes = vec![0u8; 1024];
        store_annotation_bytes(&mut bytes, 600, b"payload").unwrap();
        let mut bad_parent = entry(0x000004, 600);
        bad_parent.parent = 0x0100_0000;
        store_annotation_array(
            &mut bytes,
            &AnnotationArrayCreateInfo {
                offset: 100,
                annotations: vec![bad_parent],
                group_sizes_offset: NULL_OFFSET,
                group_bytes_offset: NULL_OFFSET,
            },
        )
        .unwrap();

        let block = AnnotationArrayBlock::new(100, 1024, EXTENSION_VERSION);
        let annotations = block.read_annotations(bytes.as_slice()).unwrap();
        assert_eq!(annotations.entries[&0x000004].parent, NULL_ID);
    }

    #[test]
    fn test_groups_round_trip() {
        let groups = vec![
            AnnotationGroupCreateInfo {
                label: "tumor".to_string(),
                members: vec![0x000001, 0x000002],
            },
            AnnotationGroupCreateInfo {
                label: "stroma".to_string(),
                members: vec![0x000003],
            },
        ];

        let mut bytes = vec![0u8; 1024];
        store_annotation_bytes(&mut bytes, 600, b"x").unwrap();
        store_annotation_group_sizes(&mut bytes, 700, &groups).unwrap();
        store_annotation_group_bytes(&mut bytes, 800, &groups).unwrap();
        store_annotation_array(
            &mut bytes,
            &AnnotationArrayCreateInfo {
                offset: 100,
                annotations: vec![entry(0x000001, 600)],
                group_sizes_offset: 700,
                group_bytes_offset: 800,
            },
        )
        .unwrap();

        let block = AnnotationArrayBlock::new(100, 1024, EXTENSION_VERSION);
        block.validate_full(bytes.as_slice()).unwrap();

        let annotations = block.read_annotations(bytes.as_slice()).unwrap();
        assert_eq!(annotations.groups.len(), 2);
        let tumor = &annotations.groups["tumor"];
        assert_eq!(tumor.count, 2);
        // Member run sits after the 14-byte header and the 5-byte label
        assert_eq!(tumor.offset, 800 + BYTE_BLOCK_HEADER_SIZE + 5);
        assert_eq!(
            tumor.members(&bytes).unwrap(),
            vec![0x000001, 0x000002]
        );
        assert_eq!(
            annotations.groups["stroma"].members(&bytes).unwrap(),
            vec![0x000003]
        );
    }

    #[test]
    fn test_group_byte_total_cross_check() {
        let groups = vec![AnnotationGroupCreateInfo {
            label: "tumor".to_string(),
            members: vec![0x000001],
        }];
        let mut bytes = vec![0u8; 1024];
        store_annotation_group_sizes(&mut bytes, 700, &groups).unwrap();
        store_annotation_group_bytes(&mut bytes, 800, &groups).unwrap();

        let sizes = AnnotationGroupSizesBlock::new(700, 1024, EXTENSION_VERSION);
        let expected = sizes.validate_full(bytes.as_slice()).unwrap();
        assert_eq!(expected, 5 + 3);

        let group_bytes = AnnotationGroupBytesBlock::new(800, 1024, EXTENSION_VERSION);
        group_bytes.validate_full(bytes.as_slice(), expected).unwrap();
        assert!(matches!(
            group_bytes.validate_full(bytes.as_slice(), expected + 1),
            Err(IrisError::ByteCountMismatch { .. })
        ));
    }
}
