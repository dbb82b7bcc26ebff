//! Attribute store: a key/value dictionary split across two arrays.
//!
//! The attributes header names the dictionary format and points at a
//! *sizes* array and a *bytes* array. The sizes array declares a key
//! length (u16) and value length (u32) per entry; the bytes array stores
//! the concatenated `key || value` runs. The two must agree: the byte
//! count declared by the bytes block equals the sum of all key and value
//! lengths.
//!
//! # Attributes header layout (29 bytes)
//!
//! ```text
//! Bytes 0-9:   Data block prefix (validation word + recovery tag)
//! Byte  10:    Attribute type (u8)
//! Bytes 11-12: Attribute format version (u16, DICOM year for DICOM)
//! Bytes 13-20: Sizes array offset (u64)
//! Bytes 21-28: Bytes array offset (u64)
//! ```

use indexmap::IndexMap;

use crate::error::IrisError;
use crate::format::block::{
    byte_block_bounds, byte_block_payload, read_byte_count, store_target, ArrayHeader, Block,
    DataBlock, ARRAY_HEADER_SIZE, BYTE_BLOCK_HEADER_SIZE,
};
use crate::format::tags::{AttributeType, RecoveryTag, EXTENSION_1_0, NULL_OFFSET};
use crate::io::primitive::{load_u16, load_u32, load_u64, load_u8, store_u16, store_u32, store_u64, store_u8};
use crate::io::Region;
use crate::slide::abstraction::Attributes;

const FORMAT: u64 = 10;
const VERSION: u64 = 11;
const LENGTHS_OFFSET: u64 = 13;
const BYTE_ARRAY_OFFSET: u64 = 21;

/// On-disk size of the v1.0 attributes header.
pub const ATTRIBUTES_SIZE: u64 = 29;

/// On-disk stride of one sizes entry: key length u16, value length u32.
pub const ATTRIBUTE_SIZE_ENTRY: u64 = 6;

const KEY_SIZE: usize = 0;
const VALUE_SIZE: usize = 2;

// =============================================================================
// AttributesBlock
// =============================================================================

/// Descriptor of the attributes header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributesBlock {
    desc: DataBlock,
}

impl Block for AttributesBlock {
    const TAG: RecoveryTag = RecoveryTag::Attributes;
    const NAME: &'static str = "ATTRIBUTES";

    fn descriptor(&self) -> &DataBlock {
        &self.desc
    }
}

impl AttributesBlock {
    pub fn new(offset: u64, file_size: u64, version: u32) -> Self {
        AttributesBlock {
            desc: DataBlock::new(offset, file_size, version),
        }
    }

    /// On-disk size of the header record.
    pub fn size(&self) -> u64 {
        let size = ATTRIBUTES_SIZE;
        if self.desc.version > EXTENSION_1_0 {
            // Extension slot: revision 2+ fields extend the size here.
        }
        size
    }

    /// Stored sizes array offset.
    pub fn sizes_offset<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        Ok(load_u64(base.get(self.desc.offset + LENGTHS_OFFSET, 8)?))
    }

    /// Stored bytes array offset.
    pub fn bytes_offset<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        Ok(load_u64(base.get(self.desc.offset + BYTE_ARRAY_OFFSET, 8)?))
    }

    /// Descriptor of the sizes array, offset-validated.
    pub fn sizes<R: Region + ?Sized>(&self, base: &R) -> Result<AttributeSizesBlock, IrisError> {
        let block = AttributeSizesBlock::new(
            self.sizes_offset(base)?,
            self.desc.file_size,
            self.desc.version,
        );
        block.validate_offset(base)?;
        Ok(block)
    }

    /// Descriptor of the bytes array, offset-validated.
    pub fn bytes<R: Region + ?Sized>(&self, base: &R) -> Result<AttributeBytesBlock, IrisError> {
        let block = AttributeBytesBlock::new(
            self.bytes_offset(base)?,
            self.desc.file_size,
            self.desc.version,
        );
        block.validate_offset(base)?;
        Ok(block)
    }

    /// Validate the header, the attribute type, and the mutual
    /// consistency of the sizes and bytes arrays.
    pub fn validate_full<R: Region + ?Sized>(&self, base: &R) -> Result<(), IrisError> {
        self.validate_offset(base)?;
        let header = base.get(self.desc.offset, ATTRIBUTES_SIZE)?;

        let format = load_u8(&header[FORMAT as usize..]);
        let attribute_type = AttributeType::from_u8(format, self.desc.version).ok_or(
            IrisError::UndefinedEnum {
                block: Self::NAME,
                field: "attribute format",
                value: format,
            },
        )?;
        let version = load_u16(&header[VERSION as usize..]);
        if attribute_type == AttributeType::Dicom && version == 0 {
            return Err(IrisError::InvalidLength {
                block: Self::NAME,
                field: "format version",
                message: "DICOM attributes shall include the specification version year; \
                          a version of zero indicates free-text attributes"
                    .to_string(),
            });
        }

        let sizes = AttributeSizesBlock::new(
            self.sizes_offset(base)?,
            self.desc.file_size,
            self.desc.version,
        );
        let expected = sizes.validate_full(base)?;

        let bytes = AttributeBytesBlock::new(
            self.bytes_offset(base)?,
            self.desc.file_size,
            self.desc.version,
        );
        bytes.validate_full(base, expected)?;
        Ok(())
    }

    /// Reify the dictionary, preserving the on-disk entry order.
    pub fn read_attributes<R: Region + ?Sized>(&self, base: &R) -> Result<Attributes, IrisError> {
        let header = base.get(self.desc.offset, ATTRIBUTES_SIZE)?;

        let format = load_u8(&header[FORMAT as usize..]);
        let attribute_type = AttributeType::from_u8(format, self.desc.version).ok_or(
            IrisError::UndefinedEnum {
                block: Self::NAME,
                field: "attribute format",
                value: format,
            },
        )?;
        let version = load_u16(&header[VERSION as usize..]);

        let sizes_block = self.sizes(base)?;
        let sizes = sizes_block.read_sizes(base)?;

        let bytes_block = self.bytes(base)?;
        let values = bytes_block.read_bytes(base, &sizes)?;

        let attributes = Attributes {
            attribute_type,
            version,
            values,
        };
        if self.desc.version > EXTENSION_1_0 {
            // Extension slot: revision 2+ parameters are lifted here.
        }
        Ok(attributes)
    }
}

// =============================================================================
// AttributeSizesBlock
// =============================================================================

/// Descriptor of the attribute sizes array block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSizesBlock {
    desc: DataBlock,
}

impl Block for AttributeSizesBlock {
    const TAG: RecoveryTag = RecoveryTag::AttributeSizes;
    const NAME: &'static str = "ATTRIBUTES_SIZES";

    fn descriptor(&self) -> &DataBlock {
        &self.desc
    }
}

impl AttributeSizesBlock {
    pub fn new(offset: u64, file_size: u64, version: u32) -> Self {
        AttributeSizesBlock {
            desc: DataBlock::new(offset, file_size, version),
        }
    }

    /// On-disk size of the block including its entry tail.
    pub fn size<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        let header = ArrayHeader::read(base, &self.desc)?;
        Ok(ARRAY_HEADER_SIZE + header.entries_len())
    }

    /// Validate the array bounds and return the total byte count the
    /// bytes array must declare: Σ(keyLen + valueLen).
    pub fn validate_full<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        self.validate_offset(base)?;
        let header = ArrayHeader::read(base, &self.desc)?;
        header.require_stride(ATTRIBUTE_SIZE_ENTRY, Self::NAME)?;
        let entries = header.entries(base, &self.desc, Self::NAME)?;

        let step = header.entry_size as usize;
        let mut expected = 0u64;
        for index in 0..header.entry_count as usize {
            let entry = &entries[index * step..];
            expected += load_u16(&entry[KEY_SIZE..]) as u64;
            expected += load_u32(&entry[VALUE_SIZE..]) as u64;
        }
        Ok(expected)
    }

    /// Lift the per-entry key and value lengths in on-disk order.
    pub fn read_sizes<R: Region + ?Sized>(
        &self,
        base: &R,
    ) -> Result<Vec<(u16, u32)>, IrisError> {
        let header = ArrayHeader::read(base, &self.desc)?;
        header.require_stride(ATTRIBUTE_SIZE_ENTRY, Self::NAME)?;
        let entries = header.entries(base, &self.desc, Self::NAME)?;

        let step = header.entry_size as usize;
        let mut sizes = Vec::with_capacity(header.entry_count as usize);
        for index in 0..header.entry_count as usize {
            let entry = &entries[index * step..];
            sizes.push((load_u16(&entry[KEY_SIZE..]), load_u32(&entry[VALUE_SIZE..])));
        }
        Ok(sizes)
    }
}

// =============================================================================
// AttributeBytesBlock
// =============================================================================

/// Descriptor of the attribute bytes block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeBytesBlock {
    desc: DataBlock,
}

impl Block for AttributeBytesBlock {
    const TAG: RecoveryTag = RecoveryTag::AttributeBytes;
    const NAME: &'static str = "ATTRIBUTES_BYTES";

    fn descriptor(&self) -> &DataBlock {
        &self.desc
    }
}

impl AttributeBytesBlock {
    pub fn new(offset: u64, file_size: u64, version: u32) -> Self {
        AttributeBytesBlock {
            desc: DataBlock::new(offset, file_size, version),
        }
    }

    /// On-disk size of the block including its payload.
    pub fn size<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        Ok(BYTE_BLOCK_HEADER_SIZE + read_byte_count(base, &self.desc)? as u64)
    }

    /// Validate the declared byte count against the total expected from
    /// the sizes array, and the payload bounds.
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

    /// Reify the key/value runs declared by `sizes` into an ordered map.
    pub fn read_bytes<R: Region + ?Sized>(
        &self,
        base: &R,
        sizes: &[(u16, u32)],
    ) -> Result<IndexMap<String, Vec<u8>>, IrisError> {
        let declared = read_byte_count(base, &self.desc)?;
        let expected: u64 = sizes
            .iter()
            .map(|(key, value)| *key as u64 + *value as u64)
            .sum();
        if expected != declared as u64 {
            return Err(IrisError::ByteCountMismatch {
                block: Self::NAME,
                expected,
                declared: declared as u64,
            });
        }

        let payload = byte_block_payload(base, &self.desc, declared, Self::NAME)?;
        let mut values = IndexMap::with_capacity(sizes.len());
        let mut cursor = 0usize;
        for (key_len, value_len) in sizes {
            let key_end = cursor + *key_len as usize;
            let value_end = key_end + *value_len as usize;
            let key = String::from_utf8_lossy(&payload[cursor..key_end]).into_owned();
            values.insert(key, payload[key_end..value_end].to_vec());
            cursor = value_end;
        }
        Ok(values)
    }
}

// =============================================================================
// Stores
// =============================================================================

/// Parameters for [`store_attributes`].
#[derive(Debug, Clone)]
pub struct AttributesCreateInfo {
    /// Offset at which the attributes header is stored
    pub attributes_offset: u64,
    /// Dictionary format
    pub attribute_type: AttributeType,
    /// Attribute format version; the DICOM year for DICOM dictionaries
    pub version: u16,
    /// Offset of an already-stored sizes array
    pub sizes_offset: u64,
    /// Offset of an already-stored bytes array
    pub bytes_offset: u64,
}

/// Serialize the attributes header.
pub fn store_attributes(base: &mut [u8], info: &AttributesCreateInfo) -> Result<(), IrisError> {
    if info.attributes_offset == NULL_OFFSET {
        return Err(IrisError::StorePrecondition {
            block: "ATTRIBUTES",
            message: "invalid attributes offset".to_string(),
        });
    }
    if info.attribute_type == AttributeType::Dicom && info.version == 0 {
        return Err(IrisError::StorePrecondition {
            block: "ATTRIBUTES",
            message: "DICOM attributes must adhere to DICOM PS3.3 and include the version year; \
                      a version of zero indicates free-text attributes"
                .to_string(),
        });
    }

    let file_size = base.len() as u64;
    let existing: &[u8] = base;
    let version = crate::format::tags::EXTENSION_VERSION;
    AttributeSizesBlock::new(info.sizes_offset, file_size, version)
        .validate_offset(existing)
        .map_err(|source| IrisError::StorePrecondition {
            block: "ATTRIBUTES",
            message: format!(
                "per the IFE specification Section 2.3.5, the sizes offset shall encode a \
                 valid offset to the attribute sizes array (Section 2.4.4): {source}"
            ),
        })?;
    AttributeBytesBlock::new(info.bytes_offset, file_size, version)
        .validate_offset(existing)
        .map_err(|source| IrisError::StorePrecondition {
            block: "ATTRIBUTES",
            message: format!(
                "per the IFE specification Section 2.3.5, the bytes offset shall encode a \
                 valid offset to the attribute bytes array (Section 2.4.5): {source}"
            ),
        })?;

    let target = store_target(base, info.attributes_offset, ATTRIBUTES_SIZE, "ATTRIBUTES")?;
    store_u64(target, info.attributes_offset);
    store_u16(&mut target[8..], RecoveryTag::Attributes.as_u16());
    store_u8(&mut target[FORMAT as usize..], info.attribute_type.as_u8());
    store_u16(&mut target[VERSION as usize..], info.version);
    store_u64(&mut target[LENGTHS_OFFSET as usize..], info.sizes_offset);
    store_u64(&mut target[BYTE_ARRAY_OFFSET as usize..], info.bytes_offset);
    Ok(())
}

fn check_attribute_lengths(attributes: &Attributes) -> Result<(), IrisError> {
    for (key, value) in &attributes.values {
        if key.len() > u16::MAX as usize {
            return Err(IrisError::StorePrecondition {
                block: "ATTRIBUTES_SIZES",
                message: format!("attribute key \"{key}\" exceeds the 16-bit key size limit"),
            });
        }
        if value.len() as u64 > u32::MAX as u64 {
            return Err(IrisError::StorePrecondition {
                block: "ATTRIBUTES_SIZES",
                message: format!(
                    "attribute value length ({} bytes) exceeds the 32-bit size limit",
                    value.len()
                ),
            });
        }
    }
    Ok(())
}

/// Total on-disk size of a sizes array block for `attributes`.
pub fn attribute_sizes_size(attributes: &Attributes) -> u64 {
    ARRAY_HEADER_SIZE + attributes.values.len() as u64 * ATTRIBUTE_SIZE_ENTRY
}

/// Serialize the attribute sizes array at `offset`, in map order.
pub fn store_attribute_sizes(
    base: &mut [u8],
    offset: u64,
    attributes: &Attributes,
) -> Result<(), IrisError> {
    if offset == NULL_OFFSET {
        return Err(IrisError::StorePrecondition {
            block: "ATTRIBUTES_SIZES",
            message: "null offset provided as location".to_string(),
        });
    }
    check_attribute_lengths(attributes)?;

    let total = attribute_sizes_size(attributes);
    let target = store_target(base, offset, total, "ATTRIBUTES_SIZES")?;
    store_u64(target, offset);
    store_u16(&mut target[8..], RecoveryTag::AttributeSizes.as_u16());
    store_u16(&mut target[10..], ATTRIBUTE_SIZE_ENTRY as u16);
    store_u32(&mut target[12..], attributes.values.len() as u32);

    let mut cursor = ARRAY_HEADER_SIZE as usize;
    for (key, value) in &attributes.values {
        store_u16(&mut target[cursor + KEY_SIZE..], key.len() as u16);
        store_u32(&mut target[cursor + VALUE_SIZE..], value.len() as u32);
        cursor += ATTRIBUTE_SIZE_ENTRY as usize;
    }
    Ok(())
}

/// Total on-disk size of a bytes block for `attributes`.
pub fn attribute_bytes_size(attributes: &Attributes) -> u64 {
    let payload: u64 = attributes
        .values
        .iter()
        .map(|(key, value)| key.len() as u64 + value.len() as u64)
        .sum();
    BYTE_BLOCK_HEADER_SIZE + payload
}

/// Serialize the attribute bytes block at `offset`, in map order.
pub fn store_attribute_bytes(
    base: &mut [u8],
    offset: u64,
    attributes: &Attributes,
) -> Result<(), IrisError> {
    if offset == NULL_OFFSET {
        return Err(IrisError::StorePrecondition {
            block: "ATTRIBUTES_BYTES",
            message: "null offset provided as location".to_string(),
        });
    }
    check_attribute_lengths(attributes)?;

    let payload: u64 = attributes
        .values
        .iter()
        .map(|(key, value)| key.len() as u64 + value.len() as u64)
        .sum();
    if payload > u32::MAX as u64 {
        return Err(IrisError::StorePrecondition {
            block: "ATTRIBUTES_BYTES",
            message: format!(
                "attribute bytes array length ({payload} bytes) exceeds the 32-bit size limit"
            ),
        });
    }

    let total = BYTE_BLOCK_HEADER_SIZE + payload;
    let target = store_target(base, offset, total, "ATTRIBUTES_BYTES")?;
    store_u64(target, offset);
    store_u16(&mut target[8..], RecoveryTag::AttributeBytes.as_u16());
    store_u32(&mut target[10..], payload as u32);

    let mut cursor = BYTE_BLOCK_HEADER_SIZE as usize;
    for (key, value) in &attributes.values {
        target[cursor..cursor + key.len()].copy_from_slice(key.as_bytes());
        cursor += key.len();
        target[cursor..cursor + value.len()].copy_from_slice(value);
        cursor += value.len();
    }
    Ok(())
}
