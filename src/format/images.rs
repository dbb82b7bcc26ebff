//! Associated images: labels, thumbnails and overview images keyed by title.
//!
//! The image array holds fixed 20-byte entries, each pointing at an
//! *image bytes* block that stores an ASCII title followed by the
//! compressed image payload. Titles must be unique across the array; a
//! duplicate warns and the later entry is skipped.
//!
//! # Image entry layout (20 bytes)
//!
//! ```text
//! Bytes 0-7:   Image bytes block offset (u64)
//! Bytes 8-11:  Pixel width (u32)
//! Bytes 12-15: Pixel height (u32)
//! Byte  16:    Image encoding (u8)
//! Byte  17:    Source pixel format (u8)
//! Bytes 18-19: Orientation in degrees (u16, stored mod 360, unvalidated)
//! ```
//!
//! # Image bytes layout (16 byte header)
//!
//! ```text
//! Bytes 0-9:   Data block prefix (validation word + recovery tag)
//! Bytes 10-11: Title length (u16, 1..)
//! Bytes 12-15: Image byte length (u32, 1..)
//! Bytes 16..:  title || image bytes
//! ```

use std::collections::HashMap;

use tracing::warn;

use crate::error::IrisError;
use crate::format::block::{
    store_target, ArrayHeader, Block, DataBlock, ARRAY_HEADER_SIZE,
};
use crate::format::tags::{ImageEncoding, PixelFormat, RecoveryTag, NULL_OFFSET};
use crate::io::primitive::{
    load_u16, load_u32, load_u64, load_u8, store_u16, store_u32, store_u64, store_u8,
};
use crate::io::Region;
use crate::slide::abstraction::{AssociatedImage, AssociatedImageInfo, AssociatedImages};

const ENTRY_BYTES_OFFSET: usize = 0;
const ENTRY_WIDTH: usize = 8;
const ENTRY_HEIGHT: usize = 12;
const ENTRY_ENCODING: usize = 16;
const ENTRY_FORMAT: usize = 17;
const ENTRY_ORIENTATION: usize = 18;

/// On-disk stride of one image array entry.
pub const IMAGE_ENTRY_SIZE: u64 = 20;

const TITLE_SIZE: u64 = 10;
const IMAGE_SIZE: u64 = 12;

/// On-disk size of the image bytes header (before the title run).
pub const IMAGE_BYTES_HEADER_SIZE: u64 = 16;

// =============================================================================
// ImageArrayBlock
// =============================================================================

/// Descriptor of the associated images array block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageArrayBlock {
    desc: DataBlock,
}

impl Block for ImageArrayBlock {
    const TAG: RecoveryTag = RecoveryTag::AssociatedImages;
    const NAME: &'static str = "IMAGE_ARRAY";

    fn descriptor(&self) -> &DataBlock {
        &self.desc
    }
}

impl ImageArrayBlock {
    pub fn new(offset: u64, file_size: u64, version: u32) -> Self {
        ImageArrayBlock {
            desc: DataBlock::new(offset, file_size, version),
        }
    }

    /// On-disk size of the block including its entry tail.
    pub fn size<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        let header = ArrayHeader::read(base, &self.desc)?;
        Ok(ARRAY_HEADER_SIZE + header.entries_len())
    }

    /// Validate the array bounds, every entry's enumerations, and each
    /// referenced image bytes block in full.
    pub fn validate_full<R: Region + ?Sized>(&self, base: &R) -> Result<(), IrisError> {
        self.validate_offset(base)?;
        let header = ArrayHeader::read(base, &self.desc)?;
        header.require_stride(IMAGE_ENTRY_SIZE, Self::NAME)?;
        let entries = header.entries(base, &self.desc, Self::NAME)?;

        let step = header.entry_size as usize;
        for index in 0..header.entry_count as usize {
            let entry = &entries[index * step..];

            let bytes_block = ImageBytesBlock::new(
                load_u64(&entry[ENTRY_BYTES_OFFSET..]),
                self.desc.file_size,
                self.desc.version,
            );
            bytes_block.validate_full(base)?;

            let encoding = load_u8(&entry[ENTRY_ENCODING..]);
            if ImageEncoding::from_u8(encoding, self.desc.version).is_none() {
                return Err(IrisError::UndefinedEnum {
                    block: Self::NAME,
                    field: "image encoding",
                    value: encoding,
                });
            }
            let format = load_u8(&entry[ENTRY_FORMAT..]);
            if PixelFormat::from_u8(format, self.desc.version).is_none() {
                return Err(IrisError::UndefinedEnum {
                    block: Self::NAME,
                    field: "image pixel format",
                    value: format,
                });
            }
        }
        Ok(())
    }

    /// Lift the title-keyed image dictionary.
    ///
    /// A duplicate title warns and skips the later entry; payload bytes
    /// are not copied, only located.
    pub fn read_images<R: Region + ?Sized>(
        &self,
        base: &R,
    ) -> Result<AssociatedImages, IrisError> {
        let header = ArrayHeader::read(base, &self.desc)?;
        header.require_stride(IMAGE_ENTRY_SIZE, Self::NAME)?;
        let entries = header.entries(base, &self.desc, Self::NAME)?;

        let step = header.entry_size as usize;
        let mut images = HashMap::with_capacity(header.entry_count as usize);
        for index in 0..header.entry_count as usize {
            let entry = &entries[index * step..];

            let bytes_offset = load_u64(&entry[ENTRY_BYTES_OFFSET..]);
            if bytes_offset == NULL_OFFSET || bytes_offset >= self.desc.file_size {
                return Err(IrisError::InvalidBlockOffset {
                    block: ImageBytesBlock::NAME,
                    offset: bytes_offset,
                    file_size: self.desc.file_size,
                });
            }
            let bytes_block =
                ImageBytesBlock::new(bytes_offset, self.desc.file_size, self.desc.version);
            bytes_block.validate_offset(base)?;
            let (title, payload_offset, byte_size) = bytes_block.read_image_bytes(base)?;

            if images.contains_key(&title) {
                warn!(
                    title,
                    "duplicate associated image title; skipping duplicate entry"
                );
                continue;
            }

            let encoding_raw = load_u8(&entry[ENTRY_ENCODING..]);
            let encoding = ImageEncoding::from_u8(encoding_raw, self.desc.version).ok_or(
                IrisError::UndefinedEnum {
                    block: Self::NAME,
                    field: "image encoding",
                    value: encoding_raw,
                },
            )?;
            let format_raw = load_u8(&entry[ENTRY_FORMAT..]);
            let format = PixelFormat::from_u8(format_raw, self.desc.version).ok_or(
                IrisError::UndefinedEnum {
                    block: Self::NAME,
                    field: "image pixel format",
                    value: format_raw,
                },
            )?;

            images.insert(
                title,
                AssociatedImage {
                    offset: payload_offset,
                    byte_size: byte_size as u64,
                    info: AssociatedImageInfo {
                        width: load_u32(&entry[ENTRY_WIDTH..]),
                        height: load_u32(&entry[ENTRY_HEIGHT..]),
                        encoding,
                        format,
                        orientation: load_u16(&entry[ENTRY_ORIENTATION..]) % 360,
                    },
                },
            );
        }
        Ok(images)
    }

    /// Bytes-block offsets referenced by each entry, unvalidated.
    pub fn entry_bytes_offsets<R: Region + ?Sized>(
        &self,
        base: &R,
    ) -> Result<Vec<u64>, IrisError> {
        let header = ArrayHeader::read(base, &self.desc)?;
        header.require_stride(IMAGE_ENTRY_SIZE, Self::NAME)?;
        let entries = header.entries(base, &self.desc, Self::NAME)?;

        let step = header.entry_size as usize;
        Ok((0..header.entry_count as usize)
            .map(|index| load_u64(&entries[index * step + ENTRY_BYTES_OFFSET..]))
            .collect())
    }

    /// Descriptors of every referenced image bytes block, in array order.
    pub fn bytes_blocks<R: Region + ?Sized>(
        &self,
        base: &R,
    ) -> Result<Vec<ImageBytesBlock>, IrisError> {
        let header = ArrayHeader::read(base, &self.desc)?;
        header.require_stride(IMAGE_ENTRY_SIZE, Self::NAME)?;
        let entries = header.entries(base, &self.desc, Self::NAME)?;

        let step = header.entry_size as usize;
        let mut blocks = Vec::with_capacity(header.entry_count as usize);
        for index in 0..header.entry_count as usize {
            let entry = &entries[index * step..];
            let block = ImageBytesBlock::new(
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
// ImageBytesBlock
// =============================================================================

/// Descriptor of an image bytes block: `title || payload`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBytesBlock {
    desc: DataBlock,
}

impl Block for ImageBytesBlock {
    const TAG: RecoveryTag = RecoveryTag::AssociatedImageBytes;
    const NAME: &'static str = "IMAGE_BYTES";

    fn descriptor(&self) -> &DataBlock {
        &self.desc
    }
}

impl ImageBytesBlock {
    pub fn new(offset: u64, file_size: u64, version: u32) -> Self {
        ImageBytesBlock {
            desc: DataBlock::new(offset, file_size, version),
        }
    }

    pub(crate) fn lengths<R: Region + ?Sized>(&self, base: &R) -> Result<(u16, u32), IrisError> {
        let header = base.get(self.desc.offset, IMAGE_BYTES_HEADER_SIZE)?;
        Ok((
            load_u16(&header[TITLE_SIZE as usize..]),
            load_u32(&header[IMAGE_SIZE as usize..]),
        ))
    }

    /// On-disk size of the block including title and payload.
    pub fn size<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        let (title, image) = self.lengths(base)?;
        Ok(IMAGE_BYTES_HEADER_SIZE + title as u64 + image as u64)
    }

    /// Validate the declared lengths and the block's overall bounds.
    pub fn validate_full<R: Region + ?Sized>(&self, base: &R) -> Result<(), IrisError> {
        self.validate_offset(base)?;
        let (title, image) = self.lengths(base)?;
        if title == 0 {
            return Err(IrisError::InvalidLength {
                block: Self::NAME,
                field: "title size",
                message: "title size shall be greater than zero".to_string(),
            });
        }
        if image == 0 {
            return Err(IrisError::InvalidLength {
                block: Self::NAME,
                field: "image size",
                message: "image size shall encode a byte count greater than zero".to_string(),
            });
        }
        let end = self.desc.offset + IMAGE_BYTES_HEADER_SIZE + title as u64 + image as u64;
        if end > self.desc.file_size {
            return Err(IrisError::OutOfBounds {
                block: Self::NAME,
                start: self.desc.offset,
                end,
                file_size: self.desc.file_size,
            });
        }
        Ok(())
    }

    /// Lift the title and locate the payload.
    ///
    /// Returns `(title, payload offset, payload byte count)`; the payload
    /// itself stays in the region.
    pub fn read_image_bytes<R: Region + ?Sized>(
        &self,
        base: &R,
    ) -> Result<(String, u64, u32), IrisError> {
        self.validate_full(base)?;
        let (title_len, image_len) = self.lengths(base)?;

        let title_start = self.desc.offset + IMAGE_BYTES_HEADER_SIZE;
        let title_bytes = base.get(title_start, title_len as u64)?;
        let title = String::from_utf8_lossy(title_bytes).into_owned();
        Ok((title, title_start + title_len as u64, image_len))
    }
}

// =============================================================================
// Stores
// =============================================================================

/// One image entry for [`store_image_array`].
#[derive(Debug, Clone)]
pub struct ImageEntryCreateInfo {
    /// Offset of an already-stored image bytes block
    pub bytes_offset: u64,
    pub width: u32,
    pub height: u32,
    pub encoding: ImageEncoding,
    pub format: PixelFormat,
    /// Orientation in degrees; stored mod 360
    pub orientation: u16,
}

/// Parameters for [`store_image_array`].
#[derive(Debug, Clone)]
pub struct ImageArrayCreateInfo {
    /// Offset at which the image array is stored
    pub offset: u64,
    pub images: Vec<ImageEntryCreateInfo>,
}

/// Total on-disk size of an image array block holding `count` entries.
pub fn image_array_size(count: usize) -> u64 {
    ARRAY_HEADER_SIZE + count as u64 * IMAGE_ENTRY_SIZE
}

/// Serialize the associated images array.
///
/// Every entry must reference an already-stored image bytes block and
/// carry valid dimensions and enumerations.
pub fn store_image_array(base: &mut [u8], info: &ImageArrayCreateInfo) -> Result<(), IrisError> {
    if info.offset == NULL_OFFSET {
        return Err(IrisError::StorePrecondition {
            block: "IMAGE_ARRAY",
            message: "null offset provided as location".to_string(),
        });
    }
    let file_size = base.len() as u64;
    let existing: &[u8] = base;
    for image in &info.images {
        if image.width == 0 {
            return Err(IrisError::StorePrecondition {
                block: "IMAGE_ARRAY",
                message: format!(
                    "invalid width ({} px); per the IFE specification Section 2.4.6, width \
                     shall encode the horizontal pixel extent and be greater than zero",
                    image.width
                ),
            });
        }
        if image.height == 0 {
            return Err(IrisError::StorePrecondition {
                block: "IMAGE_ARRAY",
                message: format!(
                    "invalid height ({} px); per the IFE specification Section 2.4.6, height \
                     shall encode the vertical pixel extent and be greater than zero",
                    image.height
                ),
            });
        }
        ImageBytesBlock::new(
            image.bytes_offset,
            file_size,
            crate::format::tags::EXTENSION_VERSION,
        )
        .validate_offset(existing)
        .map_err(|source| IrisError::StorePrecondition {
            block: "IMAGE_ARRAY",
            message: format!("image entry shall reference a stored image bytes block: {source}"),
        })?;
    }

    let total = image_array_size(info.images.len());
    let target = store_target(base, info.offset, total, "IMAGE_ARRAY")?;
    store_u64(target, info.offset);
    store_u16(&mut target[8..], RecoveryTag::AssociatedImages.as_u16());
    store_u16(&mut target[10..], IMAGE_ENTRY_SIZE as u16);
    store_u32(&mut target[12..], info.images.len() as u32);

    let mut cursor = ARRAY_HEADER_SIZE as usize;
    for image in &info.images {
        store_u64(&mut target[cursor + ENTRY_BYTES_OFFSET..], image.bytes_offset);
        store_u32(&mut target[cursor + ENTRY_WIDTH..], image.width);
        store_u32(&mut target[cursor + ENTRY_HEIGHT..], image.height);
        store_u8(&mut target[cursor + ENTRY_ENCODING..], image.encoding.as_u8());
        store_u8(&mut target[cursor + ENTRY_FORMAT..], image.format.as_u8());
        store_u16(
            &mut target[cursor + ENTRY_ORIENTATION..],
            image.orientation % 360,
        );
        cursor += IMAGE_ENTRY_SIZE as usize;
    }
    Ok(())
}

/// Parameters for [`store_image_bytes`].
#[derive(Debug, Clone)]
pub struct ImageBytesCreateInfo<'a> {
    /// Offset at which the image bytes block is stored
    pub offset: u64,
    /// Unique ASCII title of the image
    pub title: &'a str,
    /// Compressed image payload
    pub data: &'a [u8],
}

/// Total on-disk size of an image bytes block.
pub fn image_bytes_size(title: &str, data_len: usize) -> u64 {
    IMAGE_BYTES_HEADER_SIZE + title.len() as u64 + data_len as u64
}

/// Serialize an image bytes block: header, title run, then the payload.
pub fn store_image_bytes(base: &mut [u8], info: &ImageBytesCreateInfo) -> Result<(), IrisError> {
    if info.offset == NULL_OFFSET {
        return Err(IrisError::StorePrecondition {
            block: "IMAGE_BYTES",
            message: "null offset provided as location".to_string(),
        });
    }
    if info.title.is_empty() {
        return Err(IrisError::StorePrecondition {
            block: "IMAGE_BYTES",
            message: "no title given; per the IFE specification Section 2.4.7, an associated \
                      image shall carry a valid, unique ASCII title"
                .to_string(),
        });
    }
    if info.title.len() > u16::MAX as usize {
        return Err(IrisError::StorePrecondition {
            block: "IMAGE_BYTES",
            message: "associated image title exceeds the 16-bit length limit".to_string(),
        });
    }
    if info.data.is_empty() {
        return Err(IrisError::StorePrecondition {
            block: "IMAGE_BYTES",
            message: "no image data provided; per the IFE specification Section 2.4.7, the \
                      byte stream shall comprise a valid array of compressed image bytes"
                .to_string(),
        });
    }
    if info.data.len() as u64 > u32::MAX as u64 {
        return Err(IrisError::StorePrecondition {
            block: "IMAGE_BYTES",
            message: "image byte stream exceeds the 32-bit size limit".to_string(),
        });
    }

    let total = image_bytes_size(info.title, info.data.len());
    let target = store_target(base, info.offset, total, "IMAGE_BYTES")?;
    store_u64(target, info.offset);
    store_u16(&mut target[8..], RecoveryTag::AssociatedImageBytes.as_u16());
    store_u16(&mut target[TITLE_SIZE as usize..], info.title.len() as u16);
    store_u32(&mut target[IMAGE_SIZE as usize..], info.data.len() as u32);

    let mut cursor = IMAGE_BYTES_HEADER_SIZE as usize;
    target[cursor..cursor + info.title.len()].copy_from_slice(info.title.as_bytes());
    cursor += info.title.len();
    target[cursor..cursor + info.data.len()].copy_from_slice(info.data);
    Ok(())
}
