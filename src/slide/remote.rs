//! Remote-fetch build: walk a slide file without mapping it.
//!
//! Each block's bytes are *acquired* through a [`RangeReader`] before any
//! field is loaded from it; the acquired windows together form a sparse
//! [`Region`] the ordinary validators and readers run over unchanged.
//! Payloads that the abstraction never lifts (tile data, image bytes,
//! annotation byte streams, the ICC profile) are never fetched — only
//! the headers that describe them.
//!
//! The acquisition order mirrors the depth-first walk: the file header
//! first, then each child's fixed header, then the variable tails whose
//! lengths the headers declare. A fetch failure aborts the walk with a
//! [`FetchError`](crate::error::FetchError); there is no partial result.

use bytes::Bytes;

use crate::error::{FetchError, IrisError};
use crate::format::block::{ARRAY_HEADER_SIZE, BYTE_BLOCK_HEADER_SIZE};
use crate::format::header::{FileHeaderBlock, FILE_HEADER_SIZE};
use crate::format::metadata::METADATA_SIZE;
use crate::format::tags::NULL_OFFSET;
use crate::format::tile_table::TILE_TABLE_SIZE;
use crate::format::validation::{validate_region, ValidationReport};
use crate::format::attributes::ATTRIBUTES_SIZE;
use crate::format::annotations::ANNOTATION_ARRAY_HEADER_SIZE;
use crate::format::images::IMAGE_BYTES_HEADER_SIZE;
use crate::io::{RangeReader, Region};
use crate::slide::abstraction::{abstract_from_region, File};
use crate::format::header::quick_check;

/// A sparse, read-only view of a remote file assembled from fetched
/// byte windows.
#[derive(Debug, Default)]
pub struct AcquiredRegion {
    file_size: u64,
    /// Fetched `(offset, bytes)` windows, unordered; lookups scan for a
    /// window fully containing the requested range
    windows: Vec<(u64, Bytes)>,
}

impl AcquiredRegion {
    fn new(file_size: u64) -> Self {
        AcquiredRegion {
            file_size,
            windows: Vec::new(),
        }
    }

    fn insert(&mut self, offset: u64, bytes: Bytes) {
        self.windows.push((offset, bytes));
    }
}

impl Region for AcquiredRegion {
    fn file_size(&self) -> u64 {
        self.file_size
    }

    fn get(&self, offset: u64, len: u64) -> Result<&[u8], IrisError> {
        let end = offset.checked_add(len).ok_or(IrisError::OutOfBounds {
            block: "region",
            start: offset,
            end: u64::MAX,
            file_size: self.file_size,
        })?;
        for (window_offset, bytes) in &self.windows {
            let window_end = window_offset + bytes.len() as u64;
            if offset >= *window_offset && end <= window_end {
                let start = (offset - window_offset) as usize;
                return Ok(&bytes[start..start + len as usize]);
            }
        }
        Err(IrisError::OutOfBounds {
            block: "region",
            start: offset,
            end,
            file_size: self.file_size,
        })
    }
}

/// Fetch `len` bytes at `offset` into the region, clamped to the file
/// end so malformed length fields surface as validation errors rather
/// than fetch failures.
async fn acquire<R: RangeReader + ?Sized>(
    reader: &R,
    region: &mut AcquiredRegion,
    offset: u64,
    len: u64,
) -> Result<(), IrisError> {
    if offset >= region.file_size {
        return Ok(());
    }
    let len = len.min(region.file_size - offset);
    if len == 0 {
        return Ok(());
    }
    let bytes = reader.read_exact_at(offset, len).await?;
    if (bytes.len() as u64) < len {
        return Err(FetchError::ShortRead {
            offset,
            requested: len,
            received: bytes.len() as u64,
        }
        .into());
    }
    region.insert(offset, bytes);
    Ok(())
}

fn plausible(offset: u64, file_size: u64) -> bool {
    offset != NULL_OFFSET && offset < file_size
}

/// Acquire every block header and array tail reachable from the file
/// header, skipping implausible offsets (the validators reject those
/// afterwards with precise errors).
async fn acquire_structure<R: RangeReader + ?Sized>(
    reader: &R,
) -> Result<AcquiredRegion, IrisError> {
    let file_size = reader.size();
    let mut region = AcquiredRegion::new(file_size);

    acquire(reader, &mut region, 0, FILE_HEADER_SIZE).await?;
    let header = FileHeaderBlock::new(file_size);
    let Ok(version) = header.version(&region) else {
        return Ok(region);
    };

    // Tile table: header, then both arrays (header first, full tail next)
    if let Ok(tile_table_offset) = header.tile_table_offset(&region) {
        if plausible(tile_table_offset, file_size) {
            acquire(reader, &mut region, tile_table_offset, TILE_TABLE_SIZE).await?;
            let tile_table = crate::format::tile_table::TileTableBlock::new(
                tile_table_offset,
                file_size,
                version,
            );

            if let Ok(extents_offset) = tile_table.layer_extents_offset(&region) {
                if plausible(extents_offset, file_size) {
                    acquire(reader, &mut region, extents_offset, ARRAY_HEADER_SIZE).await?;
                    let extents = crate::format::tile_table::LayerExtentsBlock::new(
                        extents_offset,
                        file_size,
                        version,
                    );
                    if let Ok(size) = extents.size(&region) {
                        acquire(reader, &mut region, extents_offset, size).await?;
                    }
                }
            }
            if let Ok(offsets_offset) = tile_table.tile_offsets_offset(&region) {
                if plausible(offsets_offset, file_size) {
                    acquire(reader, &mut region, offsets_offset, ARRAY_HEADER_SIZE).await?;
                    let offsets = crate::format::tile_table::TileOffsetsBlock::new(
                        offsets_offset,
                        file_size,
                        version,
                    );
                    if let Ok(size) = offsets.size(&region) {
                        acquire(reader, &mut region, offsets_offset, size).await?;
                    }
                }
            }
        }
    }

    // Metadata and its optional children
    let Ok(metadata_offset) = header.metadata_offset(&region) else {
        return Ok(region);
    };
    if !plausible(metadata_offset, file_size) {
        return Ok(region);
    }
    acquire(reader, &mut region, metadata_offset, METADATA_SIZE).await?;
    let metadata =
        crate::format::metadata::MetadataBlock::new(metadata_offset, file_size, version);

    if metadata.has_attributes(&region).unwrap_or(false) {
        let attributes_offset = metadata.attributes_offset(&region)?;
        acquire(reader, &mut region, attributes_offset, ATTRIBUTES_SIZE).await?;
        let attributes = crate::format::attributes::AttributesBlock::new(
            attributes_offset,
            file_size,
            version,
        );

        if let Ok(sizes_offset) = attributes.sizes_offset(&region) {
            if plausible(sizes_offset, file_size) {
                acquire(reader, &mut region, sizes_offset, ARRAY_HEADER_SIZE).await?;
                let sizes = crate::format::attributes::AttributeSizesBlock::new(
                    sizes_offset,
                    file_size,
                    version,
                );
                if let Ok(size) = sizes.size(&region) {
                    acquire(reader, &mut region, sizes_offset, size).await?;
                }
            }
        }
        if let Ok(bytes_offset) = attributes.bytes_offset(&region) {
            if plausible(bytes_offset, file_size) {
                acquire(reader, &mut region, bytes_offset, BYTE_BLOCK_HEADER_SIZE).await?;
                let bytes = crate::format::attributes::AttributeBytesBlock::new(
                    bytes_offset,
                    file_size,
                    version,
                );
                if let Ok(size) = bytes.size(&region) {
                    acquire(reader, &mut region, bytes_offset, size).await?;
                }
            }
        }
    }

    if metadata.has_image_array(&region).unwrap_or(false) {
        let array_offset = metadata.image_array_offset(&region)?;
        acquire(reader, &mut region, array_offset, ARRAY_HEADER_SIZE).await?;
        let image_array =
            crate::format::images::ImageArrayBlock::new(array_offset, file_size, version);
        if let Ok(size) = image_array.size(&region) {
            acquire(reader, &mut region, array_offset, size).await?;
        }
        // Each image bytes header plus its title run; payloads stay remote
        for bytes_offset in image_array.entry_bytes_offsets(&region).unwrap_or_default() {
            if !plausible(bytes_offset, file_size) {
                continue;
            }
            acquire(reader, &mut region, bytes_offset, IMAGE_BYTES_HEADER_SIZE).await?;
            let image_bytes =
                crate::format::images::ImageBytesBlock::new(bytes_offset, file_size, version);
            if let Ok((title_len, _)) = image_bytes.lengths(&region) {
                acquire(
                    reader,
                    &mut region,
                    bytes_offset,
                    IMAGE_BYTES_HEADER_SIZE + title_len as u64,
                )
                .await?;
            }
        }
    }

    if metadata.has_color_profile(&region).unwrap_or(false) {
        let profile_offset = metadata.color_profile_offset(&region)?;
        acquire(reader, &mut region, profile_offset, BYTE_BLOCK_HEADER_SIZE).await?;
    }

    if metadata.has_annotations(&region).unwrap_or(false) {
        let array_offset = metadata.annotations_offset(&region)?;
        acquire(
            reader,
            &mut region,
            array_offset,
            ANNOTATION_ARRAY_HEADER_SIZE,
        )
        .await?;
        let annotations = crate::format::annotations::AnnotationArrayBlock::new(
            array_offset,
            file_size,
            version,
        );
        if let Ok(size) = annotations.size(&region) {
            acquire(reader, &mut region, array_offset, size).await?;
        }
        for bytes_offset in annotations.entry_bytes_offsets(&region).unwrap_or_default() {
            if !plausible(bytes_offset, file_size) {
                continue;
            }
            acquire(reader, &mut region, bytes_offset, BYTE_BLOCK_HEADER_SIZE).await?;
        }
        if annotations.has_groups(&region).unwrap_or(false) {
            let sizes_offset = annotations.group_sizes_offset(&region)?;
            acquire(reader, &mut region, sizes_offset, ARRAY_HEADER_SIZE).await?;
            let group_sizes = crate::format::annotations::AnnotationGroupSizesBlock::new(
                sizes_offset,
                file_size,
                version,
            );
            if let Ok(size) = group_sizes.size(&region) {
                acquire(reader, &mut region, sizes_offset, size).await?;
            }

            let bytes_offset = annotations.group_bytes_offset(&region)?;
            acquire(reader, &mut region, bytes_offset, BYTE_BLOCK_HEADER_SIZE).await?;
            let group_bytes = crate::format::annotations::AnnotationGroupBytesBlock::new(
                bytes_offset,
                file_size,
                version,
            );
            if let Ok(size) = group_bytes.size(&region) {
                acquire(reader, &mut region, bytes_offset, size).await?;
            }
        }
    }

    Ok(region)
}

/// Perform the quick magic + header-tag check against a remote resource.
pub async fn is_iris_file<R: RangeReader + ?Sized>(reader: &R) -> Result<bool, IrisError> {
    if reader.size() < FILE_HEADER_SIZE {
        return Ok(false);
    }
    let header = reader.read_exact_at(0, FILE_HEADER_SIZE).await?;
    Ok(quick_check(&header))
}

/// Deep structural validation of a remote resource.
///
/// Fetch failures are reported as errors in the returned report.
pub async fn validate_file_structure<R: RangeReader + ?Sized>(reader: &R) -> ValidationReport {
    match acquire_structure(reader).await {
        Ok(region) => validate_region(&region),
        Err(error) => ValidationReport::error(error),
    }
}

/// Abstract a remote resource's file structure into memory.
pub async fn abstract_file_structure<R: RangeReader + ?Sized>(
    reader: &R,
) -> Result<File, IrisError> {
    let region = acquire_structure(reader).await?;
    abstract_from_region(&region)
}
