//! Offset-ordered map of every data block in the file.
//!
//! File mapping is the tool for performing safe updates: before writing
//! at a proposed offset, [`FileMap::after`] enumerates every block
//! located beyond it, i.e. the data that would be disturbed and must be
//! read and rewritten (or relocated) as part of the update. Always build
//! a file map before modifying a file in place.

use std::collections::btree_map::{self, BTreeMap};
use std::ops::Bound;

use crate::error::IrisError;
use crate::format::block::{Block, DataBlock};
use crate::format::header::{FileHeaderBlock, FILE_HEADER_SIZE};

/// Discriminant of a file map entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum MapEntryKind {
    FileHeader,
    TileTable,
    LayerExtents,
    TileOffsets,
    /// One compressed tile payload
    TileData,
    Metadata,
    Attributes,
    AttributeSizes,
    AttributeBytes,
    AssociatedImages,
    AssociatedImageBytes,
    IccProfile,
    Annotations,
    AnnotationBytes,
    AnnotationGroupSizes,
    AnnotationGroupBytes,
}

/// One mapped block: its kind, descriptor preamble and on-disk size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FileMapEntry {
    pub kind: MapEntryKind,
    pub block: DataBlock,
    /// Total on-disk size of the block including its variable tail
    pub size: u64,
}

/// Offset-ordered mapping of every data block in a slide file.
#[derive(Debug, Clone, Default)]
pub struct FileMap {
    entries: BTreeMap<u64, FileMapEntry>,
    /// Size of the mapped file in bytes
    pub file_size: u64,
}

impl FileMap {
    /// Number of mapped blocks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry at exactly `offset`, if one is mapped there.
    pub fn get(&self, offset: u64) -> Option<&FileMapEntry> {
        self.entries.get(&offset)
    }

    /// Iterate every entry in file order.
    pub fn iter(&self) -> btree_map::Iter<'_, u64, FileMapEntry> {
        self.entries.iter()
    }

    /// Iterate every entry strictly beyond `offset`, in file order.
    ///
    /// A writer preparing to overwrite at `offset` must preserve or
    /// relocate each returned block.
    pub fn after(&self, offset: u64) -> impl Iterator<Item = (&u64, &FileMapEntry)> {
        self.entries
            .range((Bound::Excluded(offset), Bound::Unbounded))
    }

    fn insert(&mut self, kind: MapEntryKind, block: DataBlock, size: u64) {
        self.entries.insert(
            block.offset,
            FileMapEntry { kind, block, size },
        );
    }
}

impl<'a> IntoIterator for &'a FileMap {
    type Item = (&'a u64, &'a FileMapEntry);
    type IntoIter = btree_map::Iter<'a, u64, FileMapEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Generate the offset-ordered block map of a slide file.
///
/// Walks the entire offset tree and records every block kind, including
/// one entry per individual tile payload. This is not cheap and is only
/// needed when recovering or modifying a file.
pub fn generate_file_map(bytes: &[u8]) -> Result<FileMap, IrisError> {
    let file_size = bytes.len() as u64;
    let mut map = FileMap {
        entries: BTreeMap::new(),
        file_size,
    };

    let header_block = FileHeaderBlock::new(file_size);
    header_block.validate_header(bytes)?;
    let header = header_block.read_header(bytes)?;
    map.insert(
        MapEntryKind::FileHeader,
        *header_block.descriptor(),
        FILE_HEADER_SIZE,
    );

    let tile_table = header_block.tile_table(bytes)?;
    map.insert(
        MapEntryKind::TileTable,
        *tile_table.descriptor(),
        tile_table.size(),
    );

    let extents = tile_table.layer_extents(bytes)?;
    map.insert(
        MapEntryKind::LayerExtents,
        *extents.descriptor(),
        extents.size(bytes)?,
    );

    let offsets = tile_table.tile_offsets(bytes)?;
    map.insert(
        MapEntryKind::TileOffsets,
        *offsets.descriptor(),
        offsets.size(bytes)?,
    );

    // The part that hurts: mapping in every individual tile payload
    let table = tile_table.read_tile_table(bytes)?;
    for layer in &table.layers {
        for tile in layer {
            if tile.is_sparse() {
                continue;
            }
            map.insert(
                MapEntryKind::TileData,
                DataBlock::new(tile.offset, file_size, header.extension_version),
                tile.size as u64,
            );
        }
    }

    let metadata = header_block.metadata(bytes)?;
    map.insert(
        MapEntryKind::Metadata,
        *metadata.descriptor(),
        metadata.size(),
    );

    if metadata.has_attributes(bytes)? {
        let attributes = metadata.attributes(bytes)?;
        map.insert(
            MapEntryKind::Attributes,
            *attributes.descriptor(),
            attributes.size(),
        );

        let sizes = attributes.sizes(bytes)?;
        map.insert(
            MapEntryKind::AttributeSizes,
            *sizes.descriptor(),
            sizes.size(bytes)?,
        );

        let value_bytes = attributes.bytes(bytes)?;
        map.insert(
            MapEntryKind::AttributeBytes,
            *value_bytes.descriptor(),
            value_bytes.size(bytes)?,
        );
    }

    if metadata.has_image_array(bytes)? {
        let image_array = metadata.image_array(bytes)?;
        map.insert(
            MapEntryKind::AssociatedImages,
            *image_array.descriptor(),
            image_array.size(bytes)?,
        );
        for image_bytes in image_array.bytes_blocks(bytes)? {
            map.insert(
                MapEntryKind::AssociatedImageBytes,
                *image_bytes.descriptor(),
                image_bytes.size(bytes)?,
            );
        }
    }

    if metadata.has_color_profile(bytes)? {
        let profile = metadata.color_profile(bytes)?;
        map.insert(
            MapEntryKind::IccProfile,
            *profile.descriptor(),
            profile.size(bytes)?,
        );
    }

    if metadata.has_annotations(bytes)? {
        let annotations = metadata.annotations(bytes)?;
        map.insert(
            MapEntryKind::Annotations,
            *annotations.descriptor(),
            annotations.size(bytes)?,
        );
        for annotation_bytes in annotations.bytes_blocks(bytes)? {
            map.insert(
                MapEntryKind::AnnotationBytes,
                *annotation_bytes.descriptor(),
                annotation_bytes.size(bytes)?,
            );
        }
        if annotations.has_groups(bytes)? {
            let group_sizes = annotations.group_sizes(bytes)?;
            map.insert(
                MapEntryKind::AnnotationGroupSizes,
                *group_sizes.descriptor(),
                group_sizes.size(bytes)?,
            );
            let group_bytes = annotations.group_bytes(bytes)?;
            map.insert(
                MapEntryKind::AnnotationGroupBytes,
                *group_bytes.descriptor(),
                group_bytes.size(bytes)?,
            );
        }
    }

    Ok(map)
}
