//! File map coverage and ordering laws.

use std::collections::HashMap;

use iris_file_extension::{generate_file_map, MapEntryKind, FILE_HEADER_SIZE};

use super::test_utils::{build_full_slide, build_minimal_slide, METADATA_SIZE, TILE_TABLE_SIZE};

#[test]
fn test_map_covers_every_block_exactly_once() {
    // The fixture packs its blocks back to back, so the map's ranges
    // must tile the whole file: sorted, non-overlapping, gap-free.
    let (bytes, _) = build_full_slide();
    let map = generate_file_map(&bytes).unwrap();

    assert_eq!(map.file_size, bytes.len() as u64);

    let mut cursor = 0u64;
    for (offset, entry) in map.iter() {
        assert_eq!(*offset, entry.block.offset);
        assert_eq!(
            *offset, cursor,
            "gap or overlap before block {:?} at {offset}",
            entry.kind
        );
        assert!(entry.size > 0);
        cursor = offset + entry.size;
    }
    assert_eq!(cursor, bytes.len() as u64);
}

#[test]
fn test_map_contains_every_block_kind() {
    let (bytes, layout) = build_full_slide();
    let map = generate_file_map(&bytes).unwrap();

    let kinds: HashMap<u64, MapEntryKind> = map
        .iter()
        .map(|(offset, entry)| (*offset, entry.kind))
        .collect();

    assert_eq!(kinds[&0], MapEntryKind::FileHeader);
    assert_eq!(kinds[&layout.tile_table], MapEntryKind::TileTable);
    assert_eq!(kinds[&layout.layer_extents], MapEntryKind::LayerExtents);
    assert_eq!(kinds[&layout.tile_offsets], MapEntryKind::TileOffsets);
    for payload in &layout.tile_payloads {
        assert_eq!(kinds[payload], MapEntryKind::TileData);
    }
    assert_eq!(kinds[&layout.metadata], MapEntryKind::Metadata);
    assert_eq!(kinds[&layout.attributes], MapEntryKind::Attributes);
    assert_eq!(kinds[&layout.attribute_sizes], MapEntryKind::AttributeSizes);
    assert_eq!(kinds[&layout.attribute_bytes], MapEntryKind::AttributeBytes);
    assert_eq!(kinds[&layout.image_array], MapEntryKind::AssociatedImages);
    for image in &layout.image_bytes {
        assert_eq!(kinds[image], MapEntryKind::AssociatedImageBytes);
    }
    assert_eq!(kinds[&layout.icc_profile], MapEntryKind::IccProfile);
    assert_eq!(kinds[&layout.annotations], MapEntryKind::Annotations);
    for annotation in &layout.annotation_bytes {
        assert_eq!(kinds[annotation], MapEntryKind::AnnotationBytes);
    }
    assert_eq!(
        kinds[&layout.group_sizes],
        MapEntryKind::AnnotationGroupSizes
    );
    assert_eq!(
        kinds[&layout.group_bytes],
        MapEntryKind::AnnotationGroupBytes
    );

    // 4 stored tiles (the sparse tile is not a block) + 2 image bytes +
    // 2 annotation bytes + 13 structural blocks
    assert_eq!(map.len(), 4 + 2 + 2 + 13);
}

#[test]
fn test_after_enumerates_blocks_a_writer_would_disturb() {
    let (bytes, layout) = build_full_slide();
    let map = generate_file_map(&bytes).unwrap();

    // Writing over the ICC profile disturbs everything stored beyond it
    let disturbed: Vec<MapEntryKind> = map
        .after(layout.icc_profile)
        .map(|(_, entry)| entry.kind)
        .collect();
    assert_eq!(
        disturbed,
        vec![
            MapEntryKind::AnnotationBytes,
            MapEntryKind::AnnotationBytes,
            MapEntryKind::AnnotationGroupSizes,
            MapEntryKind::AnnotationGroupBytes,
            MapEntryKind::Annotations,
            MapEntryKind::Metadata,
        ]
    );

    // Nothing lies beyond the final block
    let last = layout.metadata;
    assert_eq!(map.after(last).count(), 0);
}

#[test]
fn test_minimal_slide_map() {
    let bytes = build_minimal_slide();
    let map = generate_file_map(&bytes).unwrap();

    // Header, tile table, both (empty) arrays, metadata
    assert_eq!(map.len(), 5);
    assert_eq!(map.get(0).unwrap().size, FILE_HEADER_SIZE);
    assert_eq!(
        map.get(FILE_HEADER_SIZE).unwrap().size,
        TILE_TABLE_SIZE
    );
    let metadata_offset = bytes.len() as u64 - METADATA_SIZE;
    assert_eq!(map.get(metadata_offset).unwrap().size, METADATA_SIZE);
}

#[test]
fn test_map_rejects_damaged_file() {
    let (mut bytes, layout) = build_full_slide();
    bytes[layout.layer_extents as usize] ^= 0xFF;
    assert!(generate_file_map(&bytes).is_err());
}
