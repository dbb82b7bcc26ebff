//! Test utilities for integration tests.
//!
//! Builds complete in-memory slide files through the public `store_*`
//! writers, returning both the bytes and the layout that produced them so
//! tests can assert against known offsets.

use indexmap::IndexMap;

use iris_file_extension::{
    store_annotation_array, store_annotation_bytes, store_annotation_group_bytes,
    store_annotation_group_sizes, store_attribute_bytes, store_attribute_sizes, store_attributes,
    store_file_header, store_icc_profile, store_image_array, store_image_bytes,
    store_layer_extents, store_metadata, store_tile_offsets, store_tile_table,
    annotation_array_size, annotation_bytes_size, annotation_group_bytes_size,
    annotation_group_sizes_size, attribute_bytes_size, attribute_sizes_size, icc_profile_size,
    image_array_size, image_bytes_size, layer_extents_size,
    AnnotationArrayCreateInfo, AnnotationEntryCreateInfo, AnnotationFormat,
    AnnotationGroupCreateInfo, AttributeType, Attributes, AttributesCreateInfo, CodecVersion,
    HeaderCreateInfo, ImageArrayCreateInfo, ImageBytesCreateInfo, ImageEncoding,
    ImageEntryCreateInfo, LayerExtent, MetadataCreateInfo, PixelFormat, TileEncoding, TileEntry,
    TileTableCreateInfo, FILE_HEADER_SIZE, NULL_ID, NULL_OFFSET,
};

/// Metadata header size (kept in step with the on-disk layout).
pub const METADATA_SIZE: u64 = 56;

/// Tile table header size.
pub const TILE_TABLE_SIZE: u64 = 44;

/// Offsets of every block a [`build_full_slide`] fixture contains.
#[derive(Debug, Clone)]
pub struct SlideLayout {
    pub file_size: u64,
    pub tile_table: u64,
    pub layer_extents: u64,
    pub tile_offsets: u64,
    pub tile_payloads: Vec<u64>,
    pub attribute_sizes: u64,
    pub attribute_bytes: u64,
    pub attributes: u64,
    pub image_bytes: Vec<u64>,
    pub image_array: u64,
    pub icc_profile: u64,
    pub annotation_bytes: Vec<u64>,
    pub group_sizes: u64,
    pub group_bytes: u64,
    pub annotations: u64,
    pub metadata: u64,
}

/// Fake compressed payload for one tile.
pub fn tile_payload(index: usize) -> Vec<u8> {
    vec![0xA0 + index as u8; 32]
}

/// Layer extents used by the full fixture: a 1x1 layer 0 and a 2x2
/// layer 1.
pub fn fixture_extents() -> Vec<LayerExtent> {
    vec![
        LayerExtent {
            x_tiles: 1,
            y_tiles: 1,
            scale: 1.0,
            downsample: 0.0,
        },
        LayerExtent {
            x_tiles: 2,
            y_tiles: 2,
            scale: 4.0,
            downsample: 0.0,
        },
    ]
}

/// Attribute dictionary used by the full fixture.
pub fn fixture_attributes() -> Attributes {
    let mut values = IndexMap::new();
    values.insert("scanner".to_string(), b"Iris Scope Mk II".to_vec());
    values.insert("stain".to_string(), b"H&E".to_vec());
    Attributes {
        attribute_type: AttributeType::I2S,
        version: 0,
        values,
    }
}

/// ICC payload used by the full fixture.
pub const FIXTURE_ICC: &[u8] = b"acspAPPL test color profile";

/// Build a complete, valid version 1.0 slide file containing every block
/// kind: a two-layer pyramid with one sparse tile, attributes, two
/// associated images, an ICC profile, and two grouped annotations.
pub fn build_full_slide() -> (Vec<u8>, SlideLayout) {
    let extents = fixture_extents();
    let attributes = fixture_attributes();
    let groups = vec![
        AnnotationGroupCreateInfo {
            label: "tumor".to_string(),
            members: vec![0x000001],
        },
        AnnotationGroupCreateInfo {
            label: "stroma".to_string(),
            members: vec![0x000002],
        },
    ];

    // Lay the blocks out back to back behind the header
    let mut cursor = FILE_HEADER_SIZE;
    let tile_table = cursor;
    cursor += TILE_TABLE_SIZE;
    let layer_extents = cursor;
    cursor += layer_extents_size(&extents);

    // 1 + 4 tiles, one of which is sparse
    let tile_offsets = cursor;
    cursor += 16 + 5 * 8;

    let mut tile_payloads = Vec::new();
    for _ in 0..4 {
        tile_payloads.push(cursor);
        cursor += 32;
    }

    let attribute_sizes = cursor;
    cursor += attribute_sizes_size(&attributes);
    let attribute_bytes = cursor;
    cursor += attribute_bytes_size(&attributes);
    let attributes_offset = cursor;
    cursor += 29;

    let mut image_bytes = Vec::new();
    image_bytes.push(cursor);
    cursor += image_bytes_size("label", b"label png bytes".len());
    image_bytes.push(cursor);
    cursor += image_bytes_size("thumbnail", b"thumbnail jpg".len());
    let image_array = cursor;
    cursor += image_array_size(2);

    let icc_profile = cursor;
    cursor += icc_profile_size(FIXTURE_ICC.len());

    let mut annotation_bytes = Vec::new();
    annotation_bytes.push(cursor);
    cursor += annotation_bytes_size(b"<svg/>".len());
    annotation_bytes.push(cursor);
    cursor += annotation_bytes_size(b"necrosis".len());

    let group_sizes = cursor;
    cursor += annotation_group_sizes_size(&groups);
    let group_bytes = cursor;
    cursor += annotation_group_bytes_size(&groups);

    let annotations_offset = cursor;
    let annotation_entries = vec![
        AnnotationEntryCreateInfo {
            identifier: 0x000001,
            bytes_offset: annotation_bytes[0],
            format: AnnotationFormat::Svg,
            x_location: 12.0,
            y_location: 24.0,
            x_size: 128.0,
            y_size: 64.0,
            width: 512,
            height: 256,
            parent: NULL_ID,
        },
        AnnotationEntryCreateInfo {
            identifier: 0x000002,
            bytes_offset: annotation_bytes[1],
            format: AnnotationFormat::Text,
            x_location: 40.0,
            y_location: 80.0,
            x_size: 32.0,
            y_size: 16.0,
            width: 0,
            height: 0,
            parent: 0x000001,
        },
    ];
    let annotation_info = AnnotationArrayCreateInfo {
        offset: annotations_offset,
        annotations: annotation_entries,
        group_sizes_offset: group_sizes,
        group_bytes_offset: group_bytes,
    };
    cursor += annotation_array_size(&annotation_info);

    let metadata = cursor;
    cursor += METADATA_SIZE;
    let file_size = cursor;

    let mut bytes = vec![0u8; file_size as usize];

    // Tile payloads first so the offset array references real data
    for (index, offset) in tile_payloads.iter().enumerate() {
        let payload = tile_payload(index);
        bytes[*offset as usize..*offset as usize + payload.len()].copy_from_slice(&payload);
    }

    store_layer_extents(&mut bytes, layer_extents, &extents).unwrap();
    let tiles = vec![
        vec![TileEntry {
            offset: tile_payloads[0],
            size: 32,
        }],
        vec![
            TileEntry {
                offset: tile_payloads[1],
                size: 32,
            },
            TileEntry {
                offset: tile_payloads[2],
                size: 32,
            },
            TileEntry {
                offset: NULL_OFFSET,
                size: 0,
            },
            TileEntry {
                offset: tile_payloads[3],
                size: 32,
            },
        ],
    ];
    store_tile_offsets(&mut bytes, tile_offsets, &tiles).unwrap();
    store_tile_table(
        &mut bytes,
        &TileTableCreateInfo {
            tile_table_offset: tile_table,
            encoding: TileEncoding::Jpeg,
            format: Some(PixelFormat::Rgb8),
            tile_offsets_offset: tile_offsets,
            layer_extents_offset: layer_extents,
            width_pixels: 256,
            height_pixels: 256,
        },
    )
    .unwrap();

    store_attribute_sizes(&mut bytes, attribute_sizes, &attributes).unwrap();
    store_attribute_bytes(&mut bytes, attribute_bytes, &attributes).unwrap();
    store_attributes(
        &mut bytes,
        &AttributesCreateInfo {
            attributes_offset,
            attribute_type: attributes.attribute_type,
            version: attributes.version,
            sizes_offset: attribute_sizes,
            bytes_offset: attribute_bytes,
        },
    )
    .unwrap();

    store_image_bytes(
        &mut bytes,
        &ImageBytesCreateInfo {
            offset: image_bytes[0],
            title: "label",
            data: b"label png bytes",
        },
    )
    .unwrap();
    store_image_bytes(
        &mut bytes,
        &ImageBytesCreateInfo {
            offset: image_bytes[1],
            title: "thumbnail",
            data: b"thumbnail jpg",
        },
    )
    .unwrap();
    store_image_array(
        &mut bytes,
        &ImageArrayCreateInfo {
            offset: image_array,
            images: vec![
                ImageEntryCreateInfo {
                    bytes_offset: image_bytes[0],
                    width: 400,
                    height: 300,
                    encoding: ImageEncoding::Png,
                    format: PixelFormat::Rgb8,
                    orientation: 0,
                },
                ImageEntryCreateInfo {
                    bytes_offset: image_bytes[1],
                    width: 120,
                    height: 90,
                    encoding: ImageEncoding::Jpeg,
                    format: PixelFormat::Rgba8,
                    orientation: 180,
                },
            ],
        },
    )
    .unwrap();

    store_icc_profile(&mut bytes, icc_profile, FIXTURE_ICC).unwrap();

    store_annotation_bytes(&mut bytes, annotation_bytes[0], b"<svg/>").unwrap();
    store_annotation_bytes(&mut bytes, annotation_bytes[1], b"necrosis").unwrap();
    store_annotation_group_sizes(&mut bytes, group_sizes, &groups).unwrap();
    store_annotation_group_bytes(&mut bytes, group_bytes, &groups).unwrap();
    store_annotation_array(&mut bytes, &annotation_info).unwrap();

    store_metadata(
        &mut bytes,
        &MetadataCreateInfo {
            metadata_offset: metadata,
            codec_version: CodecVersion {
                major: 3,
                minor: 1,
                build: 4,
            },
            attributes: attributes_offset,
            images: image_array,
            icc_profile,
            annotations: annotations_offset,
            microns_per_pixel: 0.25,
            magnification: 40.0,
        },
    )
    .unwrap();

    store_file_header(
        &mut bytes,
        &HeaderCreateInfo {
            file_size,
            revision: 1,
            tile_table_offset: tile_table,
            metadata_offset: metadata,
        },
    )
    .unwrap();

    (
        bytes,
        SlideLayout {
            file_size,
            tile_table,
            layer_extents,
            tile_offsets,
            tile_payloads,
            attribute_sizes,
            attribute_bytes,
            attributes: attributes_offset,
            image_bytes,
            image_array,
            icc_profile,
            annotation_bytes,
            group_sizes,
            group_bytes,
            annotations: annotations_offset,
            metadata,
        },
    )
}

/// Build the smallest valid slide: an empty pyramid (zero layers, zero
/// tiles) and a metadata header with no optional children.
pub fn build_minimal_slide() -> Vec<u8> {
    let tile_table = FILE_HEADER_SIZE;
    let layer_extents = tile_table + TILE_TABLE_SIZE;
    let tile_offsets = layer_extents + 16;
    let metadata = tile_offsets + 16;
    let file_size = metadata + METADATA_SIZE;

    let mut bytes = vec![0u8; file_size as usize];
    store_layer_extents(&mut bytes, layer_extents, &[]).unwrap();
    store_tile_offsets(&mut bytes, tile_offsets, &[]).unwrap();
    store_tile_table(
        &mut bytes,
        &TileTableCreateInfo {
            tile_table_offset: tile_table,
            encoding: TileEncoding::Iris,
            format: Some(PixelFormat::Bgra8),
            tile_offsets_offset: tile_offsets,
            layer_extents_offset: layer_extents,
            width_pixels: 0,
            height_pixels: 0,
        },
    )
    .unwrap();
    store_metadata(
        &mut bytes,
        &MetadataCreateInfo {
            metadata_offset: metadata,
            ..Default::default()
        },
    )
    .unwrap();
    store_file_header(
        &mut bytes,
        &HeaderCreateInfo {
            file_size,
            revision: 0,
            tile_table_offset: tile_table,
            metadata_offset: metadata,
        },
    )
    .unwrap();
    bytes
}
