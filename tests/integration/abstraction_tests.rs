//! Abstraction round trips: writers feed the readers, and the lifted
//! values must equal the create-info inputs on all non-reserved fields.

use iris_file_extension::{
    abstract_file_structure, AnnotationFormat, AttributeType, ImageEncoding, PixelFormat,
    TileEncoding, EXTENSION_VERSION, NULL_ID,
};

use super::test_utils::{
    build_full_slide, build_minimal_slide, fixture_attributes, tile_payload, FIXTURE_ICC,
};

#[test]
fn test_header_round_trip() {
    let (bytes, _) = build_full_slide();
    let file = abstract_file_structure(&bytes).unwrap();

    assert_eq!(file.header.file_size, bytes.len() as u64);
    assert_eq!(file.header.extension_version, EXTENSION_VERSION);
    assert_eq!(file.header.revision, 1);
}

#[test]
fn test_tile_table_round_trip() {
    let (bytes, layout) = build_full_slide();
    let file = abstract_file_structure(&bytes).unwrap();
    let table = &file.tile_table;

    assert_eq!(table.encoding, TileEncoding::Jpeg);
    assert_eq!(table.format, PixelFormat::Rgb8);
    assert_eq!(table.extent.width, 256);
    assert_eq!(table.extent.height, 256);

    assert_eq!(table.extent.layers.len(), 2);
    assert_eq!(table.extent.layers[0].x_tiles, 1);
    assert_eq!(table.extent.layers[1].x_tiles, 2);
    assert_eq!(table.extent.layers[1].y_tiles, 2);
    assert_eq!(table.extent.layers[0].downsample, 4.0);
    assert_eq!(table.extent.layers[1].downsample, 1.0);

    assert_eq!(table.layers.len(), 2);
    assert_eq!(table.layers[0].len(), 1);
    assert_eq!(table.layers[1].len(), 4);
    assert_eq!(table.layers[0][0].offset, layout.tile_payloads[0]);
    assert!(table.layers[1][2].is_sparse());

    // The located payload is the tile data the builder wrote
    let tile = table.layers[1][3];
    assert_eq!(
        &bytes[tile.offset as usize..][..tile.size as usize],
        tile_payload(3).as_slice()
    );
}

#[test]
fn test_metadata_round_trip() {
    let (bytes, _) = build_full_slide();
    let file = abstract_file_structure(&bytes).unwrap();
    let metadata = &file.metadata;

    assert_eq!(metadata.codec_version.major, 3);
    assert_eq!(metadata.codec_version.minor, 1);
    assert_eq!(metadata.codec_version.build, 4);
    assert_eq!(metadata.microns_per_pixel, 0.25);
    assert_eq!(metadata.magnification, 40.0);
}

#[test]
fn test_attributes_round_trip_in_order() {
    let (bytes, _) = build_full_slide();
    let file = abstract_file_structure(&bytes).unwrap();

    let attributes = file.metadata.attributes.as_ref().unwrap();
    assert_eq!(attributes.attribute_type, AttributeType::I2S);
    assert_eq!(attributes.values, fixture_attributes().values);
    let keys: Vec<_> = attributes.values.keys().cloned().collect();
    assert_eq!(keys, vec!["scanner", "stain"]);
}

#[test]
fn test_images_round_trip() {
    let (bytes, _) = build_full_slide();
    let file = abstract_file_structure(&bytes).unwrap();

    assert_eq!(file.images.len(), 2);
    let label = &file.images["label"];
    assert_eq!(label.info.width, 400);
    assert_eq!(label.info.height, 300);
    assert_eq!(label.info.encoding, ImageEncoding::Png);
    assert_eq!(label.info.format, PixelFormat::Rgb8);
    assert_eq!(
        &bytes[label.offset as usize..][..label.byte_size as usize],
        b"label png bytes"
    );

    let thumbnail = &file.images["thumbnail"];
    assert_eq!(thumbnail.info.encoding, ImageEncoding::Jpeg);
    assert_eq!(thumbnail.info.orientation, 180);
    assert_eq!(
        &bytes[thumbnail.offset as usize..][..thumbnail.byte_size as usize],
        b"thumbnail jpg"
    );
}

#[test]
fn test_icc_profile_round_trip() {
    let (bytes, _) = build_full_slide();
    let file = abstract_file_structure(&bytes).unwrap();

    let profile = file.metadata.icc_profile.unwrap();
    assert_eq!(
        &bytes[profile.offset as usize..][..profile.byte_size as usize],
        FIXTURE_ICC
    );
}

#[test]
fn test_annotations_round_trip() {
    let (bytes, _) = build_full_slide();
    let file = abstract_file_structure(&bytes).unwrap();

    assert_eq!(file.annotations.entries.len(), 2);
    let svg = &file.annotations.entries[&0x000001];
    assert_eq!(svg.format, AnnotationFormat::Svg);
    assert_eq!(svg.x_location, 12.0);
    assert_eq!(svg.y_location, 24.0);
    assert_eq!(svg.x_size, 128.0);
    assert_eq!(svg.y_size, 64.0);
    assert_eq!(svg.width, 512);
    assert_eq!(svg.height, 256);
    assert_eq!(svg.parent, NULL_ID);
    assert_eq!(&bytes[svg.offset as usize..][..svg.byte_size as usize], b"<svg/>");

    let text = &file.annotations.entries[&0x000002];
    assert_eq!(text.format, AnnotationFormat::Text);
    assert_eq!(text.parent, 0x000001);
    assert_eq!(
        &bytes[text.offset as usize..][..text.byte_size as usize],
        b"necrosis"
    );

    assert_eq!(file.annotations.groups.len(), 2);
    assert_eq!(
        file.annotations.groups["tumor"].members(&bytes).unwrap(),
        vec![0x000001]
    );
    assert_eq!(
        file.annotations.groups["stroma"].members(&bytes).unwrap(),
        vec![0x000002]
    );
}

#[test]
fn test_empty_pyramid_abstraction() {
    // A valid file with zero layers abstracts to empty layer vectors
    let bytes = build_minimal_slide();
    let file = abstract_file_structure(&bytes).unwrap();

    assert!(file.tile_table.layers.is_empty());
    assert!(file.tile_table.extent.layers.is_empty());
    assert!(file.images.is_empty());
    assert!(file.annotations.entries.is_empty());
    assert!(file.metadata.attributes.is_none());
    assert!(file.metadata.icc_profile.is_none());
}

#[test]
fn test_duplicate_annotation_identifier_keeps_first() {
    // Rewrite the second annotation entry's identifier to collide with
    // the first; the read keeps the first occurrence and drops the later
    let (mut bytes, layout) = build_full_slide();
    let second_entry = layout.annotations as usize + 32 + 39;
    bytes[second_entry..second_entry + 3].copy_from_slice(&[0x01, 0x00, 0x00]);

    let file = abstract_file_structure(&bytes).unwrap();
    assert_eq!(file.annotations.entries.len(), 1);
    let kept = &file.annotations.entries[&0x000001];
    assert_eq!(kept.format, AnnotationFormat::Svg);
    assert_eq!(
        &bytes[kept.offset as usize..][..kept.byte_size as usize],
        b"<svg/>"
    );
}

#[test]
fn test_abstraction_rejects_structural_damage() {
    let (mut bytes, layout) = build_full_slide();
    // Break the tile table's validation word
    bytes[layout.tile_table as usize] ^= 0xFF;
    assert!(abstract_file_structure(&bytes).is_err());
}
