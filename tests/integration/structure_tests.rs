//! Structural validation scenarios over complete slide files.

use iris_file_extension::{
    abstract_file_structure, is_iris_file, validate_file_structure, IrisError, RecoveryTag,
};

use super::test_utils::{build_full_slide, build_minimal_slide};

fn store_u16_at(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn store_u64_at(bytes: &mut [u8], offset: usize, value: u64) {
    bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

#[test]
fn test_full_slide_validates_cleanly() {
    let (bytes, _) = build_full_slide();
    let report = validate_file_structure(&bytes);
    assert!(report.is_valid(), "errors: {:?}", report.errors);
    assert!(report.warnings.is_empty());
}

#[test]
fn test_minimal_slide_validates_cleanly() {
    let bytes = build_minimal_slide();
    let report = validate_file_structure(&bytes);
    assert!(report.is_valid(), "errors: {:?}", report.errors);
}

#[test]
fn test_non_iris_bytes_rejected() {
    // First four bytes are not the magic word
    let (mut bytes, _) = build_full_slide();
    bytes[..4].copy_from_slice(b"TIFF");

    assert!(!is_iris_file(&bytes));
    let report = validate_file_structure(&bytes);
    assert!(!report.is_valid());
    assert!(matches!(report.errors[0], IrisError::InvalidMagic(_)));
}

#[test]
fn test_quick_check_accepts_valid_slide() {
    let (bytes, _) = build_full_slide();
    assert!(is_iris_file(&bytes));
}

#[test]
fn test_file_size_off_by_one_rejected() {
    // Appending a byte makes the stored size disagree with the region
    let (mut bytes, _) = build_full_slide();
    let stored = bytes.len() as u64;
    bytes.push(0);

    let report = validate_file_structure(&bytes);
    assert!(!report.is_valid());
    match &report.errors[0] {
        IrisError::FileSizeMismatch { stored: s, actual } => {
            assert_eq!(*s, stored);
            assert_eq!(*actual, stored + 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // The message cites both sizes
    let message = report.errors[0].to_string();
    assert!(message.contains(&stored.to_string()));
    assert!(message.contains(&(stored + 1).to_string()));
}

#[test]
fn test_forward_version_warns_but_validates() {
    // A version 2.5 file that otherwise conforms to the 1.0 prefix
    let (mut bytes, _) = build_full_slide();
    store_u16_at(&mut bytes, 14, 2);
    store_u16_at(&mut bytes, 16, 5);

    let report = validate_file_structure(&bytes);
    assert!(report.is_valid(), "errors: {:?}", report.errors);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("2.5"));

    // The abstraction still populates the v1.0 fields
    let file = abstract_file_structure(&bytes).unwrap();
    assert_eq!(file.header.extension_version, (2 << 16) | 5);
    assert_eq!(file.tile_table.extent.layers.len(), 2);
}

#[test]
fn test_corrupted_validation_word_rejected() {
    let (mut bytes, layout) = build_full_slide();
    store_u64_at(&mut bytes, layout.tile_table as usize, layout.tile_table + 2);

    let report = validate_file_structure(&bytes);
    assert!(!report.is_valid());
    assert!(matches!(
        report.errors[0],
        IrisError::ValidationWordMismatch { .. }
    ));
}

#[test]
fn test_wrong_recovery_tag_rejected() {
    let (mut bytes, layout) = build_full_slide();
    store_u16_at(
        &mut bytes,
        layout.metadata as usize + 8,
        RecoveryTag::Attributes.as_u16(),
    );

    let report = validate_file_structure(&bytes);
    assert!(!report.is_valid());
    assert!(matches!(
        report.errors[0],
        IrisError::RecoveryTagMismatch { .. }
    ));
}

#[test]
fn test_tile_past_file_end_rejected() {
    // Grow the last tile entry's size by one byte past the file end.
    // The fixture's final payload sits mid-file, so push the entry's
    // offset to the exact end first, prove that passes, then overflow.
    let (mut bytes, layout) = build_full_slide();
    let file_size = bytes.len() as u64;

    // Entry 4 (layer 1, tile 3) begins 16 + 4*8 bytes into the array
    let entry = layout.tile_offsets as usize + 16 + 4 * 8;
    let end_offset = file_size - 32;
    bytes[entry..entry + 5].copy_from_slice(&end_offset.to_le_bytes()[..5]);
    let report = validate_file_structure(&bytes);
    assert!(report.is_valid(), "errors: {:?}", report.errors);

    let overflow = end_offset + 1;
    bytes[entry..entry + 5].copy_from_slice(&overflow.to_le_bytes()[..5]);
    let report = validate_file_structure(&bytes);
    assert!(!report.is_valid());
    assert!(matches!(report.errors[0], IrisError::OutOfBounds { .. }));
}

#[test]
fn test_non_null_cipher_rejected() {
    let (mut bytes, layout) = build_full_slide();
    store_u64_at(&mut bytes, layout.tile_table as usize + 12, 64);

    let report = validate_file_structure(&bytes);
    assert!(!report.is_valid());
    assert!(matches!(report.errors[0], IrisError::CipherNotNull(64)));
}

#[test]
fn test_metadata_annotations_offset_checked_against_annotation_tag() {
    // Point the metadata's annotations offset at the image array; the
    // annotations branch must reject the mismatched recovery tag.
    let (mut bytes, layout) = build_full_slide();
    store_u64_at(
        &mut bytes,
        layout.metadata as usize + 40,
        layout.image_array,
    );

    let report = validate_file_structure(&bytes);
    assert!(!report.is_valid());
    match &report.errors[0] {
        IrisError::RecoveryTagMismatch { block, found, .. } => {
            assert_eq!(*block, "ANNOTATION_ARRAY");
            assert_eq!(*found, RecoveryTag::AssociatedImages.as_u16());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_attribute_byte_count_mismatch_rejected() {
    // Corrupt the declared byte count of the attribute bytes block
    let (mut bytes, layout) = build_full_slide();
    let count_field = layout.attribute_bytes as usize + 10;
    bytes[count_field..count_field + 4].copy_from_slice(&9999u32.to_le_bytes());

    let report = validate_file_structure(&bytes);
    assert!(!report.is_valid());
    assert!(matches!(
        report.errors[0],
        IrisError::ByteCountMismatch { .. }
    ));
}

#[test]
fn test_scale_regression_rejected() {
    // Make layer 1's scale equal to layer 0's
    let (mut bytes, layout) = build_full_slide();
    let layer1_scale = layout.layer_extents as usize + 16 + 12 + 8;
    bytes[layer1_scale..layer1_scale + 4].copy_from_slice(&1.0f32.to_le_bytes());

    let report = validate_file_structure(&bytes);
    assert!(!report.is_valid());
    assert!(matches!(
        report.errors[0],
        IrisError::NonIncreasingScale { layer: 1 }
    ));
}

#[test]
fn test_truncated_file_rejected() {
    let (bytes, _) = build_full_slide();
    let truncated = &bytes[..bytes.len() - 40];
    let report = validate_file_structure(truncated);
    assert!(!report.is_valid());
}
