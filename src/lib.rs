//! Reference reader/writer for the Iris File Extension (.iris).
//!
//! This crate interprets the on-disk byte layout of the Iris whole slide
//! image container. It does not compress or decompress image data; it
//! lets callers
//!
//! - confirm a byte region conforms to the published layout
//!   ([`validate_file_structure`]),
//! - produce a light-weight in-memory descriptor from which compressed
//!   tile bytes, metadata, associated images, annotations and the color
//!   profile can be located zero-copy ([`abstract_file_structure`]),
//! - enumerate every data block in file order for safe rewrites
//!   ([`generate_file_map`]),
//! - and serialize new container structures against the same layout
//!   rules (the `store_*` writers).
//!
//! Opening, mapping and truncating files, pixel codecs and transport are
//! external concerns: everything here operates on a caller-provided byte
//! region. With the `remote` feature the same walk runs against an async
//! [`RangeReader`](io::RangeReader) that fetches each block's byte range
//! on demand.
//!
//! # Reading a slide
//!
//! ```no_run
//! use iris_file_extension::{abstract_file_structure, is_iris_file};
//!
//! # fn main() -> Result<(), iris_file_extension::IrisError> {
//! let bytes: &[u8] = unimplemented!("map or read the slide file");
//! if is_iris_file(bytes) {
//!     let file = abstract_file_structure(bytes)?;
//!     let tile = file.tile_table.layers[0][0];
//!     if !tile.is_sparse() {
//!         let payload = &bytes[tile.offset as usize..][..tile.size as usize];
//!         // hand `payload` to the tile decoder
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod format;
pub mod io;
pub mod slide;

pub use error::IrisError;
#[cfg(feature = "remote")]
pub use error::FetchError;

pub use format::tags::{
    AnnotationFormat, AttributeType, ImageEncoding, PixelFormat, RecoveryTag, TileEncoding,
    EXTENSION_MAJOR, EXTENSION_MINOR, EXTENSION_VERSION, MAGIC_BYTES, NULL_ID, NULL_OFFSET,
    NULL_TILE,
};

pub use format::block::{Block, DataBlock};
pub use format::validation::{validate_file_structure, ValidationReport};

pub use format::header::{store_file_header, FileHeaderBlock, HeaderCreateInfo, FILE_HEADER_SIZE};
pub use format::tile_table::{
    layer_extents_size, store_layer_extents, store_tile_offsets, store_tile_table,
    tile_offsets_size, LayerExtentsBlock, TileOffsetsBlock, TileTableBlock, TileTableCreateInfo,
};
pub use format::metadata::{store_metadata, MetadataBlock, MetadataCreateInfo};
pub use format::attributes::{
    attribute_bytes_size, attribute_sizes_size, store_attribute_bytes, store_attribute_sizes,
    store_attributes, AttributeBytesBlock, AttributeSizesBlock, AttributesBlock,
    AttributesCreateInfo,
};
pub use format::images::{
    image_array_size, image_bytes_size, store_image_array, store_image_bytes, ImageArrayBlock,
    ImageArrayCreateInfo, ImageBytesBlock, ImageBytesCreateInfo, ImageEntryCreateInfo,
};
pub use format::icc::{icc_profile_size, store_icc_profile, IccProfileBlock};
pub use format::annotations::{
    annotation_array_size, annotation_bytes_size, annotation_group_bytes_size,
    annotation_group_sizes_size, store_annotation_array, store_annotation_bytes,
    store_annotation_group_bytes, store_annotation_group_sizes, AnnotationArrayBlock,
    AnnotationArrayCreateInfo, AnnotationBytesBlock, AnnotationEntryCreateInfo,
    AnnotationGroupBytesBlock, AnnotationGroupCreateInfo, AnnotationGroupSizesBlock,
};

pub use slide::abstraction::{
    abstract_file_structure, Annotation, AnnotationGroup, Annotations, AssociatedImage,
    AssociatedImageInfo, AssociatedImages, Attributes, CodecVersion, Extent, File, Header,
    IccProfile, LayerExtent, Metadata, TileEntry, TileTable,
};
pub use slide::file_map::{generate_file_map, FileMap, FileMapEntry, MapEntryKind};

/// Perform a quick check that a byte region starts with an Iris file
/// header. This does not validate the structure.
pub fn is_iris_file(bytes: &[u8]) -> bool {
    format::header::quick_check(bytes)
}
