//! Light-weight in-memory representation of a slide file.
//!
//! The abstraction lifts object *parameters* — offsets, sizes, formats,
//! grid geometry — but never object *data*: tile payloads, image bytes,
//! annotation byte streams and the ICC profile stay in the mapped region
//! and are addressed by `(offset, byte_size)` pairs. This keeps the walk
//! cheap and the memory footprint flat regardless of slide size.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::error::IrisError;
use crate::format::header::FileHeaderBlock;
use crate::format::tags::{
    AnnotationFormat, AttributeType, ImageEncoding, PixelFormat, TileEncoding, NULL_OFFSET,
};
use crate::io::primitive::load_u24;
use crate::io::Region;

/// Extracted file header information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Header {
    /// File size in bytes as stored in the header
    pub file_size: u64,
    /// Packed extension version (`major << 16 | minor`)
    pub extension_version: u32,
    /// File revision number
    pub revision: u32,
}

/// Codec version triple stored in the metadata header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CodecVersion {
    pub major: u16,
    pub minor: u16,
    pub build: u16,
}

/// Compressed tile data location within the slide file.
///
/// For a mapped file, `bytes[offset..offset + size]` is the compressed
/// tile byte stream. A sparse tile carries the null offset and zero size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TileEntry {
    /// Absolute byte offset of the tile payload, or the null sentinel
    pub offset: u64,
    /// Payload byte count
    pub size: u32,
}

impl TileEntry {
    /// Whether no data is stored for this tile coordinate.
    #[inline]
    pub fn is_sparse(&self) -> bool {
        self.offset == NULL_OFFSET
    }
}

/// Tile grid and scale of one pyramid layer.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct LayerExtent {
    /// Number of 256-pixel tiles in the horizontal direction
    pub x_tiles: u32,
    /// Number of 256-pixel tiles in the vertical direction
    pub y_tiles: u32,
    /// Layer scale; strictly increasing across layers
    pub scale: f32,
    /// Derived `max_scale / scale`; 1.0 for the most magnified layer
    pub downsample: f32,
}

/// Pixel extent of layer 0 plus the per-layer tile grids.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Extent {
    /// Pixel width of the layer 0 (most zoomed out) view
    pub width: u32,
    /// Pixel height of the layer 0 view
    pub height: u32,
    pub layers: Vec<LayerExtent>,
}

/// The slide's pyramid index: everything needed to locate and decode
/// tiles into a renderable format.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TileTable {
    pub encoding: TileEncoding,
    pub format: PixelFormat,
    pub extent: Extent,
    /// Per-layer tile entries, addressed `layers[layer][tile]`
    pub layers: Vec<Vec<TileEntry>>,
}

/// Parameters of an associated (non-tile) image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AssociatedImageInfo {
    pub width: u32,
    pub height: u32,
    pub encoding: ImageEncoding,
    pub format: PixelFormat,
    /// Orientation in degrees, reduced mod 360
    pub orientation: u16,
}

/// Location and parameters of an associated image; the compressed bytes
/// stay in the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AssociatedImage {
    /// Absolute offset of the compressed image payload (past the title)
    pub offset: u64,
    /// Payload byte count
    pub byte_size: u64,
    pub info: AssociatedImageInfo,
}

/// Label-image dictionary for associated images.
pub type AssociatedImages = HashMap<String, AssociatedImage>;

/// A single slide annotation; the encoded byte stream stays in the region.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Annotation {
    /// Absolute offset of the annotation byte stream
    pub offset: u64,
    /// Byte stream length
    pub byte_size: u32,
    pub format: AnnotationFormat,
    pub x_location: f32,
    pub y_location: f32,
    pub x_size: f32,
    pub y_size: f32,
    pub width: u32,
    pub height: u32,
    /// Parent annotation identifier, or the 24-bit null identifier
    pub parent: u32,
}

/// A named annotation group: where its member identifier run begins and
/// how many 24-bit identifiers it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AnnotationGroup {
    /// Absolute offset of the member identifier run (the label is skipped)
    pub offset: u64,
    /// Number of member identifiers
    pub count: u32,
}

impl AnnotationGroup {
    /// Decode the group's member identifiers from the byte region.
    pub fn members(&self, bytes: &[u8]) -> Result<Vec<u32>, IrisError> {
        let run = Region::get(bytes, self.offset, self.count as u64 * 3)?;
        Ok((0..self.count as usize)
            .map(|index| load_u24(&run[index * 3..]))
            .collect())
    }
}

/// Annotations by identifier plus named groups.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Annotations {
    pub entries: HashMap<u32, Annotation>,
    pub groups: HashMap<String, AnnotationGroup>,
}

/// Attribute dictionary in on-disk order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Attributes {
    pub attribute_type: AttributeType,
    /// Attribute format version; the DICOM year for DICOM dictionaries
    pub version: u16,
    /// Key/value pairs, preserving the positional order of the sizes array
    pub values: IndexMap<String, Vec<u8>>,
}

/// Location of the ICC color profile payload within the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct IccProfile {
    pub offset: u64,
    pub byte_size: u64,
}

/// Slide metadata: codec version, optional attribute store and color
/// profile descriptor, physical scalars.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Metadata {
    pub codec_version: CodecVersion,
    pub attributes: Option<Attributes>,
    pub icc_profile: Option<IccProfile>,
    /// Microns of physical space per layer-0 pixel; zero when unknown
    pub microns_per_pixel: f32,
    /// Scale-to-optical-magnification coefficient; zero when unknown
    pub magnification: f32,
}

/// In-memory abstraction of the Iris file structure.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct File {
    pub header: Header,
    pub tile_table: TileTable,
    pub images: AssociatedImages,
    pub annotations: Annotations,
    pub metadata: Metadata,
}

/// Abstract the file structure into memory for quick data access.
///
/// Performs the same depth-first walk as the validator but materialises
/// descriptors instead of only checking them. The abstraction is either
/// complete or absent: any structural violation aborts with an error.
pub fn abstract_file_structure(bytes: &[u8]) -> Result<File, IrisError> {
    abstract_from_region(bytes)
}

/// Region-generic abstraction walk shared by the mapped and remote builds.
pub(crate) fn abstract_from_region<R: Region + ?Sized>(region: &R) -> Result<File, IrisError> {
    let header_block = FileHeaderBlock::new(region.file_size());
    let header = header_block.read_header(region)?;

    let tile_table_block = header_block.tile_table(region)?;
    let tile_table = tile_table_block.read_tile_table(region)?;

    let metadata_block = header_block.metadata(region)?;
    let mut metadata = metadata_block.read_metadata(region)?;

    if metadata_block.has_attributes(region)? {
        let attributes = metadata_block.attributes(region)?;
        metadata.attributes = Some(attributes.read_attributes(region)?);
    }

    let mut images = AssociatedImages::new();
    if metadata_block.has_image_array(region)? {
        let image_array = metadata_block.image_array(region)?;
        images = image_array.read_images(region)?;
    }

    if metadata_block.has_color_profile(region)? {
        let profile = metadata_block.color_profile(region)?;
        metadata.icc_profile = Some(profile.read_profile(region)?);
    }

    let mut annotations = Annotations::default();
    if metadata_block.has_annotations(region)? {
        let annotation_array = metadata_block.annotations(region)?;
        annotations = annotation_array.read_annotations(region)?;
    }

    Ok(File {
        header,
        tile_table,
        images,
        annotations,
        metadata,
    })
}
