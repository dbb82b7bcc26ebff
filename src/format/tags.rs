//! On-disk vocabulary of the Iris container.
//!
//! This module defines the constants every other format module builds on:
//! - The magic word and extension version encoding
//! - Recovery tags identifying each block kind
//! - The enumerations stored in single-byte fields
//! - Null sentinels for offsets, sparse tiles and annotation identifiers
//!
//! Enumerations carry a version-gated decoder: values outside the v1.0
//! set are rejected today, and the version parameter reserves the slot
//! where a later extension revision would accept more.

/// Iris' magic number is ASCII for 'Iris': 49 72 69 73
pub const MAGIC_BYTES: u32 = 0x4972_6973;

/// Extension version this implementation reads and writes
pub const EXTENSION_MAJOR: u16 = 1;
/// Extension version this implementation reads and writes
pub const EXTENSION_MINOR: u16 = 0;

/// Packed `major << 16 | minor` for version 1.0
pub const EXTENSION_1_0: u32 = (1 << 16) | 0;

/// Packed extension version compiled into this reader
pub const EXTENSION_VERSION: u32 = ((EXTENSION_MAJOR as u32) << 16) | EXTENSION_MINOR as u32;

/// Null sentinel for any file-absolute 64-bit offset field
pub const NULL_OFFSET: u64 = u64::MAX;

/// Sparse-tile sentinel: the maximum 40-bit value
pub const NULL_TILE: u64 = 0xFF_FFFF_FFFF;

/// Null 24-bit annotation identifier
pub const NULL_ID: u32 = 0x00FF_FFFF;

// =============================================================================
// Recovery tags
// =============================================================================

/// Recovery tags identifying each block kind.
///
/// In the event of recovery, an offset that stores its own value followed
/// by one of these sequences marks a block of the corresponding kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u16)]
pub enum RecoveryTag {
    Undefined = 0x5500,
    FileHeader = 0x5501,
    TileTable = 0x5502,
    Cipher = 0x5503,
    Metadata = 0x5504,
    Attributes = 0x5505,
    LayerExtents = 0x5506,
    TileOffsets = 0x5507,
    AttributeSizes = 0x5508,
    AttributeBytes = 0x5509,
    AssociatedImages = 0x550A,
    AssociatedImageBytes = 0x550B,
    IccProfile = 0x550C,
    Annotations = 0x550D,
    AnnotationBytes = 0x550E,
    AnnotationGroupSizes = 0x550F,
    AnnotationGroupBytes = 0x5510,
}

impl RecoveryTag {
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

// =============================================================================
// Enumerations
// =============================================================================

/// Compression algorithm used for slide tile data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum TileEncoding {
    /// Iris-native codec
    Iris = 1,
    /// JPEG
    Jpeg = 2,
    /// AVIF
    Avif = 3,
}

impl TileEncoding {
    /// Decode an on-disk value. The undefined value (0) is invalid on
    /// read; later extension versions may widen the accepted set.
    pub fn from_u8(value: u8, version: u32) -> Option<Self> {
        if version > EXTENSION_1_0 {
            // Extension slot: revision 2+ values are recognised here once defined.
        }
        match value {
            1 => Some(TileEncoding::Iris),
            2 => Some(TileEncoding::Jpeg),
            3 => Some(TileEncoding::Avif),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Pixel channel ordering and width of decoded tile or image data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum PixelFormat {
    Bgr8 = 1,
    Rgb8 = 2,
    Bgra8 = 3,
    Rgba8 = 4,
}

impl PixelFormat {
    pub fn from_u8(value: u8, version: u32) -> Option<Self> {
        if version > EXTENSION_1_0 {
            // Extension slot: revision 2+ values are recognised here once defined.
        }
        match value {
            1 => Some(PixelFormat::Bgr8),
            2 => Some(PixelFormat::Rgb8),
            3 => Some(PixelFormat::Bgra8),
            4 => Some(PixelFormat::Rgba8),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Specification format by which the attribute store was encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum AttributeType {
    /// Free-form string attributes ("I2S")
    I2S = 1,
    /// DICOM PS3.3 attributes; the format version carries the DICOM year
    Dicom = 2,
}

impl AttributeType {
    pub fn from_u8(value: u8, version: u32) -> Option<Self> {
        if version > EXTENSION_1_0 {
            // Extension slot: revision 2+ values are recognised here once defined.
        }
        match value {
            1 => Some(AttributeType::I2S),
            2 => Some(AttributeType::Dicom),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Compression codec of an associated (non-tile) image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum ImageEncoding {
    Png = 1,
    Jpeg = 2,
    Avif = 3,
}

impl ImageEncoding {
    pub fn from_u8(value: u8, version: u32) -> Option<Self> {
        if version > EXTENSION_1_0 {
            // Extension slot: revision 2+ values are recognised here once defined.
        }
        match value {
            1 => Some(ImageEncoding::Png),
            2 => Some(ImageEncoding::Jpeg),
            3 => Some(ImageEncoding::Avif),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Decoding algorithm turning an annotation byte stream into a visual object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u8)]
pub enum AnnotationFormat {
    Png = 1,
    Jpeg = 2,
    Svg = 3,
    Text = 4,
}

impl AnnotationFormat {
    pub fn from_u8(value: u8, version: u32) -> Option<Self> {
        if version > EXTENSION_1_0 {
            // Extension slot: revision 2+ values are recognised here once defined.
        }
        match value {
            1 => Some(AnnotationFormat::Png),
            2 => Some(AnnotationFormat::Jpeg),
            3 => Some(AnnotationFormat::Svg),
            4 => Some(AnnotationFormat::Text),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}
