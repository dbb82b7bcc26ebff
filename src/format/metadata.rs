//! Metadata header: codec version, optional children and slide scalars.
//!
//! # Layout (56 bytes)
//!
//! ```text
//! Bytes 0-9:   Data block prefix (validation word + recovery tag)
//! Bytes 10-11: Codec major version (u16)
//! Bytes 12-13: Codec minor version (u16)
//! Bytes 14-15: Codec build number (u16)
//! Bytes 16-23: Attributes offset (u64, optional)
//! Bytes 24-31: Associated images array offset (u64, optional)
//! Bytes 32-39: ICC color profile offset (u64, optional)
//! Bytes 40-47: Annotations array offset (u64, optional)
//! Bytes 48-51: Microns per pixel (f32)
//! Bytes 52-55: Magnification (f32)
//! ```
//!
//! Each child offset is independently optional: the null sentinel (or an
//! offset past the file end) means the child is absent. Present children
//! are recursively validated.

use tracing::warn;

use crate::error::IrisError;
use crate::format::annotations::AnnotationArrayBlock;
use crate::format::attributes::AttributesBlock;
use crate::format::block::{store_target, Block, DataBlock};
use crate::format::icc::IccProfileBlock;
use crate::format::images::ImageArrayBlock;
use crate::format::tags::{RecoveryTag, EXTENSION_1_0, NULL_OFFSET};
use crate::io::primitive::{load_f32, load_u16, load_u64, store_f32, store_u16, store_u64};
use crate::io::Region;
use crate::slide::abstraction::{CodecVersion, Metadata};

const CODEC_MAJOR: u64 = 10;
const CODEC_MINOR: u64 = 12;
const CODEC_BUILD: u64 = 14;
const ATTRIBUTES_OFFSET: u64 = 16;
const IMAGES_OFFSET: u64 = 24;
const ICC_COLOR_OFFSET: u64 = 32;
const ANNOTATIONS_OFFSET: u64 = 40;
const MICRONS_PIXEL: u64 = 48;
const MAGNIFICATION: u64 = 52;

/// On-disk size of the v1.0 metadata header.
pub const METADATA_SIZE: u64 = 56;

/// Descriptor of the metadata header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataBlock {
    desc: DataBlock,
}

impl Block for MetadataBlock {
    const TAG: RecoveryTag = RecoveryTag::Metadata;
    const NAME: &'static str = "METADATA";

    fn descriptor(&self) -> &DataBlock {
        &self.desc
    }
}

impl MetadataBlock {
    pub fn new(offset: u64, file_size: u64, version: u32) -> Self {
        MetadataBlock {
            desc: DataBlock::new(offset, file_size, version),
        }
    }

    /// On-disk size of the header record.
    pub fn size(&self) -> u64 {
        let size = METADATA_SIZE;
        if self.desc.version > EXTENSION_1_0 {
            // Extension slot: revision 2+ fields extend the size here.
        }
        size
    }

    fn child_offset<R: Region + ?Sized>(&self, base: &R, field: u64) -> Result<u64, IrisError> {
        Ok(load_u64(base.get(self.desc.offset + field, 8)?))
    }

    fn has_child<R: Region + ?Sized>(&self, base: &R, field: u64) -> Result<bool, IrisError> {
        let offset = self.child_offset(base, field)?;
        Ok(offset != NULL_OFFSET && offset < self.desc.file_size)
    }

    /// Whether an attributes block is encoded.
    pub fn has_attributes<R: Region + ?Sized>(&self, base: &R) -> Result<bool, IrisError> {
        self.has_child(base, ATTRIBUTES_OFFSET)
    }

    /// Whether an associated images array is encoded.
    pub fn has_image_array<R: Region + ?Sized>(&self, base: &R) -> Result<bool, IrisError> {
        self.has_child(base, IMAGES_OFFSET)
    }

    /// Whether an ICC color profile is encoded.
    pub fn has_color_profile<R: Region + ?Sized>(&self, base: &R) -> Result<bool, IrisError> {
        self.has_child(base, ICC_COLOR_OFFSET)
    }

    /// Whether an annotations array is encoded.
    pub fn has_annotations<R: Region + ?Sized>(&self, base: &R) -> Result<bool, IrisError> {
        self.has_child(base, ANNOTATIONS_OFFSET)
    }

    /// Stored attributes offset.
    pub fn attributes_offset<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        self.child_offset(base, ATTRIBUTES_OFFSET)
    }

    /// Stored associated images array offset.
    pub fn image_array_offset<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        self.child_offset(base, IMAGES_OFFSET)
    }

    /// Stored ICC profile offset.
    pub fn color_profile_offset<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        self.child_offset(base, ICC_COLOR_OFFSET)
    }

    /// Stored annotations array offset.
    pub fn annotations_offset<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        self.child_offset(base, ANNOTATIONS_OFFSET)
    }

    /// Descriptor of the attributes block, offset-validated.
    pub fn attributes<R: Region + ?Sized>(&self, base: &R) -> Result<AttributesBlock, IrisError> {
        let block = AttributesBlock::new(
            self.attributes_offset(base)?,
            self.desc.file_size,
            self.desc.version,
        );
        block.validate_offset(base)?;
        Ok(block)
    }

    /// Descriptor of the associated images array, offset-validated.
    pub fn image_array<R: Region + ?Sized>(&self, base: &R) -> Result<ImageArrayBlock, IrisError> {
        let block = ImageArrayBlock::new(
            self.image_array_offset(base)?,
            self.desc.file_size,
            self.desc.version,
        );
        block.validate_offset(base)?;
        Ok(block)
    }

    /// Descriptor of the ICC color profile block, offset-validated.
    pub fn color_profile<R: Region + ?Sized>(
        &self,
        base: &R,
    ) -> Result<IccProfileBlock, IrisError> {
        let block = IccProfileBlock::new(
            self.color_profile_offset(base)?,
            self.desc.file_size,
            self.desc.version,
        );
        block.validate_offset(base)?;
        Ok(block)
    }

    /// Descriptor of the annotations array, offset-validated.
    pub fn annotations<R: Region + ?Sized>(
        &self,
        base: &R,
    ) -> Result<AnnotationArrayBlock, IrisError> {
        let block = AnnotationArrayBlock::new(
            self.annotations_offset(base)?,
            self.desc.file_size,
            self.desc.version,
        );
        block.validate_offset(base)?;
        Ok(block)
    }

    /// Validate the header and recursively validate every present child.
    pub fn validate_full<R: Region + ?Sized>(&self, base: &R) -> Result<(), IrisError> {
        self.validate_offset(base)?;

        if self.has_attributes(base)? {
            self.attributes(base)?.validate_full(base)?;
        }
        if self.has_image_array(base)? {
            self.image_array(base)?.validate_full(base)?;
        }
        if self.has_color_profile(base)? {
            self.color_profile(base)?.validate_full(base)?;
        }
        if self.has_annotations(base)? {
            self.annotations(base)?.validate_full(base)?;
        }

        if self.desc.version > EXTENSION_1_0 {
            // Extension slot: revision 2+ validations are added here.
        }
        Ok(())
    }

    /// Lift the fixed metadata fields.
    ///
    /// Structured children (attributes, ICC descriptor) are attached by
    /// the abstraction walk; this reads the codec version and slide
    /// scalars only.
    pub fn read_metadata<R: Region + ?Sized>(&self, base: &R) -> Result<Metadata, IrisError> {
        self.validate_offset(base)?;
        let header = base.get(self.desc.offset, METADATA_SIZE)?;

        let metadata = Metadata {
            codec_version: CodecVersion {
                major: load_u16(&header[CODEC_MAJOR as usize..]),
                minor: load_u16(&header[CODEC_MINOR as usize..]),
                build: load_u16(&header[CODEC_BUILD as usize..]),
            },
            attributes: None,
            icc_profile: None,
            microns_per_pixel: load_f32(&header[MICRONS_PIXEL as usize..]),
            magnification: load_f32(&header[MAGNIFICATION as usize..]),
        };
        if self.desc.version > EXTENSION_1_0 {
            // Extension slot: revision 2+ parameters are lifted here.
        }
        Ok(metadata)
    }
}

/// Parameters for [`store_metadata`].
#[derive(Debug, Clone)]
pub struct MetadataCreateInfo {
    /// Offset at which the metadata header is stored
    pub metadata_offset: u64,
    /// Version of the codec that produced the file
    pub codec_version: CodecVersion,
    /// Offset of an already-stored attributes block, or the null sentinel
    pub attributes: u64,
    /// Offset of an already-stored images array, or the null sentinel
    pub images: u64,
    /// Offset of an already-stored ICC profile block, or the null sentinel
    pub icc_profile: u64,
    /// Offset of an already-stored annotations array, or the null sentinel
    pub annotations: u64,
    /// Microns of physical space per layer-0 pixel, or zero when unknown
    pub microns_per_pixel: f32,
    /// Scale-to-optical-magnification coefficient, or zero when unknown
    pub magnification: f32,
}

impl Default for MetadataCreateInfo {
    fn default() -> Self {
        MetadataCreateInfo {
            metadata_offset: NULL_OFFSET,
            codec_version: CodecVersion::default(),
            attributes: NULL_OFFSET,
            images: NULL_OFFSET,
            icc_profile: NULL_OFFSET,
            annotations: NULL_OFFSET,
            microns_per_pixel: 0.0,
            magnification: 0.0,
        }
    }
}

/// Serialize the metadata header.
///
/// Every non-null child offset must already point at a stored, tag-valid
/// block of the right kind.
pub fn store_metadata(base: &mut [u8], info: &MetadataCreateInfo) -> Result<(), IrisError> {
    if info.metadata_offset == NULL_OFFSET {
        return Err(IrisError::StorePrecondition {
            block: "METADATA",
            message: "invalid (null) metadata offset in MetadataCreateInfo".to_string(),
        });
    }

    let file_size = base.len() as u64;
    let existing: &[u8] = base;
    let version = crate::format::tags::EXTENSION_VERSION;
    if info.attributes != NULL_OFFSET {
        AttributesBlock::new(info.attributes, file_size, version)
            .validate_offset(existing)
            .map_err(|source| IrisError::StorePrecondition {
                block: "METADATA",
                message: format!(
                    "per the IFE specification Section 2.3.4, attributes shall point to a \
                     valid attributes header (Section 2.3.5) or be null: {source}"
                ),
            })?;
    }
    if info.images != NULL_OFFSET {
        ImageArrayBlock::new(info.images, file_size, version)
            .validate_offset(existing)
            .map_err(|source| IrisError::StorePrecondition {
                block: "METADATA",
                message: format!(
                    "per the IFE specification Section 2.3.4, images shall point to a valid \
                     associated images array (Section 2.4.6) or be null: {source}"
                ),
            })?;
    }
    if info.icc_profile != NULL_OFFSET {
        IccProfileBlock::new(info.icc_profile, file_size, version)
            .validate_offset(existing)
            .map_err(|source| IrisError::StorePrecondition {
                block: "METADATA",
                message: format!(
                    "per the IFE specification Section 2.3.4, ICC color space shall point to \
                     a valid profile byte array (Section 2.4.8) or be null: {source}"
                ),
            })?;
    }
    if info.annotations != NULL_OFFSET {
        AnnotationArrayBlock::new(info.annotations, file_size, version)
            .validate_offset(existing)
            .map_err(|source| IrisError::StorePrecondition {
                block: "METADATA",
                message: format!(
                    "per the IFE specification Section 2.3.4, annotations shall point to a \
                     valid annotations array (Section 2.4.9) or be null: {source}"
                ),
            })?;
    }
    if info.microns_per_pixel == 0.0 {
        warn!(
            "metadata micronsPerPixel is zero; the physical pixel spacing of the highest \
             resolution layer is unknown"
        );
    }
    if info.magnification == 0.0 {
        warn!("metadata magnification is zero; no optical magnification coefficient is encoded");
    }

    let target = store_target(base, info.metadata_offset, METADATA_SIZE, "METADATA")?;
    store_u64(target, info.metadata_offset);
    store_u16(&mut target[8..], RecoveryTag::Metadata.as_u16());
    store_u16(&mut target[CODEC_MAJOR as usize..], info.codec_version.major);
    store_u16(&mut target[CODEC_MINOR as usize..], info.codec_version.minor);
    store_u16(&mut target[CODEC_BUILD as usize..], info.codec_version.build);
    store_u64(&mut target[ATTRIBUTES_OFFSET as usize..], info.attributes);
    store_u64(&mut target[IMAGES_OFFSET as usize..], info.images);
    store_u64(&mut target[ICC_COLOR_OFFSET as usize..], info.icc_profile);
    store_u64(&mut target[ANNOTATIONS_OFFSET as usize..], info.annotations);
    store_f32(
        &mut target[MICRONS_PIXEL as usize..],
        info.microns_per_pixel,
    );
    store_f32(&mut target[MAGNIFICATION as usize..], info.magnification);
    Ok(())
}
