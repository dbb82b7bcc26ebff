//! Tile table: the slide's pyramid index.
//!
//! The tile table header points at two arrays that together describe
//! every compressed tile in the file:
//!
//! - **Layer extents** give the tile grid (xTiles × yTiles) and scale of
//!   each pyramid layer, smallest layer first, scales strictly increasing.
//! - **Tile offsets** give a packed 40-bit file offset and 24-bit byte
//!   size per tile, in layer order; the entry count must equal the total
//!   tile count declared by the extents.
//!
//! # Tile table header layout (44 bytes)
//!
//! ```text
//! Bytes 0-9:   Data block prefix (validation word + recovery tag)
//! Byte  10:    Tile encoding (u8)
//! Byte  11:    Pixel format (u8)
//! Bytes 12-19: Cipher offset (u64, reserved — shall be null)
//! Bytes 20-27: Tile offsets array offset (u64)
//! Bytes 28-35: Layer extents array offset (u64)
//! Bytes 36-39: Layer 0 pixel width (u32)
//! Bytes 40-43: Layer 0 pixel height (u32)
//! ```

use tracing::warn;

use crate::error::IrisError;
use crate::format::block::{store_target, ArrayHeader, Block, DataBlock, ARRAY_HEADER_SIZE};
use crate::format::tags::{
    PixelFormat, RecoveryTag, TileEncoding, EXTENSION_1_0, NULL_OFFSET, NULL_TILE,
};
use crate::io::primitive::{
    load_f32, load_u24, load_u32, load_u40, load_u64, load_u8, store_f32, store_u16, store_u24,
    store_u32, store_u40, store_u64, store_u8,
};
use crate::io::Region;
use crate::slide::abstraction::{Extent, LayerExtent, TileEntry, TileTable};

const ENCODING: u64 = 10;
const FORMAT: u64 = 11;
const CIPHER_OFFSET: u64 = 12;
const TILE_OFFSETS_OFFSET: u64 = 20;
const LAYER_EXTENTS_OFFSET: u64 = 28;
const X_EXTENT: u64 = 36;
const Y_EXTENT: u64 = 40;

/// On-disk size of the v1.0 tile table header.
pub const TILE_TABLE_SIZE: u64 = 44;

/// On-disk stride of one layer extent entry: xTiles u32, yTiles u32, scale f32.
pub const LAYER_EXTENT_SIZE: u64 = 12;

/// On-disk stride of one tile offset entry: 40-bit offset, 24-bit size.
pub const TILE_OFFSET_SIZE: u64 = 8;

const EXTENT_X_TILES: usize = 0;
const EXTENT_Y_TILES: usize = 4;
const EXTENT_SCALE: usize = 8;

const TILE_OFFSET: usize = 0;
const TILE_SIZE: usize = 5;

/// Maximum value of the packed 40-bit tile offset field.
pub const UINT40_MAX: u64 = 0xFF_FFFF_FFFF;

/// Maximum value of the packed 24-bit tile size field.
pub const UINT24_MAX: u32 = 0x00FF_FFFF;

// =============================================================================
// TileTableBlock
// =============================================================================

/// Descriptor of the tile table header block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileTableBlock {
    desc: DataBlock,
}

impl Block for TileTableBlock {
    const TAG: RecoveryTag = RecoveryTag::TileTable;
    const NAME: &'static str = "TILE_TABLE";

    fn descriptor(&self) -> &DataBlock {
        &self.desc
    }
}

impl TileTableBlock {
    pub fn new(offset: u64, file_size: u64, version: u32) -> Self {
        TileTableBlock {
            desc: DataBlock::new(offset, file_size, version),
        }
    }

    /// On-disk size of the header record.
    pub fn size(&self) -> u64 {
        let size = TILE_TABLE_SIZE;
        if self.desc.version > EXTENSION_1_0 {
            // Extension slot: revision 2+ fields extend the size here.
        }
        size
    }

    /// Validate the header, its enumerations, the reserved cipher field,
    /// and both child arrays in full.
    pub fn validate_full<R: Region + ?Sized>(&self, base: &R) -> Result<(), IrisError> {
        self.validate_offset(base)?;
        let header = base.get(self.desc.offset, TILE_TABLE_SIZE)?;

        let encoding = load_u8(&header[ENCODING as usize..]);
        if TileEncoding::from_u8(encoding, self.desc.version).is_none() {
            return Err(IrisError::UndefinedEnum {
                block: Self::NAME,
                field: "tile encoding",
                value: encoding,
            });
        }
        let format = load_u8(&header[FORMAT as usize..]);
        if PixelFormat::from_u8(format, self.desc.version).is_none() {
            return Err(IrisError::UndefinedEnum {
                block: Self::NAME,
                field: "tile pixel format",
                value: format,
            });
        }

        // The cipher slot is reserved; until a revision defines cipher
        // blocks only the null sentinel is accepted.
        let cipher = load_u64(&header[CIPHER_OFFSET as usize..]);
        if cipher != NULL_OFFSET {
            return Err(IrisError::CipherNotNull(cipher));
        }

        let extents = self.layer_extents_block(base)?;
        extents.validate_full(base)?;

        let offsets = self.tile_offsets_block(base)?;
        offsets.validate_full(base)?;

        if self.desc.version > EXTENSION_1_0 {
            // Extension slot: revision 2+ validations are added here.
        }
        Ok(())
    }

    /// Lift the pyramid index: enumerations, extent and per-tile entries.
    pub fn read_tile_table<R: Region + ?Sized>(&self, base: &R) -> Result<TileTable, IrisError> {
        let header = base.get(self.desc.offset, TILE_TABLE_SIZE)?;

        let encoding_raw = load_u8(&header[ENCODING as usize..]);
        let encoding = TileEncoding::from_u8(encoding_raw, self.desc.version).ok_or(
            IrisError::UndefinedEnum {
                block: Self::NAME,
                field: "tile encoding",
                value: encoding_raw,
            },
        )?;
        let format_raw = load_u8(&header[FORMAT as usize..]);
        let format = PixelFormat::from_u8(format_raw, self.desc.version).ok_or(
            IrisError::UndefinedEnum {
                block: Self::NAME,
                field: "tile pixel format",
                value: format_raw,
            },
        )?;

        let width = load_u32(&header[X_EXTENT as usize..]);
        let height = load_u32(&header[Y_EXTENT as usize..]);

        let extents_block = self.layer_extents(base)?;
        let layer_extents = extents_block.read_layer_extents(base)?;

        let offsets_block = self.tile_offsets(base)?;
        let layers = offsets_block.read_tile_offsets(base, &layer_extents)?;

        let table = TileTable {
            encoding,
            format,
            extent: Extent {
                width,
                height,
                layers: layer_extents,
            },
            layers,
        };
        if self.desc.version > EXTENSION_1_0 {
            // Extension slot: revision 2+ parameters are lifted here.
        }
        Ok(table)
    }

    /// Stored layer extents array offset.
    pub fn layer_extents_offset<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        Ok(load_u64(
            base.get(self.desc.offset + LAYER_EXTENTS_OFFSET, 8)?,
        ))
    }

    /// Stored tile offsets array offset.
    pub fn tile_offsets_offset<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        Ok(load_u64(
            base.get(self.desc.offset + TILE_OFFSETS_OFFSET, 8)?,
        ))
    }

    fn layer_extents_block<R: Region + ?Sized>(
        &self,
        base: &R,
    ) -> Result<LayerExtentsBlock, IrisError> {
        Ok(LayerExtentsBlock::new(
            self.layer_extents_offset(base)?,
            self.desc.file_size,
            self.desc.version,
        ))
    }

    fn tile_offsets_block<R: Region + ?Sized>(
        &self,
        base: &R,
    ) -> Result<TileOffsetsBlock, IrisError> {
        Ok(TileOffsetsBlock::new(
            self.tile_offsets_offset(base)?,
            self.desc.file_size,
            self.desc.version,
        ))
    }

    /// Descriptor of the layer extents array, offset-validated.
    pub fn layer_extents<R: Region + ?Sized>(
        &self,
        base: &R,
    ) -> Result<LayerExtentsBlock, IrisError> {
        let block = self.layer_extents_block(base)?;
        block.validate_offset(base)?;
        Ok(block)
    }

    /// Descriptor of the tile offsets array, offset-validated.
    pub fn tile_offsets<R: Region + ?Sized>(
        &self,
        base: &R,
    ) -> Result<TileOffsetsBlock, IrisError> {
        let block = self.tile_offsets_block(base)?;
        block.validate_offset(base)?;
        Ok(block)
    }
}

// =============================================================================
// LayerExtentsBlock
// =============================================================================

/// Descriptor of the layer extents array block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerExtentsBlock {
    desc: DataBlock,
}

impl Block for LayerExtentsBlock {
    const TAG: RecoveryTag = RecoveryTag::LayerExtents;
    const NAME: &'static str = "LAYER_EXTENTS";

    fn descriptor(&self) -> &DataBlock {
        &self.desc
    }
}

impl LayerExtentsBlock {
    pub fn new(offset: u64, file_size: u64, version: u32) -> Self {
        LayerExtentsBlock {
            desc: DataBlock::new(offset, file_size, version),
        }
    }

    /// On-disk size of the block including its entry tail.
    pub fn size<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        let header = ArrayHeader::read(base, &self.desc)?;
        Ok(ARRAY_HEADER_SIZE + header.entries_len())
    }

    /// Validate the array bounds and every entry's invariants: tile
    /// counts of at least one in each axis, scales strictly increasing.
    pub fn validate_full<R: Region + ?Sized>(&self, base: &R) -> Result<(), IrisError> {
        self.validate_offset(base)?;
        let header = ArrayHeader::read(base, &self.desc)?;
        header.require_stride(LAYER_EXTENT_SIZE, Self::NAME)?;
        let entries = header.entries(base, &self.desc, Self::NAME)?;

        let step = header.entry_size as usize;
        let mut prior_scale = 0.0f32;
        for index in 0..header.entry_count as usize {
            let entry = &entries[index * step..];
            if load_u32(&entry[EXTENT_X_TILES..]) < 1 {
                return Err(IrisError::ZeroTileCount {
                    layer: index,
                    axis: "horizontal",
                });
            }
            if load_u32(&entry[EXTENT_Y_TILES..]) < 1 {
                return Err(IrisError::ZeroTileCount {
                    layer: index,
                    axis: "vertical",
                });
            }
            let scale = load_f32(&entry[EXTENT_SCALE..]);
            if !(scale > prior_scale) {
                return Err(IrisError::NonIncreasingScale { layer: index });
            }
            prior_scale = scale;
        }
        Ok(())
    }

    /// Lift the layer extents and derive each layer's downsample factor
    /// as `max_scale / scale`.
    pub fn read_layer_extents<R: Region + ?Sized>(
        &self,
        base: &R,
    ) -> Result<Vec<LayerExtent>, IrisError> {
        let header = ArrayHeader::read(base, &self.desc)?;
        header.require_stride(LAYER_EXTENT_SIZE, Self::NAME)?;
        let entries = header.entries(base, &self.desc, Self::NAME)?;

        let step = header.entry_size as usize;
        let mut extents = Vec::with_capacity(header.entry_count as usize);
        for index in 0..header.entry_count as usize {
            let entry = &entries[index * step..];
            extents.push(LayerExtent {
                x_tiles: load_u32(&entry[EXTENT_X_TILES..]),
                y_tiles: load_u32(&entry[EXTENT_Y_TILES..]),
                scale: load_f32(&entry[EXTENT_SCALE..]),
                downsample: 0.0,
            });
        }

        if let Some(max_scale) = extents.last().map(|extent| extent.scale) {
            for extent in extents.iter_mut() {
                extent.downsample = max_scale / extent.scale;
            }
        }
        Ok(extents)
    }
}

/// Total on-disk size of a layer extents block holding `extents`.
pub fn layer_extents_size(extents: &[LayerExtent]) -> u64 {
    ARRAY_HEADER_SIZE + extents.len() as u64 * LAYER_EXTENT_SIZE
}

/// Serialize a layer extents array at `offset`.
pub fn store_layer_extents(
    base: &mut [u8],
    offset: u64,
    extents: &[LayerExtent],
) -> Result<(), IrisError> {
    if offset == NULL_OFFSET {
        return Err(IrisError::StorePrecondition {
            block: "LAYER_EXTENTS",
            message: "null offset provided as location".to_string(),
        });
    }
    if extents.len() as u64 > u32::MAX as u64 {
        return Err(IrisError::StorePrecondition {
            block: "LAYER_EXTENTS",
            message: format!(
                "extents array length ({}) exceeds the 32-bit entry count limit of IFE \
                 specification Section 2.4.1",
                extents.len()
            ),
        });
    }

    let total = layer_extents_size(extents);
    let target = store_target(base, offset, total, "LAYER_EXTENTS")?;
    store_u64(target, offset);
    store_u16(&mut target[8..], RecoveryTag::LayerExtents.as_u16());
    store_u16(&mut target[10..], LAYER_EXTENT_SIZE as u16);
    store_u32(&mut target[12..], extents.len() as u32);

    let mut cursor = ARRAY_HEADER_SIZE as usize;
    for extent in extents {
        store_u32(&mut target[cursor + EXTENT_X_TILES..], extent.x_tiles);
        store_u32(&mut target[cursor + EXTENT_Y_TILES..], extent.y_tiles);
        store_f32(&mut target[cursor + EXTENT_SCALE..], extent.scale);
        cursor += LAYER_EXTENT_SIZE as usize;
    }
    Ok(())
}

// =============================================================================
// TileOffsetsBlock
// =============================================================================

/// Descriptor of the tile offsets array block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileOffsetsBlock {
    desc: DataBlock,
}

impl Block for TileOffsetsBlock {
    const TAG: RecoveryTag = RecoveryTag::TileOffsets;
    const NAME: &'static str = "TILE_OFFSETS";

    fn descriptor(&self) -> &DataBlock {
        &self.desc
    }
}

impl TileOffsetsBlock {
    pub fn new(offset: u64, file_size: u64, version: u32) -> Self {
        TileOffsetsBlock {
            desc: DataBlock::new(offset, file_size, version),
        }
    }

    /// On-disk size of the block including its entry tail.
    pub fn size<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        let header = ArrayHeader::read(base, &self.desc)?;
        Ok(ARRAY_HEADER_SIZE + header.entries_len())
    }

    /// Validate the array bounds and each non-sparse entry's payload range.
    pub fn validate_full<R: Region + ?Sized>(&self, base: &R) -> Result<(), IrisError> {
        self.validate_offset(base)?;
        let header = ArrayHeader::read(base, &self.desc)?;
        header.require_stride(TILE_OFFSET_SIZE, Self::NAME)?;
        let entries = header.entries(base, &self.desc, Self::NAME)?;

        let step = header.entry_size as usize;
        for index in 0..header.entry_count as usize {
            let entry = &entries[index * step..];
            let offset = load_u40(&entry[TILE_OFFSET..]);
            if offset == NULL_TILE {
                continue;
            }
            let size = load_u24(&entry[TILE_SIZE..]) as u64;
            if offset + size > self.desc.file_size {
                return Err(IrisError::OutOfBounds {
                    block: Self::NAME,
                    start: offset,
                    end: offset + size,
                    file_size: self.desc.file_size,
                });
            }
        }
        Ok(())
    }

    /// Lift the per-tile entries grouped by layer.
    ///
    /// The entry count must equal the total tile count declared by the
    /// layer extents. Sparse entries (40-bit sentinel) are synthesised to
    /// a null offset with zero size; any other entry whose payload range
    /// leaves the file is fatal.
    pub fn read_tile_offsets<R: Region + ?Sized>(
        &self,
        base: &R,
        extents: &[LayerExtent],
    ) -> Result<Vec<Vec<TileEntry>>, IrisError> {
        let header = ArrayHeader::read(base, &self.desc)?;
        header.require_stride(TILE_OFFSET_SIZE, Self::NAME)?;

        let total_tiles: u64 = extents
            .iter()
            .map(|extent| extent.x_tiles as u64 * extent.y_tiles as u64)
            .sum();
        if total_tiles != header.entry_count as u64 {
            return Err(IrisError::TileCountMismatch {
                expected: total_tiles,
                actual: header.entry_count,
            });
        }

        let entries = header.entries(base, &self.desc, Self::NAME)?;
        let step = header.entry_size as usize;
        let mut cursor = 0usize;

        let mut layers = Vec::with_capacity(extents.len());
        for extent in extents {
            let tiles = (extent.x_tiles as u64 * extent.y_tiles as u64) as usize;
            let mut layer = Vec::with_capacity(tiles);
            for _ in 0..tiles {
                let entry = &entries[cursor..];
                let mut tile = TileEntry {
                    offset: load_u40(&entry[TILE_OFFSET..]),
                    size: load_u24(&entry[TILE_SIZE..]),
                };
                if tile.offset == NULL_TILE {
                    tile.offset = NULL_OFFSET;
                    tile.size = 0;
                } else if tile.offset + tile.size as u64 > self.desc.file_size {
                    return Err(IrisError::OutOfBounds {
                        block: Self::NAME,
                        start: tile.offset,
                        end: tile.offset + tile.size as u64,
                        file_size: self.desc.file_size,
                    });
                }
                layer.push(tile);
                cursor += step;
            }
            layers.push(layer);
        }
        Ok(layers)
    }
}

/// Total on-disk size of a tile offsets block holding `layers`.
pub fn tile_offsets_size(layers: &[Vec<TileEntry>]) -> u64 {
    let tiles: u64 = layers.iter().map(|layer| layer.len() as u64).sum();
    ARRAY_HEADER_SIZE + tiles * TILE_OFFSET_SIZE
}

/// Serialize a tile offsets array at `offset`.
///
/// A sparse entry (null offset in the abstraction) is written back as the
/// 40-bit sparse sentinel with zero size.
pub fn store_tile_offsets(
    base: &mut [u8],
    offset: u64,
    layers: &[Vec<TileEntry>],
) -> Result<(), IrisError> {
    if offset == NULL_OFFSET {
        return Err(IrisError::StorePrecondition {
            block: "TILE_OFFSETS",
            message: "null offset provided as location".to_string(),
        });
    }
    let total_tiles: u64 = layers.iter().map(|layer| layer.len() as u64).sum();
    if total_tiles > u32::MAX as u64 {
        return Err(IrisError::StorePrecondition {
            block: "TILE_OFFSETS",
            message: format!("tile count ({total_tiles}) exceeds the 32-bit entry count limit"),
        });
    }

    let total = tile_offsets_size(layers);
    let target = store_target(base, offset, total, "TILE_OFFSETS")?;
    store_u64(target, offset);
    store_u16(&mut target[8..], RecoveryTag::TileOffsets.as_u16());
    store_u16(&mut target[10..], TILE_OFFSET_SIZE as u16);
    store_u32(&mut target[12..], total_tiles as u32);

    let mut cursor = ARRAY_HEADER_SIZE as usize;
    for layer in layers {
        for tile in layer {
            let (tile_offset, tile_size) = if tile.is_sparse() {
                (NULL_TILE, 0u32)
            } else {
                if tile.offset > UINT40_MAX {
                    return Err(IrisError::StorePrecondition {
                        block: "TILE_OFFSETS",
                        message: format!(
                            "tile offset ({}) above the 40-bit numerical limit",
                            tile.offset
                        ),
                    });
                }
                if tile.size > UINT24_MAX {
                    return Err(IrisError::StorePrecondition {
                        block: "TILE_OFFSETS",
                        message: format!(
                            "tile size ({}) above the 24-bit numerical limit",
                            tile.size
                        ),
                    });
                }
                (tile.offset, tile.size)
            };
            store_u40(&mut target[cursor + TILE_OFFSET..], tile_offset);
            store_u24(&mut target[cursor + TILE_SIZE..], tile_size);
            cursor += TILE_OFFSET_SIZE as usize;
        }
    }
    Ok(())
}

// =============================================================================
// Tile table store
// =============================================================================

/// Parameters for [`store_tile_table`].
#[derive(Debug, Clone)]
pub struct TileTableCreateInfo {
    /// Offset at which the tile table header is stored
    pub tile_table_offset: u64,
    /// Tile compression codec
    pub encoding: TileEncoding,
    /// Source pixel format; `None` stores the undefined value, which is
    /// permitted but discouraged
    pub format: Option<PixelFormat>,
    /// Offset of an already-stored tile offsets array
    pub tile_offsets_offset: u64,
    /// Offset of an already-stored layer extents array
    pub layer_extents_offset: u64,
    /// Pixel width of layer 0
    pub width_pixels: u32,
    /// Pixel height of layer 0
    pub height_pixels: u32,
}

/// Serialize the tile table header.
///
/// Both array offsets must already point at stored, tag-valid blocks.
/// The reserved cipher field is always written as the null sentinel.
pub fn store_tile_table(base: &mut [u8], info: &TileTableCreateInfo) -> Result<(), IrisError> {
    if info.tile_table_offset == NULL_OFFSET {
        return Err(IrisError::StorePrecondition {
            block: "TILE_TABLE",
            message: "invalid tile table offset in TileTableCreateInfo".to_string(),
        });
    }
    if info.format.is_none() {
        warn!(
            "tile table pixel format set to the undefined value; encoding the source pixel \
             format is recommended"
        );
    }

    let file_size = base.len() as u64;
    let existing: &[u8] = base;
    let offsets = TileOffsetsBlock::new(
        info.tile_offsets_offset,
        file_size,
        crate::format::tags::EXTENSION_VERSION,
    );
    offsets
        .validate_offset(existing)
        .map_err(|source| IrisError::StorePrecondition {
            block: "TILE_TABLE",
            message: format!(
                "per the IFE specification Section 2.3.2, tile offsets shall contain a valid \
                 offset to the tile offsets array (Section 2.4.2): {source}"
            ),
        })?;
    let extents = LayerExtentsBlock::new(
        info.layer_extents_offset,
        file_size,
        crate::format::tags::EXTENSION_VERSION,
    );
    extents
        .validate_offset(existing)
        .map_err(|source| IrisError::StorePrecondition {
            block: "TILE_TABLE",
            message: format!(
                "per the IFE specification Section 2.3.2, layer extents shall contain a valid \
                 offset to the layer extents array (Section 2.4.1): {source}"
            ),
        })?;

    let target = store_target(base, info.tile_table_offset, TILE_TABLE_SIZE, "TILE_TABLE")?;
    store_u64(target, info.tile_table_offset);
    store_u16(&mut target[8..], RecoveryTag::TileTable.as_u16());
    store_u8(
        &mut target[ENCODING as usize..],
        info.encoding.as_u8(),
    );
    store_u8(
        &mut target[FORMAT as usize..],
        info.format.map(PixelFormat::as_u8).unwrap_or(0),
    );
    store_u64(&mut target[CIPHER_OFFSET as usize..], NULL_OFFSET);
    store_u64(
        &mut target[TILE_OFFSETS_OFFSET as usize..],
        info.tile_offsets_offset,
    );
    store_u64(
        &mut target[LAYER_EXTENTS_OFFSET as usize..],
        info.layer_extents_offset,
    );
    store_u32(&mut target[X_EXTENT as usize..], info.width_pixels);
    store_u32(&mut target[Y_EXTENT as usize..], info.height_pixels);
    Ok(())
}
