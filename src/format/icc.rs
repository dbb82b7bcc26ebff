//! ICC color profile: an opaque byte blob with a declared length.
//!
//! The block is a 14-byte header (data block prefix + u32 byte count)
//! followed by the profile bytes. The content is never interpreted; the
//! abstraction records where the payload sits so a renderer can hand it
//! to a color management system directly from the mapped region.

use crate::error::IrisError;
use crate::format::block::{
    byte_block_bounds, read_byte_count, store_target, Block, DataBlock, BYTE_BLOCK_HEADER_SIZE,
};
use crate::format::tags::{RecoveryTag, NULL_OFFSET};
use crate::io::primitive::{store_u16, store_u32, store_u64};
use crate::io::Region;
use crate::slide::abstraction::IccProfile;

/// Descriptor of the ICC color profile block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IccProfileBlock {
    desc: DataBlock,
}

impl Block for IccProfileBlock {
    const TAG: RecoveryTag = RecoveryTag::IccProfile;
    const NAME: &'static str = "ICC_PROFILE";

    fn descriptor(&self) -> &DataBlock {
        &self.desc
    }
}

impl IccProfileBlock {
    pub fn new(offset: u64, file_size: u64, version: u32) -> Self {
        IccProfileBlock {
            desc: DataBlock::new(offset, file_size, version),
        }
    }

    /// On-disk size of the block including the profile payload.
    pub fn size<R: Region + ?Sized>(&self, base: &R) -> Result<u64, IrisError> {
        Ok(BYTE_BLOCK_HEADER_SIZE + read_byte_count(base, &self.desc)? as u64)
    }

    /// Validate the payload bounds.
    pub fn validate_full<R: Region + ?Sized>(&self, base: &R) -> Result<(), IrisError> {
        self.validate_offset(base)?;
        let count = read_byte_count(base, &self.desc)?;
        byte_block_bounds(&self.desc, count, Self::NAME)
    }

    /// Locate the profile payload without copying it.
    pub fn read_profile<R: Region + ?Sized>(&self, base: &R) -> Result<IccProfile, IrisError> {
        let count = read_byte_count(base, &self.desc)?;
        byte_block_bounds(&self.desc, count, Self::NAME)?;
        Ok(IccProfile {
            offset: self.desc.offset + BYTE_BLOCK_HEADER_SIZE,
            byte_size: count as u64,
        })
    }
}

/// Total on-disk size of an ICC profile block for a payload of `len` bytes.
pub fn icc_profile_size(len: usize) -> u64 {
    BYTE_BLOCK_HEADER_SIZE + len as u64
}

/// Serialize an ICC color profile block at `offset`.
pub fn store_icc_profile(base: &mut [u8], offset: u64, profile: &[u8]) -> Result<(), IrisError> {
    if offset == NULL_OFFSET {
        return Err(IrisError::StorePrecondition {
            block: "ICC_PROFILE",
            message: "null offset provided as location".to_string(),
        });
    }
    if profile.len() as u64 > u32::MAX as u64 {
        return Err(IrisError::StorePrecondition {
            block: "ICC_PROFILE",
            message: "color profile exceeds the 32-bit length limit of IFE specification \
                      Section 2.4.8"
                .to_string(),
        });
    }

    let total = icc_profile_size(profile.len());
    let target = store_target(base, offset, total, "ICC_PROFILE")?;
    store_u64(target, offset);
    store_u16(&mut target[8..], RecoveryTag::IccProfile.as_u16());
    store_u32(&mut target[10..], profile.len() as u32);
    target[BYTE_BLOCK_HEADER_SIZE as usize..].copy_from_slice(profile);
    Ok(())
}
