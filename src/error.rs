use thiserror::Error;

/// Structural errors raised while reading, validating or writing the
/// Iris container layout.
///
/// Variants split into the two fatal classes of the specification:
/// *validation failures* (a self-validation word, recovery tag, enum
/// value, bound check or cross-reference check failed) and *generic
/// failures* (anything else unrecoverable, e.g. a writer precondition).
/// Use [`IrisError::is_validation_failure`] to distinguish them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IrisError {
    /// The first four bytes are not the Iris magic word
    #[error("Iris file magic number failed validation (found 0x{0:08X})")]
    InvalidMagic(u32),

    /// A block descriptor was constructed with a null or out-of-file offset
    #[error("invalid {block} object: offset {offset} is not a valid location in a {file_size} byte file")]
    InvalidBlockOffset {
        block: &'static str,
        offset: u64,
        file_size: u64,
    },

    /// The 64-bit validation word does not store the block's own offset
    #[error("{block} failed offset validation: the validation value ({stored}) is not the offset location ({offset})")]
    ValidationWordMismatch {
        block: &'static str,
        offset: u64,
        stored: u64,
    },

    /// The 16-bit recovery tag does not match the block kind
    #[error("{block} recovery tag (0x{expected:04X}) failed validation: the tag value is 0x{found:04X}")]
    RecoveryTagMismatch {
        block: &'static str,
        expected: u16,
        found: u16,
    },

    /// Stored file size differs from the size of the supplied byte region
    #[error("the internally stored Iris file size ({stored} bytes) differs from that provided by the operating system ({actual} bytes); this failure requires file recovery")]
    FileSizeMismatch { stored: u64, actual: u64 },

    /// A block's variable-length tail extends beyond the end of the file
    #[error("{block} failed validation: bytes {start}..{end} extend beyond the end of the {file_size} byte file")]
    OutOfBounds {
        block: &'static str,
        start: u64,
        end: u64,
        file_size: u64,
    },

    /// An on-disk enumeration holds an unrecognised (or undefined) value
    #[error("undefined {field} value ({value}) decoded from {block}")]
    UndefinedEnum {
        block: &'static str,
        field: &'static str,
        value: u8,
    },

    /// The reserved cipher offset holds a non-null value
    #[error("tile table cipher offset holds a non-null value ({0}); cipher blocks are reserved and shall be null")]
    CipherNotNull(u64),

    /// Tile offset entry count does not match the layer extents
    #[error("tile count in layer extents ({expected}) does not match total entries in the tile offset array ({actual})")]
    TileCountMismatch { expected: u64, actual: u32 },

    /// A layer extent entry declares a zero tile count
    #[error("layer extent [{layer}] failed validation: {axis} tile count shall be greater than zero")]
    ZeroTileCount { layer: usize, axis: &'static str },

    /// Layer scales are not strictly increasing
    #[error("layer extent [{layer}] failed validation: scale shall be greater than zero and greater than the previous layer's scale")]
    NonIncreasingScale { layer: usize },

    /// A sizes array and its bytes block disagree on the total byte count
    #[error("{block} failed validation: expected bytes ({expected}) from the sizes array does not match the declared byte count ({declared})")]
    ByteCountMismatch {
        block: &'static str,
        expected: u64,
        declared: u64,
    },

    /// A declared length field is zero or exceeds its permitted range
    #[error("{block} {field} failed validation: {message}")]
    InvalidLength {
        block: &'static str,
        field: &'static str,
        message: String,
    },

    /// A writer precondition was violated
    #[error("store failed for {block}: {message}")]
    StorePrecondition {
        block: &'static str,
        message: String,
    },

    /// Remote fetch failure (remote build only)
    #[cfg(feature = "remote")]
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl IrisError {
    /// True for the `VALIDATION_FAILURE` class: a self-validation word,
    /// recovery tag, enumeration, bound or cross-reference check failed.
    pub fn is_validation_failure(&self) -> bool {
        match self {
            IrisError::StorePrecondition { .. } | IrisError::InvalidMagic(_) => false,
            #[cfg(feature = "remote")]
            IrisError::Fetch(_) => false,
            _ => true,
        }
    }
}

/// I/O errors surfaced by a [`RangeReader`](crate::io::RangeReader)
/// implementation in the remote-fetch build.
#[cfg(feature = "remote")]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// Requested range exceeds resource bounds
    #[error("range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Network or connection error
    #[error("connection error: {0}")]
    Connection(String),

    /// Resource not found
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The fetch collaborator returned fewer bytes than requested
    #[error("short read: requested {requested} bytes at offset {offset}, received {received}")]
    ShortRead {
        offset: u64,
        requested: u64,
        received: u64,
    },
}
