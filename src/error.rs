use thiserror::Error;

/// I/O errors that can occur when reading from a backing store
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Chunk or object not found in the store
    #[error("Not found: {0}")]
    NotFound(String),

    /// Error reported by the storage backend
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Errors that can occur when parsing the structure of a tiled TIFF file
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Image directory offset points outside the file
    #[error("Invalid image directory offset: {0}")]
    InvalidDirectoryOffset(u64),

    /// Requested image directory index past the end of the directory chain
    #[error("Image directory {index} out of range: file has {count} directories")]
    DirectoryOutOfRange { index: usize, count: usize },

    /// Required tag is missing from an image directory
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Compression scheme the decode facility cannot handle
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(u16),

    /// File uses strips instead of tiles
    #[error("Unsupported organization: image directory uses strips instead of tiles")]
    StripOrganization,

    /// Unknown field type in a directory entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

/// Construction-time metadata errors.
///
/// All of these are fatal: the image cannot be addressed correctly, so
/// loading is aborted rather than risking silently corrupt reads.
#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    /// Malformed metadata document (bad XML/JSON, missing elements)
    #[error("Metadata parse error: {0}")]
    Parse(String),

    /// Underlying file structure could not be read during construction
    #[error("Format error: {0}")]
    Format(#[from] TiffError),

    /// A required attribute is absent from the pixel description
    #[error("Missing metadata attribute: {0}")]
    MissingAttribute(&'static str),

    /// The declared numeric type has no supported mapping
    #[error("Unsupported pixel type: {0}")]
    UnsupportedPixelType(String),

    /// The native axis-order string cannot be normalized
    #[error("Invalid dimension order {0:?}: expected a permutation of \"XYZCT\" starting with \"XY\"")]
    InvalidDimensionOrder(String),

    /// A declared dimension size disagrees with the backing shape
    #[error(
        "Dimension mismatch for '{label}': metadata declares size {declared}, backing shape has {actual}"
    )]
    DimensionMismatch {
        label: String,
        declared: usize,
        actual: usize,
    },
}

/// Per-request selection errors.
///
/// These are recoverable: the request that carried the bad selection fails,
/// and the pixel source remains usable for subsequent valid requests.
#[derive(Debug, Clone, Error)]
pub enum SelectionError {
    /// The selection names a dimension the image does not have, or a
    /// spatial/pseudo dimension that cannot be selected by name
    #[error("No selectable dimension named '{name}' on image with dimensions [{known}]")]
    InvalidDimension { name: String, known: String },

    /// A named value is absent from the dimension's value list
    #[error("Dimension '{dimension}' has no entry named '{name}'")]
    InvalidValue { dimension: String, name: String },

    /// An integer index is outside `[0, size)`
    #[error("Index {index} out of range for dimension '{dimension}' of size {size}")]
    IndexOutOfRange {
        dimension: String,
        index: usize,
        size: usize,
    },
}

/// Errors returned by `get_tile`/`get_raster`.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// The request carried an invalid selection
    #[error("Selection error: {0}")]
    Selection(#[from] SelectionError),

    /// I/O error while fetching pixel data
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF structure error while resolving the image directory
    #[error("Format error: {0}")]
    Format(#[from] TiffError),

    /// The zoom/level index does not address a resolution level
    #[error("Level {level} out of range: source has {count} levels")]
    InvalidLevel { level: usize, count: usize },

    /// Tile coordinates outside the level's tile grid
    #[error("Tile ({x}, {y}) out of range: grid is {tiles_x} x {tiles_y}")]
    TileOutOfBounds {
        x: u32,
        y: u32,
        tiles_x: u32,
        tiles_y: u32,
    },

    /// A decoded tile's geometry disagrees with the expected tile size.
    /// Signals a fetch/format inconsistency; not fatal to the source.
    #[error(
        "Tile shape mismatch: expected {expected_width}x{expected_height}, decoded {width}x{height}"
    )]
    ShapeMismatch {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },

    /// One decode-pool job failed; only this request is affected
    #[error("Decode job failed: {0}")]
    DecodeJob(String),
}
