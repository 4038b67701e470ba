//! The unified pixel-source contract.
//!
//! Two structurally different backings, chunked multi-dimensional arrays
//! and tiled multi-directory image files, implement one capability set:
//! [`PixelSource::get_tile`] and [`PixelSource::get_raster`] over a
//! resolution pyramid, with identical request/result shapes. The display
//! layer and the tiling algorithm stay format-agnostic; chunk addressing
//! and byte-window reads stay encapsulated per variant.
//!
//! Tile coordinates are only meaningful when produced by
//! [`crate::view::tiles_for_viewport`]; calling with coordinates outside
//! the tile grid fails with [`TileError::TileOutOfBounds`].

pub mod tiff;
pub mod zarr;

use async_trait::async_trait;

use crate::error::TileError;
use crate::meta::{DimLabel, ImageMetadata, PixelType};
use crate::select::Selection;

// =============================================================================
// PixelData
// =============================================================================

/// A typed buffer of decoded samples.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    Uint8(Vec<u8>),
    Uint16(Vec<u16>),
    Uint32(Vec<u32>),
    Float32(Vec<f32>),
}

impl PixelData {
    /// Numeric type of the samples.
    pub fn pixel_type(&self) -> PixelType {
        match self {
            PixelData::Uint8(_) => PixelType::Uint8,
            PixelData::Uint16(_) => PixelType::Uint16,
            PixelData::Uint32(_) => PixelType::Uint32,
            PixelData::Float32(_) => PixelType::Float32,
        }
    }

    /// Number of samples in the buffer.
    pub fn len(&self) -> usize {
        match self {
            PixelData::Uint8(v) => v.len(),
            PixelData::Uint16(v) => v.len(),
            PixelData::Uint32(v) => v.len(),
            PixelData::Float32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An all-zero buffer of `len` samples.
    pub fn zeros(pixel_type: PixelType, len: usize) -> PixelData {
        match pixel_type {
            PixelType::Uint8 => PixelData::Uint8(vec![0; len]),
            PixelType::Uint16 => PixelData::Uint16(vec![0; len]),
            PixelType::Uint32 => PixelData::Uint32(vec![0; len]),
            PixelType::Float32 => PixelData::Float32(vec![0.0; len]),
        }
    }

    /// Split into `parts` equal contiguous buffers.
    ///
    /// Used to separate channels that share one storage chunk. The length
    /// must divide evenly; the caller guarantees this from the chunk shape.
    pub fn split(&self, parts: usize) -> Vec<PixelData> {
        let part_len = self.len() / parts.max(1);

        macro_rules! split_variant {
            ($variant:ident, $values:expr) => {
                $values
                    .chunks(part_len.max(1))
                    .map(|chunk| PixelData::$variant(chunk.to_vec()))
                    .collect()
            };
        }

        match self {
            PixelData::Uint8(v) => split_variant!(Uint8, v),
            PixelData::Uint16(v) => split_variant!(Uint16, v),
            PixelData::Uint32(v) => split_variant!(Uint32, v),
            PixelData::Float32(v) => split_variant!(Float32, v),
        }
    }
}

/// Copy a rectangular block of samples between row-major buffers.
///
/// Widths and offsets are in samples (a pixel with interleaved samples
/// spans `samples_per_pixel` entries). Both buffers must hold the same
/// pixel type; the sources construct destinations from their own type, so
/// a mismatch indicates an internal inconsistency.
pub(crate) fn blit(
    dst: &mut PixelData,
    dst_row_samples: usize,
    src: &PixelData,
    src_row_samples: usize,
    dst_origin: (usize, usize),
    src_origin: (usize, usize),
    width_samples: usize,
    rows: usize,
) -> Result<(), TileError> {
    fn copy_rows<T: Copy>(
        dst: &mut [T],
        dst_row: usize,
        src: &[T],
        src_row: usize,
        (dst_x, dst_y): (usize, usize),
        (src_x, src_y): (usize, usize),
        width: usize,
        rows: usize,
    ) {
        for row in 0..rows {
            let from = (src_y + row) * src_row + src_x;
            let to = (dst_y + row) * dst_row + dst_x;
            dst[to..to + width].copy_from_slice(&src[from..from + width]);
        }
    }

    match (dst, src) {
        (PixelData::Uint8(d), PixelData::Uint8(s)) => Ok(copy_rows(
            d,
            dst_row_samples,
            s,
            src_row_samples,
            dst_origin,
            src_origin,
            width_samples,
            rows,
        )),
        (PixelData::Uint16(d), PixelData::Uint16(s)) => Ok(copy_rows(
            d,
            dst_row_samples,
            s,
            src_row_samples,
            dst_origin,
            src_origin,
            width_samples,
            rows,
        )),
        (PixelData::Uint32(d), PixelData::Uint32(s)) => Ok(copy_rows(
            d,
            dst_row_samples,
            s,
            src_row_samples,
            dst_origin,
            src_origin,
            width_samples,
            rows,
        )),
        (PixelData::Float32(d), PixelData::Float32(s)) => Ok(copy_rows(
            d,
            dst_row_samples,
            s,
            src_row_samples,
            dst_origin,
            src_origin,
            width_samples,
            rows,
        )),
        _ => Err(TileError::DecodeJob(
            "pixel buffer type mismatch during window assembly".to_string(),
        )),
    }
}

// =============================================================================
// Requests and results
// =============================================================================

/// A request for one tile of one resolution level.
///
/// `z` is the signed zoom exponent from the tiling algorithm: level
/// `-z` of the pyramid, never positive for in-range requests.
#[derive(Debug, Clone, Default)]
pub struct TileRequest {
    pub x: u32,
    pub y: u32,
    pub z: i32,
    pub selection: Selection,
}

impl TileRequest {
    pub fn new(x: u32, y: u32, z: i32) -> Self {
        TileRequest {
            x,
            y,
            z,
            selection: Selection::new(),
        }
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }
}

/// A request for the full plane of one resolution level.
#[derive(Debug, Clone, Default)]
pub struct RasterRequest {
    pub z: i32,
    pub selection: Selection,
}

impl RasterRequest {
    pub fn new(z: i32) -> Self {
        RasterRequest {
            z,
            selection: Selection::new(),
        }
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }
}

/// Decoded pixels for one tile or plane.
///
/// `data` holds one buffer per channel when channels share a storage
/// chunk, otherwise a single buffer (which for interleaved images carries
/// `samples_per_pixel` samples per pixel).
#[derive(Debug, Clone, PartialEq)]
pub struct TilePayload {
    pub data: Vec<PixelData>,
    pub width: u32,
    pub height: u32,
}

/// Resolve a signed zoom exponent to a pyramid level index.
///
/// Positive zooms clamp to full resolution (the engine never requests
/// finer than level 0); levels past the pyramid fail.
pub(crate) fn resolve_level(z: i32, level_count: usize) -> Result<usize, TileError> {
    let level = (-z).max(0) as usize;
    if level >= level_count {
        return Err(TileError::InvalidLevel {
            level,
            count: level_count,
        });
    }
    Ok(level)
}

/// Clipped extent of the tile at `(x, y)` for an image of
/// `width` x `height` pixels.
///
/// Interior tiles are `tile_size` square; the last column/row is clipped
/// to the remainder (full size when the extent divides evenly).
pub fn tile_extent(width: u32, height: u32, tile_size: u32, x: u32, y: u32) -> (u32, u32) {
    let clip = |extent: u32, coord: u32| {
        let last = extent.div_ceil(tile_size).saturating_sub(1);
        if coord == last {
            let remainder = extent % tile_size;
            if remainder == 0 {
                tile_size
            } else {
                remainder
            }
        } else {
            tile_size
        }
    };

    (clip(width, x), clip(height, y))
}

// =============================================================================
// PixelSource
// =============================================================================

/// Capability set shared by all pixel-source variants.
///
/// A pixel source owns its metadata and resolution-level list for the
/// lifetime of a loaded image; both are immutable after construction and
/// safe to read from any number of in-flight requests. Every submitted
/// request completes or fails; there is no cancellation primitive, and a
/// failed request never affects other in-flight or future requests.
#[async_trait]
pub trait PixelSource: Send + Sync {
    /// Display tile edge length in pixels (chunk size for chunked stores).
    fn tile_size(&self) -> u32;

    /// Full-resolution shape, ordered like [`PixelSource::labels`].
    fn shape(&self) -> &[usize];

    /// Canonical dimension labels, spatial axes last.
    fn labels(&self) -> Vec<DimLabel>;

    /// Numeric type of the source pixels.
    fn pixel_type(&self) -> PixelType;

    /// Number of pyramid levels (level 0 is full resolution).
    fn level_count(&self) -> usize;

    /// The canonical metadata this source was constructed with.
    fn metadata(&self) -> &ImageMetadata;

    /// Read one tile.
    async fn get_tile(&self, request: &TileRequest) -> Result<TilePayload, TileError>;

    /// Read the full plane for a selection.
    async fn get_raster(&self, request: &RasterRequest) -> Result<TilePayload, TileError>;
}

// =============================================================================
// Tests
// =============================================================================
