//! Chunked-array pixel source.
//!
//! Backed by one opened array per resolution level. Storage chunks align
//! with display tiles, so a tile read is one chunk read at computed chunk
//! coordinates: no resampling, no window math. When several channels
//! share a chunk, the chunk is split into per-channel buffers for the
//! display layer.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{IoError, MetadataError, TileError};
use crate::meta::{DimLabel, ImageMetadata, PixelType};
use crate::select::{index_selection, raster_selection};

use super::{
    blit, resolve_level, tile_extent, PixelData, PixelSource, RasterRequest, TilePayload,
    TileRequest,
};

// =============================================================================
// ChunkedArray
// =============================================================================

/// An opened chunked multi-dimensional array: one resolution level of a
/// chunked store.
///
/// Implementations are supplied by format-specific open routines. Chunk
/// reads return the full chunk in row-major order, zero-padded past the
/// array edge (the source clips to the true extent).
#[async_trait]
pub trait ChunkedArray: Send + Sync {
    /// Extent per dimension.
    fn shape(&self) -> &[usize];

    /// Chunk extent per dimension.
    fn chunks(&self) -> &[usize];

    /// Numeric type of the stored samples.
    fn pixel_type(&self) -> PixelType;

    /// Read one full chunk at chunk-grid coordinates.
    async fn read_chunk(&self, index: &[usize]) -> Result<PixelData, IoError>;

    /// Read a full hyperplane: fixed indices for `Some` dimensions, the
    /// whole extent for `None` dimensions, output ordered by the free
    /// dimensions.
    async fn read_plane(&self, selection: &[Option<usize>]) -> Result<PixelData, IoError>;
}

// =============================================================================
// MemoryArray
// =============================================================================

/// A [`ChunkedArray`] over samples held in memory, row-major.
///
/// Serves small local images and the test suite; remote stores implement
/// the trait over their own transport.
#[derive(Debug, Clone)]
pub struct MemoryArray {
    shape: Vec<usize>,
    chunks: Vec<usize>,
    data: PixelData,
}

impl MemoryArray {
    pub fn new(
        shape: Vec<usize>,
        chunks: Vec<usize>,
        data: PixelData,
    ) -> Result<Self, MetadataError> {
        if chunks.len() != shape.len() {
            return Err(MetadataError::DimensionMismatch {
                label: "rank".to_string(),
                declared: shape.len(),
                actual: chunks.len(),
            });
        }
        if chunks.iter().any(|&c| c == 0) || shape.iter().any(|&s| s == 0) {
            return Err(MetadataError::Parse(
                "array shape and chunk extents must be positive".to_string(),
            ));
        }
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(MetadataError::Parse(format!(
                "array data holds {} samples, shape {:?} needs {expected}",
                data.len(),
                shape
            )));
        }
        Ok(MemoryArray {
            shape,
            chunks,
            data,
        })
    }
}

/// Row-major strides for a shape.
fn strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1];
    }
    strides
}

impl MemoryArray {
    /// Gather output samples by mapping each output offset to an optional
    /// source offset (`None` reads as zero padding).
    fn gather(&self, out_len: usize, source_of: impl Fn(usize) -> Option<usize>) -> PixelData {
        macro_rules! gather_variant {
            ($values:expr, $variant:ident, $zero:expr) => {
                PixelData::$variant(
                    (0..out_len)
                        .map(|i| source_of(i).map(|s| $values[s]).unwrap_or($zero))
                        .collect(),
                )
            };
        }

        match &self.data {
            PixelData::Uint8(v) => gather_variant!(v, Uint8, 0),
            PixelData::Uint16(v) => gather_variant!(v, Uint16, 0),
            PixelData::Uint32(v) => gather_variant!(v, Uint32, 0),
            PixelData::Float32(v) => gather_variant!(v, Float32, 0.0),
        }
    }
}

#[async_trait]
impl ChunkedArray for MemoryArray {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn chunks(&self) -> &[usize] {
        &self.chunks
    }

    fn pixel_type(&self) -> PixelType {
        self.data.pixel_type()
    }

    async fn read_chunk(&self, index: &[usize]) -> Result<PixelData, IoError> {
        let rank = self.shape.len();
        if index.len() != rank {
            return Err(IoError::NotFound(format!(
                "chunk index {index:?} has rank {}, array has rank {rank}",
                index.len()
            )));
        }
        for d in 0..rank {
            let grid = self.shape[d].div_ceil(self.chunks[d]);
            if index[d] >= grid {
                return Err(IoError::NotFound(format!(
                    "chunk {index:?} outside grid of {grid} along dimension {d}"
                )));
            }
        }

        let array_strides = strides(&self.shape);
        let chunk_strides = strides(&self.chunks);
        let out_len: usize = self.chunks.iter().product();

        Ok(self.gather(out_len, |out_idx| {
            let mut source = 0usize;
            for d in 0..rank {
                let local = (out_idx / chunk_strides[d]) % self.chunks[d];
                let coord = index[d] * self.chunks[d] + local;
                if coord >= self.shape[d] {
                    return None;
                }
                source += coord * array_strides[d];
            }
            Some(source)
        }))
    }

    async fn read_plane(&self, selection: &[Option<usize>]) -> Result<PixelData, IoError> {
        let rank = self.shape.len();
        if selection.len() != rank {
            return Err(IoError::NotFound(format!(
                "selection {selection:?} has rank {}, array has rank {rank}",
                selection.len()
            )));
        }
        for (d, sel) in selection.iter().enumerate() {
            if let Some(index) = sel {
                if *index >= self.shape[d] {
                    return Err(IoError::NotFound(format!(
                        "index {index} outside extent {} along dimension {d}",
                        self.shape[d]
                    )));
                }
            }
        }

        let array_strides = strides(&self.shape);
        let free: Vec<usize> = (0..rank).filter(|&d| selection[d].is_none()).collect();
        let free_shape: Vec<usize> = free.iter().map(|&d| self.shape[d]).collect();
        let free_strides = strides(&free_shape);
        let out_len: usize = free_shape.iter().product();

        let base: usize = (0..rank)
            .map(|d| selection[d].unwrap_or(0) * array_strides[d])
            .sum();

        Ok(self.gather(out_len, |out_idx| {
            let mut source = base;
            for (f, &d) in free.iter().enumerate() {
                let coord = (out_idx / free_strides[f]) % free_shape[f];
                source += coord * array_strides[d];
            }
            Some(source)
        }))
    }
}

// =============================================================================
// ZarrPixelSource
// =============================================================================

/// Pixel source over a pyramid of chunked arrays.
pub struct ZarrPixelSource {
    levels: Vec<Arc<dyn ChunkedArray>>,
    meta: ImageMetadata,
    shape: Vec<usize>,
    tile_size: u32,
}

impl std::fmt::Debug for ZarrPixelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZarrPixelSource")
            .field("meta", &self.meta)
            .field("shape", &self.shape)
            .field("tile_size", &self.tile_size)
            .field("level_count", &self.levels.len())
            .finish_non_exhaustive()
    }
}

impl ZarrPixelSource {
    /// Wrap opened per-level arrays, finest first.
    ///
    /// Fails fast when the metadata disagrees with the base array: shape
    /// per dimension, pixel type, and square x/y chunking are all checked
    /// here so reads never address the wrong pixels.
    pub fn new(
        levels: Vec<Arc<dyn ChunkedArray>>,
        meta: ImageMetadata,
    ) -> Result<Self, MetadataError> {
        let base = levels
            .first()
            .ok_or_else(|| MetadataError::Parse("no resolution levels supplied".to_string()))?;

        meta.validate_backing_shape(base.shape())?;

        if base.pixel_type() != meta.pixel_type() {
            return Err(MetadataError::UnsupportedPixelType(format!(
                "store holds {:?}, metadata declares {:?}",
                base.pixel_type(),
                meta.pixel_type()
            )));
        }

        let shape = base.shape().to_vec();
        let rank = shape.len();
        let x_index = rank - if meta.interleaved() { 2 } else { 1 };

        let chunks = base.chunks();
        if chunks[x_index] != chunks[x_index - 1] {
            return Err(MetadataError::Parse(format!(
                "spatial chunking must be square, got {}x{}",
                chunks[x_index - 1],
                chunks[x_index]
            )));
        }
        let tile_size = chunks[x_index] as u32;

        for (i, level) in levels.iter().enumerate() {
            if level.shape().len() != rank {
                return Err(MetadataError::DimensionMismatch {
                    label: "rank".to_string(),
                    declared: rank,
                    actual: level.shape().len(),
                });
            }
            let level_chunks = level.chunks();
            if level_chunks[x_index] as u32 != tile_size
                || level_chunks[x_index - 1] as u32 != tile_size
            {
                return Err(MetadataError::Parse(format!(
                    "level {i} chunking {:?} disagrees with tile size {tile_size}",
                    level_chunks
                )));
            }
        }

        debug!(levels = levels.len(), tile_size, "opened chunked pixel source");

        Ok(ZarrPixelSource {
            levels,
            meta,
            shape,
            tile_size,
        })
    }

    fn x_index(&self) -> usize {
        self.shape.len() - if self.meta.interleaved() { 2 } else { 1 }
    }

    /// Position of the channel dimension, when the image has one.
    fn channel_position(&self) -> Option<usize> {
        self.meta
            .dimensions()
            .iter()
            .position(|d| d.label == DimLabel::C)
    }

    /// Samples per pixel in a single buffer (interleaved images carry the
    /// trailing pseudo-dimension inside each pixel).
    fn samples_per_pixel(&self) -> usize {
        if self.meta.interleaved() {
            *self.shape.last().unwrap_or(&1)
        } else {
            1
        }
    }

    /// Clip a full (possibly padded) chunk to the tile's true extent.
    fn clip_chunk(
        &self,
        chunk: PixelData,
        width: u32,
        height: u32,
    ) -> Result<PixelData, TileError> {
        let ts = self.tile_size as usize;
        let spp = self.samples_per_pixel();

        if chunk.len() != ts * ts * spp {
            return Err(TileError::ShapeMismatch {
                expected_width: self.tile_size,
                expected_height: self.tile_size,
                width: (chunk.len() / spp.max(1) / ts.max(1)) as u32,
                height: ts as u32,
            });
        }

        if width as usize == ts && height as usize == ts {
            return Ok(chunk);
        }

        let mut clipped =
            PixelData::zeros(chunk.pixel_type(), width as usize * height as usize * spp);
        blit(
            &mut clipped,
            width as usize * spp,
            &chunk,
            ts * spp,
            (0, 0),
            (0, 0),
            width as usize * spp,
            height as usize,
        )?;
        Ok(clipped)
    }
}

#[async_trait]
impl PixelSource for ZarrPixelSource {
    fn tile_size(&self) -> u32 {
        self.tile_size
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn labels(&self) -> Vec<DimLabel> {
        self.meta.labels()
    }

    fn pixel_type(&self) -> PixelType {
        self.meta.pixel_type()
    }

    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn metadata(&self) -> &ImageMetadata {
        &self.meta
    }

    async fn get_tile(&self, request: &TileRequest) -> Result<TilePayload, TileError> {
        let level = resolve_level(request.z, self.levels.len())?;
        let array = &self.levels[level];

        let x_index = self.x_index();
        let level_shape = array.shape();
        let level_width = level_shape[x_index] as u32;
        let level_height = level_shape[x_index - 1] as u32;

        let tiles_x = level_width.div_ceil(self.tile_size);
        let tiles_y = level_height.div_ceil(self.tile_size);
        if request.x >= tiles_x || request.y >= tiles_y {
            return Err(TileError::TileOutOfBounds {
                x: request.x,
                y: request.y,
                tiles_x,
                tiles_y,
            });
        }

        // Chunk coordinates: element indices scaled down to the chunk
        // grid, with the spatial slots replaced by the tile coordinates.
        let indices = index_selection(&request.selection, self.meta.dimensions())?;
        let chunks = array.chunks();
        let mut chunk_index: Vec<usize> = indices
            .iter()
            .zip(chunks)
            .map(|(&i, &c)| i / c.max(1))
            .collect();
        chunk_index[x_index] = request.x as usize;
        chunk_index[x_index - 1] = request.y as usize;

        let chunk = array.read_chunk(&chunk_index).await?;

        let (width, height) =
            tile_extent(level_width, level_height, self.tile_size, request.x, request.y);

        // Channels sharing a chunk come back as one buffer; separate them
        // before clipping so each channel is a clean 2-D tile.
        let channel_chunk = self
            .channel_position()
            .filter(|_| !self.meta.interleaved())
            .map(|p| chunks[p])
            .unwrap_or(1);

        let buffers = if channel_chunk > 1 {
            chunk.split(channel_chunk)
        } else {
            vec![chunk]
        };

        let data = buffers
            .into_iter()
            .map(|buffer| self.clip_chunk(buffer, width, height))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TilePayload {
            data,
            width,
            height,
        })
    }

    async fn get_raster(&self, request: &RasterRequest) -> Result<TilePayload, TileError> {
        let level = resolve_level(request.z, self.levels.len())?;
        let array = &self.levels[level];

        let selection = raster_selection(&request.selection, self.meta.dimensions())?;
        let data = array.read_plane(&selection).await?;

        let x_index = self.x_index();
        let level_shape = array.shape();
        let width = level_shape[x_index] as u32;
        let height = level_shape[x_index - 1] as u32;

        let expected = width as usize * height as usize * self.samples_per_pixel();
        if data.len() != expected {
            return Err(TileError::ShapeMismatch {
                expected_width: width,
                expected_height: height,
                width,
                height: (data.len() / width.max(1) as usize) as u32,
            });
        }

        Ok(TilePayload {
            data: vec![data],
            width,
            height,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
