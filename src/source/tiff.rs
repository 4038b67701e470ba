//! Tiled-image pixel source.
//!
//! A pyramidal OME-TIFF holds one image directory per 2-D plane per
//! resolution level. A tile read resolves the request's selection to one
//! linear directory index through an injected [`IfdIndexer`], then
//! assembles the pixel window `[x·ts, y·ts, x·ts+w, y·ts+h]` from the
//! directory's internal tiles, decoding each through the optional
//! [`DecodePool`].
//!
//! The decode pool and precomputed directory offsets are constructor-time
//! composition: the source calls them directly, owns them exclusively,
//! and works correctly with neither, either, or both configured.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::decode::{Compression, DecodeJob, DecodePool};
use crate::error::{MetadataError, TileError};
use crate::format::tiff::{DirectoryIndex, ImageDirectory};
use crate::io::RangeReader;
use crate::meta::{DimLabel, ImageMetadata, PixelType};
use crate::select::{index_selection, Selection};

use super::{
    blit, resolve_level, tile_extent, PixelData, PixelSource, RasterRequest, TilePayload,
    TileRequest,
};

// =============================================================================
// IfdIndexer
// =============================================================================

/// Maps a resolved selection and pyramid level to the linear index of the
/// image directory holding that plane.
///
/// Injected so directory layouts other than the default (plane-major per
/// level) slot in without touching the source.
#[async_trait]
pub trait IfdIndexer: Send + Sync {
    async fn directory_index(&self, indices: &[usize], level: usize) -> Result<usize, TileError>;
}

/// Default indexer for OME-TIFF: planes laid out row-major over the
/// non-spatial dimensions (slowest-varying first), all planes of level 0
/// before all planes of level 1, and so on.
#[derive(Debug, Clone)]
pub struct OmeIfdIndexer {
    /// Position and extent of each non-spatial dimension, slowest first
    plane_dims: Vec<(usize, usize)>,
    planes_per_level: usize,
}

impl OmeIfdIndexer {
    pub fn new(meta: &ImageMetadata) -> Self {
        let plane_dims: Vec<(usize, usize)> = meta
            .dimensions()
            .iter()
            .enumerate()
            .filter(|(_, d)| !matches!(d.label, DimLabel::X | DimLabel::Y | DimLabel::Samples))
            .map(|(position, d)| (position, d.size))
            .collect();
        let planes_per_level = plane_dims.iter().map(|&(_, size)| size).product();

        OmeIfdIndexer {
            plane_dims,
            planes_per_level,
        }
    }
}

#[async_trait]
impl IfdIndexer for OmeIfdIndexer {
    async fn directory_index(&self, indices: &[usize], level: usize) -> Result<usize, TileError> {
        let mut plane = 0usize;
        for &(position, size) in &self.plane_dims {
            plane = plane * size + indices[position];
        }
        Ok(level * self.planes_per_level + plane)
    }
}

// =============================================================================
// Options
// =============================================================================

/// Constructor-time configuration for [`TiffPixelSource`].
#[derive(Debug, Clone, Default)]
pub struct TiffSourceOptions {
    /// Run tile decodes on a pool of this many workers; `None` decodes
    /// inline on the calling task
    pub decode_workers: Option<usize>,

    /// Precomputed byte offsets of every image directory, skipping the
    /// sequential next-IFD walk
    pub directory_offsets: Option<Vec<u64>>,

    /// Capacity of the resolved-directory cache
    pub directory_cache_capacity: Option<usize>,
}

// =============================================================================
// TiffPixelSource
// =============================================================================

/// Pixel source over a tiled, pyramidal multi-directory image file.
pub struct TiffPixelSource<R: RangeReader + 'static> {
    directories: DirectoryIndex<R>,
    indexer: Arc<dyn IfdIndexer>,
    pool: Option<DecodePool>,
    meta: ImageMetadata,
    shape: Vec<usize>,
    tile_size: u32,
    level_count: usize,
}

impl<R: RangeReader + 'static> std::fmt::Debug for TiffPixelSource<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiffPixelSource")
            .field("meta", &self.meta)
            .field("shape", &self.shape)
            .field("tile_size", &self.tile_size)
            .field("level_count", &self.level_count)
            .finish_non_exhaustive()
    }
}

impl<R: RangeReader + 'static> TiffPixelSource<R> {
    /// Open a tiled image file with default options.
    pub async fn open(
        reader: Arc<R>,
        meta: ImageMetadata,
        level_count: usize,
    ) -> Result<Self, MetadataError> {
        Self::open_with(reader, meta, level_count, TiffSourceOptions::default()).await
    }

    /// Open a tiled image file.
    ///
    /// Validates the base directory against the metadata (spatial extents,
    /// pixel type, square tiling) and fails fast; the resulting source is
    /// immutable.
    pub async fn open_with(
        reader: Arc<R>,
        meta: ImageMetadata,
        level_count: usize,
        options: TiffSourceOptions,
    ) -> Result<Self, MetadataError> {
        if level_count == 0 {
            return Err(MetadataError::Parse(
                "image must have at least one resolution level".to_string(),
            ));
        }

        let mut directories = DirectoryIndex::open(reader).await?;
        if let Some(offsets) = options.directory_offsets {
            directories = directories.with_offsets(offsets);
        }
        if let Some(capacity) = options.directory_cache_capacity {
            directories = directories.with_cache_capacity(capacity);
        }

        let base = directories.directory(0).await?;

        if base.tile_width != base.tile_height {
            return Err(MetadataError::Parse(format!(
                "tiling must be square, got {}x{}",
                base.tile_width, base.tile_height
            )));
        }

        for (label, actual) in [
            (DimLabel::X, base.width as usize),
            (DimLabel::Y, base.height as usize),
        ] {
            let declared = meta.size_of(label).unwrap_or(0);
            if declared != actual {
                return Err(MetadataError::DimensionMismatch {
                    label: label.to_string(),
                    declared,
                    actual,
                });
            }
        }

        let file_type = base.pixel_type()?;
        if file_type != meta.pixel_type() {
            return Err(MetadataError::UnsupportedPixelType(format!(
                "file holds {:?}, metadata declares {:?}",
                file_type,
                meta.pixel_type()
            )));
        }

        debug!(
            levels = level_count,
            tile_size = base.tile_width,
            "opened tiled pixel source"
        );

        Ok(TiffPixelSource {
            indexer: Arc::new(OmeIfdIndexer::new(&meta)),
            pool: options.decode_workers.map(DecodePool::new),
            shape: meta.shape(),
            tile_size: base.tile_width,
            level_count,
            directories,
            meta,
        })
    }

    /// Replace the selection-to-directory indexer.
    pub fn with_indexer(mut self, indexer: Arc<dyn IfdIndexer>) -> Self {
        self.indexer = indexer;
        self
    }

    async fn directory_for(
        &self,
        selection: &Selection,
        level: usize,
    ) -> Result<Arc<ImageDirectory>, TileError> {
        let indices = index_selection(selection, self.meta.dimensions())?;
        let index = self.indexer.directory_index(&indices, level).await?;
        Ok(self.directories.directory(index).await?)
    }

    /// Assemble a pixel window from the directory's internal tiles.
    ///
    /// The window is clipped by the caller; every intersecting tile is
    /// fetched, decoded, and its overlap copied into the output buffer.
    async fn read_window(
        &self,
        directory: &ImageDirectory,
        (x0, y0): (u32, u32),
        (x1, y1): (u32, u32),
    ) -> Result<PixelData, TileError> {
        let tile_w = directory.tile_width as usize;
        let tile_h = directory.tile_height as usize;
        let spp = directory.samples_per_pixel as usize;
        let pixel_type = self.meta.pixel_type();
        let compression = Compression::from_tag(directory.compression)?;
        let byte_order = self.directories.header().byte_order;

        let out_w = (x1 - x0) as usize;
        let out_h = (y1 - y0) as usize;
        let mut out = PixelData::zeros(pixel_type, out_w * out_h * spp);

        for tile_y in (y0 as usize / tile_h)..=((y1 as usize - 1) / tile_h) {
            for tile_x in (x0 as usize / tile_w)..=((x1 as usize - 1) / tile_w) {
                let (offset, length) = directory
                    .tile_location(tile_x as u32, tile_y as u32)
                    .ok_or(TileError::TileOutOfBounds {
                        x: tile_x as u32,
                        y: tile_y as u32,
                        tiles_x: directory.tiles_x(),
                        tiles_y: directory.tiles_y(),
                    })?;

                let payload = self
                    .directories
                    .reader()
                    .read_exact_at(offset, length as usize)
                    .await
                    .map_err(TileError::Io)?;

                let job = DecodeJob {
                    payload,
                    compression,
                    byte_order,
                    pixel_type,
                };
                let decoded = match &self.pool {
                    Some(pool) => pool.decode(job).await?,
                    None => job.run()?,
                };

                if decoded.len() != tile_w * tile_h * spp {
                    return Err(TileError::ShapeMismatch {
                        expected_width: directory.tile_width,
                        expected_height: directory.tile_height,
                        width: directory.tile_width,
                        height: (decoded.len() / spp.max(1) / tile_w.max(1)) as u32,
                    });
                }

                // Overlap of this internal tile with the window
                let left = (x0 as usize).max(tile_x * tile_w);
                let top = (y0 as usize).max(tile_y * tile_h);
                let right = (x1 as usize).min((tile_x + 1) * tile_w);
                let bottom = (y1 as usize).min((tile_y + 1) * tile_h);

                blit(
                    &mut out,
                    out_w * spp,
                    &decoded,
                    tile_w * spp,
                    ((left - x0 as usize) * spp, top - y0 as usize),
                    ((left - tile_x * tile_w) * spp, top - tile_y * tile_h),
                    (right - left) * spp,
                    bottom - top,
                )?;
            }
        }

        Ok(out)
    }
}

#[async_trait]
impl<R: RangeReader + 'static> PixelSource for TiffPixelSource<R> {
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
        self.level_count
    }

    fn metadata(&self) -> &ImageMetadata {
        &self.meta
    }

    async fn get_tile(&self, request: &TileRequest) -> Result<TilePayload, TileError> {
        let level = resolve_level(request.z, self.level_count)?;
        let directory = self.directory_for(&request.selection, level).await?;

        if directory.tile_width != self.tile_size {
            // The directory disagrees with the tiling the source was
            // opened with; results would be misaligned.
            return Err(TileError::ShapeMismatch {
                expected_width: self.tile_size,
                expected_height: self.tile_size,
                width: directory.tile_width,
                height: directory.tile_height,
            });
        }

        if request.x >= directory.tiles_x() || request.y >= directory.tiles_y() {
            return Err(TileError::TileOutOfBounds {
                x: request.x,
                y: request.y,
                tiles_x: directory.tiles_x(),
                tiles_y: directory.tiles_y(),
            });
        }

        let (width, height) = tile_extent(
            directory.width,
            directory.height,
            self.tile_size,
            request.x,
            request.y,
        );

        let x0 = request.x * self.tile_size;
        let y0 = request.y * self.tile_size;
        let data = self
            .read_window(&directory, (x0, y0), (x0 + width, y0 + height))
            .await?;

        Ok(TilePayload {
            data: vec![data],
            width,
            height,
        })
    }

    async fn get_raster(&self, request: &RasterRequest) -> Result<TilePayload, TileError> {
        let level = resolve_level(request.z, self.level_count)?;
        let directory = self.directory_for(&request.selection, level).await?;

        let data = self
            .read_window(&directory, (0, 0), (directory.width, directory.height))
            .await?;

        Ok(TilePayload {
            data: vec![data],
            width: directory.width,
            height: directory.height,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
