//! # OME Tiler
//!
//! A multiscale pixel source and tiling engine for very large, pyramidal,
//! multi-channel microscopy images (OME-TIFF, OME-Zarr).
//!
//! Interactive viewers only ever need the pixels under the current
//! viewport. This crate decides *which* pixels those are and fetches them
//! in the right shape: it parses format-native metadata into one canonical
//! dimension model, maps semantic selections (`{c: "DAPI", z: 3}`) to
//! storage indices, reads tiles from either backing format through one
//! contract, and hands the display layer fixed-shape channel state.
//!
//! ## Features
//!
//! - **One contract, two formats**: chunked-array stores and tiled
//!   multi-directory image files behind identical `get_tile`/`get_raster`
//!   operations
//! - **Dimension-aware selections**: channels addressable by name, with
//!   per-request validation that never poisons the source
//! - **Bounded concurrent decode**: CPU-bound tile decompression on a
//!   fixed worker pool, off the async runtime
//! - **Offset seeding**: precomputed image-directory offsets skip remote
//!   chain traversal
//! - **Pure viewport math**: deterministic viewport-to-tile enumeration
//!   and fixed-capacity channel padding
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`meta`] - canonical metadata model and format-native parsers
//! - [`select`] - selection indexing over named dimensions
//! - [`io`] - byte-range access to backing stores
//! - [`mod@format`] - tiled TIFF structure parsing
//! - [`decode`] - decode jobs and the bounded worker pool
//! - [`source`] - the two pixel-source variants
//! - [`view`] - viewport tiling and channel normalization
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ome_tiler::{
//!     tiles_for_viewport, ImageMetadata, MemoryReader, PixelSource, Selection, TileRequest,
//!     TiffPixelSource, TilingParams, ViewportBounds,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ome_xml = std::fs::read_to_string("image.companion.ome")?;
//!     let pixels = ome_tiler::meta::omexml::parse(&ome_xml)?;
//!     let meta = ImageMetadata::from_ome(&pixels)?;
//!
//!     let bytes = std::fs::read("image.ome.tif")?;
//!     let reader = Arc::new(MemoryReader::new(bytes, "file://image.ome.tif"));
//!     let source = TiffPixelSource::open(reader, meta, 3).await?;
//!
//!     let tiles = tiles_for_viewport(&TilingParams {
//!         bounds: ViewportBounds::new(0.0, 0.0, 1024.0, 768.0),
//!         zoom: -1.3,
//!         min_zoom: -2,
//!         tile_size: source.tile_size(),
//!         image_width: source.shape()[4] as u32,
//!         image_height: source.shape()[3] as u32,
//!     });
//!
//!     let selection = Selection::new().with("c", "DAPI");
//!     for coord in tiles {
//!         let request = TileRequest::new(coord.x, coord.y, coord.z)
//!             .with_selection(selection.clone());
//!         let tile = source.get_tile(&request).await?;
//!         // hand {data, width, height} to the display layer
//!         let _ = (tile.width, tile.height);
//!     }
//!     Ok(())
//! }
//! ```

pub mod decode;
pub mod error;
pub mod format;
pub mod io;
pub mod meta;
pub mod select;
pub mod source;
pub mod view;

// Re-export commonly used types
pub use decode::{Compression, DecodeJob, DecodePool, DEFAULT_DECODE_WORKERS};
pub use error::{IoError, MetadataError, SelectionError, TiffError, TileError};
pub use format::tiff::{
    ByteOrder, DirectoryIndex, Ifd, IfdEntry, ImageDirectory, TiffHeader,
    DEFAULT_DIRECTORY_CACHE_CAPACITY,
};
pub use io::{MemoryReader, RangeReader};
pub use meta::{
    multiscales, omexml, DimLabel, Dimension, ImageMetadata, PhysicalDimensions, PhysicalSize,
    PixelType,
};
pub use select::{index_selection, raster_selection, Selection, SelectionKey, SelectionValue};
pub use source::tiff::{IfdIndexer, OmeIfdIndexer, TiffPixelSource, TiffSourceOptions};
pub use source::zarr::{ChunkedArray, MemoryArray, ZarrPixelSource};
pub use source::{
    tile_extent, PixelData, PixelSource, RasterRequest, TilePayload, TileRequest,
};
pub use view::{
    pad_channels, tile_bounds, tiles_for_viewport, PadChannelsParams, PaddedChannels, TileCoord,
    TilingParams, ViewportBounds, MAX_CHANNELS,
};
