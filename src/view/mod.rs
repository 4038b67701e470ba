//! Pure viewport-side algorithms: tile enumeration and channel padding.

mod channels;
mod tiling;

pub use channels::{pad_channels, PadChannelsParams, PaddedChannels, MAX_CHANNELS};
pub use tiling::{tile_bounds, tiles_for_viewport, TileCoord, TilingParams, ViewportBounds};
