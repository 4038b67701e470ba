//! Viewport-to-tile-index enumeration.
//!
//! Given a world-space viewport and a zoom level, decide exactly which
//! tiles of which resolution level must be requested. This is the only
//! sanctioned producer of tile coordinates for
//! [`crate::source::PixelSource::get_tile`].
//!
//! Zoom values are non-positive: zoom `z` displays pyramid level `-z`,
//! each level downsampling by exactly 2x. World space is the pixel grid
//! of the full-resolution image.

/// A world-space bounding box, y increasing downward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportBounds {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl ViewportBounds {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        ViewportBounds {
            left,
            top,
            right,
            bottom,
        }
    }
}

/// One tile to request: grid coordinates plus the signed zoom exponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: i32,
}

/// Inputs to [`tiles_for_viewport`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TilingParams {
    /// Viewport bounding box in world space
    pub bounds: ViewportBounds,

    /// Current zoom (fractional; non-positive once clamped)
    pub zoom: f64,

    /// Coarsest zoom with data: `-(level_count - 1)`
    pub min_zoom: i32,

    /// Tile edge length in pixels
    pub tile_size: u32,

    /// Full-resolution image extent
    pub image_width: u32,
    pub image_height: u32,
}

/// Enumerate the tiles covering a viewport.
///
/// The zoom is clamped so the engine never requests a level finer than
/// full resolution; below `min_zoom` the image has no data at that scale
/// and the result is empty. Tile indices outside the image are clamped
/// away (a viewport straddling negative world coordinates drops, never
/// wraps). Order is row-major, y then x: not semantically meaningful,
/// but deterministic.
pub fn tiles_for_viewport(params: &TilingParams) -> Vec<TileCoord> {
    let z = (params.zoom.ceil() as i32).min(0);
    if z < params.min_zoom {
        return Vec::new();
    }

    let scale = params.tile_size as f64 * 2f64.powi(-z);
    let grid_x = (params.image_width as f64 / scale).ceil() as i64;
    let grid_y = (params.image_height as f64 / scale).ceil() as i64;

    /*
        |  TILE  |  TILE  |  TILE  |
          |(left)                |(right)
        |(first_x)                |(last_x)
    */
    let first_x = ((params.bounds.left / scale).floor() as i64).max(0);
    let last_x = ((params.bounds.right / scale).ceil() as i64).max(0).min(grid_x);
    let first_y = ((params.bounds.top / scale).floor() as i64).max(0);
    let last_y = ((params.bounds.bottom / scale).ceil() as i64).max(0).min(grid_y);

    let mut tiles = Vec::new();
    for y in first_y..last_y {
        for x in first_x..last_x {
            tiles.push(TileCoord {
                x: x as u32,
                y: y as u32,
                z,
            });
        }
    }
    tiles
}

/// World-space bounds covered by one tile.
pub fn tile_bounds(coord: TileCoord, tile_size: u32) -> ViewportBounds {
    let scale = tile_size as f64 * 2f64.powi(-coord.z);
    ViewportBounds {
        left: coord.x as f64 * scale,
        top: coord.y as f64 * scale,
        right: (coord.x + 1) as f64 * scale,
        bottom: (coord.y + 1) as f64 * scale,
    }
}

// =============================================================================
// Tests
// =============================================================================
