//! Viewport tiling and channel padding driving real pixel sources.

use std::collections::HashMap;
use std::sync::Arc;

use ome_tiler::{
    pad_channels, tiles_for_viewport, PadChannelsParams, PixelSource, Selection, TileCoord,
    TileRequest, TilingParams, ViewportBounds, ZarrPixelSource, MAX_CHANNELS,
};

use super::test_utils::{chunked_pyramid, metadata};

fn open_source(c: usize, width: u32, height: u32, levels: usize) -> ZarrPixelSource {
    let pyramid = chunked_pyramid(c, width, height, levels, 16);
    ZarrPixelSource::new(pyramid, metadata(c, width as usize, height as usize)).unwrap()
}

fn covering_params(source: &ZarrPixelSource, zoom: f64) -> TilingParams {
    let shape = source.shape();
    TilingParams {
        bounds: ViewportBounds::new(0.0, 0.0, shape[4] as f64, shape[3] as f64),
        zoom,
        min_zoom: -(source.level_count() as i32 - 1),
        tile_size: source.tile_size(),
        image_width: shape[4] as u32,
        image_height: shape[3] as u32,
    }
}

#[tokio::test]
async fn enumerated_tiles_all_fetch() {
    let source = open_source(2, 64, 48, 3);

    for zoom in [0.0, -1.0, -2.0] {
        let tiles = tiles_for_viewport(&covering_params(&source, zoom));
        assert!(!tiles.is_empty(), "zoom {zoom} enumerates tiles");

        for coord in tiles {
            let request = TileRequest::new(coord.x, coord.y, coord.z)
                .with_selection(Selection::new().with("c", 1usize));
            let tile = source.get_tile(&request).await.unwrap_or_else(|e| {
                panic!("tile {coord:?} from the sanctioned enumeration must fetch: {e}")
            });
            assert!(tile.width >= 1 && tile.width <= source.tile_size());
            assert!(tile.height >= 1 && tile.height <= source.tile_size());
        }
    }
}

#[tokio::test]
async fn zoom_below_pyramid_yields_no_requests() {
    let source = open_source(1, 64, 48, 2);
    let tiles = tiles_for_viewport(&covering_params(&source, -2.0));
    assert!(tiles.is_empty(), "zoom past min_zoom requests nothing");
}

#[tokio::test]
async fn out_of_order_completion_keys_by_coordinate() {
    let source = Arc::new(open_source(1, 64, 64, 1));
    let tiles = tiles_for_viewport(&covering_params(&source, 0.0));

    // Fire all requests concurrently; completion order is unspecified, so
    // results are keyed by coordinate, never by request sequence.
    let mut handles = Vec::new();
    for coord in tiles.iter().copied() {
        let source = source.clone();
        handles.push(tokio::spawn(async move {
            let tile = source
                .get_tile(&TileRequest::new(coord.x, coord.y, coord.z))
                .await?;
            Ok::<(TileCoord, u32, u32), ome_tiler::TileError>((coord, tile.width, tile.height))
        }));
    }

    let mut by_coord: HashMap<TileCoord, (u32, u32)> = HashMap::new();
    for handle in handles {
        let (coord, width, height) = handle.await.unwrap().unwrap();
        by_coord.insert(coord, (width, height));
    }

    assert_eq!(by_coord.len(), tiles.len());
    for coord in tiles {
        assert_eq!(by_coord[&coord], (16, 16));
    }
}

#[tokio::test]
async fn padded_channel_state_matches_source() {
    let source = open_source(2, 32, 32, 1);
    let names = source.metadata().channel_names().unwrap();
    assert_eq!(names.len(), 2);

    let sliders = vec![[0.0f32, 1000.0]; names.len()];
    let colors = vec![[0u8, 255, 255], [255, 0, 255]];
    let on = vec![true; names.len()];

    let padded = pad_channels(&PadChannelsParams::new(
        &sliders,
        &colors,
        &on,
        source.pixel_type(),
    ));

    // The display layer always receives full-capacity arrays
    assert_eq!(padded.slider_values.len(), MAX_CHANNELS);
    assert_eq!(padded.color_values.len(), MAX_CHANNELS);
    assert_eq!(padded.slider_values[0], [0.0, 1000.0]);
    assert_eq!(padded.color_values[1], [1.0, 0.0, 1.0]);
    // Undeclared slots read as transparent black
    assert_eq!(padded.slider_values[4], [65535.0, 65535.0]);
    assert_eq!(padded.color_values[4], [0.0, 0.0, 0.0]);
}
