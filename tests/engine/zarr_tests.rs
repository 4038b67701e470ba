//! End-to-end tests for the chunked-array pixel source.

use std::sync::Arc;

use ome_tiler::{
    multiscales, ChunkedArray, DimLabel, Dimension, ImageMetadata, MemoryArray, PixelData,
    PixelSource, RasterRequest, Selection, TileError, TileRequest, ZarrPixelSource,
};

use super::test_utils::{chunked_pyramid, metadata, sample_value};

#[tokio::test]
async fn pyramid_reads_through_the_common_contract() {
    let levels = chunked_pyramid(3, 64, 48, 3, 16);
    let source = ZarrPixelSource::new(levels, metadata(3, 64, 48)).unwrap();

    assert_eq!(source.tile_size(), 16);
    assert_eq!(source.level_count(), 3);
    assert_eq!(source.shape(), &[1, 3, 1, 48, 64]);

    // Same request shape as the TIFF variant
    let request = TileRequest::new(1, 1, 0).with_selection(Selection::new().with("c", "ch2"));
    let tile = source.get_tile(&request).await.unwrap();
    assert_eq!((tile.width, tile.height), (16, 16));
    match &tile.data[0] {
        PixelData::Uint16(values) => assert_eq!(values[0], sample_value(2, 16, 16)),
        other => panic!("expected uint16, got {other:?}"),
    }

    // Coarsest level is a single clipped tile (16x12)
    let tile = source.get_tile(&TileRequest::new(0, 0, -2)).await.unwrap();
    assert_eq!((tile.width, tile.height), (16, 12));
}

#[tokio::test]
async fn repeated_reads_are_bit_identical() {
    let levels = chunked_pyramid(2, 32, 32, 1, 16);
    let source = ZarrPixelSource::new(levels, metadata(2, 32, 32)).unwrap();

    let request = TileRequest::new(1, 0, 0).with_selection(Selection::new().with("c", 1usize));
    let first = source.get_tile(&request).await.unwrap();
    let second = source.get_tile(&request).await.unwrap();
    assert_eq!(first, second, "no hidden mutation of the backing store");
}

#[tokio::test]
async fn named_and_positional_selection_agree() {
    let levels = chunked_pyramid(3, 32, 32, 1, 16);
    let source = ZarrPixelSource::new(levels, metadata(3, 32, 32)).unwrap();

    let by_name = TileRequest::new(0, 0, 0).with_selection(Selection::new().with("c", "ch1"));
    let by_index = TileRequest::new(0, 0, 0).with_selection(Selection::new().with("c", 1usize));

    assert_eq!(
        source.get_tile(&by_name).await.unwrap(),
        source.get_tile(&by_index).await.unwrap()
    );
}

#[tokio::test]
async fn raster_selects_one_plane() {
    let levels = chunked_pyramid(2, 32, 24, 1, 16);
    let source = ZarrPixelSource::new(levels, metadata(2, 32, 24)).unwrap();

    let raster = source
        .get_raster(&RasterRequest::new(0).with_selection(Selection::new().with("c", 1usize)))
        .await
        .unwrap();

    assert_eq!((raster.width, raster.height), (32, 24));
    let expected: Vec<u16> = (0..24)
        .flat_map(|y| (0..32).map(move |x| sample_value(1, y, x)))
        .collect();
    assert_eq!(raster.data[0], PixelData::Uint16(expected));
}

#[tokio::test]
async fn channels_sharing_a_chunk_split_per_channel() {
    // One chunk spans all three channels
    let samples: Vec<u16> = (0..3)
        .flat_map(|ci| (0..16u32).flat_map(move |y| (0..16u32).map(move |x| sample_value(ci, y, x))))
        .collect();
    let array = MemoryArray::new(
        vec![1, 3, 1, 16, 16],
        vec![1, 3, 1, 16, 16],
        PixelData::Uint16(samples),
    )
    .unwrap();

    let source = ZarrPixelSource::new(
        vec![Arc::new(array) as Arc<dyn ChunkedArray>],
        metadata(3, 16, 16),
    )
    .unwrap();

    let tile = source.get_tile(&TileRequest::new(0, 0, 0)).await.unwrap();
    assert_eq!(tile.data.len(), 3, "one buffer per channel in the chunk");
    for (ci, channel) in tile.data.iter().enumerate() {
        match channel {
            PixelData::Uint16(values) => {
                assert_eq!(values[0], sample_value(ci, 0, 0));
                assert_eq!(values[255], sample_value(ci, 15, 15));
            }
            other => panic!("expected uint16, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn interleaved_rgb_stays_interleaved() {
    // (1, y, x, 3) RGB: value pattern r=y, g=x, b=0
    let height = 8usize;
    let width = 8usize;
    let samples: Vec<u8> = (0..height)
        .flat_map(|y| (0..width).flat_map(move |x| [y as u8, x as u8, 0]))
        .collect();
    let array = MemoryArray::new(
        vec![1, height, width, 3],
        vec![1, 4, 4, 3],
        PixelData::Uint8(samples),
    )
    .unwrap();

    let meta = ImageMetadata::new(
        vec![
            Dimension::new(DimLabel::C, 1),
            Dimension::new(DimLabel::Y, height),
            Dimension::new(DimLabel::X, width),
            Dimension::new(DimLabel::Samples, 3),
        ],
        ome_tiler::PixelType::Uint8,
        None,
        true,
    )
    .unwrap();

    let source =
        ZarrPixelSource::new(vec![Arc::new(array) as Arc<dyn ChunkedArray>], meta).unwrap();
    assert_eq!(source.tile_size(), 4);

    let tile = source.get_tile(&TileRequest::new(1, 0, 0)).await.unwrap();
    assert_eq!((tile.width, tile.height), (4, 4));
    assert_eq!(tile.data.len(), 1, "interleaved samples are never split");
    assert_eq!(tile.data[0].len(), 4 * 4 * 3);
    match &tile.data[0] {
        PixelData::Uint8(values) => {
            // First pixel of the tile is image pixel (y=0, x=4)
            assert_eq!(&values[0..3], &[0, 4, 0]);
        }
        other => panic!("expected uint8, got {other:?}"),
    }
}

#[tokio::test]
async fn selection_errors_are_recoverable() {
    let levels = chunked_pyramid(2, 32, 32, 1, 16);
    let source = ZarrPixelSource::new(levels, metadata(2, 32, 32)).unwrap();

    let bad = TileRequest::new(0, 0, 0).with_selection(Selection::new().with("c", 7usize));
    assert!(matches!(
        source.get_tile(&bad).await,
        Err(TileError::Selection(_))
    ));
    assert!(source.get_tile(&TileRequest::new(0, 0, 0)).await.is_ok());
}

#[test]
fn multiscale_manifest_drives_level_paths() {
    let raw = br#"{
        "multiscales": [
            {"version": "0.1", "datasets": [{"path": "0"}, {"path": "1"}, {"path": "2"}]}
        ]
    }"#;
    let attrs = multiscales::parse(raw).unwrap();
    let paths = multiscales::resolution_paths(&attrs, "image.zarr");

    assert_eq!(paths, vec!["image.zarr/0", "image.zarr/1", "image.zarr/2"]);

    // One opened array per path, finest first, becomes the level list
    assert_eq!(paths.len(), 3);
}
