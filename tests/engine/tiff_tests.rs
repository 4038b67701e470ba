//! End-to-end tests for the tiled-image pixel source.

use std::sync::Arc;

use ome_tiler::{
    ImageMetadata, MemoryReader, MetadataError, PixelData, PixelSource, RasterRequest, Selection,
    TiffPixelSource, TiffSourceOptions, TileError, TileRequest,
};

use super::test_utils::{
    init_tracing, metadata, ome_xml, sample_value, synthetic_plane, TiffFixture, TrackingReader,
};

const TILE: u32 = 16;

/// Two-channel, two-level pyramid (plane-major per level), with the
/// OME-XML carried in the first directory's ImageDescription.
fn pyramid_fixture(width: u32, height: u32, deflate: bool) -> TiffFixture {
    let planes = vec![
        synthetic_plane(0, width, height),
        synthetic_plane(1, width, height),
        synthetic_plane(0, width / 2, height / 2),
        synthetic_plane(1, width / 2, height / 2),
    ];
    let mut fixture = TiffFixture::new(planes, TILE);
    fixture.deflate = deflate;
    fixture.description = Some(ome_xml(2, width, height));
    fixture
}

async fn open_pyramid(width: u32, height: u32, deflate: bool) -> TiffPixelSource<MemoryReader> {
    init_tracing();
    let (data, _) = pyramid_fixture(width, height, deflate).build();
    let reader = Arc::new(MemoryReader::new(data, "mem://pyramid.ome.tif"));
    TiffPixelSource::open(reader, metadata(2, width as usize, height as usize), 2)
        .await
        .expect("fixture opens")
}

#[tokio::test]
async fn metadata_recovered_from_image_description() {
    let (data, _) = pyramid_fixture(64, 48, false).build();
    let reader = Arc::new(MemoryReader::new(data, "mem://desc.ome.tif"));

    // Read the description straight from the first directory, the way an
    // open routine bootstraps an OME-TIFF
    let directories = ome_tiler::DirectoryIndex::open(reader.clone()).await.unwrap();
    let base = directories.directory(0).await.unwrap();
    let xml = base.description.clone().expect("description present");

    let pixels = ome_tiler::omexml::parse(&xml).unwrap();
    let meta = ImageMetadata::from_ome(&pixels).unwrap();

    assert_eq!(meta.shape(), vec![1, 2, 1, 48, 64]);
    assert_eq!(
        meta.channel_names().unwrap(),
        &["ch0".to_string(), "ch1".to_string()]
    );
    assert_eq!(meta.physical_sizes().unwrap().x.size, 0.5);

    // And the source opens with exactly that metadata
    let source = TiffPixelSource::open(reader, meta, 2).await.unwrap();
    assert_eq!(source.tile_size(), TILE);
    assert_eq!(source.level_count(), 2);
}

#[tokio::test]
async fn tiles_across_levels_and_channels() {
    let source = open_pyramid(64, 48, false).await;

    // Level 0, channel 1, interior tile
    let request = TileRequest::new(1, 1, 0).with_selection(Selection::new().with("c", "ch1"));
    let tile = source.get_tile(&request).await.unwrap();
    assert_eq!((tile.width, tile.height), (16, 16));
    match &tile.data[0] {
        PixelData::Uint16(values) => {
            assert_eq!(values[0], sample_value(1, 16, 16));
            assert_eq!(values[16 * 16 - 1], sample_value(1, 31, 31));
        }
        other => panic!("expected uint16, got {other:?}"),
    }

    // Level 1 (z = -1), channel 0: the 32x24 plane
    let request = TileRequest::new(0, 0, -1).with_selection(Selection::new().with("c", 0usize));
    let tile = source.get_tile(&request).await.unwrap();
    assert_eq!((tile.width, tile.height), (16, 16));
    match &tile.data[0] {
        PixelData::Uint16(values) => assert_eq!(values[0], sample_value(0, 0, 0)),
        other => panic!("expected uint16, got {other:?}"),
    }
}

#[tokio::test]
async fn edge_tiles_clip_to_image_extent() {
    // 40x30: right column 8 wide, bottom row 14 tall
    let source = open_pyramid(40, 30, false).await;

    let tile = source.get_tile(&TileRequest::new(2, 0, 0)).await.unwrap();
    assert_eq!((tile.width, tile.height), (8, 16));

    let corner = source.get_tile(&TileRequest::new(2, 1, 0)).await.unwrap();
    assert_eq!((corner.width, corner.height), (8, 14));
    assert_eq!(corner.data[0].len(), 8 * 14);

    match &corner.data[0] {
        PixelData::Uint16(values) => {
            // Last sample is the image's bottom-right pixel
            assert_eq!(values[8 * 14 - 1], sample_value(0, 29, 39));
        }
        other => panic!("expected uint16, got {other:?}"),
    }
}

#[tokio::test]
async fn raster_matches_assembled_tiles() {
    let source = open_pyramid(40, 30, false).await;
    let selection = Selection::new().with("c", 1usize);

    let raster = source
        .get_raster(&RasterRequest::new(0).with_selection(selection.clone()))
        .await
        .unwrap();
    assert_eq!((raster.width, raster.height), (40, 30));

    let expected: Vec<u16> = (0..30)
        .flat_map(|y| (0..40).map(move |x| sample_value(1, y, x)))
        .collect();
    assert_eq!(raster.data[0], PixelData::Uint16(expected));
}

#[tokio::test]
async fn deflate_tiles_decode_through_the_pool() {
    let (data, _) = pyramid_fixture(64, 48, true).build();
    let reader = Arc::new(MemoryReader::new(data, "mem://deflate.ome.tif"));
    let source = TiffPixelSource::open_with(
        reader,
        metadata(2, 64, 48),
        2,
        TiffSourceOptions {
            decode_workers: Some(3),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    // Many concurrent requests exercise the bounded pool
    let mut handles = Vec::new();
    let source = Arc::new(source);
    for y in 0..3u32 {
        for x in 0..4u32 {
            let source = source.clone();
            handles.push(tokio::spawn(async move {
                source.get_tile(&TileRequest::new(x, y, 0)).await
            }));
        }
    }

    for handle in handles {
        let tile = handle.await.expect("task completes").expect("tile decodes");
        assert!(tile.width <= TILE && tile.height <= TILE);
        assert_eq!(
            tile.data[0].len(),
            tile.width as usize * tile.height as usize
        );
    }
}

#[tokio::test]
async fn compressed_and_uncompressed_reads_agree() {
    let plain = open_pyramid(40, 30, false).await;

    let (data, _) = pyramid_fixture(40, 30, true).build();
    let reader = Arc::new(MemoryReader::new(data, "mem://deflate.ome.tif"));
    let compressed = TiffPixelSource::open_with(
        reader,
        metadata(2, 40, 30),
        2,
        TiffSourceOptions {
            decode_workers: Some(2),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    for (x, y, z) in [(0, 0, 0), (2, 1, 0), (1, 0, -1)] {
        let request =
            TileRequest::new(x, y, z).with_selection(Selection::new().with("c", 1usize));
        assert_eq!(
            plain.get_tile(&request).await.unwrap(),
            compressed.get_tile(&request).await.unwrap(),
            "tile ({x}, {y}, {z}) must not depend on compression"
        );
    }
}

#[tokio::test]
async fn precomputed_offsets_change_latency_not_behavior() {
    let (data, offsets) = pyramid_fixture(64, 48, false).build();
    let meta = metadata(2, 64, 48);

    let walked = TiffPixelSource::open(
        Arc::new(MemoryReader::new(data.clone(), "mem://walked")),
        meta.clone(),
        2,
    )
    .await
    .unwrap();

    let seeded = TiffPixelSource::open_with(
        Arc::new(MemoryReader::new(data, "mem://seeded")),
        meta,
        2,
        TiffSourceOptions {
            directory_offsets: Some(offsets),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let request = TileRequest::new(1, 2, 0).with_selection(Selection::new().with("c", "ch1"));
    assert_eq!(
        walked.get_tile(&request).await.unwrap(),
        seeded.get_tile(&request).await.unwrap()
    );

    // Out-of-range levels fail identically
    let request = TileRequest::new(0, 0, -5);
    assert!(matches!(
        walked.get_tile(&request).await,
        Err(TileError::InvalidLevel { .. })
    ));
    assert!(matches!(
        seeded.get_tile(&request).await,
        Err(TileError::InvalidLevel { .. })
    ));
}

#[tokio::test]
async fn seeded_offsets_reduce_request_traffic() {
    init_tracing();
    let (data, offsets) = pyramid_fixture(64, 48, false).build();
    let meta = metadata(2, 64, 48);

    // The last directory in the chain is the most expensive to reach by
    // walking; request a tile from it both ways.
    let request = TileRequest::new(0, 0, -1).with_selection(Selection::new().with("c", "ch1"));

    let walked_reader = Arc::new(TrackingReader::new(data.clone(), "mem://walked"));
    let walked = TiffPixelSource::open(walked_reader.clone(), meta.clone(), 2)
        .await
        .unwrap();
    let walked_tile = walked.get_tile(&request).await.unwrap();
    let walked_reads = walked_reader.reads();

    let seeded_reader = Arc::new(TrackingReader::new(data, "mem://seeded"));
    let seeded = TiffPixelSource::open_with(
        seeded_reader.clone(),
        meta,
        2,
        TiffSourceOptions {
            directory_offsets: Some(offsets),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let seeded_tile = seeded.get_tile(&request).await.unwrap();
    let seeded_reads = seeded_reader.reads();

    assert_eq!(walked_tile, seeded_tile, "results must be identical");
    assert!(
        seeded_reads < walked_reads,
        "offsets must skip chain traversal ({seeded_reads} vs {walked_reads} reads)"
    );
}

#[tokio::test]
async fn per_request_errors_do_not_poison_the_source() {
    let source = open_pyramid(64, 48, false).await;

    let bad_dim = TileRequest::new(0, 0, 0).with_selection(Selection::new().with("w", 0usize));
    assert!(matches!(
        source.get_tile(&bad_dim).await,
        Err(TileError::Selection(_))
    ));

    let bad_value =
        TileRequest::new(0, 0, 0).with_selection(Selection::new().with("c", "missing"));
    assert!(matches!(
        source.get_tile(&bad_value).await,
        Err(TileError::Selection(_))
    ));

    let out_of_grid = TileRequest::new(40, 0, 0);
    assert!(matches!(
        source.get_tile(&out_of_grid).await,
        Err(TileError::TileOutOfBounds { .. })
    ));

    // The source still serves valid requests afterwards
    assert!(source.get_tile(&TileRequest::new(0, 0, 0)).await.is_ok());
}

#[tokio::test]
async fn construction_validates_against_backing_file() {
    let (data, _) = pyramid_fixture(64, 48, false).build();

    // Declared extent disagrees with the file
    let err = TiffPixelSource::open(
        Arc::new(MemoryReader::new(data, "mem://mismatch")),
        metadata(2, 128, 48),
        2,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, MetadataError::DimensionMismatch { .. }));
}
