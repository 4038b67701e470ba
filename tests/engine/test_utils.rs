//! Shared fixtures: synthetic OME-TIFF files, chunked-store pyramids, and
//! a request-tracking reader for cache-behavior assertions.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use async_trait::async_trait;
use bytes::Bytes;
use flate2::write::ZlibEncoder;

use ome_tiler::{
    ChunkedArray, DimLabel, Dimension, ImageMetadata, IoError, MemoryArray, MemoryReader,
    PixelData, PixelType, RangeReader,
};

static TRACING: Once = Once::new();

/// Route engine logs through `RUST_LOG` for test debugging.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

// =============================================================================
// Tracking reader
// =============================================================================

/// A range reader that counts every read it serves.
///
/// Useful for verifying that optimizations (precomputed offsets, the
/// directory cache) actually reduce request traffic.
pub struct TrackingReader {
    inner: MemoryReader,
    reads: AtomicUsize,
}

impl TrackingReader {
    pub fn new(data: Vec<u8>, identifier: &str) -> Self {
        TrackingReader {
            inner: MemoryReader::new(data, identifier),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RangeReader for TrackingReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_exact_at(offset, len).await
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}

// =============================================================================
// Synthetic planes
// =============================================================================

/// One 2-D plane of a synthetic image.
pub struct PlaneSpec {
    pub width: u32,
    pub height: u32,
    pub samples: Vec<u16>,
}

/// Build a plane whose sample values encode `(seed, y, x)` so any read
/// can be checked against the formula.
pub fn synthetic_plane(seed: usize, width: u32, height: u32) -> PlaneSpec {
    let samples = (0..height)
        .flat_map(|y| (0..width).map(move |x| sample_value(seed, y, x)))
        .collect();
    PlaneSpec {
        width,
        height,
        samples,
    }
}

/// The expected value at `(y, x)` of the plane with `seed`.
pub fn sample_value(seed: usize, y: u32, x: u32) -> u16 {
    (seed * 10000 + (y * 100 + x) as usize) as u16
}

// =============================================================================
// TIFF fixture
// =============================================================================

/// Serializes planes as a little-endian classic TIFF: one tiled uint16
/// directory per plane, chained in order (all planes of level 0, then all
/// planes of level 1, ...).
pub struct TiffFixture {
    pub planes: Vec<PlaneSpec>,
    pub tile_size: u32,
    /// Deflate-compress every tile payload (compression tag 8)
    pub deflate: bool,
    /// ImageDescription for the first directory (carries OME-XML)
    pub description: Option<String>,
}

impl TiffFixture {
    pub fn new(planes: Vec<PlaneSpec>, tile_size: u32) -> Self {
        TiffFixture {
            planes,
            tile_size,
            deflate: false,
            description: None,
        }
    }

    /// Build the file. Returns the bytes and every directory's offset.
    pub fn build(&self) -> (Vec<u8>, Vec<u64>) {
        let ts = self.tile_size;
        let mut file = vec![0u8; 8];
        file[0..4].copy_from_slice(&[0x49, 0x49, 0x2A, 0x00]);

        struct DirLayout {
            width: u32,
            height: u32,
            tile_offsets: Vec<u32>,
            tile_byte_counts: Vec<u32>,
        }

        // Tile payloads, padded to full tiles
        let mut layouts = Vec::new();
        for plane in &self.planes {
            let tiles_x = plane.width.div_ceil(ts);
            let tiles_y = plane.height.div_ceil(ts);
            let mut tile_offsets = Vec::new();
            let mut tile_byte_counts = Vec::new();

            for ty in 0..tiles_y {
                for tx in 0..tiles_x {
                    let mut raw = Vec::with_capacity((ts * ts * 2) as usize);
                    for local_y in 0..ts {
                        for local_x in 0..ts {
                            let y = ty * ts + local_y;
                            let x = tx * ts + local_x;
                            let value = if y < plane.height && x < plane.width {
                                plane.samples[(y * plane.width + x) as usize]
                            } else {
                                0
                            };
                            raw.extend_from_slice(&value.to_le_bytes());
                        }
                    }

                    let payload = if self.deflate {
                        let mut encoder =
                            ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                        encoder.write_all(&raw).expect("in-memory write");
                        encoder.finish().expect("in-memory finish")
                    } else {
                        raw
                    };

                    tile_offsets.push(file.len() as u32);
                    tile_byte_counts.push(payload.len() as u32);
                    file.extend_from_slice(&payload);
                }
            }

            layouts.push(DirLayout {
                width: plane.width,
                height: plane.height,
                tile_offsets,
                tile_byte_counts,
            });
        }

        // Description bytes, NUL-terminated
        let description_at = file.len() as u32;
        let description_len = self.description.as_ref().map(|d| {
            file.extend_from_slice(d.as_bytes());
            file.push(0);
            d.len() as u32 + 1
        });

        // Directory chain; each previous next-pointer is patched once the
        // following directory's offset is known
        let compression: u32 = if self.deflate { 8 } else { 1 };
        let mut directory_offsets = Vec::new();
        let mut prev_pointer_at: Option<usize> = None;

        for (i, layout) in layouts.iter().enumerate() {
            let count = layout.tile_offsets.len() as u32;

            let offsets_at = file.len() as u32;
            if count > 1 {
                for v in &layout.tile_offsets {
                    file.extend_from_slice(&v.to_le_bytes());
                }
            }
            let counts_at = file.len() as u32;
            if count > 1 {
                for v in &layout.tile_byte_counts {
                    file.extend_from_slice(&v.to_le_bytes());
                }
            }

            if let Some(at) = prev_pointer_at.take() {
                let here = file.len() as u32;
                file[at..at + 4].copy_from_slice(&here.to_le_bytes());
            }
            directory_offsets.push(file.len() as u64);

            let mut entries: Vec<(u16, u16, u32, u32)> = vec![
                (256, 4, 1, layout.width),
                (257, 4, 1, layout.height),
                (258, 3, 1, 16),
                (259, 3, 1, compression),
                (277, 3, 1, 1),
                (322, 3, 1, ts),
                (323, 3, 1, ts),
                (339, 3, 1, 1),
            ];
            if count > 1 {
                entries.push((324, 4, count, offsets_at));
                entries.push((325, 4, count, counts_at));
            } else {
                entries.push((324, 4, 1, layout.tile_offsets[0]));
                entries.push((325, 4, 1, layout.tile_byte_counts[0]));
            }
            if i == 0 {
                if let Some(len) = description_len {
                    entries.push((270, 2, len, description_at));
                }
            }
            entries.sort_by_key(|e| e.0);

            file.extend_from_slice(&(entries.len() as u16).to_le_bytes());
            for (tag, typ, value_count, value) in entries {
                file.extend_from_slice(&tag.to_le_bytes());
                file.extend_from_slice(&typ.to_le_bytes());
                file.extend_from_slice(&value_count.to_le_bytes());
                file.extend_from_slice(&value.to_le_bytes());
            }
            prev_pointer_at = Some(file.len());
            file.extend_from_slice(&0u32.to_le_bytes());
        }

        file[4..8].copy_from_slice(&(directory_offsets[0] as u32).to_le_bytes());
        (file, directory_offsets)
    }
}

// =============================================================================
// Metadata fixtures
// =============================================================================

/// OME-XML for a `c`-channel uint16 image with DimensionOrder XYZCT.
pub fn ome_xml(c: usize, width: u32, height: u32) -> String {
    let channels: String = (0..c)
        .map(|i| format!(r#"<Channel ID="Channel:0:{i}" Name="ch{i}"/>"#))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OME xmlns="http://www.openmicroscopy.org/Schemas/OME/2016-06">
  <Image ID="Image:0">
    <Pixels ID="Pixels:0" DimensionOrder="XYZCT" Type="uint16"
            SizeX="{width}" SizeY="{height}" SizeZ="1" SizeC="{c}" SizeT="1"
            PhysicalSizeX="0.5" PhysicalSizeXUnit="µm"
            PhysicalSizeY="0.5" PhysicalSizeYUnit="µm">{channels}</Pixels>
  </Image>
</OME>"#
    )
}

/// Canonical t/c/z/y/x metadata with named channels.
pub fn metadata(c: usize, width: usize, height: usize) -> ImageMetadata {
    ImageMetadata::new(
        vec![
            Dimension::new(DimLabel::T, 1),
            Dimension::with_values(DimLabel::C, (0..c).map(|i| format!("ch{i}")).collect()),
            Dimension::new(DimLabel::Z, 1),
            Dimension::new(DimLabel::Y, height),
            Dimension::new(DimLabel::X, width),
        ],
        PixelType::Uint16,
        None,
        false,
    )
    .expect("valid test metadata")
}

// =============================================================================
// Chunked-store fixtures
// =============================================================================

/// Build a factor-of-two pyramid of in-memory chunked arrays with shape
/// `[1, c, 1, height, width]` at the base and square `tile` chunks.
pub fn chunked_pyramid(
    c: usize,
    width: u32,
    height: u32,
    levels: usize,
    tile: usize,
) -> Vec<Arc<dyn ChunkedArray>> {
    (0..levels)
        .map(|level| {
            let w = (width >> level).max(1);
            let h = (height >> level).max(1);
            let samples: Vec<u16> = (0..c)
                .flat_map(|ci| {
                    (0..h).flat_map(move |y| (0..w).map(move |x| sample_value(ci, y, x)))
                })
                .collect();
            let array = MemoryArray::new(
                vec![1, c, 1, h as usize, w as usize],
                vec![1, 1, 1, tile, tile],
                PixelData::Uint16(samples),
            )
            .expect("valid test array");
            Arc::new(array) as Arc<dyn ChunkedArray>
        })
        .collect()
}
