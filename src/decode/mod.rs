//! CPU-bound tile decoding, off the calling task.
//!
//! Decompressing a tile payload and swapping it into a typed buffer is
//! pure CPU work; doing it inline would stall the async runtime under
//! load. [`DecodePool`] runs [`DecodeJob`]s on the blocking thread pool,
//! gated by a semaphore so a fixed number execute at once. Pool size is
//! static configuration, not auto-scaled, and each pool is owned by the
//! pixel source that created it.
//!
//! A job receives only the buffer it was asked to decode and returns its
//! result; it never touches pixel-source state, so no locking is needed
//! inside the pool, and one failed job reports an error for that request
//! only.

use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use flate2::read::ZlibDecoder;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::{TiffError, TileError};
use crate::format::tiff::ByteOrder;
use crate::meta::PixelType;
use crate::source::PixelData;

/// Default number of concurrent decode workers.
pub const DEFAULT_DECODE_WORKERS: usize = 4;

// =============================================================================
// Compression
// =============================================================================

/// Tile compression schemes the decode facility can handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Uncompressed samples
    None,
    /// Zlib/Deflate (compression tags 8 and 32946)
    Deflate,
    /// Baseline JPEG (tag 7), 8-bit samples only
    Jpeg,
}

impl Compression {
    /// Map a raw TIFF compression tag value.
    pub fn from_tag(raw: u16) -> Result<Compression, TiffError> {
        match raw {
            1 => Ok(Compression::None),
            7 => Ok(Compression::Jpeg),
            8 | 32946 => Ok(Compression::Deflate),
            other => Err(TiffError::UnsupportedCompression(other)),
        }
    }
}

// =============================================================================
// DecodeJob
// =============================================================================

/// One self-contained decode: decompress a tile payload and convert it
/// into a typed sample buffer honoring the file's byte order.
#[derive(Debug, Clone)]
pub struct DecodeJob {
    pub payload: Bytes,
    pub compression: Compression,
    pub byte_order: ByteOrder,
    pub pixel_type: PixelType,
}

impl DecodeJob {
    /// Run the decode synchronously.
    ///
    /// Called directly when no pool is configured; behavior is identical
    /// either way, only the executing thread differs.
    pub fn run(self) -> Result<PixelData, TileError> {
        let raw = match self.compression {
            Compression::None => self.payload.to_vec(),
            Compression::Deflate => {
                let mut out = Vec::new();
                ZlibDecoder::new(&self.payload[..])
                    .read_to_end(&mut out)
                    .map_err(|e| TileError::DecodeJob(format!("deflate: {e}")))?;
                out
            }
            Compression::Jpeg => {
                if self.pixel_type != PixelType::Uint8 {
                    return Err(TileError::DecodeJob(format!(
                        "JPEG tiles carry 8-bit samples, image declares {:?}",
                        self.pixel_type
                    )));
                }
                image::load_from_memory_with_format(&self.payload, image::ImageFormat::Jpeg)
                    .map_err(|e| TileError::DecodeJob(format!("jpeg: {e}")))?
                    .into_bytes()
            }
        };

        self.into_samples(raw)
    }

    fn into_samples(self, raw: Vec<u8>) -> Result<PixelData, TileError> {
        let sample_size = self.pixel_type.bytes_per_sample();
        if raw.len() % sample_size != 0 {
            return Err(TileError::DecodeJob(format!(
                "decoded payload of {} bytes is not a whole number of {sample_size}-byte samples",
                raw.len()
            )));
        }

        let bo = self.byte_order;
        let data = match self.pixel_type {
            PixelType::Uint8 => PixelData::Uint8(raw),
            PixelType::Uint16 => {
                PixelData::Uint16(raw.chunks_exact(2).map(|c| bo.read_u16(c)).collect())
            }
            PixelType::Uint32 => {
                PixelData::Uint32(raw.chunks_exact(4).map(|c| bo.read_u32(c)).collect())
            }
            PixelType::Float32 => PixelData::Float32(
                raw.chunks_exact(4)
                    .map(|c| f32::from_bits(bo.read_u32(c)))
                    .collect(),
            ),
        };

        Ok(data)
    }
}

// =============================================================================
// DecodePool
// =============================================================================

/// Fixed-size pool of decode workers.
#[derive(Debug, Clone)]
pub struct DecodePool {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl DecodePool {
    /// Create a pool running at most `workers` decodes concurrently.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        DecodePool {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Submit a job and await its result.
    ///
    /// Jobs queue when all workers are busy. A failed job surfaces an
    /// error for this call only; the pool and other in-flight jobs are
    /// unaffected.
    pub async fn decode(&self, job: DecodeJob) -> Result<PixelData, TileError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TileError::DecodeJob("decode pool is closed".to_string()))?;

        let payload_len = job.payload.len();
        let handle = tokio::task::spawn_blocking(move || {
            let result = job.run();
            drop(permit);
            result
        });

        match handle.await {
            Ok(Ok(data)) => {
                debug!(payload_len, samples = data.len(), "decoded tile");
                Ok(data)
            }
            Ok(Err(e)) => {
                warn!(payload_len, error = %e, "decode job failed");
                Err(e)
            }
            Err(join) => Err(TileError::DecodeJob(format!("decode worker died: {join}"))),
        }
    }
}

impl Default for DecodePool {
    fn default() -> Self {
        DecodePool::new(DEFAULT_DECODE_WORKERS)
    }
}

// =============================================================================
// Tests
// =============================================================================
