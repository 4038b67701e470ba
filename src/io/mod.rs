//! I/O layer: byte-range access to backing stores.
//!
//! The TIFF pixel source never needs a whole file, only scattered byte
//! ranges (headers, directory entries, tile payloads). [`RangeReader`] is
//! the seam between the engine and whatever transport actually holds the
//! bytes; format-specific open routines supply an implementation at
//! construction time.
//!
//! [`MemoryReader`] serves fully in-memory images and is the reader used
//! throughout the test suite.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Trait for reading byte ranges from a backing resource.
///
/// Implementations must be thread-safe; many tile requests may read
/// concurrently. The engine imposes no concurrency cap on outstanding
/// reads beyond what the transport naturally throttles.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Returns an error if the range is out of bounds or the read fails.
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Total size of the resource in bytes.
    fn size(&self) -> u64;

    /// Unique identifier for this resource (for logging).
    fn identifier(&self) -> &str;
}

// =============================================================================
// MemoryReader
// =============================================================================

/// A [`RangeReader`] over bytes already in memory.
#[derive(Debug, Clone)]
pub struct MemoryReader {
    data: Bytes,
    identifier: String,
}

impl MemoryReader {
    pub fn new(data: impl Into<Bytes>, identifier: impl Into<String>) -> Self {
        MemoryReader {
            data: data.into(),
            identifier: identifier.into(),
        }
    }
}

#[async_trait]
impl RangeReader for MemoryReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let start = offset as usize;
        let end = start.checked_add(len).ok_or(IoError::RangeOutOfBounds {
            offset,
            requested: len as u64,
            size: self.data.len() as u64,
        })?;

        if end > self.data.len() {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.data.len() as u64,
            });
        }

        Ok(self.data.slice(start..end))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// Tests
// =============================================================================
