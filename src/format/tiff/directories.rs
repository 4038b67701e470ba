//! Image-directory lookup with offset seeding and caching.
//!
//! Finding directory *n* in a TIFF normally means walking the next-IFD
//! chain from the start, one round trip per directory, painful when the
//! file lives behind a network transport. [`DirectoryIndex`] remembers
//! every offset it discovers, accepts a precomputed offset table to skip
//! the walk entirely, and keeps resolved directories in an LRU cache.
//!
//! Supplying offsets is a pure optimization: lookups behave identically
//! with or without them, including error cases; only latency differs.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::ifd::{Ifd, ImageDirectory};
use super::{TiffHeader, BIGTIFF_HEADER_SIZE};

/// Default number of resolved directories kept in memory.
pub const DEFAULT_DIRECTORY_CACHE_CAPACITY: usize = 64;

/// Safety limit on chain length (malformed files can cycle).
const MAX_DIRECTORIES: usize = 4096;

// =============================================================================
// DirectoryIndex
// =============================================================================

/// Offset table state: the offsets discovered so far, and whether the end
/// of the chain has been reached.
struct OffsetTable {
    offsets: Vec<u64>,
    complete: bool,
}

/// Lazily-walked, cached view of a TIFF file's directory chain.
pub struct DirectoryIndex<R> {
    reader: Arc<R>,
    header: TiffHeader,
    table: Mutex<OffsetTable>,
    cache: Mutex<LruCache<usize, Arc<ImageDirectory>>>,
}

impl<R: RangeReader> DirectoryIndex<R> {
    /// Open a TIFF file: parse its header and seed the offset table with
    /// the first directory.
    pub async fn open(reader: Arc<R>) -> Result<Self, TiffError> {
        let header_len = BIGTIFF_HEADER_SIZE.min(reader.size() as usize);
        let header_bytes = reader.read_exact_at(0, header_len).await?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;

        Ok(DirectoryIndex {
            reader,
            header,
            table: Mutex::new(OffsetTable {
                offsets: vec![header.first_directory_offset],
                complete: false,
            }),
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_DIRECTORY_CACHE_CAPACITY)
                    .expect("capacity is non-zero"),
            )),
        })
    }

    /// Seed the offset table with precomputed directory offsets.
    ///
    /// The table is taken as complete: directory count equals
    /// `offsets.len()` and no chain walking is performed.
    pub fn with_offsets(self, offsets: Vec<u64>) -> Self {
        debug!(
            source = self.reader.identifier(),
            count = offsets.len(),
            "seeding directory offsets"
        );
        DirectoryIndex {
            table: Mutex::new(OffsetTable {
                offsets,
                complete: true,
            }),
            ..self
        }
    }

    /// Replace the directory cache capacity.
    pub fn with_cache_capacity(self, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("clamped to at least 1");
        DirectoryIndex {
            cache: Mutex::new(LruCache::new(capacity)),
            ..self
        }
    }

    pub fn header(&self) -> &TiffHeader {
        &self.header
    }

    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }

    /// Resolve the image directory at `index`.
    pub async fn directory(&self, index: usize) -> Result<Arc<ImageDirectory>, TiffError> {
        if let Some(found) = self.cache.lock().await.get(&index) {
            return Ok(found.clone());
        }

        let offset = self.offset_of(index).await?;
        let ifd = Ifd::read_at(self.reader.as_ref(), offset, &self.header).await?;
        let directory =
            Arc::new(ImageDirectory::resolve(self.reader.as_ref(), &self.header, &ifd).await?);

        debug!(
            source = self.reader.identifier(),
            index,
            offset,
            width = directory.width,
            height = directory.height,
            "resolved image directory"
        );

        self.cache.lock().await.put(index, directory.clone());
        Ok(directory)
    }

    /// Find the byte offset of directory `index`, extending the known
    /// chain as needed.
    async fn offset_of(&self, index: usize) -> Result<u64, TiffError> {
        let mut table = self.table.lock().await;

        while index >= table.offsets.len() {
            if table.complete || table.offsets.len() >= MAX_DIRECTORIES {
                return Err(TiffError::DirectoryOutOfRange {
                    index,
                    count: table.offsets.len(),
                });
            }

            let last = *table.offsets.last().expect("table is never empty");
            let next = self.next_offset(last).await?;
            if next == 0 {
                table.complete = true;
            } else {
                if next >= self.reader.size() {
                    return Err(TiffError::InvalidDirectoryOffset(next));
                }
                table.offsets.push(next);
            }
        }

        Ok(table.offsets[index])
    }

    /// Read the next-directory pointer of the directory at `offset`
    /// without parsing its entries.
    async fn next_offset(&self, offset: u64) -> Result<u64, TiffError> {
        let header = &self.header;

        let count_bytes = self
            .reader
            .read_exact_at(offset, header.count_field_size())
            .await?;
        let entry_count = if header.is_bigtiff {
            header.byte_order.read_u64(&count_bytes)
        } else {
            header.byte_order.read_u16(&count_bytes) as u64
        };

        let pointer_at =
            offset + (header.count_field_size() + entry_count as usize * header.entry_size()) as u64;
        let pointer_bytes = self
            .reader
            .read_exact_at(pointer_at, header.offset_field_size())
            .await?;

        Ok(if header.is_bigtiff {
            header.byte_order.read_u64(&pointer_bytes)
        } else {
            header.byte_order.read_u32(&pointer_bytes) as u64
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
