//! Tiled TIFF structure parsing.
//!
//! A pyramidal OME-TIFF is a chain of image directories (IFDs), one per
//! 2-D plane per resolution level. The engine reads only the directory
//! structure and individual tile payloads; it never loads whole files.
//!
//! Layout of the two header flavors:
//!
//! ```text
//! Classic TIFF (8 bytes)              BigTIFF (16 bytes)
//! 0-1  byte order ("II" / "MM")       0-1  byte order ("II" / "MM")
//! 2-3  version 42                     2-3  version 43
//! 4-7  first IFD offset (u32)         4-5  offset size (must be 8)
//!                                     6-7  reserved
//!                                     8-15 first IFD offset (u64)
//! ```

mod directories;
mod ifd;

pub use directories::{DirectoryIndex, DEFAULT_DIRECTORY_CACHE_CAPACITY};
pub use ifd::{FieldType, Ifd, IfdEntry, ImageDirectory};

use crate::error::TiffError;

/// Size of a classic TIFF header in bytes.
pub const TIFF_HEADER_SIZE: usize = 8;

/// Size of a BigTIFF header in bytes.
pub const BIGTIFF_HEADER_SIZE: usize = 16;

const MAGIC_LITTLE_ENDIAN: u16 = 0x4949; // "II"
const MAGIC_BIG_ENDIAN: u16 = 0x4D4D; // "MM"
const VERSION_TIFF: u16 = 42;
const VERSION_BIGTIFF: u16 = 43;

// =============================================================================
// ByteOrder
// =============================================================================

/// Byte order of all multi-byte values in a TIFF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// Read a u16 from the start of a byte slice.
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        let raw = [bytes[0], bytes[1]];
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(raw),
            ByteOrder::BigEndian => u16::from_be_bytes(raw),
        }
    }

    /// Read a u32 from the start of a byte slice.
    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        let raw = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(raw),
            ByteOrder::BigEndian => u32::from_be_bytes(raw),
        }
    }

    /// Read a u64 from the start of a byte slice.
    #[inline]
    pub fn read_u64(self, bytes: &[u8]) -> u64 {
        let raw = [
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ];
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(raw),
            ByteOrder::BigEndian => u64::from_be_bytes(raw),
        }
    }
}

// =============================================================================
// TiffHeader
// =============================================================================

/// Parsed TIFF file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    /// Byte order for all multi-byte values in the file
    pub byte_order: ByteOrder,

    /// Whether this is a BigTIFF file (64-bit offsets)
    pub is_bigtiff: bool,

    /// Offset of the first image directory
    pub first_directory_offset: u64,
}

impl TiffHeader {
    /// Parse a TIFF or BigTIFF header from raw bytes.
    ///
    /// `file_size` bounds the first directory offset; an offset at or past
    /// the end of the file is rejected here rather than failing later with
    /// a confusing read error.
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, TiffError> {
        if bytes.len() < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        let byte_order = match magic {
            MAGIC_LITTLE_ENDIAN => ByteOrder::LittleEndian,
            MAGIC_BIG_ENDIAN => ByteOrder::BigEndian,
            _ => return Err(TiffError::InvalidMagic(magic)),
        };

        let version = byte_order.read_u16(&bytes[2..4]);
        let (is_bigtiff, first_directory_offset) = match version {
            VERSION_TIFF => (false, byte_order.read_u32(&bytes[4..8]) as u64),
            VERSION_BIGTIFF => {
                if bytes.len() < BIGTIFF_HEADER_SIZE {
                    return Err(TiffError::FileTooSmall {
                        required: BIGTIFF_HEADER_SIZE as u64,
                        actual: bytes.len() as u64,
                    });
                }
                let offset_size = byte_order.read_u16(&bytes[4..6]);
                if offset_size != 8 {
                    return Err(TiffError::InvalidBigTiffOffsetSize(offset_size));
                }
                (true, byte_order.read_u64(&bytes[8..16]))
            }
            other => return Err(TiffError::InvalidVersion(other)),
        };

        if first_directory_offset >= file_size {
            return Err(TiffError::InvalidDirectoryOffset(first_directory_offset));
        }

        Ok(TiffHeader {
            byte_order,
            is_bigtiff,
            first_directory_offset,
        })
    }

    /// Size of one directory entry: 12 bytes classic, 20 bytes BigTIFF.
    #[inline]
    pub const fn entry_size(&self) -> usize {
        if self.is_bigtiff {
            20
        } else {
            12
        }
    }

    /// Size of the entry-count field at the start of a directory.
    #[inline]
    pub const fn count_field_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            2
        }
    }

    /// Size of an offset field (entry value slot, next-directory pointer).
    #[inline]
    pub const fn offset_field_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
