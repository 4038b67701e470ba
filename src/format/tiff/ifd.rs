//! Image directory (IFD) parsing and tag value access.
//!
//! Only the tag subset a tile-serving reader needs is interpreted; private
//! and unknown tags are carried through unparsed. Large values (tile offset
//! arrays, the image description) live outside the directory and are read
//! on demand through the [`RangeReader`].

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;
use crate::meta::PixelType;

use super::{ByteOrder, TiffHeader};

// =============================================================================
// Tag constants
// =============================================================================

pub const TAG_IMAGE_WIDTH: u16 = 256;
pub const TAG_IMAGE_LENGTH: u16 = 257;
pub const TAG_BITS_PER_SAMPLE: u16 = 258;
pub const TAG_COMPRESSION: u16 = 259;
pub const TAG_IMAGE_DESCRIPTION: u16 = 270;
pub const TAG_STRIP_OFFSETS: u16 = 273;
pub const TAG_SAMPLES_PER_PIXEL: u16 = 277;
pub const TAG_TILE_WIDTH: u16 = 322;
pub const TAG_TILE_LENGTH: u16 = 323;
pub const TAG_TILE_OFFSETS: u16 = 324;
pub const TAG_TILE_BYTE_COUNTS: u16 = 325;
pub const TAG_SAMPLE_FORMAT: u16 = 339;

// =============================================================================
// FieldType
// =============================================================================

/// TIFF field types the engine can interpret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Byte,
    Ascii,
    Short,
    Long,
    Rational,
    Undefined,
    Long8,
}

impl FieldType {
    /// Map a raw field-type code; `None` for exotic/private types.
    pub fn from_raw(raw: u16) -> Option<FieldType> {
        match raw {
            1 => Some(FieldType::Byte),
            2 => Some(FieldType::Ascii),
            3 => Some(FieldType::Short),
            4 => Some(FieldType::Long),
            5 => Some(FieldType::Rational),
            7 => Some(FieldType::Undefined),
            16 => Some(FieldType::Long8),
            _ => None,
        }
    }

    /// Size of one element in bytes.
    pub fn element_size(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::Undefined => 1,
            FieldType::Short => 2,
            FieldType::Long => 4,
            FieldType::Rational | FieldType::Long8 => 8,
        }
    }
}

// =============================================================================
// IfdEntry
// =============================================================================

/// One directory entry: a tag, a field type, and a value that is either
/// stored inline or referenced by offset.
#[derive(Debug, Clone)]
pub struct IfdEntry {
    pub tag: u16,
    pub field_type: Option<FieldType>,
    pub field_type_raw: u16,
    pub count: u64,

    /// The raw value slot (4 bytes classic, 8 bytes BigTIFF); holds the
    /// value itself when it fits, else an offset to it
    value_slot: Bytes,
}

impl IfdEntry {
    /// Whether the value is stored inside the value slot.
    pub fn is_inline(&self, header: &TiffHeader) -> bool {
        match self.field_type {
            Some(ft) => {
                (self.count as usize).saturating_mul(ft.element_size())
                    <= header.offset_field_size()
            }
            None => false,
        }
    }

    /// Interpret the value slot as an offset.
    pub fn value_offset(&self, header: &TiffHeader) -> u64 {
        if header.is_bigtiff {
            header.byte_order.read_u64(&self.value_slot)
        } else {
            header.byte_order.read_u32(&self.value_slot) as u64
        }
    }

    fn typed(&self) -> Result<FieldType, TiffError> {
        self.field_type
            .ok_or(TiffError::UnknownFieldType(self.field_type_raw))
    }

    /// Read this entry's raw value bytes, following the offset if needed.
    pub async fn read_raw<R: RangeReader>(
        &self,
        reader: &R,
        header: &TiffHeader,
    ) -> Result<Bytes, TiffError> {
        let total = (self.count as usize) * self.typed()?.element_size();
        if self.is_inline(header) {
            Ok(self.value_slot.slice(..total))
        } else {
            Ok(reader.read_exact_at(self.value_offset(header), total).await?)
        }
    }

    /// Read the value as an array of unsigned integers (Byte/Short/Long/Long8).
    pub async fn read_integer_array<R: RangeReader>(
        &self,
        reader: &R,
        header: &TiffHeader,
    ) -> Result<Vec<u64>, TiffError> {
        let field_type = self.typed()?;
        let raw = self.read_raw(reader, header).await?;
        let bo = header.byte_order;

        let values = raw
            .chunks_exact(field_type.element_size())
            .map(|chunk| match field_type {
                FieldType::Byte | FieldType::Undefined => Ok(chunk[0] as u64),
                FieldType::Short => Ok(bo.read_u16(chunk) as u64),
                FieldType::Long => Ok(bo.read_u32(chunk) as u64),
                FieldType::Long8 => Ok(bo.read_u64(chunk)),
                _ => Err(TiffError::InvalidTagValue {
                    tag: "entry",
                    message: format!("field type {field_type:?} is not an integer type"),
                }),
            })
            .collect::<Result<Vec<u64>, TiffError>>()?;

        Ok(values)
    }

    /// Read the value as an ASCII string, trimming the trailing NUL.
    pub async fn read_ascii<R: RangeReader>(
        &self,
        reader: &R,
        header: &TiffHeader,
    ) -> Result<String, TiffError> {
        let raw = self.read_raw(reader, header).await?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }
}

// =============================================================================
// Ifd
// =============================================================================

/// A parsed image directory: its entries and the offset of the next one.
#[derive(Debug, Clone)]
pub struct Ifd {
    entries: Vec<IfdEntry>,

    /// Offset of the next directory in the chain; 0 terminates the chain
    pub next_directory_offset: u64,
}

impl Ifd {
    /// Total byte size of a directory with `entry_count` entries.
    pub fn region_size(entry_count: u64, header: &TiffHeader) -> usize {
        header.count_field_size()
            + (entry_count as usize) * header.entry_size()
            + header.offset_field_size()
    }

    /// Read and parse the directory at `offset`.
    pub async fn read_at<R: RangeReader>(
        reader: &R,
        offset: u64,
        header: &TiffHeader,
    ) -> Result<Self, TiffError> {
        if offset == 0 || offset >= reader.size() {
            return Err(TiffError::InvalidDirectoryOffset(offset));
        }

        let count_bytes = reader
            .read_exact_at(offset, header.count_field_size())
            .await?;
        let entry_count = if header.is_bigtiff {
            header.byte_order.read_u64(&count_bytes)
        } else {
            header.byte_order.read_u16(&count_bytes) as u64
        };

        let region = reader
            .read_exact_at(offset, Self::region_size(entry_count, header))
            .await?;

        Self::parse(&region, entry_count, header)
    }

    fn parse(region: &Bytes, entry_count: u64, header: &TiffHeader) -> Result<Self, TiffError> {
        let bo = header.byte_order;
        let entry_size = header.entry_size();
        let mut entries = Vec::with_capacity(entry_count as usize);

        for i in 0..entry_count as usize {
            let start = header.count_field_size() + i * entry_size;
            let entry = &region[start..start + entry_size];

            let field_type_raw = bo.read_u16(&entry[2..4]);
            let (count, slot_start) = if header.is_bigtiff {
                (bo.read_u64(&entry[4..12]), 12)
            } else {
                (bo.read_u32(&entry[4..8]) as u64, 8)
            };

            entries.push(IfdEntry {
                tag: bo.read_u16(&entry[0..2]),
                field_type: FieldType::from_raw(field_type_raw),
                field_type_raw,
                count,
                value_slot: region.slice(start + slot_start..start + entry_size),
            });
        }

        let next_start = header.count_field_size() + entry_count as usize * entry_size;
        let next_directory_offset = if header.is_bigtiff {
            bo.read_u64(&region[next_start..next_start + 8])
        } else {
            bo.read_u32(&region[next_start..next_start + 4]) as u64
        };

        Ok(Ifd {
            entries,
            next_directory_offset,
        })
    }

    /// Look up an entry by tag.
    pub fn entry(&self, tag: u16) -> Option<&IfdEntry> {
        self.entries.iter().find(|e| e.tag == tag)
    }

    /// Read a scalar unsigned integer tag value.
    pub async fn integer_value<R: RangeReader>(
        &self,
        reader: &R,
        header: &TiffHeader,
        tag: u16,
    ) -> Result<Option<u64>, TiffError> {
        match self.entry(tag) {
            None => Ok(None),
            Some(entry) => {
                let values = entry.read_integer_array(reader, header).await?;
                Ok(values.first().copied())
            }
        }
    }
}

// =============================================================================
// ImageDirectory
// =============================================================================

/// Resolved geometry and tile layout of one image directory.
///
/// Everything a tile read needs is materialized here so a cached directory
/// never touches the reader again except for tile payloads.
#[derive(Debug, Clone)]
pub struct ImageDirectory {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,

    /// Raw compression tag value (1 = none, 7 = JPEG, 8 = Deflate)
    pub compression: u16,

    pub bits_per_sample: u16,

    /// Raw sample format tag value (1 = unsigned integer, 3 = IEEE float)
    pub sample_format: u16,

    pub samples_per_pixel: u16,

    /// Byte offset of each tile payload, row-major
    pub tile_offsets: Vec<u64>,

    /// Byte count of each tile payload, row-major
    pub tile_byte_counts: Vec<u64>,

    /// ImageDescription contents (carries the OME-XML on the first
    /// directory of an OME-TIFF)
    pub description: Option<String>,
}

impl ImageDirectory {
    /// Resolve an image directory from its parsed entries.
    pub async fn resolve<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
        ifd: &Ifd,
    ) -> Result<Self, TiffError> {
        let width = ifd
            .integer_value(reader, header, TAG_IMAGE_WIDTH)
            .await?
            .ok_or(TiffError::MissingTag("ImageWidth"))? as u32;
        let height = ifd
            .integer_value(reader, header, TAG_IMAGE_LENGTH)
            .await?
            .ok_or(TiffError::MissingTag("ImageLength"))? as u32;

        let tile_width = match ifd.integer_value(reader, header, TAG_TILE_WIDTH).await? {
            Some(value) => value as u32,
            None if ifd.entry(TAG_STRIP_OFFSETS).is_some() => {
                return Err(TiffError::StripOrganization)
            }
            None => return Err(TiffError::MissingTag("TileWidth")),
        };
        let tile_height = ifd
            .integer_value(reader, header, TAG_TILE_LENGTH)
            .await?
            .ok_or(TiffError::MissingTag("TileLength"))? as u32;

        let tile_offsets = match ifd.entry(TAG_TILE_OFFSETS) {
            Some(entry) => entry.read_integer_array(reader, header).await?,
            None => return Err(TiffError::MissingTag("TileOffsets")),
        };
        let tile_byte_counts = match ifd.entry(TAG_TILE_BYTE_COUNTS) {
            Some(entry) => entry.read_integer_array(reader, header).await?,
            None => return Err(TiffError::MissingTag("TileByteCounts")),
        };

        let description = match ifd.entry(TAG_IMAGE_DESCRIPTION) {
            Some(entry) => Some(entry.read_ascii(reader, header).await?),
            None => None,
        };

        Ok(ImageDirectory {
            width,
            height,
            tile_width,
            tile_height,
            compression: ifd
                .integer_value(reader, header, TAG_COMPRESSION)
                .await?
                .unwrap_or(1) as u16,
            bits_per_sample: ifd
                .integer_value(reader, header, TAG_BITS_PER_SAMPLE)
                .await?
                .unwrap_or(8) as u16,
            sample_format: ifd
                .integer_value(reader, header, TAG_SAMPLE_FORMAT)
                .await?
                .unwrap_or(1) as u16,
            samples_per_pixel: ifd
                .integer_value(reader, header, TAG_SAMPLES_PER_PIXEL)
                .await?
                .unwrap_or(1) as u16,
            tile_offsets,
            tile_byte_counts,
            description,
        })
    }

    /// Numeric sample type declared by this directory.
    pub fn pixel_type(&self) -> Result<PixelType, TiffError> {
        match (self.bits_per_sample, self.sample_format) {
            (8, 1) => Ok(PixelType::Uint8),
            (16, 1) => Ok(PixelType::Uint16),
            (32, 1) => Ok(PixelType::Uint32),
            (32, 3) => Ok(PixelType::Float32),
            (bits, format) => Err(TiffError::InvalidTagValue {
                tag: "BitsPerSample",
                message: format!("no supported sample type for {bits} bits, format {format}"),
            }),
        }
    }

    /// Number of tile columns.
    pub fn tiles_x(&self) -> u32 {
        self.width.div_ceil(self.tile_width)
    }

    /// Number of tile rows.
    pub fn tiles_y(&self) -> u32 {
        self.height.div_ceil(self.tile_height)
    }

    /// Byte offset and size of one tile payload.
    ///
    /// Returns `None` when the coordinates fall outside the tile grid or
    /// the offset arrays are shorter than the grid implies.
    pub fn tile_location(&self, tile_x: u32, tile_y: u32) -> Option<(u64, u64)> {
        if tile_x >= self.tiles_x() || tile_y >= self.tiles_y() {
            return None;
        }
        let index = (tile_y * self.tiles_x() + tile_x) as usize;
        Some((
            *self.tile_offsets.get(index)?,
            *self.tile_byte_counts.get(index)?,
        ))
    }
}

// =============================================================================
// Tests
// =============================================================================
