//! Canonical image metadata model.
//!
//! Format-native metadata (an OME-XML pixel description, or a JSON
//! multiscale manifest) is parsed into one canonical structure: ordered
//! dimension labels, per-dimension sizes, optional per-dimension named
//! values, physical pixel size, and the source pixel numeric type.
//!
//! The canonical dimension order is lowercase `['t', 'c', 'z', 'y', 'x']`
//! style with the spatial axes always last. Interleaved RGB(A) images get
//! an implicit trailing pseudo-dimension that is excluded from named
//! selection.
//!
//! Metadata is validated once at construction and immutable thereafter;
//! any disagreement with the backing array/file shape is a hard error
//! because addressing would silently corrupt reads if ignored.

pub mod multiscales;
pub mod omexml;

use crate::error::MetadataError;

use omexml::OmePixels;

// =============================================================================
// DimLabel
// =============================================================================

/// A canonical dimension label.
///
/// `Samples` is the implicit trailing pseudo-dimension appended for
/// interleaved pixel storage. It is never selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DimLabel {
    /// Time point
    T,
    /// Channel
    C,
    /// Focal plane
    Z,
    /// Spatial row
    Y,
    /// Spatial column
    X,
    /// Interleaved per-pixel samples (pseudo-dimension)
    Samples,
}

impl DimLabel {
    /// Canonical lowercase name of this label.
    pub fn as_str(self) -> &'static str {
        match self {
            DimLabel::T => "t",
            DimLabel::C => "c",
            DimLabel::Z => "z",
            DimLabel::Y => "y",
            DimLabel::X => "x",
            DimLabel::Samples => "_c",
        }
    }

    /// Resolve a selectable dimension name.
    ///
    /// Only the named, non-spatial-selectable labels resolve; the
    /// interleaved pseudo-dimension does not (it cannot appear in a
    /// selection).
    pub fn from_name(name: &str) -> Option<DimLabel> {
        match name {
            "t" => Some(DimLabel::T),
            "c" => Some(DimLabel::C),
            "z" => Some(DimLabel::Z),
            "y" => Some(DimLabel::Y),
            "x" => Some(DimLabel::X),
            _ => None,
        }
    }

    /// Whether this label is one of the spatial axes.
    pub fn is_spatial(self) -> bool {
        matches!(self, DimLabel::X | DimLabel::Y)
    }
}

impl std::fmt::Display for DimLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// PixelType
// =============================================================================

/// Numeric type of the source pixels.
///
/// Signed OME types are carried as their unsigned counterparts; the display
/// layer only distinguishes sample width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    Uint8,
    Uint16,
    Uint32,
    Float32,
}

impl PixelType {
    /// Map an OME-XML `Type` attribute value.
    pub fn from_ome(name: &str) -> Result<PixelType, MetadataError> {
        match name {
            "uint8" | "int8" => Ok(PixelType::Uint8),
            "uint16" | "int16" => Ok(PixelType::Uint16),
            "uint32" | "int32" => Ok(PixelType::Uint32),
            "float" => Ok(PixelType::Float32),
            other => Err(MetadataError::UnsupportedPixelType(other.to_string())),
        }
    }

    /// Map a Zarr dtype string (e.g. `"<u2"`, `"|u1"`, `">f4"`).
    ///
    /// Only the width/kind suffix is significant; byte order is handled by
    /// the array layer.
    pub fn from_zarr_dtype(dtype: &str) -> Result<PixelType, MetadataError> {
        let suffix = dtype.trim_start_matches(['<', '>', '|']);
        match suffix {
            "u1" => Ok(PixelType::Uint8),
            "u2" => Ok(PixelType::Uint16),
            "u4" => Ok(PixelType::Uint32),
            "f4" => Ok(PixelType::Float32),
            _ => Err(MetadataError::UnsupportedPixelType(dtype.to_string())),
        }
    }

    /// Width of one sample in bytes.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            PixelType::Uint8 => 1,
            PixelType::Uint16 => 2,
            PixelType::Uint32 | PixelType::Float32 => 4,
        }
    }

    /// Upper end of the full numeric range, used as the slider "off" fill.
    pub fn max_value(self) -> f32 {
        match self {
            PixelType::Uint8 => 255.0,
            PixelType::Uint16 => 65535.0,
            PixelType::Uint32 => u32::MAX as f32,
            PixelType::Float32 => f32::MAX,
        }
    }
}

// =============================================================================
// Dimension
// =============================================================================

/// One named dimension of the image.
#[derive(Debug, Clone, PartialEq)]
pub struct Dimension {
    /// Canonical label
    pub label: DimLabel,

    /// Extent along this dimension (always positive)
    pub size: usize,

    /// Optional named values (e.g. channel names), one per index
    pub values: Option<Vec<String>>,
}

impl Dimension {
    /// Create an unnamed dimension.
    pub fn new(label: DimLabel, size: usize) -> Self {
        Dimension {
            label,
            size,
            values: None,
        }
    }

    /// Create a dimension whose indices carry names.
    pub fn with_values(label: DimLabel, values: Vec<String>) -> Self {
        Dimension {
            label,
            size: values.len(),
            values: Some(values),
        }
    }
}

// =============================================================================
// Physical pixel size
// =============================================================================

/// Physical extent of one pixel along one spatial axis.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalSize {
    pub size: f64,
    pub unit: String,
}

/// Physical pixel sizes for the spatial axes.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalDimensions {
    pub x: PhysicalSize,
    pub y: PhysicalSize,
}

// =============================================================================
// Dimension order normalization
// =============================================================================

/// Normalize a format-native axis-order string into canonical labels.
///
/// OME dimension orders describe storage from fastest- to slowest-varying
/// axis (`"XYZCT"`), so the canonical viewer order is the reverse,
/// lowercased: `['t', 'c', 'z', 'y', 'x']`. The order must start with
/// `"XY"` and contain each of X, Y, Z, C, T exactly once.
pub fn labels_from_dimension_order(order: &str) -> Result<Vec<DimLabel>, MetadataError> {
    let invalid = || MetadataError::InvalidDimensionOrder(order.to_string());

    if order.len() != 5 || !order.starts_with("XY") {
        return Err(invalid());
    }

    let mut labels = Vec::with_capacity(5);
    for ch in order.chars().rev() {
        let label = match ch {
            'T' => DimLabel::T,
            'C' => DimLabel::C,
            'Z' => DimLabel::Z,
            'Y' => DimLabel::Y,
            'X' => DimLabel::X,
            _ => return Err(invalid()),
        };
        if labels.contains(&label) {
            return Err(invalid());
        }
        labels.push(label);
    }

    Ok(labels)
}

// =============================================================================
// ImageMetadata
// =============================================================================

/// Canonical, validated image metadata.
///
/// Owned by one pixel source for the lifetime of a loaded image; never
/// mutated after construction, so it may be read concurrently by any
/// number of in-flight tile requests without synchronization.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMetadata {
    dimensions: Vec<Dimension>,
    pixel_type: PixelType,
    physical_sizes: Option<PhysicalDimensions>,
    interleaved: bool,
}

impl ImageMetadata {
    /// Create metadata from an explicit dimension list.
    ///
    /// Validates the structural invariants: no duplicate labels, sizes
    /// positive, and `x`/`y` the last two named dimensions (followed only
    /// by the interleaved pseudo-dimension).
    pub fn new(
        dimensions: Vec<Dimension>,
        pixel_type: PixelType,
        physical_sizes: Option<PhysicalDimensions>,
        interleaved: bool,
    ) -> Result<Self, MetadataError> {
        let named: Vec<&Dimension> = dimensions
            .iter()
            .filter(|d| d.label != DimLabel::Samples)
            .collect();

        if named.len() < 2 {
            return Err(MetadataError::Parse(
                "image must declare at least the two spatial dimensions".to_string(),
            ));
        }

        for (i, dim) in dimensions.iter().enumerate() {
            if dim.size == 0 {
                return Err(MetadataError::DimensionMismatch {
                    label: dim.label.to_string(),
                    declared: 0,
                    actual: 0,
                });
            }
            if dimensions[..i].iter().any(|d| d.label == dim.label) {
                return Err(MetadataError::Parse(format!(
                    "duplicate dimension label '{}'",
                    dim.label
                )));
            }
            if let Some(values) = &dim.values {
                if values.len() != dim.size {
                    return Err(MetadataError::DimensionMismatch {
                        label: dim.label.to_string(),
                        declared: values.len(),
                        actual: dim.size,
                    });
                }
            }
        }

        let spatial_ok = named[named.len() - 2].label == DimLabel::Y
            && named[named.len() - 1].label == DimLabel::X;
        if !spatial_ok {
            return Err(MetadataError::Parse(
                "'y' and 'x' must be the last two named dimensions".to_string(),
            ));
        }

        if interleaved && dimensions.last().map(|d| d.label) != Some(DimLabel::Samples) {
            return Err(MetadataError::Parse(
                "interleaved images must carry a trailing samples pseudo-dimension".to_string(),
            ));
        }

        Ok(ImageMetadata {
            dimensions,
            pixel_type,
            physical_sizes,
            interleaved,
        })
    }

    /// Build canonical metadata from a parsed OME-XML pixel description.
    pub fn from_ome(pixels: &OmePixels) -> Result<Self, MetadataError> {
        let labels = labels_from_dimension_order(&pixels.dimension_order)?;
        let pixel_type = PixelType::from_ome(&pixels.pixel_type)?;

        if !pixels.channel_names.is_empty() && pixels.channel_names.len() != pixels.size_c {
            return Err(MetadataError::DimensionMismatch {
                label: DimLabel::C.to_string(),
                declared: pixels.channel_names.len(),
                actual: pixels.size_c,
            });
        }

        let mut dimensions = Vec::with_capacity(labels.len() + 1);
        for label in labels {
            let dim = match label {
                DimLabel::T => Dimension::new(DimLabel::T, pixels.size_t),
                DimLabel::Z => Dimension::new(DimLabel::Z, pixels.size_z),
                DimLabel::Y => Dimension::new(DimLabel::Y, pixels.size_y),
                DimLabel::X => Dimension::new(DimLabel::X, pixels.size_x),
                DimLabel::C => {
                    if pixels.channel_names.is_empty() {
                        Dimension::new(DimLabel::C, pixels.size_c)
                    } else {
                        Dimension::with_values(DimLabel::C, pixels.channel_names.clone())
                    }
                }
                DimLabel::Samples => unreachable!("never produced by dimension orders"),
            };
            dimensions.push(dim);
        }

        if pixels.interleaved {
            dimensions.push(Dimension::new(DimLabel::Samples, 3));
        }

        Self::new(
            dimensions,
            pixel_type,
            pixels.physical_sizes(),
            pixels.interleaved,
        )
    }

    /// Ordered dimension list, spatial axes last.
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// Ordered canonical labels.
    pub fn labels(&self) -> Vec<DimLabel> {
        self.dimensions.iter().map(|d| d.label).collect()
    }

    /// Full-resolution shape, one extent per dimension.
    pub fn shape(&self) -> Vec<usize> {
        self.dimensions.iter().map(|d| d.size).collect()
    }

    /// Shape of one pyramid level.
    ///
    /// Halves the spatial extents by `2^level` and holds every other
    /// dimension fixed. Assumes a factor-of-two pyramid; levels supplied
    /// directly by a store are not re-validated against this convention.
    pub fn shape_for_level(&self, level: usize) -> Vec<usize> {
        self.dimensions
            .iter()
            .map(|d| {
                if d.label.is_spatial() {
                    (d.size >> level).max(1)
                } else {
                    d.size
                }
            })
            .collect()
    }

    /// Extent of one dimension, if present.
    pub fn size_of(&self, label: DimLabel) -> Option<usize> {
        self.dimensions
            .iter()
            .find(|d| d.label == label)
            .map(|d| d.size)
    }

    /// Ordered channel names, when the channel dimension declares them.
    pub fn channel_names(&self) -> Option<&[String]> {
        self.dimensions
            .iter()
            .find(|d| d.label == DimLabel::C)
            .and_then(|d| d.values.as_deref())
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    pub fn physical_sizes(&self) -> Option<&PhysicalDimensions> {
        self.physical_sizes.as_ref()
    }

    pub fn interleaved(&self) -> bool {
        self.interleaved
    }

    /// Validate the declared sizes against a backing array/file shape.
    ///
    /// Any disagreement is fatal: continuing would make every linear index
    /// computed from this metadata address the wrong pixels.
    pub fn validate_backing_shape(&self, shape: &[usize]) -> Result<(), MetadataError> {
        if shape.len() != self.dimensions.len() {
            return Err(MetadataError::DimensionMismatch {
                label: "rank".to_string(),
                declared: self.dimensions.len(),
                actual: shape.len(),
            });
        }
        for (dim, &actual) in self.dimensions.iter().zip(shape) {
            if dim.size != actual {
                return Err(MetadataError::DimensionMismatch {
                    label: dim.label.to_string(),
                    declared: dim.size,
                    actual,
                });
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
