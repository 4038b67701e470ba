//! Dimension selection and indexing.
//!
//! A [`Selection`] is a partial assignment of non-spatial dimension values
//! identifying which 2-D plane to read. Dimensions are addressed by name
//! or ordinal position; values are integer indices or, when the dimension
//! declares named values (channel names), exact-match names.
//!
//! [`index_selection`] maps a selection plus the canonical dimension order
//! to a linear index vector usable by either backing store. It is pure,
//! deterministic, and total over valid inputs; selections are at most a
//! handful of entries, so its output is recomputed per request rather than
//! cached.

use crate::error::SelectionError;
use crate::meta::Dimension;
use crate::meta::DimLabel;

// =============================================================================
// Selection
// =============================================================================

/// How a selection entry addresses a dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionKey {
    /// Canonical dimension name (`"t"`, `"c"`, `"z"`)
    Name(String),
    /// Ordinal position within the dimension order
    Ordinal(usize),
}

/// The value assigned to a selected dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionValue {
    /// Integer index, validated against the dimension size
    Index(usize),
    /// Named value, resolved through the dimension's value list
    Name(String),
}

impl From<&str> for SelectionKey {
    fn from(name: &str) -> Self {
        SelectionKey::Name(name.to_string())
    }
}

impl From<usize> for SelectionKey {
    fn from(ordinal: usize) -> Self {
        SelectionKey::Ordinal(ordinal)
    }
}

impl From<&str> for SelectionValue {
    fn from(name: &str) -> Self {
        SelectionValue::Name(name.to_string())
    }
}

impl From<String> for SelectionValue {
    fn from(name: String) -> Self {
        SelectionValue::Name(name)
    }
}

impl From<usize> for SelectionValue {
    fn from(index: usize) -> Self {
        SelectionValue::Index(index)
    }
}

/// A partial assignment of non-spatial dimension values.
///
/// Selections are transient and value-like: cheap to build, cloned freely,
/// owned by the caller. A selection never names `x` or `y`; those are
/// supplied per call as tile coordinates.
///
/// # Example
///
/// ```
/// use ome_tiler::Selection;
///
/// let selection = Selection::new().with("c", "DAPI").with("z", 3usize);
/// assert_eq!(selection.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    entries: Vec<(SelectionKey, SelectionValue)>,
}

impl Selection {
    /// Create an empty selection (every non-spatial dimension defaults to 0).
    pub fn new() -> Self {
        Selection::default()
    }

    /// Add one dimension assignment, builder style.
    pub fn with(mut self, key: impl Into<SelectionKey>, value: impl Into<SelectionValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Add one dimension assignment in place.
    pub fn set(&mut self, key: impl Into<SelectionKey>, value: impl Into<SelectionValue>) {
        self.entries.push((key.into(), value.into()));
    }

    /// The assignments, in insertion order.
    pub fn entries(&self) -> &[(SelectionKey, SelectionValue)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// Indexing
// =============================================================================

/// Map a selection to a full-length linear index vector.
///
/// The result has one entry per dimension (including the spatial axes and
/// any trailing pseudo-dimension, which stay 0 for the caller to fill or
/// wildcard). Unspecified non-spatial dimensions default to index 0.
///
/// # Errors
///
/// - [`SelectionError::InvalidDimension`] if a name is not a selectable
///   dimension of the image (spatial axes and the interleaved
///   pseudo-dimension are never selectable)
/// - [`SelectionError::InvalidValue`] if a named value is absent from the
///   dimension's value list, or the dimension declares no named values
/// - [`SelectionError::IndexOutOfRange`] if an integer index is outside
///   `[0, size)`
pub fn index_selection(
    selection: &Selection,
    dimensions: &[Dimension],
) -> Result<Vec<usize>, SelectionError> {
    let mut index = vec![0usize; dimensions.len()];

    for (key, value) in selection.entries() {
        let position = resolve_dimension(key, dimensions)?;
        index[position] = resolve_value(value, &dimensions[position])?;
    }

    Ok(index)
}

/// Map a selection to a plane-read index vector with the spatial axes (and
/// any trailing interleaved pseudo-dimension) wildcarded.
pub fn raster_selection(
    selection: &Selection,
    dimensions: &[Dimension],
) -> Result<Vec<Option<usize>>, SelectionError> {
    let index = index_selection(selection, dimensions)?;

    Ok(dimensions
        .iter()
        .zip(index)
        .map(|(dim, i)| match dim.label {
            DimLabel::X | DimLabel::Y | DimLabel::Samples => None,
            _ => Some(i),
        })
        .collect())
}

fn resolve_dimension(
    key: &SelectionKey,
    dimensions: &[Dimension],
) -> Result<usize, SelectionError> {
    let invalid = |name: String| SelectionError::InvalidDimension {
        name,
        known: dimensions
            .iter()
            .map(|d| d.label.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    };

    let position = match key {
        SelectionKey::Name(name) => {
            let label = DimLabel::from_name(name).ok_or_else(|| invalid(name.clone()))?;
            dimensions
                .iter()
                .position(|d| d.label == label)
                .ok_or_else(|| invalid(name.clone()))?
        }
        SelectionKey::Ordinal(ordinal) => {
            if *ordinal >= dimensions.len() {
                return Err(invalid(ordinal.to_string()));
            }
            *ordinal
        }
    };

    let label = dimensions[position].label;
    if label.is_spatial() || label == DimLabel::Samples {
        return Err(invalid(label.to_string()));
    }

    Ok(position)
}

fn resolve_value(value: &SelectionValue, dimension: &Dimension) -> Result<usize, SelectionError> {
    match value {
        SelectionValue::Index(index) => {
            if *index < dimension.size {
                Ok(*index)
            } else {
                Err(SelectionError::IndexOutOfRange {
                    dimension: dimension.label.to_string(),
                    index: *index,
                    size: dimension.size,
                })
            }
        }
        SelectionValue::Name(name) => dimension
            .values
            .as_ref()
            .and_then(|values| values.iter().position(|v| v == name))
            .ok_or_else(|| SelectionError::InvalidValue {
                dimension: dimension.label.to_string(),
                name: name.clone(),
            }),
    }
}

// =============================================================================
// Tests
// =============================================================================
