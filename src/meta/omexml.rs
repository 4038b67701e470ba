//! OME-XML pixel-description parsing.
//!
//! Extracts the subset of an OME-XML document the engine needs: the
//! `<Pixels>` attributes (sizes, dimension order, pixel type, physical
//! sizes) and per-channel names. Only the first `<Image>` element is
//! considered; multi-image documents address additional images through a
//! separate open call.

use roxmltree::{Document, Node};

use crate::error::MetadataError;

use super::{PhysicalDimensions, PhysicalSize};

// =============================================================================
// OmePixels
// =============================================================================

/// Raw attribute values recovered from the first `<Image><Pixels>` element.
///
/// This is the format-native view; [`super::ImageMetadata::from_ome`]
/// normalizes it into the canonical dimension model.
#[derive(Debug, Clone, PartialEq)]
pub struct OmePixels {
    pub size_x: usize,
    pub size_y: usize,
    pub size_z: usize,
    pub size_c: usize,
    pub size_t: usize,

    /// Native axis order, fastest-varying first (e.g. `"XYZCT"`)
    pub dimension_order: String,

    /// Declared numeric type (e.g. `"uint16"`)
    pub pixel_type: String,

    /// Whether samples are interleaved per pixel (RGB storage)
    pub interleaved: bool,

    pub physical_size_x: Option<f64>,
    pub physical_size_x_unit: Option<String>,
    pub physical_size_y: Option<f64>,
    pub physical_size_y_unit: Option<String>,

    /// Ordered channel names, one per `<Channel>` element
    pub channel_names: Vec<String>,
}

impl OmePixels {
    /// Physical pixel sizes, present only when both spatial axes declare one.
    pub fn physical_sizes(&self) -> Option<PhysicalDimensions> {
        match (self.physical_size_x, self.physical_size_y) {
            (Some(x), Some(y)) => Some(PhysicalDimensions {
                x: PhysicalSize {
                    size: x,
                    unit: self
                        .physical_size_x_unit
                        .clone()
                        .unwrap_or_else(|| DEFAULT_PHYSICAL_UNIT.to_string()),
                },
                y: PhysicalSize {
                    size: y,
                    unit: self
                        .physical_size_y_unit
                        .clone()
                        .unwrap_or_else(|| DEFAULT_PHYSICAL_UNIT.to_string()),
                },
            }),
            _ => None,
        }
    }
}

/// Unit assumed when a physical size omits its unit attribute (the OME
/// schema default).
const DEFAULT_PHYSICAL_UNIT: &str = "µm";

// =============================================================================
// Parsing
// =============================================================================

/// Parse an OME-XML document into its pixel description.
pub fn parse(xml: &str) -> Result<OmePixels, MetadataError> {
    let doc = Document::parse(xml).map_err(|e| MetadataError::Parse(e.to_string()))?;

    let image = doc
        .root_element()
        .children()
        .find(|n| n.has_tag_name_local("Image"))
        .ok_or_else(|| MetadataError::Parse("no <Image> element".to_string()))?;

    let pixels = image
        .children()
        .find(|n| n.has_tag_name_local("Pixels"))
        .ok_or_else(|| MetadataError::Parse("no <Pixels> element".to_string()))?;

    let channel_names = pixels
        .children()
        .filter(|n| n.has_tag_name_local("Channel"))
        .enumerate()
        .map(|(i, c)| match c.attribute("Name") {
            Some(name) => name.to_string(),
            None => format!("Channel {i}"),
        })
        .collect();

    Ok(OmePixels {
        size_x: usize_attr(&pixels, "SizeX")?,
        size_y: usize_attr(&pixels, "SizeY")?,
        size_z: usize_attr(&pixels, "SizeZ")?,
        size_c: usize_attr(&pixels, "SizeC")?,
        size_t: usize_attr(&pixels, "SizeT")?,
        dimension_order: required_attr(&pixels, "DimensionOrder")?.to_string(),
        pixel_type: required_attr(&pixels, "Type")?.to_string(),
        interleaved: matches!(pixels.attribute("Interleaved"), Some("true") | Some("1")),
        physical_size_x: float_attr(&pixels, "PhysicalSizeX")?,
        physical_size_x_unit: pixels.attribute("PhysicalSizeXUnit").map(str::to_string),
        physical_size_y: float_attr(&pixels, "PhysicalSizeY")?,
        physical_size_y_unit: pixels.attribute("PhysicalSizeYUnit").map(str::to_string),
        channel_names,
    })
}

/// Namespace-agnostic tag-name check (OME documents carry a schema
/// namespace; some writers omit it).
trait LocalName {
    fn has_tag_name_local(&self, name: &str) -> bool;
}

impl LocalName for Node<'_, '_> {
    fn has_tag_name_local(&self, name: &str) -> bool {
        self.is_element() && self.tag_name().name() == name
    }
}

fn required_attr<'a>(node: &'a Node, name: &'static str) -> Result<&'a str, MetadataError> {
    node.attribute(name)
        .ok_or(MetadataError::MissingAttribute(name))
}

fn usize_attr(node: &Node, name: &'static str) -> Result<usize, MetadataError> {
    required_attr(node, name)?.parse().map_err(|_| {
        MetadataError::Parse(format!("attribute {name} is not a positive integer"))
    })
}

fn float_attr(node: &Node, name: &'static str) -> Result<Option<f64>, MetadataError> {
    match node.attribute(name) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| MetadataError::Parse(format!("attribute {name} is not a number"))),
    }
}

// =============================================================================
// Tests
// =============================================================================
