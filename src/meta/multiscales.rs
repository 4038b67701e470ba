//! JSON multiscale manifest parsing.
//!
//! OME-Zarr stores describe their resolution pyramid in root attributes
//! (`.zattrs`): a `multiscales` list whose first entry names the dataset
//! path of each resolution level, finest first. Stores without the marker
//! hold a single resolution at path `"0"`.

use serde::Deserialize;

use crate::error::MetadataError;

// =============================================================================
// Manifest types
// =============================================================================

/// Root attributes of a chunked store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RootAttrs {
    /// Multiscale markers; absent for single-resolution stores
    #[serde(default)]
    pub multiscales: Vec<Multiscale>,
}

/// One multiscale description.
#[derive(Debug, Clone, Deserialize)]
pub struct Multiscale {
    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    /// Resolution levels, ordered from full resolution to coarsest
    pub datasets: Vec<Dataset>,
}

/// One resolution level's location within the store.
#[derive(Debug, Clone, Deserialize)]
pub struct Dataset {
    pub path: String,
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse root attributes from raw manifest bytes.
pub fn parse(bytes: &[u8]) -> Result<RootAttrs, MetadataError> {
    serde_json::from_slice(bytes).map_err(|e| MetadataError::Parse(e.to_string()))
}

/// Resolve the ordered list of resolution-level paths.
///
/// When the manifest carries multiscale markers, the first entry's dataset
/// paths are used; otherwise the store holds a single resolution at `"0"`.
/// `prefix` is the store-relative path of the image group and may be empty.
pub fn resolution_paths(attrs: &RootAttrs, prefix: &str) -> Vec<String> {
    let prefix = prefix.trim_end_matches('/');

    let paths: Vec<&str> = match attrs.multiscales.first() {
        Some(multiscale) => multiscale.datasets.iter().map(|d| d.path.as_str()).collect(),
        None => vec!["0"],
    };

    paths
        .into_iter()
        .map(|path| {
            if prefix.is_empty() {
                path.to_string()
            } else {
                format!("{prefix}/{path}")
            }
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
