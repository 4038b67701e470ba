//! Channel normalization for the display layer.
//!
//! The display layer binds fixed-length uniform arrays regardless of how
//! many channels the source image declares (1 to [`MAX_CHANNELS`]).
//! [`pad_channels`] pads sparse per-channel slider/color/on-off state to
//! that capacity with deterministic defaults, eliminating per-call length
//! checks downstream.
//!
//! Defaults: an unpopulated or disabled channel gets the slider-off fill
//! (both ends of the slider at the top of the numeric range, which renders
//! as always transparent) and a black color. Colors are normalized from
//! 8-bit RGB to `[0, 1]`.

use crate::meta::PixelType;

/// Maximum number of channels the display layer supports.
pub const MAX_CHANNELS: usize = 6;

/// Default color slot: black.
const FILL_COLOR: [f32; 3] = [0.0, 0.0, 0.0];

// =============================================================================
// PadChannelsParams
// =============================================================================

/// Inputs to [`pad_channels`].
#[derive(Debug, Clone)]
pub struct PadChannelsParams<'a> {
    /// Per-channel `[low, high]` ramp bounds
    pub slider_values: &'a [[f32; 2]],

    /// Per-channel 8-bit RGB colors
    pub color_values: &'a [[u8; 3]],

    /// Per-channel visibility
    pub channels_on: &'a [bool],

    /// Source pixel type, supplying the slider-off fill value
    pub pixel_type: PixelType,

    /// Override for the numeric range (e.g. calibrated data narrower than
    /// the full type range)
    pub domain: Option<[f32; 2]>,

    /// Capacity to pad to
    pub max_channels: usize,
}

impl<'a> PadChannelsParams<'a> {
    pub fn new(
        slider_values: &'a [[f32; 2]],
        color_values: &'a [[u8; 3]],
        channels_on: &'a [bool],
        pixel_type: PixelType,
    ) -> Self {
        PadChannelsParams {
            slider_values,
            color_values,
            channels_on,
            pixel_type,
            domain: None,
            max_channels: MAX_CHANNELS,
        }
    }
}

/// Fixed-capacity channel state for the display layer.
#[derive(Debug, Clone, PartialEq)]
pub struct PaddedChannels {
    /// `max_channels` slider pairs
    pub slider_values: Vec<[f32; 2]>,

    /// `max_channels` RGB triples, normalized to `[0, 1]`
    pub color_values: Vec<[f32; 3]>,
}

// =============================================================================
// pad_channels
// =============================================================================

/// Pad sparse per-channel state to a fixed channel capacity.
///
/// For each slot up to `max_channels`: a declared, enabled channel keeps
/// its slider pair and normalized color; a disabled channel gets the
/// slider-off fill while its color slot goes black; an undeclared slot
/// gets both defaults.
pub fn pad_channels(params: &PadChannelsParams) -> PaddedChannels {
    let off = params
        .domain
        .map(|d| d[1])
        .unwrap_or_else(|| params.pixel_type.max_value());
    let fill_slider = [off, off];

    let declared = params.slider_values.len().min(params.color_values.len());

    let mut slider_values = Vec::with_capacity(params.max_channels);
    let mut color_values = Vec::with_capacity(params.max_channels);

    for i in 0..params.max_channels {
        let enabled = i < declared && params.channels_on.get(i).copied().unwrap_or(true);
        if enabled {
            slider_values.push(params.slider_values[i]);
            let [r, g, b] = params.color_values[i];
            color_values.push([r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0]);
        } else {
            slider_values.push(fill_slider);
            color_values.push(FILL_COLOR);
        }
    }

    PaddedChannels {
        slider_values,
        color_values,
    }
}

// =============================================================================
// Tests
// =============================================================================
