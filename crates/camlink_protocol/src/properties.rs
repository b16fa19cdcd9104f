//! Typed views over the properties a camera exposes.
//!
//! The mirror itself is schema-less; these structs are for callers that
//! know which property they are looking at.

use crate::envelope::PropertyValue;
use crate::error::{ProtocolError, ProtocolResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Property names advertised by the camera, in advertisement order.
pub const KNOWN_PROPERTIES: [&str; 8] = [
    "/video/gain",
    "/video/shutter",
    "/video/whiteBalance",
    "/video/autoExposure",
    "/colorCorrection/lift",
    "/colorCorrection/gamma",
    "/colorCorrection/gain",
    "/colorCorrection/offset",
];

/// `/video/gain`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Gain {
    /// Analog gain in dB.
    pub gain: f32,
}

/// `/video/shutter`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shutter {
    /// Whether the shutter is driven by continuous auto exposure.
    pub continuous_shutter_auto_exposure: bool,
    /// Shutter speed as the denominator of `1/n` seconds.
    pub shutter_speed: i32,
    /// Shutter angle in degrees.
    pub shutter_angle: f32,
}

/// `/video/whiteBalance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhiteBalance {
    /// Colour temperature in kelvin.
    pub white_balance: i32,
}

/// `/video/autoExposure`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AutoExposure {
    /// `Continuous` or `Off`.
    pub mode: String,
    /// Which parameters auto exposure drives.
    #[serde(rename = "type")]
    pub kind: String,
}

/// `/colorCorrection/{lift,gamma,gain,offset}`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ColorCorrection {
    /// Red channel.
    pub red: f32,
    /// Green channel.
    pub green: f32,
    /// Blue channel.
    pub blue: f32,
    /// Luma.
    pub luma: f32,
}

/// Encoder settings reported by `GET /system`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodecFormat {
    /// Video codec, e.g. `H.264`.
    pub codec: String,
    /// Container, e.g. `MPEG2-TS`.
    pub container: String,
}

/// Video mode reported by `GET /system`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoFormat {
    /// Mode name, e.g. `1080p30`.
    pub name: String,
    /// Frame rate as sent by the device (a decimal string).
    pub frame_rate: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Whether the mode is interlaced.
    pub interlaced: bool,
}

/// Body of `GET /system`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    /// Encoder settings.
    pub codec_format: CodecFormat,
    /// Active video mode.
    pub video_format: VideoFormat,
}

/// Reads a mirrored value as a typed view.
pub fn decode_property<T: DeserializeOwned>(value: &PropertyValue) -> ProtocolResult<T> {
    serde_json::from_value(serde_json::Value::Object(value.clone())).map_err(|e| {
        ProtocolError::InvalidValue {
            message: e.to_string(),
        }
    })
}
