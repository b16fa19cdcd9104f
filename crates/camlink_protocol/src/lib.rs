//! # camlink protocol
//!
//! Wire types and JSON codec for the device property protocol.
//!
//! This crate provides:
//! - The three envelope variants exchanged over the duplex channel
//!   (request, response, event)
//! - Encoding/decoding between wire text and envelopes
//! - Typed views over the known device properties
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Wire format
//!
//! Every message is a JSON object tagged by `type`, with the action and its
//! arguments flattened into `data`:
//!
//! ```text
//! {"type": "request",  "data": {"action": "subscribe", "properties": ["/video/gain"]}}
//! {"type": "response", "data": {"action": "listProperties", "properties": [...]}}
//! {"type": "event",    "data": {"action": "propertyValueChanged", "property": "/video/gain", "value": {"gain": 12}}}
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod actions;
mod codec;
mod envelope;
mod error;
mod properties;

pub use codec::{decode, decode_lines, encode, encode_request};
pub use envelope::{
    Envelope, EnvelopeType, Event, PropertyChange, PropertyName, PropertyValue, Request, Response,
};
pub use error::{ProtocolError, ProtocolResult};
pub use properties::{
    decode_property, AutoExposure, CodecFormat, ColorCorrection, Gain, Shutter, SystemInfo,
    VideoFormat, WhiteBalance, KNOWN_PROPERTIES,
};
