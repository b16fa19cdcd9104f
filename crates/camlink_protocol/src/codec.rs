//! Translation between wire text and envelopes.
//!
//! The codec performs no business logic: it only checks that a message has
//! the shape of one of the three envelope variants.

use crate::envelope::{Envelope, EnvelopeType, Event, Request, Response};
use crate::error::{ProtocolError, ProtocolResult};
use serde_json::{Map, Value};

/// Encodes a request envelope from an action name and its arguments.
///
/// Fails with [`ProtocolError::ReservedField`] if `args` contains `action`.
pub fn encode_request(action: &str, args: Map<String, Value>) -> ProtocolResult<String> {
    encode(&Envelope::Request(Request {
        action: action.to_string(),
        args,
    }))
}

/// Encodes any envelope to its wire text.
pub fn encode(envelope: &Envelope) -> ProtocolResult<String> {
    let fields = envelope.fields();
    if fields.contains_key("action") {
        return Err(ProtocolError::ReservedField {
            field: "action".into(),
        });
    }

    let mut data = Map::with_capacity(fields.len() + 1);
    data.insert("action".into(), Value::String(envelope.action().to_string()));
    data.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut root = Map::with_capacity(2);
    root.insert(
        "type".into(),
        Value::String(envelope.envelope_type().as_str().to_string()),
    );
    root.insert("data".into(), Value::Object(data));

    Ok(serde_json::to_string(&Value::Object(root))?)
}

/// Decodes one envelope from wire text.
pub fn decode(raw: &str) -> ProtocolResult<Envelope> {
    let value: Value = serde_json::from_str(raw)?;
    let Value::Object(mut root) = value else {
        return Err(ProtocolError::invalid_structure("envelope must be an object"));
    };

    let envelope_type = match root.get("type") {
        Some(Value::String(tag)) => EnvelopeType::from_tag(tag)?,
        Some(_) => return Err(ProtocolError::invalid_structure("`type` must be a string")),
        None => return Err(ProtocolError::missing_field("type")),
    };

    let mut data = match root.remove("data") {
        Some(Value::Object(data)) => data,
        Some(_) => return Err(ProtocolError::invalid_structure("`data` must be an object")),
        None => return Err(ProtocolError::missing_field("data")),
    };

    let action = match data.remove("action") {
        Some(Value::String(action)) => action,
        Some(_) => {
            return Err(ProtocolError::invalid_structure(
                "`action` must be a string",
            ))
        }
        None => return Err(ProtocolError::missing_field("action")),
    };

    Ok(match envelope_type {
        EnvelopeType::Request => Envelope::Request(Request { action, args: data }),
        EnvelopeType::Response => Envelope::Response(Response {
            action,
            result: data,
        }),
        EnvelopeType::Event => Envelope::Event(Event {
            action,
            payload: data,
        }),
    })
}

/// Decodes a frame that may hold several newline-delimited envelopes.
///
/// Blank lines are skipped; each remaining line decodes independently so one
/// malformed line does not hide the others.
pub fn decode_lines(raw: &str) -> impl Iterator<Item = ProtocolResult<Envelope>> + '_ {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(decode)
}
