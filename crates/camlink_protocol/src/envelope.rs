//! Protocol envelopes.

use crate::actions;
use crate::error::{ProtocolError, ProtocolResult};
use serde_json::{Map, Value};
use std::fmt;

/// Identifier of a device property, e.g. `"/video/gain"`.
pub type PropertyName = String;

/// Schema-less property value: field name to scalar or nested value.
///
/// When it arrives in an event it is a partial record holding only the
/// fields that changed.
pub type PropertyValue = Map<String, Value>;

/// Discriminant of an envelope on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeType {
    /// Client to device.
    Request,
    /// Device reply to a request.
    Response,
    /// Unsolicited device push.
    Event,
}

impl EnvelopeType {
    /// Returns the wire tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeType::Request => "request",
            EnvelopeType::Response => "response",
            EnvelopeType::Event => "event",
        }
    }

    /// Parses a wire tag.
    pub fn from_tag(tag: &str) -> ProtocolResult<Self> {
        match tag {
            "request" => Ok(EnvelopeType::Request),
            "response" => Ok(EnvelopeType::Response),
            "event" => Ok(EnvelopeType::Event),
            other => Err(ProtocolError::UnknownType {
                type_name: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for EnvelopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request sent to the device.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Action name.
    pub action: String,
    /// Action arguments, flattened next to `action` on the wire.
    pub args: Map<String, Value>,
}

impl Request {
    /// Creates a request with no arguments.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            args: Map::new(),
        }
    }

    /// Adds an argument.
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    /// `listProperties` request.
    pub fn list_properties() -> Self {
        Self::new(actions::LIST_PROPERTIES)
    }

    /// `subscribe` request for the given property names.
    pub fn subscribe<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<Value> = names.into_iter().map(|n| Value::String(n.into())).collect();
        Self::new(actions::SUBSCRIBE).with_arg("properties", Value::Array(names))
    }

    /// `setProperty` request carrying the fields to change.
    pub fn set_property(name: impl Into<String>, value: PropertyValue) -> Self {
        Self::new(actions::SET_PROPERTY)
            .with_arg("property", Value::String(name.into()))
            .with_arg("value", Value::Object(value))
    }

    /// Returns the `properties` argument as a list of names.
    pub fn property_names(&self) -> ProtocolResult<Vec<PropertyName>> {
        string_list(&self.args, "properties")
    }

    /// Interprets a `setProperty` request.
    pub fn as_property_set(&self) -> ProtocolResult<PropertyChange> {
        expect_action(&self.action, actions::SET_PROPERTY)?;
        PropertyChange::from_fields(&self.args)
    }
}

/// A reply from the device.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Action this response answers.
    pub action: String,
    /// Result fields.
    pub result: Map<String, Value>,
}

impl Response {
    /// Creates a response with no result fields.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            result: Map::new(),
        }
    }

    /// `listProperties` response advertising the given names.
    pub fn property_list<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<Value> = names.into_iter().map(|n| Value::String(n.into())).collect();
        let mut response = Self::new(actions::LIST_PROPERTIES);
        response
            .result
            .insert("properties".into(), Value::Array(names));
        response
    }

    /// Extracts the property names from a `listProperties` response.
    pub fn property_names(&self) -> ProtocolResult<Vec<PropertyName>> {
        expect_action(&self.action, actions::LIST_PROPERTIES)?;
        string_list(&self.result, "properties")
    }
}

/// An unsolicited push from the device.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Event name.
    pub action: String,
    /// Event fields.
    pub payload: Map<String, Value>,
}

impl Event {
    /// Creates an event with no payload fields.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            payload: Map::new(),
        }
    }

    /// `propertyValueChanged` event.
    pub fn property_changed(name: impl Into<String>, value: PropertyValue) -> Self {
        let mut event = Self::new(actions::PROPERTY_VALUE_CHANGED);
        event
            .payload
            .insert("property".into(), Value::String(name.into()));
        event.payload.insert("value".into(), Value::Object(value));
        event
    }

    /// Interprets a `propertyValueChanged` event.
    pub fn as_property_change(&self) -> ProtocolResult<PropertyChange> {
        expect_action(&self.action, actions::PROPERTY_VALUE_CHANGED)?;
        PropertyChange::from_fields(&self.payload)
    }
}

/// A property name paired with the (partial) value it changed to.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    /// Property that changed.
    pub property: PropertyName,
    /// Changed fields.
    pub value: PropertyValue,
}

impl PropertyChange {
    fn from_fields(fields: &Map<String, Value>) -> ProtocolResult<Self> {
        let property = fields
            .get("property")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::missing_field("property"))?
            .to_string();

        let value = match fields.get("value") {
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(ProtocolError::invalid_structure(
                    "property value must be an object",
                ))
            }
            None => return Err(ProtocolError::missing_field("value")),
        };

        Ok(Self { property, value })
    }
}

/// One message unit on the duplex channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Request envelope.
    Request(Request),
    /// Response envelope.
    Response(Response),
    /// Event envelope.
    Event(Event),
}

impl Envelope {
    /// Returns the envelope discriminant.
    pub fn envelope_type(&self) -> EnvelopeType {
        match self {
            Envelope::Request(_) => EnvelopeType::Request,
            Envelope::Response(_) => EnvelopeType::Response,
            Envelope::Event(_) => EnvelopeType::Event,
        }
    }

    /// Returns the action carried by the envelope.
    pub fn action(&self) -> &str {
        match self {
            Envelope::Request(r) => &r.action,
            Envelope::Response(r) => &r.action,
            Envelope::Event(e) => &e.action,
        }
    }

    /// Returns the fields carried alongside the action.
    pub fn fields(&self) -> &Map<String, Value> {
        match self {
            Envelope::Request(r) => &r.args,
            Envelope::Response(r) => &r.result,
            Envelope::Event(e) => &e.payload,
        }
    }
}

impl From<Request> for Envelope {
    fn from(request: Request) -> Self {
        Envelope::Request(request)
    }
}

impl From<Response> for Envelope {
    fn from(response: Response) -> Self {
        Envelope::Response(response)
    }
}

impl From<Event> for Envelope {
    fn from(event: Event) -> Self {
        Envelope::Event(event)
    }
}

fn expect_action(actual: &str, expected: &'static str) -> ProtocolResult<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedAction {
            expected,
            actual: actual.to_string(),
        })
    }
}

fn string_list(fields: &Map<String, Value>, field: &'static str) -> ProtocolResult<Vec<String>> {
    let items = fields
        .get(field)
        .ok_or_else(|| ProtocolError::missing_field(field))?
        .as_array()
        .ok_or_else(|| ProtocolError::invalid_structure(format!("`{field}` must be an array")))?;

    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                ProtocolError::invalid_structure(format!("`{field}` must contain only strings"))
            })
        })
        .collect()
}
