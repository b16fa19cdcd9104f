//! Handling of requests arriving on the event channel.

use crate::device::Device;
use crate::error::{EmulatorError, EmulatorResult};
use camlink_protocol::{
    actions, decode_lines, encode, Envelope, Event, PropertyName, Request, Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Turns client requests into direct replies.
///
/// Replies go only to the requesting client. Property changes caused by a
/// request reach every client through the device's broadcast instead.
#[derive(Debug, Clone)]
pub struct RequestHandler {
    device: Arc<Device>,
    properties: Arc<[PropertyName]>,
}

impl RequestHandler {
    /// Creates a handler advertising `properties`.
    pub fn new(device: Arc<Device>, properties: Vec<PropertyName>) -> Self {
        Self {
            device,
            properties: properties.into(),
        }
    }

    /// Handles one text frame and returns the encoded replies.
    ///
    /// Malformed messages and unsupported requests are logged and dropped.
    pub fn handle_frame(&self, raw: &str) -> Vec<String> {
        let mut replies = Vec::new();
        for decoded in decode_lines(raw) {
            let request = match decoded {
                Ok(Envelope::Request(request)) => request,
                Ok(other) => {
                    warn!(kind = %other.envelope_type(), action = %other.action(), "ignoring non-request message");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "discarding malformed message");
                    continue;
                }
            };

            let action = request.action.clone();
            match self.handle_request(&request) {
                Ok(envelopes) => {
                    for envelope in envelopes {
                        match encode(&envelope) {
                            Ok(raw) => replies.push(raw),
                            Err(e) => warn!(action = %action, error = %e, "failed to encode reply"),
                        }
                    }
                }
                Err(e) => warn!(action = %action, error = %e, "request failed"),
            }
        }
        replies
    }

    /// Handles one decoded request.
    pub fn handle_request(&self, request: &Request) -> EmulatorResult<Vec<Envelope>> {
        match request.action.as_str() {
            actions::LIST_PROPERTIES => Ok(vec![Response::property_list(
                self.properties.iter().cloned(),
            )
            .into()]),
            actions::SUBSCRIBE => {
                let names = request.property_names()?;
                Ok(names
                    .into_iter()
                    .filter_map(|name| {
                        let value = self.device.get(&name);
                        if value.is_none() {
                            debug!(property = %name, "subscribe to unknown property");
                        }
                        value.map(|value| Event::property_changed(name, value).into())
                    })
                    .collect())
            }
            actions::SET_PROPERTY => {
                let change = request.as_property_set()?;
                self.device.merge(&change.property, &change.value)?;
                Ok(Vec::new())
            }
            other => Err(EmulatorError::InvalidRequest(format!(
                "unsupported action {other:?}"
            ))),
        }
    }

    /// The device this handler serves.
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}
