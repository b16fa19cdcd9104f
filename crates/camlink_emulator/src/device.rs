//! Emulated device state and the event hub.
//!
//! Every change to a property goes through [`Device::merge`], which updates
//! the stored value and broadcasts a `propertyValueChanged` event to every
//! connected client.

use crate::error::{EmulatorError, EmulatorResult};
use camlink_protocol::{
    encode, AutoExposure, ColorCorrection, Envelope, Event, Gain, PropertyName, PropertyValue,
    Shutter, WhiteBalance,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

const EVENT_BUFFER: usize = 256;

/// Property state of the emulated camera plus the fan-out to its clients.
#[derive(Debug)]
pub struct Device {
    properties: RwLock<HashMap<PropertyName, PropertyValue>>,
    events: broadcast::Sender<String>,
    disconnect: watch::Sender<u64>,
    connections: AtomicUsize,
    auto_white_balance_runs: AtomicU64,
}

impl Device {
    /// Creates a device with every known property at its power-on value.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (disconnect, _) = watch::channel(0);
        Self {
            properties: RwLock::new(power_on_state()),
            events,
            disconnect,
            connections: AtomicUsize::new(0),
            auto_white_balance_runs: AtomicU64::new(0),
        }
    }

    /// Current value of a property.
    pub fn get(&self, name: &str) -> Option<PropertyValue> {
        self.properties.read().get(name).cloned()
    }

    /// Shallow-merges `partial` into a property and broadcasts the result.
    pub fn merge(&self, name: &str, partial: &PropertyValue) -> EmulatorResult<PropertyValue> {
        let merged = {
            let mut properties = self.properties.write();
            let current = properties
                .get_mut(name)
                .ok_or_else(|| EmulatorError::UnknownProperty(name.to_string()))?;
            for (key, value) in partial {
                current.insert(key.clone(), value.clone());
            }
            current.clone()
        };
        self.broadcast(name, &merged)?;
        Ok(merged)
    }

    /// Applies a sensor reading: gain, shutter speed from exposure time, and
    /// colour temperature.
    pub fn simulate_sensor(
        &self,
        gain: f32,
        exposure_us: u32,
        temperature: u32,
    ) -> EmulatorResult<()> {
        if exposure_us == 0 {
            return Err(EmulatorError::InvalidRequest(
                "exposure time must be positive".into(),
            ));
        }
        let shutter_speed = 1_000_000 / exposure_us;

        self.merge("/video/gain", &object([("gain", Value::from(gain))]))?;
        self.merge(
            "/video/shutter",
            &object([("shutterSpeed", Value::from(shutter_speed))]),
        )?;
        self.merge(
            "/video/whiteBalance",
            &object([("whiteBalance", Value::from(temperature))]),
        )?;
        Ok(())
    }

    /// Switches auto exposure on or off.
    pub fn simulate_controls(&self, auto_exposure: bool) -> EmulatorResult<()> {
        let mode = if auto_exposure { "Continuous" } else { "Off" };
        self.merge("/video/autoExposure", &object([("mode", Value::from(mode))]))?;
        Ok(())
    }

    /// Records a one-shot auto white balance run.
    pub fn run_auto_white_balance(&self) -> u64 {
        self.auto_white_balance_runs.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Number of auto white balance runs so far.
    pub fn auto_white_balance_runs(&self) -> u64 {
        self.auto_white_balance_runs.load(Ordering::SeqCst)
    }

    /// Drops every live WebSocket connection.
    pub fn disconnect_all(&self) {
        self.disconnect.send_modify(|generation| *generation += 1);
        debug!("disconnecting all clients");
    }

    /// Number of open WebSocket connections.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Receiver of every broadcast event, already encoded.
    pub fn subscribe_events(&self) -> broadcast::Receiver<String> {
        self.events.subscribe()
    }

    /// Receiver that changes on every [`disconnect_all`](Self::disconnect_all).
    pub fn subscribe_disconnects(&self) -> watch::Receiver<u64> {
        self.disconnect.subscribe()
    }

    pub(crate) fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn connection_closed(&self) {
        self.connections.fetch_sub(1, Ordering::SeqCst);
    }

    fn broadcast(&self, name: &str, value: &PropertyValue) -> EmulatorResult<()> {
        let raw = encode(&Envelope::Event(Event::property_changed(name, value.clone())))?;
        if self.events.send(raw).is_err() {
            debug!(property = %name, "no clients connected for change");
        }
        Ok(())
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::new()
    }
}

fn object<const N: usize>(fields: [(&str, Value); N]) -> PropertyValue {
    fields
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn as_object<T: serde::Serialize>(value: &T) -> PropertyValue {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!(value = %other, "typed view did not serialize to an object");
            PropertyValue::new()
        }
        Err(e) => {
            warn!(error = %e, "typed view did not serialize");
            PropertyValue::new()
        }
    }
}

fn power_on_state() -> HashMap<PropertyName, PropertyValue> {
    let color = as_object(&ColorCorrection::default());
    let auto_exposure = AutoExposure {
        mode: "Off".into(),
        kind: String::new(),
    };

    [
        ("/video/gain", as_object(&Gain::default())),
        ("/video/shutter", as_object(&Shutter::default())),
        ("/video/whiteBalance", as_object(&WhiteBalance::default())),
        ("/video/autoExposure", as_object(&auto_exposure)),
        ("/colorCorrection/lift", color.clone()),
        ("/colorCorrection/gamma", color.clone()),
        ("/colorCorrection/gain", color.clone()),
        ("/colorCorrection/offset", color),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value))
    .collect()
}
