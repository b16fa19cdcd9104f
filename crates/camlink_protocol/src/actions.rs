//! Action names understood by the device.

/// Request the list of property names the device exposes.
pub const LIST_PROPERTIES: &str = "listProperties";

/// Subscribe to change events for the listed properties.
pub const SUBSCRIBE: &str = "subscribe";

/// Ask the device to change a property.
pub const SET_PROPERTY: &str = "setProperty";

/// Event pushed by the device whenever a property changes.
pub const PROPERTY_VALUE_CHANGED: &str = "propertyValueChanged";
