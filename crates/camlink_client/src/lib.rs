//! # camlink client
//!
//! Keeps a local mirror of a camera's properties and notifies observers when
//! they change.
//!
//! This crate provides:
//! - Property store with shallow-merge updates
//! - Binding registry (any number of callbacks per property)
//! - Subscription state machine (connecting → list → subscribe → synced)
//! - Reconnect with exponential backoff
//! - Duplex channel abstraction with WebSocket and mock connectors
//! - HTTP transport for one-shot requests
//!
//! ## Architecture
//!
//! The device pushes property changes over one duplex channel. On every
//! (re)connect the client asks for the property list, subscribes to each
//! name, and then folds incoming change events into the mirror:
//!
//! 1. Open channel, send `listProperties`
//! 2. Track each listed name, send one `subscribe` per name
//! 3. Merge each `propertyValueChanged` event and fan it out to bindings
//!
//! The [`SubscriptionManager`] is a pure state machine; [`Session`] owns the
//! channel and runs it on a Tokio task.
//!
//! ## Key Invariants
//!
//! - Events for names the device did not list are ignored
//! - An observer sees the stored value already merged when it is called
//! - A failing observer never stops delivery to the others
//! - Backoff grows until a synced connection stays up for `stable_after`, then resets

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bindings;
mod config;
mod error;
mod http;
mod mirror;
mod session;
mod state;
mod store;
mod transport;
mod websocket;

pub use bindings::{BindingHandle, BindingRegistry, Callback, NotifyReport};
pub use config::{Backoff, ClientConfig, ReconnectConfig, DEFAULT_BASE_URL, DEFAULT_CHANNEL_PATH};
pub use error::{CallbackError, ClientError, ClientResult};
pub use http::HttpTransport;
pub use mirror::PropertyMirror;
pub use session::Session;
pub use state::{SessionStats, SubscriptionManager, SubscriptionState};
pub use store::{shallow_merge, PropertyStore};
pub use transport::{Channel, ChannelConnector, ChannelEvent, ChannelPeer, MockConnector};
pub use websocket::WebSocketConnector;
