//! Bundled [`Transport`](crate::Transport) implementations, each behind a
//! Cargo feature.
//!
//! Only WebSocket ships today (`transport-websocket`, on by default); custom
//! transports implement the trait directly, see
//! [`transport`](crate::transport).

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::WebSocketTransport;
