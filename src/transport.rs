//! Transport seam between the client and the Gridlock server.
//!
//! A [`Transport`] carries one JSON envelope per message in each direction:
//! the client writes [`ClientMessage`](crate::protocol::ClientMessage)
//! envelopes (starting with `Authenticate`) and reads
//! [`ServerMessage`](crate::protocol::ServerMessage) envelopes. The transport
//! treats both as opaque text; framing and connection state are its whole job.
//!
//! Connection setup stays outside the trait — a WebSocket wants a URL, a unit
//! test wants a channel pair, and neither shape fits the other. Construct a
//! connected transport first, then hand it to `GridlockClient::start`.
//!
//! # Writing a transport
//!
//! The test suites in this crate run the client over channel-backed
//! transports like this one:
//!
//! ```rust
//! use async_trait::async_trait;
//! use tokio::sync::mpsc;
//!
//! use gridlock_client::error::GridlockError;
//! use gridlock_client::transport::Transport;
//!
//! /// Loopback transport: the other ends of these channels play the server.
//! struct ChannelTransport {
//!     incoming: mpsc::UnboundedReceiver<String>,
//!     outgoing: mpsc::UnboundedSender<String>,
//! }
//!
//! #[async_trait]
//! impl Transport for ChannelTransport {
//!     async fn send(&mut self, message: String) -> Result<(), GridlockError> {
//!         self.outgoing
//!             .send(message)
//!             .map_err(|_| GridlockError::TransportClosed)
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, GridlockError>> {
//!         // `mpsc::Receiver::recv` is cancel-safe, which `recv` requires.
//!         self.incoming.recv().await.map(Ok)
//!     }
//!
//!     async fn close(&mut self) -> Result<(), GridlockError> {
//!         self.incoming.close();
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::GridlockError;

/// A bidirectional text-message channel speaking the Gridlock envelope
/// protocol.
///
/// Every call to [`send`](Transport::send) transmits one complete JSON
/// envelope and every [`recv`](Transport::recv) yields one; partial frames
/// must never cross this boundary. The trait is object-safe, though the
/// client monomorphizes over `impl Transport`.
///
/// # Cancel safety
///
/// The client's background loop polls [`recv`](Transport::recv) inside
/// `tokio::select!`, so `recv` **MUST** be cancel-safe: a future dropped
/// between frames must not lose data.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one JSON envelope to the server.
    ///
    /// # Errors
    ///
    /// Returns [`GridlockError::TransportSend`] when the message cannot be
    /// written, or [`GridlockError::TransportClosed`] after a close.
    async fn send(&mut self, message: String) -> Result<(), GridlockError>;

    /// Receive the next JSON envelope from the server.
    ///
    /// - `Some(Ok(text))` — one complete envelope
    /// - `Some(Err(e))` — a transport-level failure
    /// - `None` — the server closed the connection cleanly
    ///
    /// Must be cancel-safe (see the [trait docs](Transport)).
    async fn recv(&mut self) -> Option<Result<String, GridlockError>>;

    /// Close the connection gracefully.
    ///
    /// Implementations should release resources even when the close
    /// handshake itself fails; callers treat any further `send` as an error
    /// and any further `recv` as end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns an error when the graceful shutdown fails.
    async fn close(&mut self) -> Result<(), GridlockError>;
}
