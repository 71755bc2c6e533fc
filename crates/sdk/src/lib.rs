//! Client SDK for the tracking gateway.
//!
//! [`Tracker`] queues events and flushes them over a background WebSocket
//! task when the batch fills or the connection goes idle. Buffering is
//! in-memory only; events lost across a process crash are lost.

pub mod config;
pub mod queue;
pub mod tracker;
pub mod transport;
pub mod wire;

pub use config::SdkConfig;
pub use tracker::{ScrollDebouncer, Tracker};
pub use transport::{EventSink, WsTransport};
