//! Client side of the scenewright editor bridge.
//!
//! [`BridgeClient`] opens a transport (TCP or a spawned editor's stdio),
//! performs the `hello` handshake and correlates requests with responses.

mod client;
mod correlator;
mod error;

pub use client::BridgeClient;
pub use correlator::PendingRequests;
pub use error::{ClientError, CloseReason};
pub use scenewright_core::{Capabilities, RemoteError};
