//! In-process editor host and the server side of the bridge.
//!
//! - [`EditorHost`] models the editor: open scenes, text resources,
//!   singletons and an undo transaction log.
//! - [`Dispatcher`] routes method names to host operations, including `batch`.
//! - [`EditorServer`] authenticates connections and feeds their requests to a
//!   single dispatcher thread.

pub mod classdb;
mod dispatch;
mod handshake;
mod host;
pub mod objects;
mod params;
pub mod scene;
mod server;
pub mod undo;

pub use dispatch::{BATCH_METHOD, Dispatcher, capabilities};
pub use handshake::HandshakeGate;
pub use host::{EditorHost, STATE_DIR, UNSAFE_GUARD};
pub use scene::SCENE_SUFFIX;
pub use server::{DEFAULT_HANDSHAKE_TIMEOUT, DispatcherHandle, EditorServer, HostError};
