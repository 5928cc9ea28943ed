//! Archive plugins
//!
//! External processes that produce archives in formats relforge does not
//! build itself. See the `relforge-plugin` crate for the wire protocol.

mod connection;
pub mod mock;
mod registry;
mod transport;

pub use connection::{PluginConnection, PluginError};
pub use registry::{PluginLauncher, PluginRegistry, PluginStartError, ProcessLauncher, TeardownError};
pub use transport::{PluginTransport, ProcessTransport, TransportError};
