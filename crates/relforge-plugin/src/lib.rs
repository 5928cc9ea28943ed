//! relforge plugin protocol
//!
//! Defines the JSON request/response envelope exchanged between relforge
//! and an archive plugin process over the plugin's stdin/stdout, one JSON
//! object per line, plus a small server loop plugin authors can embed.

pub mod archive;
pub mod error;
pub mod request;
pub mod response;
pub mod server;

pub use archive::{ArchiveFile, ArchiveRequest, ArchiveResponse, ArchiveSettings, BuildInfo};
pub use error::{ErrorCode, ErrorPayload};
pub use request::{HeartbeatPayload, Operation, PluginRequest};
pub use response::PluginResponse;
pub use server::{ArchiveHandler, PluginServer};

/// Protocol version spoken by this implementation.
pub const PROTOCOL_VERSION: i32 = 1;
