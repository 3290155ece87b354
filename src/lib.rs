//! Client-side implementation of the Git smart transfer protocol: pkt-line
//! framing, capability negotiation, and the upload-pack/receive-pack
//! conversations over `git://`, `ssh://` and local transports.

pub mod capability;
pub mod client;
pub mod config;
pub mod error;
pub mod fetch;
pub mod id;
pub mod pktline;
pub mod push;
pub mod report_status;
pub mod sideband;
pub mod transport;
pub mod url;

pub use client::Client;
pub use config::ClientOptions;
pub use error::{Result, TransportError};
pub use id::{IdWidth, ObjectId};
