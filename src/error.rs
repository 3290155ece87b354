//! Error types for the git smart-transfer client.
//!
//! This module defines a single error enum used across framing, capability
//! negotiation, the fetch/push conversations, transports, and URL dispatch. It
//! integrates with `thiserror` for `Display`/`Error` impls and source chaining.

use std::collections::BTreeMap;

use thiserror::Error;

/// Unified error type for the git transport client.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Framing violation: bad length prefix, truncated payload, unknown
    /// side-band channel, or data received after a conversation's end.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server's first advertised line was `ERR <reason>`.
    #[error("server refused the request: {0}")]
    ServerRefused(String),

    /// The server reported a non-`ok` unpack status on push.
    #[error("server rejected the pack: {0}")]
    PackRejected(String),

    /// The server accepted the pack but rejected one or more ref updates.
    /// Carries the full per-ref outcome map (ref → failure reason), excluding
    /// refs that succeeded.
    #[error("{} ref update(s) rejected: {0:?}", .0.len())]
    RefUpdatesRejected(BTreeMap<String, String>),

    /// A location string could not be classified into a known transport.
    #[error("unknown git URL scheme: {0}")]
    UnknownScheme(String),

    /// Connect, resolve, or spawn failure at the transport layer.
    #[error("transport error: {0}")]
    Transport(String),

    /// I/O failure propagated verbatim from the underlying transport.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Build a [`TransportError::RefUpdatesRejected`] from the ref → reason map.
    pub fn ref_updates_rejected(failures: BTreeMap<String, String>) -> Self {
        TransportError::RefUpdatesRejected(failures)
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        TransportError::Protocol(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        TransportError::Transport(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
