//! Client-wide options for the git smart-transfer conversations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Options that shape capability negotiation and transport behavior.
///
/// Mirrors the way the rest of the ecosystem carries small, `serde`-backed
/// option structs with sensible defaults rather than threading a dozen loose
/// booleans through every call site.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClientOptions {
    /// Request `thin-pack` on fetch. Degrades silently if the server does not
    /// advertise it.
    pub thin_packs: bool,

    /// Value sent as the `agent=<value>` capability token on both fetch and
    /// push. Purely informational; servers must never require it.
    pub agent: String,

    /// Per-service overrides for the remote command path used by the SSH
    /// transport, e.g. `{"upload-pack": "/usr/local/bin/git-upload-pack"}`.
    /// Falls back to `git-<service>` when a service has no override.
    pub ssh_command_paths: HashMap<String, String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            thin_packs: true,
            agent: format!("git-transport/{}", env!("CARGO_PKG_VERSION")),
            ssh_command_paths: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_thin_packs() {
        let opts = ClientOptions::default();
        assert!(opts.thin_packs);
        assert!(opts.agent.starts_with("git-transport/"));
        assert!(opts.ssh_command_paths.is_empty());
    }
}
