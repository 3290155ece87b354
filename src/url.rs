//! URL-to-transport dispatch: decides which of the three transports a git
//! URL resolves to, and the path/host/port the transport should use.
//!
//! Ported from `dulwich.client.get_transport_and_path` / `parse_rsync_url`;
//! rule ordering matches the original exactly (spec.md §4.H), since later
//! rules are only reached when every earlier one fails to match.

use crate::error::TransportError;

/// The resolved destination for a git URL, before a transport is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Tcp {
        host: String,
        port: u16,
        path: String,
    },
    Ssh {
        user: Option<String>,
        host: String,
        port: Option<u16>,
        path: String,
    },
    Local {
        path: String,
    },
}

const DEFAULT_GIT_PORT: u16 = 9418;

/// Resolve a git URL or scp-like `user@host:path` string to a [`Destination`].
///
/// Rule order (first match wins):
/// 1. `git://host[:port]/path` → TCP.
/// 2. `git+ssh://` or `ssh://[user@]host[:port]/path` → SSH.
/// 3. Any other `scheme://...` with no recognized scheme → `UnknownScheme`.
/// 4. `user@host:path` (no `://`, a colon before the first `/`) → SSH.
/// 5. Otherwise the string is a local path, unchanged, for the local
///    subprocess transport.
pub fn parse(url: &str) -> Result<Destination, TransportError> {
    if let Some(rest) = url.strip_prefix("git://") {
        let (authority, path) = split_authority(rest);
        let (host, port) = split_host_port(authority, DEFAULT_GIT_PORT)?;
        return Ok(Destination::Tcp {
            host,
            port,
            path: normalize_path(path),
        });
    }

    for prefix in ["git+ssh://", "ssh://"] {
        if let Some(rest) = url.strip_prefix(prefix) {
            let (authority, path) = split_authority(rest);
            let (user, hostport) = split_user(authority);
            let (host, port) = split_host_port(hostport, 0)?;
            return Ok(Destination::Ssh {
                user,
                host,
                port: if port == 0 { None } else { Some(port) },
                path: normalize_path(path),
            });
        }
    }

    if let Some(scheme_end) = url.find("://") {
        let scheme = &url[..scheme_end];
        return Err(TransportError::UnknownScheme(scheme.to_string()));
    }

    if let Some(slash_pos) = url.find('/') {
        if let Some(colon_pos) = url[..slash_pos].find(':') {
            return scp_like(url, colon_pos);
        }
    } else if let Some(colon_pos) = url.find(':') {
        return scp_like(url, colon_pos);
    }

    Ok(Destination::Local {
        path: url.to_string(),
    })
}

fn scp_like(url: &str, colon_pos: usize) -> Result<Destination, TransportError> {
    let (authority, path) = (&url[..colon_pos], &url[colon_pos + 1..]);
    let (user, host) = split_user(authority);
    Ok(Destination::Ssh {
        user,
        host: host.to_string(),
        port: None,
        path: path.to_string(),
    })
}

/// Splits `host[:port]/path` into the authority portion and the path
/// (always starting with `/`, defaulted to `/` if the URL had none).
fn split_authority(rest: &str) -> (&str, &str) {
    match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/"),
    }
}

fn split_user(authority: &str) -> (Option<String>, &str) {
    match authority.split_once('@') {
        Some((user, host)) => (Some(user.to_string()), host),
        None => (None, authority),
    }
}

fn split_host_port(hostport: &str, default_port: u16) -> Result<(String, u16), TransportError> {
    match hostport.rsplit_once(':') {
        Some((host, port_str)) => {
            let port = port_str
                .parse::<u16>()
                .map_err(|_| TransportError::protocol(format!("invalid port `{port_str}`")))?;
            Ok((host.to_string(), port))
        }
        None => Ok((hostport.to_string(), default_port)),
    }
}

/// Dispatch keeps the path untouched; the `/~user/path` home-directory
/// convention is a TCP-announce-line detail (spec.md §4.G), applied by
/// `TcpTransport::announce_line` rather than here.
fn normalize_path(path: &str) -> String {
    path.to_string()
}
