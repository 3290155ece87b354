//! The `git://` transport: a bare TCP socket to the `git-daemon` port,
//! announced with a single pkt-line naming the service and repository path.
//! Ported from `dulwich.client.TCPGitClient`.

use std::net::{TcpStream, ToSocketAddrs};
use std::os::unix::io::AsRawFd;

use tracing::debug;

use super::{can_read_without_blocking, Service, Transport};
use crate::error::TransportError;

pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connects to `host:port`, trying every address the hostname resolves
    /// to in order and returning the first successful connection (mirrors
    /// `socket.create_connection`'s fallback behavior rather than failing on
    /// the first unreachable address).
    pub fn connect(host: &str, port: u16) -> Result<Self, TransportError> {
        let addrs = (host, port).to_socket_addrs().map_err(TransportError::Io)?;
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect(addr) {
                Ok(stream) => {
                    stream.set_nodelay(true).map_err(TransportError::Io)?;
                    debug!(%addr, "connected to git daemon");
                    return Ok(Self { stream });
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err
            .map(TransportError::Io)
            .unwrap_or_else(|| TransportError::transport(format!("could not resolve {host}"))))
    }

    /// The announce line sent as the connection's first pkt-line:
    /// `<service> <path>\0host=<host>\0`. A path of the form `/~user/...`
    /// has its leading slash stripped so the server sees `~user/...`, the
    /// home-directory-expansion convention `git-daemon` relies on.
    pub fn announce_line(service: Service, path: &str, host: &str) -> String {
        let path = path.strip_prefix("/~").map(|rest| format!("~{rest}")).unwrap_or_else(|| path.to_string());
        format!("{} {}\0host={}\0", service.name(), path, host)
    }
}

impl TcpTransport {
    /// The underlying socket's file descriptor, for callers that need to
    /// build a standalone readiness probe that outlives `into_io`'s split.
    pub fn raw_fd(&self) -> std::os::unix::io::RawFd {
        self.stream.as_raw_fd()
    }
}

impl Transport for TcpTransport {
    type Reader = TcpStream;
    type Writer = TcpStream;

    fn into_io(self) -> (Self::Reader, Self::Writer) {
        let writer = self.stream.try_clone().expect("socket clone");
        (self.stream, writer)
    }

    fn can_read(&self) -> Result<bool, TransportError> {
        can_read_without_blocking(self.stream.as_raw_fd())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announce_line_embeds_service_path_and_host() {
        let line = TcpTransport::announce_line(Service::UploadPack, "/repo.git", "example.com");
        assert_eq!(line, "git-upload-pack /repo.git\0host=example.com\0");
    }

    #[test]
    fn announce_line_strips_leading_slash_from_home_relative_path() {
        let line = TcpTransport::announce_line(Service::UploadPack, "/~alice/repo.git", "example.com");
        assert_eq!(line, "git-upload-pack ~alice/repo.git\0host=example.com\0");
    }
}
