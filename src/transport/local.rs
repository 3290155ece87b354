//! The local transport: runs `git <service> <path>` as a direct subprocess,
//! no network hop at all. Ported from `dulwich.client.SubprocessGitClient` /
//! `SubprocessWrapper`.

use std::io::{self, ChildStdin, ChildStdout, Write};
use std::os::unix::io::AsRawFd;
use std::process::{Child, Command, Stdio};

use tracing::debug;

use super::{can_read_without_blocking, Service, Transport};
use crate::error::TransportError;

pub struct LocalTransport {
    child: Child,
    stdout: ChildStdout,
}

/// Owns the spawned `git <service>` process alongside its stdin half; see
/// `SshWriter` in `transport::ssh` for why reaping is deferred to this
/// writer's drop rather than the transport's.
pub struct LocalWriter {
    child: Child,
    stdin: Option<ChildStdin>,
}

impl Write for LocalWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stdin
            .as_mut()
            .expect("stdin taken only on drop")
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdin.as_mut().expect("stdin taken only on drop").flush()
    }
}

impl Drop for LocalWriter {
    fn drop(&mut self) {
        self.stdin.take();
        let _ = self.child.wait();
    }
}

impl LocalTransport {
    pub fn connect(path: &str, service: Service) -> Result<Self, TransportError> {
        let mut cmd = Command::new("git");
        cmd.arg(service.subcommand()).arg(path);
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped());

        debug!(?cmd, "spawning local transport");
        let mut child = cmd.spawn().map_err(TransportError::Io)?;
        let stdout = child.stdout.take().expect("stdout was piped");
        Ok(Self { child, stdout })
    }
}

impl LocalTransport {
    /// The child process's stdout file descriptor, for callers that need a
    /// standalone readiness probe that outlives `into_io`'s split.
    pub fn raw_fd(&self) -> std::os::unix::io::RawFd {
        self.stdout.as_raw_fd()
    }
}

impl Transport for LocalTransport {
    type Reader = ChildStdout;
    type Writer = LocalWriter;

    fn into_io(mut self) -> (Self::Reader, Self::Writer) {
        let stdin = self.child.stdin.take().expect("stdin was piped");
        (
            self.stdout,
            LocalWriter {
                child: self.child,
                stdin: Some(stdin),
            },
        )
    }

    fn can_read(&self) -> Result<bool, TransportError> {
        can_read_without_blocking(self.stdout.as_raw_fd())
    }
}
