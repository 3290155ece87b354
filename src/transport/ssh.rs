//! The SSH transport: spawns the system `ssh` client and speaks the smart
//! protocol over its stdin/stdout, with the remote `git-<service>` command
//! run by the SSH server. Ported from `dulwich.client.SSHVendor` /
//! `SSHGitClient` (subprocess-based vendor, the default when no paramiko-like
//! alternative is configured).

use std::io::{self, ChildStdin, ChildStdout, Write};
use std::os::unix::io::AsRawFd;
use std::process::{Child, Command, Stdio};

use tracing::debug;

use super::{can_read_without_blocking, Service, Transport};
use crate::config::ClientOptions;
use crate::error::TransportError;

pub struct SshTransport {
    child: Child,
    stdout: ChildStdout,
}

/// Owns the spawned `ssh` process alongside its stdin half, so the child is
/// only reaped once the conversation driver drops the writer — not the
/// instant `into_io` splits the transport (`Child` cannot be partially moved
/// out of a type with a `Drop` impl, and reaping any earlier would wait on a
/// process that hasn't been told to finish yet).
pub struct SshWriter {
    child: Child,
    stdin: Option<ChildStdin>,
}

impl Write for SshWriter {
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

impl Drop for SshWriter {
    fn drop(&mut self) {
        // Close our end first so the child sees EOF on its stdin instead of
        // blocking forever on a read, then reap it.
        self.stdin.take();
        let _ = self.child.wait();
    }
}

impl SshTransport {
    /// Spawns `ssh [-p <port>] [<user>@]<host> <remote-command> '<path>'`.
    /// The remote command defaults to `git-<service>` and can be overridden
    /// per-service via [`ClientOptions::ssh_command_paths`].
    pub fn connect(
        user: Option<&str>,
        host: &str,
        port: Option<u16>,
        path: &str,
        service: Service,
        options: &ClientOptions,
    ) -> Result<Self, TransportError> {
        let remote_command = options
            .ssh_command_paths
            .get(service.name())
            .map(String::as_str)
            .unwrap_or_else(|| service.name());

        let destination = match user {
            Some(u) => format!("{u}@{host}"),
            None => host.to_string(),
        };

        let mut cmd = Command::new("ssh");
        cmd.arg("-x");
        if let Some(p) = port {
            cmd.arg("-p").arg(p.to_string());
        }
        cmd.arg(destination);
        cmd.arg(format!("{remote_command} '{path}'"));
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped());

        debug!(?cmd, "spawning ssh transport");
        let mut child = cmd.spawn().map_err(TransportError::Io)?;
        let stdout = child.stdout.take().expect("stdout was piped");
        Ok(Self { child, stdout })
    }
}

impl SshTransport {
    /// The remote process's stdout file descriptor, for callers that need a
    /// standalone readiness probe that outlives `into_io`'s split.
    pub fn raw_fd(&self) -> std::os::unix::io::RawFd {
        self.stdout.as_raw_fd()
    }
}

impl Transport for SshTransport {
    type Reader = ChildStdout;
    type Writer = SshWriter;

    fn into_io(mut self) -> (Self::Reader, Self::Writer) {
        let stdin = self.child.stdin.take().expect("stdin was piped");
        (
            self.stdout,
            SshWriter {
                child: self.child,
                stdin: Some(stdin),
            },
        )
    }

    fn can_read(&self) -> Result<bool, TransportError> {
        can_read_without_blocking(self.stdout.as_raw_fd())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_override_wins_over_default_name() {
        let mut options = ClientOptions::default();
        options
            .ssh_command_paths
            .insert("git-upload-pack".to_string(), "/opt/git/bin/git-upload-pack".to_string());
        let remote_command = options
            .ssh_command_paths
            .get(Service::UploadPack.name())
            .map(String::as_str)
            .unwrap_or_else(|| Service::UploadPack.name());
        assert_eq!(remote_command, "/opt/git/bin/git-upload-pack");
    }

    #[test]
    fn falls_back_to_default_service_name() {
        let options = ClientOptions::default();
        let remote_command = options
            .ssh_command_paths
            .get(Service::ReceivePack.name())
            .map(String::as_str)
            .unwrap_or_else(|| Service::ReceivePack.name());
        assert_eq!(remote_command, "git-receive-pack");
    }
}
