//! Non-blocking readiness probe shared by every transport that exposes a raw
//! file descriptor (TCP sockets, subprocess pipes). Ported from dulwich's
//! `_fileno_can_read`, which uses `select.select` with a zero timeout; this
//! uses `libc::poll` instead since it works uniformly across sockets and
//! pipes without the `FD_SETSIZE` ceiling `select` imposes.

use crate::error::TransportError;

#[cfg(unix)]
pub fn can_read_without_blocking(fd: std::os::unix::io::RawFd) -> Result<bool, TransportError> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: `pfd` is a single valid pollfd on the stack, borrowed for the
    // duration of this call only; a zero timeout makes poll non-blocking.
    let rc = unsafe { libc::poll(&mut pfd, 1, 0) };
    if rc < 0 {
        return Err(TransportError::Io(std::io::Error::last_os_error()));
    }
    Ok(rc > 0 && pfd.revents & (libc::POLLIN | libc::POLLHUP) != 0)
}

#[cfg(not(unix))]
pub fn can_read_without_blocking(_fd: i32) -> Result<bool, TransportError> {
    // No portable non-blocking probe off Unix; callers fall back to the
    // blocking have/ack loop variant (spec.md §5, "advisory only").
    Ok(false)
}
