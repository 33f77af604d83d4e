//! Listener sockets inherited from the supervisor.

use crate::WorkerError;
use std::os::unix::io::{FromRawFd, RawFd};
use vigil_core::protocol;

/// Rebuilds the listening sockets the supervisor bound and passed down as
/// numbered fd handles.
///
/// Returns an empty vector when the environment carries no handles (the
/// worker was started standalone).
pub fn inherit_listeners() -> Result<Vec<tokio::net::TcpListener>, WorkerError> {
    let Ok(spec) = std::env::var(protocol::ENV_LISTEN_FDS) else {
        return Ok(Vec::new());
    };

    let mut listeners = Vec::new();
    for part in spec.split(',').filter(|p| !p.trim().is_empty()) {
        let fd: RawFd = part
            .trim()
            .parse()
            .map_err(|_| WorkerError::BadListenFd {
                value: part.trim().to_string(),
            })?;

        // Safety: the supervisor bound this fd, cleared close-on-exec, and
        // handed it to exactly this child; nothing else owns it here.
        let std_listener = unsafe { std::net::TcpListener::from_raw_fd(fd) };
        std_listener.set_nonblocking(true)?;
        listeners.push(tokio::net::TcpListener::from_std(std_listener)?);
    }
    Ok(listeners)
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test body so the env mutations cannot race each other.
    #[test]
    fn listen_fd_env_parsing() {
        std::env::remove_var(protocol::ENV_LISTEN_FDS);
        assert!(inherit_listeners().unwrap().is_empty());

        std::env::set_var(protocol::ENV_LISTEN_FDS, "not-a-number");
        let err = inherit_listeners().unwrap_err();
        assert!(matches!(err, WorkerError::BadListenFd { .. }));
        std::env::remove_var(protocol::ENV_LISTEN_FDS);
    }
}
