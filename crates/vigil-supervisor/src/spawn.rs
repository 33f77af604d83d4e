//! Socket pre-binding and child spawning.

use crate::config::SupervisorConfig;
use std::io;
use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::process::Stdio;
use tokio::process::{Child, Command};
use vigil_core::protocol;

/// Binds the shared listening sockets and clears close-on-exec so children
/// inherit them. Accept contention across workers is resolved by the kernel.
pub(crate) fn bind_listeners(addrs: &[SocketAddr]) -> io::Result<Vec<std::net::TcpListener>> {
    let mut listeners = Vec::with_capacity(addrs.len());
    for addr in addrs {
        let listener = std::net::TcpListener::bind(addr)?;
        clear_cloexec(listener.as_raw_fd())?;
        listeners.push(listener);
    }
    Ok(listeners)
}

pub(crate) fn clear_cloexec(fd: RawFd) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFD);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFD, flags & !libc::FD_CLOEXEC) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Spawns one worker child with the listening fds and its identity in the
/// environment, stdout piped back for the heartbeat protocol.
pub(crate) fn spawn_worker(
    config: &SupervisorConfig,
    listen_fds: &[RawFd],
    slot: u32,
    generation: u64,
) -> io::Result<Child> {
    let fd_spec = listen_fds
        .iter()
        .map(|fd| fd.to_string())
        .collect::<Vec<_>>()
        .join(",");

    let mut command = Command::new(&config.worker_command.program);
    command
        .args(&config.worker_command.args)
        .env(protocol::ENV_LISTEN_FDS, fd_spec)
        .env(protocol::ENV_GENERATION, generation.to_string())
        .env(protocol::ENV_SLOT, slot.to_string())
        .stdout(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in &config.worker_command.envs {
        command.env(key, value);
    }

    command.spawn()
}

/// Sends TERM to a child, beginning its graceful drain.
pub(crate) fn send_term(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

/// Escalates to KILL for a child past its grace deadline.
pub(crate) fn send_kill(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
}
