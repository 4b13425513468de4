//! The vlog control socket: a process-wide Unix datagram endpoint that
//! accepts `set`/`list` text commands and authenticates the sender before
//! acting on them.
//!
//! Grounded on the original's credentialed vlog socket: prefer
//! `SCM_CREDENTIALS` when available, fall back to `stat`-ing the peer's
//! bound path, and never let a `SCM_RIGHTS` fd survive past the datagram
//! that carried it.

use std::fs;
use std::io::IoSliceMut;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::socket::{recvmsg, sockopt, ControlMessageOwned, MsgFlags, UnixAddr};
use nix::unistd::Uid;

use crate::error::{Error, Result};
use crate::logging::Handle as LogHandle;

const MAX_DATAGRAM: usize = 4096;
const CRED_WINDOW_SECS: i64 = 30;

/// Server half. Binds a datagram socket at a well-known path and services
/// one inbound request at a time from `service_one`.
pub struct ControlSocket {
    sock: UnixDatagram,
    path: PathBuf,
}

impl ControlSocket {
    /// `path_override` is either an absolute bind path (used as-is) or a
    /// verbatim suffix appended to the default `/tmp/vlogs.<pid>`. `None`
    /// binds the bare default path.
    pub fn bind(path_override: Option<&str>) -> Result<ControlSocket> {
        let path = server_bind_path(path_override);
        let _ = fs::remove_file(&path);
        let sock = UnixDatagram::bind(&path)?;
        sock.set_nonblocking(true)?;
        enable_passcred(sock.as_raw_fd())?;
        Ok(ControlSocket { sock, path })
    }

    pub fn raw_fd(&self) -> RawFd {
        self.sock.as_raw_fd()
    }

    /// Blocks (via poll) until a datagram is pending, then services it.
    pub fn wait_and_service_one(&self, log: &LogHandle) -> Result<()> {
        wait_readable(self.sock.as_raw_fd(), None)?;
        self.service_one(log)
    }

    /// Receives, authenticates, and replies to exactly one pending
    /// datagram. Rejected requests are logged and silently dropped: no
    /// reply is sent to an unauthenticated peer.
    pub fn service_one(&self, log: &LogHandle) -> Result<()> {
        let mut storage = [0u8; MAX_DATAGRAM];
        let mut cmsg_space = nix::cmsg_space!(libc::ucred, [RawFd; 4]);
        let mut iov = [IoSliceMut::new(&mut storage)];
        let msg = recvmsg::<UnixAddr>(
            self.sock.as_raw_fd(),
            &mut iov,
            Some(&mut cmsg_space),
            MsgFlags::empty(),
        )?;

        let mut peer_uid = None;
        let mut rights: Vec<RawFd> = Vec::new();
        for cmsg in msg.cmsgs()? {
            match cmsg {
                ControlMessageOwned::ScmCredentials(cred) => peer_uid = Some(cred.uid()),
                ControlMessageOwned::ScmRights(fds) => rights.extend(fds),
                _ => {}
            }
        }
        // Any fd handed to us over SCM_RIGHTS must not outlive this
        // function; otherwise a malicious peer exhausts our fd table one
        // datagram at a time.
        for fd in rights {
            let _ = nix::unistd::close(fd);
        }

        let my_uid = Uid::current().as_raw();
        let authenticated = match peer_uid {
            Some(uid) => uid == 0 || uid == my_uid,
            None => msg
                .address
                .as_ref()
                .and_then(UnixAddr::path)
                .is_some_and(|p| stat_authenticates(p, my_uid)),
        };
        if !authenticated {
            tracing::warn!(uid = ?peer_uid, "rejecting control socket request from unauthenticated peer");
            return Ok(());
        }

        let n = msg.bytes;
        let request = String::from_utf8_lossy(&storage[..n]);
        let reply = handle_command(request.trim(), log);

        if let Some(reply_path) = msg.address.as_ref().and_then(UnixAddr::path) {
            let _ = self.sock.send_to(reply.as_bytes(), reply_path);
        }
        Ok(())
    }
}

impl Drop for ControlSocket {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn server_bind_path(path_override: Option<&str>) -> PathBuf {
    match path_override {
        Some(p) if Path::new(p).is_absolute() => PathBuf::from(p),
        Some(suffix) => PathBuf::from(format!("/tmp/vlogs.{}{suffix}", std::process::id())),
        None => PathBuf::from(format!("/tmp/vlogs.{}", std::process::id())),
    }
}

fn enable_passcred(fd: RawFd) -> Result<()> {
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    nix::sys::socket::setsockopt(&borrowed, sockopt::PassCred, &true)?;
    Ok(())
}

/// Fallback authentication when the platform didn't hand us
/// `SCM_CREDENTIALS`: trust the claimed peer path only if it really is a
/// socket, owned by root or us, and was touched within the last
/// `CRED_WINDOW_SECS` seconds (an attacker reusing a stale bind path can't
/// satisfy all three).
fn stat_authenticates(peer_path: &Path, my_uid: u32) -> bool {
    let meta = match fs::metadata(peer_path) {
        Ok(m) => m,
        Err(_) => return false,
    };
    if !meta.file_type().is_socket() {
        return false;
    }
    if meta.uid() != 0 && meta.uid() != my_uid {
        return false;
    }
    let now = match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(_) => return false,
    };
    let recent = |t: i64| (now - t).abs() < CRED_WINDOW_SECS;
    recent(meta.mtime()) && recent(meta.ctime()) && recent(meta.atime())
}

fn handle_command(request: &str, log: &LogHandle) -> String {
    if let Some(directive) = request.strip_prefix("set ") {
        match log.set_directive(directive.trim()) {
            Ok(()) => "ack".to_string(),
            Err(e) => e,
        }
    } else if request == "list" {
        log.current()
    } else {
        "nak".to_string()
    }
}

/// Client half. Binds its own datagram socket so replies have somewhere to
/// land, and retries a request up to 3 times total on a 1-second
/// per-attempt poll timeout.
pub struct ControlClient {
    sock: UnixDatagram,
    client_path: PathBuf,
    server_path: PathBuf,
}

impl ControlClient {
    /// `peer` is either an absolute server bind path or a bare pid/suffix
    /// appended to `/tmp/vlogs.`.
    pub fn connect(peer: &str) -> Result<ControlClient> {
        let client_path = PathBuf::from(format!("/tmp/vlog.{}", std::process::id()));
        let _ = fs::remove_file(&client_path);
        let sock = UnixDatagram::bind(&client_path)?;
        sock.set_nonblocking(true)?;
        let server_path = if Path::new(peer).is_absolute() {
            PathBuf::from(peer)
        } else {
            PathBuf::from(format!("/tmp/vlogs.{peer}"))
        };
        Ok(ControlClient {
            sock,
            client_path,
            server_path,
        })
    }

    /// Sends `command` and waits for a reply, retrying up to 3 attempts
    /// total. A failure sending the datagram itself is never retried; only
    /// a reply timeout is.
    pub fn request(&self, command: &str) -> Result<String> {
        const ATTEMPTS: u32 = 3;
        for attempt in 0..ATTEMPTS {
            self.sock.send_to(command.as_bytes(), &self.server_path)?;
            match self.recv_with_timeout(Duration::from_secs(1)) {
                Ok(reply) => return Ok(reply),
                Err(Error::Again) if attempt + 1 < ATTEMPTS => continue,
                Err(e) => return Err(e),
            }
        }
        Err(Error::Again)
    }

    fn recv_with_timeout(&self, timeout: Duration) -> Result<String> {
        if !wait_readable(self.sock.as_raw_fd(), Some(timeout))? {
            return Err(Error::Again);
        }
        let mut buf = [0u8; MAX_DATAGRAM];
        let n = self.sock.recv(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
    }
}

impl Drop for ControlClient {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.client_path);
    }
}

/// Polls `fd` for readability. `None` blocks indefinitely; `Some(d)` returns
/// `Ok(false)` on timeout rather than erroring, since a timed-out poll is a
/// normal retry signal here, not a transport failure.
fn wait_readable(fd: RawFd, timeout: Option<Duration>) -> Result<bool> {
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    let mut fds = [PollFd::new(&borrowed, PollFlags::POLLIN)];
    let poll_timeout = match timeout {
        Some(d) => PollTimeout::from(d.as_millis().min(u16::MAX as u128) as u16),
        None => PollTimeout::NONE,
    };
    let n = poll(&mut fds, poll_timeout)?;
    Ok(n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_set_list_and_unknown_commands() {
        let log = crate::logging::init("info").expect("global subscriber set once per test binary");
        assert_eq!(handle_command("set dpif=debug", &log), "ack");
        assert!(handle_command("list", &log).contains("dpif=debug"));
        assert_eq!(handle_command("bogus", &log), "nak");
    }

    #[test]
    fn server_bind_path_uses_pid_and_suffix() {
        let p = server_bind_path(None);
        assert_eq!(p, PathBuf::from(format!("/tmp/vlogs.{}", std::process::id())));
        let p = server_bind_path(Some("-second"));
        assert_eq!(
            p,
            PathBuf::from(format!("/tmp/vlogs.{}-second", std::process::id()))
        );
        let p = server_bind_path(Some("/var/run/my.sock"));
        assert_eq!(p, PathBuf::from("/var/run/my.sock"));
    }

    #[test]
    fn stat_authenticates_rejects_a_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("not-a-socket");
        std::fs::write(&file_path, b"x").unwrap();
        let my_uid = Uid::current().as_raw();
        assert!(!stat_authenticates(&file_path, my_uid));
    }

    #[test]
    fn stat_authenticates_accepts_a_freshly_bound_own_socket() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("peer.sock");
        let _sock = UnixDatagram::bind(&sock_path).unwrap();
        let my_uid = Uid::current().as_raw();
        assert!(stat_authenticates(&sock_path, my_uid));
    }

    #[test]
    fn stat_authenticates_rejects_a_socket_owned_by_someone_else() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("peer.sock");
        let _sock = UnixDatagram::bind(&sock_path).unwrap();
        let not_my_uid = Uid::current().as_raw().wrapping_add(1);
        assert!(!stat_authenticates(&sock_path, not_my_uid));
    }
}
