//! Portable `poll(2)` backend — the reference implementation. Every
//! other backend's observable behavior is defined relative to this one.

use std::io;
use std::time::Duration;

use super::{Backend, Readiness};
use crate::stream::Handle;

pub struct PollBackend;

impl PollBackend {
    #[cfg(unix)]
    pub fn try_new() -> Option<Self> {
        Some(Self)
    }

    #[cfg(not(unix))]
    pub fn try_new() -> Option<Self> {
        None
    }
}

#[cfg(unix)]
impl Backend for PollBackend {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn wait(
        &mut self,
        watch_stdin: bool,
        watch_stream: bool,
        timeout: Option<Duration>,
        stdin: Handle,
        stream: Handle,
    ) -> io::Result<Readiness> {
        let mut fds: Vec<libc::pollfd> = Vec::with_capacity(2);
        if watch_stdin {
            fds.push(libc::pollfd {
                fd: stdin,
                events: libc::POLLIN,
                revents: 0,
            });
        }
        if watch_stream {
            fds.push(libc::pollfd {
                fd: stream,
                events: libc::POLLIN,
                revents: 0,
            });
        }
        if fds.is_empty() {
            return Ok(Readiness::none());
        }

        let timeout_ms: i32 = match timeout {
            Some(d) => d.as_millis().min(i32::MAX as u128) as i32,
            None => -1,
        };

        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(Readiness::none());
            }
            return Err(err);
        }
        if rc == 0 {
            return Ok(Readiness {
                timed_out: true,
                ..Readiness::none()
            });
        }

        const BAD: i16 = libc::POLLIN | libc::POLLHUP | libc::POLLERR;
        let mut out = Readiness::none();
        let mut idx = 0;
        if watch_stdin {
            out.stdin_ready = fds[idx].revents & BAD != 0;
            idx += 1;
        }
        if watch_stream {
            out.stream_ready = fds[idx].revents & BAD != 0;
        }
        Ok(out)
    }
}

#[cfg(not(unix))]
impl Backend for PollBackend {
    fn name(&self) -> &'static str {
        "poll"
    }

    fn wait(
        &mut self,
        _watch_stdin: bool,
        _watch_stream: bool,
        _timeout: Option<Duration>,
        _stdin: Handle,
        _stream: Handle,
    ) -> io::Result<Readiness> {
        unreachable!("PollBackend::try_new() never returns Some on non-unix platforms")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::os::fd::AsRawFd;

    #[test]
    fn times_out_with_no_watched_descriptor_ready() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let mut backend = PollBackend::try_new().unwrap();
        let r = backend
            .wait(
                false,
                true,
                Some(Duration::from_millis(20)),
                0,
                client.as_raw_fd(),
            )
            .unwrap();
        assert!(r.timed_out);
        assert!(!r.stream_ready);
    }

    #[test]
    fn reports_stream_ready_after_peer_writes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (mut server, _) = listener.accept().unwrap();
        use std::io::Write;
        server.write_all(b"hi").unwrap();

        let mut backend = PollBackend::try_new().unwrap();
        let r = backend
            .wait(
                false,
                true,
                Some(Duration::from_millis(500)),
                0,
                client.as_raw_fd(),
            )
            .unwrap();
        assert!(r.stream_ready);
        assert!(!r.timed_out);
    }
}
