//! `select(2)` backend — a portable fallback of last resort, used only
//! when `poll` itself is unavailable. Shares the read/write step logic
//! in `transfer::mod` with the poll backend and differs only in the
//! readiness-wait primitive.

use std::io;
use std::time::Duration;

use super::{Backend, Readiness};
use crate::stream::Handle;

pub struct SelectBackend;

impl SelectBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SelectBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl Backend for SelectBackend {
    fn name(&self) -> &'static str {
        "select"
    }

    fn wait(
        &mut self,
        watch_stdin: bool,
        watch_stream: bool,
        timeout: Option<Duration>,
        stdin: Handle,
        stream: Handle,
    ) -> io::Result<Readiness> {
        if !watch_stdin && !watch_stream {
            return Ok(Readiness::none());
        }

        let mut read_fds: libc::fd_set = unsafe { std::mem::zeroed() };
        unsafe { libc::FD_ZERO(&mut read_fds) };

        let mut maxfd = -1;
        if watch_stdin {
            unsafe { libc::FD_SET(stdin, &mut read_fds) };
            maxfd = maxfd.max(stdin);
        }
        if watch_stream {
            unsafe { libc::FD_SET(stream, &mut read_fds) };
            maxfd = maxfd.max(stream);
        }

        let mut tv_storage;
        let tv_ptr = match timeout {
            Some(d) => {
                tv_storage = libc::timeval {
                    tv_sec: d.as_secs() as libc::time_t,
                    tv_usec: d.subsec_micros() as libc::suseconds_t,
                };
                &mut tv_storage as *mut libc::timeval
            }
            None => std::ptr::null_mut(),
        };

        let rc = unsafe {
            libc::select(
                maxfd + 1,
                &mut read_fds,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                tv_ptr,
            )
        };
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

        let mut out = Readiness::none();
        if watch_stdin {
            out.stdin_ready = unsafe { libc::FD_ISSET(stdin, &read_fds) };
        }
        if watch_stream {
            out.stream_ready = unsafe { libc::FD_ISSET(stream, &read_fds) };
        }
        Ok(out)
    }
}

#[cfg(not(unix))]
impl Backend for SelectBackend {
    fn name(&self) -> &'static str {
        "select"
    }

    fn wait(
        &mut self,
        _watch_stdin: bool,
        _watch_stream: bool,
        _timeout: Option<Duration>,
        _stdin: Handle,
        _stream: Handle,
    ) -> io::Result<Readiness> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "select backend is unix-only in this build; Windows uses the IOCP backend",
        ))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::os::fd::AsRawFd;

    #[test]
    fn times_out_with_nothing_ready() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let mut backend = SelectBackend::new();
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
    }

    #[test]
    fn reports_stream_ready_after_peer_writes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (mut server, _) = listener.accept().unwrap();
        use std::io::Write;
        server.write_all(b"hi").unwrap();

        let mut backend = SelectBackend::new();
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
    }
}
