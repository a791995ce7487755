//! The transport-agnostic [`Stream`] interface.
//!
//! Five polymorphic operations, implemented as a trait object rather
//! than a raw vtable struct — idiomatic Rust dynamic dispatch gives the
//! decorator capability without unsafe code. [`crate::telnet::TelnetStream`]
//! is the one decorator this crate ships; new transports are added by
//! implementing this trait, not by touching the transfer engine.

use std::io;
use std::net::{TcpStream, UdpSocket};
#[cfg(unix)]
use std::os::fd::{AsRawFd, RawFd};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
#[cfg(windows)]
use std::os::windows::io::{AsRawSocket, RawSocket};

/// An OS-level descriptor usable by the platform's readiness primitive
/// (poll/epoll, io_uring registration, or IOCP association).
#[cfg(unix)]
pub type Handle = RawFd;
#[cfg(windows)]
pub type Handle = RawSocket;

/// Uniform read/write/close/handle/maintain contract over heterogeneous
/// transports.
///
/// Ownership: the Stream exclusively owns the underlying connection and
/// all transformation buffers; the engine borrows it for the session
/// lifetime and does not close it itself (the caller does, after
/// `run_transfer` returns).
pub trait Stream: Send {
    /// Read up to `buf.len()` bytes. `Ok(0)` signals EOF.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write `buf` in full or return the underlying transport's error
    /// untranslated — a closed write-half reports that error as-is.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Release the underlying connection. Idempotent.
    fn close(&mut self) -> io::Result<()>;

    /// The descriptor an external poller can watch for readiness.
    fn handle(&self) -> Handle;

    /// Optional idempotent periodic callback, invoked once per main-loop
    /// iteration by the poll-based backends. The only operation allowed
    /// to emit unsolicited bytes on the wire (used by the Telnet
    /// decorator for NAWS updates and signal-translation commands).
    ///
    /// Implementations MUST be re-entrant against their own `handle()`:
    /// an external poller may inspect the descriptor concurrently with
    /// `maintain()`. Implementations MUST NOT call back into their own
    /// `read`/`write` from within `maintain()` — doing so would recurse
    /// through the same borrow the engine already holds.
    fn maintain(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Best-effort half-close of the write side, used by the engine on
    /// stdin EOF when `no_shutdown` is false. Default: unsupported.
    fn shutdown_write(&mut self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "transport does not support half-close",
        ))
    }
}

// ── TcpTransport ──────────────────────────────────────────────────────────

pub struct TcpTransport {
    inner: TcpStream,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self { inner: stream })
    }
}

impl Stream for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use std::io::Read;
        self.inner.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        use std::io::Write;
        self.inner.write(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner.shutdown(std::net::Shutdown::Both).or(Ok(()))
    }

    #[cfg(unix)]
    fn handle(&self) -> Handle {
        self.inner.as_raw_fd()
    }

    #[cfg(windows)]
    fn handle(&self) -> Handle {
        self.inner.as_raw_socket()
    }

    fn shutdown_write(&mut self) -> io::Result<()> {
        self.inner.shutdown(std::net::Shutdown::Write)
    }
}

// ── UdpTransport ──────────────────────────────────────────────────────────

/// A connected UDP socket treated as a Stream: each `read`/`write`
/// transfers exactly one datagram.
pub struct UdpTransport {
    inner: UdpSocket,
}

impl UdpTransport {
    pub fn new(socket: UdpSocket) -> io::Result<Self> {
        socket.set_nonblocking(true)?;
        Ok(Self { inner: socket })
    }
}

impl Stream for UdpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.recv(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.send(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }

    #[cfg(unix)]
    fn handle(&self) -> Handle {
        self.inner.as_raw_fd()
    }

    #[cfg(windows)]
    fn handle(&self) -> Handle {
        self.inner.as_raw_socket()
    }
}

// ── UnixTransport ─────────────────────────────────────────────────────────

#[cfg(unix)]
pub struct UnixTransport {
    inner: UnixStream,
}

#[cfg(unix)]
impl UnixTransport {
    pub fn new(stream: UnixStream) -> io::Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self { inner: stream })
    }
}

#[cfg(unix)]
impl Stream for UnixTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use std::io::Read;
        self.inner.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        use std::io::Write;
        self.inner.write(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner.shutdown(std::net::Shutdown::Both).or(Ok(()))
    }

    fn handle(&self) -> Handle {
        self.inner.as_raw_fd()
    }

    fn shutdown_write(&mut self) -> io::Result<()> {
        self.inner.shutdown(std::net::Shutdown::Write)
    }
}

// ── SctpTransport ─────────────────────────────────────────────────────────

/// A one-to-one style SCTP association, built directly on `socket2`
/// since neither `std` nor the async runtime know the `IPPROTO_SCTP`
/// protocol number. Linux (lksctp) only.
#[cfg(target_os = "linux")]
pub struct SctpTransport {
    inner: socket2::Socket,
}

#[cfg(target_os = "linux")]
impl SctpTransport {
    const IPPROTO_SCTP: i32 = 132;

    pub fn connect(addr: std::net::SocketAddr) -> io::Result<Self> {
        let domain = if addr.is_ipv6() {
            socket2::Domain::IPV6
        } else {
            socket2::Domain::IPV4
        };
        let socket = socket2::Socket::new(
            domain,
            socket2::Type::STREAM,
            Some(socket2::Protocol::from(Self::IPPROTO_SCTP)),
        )?;
        socket.connect(&addr.into())?;
        socket.set_nonblocking(true)?;
        Ok(Self { inner: socket })
    }

    pub fn from_accepted(socket: socket2::Socket) -> io::Result<Self> {
        socket.set_nonblocking(true)?;
        Ok(Self { inner: socket })
    }
}

#[cfg(target_os = "linux")]
impl Stream for SctpTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use std::io::Read;
        self.inner.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        use std::io::Write;
        self.inner.write(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner.shutdown(std::net::Shutdown::Both).or(Ok(()))
    }

    fn handle(&self) -> Handle {
        self.inner.as_raw_fd()
    }

    fn shutdown_write(&mut self) -> io::Result<()> {
        self.inner.shutdown(std::net::Shutdown::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn tcp_transport_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();

        let mut client = TcpTransport::new(client).unwrap();
        let mut server = TcpTransport::new(server).unwrap();

        client.write(b"hello").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        let mut buf = [0u8; 16];
        let n = server.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn tcp_transport_handle_is_stable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let t = TcpTransport::new(client).unwrap();
        let h1 = t.handle();
        let h2 = t.handle();
        assert_eq!(h1, h2);
    }
}
