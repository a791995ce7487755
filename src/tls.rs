//! TLS and DTLS [`Stream`](crate::stream::Stream) implementations.
//!
//! Drives `tokio_rustls` end to end for the handshake. The transfer
//! engine here is synchronous (poll/io_uring/IOCP over raw descriptors),
//! so the handshake is done once, asynchronously, via `tokio_rustls`'s
//! connector/acceptor, and the resulting connection is then unwrapped to
//! its underlying `rustls` state machine and plain `std::net::TcpStream`,
//! which this module drives non-blockingly afterward (the same pattern
//! `rustls`'s own mio-based examples use).
//!
//! rustls has no DTLS support, so the DTLS variant reaches for
//! `openssl` instead (see DESIGN.md) — the one place in the crate that
//! isn't pure-Rust TLS.

use std::io::{self, Read, Write};
use std::net::TcpStream as StdTcpStream;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{ClientConnection, RootCertStore, ServerConnection};
use tokio::net::TcpStream as TokioTcpStream;
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::stream::{Handle, Stream};

#[cfg(unix)]
use std::os::fd::AsRawFd;
#[cfg(windows)]
use std::os::windows::io::AsRawSocket;

enum Conn {
    Client(ClientConnection),
    Server(ServerConnection),
}

impl Conn {
    fn read_tls(&mut self, rd: &mut dyn Read) -> io::Result<usize> {
        match self {
            Conn::Client(c) => c.read_tls(rd),
            Conn::Server(c) => c.read_tls(rd),
        }
    }

    fn write_tls(&mut self, wr: &mut dyn Write) -> io::Result<usize> {
        match self {
            Conn::Client(c) => c.write_tls(wr),
            Conn::Server(c) => c.write_tls(wr),
        }
    }

    fn process_new_packets(&mut self) -> Result<rustls::IoState, rustls::Error> {
        match self {
            Conn::Client(c) => c.process_new_packets(),
            Conn::Server(c) => c.process_new_packets(),
        }
    }

    fn wants_write(&self) -> bool {
        match self {
            Conn::Client(c) => c.wants_write(),
            Conn::Server(c) => c.wants_write(),
        }
    }

    fn reader(&mut self) -> rustls::Reader<'_> {
        match self {
            Conn::Client(c) => c.reader(),
            Conn::Server(c) => c.reader(),
        }
    }

    fn writer(&mut self) -> rustls::Writer<'_> {
        match self {
            Conn::Client(c) => c.writer(),
            Conn::Server(c) => c.writer(),
        }
    }
}

/// A TLS record stream driven synchronously over a non-blocking TCP
/// socket. See module docs for why the handshake happens elsewhere.
pub struct TlsTransport {
    conn: Conn,
    sock: StdTcpStream,
}

impl TlsTransport {
    fn from_parts(conn: Conn, sock: StdTcpStream) -> io::Result<Self> {
        sock.set_nonblocking(true)?;
        Ok(Self { conn, sock })
    }

    /// Perform a TLS client handshake to `host:port` using the Mozilla
    /// root bundle, then hand the connection off for synchronous use.
    pub async fn connect(host: &str, port: u16) -> io::Result<Self> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        let connector = TlsConnector::from(Arc::new(config));
        let server_name: ServerName<'static> = ServerName::try_from(host.to_owned())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        let tcp = TokioTcpStream::connect((host, port)).await?;
        let tls = connector.connect(server_name, tcp).await?;
        let (tokio_tcp, client_conn) = tls.into_inner();
        let std_tcp = tokio_tcp.into_std()?;
        Self::from_parts(Conn::Client(client_conn), std_tcp)
    }

    /// Perform a TLS server handshake over an already-accepted TCP
    /// connection using `cert_chain`/`key` (PEM-decoded by the caller —
    /// certificate/key loading is the CLI collaborator's job).
    pub async fn accept(
        tcp: TokioTcpStream,
        cert_chain: Vec<rustls::pki_types::CertificateDer<'static>>,
        key: rustls::pki_types::PrivateKeyDer<'static>,
    ) -> io::Result<Self> {
        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(cert_chain, key)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        let acceptor = TlsAcceptor::from(Arc::new(config));
        let tls = acceptor.accept(tcp).await?;
        let (tokio_tcp, server_conn) = tls.into_inner();
        let std_tcp = tokio_tcp.into_std()?;
        Self::from_parts(Conn::Server(server_conn), std_tcp)
    }

    /// Pump any pending outbound TLS records to the socket. Called
    /// before returning from `write` and opportunistically from
    /// `maintain`, mirroring how rustls's synchronous examples drain
    /// `wants_write()` after every `process_new_packets` call.
    fn flush_outbound(&mut self) -> io::Result<()> {
        while self.conn.wants_write() {
            match self.conn.write_tls(&mut self.sock) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl Stream for TlsTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.conn.read_tls(&mut self.sock) {
            Ok(0) => return Ok(0),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(e),
        }
        if let Err(e) = self.conn.process_new_packets() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string()));
        }
        match self.conn.reader().read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "no plaintext ready"))
            }
            Err(e) => Err(e),
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.conn.writer().write(buf)?;
        self.flush_outbound()?;
        Ok(n)
    }

    fn close(&mut self) -> io::Result<()> {
        match &mut self.conn {
            Conn::Client(c) => c.send_close_notify(),
            Conn::Server(c) => c.send_close_notify(),
        }
        self.flush_outbound()?;
        self.sock.shutdown(std::net::Shutdown::Both).or(Ok(()))
    }

    #[cfg(unix)]
    fn handle(&self) -> Handle {
        self.sock.as_raw_fd()
    }

    #[cfg(windows)]
    fn handle(&self) -> Handle {
        self.sock.as_raw_socket()
    }

    fn maintain(&mut self) -> io::Result<()> {
        self.flush_outbound()
    }

    fn shutdown_write(&mut self) -> io::Result<()> {
        self.close()
    }
}

// ── DTLS ──────────────────────────────────────────────────────────────────

#[cfg(feature = "dtls")]
pub mod dtls {
    use super::*;
    use crate::stream::UdpTransport;
    use openssl::ssl::{Ssl, SslContext, SslMethod, SslStream, SslVerifyMode};
    use std::net::UdpSocket;

    /// A DTLS datagram stream over a connected, non-blocking UDP socket.
    ///
    /// `openssl`'s `SslStream` propagates `io::ErrorKind::WouldBlock` for
    /// `SSL_ERROR_WANT_READ`/`WANT_WRITE` on a non-blocking `BIO`, which
    /// is exactly the contract [`Stream::read`]/[`Stream::write`] need.
    pub struct DtlsTransport {
        inner: SslStream<UdpSocketAdapter>,
    }

    /// Minimal `Read + Write` shim so `openssl`'s generic `SslStream<S>`
    /// can drive a connected UDP socket the same way it drives a TCP one.
    struct UdpSocketAdapter(UdpSocket);

    impl Read for UdpSocketAdapter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.recv(buf)
        }
    }

    impl Write for UdpSocketAdapter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.send(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[cfg(unix)]
    impl AsRawFd for UdpSocketAdapter {
        fn as_raw_fd(&self) -> std::os::fd::RawFd {
            self.0.as_raw_fd()
        }
    }

    #[cfg(windows)]
    impl AsRawSocket for UdpSocketAdapter {
        fn as_raw_socket(&self) -> std::os::windows::io::RawSocket {
            self.0.as_raw_socket()
        }
    }

    impl DtlsTransport {
        pub fn connect(socket: UdpSocket) -> io::Result<Self> {
            socket.set_nonblocking(true)?;
            let mut ctx = SslContext::builder(SslMethod::dtls())
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            ctx.set_verify(SslVerifyMode::NONE);
            let ctx = ctx.build();
            let ssl = Ssl::new(&ctx).map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            let stream = ssl
                .connect(UdpSocketAdapter(socket))
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            Ok(Self { inner: stream })
        }
    }

    impl Stream for DtlsTransport {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }

        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.inner.write(buf)
        }

        fn close(&mut self) -> io::Result<()> {
            let _ = self.inner.shutdown();
            Ok(())
        }

        #[cfg(unix)]
        fn handle(&self) -> Handle {
            self.inner.get_ref().as_raw_fd()
        }

        #[cfg(windows)]
        fn handle(&self) -> Handle {
            self.inner.get_ref().as_raw_socket()
        }
    }

    // `UdpTransport` is referenced only to document that the DTLS path
    // shares the same "connected UDP = one Stream per association"
    // model as the plain UDP transport.
    #[allow(dead_code)]
    fn _same_model(_: &UdpTransport) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Constructing a client connection and wrapping it over a connected,
    /// non-blocking loopback socket must succeed before any bytes are
    /// exchanged — the handshake runs lazily on the first `read`/`write`.
    /// This is the part of `TlsTransport` that doesn't need a trusted
    /// certificate to exercise.
    #[test]
    fn from_parts_wraps_a_nonblocking_socket() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = StdTcpStream::connect(addr).unwrap();
        let (_server, _) = listener.accept().unwrap();

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let server_name = ServerName::try_from("localhost").unwrap();
        let conn = ClientConnection::new(Arc::new(config), server_name).unwrap();

        let transport = TlsTransport::from_parts(Conn::Client(conn), client).unwrap();
        assert!(transport.sock.set_nonblocking(true).is_ok());
    }

    /// A freshly constructed client connection always wants to send its
    /// ClientHello before any application data can flow.
    #[test]
    fn fresh_client_connection_wants_write() {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        let server_name = ServerName::try_from("localhost").unwrap();
        let conn = ClientConnection::new(Arc::new(config), server_name).unwrap();
        assert!(Conn::Client(conn).wants_write());
    }
}
