//! zigcat entry point: parse arguments, establish exactly one connection,
//! and drive the transfer engine until both sides close, relaying bytes
//! to and from the local standard streams.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs, UdpSocket};
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
use std::process::ExitCode;

use zigcat::cli::{self, CliArgs, Encryption, Target, Transport};
use zigcat::diagnostics;
#[cfg(unix)]
use zigcat::signals;
use zigcat::sinks::{HexSink, OutputSink};
use zigcat::stream::{Stream, TcpTransport, UdpTransport};
#[cfg(unix)]
use zigcat::stream::UnixTransport;
use zigcat::telnet::TelnetStream;
use zigcat::tls::TlsTransport;
use zigcat::transfer::{self, Sinks};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("zigcat: {e}");
            return ExitCode::FAILURE;
        }
    };
    diagnostics::set_verbose(args.verbose);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            diagnostics::error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

async fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut stream = establish(&args).await?;

    if args.config.telnet {
        let mut telnet = TelnetStream::wrap(
            stream,
            args.config.term_type.clone(),
            args.config.window_size,
            args.config.telnet_signal_translation,
        );
        if args.listen {
            telnet.negotiate_as_server()?;
        } else {
            telnet.negotiate_as_client()?;
        }
        stream = Box::new(telnet);
    }

    let output = match &args.config.output_path {
        Some(path) => Some(OutputSink::open(Some(path), args.config.output_append)?),
        None => None,
    };
    let hex = match &args.config.hex_dump_path {
        Some(path) => Some(HexSink::open(Some(path))?),
        None => None,
    };

    #[cfg(unix)]
    signals::install();

    transfer::run_transfer(stream, &args.config, Sinks { output, hex })?;
    Ok(())
}

async fn establish(args: &CliArgs) -> Result<Box<dyn Stream>, Box<dyn std::error::Error>> {
    match &args.target {
        Some(Target::Unix(path)) => establish_unix(args, path),
        Some(Target::HostPort(host, port)) => establish_host_port(args, host, *port).await,
        None => Err("no target given".into()),
    }
}

#[cfg(unix)]
fn establish_unix(
    args: &CliArgs,
    path: &std::path::Path,
) -> Result<Box<dyn Stream>, Box<dyn std::error::Error>> {
    if args.listen {
        let _ = std::fs::remove_file(path);
        let listener = UnixListener::bind(path)?;
        diagnostics::debug(&format!("listening on unix:{}", path.display()));
        let (stream, _) = listener.accept()?;
        Ok(Box::new(UnixTransport::new(stream)?))
    } else {
        let stream = UnixStream::connect(path)?;
        Ok(Box::new(UnixTransport::new(stream)?))
    }
}

#[cfg(not(unix))]
fn establish_unix(
    _args: &CliArgs,
    _path: &std::path::Path,
) -> Result<Box<dyn Stream>, Box<dyn std::error::Error>> {
    Err("unix domain sockets are not supported on this platform".into())
}

async fn establish_host_port(
    args: &CliArgs,
    host: &str,
    port: u16,
) -> Result<Box<dyn Stream>, Box<dyn std::error::Error>> {
    match (args.transport, args.encryption) {
        (_, Encryption::Dtls) => establish_dtls(args, host, port),
        (Transport::Tcp, Encryption::Tls) => establish_tls(args, host, port).await,
        (Transport::Tcp, Encryption::None) => establish_tcp(args, host, port),
        (Transport::Udp, Encryption::None) => establish_udp(args, host, port),
        (Transport::Sctp, Encryption::None) => establish_sctp(args, host, port),
        (Transport::Sctp, Encryption::Tls) => Err("TLS over SCTP is not supported".into()),
    }
}

fn resolve_sockaddr(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port).to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("could not resolve {host}"),
        )
    })
}

fn source_bind_addr(args: &CliArgs, remote_is_v6: bool) -> SocketAddr {
    let ip = args.source_addr.unwrap_or(if remote_is_v6 {
        Ipv6Addr::UNSPECIFIED.into()
    } else {
        Ipv4Addr::UNSPECIFIED.into()
    });
    SocketAddr::new(ip, args.source_port.unwrap_or(0))
}

fn establish_tcp(
    args: &CliArgs,
    host: &str,
    port: u16,
) -> Result<Box<dyn Stream>, Box<dyn std::error::Error>> {
    let tcp = if args.listen {
        let bind_addr = resolve_sockaddr(host, port)?;
        let listener = TcpListener::bind(bind_addr)?;
        diagnostics::debug(&format!("listening on {bind_addr}"));
        let (stream, peer) = listener.accept()?;
        diagnostics::debug(&format!("connection from {peer}"));
        stream
    } else {
        let addr = resolve_sockaddr(host, port)?;
        if args.source_addr.is_some() || args.source_port.is_some() {
            let domain = if addr.is_ipv6() {
                socket2::Domain::IPV6
            } else {
                socket2::Domain::IPV4
            };
            let socket =
                socket2::Socket::new(domain, socket2::Type::STREAM, Some(socket2::Protocol::TCP))?;
            socket.bind(&source_bind_addr(args, addr.is_ipv6()).into())?;
            socket.connect(&addr.into())?;
            socket.into()
        } else {
            TcpStream::connect(addr)?
        }
    };
    Ok(Box::new(TcpTransport::new(tcp)?))
}

fn establish_udp(
    args: &CliArgs,
    host: &str,
    port: u16,
) -> Result<Box<dyn Stream>, Box<dyn std::error::Error>> {
    let socket = if args.listen {
        let bind_addr = resolve_sockaddr(host, port)?;
        let socket = UdpSocket::bind(bind_addr)?;
        diagnostics::debug(&format!("listening on {bind_addr} (udp)"));
        let mut probe = [0u8; 1];
        let (_, peer) = socket.peek_from(&mut probe)?;
        diagnostics::debug(&format!("datagram from {peer}"));
        socket.connect(peer)?;
        socket
    } else {
        let addr = resolve_sockaddr(host, port)?;
        let socket = UdpSocket::bind(source_bind_addr(args, addr.is_ipv6()))?;
        socket.connect(addr)?;
        socket
    };
    Ok(Box::new(UdpTransport::new(socket)?))
}

#[cfg(target_os = "linux")]
fn establish_sctp(
    args: &CliArgs,
    host: &str,
    port: u16,
) -> Result<Box<dyn Stream>, Box<dyn std::error::Error>> {
    use zigcat::stream::SctpTransport;

    if args.listen {
        let bind_addr = resolve_sockaddr(host, port)?;
        let domain = if bind_addr.is_ipv6() {
            socket2::Domain::IPV6
        } else {
            socket2::Domain::IPV4
        };
        let listener = socket2::Socket::new(
            domain,
            socket2::Type::STREAM,
            Some(socket2::Protocol::from(132)),
        )?;
        listener.bind(&bind_addr.into())?;
        listener.listen(1)?;
        diagnostics::debug(&format!("listening on {bind_addr} (sctp)"));
        let (accepted, _) = listener.accept()?;
        Ok(Box::new(SctpTransport::from_accepted(accepted)?))
    } else {
        let addr = resolve_sockaddr(host, port)?;
        Ok(Box::new(SctpTransport::connect(addr)?))
    }
}

#[cfg(not(target_os = "linux"))]
fn establish_sctp(
    _args: &CliArgs,
    _host: &str,
    _port: u16,
) -> Result<Box<dyn Stream>, Box<dyn std::error::Error>> {
    Err("SCTP is only supported on Linux".into())
}

async fn establish_tls(
    args: &CliArgs,
    host: &str,
    port: u16,
) -> Result<Box<dyn Stream>, Box<dyn std::error::Error>> {
    if args.listen {
        let cert_path = args
            .tls_cert
            .as_ref()
            .ok_or("--tls-cert is required to listen with --tls")?;
        let key_path = args
            .tls_key
            .as_ref()
            .ok_or("--tls-key is required to listen with --tls")?;
        let cert_chain = load_cert_chain(cert_path)?;
        let key = load_private_key(key_path)?;

        let bind_addr = resolve_sockaddr(host, port)?;
        let listener = tokio::net::TcpListener::bind(bind_addr).await?;
        diagnostics::debug(&format!("listening on {bind_addr} (tls)"));
        let (tcp, peer) = listener.accept().await?;
        diagnostics::debug(&format!("connection from {peer}"));
        let tls = TlsTransport::accept(tcp, cert_chain, key).await?;
        Ok(Box::new(tls))
    } else {
        let tls = TlsTransport::connect(host, port).await?;
        Ok(Box::new(tls))
    }
}

fn load_cert_chain(
    path: &std::path::Path,
) -> io::Result<Vec<rustls::pki_types::CertificateDer<'static>>> {
    let mut rd = io::BufReader::new(std::fs::File::open(path)?);
    rustls_pemfile::certs(&mut rd).collect::<Result<Vec<_>, _>>()
}

fn load_private_key(
    path: &std::path::Path,
) -> io::Result<rustls::pki_types::PrivateKeyDer<'static>> {
    let mut rd = io::BufReader::new(std::fs::File::open(path)?);
    rustls_pemfile::private_key(&mut rd)?
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no private key found in file"))
}

fn establish_dtls(
    args: &CliArgs,
    host: &str,
    port: u16,
) -> Result<Box<dyn Stream>, Box<dyn std::error::Error>> {
    #[cfg(feature = "dtls")]
    {
        let socket = if args.listen {
            let bind_addr = resolve_sockaddr(host, port)?;
            let socket = UdpSocket::bind(bind_addr)?;
            let mut probe = [0u8; 1];
            let (_, peer) = socket.peek_from(&mut probe)?;
            socket.connect(peer)?;
            socket
        } else {
            let addr = resolve_sockaddr(host, port)?;
            let socket = UdpSocket::bind(source_bind_addr(args, addr.is_ipv6()))?;
            socket.connect(addr)?;
            socket
        };
        Ok(Box::new(zigcat::tls::dtls::DtlsTransport::connect(socket)?))
    }
    #[cfg(not(feature = "dtls"))]
    {
        let _ = (args, host, port);
        Err("this build was compiled without the `dtls` feature".into())
    }
}
