//! Cross-module integration test: a loopback TCP pair wrapped in the
//! Telnet decorator, with a side-channel sink tapping what arrives,
//! exercising `stream` + `telnet` + `sinks` together rather than each
//! module's own unit tests in isolation.

use std::net::{TcpListener, TcpStream};
use std::thread;

use zigcat::sinks::OutputSink;
use zigcat::stream::{Stream, TcpTransport};
use zigcat::telnet::TelnetStream;

fn loopback_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    let (server, _) = listener.accept().unwrap();
    (client, server)
}

#[test]
fn telnet_wrapped_stream_relays_application_bytes_through_negotiation() {
    let (client_sock, server_sock) = loopback_pair();

    let server = thread::spawn(move || {
        let transport = TcpTransport::new(server_sock).unwrap();
        let mut server = TelnetStream::wrap(Box::new(transport), "xterm", (80, 24), false);
        server.negotiate_as_server().unwrap();

        let mut received = Vec::new();
        let mut buf = [0u8; 256];
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while received.len() < b"hello from client".len() && std::time::Instant::now() < deadline {
            match server.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => received.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(std::time::Duration::from_millis(5));
                }
                Err(e) => panic!("server read error: {e}"),
            }
        }
        received
    });

    let transport = TcpTransport::new(client_sock).unwrap();
    let mut client = TelnetStream::wrap(Box::new(transport), "xterm", (80, 24), false);
    client.negotiate_as_client().unwrap();

    // Give negotiation a moment to exchange before application data.
    thread::sleep(std::time::Duration::from_millis(20));

    let mut written = 0;
    let payload = b"hello from client";
    while written < payload.len() {
        match client.write(&payload[written..]) {
            Ok(n) => written += n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(std::time::Duration::from_millis(5));
            }
            Err(e) => panic!("client write error: {e}"),
        }
    }

    let received = server.join().unwrap();
    assert_eq!(received, payload);
}

#[test]
fn output_sink_captures_bytes_read_off_a_wrapped_stream() {
    let (client_sock, server_sock) = loopback_pair();
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("session.log");

    let server = thread::spawn(move || {
        let transport = TcpTransport::new(server_sock).unwrap();
        let mut stream: Box<dyn Stream> = Box::new(transport);
        let mut sink = OutputSink::open(Some(&log_path), false).unwrap();

        let mut buf = [0u8; 256];
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        let mut total = 0;
        while total < b"logged payload".len() && std::time::Instant::now() < deadline {
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    sink.write(&buf[..n]).unwrap();
                    total += n;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(std::time::Duration::from_millis(5));
                }
                Err(e) => panic!("read error: {e}"),
            }
        }
        sink.flush().unwrap();
        log_path
    });

    let mut transport = TcpTransport::new(client_sock).unwrap();
    let payload = b"logged payload";
    let mut written = 0;
    while written < payload.len() {
        match transport.write(&payload[written..]) {
            Ok(n) => written += n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(std::time::Duration::from_millis(5));
            }
            Err(e) => panic!("write error: {e}"),
        }
    }

    let log_path = server.join().unwrap();
    let contents = std::fs::read(&log_path).unwrap();
    assert_eq!(contents, payload);
}
