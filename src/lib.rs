//! zigcat — a netcat-compatible network relay core.
//!
//! Opens or accepts one connection (TCP, UDP, SCTP, Unix, optionally
//! TLS/DTLS) and relays bytes between the local standard streams and
//! the peer, with optional Telnet option negotiation, local line
//! editing, and side-channel taps (output log, hex dump).
//!
//! Module dependency order (leaves first): [`stream`] < {[`telnet`],
//! [`sinks`], [`line_editor`]} < [`transfer`].

pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod line_editor;
pub mod platform;
pub mod signals;
pub mod sinks;
pub mod stream;
pub mod telnet;
pub mod tls;
pub mod transfer;
