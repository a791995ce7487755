//! Hand-written error types for the relay core.
//!
//! Plain enums/structs implementing `std::error::Error` + `Display` by
//! hand, no derive-macro crate.

use std::fmt;
use std::io;

// ── TelnetError ───────────────────────────────────────────────────────────

/// Protocol/state errors raised by the Telnet processor. All are fatal
/// to the session.
#[derive(Debug)]
pub enum TelnetError {
    /// `IAC` followed by a byte that is neither a known command nor
    /// WILL/WONT/DO/DONT/SB.
    InvalidCommand(u8),
    /// `IAC` inside a subnegotiation followed by anything but `IAC` or `SE`.
    MalformedSequence,
    /// Subnegotiation payload exceeded the 1024-byte cap.
    SubnegotiationTooLong,
    /// The partial-IAC carry-over buffer exceeded its 16-byte cap.
    BufferOverflow,
    /// One option's negotiation counter exceeded the 10-flip cap.
    NegotiationLoop(u8),
}

impl fmt::Display for TelnetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelnetError::InvalidCommand(b) => write!(f, "invalid telnet command byte {b:#04x}"),
            TelnetError::MalformedSequence => write!(f, "malformed telnet subnegotiation"),
            TelnetError::SubnegotiationTooLong => write!(f, "telnet subnegotiation payload too long"),
            TelnetError::BufferOverflow => write!(f, "telnet partial-command buffer overflow"),
            TelnetError::NegotiationLoop(o) => {
                write!(f, "telnet option {o} exceeded the negotiation-flip cap")
            }
        }
    }
}

impl std::error::Error for TelnetError {}

// ── SinkErrorKind ─────────────────────────────────────────────────────────

/// Classification of a side-channel sink I/O failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkErrorKind {
    DiskFull,
    InsufficientPermissions,
    FileLocked,
    PathTooLong,
    DirectoryNotFound,
    IsDirectory,
    InvalidPathCharacters,
    FileSystemError,
    InvalidOutputPath,
    OutputFileCreateFailed,
    OutputFileWriteFailed,
}

impl fmt::Display for SinkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SinkErrorKind::DiskFull => "disk full",
            SinkErrorKind::InsufficientPermissions => "insufficient permissions",
            SinkErrorKind::FileLocked => "file locked",
            SinkErrorKind::PathTooLong => "path too long",
            SinkErrorKind::DirectoryNotFound => "directory not found",
            SinkErrorKind::IsDirectory => "path is a directory",
            SinkErrorKind::InvalidPathCharacters => "invalid path characters",
            SinkErrorKind::FileSystemError => "filesystem error",
            SinkErrorKind::InvalidOutputPath => "invalid output path",
            SinkErrorKind::OutputFileCreateFailed => "could not create output file",
            SinkErrorKind::OutputFileWriteFailed => "could not write to output file",
        };
        f.write_str(s)
    }
}

/// A classified sink failure, carrying the underlying `io::Error` for
/// logging.
#[derive(Debug)]
pub struct SinkError {
    pub kind: SinkErrorKind,
    pub source: io::Error,
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.source)
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl SinkError {
    /// Classify a raw `io::Error` encountered while opening or writing a
    /// sink file. Best-effort: most classification comes from `errno` on
    /// Unix, falling back to `FileSystemError` elsewhere.
    pub fn classify_write(err: io::Error) -> Self {
        let kind = classify_kind(&err);
        SinkError { kind, source: err }
    }

    pub fn classify_open(err: io::Error) -> Self {
        let kind = match classify_kind(&err) {
            SinkErrorKind::FileSystemError => SinkErrorKind::OutputFileCreateFailed,
            other => other,
        };
        SinkError { kind, source: err }
    }
}

fn classify_kind(err: &io::Error) -> SinkErrorKind {
    match err.kind() {
        io::ErrorKind::PermissionDenied => SinkErrorKind::InsufficientPermissions,
        io::ErrorKind::NotFound => SinkErrorKind::DirectoryNotFound,
        io::ErrorKind::AlreadyExists => SinkErrorKind::FileLocked,
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
            SinkErrorKind::InvalidPathCharacters
        }
        _ => {
            #[cfg(unix)]
            {
                match err.raw_os_error() {
                    Some(libc::ENOSPC) => return SinkErrorKind::DiskFull,
                    Some(libc::ENAMETOOLONG) => return SinkErrorKind::PathTooLong,
                    Some(libc::EISDIR) => return SinkErrorKind::IsDirectory,
                    _ => {}
                }
            }
            SinkErrorKind::FileSystemError
        }
    }
}

// ── TransferError ─────────────────────────────────────────────────────────

/// Fatal, unrecoverable errors from the transfer engine — recoverable
/// transport failures are folded into side closure and don't need a
/// dedicated variant here.
#[derive(Debug)]
pub enum TransferError {
    Io(io::Error),
    Telnet(TelnetError),
    /// The readiness primitive itself failed irrecoverably (e.g. every
    /// backend including the `select` fallback errored at setup).
    BackendUnavailable(&'static str),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::Io(e) => write!(f, "transfer I/O error: {e}"),
            TransferError::Telnet(e) => write!(f, "transfer aborted by telnet error: {e}"),
            TransferError::BackendUnavailable(name) => {
                write!(f, "no usable transfer backend (last attempted: {name})")
            }
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::Io(e) => Some(e),
            TransferError::Telnet(e) => Some(e),
            TransferError::BackendUnavailable(_) => None,
        }
    }
}

impl From<io::Error> for TransferError {
    fn from(e: io::Error) -> Self {
        TransferError::Io(e)
    }
}

impl From<TelnetError> for TransferError {
    fn from(e: TelnetError) -> Self {
        TransferError::Telnet(e)
    }
}
