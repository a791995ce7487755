//! Side-channel sinks: output logger and hex dumper.
//!
//! The transfer engine (`src/transfer.rs`) is a synchronous, single-
//! threaded event loop dispatched over `poll`/`io_uring`/IOCP — there is
//! no executor running while it spins, so sinks are called from plain
//! blocking `std::fs::File` I/O rather than `tokio::fs`. Error
//! classification reuses [`crate::error::SinkError`].

use std::io::Write;
use std::path::Path;

use crate::error::SinkError;

/// A file-backed sink that may be absent (`None` path ⇒ silent).
enum Backing {
    None,
    File(std::fs::File),
}

/// Raw byte-append output logger.
pub struct OutputSink {
    backing: Backing,
    disabled: bool,
}

impl OutputSink {
    /// Open (or not) the destination file. `append == false` truncates.
    pub fn open(path: Option<&Path>, append: bool) -> Result<Self, SinkError> {
        let backing = match path {
            None => Backing::None,
            Some(p) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .write(true)
                    .append(append)
                    .truncate(!append)
                    .open(p)
                    .map_err(SinkError::classify_open)?;
                Backing::File(file)
            }
        };
        Ok(Self {
            backing,
            disabled: false,
        })
    }

    /// Whether this sink has been permanently disabled after a fatal
    /// write error. Once disabled it stays disabled for the rest of the
    /// session.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Append raw bytes. A no-op (success) if the sink is silent or
    /// already disabled.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        if self.disabled {
            return Ok(());
        }
        if let Backing::File(file) = &mut self.backing {
            if let Err(e) = file.write_all(bytes) {
                self.disabled = true;
                return Err(SinkError::classify_write(e));
            }
        }
        Ok(())
    }

    /// Request a durable write-through.
    pub fn flush(&mut self) -> Result<(), SinkError> {
        if self.disabled {
            return Ok(());
        }
        if let Backing::File(file) = &mut self.backing {
            if let Err(e) = file.flush() {
                self.disabled = true;
                return Err(SinkError::classify_write(e));
            }
        }
        Ok(())
    }
}

/// 16-bytes-per-line hex dumper: 8 hex-digit offset, two 8-byte groups,
/// ASCII sidebar.
pub struct HexSink {
    backing: Backing,
    disabled: bool,
    offset: u64,
}

impl HexSink {
    pub fn open(path: Option<&Path>) -> Result<Self, SinkError> {
        let backing = match path {
            None => Backing::None,
            Some(p) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(p)
                    .map_err(SinkError::classify_open)?;
                Backing::File(file)
            }
        };
        Ok(Self {
            backing,
            disabled: false,
            offset: 0,
        })
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Current running offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Restart the offset at 0 (a new connection reusing the same sink).
    pub fn reset_offset(&mut self) {
        self.offset = 0;
    }

    /// Format and append `bytes` as 16-byte hex-dump lines, advancing the
    /// offset by exactly `bytes.len()`.
    pub fn dump(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let mut text = String::new();
        for chunk in bytes.chunks(16) {
            format_line(&mut text, self.offset, chunk);
            self.offset += chunk.len() as u64;
        }
        if self.disabled {
            return Ok(());
        }
        if let Backing::File(file) = &mut self.backing {
            if let Err(e) = file.write_all(text.as_bytes()) {
                self.disabled = true;
                return Err(SinkError::classify_write(e));
            }
        }
        Ok(())
    }

    /// Render `bytes` the same way [`HexSink::dump`] would, without a
    /// sink attached — used by the engine's `hex_dump` mode to print to
    /// stdout regardless of whether a hex-dump *file* is configured.
    pub fn render(offset: u64, bytes: &[u8]) -> String {
        let mut text = String::new();
        let mut off = offset;
        for chunk in bytes.chunks(16) {
            format_line(&mut text, off, chunk);
            off += chunk.len() as u64;
        }
        text
    }

    pub fn flush(&mut self) -> Result<(), SinkError> {
        if self.disabled {
            return Ok(());
        }
        if let Backing::File(file) = &mut self.backing {
            if let Err(e) = file.flush() {
                self.disabled = true;
                return Err(SinkError::classify_write(e));
            }
        }
        Ok(())
    }
}

/// Render a single ≤16-byte hex-dump line into `out`: four characters
/// per byte column (two hex digits plus a trailing space), so a missing
/// byte pads with four spaces to keep the ASCII sidebar aligned.
fn format_line(out: &mut String, offset: u64, chunk: &[u8]) {
    use std::fmt::Write as _;

    let _ = write!(out, "{:08x}", offset);
    out.push_str("  ");

    for group in 0..2 {
        for i in 0..8 {
            let idx = group * 8 + i;
            match chunk.get(idx) {
                Some(b) => {
                    let _ = write!(out, "{:02x} ", b);
                }
                None => out.push_str("    "),
            }
        }
        out.push(' ');
    }

    out.push('|');
    for &b in chunk {
        if (0x20..0x7F).contains(&b) {
            out.push(b as char);
        } else {
            out.push('.');
        }
    }
    out.push_str("|\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_dump_matches_worked_example() {
        let mut out = String::new();
        format_line(&mut out, 0, b"Hello, World!");
        assert_eq!(
            out,
            "00000000  48 65 6c 6c 6f 2c 20 57  6f 72 6c 64 21              |Hello, World!|\n"
        );
    }

    #[test]
    fn hex_dump_full_16_byte_line_has_no_padding() {
        let data: Vec<u8> = (0..16).collect();
        let mut out = String::new();
        format_line(&mut out, 0x10, &data);
        assert!(out.starts_with("00000010  "));
        assert!(out.ends_with("|................|\n"));
        assert!(!out.contains("   |")); // no padding gap before the sidebar
    }

    #[test]
    fn non_printable_bytes_render_as_dots() {
        let mut out = String::new();
        format_line(&mut out, 0, &[0x00, 0x7F, b'A', 0xFF]);
        assert!(out.contains("|.A..|\n"));
    }

    #[test]
    fn output_sink_silent_when_path_is_none() {
        let mut sink = OutputSink::open(None, false).unwrap();
        assert!(sink.write(b"hello").is_ok());
        assert!(!sink.is_disabled());
    }

    #[test]
    fn output_sink_writes_raw_bytes_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let mut sink = OutputSink::open(Some(&path), false).unwrap();
        sink.write(b"hello ").unwrap();
        sink.write(b"world").unwrap();
        sink.flush().unwrap();
        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents, b"hello world");
    }

    #[test]
    fn output_sink_append_mode_preserves_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        std::fs::write(&path, b"existing-").unwrap();
        let mut sink = OutputSink::open(Some(&path), true).unwrap();
        sink.write(b"new").unwrap();
        sink.flush().unwrap();
        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents, b"existing-new");
    }

    #[test]
    fn hex_sink_offset_advances_by_exactly_the_chunk_length() {
        let mut sink = HexSink::open(None).unwrap();
        sink.dump(b"Hello, World!").unwrap();
        assert_eq!(sink.offset(), 13);
        sink.dump(b"!").unwrap();
        assert_eq!(sink.offset(), 14);
    }

    #[test]
    fn hex_sink_reset_offset_restarts_at_zero() {
        let mut sink = HexSink::open(None).unwrap();
        sink.dump(b"123456789012345678").unwrap();
        assert_ne!(sink.offset(), 0);
        sink.reset_offset();
        assert_eq!(sink.offset(), 0);
    }

    #[test]
    fn hex_sink_writes_multiple_16_byte_lines_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.hex");
        let mut sink = HexSink::open(Some(&path)).unwrap();
        let data: Vec<u8> = (0..20u8).collect();
        sink.dump(&data).unwrap();
        sink.flush().unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.starts_with("00000000"));
        assert!(contents.lines().nth(1).unwrap().starts_with("00000010"));
    }
}
