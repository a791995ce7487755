//! The bidirectional transfer loop: a platform-dispatched event engine
//! with three backends (`poll`/`select`, `io_uring`, IOCP), all enforcing
//! identical observable semantics — half-close, timeouts, direction
//! gating, line-ending conversion, throttling, and side-channel fan-out.
//!
//! The backends differ only in *how* they learn that stdin or the peer
//! `Stream` has bytes waiting (the [`Backend`] trait below). Once
//! readiness is known, every backend runs through the exact same
//! per-iteration algorithm in [`run_transfer`], which lives in one place
//! rather than being duplicated per backend the way a raw vtable
//! dispatch might tempt you to.
//!
//! One `run()` method drives one iteration at a time against a
//! readiness primitive, generalized here from a single async-task
//! readiness source to a pluggable [`Backend`].

mod poll_backend;
mod select_backend;
#[cfg(target_os = "linux")]
mod uring_backend;
#[cfg(windows)]
mod iocp_backend;

use std::borrow::Cow;
use std::thread;
use std::time::Duration;

use crate::config::Config;
use crate::diagnostics;
use crate::error::TransferError;
use crate::line_editor::ByteEditor;
use crate::platform;
use crate::sinks::{HexSink, OutputSink};
use crate::stream::{Handle, Stream};

/// What a backend's `wait` call learned about the two watched
/// descriptors, or whether the idle timeout fired instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct Readiness {
    pub stdin_ready: bool,
    pub stream_ready: bool,
    pub timed_out: bool,
}

impl Readiness {
    fn none() -> Self {
        Self::default()
    }
}

/// A platform readiness-multiplexing primitive.
///
/// Implementations own only the readiness question; the actual
/// `read`/`write` calls always go through [`Stream`] so every backend
/// observes identical half-close/direction-gating/ordering semantics.
pub trait Backend {
    fn name(&self) -> &'static str;

    /// Block until one of the watched descriptors is ready, `timeout`
    /// elapses, or an unrecoverable error occurs. Descriptors not
    /// watched (`watch_stdin`/`watch_stream` false) are never reported
    /// ready.
    fn wait(
        &mut self,
        watch_stdin: bool,
        watch_stream: bool,
        timeout: Option<Duration>,
        stdin: Handle,
        stream: Handle,
    ) -> std::io::Result<Readiness>;
}

/// Choose a backend in priority order: io_uring (Linux ≥5.1, local-edit
/// mode inactive) > IOCP (Windows) > poll > select. A backend that fails
/// to initialize is skipped in favor of the next; `poll` is the
/// reference implementation and `select` is the backstop of last
/// resort, so the chain always terminates in something usable.
fn choose_backend(editor_active: bool) -> Box<dyn Backend> {
    #[cfg(target_os = "linux")]
    {
        if !editor_active {
            if let Some(b) = uring_backend::UringBackend::try_new() {
                diagnostics::debug("transfer backend: io_uring");
                return Box::new(b);
            }
        }
    }
    #[cfg(windows)]
    {
        if let Some(b) = iocp_backend::IocpBackend::try_new() {
            diagnostics::debug("transfer backend: iocp");
            return Box::new(b);
        }
    }
    if let Some(b) = poll_backend::PollBackend::try_new() {
        diagnostics::debug("transfer backend: poll");
        return Box::new(b);
    }
    diagnostics::debug("transfer backend: select (poll unavailable)");
    Box::new(select_backend::SelectBackend::new())
}

/// Side-channel sinks handed to [`run_transfer`] alongside the stream
/// and config.
#[derive(Default)]
pub struct Sinks {
    pub output: Option<OutputSink>,
    pub hex: Option<HexSink>,
}

/// Per-session transfer state.
struct TransferSession<'a> {
    stream: Box<dyn Stream>,
    config: &'a Config,
    sinks: Sinks,
    editor: Option<ByteEditor>,
    stdin_closed: bool,
    socket_closed: bool,
    /// Running offset for `hex_dump`-to-stdout mode, independent of any
    /// configured hex-dump *file* sink's own offset.
    stdout_hex_offset: u64,
}

/// Runs until `stdin_closed AND socket_closed`, the idle timeout
/// elapses with no activity, or an unrecoverable error. On exit, both
/// sinks are flushed with errors logged but not re-raised.
pub fn run_transfer(
    stream: Box<dyn Stream>,
    config: &Config,
    sinks: Sinks,
) -> Result<(), TransferError> {
    let stdin_is_tty = platform::stdin_is_tty();
    let idle_timeout = config.resolve_idle_timeout(stdin_is_tty);

    let editor = if config.telnet_edit_mode && stdin_is_tty {
        Some(ByteEditor::new())
    } else {
        None
    };

    if config.can_send() {
        if let Err(e) = platform::set_stdin_nonblocking() {
            diagnostics::warn(&format!("could not set stdin non-blocking: {e}"));
        }
    }

    let mut session = TransferSession {
        stream,
        config,
        sinks,
        editor,
        stdin_closed: !config.can_send(),
        socket_closed: !config.can_recv(),
        stdout_hex_offset: 0,
    };

    let mut backend = choose_backend(session.editor.is_some());
    let result = session.drive(backend.as_mut(), idle_timeout);

    session.flush_sinks();
    result
}

impl<'a> TransferSession<'a> {
    fn drive(
        &mut self,
        backend: &mut dyn Backend,
        idle_timeout: Option<Duration>,
    ) -> Result<(), TransferError> {
        let stdin_handle = platform::stdin_handle();
        let mut stdin_buf = [0u8; 8192];
        let mut stream_buf = [0u8; 8192];

        loop {
            // Step 1: maintenance (may produce outbound Telnet bytes —
            // NAWS updates, signal translation — the only operation
            // allowed to emit unsolicited bytes).
            if let Err(e) = self.stream.maintain() {
                return Err(TransferError::Io(e));
            }

            // Step 2: direction gating.
            let watch_stdin = self.config.can_send() && !self.stdin_closed;
            let watch_stream = self.config.can_recv() && !self.socket_closed;
            if !watch_stdin && !watch_stream {
                break;
            }

            // Step 3: wait for readiness, bounded by the idle timeout.
            let readiness = backend
                .wait(
                    watch_stdin,
                    watch_stream,
                    idle_timeout,
                    stdin_handle,
                    self.stream.handle(),
                )
                .map_err(TransferError::Io)?;

            if readiness.timed_out {
                diagnostics::debug("idle timeout elapsed; ending session");
                break;
            }

            // Step 4: stdin ready.
            if readiness.stdin_ready {
                if self.handle_stdin(&mut stdin_buf)? {
                    break; // close_on_eof requested an immediate stop
                }
            }

            // Step 5: stream ready.
            if readiness.stream_ready {
                self.handle_stream(&mut stream_buf)?;
            }
        }
        Ok(())
    }

    /// Returns `true` if the session should stop immediately
    /// (`close_on_eof` on stdin EOF).
    fn handle_stdin(&mut self, buf: &mut [u8]) -> Result<bool, TransferError> {
        match platform::read_stdin(buf) {
            Ok(0) => {
                self.stdin_closed = true;
                if self.config.close_on_eof {
                    return Ok(true);
                }
                if !self.config.no_shutdown {
                    if let Err(e) = self.stream.shutdown_write() {
                        diagnostics::warn(&format!("half-close failed: {e}"));
                    }
                }
                Ok(false)
            }
            Ok(n) => {
                if let Some(editor) = &mut self.editor {
                    for &b in &buf[..n] {
                        let outcome = editor.feed_byte(b);
                        if !outcome.local_echo.is_empty() {
                            let _ = platform::write_stdout(&outcome.local_echo);
                        }
                        if !outcome.to_stream.is_empty() {
                            self.write_all_to_stream(&outcome.to_stream)?;
                        }
                        if outcome.eof {
                            self.stdin_closed = true;
                            if self.config.close_on_eof {
                                return Ok(true);
                            }
                            if !self.config.no_shutdown {
                                if let Err(e) = self.stream.shutdown_write() {
                                    diagnostics::warn(&format!("half-close failed: {e}"));
                                }
                            }
                            return Ok(false);
                        }
                    }
                } else {
                    let out = if self.config.crlf {
                        crlf_convert(&buf[..n])
                    } else {
                        Cow::Borrowed(&buf[..n])
                    };
                    self.write_all_to_stream(&out)?;
                    if self.config.delay_ms > 0 {
                        thread::sleep(Duration::from_millis(self.config.delay_ms));
                    }
                }
                Ok(false)
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => {
                diagnostics::warn(&format!("stdin read error, closing stdin side: {e}"));
                self.stdin_closed = true;
                Ok(false)
            }
        }
    }

    fn handle_stream(&mut self, buf: &mut [u8]) -> Result<(), TransferError> {
        match self.stream.read(buf) {
            Ok(0) => {
                self.socket_closed = true;
                Ok(())
            }
            Ok(n) => {
                let app_bytes = &buf[..n];
                // Ordering: stdout/hex, then the output sink, then the
                // hex-dump sink, one chunk at a time.
                if self.config.hex_dump {
                    let text = HexSink::render(self.stdout_hex_offset, app_bytes);
                    self.stdout_hex_offset += app_bytes.len() as u64;
                    let _ = platform::write_stdout(text.as_bytes());
                } else {
                    let _ = platform::write_stdout(app_bytes);
                }

                if let Some(sink) = &mut self.sinks.output {
                    if !sink.is_disabled() {
                        if let Err(e) = sink.write(app_bytes) {
                            diagnostics::warn(&format!("output sink disabled: {e}"));
                        }
                    }
                }
                if let Some(sink) = &mut self.sinks.hex {
                    if !sink.is_disabled() {
                        if let Err(e) = sink.dump(app_bytes) {
                            diagnostics::warn(&format!("hex-dump sink disabled: {e}"));
                        }
                    }
                }
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => {
                diagnostics::warn(&format!("stream read error, closing stream side: {e}"));
                self.socket_closed = true;
                Ok(())
            }
        }
    }

    fn write_all_to_stream(&mut self, mut buf: &[u8]) -> Result<(), TransferError> {
        while !buf.is_empty() {
            match self.stream.write(buf) {
                Ok(0) => {
                    return Err(TransferError::Io(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "stream accepted zero bytes",
                    )))
                }
                Ok(n) => buf = &buf[n..],
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(TransferError::Io(e)),
            }
        }
        Ok(())
    }

    fn flush_sinks(&mut self) {
        if let Some(sink) = &mut self.sinks.output {
            if let Err(e) = sink.flush() {
                diagnostics::warn(&format!("output sink flush failed: {e}"));
            }
        }
        if let Some(sink) = &mut self.sinks.hex {
            if let Err(e) = sink.flush() {
                diagnostics::warn(&format!("hex sink flush failed: {e}"));
            }
        }
    }
}

/// LF → CRLF conversion: any `\n` not preceded by `\r` *within this
/// chunk* gets a `\r` inserted before it. Allocates only when the chunk
/// actually contains a `\n`; otherwise the original slice is passed
/// through untouched.
fn crlf_convert(buf: &[u8]) -> Cow<'_, [u8]> {
    if !buf.contains(&b'\n') {
        return Cow::Borrowed(buf);
    }
    let mut out = Vec::with_capacity(buf.len() + 8);
    let mut prev = 0u8;
    for &b in buf {
        if b == b'\n' && prev != b'\r' {
            out.push(b'\r');
        }
        out.push(b);
        prev = b;
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crlf_passthrough_without_newline_does_not_allocate_a_new_buffer() {
        let input = b"no newlines here";
        match crlf_convert(input) {
            Cow::Borrowed(b) => assert_eq!(b, input),
            Cow::Owned(_) => panic!("expected borrowed passthrough"),
        }
    }

    #[test]
    fn crlf_inserts_cr_before_each_bare_lf() {
        let out = crlf_convert(b"ab\ncd\n");
        assert_eq!(&*out, b"ab\r\ncd\r\n");
    }

    #[test]
    fn crlf_does_not_double_existing_cr() {
        let out = crlf_convert(b"ab\r\ncd\n");
        assert_eq!(&*out, b"ab\r\ncd\r\n");
    }

    #[test]
    fn readiness_defaults_to_nothing_ready() {
        let r = Readiness::none();
        assert!(!r.stdin_ready && !r.stream_ready && !r.timed_out);
    }
}
