//! Telnet protocol parser, Q-method option negotiator, and subnegotiation
//! dispatcher.
//!
//! A pure, I/O-free byte-stream FSM (`TelnetParser`) and an option-state
//! tracker (`NegotiationState`) are fused into one [`TelnetProcessor`]
//! because subnegotiation replies (TERMINAL-TYPE, NEW-ENVIRON) need the
//! negotiated option state and configured terminal identity in the same
//! place the parser produces events — so `feed()` returns application
//! bytes and any negotiation-reply bytes together, from one call.

use std::io;

use crate::error::TelnetError;
use crate::signals;
use crate::stream::{Handle, Stream};

// ── Telnet byte constants ──────────────────────────────────────────────────

/// Interpret As Command — starts every Telnet command sequence.
pub const IAC: u8 = 255;
/// Subnegotiation Begin.
pub const SB: u8 = 250;
/// Subnegotiation End.
pub const SE: u8 = 240;
/// Go Ahead — signals end-of-turn / prompt boundary.
pub const GA: u8 = 249;
/// End of Record — alternative prompt boundary used by some servers. Not
/// part of the 240-249 "simple command" range the processor restates
/// from RFC 854, but harmless to keep recognizing: it isn't an option
/// number and doesn't interact with the Q-method.
pub const EOR: u8 = 239;
/// WILL — sender will enable the option.
pub const WILL: u8 = 251;
/// WONT — sender will not enable the option.
pub const WONT: u8 = 252;
/// DO — sender requests the receiver to enable the option.
pub const DO: u8 = 253;
/// DONT — sender requests the receiver to disable the option.
pub const DONT: u8 = 254;

/// The simple one-byte commands, 240-249, consumed as one-shot events
/// with no payload. Only [`GA`] is surfaced to the caller as an event;
/// the rest (NOP, the repurposed [`SUSP`], BRK, IP, AO, AYT, EC, EL, SE)
/// are swallowed — this crate only ever *sends* IP/SUSP, it has no use
/// for receiving them back from a peer.
fn is_simple_command(b: u8) -> bool {
    (240..=249).contains(&b)
}

/// Interrupt Process.
pub const IP: u8 = 244;
/// Suspend — not one of RFC 854's named simple commands. Resolved here
/// (see DESIGN.md) as command byte 242, the slot RFC 854 otherwise
/// assigns to Data Mark; this crate never receives or interprets a Data
/// Mark, so the byte is free to repurpose for the signal-translation
/// path that needs to emit `IAC SUSP` on Ctrl-Z.
pub const SUSP: u8 = 242;

/// Telnet option numbers this processor negotiates.
pub mod opt {
    pub const BINARY: u8 = 0;
    pub const ECHO: u8 = 1;
    pub const SGA: u8 = 3;
    pub const TTYPE: u8 = 24;
    pub const NAWS: u8 = 31;
    pub const LINEMODE: u8 = 34;
    pub const NEW_ENVIRON: u8 = 39;
}

mod ttype_cmd {
    pub const IS: u8 = 0;
    pub const SEND: u8 = 1;
}

mod linemode_cmd {
    pub const MODE: u8 = 1;
    pub const FORWARDMASK: u8 = 2;
    pub const SLC: u8 = 3;
    pub const MODE_ACK: u8 = 4;
}

mod environ_cmd {
    pub const IS: u8 = 0;
    pub const SEND: u8 = 1;
    pub const VAR: u8 = 0;
    pub const VALUE: u8 = 1;
    pub const ESC: u8 = 2;
    pub const USERVAR: u8 = 3;
}

fn supported_option(opt: u8) -> bool {
    matches!(
        opt,
        opt::ECHO | opt::SGA | opt::TTYPE | opt::NAWS | opt::LINEMODE | opt::NEW_ENVIRON
    )
}

// ── TelnetEvent ───────────────────────────────────────────────────────────

/// A decoded event produced by the byte-stream FSM, consumed internally
/// by [`TelnetProcessor::feed`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum TelnetEvent {
    Data(Vec<u8>),
    Will(u8),
    Wont(u8),
    Do(u8),
    Dont(u8),
    Subneg(u8, Vec<u8>),
    GoAhead,
}

// ── Parser FSM ────────────────────────────────────────────────────────────

/// Cap on `sb_buffer`.
const SB_BUFFER_CAP: usize = 1024;
/// Cap on `partial_buffer`, the carry-over for a command sequence split
/// across chunk boundaries.
const PARTIAL_BUFFER_CAP: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Data,
    Iac,
    Will,
    Wont,
    Do,
    Dont,
    Sb,
    SbData,
    SbIac,
}

/// Byte-stream Telnet protocol parser. Pure state machine, no I/O: feed
/// raw bytes in, get [`TelnetEvent`]s out.
#[derive(Debug)]
struct Parser {
    state: State,
    data_buf: Vec<u8>,
    sb_buf: Vec<u8>,
    current_option: u8,
    /// Raw bytes of the in-progress command sequence (anything since the
    /// last time `state` was `Data`), kept so fragmentation across chunks
    /// has an explicit, capped carry-over — the FSM itself already
    /// tolerates fragmentation via `state` persisting across `feed` calls.
    partial_buffer: Vec<u8>,
}

impl Parser {
    fn new() -> Self {
        Self {
            state: State::Data,
            data_buf: Vec::new(),
            sb_buf: Vec::new(),
            current_option: 0,
            partial_buffer: Vec::new(),
        }
    }

    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<TelnetEvent>, TelnetError> {
        let mut events = Vec::new();
        for &b in bytes {
            self.step(b, &mut events)?;
        }
        self.flush_data(&mut events);
        Ok(events)
    }

    fn flush_data(&mut self, events: &mut Vec<TelnetEvent>) {
        if !self.data_buf.is_empty() {
            events.push(TelnetEvent::Data(std::mem::take(&mut self.data_buf)));
        }
    }

    fn enter(&mut self, state: State) {
        self.state = state;
        if state == State::Data {
            self.partial_buffer.clear();
        }
    }

    fn track_partial(&mut self, b: u8) -> Result<(), TelnetError> {
        self.partial_buffer.push(b);
        if self.partial_buffer.len() > PARTIAL_BUFFER_CAP {
            return Err(TelnetError::BufferOverflow);
        }
        Ok(())
    }

    fn step(&mut self, b: u8, events: &mut Vec<TelnetEvent>) -> Result<(), TelnetError> {
        match self.state {
            State::Data => {
                if b == IAC {
                    self.flush_data(events);
                    self.enter(State::Iac);
                    self.track_partial(b)?;
                } else {
                    self.data_buf.push(b);
                }
            }
            State::Iac => {
                self.track_partial(b)?;
                match b {
                    IAC => {
                        self.data_buf.push(0xFF);
                        self.enter(State::Data);
                    }
                    WILL => self.enter(State::Will),
                    WONT => self.enter(State::Wont),
                    DO => self.enter(State::Do),
                    DONT => self.enter(State::Dont),
                    SB => self.enter(State::Sb),
                    GA => {
                        events.push(TelnetEvent::GoAhead);
                        self.enter(State::Data);
                    }
                    EOR => {
                        // Not a Q-method event; treated like the other
                        // simple commands (consumed, no payload).
                        self.enter(State::Data);
                    }
                    _ if is_simple_command(b) => {
                        self.enter(State::Data);
                    }
                    _ => return Err(TelnetError::InvalidCommand(b)),
                }
            }
            State::Will | State::Wont | State::Do | State::Dont => {
                self.track_partial(b)?;
                let event = match self.state {
                    State::Will => TelnetEvent::Will(b),
                    State::Wont => TelnetEvent::Wont(b),
                    State::Do => TelnetEvent::Do(b),
                    State::Dont => TelnetEvent::Dont(b),
                    _ => unreachable!(),
                };
                events.push(event);
                self.enter(State::Data);
            }
            State::Sb => {
                self.track_partial(b)?;
                self.current_option = b;
                self.sb_buf.clear();
                self.enter(State::SbData);
            }
            State::SbData => {
                if b == IAC {
                    self.enter(State::SbIac);
                } else {
                    self.sb_buf.push(b);
                    if self.sb_buf.len() > SB_BUFFER_CAP {
                        return Err(TelnetError::SubnegotiationTooLong);
                    }
                }
            }
            State::SbIac => match b {
                SE => {
                    let data = std::mem::take(&mut self.sb_buf);
                    events.push(TelnetEvent::Subneg(self.current_option, data));
                    self.enter(State::Data);
                }
                IAC => {
                    self.sb_buf.push(0xFF);
                    if self.sb_buf.len() > SB_BUFFER_CAP {
                        return Err(TelnetError::SubnegotiationTooLong);
                    }
                    self.enter(State::SbData);
                }
                _ => return Err(TelnetError::MalformedSequence),
            },
        }
        Ok(())
    }
}

// ── Q-method option state ────────────────────────────────────────────────

/// RFC 1143 Q-method negotiation state for one option in one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionState {
    No,
    Yes,
    WantNo,
    WantYes,
}

const NEGOTIATION_CAP: u8 = 10;

// ── Output escaping / subnegotiation builders ────────────────────────────

/// Escape any `0xFF` in `data` as `0xFF 0xFF` (IAC escaping applied to
/// everything this processor writes, including subnegotiation payloads).
fn escape_iac(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        if b == IAC {
            out.push(IAC);
        }
        out.push(b);
    }
    out
}

/// Build an `IAC SB <opt> <data> IAC SE` subnegotiation, IAC-escaped.
fn build_subneg(opt: u8, data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5 + data.len());
    buf.extend_from_slice(&[IAC, SB, opt]);
    buf.extend(escape_iac(data));
    buf.extend_from_slice(&[IAC, SE]);
    buf
}

/// Build a NAWS subnegotiation advertising `width × height`.
pub fn build_naws(width: u16, height: u16) -> Vec<u8> {
    let data = [
        (width >> 8) as u8,
        width as u8,
        (height >> 8) as u8,
        height as u8,
    ];
    build_subneg(opt::NAWS, &data)
}

/// Escape the four NEW-ENVIRON structural byte values (VAR/VALUE/ESC/
/// USERVAR = 0/1/2/3) that happen to appear in variable name or value
/// content, by prefixing each with `ESC`.
fn escape_environ(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        if b <= environ_cmd::USERVAR {
            out.push(environ_cmd::ESC);
        }
        out.push(b);
    }
    out
}

fn build_new_environ_is(vars: &[(String, String)]) -> Vec<u8> {
    let mut data = vec![environ_cmd::IS];
    for (k, v) in vars {
        data.push(environ_cmd::VAR);
        data.extend(escape_environ(k.as_bytes()));
        data.push(environ_cmd::VALUE);
        data.extend(escape_environ(v.as_bytes()));
    }
    build_subneg(opt::NEW_ENVIRON, &data)
}

fn build_ttype_is(name: &str) -> Vec<u8> {
    let mut data = vec![ttype_cmd::IS];
    data.extend_from_slice(name.as_bytes());
    build_subneg(opt::TTYPE, &data)
}

// ── TelnetProcessor ───────────────────────────────────────────────────────

/// The full Telnet state machine: byte-level parsing, Q-method option
/// negotiation, subnegotiation dispatch, and IAC escaping on output.
///
/// Owns no socket; [`crate::telnet_stream::TelnetStream`] drives it over
/// a [`crate::stream::Stream`].
#[derive(Debug)]
pub struct TelnetProcessor {
    parser: Parser,
    /// Options *we* are enabled/negotiating for (state sent via WILL/WONT).
    us: [OptionState; 256],
    /// Options *they* are enabled/negotiating for (state sent via DO/DONT).
    him: [OptionState; 256],
    /// Per-option received-flip counter, guarding against a peer that
    /// flip-flops an option forever.
    attempts: [u8; 256],
    term_type: String,
    window_size: (u16, u16),
    env_vars: Vec<(String, String)>,
}

impl TelnetProcessor {
    pub fn new(term_type: impl Into<String>, window_size: (u16, u16)) -> Self {
        Self {
            parser: Parser::new(),
            us: [OptionState::No; 256],
            him: [OptionState::No; 256],
            attempts: [0; 256],
            term_type: term_type.into(),
            window_size,
            env_vars: Vec::new(),
        }
    }

    pub fn set_env_vars(&mut self, vars: Vec<(String, String)>) {
        self.env_vars = vars;
    }

    pub fn is_us_enabled(&self, opt: u8) -> bool {
        self.us[opt as usize] == OptionState::Yes
    }

    pub fn is_him_enabled(&self, opt: u8) -> bool {
        self.him[opt as usize] == OptionState::Yes
    }

    /// Feed raw bytes from the peer. Returns `(app_bytes, reply_bytes)`:
    /// `app_bytes` is data the caller should forward to the application
    /// side, `reply_bytes` is what must be written back to the peer
    /// before the engine attempts another read.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(Vec<u8>, Vec<u8>), TelnetError> {
        let events = self.parser.feed(bytes)?;
        let mut app = Vec::new();
        let mut reply = Vec::new();
        for event in events {
            match event {
                TelnetEvent::Data(d) => app.extend(d),
                TelnetEvent::GoAhead => {}
                TelnetEvent::Will(o) => reply.extend(self.handle_will(o)?),
                TelnetEvent::Wont(o) => reply.extend(self.handle_wont(o)?),
                TelnetEvent::Do(o) => reply.extend(self.handle_do(o)?),
                TelnetEvent::Dont(o) => reply.extend(self.handle_dont(o)?),
                TelnetEvent::Subneg(o, data) => reply.extend(self.handle_subneg(o, &data)?),
            }
        }
        Ok((app, reply))
    }

    fn bump(&mut self, opt: u8) -> Result<(), TelnetError> {
        let slot = &mut self.attempts[opt as usize];
        *slot += 1;
        if *slot > NEGOTIATION_CAP {
            return Err(TelnetError::NegotiationLoop(opt));
        }
        Ok(())
    }

    fn handle_will(&mut self, opt: u8) -> Result<Vec<u8>, TelnetError> {
        self.bump(opt)?;
        if !supported_option(opt) {
            return Ok(vec![IAC, DONT, opt]);
        }
        let side = &mut self.him[opt as usize];
        Ok(match *side {
            OptionState::No => {
                *side = OptionState::Yes;
                vec![IAC, DO, opt]
            }
            OptionState::Yes => vec![],
            OptionState::WantYes | OptionState::WantNo => {
                *side = OptionState::Yes;
                vec![]
            }
        })
    }

    fn handle_wont(&mut self, opt: u8) -> Result<Vec<u8>, TelnetError> {
        self.bump(opt)?;
        if !supported_option(opt) {
            return Ok(vec![]);
        }
        let side = &mut self.him[opt as usize];
        Ok(match *side {
            OptionState::Yes => {
                *side = OptionState::No;
                vec![IAC, DONT, opt]
            }
            OptionState::No => vec![],
            OptionState::WantYes | OptionState::WantNo => {
                *side = OptionState::No;
                vec![]
            }
        })
    }

    fn handle_do(&mut self, opt: u8) -> Result<Vec<u8>, TelnetError> {
        self.bump(opt)?;
        if !supported_option(opt) {
            return Ok(vec![IAC, WONT, opt]);
        }
        let side = &mut self.us[opt as usize];
        let (became_yes, mut reply) = match *side {
            OptionState::No => {
                *side = OptionState::Yes;
                (true, vec![IAC, WILL, opt])
            }
            OptionState::Yes => (false, vec![]),
            OptionState::WantYes | OptionState::WantNo => {
                *side = OptionState::Yes;
                (true, vec![])
            }
        };
        // Enabling NAWS reports the current window size immediately,
        // rather than waiting for the next resize.
        if became_yes && opt == opt::NAWS {
            let (w, h) = self.window_size;
            reply.extend(build_naws(w, h));
        }
        Ok(reply)
    }

    fn handle_dont(&mut self, opt: u8) -> Result<Vec<u8>, TelnetError> {
        self.bump(opt)?;
        if !supported_option(opt) {
            return Ok(vec![]);
        }
        let side = &mut self.us[opt as usize];
        Ok(match *side {
            OptionState::Yes => {
                *side = OptionState::No;
                vec![IAC, WONT, opt]
            }
            OptionState::No => vec![],
            OptionState::WantYes | OptionState::WantNo => {
                *side = OptionState::No;
                vec![]
            }
        })
    }

    fn handle_subneg(&mut self, opt: u8, data: &[u8]) -> Result<Vec<u8>, TelnetError> {
        match opt {
            opt::TTYPE => {
                if data.first() == Some(&ttype_cmd::SEND) {
                    Ok(build_ttype_is(&self.term_type))
                } else {
                    Ok(vec![])
                }
            }
            opt::NAWS => Ok(vec![]), // we are the one who sends NAWS, not parses it
            opt::LINEMODE => match data.first() {
                Some(&linemode_cmd::MODE) => {
                    let mode = data.get(1).copied().unwrap_or(0);
                    Ok(build_subneg(
                        opt::LINEMODE,
                        &[linemode_cmd::MODE, mode | linemode_cmd::MODE_ACK],
                    ))
                }
                Some(&linemode_cmd::FORWARDMASK) => {
                    let mut reply = vec![linemode_cmd::FORWARDMASK];
                    reply.extend_from_slice(&data[1..]);
                    Ok(build_subneg(opt::LINEMODE, &reply))
                }
                _ => Ok(vec![]), // SLC (3) and anything else: accepted, ignored
            },
            opt::NEW_ENVIRON => {
                if data.first() == Some(&environ_cmd::SEND) {
                    Ok(build_new_environ_is(&self.env_vars))
                } else {
                    Ok(vec![])
                }
            }
            _ => Ok(vec![]),
        }
    }

    // ── Outbound helpers ──────────────────────────────────────────────

    /// NAWS update, sent whenever the window size changes and we have
    /// NAWS enabled.
    pub fn update_window_size(&mut self, width: u16, height: u16) -> Vec<u8> {
        self.window_size = (width, height);
        if self.is_us_enabled(opt::NAWS) {
            build_naws(width, height)
        } else {
            vec![]
        }
    }

    pub fn send_interrupt_process(&self) -> Vec<u8> {
        vec![IAC, IP]
    }

    pub fn send_suspend(&self) -> Vec<u8> {
        vec![IAC, SUSP]
    }

    fn request_will(&mut self, opt: u8) -> Vec<u8> {
        let side = &mut self.us[opt as usize];
        if *side == OptionState::No {
            *side = OptionState::WantYes;
            vec![IAC, WILL, opt]
        } else {
            vec![]
        }
    }

    fn request_do(&mut self, opt: u8) -> Vec<u8> {
        let side = &mut self.him[opt as usize];
        if *side == OptionState::No {
            *side = OptionState::WantYes;
            vec![IAC, DO, opt]
        } else {
            vec![]
        }
    }

    /// Client-mode initial negotiation.
    pub fn initial_client_negotiation(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(self.request_do(opt::SGA));
        out.extend(self.request_will(opt::TTYPE));
        out.extend(self.request_will(opt::NAWS));
        out.extend(self.request_will(opt::NEW_ENVIRON));
        out
    }

    /// Server-mode initial negotiation.
    pub fn initial_server_negotiation(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(self.request_will(opt::ECHO));
        out.extend(self.request_will(opt::SGA));
        out.extend(self.request_do(opt::TTYPE));
        out.extend(self.request_do(opt::NAWS));
        out.extend(self.request_do(opt::NEW_ENVIRON));
        out
    }

    /// Escape application bytes for the wire: every `0xFF` doubled, every
    /// other byte unchanged, so a literal `0xFF` in application data
    /// can never be mistaken for `IAC`.
    pub fn escape_output(data: &[u8]) -> Vec<u8> {
        escape_iac(data)
    }
}

// ── TelnetStream ──────────────────────────────────────────────────────────

/// The Telnet decorator: wraps any [`Stream`] and transparently filters
/// Telnet protocol bytes from the application's view.
///
/// A pure decorator rather than an owner of the socket, so Telnet
/// composes underneath the transfer engine instead of running its own
/// receive loop.
///
/// `maintain()` is the only place this type emits unsolicited bytes; it
/// must never call back into its own `read`/`write`, only into
/// `inner`'s, to avoid recursing through the engine's own borrow.
pub struct TelnetStream {
    inner: Box<dyn Stream>,
    processor: TelnetProcessor,
    signal_translation: bool,
    /// Leftover reply bytes from `maintain()` or from processing more of
    /// a chunk than the caller's buffer could hold, queued until the
    /// next `write`-capable moment.
    pending_out: Vec<u8>,
    /// Decoded application bytes not yet delivered to the caller.
    pending_in: Vec<u8>,
}

impl TelnetStream {
    /// Wrap `inner` with a Telnet processor advertising `term_type` and
    /// `(width, height)`. `enable_signal_translation` turns on the
    /// Ctrl-C/Ctrl-Z → `IAC IP`/`IAC SUSP` translation in `maintain()`.
    pub fn wrap(
        inner: Box<dyn Stream>,
        term_type: impl Into<String>,
        window_size: (u16, u16),
        enable_signal_translation: bool,
    ) -> Self {
        Self {
            inner,
            processor: TelnetProcessor::new(term_type, window_size),
            signal_translation: enable_signal_translation,
            pending_out: Vec::new(),
            pending_in: Vec::new(),
        }
    }

    /// Send the client-mode initial negotiation offer immediately.
    pub fn negotiate_as_client(&mut self) -> io::Result<()> {
        let bytes = self.processor.initial_client_negotiation();
        self.write_raw(&bytes)
    }

    /// Send the server-mode initial negotiation offer immediately.
    pub fn negotiate_as_server(&mut self) -> io::Result<()> {
        let bytes = self.processor.initial_server_negotiation();
        self.write_raw(&bytes)
    }

    fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut written = 0;
        while written < bytes.len() {
            written += self.inner.write(&bytes[written..])?;
        }
        Ok(())
    }

    fn telnet_err(e: TelnetError) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, e.to_string())
    }
}

impl Stream for TelnetStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending_in.is_empty() {
            let mut raw = [0u8; 8192];
            let n = self.inner.read(&mut raw)?;
            if n == 0 {
                return Ok(0);
            }
            let (app, reply) = self
                .processor
                .feed(&raw[..n])
                .map_err(Self::telnet_err)?;
            // Negotiation replies go out before the caller gets to read
            // again.
            if !reply.is_empty() {
                self.write_raw(&reply)?;
            }
            self.pending_in = app;
        }
        let n = buf.len().min(self.pending_in.len());
        buf[..n].copy_from_slice(&self.pending_in[..n]);
        self.pending_in.drain(..n);
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.pending_out.is_empty() {
            self.write_raw(&std::mem::take(&mut self.pending_out))?;
        }
        let escaped = TelnetProcessor::escape_output(buf);
        self.write_raw(&escaped)?;
        Ok(buf.len())
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner.close()
    }

    fn handle(&self) -> Handle {
        self.inner.handle()
    }

    fn maintain(&mut self) -> io::Result<()> {
        self.inner.maintain()?;
        let mut out = Vec::new();
        if let Some((w, h)) = signals::take_resize() {
            out.extend(self.processor.update_window_size(w, h));
        }
        if self.signal_translation {
            if signals::take_interrupt() {
                out.extend(self.processor.send_interrupt_process());
            }
            if signals::take_suspend() {
                out.extend(self.processor.send_suspend());
            }
        }
        if !out.is_empty() {
            self.write_raw(&out)?;
        }
        Ok(())
    }

    fn shutdown_write(&mut self) -> io::Result<()> {
        self.inner.shutdown_write()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn proc_with(term: &str, w: u16, h: u16) -> TelnetProcessor {
        TelnetProcessor::new(term, (w, h))
    }

    #[test]
    fn plain_data_passthrough() {
        let mut p = proc_with("xterm", 80, 24);
        let (app, reply) = p.feed(b"hello").unwrap();
        assert_eq!(app, b"hello");
        assert!(reply.is_empty());
    }

    #[test]
    fn escaped_iac_passes_through_as_single_ff() {
        let mut p = proc_with("xterm", 80, 24);
        let input = [0x48, 0x65, IAC, IAC, 0x6c, 0x6c, 0x6f];
        let (app, reply) = p.feed(&input).unwrap();
        assert_eq!(app, b"Hello");
        assert!(reply.is_empty());
    }

    #[test]
    fn will_echo_and_do_naws_get_expected_replies() {
        let mut p = proc_with("xterm", 80, 24);
        let input = [IAC, WILL, opt::ECHO, IAC, DO, opt::NAWS];
        let (app, reply) = p.feed(&input).unwrap();
        assert!(app.is_empty());
        let expected = [
            IAC, DO, opt::ECHO, IAC, WILL, opt::NAWS, IAC, SB, opt::NAWS, 0, 80, 0, 24, IAC, SE,
        ];
        assert_eq!(reply, expected);
    }

    #[test]
    fn terminal_type_send_replies_with_configured_name() {
        let mut p = proc_with("xterm", 80, 24);
        let input = [IAC, SB, opt::TTYPE, ttype_cmd::SEND, IAC, SE];
        let (app, reply) = p.feed(&input).unwrap();
        assert!(app.is_empty());
        let mut expected = vec![IAC, SB, opt::TTYPE, ttype_cmd::IS];
        expected.extend_from_slice(b"xterm");
        expected.extend_from_slice(&[IAC, SE]);
        assert_eq!(reply, expected);
    }

    #[test]
    fn idempotent_negotiation_after_yes() {
        let mut p = proc_with("xterm", 80, 24);
        let (_, reply1) = p.feed(&[IAC, WILL, opt::ECHO]).unwrap();
        assert_eq!(reply1, vec![IAC, DO, opt::ECHO]);
        let (_, reply2) = p.feed(&[IAC, WILL, opt::ECHO]).unwrap();
        assert!(reply2.is_empty());
    }

    #[test]
    fn negotiation_cap_is_fatal_on_the_11th_flip() {
        // 10 received flips are tolerated, the 11th is fatal.
        let mut p = proc_with("xterm", 80, 24);
        for _ in 0..10 {
            p.feed(&[IAC, WILL, opt::ECHO]).unwrap();
        }
        let err = p.feed(&[IAC, WILL, opt::ECHO]).unwrap_err();
        assert!(matches!(err, TelnetError::NegotiationLoop(o) if o == opt::ECHO));
    }

    #[test]
    fn unsupported_option_gets_mirrored_refusal() {
        let mut p = proc_with("xterm", 80, 24);
        let (_, reply) = p.feed(&[IAC, WILL, 99]).unwrap();
        assert_eq!(reply, vec![IAC, DONT, 99]);
        let (_, reply) = p.feed(&[IAC, DO, 99]).unwrap();
        assert_eq!(reply, vec![IAC, WONT, 99]);
    }

    #[test]
    fn fragmentation_robustness() {
        let full: Vec<u8> = {
            let mut v = b"ab".to_vec();
            v.extend_from_slice(&[IAC, WILL, opt::ECHO]);
            v.extend_from_slice(b"cd");
            v
        };
        let mut whole = proc_with("xterm", 80, 24);
        let (app_whole, reply_whole) = whole.feed(&full).unwrap();

        let mut chunked = proc_with("xterm", 80, 24);
        let mut app_chunked = Vec::new();
        let mut reply_chunked = Vec::new();
        for byte in &full {
            let (a, r) = chunked.feed(std::slice::from_ref(byte)).unwrap();
            app_chunked.extend(a);
            reply_chunked.extend(r);
        }
        assert_eq!(app_whole, app_chunked);
        assert_eq!(reply_whole, reply_chunked);
    }

    #[test]
    fn invalid_command_byte_is_an_error() {
        let mut p = proc_with("xterm", 80, 24);
        // 1 is not IAC, not WILL/WONT/DO/DONT/SB, and outside 240-249.
        let err = p.feed(&[IAC, 1]).unwrap_err();
        assert!(matches!(err, TelnetError::InvalidCommand(1)));
    }

    #[test]
    fn malformed_subnegotiation_is_an_error() {
        let mut p = proc_with("xterm", 80, 24);
        let err = p
            .feed(&[IAC, SB, opt::NAWS, 0x01, IAC, 0x02])
            .unwrap_err();
        assert!(matches!(err, TelnetError::MalformedSequence));
    }

    #[test]
    fn subnegotiation_too_long_is_an_error() {
        let mut p = proc_with("xterm", 80, 24);
        let mut input = vec![IAC, SB, opt::NAWS];
        input.extend(std::iter::repeat(0x41).take(SB_BUFFER_CAP + 1));
        input.extend_from_slice(&[IAC, SE]);
        let err = p.feed(&input).unwrap_err();
        assert!(matches!(err, TelnetError::SubnegotiationTooLong));
    }

    #[test]
    fn naws_update_emits_only_when_us_enabled() {
        let mut p = proc_with("xterm", 80, 24);
        assert!(p.update_window_size(100, 40).is_empty());
        p.feed(&[IAC, DO, opt::NAWS]).unwrap(); // peer asks us to enable NAWS
        let bytes = p.update_window_size(100, 40);
        assert_eq!(bytes, build_naws(100, 40));
    }

    #[test]
    fn new_environ_send_lists_configured_vars() {
        let mut p = proc_with("xterm", 80, 24);
        p.set_env_vars(vec![("TERM".to_owned(), "xterm".to_owned())]);
        let (_, reply) = p
            .feed(&[IAC, SB, opt::NEW_ENVIRON, environ_cmd::SEND, IAC, SE])
            .unwrap();
        let mut expected = vec![IAC, SB, opt::NEW_ENVIRON, environ_cmd::IS, environ_cmd::VAR];
        expected.extend_from_slice(b"TERM");
        expected.push(environ_cmd::VALUE);
        expected.extend_from_slice(b"xterm");
        expected.extend_from_slice(&[IAC, SE]);
        assert_eq!(reply, expected);
    }

    #[test]
    fn linemode_mode_is_acked() {
        let mut p = proc_with("xterm", 80, 24);
        let (_, reply) = p
            .feed(&[IAC, SB, opt::LINEMODE, linemode_cmd::MODE, 1, IAC, SE])
            .unwrap();
        assert_eq!(
            reply,
            vec![
                IAC,
                SB,
                opt::LINEMODE,
                linemode_cmd::MODE,
                1 | linemode_cmd::MODE_ACK,
                IAC,
                SE
            ]
        );
    }

    #[test]
    fn initial_client_negotiation_sends_expected_offers() {
        let mut p = proc_with("xterm", 80, 24);
        let out = p.initial_client_negotiation();
        assert_eq!(
            out,
            vec![
                IAC, DO, opt::SGA, IAC, WILL, opt::TTYPE, IAC, WILL, opt::NAWS, IAC, WILL,
                opt::NEW_ENVIRON,
            ]
        );
    }

    #[test]
    fn escape_output_doubles_iac_only() {
        let out = TelnetProcessor::escape_output(&[0x01, IAC, 0x02]);
        assert_eq!(out, vec![0x01, IAC, IAC, 0x02]);
    }

    #[test]
    fn send_helpers_build_expected_bytes() {
        let p = proc_with("xterm", 80, 24);
        assert_eq!(p.send_interrupt_process(), vec![IAC, IP]);
        assert_eq!(p.send_suspend(), vec![IAC, SUSP]);
    }

    // ── TelnetStream ──────────────────────────────────────────────────

    use crate::stream::TcpTransport;
    use std::net::{TcpListener, TcpStream as StdTcpStream};
    use std::time::Duration;

    fn loopback_pair() -> (StdTcpStream, StdTcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = StdTcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn telnet_stream_strips_negotiation_and_replies() {
        let (client, mut server) = loopback_pair();
        let inner: Box<dyn Stream> = Box::new(TcpTransport::new(client).unwrap());
        let mut telnet = TelnetStream::wrap(inner, "xterm", (80, 24), false);

        use std::io::{Read, Write};
        server
            .write_all(&[IAC, WILL, opt::ECHO, b'h', b'i'])
            .unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let mut buf = [0u8; 16];
        let n = loop {
            match telnet.read(&mut buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => panic!("read failed: {e}"),
            }
        };
        assert_eq!(&buf[..n], b"hi");

        std::thread::sleep(Duration::from_millis(50));
        let mut reply = [0u8; 16];
        let n = server.read(&mut reply).unwrap();
        assert_eq!(&reply[..n], &[IAC, DO, opt::ECHO]);
    }

    #[test]
    fn telnet_stream_escapes_iac_on_write() {
        let (client, mut server) = loopback_pair();
        let inner: Box<dyn Stream> = Box::new(TcpTransport::new(client).unwrap());
        let mut telnet = TelnetStream::wrap(inner, "xterm", (80, 24), false);

        let n = telnet.write(&[0x01, IAC, 0x02]).unwrap();
        assert_eq!(n, 3); // logical bytes written, not wire bytes
        std::thread::sleep(Duration::from_millis(50));

        use std::io::Read;
        let mut buf = [0u8; 16];
        let n = server.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[0x01, IAC, IAC, 0x02]);
    }
}
