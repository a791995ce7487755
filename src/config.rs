//! Engine configuration — the options the core observes.
//!
//! Every field here is set by `cli.rs` and is read-only from the
//! transfer engine's perspective. Validating these values against each
//! other (e.g. rejecting `send_only && recv_only`) is the CLI's job, not
//! the core's.

use std::path::PathBuf;
use std::time::Duration;

/// Direction + behavior flags and tunables observed by [`crate::transfer`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Disable all reads from the stream; only stdin → peer flows.
    pub send_only: bool,
    /// Disable all reads from stdin; only peer → stdout flows.
    pub recv_only: bool,
    /// LF → CRLF conversion on the send path.
    pub crlf: bool,
    /// Sleep this long after every stdin→stream write (traffic shaping).
    pub delay_ms: u64,
    /// Idle-timeout override; `None` means "use the platform/TTY default"
    /// — explicit config wins over a TTY-detection default, which wins
    /// over the platform default.
    pub idle_timeout: Option<Duration>,
    /// Terminate the session as soon as stdin reaches EOF, without
    /// waiting for the peer to close.
    pub close_on_eof: bool,
    /// Suppress the write-half shutdown normally issued on stdin EOF.
    pub no_shutdown: bool,
    /// Route received bytes through the hex formatter to stdout instead
    /// of writing them raw.
    pub hex_dump: bool,
    /// Enable the Telnet Stream decorator.
    pub telnet: bool,
    /// Use the local line editor in linemode instead of raw passthrough.
    pub telnet_edit_mode: bool,
    /// Translate Ctrl-C/Ctrl-Z into `IAC IP`/`IAC SUSP` rather than
    /// letting the local TTY driver handle them.
    pub telnet_signal_translation: bool,
    /// Terminal type string advertised via TERMINAL-TYPE.
    pub term_type: String,
    /// Advertised window size (width, height), reported via NAWS.
    pub window_size: (u16, u16),
    /// Output-sink destination path (`None` ⇒ sink disabled).
    pub output_path: Option<PathBuf>,
    /// Append rather than truncate the output-sink file.
    pub output_append: bool,
    /// Hex-dump sink destination path, independent of `hex_dump` (which
    /// only controls whether received bytes *also* go to stdout in hex
    /// form); `None` ⇒ sink disabled.
    pub hex_dump_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            send_only: false,
            recv_only: false,
            crlf: false,
            delay_ms: 0,
            idle_timeout: None,
            close_on_eof: false,
            no_shutdown: false,
            hex_dump: false,
            telnet: false,
            telnet_edit_mode: false,
            telnet_signal_translation: false,
            term_type: "xterm".to_owned(),
            window_size: (80, 24),
            output_path: None,
            output_append: false,
            hex_dump_path: None,
        }
    }
}

impl Config {
    /// Whether reads from stdin are permitted at all.
    pub fn can_send(&self) -> bool {
        !self.recv_only
    }

    /// Whether reads from the stream are permitted at all.
    pub fn can_recv(&self) -> bool {
        !self.send_only
    }

    /// Resolve the idle timeout: explicit config wins, then a
    /// TTY-detection default, then the platform default.
    pub fn resolve_idle_timeout(&self, stdin_is_tty: bool) -> Option<Duration> {
        if let Some(t) = self.idle_timeout {
            return Some(t);
        }
        if stdin_is_tty {
            return None; // indefinite on TTY stdin
        }
        if cfg!(windows) {
            Some(Duration::from_secs(30))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_allow_both_directions() {
        let cfg = Config::default();
        assert!(cfg.can_send());
        assert!(cfg.can_recv());
    }

    #[test]
    fn send_only_disables_recv() {
        let mut cfg = Config::default();
        cfg.send_only = true;
        assert!(cfg.can_send());
        assert!(!cfg.can_recv());
    }

    #[test]
    fn recv_only_disables_send() {
        let mut cfg = Config::default();
        cfg.recv_only = true;
        assert!(!cfg.can_send());
        assert!(cfg.can_recv());
    }

    #[test]
    fn explicit_timeout_wins_over_tty_default() {
        let mut cfg = Config::default();
        cfg.idle_timeout = Some(Duration::from_millis(500));
        assert_eq!(cfg.resolve_idle_timeout(true), Some(Duration::from_millis(500)));
    }

    #[test]
    fn tty_stdin_defaults_to_indefinite() {
        let cfg = Config::default();
        assert_eq!(cfg.resolve_idle_timeout(true), None);
    }
}
