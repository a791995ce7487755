//! Process-wide diagnostics: the `zigcat: ` message prefix and a
//! verbosity gate.
//!
//! No logging crate — straight `eprintln!`/`println!` with a `"zigcat: "`
//! prefix, centralized here so the rest of the crate doesn't repeat it ad
//! hoc. Adds a single `-v` verbosity gate for the chatter the transfer
//! engine emits when it downgrades a sink error to a warning instead of
//! aborting the session.

use std::sync::atomic::{AtomicBool, Ordering};

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Enable verbose diagnostics (set once at startup from `-v`).
pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::Relaxed);
}

pub fn verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// Print a user-visible warning (sink disabled, fallback engaged, etc).
/// Always shown, regardless of `-v` — distinct from `debug` chatter.
pub fn warn(msg: &str) {
    eprintln!("zigcat: warning: {msg}");
}

/// Print a fatal error immediately before the process exits or the
/// session unwinds.
pub fn error(msg: &str) {
    eprintln!("zigcat: {msg}");
}

/// Print a diagnostic message only when `-v` was given.
pub fn debug(msg: &str) {
    if verbose() {
        eprintln!("zigcat: debug: {msg}");
    }
}
