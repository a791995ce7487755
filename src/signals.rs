//! Process-wide signal/window-resize latch.
//!
//! Implemented as atomic flags set from a signal handler and drained by
//! [`crate::telnet::TelnetStream::maintain`] — no allocation in the
//! handler, as required of any async-signal-safe handler. Goes straight
//! to `libc`'s `signal()` rather than a signal-handling crate: a single
//! registration plus three atomics doesn't need one.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

static WINCH: AtomicBool = AtomicBool::new(false);
static INTERRUPT: AtomicBool = AtomicBool::new(false);
static SUSPEND: AtomicBool = AtomicBool::new(false);
static WIDTH: AtomicU16 = AtomicU16::new(80);
static HEIGHT: AtomicU16 = AtomicU16::new(24);

/// Register `SIGWINCH`/`SIGINT`/`SIGTSTP` handlers that only set atomic
/// flags. Idempotent; safe to call once at startup. Unix-only — Windows
/// console resize/Ctrl-C delivery is a separate, platform-specific
/// concern handled elsewhere.
#[cfg(unix)]
pub fn install() {
    unsafe {
        libc::signal(libc::SIGWINCH, handle_winch as libc::sighandler_t);
        libc::signal(libc::SIGINT, handle_interrupt as libc::sighandler_t);
        libc::signal(libc::SIGTSTP, handle_suspend as libc::sighandler_t);
    }
}

#[cfg(unix)]
extern "C" fn handle_winch(_: libc::c_int) {
    WINCH.store(true, Ordering::Relaxed);
}

#[cfg(unix)]
extern "C" fn handle_interrupt(_: libc::c_int) {
    INTERRUPT.store(true, Ordering::Relaxed);
}

#[cfg(unix)]
extern "C" fn handle_suspend(_: libc::c_int) {
    SUSPEND.store(true, Ordering::Relaxed);
}

/// Record the terminal dimensions observed at the most recent resize.
/// Called from the (non-signal-context) code that actually queries
/// `ioctl(TIOCGWINSZ)`, since that syscall isn't async-signal-safe.
pub fn set_window_size(width: u16, height: u16) {
    WIDTH.store(width, Ordering::Relaxed);
    HEIGHT.store(height, Ordering::Relaxed);
}

/// Drain the resize flag. Returns the last-recorded size if a resize
/// happened since the previous call, `None` otherwise. Edge-sensitive:
/// a second call before another resize returns `None`.
pub fn take_resize() -> Option<(u16, u16)> {
    if WINCH.swap(false, Ordering::Relaxed) {
        Some((WIDTH.load(Ordering::Relaxed), HEIGHT.load(Ordering::Relaxed)))
    } else {
        None
    }
}

/// Drain the interrupt (Ctrl-C) flag.
pub fn take_interrupt() -> bool {
    INTERRUPT.swap(false, Ordering::Relaxed)
}

/// Drain the suspend (Ctrl-Z) flag.
pub fn take_suspend() -> bool {
    SUSPEND.swap(false, Ordering::Relaxed)
}
