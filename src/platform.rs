//! Thin OS-facing shims the transfer engine needs that don't belong to
//! any one [`crate::stream::Stream`] implementation: stdin/stdout raw
//! descriptors, non-blocking mode, and TTY detection.
//!
//! Goes straight to `libc` for these — a couple of syscalls don't
//! justify a higher-level dependency.

use std::io;

#[cfg(unix)]
use std::os::fd::RawFd;

use crate::stream::Handle;

#[cfg(unix)]
pub const STDIN_HANDLE: RawFd = libc::STDIN_FILENO;
#[cfg(unix)]
pub const STDOUT_HANDLE: RawFd = libc::STDOUT_FILENO;

/// Put stdin into non-blocking mode so it can be multiplexed alongside
/// the peer `Stream` by the poll/select backends.
#[cfg(unix)]
pub fn set_stdin_nonblocking() -> io::Result<()> {
    set_nonblocking(STDIN_HANDLE)
}

#[cfg(unix)]
pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Windows has no real non-blocking console-handle mode short of a
/// dedicated reader thread; the IOCP backend (`src/transfer/iocp.rs`)
/// issues overlapped reads instead, so this is a no-op there.
#[cfg(windows)]
pub fn set_stdin_nonblocking() -> io::Result<()> {
    Ok(())
}

/// Read up to `buf.len()` bytes from stdin without blocking. `Ok(0)`
/// means EOF; a `WouldBlock` error means "nothing ready right now".
#[cfg(unix)]
pub fn read_stdin(buf: &mut [u8]) -> io::Result<usize> {
    let n = unsafe { libc::read(STDIN_HANDLE, buf.as_mut_ptr() as *mut _, buf.len()) };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

#[cfg(windows)]
pub fn read_stdin(buf: &mut [u8]) -> io::Result<usize> {
    use std::io::Read;
    std::io::stdin().lock().read(buf)
}

/// Write `buf` to stdout, blocking. Stdout is not part of the
/// readiness-multiplexed set — only stdin and the peer stream are
/// watched; stdout writes are assumed to make forward progress.
pub fn write_stdout(buf: &[u8]) -> io::Result<()> {
    use std::io::Write;
    std::io::stdout().write_all(buf)
}

/// `true` if stdin is attached to a terminal. Used to pick the
/// idle-timeout default and whether stdin readiness watching applies.
#[cfg(unix)]
pub fn stdin_is_tty() -> bool {
    unsafe { libc::isatty(STDIN_HANDLE) != 0 }
}

#[cfg(windows)]
pub fn stdin_is_tty() -> bool {
    use std::io::IsTerminal;
    std::io::stdin().is_terminal()
}

/// The descriptor the readiness backends watch for stdin, in the same
/// `Handle` type the [`crate::stream::Stream`] trait uses.
#[cfg(unix)]
pub fn stdin_handle() -> Handle {
    STDIN_HANDLE
}

#[cfg(windows)]
pub fn stdin_handle() -> Handle {
    use std::os::windows::io::AsRawHandle;
    std::io::stdin().as_raw_handle() as Handle
}

/// Query the current terminal window size via `TIOCGWINSZ`, used to
/// seed NAWS and to detect resizes outside of `SIGWINCH` delivery.
#[cfg(unix)]
pub fn terminal_size() -> Option<(u16, u16)> {
    #[repr(C)]
    struct Winsize {
        ws_row: u16,
        ws_col: u16,
        ws_xpixel: u16,
        ws_ypixel: u16,
    }
    let mut ws = Winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let rc = unsafe { libc::ioctl(STDOUT_HANDLE, libc::TIOCGWINSZ, &mut ws as *mut Winsize) };
    if rc == 0 && ws.ws_col > 0 && ws.ws_row > 0 {
        Some((ws.ws_col, ws.ws_row))
    } else {
        None
    }
}

#[cfg(windows)]
pub fn terminal_size() -> Option<(u16, u16)> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn stdin_handle_matches_known_fd() {
        assert_eq!(stdin_handle(), 0);
    }
}
