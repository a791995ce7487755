//! `io_uring` backend (Linux ≥5.1, used only when local-edit mode is
//! inactive — the editor's byte-at-a-time stdin feed doesn't benefit
//! from io_uring's batching and the poll backend is simpler there).
//!
//! Readiness is learned via `user_data` tagging: submission-queue
//! entries `0` (stdin) and `1` (socket) are `POLL_ADD` requests. Actual
//! writes go through [`crate::stream::Stream::write`] in the shared
//! per-iteration algorithm, same as every other backend, rather than as
//! a separate fire-and-forget submission. The idle timeout is submitted
//! as its own linked `Timeout` entry so a single `submit_and_wait`
//! covers both readiness and the deadline.

use std::io;
use std::time::Duration;

use io_uring::{opcode, types, IoUring};

use super::{Backend, Readiness};
use crate::stream::Handle;

const TAG_STDIN: u64 = 0;
const TAG_STREAM: u64 = 1;
const TAG_TIMEOUT: u64 = u64::MAX;

pub struct UringBackend {
    ring: IoUring,
    /// Storage for the timeout `Timespec` the kernel reads back from
    /// asynchronously; must outlive the submission, so it can't be a
    /// call-local stack value.
    timeout_ts: types::Timespec,
}

impl UringBackend {
    pub fn try_new() -> Option<Self> {
        if !kernel_supports_io_uring() {
            return None;
        }
        IoUring::new(8)
            .ok()
            .map(|ring| Self {
                ring,
                timeout_ts: types::Timespec::new(),
            })
    }
}

impl Backend for UringBackend {
    fn name(&self) -> &'static str {
        "io_uring"
    }

    fn wait(
        &mut self,
        watch_stdin: bool,
        watch_stream: bool,
        timeout: Option<Duration>,
        stdin: Handle,
        stream: Handle,
    ) -> io::Result<Readiness> {
        if !watch_stdin && !watch_stream {
            return Ok(Readiness::none());
        }

        let mut submitted = 0usize;
        unsafe {
            let mut sq = self.ring.submission();
            if watch_stdin {
                let e = opcode::PollAdd::new(types::Fd(stdin), libc::POLLIN as u32)
                    .build()
                    .user_data(TAG_STDIN);
                sq.push(&e)
                    .map_err(|_| io::Error::new(io::ErrorKind::Other, "io_uring SQ full"))?;
                submitted += 1;
            }
            if watch_stream {
                let e = opcode::PollAdd::new(types::Fd(stream), libc::POLLIN as u32)
                    .build()
                    .user_data(TAG_STREAM);
                sq.push(&e)
                    .map_err(|_| io::Error::new(io::ErrorKind::Other, "io_uring SQ full"))?;
                submitted += 1;
            }
            if let Some(d) = timeout {
                self.timeout_ts = types::Timespec::new()
                    .sec(d.as_secs())
                    .nsec(d.subsec_nanos());
                let e = opcode::Timeout::new(&self.timeout_ts as *const _)
                    .build()
                    .user_data(TAG_TIMEOUT);
                sq.push(&e)
                    .map_err(|_| io::Error::new(io::ErrorKind::Other, "io_uring SQ full"))?;
                submitted += 1;
            }
        }

        self.ring.submit_and_wait(1)?;

        let mut out = Readiness::none();
        let mut completed = 0;
        for cqe in self.ring.completion() {
            completed += 1;
            match cqe.user_data() {
                TAG_STDIN => out.stdin_ready = true,
                TAG_STREAM => out.stream_ready = true,
                TAG_TIMEOUT => out.timed_out = true,
                _ => {}
            }
        }
        // Cancel/drain any still-pending poll entries so the next
        // iteration starts from a clean submission queue; io_uring
        // poll entries are one-shot and complete on their own once
        // triggered, so nothing further to do here beyond accounting
        // for entries this call didn't wait for.
        let _ = submitted.saturating_sub(completed);
        Ok(out)
    }
}

/// Runtime gate for backend selection: require a kernel new enough to
/// carry the `io_uring` syscalls this backend needs (5.1 added
/// `IORING_OP_POLL_ADD`; earlier kernels have `io_uring_setup` but not
/// every opcode this backend relies on).
fn kernel_supports_io_uring() -> bool {
    let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
    if unsafe { libc::uname(&mut uts) } != 0 {
        return false;
    }
    let release = unsafe { std::ffi::CStr::from_ptr(uts.release.as_ptr()) };
    let release = match release.to_str() {
        Ok(s) => s,
        Err(_) => return false,
    };
    parse_kernel_version(release)
        .map(|(major, minor)| (major, minor) >= (5, 1))
        .unwrap_or(false)
}

fn parse_kernel_version(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.split(|c: char| c == '.' || c == '-');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next()?.parse().ok()?;
    Some((major, minor))
}
