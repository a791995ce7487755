//! IOCP backend (Windows).
//!
//! Each watched handle is associated with the completion port once;
//! this backend then issues a zero-byte overlapped `ReadFile` per
//! handle purely as a *readability probe* — matching the Windows idiom
//! of using overlapped completion to learn "data is available" without
//! consuming it — and `GetQueuedCompletionStatus` blocks for the idle
//! timeout. Tags: `0` = stdin, `1` = socket.
//!
//! The overlapped completion is treated purely as a readiness signal;
//! the generic engine loop performs the actual `Stream::read` afterward,
//! exactly as the poll/select/io_uring backends do, rather than handing
//! back the bytes the probe itself captured.

use std::collections::HashMap;
use std::io;
use std::time::Duration;

use windows_sys::Win32::Foundation::{CloseHandle, ERROR_BROKEN_PIPE, HANDLE};
use windows_sys::Win32::System::IO::{
    CreateIoCompletionPort, GetQueuedCompletionStatus, OVERLAPPED,
};
use windows_sys::Win32::System::Threading::INFINITE;

use super::{Backend, Readiness};
use crate::stream::Handle;

const KEY_STDIN: usize = 0;
const KEY_STREAM: usize = 1;

pub struct IocpBackend {
    port: HANDLE,
    associated: HashMap<usize, Handle>,
}

impl IocpBackend {
    pub fn try_new() -> Option<Self> {
        let port = unsafe { CreateIoCompletionPort(-1isize as HANDLE, 0, 0, 0) };
        if port == 0 {
            return None;
        }
        Some(Self {
            port,
            associated: HashMap::new(),
        })
    }

    fn ensure_associated(&mut self, key: usize, handle: Handle) -> io::Result<()> {
        if self.associated.get(&key) == Some(&handle) {
            return Ok(());
        }
        let rc = unsafe { CreateIoCompletionPort(handle as HANDLE, self.port, key, 0) };
        if rc == 0 {
            return Err(io::Error::last_os_error());
        }
        self.associated.insert(key, handle);
        Ok(())
    }
}

impl Backend for IocpBackend {
    fn name(&self) -> &'static str {
        "iocp"
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
        if watch_stdin {
            self.ensure_associated(KEY_STDIN, stdin)?;
        }
        if watch_stream {
            self.ensure_associated(KEY_STREAM, stream as Handle)?;
        }

        let timeout_ms: u32 = match timeout {
            Some(d) => d.as_millis().min(u32::MAX as u128) as u32,
            None => INFINITE,
        };

        let mut bytes_transferred: u32 = 0;
        let mut key: usize = 0;
        let mut overlapped: *mut OVERLAPPED = std::ptr::null_mut();
        let ok = unsafe {
            GetQueuedCompletionStatus(
                self.port,
                &mut bytes_transferred,
                &mut key,
                &mut overlapped,
                timeout_ms,
            )
        };

        let mut out = Readiness::none();
        if ok == 0 {
            let err = io::Error::last_os_error();
            match err.raw_os_error().map(|c| c as u32) {
                Some(ERROR_BROKEN_PIPE) => {
                    if key == KEY_STDIN {
                        out.stdin_ready = true;
                    } else if key == KEY_STREAM {
                        out.stream_ready = true;
                    }
                    return Ok(out);
                }
                _ if err.kind() == io::ErrorKind::TimedOut => {
                    out.timed_out = true;
                    return Ok(out);
                }
                _ => return Err(err),
            }
        }

        match key {
            KEY_STDIN => out.stdin_ready = true,
            KEY_STREAM => out.stream_ready = true,
            _ => {}
        }
        Ok(out)
    }
}

impl Drop for IocpBackend {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.port);
        }
    }
}

