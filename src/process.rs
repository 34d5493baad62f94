//! `ProcessBackend` over `std::process::Command`.
//!
//! On Windows waits and kills go straight to the process handle so a kill
//! never queues behind a pending wait. Elsewhere the child is polled with
//! `try_wait`.

use std::io;
use std::process::{Child, Command};
use std::time::Duration;

use log::{debug, error};

use crate::error::LauncherError;
use crate::launch::LaunchParameters;
use crate::platform::{ChildProcess, ProcessBackend};

#[derive(Debug, Default)]
pub struct StdProcessBackend;

impl ProcessBackend for StdProcessBackend {
    fn spawn(&self, params: &LaunchParameters) -> Result<Box<dyn ChildProcess>, LauncherError> {
        let mut command = Command::new(&params.exe_path);
        command.args(params.args());
        if let Some(dir) = params.working_dir() {
            command.current_dir(dir);
        }
        let child = command.spawn().map_err(|e| {
            error!("[Process] spawn {}: {}", params.exe_path.display(), e);
            LauncherError::SpawnFailed {
                exe: params.exe_path.display().to_string(),
                code: e.raw_os_error(),
            }
        })?;
        debug!("[Process] Spawned pid {}", child.id());
        Ok(Box::new(StdChild::new(child)))
    }
}

#[cfg(windows)]
mod sys {
    use std::ffi::c_void;

    pub const WAIT_OBJECT_0: u32 = 0;
    pub const WAIT_TIMEOUT: u32 = 0x102;
    pub const STILL_ACTIVE: u32 = 259;

    #[link(name = "kernel32")]
    unsafe extern "system" {
        pub fn WaitForSingleObject(handle: *mut c_void, milliseconds: u32) -> u32;
        pub fn TerminateProcess(handle: *mut c_void, exit_code: u32) -> i32;
        pub fn GetExitCodeProcess(handle: *mut c_void, exit_code: *mut u32) -> i32;
    }
}

#[cfg(windows)]
pub struct StdChild {
    pid: u32,
    /// Process handle owned by `child`; valid for as long as `child` lives.
    raw: usize,
    _child: Child,
}

#[cfg(windows)]
impl StdChild {
    fn new(child: Child) -> Self {
        use std::os::windows::io::AsRawHandle;
        Self {
            pid: child.id(),
            raw: child.as_raw_handle() as usize,
            _child: child,
        }
    }

    fn handle(&self) -> *mut std::ffi::c_void {
        self.raw as *mut std::ffi::c_void
    }
}

#[cfg(windows)]
impl ChildProcess for StdChild {
    fn id(&self) -> u32 {
        self.pid
    }

    fn wait_timeout(&self, timeout: Duration) -> io::Result<bool> {
        let ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX - 1);
        match unsafe { sys::WaitForSingleObject(self.handle(), ms) } {
            sys::WAIT_OBJECT_0 => Ok(true),
            sys::WAIT_TIMEOUT => Ok(false),
            _ => Err(io::Error::last_os_error()),
        }
    }

    fn kill(&self) -> io::Result<()> {
        if unsafe { sys::TerminateProcess(self.handle(), 0) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn exit_code(&self) -> Option<u32> {
        let mut code = 0u32;
        let ok = unsafe { sys::GetExitCodeProcess(self.handle(), &mut code) } != 0;
        (ok && code != sys::STILL_ACTIVE).then_some(code)
    }
}

#[cfg(not(windows))]
pub struct StdChild {
    pid: u32,
    child: parking_lot::Mutex<Child>,
}

#[cfg(not(windows))]
impl StdChild {
    fn new(child: Child) -> Self {
        Self {
            pid: child.id(),
            child: parking_lot::Mutex::new(child),
        }
    }
}

#[cfg(not(windows))]
impl ChildProcess for StdChild {
    fn id(&self) -> u32 {
        self.pid
    }

    fn wait_timeout(&self, timeout: Duration) -> io::Result<bool> {
        const SLICE: Duration = Duration::from_millis(25);
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if self.child.lock().try_wait()?.is_some() {
                return Ok(true);
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            std::thread::sleep(SLICE.min(deadline - now));
        }
    }

    fn kill(&self) -> io::Result<()> {
        self.child.lock().kill()
    }

    fn exit_code(&self) -> Option<u32> {
        let status = self.child.lock().try_wait().ok()??;
        status.code().map(|c| c as u32)
    }
}
