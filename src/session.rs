//! Shared session state between the UI thread, the monitor thread and the
//! console control handler.
//!
//! Ownership of each field:
//! - `running`: written by shutdown paths (window close, exit hotkey, console
//!   signal, monitor on final exit); read by the monitor and message loop.
//! - `restart_intent`: set by the restart hotkey while it holds the lock and
//!   terminates the child; consumed once by the monitor under the same lock.
//! - `finished`: set by the UI thread when teardown is complete, awaited by
//!   the console handler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::platform::WindowId;

/// Sent from the monitor thread to the UI thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The child is gone and no restart was requested; the host should close.
    ChildExited { code: Option<u32> },
    /// A requested restart produced a new child. `window` is the result of a
    /// fresh discovery pass (embed mode only).
    ChildRestarted { pid: u32, window: Option<WindowId> },
    /// The relaunch after a restart request failed to spawn.
    RestartFailed(String),
}

#[derive(Debug, Default)]
pub struct Session {
    running: AtomicBool,
    restart_intent: Mutex<bool>,
    finished: Mutex<bool>,
    finished_cv: Condvar,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// Clears the running flag; returns whether it was set before.
    pub fn stop(&self) -> bool {
        self.running.swap(false, Ordering::SeqCst)
    }

    /// Locks the restart intent. The restart path keeps this guard alive
    /// across the termination call so the monitor cannot decide the exit
    /// is final in between.
    pub fn restart_intent(&self) -> MutexGuard<'_, bool> {
        self.restart_intent.lock()
    }

    /// Reads and clears the restart request in one step.
    pub fn take_restart_request(&self) -> bool {
        std::mem::take(&mut *self.restart_intent.lock())
    }

    pub fn mark_finished(&self) {
        let mut finished = self.finished.lock();
        *finished = true;
        self.finished_cv.notify_all();
    }

    /// Waits until the UI thread has finished teardown, or `timeout` passes.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        let mut finished = self.finished.lock();
        if !*finished {
            let _ = self.finished_cv.wait_for(&mut finished, timeout);
        }
        *finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn restart_request_is_consumed_once() {
        let session = Session::new();
        *session.restart_intent() = true;
        assert!(session.take_restart_request());
        assert!(!session.take_restart_request());
    }

    #[test]
    fn stop_reports_previous_state() {
        let session = Session::new();
        session.set_running(true);
        assert!(session.stop());
        assert!(!session.stop());
        assert!(!session.is_running());
    }

    #[test]
    fn wait_finished_wakes_on_mark() {
        let session = Arc::new(Session::new());
        let waiter = {
            let session = session.clone();
            thread::spawn(move || session.wait_finished(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        session.mark_finished();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn wait_finished_times_out() {
        let session = Session::new();
        assert!(!session.wait_finished(Duration::from_millis(10)));
    }
}
