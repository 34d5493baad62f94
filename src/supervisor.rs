//! Child process lifecycle: launch, poll, terminate and the monitor loop
//! that decides whether an exit ends the session or starts a new one.
//!
//! The supervisor is the only component that starts, waits on or kills the
//! emulator. At most one `ChildProcessHandle` is open at a time: `launch`
//! closes the previous handle before it spawns again.

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::constants;
use crate::error::LauncherError;
use crate::launch::LaunchParameters;
use crate::platform::{ChildProcess, HostNotifier, ProcessBackend, WindowId};
use crate::session::{Session, SessionEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Running,
    Exited,
}

/// Owns the OS resources of one spawned child. Closing is explicit
/// (`close`/`terminate`) and also happens on drop.
pub struct ChildProcessHandle {
    pid: u32,
    process: RwLock<Option<Box<dyn ChildProcess>>>,
}

impl std::fmt::Debug for ChildProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChildProcessHandle")
            .field("pid", &self.pid)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ChildProcessHandle {
    pub fn new(process: Box<dyn ChildProcess>) -> Self {
        Self {
            pid: process.id(),
            process: RwLock::new(Some(process)),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_closed(&self) -> bool {
        self.process.read().is_none()
    }

    /// Waits up to `timeout` for the child to exit. A closed handle reports
    /// `Exited` straight away.
    pub fn poll(&self, timeout: Duration) -> PollStatus {
        let guard = self.process.read();
        let Some(process) = guard.as_ref() else {
            return PollStatus::Exited;
        };
        match process.wait_timeout(timeout) {
            Ok(true) => PollStatus::Exited,
            Ok(false) => PollStatus::Running,
            Err(e) => {
                warn!("[Supervisor] Wait on pid {} failed: {}", self.pid, e);
                PollStatus::Exited
            }
        }
    }

    pub fn exit_code(&self) -> Option<u32> {
        self.process.read().as_ref().and_then(|p| p.exit_code())
    }

    /// Kills the child (unless it already exited), waits up to `grace` for
    /// the OS to reclaim it and releases the handle either way. Calling it
    /// on a closed handle does nothing.
    pub fn terminate(&self, grace: Duration) -> Result<(), LauncherError> {
        let timed_out = {
            let guard = self.process.read();
            let Some(process) = guard.as_ref() else {
                return Ok(());
            };
            if process.wait_timeout(Duration::ZERO).unwrap_or(false) {
                debug!("[Supervisor] pid {} already exited", self.pid);
                false
            } else {
                if let Err(e) = process.kill() {
                    debug!("[Supervisor] kill pid {}: {}", self.pid, e);
                }
                !process.wait_timeout(grace).unwrap_or(false)
            }
        };
        self.close();
        if timed_out {
            return Err(LauncherError::TerminationTimeout {
                pid: self.pid,
                grace_ms: grace.as_millis(),
            });
        }
        Ok(())
    }

    /// Releases the OS handles without touching the process.
    pub fn close(&self) {
        let released = self.process.write().take();
        if released.is_some() {
            debug!("[Supervisor] Closed handles of pid {}", self.pid);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SupervisorTimings {
    pub poll_interval: Duration,
    pub settle_delay: Duration,
    pub terminate_grace: Duration,
}

impl Default for SupervisorTimings {
    fn default() -> Self {
        Self {
            poll_interval: constants::MONITOR_POLL_INTERVAL,
            settle_delay: constants::RESTART_SETTLE_DELAY,
            terminate_grace: constants::TERMINATE_GRACE,
        }
    }
}

pub struct ProcessSupervisor {
    backend: Arc<dyn ProcessBackend>,
    session: Arc<Session>,
    timings: SupervisorTimings,
    current: Mutex<Option<Arc<ChildProcessHandle>>>,
    params: Mutex<Option<LaunchParameters>>,
}

impl ProcessSupervisor {
    pub fn new(backend: Arc<dyn ProcessBackend>, session: Arc<Session>) -> Self {
        Self::with_timings(backend, session, SupervisorTimings::default())
    }

    pub fn with_timings(
        backend: Arc<dyn ProcessBackend>,
        session: Arc<Session>,
        timings: SupervisorTimings,
    ) -> Self {
        Self {
            backend,
            session,
            timings,
            current: Mutex::new(None),
            params: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn timings(&self) -> SupervisorTimings {
        self.timings
    }

    /// Spawns the emulator. Any previous handle is terminated and closed
    /// first, under the same lock that installs the new one. The session
    /// flag is left alone; the caller marks the session running.
    pub fn launch(&self, params: &LaunchParameters) -> Result<Arc<ChildProcessHandle>, LauncherError> {
        let mut current = self.current.lock();
        self.spawn_into(&mut current, params)
    }

    fn spawn_into(
        &self,
        current: &mut Option<Arc<ChildProcessHandle>>,
        params: &LaunchParameters,
    ) -> Result<Arc<ChildProcessHandle>, LauncherError> {
        if let Some(previous) = current.take() {
            if let Err(e) = previous.terminate(self.timings.terminate_grace) {
                debug!("[Supervisor] {}", e);
            }
        }

        info!("[Supervisor] Launching {}", params.command_line());
        let process = self.backend.spawn(params).map_err(|e| {
            error!("[Supervisor] {}", e);
            e
        })?;
        let handle = Arc::new(ChildProcessHandle::new(process));
        info!("[Supervisor] Emulator started (pid {})", handle.pid());

        *current = Some(handle.clone());
        *self.params.lock() = Some(params.clone());
        Ok(handle)
    }

    /// Launch for the restart path. Returns `Ok(None)` when the session
    /// stops before or while the new child spawns; a child spawned after
    /// the stop is killed again before the lock is released.
    fn relaunch(&self, params: &LaunchParameters) -> Result<Option<Arc<ChildProcessHandle>>, LauncherError> {
        let mut current = self.current.lock();
        if !self.session.is_running() {
            return Ok(None);
        }
        let handle = self.spawn_into(&mut current, params)?;
        if self.session.is_running() {
            return Ok(Some(handle));
        }
        info!("[Supervisor] Session stopped during relaunch, terminating pid {}", handle.pid());
        current.take();
        if let Err(e) = handle.terminate(self.timings.terminate_grace) {
            debug!("[Supervisor] {}", e);
        }
        Ok(None)
    }

    /// Replaces the parameters the next in-process restart will use.
    pub fn set_launch_parameters(&self, params: LaunchParameters) {
        *self.params.lock() = Some(params);
    }

    pub fn launch_parameters(&self) -> Option<LaunchParameters> {
        self.params.lock().clone()
    }

    pub fn current(&self) -> Option<Arc<ChildProcessHandle>> {
        self.current.lock().clone()
    }

    pub fn current_pid(&self) -> Option<u32> {
        self.current().filter(|c| !c.is_closed()).map(|c| c.pid())
    }

    pub fn poll(&self, timeout: Duration) -> PollStatus {
        match self.current() {
            Some(child) => child.poll(timeout),
            None => PollStatus::Exited,
        }
    }

    /// Best-effort kill + close of the current child. Timeouts are logged.
    pub fn terminate(&self) {
        let child = self.current.lock().take();
        if let Some(child) = child {
            info!("[Supervisor] Terminating pid {}", child.pid());
            if let Err(e) = child.terminate(self.timings.terminate_grace) {
                debug!("[Supervisor] {}", e);
            }
        }
    }

    /// Records the restart intent and kills the child while holding the
    /// intent lock, so the monitor always sees the request when it handles
    /// the resulting exit.
    pub fn request_restart(&self) -> bool {
        let mut intent = self.session.restart_intent();
        let Some(child) = self.current().filter(|c| !c.is_closed()) else {
            warn!("[Supervisor] Restart requested but no child is running");
            return false;
        };
        *intent = true;
        info!("[Supervisor] Restart requested, terminating pid {}", child.pid());
        if let Err(e) = child.terminate(self.timings.terminate_grace) {
            debug!("[Supervisor] {}", e);
        }
        true
    }

    fn close_current(&self) {
        if let Some(child) = self.current.lock().take() {
            child.close();
        }
    }

    /// Polls the child while the session runs. A final exit stops the
    /// session and emits `ChildExited`; an exit with a pending restart
    /// request relaunches, rediscovers the window and emits `ChildRestarted`.
    pub fn monitor_loop<E, D>(&self, mut emit: E, mut rediscover: D)
    where
        E: FnMut(SessionEvent),
        D: FnMut(u32) -> Option<WindowId>,
    {
        info!("[Supervisor] Monitor started");
        while self.session.is_running() {
            let Some(child) = self.current() else {
                info!("[Supervisor] No child handle, monitor exiting");
                break;
            };
            if child.poll(self.timings.poll_interval) == PollStatus::Running {
                continue;
            }
            let pid = child.pid();
            let code = child.exit_code();
            drop(child);

            if !self.session.is_running() {
                debug!("[Supervisor] pid {} gone during shutdown", pid);
                break;
            }

            if self.session.take_restart_request() {
                info!("[Supervisor] pid {} exited, restarting", pid);
                self.close_current();
                thread::sleep(self.timings.settle_delay);
                if !self.session.is_running() {
                    break;
                }
                let relaunched = match self.launch_parameters() {
                    Some(params) => self.relaunch(&params),
                    None => Err(LauncherError::Config("no launch parameters recorded".into())),
                };
                match relaunched {
                    Ok(Some(handle)) => {
                        let window = rediscover(handle.pid());
                        emit(SessionEvent::ChildRestarted { pid: handle.pid(), window });
                    }
                    Ok(None) => {
                        debug!("[Supervisor] Restart abandoned, session stopped");
                        break;
                    }
                    Err(e) => {
                        error!("[Supervisor] Relaunch failed: {}", e);
                        self.session.stop();
                        emit(SessionEvent::RestartFailed(e.to_string()));
                        break;
                    }
                }
            } else {
                info!("[Supervisor] pid {} exited (code {:?}), session over", pid, code);
                self.session.stop();
                emit(SessionEvent::ChildExited { code });
                break;
            }
        }
        info!("[Supervisor] Monitor exiting");
    }

    /// Runs `monitor_loop` on a dedicated thread. Events go through `events`
    /// and `notifier` wakes the UI thread to handle them.
    pub fn spawn_monitor<D>(
        self: &Arc<Self>,
        events: Sender<SessionEvent>,
        notifier: Arc<dyn HostNotifier>,
        rediscover: D,
    ) -> std::io::Result<JoinHandle<()>>
    where
        D: FnMut(u32) -> Option<WindowId> + Send + 'static,
    {
        let supervisor = Arc::clone(self);
        thread::Builder::new()
            .name("child-monitor".into())
            .spawn(move || {
                supervisor.monitor_loop(
                    |event| {
                        if events.send(event).is_err() {
                            warn!("[Supervisor] UI thread no longer listening");
                        }
                        notifier.wake();
                    },
                    rediscover,
                );
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct FakeChild {
        pid: u32,
        exited: Arc<AtomicBool>,
        kill_is_noop: bool,
    }

    impl ChildProcess for FakeChild {
        fn id(&self) -> u32 {
            self.pid
        }
        fn wait_timeout(&self, timeout: Duration) -> io::Result<bool> {
            if !self.exited.load(Ordering::SeqCst) {
                thread::sleep(timeout.min(Duration::from_millis(5)));
            }
            Ok(self.exited.load(Ordering::SeqCst))
        }
        fn kill(&self) -> io::Result<()> {
            if !self.kill_is_noop {
                self.exited.store(true, Ordering::SeqCst);
            }
            Ok(())
        }
        fn exit_code(&self) -> Option<u32> {
            self.exited.load(Ordering::SeqCst).then_some(0)
        }
    }

    struct FakeBackend {
        next_pid: AtomicU32,
        last_exit_flag: Mutex<Option<Arc<AtomicBool>>>,
    }

    impl ProcessBackend for FakeBackend {
        fn spawn(&self, _params: &LaunchParameters) -> Result<Box<dyn ChildProcess>, LauncherError> {
            let exited = Arc::new(AtomicBool::new(false));
            *self.last_exit_flag.lock() = Some(exited.clone());
            Ok(Box::new(FakeChild {
                pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
                exited,
                kill_is_noop: false,
            }))
        }
    }

    fn fast_timings() -> SupervisorTimings {
        SupervisorTimings {
            poll_interval: Duration::from_millis(5),
            settle_delay: Duration::from_millis(1),
            terminate_grace: Duration::from_millis(20),
        }
    }

    fn params() -> LaunchParameters {
        LaunchParameters::new("g.iso", "emu.exe", vec![])
    }

    #[test]
    fn terminate_twice_is_harmless() {
        let exited = Arc::new(AtomicBool::new(false));
        let handle = ChildProcessHandle::new(Box::new(FakeChild {
            pid: 7,
            exited: exited.clone(),
            kill_is_noop: false,
        }));
        assert!(handle.terminate(Duration::from_millis(10)).is_ok());
        assert!(handle.is_closed());
        assert!(handle.terminate(Duration::from_millis(10)).is_ok());
        assert!(handle.is_closed());
        assert_eq!(handle.poll(Duration::ZERO), PollStatus::Exited);
    }

    #[test]
    fn terminate_reports_timeout_but_still_closes() {
        let handle = ChildProcessHandle::new(Box::new(FakeChild {
            pid: 9,
            exited: Arc::new(AtomicBool::new(false)),
            kill_is_noop: true,
        }));
        let result = handle.terminate(Duration::from_millis(10));
        assert!(matches!(result, Err(LauncherError::TerminationTimeout { pid: 9, .. })));
        assert!(handle.is_closed());
    }

    #[test]
    fn natural_exit_ends_the_session() {
        let backend = Arc::new(FakeBackend {
            next_pid: AtomicU32::new(100),
            last_exit_flag: Mutex::new(None),
        });
        let session = Arc::new(Session::new());
        let supervisor =
            ProcessSupervisor::with_timings(backend.clone(), session.clone(), fast_timings());
        session.set_running(true);
        supervisor.launch(&params()).unwrap();

        backend.last_exit_flag.lock().as_ref().unwrap().store(true, Ordering::SeqCst);
        let mut events = Vec::new();
        supervisor.monitor_loop(|e| events.push(e), |_| None);

        assert_eq!(events, vec![SessionEvent::ChildExited { code: Some(0) }]);
        assert!(!session.is_running());
    }

    #[test]
    fn monitor_does_nothing_once_stopped() {
        let backend = Arc::new(FakeBackend {
            next_pid: AtomicU32::new(1),
            last_exit_flag: Mutex::new(None),
        });
        let session = Arc::new(Session::new());
        let supervisor = ProcessSupervisor::with_timings(backend, session.clone(), fast_timings());
        supervisor.launch(&params()).unwrap();
        session.stop();

        let mut events = Vec::new();
        supervisor.monitor_loop(|e| events.push(e), |_| None);
        assert!(events.is_empty());
        assert!(!supervisor.current().unwrap().is_closed());
    }

    #[test]
    fn launch_leaves_the_session_flag_to_the_caller() {
        let backend = Arc::new(FakeBackend {
            next_pid: AtomicU32::new(1),
            last_exit_flag: Mutex::new(None),
        });
        let session = Arc::new(Session::new());
        let supervisor = ProcessSupervisor::with_timings(backend, session.clone(), fast_timings());
        supervisor.launch(&params()).unwrap();
        assert!(!session.is_running());

        session.stop();
        supervisor.launch(&params()).unwrap();
        assert!(!session.is_running());
    }

    #[test]
    fn stuck_child_is_still_released_by_terminate() {
        struct StuckBackend;
        impl ProcessBackend for StuckBackend {
            fn spawn(&self, _params: &LaunchParameters) -> Result<Box<dyn ChildProcess>, LauncherError> {
                Ok(Box::new(FakeChild {
                    pid: 11,
                    exited: Arc::new(AtomicBool::new(false)),
                    kill_is_noop: true,
                }))
            }
        }
        let supervisor = ProcessSupervisor::with_timings(
            Arc::new(StuckBackend),
            Arc::new(Session::new()),
            fast_timings(),
        );
        let first = supervisor.launch(&params()).unwrap();
        let second = supervisor.launch(&params()).unwrap();
        assert!(first.is_closed());

        supervisor.terminate();
        assert!(second.is_closed());
        assert!(supervisor.current().is_none());
    }

    #[test]
    fn restart_without_child_is_rejected() {
        let backend = Arc::new(FakeBackend {
            next_pid: AtomicU32::new(1),
            last_exit_flag: Mutex::new(None),
        });
        let supervisor =
            ProcessSupervisor::with_timings(backend, Arc::new(Session::new()), fast_timings());
        assert!(!supervisor.request_restart());
        assert!(!supervisor.session().take_restart_request());
    }
}
