#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use uya_launcher::config::ConfigStore;
use uya_launcher::embedder::DiscoveryConfig;
use uya_launcher::error::LauncherError;
use uya_launcher::host::{HostController, HostServices};
use uya_launcher::http::HttpFetch;
use uya_launcher::launch::LaunchParameters;
use uya_launcher::platform::{
    ChildProcess, Hotkey, HotkeyBackend, HostNotifier, ProcessBackend, Rect, SelfLauncher,
    SettingsDialog, SettingsOutcome, Size, UserPrompt, WindowId, WindowInfo, WindowSystem,
};
use uya_launcher::session::Session;
use uya_launcher::supervisor::{ProcessSupervisor, SupervisorTimings};

pub const HOST: WindowId = WindowId(1);
pub const FRAME: Size = Size::new(16, 39);
pub const SCREEN: Size = Size::new(1920, 1080);

// ---------- processes ----------

pub struct FakeChild {
    pid: u32,
    exited: Arc<AtomicBool>,
    log: Arc<Mutex<Vec<String>>>,
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
        self.log.lock().push(format!("kill {}", self.pid));
        self.exited.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn exit_code(&self) -> Option<u32> {
        self.exited.load(Ordering::SeqCst).then_some(0)
    }
}

impl Drop for FakeChild {
    fn drop(&mut self) {
        self.log.lock().push(format!("close {}", self.pid));
    }
}

type SpawnHook = Box<dyn Fn(u32) + Send + Sync>;

pub struct FakeProcesses {
    pids: Mutex<Vec<u32>>,
    pub log: Arc<Mutex<Vec<String>>>,
    pub spawned: Mutex<Vec<LaunchParameters>>,
    exit_flags: Mutex<HashMap<u32, Arc<AtomicBool>>>,
    on_spawn: Mutex<Option<SpawnHook>>,
    fail: AtomicBool,
}

impl FakeProcesses {
    pub fn new(pids: &[u32]) -> Arc<Self> {
        Arc::new(Self {
            pids: Mutex::new(pids.iter().rev().copied().collect()),
            log: Arc::new(Mutex::new(Vec::new())),
            spawned: Mutex::new(Vec::new()),
            exit_flags: Mutex::new(HashMap::new()),
            on_spawn: Mutex::new(None),
            fail: AtomicBool::new(false),
        })
    }

    pub fn on_spawn(&self, hook: impl Fn(u32) + Send + Sync + 'static) {
        *self.on_spawn.lock() = Some(Box::new(hook));
    }

    pub fn fail_spawns(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Makes the child exit on its own.
    pub fn exit(&self, pid: u32) {
        if let Some(flag) = self.exit_flags.lock().get(&pid) {
            flag.store(true, Ordering::SeqCst);
        }
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl ProcessBackend for FakeProcesses {
    fn spawn(&self, params: &LaunchParameters) -> Result<Box<dyn ChildProcess>, LauncherError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(LauncherError::SpawnFailed {
                exe: params.exe_path.display().to_string(),
                code: Some(2),
            });
        }
        let pid = self.pids.lock().pop().expect("test ran out of pids");
        let exited = Arc::new(AtomicBool::new(false));
        self.exit_flags.lock().insert(pid, exited.clone());
        self.spawned.lock().push(params.clone());
        self.log.lock().push(format!("open {}", pid));
        if let Some(hook) = self.on_spawn.lock().as_ref() {
            hook(pid);
        }
        Ok(Box::new(FakeChild { pid, exited, log: self.log.clone() }))
    }
}

// ---------- windows ----------

#[derive(Debug, Clone)]
pub struct FakeWindow {
    pub info: WindowInfo,
    pub style: u32,
    pub parent: Option<WindowId>,
    pub bounds: Rect,
    pub client: Size,
    /// Enumeration pass from which the window is listed.
    pub appears_on: usize,
}

#[derive(Default)]
pub struct FakeWindows {
    windows: Mutex<Vec<FakeWindow>>,
    pub enumerations: AtomicUsize,
    pub posted_keys: Mutex<Vec<(WindowId, u32)>>,
}

impl FakeWindows {
    pub fn new() -> Arc<Self> {
        let fake = Self::default();
        fake.windows.lock().push(FakeWindow {
            info: WindowInfo {
                id: HOST,
                owner_pid: std::process::id(),
                title: "UYA Launcher".into(),
                class_name: "UYALauncherClass".into(),
                visible: false,
            },
            style: 0x00CF_0000,
            parent: None,
            bounds: Rect::new(0, 0, 960 + FRAME.width, 720 + FRAME.height),
            client: Size::new(960, 720),
            appears_on: 0,
        });
        Arc::new(fake)
    }

    /// Adds an emulator window that shows up on enumeration pass `appears_on`
    /// (1-based, counted from now).
    pub fn add_child_window(&self, id: isize, pid: u32, title: &str, class: &str, client: Size, appears_in: usize) {
        let appears_on = self.enumerations.load(Ordering::SeqCst) + appears_in;
        self.windows.lock().push(FakeWindow {
            info: WindowInfo {
                id: WindowId(id),
                owner_pid: pid,
                title: title.into(),
                class_name: class.into(),
                visible: true,
            },
            style: 0x14CF_0000,
            parent: None,
            bounds: Rect::new(100, 100, client.width + FRAME.width, client.height + FRAME.height),
            client,
            appears_on,
        });
    }

    pub fn get(&self, id: WindowId) -> Option<FakeWindow> {
        self.windows.lock().iter().find(|w| w.info.id == id).cloned()
    }

    fn with<R>(&self, id: WindowId, f: impl FnOnce(&mut FakeWindow) -> R) -> Option<R> {
        self.windows.lock().iter_mut().find(|w| w.info.id == id).map(f)
    }
}

impl WindowSystem for FakeWindows {
    fn top_level_windows(&self) -> Vec<WindowInfo> {
        let pass = self.enumerations.fetch_add(1, Ordering::SeqCst) + 1;
        self.windows
            .lock()
            .iter()
            .filter(|w| w.parent.is_none() && w.appears_on <= pass)
            .map(|w| w.info.clone())
            .collect()
    }

    fn is_window(&self, window: WindowId) -> bool {
        self.get(window).is_some()
    }

    fn title(&self, window: WindowId) -> String {
        self.get(window).map(|w| w.info.title).unwrap_or_default()
    }

    fn class_name(&self, window: WindowId) -> String {
        self.get(window).map(|w| w.info.class_name).unwrap_or_default()
    }

    fn style(&self, window: WindowId) -> u32 {
        self.get(window).map(|w| w.style).unwrap_or(0)
    }

    fn set_style(&self, window: WindowId, style: u32) {
        self.with(window, |w| w.style = style);
    }

    fn set_parent(&self, child: WindowId, parent: WindowId) -> bool {
        self.with(child, |w| w.parent = Some(parent)).is_some()
    }

    fn client_size(&self, window: WindowId) -> Size {
        self.get(window).map(|w| w.client).unwrap_or_default()
    }

    fn frame_size(&self, window: WindowId) -> Size {
        if window == HOST { FRAME } else { Size::default() }
    }

    fn screen_size(&self) -> Size {
        SCREEN
    }

    fn set_bounds(&self, window: WindowId, bounds: Rect) {
        self.with(window, |w| {
            w.bounds = bounds;
            w.client = if window == HOST {
                Size::new(bounds.width - FRAME.width, bounds.height - FRAME.height)
            } else {
                bounds.size()
            };
        });
    }

    fn set_visible(&self, window: WindowId, visible: bool) {
        self.with(window, |w| w.info.visible = visible);
    }

    fn post_key(&self, window: WindowId, virtual_key: u32) {
        self.posted_keys.lock().push((window, virtual_key));
    }
}

// ---------- UI collaborators ----------

#[derive(Default)]
pub struct FakeHotkeys {
    pub registered: Mutex<Vec<i32>>,
    pub unregistered: Mutex<Vec<i32>>,
}

impl HotkeyBackend for FakeHotkeys {
    fn register(&self, hotkey: &Hotkey) -> Result<(), LauncherError> {
        self.registered.lock().push(hotkey.id);
        Ok(())
    }

    fn unregister(&self, id: i32) {
        self.unregistered.lock().push(id);
    }
}

#[derive(Default)]
pub struct FakePrompt {
    pub errors: Mutex<Vec<String>>,
    pub warnings: Mutex<Vec<String>>,
    pub confirm_answer: AtomicBool,
}

impl UserPrompt for FakePrompt {
    fn error(&self, _parent: Option<WindowId>, title: &str, _text: &str) {
        self.errors.lock().push(title.to_string());
    }

    fn warning(&self, _parent: Option<WindowId>, title: &str, _text: &str) {
        self.warnings.lock().push(title.to_string());
    }

    fn confirm(&self, _parent: Option<WindowId>, _title: &str, _text: &str) -> bool {
        self.confirm_answer.load(Ordering::SeqCst)
    }
}

pub struct FakeSettings(pub SettingsOutcome);

impl SettingsDialog for FakeSettings {
    fn show(&self, _parent: Option<WindowId>) -> SettingsOutcome {
        self.0
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    pub wakes: AtomicUsize,
    pub close_requests: AtomicUsize,
}

impl HostNotifier for FakeNotifier {
    fn wake(&self) {
        self.wakes.fetch_add(1, Ordering::SeqCst);
    }

    fn request_close(&self) {
        self.close_requests.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeRelauncher {
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl SelfLauncher for FakeRelauncher {
    fn spawn_self(&self, args: &[String]) -> io::Result<()> {
        self.calls.lock().push(args.to_vec());
        Ok(())
    }
}

pub struct NoNetwork;

impl HttpFetch for NoNetwork {
    fn get_bytes(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("no network in tests ({})", url)
    }
}

// ---------- wiring ----------

pub fn fast_timings() -> SupervisorTimings {
    SupervisorTimings {
        poll_interval: Duration::from_millis(5),
        settle_delay: Duration::from_millis(5),
        terminate_grace: Duration::from_millis(50),
    }
}

pub fn fast_discovery() -> DiscoveryConfig {
    DiscoveryConfig {
        initial_delay: Duration::from_millis(5),
        interval: Duration::from_millis(5),
        max_attempts: 6,
    }
}

pub fn scenario_params() -> LaunchParameters {
    LaunchParameters::new("C:\\g.iso", "C:\\emu.exe", vec![])
}

pub struct Harness {
    pub processes: Arc<FakeProcesses>,
    pub windows: Arc<FakeWindows>,
    pub hotkeys: Arc<FakeHotkeys>,
    pub prompt: Arc<FakePrompt>,
    pub notifier: Arc<FakeNotifier>,
    pub relauncher: Arc<FakeRelauncher>,
    pub config: Arc<ConfigStore>,
    pub controller: HostController,
    pub _config_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(pids: &[u32], settings: SettingsOutcome, embed_mode: bool) -> Self {
        let processes = FakeProcesses::new(pids);
        let windows = FakeWindows::new();
        let hotkeys = Arc::new(FakeHotkeys::default());
        let prompt = Arc::new(FakePrompt::default());
        let notifier = Arc::new(FakeNotifier::default());
        let relauncher = Arc::new(FakeRelauncher::default());
        let config_dir = tempfile::tempdir().unwrap();
        let config = Arc::new(ConfigStore::open(config_dir.path().join("config.ini")).unwrap());

        let session = Arc::new(Session::new());
        let supervisor = Arc::new(ProcessSupervisor::with_timings(
            processes.clone(),
            session,
            fast_timings(),
        ));
        let services = HostServices {
            windows: windows.clone(),
            hotkeys: hotkeys.clone(),
            prompt: prompt.clone(),
            settings: Box::new(FakeSettings(settings)),
            notifier: notifier.clone(),
            relauncher: relauncher.clone(),
            http: Arc::new(NoNetwork),
            config: config.clone(),
        };
        let controller = HostController::new(services, supervisor, fast_discovery(), embed_mode, false);
        controller.set_host_window(HOST);

        Self {
            processes,
            windows,
            hotkeys,
            prompt,
            notifier,
            relauncher,
            config,
            controller,
            _config_dir: config_dir,
        }
    }

    /// Waits for the monitor thread to wake the host, then handles the
    /// queued events as the message loop would.
    pub fn pump_until_woken(&self, previous_wakes: usize) {
        assert!(
            wait_for(Duration::from_secs(5), || {
                self.notifier.wakes.load(Ordering::SeqCst) > previous_wakes
            }),
            "monitor never woke the host"
        );
        self.controller.drain_events();
    }
}

pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
