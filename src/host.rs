//! UI-thread side of a launcher run: the host window's state machine,
//! global hotkeys, resize propagation and shutdown.
//!
//! `HostController` is only touched from the thread that pumps the host
//! window's messages. The monitor thread reaches it through
//! `SessionEvent`s and a `HostNotifier` wake-up.

use std::cell::{Cell, RefCell};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::assets::{AssetUpdater, LogProgress};
use crate::config::{ConfigStore, Configuration};
use crate::constants;
use crate::embedder::{DiscoveryConfig, EmbeddedWindowRef, WindowEmbedder};
use crate::error::LauncherError;
use crate::http::HttpFetch;
use crate::launch::LaunchParameters;
use crate::patches::{PatchFlags, PatchManager};
use crate::platform::{
    Hotkey, HotkeyBackend, HotkeyModifiers, HostNotifier, SelfLauncher, SettingsDialog,
    SettingsOutcome, Size, UserPrompt, WindowId, WindowSystem,
};
use crate::session::{Session, SessionEvent};
use crate::supervisor::ProcessSupervisor;

pub const VK_F1: u32 = 0x70;
pub const VK_F3: u32 = 0x72;
pub const VK_F8: u32 = 0x77;
pub const VK_F11: u32 = 0x7A;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Idle,
    ConfigLoading,
    Launching,
    Embedding,
    Running,
    RestartingChild,
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    UpdateAssets,
    OpenSettings,
    RestartChild,
    /// Post this virtual key to the emulator window.
    ForwardKey(u32),
    Exit,
}

const CTRL: HotkeyModifiers = HotkeyModifiers { control: true, alt: false };
const CTRL_ALT: HotkeyModifiers = HotkeyModifiers { control: true, alt: true };
const NONE: HotkeyModifiers = HotkeyModifiers { control: false, alt: false };

const fn key(id: i32, modifiers: HotkeyModifiers, virtual_key: u32) -> Hotkey {
    Hotkey { id, modifiers, virtual_key }
}

pub const HOTKEYS: &[(Hotkey, HotkeyAction)] = &[
    (key(constants::HOTKEY_UPDATE_ASSETS, NONE, VK_F11), HotkeyAction::UpdateAssets),
    (key(constants::HOTKEY_OPEN_SETTINGS, CTRL, VK_F11), HotkeyAction::OpenSettings),
    (key(constants::HOTKEY_RESTART_CHILD, CTRL_ALT, b'R' as u32), HotkeyAction::RestartChild),
    (key(constants::HOTKEY_SAVE_STATE, CTRL_ALT, b'S' as u32), HotkeyAction::ForwardKey(VK_F1)),
    (key(constants::HOTKEY_LOAD_STATE, CTRL_ALT, b'L' as u32), HotkeyAction::ForwardKey(VK_F3)),
    (key(constants::HOTKEY_SCREENSHOT, CTRL_ALT, b'P' as u32), HotkeyAction::ForwardKey(VK_F8)),
    (key(constants::HOTKEY_EXIT, CTRL_ALT, b'Q' as u32), HotkeyAction::Exit),
];

pub fn action_for(id: i32) -> Option<HotkeyAction> {
    HOTKEYS.iter().find(|(hotkey, _)| hotkey.id == id).map(|(_, action)| *action)
}

/// Registered hotkeys; every one is unregistered on drop.
pub struct HotkeyGuard {
    backend: Arc<dyn HotkeyBackend>,
    ids: Vec<i32>,
}

impl HotkeyGuard {
    /// Registers what it can. Failures are logged and skipped.
    pub fn register(backend: Arc<dyn HotkeyBackend>, hotkeys: &[(Hotkey, HotkeyAction)]) -> Self {
        let mut ids = Vec::with_capacity(hotkeys.len());
        for (hotkey, action) in hotkeys {
            match backend.register(hotkey) {
                Ok(()) => {
                    debug!("[Host] Hotkey {} -> {:?}", hotkey.id, action);
                    ids.push(hotkey.id);
                }
                Err(e) => warn!("[Host] {}", e),
            }
        }
        info!("[Host] {} of {} hotkeys registered", ids.len(), hotkeys.len());
        Self { backend, ids }
    }

    pub fn ids(&self) -> &[i32] {
        &self.ids
    }
}

impl Drop for HotkeyGuard {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            self.backend.unregister(id);
        }
        debug!("[Host] Hotkeys unregistered");
    }
}

/// Platform services the controller drives.
pub struct HostServices {
    pub windows: Arc<dyn WindowSystem>,
    pub hotkeys: Arc<dyn HotkeyBackend>,
    pub prompt: Arc<dyn UserPrompt>,
    pub settings: Box<dyn SettingsDialog>,
    pub notifier: Arc<dyn HostNotifier>,
    pub relauncher: Arc<dyn SelfLauncher>,
    pub http: Arc<dyn HttpFetch>,
    pub config: Arc<ConfigStore>,
}

pub struct HostController {
    services: HostServices,
    session: Arc<Session>,
    supervisor: Arc<ProcessSupervisor>,
    discovery: DiscoveryConfig,
    embed_mode: Cell<bool>,
    show_diagnostics: Cell<bool>,

    host: Cell<Option<WindowId>>,
    state: Cell<HostState>,
    client_size: Cell<Size>,
    exit_code: Cell<i32>,
    embedded: RefCell<Option<EmbeddedWindowRef>>,
    hotkeys: RefCell<Option<HotkeyGuard>>,
    monitor: RefCell<Option<JoinHandle<()>>>,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
}

impl HostController {
    pub fn new(
        services: HostServices,
        supervisor: Arc<ProcessSupervisor>,
        discovery: DiscoveryConfig,
        embed_mode: bool,
        show_diagnostics: bool,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            session: supervisor.session().clone(),
            services,
            supervisor,
            discovery,
            embed_mode: Cell::new(embed_mode),
            show_diagnostics: Cell::new(show_diagnostics),
            host: Cell::new(None),
            state: Cell::new(HostState::Idle),
            client_size: Cell::new(Size::default()),
            exit_code: Cell::new(0),
            embedded: RefCell::new(None),
            hotkeys: RefCell::new(None),
            monitor: RefCell::new(None),
            events_tx,
            events_rx,
        }
    }

    pub fn state(&self) -> HostState {
        self.state.get()
    }

    fn set_state(&self, state: HostState) {
        let previous = self.state.replace(state);
        if previous != state {
            debug!("[Host] {:?} -> {:?}", previous, state);
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    pub fn embedded(&self) -> Option<EmbeddedWindowRef> {
        self.embedded.borrow().clone()
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code.get()
    }

    pub fn host_window(&self) -> Option<WindowId> {
        self.host.get()
    }

    pub fn set_host_window(&self, host: WindowId) {
        self.host.set(Some(host));
    }

    pub fn hotkeys_registered(&self) -> bool {
        self.hotkeys.borrow().is_some()
    }

    pub fn embed_mode(&self) -> bool {
        self.embed_mode.get()
    }

    /// Loads the configuration, showing the settings dialog on first run or
    /// when the ISO or emulator is missing. `None` when the user backed out
    /// or the result is still unusable; the launcher should then exit.
    pub fn load_configuration(&self) -> Option<Configuration> {
        self.set_state(HostState::ConfigLoading);
        let store = &self.services.config;
        let mut config = Configuration::load(store);

        if store.is_first_run() || !config.is_complete() {
            info!("[Host] Configuration incomplete, opening settings");
            if self.services.settings.show(None) == SettingsOutcome::Cancelled {
                info!("[Host] Settings cancelled before first launch");
                return None;
            }
            config = Configuration::load(store);
            if !config.is_complete() {
                self.services.prompt.error(
                    None,
                    "Settings",
                    "Both the game ISO and pcsx2.exe must be selected.",
                );
                return None;
            }
        }

        self.embed_mode.set(config.embed_window);
        self.show_diagnostics.set(config.show_console);
        Some(config)
    }

    fn embedder(&self) -> WindowEmbedder<'_> {
        WindowEmbedder::with_config(&*self.services.windows, self.discovery)
    }

    /// Launches the child, embeds its window when in embed mode, starts the
    /// monitor thread and registers hotkeys. Any failure on the way shows an
    /// error and leaves the controller `ShuttingDown` with exit code 1.
    pub fn start(&self, params: &LaunchParameters) -> Result<(), LauncherError> {
        self.set_state(HostState::Launching);
        self.session.set_running(true);
        if let Err(e) = self.bring_up(params) {
            self.services.prompt.error(
                self.host.get(),
                "Launch Failed",
                &format!("{}\n\nCommand line:\n{}", e, params.command_line()),
            );
            self.begin_shutdown(1);
            return Err(e);
        }
        *self.hotkeys.borrow_mut() =
            Some(HotkeyGuard::register(self.services.hotkeys.clone(), HOTKEYS));
        self.set_state(HostState::Running);
        Ok(())
    }

    fn bring_up(&self, params: &LaunchParameters) -> Result<(), LauncherError> {
        let child = self.supervisor.launch(params)?;

        if self.embed_mode.get() {
            if let Some(host) = self.host.get() {
                self.set_state(HostState::Embedding);
                self.services.windows.set_visible(host, false);
                self.embed(host, child.pid(), None);
                self.services.windows.set_visible(host, true);
            }
        }

        let handle = self
            .supervisor
            .spawn_monitor(self.events_tx.clone(), self.services.notifier.clone(), self.rediscovery())
            .map_err(|e| {
                error!("[Host] Could not start the monitor thread: {}", e);
                LauncherError::Io(e)
            })?;
        *self.monitor.borrow_mut() = Some(handle);
        Ok(())
    }

    /// Runs on the monitor thread after a restart: read-only discovery of
    /// the new child's window.
    fn rediscovery(&self) -> impl FnMut(u32) -> Option<WindowId> + Send + 'static {
        let windows = self.services.windows.clone();
        let session = self.session.clone();
        let discovery = self.discovery;
        let embed_mode = self.embed_mode.get();
        move |pid| {
            if !embed_mode {
                return None;
            }
            WindowEmbedder::with_config(&*windows, discovery)
                .discover(pid, &session)
                .map(|found| found.id)
                .map_err(|e| warn!("[Host] {}", e))
                .ok()
        }
    }

    /// Attaches `window` if discovery already happened, otherwise runs the
    /// full discovery. Warns once on failure.
    fn embed(&self, host: WindowId, pid: u32, window: Option<WindowId>) {
        let embedder = self.embedder();
        let prompt = &*self.services.prompt;
        let result = match window {
            Some(window) => embedder.attach(host, window, pid).map_err(|e| {
                prompt.warning(
                    Some(host),
                    "Embedding Failed",
                    "Could not embed the restarted PCSX2 window.",
                );
                e
            }),
            None => embedder.embed_child_window(host, pid, &self.session, prompt, self.show_diagnostics.get()),
        };
        match result {
            Ok(embedded) => {
                *self.embedded.borrow_mut() = Some(embedded);
                let client = self.services.windows.client_size(host);
                self.on_resize(client);
            }
            Err(e) => debug!("[Host] Continuing without embedding: {}", e),
        }
    }

    /// Fills the host's client area with the embedded window.
    pub fn on_resize(&self, client: Size) {
        self.client_size.set(client);
        if client.is_empty() {
            return;
        }
        if let Some(embedded) = self.embedded.borrow().as_ref() {
            self.embedder().fit_child(embedded, client);
        }
    }

    pub fn client_size(&self) -> Size {
        self.client_size.get()
    }

    pub fn drain_events(&self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.on_session_event(event);
        }
    }

    pub fn on_session_event(&self, event: SessionEvent) {
        info!("[Host] Session event {:?}", event);
        match event {
            SessionEvent::ChildExited { .. } => self.begin_shutdown(0),
            SessionEvent::ChildRestarted { pid, window } => {
                if self.state() == HostState::ShuttingDown {
                    return;
                }
                self.set_state(HostState::RestartingChild);
                self.embedded.borrow_mut().take();
                if self.embed_mode.get() {
                    if let Some(host) = self.host.get() {
                        self.set_state(HostState::Embedding);
                        match window {
                            Some(window) => self.embed(host, pid, Some(window)),
                            None => self.services.prompt.warning(
                                Some(host),
                                "Embedding Failed",
                                "Could not find the restarted PCSX2 window.",
                            ),
                        }
                    }
                }
                self.set_state(HostState::Running);
            }
            SessionEvent::RestartFailed(reason) => {
                self.services.prompt.error(self.host.get(), "Restart Failed", &reason);
                self.begin_shutdown(1);
            }
        }
    }

    pub fn on_close_requested(&self) {
        self.begin_shutdown(self.exit_code.get());
    }

    pub fn on_hotkey(&self, id: i32) {
        let Some(action) = action_for(id) else {
            debug!("[Host] Unknown hotkey {}", id);
            return;
        };
        if self.state() == HostState::ShuttingDown {
            return;
        }
        info!("[Host] Hotkey {:?}", action);
        match action {
            HotkeyAction::UpdateAssets => {
                self.update_assets();
            }
            HotkeyAction::OpenSettings => self.open_settings(),
            HotkeyAction::RestartChild => {
                self.set_state(HostState::RestartingChild);
                if !self.supervisor.request_restart() {
                    self.set_state(HostState::Running);
                }
            }
            HotkeyAction::ForwardKey(vk) => self.forward_key(vk),
            HotkeyAction::Exit => self.begin_shutdown(0),
        }
    }

    fn forward_key(&self, vk: u32) {
        let target = self.embedded.borrow().as_ref().map(|e| e.window).or_else(|| {
            let pid = self.supervisor.current_pid()?;
            self.embedder().discover_once(pid).map(|found| found.id)
        });
        match target {
            Some(window) => self.services.windows.post_key(window, vk),
            None => debug!("[Host] No emulator window for key {:#x}", vk),
        }
    }

    /// Runs the map updater for the configured ISO. Blocks the UI thread.
    pub fn update_assets(&self) -> bool {
        let config = Configuration::load(&self.services.config);
        if config.iso_path.as_os_str().is_empty() {
            self.services.prompt.warning(
                self.host.get(),
                "Map Update",
                "Set the game ISO in the settings before updating maps.",
            );
            return false;
        }
        let updater = AssetUpdater::new(&*self.services.http);
        let ok = updater.run(&config.iso_path, config.region, &LogProgress);
        if !ok {
            self.services.prompt.warning(self.host.get(), "Map Update", "Failed to update custom maps.");
        }
        ok
    }

    fn open_settings(&self) {
        match self.services.settings.show(self.host.get()) {
            SettingsOutcome::Cancelled => debug!("[Host] Settings cancelled"),
            SettingsOutcome::Saved => {
                let config = Configuration::load(&self.services.config);
                PatchManager::new(PatchFlags::from_config(&config))
                    .apply(config.region, &config.emulator_path);
                self.supervisor.set_launch_parameters(LaunchParameters::from_config(&config));
                info!("[Host] Settings saved; next restart uses them");
            }
            SettingsOutcome::SavedAndRelaunch => match self.services.relauncher.spawn_self(&[]) {
                Ok(()) => {
                    info!("[Host] Relaunching with new settings");
                    self.begin_shutdown(0);
                }
                Err(e) => {
                    error!("[Host] Relaunch failed: {}", e);
                    self.services.prompt.error(
                        self.host.get(),
                        "Relaunch Failed",
                        &format!("Could not restart the launcher: {}", e),
                    );
                }
            },
        }
    }

    /// Enters `ShuttingDown` once: stops the session, unregisters hotkeys,
    /// terminates the child and asks the host window to close.
    pub fn begin_shutdown(&self, code: i32) {
        if self.state() == HostState::ShuttingDown {
            return;
        }
        self.set_state(HostState::ShuttingDown);
        self.exit_code.set(code);
        info!("[Host] Shutting down (exit code {})", code);

        self.session.stop();
        self.hotkeys.borrow_mut().take();
        self.embedded.borrow_mut().take();
        self.supervisor.terminate();
        if self.host.get().is_some() {
            self.services.notifier.request_close();
        }
    }

    /// Final teardown after the message loop ended. Joins the monitor and
    /// signals anyone waiting in `Session::wait_finished`.
    pub fn finish(&self) -> i32 {
        self.begin_shutdown(self.exit_code.get());
        if let Some(monitor) = self.monitor.borrow_mut().take() {
            if monitor.join().is_err() {
                error!("[Host] Monitor thread panicked");
            }
        }
        self.drain_events();
        self.supervisor.terminate();
        self.session.mark_finished();
        info!("[Host] Finished");
        self.exit_code.get()
    }
}

/// Console close handling, run off the UI thread: stop the session, kill
/// the child, ask the host to close and wait for the UI thread to unwind.
/// The session stops first so a restart in flight cannot bring a new child up.
pub fn handle_console_close(
    supervisor: &ProcessSupervisor,
    notifier: &dyn HostNotifier,
    grace: Duration,
) -> bool {
    info!("[Host] Console close signal");
    supervisor.session().stop();
    supervisor.terminate();
    notifier.request_close();
    supervisor.session().wait_finished(grace)
}
