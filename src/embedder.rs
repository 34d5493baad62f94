//! Finds the emulator's top-level window and fuses it into the host window.
//!
//! Discovery runs an ordered list of strategies against a snapshot of the
//! desktop's top-level windows; the first strategy that yields a window
//! wins. Attaching strips the frame, reparents the window and sizes the
//! host around it.

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::constants;
use crate::error::LauncherError;
use crate::platform::{Rect, Size, UserPrompt, WindowId, WindowInfo, WindowSystem};
use crate::session::Session;

/// Raw `WS_*` bits the embedder touches.
pub mod style {
    pub const CAPTION: u32 = 0x00C0_0000;
    pub const THICKFRAME: u32 = 0x0004_0000;
    pub const MINIMIZEBOX: u32 = 0x0002_0000;
    pub const MAXIMIZEBOX: u32 = 0x0001_0000;
    pub const SYSMENU: u32 = 0x0008_0000;
    pub const MINIMIZE: u32 = 0x2000_0000;
    pub const MAXIMIZE: u32 = 0x0100_0000;
    pub const POPUP: u32 = 0x8000_0000;
    pub const CHILD: u32 = 0x4000_0000;

    /// Decorations and top-level state removed before reparenting.
    pub const FRAME: u32 =
        CAPTION | THICKFRAME | MINIMIZEBOX | MAXIMIZEBOX | SYSMENU | MINIMIZE | MAXIMIZE | POPUP;

    pub fn embedded(style: u32) -> u32 {
        (style & !FRAME) | CHILD
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryStrategy {
    ExactTitle(String),
    KnownClassName(Vec<String>),
    ProcessOwnedFallback,
}

/// Every strategy only considers visible windows owned by the child that
/// are not console or IME helpers.
fn is_candidate(window: &WindowInfo, pid: u32) -> bool {
    window.owner_pid == pid
        && window.visible
        && !constants::IGNORED_WINDOW_CLASSES.contains(&window.class_name.as_str())
}

impl DiscoveryStrategy {
    pub fn default_cascade() -> Vec<DiscoveryStrategy> {
        vec![
            DiscoveryStrategy::ExactTitle(constants::EMULATOR_WINDOW_TITLE.to_string()),
            DiscoveryStrategy::KnownClassName(
                constants::EMULATOR_WINDOW_CLASSES.iter().map(|c| c.to_string()).collect(),
            ),
            DiscoveryStrategy::ProcessOwnedFallback,
        ]
    }

    pub fn find<'w>(&self, windows: &'w [WindowInfo], pid: u32) -> Option<&'w WindowInfo> {
        let mut candidates = windows.iter().filter(move |w| is_candidate(w, pid));
        match self {
            DiscoveryStrategy::ExactTitle(title) => candidates.find(|w| &w.title == title),
            DiscoveryStrategy::KnownClassName(classes) => {
                let candidates: Vec<&WindowInfo> = candidates.collect();
                classes
                    .iter()
                    .find_map(|class| candidates.iter().copied().find(|w| &w.class_name == class))
            }
            DiscoveryStrategy::ProcessOwnedFallback => candidates.next(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiscoveryConfig {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            initial_delay: constants::DISCOVERY_INITIAL_DELAY,
            interval: constants::DISCOVERY_INTERVAL,
            max_attempts: constants::DISCOVERY_MAX_ATTEMPTS,
        }
    }
}

impl DiscoveryConfig {
    /// Longest time a full discovery can take.
    pub fn ceiling(&self) -> Duration {
        self.initial_delay + self.interval * self.max_attempts
    }
}

/// Non-owning reference to an embedded window. Only valid for the child
/// process it was discovered for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedWindowRef {
    pub window: WindowId,
    pub child_pid: u32,
    pub title: String,
    pub class_name: String,
}

/// Sleeps in short slices so a stopped session cuts the wait short.
/// Returns whether the session is still running.
fn sleep_while_running(session: &Session, total: Duration) -> bool {
    const SLICE: Duration = Duration::from_millis(50);
    let deadline = Instant::now() + total;
    loop {
        if !session.is_running() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep(SLICE.min(deadline - now));
    }
}

pub struct WindowEmbedder<'a> {
    windows: &'a dyn WindowSystem,
    config: DiscoveryConfig,
    strategies: Vec<DiscoveryStrategy>,
}

impl<'a> WindowEmbedder<'a> {
    pub fn new(windows: &'a dyn WindowSystem) -> Self {
        Self::with_config(windows, DiscoveryConfig::default())
    }

    pub fn with_config(windows: &'a dyn WindowSystem, config: DiscoveryConfig) -> Self {
        Self {
            windows,
            config,
            strategies: DiscoveryStrategy::default_cascade(),
        }
    }

    pub fn with_strategies(mut self, strategies: Vec<DiscoveryStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn config(&self) -> DiscoveryConfig {
        self.config
    }

    /// One pass over the current top-level windows.
    pub fn discover_once(&self, pid: u32) -> Option<WindowInfo> {
        let snapshot = self.windows.top_level_windows();
        self.strategies.iter().find_map(|strategy| {
            let found = strategy.find(&snapshot, pid)?;
            debug!("[Embedder] {:?} matched {:?}", strategy, found.id);
            Some(found.clone())
        })
    }

    /// Waits the initial delay, then retries `discover_once` up to the
    /// attempt cap. Gives up early when the session stops.
    pub fn discover(&self, pid: u32, session: &Session) -> Result<WindowInfo, LauncherError> {
        info!("[Embedder] Waiting for a window of pid {}", pid);
        let not_found = LauncherError::WindowNotFound { pid, attempts: 0 };
        if !sleep_while_running(session, self.config.initial_delay) {
            return Err(not_found);
        }

        for attempt in 1..=self.config.max_attempts {
            if let Some(found) = self.discover_once(pid) {
                info!(
                    "[Embedder] Found window {:?} (\"{}\", {}) on attempt {}",
                    found.id, found.title, found.class_name, attempt
                );
                return Ok(found);
            }
            debug!("[Embedder] Attempt {}/{} found nothing", attempt, self.config.max_attempts);
            if attempt < self.config.max_attempts && !sleep_while_running(session, self.config.interval) {
                return Err(LauncherError::WindowNotFound { pid, attempts: attempt });
            }
        }
        Err(LauncherError::WindowNotFound { pid, attempts: self.config.max_attempts })
    }

    /// Strips the window's frame, reparents it under `host`, sizes and
    /// centres the host around the child's natural client size and shows
    /// the child. The host's own visibility is left to the caller.
    pub fn attach(&self, host: WindowId, window: WindowId, child_pid: u32) -> Result<EmbeddedWindowRef, LauncherError> {
        if !self.windows.is_window(window) {
            return Err(LauncherError::WindowNotFound { pid: child_pid, attempts: 0 });
        }
        let title = self.windows.title(window);
        let class_name = self.windows.class_name(window);

        let mut natural = self.windows.client_size(window);
        if natural.is_empty() {
            natural = Size::new(constants::DEFAULT_WINDOW_WIDTH, constants::DEFAULT_WINDOW_HEIGHT);
        }

        let old_style = self.windows.style(window);
        self.windows.set_style(window, style::embedded(old_style));
        if !self.windows.set_parent(window, host) {
            warn!("[Embedder] Reparenting {:?} failed", window);
            self.windows.set_style(window, old_style);
            return Err(LauncherError::WindowNotFound { pid: child_pid, attempts: 0 });
        }

        let frame = self.windows.frame_size(host);
        let outer = Size::new(natural.width + frame.width, natural.height + frame.height);
        let screen = self.windows.screen_size();
        let x = ((screen.width - outer.width) / 2).max(0);
        let y = ((screen.height - outer.height) / 2).max(0);
        self.windows.set_bounds(host, Rect::new(x, y, outer.width, outer.height));
        self.windows.set_bounds(window, Rect::new(0, 0, natural.width, natural.height));
        self.windows.set_visible(window, true);

        info!(
            "[Embedder] Embedded {:?} (\"{}\", {}) at {}x{}",
            window, title, class_name, natural.width, natural.height
        );
        Ok(EmbeddedWindowRef { window, child_pid, title, class_name })
    }

    /// Full handshake: discover, then attach. Failure shows a single
    /// warning and leaves the child running in its own window.
    pub fn embed_child_window(
        &self,
        host: WindowId,
        child_pid: u32,
        session: &Session,
        prompt: &dyn UserPrompt,
        show_diagnostics: bool,
    ) -> Result<EmbeddedWindowRef, LauncherError> {
        let result = self
            .discover(child_pid, session)
            .and_then(|found| self.attach(host, found.id, child_pid));
        if let Err(e) = &result {
            warn!("[Embedder] {}", e);
            if show_diagnostics {
                self.log_candidates(child_pid);
            }
            if session.is_running() {
                prompt.warning(
                    Some(host),
                    "Embedding Failed",
                    "Could not find the PCSX2 window to embed.\n\
                     PCSX2 keeps running in its own window.",
                );
            }
        }
        result
    }

    /// Resizes the embedded window to fill `client` from the top-left.
    pub fn fit_child(&self, embedded: &EmbeddedWindowRef, client: Size) {
        if !self.windows.is_window(embedded.window) {
            debug!("[Embedder] {:?} is gone, skipping resize", embedded.window);
            return;
        }
        self.windows
            .set_bounds(embedded.window, Rect::new(0, 0, client.width, client.height));
    }

    fn log_candidates(&self, pid: u32) {
        for window in self.windows.top_level_windows().iter().filter(|w| w.owner_pid == pid) {
            info!(
                "[Embedder] pid {} owns {:?} \"{}\" class={} visible={}",
                pid, window.id, window.title, window.class_name, window.visible
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: isize, pid: u32, title: &str, class: &str, visible: bool) -> WindowInfo {
        WindowInfo {
            id: WindowId(id),
            owner_pid: pid,
            title: title.into(),
            class_name: class.into(),
            visible,
        }
    }

    #[test]
    fn style_strip_keeps_unrelated_bits() {
        let visible = 0x1000_0000;
        let before = style::CAPTION | style::THICKFRAME | style::SYSMENU | style::MAXIMIZE | visible;
        assert_eq!(style::embedded(before), style::CHILD | visible);
    }

    #[test]
    fn strategies_respect_priority_and_owner() {
        let windows = vec![
            info(1, 99, "PCSX2", "Qt6QWindowIcon", true),
            info(2, 7, "Console", "ConsoleWindowClass", true),
            info(3, 7, "hidden", "Qt6QWindowIcon", false),
            info(4, 7, "Emu", "Other", true),
            info(5, 7, "Main", "Qt6QWindowIcon", true),
        ];
        let title = DiscoveryStrategy::ExactTitle("PCSX2".into());
        assert!(title.find(&windows, 7).is_none());

        let classes = DiscoveryStrategy::KnownClassName(vec!["Qt5QWindowIcon".into(), "Qt6QWindowIcon".into()]);
        assert_eq!(classes.find(&windows, 7).unwrap().id, WindowId(5));

        assert_eq!(DiscoveryStrategy::ProcessOwnedFallback.find(&windows, 7).unwrap().id, WindowId(4));
    }

    #[test]
    fn ceiling_covers_every_attempt() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.ceiling(), Duration::from_millis(3000 + 500 * 30));
    }

    #[test]
    fn stopped_session_cuts_sleep_short() {
        let session = Session::new();
        let start = Instant::now();
        assert!(!sleep_while_running(&session, Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
