//! Seams between the launcher core and the operating system.
//!
//! The supervisor, embedder and host controller only talk to the desktop
//! through these traits. `win32_backend` provides the real implementations;
//! tests drive the same core with in-memory fakes.

use std::io;
use std::time::Duration;

use crate::error::LauncherError;
use crate::launch::LaunchParameters;

/// Opaque top-level window identifier (an `HWND` on Windows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub isize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// Snapshot of one top-level window taken during enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub id: WindowId,
    pub owner_pid: u32,
    pub title: String,
    pub class_name: String,
    pub visible: bool,
}

/// A spawned child process. Dropping it releases every OS handle it holds.
pub trait ChildProcess: Send + Sync {
    fn id(&self) -> u32;

    /// Blocks up to `timeout`; `Ok(true)` once the process has exited.
    fn wait_timeout(&self, timeout: Duration) -> io::Result<bool>;

    /// Forcibly ends the process. Errors when it is already gone are expected.
    fn kill(&self) -> io::Result<()>;

    /// Exit code once the process has exited, `None` while it runs.
    fn exit_code(&self) -> Option<u32>;
}

pub trait ProcessBackend: Send + Sync {
    fn spawn(&self, params: &LaunchParameters) -> Result<Box<dyn ChildProcess>, LauncherError>;
}

/// Window operations used for discovery, embedding and resize propagation.
pub trait WindowSystem: Send + Sync {
    fn top_level_windows(&self) -> Vec<WindowInfo>;
    fn is_window(&self, window: WindowId) -> bool;
    fn title(&self, window: WindowId) -> String;
    fn class_name(&self, window: WindowId) -> String;
    fn style(&self, window: WindowId) -> u32;
    fn set_style(&self, window: WindowId, style: u32);
    fn set_parent(&self, child: WindowId, parent: WindowId) -> bool;
    fn client_size(&self, window: WindowId) -> Size;
    /// Difference between the outer window size and its client area.
    fn frame_size(&self, window: WindowId) -> Size;
    fn screen_size(&self) -> Size;
    fn set_bounds(&self, window: WindowId, bounds: Rect);
    fn set_visible(&self, window: WindowId, visible: bool);
    /// Posts a key press (down + up) to the window's queue.
    fn post_key(&self, window: WindowId, virtual_key: u32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hotkey {
    pub id: i32,
    pub modifiers: HotkeyModifiers,
    pub virtual_key: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HotkeyModifiers {
    pub control: bool,
    pub alt: bool,
}

/// Desktop-session wide hotkeys (not bound to a window).
pub trait HotkeyBackend {
    fn register(&self, hotkey: &Hotkey) -> Result<(), LauncherError>;
    fn unregister(&self, id: i32);
}

/// Modal message boxes.
pub trait UserPrompt: Send + Sync {
    fn error(&self, parent: Option<WindowId>, title: &str, text: &str);
    fn warning(&self, parent: Option<WindowId>, title: &str, text: &str);
    fn confirm(&self, parent: Option<WindowId>, title: &str, text: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsOutcome {
    Cancelled,
    Saved,
    SavedAndRelaunch,
}

pub trait SettingsDialog {
    fn show(&self, parent: Option<WindowId>) -> SettingsOutcome;
}

/// Wakes the UI thread so it drains pending session events. Must be safe to
/// call from the monitor thread.
pub trait HostNotifier: Send + Sync {
    fn wake(&self);
    fn request_close(&self);
}

/// Starts another instance of the launcher's own executable.
pub trait SelfLauncher: Send + Sync {
    fn spawn_self(&self, args: &[String]) -> io::Result<()>;
}
