//! Win32 implementations of the platform traits, plus the optional
//! diagnostics console.

use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{BOOL, HWND, LPARAM, RECT, WPARAM};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    RegisterHotKey, UnregisterHotKey, MOD_ALT, MOD_CONTROL, MOD_NOREPEAT,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetAncestor, GetClassNameW, GetClientRect, GetSystemMetrics, GetWindowLongW,
    GetWindowRect, GetWindowTextW, GetWindowThreadProcessId, IsWindow, IsWindowVisible,
    MessageBoxW, MoveWindow, PostMessageW, SetParent, SetWindowLongW, SetWindowPos, ShowWindow,
    GA_PARENT, GWL_STYLE, IDYES, MB_ICONERROR, MB_ICONQUESTION, MB_ICONWARNING, MB_OK, MB_YESNO,
    MESSAGEBOX_STYLE, SM_CXSCREEN, SM_CYSCREEN, SWP_FRAMECHANGED, SWP_NOMOVE, SWP_NOSIZE,
    SWP_NOZORDER, SW_HIDE, SW_SHOW, WM_CLOSE, WM_KEYDOWN, WM_KEYUP,
};

use crate::constants;
use crate::embedder::style;
use crate::error::LauncherError;
use crate::host::handle_console_close;
use crate::path_utils::{self, FileFilter};
use crate::platform::{
    Hotkey, HotkeyBackend, HostNotifier, Rect, Size, UserPrompt, WindowId, WindowInfo,
    WindowSystem,
};
use crate::settings::FilePicker;
use crate::supervisor::ProcessSupervisor;
use crate::win32_utils::{hwnd, to_wide, window_id, WM_APP_WAKE};

// The style bits the embedder manipulates must match the real ones.
const _: () = {
    use windows::Win32::UI::WindowsAndMessaging as wm;
    assert!(style::CHILD == wm::WS_CHILD.0);
    assert!(style::CAPTION == wm::WS_CAPTION.0);
    assert!(style::THICKFRAME == wm::WS_THICKFRAME.0);
    assert!(style::POPUP == wm::WS_POPUP.0);
};

//---------------------------------------------------------------------------
// Windows
//---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Win32Windows;

fn read_text(len_hint: usize, read: impl FnOnce(&mut [u16]) -> i32) -> String {
    let mut buf = vec![0u16; len_hint];
    let len = read(&mut buf).max(0) as usize;
    String::from_utf16_lossy(&buf[..len.min(buf.len())])
}

unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
    unsafe {
        let out = &mut *(lparam.0 as *mut Vec<WindowId>);
        out.push(window_id(hwnd));
    }
    BOOL(1)
}

impl WindowSystem for Win32Windows {
    fn top_level_windows(&self) -> Vec<WindowInfo> {
        let mut ids: Vec<WindowId> = Vec::new();
        let result = unsafe {
            EnumWindows(Some(collect_window), LPARAM(&mut ids as *mut Vec<WindowId> as isize))
        };
        if let Err(e) = result {
            warn!("[Win32 Backend] EnumWindows failed: {:?}", e);
        }
        ids.into_iter()
            .map(|id| {
                let mut pid = 0u32;
                unsafe { GetWindowThreadProcessId(hwnd(id), Some(&mut pid)) };
                WindowInfo {
                    id,
                    owner_pid: pid,
                    title: self.title(id),
                    class_name: self.class_name(id),
                    visible: unsafe { IsWindowVisible(hwnd(id)).as_bool() },
                }
            })
            .collect()
    }

    fn is_window(&self, window: WindowId) -> bool {
        unsafe { IsWindow(Some(hwnd(window))).as_bool() }
    }

    fn title(&self, window: WindowId) -> String {
        read_text(512, |buf| unsafe { GetWindowTextW(hwnd(window), buf) })
    }

    fn class_name(&self, window: WindowId) -> String {
        read_text(256, |buf| unsafe { GetClassNameW(hwnd(window), buf) })
    }

    fn style(&self, window: WindowId) -> u32 {
        unsafe { GetWindowLongW(hwnd(window), GWL_STYLE) as u32 }
    }

    fn set_style(&self, window: WindowId, style: u32) {
        unsafe {
            SetWindowLongW(hwnd(window), GWL_STYLE, style as i32);
            let _ = SetWindowPos(
                hwnd(window),
                None,
                0,
                0,
                0,
                0,
                SWP_NOMOVE | SWP_NOSIZE | SWP_NOZORDER | SWP_FRAMECHANGED,
            );
        }
    }

    fn set_parent(&self, child: WindowId, parent: WindowId) -> bool {
        unsafe {
            let _ = SetParent(hwnd(child), Some(hwnd(parent)));
            let actual = GetAncestor(hwnd(child), GA_PARENT);
            if actual != hwnd(parent) {
                warn!(
                    "[Win32 Backend] SetParent({:?}) did not take: {}",
                    child,
                    std::io::Error::last_os_error()
                );
                return false;
            }
        }
        true
    }

    fn client_size(&self, window: WindowId) -> Size {
        let mut rc = RECT::default();
        match unsafe { GetClientRect(hwnd(window), &mut rc) } {
            Ok(()) => Size::new(rc.right - rc.left, rc.bottom - rc.top),
            Err(_) => Size::default(),
        }
    }

    fn frame_size(&self, window: WindowId) -> Size {
        let mut outer = RECT::default();
        if unsafe { GetWindowRect(hwnd(window), &mut outer) }.is_err() {
            return Size::default();
        }
        let client = self.client_size(window);
        Size::new(
            (outer.right - outer.left) - client.width,
            (outer.bottom - outer.top) - client.height,
        )
    }

    fn screen_size(&self) -> Size {
        unsafe { Size::new(GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) }
    }

    fn set_bounds(&self, window: WindowId, bounds: Rect) {
        if let Err(e) = unsafe {
            MoveWindow(hwnd(window), bounds.x, bounds.y, bounds.width, bounds.height, true)
        } {
            debug!("[Win32 Backend] MoveWindow {:?}: {:?}", window, e);
        }
    }

    fn set_visible(&self, window: WindowId, visible: bool) {
        unsafe {
            let _ = ShowWindow(hwnd(window), if visible { SW_SHOW } else { SW_HIDE });
        }
    }

    fn post_key(&self, window: WindowId, virtual_key: u32) {
        unsafe {
            let down = PostMessageW(Some(hwnd(window)), WM_KEYDOWN, WPARAM(virtual_key as usize), LPARAM(1));
            let up = PostMessageW(
                Some(hwnd(window)),
                WM_KEYUP,
                WPARAM(virtual_key as usize),
                LPARAM(0xC000_0001u32 as isize),
            );
            if let Err(e) = down.and(up) {
                warn!("[Win32 Backend] Posting key {:#x} failed: {:?}", virtual_key, e);
            }
        }
    }
}

//---------------------------------------------------------------------------
// Hotkeys
//---------------------------------------------------------------------------

/// Thread-level hotkeys; `WM_HOTKEY` lands in the UI thread's queue.
#[derive(Debug, Default)]
pub struct Win32Hotkeys;

impl HotkeyBackend for Win32Hotkeys {
    fn register(&self, hotkey: &Hotkey) -> Result<(), LauncherError> {
        let mut modifiers = MOD_NOREPEAT;
        if hotkey.modifiers.control {
            modifiers |= MOD_CONTROL;
        }
        if hotkey.modifiers.alt {
            modifiers |= MOD_ALT;
        }
        unsafe { RegisterHotKey(None, hotkey.id, modifiers, hotkey.virtual_key) }
            .map_err(|_| LauncherError::HotkeyRegistration { id: hotkey.id })
    }

    fn unregister(&self, id: i32) {
        if let Err(e) = unsafe { UnregisterHotKey(None, id) } {
            debug!("[Win32 Backend] UnregisterHotKey {}: {:?}", id, e);
        }
    }
}

//---------------------------------------------------------------------------
// Prompts, pickers, wake-ups
//---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MessageBoxPrompt;

impl MessageBoxPrompt {
    fn show(&self, parent: Option<WindowId>, title: &str, text: &str, style: MESSAGEBOX_STYLE) -> bool {
        let title = to_wide(title);
        let text = to_wide(text);
        let result = unsafe {
            MessageBoxW(parent.map(hwnd), PCWSTR(text.as_ptr()), PCWSTR(title.as_ptr()), style)
        };
        result == IDYES
    }
}

impl UserPrompt for MessageBoxPrompt {
    fn error(&self, parent: Option<WindowId>, title: &str, text: &str) {
        self.show(parent, title, text, MB_OK | MB_ICONERROR);
    }

    fn warning(&self, parent: Option<WindowId>, title: &str, text: &str) {
        self.show(parent, title, text, MB_OK | MB_ICONWARNING);
    }

    fn confirm(&self, parent: Option<WindowId>, title: &str, text: &str) -> bool {
        self.show(parent, title, text, MB_YESNO | MB_ICONQUESTION)
    }
}

#[derive(Debug, Default)]
pub struct ShellFilePicker;

impl FilePicker for ShellFilePicker {
    fn pick(
        &self,
        parent: Option<WindowId>,
        title: &str,
        filters: &[FileFilter],
        initial: Option<&Path>,
    ) -> Option<PathBuf> {
        path_utils::pick_file(parent.map(hwnd), title, filters, initial)
    }
}

/// Posts to the host window. The window is created after the controller,
/// so it is filled in late; until then wake-ups are dropped.
#[derive(Debug, Default)]
pub struct Win32Notifier {
    host: AtomicIsize,
}

impl Win32Notifier {
    pub fn set_window(&self, host: WindowId) {
        self.host.store(host.0, Ordering::SeqCst);
    }

    fn post(&self, msg: u32) {
        let raw = self.host.load(Ordering::SeqCst);
        if raw == 0 {
            return;
        }
        let target = HWND(raw as *mut c_void);
        if let Err(e) = unsafe { PostMessageW(Some(target), msg, WPARAM(0), LPARAM(0)) } {
            debug!("[Win32 Backend] PostMessageW {:#x}: {:?}", msg, e);
        }
    }
}

impl HostNotifier for Win32Notifier {
    fn wake(&self) {
        self.post(WM_APP_WAKE);
    }

    fn request_close(&self) {
        self.post(WM_CLOSE);
    }
}

//---------------------------------------------------------------------------
// Diagnostics console
//---------------------------------------------------------------------------

const CTRL_C_EVENT: u32 = 0;
const CTRL_BREAK_EVENT: u32 = 1;
const CTRL_CLOSE_EVENT: u32 = 2;
const CTRL_LOGOFF_EVENT: u32 = 5;
const CTRL_SHUTDOWN_EVENT: u32 = 6;

#[link(name = "kernel32")]
unsafe extern "system" {
    fn AllocConsole() -> i32;
    fn SetConsoleTitleW(title: *const u16) -> i32;
    fn SetConsoleCtrlHandler(handler: Option<unsafe extern "system" fn(u32) -> i32>, add: i32) -> i32;
}

struct ConsoleContext {
    supervisor: Arc<ProcessSupervisor>,
    notifier: Arc<Win32Notifier>,
}

static CONSOLE_CONTEXT: OnceCell<ConsoleContext> = OnceCell::new();

unsafe extern "system" fn console_ctrl_handler(ctrl_type: u32) -> i32 {
    match ctrl_type {
        CTRL_C_EVENT | CTRL_BREAK_EVENT | CTRL_CLOSE_EVENT | CTRL_LOGOFF_EVENT
        | CTRL_SHUTDOWN_EVENT => {
            if let Some(ctx) = CONSOLE_CONTEXT.get() {
                handle_console_close(&ctx.supervisor, &*ctx.notifier, constants::TERMINATE_GRACE);
            }
            1
        }
        _ => 0,
    }
}

/// Opens a console window for log output. Call before logging is set up so
/// stderr binds to it.
pub fn alloc_console() -> bool {
    unsafe {
        if AllocConsole() == 0 {
            return false;
        }
        let title = to_wide(constants::CONSOLE_TITLE);
        SetConsoleTitleW(title.as_ptr());
    }
    true
}

/// Makes closing the console shut the launcher down cleanly instead of
/// taking the process down with the emulator still running.
pub fn install_console_handler(supervisor: Arc<ProcessSupervisor>, notifier: Arc<Win32Notifier>) {
    if CONSOLE_CONTEXT.set(ConsoleContext { supervisor, notifier }).is_err() {
        warn!("[Win32 Backend] Console handler already installed");
        return;
    }
    if unsafe { SetConsoleCtrlHandler(Some(console_ctrl_handler), 1) } == 0 {
        error!(
            "[Win32 Backend] SetConsoleCtrlHandler failed: {}",
            std::io::Error::last_os_error()
        );
    } else {
        info!("[Win32 Backend] Console close handler installed");
    }
}
