//! Win32 helpers for the host window: class registration, creation,
//! the window procedure and the message loop.
//!
//! ## Handled Messages
//!
//! - **WM_NCCREATE**: Capture and store our `AppState` pointer.
//! - **WM_SIZE**: Fit the embedded emulator window to the new client area.
//! - **WM_ACTIVATE** / **WM_SETFOCUS**: Forward keyboard focus to the embedded window.
//! - **WM_APP_WAKE**: Drain session events posted by the monitor thread.
//! - **WM_CLOSE**: Begin shutdown, then `DestroyWindow`.
//! - **WM_DESTROY**: Drop `AppState` and post `WM_QUIT`.
//! - **WM_DPICHANGED**: Move to the suggested DPI-aware bounds.
//!
//! Global hotkeys are registered without a window, so `WM_HOTKEY` arrives as
//! a thread message and is handled in `run_message_loop`.

use std::ffi::{c_void, OsStr};
use std::os::windows::ffi::OsStrExt;

use log::{debug, error, info, warn};
use once_cell::sync::OnceCell;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, RECT, WPARAM};
use windows::Win32::Graphics::Gdi::{GetStockObject, BLACK_BRUSH, HBRUSH};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetClientRect,
    GetMessageW, GetSystemMetrics, GetWindowLongPtrW, LoadCursorW, PostQuitMessage,
    RegisterClassW, SetWindowLongPtrW, SetWindowPos, TranslateMessage, CREATESTRUCTW,
    CS_HREDRAW, CS_VREDRAW, GWLP_USERDATA, HICON, HWND_MESSAGE, IDC_ARROW, MSG, SM_CXSCREEN,
    SM_CYSCREEN, SWP_NOACTIVATE, SWP_NOZORDER, WINDOW_EX_STYLE, WINDOW_STYLE, WM_ACTIVATE,
    WM_APP, WM_CLOSE, WM_DESTROY, WM_DPICHANGED, WM_HOTKEY, WM_NCCREATE, WM_SETFOCUS, WM_SIZE,
    WNDCLASSW, WS_CLIPCHILDREN, WS_OVERLAPPEDWINDOW,
};

use crate::app_state::AppState;
use crate::constants;
use crate::error::LauncherError;
use crate::host::HostController;
use crate::platform::{Size, WindowId};

/// Posted by the monitor thread when session events are waiting.
pub const WM_APP_WAKE: u32 = WM_APP + 1;

#[link(name = "user32")]
unsafe extern "system" {
    /// Forward keyboard focus to a child HWND.
    fn SetFocus(hWnd: HWND) -> HWND;
}

pub fn hwnd(id: WindowId) -> HWND {
    HWND(id.0 as *mut c_void)
}

pub fn window_id(hwnd: HWND) -> WindowId {
    WindowId(hwnd.0 as isize)
}

/// # Safety
/// - Must be registered via `WNDCLASSW::lpfnWndProc`.
/// - Assumes `lpCreateParams` in `WM_NCCREATE` is a `Box<AppState>` raw pointer.
pub unsafe extern "system" fn wnd_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    unsafe {
        let state_ptr = GetWindowLongPtrW(hwnd, GWLP_USERDATA) as *mut AppState;

        match msg {
            WM_NCCREATE => {
                if let Some(cs) = (lparam.0 as *const CREATESTRUCTW).as_ref() {
                    debug!("[WndProc] Storing AppState ptr {:?}", cs.lpCreateParams);
                    SetWindowLongPtrW(hwnd, GWLP_USERDATA, cs.lpCreateParams as isize);
                } else {
                    warn!("[WndProc] CREATESTRUCTW was null");
                }
                DefWindowProcW(hwnd, msg, wparam, lparam)
            }

            WM_SIZE => {
                if let Some(state) = state_ptr.as_ref() {
                    let mut rc = RECT::default();
                    if GetClientRect(hwnd, &mut rc).is_ok() {
                        state.on_size(Size::new(rc.right - rc.left, rc.bottom - rc.top));
                    }
                }
                LRESULT(0)
            }

            WM_ACTIVATE | WM_SETFOCUS => {
                if let Some(target) = state_ptr.as_ref().and_then(AppState::focus_target) {
                    SetFocus(self::hwnd(target));
                }
                DefWindowProcW(hwnd, msg, wparam, lparam)
            }

            WM_APP_WAKE => {
                if let Some(state) = state_ptr.as_ref() {
                    state.on_wake();
                }
                LRESULT(0)
            }

            WM_CLOSE => {
                info!("[WndProc] WM_CLOSE");
                if let Some(state) = state_ptr.as_ref() {
                    state.on_close();
                }
                if let Err(e) = DestroyWindow(hwnd) {
                    error!("[WndProc] DestroyWindow failed: {:?}", e);
                }
                LRESULT(0)
            }

            WM_DESTROY => {
                info!("[WndProc] WM_DESTROY");
                if !state_ptr.is_null() {
                    SetWindowLongPtrW(hwnd, GWLP_USERDATA, 0);
                    drop(Box::from_raw(state_ptr));
                }
                PostQuitMessage(0);
                LRESULT(0)
            }

            WM_DPICHANGED => {
                if let Some(r) = (lparam.0 as *const RECT).as_ref() {
                    let _ = SetWindowPos(
                        hwnd,
                        None,
                        r.left,
                        r.top,
                        r.right - r.left,
                        r.bottom - r.top,
                        SWP_NOZORDER | SWP_NOACTIVATE,
                    );
                }
                LRESULT(0)
            }

            _ => DefWindowProcW(hwnd, msg, wparam, lparam),
        }
    }
}

static CLASS_ATOM: OnceCell<u16> = OnceCell::new();

/// Registers the host window class once per process.
pub fn register_window_class() -> Result<u16, LauncherError> {
    CLASS_ATOM
        .get_or_try_init(|| unsafe {
            let hinst = GetModuleHandleW(None).map_err(|e| LauncherError::Io(e.into()))?;
            let class_name = to_wide(constants::WINDOW_CLASS_NAME);
            let wc = WNDCLASSW {
                hInstance: hinst.into(),
                lpszClassName: PCWSTR(class_name.as_ptr()),
                lpfnWndProc: Some(wnd_proc),
                style: CS_HREDRAW | CS_VREDRAW,
                hCursor: LoadCursorW(None, IDC_ARROW).unwrap_or_default(),
                hbrBackground: HBRUSH(GetStockObject(BLACK_BRUSH).0),
                lpszMenuName: PCWSTR::null(),
                hIcon: HICON::default(),
                cbClsExtra: 0,
                cbWndExtra: 0,
            };
            match RegisterClassW(&wc) {
                0 => {
                    let err = std::io::Error::last_os_error();
                    error!("[Win32 Utils] RegisterClassW failed: {}", err);
                    Err(LauncherError::Io(err))
                }
                atom => {
                    info!("[Win32 Utils] Window class registered");
                    Ok(atom)
                }
            }
        })
        .copied()
}

/// Creates the host window and hands it ownership of `state`.
///
/// In embed mode this is a hidden, centered top-level window of the default
/// size; otherwise a message-only window that just anchors the event loop.
pub fn create_host_window(state: Box<AppState>, embed_mode: bool) -> Result<HWND, LauncherError> {
    register_window_class()?;
    info!("[Win32 Utils] Creating host window (embed: {})", embed_mode);

    let class_name = to_wide(constants::WINDOW_CLASS_NAME);
    let title = to_wide(constants::WINDOW_TITLE);
    let (style, x, y, parent) = if embed_mode {
        let (sw, sh) = unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
        (
            WS_OVERLAPPEDWINDOW | WS_CLIPCHILDREN,
            (sw - constants::DEFAULT_WINDOW_WIDTH) / 2,
            (sh - constants::DEFAULT_WINDOW_HEIGHT) / 2,
            None,
        )
    } else {
        (WINDOW_STYLE::default(), 0, 0, Some(HWND_MESSAGE))
    };

    let state_ptr = Box::into_raw(state);
    let created = unsafe {
        let hinst = GetModuleHandleW(None).map_err(|e| LauncherError::Io(e.into()));
        hinst.and_then(|hinst| {
            CreateWindowExW(
                WINDOW_EX_STYLE::default(),
                PCWSTR(class_name.as_ptr()),
                PCWSTR(title.as_ptr()),
                style,
                x,
                y,
                constants::DEFAULT_WINDOW_WIDTH,
                constants::DEFAULT_WINDOW_HEIGHT,
                parent,
                None,
                Some(hinst.into()),
                Some(state_ptr as *const c_void),
            )
            .map_err(|e| LauncherError::Io(e.into()))
        })
    };

    match created {
        Ok(hwnd) => {
            info!("[Win32 Utils] Host window created: {:?}", hwnd);
            Ok(hwnd)
        }
        Err(e) => {
            error!("[Win32 Utils] CreateWindowExW failed: {}", e);
            unsafe { drop(Box::from_raw(state_ptr)) };
            Err(e)
        }
    }
}

/// Pumps messages until `WM_QUIT`. Thread-level `WM_HOTKEY` messages go to
/// the controller; everything else is dispatched to its window.
pub fn run_message_loop(controller: &HostController) {
    info!("[Win32 Utils] Entering message loop");
    let mut msg = MSG::default();
    unsafe {
        while GetMessageW(&mut msg, None, 0, 0).0 > 0 {
            if msg.message == WM_HOTKEY && msg.hwnd.0.is_null() {
                controller.on_hotkey(msg.wParam.0 as i32);
                continue;
            }
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
    info!("[Win32 Utils] Exited message loop");
}

/// Build a null-terminated UTF-16 string for Win32 APIs.
pub fn to_wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(Some(0)).collect()
}
