use std::time::Duration;

/// Win32 window class name used to register and create the host window.
pub const WINDOW_CLASS_NAME: &str = "UYALauncherClass";

/// Title text for the host window.
pub const WINDOW_TITLE: &str = "UYA Launcher";

/// Default client width (in pixels) for the host window before a child is embedded.
pub const DEFAULT_WINDOW_WIDTH: i32 = 960;

/// Default client height (in pixels) for the host window before a child is embedded.
pub const DEFAULT_WINDOW_HEIGHT: i32 = 720;

/// Title of the diagnostics console when `ShowConsole` is enabled.
pub const CONSOLE_TITLE: &str = "UYA Launcher Console";

/// Version stamped into a fresh config when nothing is recorded yet.
pub const LAUNCHER_VERSION: &str = env!("CARGO_PKG_VERSION");

// --- emulator command line ---

pub const FLAG_FAST_BOOT: &str = "-fastboot";
pub const FLAG_FULLSCREEN: &str = "-fullscreen";

// --- window discovery ---

/// Title the emulator gives its main window.
pub const EMULATOR_WINDOW_TITLE: &str = "PCSX2";

/// Qt top-level window classes, tried in order. The toolkit version the
/// emulator was built with is not known up front.
pub const EMULATOR_WINDOW_CLASSES: &[&str] = &[
    "Qt5QWindowIcon",
    "Qt6QWindowIcon",
    "Qt5152QWindowIcon",
    "Qt6152QWindowIcon",
];

/// Window classes that never count as the emulator's main window.
pub const IGNORED_WINDOW_CLASSES: &[&str] = &["ConsoleWindowClass", "IME", "MSCTFIME UI"];

pub const DISCOVERY_INITIAL_DELAY: Duration = Duration::from_millis(3000);
pub const DISCOVERY_INTERVAL: Duration = Duration::from_millis(500);
pub const DISCOVERY_MAX_ATTEMPTS: u32 = 30;

// --- process supervision ---

pub const MONITOR_POLL_INTERVAL: Duration = Duration::from_millis(1000);
pub const RESTART_SETTLE_DELAY: Duration = Duration::from_millis(500);
pub const TERMINATE_GRACE: Duration = Duration::from_millis(2000);

// --- hotkeys ---

pub const HOTKEY_UPDATE_ASSETS: i32 = 1;
pub const HOTKEY_OPEN_SETTINGS: i32 = 2;
pub const HOTKEY_RESTART_CHILD: i32 = 3;
pub const HOTKEY_SAVE_STATE: i32 = 4;
pub const HOTKEY_LOAD_STATE: i32 = 5;
pub const HOTKEY_SCREENSHOT: i32 = 6;
pub const HOTKEY_EXIT: i32 = 7;

// --- CLI ---

pub const ARG_SELF_UPDATE: &str = "--self-update";
pub const ARG_JUST_UPDATED: &str = "--just-updated";

// --- remote endpoints ---

pub const RELEASE_FEED_URL: &str =
    "https://api.github.com/repos/Metroynome/UYALauncher/releases/latest";
pub const MAPS_BASE_URL: &str = "https://box.rac-horizon.com/downloads/maps";
pub const HTTP_USER_AGENT: &str = concat!("UYALauncher/", env!("CARGO_PKG_VERSION"));
pub const UPDATE_DOWNLOAD_NAME: &str = "UYALauncher_new.exe";
