//! Error taxonomy for the launcher core.
//!
//! Collaborators that only do file or network I/O return `anyhow::Result`;
//! the process/window core reports through `LauncherError` so callers can
//! decide between "dialog and exit", "warn and continue" and "log only".

#[derive(Debug)]
pub enum LauncherError {
    /// The emulator process could not be created.
    SpawnFailed { exe: String, code: Option<i32> },
    /// The discovery cascade ran out of attempts.
    WindowNotFound { pid: u32, attempts: u32 },
    /// The child did not go away within the grace period after termination.
    TerminationTimeout { pid: u32, grace_ms: u128 },
    /// A global hotkey could not be registered (usually taken by another app).
    HotkeyRegistration { id: i32 },
    Config(String),
    Network(String),
    Io(std::io::Error),
}

impl std::fmt::Display for LauncherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LauncherError::SpawnFailed { exe, code: Some(code) } => {
                write!(f, "Failed to launch `{}` (OS error {})", exe, code)
            }
            LauncherError::SpawnFailed { exe, code: None } => {
                write!(f, "Failed to launch `{}`", exe)
            }
            LauncherError::WindowNotFound { pid, attempts } => {
                write!(
                    f,
                    "No window owned by process {} appeared after {} attempts",
                    pid, attempts
                )
            }
            LauncherError::TerminationTimeout { pid, grace_ms } => {
                write!(f, "Process {} still alive {} ms after termination", pid, grace_ms)
            }
            LauncherError::HotkeyRegistration { id } => {
                write!(f, "Could not register global hotkey {}", id)
            }
            LauncherError::Config(s) => write!(f, "Configuration error: {}", s),
            LauncherError::Network(s) => write!(f, "Network error: {}", s),
            LauncherError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for LauncherError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LauncherError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for LauncherError {
    fn from(e: std::io::Error) -> Self {
        LauncherError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_failure_mentions_os_code() {
        let err = LauncherError::SpawnFailed { exe: "C:\\emu.exe".into(), code: Some(2) };
        let text = err.to_string();
        assert!(text.contains("C:\\emu.exe"));
        assert!(text.contains("OS error 2"));
    }

    #[test]
    fn io_errors_keep_their_source() {
        use std::error::Error;
        let err: LauncherError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(err.source().is_some());
    }
}
