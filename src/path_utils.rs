//! Path helpers for the launcher.
//!
//! Provides:
//! 1. The directory holding the launcher executable.
//! 2. A native file-picker dialog for choosing the game ISO and the emulator.

use std::path::{Path, PathBuf};

/// Directory containing the running executable, falling back to the
/// current directory.
pub fn executable_directory() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// One "Name (*.ext)" entry of a picker's file type list.
#[derive(Debug, Clone, Copy)]
pub struct FileFilter {
    pub name: &'static str,
    pub pattern: &'static str,
}

pub const ISO_FILTERS: &[FileFilter] = &[
    FileFilter { name: "Disc images (*.iso)", pattern: "*.iso" },
    FileFilter { name: "All files", pattern: "*.*" },
];

pub const EXE_FILTERS: &[FileFilter] = &[
    FileFilter { name: "Programs (*.exe)", pattern: "*.exe" },
    FileFilter { name: "All files", pattern: "*.*" },
];

#[cfg(windows)]
pub use picker::pick_file;

#[cfg(windows)]
mod picker {
    use std::path::{Path, PathBuf};

    use log::{debug, warn};
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::HWND;
    use windows::Win32::System::Com::{CoCreateInstance, CoTaskMemFree, CLSCTX_INPROC_SERVER};
    use windows::Win32::UI::Shell::Common::COMDLG_FILTERSPEC;
    use windows::Win32::UI::Shell::{
        FileOpenDialog, IFileOpenDialog, FOS_FILEMUSTEXIST, FOS_FORCEFILESYSTEM, SIGDN_FILESYSPATH,
    };

    use super::FileFilter;
    use crate::win32_utils::to_wide;

    /// Pops up the standard Windows "open file" dialog and returns the chosen
    /// path, or `None` if the user cancels. COM must already be initialized
    /// (STA) on the calling thread.
    pub fn pick_file(
        owner: Option<HWND>,
        title: &str,
        filters: &[FileFilter],
        initial: Option<&Path>,
    ) -> Option<PathBuf> {
        unsafe {
            let dialog: IFileOpenDialog =
                CoCreateInstance(&FileOpenDialog, None, CLSCTX_INPROC_SERVER)
                    .map_err(|e| warn!("[Path Utils] FileOpenDialog unavailable: {:?}", e))
                    .ok()?;

            let wide: Vec<(Vec<u16>, Vec<u16>)> =
                filters.iter().map(|f| (to_wide(f.name), to_wide(f.pattern))).collect();
            let specs: Vec<COMDLG_FILTERSPEC> = wide
                .iter()
                .map(|(name, spec)| COMDLG_FILTERSPEC {
                    pszName: PCWSTR(name.as_ptr()),
                    pszSpec: PCWSTR(spec.as_ptr()),
                })
                .collect();
            dialog.SetFileTypes(&specs).ok()?;
            dialog.SetOptions(FOS_FILEMUSTEXIST | FOS_FORCEFILESYSTEM).ok()?;

            let title = to_wide(title);
            dialog.SetTitle(PCWSTR(title.as_ptr())).ok()?;

            if let Some(current) = initial {
                let current = to_wide(&current.display().to_string());
                let _ = dialog.SetFileName(PCWSTR(current.as_ptr()));
            }

            if dialog.Show(owner).is_err() {
                debug!("[Path Utils] Picker cancelled");
                return None;
            }

            let item = dialog.GetResult().ok()?;
            let raw = item.GetDisplayName(SIGDN_FILESYSPATH).ok()?;
            let path = raw.to_string().ok().map(PathBuf::from);
            CoTaskMemFree(Some(raw.0 as *const _));
            path
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executable_directory_exists() {
        assert!(executable_directory().is_dir());
    }

    #[test]
    fn every_picker_offers_an_all_files_fallback() {
        for filters in [ISO_FILTERS, EXE_FILTERS] {
            assert_eq!(filters.last().map(|f| f.pattern), Some("*.*"));
        }
    }
}
