//! Per-session launch parameters for the emulator process.

use std::path::{Path, PathBuf};

use crate::config::Configuration;
use crate::constants;

/// Everything needed to start one child session. Built from the
/// configuration at launch time and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchParameters {
    pub iso_path: PathBuf,
    pub exe_path: PathBuf,
    pub flags: Vec<String>,
}

impl LaunchParameters {
    pub fn new(iso_path: impl Into<PathBuf>, exe_path: impl Into<PathBuf>, flags: Vec<String>) -> Self {
        Self {
            iso_path: iso_path.into(),
            exe_path: exe_path.into(),
            flags,
        }
    }

    /// Derives the flags from the feature toggles: fast boot when booting
    /// straight to multiplayer, fullscreen when configured.
    pub fn from_config(config: &Configuration) -> Self {
        let mut flags = Vec::new();
        if config.boot_to_multiplayer {
            flags.push(constants::FLAG_FAST_BOOT.to_string());
        }
        if config.fullscreen {
            flags.push(constants::FLAG_FULLSCREEN.to_string());
        }
        Self::new(&config.iso_path, &config.emulator_path, flags)
    }

    /// Arguments after the program name, in spawn order.
    pub fn args(&self) -> Vec<String> {
        let mut args = self.flags.clone();
        args.push("--".to_string());
        args.push(self.iso_path.display().to_string());
        args
    }

    /// `"<exe>" <flags> -- "<iso>"`, the form shown in logs and dialogs.
    pub fn command_line(&self) -> String {
        let mut line = format!("\"{}\"", self.exe_path.display());
        for flag in &self.flags {
            line.push(' ');
            line.push_str(flag);
        }
        line.push_str(&format!(" -- \"{}\"", self.iso_path.display()));
        line
    }

    /// Directory the emulator is started in (its own folder, so portable
    /// installs find their `inis/`).
    pub fn working_dir(&self) -> Option<&Path> {
        self.exe_path.parent().filter(|p| !p.as_os_str().is_empty())
    }
}
