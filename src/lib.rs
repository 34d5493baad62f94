//! Desktop launcher that supervises PCSX2 running the UYA ISO.
//!
//! - Spawns the emulator and watches it from a background thread
//! - Finds the emulator's window and embeds it in a Win32 host window
//! - Handles global hotkeys for restart, settings, map updates and save states
//! - Keeps PCSX2 patches, custom maps and the launcher itself up to date
//!
//! The process/window core only talks to the OS through the traits in
//! [`platform`]; the Win32 implementations live behind `cfg(windows)`.

pub mod app_state;
pub mod assets;
pub mod cli;
pub mod config;
pub mod constants;
pub mod embedder;
pub mod error;
pub mod host;
pub mod http;
pub mod launch;
pub mod patches;
pub mod path_utils;
pub mod platform;
pub mod process;
pub mod session;
pub mod settings;
pub mod supervisor;
pub mod updater;

#[cfg(windows)]
pub mod app;
#[cfg(windows)]
pub mod win32_backend;
#[cfg(windows)]
pub mod win32_utils;

use std::fs::File;
use std::path::Path;
use std::sync::Once;

use env_logger::{Builder, Env, Target};
use log::LevelFilter;

static LOGGER_INIT: Once = Once::new();

/// Initialize logging exactly once.
///
/// `RUST_LOG` wins over the default filter (`debug` when `verbose`, else
/// `info`). With `log_file` set, records go to that file instead of stderr.
pub fn init_logging(verbose: bool, log_file: Option<&Path>) {
    LOGGER_INIT.call_once(|| {
        let default = if verbose { "debug" } else { "info" };
        let mut builder = Builder::from_env(Env::default().default_filter_or(default));
        builder.filter_module("reqwest", LevelFilter::Warn);
        builder.filter_module("hyper_util", LevelFilter::Warn);

        if let Some(path) = log_file {
            match File::create(path) {
                Ok(file) => {
                    builder.target(Target::Pipe(Box::new(file)));
                }
                Err(e) => eprintln!("cannot open log file {}: {}", path.display(), e),
            }
        }

        let _ = builder.try_init();
    });
}
