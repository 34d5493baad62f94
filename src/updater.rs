//! Launcher self-update: release check, download, and the
//! `--self-update` continuation that swaps the executable on disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Deserialize;

use crate::cli::Cli;
use crate::config::ConfigStore;
use crate::constants;
use crate::http::HttpFetch;
use crate::platform::{SelfLauncher, UserPrompt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    UpToDate,
    Updated,
    NetworkError,
    Failed,
    UserCancelled,
}

#[derive(Debug, Deserialize)]
struct ReleaseFeed {
    tag_name: String,
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    browser_download_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub version: String,
    pub download_url: String,
}

/// Reads the `releases/latest` document. The version loses its leading `v`;
/// the first asset is the download.
pub fn parse_release(json: &str) -> Result<ReleaseInfo> {
    let feed: ReleaseFeed = serde_json::from_str(json).context("parsing release feed")?;
    let download_url = feed
        .assets
        .into_iter()
        .next()
        .map(|a| a.browser_download_url)
        .context("release has no assets")?;
    let version = feed.tag_name.trim();
    Ok(ReleaseInfo {
        version: version.strip_prefix('v').unwrap_or(version).to_string(),
        download_url,
    })
}

fn version_parts(version: &str) -> [u32; 3] {
    let mut parts = [0u32; 3];
    let version = version.trim().trim_start_matches('v');
    for (slot, piece) in parts.iter_mut().zip(version.split('.')) {
        let digits: String = piece.chars().take_while(|c| c.is_ascii_digit()).collect();
        *slot = digits.parse().unwrap_or(0);
    }
    parts
}

/// Numeric `major.minor.patch` comparison; missing or garbled parts are 0.
pub fn is_newer_version(current: &str, remote: &str) -> bool {
    version_parts(remote) > version_parts(current)
}

/// `<path>|<version>`; a payload without `|` is only a path and records
/// version `0.0.0`.
pub fn parse_self_update_payload(payload: &str) -> (PathBuf, String) {
    let payload = payload.trim().trim_matches('"');
    match payload.rsplit_once('|') {
        Some((path, version)) => (PathBuf::from(path), version.to_string()),
        None => (PathBuf::from(payload), "0.0.0".to_string()),
    }
}

/// Spawns the running executable again with new arguments.
pub struct CurrentExeLauncher;

impl SelfLauncher for CurrentExeLauncher {
    fn spawn_self(&self, args: &[String]) -> io::Result<()> {
        let exe = std::env::current_exe()?;
        info!("[Updater] Starting {} {:?}", exe.display(), args);
        Command::new(exe).args(args).spawn().map(|_| ())
    }
}

pub struct SelfUpdater<'a> {
    http: &'a dyn HttpFetch,
    prompt: &'a dyn UserPrompt,
    launcher: &'a dyn SelfLauncher,
    feed_url: String,
    current_version: String,
    download_path: PathBuf,
}

impl<'a> SelfUpdater<'a> {
    pub fn new(http: &'a dyn HttpFetch, prompt: &'a dyn UserPrompt, launcher: &'a dyn SelfLauncher) -> Self {
        Self {
            http,
            prompt,
            launcher,
            feed_url: constants::RELEASE_FEED_URL.to_string(),
            current_version: constants::LAUNCHER_VERSION.to_string(),
            download_path: std::env::temp_dir().join(constants::UPDATE_DOWNLOAD_NAME),
        }
    }

    pub fn with_feed_url(mut self, url: impl Into<String>) -> Self {
        self.feed_url = url.into();
        self
    }

    pub fn with_current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = version.into();
        self
    }

    pub fn with_download_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.download_path = path.into();
        self
    }

    /// Checks the release feed and, when a newer build exists, downloads it
    /// and starts the continuation process. On `Updated` the caller must
    /// terminate the emulator and exit.
    pub fn check_and_apply(&self, silent: bool) -> UpdateResult {
        let body = match self.http.get_text(&self.feed_url) {
            Ok(body) => body,
            Err(e) => {
                warn!("[Updater] Release check failed: {:#}", e);
                return UpdateResult::NetworkError;
            }
        };
        let release = match parse_release(&body) {
            Ok(release) => release,
            Err(e) => {
                warn!("[Updater] {:#}", e);
                return UpdateResult::UpToDate;
            }
        };
        if !is_newer_version(&self.current_version, &release.version) {
            debug!("[Updater] v{} is current", self.current_version);
            return UpdateResult::UpToDate;
        }
        info!("[Updater] v{} available (running v{})", release.version, self.current_version);

        if !silent {
            let text = format!(
                "Update available: v{new}\n\nCurrent version: v{cur}\nNew version: v{new}\n\n\
                 Download and install now?\n\nNote: This will close the launcher and PCSX2.",
                new = release.version,
                cur = self.current_version
            );
            if !self.prompt.confirm(None, "Update Available", &text) {
                return UpdateResult::UserCancelled;
            }
        }

        if let Err(e) = self.download(&release) {
            warn!("[Updater] {:#}", e);
            return UpdateResult::Failed;
        }

        let args = Cli::self_update_args(&self.download_path, &release.version);
        match self.launcher.spawn_self(&args) {
            Ok(()) => UpdateResult::Updated,
            Err(e) => {
                warn!("[Updater] Could not start the update step: {}", e);
                UpdateResult::Failed
            }
        }
    }

    fn download(&self, release: &ReleaseInfo) -> Result<()> {
        let bytes = self.http.get_bytes(&release.download_url)?;
        fs::write(&self.download_path, bytes)
            .with_context(|| format!("writing {}", self.download_path.display()))?;
        info!("[Updater] Downloaded v{} to {}", release.version, self.download_path.display());
        Ok(())
    }
}

fn backup_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".old");
    PathBuf::from(name)
}

/// Moves `new_exe` over `target`. The old file is renamed aside first so a
/// running image can be replaced; it is restored if the new one cannot be
/// put in place.
pub fn replace_executable(new_exe: &Path, target: &Path) -> Result<()> {
    let backup = backup_path(target);
    let _ = fs::remove_file(&backup);
    let had_target = target.exists();
    if had_target {
        fs::rename(target, &backup).with_context(|| format!("moving {} aside", target.display()))?;
    }

    let placed = fs::rename(new_exe, target).or_else(|_| {
        fs::copy(new_exe, target)?;
        fs::remove_file(new_exe)
    });
    if let Err(e) = placed {
        if had_target {
            let _ = fs::rename(&backup, target);
        }
        return Err(e).with_context(|| format!("installing {}", new_exe.display()));
    }
    Ok(())
}

/// Deletes the `.old` copy left behind by a previous update.
pub fn remove_stale_backup(exe: &Path) {
    let backup = backup_path(exe);
    if backup.exists() {
        match fs::remove_file(&backup) {
            Ok(()) => debug!("[Updater] Removed {}", backup.display()),
            Err(e) => debug!("[Updater] {} still locked: {}", backup.display(), e),
        }
    }
}

/// Body of `--self-update`: records the version, waits for the old process
/// to exit, swaps the executable and starts it with `--just-updated`.
pub fn run_continuation(
    payload: &str,
    store: &ConfigStore,
    target_exe: &Path,
    launcher: &dyn SelfLauncher,
    settle: Duration,
) -> Result<()> {
    let (new_exe, version) = parse_self_update_payload(payload);
    info!("[Updater] Installing v{} from {}", version, new_exe.display());
    store.set_version(&version)?;

    thread::sleep(settle);
    replace_executable(&new_exe, target_exe)?;
    launcher
        .spawn_self(&Cli::just_updated_args())
        .context("starting the updated launcher")?;
    Ok(())
}
