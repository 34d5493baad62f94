//! Per-user settings persisted as a flat INI file.
//!
//! `ConfigStore` is the string key/value layer; `Configuration` is the typed
//! snapshot the rest of the launcher reads.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use parking_lot::RwLock;

pub const SETTINGS_SECTION: &str = "Settings";
pub const LAUNCHER_SECTION: &str = "Launcher";

pub const KEY_ISO: &str = "ISO";
pub const KEY_EMULATOR: &str = "PCSX2";
pub const KEY_REGION: &str = "Region";
pub const KEY_AUTO_UPDATE: &str = "AutoUpdate";
pub const KEY_EMBED_WINDOW: &str = "EmbedWindow";
pub const KEY_BOOT_TO_MULTIPLAYER: &str = "BootToMultiplayer";
pub const KEY_WIDE_SCREEN: &str = "WideScreen";
pub const KEY_PROGRESSIVE_SCAN: &str = "ProgressiveScan";
pub const KEY_FULLSCREEN: &str = "Fullscreen";
pub const KEY_SHOW_CONSOLE: &str = "ShowConsole";
pub const KEY_VERSION: &str = "Version";

type IniData = BTreeMap<String, BTreeMap<String, String>>;

/// Game release the launcher targets. `Both` runs region-specific work
/// for NTSC and then PAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Ntsc,
    Pal,
    Both,
}

impl Region {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "NTSC" => Some(Region::Ntsc),
            "PAL" => Some(Region::Pal),
            "Both" => Some(Region::Both),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Ntsc => "NTSC",
            Region::Pal => "PAL",
            Region::Both => "Both",
        }
    }

    /// The single regions this value stands for, in processing order.
    pub fn expand(self) -> &'static [Region] {
        match self {
            Region::Ntsc => &[Region::Ntsc],
            Region::Pal => &[Region::Pal],
            Region::Both => &[Region::Ntsc, Region::Pal],
        }
    }
}

/// Default location: `<config dir>/UYALauncher/config.ini`
/// (`%APPDATA%\UYALauncher\config.ini` on Windows).
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("UYALauncher"))
}

pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|dir| dir.join("config.ini"))
}

/// `true`, `True` and `1` are true; everything else is false.
pub fn parse_bool(value: &str) -> bool {
    matches!(value.trim(), "true" | "True" | "1")
}

pub fn bool_str(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

fn parse_ini(content: &str) -> IniData {
    let mut data = IniData::new();
    let mut section = String::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with('#') {
            continue;
        }
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            section = trimmed[1..trimmed.len() - 1].trim().to_string();
            data.entry(section.clone()).or_default();
            continue;
        }
        if let Some((key, value)) = trimmed.split_once('=') {
            data.entry(section.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    data
}

fn render_ini(data: &IniData) -> String {
    let mut out = String::new();
    for (section, entries) in data {
        if !section.is_empty() {
            out.push_str(&format!("[{}]\n", section));
        }
        for (key, value) in entries {
            out.push_str(&format!("{}={}\n", key, value));
        }
        out.push('\n');
    }
    out
}

#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    data: RwLock<IniData>,
}

impl ConfigStore {
    /// Opens the store at `path`. A missing file is an empty store (first
    /// run); nothing is written until the first `set`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            parse_ini(&content)
        } else {
            debug!("[Config] {} does not exist yet", path.display());
            IniData::new()
        };
        Ok(Self { path, data: RwLock::new(data) })
    }

    pub fn open_default() -> Result<Self> {
        let path = default_config_path().context("no per-user config directory")?;
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_first_run(&self) -> bool {
        !self.path.exists()
    }

    /// Value of `key` in `[Settings]`, empty when absent.
    pub fn get(&self, key: &str) -> String {
        self.get_in(SETTINGS_SECTION, key)
    }

    pub fn get_in(&self, section: &str, key: &str) -> String {
        self.data
            .read()
            .get(section)
            .and_then(|entries| entries.get(key).cloned())
            .unwrap_or_default()
    }

    /// Stores `key` in `[Settings]` and writes the file immediately.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_in(SETTINGS_SECTION, key, value)
    }

    pub fn set_in(&self, section: &str, key: &str, value: &str) -> Result<()> {
        self.data
            .write()
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.flush()
    }

    pub fn version(&self) -> String {
        self.get_in(LAUNCHER_SECTION, KEY_VERSION)
    }

    pub fn set_version(&self, version: &str) -> Result<()> {
        self.set_in(LAUNCHER_SECTION, KEY_VERSION, version)
    }

    fn flush(&self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let content = render_ini(&self.data.read());
        fs::write(&self.path, content).with_context(|| format!("writing {}", self.path.display()))
    }
}

/// Typed view of `[Settings]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub iso_path: PathBuf,
    pub emulator_path: PathBuf,
    pub region: Region,
    pub auto_update: bool,
    pub embed_window: bool,
    pub boot_to_multiplayer: bool,
    pub wide_screen: bool,
    pub progressive_scan: bool,
    pub fullscreen: bool,
    pub show_console: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            iso_path: PathBuf::new(),
            emulator_path: PathBuf::new(),
            region: Region::Ntsc,
            auto_update: false,
            embed_window: true,
            boot_to_multiplayer: false,
            wide_screen: false,
            progressive_scan: false,
            fullscreen: false,
            show_console: false,
        }
    }
}

impl Configuration {
    pub fn load(store: &ConfigStore) -> Self {
        let region_raw = store.get(KEY_REGION);
        let region = if region_raw.is_empty() {
            Region::Ntsc
        } else {
            Region::parse(&region_raw).unwrap_or_else(|| {
                warn!("[Config] Unknown region `{}`, using NTSC", region_raw);
                Region::Ntsc
            })
        };

        Self {
            iso_path: PathBuf::from(store.get(KEY_ISO)),
            emulator_path: PathBuf::from(store.get(KEY_EMULATOR)),
            region,
            auto_update: parse_bool(&store.get(KEY_AUTO_UPDATE)),
            // Only an explicit "false" turns embedding off.
            embed_window: store.get(KEY_EMBED_WINDOW) != "false",
            boot_to_multiplayer: parse_bool(&store.get(KEY_BOOT_TO_MULTIPLAYER)),
            wide_screen: parse_bool(&store.get(KEY_WIDE_SCREEN)),
            progressive_scan: parse_bool(&store.get(KEY_PROGRESSIVE_SCAN)),
            fullscreen: parse_bool(&store.get(KEY_FULLSCREEN)),
            show_console: parse_bool(&store.get(KEY_SHOW_CONSOLE)),
        }
    }

    pub fn save(&self, store: &ConfigStore) -> Result<()> {
        store.set(KEY_ISO, &self.iso_path.display().to_string())?;
        store.set(KEY_EMULATOR, &self.emulator_path.display().to_string())?;
        store.set(KEY_REGION, self.region.as_str())?;
        store.set(KEY_AUTO_UPDATE, bool_str(self.auto_update))?;
        store.set(KEY_EMBED_WINDOW, bool_str(self.embed_window))?;
        store.set(KEY_BOOT_TO_MULTIPLAYER, bool_str(self.boot_to_multiplayer))?;
        store.set(KEY_WIDE_SCREEN, bool_str(self.wide_screen))?;
        store.set(KEY_PROGRESSIVE_SCAN, bool_str(self.progressive_scan))?;
        store.set(KEY_FULLSCREEN, bool_str(self.fullscreen))?;
        store.set(KEY_SHOW_CONSOLE, bool_str(self.show_console))?;
        info!("[Config] Saved to {}", store.path().display());
        Ok(())
    }

    /// ISO and emulator paths must be set; the region always is.
    pub fn is_complete(&self) -> bool {
        !self.iso_path.as_os_str().is_empty() && !self.emulator_path.as_os_str().is_empty()
    }
}
