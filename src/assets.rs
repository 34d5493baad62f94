//! Custom map downloader. Compares the server's map index with the local
//! `.version` stamps next to the ISO and fetches whatever is out of date.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, info, warn};

use crate::config::Region;
use crate::constants;
use crate::http::HttpFetch;

const MAP_EXTENSIONS: &[&str] = &[".bg", ".thumb", ".map", ".world", ".sound", ".code", ".wad"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    pub file_name: String,
    pub map_name: String,
    pub version: i32,
}

/// Parses `filename|mapname|version` lines. Blank and malformed lines are
/// skipped.
pub fn parse_index(content: &str) -> Vec<MapEntry> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim_end_matches('\r');
            let mut parts = line.splitn(3, '|');
            let file_name = parts.next().filter(|s| !s.is_empty())?;
            let map_name = parts.next()?;
            let version = parts.next()?.trim().parse::<i32>().ok()?;
            Some(MapEntry {
                file_name: file_name.to_string(),
                map_name: map_name.to_string(),
                version,
            })
        })
        .collect()
}

/// Local version stamp: a little-endian `i32`, `-1` when missing or short.
pub fn local_version(path: &Path) -> i32 {
    match fs::read(path) {
        Ok(bytes) => Cursor::new(bytes).read_i32::<LittleEndian>().unwrap_or(-1),
        Err(_) => -1,
    }
}

fn index_name(region: Region) -> &'static str {
    match region {
        Region::Pal => "index_uya_pal.txt",
        _ => "index_uya_ntsc.txt",
    }
}

fn region_suffix(region: Region) -> &'static str {
    match region {
        Region::Pal => ".pal",
        _ => "",
    }
}

/// Receives progress while maps download. `is_cancelled` is checked
/// between maps.
pub trait ProgressSink {
    fn status(&self, text: &str);
    fn progress(&self, current: usize, total: usize);
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Progress that only goes to the log.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn status(&self, text: &str) {
        info!("[Assets] {}", text);
    }

    fn progress(&self, current: usize, total: usize) {
        debug!("[Assets] {}/{}", current, total);
    }
}

pub struct AssetUpdater<'a> {
    http: &'a dyn HttpFetch,
    base_url: String,
}

impl<'a> AssetUpdater<'a> {
    pub fn new(http: &'a dyn HttpFetch) -> Self {
        Self::with_base_url(http, constants::MAPS_BASE_URL)
    }

    pub fn with_base_url(http: &'a dyn HttpFetch, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `<iso dir>/uya`
    pub fn maps_dir(iso_path: &Path) -> PathBuf {
        iso_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .join("uya")
    }

    /// Brings the maps next to `iso_path` up to date. `false` when the first
    /// region's index could not be fetched; later regions only log.
    pub fn run(&self, iso_path: &Path, region: Region, progress: &dyn ProgressSink) -> bool {
        let maps_dir = Self::maps_dir(iso_path);
        if let Err(e) = fs::create_dir_all(&maps_dir) {
            warn!("[Assets] Cannot create {}: {}", maps_dir.display(), e);
            progress.status("Failed to create the maps folder");
            return false;
        }

        for (i, &single) in region.expand().iter().enumerate() {
            match self.update_region(&maps_dir, single, progress) {
                Ok(count) => debug!("[Assets] {} maps refreshed for {}", count, single.as_str()),
                Err(e) if i == 0 => {
                    warn!("[Assets] {:#}", e);
                    progress.status("Failed to download map list");
                    return false;
                }
                Err(e) => warn!("[Assets] {:#}", e),
            }
            if progress.is_cancelled() {
                progress.status("Update cancelled");
                return true;
            }
        }
        progress.status("Update complete!");
        true
    }

    /// Maps from the region's index whose local stamp is older.
    pub fn outdated(&self, maps_dir: &Path, region: Region) -> Result<Vec<MapEntry>> {
        let url = format!("{}/{}", self.base_url, index_name(region));
        let index = self
            .http
            .get_text(&url)
            .with_context(|| format!("downloading {} map list", region.as_str()))?;
        Ok(parse_index(&index)
            .into_iter()
            .filter(|map| {
                local_version(&maps_dir.join(format!("{}.version", map.file_name))) < map.version
            })
            .collect())
    }

    fn update_region(&self, maps_dir: &Path, region: Region, progress: &dyn ProgressSink) -> Result<usize> {
        progress.status(&format!("Downloading {} map list...", region.as_str()));
        let outdated = self.outdated(maps_dir, region)?;
        if outdated.is_empty() {
            progress.status("All maps are up to date!");
            return Ok(0);
        }

        let total = outdated.len();
        for (i, map) in outdated.iter().enumerate() {
            if progress.is_cancelled() {
                return Ok(i);
            }
            progress.status(&format!("Downloading {} ({}/{})", map.map_name, i + 1, total));
            progress.progress(i + 1, total);
            self.download_map(maps_dir, map, region);
        }
        Ok(total)
    }

    fn download_map(&self, maps_dir: &Path, map: &MapEntry, region: Region) {
        let stem = format!("{}{}", map.file_name, region_suffix(region));
        for ext in MAP_EXTENSIONS {
            let name = format!("{}{}", stem, ext);
            self.download_file(&format!("{}/uya/{}", self.base_url, name), &maps_dir.join(&name));
        }
        let version = format!("{}.version", map.file_name);
        self.download_file(&format!("{}/uya/{}", self.base_url, version), &maps_dir.join(&version));
    }

    fn download_file(&self, url: &str, target: &Path) {
        let result = self
            .http
            .get_bytes(url)
            .and_then(|bytes| {
                fs::write(target, bytes).with_context(|| format!("writing {}", target.display()))
            });
        if let Err(e) = result {
            debug!("[Assets] Skipped {}: {:#}", url, e);
        }
    }
}
