//! Idempotent editor for the emulator's `.pnach` cheat files.
//!
//! Each known patch is a marker comment followed by `patch=` lines. A patch
//! whose feature flag is on gets appended when its marker is missing; a
//! patch whose flag is off gets its block removed when present.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::config::{Configuration, Region};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchFeature {
    BootToMultiplayer,
    WideScreen,
    ProgressiveScan,
}

#[derive(Debug)]
pub struct PnachPatch {
    pub marker: &'static str,
    pub ntsc: &'static [&'static str],
    /// `None` when the patch has no PAL port.
    pub pal: Option<&'static [&'static str]>,
    pub feature: PatchFeature,
}

impl PnachPatch {
    pub fn code_for(&self, region: Region) -> Option<&'static [&'static str]> {
        match region {
            Region::Pal => self.pal,
            _ => Some(self.ntsc),
        }
    }
}

pub const PATCHES: &[PnachPatch] = &[
    PnachPatch {
        marker: "// Boot to Multiplayer",
        ntsc: &["patch=1,EE,20381590,extended,080e6010"],
        pal: Some(&["patch=1,EE,20381568,extended,080ed2c2"]),
        feature: PatchFeature::BootToMultiplayer,
    },
    PnachPatch {
        marker: "// Enable Wide Screen",
        ntsc: &["patch=1,EE,001439fd,extended,00000001"],
        pal: Some(&["patch=1,EE,001439fd,extended,00000001"]),
        feature: PatchFeature::WideScreen,
    },
    PnachPatch {
        marker: "// Enable Progressive Scan in Multiplayer",
        ntsc: &[
            "patch=1,EE,d01d5524,extended,00000101",
            "patch=1,EE,201d5520,extended,00000001",
        ],
        pal: None,
        feature: PatchFeature::ProgressiveScan,
    },
];

/// Pnach file name and `gametitle=` header of the single-player executable
/// for one region. Every known patch edits that executable.
pub fn pnach_file(region: Region) -> (&'static str, &'static str) {
    match region {
        Region::Pal => ("SCES-52456_17125698.pnach", "Ratchet & Clank 3 Single Player (PAL)"),
        _ => (
            "SCUS-97353_45FE0CC4.pnach",
            "Ratchet & Clank: Up Your Arsenal Single Player (NTSC-U)",
        ),
    }
}

/// Adds or removes one marked block in `lines`. Returns whether anything
/// changed.
pub fn edit_block(lines: &mut Vec<String>, marker: &str, code: &[&str], enabled: bool) -> bool {
    let start = lines.iter().position(|line| line.contains(marker));
    match (enabled, start) {
        (true, None) => {
            lines.push(String::new());
            lines.push(marker.to_string());
            lines.extend(code.iter().filter(|c| !c.is_empty()).map(|c| c.to_string()));
            true
        }
        (false, Some(i)) => {
            lines.remove(i);
            while i < lines.len() && lines[i].trim_start().starts_with("patch=") {
                lines.remove(i);
            }
            if i > 0 && lines[i - 1].is_empty() {
                lines.remove(i - 1);
            }
            true
        }
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchFlags {
    pub boot_to_multiplayer: bool,
    pub wide_screen: bool,
    pub progressive_scan: bool,
}

impl PatchFlags {
    pub fn from_config(config: &Configuration) -> Self {
        Self {
            boot_to_multiplayer: config.boot_to_multiplayer,
            wide_screen: config.wide_screen,
            progressive_scan: config.progressive_scan,
        }
    }

    pub fn is_enabled(&self, feature: PatchFeature) -> bool {
        match feature {
            PatchFeature::BootToMultiplayer => self.boot_to_multiplayer,
            PatchFeature::WideScreen => self.wide_screen,
            PatchFeature::ProgressiveScan => self.progressive_scan,
        }
    }
}

pub struct PatchManager {
    flags: PatchFlags,
    documents_dir: Option<PathBuf>,
}

impl PatchManager {
    pub fn new(flags: PatchFlags) -> Self {
        Self {
            flags,
            documents_dir: dirs::document_dir(),
        }
    }

    pub fn with_documents_dir(flags: PatchFlags, documents_dir: Option<PathBuf>) -> Self {
        Self { flags, documents_dir }
    }

    /// `<emulator dir>/patches` for portable installs, else the per-user
    /// `Documents/PCSX2/patches`.
    pub fn patches_folder(&self, emulator_exe: &Path) -> Option<PathBuf> {
        let portable = emulator_exe.parent().map(|dir| dir.join("patches"));
        let user = self.documents_dir.as_ref().map(|dir| dir.join("PCSX2").join("patches"));
        [portable, user].into_iter().flatten().find(|dir| dir.is_dir())
    }

    /// Brings every pnach file of `region` in line with the feature flags.
    /// Returns false when no patches folder exists or a file could not be
    /// updated.
    pub fn apply(&self, region: Region, emulator_exe: &Path) -> bool {
        info!("[Patches] Managing emulator patches for {}", region.as_str());
        let Some(folder) = self.patches_folder(emulator_exe) else {
            warn!("[Patches] No patches folder found next to {}", emulator_exe.display());
            return false;
        };

        let mut ok = true;
        for &single in region.expand() {
            if let Err(e) = self.apply_region(&folder, single) {
                warn!("[Patches] {:#}", e);
                ok = false;
            }
        }
        ok
    }

    fn apply_region(&self, folder: &Path, region: Region) -> Result<()> {
        for patch in PATCHES {
            let Some(code) = patch.code_for(region) else {
                debug!("[Patches] `{}` has no {} code", patch.marker, region.as_str());
                continue;
            };
            let (file_name, title) = pnach_file(region);
            let path = folder.join(file_name);

            let mut lines = if path.exists() {
                fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?
                    .lines()
                    .map(str::to_string)
                    .collect()
            } else {
                vec![format!("gametitle={}", title), String::new()]
            };

            let enabled = self.flags.is_enabled(patch.feature);
            if !edit_block(&mut lines, patch.marker, code, enabled) {
                debug!("[Patches] `{}` already {} in {}", patch.marker,
                    if enabled { "present" } else { "absent" }, file_name);
                continue;
            }

            info!(
                "[Patches] {} `{}` in {}",
                if enabled { "Added" } else { "Removed" },
                patch.marker,
                file_name
            );
            let mut content = lines.join("\n");
            content.push('\n');
            fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn add_then_remove_restores_original() {
        let original = lines("gametitle=Game\n\n// Other\npatch=1,EE,0,extended,0");
        let mut edited = original.clone();
        assert!(edit_block(&mut edited, "// Mine", &["patch=1,EE,1,extended,1"], true));
        assert_eq!(edited.len(), original.len() + 3);
        assert!(!edit_block(&mut edited, "// Mine", &["patch=1,EE,1,extended,1"], true));

        assert!(edit_block(&mut edited, "// Mine", &[], false));
        assert_eq!(edited, original);
    }

    #[test]
    fn removal_keeps_unrelated_lines_after_block() {
        let mut edited = lines("gametitle=G\n\n// Mine\npatch=a\n  patch=b\n\n// Other\npatch=c");
        edit_block(&mut edited, "// Mine", &[], false);
        assert_eq!(edited, lines("gametitle=G\n\n// Other\npatch=c"));
    }

    #[test]
    fn pal_has_no_progressive_scan_code() {
        let scan = PATCHES
            .iter()
            .find(|p| p.feature == PatchFeature::ProgressiveScan)
            .unwrap();
        assert!(scan.code_for(Region::Pal).is_none());
        assert_eq!(scan.code_for(Region::Ntsc).unwrap().len(), 2);
    }

    #[test]
    fn apply_writes_both_regions_and_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let emu_dir = root.path().join("pcsx2");
        fs::create_dir_all(emu_dir.join("patches")).unwrap();
        let exe = emu_dir.join("pcsx2-qt.exe");

        let flags = PatchFlags { boot_to_multiplayer: true, wide_screen: false, progressive_scan: true };
        let manager = PatchManager::with_documents_dir(flags, None);
        assert!(manager.apply(Region::Both, &exe));

        let ntsc = fs::read_to_string(emu_dir.join("patches/SCUS-97353_45FE0CC4.pnach")).unwrap();
        assert!(ntsc.starts_with("gametitle=Ratchet & Clank: Up Your Arsenal Single Player (NTSC-U)\n"));
        assert!(ntsc.contains("// Boot to Multiplayer\npatch=1,EE,20381590,extended,080e6010\n"));
        assert!(ntsc.contains("patch=1,EE,201d5520,extended,00000001"));
        assert!(!ntsc.contains("Wide Screen"));

        let pal = fs::read_to_string(emu_dir.join("patches/SCES-52456_17125698.pnach")).unwrap();
        assert!(pal.contains("patch=1,EE,20381568,extended,080ed2c2"));
        assert!(!pal.contains("Progressive"));

        assert!(manager.apply(Region::Both, &exe));
        let again = fs::read_to_string(emu_dir.join("patches/SCUS-97353_45FE0CC4.pnach")).unwrap();
        assert_eq!(again, ntsc);

        let off = PatchManager::with_documents_dir(PatchFlags::default(), None);
        assert!(off.apply(Region::Ntsc, &exe));
        let cleared = fs::read_to_string(emu_dir.join("patches/SCUS-97353_45FE0CC4.pnach")).unwrap();
        assert_eq!(cleared, "gametitle=Ratchet & Clank: Up Your Arsenal Single Player (NTSC-U)\n\n");
    }

    #[test]
    fn only_single_player_files_are_touched() {
        let root = tempfile::tempdir().unwrap();
        let patches = root.path().join("patches");
        fs::create_dir_all(&patches).unwrap();
        let flags = PatchFlags { boot_to_multiplayer: true, wide_screen: true, progressive_scan: true };
        let manager = PatchManager::with_documents_dir(flags, None);
        assert!(manager.apply(Region::Both, &root.path().join("pcsx2.exe")));

        let mut written: Vec<String> = fs::read_dir(&patches)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        written.sort();
        assert_eq!(written, [pnach_file(Region::Pal).0, pnach_file(Region::Ntsc).0]);
    }

    #[test]
    fn falls_back_to_documents_folder() {
        let root = tempfile::tempdir().unwrap();
        let docs = root.path().join("docs");
        fs::create_dir_all(docs.join("PCSX2").join("patches")).unwrap();
        let manager = PatchManager::with_documents_dir(PatchFlags::default(), Some(docs.clone()));
        assert_eq!(
            manager.patches_folder(&root.path().join("emu").join("pcsx2.exe")),
            Some(docs.join("PCSX2").join("patches"))
        );
    }

    #[test]
    fn missing_folder_fails() {
        let root = tempfile::tempdir().unwrap();
        let manager = PatchManager::with_documents_dir(PatchFlags::default(), None);
        assert!(!manager.apply(Region::Ntsc, &root.path().join("pcsx2.exe")));
    }
}
