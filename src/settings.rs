//! The settings flow: file pickers for the ISO and the emulator, a couple of
//! yes/no questions, then save. Less common toggles stay in `config.ini`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info};

use crate::config::{ConfigStore, Configuration, Region};
use crate::path_utils::{FileFilter, EXE_FILTERS, ISO_FILTERS};
use crate::platform::{SettingsDialog, SettingsOutcome, UserPrompt, WindowId};

pub trait FilePicker {
    fn pick(
        &self,
        parent: Option<WindowId>,
        title: &str,
        filters: &[FileFilter],
        initial: Option<&Path>,
    ) -> Option<PathBuf>;
}

pub struct PromptSettingsDialog<P> {
    picker: P,
    prompt: Arc<dyn UserPrompt>,
    store: Arc<ConfigStore>,
}

impl<P: FilePicker> PromptSettingsDialog<P> {
    pub fn new(picker: P, prompt: Arc<dyn UserPrompt>, store: Arc<ConfigStore>) -> Self {
        Self { picker, prompt, store }
    }

    /// A cancelled picker keeps the current value; with nothing to keep the
    /// whole dialog is cancelled.
    fn choose(
        &self,
        parent: Option<WindowId>,
        title: &str,
        filters: &[FileFilter],
        current: &Path,
    ) -> Option<PathBuf> {
        let initial = (!current.as_os_str().is_empty()).then_some(current);
        match self.picker.pick(parent, title, filters, initial) {
            Some(path) => Some(path),
            None => initial.map(Path::to_path_buf),
        }
    }
}

impl<P: FilePicker> SettingsDialog for PromptSettingsDialog<P> {
    fn show(&self, parent: Option<WindowId>) -> SettingsOutcome {
        let before = Configuration::load(&self.store);
        let mut config = before.clone();

        let Some(iso) = self.choose(parent, "Select the game ISO", ISO_FILTERS, &before.iso_path) else {
            return SettingsOutcome::Cancelled;
        };
        let Some(emulator) =
            self.choose(parent, "Select pcsx2.exe", EXE_FILTERS, &before.emulator_path)
        else {
            return SettingsOutcome::Cancelled;
        };
        config.iso_path = iso;
        config.emulator_path = emulator;

        let keep_both = config.region == Region::Both
            && self.prompt.confirm(
                parent,
                "Both Regions",
                "Custom maps are kept up to date for both PAL and NTSC.\n\n\
                 Yes: keep both\nNo: pick a single region",
            );
        if !keep_both {
            config.region = if self.prompt.confirm(
                parent,
                "Region",
                "Is this the PAL release of the game?\n\nYes: PAL\nNo: NTSC",
            ) {
                Region::Pal
            } else {
                Region::Ntsc
            };
        }
        config.embed_window = self.prompt.confirm(
            parent,
            "Window",
            "Show PCSX2 inside the launcher window?",
        );

        if let Err(e) = config.save(&self.store) {
            error!("[Settings] {:#}", e);
            self.prompt.error(parent, "Settings", &format!("Could not save settings: {:#}", e));
            return SettingsOutcome::Cancelled;
        }
        info!("[Settings] Saved ({})", self.store.path().display());

        // From the start-up path there is no session to relaunch yet.
        if parent.is_none() || config == before {
            return SettingsOutcome::Saved;
        }
        if self.prompt.confirm(
            parent,
            "Settings Saved",
            "Restart the launcher now to apply the new settings?",
        ) {
            SettingsOutcome::SavedAndRelaunch
        } else {
            SettingsOutcome::Saved
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct ScriptedPicker(Mutex<VecDeque<Option<PathBuf>>>);

    impl ScriptedPicker {
        fn new(answers: Vec<Option<&str>>) -> Self {
            Self(Mutex::new(answers.into_iter().map(|a| a.map(PathBuf::from)).collect()))
        }
    }

    impl FilePicker for ScriptedPicker {
        fn pick(&self, _: Option<WindowId>, _: &str, _: &[FileFilter], _: Option<&Path>) -> Option<PathBuf> {
            self.0.lock().pop_front().flatten()
        }
    }

    #[derive(Default)]
    struct ScriptedPrompt {
        answers: Mutex<VecDeque<bool>>,
        asked: Mutex<Vec<String>>,
    }

    impl ScriptedPrompt {
        fn new(answers: &[bool]) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.iter().copied().collect()),
                asked: Mutex::new(Vec::new()),
            })
        }
    }

    impl UserPrompt for ScriptedPrompt {
        fn error(&self, _: Option<WindowId>, title: &str, _: &str) {
            self.asked.lock().push(format!("error {}", title));
        }
        fn warning(&self, _: Option<WindowId>, title: &str, _: &str) {
            self.asked.lock().push(format!("warning {}", title));
        }
        fn confirm(&self, _: Option<WindowId>, title: &str, _: &str) -> bool {
            self.asked.lock().push(title.to_string());
            self.answers.lock().pop_front().unwrap_or(false)
        }
    }

    fn store() -> (tempfile::TempDir, Arc<ConfigStore>) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join("config.ini")).unwrap();
        (dir, Arc::new(store))
    }

    #[test]
    fn first_run_cancel_leaves_config_untouched() {
        let (_dir, store) = store();
        let prompt = ScriptedPrompt::new(&[]);
        let dialog = PromptSettingsDialog::new(ScriptedPicker::new(vec![None]), prompt.clone(), store.clone());

        assert_eq!(dialog.show(None), SettingsOutcome::Cancelled);
        assert!(store.is_first_run());
        assert!(prompt.asked.lock().is_empty());
    }

    #[test]
    fn startup_save_writes_choices() {
        let (_dir, store) = store();
        let prompt = ScriptedPrompt::new(&[true, false]);
        let picker = ScriptedPicker::new(vec![Some("D:\\uya.iso"), Some("D:\\pcsx2\\pcsx2.exe")]);
        let dialog = PromptSettingsDialog::new(picker, prompt.clone(), store.clone());

        assert_eq!(dialog.show(None), SettingsOutcome::Saved);
        let config = Configuration::load(&store);
        assert_eq!(config.iso_path, PathBuf::from("D:\\uya.iso"));
        assert_eq!(config.emulator_path, PathBuf::from("D:\\pcsx2\\pcsx2.exe"));
        assert_eq!(config.region, Region::Pal);
        assert!(!config.embed_window);
        assert_eq!(prompt.asked.lock().as_slice(), ["Region", "Window"]);
    }

    #[test]
    fn changes_during_a_session_offer_a_relaunch() {
        let (_dir, store) = store();
        let mut config = Configuration::default();
        config.iso_path = "a.iso".into();
        config.emulator_path = "emu.exe".into();
        config.save(&store).unwrap();

        // Both pickers cancelled: keep paths. NTSC -> PAL is a change.
        let prompt = ScriptedPrompt::new(&[true, true, true]);
        let dialog = PromptSettingsDialog::new(ScriptedPicker::new(vec![None, None]), prompt.clone(), store.clone());

        assert_eq!(dialog.show(Some(WindowId(1))), SettingsOutcome::SavedAndRelaunch);
        let saved = Configuration::load(&store);
        assert_eq!(saved.iso_path, PathBuf::from("a.iso"));
        assert_eq!(saved.region, Region::Pal);
        assert_eq!(prompt.asked.lock().last().map(String::as_str), Some("Settings Saved"));
    }

    fn both_regions_config(store: &ConfigStore) {
        let mut config = Configuration::default();
        config.iso_path = "a.iso".into();
        config.emulator_path = "emu.exe".into();
        config.region = Region::Both;
        config.save(store).unwrap();
    }

    #[test]
    fn both_regions_can_be_kept() {
        let (_dir, store) = store();
        both_regions_config(&store);

        let prompt = ScriptedPrompt::new(&[true, true]);
        let dialog = PromptSettingsDialog::new(ScriptedPicker::new(vec![None, None]), prompt.clone(), store.clone());

        assert_eq!(dialog.show(Some(WindowId(1))), SettingsOutcome::Saved);
        assert_eq!(Configuration::load(&store).region, Region::Both);
        assert_eq!(prompt.asked.lock().as_slice(), ["Both Regions", "Window"]);
    }

    #[test]
    fn both_regions_can_be_narrowed_to_one() {
        let (_dir, store) = store();
        both_regions_config(&store);

        // Leave both, answer "not PAL", embed, decline the relaunch.
        let prompt = ScriptedPrompt::new(&[false, false, true, false]);
        let dialog = PromptSettingsDialog::new(ScriptedPicker::new(vec![None, None]), prompt.clone(), store.clone());

        assert_eq!(dialog.show(Some(WindowId(1))), SettingsOutcome::Saved);
        assert_eq!(Configuration::load(&store).region, Region::Ntsc);
        assert_eq!(
            prompt.asked.lock().as_slice(),
            ["Both Regions", "Region", "Window", "Settings Saved"]
        );
    }
}
