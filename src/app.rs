//! Windows entry point: wires the Win32 backends to the launcher core and
//! walks the start-up sequence.
//!
//! 1. Finish a pending self-update if started with `--self-update`.
//! 2. Load the configuration, open the console, initialise logging and COM.
//! 3. Run the settings dialog if needed, then the optional self-update check.
//! 4. Apply patches, create the host window, refresh custom maps.
//! 5. Launch and embed PCSX2, then pump messages until shutdown.

use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_APARTMENTTHREADED};

use crate::app_state::AppState;
use crate::assets::{AssetUpdater, LogProgress};
use crate::cli::Cli;
use crate::config::{ConfigStore, Configuration};
use crate::constants;
use crate::embedder::DiscoveryConfig;
use crate::host::{HostController, HostServices};
use crate::http::{HttpClient, HttpFetch};
use crate::init_logging;
use crate::launch::LaunchParameters;
use crate::patches::{PatchFlags, PatchManager};
use crate::platform::{SelfLauncher, UserPrompt};
use crate::process::StdProcessBackend;
use crate::session::Session;
use crate::settings::PromptSettingsDialog;
use crate::supervisor::ProcessSupervisor;
use crate::updater::{self, CurrentExeLauncher, SelfUpdater, UpdateResult};
use crate::win32_backend::{
    self, MessageBoxPrompt, ShellFilePicker, Win32Hotkeys, Win32Notifier, Win32Windows,
};
use crate::win32_utils::{self, window_id};

const LOG_FILE_NAME: &str = "launcher.log";
const UPDATE_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Runs the launcher and returns the process exit code.
pub fn run(cli: Cli) -> i32 {
    let store = match ConfigStore::open_default() {
        Ok(store) => Arc::new(store),
        Err(e) => {
            init_logging(false, None);
            error!("[App] {:#}", e);
            MessageBoxPrompt.error(None, "Configuration", &format!("{:#}", e));
            return 1;
        }
    };

    if let Some(payload) = cli.self_update.as_deref() {
        init_logging(true, Some(&log_path(&store)));
        return finish_self_update(payload, &store);
    }

    // --- 0) Console + logging + COM (STA) ---
    let config = Configuration::load(&store);
    let console = config.show_console && win32_backend::alloc_console();
    let log_file = (!console).then(|| log_path(&store));
    init_logging(config.show_console, log_file.as_deref());
    info!("[App] UYA Launcher v{}", constants::LAUNCHER_VERSION);

    if let Err(e) = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) }.ok() {
        error!("[App] COM init failed (STA): {:?}", e);
        return 1;
    }

    let code = launch(&cli, store);
    unsafe { CoUninitialize() };
    info!("[App] Exit code {}", code);
    code
}

fn log_path(store: &ConfigStore) -> PathBuf {
    store.path().with_file_name(LOG_FILE_NAME)
}

fn finish_self_update(payload: &str, store: &ConfigStore) -> i32 {
    let target = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => {
            error!("[App] Cannot locate the launcher executable: {}", e);
            return 1;
        }
    };
    match updater::run_continuation(payload, store, &target, &CurrentExeLauncher, UPDATE_SETTLE_DELAY) {
        Ok(()) => 0,
        Err(e) => {
            error!("[App] Update failed: {:#}", e);
            MessageBoxPrompt.error(None, "Update Failed", &format!("{:#}", e));
            1
        }
    }
}

fn launch(cli: &Cli, store: Arc<ConfigStore>) -> i32 {
    if let Ok(exe) = std::env::current_exe() {
        updater::remove_stale_backup(&exe);
    }

    let prompt: Arc<dyn UserPrompt> = Arc::new(MessageBoxPrompt);
    let relauncher: Arc<dyn SelfLauncher> = Arc::new(CurrentExeLauncher);
    let notifier = Arc::new(Win32Notifier::default());
    let http: Arc<dyn HttpFetch> = match HttpClient::new() {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("[App] {:#}", e);
            prompt.error(None, "Network", &format!("{:#}", e));
            return 1;
        }
    };

    let supervisor = Arc::new(ProcessSupervisor::new(
        Arc::new(StdProcessBackend),
        Arc::new(Session::new()),
    ));
    let services = HostServices {
        windows: Arc::new(Win32Windows),
        hotkeys: Arc::new(Win32Hotkeys),
        prompt: prompt.clone(),
        settings: Box::new(PromptSettingsDialog::new(ShellFilePicker, prompt.clone(), store.clone())),
        notifier: notifier.clone(),
        relauncher: relauncher.clone(),
        http: http.clone(),
        config: store.clone(),
    };
    let controller = Rc::new(HostController::new(
        services,
        supervisor.clone(),
        DiscoveryConfig::default(),
        true,
        false,
    ));

    // --- 1) Settings, then the optional update check ---
    let Some(config) = controller.load_configuration() else {
        return 0;
    };
    if config.auto_update && !cli.just_updated {
        match SelfUpdater::new(&*http, &*prompt, &*relauncher).check_and_apply(true) {
            UpdateResult::Updated => {
                info!("[App] Update handed off, exiting");
                return 0;
            }
            other => info!("[App] Update check: {:?}", other),
        }
    }

    // --- 2) Patches ---
    PatchManager::new(PatchFlags::from_config(&config)).apply(config.region, &config.emulator_path);

    // --- 3) Host window ---
    let state = Box::new(AppState::new(controller.clone()));
    let host = match win32_utils::create_host_window(state, controller.embed_mode()) {
        Ok(hwnd) => window_id(hwnd),
        Err(e) => {
            error!("[App] {}", e);
            prompt.error(None, "Launcher", &format!("Could not create the launcher window: {}", e));
            return 1;
        }
    };
    controller.set_host_window(host);
    notifier.set_window(host);
    if config.show_console {
        win32_backend::install_console_handler(supervisor.clone(), notifier.clone());
    }

    // --- 4) Custom maps ---
    if !config.iso_path.as_os_str().is_empty()
        && !AssetUpdater::new(&*http).run(&config.iso_path, config.region, &LogProgress)
    {
        warn!("[App] Map update failed; continuing with the maps on disk");
    }

    // --- 5) Child + message loop ---
    // On failure the controller has already reported it and queued the
    // window close; the loop below unwinds it.
    if let Err(e) = controller.start(&LaunchParameters::from_config(&config)) {
        error!("[App] {}", e);
    }
    win32_utils::run_message_loop(&controller);
    controller.finish()
}
