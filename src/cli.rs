use std::path::Path;

use clap::Parser;

use crate::constants;

/// Launches PCSX2 with the UYA ISO and keeps its window inside the launcher.
#[derive(Parser, Debug, Default, Clone, PartialEq, Eq)]
#[command(name = "uya-launcher", version, about)]
pub struct Cli {
    /// Finish a self-update: `<new exe path>|<version>`.
    #[arg(long = "self-update", value_name = "PAYLOAD", hide = true)]
    pub self_update: Option<String>,

    /// Set by the updater on the first start after an update.
    #[arg(long = "just-updated", hide = true)]
    pub just_updated: bool,
}

impl Cli {
    /// Command line a fresh instance is started with after an update.
    pub fn just_updated_args() -> Vec<String> {
        vec![constants::ARG_JUST_UPDATED.to_string()]
    }

    pub fn self_update_args(new_exe: &Path, version: &str) -> Vec<String> {
        vec![
            constants::ARG_SELF_UPDATE.to_string(),
            format!("{}|{}", new_exe.display(), version),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments_is_a_normal_start() {
        let cli = Cli::try_parse_from(["uya-launcher"]).unwrap();
        assert_eq!(cli, Cli::default());
    }

    #[test]
    fn updater_arguments_parse_back() {
        let mut argv = vec!["uya-launcher".to_string()];
        argv.extend(Cli::self_update_args(Path::new("C:\\Temp\\new.exe"), "1.4.0"));
        let cli = Cli::try_parse_from(&argv).unwrap();
        assert_eq!(cli.self_update.as_deref(), Some("C:\\Temp\\new.exe|1.4.0"));
        assert!(!cli.just_updated);

        let mut argv = vec!["uya-launcher".to_string()];
        argv.extend(Cli::just_updated_args());
        assert!(Cli::try_parse_from(&argv).unwrap().just_updated);
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(Cli::try_parse_from(["uya-launcher", "--bogus"]).is_err());
    }
}
