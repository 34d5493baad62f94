#![cfg_attr(windows, windows_subsystem = "windows")]

use clap::Parser;
use uya_launcher::cli::Cli;

#[cfg(windows)]
fn main() {
    let cli = Cli::parse();
    std::process::exit(uya_launcher::app::run(cli));
}

#[cfg(not(windows))]
fn main() {
    let _ = Cli::parse();
    eprintln!("uya-launcher hosts PCSX2 through Win32 and only runs on Windows");
    std::process::exit(1);
}
