//! KeyHue daemon — keeps the keyboard RGB color in sync with the active
//! keyboard layout.
//!
//! GUI subsystem on Windows so launching from Explorer opens no console;
//! logs go to a file under the config directory.

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

#[cfg(windows)]
mod layout_win;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use clap::Parser;
use keyhue_lib::config::Config;
use keyhue_lib::hid::HidChannel;
use keyhue_lib::process::ProcessChannel;
use keyhue_lib::sender::{HueSender, SenderSettings};
use keyhue_lib::shutdown::ShutdownGuard;
use keyhue_lib::watcher::{LayoutSource, LayoutWatcher, StatusSink};

/// Shared shutdown latch — set by the signal and console handlers.
static SHUTDOWN: ShutdownGuard = ShutdownGuard::new();

#[derive(Parser)]
#[command(
    name = "keyhue",
    version,
    about = "Keyboard-layout driven RGB color sync for QMK/VIA keyboards"
)]
struct Args {
    /// Log at debug level.
    #[arg(long)]
    debug: bool,
}

/// Initialize the daemon logger, directing output to a log file.
///
/// Falls back to stderr if the log file can't be opened.
fn init_daemon_logger(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    builder.format_target(false);

    if let Some(log_path) = Config::log_path() {
        if let Some(dir) = log_path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        if let Ok(file) = std::fs::File::create(&log_path) {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
    }

    builder.init();
}

// ── Layout sources ──

/// Layout source for platforms without native layout lookup: reads the
/// `KEYHUE_LAYOUT` environment variable, unset meaning unknown.
#[cfg(not(windows))]
struct EnvLayoutSource;

#[cfg(not(windows))]
impl LayoutSource for EnvLayoutSource {
    fn current_layout(&self) -> Option<String> {
        std::env::var("KEYHUE_LAYOUT").ok().filter(|s| !s.is_empty())
    }
}

fn platform_layout_source() -> impl LayoutSource + 'static {
    #[cfg(windows)]
    {
        layout_win::WinLayoutSource
    }
    #[cfg(not(windows))]
    {
        EnvLayoutSource
    }
}

// ── Status sink ──

/// Logs layout/color transitions, once per change.
#[derive(Default)]
struct LogStatus {
    last: Mutex<Option<(Option<String>, String)>>,
}

impl StatusSink for LogStatus {
    fn update(&self, layout: Option<&str>, color: &str) {
        let current = (layout.map(str::to_owned), color.to_owned());
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if last.as_ref() != Some(&current) {
            log::info!(
                "layout {} -> color {color}",
                layout.unwrap_or("(unknown)")
            );
            *last = Some(current);
        }
    }
}

// ── Signal handlers ──

#[cfg(windows)]
unsafe extern "system" fn ctrl_handler(_ctrl_type: u32) -> windows::core::BOOL {
    SHUTDOWN.request();
    windows::core::BOOL(1)
}

fn install_signal_handlers() {
    #[cfg(windows)]
    unsafe {
        let _ = windows::Win32::System::Console::SetConsoleCtrlHandler(Some(ctrl_handler), true);
    }

    #[cfg(not(windows))]
    {
        ctrlc::set_handler(|| {
            SHUTDOWN.request();
        })
        .ok();
    }
}

fn main() {
    let args = Args::parse();
    init_daemon_logger(args.debug);
    log::info!("keyhue {} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::load();
    if let Err(errors) = config.validate() {
        let msg: Vec<String> = errors.iter().map(ToString::to_string).collect();
        let msg = format!("Invalid configuration:\n  {}", msg.join("\n  "));
        log::error!("{msg}");
        show_fatal_error(&msg);
        eprintln!("Error: {}", msg);
        std::process::exit(1);
    }
    let address = match config.device_address() {
        Ok(address) => address,
        Err(e) => {
            log::error!("{e}");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let mut direct = HidChannel::new(address);
    if direct.probe() {
        log::info!("raw HID interface present for {address}");
    } else {
        log::warn!("no raw HID interface for {address}; relying on delegate fallback");
    }
    let fallback = ProcessChannel::new(
        config.delegate.clone(),
        address,
        config.step,
        config.delay_ms,
        Duration::from_secs(config.timeout_secs),
    );
    let sender = Arc::new(HueSender::new(
        direct,
        fallback,
        SenderSettings {
            rate_limit: Duration::from_millis(config.rate_limit_ms),
            channel_index: 0,
        },
    ));

    install_signal_handlers();

    let watcher = LayoutWatcher::spawn(
        Arc::clone(&sender),
        platform_layout_source(),
        LogStatus::default(),
        config,
    );

    while !SHUTDOWN.is_requested() {
        std::thread::sleep(Duration::from_millis(200));
    }

    log::info!("shutdown requested");
    watcher.stop();
    sender.shutdown();
    log::info!("shutdown complete");
}

/// Show a fatal startup error. On Windows the daemon has no console, so a
/// MessageBox is the only thing the user would see.
#[cfg(windows)]
fn show_fatal_error(msg: &str) {
    use windows::Win32::UI::WindowsAndMessaging::{MB_ICONERROR, MB_OK, MessageBoxW};
    use windows::core::PCWSTR;

    let wide_msg: Vec<u16> = msg.encode_utf16().chain(std::iter::once(0)).collect();
    let title: Vec<u16> = "KeyHue".encode_utf16().chain(std::iter::once(0)).collect();
    unsafe {
        let _ = MessageBoxW(
            None,
            PCWSTR(wide_msg.as_ptr()),
            PCWSTR(title.as_ptr()),
            MB_ICONERROR | MB_OK,
        );
    }
}

#[cfg(not(windows))]
fn show_fatal_error(_msg: &str) {
    // The eprintln in main is visible from the terminal.
}
