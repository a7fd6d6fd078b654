//! KeyHue CLI — one-shot color control for QMK/VIA keyboards.
//!
//! Console subsystem: works normally in PowerShell, cmd, and other
//! terminals. Also serves as the daemon's delegate fallback, so `set` keeps
//! its surface stable.

use clap::Parser;

mod cli;

#[derive(Parser)]
#[command(
    name = "keyhue-cli",
    version,
    about = "One-shot RGB color control for QMK/VIA keyboards"
)]
struct Args {
    /// Output as JSON (for get, probe)
    #[arg(long, global = true)]
    json: bool,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: cli::Command,
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .format_target(false)
        .init();

    if let Err(e) = cli::run(args.command, args.json) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
