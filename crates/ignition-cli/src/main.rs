//! Ignition - self-healing engine launcher
//!
//! Usage:
//!   ignition              # Sync, build, and launch the engine
//!   ignition --dry-run    # Report what a run would do, change nothing
//!   ignition --verbose    # Debug-level logging

mod logging;

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use ignition_core::prelude::*;

#[derive(Parser)]
#[command(name = "ignition")]
#[command(about = "Self-healing engine launcher", long_about = None)]
struct Cli {
    /// Audit mode: resolve the server and check the version, then stop
    /// without syncing, building, or launching
    #[arg(long)]
    dry_run: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,

    /// Install directory override (defaults to the per-user data directory)
    #[arg(long, value_name = "DIR")]
    install_dir: Option<PathBuf>,

    /// Do not request elevated privileges for toolchain setup
    #[arg(long)]
    skip_elevation: bool,

    /// Exit immediately on failure instead of waiting for Enter
    #[arg(long)]
    no_pause: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.install_dir.clone() {
        Some(dir) => Config::new(dir),
        None => Config::default(),
    };

    std::fs::create_dir_all(&config.install_dir).with_context(|| {
        format!(
            "could not create install directory {}",
            config.install_dir.display()
        )
    })?;
    let log_path = logging::init(&config.logs_dir(), cli.verbose)?;

    println!("Ignition Launcher");
    println!("  install: {}", config.install_dir.display());
    println!("  log:     {}", log_path.display());
    println!();

    if cli.skip_elevation {
        info!("privilege elevation disabled; missing toolchains will surface as build failures");
    }

    let mut orchestrator = Orchestrator::new(DefaultStages::new(config));
    if cli.dry_run {
        orchestrator = orchestrator.dry_run();
    }

    match orchestrator.run().await {
        Ok(report) => {
            info!(retries = report.retries, "pipeline finished");
            if cli.dry_run {
                if report.need_sync {
                    println!("Out of date: a run would sync a new package.");
                } else {
                    println!("Up to date: a run would build and launch as-is.");
                }
            }
            Ok(())
        }
        Err(e) => {
            error!("pipeline failed: {e}");
            eprintln!();
            eprintln!("Launch failed: {e}");
            eprintln!("See the log for details: {}", log_path.display());
            if !cli.no_pause {
                wait_for_enter();
            }
            std::process::exit(1);
        }
    }
}

/// Keep the console window open so the failure stays readable when the
/// launcher was started from a double-click.
fn wait_for_enter() {
    eprintln!("Press Enter to exit...");
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::Parser;

    #[test]
    fn bare_invocation_parses() {
        let cli = Cli::try_parse_from(["ignition"]).expect("parse should succeed");
        assert!(!cli.dry_run);
        assert!(!cli.verbose);
        assert!(cli.install_dir.is_none());
    }

    #[test]
    fn dry_run_flag_parses() {
        let cli = Cli::try_parse_from(["ignition", "--dry-run"]).expect("parse should succeed");
        assert!(cli.dry_run);
    }

    #[test]
    fn verbose_short_flag_parses() {
        let cli = Cli::try_parse_from(["ignition", "-v"]).expect("parse should succeed");
        assert!(cli.verbose);
    }

    #[test]
    fn install_dir_override_parses() {
        let cli = Cli::try_parse_from(["ignition", "--install-dir", "/tmp/ignition"])
            .expect("parse should succeed");
        assert_eq!(
            cli.install_dir,
            Some(std::path::PathBuf::from("/tmp/ignition"))
        );
    }

    #[test]
    fn skip_elevation_flag_parses() {
        let cli =
            Cli::try_parse_from(["ignition", "--skip-elevation"]).expect("parse should succeed");
        assert!(cli.skip_elevation);
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(Cli::try_parse_from(["ignition", "--frobnicate"]).is_err());
    }
}
