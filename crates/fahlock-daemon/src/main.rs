//! fahlockd - pause Folding@Home while the screen saver is active
//!
//! Usage:
//!   fahlockd [SLOT...]

use anyhow::{Context, Result};
use clap::Parser;
use fahlock_config::{init_logging, Config};
use fahlock_daemon::{run_daemon, Cli, DaemonOptions};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", Config::default_toml()?);
        return Ok(());
    }

    let config = Config::load_from(cli.config.as_deref()).context("Failed to load config")?;
    let options = DaemonOptions::resolve(&cli, config);
    init_logging(options.log_level);

    run_daemon(options)
}
