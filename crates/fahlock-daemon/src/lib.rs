//! # fahlock-daemon
//!
//! Wires the screen saver watcher to the Folding@Home control client.
//!
//! `fahlockd [SLOT...]` connects to the local client, starts
//! `xscreensaver-command -watch` and, by default, pauses folding whenever the
//! screen blanks or locks. With no slots the whole client is paused;
//! otherwise each listed slot is.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use fahlock_config::{log_daemon_debug, log_daemon_error, log_daemon_info};
use fahlock_config::{Action, ActionsConfig, Config, LogLevel};
use fahlock_core::{ControlClient, HelperCommand, Reactor, ScreenWatch};

#[derive(Parser, Debug)]
#[command(name = "fahlockd")]
#[command(version, long_about = None)]
#[command(about = "Pause Folding@Home while the screen saver is active")]
pub struct Cli {
    /// Slots to pause (default: the whole client)
    #[arg(value_name = "SLOT")]
    pub slots: Vec<u32>,

    /// Config file to use instead of ~/.config/fahlock/config.toml
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Folding@Home command socket address
    #[arg(long, value_name = "ADDR")]
    pub control_addr: Option<SocketAddr>,

    /// Screen saver watch program
    #[arg(long, value_name = "PROGRAM")]
    pub helper: Option<String>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print the default config and exit
    #[arg(long)]
    pub print_config: bool,
}

/// Everything `run_daemon` needs, after merging the command line over the
/// config file.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonOptions {
    pub control_addr: SocketAddr,
    /// Config slots first, then command-line slots. Order and duplicates do
    /// not matter to the control client.
    pub slots: Vec<u32>,
    pub helper: HelperCommand,
    pub buffer_capacity: usize,
    pub actions: ActionsConfig,
    pub log_level: LogLevel,
}

impl DaemonOptions {
    pub fn resolve(cli: &Cli, config: Config) -> Self {
        let mut helper = HelperCommand::from(&config.helper);
        if let Some(program) = &cli.helper {
            helper.program = program.clone();
        }

        let mut slots = config.control.slots;
        slots.extend_from_slice(&cli.slots);

        Self {
            control_addr: cli.control_addr.unwrap_or(config.control.address),
            slots,
            helper,
            buffer_capacity: config.helper.buffer_capacity,
            actions: config.actions,
            log_level: config.log.level.raised(cli.verbose),
        }
    }
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self::resolve(&Cli::parse_from(["fahlockd"]), Config::default())
    }
}

fn apply(control: &ControlClient, action: Action) -> fahlock_core::Result<()> {
    match action {
        Action::Pause => control.send(false),
        Action::Unpause => control.send(true),
        Action::Ignore => Ok(()),
    }
}

/// Run until the helper exits, the client hangs up or an I/O error occurs.
///
/// Never returns `Ok` in practice: both sources stay registered for the
/// whole run. Everything is torn down before the error is returned.
pub fn run_daemon(options: DaemonOptions) -> Result<()> {
    let reactor = Rc::new(Reactor::new().context("Failed to create event loop")?);

    let mut control = ControlClient::connect_to(&reactor, options.control_addr)
        .with_context(|| {
            format!("Failed to connect to Folding@Home at {}", options.control_addr)
        })?;
    for &slot in &options.slots {
        control
            .add_slot(slot)
            .with_context(|| format!("Failed to select slot {}", slot))?;
    }
    let control = Rc::new(control);

    let watch = {
        let control = Rc::clone(&control);
        let actions = options.actions.clone();
        ScreenWatch::start(
            &reactor,
            &options.helper,
            options.buffer_capacity,
            move |active| {
                let action = if active {
                    actions.on_activate
                } else {
                    actions.on_deactivate
                };
                log_daemon_debug!(
                    "Applying action",
                    active = active,
                    action = tracing::field::debug(action)
                );
                apply(&control, action)
            },
        )
        .with_context(|| {
            format!("Failed to start screen saver helper {:?}", options.helper.program)
        })?
    };

    log_daemon_info!(
        "fahlockd running",
        control = tracing::field::display(options.control_addr),
        helper = options.helper.program.as_str(),
        pid = watch.helper_id()
    );

    let result = reactor.run();
    if let Err(e) = &result {
        log_daemon_error!("Event loop stopped", error = tracing::field::display(e));
    }

    watch.stop();
    drop(control);
    result.context("fahlockd stopped")
}
