//! Control task binary and real-time entry point for the drill-machine station.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use drillctl_common::config::{ConfigLoader, DrillConfig};
use drillctl_common::consts::{CYCLE_TIME_US_DEFAULT, DEFAULT_CONFIG_PATH};
use drillctl_core::coordinator::Coordinator;
use drillctl_core::runtime::CycleRunner;
use drillctl_hal::{register_all_backends, GpioRegistry};
use tracing::{error, info};

/// Real-time control core for a two-axis stepper drilling station.
#[derive(Debug, Parser)]
#[command(name = "drillctl", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the GPIO backend named in the config file ("fake", "http-sim", "hardware").
    #[arg(long)]
    gpio_backend: Option<String>,

    /// Index of the drilling recipe (mode) to run, 0-based.
    #[arg(long, default_value_t = 0)]
    recipe: usize,

    /// CPU core to pin the real-time loop to (only used with the `rt` feature).
    #[arg(long, default_value_t = 0)]
    rt_cpu_core: usize,

    /// SCHED_FIFO priority for the real-time loop (only used with the `rt` feature).
    #[arg(long, default_value_t = 80)]
    rt_priority: i32,
}

fn install_shutdown_handler() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    unsafe {
        RUNNING_FLAG = Some(flag);
        let handler = nix::sys::signal::SigHandler::Handler(handle_shutdown_signal);
        let action = nix::sys::signal::SigAction::new(
            handler,
            nix::sys::signal::SaFlags::empty(),
            nix::sys::signal::SigSet::empty(),
        );
        let _ = nix::sys::signal::sigaction(nix::sys::signal::Signal::SIGINT, &action);
        let _ = nix::sys::signal::sigaction(nix::sys::signal::Signal::SIGTERM, &action);
    }
    running
}

// A signal handler can only touch async-signal-safe state; a static flag set
// through this indirection is the simplest such state available.
static mut RUNNING_FLAG: Option<Arc<AtomicBool>> = None;

extern "C" fn handle_shutdown_signal(_signum: i32) {
    // SAFETY: only ever written once, before the handler is installed.
    unsafe {
        if let Some(flag) = (*std::ptr::addr_of!(RUNNING_FLAG)).as_ref() {
            flag.store(false, Ordering::SeqCst);
        }
    }
}

fn run() -> Result<(), drillctl_core::error::CoreError> {
    let cli = Cli::parse();

    let mut config = DrillConfig::load(&cli.config)?;
    if let Some(backend) = cli.gpio_backend {
        config.gpio_backend = backend;
    }
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(config.log_level.as_filter_str())
        .init();

    info!(backend = %config.gpio_backend, recipe = cli.recipe, "drillctl starting");

    let mut registry = GpioRegistry::default();
    register_all_backends(&mut registry);
    let mut gpio = registry.create(&config.gpio_backend)?;

    let coordinator = Coordinator::new(&config, cli.recipe)?;
    let mut runner = CycleRunner::new(coordinator, CYCLE_TIME_US_DEFAULT);

    #[cfg(feature = "rt")]
    drillctl_core::runtime::rt_setup(cli.rt_cpu_core, cli.rt_priority)?;
    #[cfg(not(feature = "rt"))]
    let _ = (cli.rt_cpu_core, cli.rt_priority);

    let running = install_shutdown_handler();
    runner.run(gpio.as_mut(), || running.load(Ordering::SeqCst))?;

    info!("drillctl shutting down cleanly");
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "drillctl exiting on error");
            ExitCode::FAILURE
        }
    }
}
