//! PoE agent daemon entry point, grounded in `poed.py::main()`: detect a
//! warm or cold boot, bring the chip up under the matching sequence, then
//! hand off to the autosave and IPC background tasks until a signal asks
//! us to stop.

mod autosave;
mod bootparams;
mod ipc;
mod lifecycle;
mod paths;
mod shutdown;
mod state;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use poe_proto::config::ValidationContext;
use poe_proto::driver::ChipDriver;
use poe_proto::engine::ProtocolEngine;
use poe_proto::lock::ProcessLock;
use poe_proto::platform;
use poe_proto::transport::{BusTransport, LinuxI2cBus};
use poe_proto::PoeError;

use crate::paths::Paths;
use crate::state::SharedState;

const CFG_LOAD_RETRY: u32 = 3;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,poed=debug")))
        .init();

    info!("starting poed");
    info!(version = env!("CARGO_PKG_VERSION"), "agent version");

    if !nix::unistd::Uid::effective().is_root() {
        bail!("poed must run as root to access the PoE chip over I2C");
    }

    let paths = Paths::default();
    let state = Arc::new(SharedState::new());

    let is_warm_boot = match lifecycle::detect_warm_boot(&paths.pid_file) {
        Ok(warm) => warm,
        Err(PoeError::AlreadyRunning(pid)) => {
            error!(pid, "a previous poed instance is still alive, refusing to start a second one");
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("detecting warm boot"),
    };
    info!(is_warm_boot, "boot mode detected");
    lifecycle::save_current_pid(&paths.pid_file).context("saving pid file")?;

    let cmdline_path = std::path::Path::new("/proc/cmdline");
    let platform_name = bootparams::platform_model(cmdline_path);

    let platform = match platform_name.as_deref().map(platform::lookup) {
        Some(Ok(p)) => p,
        Some(Err(e)) => {
            warn!(error = %e, "unsupported platform named on the kernel command line, idling");
            return idle_forever().await;
        }
        None => {
            warn!("no onl_platform token found on the kernel command line, idling");
            return idle_forever().await;
        }
    };
    info!(platform = platform.name, "platform recognized");

    paths::touch(&paths.busy_flag).context("setting busy flag")?;

    let bus = LinuxI2cBus::open(platform.i2c_bus, platform.i2c_addr).context("opening I2C bus")?;
    let engine = ProtocolEngine::new(BusTransport::new(Box::new(bus)));
    let driver = Arc::new(ChipDriver::probe(engine).context("probing PD69200 controller")?);
    let lock = Arc::new(ProcessLock::new(&paths.lock_file));

    let outcome = lifecycle::boot_supported_platform(
        &driver,
        platform,
        &paths,
        &lock,
        &state,
        is_warm_boot,
        CFG_LOAD_RETRY,
    )
    .context("bringing up PoE platform")?;

    paths::remove_if_exists(&paths.busy_flag).context("clearing busy flag")?;
    info!(agent_state = ?state.agent_state(), "boot sequence complete, entering run state");

    ipc::create_fifo(&paths.ipc_fifo).context("creating IPC fifo")?;

    let ctx = ValidationContext {
        platform: platform.name.to_string(),
        poe_agent_version: poe_proto::config::AGENT_VERSION.to_string(),
        poe_config_version: poe_proto::config::CONFIG_VERSION.to_string(),
    };

    let (shutdown_handle, shutdown_a) = shutdown::channel();
    let shutdown_b = shutdown_a.clone();

    let runtime_cfg = Arc::new(outcome.runtime_cfg);
    let permanent_cfg = Arc::new(outcome.permanent_cfg);

    let autosave_task = tokio::spawn(autosave::run(
        Arc::clone(&driver),
        platform,
        Arc::clone(&runtime_cfg),
        ctx.clone(),
        Arc::clone(&state),
        Arc::clone(&lock),
        shutdown_a,
    ));

    let ipc_task = tokio::spawn(ipc::run(
        paths.ipc_fifo.clone(),
        Arc::clone(&driver),
        platform,
        Arc::clone(&runtime_cfg),
        Arc::clone(&permanent_cfg),
        ctx,
        Arc::clone(&state),
        Arc::clone(&lock),
        shutdown_b,
    ));

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = tokio::signal::ctrl_c() => info!("received ctrl-c, shutting down"),
    }

    shutdown_handle.cancel();
    let _ = tokio::join!(autosave_task, ipc_task);

    let _ = paths::remove_if_exists(&paths.pid_file);
    info!("poed stopped");
    Ok(())
}

/// The original's fallback for an unrecognized platform: stay alive,
/// touch nothing, and wait to be killed (`poed.py`'s trailing
/// `while thread_flag: time.sleep(1)` branch).
async fn idle_forever() -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
    error!("poed idling on an unsupported platform is now shutting down");
    Ok(())
}
