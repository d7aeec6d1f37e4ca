//! Daemon boot sequence: BOOT → DETECT_WARM → INIT → {RESTORE | SEED |
//! FAILSAFE} → RUN (spec.md §4.I), grounded byte-for-byte in
//! `poed.py::main()`.

use std::path::Path;

use chrono::Local;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{info, warn};

use poe_proto::config::{
    format_timestamp, ConfigDocument, ConfigStore, GeneralInformation, PortConfigEntry,
    SystemInformation, Timestamp, ValidationContext, AGENT_VERSION, CONFIG_VERSION,
};
use poe_proto::driver::ChipDriver;
use poe_proto::lock::ProcessLock;
use poe_proto::platform::PlatformDescriptor;
use poe_proto::view::{PortOps, PortParams, SystemOps};
use poe_proto::{PoeError, PoeResult};

use crate::paths::Paths;
use crate::state::{AgentState, SharedState};

/// Reads a prior PID file and checks whether that process is still alive
/// via a null signal, matching `get_prev_pid`/`is_still_alive` in
/// `poed.py::main`. A live process still holding the PID file means a
/// daemon is already running: this returns `Err(PoeError::AlreadyRunning)`
/// so the caller exits instead of running two instances concurrently
/// (§4.I DETECT_WARM singleton invariant). Otherwise this is a warm boot
/// (`Ok(true)`) iff the PID file existed and named a now-dead process; a
/// missing or unparseable file is a cold boot (`Ok(false)`), matching the
/// original's bare `except: is_warm_boot = False`.
pub fn detect_warm_boot(pid_file: &Path) -> PoeResult<bool> {
    let prev = match std::fs::read_to_string(pid_file).ok().and_then(|s| s.trim().parse::<i32>().ok()) {
        Some(pid) => pid,
        None => return Ok(false),
    };
    if kill(Pid::from_raw(prev), None).is_ok() {
        return Err(PoeError::AlreadyRunning(prev));
    }
    Ok(true)
}

pub fn save_current_pid(pid_file: &Path) -> std::io::Result<()> {
    std::fs::write(pid_file, std::process::id().to_string())
}

fn validation_ctx(platform: &str) -> ValidationContext {
    ValidationContext {
        platform: platform.to_string(),
        poe_agent_version: AGENT_VERSION.to_string(),
        poe_config_version: CONFIG_VERSION.to_string(),
    }
}

/// Snapshots every port and the system view into a document ready to
/// hand to `ConfigStore::save`, grounded in `collect_running_state`.
pub fn collect_running_state(
    driver: &ChipDriver,
    platform: &'static PlatformDescriptor,
    state: &SharedState,
) -> PoeResult<ConfigDocument> {
    let system = SystemOps { driver, platform };
    let sys_view = system.current_status()?;

    let mut ports_configurations = Vec::with_capacity(platform.total_poe_port as usize);
    for port_id in 0..platform.total_poe_port {
        let ops = PortOps { driver, platform, port_id };
        let view = ops.current_status()?;
        ports_configurations.push(PortConfigEntry {
            port_id: port_id + 1,
            en_dis: view.enabled,
            priority: view.priority.to_byte(),
            power_limit: view.power_limit_mw,
        });
    }

    let now = Local::now().naive_local();
    Ok(ConfigDocument {
        general_information: GeneralInformation {
            platform: platform.name.to_string(),
            poe_agent_version: AGENT_VERSION.to_string(),
            poe_config_version: CONFIG_VERSION.to_string(),
            file_serial_number: state.next_cfg_serial_num(),
        },
        timestamp: Timestamp {
            file_save_time: format_timestamp(now),
            last_poe_set_time: state.last_poe_set_time_string(),
        },
        system_information: SystemInformation {
            power_bank: sys_view.power_bank,
            power_source: sys_view.power_source,
            total_power_w: sys_view.total_power_w,
        },
        ports_configurations,
    })
}

/// Applies every stored port's settings to the chip, set-only-if-different
/// (`flush_settings_to_chip`). Returns `Ok(false)` on a clean read with no
/// write failures but does not itself retry — retry-on-exception is the
/// caller's `cfg_load_retry` loop (spec.md §4.I RESTORE retry).
pub fn flush_settings_to_chip(
    driver: &ChipDriver,
    platform: &'static PlatformDescriptor,
    doc: &ConfigDocument,
) -> PoeResult<()> {
    for entry in &doc.ports_configurations {
        let port_id = entry.port_id - 1;
        let ops = PortOps { driver, platform, port_id };
        let priority = poe_proto::dialect::Priority::from_byte(entry.priority)?;
        ops.set_all_params(&PortParams {
            enabled: Some(entry.en_dis),
            power_limit_mw: Some(entry.power_limit),
            priority: Some(priority),
        })?;
    }
    Ok(())
}

/// Retries `flush_settings_to_chip` up to `retries` times, 1s apart,
/// matching `load_poe_cfg`'s `cfg_load_retry` loop. The store is first
/// re-validated (`is_valid`) on every attempt since the document may be
/// the result of a fresh load.
pub fn load_poe_cfg(
    driver: &ChipDriver,
    platform: &'static PlatformDescriptor,
    store: &ConfigStore,
    retries: u32,
) -> bool {
    for attempt in 0..retries {
        match store.load() {
            Ok(doc) => {
                if doc.validate(&validation_ctx(platform.name)).is_err() {
                    warn!("invalid cfg data to load, attempt {attempt}");
                } else if flush_settings_to_chip(driver, platform, &doc).is_ok() {
                    return true;
                }
            }
            Err(e) => warn!(error = %e, attempt, "failed to load cfg"),
        }
        std::thread::sleep(std::time::Duration::from_secs(1));
    }
    false
}

/// `failsafe_mode`: disables every port and marks the shared state, used
/// whenever init or restore can't be trusted to leave the chip safe.
pub fn failsafe_mode(driver: &ChipDriver, platform: &'static PlatformDescriptor, state: &SharedState) {
    warn!("entering fail-safe mode, disabling every port");
    state.set_failsafe(true);
    for port_id in 0..platform.total_poe_port {
        let ops = PortOps { driver, platform, port_id };
        if let Err(e) = ops.set_enabled(false) {
            warn!(port_id, error = %e, "failed to disable port while entering fail-safe mode");
        }
    }
}

pub struct BootOutcome {
    pub runtime_cfg: ConfigStore,
    pub permanent_cfg: ConfigStore,
}

/// Runs the full INIT → {RESTORE|SEED|FAILSAFE} sequence for a supported
/// platform, matching `poed.py::main`'s body after `pa.plat_supported`.
pub fn boot_supported_platform(
    driver: &ChipDriver,
    platform: &'static PlatformDescriptor,
    paths: &Paths,
    lock: &ProcessLock,
    state: &SharedState,
    is_warm_boot: bool,
    cfg_load_retry: u32,
) -> PoeResult<BootOutcome> {
    let runtime_cfg = ConfigStore::new(&paths.runtime_cfg);
    let permanent_cfg = ConfigStore::new(&paths.permanent_cfg);
    let ctx = validation_ctx(platform.name);

    let use_runtime = is_warm_boot && runtime_cfg.is_valid(&ctx);
    let source_path = if use_runtime { runtime_cfg.path() } else { permanent_cfg.path() };
    info!(path = %source_path.display(), "configuring PoE ports");

    let source_valid = if use_runtime { true } else { permanent_cfg.is_valid(&ctx) };

    if source_valid {
        let _guard = lock.acquire()?;
        let init_ok = platform.init_poe(driver, false).is_ok();

        if init_ok {
            info!("platform PoE settings initialized");
            let source = if use_runtime { &runtime_cfg } else { &permanent_cfg };
            if load_poe_cfg(driver, platform, source, cfg_load_retry) {
                info!(path = %source.path().display(), "restored port configurations");
            } else {
                warn!(path = %source.path().display(), "failed to restore port configurations");
                failsafe_mode(driver, platform, state);
                state.set_agent_state(AgentState::UncleanStart);
            }
        } else {
            warn!("failed to initialize platform PoE settings");
            state.set_agent_state(AgentState::UncleanStart);
            failsafe_mode(driver, platform, state);
        }
        drop(_guard);
    } else {
        let _guard = lock.acquire()?;
        let init_ok = platform.init_poe(driver, true).is_ok();

        if init_ok {
            info!("platform PoE settings initialized with defaults");
            if !runtime_cfg.exists() {
                info!(path = %runtime_cfg.path().display(), "reconstructing runtime config from chip state");
                match collect_running_state(driver, platform, state) {
                    Ok(doc) => {
                        if runtime_cfg.save(&doc, &ctx).is_ok() {
                            state.record_cfg_serial_num(doc.general_information.file_serial_number);
                            info!("runtime config reconstructed");
                            if !permanent_cfg.exists() || !permanent_cfg.is_valid(&ctx) {
                                match runtime_cfg.copy_to(permanent_cfg.path()) {
                                    Ok(()) => info!(path = %permanent_cfg.path().display(), "seeded permanent config from runtime"),
                                    Err(e) => warn!(error = %e, "failed to seed permanent config from runtime"),
                                }
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to collect running state for reconstruction"),
                }
            } else {
                warn!(path = %runtime_cfg.path().display(), "runtime config broken");
                state.set_agent_state(AgentState::UncleanStart);
                failsafe_mode(driver, platform, state);
            }
        } else {
            warn!("failed to initialize platform PoE settings");
            state.set_agent_state(AgentState::UncleanStart);
            failsafe_mode(driver, platform, state);
        }
        drop(_guard);
    }

    Ok(BootOutcome { runtime_cfg, permanent_cfg })
}
