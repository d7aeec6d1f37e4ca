//! Autosave worker task, grounded in `PoeAgent.autosave_main` (`poed.py`):
//! a 1-second poll tick that snapshots running state to the runtime
//! config every `cfg_update_intvl_rt` ticks, skipping the write while
//! the agent is in fail-safe mode. Runs as a cooperating `tokio` task
//! cancelled via a `watch` channel rather than the original's global
//! `thread_flag` boolean (spec.md §9: a typed cancellation signal
//! instead of a mutable module-level flag).

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use poe_proto::config::{ConfigStore, ValidationContext};
use poe_proto::driver::ChipDriver;
use poe_proto::lock::ProcessLock;
use poe_proto::platform::PlatformDescriptor;
use poe_proto::view::SystemOps;

use crate::lifecycle::collect_running_state;
use crate::shutdown::Shutdown;
use crate::state::SharedState;

pub const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(1);
pub const CFG_UPDATE_INTVL_RT: u32 = 4;

pub async fn run(
    driver: Arc<ChipDriver>,
    platform: &'static PlatformDescriptor,
    runtime_cfg: Arc<ConfigStore>,
    ctx: ValidationContext,
    state: Arc<SharedState>,
    lock: Arc<ProcessLock>,
    mut shutdown: Shutdown,
) {
    info!("starting autosave task");
    state.set_rt_counter(0);
    let mut fail_counter: u32 = 0;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("autosave task shutting down");
                return;
            }
            _ = tokio::time::sleep(AUTOSAVE_INTERVAL) => {}
        }

        let tick = async {
            if state.rt_counter() >= CFG_UPDATE_INTVL_RT {
                let driver = Arc::clone(&driver);
                let runtime_cfg = Arc::clone(&runtime_cfg);
                let state = Arc::clone(&state);
                let ctx = ctx.clone();
                let lock = Arc::clone(&lock);
                let result = tokio::task::spawn_blocking(move || -> Result<bool, String> {
                    let _guard = lock.acquire().map_err(|e| e.to_string())?;

                    // Cheap system-only read to decide whether anything has
                    // changed since the last snapshot before paying for a
                    // full per-port re-read.
                    let system = SystemOps { driver: &driver, platform };
                    let sys_view = system.current_status().map_err(|e| e.to_string())?;
                    let psu_event = state.take_psu_event(sys_view.power_bank);
                    let set_event = state.take_set_event();
                    if !psu_event && !set_event {
                        return Ok(false);
                    }

                    let doc = collect_running_state(&driver, platform, &state).map_err(|e| e.to_string())?;
                    if state.is_failsafe() {
                        return Err("agent in fail-safe mode, stop saving runtime cfg".to_string());
                    }
                    runtime_cfg.save(&doc, &ctx).map_err(|e| e.to_string())?;
                    state.record_cfg_serial_num(doc.general_information.file_serial_number);
                    Ok(true)
                })
                .await;

                match result {
                    Ok(Ok(saved)) => {
                        if saved {
                            state.set_rt_counter(0);
                        }
                    }
                    Ok(Err(msg)) => warn!(%msg, "autosave tick did not save"),
                    Err(e) => warn!(error = %e, "autosave tick task panicked"),
                }
            }
            state.increment_rt_counter(1);
        };

        if tokio::time::timeout(Duration::from_secs(10), tick).await.is_err() {
            fail_counter += 1;
            warn!(fail_counter, "autosave tick exceeded its time budget");
        }
    }
}
