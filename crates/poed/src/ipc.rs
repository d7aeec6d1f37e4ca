//! IPC event loop: a named FIFO at `POE_IPC_EVT` carrying comma-separated
//! tokens from `poecli`, grounded in `poed.py::main`'s read loop and
//! `create_poe_set_ipc`. FIFO reads are blocking kernel I/O, so the read
//! side runs on a blocking thread (`spawn_blocking`) rather than forcing
//! a raw-fd/mio integration just for this one pipe.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use poe_proto::config::{ConfigStore, ValidationContext};
use poe_proto::driver::ChipDriver;
use poe_proto::lock::ProcessLock;
use poe_proto::platform::PlatformDescriptor;

use crate::autosave::CFG_UPDATE_INTVL_RT;
use crate::lifecycle::load_poe_cfg;
use crate::shutdown::Shutdown;
use crate::state::SharedState;

pub const POECLI_SET: &str = "poecli_set";
pub const POECLI_CFG: &str = "poecli_cfg";
pub const SAVE_ACTION: &str = "save";
pub const LOAD_ACTION: &str = "load";
pub const CFG_LOAD_RETRY: u32 = 3;

/// `create_poe_set_ipc`: creates the named pipe, tolerating "already
/// exists" the same way the original swallows `EEXIST`.
pub fn create_fifo(path: &Path) -> std::io::Result<()> {
    match nix::unistd::mkfifo(path, nix::sys::stat::Mode::from_bits_truncate(0o622)) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::EEXIST) => Ok(()),
        Err(e) => Err(std::io::Error::from(e)),
    }
}

/// Reads one message off the FIFO, blocking until a writer opens it.
/// A FIFO read returns `Ok("")` (EOF) once every writer closes; the
/// caller just loops back around and reopens, matching the original's
/// per-message `with open(...) as f: f.read()`.
fn read_one(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut buf = String::new();
    file.read_to_string(&mut buf)?;
    Ok(buf)
}

pub async fn run(
    fifo_path: PathBuf,
    driver: Arc<ChipDriver>,
    platform: &'static PlatformDescriptor,
    runtime_cfg: Arc<ConfigStore>,
    permanent_cfg: Arc<ConfigStore>,
    ctx: ValidationContext,
    state: Arc<SharedState>,
    lock: Arc<ProcessLock>,
    mut shutdown: Shutdown,
) {
    info!(path = %fifo_path.display(), "starting IPC event loop");

    loop {
        let path = fifo_path.clone();
        let read = tokio::task::spawn_blocking(move || read_one(&path));

        let raw = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("IPC event loop shutting down");
                return;
            }
            result = read => match result {
                Ok(Ok(raw)) => raw,
                Ok(Err(e)) => {
                    warn!(error = %e, "failed to read IPC event");
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "IPC read task panicked");
                    continue;
                }
            },
        };

        let tokens: Vec<&str> = raw.split(',').collect();
        let Some(&first) = tokens.first() else { continue };

        if first == POECLI_SET {
            state.mark_set_time();
            info!("received a set event from poecli");
            state.expedite_next_autosave(CFG_UPDATE_INTVL_RT);
        } else if first == POECLI_CFG {
            let action = tokens.get(1).copied().unwrap_or("");
            let file = tokens.get(2).copied();
            info!(action, file, "received a cfg event from poecli");

            if action == SAVE_ACTION {
                match file {
                    None => {
                        if runtime_cfg.is_valid(&ctx) {
                            if let Err(e) = runtime_cfg.copy_to(permanent_cfg.path()) {
                                warn!(error = %e, "failed to save runtime setting to persistent file");
                            } else {
                                info!("saved runtime setting to persistent file");
                            }
                        }
                    }
                    Some(dest) => {
                        if let Err(e) = runtime_cfg.copy_to(Path::new(dest)) {
                            warn!(error = %e, dest, "failed to save runtime setting to requested path");
                        } else {
                            info!(dest, "saved runtime setting to requested path");
                        }
                    }
                }
            } else if action == LOAD_ACTION {
                let driver = Arc::clone(&driver);
                let permanent_cfg = Arc::clone(&permanent_cfg);
                let state2 = Arc::clone(&state);
                let lock = Arc::clone(&lock);
                let file_owned = file.map(str::to_string);
                let result = tokio::task::spawn_blocking(move || {
                    let _guard = match lock.acquire() {
                        Ok(guard) => guard,
                        Err(e) => {
                            warn!(error = %e, "failed to acquire chip access lock for cfg load");
                            return false;
                        }
                    };
                    match file_owned {
                        None => load_poe_cfg(&driver, platform, &permanent_cfg, CFG_LOAD_RETRY),
                        Some(path) => {
                            let temp_cfg = ConfigStore::new(path);
                            load_poe_cfg(&driver, platform, &temp_cfg, CFG_LOAD_RETRY)
                        }
                    }
                })
                .await
                .unwrap_or(false);

                if result {
                    state2.mark_set_time();
                }
            }
        } else {
            info!(token = first, "received unrecognized IPC token, skipped");
        }
    }
}
