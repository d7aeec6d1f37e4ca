//! Well-known filesystem locations the daemon touches, grounded in the
//! path constants of `poe_common.py` (`POED_PID_PATH`, `POED_BUSY_FLAG`,
//! `POE_ACCESS_LOCK`, `POED_RUNTIME_CFG_PATH`, `POED_PERM_CFG_PATH`,
//! `POE_IPC_EVT`). Bundled into one record so tests can point every path
//! at a temp directory instead of the real `/run` and `/etc`.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Paths {
    pub pid_file: PathBuf,
    pub busy_flag: PathBuf,
    pub lock_file: PathBuf,
    pub runtime_cfg: PathBuf,
    pub permanent_cfg: PathBuf,
    pub ipc_fifo: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Paths {
            pid_file: PathBuf::from("/run/poed.pid"),
            busy_flag: PathBuf::from("/run/.poed_busy"),
            lock_file: PathBuf::from("/run/poe_access.lock"),
            runtime_cfg: PathBuf::from("/run/poe_runtime_cfg.json"),
            permanent_cfg: PathBuf::from("/etc/poe_agent/poe_perm_cfg.json"),
            ipc_fifo: PathBuf::from("/run/poe_ipc_event"),
        }
    }
}

pub fn touch(path: &Path) -> std::io::Result<()> {
    std::fs::OpenOptions::new().create(true).write(true).open(path)?;
    Ok(())
}

pub fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
