//! Persisted configuration documents (spec.md §3/4.H): the JSON snapshot
//! of port/system state that survives a reboot. Grounded in `PoeConfig`
//! (`poed.py`) — `is_valid_gen_info`/`is_valid_timestamp`/`is_valid_data`
//! become [`ConfigDocument::validate`], and `PoeConfig.save`/`load`
//! become [`ConfigStore::save`]/[`ConfigStore::load`].

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{PoeError, PoeResult};

/// This build's agent/config versions, written into every saved document
/// and checked against on load (`POE_AGENT_VERSION`/`POE_CONFIG_VERSION`
/// in `poe_version.py`). Only the major component is compared.
pub const AGENT_VERSION: &str = "1.9.3";
pub const CONFIG_VERSION: &str = "1.4.0";

pub const TIME_FMT: &str = "%Y/%m/%d %H:%M:%S";

/// The epoch sentinel the original ships as every timestamp's initial
/// value (`PoeAgent.UNIX_START_TIME`), used before any real save/set has
/// happened yet.
pub const UNIX_START_TIME: &str = "1970/01/01 00:00:00";

pub fn format_timestamp(dt: NaiveDateTime) -> String {
    dt.format(TIME_FMT).to_string()
}

pub fn parse_timestamp(s: &str) -> PoeResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIME_FMT)
        .map_err(|e| PoeError::ConfigCorrupt(format!("bad timestamp '{s}': {e}")))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneralInformation {
    pub platform: String,
    pub poe_agent_version: String,
    pub poe_config_version: String,
    pub file_serial_number: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timestamp {
    pub file_save_time: String,
    pub last_poe_set_time: String,
}

/// System-wide fields mirrored into the config document, a trimmed copy
/// of [`crate::view::SystemView`] (only what's needed to reconstruct the
/// running bank/PSU choice on restore, not the full diagnostic payload).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemInformation {
    pub power_bank: u8,
    pub power_source: String,
    pub total_power_w: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortConfigEntry {
    /// 1-based, matching the external port numbering in spec.md §4.G.
    pub port_id: u8,
    #[serde(rename = "enDis")]
    pub en_dis: bool,
    pub priority: u8,
    pub power_limit: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigDocument {
    #[serde(rename = "GENERAL_INFORMATION")]
    pub general_information: GeneralInformation,
    #[serde(rename = "TIMESTAMP")]
    pub timestamp: Timestamp,
    #[serde(rename = "SYSTEM_INFORMATION")]
    pub system_information: SystemInformation,
    #[serde(rename = "PORTS_CONFIGURATIONS")]
    pub ports_configurations: Vec<PortConfigEntry>,
}

/// What the locally-running agent considers "itself", used to decide
/// whether a loaded document still applies (spec.md §3 invariants).
#[derive(Debug, Clone)]
pub struct ValidationContext {
    pub platform: String,
    pub poe_agent_version: String,
    pub poe_config_version: String,
}

fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

impl ConfigDocument {
    /// §3: platform match, agent/config major-version match, and
    /// `file_save_time >= last_poe_set_time` (strict monotonic ordering
    /// between the two timestamps within the file).
    pub fn validate(&self, ctx: &ValidationContext) -> PoeResult<()> {
        if self.general_information.platform != ctx.platform {
            return Err(PoeError::ConfigCorrupt(format!(
                "platform mismatch: file has '{}', running on '{}'",
                self.general_information.platform, ctx.platform
            )));
        }
        if major(&self.general_information.poe_agent_version) != major(&ctx.poe_agent_version) {
            return Err(PoeError::ConfigCorrupt(format!(
                "agent version major mismatch: file {}, running {}",
                self.general_information.poe_agent_version, ctx.poe_agent_version
            )));
        }
        if major(&self.general_information.poe_config_version) != major(&ctx.poe_config_version) {
            return Err(PoeError::ConfigCorrupt(format!(
                "config version major mismatch: file {}, running {}",
                self.general_information.poe_config_version, ctx.poe_config_version
            )));
        }

        let save_time = parse_timestamp(&self.timestamp.file_save_time)?;
        let set_time = parse_timestamp(&self.timestamp.last_poe_set_time)?;
        if save_time < set_time {
            return Err(PoeError::ConfigCorrupt(format!(
                "file_save_time ({}) precedes last_poe_set_time ({})",
                self.timestamp.file_save_time, self.timestamp.last_poe_set_time
            )));
        }
        Ok(())
    }
}

/// A single JSON document on disk, either the *runtime* (tmpfs,
/// autosave target) or *permanent* (`/etc`, explicit-save target) copy
/// of spec.md §3. Both are instances of the same store, distinguished
/// only by their path.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ConfigStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads and parses the document. A JSON parse failure is reported
    /// as `ConfigCorrupt`, matching `PoeConfig.load`'s `RuntimeError`.
    pub fn load(&self) -> PoeResult<ConfigDocument> {
        let raw = fs::read_to_string(&self.path)
            .map_err(|e| PoeError::ConfigCorrupt(format!("read {}: {e}", self.path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| PoeError::ConfigCorrupt(format!("parse {}: {e}", self.path.display())))
    }

    /// `exists() && load().is_ok() && validate().is_ok()`, matching
    /// `PoeConfig.is_valid`.
    pub fn is_valid(&self, ctx: &ValidationContext) -> bool {
        self.exists() && matches!(self.load(), Ok(doc) if doc.validate(ctx).is_ok())
    }

    /// Validates before writing and writes atomically (full buffer to a
    /// sibling temp file, then rename) so a malformed document never
    /// clobbers a previously-valid one on disk (spec.md §4.H failure
    /// semantics).
    pub fn save(&self, doc: &ConfigDocument, ctx: &ValidationContext) -> PoeResult<()> {
        doc.validate(ctx)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| PoeError::Internal(format!("create_dir_all {}: {e}", parent.display())))?;
        }
        let json = serde_json::to_string_pretty(doc)
            .map_err(|e| PoeError::Internal(format!("serialize config: {e}")))?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .map_err(|e| PoeError::Internal(format!("write {}: {e}", tmp_path.display())))?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|e| PoeError::Internal(format!("rename to {}: {e}", self.path.display())))?;
        Ok(())
    }

    /// Copies this store's file verbatim to `dest` (the explicit
    /// `poecli_cfg,save[,path]` flow, or the SEED state's runtime→
    /// permanent bootstrap copy). Only valid documents should be copied;
    /// the caller is responsible for checking `is_valid` first.
    pub fn copy_to(&self, dest: &Path) -> PoeResult<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| PoeError::Internal(format!("create_dir_all {}: {e}", parent.display())))?;
        }
        fs::copy(&self.path, dest)
            .map_err(|e| PoeError::Internal(format!("copy {} -> {}: {e}", self.path.display(), dest.display())))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ValidationContext {
        ValidationContext {
            platform: "accton-as4224-52p-r0".into(),
            poe_agent_version: "1.2.0".into(),
            poe_config_version: "1.0.0".into(),
        }
    }

    fn valid_doc() -> ConfigDocument {
        ConfigDocument {
            general_information: GeneralInformation {
                platform: "accton-as4224-52p-r0".into(),
                poe_agent_version: "1.9.3".into(),
                poe_config_version: "1.4.0".into(),
                file_serial_number: 1,
            },
            timestamp: Timestamp {
                file_save_time: "2026/01/02 10:00:00".into(),
                last_poe_set_time: "2026/01/02 09:00:00".into(),
            },
            system_information: SystemInformation::default(),
            ports_configurations: vec![],
        }
    }

    #[test]
    fn validate_rejects_platform_mismatch() {
        let mut doc = valid_doc();
        doc.general_information.platform = "other-platform".into();
        assert!(doc.validate(&ctx()).is_err());
    }

    #[test]
    fn validate_rejects_major_version_mismatch() {
        let mut doc = valid_doc();
        doc.general_information.poe_agent_version = "2.0.0".into();
        assert!(doc.validate(&ctx()).is_err());
    }

    #[test]
    fn validate_rejects_out_of_order_timestamps() {
        let mut doc = valid_doc();
        doc.timestamp.file_save_time = "2026/01/02 08:00:00".into();
        doc.timestamp.last_poe_set_time = "2026/01/02 09:00:00".into();
        assert!(doc.validate(&ctx()).is_err());
    }

    #[test]
    fn validate_accepts_well_formed_doc() {
        assert!(valid_doc().validate(&ctx()).is_ok());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("cfg.json"));
        let doc = valid_doc();
        store.save(&doc, &ctx()).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn save_rejects_invalid_doc_without_touching_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("cfg.json"));
        store.save(&valid_doc(), &ctx()).unwrap();

        let mut bad = valid_doc();
        bad.general_information.platform = "wrong".into();
        assert!(store.save(&bad, &ctx()).is_err());

        // The file on disk must still be the last *valid* document.
        let loaded = store.load().unwrap();
        assert_eq!(loaded, valid_doc());
    }

    #[test]
    fn load_reports_corrupt_on_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(&path, "{ not json").unwrap();
        let store = ConfigStore::new(path);
        assert!(matches!(store.load(), Err(PoeError::ConfigCorrupt(_))));
    }

    #[test]
    fn is_valid_false_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("missing.json"));
        assert!(!store.is_valid(&ctx()));
    }
}
