//! Platform descriptors (spec.md §4.F). Each supported switch model is a
//! `PlatformDescriptor` value baked into a compile-time registry, replacing
//! the original agent's runtime `imp.load_source` plugin loading (spec.md
//! §9 REDESIGN FLAGS: dynamic module loading has no safe equivalent in a
//! statically-typed binary and buys nothing here since the supported
//! platform set is small and known at build time).

use crate::dialect::{wire, Dialect};
use crate::driver::ChipDriver;
use crate::error::{PoeError, PoeResult};

/// One entry of the logical-port -> physical-port wiring matrix. BT
/// platforms wired for 4-pair (PoE++) report a second physical port per
/// logical port; AF/AT platforms leave it at `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixEntry {
    pub logic_port: u8,
    pub phy_port_a: u8,
    pub phy_port_b: Option<u8>,
}

/// One power bank budget: `(bank id, power limit in watts)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerBank {
    pub bank: u8,
    pub power_limit_w: u16,
}

/// Static description of one switch model's PoE wiring and power envelope,
/// grounded in `PoePlatform_accton_as4224_52p.__init__` and `init_poe`.
#[derive(Debug, Clone)]
pub struct PlatformDescriptor {
    pub name: &'static str,
    pub i2c_bus: u8,
    pub i2c_addr: u16,
    pub total_poe_port: u8,
    pub dialect: Dialect,
    pub default_matrix: &'static [MatrixEntry],
    pub default_power_banks: &'static [PowerBank],
    pub max_shutdown_voltage: u16,
    pub min_shutdown_voltage: u16,
    pub guard_band: u8,
    pub port_power_limit_mw: u16,
}

impl PlatformDescriptor {
    /// Maps a power bank id to the PSU string shown to operators, per
    /// `bank_to_psu_str`. Unknown bank ids report `"None"` rather than
    /// erroring: this is a cosmetic label, not a protocol value.
    pub fn bank_to_psu_str(&self, bank: u8) -> &'static str {
        match bank {
            13 => "PSU2",
            14 => "PSU1",
            15 => "PSU1, PSU2",
            _ => "None",
        }
    }

    /// Compares the chip's *committed* matrix against the declared
    /// default for every logical port, grounded in
    /// `fast_temp_matrix_compare`: `phy_a` is always compared, `phy_b`
    /// only when this platform is wired 4-pair. A `true` result lets
    /// platform init skip matrix reprogramming entirely (spec.md §8
    /// item 10: "zero matrix writes and zero save-settings commands").
    pub fn matrix_matches(&self, driver: &ChipDriver) -> PoeResult<bool> {
        let four_pair = self.default_matrix.first().is_some_and(|e| e.phy_port_b.is_some());
        for entry in self.default_matrix {
            let active = driver.get_active_matrix(entry.logic_port)?;
            if active.phy_port_a != entry.phy_port_a {
                return Ok(false);
            }
            if four_pair && active.phy_port_b != entry.phy_port_b.unwrap_or(0xFF) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Stages the declared default matrix into the chip's temporary
    /// region for every logical port and commits it in one atomic
    /// "program active matrix" call (spec.md §3 matrix invariant: no
    /// partially-rewritten matrix is ever observable).
    pub fn program_default_matrix(&self, driver: &ChipDriver) -> PoeResult<()> {
        for entry in self.default_matrix {
            let phy_b = entry.phy_port_b.unwrap_or(0xFF);
            driver.set_temp_matrix(entry.logic_port, entry.phy_port_a, phy_b)?;
        }
        driver.program_active_matrix()
    }

    /// Applies this platform's declared port/system defaults: disable
    /// every port, program the power banks, set the uniform per-port
    /// power limit (AF/AT only), set the PM method, then re-enable every
    /// port. Grounded in `init_poe`'s post-matrix sequence; used only
    /// when no valid prior configuration exists to restore from instead
    /// (spec.md §4.E "If no prior valid config exists").
    pub fn apply_port_defaults(&self, driver: &ChipDriver) -> PoeResult<()> {
        for port_id in 0..self.total_poe_port {
            driver.set_port_en_dis(port_id, wire::DATA_CMD_DISABLE)?;
        }

        for bank in self.default_power_banks {
            driver.set_power_bank(
                bank.bank,
                bank.power_limit_w,
                self.max_shutdown_voltage,
                self.min_shutdown_voltage,
                self.guard_band,
            )?;
        }

        if driver.dialect() == Dialect::AfAt {
            for entry in self.default_matrix {
                driver.set_port_power_limit(entry.logic_port, self.port_power_limit_mw)?;
            }
        }

        driver.set_pm_method(wire::PM1_DYNAMIC, wire::PM2_PPL, wire::PM3_NO_COND)?;

        for port_id in 0..self.total_poe_port {
            driver.set_port_en_dis(port_id, wire::DATA_CMD_ENABLE)?;
        }

        Ok(())
    }

    /// Full cold-boot chip initialization sequence (spec.md §4.I INIT
    /// state): flush stale output, stage+commit the matrix unless it
    /// already matches (matrix-compare short-circuit), and — only when
    /// `apply_defaults` is set, i.e. no prior valid config exists —
    /// apply the port/system defaults. A matrix match with no defaults to
    /// apply performs zero save-settings commands too (spec.md §8 item 10).
    pub fn init_poe(&self, driver: &ChipDriver, apply_defaults: bool) -> PoeResult<()> {
        driver.flush_stale_reply();

        let matrix_matched = self.matrix_matches(driver)?;
        if !matrix_matched {
            self.program_default_matrix(driver)?;
        }

        if apply_defaults {
            self.apply_port_defaults(driver)?;
        }

        if !matrix_matched || apply_defaults {
            driver.save_system_settings()?;
        }

        Ok(())
    }
}

const fn entry(logic: u8, phy_a: u8) -> MatrixEntry {
    MatrixEntry { logic_port: logic, phy_port_a: phy_a, phy_port_b: None }
}

/// 48-port AF/AT platform, byte-exact with
/// `platforms/accton/as4224-52p-r0/poe_platform.py`.
pub static ACCTON_AS4224_52P: PlatformDescriptor = PlatformDescriptor {
    name: "accton-as4224-52p-r0",
    i2c_bus: 1,
    i2c_addr: 0x3C,
    total_poe_port: 48,
    dialect: Dialect::AfAt,
    default_matrix: &[
        entry(0, 7), entry(1, 4), entry(2, 5), entry(3, 6),
        entry(4, 0), entry(5, 1), entry(6, 2), entry(7, 3),
        entry(8, 12), entry(9, 13), entry(10, 14), entry(11, 15),
        entry(12, 9), entry(13, 10), entry(14, 11), entry(15, 8),
        entry(16, 20), entry(17, 21), entry(18, 22), entry(19, 23),
        entry(20, 17), entry(21, 18), entry(22, 19), entry(23, 16),
        entry(24, 28), entry(25, 29), entry(26, 30), entry(27, 31),
        entry(28, 27), entry(29, 26), entry(30, 25), entry(31, 24),
        entry(32, 39), entry(33, 36), entry(34, 37), entry(35, 38),
        entry(36, 32), entry(37, 33), entry(38, 34), entry(39, 35),
        entry(40, 47), entry(41, 44), entry(42, 45), entry(43, 46),
        entry(44, 40), entry(45, 41), entry(46, 42), entry(47, 43),
    ],
    default_power_banks: &[
        PowerBank { bank: 13, power_limit_w: 680 },
        PowerBank { bank: 14, power_limit_w: 680 },
        PowerBank { bank: 15, power_limit_w: 1500 },
    ],
    max_shutdown_voltage: 0x0239,
    min_shutdown_voltage: 0x01F5,
    guard_band: 0x01,
    port_power_limit_mw: 0x7530,
};

/// Synthetic 24-port BT (4-pair / PoE++) platform. No deployed original
/// ships one; this covers the 3-tuple matrix shape and BT-specific
/// setters that `ACCTON_AS4224_52P` cannot exercise (spec.md §4.F: "at
/// least one descriptor per dialect").
pub static GENERIC_24P_BT: PlatformDescriptor = PlatformDescriptor {
    name: "generic-24p-bt",
    i2c_bus: 0,
    i2c_addr: 0x3C,
    total_poe_port: 24,
    dialect: Dialect::Bt,
    default_matrix: &[
        MatrixEntry { logic_port: 0, phy_port_a: 0, phy_port_b: Some(1) },
        MatrixEntry { logic_port: 1, phy_port_a: 2, phy_port_b: Some(3) },
        MatrixEntry { logic_port: 2, phy_port_a: 4, phy_port_b: Some(5) },
        MatrixEntry { logic_port: 3, phy_port_a: 6, phy_port_b: Some(7) },
        MatrixEntry { logic_port: 4, phy_port_a: 8, phy_port_b: Some(9) },
        MatrixEntry { logic_port: 5, phy_port_a: 10, phy_port_b: Some(11) },
        MatrixEntry { logic_port: 6, phy_port_a: 12, phy_port_b: Some(13) },
        MatrixEntry { logic_port: 7, phy_port_a: 14, phy_port_b: Some(15) },
        MatrixEntry { logic_port: 8, phy_port_a: 16, phy_port_b: Some(17) },
        MatrixEntry { logic_port: 9, phy_port_a: 18, phy_port_b: Some(19) },
        MatrixEntry { logic_port: 10, phy_port_a: 20, phy_port_b: Some(21) },
        MatrixEntry { logic_port: 11, phy_port_a: 22, phy_port_b: Some(23) },
        MatrixEntry { logic_port: 12, phy_port_a: 24, phy_port_b: Some(25) },
        MatrixEntry { logic_port: 13, phy_port_a: 26, phy_port_b: Some(27) },
        MatrixEntry { logic_port: 14, phy_port_a: 28, phy_port_b: Some(29) },
        MatrixEntry { logic_port: 15, phy_port_a: 30, phy_port_b: Some(31) },
        MatrixEntry { logic_port: 16, phy_port_a: 32, phy_port_b: Some(33) },
        MatrixEntry { logic_port: 17, phy_port_a: 34, phy_port_b: Some(35) },
        MatrixEntry { logic_port: 18, phy_port_a: 36, phy_port_b: Some(37) },
        MatrixEntry { logic_port: 19, phy_port_a: 38, phy_port_b: Some(39) },
        MatrixEntry { logic_port: 20, phy_port_a: 40, phy_port_b: Some(41) },
        MatrixEntry { logic_port: 21, phy_port_a: 42, phy_port_b: Some(43) },
        MatrixEntry { logic_port: 22, phy_port_a: 44, phy_port_b: Some(45) },
        MatrixEntry { logic_port: 23, phy_port_a: 46, phy_port_b: Some(47) },
    ],
    default_power_banks: &[PowerBank { bank: 13, power_limit_w: 1200 }],
    max_shutdown_voltage: 0x0239,
    min_shutdown_voltage: 0x01F5,
    guard_band: 0x01,
    port_power_limit_mw: 0x1770,
};

/// All platform descriptors known at build time, keyed by the name
/// reported on `/proc/cmdline` (spec.md §4.I boot-mode detection).
pub static REGISTRY: &[&PlatformDescriptor] = &[&ACCTON_AS4224_52P, &GENERIC_24P_BT];

pub fn lookup(name: &str) -> PoeResult<&'static PlatformDescriptor> {
    REGISTRY
        .iter()
        .find(|p| p.name == name)
        .copied()
        .ok_or_else(|| PoeError::invalid_argument(format!("unknown platform '{name}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accton_matrix_covers_every_port_exactly_once() {
        let mut seen = [false; 48];
        for e in ACCTON_AS4224_52P.default_matrix {
            assert!(!seen[e.logic_port as usize], "duplicate logic port {}", e.logic_port);
            seen[e.logic_port as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn bank_to_psu_str_matches_known_mapping() {
        assert_eq!(ACCTON_AS4224_52P.bank_to_psu_str(13), "PSU2");
        assert_eq!(ACCTON_AS4224_52P.bank_to_psu_str(14), "PSU1");
        assert_eq!(ACCTON_AS4224_52P.bank_to_psu_str(15), "PSU1, PSU2");
        assert_eq!(ACCTON_AS4224_52P.bank_to_psu_str(1), "None");
    }

    #[test]
    fn lookup_rejects_unknown_platform() {
        assert!(lookup("nonexistent-platform").is_err());
        assert!(lookup("accton-as4224-52p-r0").is_ok());
    }

    use crate::driver::ChipDriver;
    use crate::engine::ProtocolEngine;
    use crate::frame::{Frame, Key, MSG_LEN, OFFSET_DATA5, OFFSET_DATA6, OFFSET_ECHO, OFFSET_KEY};
    use crate::transport::{BusTransport, MockBus};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn replyable(buf: &mut [u8; MSG_LEN], sent: &Frame, key: Key) {
        buf[OFFSET_KEY] = key.to_byte();
        buf[OFFSET_ECHO] = sent.echo();
        let csum = crate::frame::checksum(&buf[..crate::frame::OFFSET_CSUM_H]);
        buf[crate::frame::OFFSET_CSUM_H] = (csum >> 8) as u8;
        buf[crate::frame::OFFSET_CSUM_L] = (csum & 0xff) as u8;
    }

    #[test]
    fn matrix_matches_true_when_every_port_reports_declared_default() {
        let bus = MockBus::with_responder(|sent| {
            let logic_port = sent.as_bytes()[crate::frame::OFFSET_SUB2];
            let entry = ACCTON_AS4224_52P
                .default_matrix
                .iter()
                .find(|e| e.logic_port == logic_port)
                .unwrap();
            let mut buf = [crate::frame::MSG_PAD_BYTE; MSG_LEN];
            replyable(&mut buf, sent, Key::Telemetry);
            buf[OFFSET_DATA5] = entry.phy_port_a;
            buf[OFFSET_DATA6] = entry.phy_port_b.unwrap_or(0xFF);
            Frame(buf)
        });
        let engine = ProtocolEngine::new(BusTransport::new(Box::new(bus)));
        let driver = ChipDriver::with_dialect(engine, Dialect::AfAt);
        assert!(ACCTON_AS4224_52P.matrix_matches(&driver).unwrap());
    }

    #[test]
    fn matrix_matches_false_when_one_port_differs() {
        let bus = MockBus::with_responder(|sent| {
            let mut buf = [crate::frame::MSG_PAD_BYTE; MSG_LEN];
            replyable(&mut buf, sent, Key::Telemetry);
            buf[OFFSET_DATA5] = 0xAA;
            buf[OFFSET_DATA6] = 0xFF;
            Frame(buf)
        });
        let engine = ProtocolEngine::new(BusTransport::new(Box::new(bus)));
        let driver = ChipDriver::with_dialect(engine, Dialect::AfAt);
        assert!(!ACCTON_AS4224_52P.matrix_matches(&driver).unwrap());
    }

    #[test]
    fn init_poe_skips_matrix_and_save_when_matrix_already_matches() {
        let commands = Arc::new(AtomicU32::new(0));
        let commands2 = Arc::clone(&commands);
        let mut bus = MockBus::with_responder(move |sent| {
            let mut buf = [crate::frame::MSG_PAD_BYTE; MSG_LEN];
            if sent.key() == Key::Request.to_byte() {
                let logic_port = sent.as_bytes()[crate::frame::OFFSET_SUB2];
                let entry = ACCTON_AS4224_52P
                    .default_matrix
                    .iter()
                    .find(|e| e.logic_port == logic_port)
                    .unwrap();
                replyable(&mut buf, sent, Key::Telemetry);
                buf[OFFSET_DATA5] = entry.phy_port_a;
                buf[OFFSET_DATA6] = entry.phy_port_b.unwrap_or(0xFF);
            } else {
                commands2.fetch_add(1, Ordering::SeqCst);
                replyable(&mut buf, sent, Key::Report);
            }
            Frame(buf)
        });
        // `init_poe`'s leading flush reads without having written first.
        bus.queue_reply(Frame([crate::frame::MSG_PAD_BYTE; MSG_LEN]));
        let engine = ProtocolEngine::new(BusTransport::new(Box::new(bus)));
        let driver = ChipDriver::with_dialect(engine, Dialect::AfAt);

        ACCTON_AS4224_52P.init_poe(&driver, false).unwrap();

        // Only the stray-reply flush issues a non-Request transaction;
        // no set_temp_matrix / program_active_matrix / save_system_settings.
        assert_eq!(commands.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn init_poe_reprograms_and_saves_when_matrix_differs() {
        let commands = Arc::new(AtomicU32::new(0));
        let commands2 = Arc::clone(&commands);
        let mut bus = MockBus::with_responder(move |sent| {
            let mut buf = [crate::frame::MSG_PAD_BYTE; MSG_LEN];
            if sent.key() == Key::Request.to_byte() {
                replyable(&mut buf, sent, Key::Telemetry);
                buf[OFFSET_DATA5] = 0xAA;
                buf[OFFSET_DATA6] = 0xFF;
            } else {
                commands2.fetch_add(1, Ordering::SeqCst);
                replyable(&mut buf, sent, Key::Report);
            }
            Frame(buf)
        });
        bus.queue_reply(Frame([crate::frame::MSG_PAD_BYTE; MSG_LEN]));
        let engine = ProtocolEngine::new(BusTransport::new(Box::new(bus)));
        let driver = ChipDriver::with_dialect(engine, Dialect::AfAt);

        ACCTON_AS4224_52P.init_poe(&driver, false).unwrap();

        // 48 set_temp_matrix + 1 program_active_matrix + 1 save_system_settings.
        assert_eq!(commands.load(Ordering::SeqCst), 50);
    }
}
