//! Chip driver (spec.md §4.E): one typed method per PD69200 operation,
//! built on top of the protocol engine. Dialect (AF/AT vs BT) is fixed at
//! construction time by probing `get_software_version`; callers never
//! branch on it themselves, the driver methods route internally.
//!
//! Grounded in `PoeDriver_microsemi_pd69200` (`poe_driver_pd69200.py`) and
//! its BT counterpart (`poe_driver_pd69200_bt.py`), which share the same
//! framing and retry behaviour and differ only in SUB/DATA byte layout.

use crate::dialect::{wire, Dialect};
use crate::engine::{ProtocolEngine, SettleClass};
use crate::error::{PoeError, PoeResult};
use crate::frame::Key;
use crate::parsers;

/// "AllChannels" logical port sentinel used by a handful of global sets.
pub const ALL_CHANNELS: u8 = 0x80;

pub struct ChipDriver {
    engine: ProtocolEngine,
    dialect: Dialect,
}

impl ChipDriver {
    /// Probes the chip's software version and fixes the dialect for the
    /// lifetime of this driver (spec.md §4.E: "selected once, not
    /// re-probed per call").
    pub fn probe(engine: ProtocolEngine) -> PoeResult<Self> {
        let version = {
            let reply = engine.run(
                Key::Request,
                &[wire::SUB_GLOBAL, wire::SUB1_VERSIONZ, wire::SUB2_SW_VERSION],
                SettleClass::Default,
            )?;
            parsers::parse_software_version(&reply)
        };
        let major = (version.sw_version / 100) as u32;
        let dialect = if major >= 3 { Dialect::Bt } else { Dialect::AfAt };
        Ok(ChipDriver { engine, dialect })
    }

    pub fn with_dialect(engine: ProtocolEngine, dialect: Dialect) -> Self {
        ChipDriver { engine, dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn reset_poe(&self) -> PoeResult<()> {
        self.engine.run(
            Key::Command,
            &[wire::SUB_GLOBAL, wire::SUB1_RESET, 0x00, wire::SUB1_RESET, 0x00, wire::SUB1_RESET],
            SettleClass::ResetChip,
        )?;
        Ok(())
    }

    pub fn restore_factory_default(&self) -> PoeResult<()> {
        self.engine.run(Key::Program, &[wire::SUB_RESTORE_FACT], SettleClass::RestoreFactoryDefault)?;
        Ok(())
    }

    pub fn save_system_settings(&self) -> PoeResult<()> {
        self.engine.run(Key::Program, &[wire::SUB_E2, wire::SUB1_SAVE_CONFIG], SettleClass::SaveSystemSettings)?;
        Ok(())
    }

    pub fn set_user_byte_to_save(&self, value: u8) -> PoeResult<()> {
        self.engine.run(Key::Program, &[wire::SUB_USER_BYTE, value], SettleClass::SaveSystemSettings)?;
        Ok(())
    }

    pub fn set_system_status(&self, priv_label: u8) -> PoeResult<()> {
        self.engine.run(Key::Command, &[wire::SUB_GLOBAL, wire::SUB1_SYSTEM_STATUS, priv_label], SettleClass::Default)?;
        Ok(())
    }

    pub fn get_system_status(&self) -> PoeResult<parsers::SystemStatus> {
        if self.dialect == Dialect::Bt {
            return Err(PoeError::unsupported("get_system_status: use get_bt_system_status in BT dialect"));
        }
        let reply = self.engine.run(Key::Request, &[wire::SUB_GLOBAL, wire::SUB1_SYSTEM_STATUS], SettleClass::Default)?;
        Ok(parsers::parse_system_status(&reply))
    }

    pub fn get_bt_system_status(&self) -> PoeResult<parsers::BtSystemStatus> {
        if self.dialect != Dialect::Bt {
            return Err(PoeError::unsupported("get_bt_system_status requires BT dialect"));
        }
        let reply = self.engine.run(Key::Request, &[wire::SUB_GLOBAL, wire::BT_SUB1_SYSTEM_STATUS], SettleClass::Default)?;
        Ok(parsers::parse_bt_system_status(&reply))
    }

    pub fn set_individual_mask(&self, mask_num: u8, en_dis: u8) -> PoeResult<()> {
        self.engine.run(Key::Command, &[wire::SUB_GLOBAL, wire::SUB1_INDV_MSK, mask_num, en_dis], SettleClass::Default)?;
        Ok(())
    }

    pub fn get_individual_mask(&self, mask_num: u8) -> PoeResult<parsers::IndividualMask> {
        let reply = self.engine.run(Key::Request, &[wire::SUB_GLOBAL, wire::SUB1_INDV_MSK, mask_num], SettleClass::Default)?;
        Ok(parsers::parse_individual_mask(&reply))
    }

    pub fn get_software_version(&self) -> PoeResult<parsers::SoftwareVersion> {
        let reply = self.engine.run(
            Key::Request,
            &[wire::SUB_GLOBAL, wire::SUB1_VERSIONZ, wire::SUB2_SW_VERSION],
            SettleClass::Default,
        )?;
        Ok(parsers::parse_software_version(&reply))
    }

    /// `prod.major.minor.patch`, matching `get_poe_versions`'s digit split
    /// of the packed software-version word.
    pub fn poe_versions_string(&self) -> PoeResult<String> {
        let v = self.get_software_version()?;
        let sw = v.sw_version as u32;
        Ok(format!("{}.{}.{}.{}", v.product_number, sw / 100, (sw / 10) % 10, sw % 10))
    }

    pub fn set_temp_matrix(&self, logic_port: u8, phy_port_a: u8, phy_port_b: u8) -> PoeResult<()> {
        self.engine.run(
            Key::Command,
            &[wire::SUB_CHANNEL, wire::SUB1_TEMP_MATRIX, logic_port, phy_port_a, phy_port_b],
            SettleClass::Default,
        )?;
        Ok(())
    }

    pub fn program_active_matrix(&self) -> PoeResult<()> {
        self.engine.run(Key::Command, &[wire::SUB_GLOBAL, wire::SUB1_TEMP_MATRIX], SettleClass::Default)?;
        Ok(())
    }

    /// Reads back the *committed* matrix entry for a logical port, used
    /// by the matrix-compare short-circuit ahead of platform init
    /// (`fast_temp_matrix_compare` in `poe_common.py`).
    pub fn get_active_matrix(&self, logic_port: u8) -> PoeResult<parsers::ActiveMatrixEntry> {
        let reply = self.engine.run(Key::Request, &[wire::SUB_CHANNEL, wire::SUB1_CH_MATRIX, logic_port], SettleClass::Default)?;
        Ok(parsers::parse_active_matrix(&reply))
    }

    /// Drains a stray reply left on the bus, mirroring `init_poe`'s
    /// leading "flush any stale reply" read before platform init begins.
    pub fn flush_stale_reply(&self) {
        self.engine.flush();
    }

    pub fn set_port_en_dis(&self, logic_port: u8, en_dis: u8) -> PoeResult<()> {
        match self.dialect {
            Dialect::AfAt => {
                self.engine.run(
                    Key::Command,
                    &[
                        wire::SUB_CHANNEL,
                        wire::SUB1_EN_DIS,
                        logic_port,
                        wire::DATA_CMD_ENDIS_ONLY | en_dis,
                        wire::DATA_PORT_TYPE_AT,
                    ],
                    SettleClass::Default,
                )?;
            }
            Dialect::Bt => {
                self.engine.run(
                    Key::Command,
                    &[
                        wire::SUB_CHANNEL,
                        wire::BT_SUB1_PORTS_PARAMETERS,
                        logic_port,
                        wire::DATA_CMD_ENDIS_ONLY | en_dis,
                        wire::BT_PORT_MODE_NO_CHANGE | wire::BT_PORT_CLASS_ERROR_NO_CHANGE,
                        wire::BT_PORT_OP_MODE_NO_CHANGE,
                        wire::BT_PORT_MODE_POWER_SAME,
                        wire::BT_PORT_PRIORITY_NO_CHANGE,
                    ],
                    SettleClass::Default,
                )?;
            }
        }
        Ok(())
    }

    pub fn get_all_ports_en_dis(&self) -> PoeResult<parsers::AllPortsEndis> {
        let reply = self.engine.run(Key::Request, &[wire::SUB_GLOBAL, wire::SUB1_EN_DIS], SettleClass::Default)?;
        Ok(parsers::parse_all_ports_endis(&reply))
    }

    pub fn set_port_power_limit(&self, logic_port: u8, power_limit: u16) -> PoeResult<()> {
        if self.dialect == Dialect::Bt {
            return Err(PoeError::unsupported("set_port_power_limit is not available in BT dialect"));
        }
        self.engine.run(
            Key::Command,
            &[wire::SUB_CHANNEL, wire::SUB1_SUPPLY, logic_port, (power_limit >> 8) as u8, (power_limit & 0xff) as u8],
            SettleClass::Default,
        )?;
        Ok(())
    }

    pub fn get_port_power_limit(&self, logic_port: u8) -> PoeResult<parsers::PortPowerLimit> {
        let reply = self.engine.run(Key::Request, &[wire::SUB_CHANNEL, wire::SUB1_SUPPLY, logic_port], SettleClass::Default)?;
        Ok(parsers::parse_port_power_limit(&reply))
    }

    pub fn set_port_priority(&self, logic_port: u8, priority: u8) -> PoeResult<()> {
        match self.dialect {
            Dialect::AfAt => {
                self.engine.run(Key::Command, &[wire::SUB_CHANNEL, wire::SUB1_PRIORITY, logic_port, priority], SettleClass::Default)?;
            }
            Dialect::Bt => {
                self.engine.run(
                    Key::Command,
                    &[
                        wire::SUB_CHANNEL,
                        wire::BT_SUB1_PORTS_PARAMETERS,
                        logic_port,
                        wire::BT_CMD_ENDIS_NO_CHANGE,
                        wire::BT_PORT_MODE_NO_CHANGE | wire::BT_PORT_CLASS_ERROR_NO_CHANGE,
                        wire::BT_PORT_OP_MODE_NO_CHANGE,
                        wire::BT_PORT_MODE_POWER_SAME,
                        priority,
                    ],
                    SettleClass::Default,
                )?;
            }
        }
        Ok(())
    }

    pub fn get_port_priority(&self, logic_port: u8) -> PoeResult<parsers::PortPriority> {
        let reply = self.engine.run(Key::Request, &[wire::SUB_CHANNEL, wire::SUB1_PRIORITY, logic_port], SettleClass::Default)?;
        Ok(parsers::parse_port_priority(&reply))
    }

    pub fn get_port_status(&self, logic_port: u8) -> PoeResult<parsers::PortStatus> {
        if self.dialect == Dialect::Bt {
            return Err(PoeError::unsupported("get_port_status: use get_bt_port_parameters in BT dialect"));
        }
        let reply = self.engine.run(Key::Request, &[wire::SUB_CHANNEL, wire::SUB1_PORT_STATUS, logic_port], SettleClass::Default)?;
        Ok(parsers::parse_port_status(&reply))
    }

    pub fn set_pm_method(&self, pm1: u8, pm2: u8, pm3: u8) -> PoeResult<()> {
        self.engine.run(Key::Command, &[wire::SUB_GLOBAL, wire::SUB1_SUPPLY, wire::SUB2_PWR_MANAGE_MODE, pm1, pm2, pm3], SettleClass::Default)?;
        Ok(())
    }

    pub fn get_pm_method(&self) -> PoeResult<parsers::PmMethod> {
        let reply = self.engine.run(Key::Request, &[wire::SUB_GLOBAL, wire::SUB1_SUPPLY, wire::SUB2_PWR_MANAGE_MODE], SettleClass::Default)?;
        Ok(parsers::parse_pm_method(&reply))
    }

    pub fn set_power_bank(
        &self,
        bank: u8,
        power_limit: u16,
        max_shutdown_voltage: u16,
        min_shutdown_voltage: u16,
        guard_band: u8,
    ) -> PoeResult<()> {
        self.engine.run(
            Key::Command,
            &[
                wire::SUB_GLOBAL,
                wire::SUB1_SUPPLY,
                wire::SUB2_PWR_BUDGET,
                bank,
                (power_limit >> 8) as u8,
                (power_limit & 0xff) as u8,
                (max_shutdown_voltage >> 8) as u8,
                (max_shutdown_voltage & 0xff) as u8,
                (min_shutdown_voltage >> 8) as u8,
                (min_shutdown_voltage & 0xff) as u8,
                guard_band,
            ],
            SettleClass::Default,
        )?;
        Ok(())
    }

    pub fn get_power_supply_params(&self) -> PoeResult<parsers::PowerSupplyParams> {
        let reply = self.engine.run(Key::Request, &[wire::SUB_GLOBAL, wire::SUB1_SUPPLY, wire::SUB2_MAIN], SettleClass::Default)?;
        Ok(parsers::parse_power_supply_params(&reply))
    }

    pub fn get_port_measurements(&self, logic_port: u8) -> PoeResult<parsers::PortMeasurements> {
        if self.dialect == Dialect::Bt {
            return Err(PoeError::unsupported("get_port_measurements: use get_bt_port_measurements in BT dialect"));
        }
        let reply = self.engine.run(Key::Request, &[wire::SUB_CHANNEL, wire::SUB1_PARAMZ, logic_port], SettleClass::Default)?;
        Ok(parsers::parse_port_measurements(&reply))
    }

    pub fn get_bt_port_measurements(&self, logic_port: u8) -> PoeResult<parsers::PortMeasurements> {
        if self.dialect != Dialect::Bt {
            return Err(PoeError::unsupported("get_bt_port_measurements requires BT dialect"));
        }
        let reply = self.engine.run(Key::Request, &[wire::SUB_CHANNEL, wire::BT_SUB1_PORTS_MEASUREMENT, logic_port], SettleClass::Default)?;
        Ok(parsers::parse_bt_port_measurements(&reply))
    }

    pub fn get_bt_port_parameters(&self, logic_port: u8) -> PoeResult<parsers::BtPortParameters> {
        if self.dialect != Dialect::Bt {
            return Err(PoeError::unsupported("get_bt_port_parameters requires BT dialect"));
        }
        let reply = self.engine.run(Key::Request, &[wire::SUB_CHANNEL, wire::BT_SUB1_PORTS_PARAMETERS, logic_port], SettleClass::Default)?;
        Ok(parsers::parse_bt_port_parameters(&reply))
    }

    pub fn get_bt_port_class(&self, logic_port: u8) -> PoeResult<parsers::BtPortClass> {
        if self.dialect != Dialect::Bt {
            return Err(PoeError::unsupported("get_bt_port_class requires BT dialect"));
        }
        let reply = self.engine.run(Key::Request, &[wire::SUB_CHANNEL, wire::BT_SUB1_PORTS_CLASS, logic_port], SettleClass::Default)?;
        Ok(parsers::parse_bt_port_class(&reply))
    }

    pub fn set_bt_port_operation_mode(&self, logic_port: u8, mode: u8) -> PoeResult<()> {
        if self.dialect != Dialect::Bt {
            return Err(PoeError::unsupported("set_bt_port_operation_mode requires BT dialect"));
        }
        self.engine.run(
            Key::Command,
            &[
                wire::SUB_CHANNEL,
                wire::BT_SUB1_PORTS_PARAMETERS,
                logic_port,
                wire::BT_CMD_ENDIS_NO_CHANGE,
                wire::BT_PORT_MODE_NO_CHANGE | wire::BT_PORT_CLASS_ERROR_NO_CHANGE,
                mode,
                wire::BT_PORT_MODE_POWER_SAME,
                wire::BT_PORT_PRIORITY_NO_CHANGE,
            ],
            SettleClass::Default,
        )?;
        Ok(())
    }

    pub fn get_poe_device_parameters(&self, cascade_num: u8) -> PoeResult<parsers::PoeDeviceParams> {
        let reply = self.engine.run(Key::Request, &[wire::SUB_GLOBAL, wire::SUB1_DEV_PARAMS, cascade_num], SettleClass::Default)?;
        Ok(parsers::parse_poe_device_params(&reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{BusTransport, MockBus};
    use crate::frame::{Frame, MSG_LEN, OFFSET_DATA5, OFFSET_DATA6, OFFSET_ECHO, OFFSET_KEY, OFFSET_SUB2};

    fn driver_with_dialect(dialect: Dialect) -> ChipDriver {
        let bus = MockBus::with_responder(|sent| {
            let mut buf = [crate::frame::MSG_PAD_BYTE; MSG_LEN];
            buf[OFFSET_KEY] = Key::Report.to_byte();
            buf[OFFSET_ECHO] = sent.echo();
            let csum = crate::frame::checksum(&buf[..crate::frame::OFFSET_CSUM_H]);
            buf[crate::frame::OFFSET_CSUM_H] = (csum >> 8) as u8;
            buf[crate::frame::OFFSET_CSUM_L] = (csum & 0xff) as u8;
            Frame(buf)
        });
        let engine = ProtocolEngine::new(BusTransport::new(Box::new(bus)));
        ChipDriver::with_dialect(engine, dialect)
    }

    #[test]
    fn bt_power_limit_set_is_unsupported() {
        let driver = driver_with_dialect(Dialect::Bt);
        let err = driver.set_port_power_limit(3, 30_000).unwrap_err();
        assert!(matches!(err, PoeError::Unsupported(_)));
    }

    #[test]
    fn af_at_power_limit_set_accepted() {
        let driver = driver_with_dialect(Dialect::AfAt);
        assert!(driver.set_port_power_limit(3, 30_000).is_ok());
    }

    #[test]
    fn get_software_version_parses_reply() {
        let bus = MockBus::with_responder(|sent| {
            let mut buf = [crate::frame::MSG_PAD_BYTE; MSG_LEN];
            buf[OFFSET_KEY] = Key::Telemetry.to_byte();
            buf[OFFSET_ECHO] = sent.echo();
            buf[OFFSET_SUB2] = 14; // product number
            buf[OFFSET_DATA5] = 0x01;
            buf[OFFSET_DATA6] = 0x2c; // sw_version = 0x012c = 300
            let csum = crate::frame::checksum(&buf[..crate::frame::OFFSET_CSUM_H]);
            buf[crate::frame::OFFSET_CSUM_H] = (csum >> 8) as u8;
            buf[crate::frame::OFFSET_CSUM_L] = (csum & 0xff) as u8;
            Frame(buf)
        });
        let engine = ProtocolEngine::new(BusTransport::new(Box::new(bus)));
        let driver = ChipDriver::with_dialect(engine, Dialect::AfAt);
        let version = driver.get_software_version().unwrap();
        assert_eq!(version.product_number, 14);
        assert_eq!(version.sw_version, 300);
    }

    #[test]
    fn get_active_matrix_parses_phy_port_pair() {
        let bus = MockBus::with_responder(|sent| {
            let mut buf = [crate::frame::MSG_PAD_BYTE; MSG_LEN];
            buf[OFFSET_KEY] = Key::Telemetry.to_byte();
            buf[OFFSET_ECHO] = sent.echo();
            buf[OFFSET_DATA5] = 7;
            buf[OFFSET_DATA6] = 0xFF;
            let csum = crate::frame::checksum(&buf[..crate::frame::OFFSET_CSUM_H]);
            buf[crate::frame::OFFSET_CSUM_H] = (csum >> 8) as u8;
            buf[crate::frame::OFFSET_CSUM_L] = (csum & 0xff) as u8;
            Frame(buf)
        });
        let engine = ProtocolEngine::new(BusTransport::new(Box::new(bus)));
        let driver = ChipDriver::with_dialect(engine, Dialect::AfAt);
        let active = driver.get_active_matrix(0).unwrap();
        assert_eq!(active.phy_port_a, 7);
        assert_eq!(active.phy_port_b, 0xFF);
    }

    #[test]
    fn flush_stale_reply_drains_without_sending_a_command() {
        let mut bus = MockBus::new();
        bus.queue_reply(Frame([crate::frame::MSG_PAD_BYTE; MSG_LEN]));
        let engine = ProtocolEngine::new(BusTransport::new(Box::new(bus)));
        let driver = ChipDriver::with_dialect(engine, Dialect::AfAt);
        driver.flush_stale_reply();
    }
}
