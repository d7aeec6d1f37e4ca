//! Port/system view layer (spec.md §4.G): uniform read-modify-write
//! records over the dialect-specific driver, each setter applying the
//! "read current value, write only if it actually changed" discipline
//! used throughout `poePort`/`poeSystem` in `poe_driver_pd69200.py`.

use crate::dialect::{Dialect, PortClass, Priority, Protocol};
use crate::driver::ChipDriver;
use crate::error::{PoeError, PoeResult};
use crate::platform::PlatformDescriptor;

/// A port's full observable state, units already normalized: BT
/// power/current are reported ×100 and voltage /10 to line up with the
/// AF/AT scale, matching `get_current_status`'s per-dialect scaling.
#[derive(Debug, Clone, PartialEq)]
pub struct PortView {
    pub port_id: u8,
    pub enabled: bool,
    pub priority: Priority,
    pub power_limit_mw: u32,
    pub status: u8,
    pub protocol: Protocol,
    pub latch: u8,
    pub en_4pair: u8,
    pub class: PortClass,
    pub power_consumption_mw: u32,
    pub voltage_dv: u16,
    pub current_ma: u16,
}

/// Requested mutations to a port; absent fields are left untouched,
/// mirroring `set_all_params`'s selective application of whichever keys
/// are present in the incoming config/CLI record.
#[derive(Debug, Clone, Default)]
pub struct PortParams {
    pub enabled: Option<bool>,
    pub power_limit_mw: Option<u32>,
    pub priority: Option<Priority>,
}

pub struct PortOps<'a> {
    pub driver: &'a ChipDriver,
    pub platform: &'a PlatformDescriptor,
    pub port_id: u8,
}

impl<'a> PortOps<'a> {
    pub fn current_status(&self) -> PoeResult<PortView> {
        if self.driver.dialect() == Dialect::Bt {
            let params = self.driver.get_bt_port_parameters(self.port_id)?;
            let class_info = self.driver.get_bt_port_class(self.port_id)?;
            let meas = self.driver.get_bt_port_measurements(self.port_id)?;
            let measured_class = class_info.measured_class >> 4;
            let delivering = (0x80..=0x91).contains(&params.status);
            Ok(PortView {
                port_id: self.port_id,
                enabled: params.endis != 0,
                priority: Priority::from_byte(params.priority)?,
                power_limit_mw: class_info.tppl as u32 * 100,
                status: params.status,
                protocol: Protocol::bt_from_measured_class(measured_class, delivering),
                latch: 0,
                en_4pair: 0,
                class: PortClass::bt_from_nibble(class_info.class >> 4),
                power_consumption_mw: meas.power_consumption_mw as u32 * 100,
                voltage_dv: meas.voltage_dv / 10,
                current_ma: meas.current_ma,
            })
        } else {
            let status = self.driver.get_port_status(self.port_id)?;
            let priority = self.driver.get_port_priority(self.port_id)?;
            let power_limit = self.driver.get_port_power_limit(self.port_id)?;
            let meas = self.driver.get_port_measurements(self.port_id)?;
            Ok(PortView {
                port_id: self.port_id,
                enabled: status.endis != 0,
                priority: Priority::from_byte(priority.priority)?,
                power_limit_mw: power_limit.ppl as u32,
                status: status.status,
                protocol: Protocol::af_at_from_byte(status.protocol),
                latch: status.latch,
                en_4pair: status.en_4pair,
                class: PortClass::af_at_from_byte(status.class),
                power_consumption_mw: meas.power_consumption_mw as u32,
                voltage_dv: meas.voltage_dv / 10,
                current_ma: meas.current_ma,
            })
        }
    }

    /// Set-only-if-different enable/disable; returns whether a write
    /// actually went to the chip (spec.md §4.G invariant).
    pub fn set_enabled(&self, enabled: bool) -> PoeResult<bool> {
        let cur = if self.driver.dialect() == Dialect::Bt {
            self.driver.get_bt_port_parameters(self.port_id)?.endis != 0
        } else {
            self.driver.get_port_status(self.port_id)?.endis != 0
        };
        if cur == enabled {
            return Ok(false);
        }
        self.driver.set_port_en_dis(self.port_id, enabled as u8)?;
        Ok(true)
    }

    pub fn set_power_limit(&self, power_limit_mw: u32) -> PoeResult<bool> {
        if self.driver.dialect() == Dialect::Bt {
            return Err(PoeError::unsupported("power limit is not settable on BT firmware"));
        }
        let cur = self.driver.get_port_power_limit(self.port_id)?.ppl as u32;
        if cur == power_limit_mw {
            return Ok(false);
        }
        self.driver.set_port_power_limit(self.port_id, power_limit_mw as u16)?;
        Ok(true)
    }

    pub fn set_priority(&self, priority: Priority) -> PoeResult<bool> {
        let cur = if self.driver.dialect() == Dialect::Bt {
            Priority::from_byte(self.driver.get_bt_port_parameters(self.port_id)?.priority)?
        } else {
            Priority::from_byte(self.driver.get_port_priority(self.port_id)?.priority)?
        };
        if cur == priority {
            return Ok(false);
        }
        // `ChipDriver::set_port_priority` already fills in the BT
        // dialect's "no change" sentinels for every field but priority.
        self.driver.set_port_priority(self.port_id, priority.to_byte())?;
        Ok(true)
    }

    /// Applies every present field in `params`, returning whether any
    /// field actually changed on the chip (`set_all_params`'s OR-reduce
    /// of each individual setter's changed flag).
    pub fn set_all_params(&self, params: &PortParams) -> PoeResult<bool> {
        let mut changed = false;
        if let Some(enabled) = params.enabled {
            changed |= self.set_enabled(enabled)?;
        }
        if self.driver.dialect() != Dialect::Bt {
            if let Some(power_limit_mw) = params.power_limit_mw {
                changed |= self.set_power_limit(power_limit_mw)?;
            }
        }
        if let Some(priority) = params.priority {
            changed |= self.set_priority(priority)?;
        }
        Ok(changed)
    }
}

/// System-wide observable state, grounded in `poeSystem.get_current_status`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemView {
    pub total_ports: u8,
    pub total_power_w: u16,
    pub power_consumption_w: u16,
    pub power_available_w: i32,
    pub power_bank: u8,
    pub power_source: String,
    pub max_shutdown_voltage_dv: u16,
    pub min_shutdown_voltage_dv: u16,
    pub pm1: u8,
    pub pm2: u8,
    pub pm3: u8,
    pub cpu_status1: u8,
    pub cpu_status2: u8,
    pub factory_default: u8,
    pub gie: u8,
    pub private_label: u8,
    pub user_byte: u8,
    pub device_fail: u8,
    pub temp_disconnect: u8,
    pub temp_alarm: u8,
    pub interrupt_reg: u16,
    pub nvm_user_byte: u8,
    pub found_device: u8,
    pub event_exist: u8,
}

pub struct SystemOps<'a> {
    pub driver: &'a ChipDriver,
    pub platform: &'a PlatformDescriptor,
}

impl<'a> SystemOps<'a> {
    pub fn current_status(&self) -> PoeResult<SystemView> {
        let params = self.driver.get_power_supply_params()?;
        let mut view = SystemView {
            total_ports: self.platform.total_poe_port,
            total_power_w: params.total_power,
            power_consumption_w: params.power_consumption,
            power_available_w: params.total_power as i32 - params.power_consumption as i32,
            power_bank: params.power_bank,
            power_source: self.platform.bank_to_psu_str(params.power_bank).to_string(),
            max_shutdown_voltage_dv: params.max_shutdown_voltage / 10,
            min_shutdown_voltage_dv: params.min_shutdown_voltage / 10,
            ..SystemView::default()
        };

        if self.driver.dialect() == Dialect::Bt {
            let status = self.driver.get_bt_system_status()?;
            view.cpu_status2 = status.cpu_status2;
            view.factory_default = status.factory_default;
            view.private_label = status.private_label;
            view.nvm_user_byte = status.nvm_user_byte;
            view.found_device = status.found_device;
            view.event_exist = status.event_exist;
        } else {
            let status = self.driver.get_system_status()?;
            view.cpu_status1 = status.cpu_status1;
            view.cpu_status2 = status.cpu_status2;
            view.factory_default = status.factory_default;
            view.gie = status.gie;
            view.private_label = status.private_label;
            view.user_byte = status.user_byte;
            view.device_fail = status.device_fail;
            view.temp_disconnect = status.temp_disconnect;
            view.temp_alarm = status.temp_alarm;
            view.interrupt_reg = status.interrupt_reg;

            let pm = self.driver.get_pm_method()?;
            view.pm1 = pm.pm1;
            view.pm2 = pm.pm2;
            view.pm3 = pm.pm3;
        }

        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ProtocolEngine;
    use crate::frame::{Frame, Key, MSG_LEN, OFFSET_DATA5, OFFSET_ECHO, OFFSET_KEY, OFFSET_SUB, OFFSET_SUB1};
    use crate::platform::ACCTON_AS4224_52P;
    use crate::transport::{BusTransport, MockBus};
    use std::sync::atomic::{AtomicU8, Ordering};
    use std::sync::Arc;

    fn replyable(buf: &mut [u8; MSG_LEN], sent: &Frame, key: Key) {
        buf[OFFSET_KEY] = key.to_byte();
        buf[OFFSET_ECHO] = sent.echo();
        let csum = crate::frame::checksum(&buf[..crate::frame::OFFSET_CSUM_H]);
        buf[crate::frame::OFFSET_CSUM_H] = (csum >> 8) as u8;
        buf[crate::frame::OFFSET_CSUM_L] = (csum & 0xff) as u8;
    }

    #[test]
    fn set_enabled_is_a_no_op_when_already_in_requested_state() {
        // get_port_status reports enabled (SUB=1); set_enabled(true)
        // must not issue a second chip write.
        let writes = Arc::new(AtomicU8::new(0));
        let writes2 = Arc::clone(&writes);
        let bus = MockBus::with_responder(move |sent| {
            let mut buf = [crate::frame::MSG_PAD_BYTE; MSG_LEN];
            if sent.key() == Key::Request.to_byte() {
                replyable(&mut buf, sent, Key::Telemetry);
                buf[OFFSET_SUB] = 1; // endis = enabled
            } else {
                writes2.fetch_add(1, Ordering::SeqCst);
                replyable(&mut buf, sent, Key::Report);
            }
            Frame(buf)
        });
        let engine = ProtocolEngine::new(BusTransport::new(Box::new(bus)));
        let driver = ChipDriver::with_dialect(engine, Dialect::AfAt);
        let ops = PortOps { driver: &driver, platform: &ACCTON_AS4224_52P, port_id: 3 };

        let changed = ops.set_enabled(true).unwrap();
        assert!(!changed);
        assert_eq!(writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn set_enabled_writes_when_state_differs() {
        let writes = Arc::new(AtomicU8::new(0));
        let writes2 = Arc::clone(&writes);
        let bus = MockBus::with_responder(move |sent| {
            let mut buf = [crate::frame::MSG_PAD_BYTE; MSG_LEN];
            if sent.key() == Key::Request.to_byte() {
                replyable(&mut buf, sent, Key::Telemetry);
                buf[OFFSET_SUB] = 0; // endis = disabled
            } else {
                writes2.fetch_add(1, Ordering::SeqCst);
                replyable(&mut buf, sent, Key::Report);
            }
            Frame(buf)
        });
        let engine = ProtocolEngine::new(BusTransport::new(Box::new(bus)));
        let driver = ChipDriver::with_dialect(engine, Dialect::AfAt);
        let ops = PortOps { driver: &driver, platform: &ACCTON_AS4224_52P, port_id: 3 };

        let changed = ops.set_enabled(true).unwrap();
        assert!(changed);
        assert_eq!(writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn set_power_limit_unsupported_on_bt() {
        let bus = MockBus::with_responder(|sent| {
            let mut buf = [crate::frame::MSG_PAD_BYTE; MSG_LEN];
            replyable(&mut buf, sent, Key::Telemetry);
            Frame(buf)
        });
        let engine = ProtocolEngine::new(BusTransport::new(Box::new(bus)));
        let driver = ChipDriver::with_dialect(engine, Dialect::Bt);
        let ops = PortOps { driver: &driver, platform: &ACCTON_AS4224_52P, port_id: 0 };
        assert!(ops.set_power_limit(30_000).is_err());
    }

    #[test]
    fn current_status_reads_af_at_fields() {
        let bus = MockBus::with_responder(|sent| {
            let mut buf = [crate::frame::MSG_PAD_BYTE; MSG_LEN];
            replyable(&mut buf, sent, Key::Telemetry);
            buf[OFFSET_SUB] = 1;
            buf[OFFSET_SUB1] = 0x01; // priority crit on the priority request
            buf[OFFSET_DATA5] = 0x00;
            Frame(buf)
        });
        let engine = ProtocolEngine::new(BusTransport::new(Box::new(bus)));
        let driver = ChipDriver::with_dialect(engine, Dialect::AfAt);
        let ops = PortOps { driver: &driver, platform: &ACCTON_AS4224_52P, port_id: 0 };
        let status = ops.current_status().unwrap();
        assert!(status.enabled);
    }
}
