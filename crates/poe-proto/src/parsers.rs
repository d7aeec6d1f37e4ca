//! Typed reply decoders (spec.md §4.D). Each function takes a validated
//! reply `Frame` and extracts the fields at the byte offsets fixed by the
//! register map, matching `PoeMsgParser` in `poe_driver_pd69200.py`.

use crate::frame::{Frame, OFFSET_DATA10, OFFSET_DATA11, OFFSET_DATA12, OFFSET_DATA5, OFFSET_DATA6,
                    OFFSET_DATA7, OFFSET_DATA8, OFFSET_DATA9, OFFSET_SUB, OFFSET_SUB1, OFFSET_SUB2};

fn word(hi: u8, lo: u8) -> u16 {
    ((hi as u16) << 8) | lo as u16
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPowerLimit {
    pub ppl: u16,
    pub tppl: u16,
}

pub fn parse_port_power_limit(f: &Frame) -> PortPowerLimit {
    let b = f.as_bytes();
    PortPowerLimit {
        ppl: word(b[OFFSET_SUB], b[OFFSET_SUB1]),
        tppl: word(b[OFFSET_SUB2], b[OFFSET_DATA5]),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPriority {
    pub priority: u8,
}

pub fn parse_port_priority(f: &Frame) -> PortPriority {
    PortPriority { priority: f.as_bytes()[OFFSET_SUB] }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortStatus {
    pub endis: u8,
    pub status: u8,
    pub latch: u8,
    pub class: u8,
    pub protocol: u8,
    pub en_4pair: u8,
}

pub fn parse_port_status(f: &Frame) -> PortStatus {
    let b = f.as_bytes();
    PortStatus {
        endis: b[OFFSET_SUB],
        status: b[OFFSET_SUB1],
        latch: b[OFFSET_DATA5],
        class: b[OFFSET_DATA6],
        protocol: b[OFFSET_DATA10],
        en_4pair: b[OFFSET_DATA11],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BtPortParameters {
    pub status: u8,
    pub endis: u8,
    pub operation_mode: u8,
    pub priority: u8,
}

pub fn parse_bt_port_parameters(f: &Frame) -> BtPortParameters {
    let b = f.as_bytes();
    BtPortParameters {
        status: b[OFFSET_SUB],
        endis: b[OFFSET_SUB1],
        operation_mode: b[OFFSET_DATA5],
        priority: b[OFFSET_DATA7],
    }
}

/// Port enable/disable state for all ports on the chip, one bool per
/// logical port, lowest port first within each 8-port group
/// (SUB=0-7, SUB1=8-15, SUB2=16-23, DATA6=24-31, DATA7=32-39, DATA8=40-47).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllPortsEndis {
    pub endis: Vec<bool>,
}

pub fn parse_all_ports_endis(f: &Frame) -> AllPortsEndis {
    let b = f.as_bytes();
    let groups = [
        b[OFFSET_SUB],
        b[OFFSET_SUB1],
        b[OFFSET_SUB2],
        b[OFFSET_DATA6],
        b[OFFSET_DATA7],
        b[OFFSET_DATA8],
    ];
    let mut endis = Vec::with_capacity(48);
    for group in groups {
        for idx in 0..8 {
            endis.push((group >> idx) & 1 == 1);
        }
    }
    AllPortsEndis { endis }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerSupplyParams {
    pub power_consumption: u16,
    pub max_shutdown_voltage: u16,
    pub min_shutdown_voltage: u16,
    pub power_bank: u8,
    pub total_power: u16,
}

pub fn parse_power_supply_params(f: &Frame) -> PowerSupplyParams {
    let b = f.as_bytes();
    PowerSupplyParams {
        power_consumption: word(b[OFFSET_SUB], b[OFFSET_SUB1]),
        max_shutdown_voltage: word(b[OFFSET_SUB2], b[OFFSET_DATA5]),
        min_shutdown_voltage: word(b[OFFSET_DATA6], b[OFFSET_DATA7]),
        power_bank: b[OFFSET_DATA9],
        total_power: word(b[OFFSET_DATA10], b[OFFSET_DATA11]),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMeasurements {
    pub current_ma: u16,
    pub power_consumption_mw: u16,
    pub voltage_dv: u16,
}

pub fn parse_port_measurements(f: &Frame) -> PortMeasurements {
    let b = f.as_bytes();
    PortMeasurements {
        current_ma: word(b[OFFSET_SUB2], b[OFFSET_DATA5]),
        power_consumption_mw: word(b[OFFSET_DATA6], b[OFFSET_DATA7]),
        voltage_dv: word(b[OFFSET_DATA9], b[OFFSET_DATA10]),
    }
}

/// Same wire layout as the AF/AT measurement message; BT values are
/// reported by the caller at ×100 scale per spec.md §4.G.
pub fn parse_bt_port_measurements(f: &Frame) -> PortMeasurements {
    parse_port_measurements(f)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemStatus {
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
}

pub fn parse_system_status(f: &Frame) -> SystemStatus {
    let b = f.as_bytes();
    SystemStatus {
        cpu_status1: b[OFFSET_SUB],
        cpu_status2: b[OFFSET_SUB1],
        factory_default: b[OFFSET_SUB2],
        gie: b[OFFSET_DATA5],
        private_label: b[OFFSET_DATA6],
        user_byte: b[OFFSET_DATA7],
        device_fail: b[OFFSET_DATA8],
        temp_disconnect: b[OFFSET_DATA9],
        temp_alarm: b[OFFSET_DATA10],
        interrupt_reg: word(b[OFFSET_DATA11], b[OFFSET_DATA12]),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BtSystemStatus {
    pub cpu_status2: u8,
    pub factory_default: u8,
    pub private_label: u8,
    pub nvm_user_byte: u8,
    pub found_device: u8,
    pub event_exist: u8,
}

pub fn parse_bt_system_status(f: &Frame) -> BtSystemStatus {
    let b = f.as_bytes();
    BtSystemStatus {
        cpu_status2: b[OFFSET_SUB1],
        factory_default: b[OFFSET_SUB2],
        private_label: b[OFFSET_DATA6],
        nvm_user_byte: b[OFFSET_DATA7],
        found_device: b[OFFSET_DATA8],
        event_exist: b[OFFSET_DATA12],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoeDeviceParams {
    pub cascade_num: u8,
    pub status: u8,
    pub temperature: u8,
    pub temp_alarm: u8,
}

pub fn parse_poe_device_params(f: &Frame) -> PoeDeviceParams {
    let b = f.as_bytes();
    PoeDeviceParams {
        cascade_num: b[OFFSET_SUB],
        status: b[OFFSET_DATA5],
        temperature: b[OFFSET_DATA9],
        temp_alarm: b[OFFSET_DATA10],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndividualMask {
    pub endis: u8,
}

pub fn parse_individual_mask(f: &Frame) -> IndividualMask {
    IndividualMask { endis: f.as_bytes()[OFFSET_SUB] }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmMethod {
    pub pm1: u8,
    pub pm2: u8,
    pub pm3: u8,
}

pub fn parse_pm_method(f: &Frame) -> PmMethod {
    let b = f.as_bytes();
    PmMethod { pm1: b[OFFSET_SUB], pm2: b[OFFSET_SUB1], pm3: b[OFFSET_SUB2] }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftwareVersion {
    pub product_number: u8,
    pub sw_version: u16,
}

pub fn parse_software_version(f: &Frame) -> SoftwareVersion {
    let b = f.as_bytes();
    SoftwareVersion {
        product_number: b[OFFSET_SUB2],
        sw_version: word(b[OFFSET_DATA5], b[OFFSET_DATA6]),
    }
}

/// One logical port's committed (not staged) matrix entry, as reported
/// by a `get_active_matrix` query — the counterpart to `set_temp_matrix`
/// used by the matrix-compare short-circuit (spec.md §8 item 10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveMatrixEntry {
    pub phy_port_a: u8,
    pub phy_port_b: u8,
}

pub fn parse_active_matrix(f: &Frame) -> ActiveMatrixEntry {
    let b = f.as_bytes();
    ActiveMatrixEntry { phy_port_a: b[OFFSET_DATA5], phy_port_b: b[OFFSET_DATA6] }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BtPortClass {
    pub measured_class: u8,
    pub class: u8,
    pub tppl: u16,
}

pub fn parse_bt_port_class(f: &Frame) -> BtPortClass {
    let b = f.as_bytes();
    BtPortClass {
        measured_class: b[OFFSET_SUB2],
        class: b[OFFSET_DATA8],
        tppl: word(b[OFFSET_DATA9], b[OFFSET_DATA10]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MSG_LEN;

    fn frame_with(bytes: &[(usize, u8)]) -> Frame {
        let mut buf = [0u8; MSG_LEN];
        for &(off, val) in bytes {
            buf[off] = val;
        }
        Frame(buf)
    }

    #[test]
    fn port_power_limit_reads_two_words() {
        let f = frame_with(&[
            (OFFSET_SUB, 0x01),
            (OFFSET_SUB1, 0x2c), // 0x012c = 300
            (OFFSET_SUB2, 0x00),
            (OFFSET_DATA5, 0xc8), // 0x00c8 = 200
        ]);
        let parsed = parse_port_power_limit(&f);
        assert_eq!(parsed.ppl, 300);
        assert_eq!(parsed.tppl, 200);
    }

    #[test]
    fn all_ports_endis_unpacks_48_bits_lowest_port_first() {
        // port 0 and port 9 enabled, everything else disabled.
        let f = frame_with(&[(OFFSET_SUB, 0b0000_0001), (OFFSET_SUB1, 0b0000_0010)]);
        let parsed = parse_all_ports_endis(&f);
        assert_eq!(parsed.endis.len(), 48);
        assert!(parsed.endis[0]);
        assert!(parsed.endis[9]);
        assert!(!parsed.endis[1]);
        assert!(!parsed.endis[8]);
    }

    #[test]
    fn system_status_reads_interrupt_reg_as_word() {
        let f = frame_with(&[(OFFSET_DATA11, 0x12), (OFFSET_DATA12, 0x34)]);
        let parsed = parse_system_status(&f);
        assert_eq!(parsed.interrupt_reg, 0x1234);
    }
}
