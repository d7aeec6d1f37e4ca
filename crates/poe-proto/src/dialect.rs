//! Wire-level constants and small value types shared by the engine,
//! parsers and driver. Byte values are lifted verbatim from the PD69200
//! register map (both AF/AT and BT dialects) so the protocol stays
//! bit-exact with deployed firmware.

use crate::error::PoeError;

/// Firmware generation exposed by the PoE controller. Selected once at
/// driver construction time (by probing `get_software_version`) and fixed
/// thereafter; call sites never inspect this directly, they call the
/// dialect-agnostic driver methods which route internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    AfAt,
    Bt,
}

/// Wire byte values for SUB/SUB1/SUB2/DATA fields. Grouped by message
/// byte position, matching `poe_driver_pd69200_def.py` /
/// `poe_driver_pd69200_bt_def.py`.
pub mod wire {
    // Byte 3 (SUB)
    pub const SUB_CHANNEL: u8 = 0x05;
    pub const SUB_E2: u8 = 0x06;
    pub const SUB_GLOBAL: u8 = 0x07;
    pub const SUB_RESTORE_FACT: u8 = 0x2D;
    pub const SUB_USER_BYTE: u8 = 0x41;

    // Byte 4 (SUB1) - AF/AT
    pub const SUB1_PRIORITY: u8 = 0x0A;
    pub const SUB1_SUPPLY: u8 = 0x0B;
    pub const SUB1_EN_DIS: u8 = 0x0C;
    pub const SUB1_PORT_STATUS: u8 = 0x0E;
    pub const SUB1_SAVE_CONFIG: u8 = 0x0F;
    pub const SUB1_VERSIONZ: u8 = 0x1E;
    pub const SUB1_PARAMZ: u8 = 0x25;
    pub const SUB1_SYSTEM_STATUS: u8 = 0x3D;
    pub const SUB1_TEMP_MATRIX: u8 = 0x43;
    pub const SUB1_CH_MATRIX: u8 = 0x44;
    pub const SUB1_RESET: u8 = 0x55;
    pub const SUB1_INDV_MSK: u8 = 0x56;
    pub const SUB1_DEV_PARAMS: u8 = 0x87;

    // Byte 4 (SUB1) - BT
    pub const BT_SUB1_SYSTEM_STATUS: u8 = 0xD0;
    pub const BT_SUB1_PORTS_PARAMETERS: u8 = 0xC0;
    pub const BT_SUB1_PORTS_CLASS: u8 = 0xC4;
    pub const BT_SUB1_PORTS_MEASUREMENT: u8 = 0xC5;

    // Byte 5 (SUB2)
    pub const SUB2_MAIN: u8 = 0x17;
    pub const SUB2_SW_VERSION: u8 = 0x21;
    pub const SUB2_PWR_BUDGET: u8 = 0x57;
    pub const SUB2_PWR_MANAGE_MODE: u8 = 0x5F;
    pub const SUB2_TOTAL_PWR: u8 = 0x60;

    // Port type / enable data bytes (AF/AT)
    pub const DATA_CMD_ENDIS_ONLY: u8 = 0x00;
    pub const DATA_CMD_ENABLE: u8 = 1;
    pub const DATA_CMD_DISABLE: u8 = 0;
    pub const DATA_PORT_TYPE_AT: u8 = 1;

    // BT "no change" sentinels: setting a single BT port field still
    // requires sending the full 6-byte parameter block, with every
    // field the caller isn't touching set to its dialect-defined
    // "leave as-is" value.
    pub const BT_CMD_ENDIS_NO_CHANGE: u8 = 0x0F;
    pub const BT_PORT_MODE_NO_CHANGE: u8 = 0x0F;
    pub const BT_PORT_CLASS_ERROR_NO_CHANGE: u8 = 0xF0;
    pub const BT_PORT_OP_MODE_NO_CHANGE: u8 = 0xFF;
    pub const BT_PORT_MODE_POWER_SAME: u8 = 0x00;
    pub const BT_PORT_PRIORITY_NO_CHANGE: u8 = 0xFF;

    pub const PM1_DYNAMIC: u8 = 0;
    pub const PM2_PPL: u8 = 0;
    pub const PM3_NO_COND: u8 = 0;
}

/// Per-port priority. Encodes/decodes to exact byte values regardless of
/// dialect (spec.md §3 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Crit,
    High,
    Low,
}

impl Priority {
    pub fn to_byte(self) -> u8 {
        match self {
            Priority::Crit => 1,
            Priority::High => 2,
            Priority::Low => 3,
        }
    }

    pub fn from_byte(b: u8) -> Result<Priority, PoeError> {
        match b {
            1 => Ok(Priority::Crit),
            2 => Ok(Priority::High),
            3 => Ok(Priority::Low),
            other => Err(PoeError::Protocol(format!("unknown priority byte 0x{:02x}", other))),
        }
    }
}

/// PD protocol negotiated on a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Af,
    AfAt,
    Poh,
    Bt,
    NonCompliant,
    Unknown,
}

impl Protocol {
    pub fn af_at_from_byte(b: u8) -> Protocol {
        match b {
            0 => Protocol::Af,
            1 => Protocol::AfAt,
            2 => Protocol::Poh,
            _ => Protocol::Unknown,
        }
    }

    /// BT dialect reports protocol indirectly via the measured class
    /// range of a powered port (see `poe_driver_pd69200.py::update_port_status`).
    pub fn bt_from_measured_class(measured_class: u8, delivering_power: bool) -> Protocol {
        if !delivering_power {
            return Protocol::Unknown;
        }
        match measured_class {
            0..=4 => Protocol::AfAt,
            5..=8 => Protocol::Bt,
            _ => Protocol::Unknown,
        }
    }
}

/// Port class, either a numeric class 0..8 or the "Err"/"Non" sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortClass {
    Numeric(u8),
    Err,
    Non,
}

impl PortClass {
    pub fn af_at_from_byte(b: u8) -> PortClass {
        match b {
            0..=4 => PortClass::Numeric(b),
            _ => PortClass::Err,
        }
    }

    pub fn bt_from_nibble(nibble: u8) -> PortClass {
        match nibble {
            0..=8 => PortClass::Numeric(nibble),
            0xc => PortClass::Non,
            _ => PortClass::Err,
        }
    }
}

impl std::fmt::Display for PortClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortClass::Numeric(n) => write!(f, "{n}"),
            PortClass::Err => write!(f, "Err"),
            PortClass::Non => write!(f, "Non"),
        }
    }
}
