//! `poecli`: the operator-facing companion to `poed`, grounded in
//! `PoeCLI`/`main` (`poecli.py`). Talks to the same chip over the same
//! I2C bus, under the same process-wide lock, and notifies a running
//! daemon of any change it makes.

mod args;
mod ipc_notify;

use std::path::Path;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use serde_json::json;

use poe_proto::config::AGENT_VERSION;
use poe_proto::config::CONFIG_VERSION;
use poe_proto::dialect::{PortClass, Priority as DialectPriority, Protocol};
use poe_proto::driver::ChipDriver;
use poe_proto::engine::ProtocolEngine;
use poe_proto::lock::ProcessLock;
use poe_proto::platform::{self, PlatformDescriptor};
use poe_proto::transport::{BusTransport, LinuxI2cBus};
use poe_proto::view::{PortOps, PortParams, SystemOps};

use args::{Command, Priority, SetArgs, ShowArgs};

const PID_PATH: &str = "/run/poed.pid";
const IPC_FIFO: &str = "/run/poe_ipc_event";
const LOCK_PATH: &str = "/run/poe_access.lock";
const POECLI_SET: &str = "poecli_set";

fn platform_model(cmdline_path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(cmdline_path).ok()?;
    contents
        .split_whitespace()
        .find_map(|tok| tok.strip_prefix("onl_platform=").map(str::to_string))
}

fn priority_to_dialect(p: Priority) -> DialectPriority {
    match p {
        Priority::Critical => DialectPriority::Crit,
        Priority::High => DialectPriority::High,
        Priority::Low => DialectPriority::Low,
    }
}

fn priority_str(p: DialectPriority) -> &'static str {
    match p {
        DialectPriority::Crit => "Crit",
        DialectPriority::High => "High",
        DialectPriority::Low => "Low",
    }
}

fn protocol_str(p: Protocol) -> &'static str {
    match p {
        Protocol::Af => "AF",
        Protocol::AfAt => "AF+AT",
        Protocol::Poh => "PoH",
        Protocol::Bt => "4P BT",
        Protocol::NonCompliant => "Non-compliant",
        Protocol::Unknown => "Unknown",
    }
}

fn status_str(status: u8) -> String {
    match status {
        0 => "Searching".to_string(),
        1..=8 => "Delivering Power".to_string(),
        s if (0x80..=0x91).contains(&s) => "Delivering Power".to_string(),
        0x09 => "Fault".to_string(),
        0x0e => "Disabled".to_string(),
        other => format!("0x{other:02x}"),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let raw_args: Vec<String> = std::env::args().skip(1).collect();
    if raw_args.is_empty() {
        bail!("expected a subcommand: show, set, save, restore");
    }

    let platform_name = platform_model(Path::new("/proc/cmdline"))
        .context("reading platform model from /proc/cmdline")?;
    let platform = platform::lookup(&platform_name).context("looking up platform descriptor")?;

    let command = args::parse_args(&raw_args, platform.total_poe_port)?;

    let bus = LinuxI2cBus::open(platform.i2c_bus, platform.i2c_addr).context("opening I2C bus")?;
    let engine = ProtocolEngine::new(BusTransport::new(Box::new(bus)));
    let driver = ChipDriver::probe(engine).context("probing PD69200 controller")?;
    let lock = ProcessLock::new(LOCK_PATH);

    let mut set_flag = false;

    match command {
        Command::Show(show) => run_show(&driver, platform, &lock, &show)?,
        Command::Set(set) => set_flag = run_set(&driver, platform, &lock, &set)?,
        Command::Save => run_save(&driver, &lock)?,
        Command::Restore => {
            run_restore(&driver, platform, &lock)?;
            set_flag = true;
        }
    }

    if set_flag && ipc_notify::is_poed_alive(Path::new(PID_PATH)) {
        ipc_notify::send_ipc_event(Path::new(IPC_FIFO), POECLI_SET);
    }

    Ok(())
}

fn run_show(
    driver: &ChipDriver,
    platform: &'static PlatformDescriptor,
    lock: &ProcessLock,
    show: &ShowArgs,
) -> Result<()> {
    let _guard = lock.acquire()?;

    if show.version {
        let versions = poe_versions(driver)?;
        if show.json {
            print_json(&versions);
        } else {
            print_versions(&versions.0, &versions.1, &versions.2);
        }
        return Ok(());
    }

    if let Some(ports) = &show.ports {
        let infos = collect_ports(driver, platform, ports)?;
        if show.json {
            print_json(&json!({ "PORT_INFO": infos }));
        } else {
            print_ports(&infos, show.debug);
        }
        return Ok(());
    }

    if show.system {
        let info = system_info(driver, platform)?;
        if show.json {
            print_json(&json!({ "SYSTEM_INFORMATION": info }));
        } else {
            print_system(&info, show.debug);
        }
        return Ok(());
    }

    if show.mask {
        let masks = individual_masks(driver)?;
        if show.json {
            print_json(&json!({ "INDV_MASKS": masks }));
        } else {
            print_masks(&masks);
        }
        return Ok(());
    }

    if show.all {
        let versions = poe_versions(driver)?;
        let sys = system_info(driver, platform)?;
        let all_ports: Vec<u8> = (0..platform.total_poe_port).collect();
        let ports = collect_ports(driver, platform, &all_ports)?;
        let masks = individual_masks(driver)?;
        if show.json {
            print_json(&json!({
                "VERSIONS": { "SW_VERSION": versions.0, "POE_AGT_VER": versions.1, "POE_CFG_VER": versions.2 },
                "SYSTEM_INFORMATION": sys,
                "PORT_INFO": ports,
                "INDV_MASKS": masks,
            }));
        } else {
            print_versions(&versions.0, &versions.1, &versions.2);
            print_system(&sys, show.debug);
            print_ports(&ports, show.debug);
            print_masks(&masks);
        }
    }

    Ok(())
}

fn run_set(
    driver: &ChipDriver,
    platform: &'static PlatformDescriptor,
    lock: &ProcessLock,
    set: &SetArgs,
) -> Result<bool> {
    let _guard = lock.acquire()?;
    let mut changed = false;

    for &port_id in &set.ports {
        let ops = PortOps { driver, platform, port_id };
        let params = PortParams {
            enabled: set.enable,
            power_limit_mw: set.power_limit,
            priority: set.level.map(priority_to_dialect),
        };
        match ops.set_all_params(&params) {
            Ok(c) => changed |= c,
            Err(e) => eprintln!("failed to set port {}: {e}", port_id + 1),
        }
    }

    Ok(changed)
}

fn run_save(driver: &ChipDriver, lock: &ProcessLock) -> Result<()> {
    let _guard = lock.acquire()?;
    driver.save_system_settings().context("saving PoE system settings")
}

fn run_restore(driver: &ChipDriver, platform: &'static PlatformDescriptor, lock: &ProcessLock) -> Result<()> {
    let _guard = lock.acquire()?;
    driver.restore_factory_default().context("restoring factory default")?;
    platform.init_poe(driver, true).context("reinitializing platform after restore")?;
    println!("Success to restore factory default and take platform poe settings!");
    Ok(())
}

fn poe_versions(driver: &ChipDriver) -> Result<(String, String, String)> {
    let sw = driver.poe_versions_string()?;
    Ok((sw, AGENT_VERSION.to_string(), CONFIG_VERSION.to_string()))
}

fn system_info(driver: &ChipDriver, platform: &'static PlatformDescriptor) -> Result<serde_json::Value> {
    let ops = SystemOps { driver, platform };
    let view = ops.current_status()?;
    Ok(json!({
        "TOTAL_PORTS": view.total_ports,
        "TOTAL_POWER": view.total_power_w,
        "POWER_CONSUMP": view.power_consumption_w,
        "POWER_AVAIL": view.power_available_w,
        "POWER_BANK": view.power_bank,
        "POWER_SRC": view.power_source,
        "MAX_SD_VOLT": view.max_shutdown_voltage_dv,
        "MIN_SD_VOLT": view.min_shutdown_voltage_dv,
        "PM1": view.pm1,
        "PM2": view.pm2,
        "PM3": view.pm3,
        "CPU_STATUS1": view.cpu_status1,
        "CPU_STATUS2": view.cpu_status2,
        "FAC_DEFAULT": view.factory_default,
        "GIE": view.gie,
        "PRIV_LABEL": view.private_label,
        "USER_BYTE": view.user_byte,
        "DEVICE_FAIL": view.device_fail,
        "TEMP_DISCO": view.temp_disconnect,
        "TEMP_ALARM": view.temp_alarm,
        "INTR_REG": view.interrupt_reg,
    }))
}

fn collect_ports(
    driver: &ChipDriver,
    platform: &'static PlatformDescriptor,
    ports: &[u8],
) -> Result<Vec<serde_json::Value>> {
    let mut out = Vec::with_capacity(ports.len());
    for &port_id in ports {
        let ops = PortOps { driver, platform, port_id };
        let view = ops.current_status()?;
        out.push(json!({
            "PORT_ID": view.port_id + 1,
            "STATUS": status_str(view.status),
            "ENDIS": if view.enabled { "Enable" } else { "Disable" },
            "PRIORITY": priority_str(view.priority),
            "PROTOCOL": protocol_str(view.protocol),
            "CLASS": class_str(view.class),
            "POWER_CONSUMP": view.power_consumption_mw,
            "POWER_LIMIT": view.power_limit_mw,
            "VOLTAGE": view.voltage_dv as f32 / 10.0,
            "CURRENT": view.current_ma,
            "LATCH": view.latch,
            "EN_4PAIR": view.en_4pair,
        }));
    }
    Ok(out)
}

fn class_str(class: PortClass) -> String {
    class.to_string()
}

fn individual_masks(driver: &ChipDriver) -> Result<serde_json::Map<String, serde_json::Value>> {
    let mut masks = serde_json::Map::new();
    for mask_num in 0..0x54u8 {
        let mask = driver.get_individual_mask(mask_num)?;
        masks.insert(format!("0x{mask_num:02x}"), json!(mask.endis));
    }
    Ok(masks)
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

fn print_versions(sw: &str, agent: &str, config: &str) {
    println!("PoE SW Versions: {sw}");
    println!("PoE Agent Version: {agent}");
    println!("PoE Config Version: {config}");
}

fn print_system(info: &serde_json::Value, debug: bool) {
    println!();
    println!("==============================");
    println!(" PoE System Information");
    println!("==============================");
    println!(" Total PoE Ports   : {}", info["TOTAL_PORTS"]);
    println!();
    println!(" Total Power       : {:.1} W", info["TOTAL_POWER"].as_f64().unwrap_or_default());
    println!(" Power Consumption : {:.1} W", info["POWER_CONSUMP"].as_f64().unwrap_or_default());
    println!(" Power Available   : {:.1} W", info["POWER_AVAIL"].as_f64().unwrap_or_default());
    println!();
    println!(" Power Bank #      : {}", info["POWER_BANK"]);
    println!(" Power Sources     : {}", info["POWER_SRC"].as_str().unwrap_or_default());
    println!();
    if debug {
        println!(" Max Shutdown Volt : {:.1} V", info["MAX_SD_VOLT"].as_f64().unwrap_or_default());
        println!(" Min Shutdown Volt : {:.1} V", info["MIN_SD_VOLT"].as_f64().unwrap_or_default());
        println!();
        println!(" PM1               : 0x{:02x}", info["PM1"].as_u64().unwrap_or_default());
        println!(" PM2               : 0x{:02x}", info["PM2"].as_u64().unwrap_or_default());
        println!(" PM3               : 0x{:02x}", info["PM3"].as_u64().unwrap_or_default());
        println!();
        println!(" CPU Status1       : 0x{:02x}", info["CPU_STATUS1"].as_u64().unwrap_or_default());
        println!(" CPU Status2       : 0x{:02x}", info["CPU_STATUS2"].as_u64().unwrap_or_default());
        println!(" FAC Default       : {}", info["FAC_DEFAULT"]);
        println!(" General Intl Err  : 0x{:02x}", info["GIE"].as_u64().unwrap_or_default());
        println!(" Private Label     : 0x{:02x}", info["PRIV_LABEL"].as_u64().unwrap_or_default());
        println!(" User Byte         : 0x{:02x}", info["USER_BYTE"].as_u64().unwrap_or_default());
        println!(" Device Fail       : 0x{:02x}", info["DEVICE_FAIL"].as_u64().unwrap_or_default());
        println!(" Temp Disconnect   : 0x{:02x}", info["TEMP_DISCO"].as_u64().unwrap_or_default());
        println!(" Temp Alarm        : 0x{:02x}", info["TEMP_ALARM"].as_u64().unwrap_or_default());
        println!(" Interrupt Reg     : 0x{:04x}", info["INTR_REG"].as_u64().unwrap_or_default());
        println!();
    }
}

fn print_ports(ports: &[serde_json::Value], debug: bool) {
    println!();
    if debug {
        println!("Port  Status             En/Dis   Priority  Protocol        Class  PWR Consump  PWR Limit    Voltage    Current   Latch  En4Pair");
        println!("----  -----------------  -------  --------  --------------  -----  -----------  -----------  ---------  --------  -----  -------");
    } else {
        println!("Port  Status             En/Dis   Priority  Protocol        Class  PWR Consump  PWR Limit    Voltage    Current ");
        println!("----  -----------------  -------  --------  --------------  -----  -----------  -----------  ---------  --------");
    }
    for p in ports {
        let base = format!(
            "{:<4}  {:17}  {:7}  {:^8}  {:14}  {:^5}  {:>6} (mW)  {:>6} (mW)  {:>5.1} (V)  {:>3} (mA)",
            p["PORT_ID"], p["STATUS"].as_str().unwrap_or_default(), p["ENDIS"].as_str().unwrap_or_default(),
            p["PRIORITY"].as_str().unwrap_or_default(), p["PROTOCOL"].as_str().unwrap_or_default(),
            p["CLASS"].as_str().unwrap_or_default(), p["POWER_CONSUMP"], p["POWER_LIMIT"],
            p["VOLTAGE"].as_f64().unwrap_or_default(), p["CURRENT"],
        );
        if debug {
            println!(
                "{base}  0x{:02x}  {:>4}",
                p["LATCH"].as_u64().unwrap_or_default(), p["EN_4PAIR"]
            );
        } else {
            println!("{base}");
        }
    }
    println!();
}

fn print_masks(masks: &serde_json::Map<String, serde_json::Value>) {
    println!();
    println!("==================");
    println!(" Individual Masks");
    println!("==================");
    for (key, val) in masks {
        println!(" {key}:{:>2}", val);
    }
    println!();
}
