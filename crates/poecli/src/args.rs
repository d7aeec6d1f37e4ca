//! Argument parsing, grounded in `PoeCLI._build_parser`/`valid_ports`/
//! `valid_powerlimit` (`poecli.py`). Hand-rolled rather than pulled from a
//! derive-macro crate since the grammar is small, has one genuinely
//! unusual piece (the comma/range port list), and the whole parser fits
//! in one straightforward pass over `std::env::args`.

use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ArgError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Critical = 1,
    High = 2,
    Low = 3,
}

impl Priority {
    fn from_level(n: u32) -> Option<Priority> {
        match n {
            1 => Some(Priority::Critical),
            2 => Some(Priority::High),
            3 => Some(Priority::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShowArgs {
    pub ports: Option<Vec<u8>>,
    pub system: bool,
    pub mask: bool,
    pub all: bool,
    pub version: bool,
    pub debug: bool,
    pub json: bool,
}

#[derive(Debug, Clone)]
pub struct SetArgs {
    pub ports: Vec<u8>,
    pub enable: Option<bool>,
    pub level: Option<Priority>,
    pub power_limit: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum Command {
    Show(ShowArgs),
    Set(SetArgs),
    Save,
    Restore,
}

/// `PORTLIST_VALIDATION1`/`PORTLIST_VALIDATION2`: each comma-separated
/// token is either `N` (1-based) or `M-N` (inclusive, either order).
/// Ports are returned 0-based, sorted and deduplicated, matching
/// `valid_ports`'s `sorted(set(portList))`.
pub fn parse_port_list(data: &str, total_poe_port: u8) -> Result<Vec<u8>, ArgError> {
    let mut ports: Vec<u8> = Vec::new();
    for token in data.split(',') {
        let token = token.trim();
        if let Some((a, b)) = token.split_once('-') {
            let start: i32 = a.parse().map_err(|_| bad_port_list(data))?;
            let end: i32 = b.parse().map_err(|_| bad_port_list(data))?;
            let (mut start, mut end) = (start - 1, end - 1);
            if end < start {
                std::mem::swap(&mut start, &mut end);
            }
            if start < 0 || end >= total_poe_port as i32 {
                return Err(bad_port_list(data));
            }
            for p in start..=end {
                ports.push(p as u8);
            }
        } else {
            let port: i32 = token.parse().map_err(|_| bad_port_list(data))?;
            let port = port - 1;
            if port < 0 || port >= total_poe_port as i32 {
                return Err(bad_port_list(data));
            }
            ports.push(port as u8);
        }
    }
    ports.sort_unstable();
    ports.dedup();
    Ok(ports)
}

fn bad_port_list(data: &str) -> ArgError {
    ArgError(format!("invalid port inputs: '{data}'"))
}

/// `valid_powerlimit`: any value parseable as an integer in `0..=0xffff`.
pub fn parse_power_limit(data: &str) -> Result<u32, ArgError> {
    let parsed = if let Some(hex) = data.strip_prefix("0x").or_else(|| data.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        data.parse::<u32>()
    };
    match parsed {
        Ok(v) if v <= 0xffff => Ok(v),
        _ => Err(ArgError(format!("invalid power limit: '{data}'"))),
    }
}

pub fn parse_args(args: &[String], total_poe_port: u8) -> Result<Command, ArgError> {
    let mut it = args.iter();
    let subcmd = it.next().ok_or_else(|| ArgError("expected a subcommand".into()))?;

    match subcmd.as_str() {
        "show" => {
            let mut show = ShowArgs {
                ports: None,
                system: false,
                mask: false,
                all: false,
                version: false,
                debug: false,
                json: false,
            };
            while let Some(arg) = it.next() {
                match arg.as_str() {
                    "-p" | "--ports" => {
                        let v = it.next().ok_or_else(|| ArgError("-p requires a value".into()))?;
                        show.ports = Some(parse_port_list(v, total_poe_port)?);
                    }
                    "-s" | "--system" => show.system = true,
                    "-m" | "--mask" => show.mask = true,
                    "-a" | "--all" => show.all = true,
                    "-v" | "--version" => show.version = true,
                    "-d" | "--debug" => show.debug = true,
                    "-j" | "--json" => show.json = true,
                    other => return Err(ArgError(format!("unrecognized argument '{other}'"))),
                }
            }
            if show.ports.is_none() && !show.system && !show.all && !show.mask && !show.version {
                return Err(ArgError("no action requested for show command".into()));
            }
            Ok(Command::Show(show))
        }
        "set" => {
            let mut ports = None;
            let mut enable = None;
            let mut level = None;
            let mut power_limit = None;
            while let Some(arg) = it.next() {
                match arg.as_str() {
                    "-p" | "--ports" => {
                        let v = it.next().ok_or_else(|| ArgError("-p requires a value".into()))?;
                        ports = Some(parse_port_list(v, total_poe_port)?);
                    }
                    "-e" | "--enable" => {
                        let v = it.next().ok_or_else(|| ArgError("-e requires a value".into()))?;
                        enable = match v.as_str() {
                            "0" => Some(false),
                            "1" => Some(true),
                            other => return Err(ArgError(format!("invalid value for -e: '{other}'"))),
                        };
                    }
                    "-l" | "--level" => {
                        let v = it.next().ok_or_else(|| ArgError("-l requires a value".into()))?;
                        let n: u32 = v.parse().map_err(|_| ArgError(format!("invalid value for -l: '{v}'")))?;
                        level = Some(Priority::from_level(n).ok_or_else(|| ArgError(format!("invalid value for -l: '{v}'")))?);
                    }
                    "-o" | "--powerLimit" => {
                        let v = it.next().ok_or_else(|| ArgError("-o requires a value".into()))?;
                        power_limit = Some(parse_power_limit(v)?);
                    }
                    other => return Err(ArgError(format!("unrecognized argument '{other}'"))),
                }
            }
            let ports = ports.ok_or_else(|| ArgError("set requires -p/--ports".into()))?;
            if enable.is_none() && level.is_none() && power_limit.is_none() {
                return Err(ArgError("no action requested for set command".into()));
            }
            Ok(Command::Set(SetArgs { ports, enable, level, power_limit }))
        }
        "save" => {
            let mut settings = false;
            while let Some(arg) = it.next() {
                match arg.as_str() {
                    "-s" | "--settings" => settings = true,
                    other => return Err(ArgError(format!("unrecognized argument '{other}'"))),
                }
            }
            if !settings {
                return Err(ArgError("no action requested for save command".into()));
            }
            Ok(Command::Save)
        }
        "restore" => Ok(Command::Restore),
        other => Err(ArgError(format!("unrecognized command '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_ports_and_ranges() {
        let ports = parse_port_list("1,3-5,10", 48).unwrap();
        assert_eq!(ports, vec![0, 2, 3, 4, 9]);
    }

    #[test]
    fn reversed_range_is_normalized() {
        let ports = parse_port_list("5-3", 48).unwrap();
        assert_eq!(ports, vec![2, 3, 4]);
    }

    #[test]
    fn out_of_range_port_is_rejected() {
        assert!(parse_port_list("49", 48).is_err());
        assert!(parse_port_list("0", 48).is_err());
    }

    #[test]
    fn duplicate_ports_collapse() {
        let ports = parse_port_list("1,1,1-2", 48).unwrap();
        assert_eq!(ports, vec![0, 1]);
    }

    #[test]
    fn power_limit_accepts_hex_and_rejects_out_of_range() {
        assert_eq!(parse_power_limit("0x1770").unwrap(), 0x1770);
        assert_eq!(parse_power_limit("65535").unwrap(), 0xffff);
        assert!(parse_power_limit("65536").is_err());
    }

    #[test]
    fn set_requires_an_action() {
        let args = vec!["set".to_string(), "-p".to_string(), "1".to_string()];
        assert!(parse_args(&args, 48).is_err());
    }

    #[test]
    fn set_parses_enable_level_and_power_limit() {
        let args = vec![
            "set".to_string(), "-p".to_string(), "1-4".to_string(),
            "-e".to_string(), "1".to_string(),
            "-l".to_string(), "2".to_string(),
            "-o".to_string(), "30000".to_string(),
        ];
        match parse_args(&args, 48).unwrap() {
            Command::Set(set) => {
                assert_eq!(set.ports, vec![0, 1, 2, 3]);
                assert_eq!(set.enable, Some(true));
                assert_eq!(set.level, Some(Priority::High));
                assert_eq!(set.power_limit, Some(30_000));
            }
            other => panic!("expected Set, got {other:?}"),
        }
    }
}
