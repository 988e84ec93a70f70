//! Server configuration in the ISC-DHCP `dhcpd.conf` dialect.
//!
//! The model is a frozen snapshot: it is built once at startup and shared
//! behind an [`Arc`](std::sync::Arc) for the life of the process. Values are
//! kept as written in the file (empty string means "not set") so that the
//! address book decides, per entry, what is usable.
//!
//! # Supported syntax
//!
//! ```text
//! authoritative;
//! default-lease-time 600;
//!
//! subnet 192.168.1.0 netmask 255.255.255.0 {
//!   range 192.168.1.100 192.168.1.200;
//!   option tftp-server-name "192.168.1.10";
//!   option bootfile-name "pxelinux.0";
//!
//!   host client1 {
//!     hardware ethernet 00:11:22:33:44:55;
//!     fixed-address 192.168.1.10;
//!   }
//! }
//!
//! host global-client {
//!   hardware ethernet aa:bb:cc:dd:ee:ff;
//!   fixed-address 192.168.2.10;
//! }
//! ```

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Subnet option carrying the boot server address placed in `siaddr`.
pub const OPTION_TFTP_SERVER_NAME: &str = "tftp-server-name";

/// Subnet option carrying the boot file name placed in `file`.
pub const OPTION_BOOTFILE_NAME: &str = "bootfile-name";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub subnets: Vec<Subnet>,
    pub hosts: Vec<Host>,
    pub global_options: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Subnet {
    pub network: String,
    pub netmask: String,
    pub range_start: String,
    pub range_end: String,
    pub options: HashMap<String, String>,
    pub hosts: Vec<Host>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Host {
    pub name: String,
    pub hardware: String,
    pub fixed_address: String,
    pub options: HashMap<String, String>,
}

impl Subnet {
    /// Returns the dynamic range bounds if both are set and parse as IPv4.
    pub fn dynamic_range(&self) -> Option<(Ipv4Addr, Ipv4Addr)> {
        if self.range_start.is_empty() || self.range_end.is_empty() {
            return None;
        }
        let start = self.range_start.parse().ok()?;
        let end = self.range_end.parse().ok()?;
        Some((start, end))
    }

    /// Returns true if `ip` lies inside `network`/`netmask`.
    ///
    /// False when either value is missing or unparseable.
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        let (Ok(network), Ok(netmask)) = (
            self.network.parse::<Ipv4Addr>(),
            self.netmask.parse::<Ipv4Addr>(),
        ) else {
            return false;
        };
        let mask = u32::from(netmask);
        u32::from(ip) & mask == u32::from(network) & mask
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

impl Host {
    /// A host is a static reservation when both hardware and fixed address are set.
    pub fn is_reservation(&self) -> bool {
        !self.hardware.is_empty() && !self.fixed_address.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    Global,
    Subnet,
    HostInSubnet,
    HostGlobal,
}

impl Config {
    /// Loads configuration from a file.
    ///
    /// Files ending in `.json` are read as the serialized model (the format
    /// printed by `show-config`); anything else is parsed as `dhcpd.conf`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, JSON is malformed, or the
    /// configuration declares neither subnets nor hosts.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let is_json = path
            .extension()
            .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));

        let config = if is_json {
            serde_json::from_str(&content)?
        } else {
            Self::parse(&content)
        };

        config.validate()?;
        Ok(config)
    }

    /// Parses `dhcpd.conf` text.
    ///
    /// Parsing is lenient: unknown statements are ignored and blocks left
    /// open at end of input are closed implicitly.
    pub fn parse(content: &str) -> Self {
        let mut config = Config::default();
        let mut state = ParserState::Global;
        let mut subnet = Subnet::default();
        let mut host = Host::default();

        for (index, raw_line) in content.lines().enumerate() {
            let line_number = index + 1;
            let line = raw_line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let statement = line.strip_suffix(';').unwrap_or(line).trim();

            match state {
                ParserState::Global => {
                    if let Some(declaration) = block_declaration(line, "subnet") {
                        subnet = parse_subnet_declaration(declaration, line_number);
                        state = ParserState::Subnet;
                    } else if let Some(declaration) = block_declaration(line, "host") {
                        host = parse_host_declaration(declaration);
                        state = ParserState::HostGlobal;
                    } else if let Some((key, value)) = parse_option(statement) {
                        config.global_options.insert(key, value);
                    } else if line.ends_with(';') && !line.contains('{') {
                        let (key, value) = statement
                            .split_once(char::is_whitespace)
                            .map(|(key, value)| (key, value.trim()))
                            .unwrap_or((statement, ""));
                        config
                            .global_options
                            .insert(key.to_string(), value.to_string());
                    } else {
                        debug!("Line {}: ignoring global statement '{}'", line_number, line);
                    }
                }
                ParserState::Subnet => {
                    if line.starts_with('}') {
                        config.subnets.push(std::mem::take(&mut subnet));
                        state = ParserState::Global;
                    } else if let Some(declaration) = block_declaration(line, "host") {
                        host = parse_host_declaration(declaration);
                        state = ParserState::HostInSubnet;
                    } else if let Some(bounds) = statement.strip_prefix("range ") {
                        let mut parts = bounds.split_whitespace();
                        match (parts.next(), parts.next()) {
                            (Some(start), Some(end)) => {
                                subnet.range_start = start.to_string();
                                subnet.range_end = end.to_string();
                            }
                            _ => warn!("Line {}: incomplete range '{}'", line_number, line),
                        }
                    } else if let Some((key, value)) = parse_option(statement) {
                        subnet.options.insert(key, value);
                    } else {
                        debug!("Line {}: ignoring subnet statement '{}'", line_number, line);
                    }
                }
                ParserState::HostInSubnet | ParserState::HostGlobal => {
                    if line.starts_with('}') {
                        let finished = std::mem::take(&mut host);
                        if state == ParserState::HostInSubnet {
                            subnet.hosts.push(finished);
                            state = ParserState::Subnet;
                        } else {
                            config.hosts.push(finished);
                            state = ParserState::Global;
                        }
                    } else if let Some(mac) = statement.strip_prefix("hardware ethernet ") {
                        host.hardware = mac.trim().to_string();
                    } else if let Some(address) = statement.strip_prefix("fixed-address ") {
                        host.fixed_address = address.trim().to_string();
                    } else if let Some((key, value)) = parse_option(statement) {
                        host.options.insert(key, value);
                    } else {
                        debug!("Line {}: ignoring host statement '{}'", line_number, line);
                    }
                }
            }
        }

        match state {
            ParserState::Global => {}
            ParserState::Subnet => {
                warn!("Unterminated subnet block {} at end of input", subnet.network);
                config.subnets.push(subnet);
            }
            ParserState::HostInSubnet => {
                warn!("Unterminated host block {} at end of input", host.name);
                subnet.hosts.push(host);
                config.subnets.push(subnet);
            }
            ParserState::HostGlobal => {
                warn!("Unterminated host block {} at end of input", host.name);
                config.hosts.push(host);
            }
        }

        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.subnets.is_empty() && self.hosts.is_empty() {
            return Err(Error::InvalidConfig(
                "configuration declares no subnets and no hosts".to_string(),
            ));
        }
        Ok(())
    }

    /// Iterates all hosts with the index of their enclosing subnet
    /// (`None` for globally declared hosts).
    pub fn all_hosts(&self) -> impl Iterator<Item = (Option<usize>, &Host)> {
        let nested = self
            .subnets
            .iter()
            .enumerate()
            .flat_map(|(index, subnet)| subnet.hosts.iter().map(move |host| (Some(index), host)));
        let global = self.hosts.iter().map(|host| (None, host));
        nested.chain(global)
    }
}

/// Returns the text before `{` if `line` opens a block of the given kind.
fn block_declaration<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(keyword)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let (declaration, _) = rest.split_once('{')?;
    Some(declaration.trim())
}

fn parse_subnet_declaration(declaration: &str, line_number: usize) -> Subnet {
    let parts: Vec<&str> = declaration.split_whitespace().collect();
    match parts.as_slice() {
        [network, "netmask", netmask] => Subnet {
            network: network.to_string(),
            netmask: netmask.to_string(),
            ..Default::default()
        },
        _ => {
            warn!(
                "Line {}: subnet declaration '{}' is missing a netmask",
                line_number, declaration
            );
            Subnet::default()
        }
    }
}

fn parse_host_declaration(declaration: &str) -> Host {
    Host {
        name: declaration
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string(),
        ..Default::default()
    }
}

/// Parses `option <name> <value...>`, joining value words with single
/// spaces and removing surrounding double quotes.
fn parse_option(statement: &str) -> Option<(String, String)> {
    let rest = statement.strip_prefix("option ")?;
    let mut words = rest.split_whitespace();
    let key = words.next()?;
    let value = words.collect::<Vec<_>>().join(" ");
    if value.is_empty() {
        return None;
    }
    Some((key.to_string(), value.trim_matches('"').to_string()))
}
