//! # bootpd
//!
//! A BOOTP server (RFC 951) that hands out IPv4 addresses from an
//! ISC-DHCP style `dhcpd.conf`.
//!
//! ## Features
//!
//! - Static reservations from `host` blocks (`hardware ethernet` + `fixed-address`)
//! - Dynamic allocation from subnet `range` statements with one-hour leases
//! - Boot server and boot file taken from the subnet's `tftp-server-name`
//!   and `bootfile-name` options
//! - Async/await with Tokio
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::net::{Ipv4Addr, SocketAddrV4};
//!
//! use bootpd::{BootpServer, Config};
//!
//! #[tokio::main]
//! async fn main() -> bootpd::Result<()> {
//!     let config = Config::load("/etc/dhcp/dhcpd.conf")?;
//!     let listen = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 67);
//!     let server = BootpServer::new(config, listen)?;
//!     server.run().await
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`Config`] - Subnets, hosts and options parsed from the configuration file
//! - [`BootpPacket`] - Fixed 300-byte BOOTP message codec
//! - [`AddressBook`] - Static reservations and dynamic leases behind one lock
//! - [`RequestProcessor`] - Builds the reply for a request, if any
//! - [`BootpServer`] - UDP listener on port 67

pub mod address_book;
pub mod config;
pub mod error;
pub mod packet;
pub mod processor;
pub mod server;

pub use address_book::{AddressBook, AllocationKind, AllocationRecord, Assignment};
pub use config::{Config, Host, Subnet};
pub use error::{Error, Result};
pub use packet::BootpPacket;
pub use processor::RequestProcessor;
pub use server::BootpServer;
