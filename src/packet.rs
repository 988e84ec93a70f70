//! BOOTP packet parsing and encoding per RFC 951.
//!
//! A BOOTP message is a fixed 300-byte layout: a 236-byte header followed
//! by a 64-byte vendor area whose first four bytes carry the RFC 1048
//! magic cookie. Vendor extensions are not interpreted.
//!
//! # Packet Structure
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     op (1)    |   htype (1)   |   hlen (1)    |   hops (1)    |
//! +---------------+---------------+---------------+---------------+
//! |                            xid (4)                            |
//! +-------------------------------+-------------------------------+
//! |           secs (2)            |           flags (2)           |
//! +-------------------------------+-------------------------------+
//! |                          ciaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          yiaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          siaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          giaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          chaddr (16)                          |
//! +---------------------------------------------------------------+
//! |                          sname (64)                           |
//! +---------------------------------------------------------------+
//! |                          file (128)                           |
//! +---------------------------------------------------------------+
//! |                    magic cookie (4) = 99.130.83.99            |
//! +---------------------------------------------------------------+
//! |                    vendor extensions (60)                     |
//! +---------------------------------------------------------------+
//! ```
//!
//! # References
//!
//! - RFC 951: Bootstrap Protocol (BOOTP)
//! - RFC 1048: BOOTP Vendor Information Extensions

use std::fmt::Write;
use std::net::Ipv4Addr;

use crate::error::{Error, Result};

/// RFC 1048 magic cookie placed at the start of the vendor area.
pub const MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];

const BOOTP_CHADDR_SIZE: usize = 16;
const BOOTP_SNAME_SIZE: usize = 64;
const BOOTP_FILE_SIZE: usize = 128;

const BOOTP_CHADDR_OFFSET: usize = 28;
const BOOTP_SNAME_OFFSET: usize = BOOTP_CHADDR_OFFSET + BOOTP_CHADDR_SIZE;
const BOOTP_FILE_OFFSET: usize = BOOTP_SNAME_OFFSET + BOOTP_SNAME_SIZE;
const BOOTP_MAGIC_COOKIE_OFFSET: usize = BOOTP_FILE_OFFSET + BOOTP_FILE_SIZE;

/// Size of every BOOTP message on the wire.
pub const BOOTP_PACKET_SIZE: usize = 300;

/// End tag terminating the vendor extension list.
const VENDOR_END: u8 = 255;

/// Number of `chaddr` bytes used as the client key.
const ETHERNET_ADDRESS_LEN: usize = 6;

/// BOOTP operation code for client requests.
pub const BOOTREQUEST: u8 = 1;

/// BOOTP operation code for server replies.
pub const BOOTREPLY: u8 = 2;

/// Hardware type for Ethernet.
pub const HTYPE_ETHERNET: u8 = 1;

/// Hardware address length for Ethernet (6 bytes).
pub const HLEN_ETHERNET: u8 = 6;

/// A decoded BOOTP message.
///
/// This struct represents both client requests and server replies.
/// Use [`parse`](Self::parse) for incoming datagrams and
/// [`create_reply`](Self::create_reply) to construct responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootpPacket {
    /// Operation code: [`BOOTREQUEST`] (1) or [`BOOTREPLY`] (2).
    pub op: u8,

    /// Hardware address type. [`HTYPE_ETHERNET`] (1) for Ethernet.
    pub htype: u8,

    /// Hardware address length. [`HLEN_ETHERNET`] (6) for Ethernet.
    pub hlen: u8,

    /// Hop count, incremented by relay agents.
    pub hops: u8,

    /// Transaction ID chosen by the client, echoed in replies.
    pub xid: u32,

    /// Seconds elapsed since the client started booting.
    pub secs: u16,

    /// Flags, echoed verbatim.
    pub flags: u16,

    /// Client IP address, if the client already knows it.
    pub ciaddr: Ipv4Addr,

    /// "Your" IP address - the address being assigned to the client.
    pub yiaddr: Ipv4Addr,

    /// Boot server address.
    pub siaddr: Ipv4Addr,

    /// Gateway IP address - set by relay agents.
    pub giaddr: Ipv4Addr,

    /// Client hardware address. Only the first `hlen` bytes are significant.
    pub chaddr: [u8; 16],

    /// Server host name, NUL padded.
    pub sname: [u8; 64],

    /// Boot file name, NUL padded.
    pub file: [u8; 128],

    /// First four bytes of the vendor area.
    pub magic: [u8; 4],
}

impl Default for BootpPacket {
    fn default() -> Self {
        Self {
            op: BOOTREQUEST,
            htype: HTYPE_ETHERNET,
            hlen: HLEN_ETHERNET,
            hops: 0,
            xid: 0,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: [0u8; 16],
            sname: [0u8; 64],
            file: [0u8; 128],
            magic: [0u8; 4],
        }
    }
}

impl BootpPacket {
    /// Parses a BOOTP packet from raw bytes.
    ///
    /// Bytes past the fixed layout are ignored, and so are the vendor
    /// extensions after the magic cookie.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPacket`] if fewer than 300 bytes are available.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < BOOTP_PACKET_SIZE {
            return Err(Error::MalformedPacket(format!(
                "Packet too short: {} bytes (minimum {})",
                data.len(),
                BOOTP_PACKET_SIZE
            )));
        }

        let op = data[0];
        let htype = data[1];
        let hlen = data[2];
        let hops = data[3];

        let xid = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let secs = u16::from_be_bytes([data[8], data[9]]);
        let flags = u16::from_be_bytes([data[10], data[11]]);

        let ciaddr = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
        let yiaddr = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
        let siaddr = Ipv4Addr::new(data[20], data[21], data[22], data[23]);
        let giaddr = Ipv4Addr::new(data[24], data[25], data[26], data[27]);

        let mut chaddr = [0u8; 16];
        chaddr.copy_from_slice(&data[BOOTP_CHADDR_OFFSET..BOOTP_SNAME_OFFSET]);

        let mut sname = [0u8; 64];
        sname.copy_from_slice(&data[BOOTP_SNAME_OFFSET..BOOTP_FILE_OFFSET]);

        let mut file = [0u8; 128];
        file.copy_from_slice(&data[BOOTP_FILE_OFFSET..BOOTP_MAGIC_COOKIE_OFFSET]);

        let mut magic = [0u8; 4];
        magic.copy_from_slice(
            &data[BOOTP_MAGIC_COOKIE_OFFSET..BOOTP_MAGIC_COOKIE_OFFSET + MAGIC_COOKIE.len()],
        );

        Ok(Self {
            op,
            htype,
            hlen,
            hops,
            xid,
            secs,
            flags,
            ciaddr,
            yiaddr,
            siaddr,
            giaddr,
            chaddr,
            sname,
            file,
            magic,
        })
    }

    /// Encodes the packet to exactly 300 bytes for transmission.
    ///
    /// When the magic cookie is the RFC 1048 value, an End tag follows it
    /// so clients see an empty extension list.
    pub fn encode(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(BOOTP_PACKET_SIZE);

        packet.push(self.op);
        packet.push(self.htype);
        packet.push(self.hlen);
        packet.push(self.hops);

        packet.extend_from_slice(&self.xid.to_be_bytes());
        packet.extend_from_slice(&self.secs.to_be_bytes());
        packet.extend_from_slice(&self.flags.to_be_bytes());

        packet.extend_from_slice(&self.ciaddr.octets());
        packet.extend_from_slice(&self.yiaddr.octets());
        packet.extend_from_slice(&self.siaddr.octets());
        packet.extend_from_slice(&self.giaddr.octets());

        packet.extend_from_slice(&self.chaddr);
        packet.extend_from_slice(&self.sname);
        packet.extend_from_slice(&self.file);

        packet.extend_from_slice(&self.magic);
        if self.magic == MAGIC_COOKIE {
            packet.push(VENDOR_END);
        }

        packet.resize(BOOTP_PACKET_SIZE, 0);
        packet
    }

    /// Formats the first six `chaddr` bytes as a lower-case,
    /// colon-separated string such as "aa:bb:cc:dd:ee:ff".
    ///
    /// The six-byte window is used regardless of `hlen`.
    pub fn hardware_address(&self) -> String {
        let mut result = String::with_capacity(ETHERNET_ADDRESS_LEN * 3);
        for (index, byte) in self.chaddr[..ETHERNET_ADDRESS_LEN].iter().enumerate() {
            if index > 0 {
                result.push(':');
            }
            let _ = write!(result, "{:02x}", byte);
        }
        result
    }

    /// Returns the boot file name up to the first NUL byte.
    pub fn boot_file(&self) -> String {
        nul_terminated(&self.file)
    }

    /// Returns the server host name up to the first NUL byte.
    pub fn server_name(&self) -> String {
        nul_terminated(&self.sname)
    }

    /// Stores `name` in `file`, truncated to 128 bytes and NUL padded.
    pub fn set_boot_file(&mut self, name: &str) {
        self.file = [0u8; BOOTP_FILE_SIZE];
        let bytes = name.as_bytes();
        let len = bytes.len().min(BOOTP_FILE_SIZE);
        self.file[..len].copy_from_slice(&bytes[..len]);
    }

    /// Creates a reply for `request` offering `your_ip`.
    ///
    /// # Preserved Fields
    ///
    /// Copied from the request: `htype`, `hlen`, `xid`, `flags` and `chaddr`.
    /// `hops` and `secs` are reset, `ciaddr`, `giaddr`, `siaddr`, `sname`
    /// and `file` start zeroed, and the magic cookie is set.
    pub fn create_reply(request: &BootpPacket, your_ip: Ipv4Addr) -> Self {
        Self {
            op: BOOTREPLY,
            htype: request.htype,
            hlen: request.hlen,
            hops: 0,
            xid: request.xid,
            secs: 0,
            flags: request.flags,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: your_ip,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: request.chaddr,
            sname: [0u8; 64],
            file: [0u8; 128],
            magic: MAGIC_COOKIE,
        }
    }
}

fn nul_terminated(field: &[u8]) -> String {
    let end = field.iter().position(|&byte| byte == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
