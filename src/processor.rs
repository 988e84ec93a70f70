//! Turns a decoded BOOTP request into a reply.

use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::address_book::AddressBook;
use crate::config::{Config, OPTION_BOOTFILE_NAME, OPTION_TFTP_SERVER_NAME};
use crate::error::Error;
use crate::packet::BootpPacket;

/// Resolves clients against the [`AddressBook`] and assembles replies.
#[derive(Debug, Clone)]
pub struct RequestProcessor {
    config: Arc<Config>,
    address_book: Arc<AddressBook>,
}

impl RequestProcessor {
    pub fn new(config: Arc<Config>, address_book: Arc<AddressBook>) -> Self {
        Self {
            config,
            address_book,
        }
    }

    pub fn address_book(&self) -> &AddressBook {
        &self.address_book
    }

    /// Builds the reply for `request`, or returns `None` when the client
    /// must not be answered.
    ///
    /// Clients without a static reservation are silently dropped when no
    /// dynamic address can be found for them.
    pub async fn process(&self, request: &BootpPacket) -> Option<BootpPacket> {
        let mac = request.hardware_address();

        let assignment = match self.address_book.resolve(&mac).await {
            Ok(assignment) => assignment,
            Err(Error::UnknownClient(_)) => {
                warn!("No configuration found for client {}", mac);
                return None;
            }
            Err(Error::PoolExhausted(_)) => {
                warn!("Dynamic ranges exhausted, cannot assign an address to {}", mac);
                return None;
            }
            Err(error) => {
                warn!("Failed to resolve client {}: {}", mac, error);
                return None;
            }
        };

        let mut reply = BootpPacket::create_reply(request, assignment.address);

        if let Some(subnet) = assignment
            .subnet
            .and_then(|index| self.config.subnets.get(index))
        {
            if let Some(server) = subnet.option(OPTION_TFTP_SERVER_NAME) {
                match server.parse::<Ipv4Addr>() {
                    Ok(address) => reply.siaddr = address,
                    Err(_) => warn!(
                        "Subnet {}: {} '{}' is not an IPv4 address, leaving siaddr unset",
                        subnet.network, OPTION_TFTP_SERVER_NAME, server
                    ),
                }
            }

            if let Some(boot_file) = subnet.option(OPTION_BOOTFILE_NAME) {
                reply.set_boot_file(boot_file);
            }
        } else {
            debug!("Client {} has no subnet, sending address only", mac);
        }

        info!("Assigning {} to {}", assignment.address, mac);
        Some(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{BOOTREPLY, BOOTREQUEST, MAGIC_COOKIE};

    const SCENARIO_CONFIG: &str = r#"
subnet 192.168.1.0 netmask 255.255.255.0 {
  range 192.168.1.100 192.168.1.102;
  option tftp-server-name "192.168.1.10";
  option bootfile-name "pxelinux.0";

  host client1 {
    hardware ethernet 00:11:22:33:44:55;
    fixed-address 192.168.1.10;
  }
}

host global-client {
  hardware ethernet aa:bb:cc:dd:ee:ff;
  fixed-address 192.168.2.10;
}
"#;

    fn create_processor(config: &str) -> RequestProcessor {
        let config = Arc::new(Config::parse(config));
        let address_book = Arc::new(AddressBook::new(Arc::clone(&config)));
        RequestProcessor::new(config, address_book)
    }

    fn create_request(mac: [u8; 6], xid: u32) -> BootpPacket {
        let mut request = BootpPacket {
            op: BOOTREQUEST,
            xid,
            secs: 12,
            hops: 1,
            flags: 0x8000,
            ciaddr: Ipv4Addr::new(10, 1, 1, 1),
            giaddr: Ipv4Addr::new(10, 1, 1, 254),
            ..Default::default()
        };
        request.chaddr[..6].copy_from_slice(&mac);
        request
    }

    #[tokio::test]
    async fn test_static_client_reply() {
        let processor = create_processor(SCENARIO_CONFIG);
        let request = create_request([0x00, 0x11, 0x22, 0x33, 0x44, 0x55], 0xcafebabe);

        let reply = processor.process(&request).await.unwrap();

        assert_eq!(reply.op, BOOTREPLY);
        assert_eq!(reply.htype, request.htype);
        assert_eq!(reply.hlen, request.hlen);
        assert_eq!(reply.xid, 0xcafebabe);
        assert_eq!(reply.flags, 0x8000);
        assert_eq!(reply.chaddr, request.chaddr);
        assert_eq!(reply.hops, 0);
        assert_eq!(reply.secs, 0);
        assert_eq!(reply.yiaddr, Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(reply.siaddr, Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(reply.boot_file(), "pxelinux.0");
        assert_eq!(reply.ciaddr, Ipv4Addr::UNSPECIFIED);
        assert_eq!(reply.giaddr, Ipv4Addr::UNSPECIFIED);
        assert_eq!(reply.server_name(), "");
        assert_eq!(reply.magic, MAGIC_COOKIE);
    }

    #[tokio::test]
    async fn test_global_host_gets_address_only() {
        let processor = create_processor(SCENARIO_CONFIG);
        let request = create_request([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff], 1);

        let reply = processor.process(&request).await.unwrap();

        assert_eq!(reply.yiaddr, Ipv4Addr::new(192, 168, 2, 10));
        assert_eq!(reply.siaddr, Ipv4Addr::UNSPECIFIED);
        assert_eq!(reply.boot_file(), "");
    }

    #[tokio::test]
    async fn test_dynamic_clients_then_silence() {
        let processor = create_processor(SCENARIO_CONFIG);

        for (last, expected) in [(1u8, 100u8), (2, 101), (3, 102)] {
            let request = create_request([0, 0, 0, 0, 0, last], last as u32);
            let reply = processor.process(&request).await.unwrap();
            assert_eq!(reply.yiaddr, Ipv4Addr::new(192, 168, 1, expected));
            assert_eq!(reply.boot_file(), "pxelinux.0");
        }

        let request = create_request([0, 0, 0, 0, 0, 4], 4);
        assert!(processor.process(&request).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_client_without_ranges_is_silent() {
        let processor = create_processor(
            "host known {\n  hardware ethernet 00:11:22:33:44:55;\n  fixed-address 10.0.0.5;\n}\n",
        );
        let request = create_request([0x02, 0, 0, 0, 0, 1], 9);

        assert!(processor.process(&request).await.is_none());
    }

    #[tokio::test]
    async fn test_non_ip_tftp_server_leaves_siaddr_unset() {
        let processor = create_processor(
            "subnet 10.0.0.0 netmask 255.255.255.0 {\n  range 10.0.0.10 10.0.0.10;\n  option tftp-server-name \"boot.example.com\";\n}\n",
        );
        let request = create_request([0x02, 0, 0, 0, 0, 1], 9);

        let reply = processor.process(&request).await.unwrap();
        assert_eq!(reply.yiaddr, Ipv4Addr::new(10, 0, 0, 10));
        assert_eq!(reply.siaddr, Ipv4Addr::UNSPECIFIED);
        assert_eq!(reply.boot_file(), "");
    }

    #[tokio::test]
    async fn test_repeated_requests_keep_the_same_lease() {
        let processor = create_processor(SCENARIO_CONFIG);
        let request = create_request([0x02, 0, 0, 0, 0, 7], 1);

        let first = processor.process(&request).await.unwrap();
        let second = processor.process(&request).await.unwrap();
        assert_eq!(first.yiaddr, second.yiaddr);
        assert_eq!(processor.address_book().allocations().await.len(), 3);
    }
}
