use std::net::{SocketAddr, SocketAddrV4};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, error, info, warn};

use crate::address_book::AddressBook;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::packet::{BOOTREQUEST, BootpPacket};
use crate::processor::RequestProcessor;

pub const BOOTP_SERVER_PORT: u16 = 67;
const RECV_BUFFER_SIZE: usize = 1500;

/// UDP listener answering BOOTP requests one datagram at a time.
pub struct BootpServer {
    config: Arc<Config>,
    address_book: Arc<AddressBook>,
    processor: RequestProcessor,
    socket: UdpSocket,
}

impl BootpServer {
    pub fn new(config: Config, listen_addr: SocketAddrV4) -> Result<Self> {
        let config = Arc::new(config);
        let address_book = Arc::new(AddressBook::new(Arc::clone(&config)));
        let processor = RequestProcessor::new(Arc::clone(&config), Arc::clone(&address_book));

        let socket = Self::create_socket(listen_addr)?;

        info!("BOOTP server starting on {}", socket.local_addr()?);
        for (index, subnet) in config.subnets.iter().enumerate() {
            match subnet.dynamic_range() {
                Some((start, end)) => info!(
                    "Subnet #{} {}/{}: dynamic range {} - {}",
                    index, subnet.network, subnet.netmask, start, end
                ),
                None => info!(
                    "Subnet #{} {}/{}: static reservations only",
                    index, subnet.network, subnet.netmask
                ),
            }
        }

        Ok(Self {
            config,
            address_book,
            processor,
            socket,
        })
    }

    fn create_socket(listen_addr: SocketAddrV4) -> Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|error| Error::Socket(format!("Failed to create socket: {}", error)))?;

        socket
            .set_reuse_address(true)
            .map_err(|error| Error::Socket(format!("Failed to set SO_REUSEADDR: {}", error)))?;

        socket
            .set_broadcast(true)
            .map_err(|error| Error::Socket(format!("Failed to set SO_BROADCAST: {}", error)))?;

        socket
            .set_nonblocking(true)
            .map_err(|error| Error::Socket(format!("Failed to set non-blocking: {}", error)))?;

        socket.bind(&listen_addr.into()).map_err(|error| {
            Error::Socket(format!("Failed to bind to {}: {}", listen_addr, error))
        })?;

        let std_socket: std::net::UdpSocket = socket.into();
        let tokio_socket = UdpSocket::from_std(std_socket).map_err(|error| {
            Error::Socket(format!("Failed to convert to tokio socket: {}", error))
        })?;

        Ok(tokio_socket)
    }

    /// Receives and answers datagrams until the task is cancelled.
    ///
    /// Each datagram is fully handled before the next one is read. Per-packet
    /// failures are logged and never end the loop.
    pub async fn run(&self) -> Result<()> {
        let mut buffer = [0u8; RECV_BUFFER_SIZE];

        info!("BOOTP server ready and listening");

        loop {
            match self.socket.recv_from(&mut buffer).await {
                Ok((size, source)) => match self.handle_datagram(&buffer[..size], source).await {
                    Ok(_) => {}
                    Err(Error::MalformedPacket(reason)) => {
                        warn!("Dropping datagram from {}: {}", source, reason);
                    }
                    Err(error) => {
                        error!("Failed to answer {}: {}", source, error);
                    }
                },
                Err(error) => {
                    error!("Error receiving packet: {}", error);
                }
            }
        }
    }

    /// Handles one datagram and returns the number of reply bytes sent, or
    /// `None` when the datagram gets no answer.
    pub async fn handle_datagram(&self, data: &[u8], source: SocketAddr) -> Result<Option<usize>> {
        let request = BootpPacket::parse(data)?;

        if request.op != BOOTREQUEST {
            debug!("Ignoring op {} from {}", request.op, source);
            return Ok(None);
        }

        info!(
            "BOOTREQUEST from {} via {} (xid {:#010x})",
            request.hardware_address(),
            source,
            request.xid
        );

        let Some(reply) = self.processor.process(&request).await else {
            return Ok(None);
        };

        let sent = self.socket.send_to(&reply.encode(), source).await?;
        info!(
            "Sent BOOTREPLY {} to {} at {}",
            reply.yiaddr,
            reply.hardware_address(),
            source
        );

        Ok(Some(sent))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn address_book(&self) -> &AddressBook {
        &self.address_book
    }
}
