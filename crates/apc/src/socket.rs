//! UDP transport for Hello messages.
//!
//! Hellos are broadcast to the coordination port on the segment interface
//! and received on a socket bound to that port and device.

use crate::types::ApcConfig;
use async_trait::async_trait;
use nix::net::if_::if_nametoindex;
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tracing::debug;

/// Largest Hello we expect to receive
pub const MAX_HELLO_SIZE: usize = 1500;

/// Datagram exchange used by the event loop
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one payload to the segment
    async fn send(&self, payload: &[u8]) -> io::Result<usize>;

    /// Wait for the next datagram
    async fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

/// Broadcast UDP socket bound to the coordination port
pub struct ApcSocket {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl ApcSocket {
    /// Bind to the configured port on the configured interface.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(config: &ApcConfig) -> io::Result<Self> {
        interface_index(&config.interface)?;
        Self::bind_to(
            SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port),
            SocketAddrV4::new(config.broadcast_addr, config.port),
            Some(&config.interface),
        )
    }

    /// Bind to `local`, sending to `destination`, optionally pinned to a device
    pub fn bind_to(
        local: SocketAddrV4,
        destination: SocketAddrV4,
        device: Option<&str>,
    ) -> io::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

        // Several listeners on one host share the port
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;

        if let Some(device) = device {
            socket.bind_device(Some(device.as_bytes()))?;
        }

        socket.set_nonblocking(true)?;
        socket.bind(&SocketAddr::V4(local).into())?;

        let socket = UdpSocket::from_std(socket.into())?;
        debug!(local = %local, destination = %destination, device = ?device, "Hello socket bound");

        Ok(Self {
            socket,
            destination: SocketAddr::V4(destination),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[async_trait]
impl Transport for ApcSocket {
    async fn send(&self, payload: &[u8]) -> io::Result<usize> {
        self.socket.send_to(payload, self.destination).await
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }
}

/// Get the interface index for a given interface name
pub fn interface_index(name: &str) -> io::Result<u32> {
    if_nametoindex(name).map_err(|e| {
        io::Error::new(
            ErrorKind::NotFound,
            format!("Interface {} not found: {}", name, e),
        )
    })
}
