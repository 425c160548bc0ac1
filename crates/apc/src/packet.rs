//! APC Hello packet format and parsing.
//!
//! Carried as the payload of a UDP datagram broadcast to the coordination
//! port. All multi-byte fields are big-endian.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Sender basic MAC                          |
//! +                               +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                               |       Reserved marker         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Group ID                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                       Sender Router ID                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |        Hello Interval         |    Options    |   Priority    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Dead Interval                         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Designated Router                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      Backup Designated Router                 |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          Neighbor                             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                              ...                              |
//! ```

use crate::types::RouterId;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::net::Ipv4Addr;
use thiserror::Error;

/// Fixed part of a Hello, up to and including the BDR field
pub const HELLO_HEADER_LEN: usize = 32;

/// Anything shorter than this cannot carry the dead interval and is dropped
pub const HELLO_MIN_LEN: usize = 24;

const RESERVED_MARKER: u16 = 0;

/// Hello decode errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("Hello too short: {0} bytes")]
    TooShort(usize),
}

/// Which Hello is being built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelloKind {
    /// Periodic Hello
    Hello,
    /// Sent once on graceful teardown: priority 0, no DR/BDR and no neighbors
    Shutdown,
}

/// An APC Hello message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloPacket {
    /// Sender basic MAC address
    pub mac: [u8; 6],

    /// Administrative group ID
    pub group_id: u32,

    /// Sender router ID
    pub router_id: RouterId,

    /// Sender Hello interval in seconds
    pub hello_interval: u16,

    /// Unused, always 0 on send
    pub options: u8,

    /// Sender priority (0 = ineligible)
    pub priority: u8,

    /// Sender dead interval in seconds
    pub dead_interval: u32,

    /// DR declared by the sender (0.0.0.0 = none)
    pub dr: Ipv4Addr,

    /// BDR declared by the sender (0.0.0.0 = none)
    pub bdr: Ipv4Addr,

    /// Every router ID the sender currently knows about
    pub neighbors: Vec<RouterId>,
}

impl HelloPacket {
    /// Parse a Hello from a UDP payload
    ///
    /// Payloads between 24 and 32 bytes are accepted; the missing DR/BDR
    /// fields read as "none". Trailing bytes that do not form a whole router
    /// ID are ignored.
    pub fn parse(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < HELLO_MIN_LEN {
            return Err(PacketError::TooShort(data.len()));
        }

        let mut buf = data;

        let mut mac = [0u8; 6];
        buf.copy_to_slice(&mut mac);
        let _reserved = buf.get_u16();
        let group_id = buf.get_u32();
        let router_id = Ipv4Addr::from(buf.get_u32());
        let hello_interval = buf.get_u16();
        let options = buf.get_u8();
        let priority = buf.get_u8();
        let dead_interval = buf.get_u32();

        let dr = if buf.remaining() >= 4 {
            Ipv4Addr::from(buf.get_u32())
        } else {
            Ipv4Addr::UNSPECIFIED
        };
        let bdr = if buf.remaining() >= 4 {
            Ipv4Addr::from(buf.get_u32())
        } else {
            Ipv4Addr::UNSPECIFIED
        };

        let mut neighbors = Vec::with_capacity(buf.remaining() / 4);
        while buf.remaining() >= 4 {
            neighbors.push(Ipv4Addr::from(buf.get_u32()));
        }

        Ok(Self {
            mac,
            group_id,
            router_id,
            hello_interval,
            options,
            priority,
            dead_interval,
            dr,
            bdr,
            neighbors,
        })
    }

    /// Serialize packet to bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HELLO_HEADER_LEN + self.neighbors.len() * 4);

        buf.put_slice(&self.mac);
        buf.put_u16(RESERVED_MARKER);
        buf.put_u32(self.group_id);
        buf.put_slice(&self.router_id.octets());
        buf.put_u16(self.hello_interval);
        buf.put_u8(self.options);
        buf.put_u8(self.priority);
        buf.put_u32(self.dead_interval);
        buf.put_slice(&self.dr.octets());
        buf.put_slice(&self.bdr.octets());

        for neighbor in &self.neighbors {
            buf.put_slice(&neighbor.octets());
        }

        buf.freeze()
    }

    /// Declared DR, if any
    pub fn declared_dr(&self) -> Option<RouterId> {
        declared(self.dr)
    }

    /// Declared BDR, if any
    pub fn declared_bdr(&self) -> Option<RouterId> {
        declared(self.bdr)
    }

    /// Whether `router_id` appears in the sender's neighbor list
    pub fn lists(&self, router_id: RouterId) -> bool {
        self.neighbors.contains(&router_id)
    }
}

/// Map the on-wire "no router" encoding to `None`.
pub fn declared(addr: Ipv4Addr) -> Option<RouterId> {
    if addr.is_unspecified() { None } else { Some(addr) }
}

/// Inverse of [`declared`].
pub fn encode_declared(id: Option<RouterId>) -> Ipv4Addr {
    id.unwrap_or(Ipv4Addr::UNSPECIFIED)
}
