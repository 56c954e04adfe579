//! rpmsg wire format
//!
//! Every message occupies one vring buffer: a 16-byte header followed by the
//! payload. Name service announcements are ordinary messages addressed to
//! `RPMSG_NS_ADDR` whose payload is an `NsAnnouncement`. All fields are
//! little endian, matching the host's Linux rpmsg driver.

pub mod endpoint;

pub use endpoint::{DrainReport, RpmsgDevice, SendError};

use core::fmt;

/// Size of the name field in a name service announcement
pub const RPMSG_NAME_SIZE: usize = 32;
/// Reserved destination address of the host's name service
pub const RPMSG_NS_ADDR: u32 = 53;

pub const RPMSG_HDR_SIZE: usize = 16;
pub const NS_MSG_SIZE: usize = RPMSG_NAME_SIZE + 8;

/// Buffer size the Linux rpmsg driver allocates per descriptor
pub const RPMSG_BUF_SIZE: usize = 512;

/// Kick value for vring0, the remote -> host direction
pub const TX_VQ_ID: u32 = 0;
/// Kick value for vring1, the host -> remote direction
pub const RX_VQ_ID: u32 = 1;

/// Message header preceding every payload.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RpmsgHeader {
    pub src: u32,
    pub dst: u32,
    pub reserved: u32,
    pub len: u16,
    pub flags: u16,
}

static_assertions::assert_eq_size!(RpmsgHeader, [u8; RPMSG_HDR_SIZE]);

impl RpmsgHeader {
    pub fn to_bytes(&self) -> [u8; RPMSG_HDR_SIZE] {
        let mut out = [0u8; RPMSG_HDR_SIZE];
        out[0..4].copy_from_slice(&self.src.to_le_bytes());
        out[4..8].copy_from_slice(&self.dst.to_le_bytes());
        out[8..12].copy_from_slice(&self.reserved.to_le_bytes());
        out[12..14].copy_from_slice(&self.len.to_le_bytes());
        out[14..16].copy_from_slice(&self.flags.to_le_bytes());
        out
    }

    pub fn from_bytes(raw: &[u8; RPMSG_HDR_SIZE]) -> Self {
        Self {
            src: u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
            dst: u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]),
            reserved: u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]),
            len: u16::from_le_bytes([raw[12], raw[13]]),
            flags: u16::from_le_bytes([raw[14], raw[15]]),
        }
    }
}

/// Name service operation carried in an announcement.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NsFlags {
    Create = 0,
    Destroy = 1,
}

impl NsFlags {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Create),
            1 => Some(Self::Destroy),
            _ => None,
        }
    }
}

/// Name service announcement payload.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NsAnnouncement {
    /// NUL padded service name
    pub name: [u8; RPMSG_NAME_SIZE],
    pub addr: u32,
    pub flags: NsFlags,
}

static_assertions::assert_eq_size!(NsAnnouncement, [u8; NS_MSG_SIZE]);

impl NsAnnouncement {
    /// Build an announcement. Names longer than 31 bytes are cut so the
    /// field always keeps a NUL terminator.
    pub fn new(name: &str, addr: u32, flags: NsFlags) -> Self {
        let mut field = [0u8; RPMSG_NAME_SIZE];
        let len = name.len().min(RPMSG_NAME_SIZE - 1);
        field[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self {
            name: field,
            addr,
            flags,
        }
    }

    /// Name up to the first NUL.
    pub fn name(&self) -> &[u8] {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(RPMSG_NAME_SIZE);
        &self.name[..end]
    }

    pub fn to_bytes(&self) -> [u8; NS_MSG_SIZE] {
        let mut out = [0u8; NS_MSG_SIZE];
        out[..RPMSG_NAME_SIZE].copy_from_slice(&self.name);
        out[32..36].copy_from_slice(&self.addr.to_le_bytes());
        out[36..40].copy_from_slice(&(self.flags as u32).to_le_bytes());
        out
    }

    /// Parse an announcement; `None` if the flags field is unknown.
    pub fn from_bytes(raw: &[u8; NS_MSG_SIZE]) -> Option<Self> {
        let mut name = [0u8; RPMSG_NAME_SIZE];
        name.copy_from_slice(&raw[..RPMSG_NAME_SIZE]);
        let addr = u32::from_le_bytes([raw[32], raw[33], raw[34], raw[35]]);
        let flags = NsFlags::from_raw(u32::from_le_bytes([raw[36], raw[37], raw[38], raw[39]]))?;
        Some(Self { name, addr, flags })
    }
}

/// Formats a byte slice as space separated hex, for payload traces.
pub(crate) struct HexBytes<'a>(pub &'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
