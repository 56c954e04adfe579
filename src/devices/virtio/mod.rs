//! Virtio definitions shared with the host's rpmsg driver.
//!
//! Only the split virtqueue and the status/feature bits the remote side reads
//! are needed here; negotiation itself is done by the host through the
//! resource table.

pub mod queue;

pub use queue::{LayoutError, Virtqueue, VirtqDesc, VringLayout};

/// Virtio device ID of an rpmsg device
pub const VIRTIO_ID_RPMSG: u32 = 7;

/// rpmsg feature bit: the remote supports name service announcements
pub const VIRTIO_RPMSG_F_NS: u32 = 0;

bitflags::bitflags! {
    /// Virtio device status byte, written by the host driver.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DeviceStatus: u8 {
        const ACKNOWLEDGE = 0x01;
        const DRIVER = 0x02;
        const DRIVER_OK = 0x04;
        const FEATURES_OK = 0x08;
        const NEEDS_RESET = 0x40;
        const FAILED = 0x80;
    }
}

bitflags::bitflags! {
    /// Virtqueue descriptor flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DescFlags: u16 {
        const NEXT = 1;
        const WRITE = 2;
        const INDIRECT = 4;
    }
}
