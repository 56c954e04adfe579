//! Split virtqueue (vring) engine for the remote side of an rpmsg link.
//!
//! The host allocates the descriptor table, available ring and used ring in
//! shared memory at device addresses it agreed with us through the resource
//! table. We only ever consume available entries and publish used entries;
//! descriptor allocation stays with the host in both directions.
//!
//! Layout at `base` (legacy packing, identical on both sides):
//!
//! ```text
//!   base                desc[num]        16 bytes each
//!   base + 16*num       avail            flags:u16 idx:u16 ring[num]:u16
//!   align_up(avail end) used             flags:u16 idx:u16 ring[num]:{id:u32 len:u32}
//! ```

use log::trace;

use super::DescFlags;
use crate::arch::SharedMemory;

/// A single virtqueue descriptor, as laid out in shared memory.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VirtqDesc {
    /// Physical address of the buffer
    pub addr: u64,
    /// Length of the buffer in bytes
    pub len: u32,
    /// Descriptor flags (NEXT, WRITE, INDIRECT)
    pub flags: u16,
    /// Index of the next descriptor in the chain (if NEXT flag set)
    pub next: u16,
}

impl VirtqDesc {
    pub fn flags(&self) -> DescFlags {
        DescFlags::from_bits_truncate(self.flags)
    }
}

pub const DESC_SIZE: u64 = 16;
const AVAIL_HEADER_SIZE: u64 = 4;
const AVAIL_ELEM_SIZE: u64 = 2;
const USED_HEADER_SIZE: u64 = 4;
const USED_ELEM_SIZE: u64 = 8;

/// Largest queue size virtio allows.
pub const MAX_QUEUE_SIZE: u32 = 32768;

static_assertions::assert_eq_size!(VirtqDesc, [u8; DESC_SIZE as usize]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("vring depth is zero")]
    ZeroDepth,
    #[error("vring depth {0} exceeds 32768")]
    DepthTooLarge(u32),
    #[error("vring alignment {0:#x} is not a power of two")]
    BadAlignment(u32),
}

/// Addresses of the three vring parts, computed once from the base.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VringLayout {
    pub desc: u64,
    pub avail: u64,
    pub used: u64,
    pub num: u16,
}

impl VringLayout {
    /// Compute the vring layout at `base` for `num` descriptors.
    ///
    /// The used ring starts at the first `align` boundary at or after the
    /// end of the available ring. The host computes the same addresses
    /// independently, so this formula must not change.
    pub fn new(base: u64, num: u32, align: u32) -> Result<Self, LayoutError> {
        if num == 0 {
            return Err(LayoutError::ZeroDepth);
        }
        if num > MAX_QUEUE_SIZE {
            return Err(LayoutError::DepthTooLarge(num));
        }
        if !align.is_power_of_two() {
            return Err(LayoutError::BadAlignment(align));
        }

        let desc = base;
        let avail = desc + DESC_SIZE * num as u64;
        let avail_end = avail + AVAIL_HEADER_SIZE + AVAIL_ELEM_SIZE * num as u64;
        let align = align as u64;
        let used = (avail_end + align - 1) & !(align - 1);

        Ok(Self {
            desc,
            avail,
            used,
            num: num as u16,
        })
    }

    fn slot(&self, idx: u16) -> u64 {
        (idx % self.num) as u64
    }

    pub fn desc_addr(&self, idx: u16) -> u64 {
        self.desc + DESC_SIZE * idx as u64
    }

    pub fn avail_idx_addr(&self) -> u64 {
        self.avail + 2
    }

    /// Address of the available ring entry that ring index `idx` maps to.
    pub fn avail_entry_addr(&self, idx: u16) -> u64 {
        self.avail + AVAIL_HEADER_SIZE + AVAIL_ELEM_SIZE * self.slot(idx)
    }

    pub fn used_idx_addr(&self) -> u64 {
        self.used + 2
    }

    /// Address of the used ring element that ring index `idx` maps to.
    pub fn used_elem_addr(&self, idx: u16) -> u64 {
        self.used + USED_HEADER_SIZE + USED_ELEM_SIZE * self.slot(idx)
    }

    /// One past the last byte of the used ring.
    pub fn end(&self) -> u64 {
        self.used + USED_HEADER_SIZE + USED_ELEM_SIZE * self.num as u64
    }
}

/// Split virtqueue state: the shared layout plus our private consume cursor.
pub struct Virtqueue {
    layout: VringLayout,
    /// Last available index we consumed. Never lives in shared memory.
    last_avail_idx: u16,
}

impl Virtqueue {
    pub const fn new(layout: VringLayout) -> Self {
        Self {
            layout,
            last_avail_idx: 0,
        }
    }

    pub fn layout(&self) -> &VringLayout {
        &self.layout
    }

    pub fn num(&self) -> u16 {
        self.layout.num
    }

    pub fn last_avail_idx(&self) -> u16 {
        self.last_avail_idx
    }

    /// Producer index published by the host.
    pub fn avail_idx<M: SharedMemory>(&self, mem: &M) -> u16 {
        mem.read_u16(self.layout.avail_idx_addr())
    }

    /// Used index as last published by us.
    pub fn used_idx<M: SharedMemory>(&self, mem: &M) -> u16 {
        mem.read_u16(self.layout.used_idx_addr())
    }

    /// Skip everything the host has made available so far.
    ///
    /// Returns the new cursor.
    pub fn sync_to_avail<M: SharedMemory>(&mut self, mem: &M) -> u16 {
        self.last_avail_idx = self.avail_idx(mem);
        self.last_avail_idx
    }

    /// Take the next available descriptor index.
    ///
    /// Returns `None` if the host has published nothing new. Only the
    /// private cursor moves; shared memory is not written.
    pub fn take_available<M: SharedMemory>(&mut self, mem: &M) -> Option<u16> {
        if self.avail_idx(mem) == self.last_avail_idx {
            return None;
        }

        let head = mem.read_u16(self.layout.avail_entry_addr(self.last_avail_idx));
        self.last_avail_idx = self.last_avail_idx.wrapping_add(1);
        Some(head)
    }

    /// Read descriptor `idx`, or `None` if it is outside the table.
    pub fn read_desc<M: SharedMemory>(&self, mem: &M, idx: u16) -> Option<VirtqDesc> {
        if idx >= self.layout.num {
            return None;
        }
        let base = self.layout.desc_addr(idx);
        Some(VirtqDesc {
            addr: mem.read_u64(base),
            len: mem.read_u32(base + 8),
            flags: mem.read_u16(base + 12),
            next: mem.read_u16(base + 14),
        })
    }

    /// Hand descriptor `id` back to the host with `len` bytes used.
    ///
    /// The element is written before the barrier and the index after it, so
    /// a host that sees the new used index always sees the element too.
    pub fn publish_used<M: SharedMemory>(&self, mem: &M, id: u16, len: u32) {
        let used_idx = self.used_idx(mem);
        let elem = self.layout.used_elem_addr(used_idx);

        mem.write_u32(elem, id as u32);
        mem.write_u32(elem + 4, len);

        mem.barrier();

        mem.write_u16(self.layout.used_idx_addr(), used_idx.wrapping_add(1));
        trace!("vring@{:#x}: used[{}] = ({}, {})", self.layout.desc, used_idx, id, len);
    }
}
