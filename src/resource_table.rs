//! remoteproc resource table
//!
//! The host's remoteproc loader finds this table in the firmware image (the
//! `.resource_table` section), allocates the vrings at the device addresses
//! it names, negotiates features and finally sets `DRIVER_OK` in the vdev
//! status byte. From our side the table is read-only except for what the
//! host writes into it.

use core::cell::UnsafeCell;
use core::mem::{offset_of, size_of};

use crate::arch::SharedMemory;
use crate::devices::virtio::{DeviceStatus, LayoutError, VringLayout, VIRTIO_ID_RPMSG, VIRTIO_RPMSG_F_NS};
use crate::platform::BoardConfig;

/// Resource type of a virtio device entry
pub const RSC_VDEV: u32 = 3;

/// Table header with a single offset entry.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ResourceTableHeader {
    pub ver: u32,
    pub num: u32,
    pub reserved: [u32; 2],
    pub offset: [u32; 1],
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct FwRscHdr {
    pub rsc_type: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct FwRscVdev {
    pub id: u32,
    pub notifyid: u32,
    pub dfeatures: u32,
    pub gfeatures: u32,
    pub config_len: u32,
    pub status: u8,
    pub num_of_vrings: u8,
    pub reserved: [u8; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct FwRscVdevVring {
    pub da: u32,
    pub align: u32,
    pub num: u32,
    pub notifyid: u32,
    pub pa: u32,
}

/// The complete table: one rpmsg vdev with two vrings.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ResourceTable {
    pub base: ResourceTableHeader,
    pub rpmsg_hdr: FwRscHdr,
    pub rpmsg_vdev: FwRscVdev,
    pub vring: [FwRscVdevVring; 2],
}

static_assertions::assert_eq_size!(ResourceTable, [u8; 88]);

impl ResourceTable {
    pub const fn new(board: &BoardConfig) -> Self {
        Self {
            base: ResourceTableHeader {
                ver: 1,
                num: 1,
                reserved: [0, 0],
                offset: [offset_of!(ResourceTable, rpmsg_hdr) as u32],
            },
            rpmsg_hdr: FwRscHdr { rsc_type: RSC_VDEV },
            rpmsg_vdev: FwRscVdev {
                id: VIRTIO_ID_RPMSG,
                notifyid: 0,
                dfeatures: 1 << VIRTIO_RPMSG_F_NS,
                gfeatures: 0,
                config_len: 0,
                status: 0,
                num_of_vrings: 2,
                reserved: [0, 0],
            },
            vring: [
                FwRscVdevVring {
                    da: board.vring_da[0],
                    align: board.vring_align,
                    num: board.vring_num,
                    notifyid: 0,
                    pa: 0,
                },
                FwRscVdevVring {
                    da: board.vring_da[1],
                    align: board.vring_align,
                    num: board.vring_num,
                    notifyid: 1,
                    pa: 0,
                },
            ],
        }
    }
}

/// Resource table image the host loader patches in place.
///
/// The host writes the status byte while we run, so the table must not be
/// treated as immutable data; all reads go through `ResourceTableView`.
#[repr(transparent)]
pub struct SharedResourceTable(UnsafeCell<ResourceTable>);

// Safety: we never write the table; the only writer is the host, and every
// read we issue is a volatile load through `SharedMemory`.
unsafe impl Sync for SharedResourceTable {}

impl SharedResourceTable {
    pub const fn new(table: ResourceTable) -> Self {
        Self(UnsafeCell::new(table))
    }

    /// Physical address of the table (identity mapped).
    pub fn addr(&self) -> u64 {
        self.0.get() as usize as u64
    }

    pub fn view(&self) -> ResourceTableView {
        ResourceTableView::new(self.addr())
    }
}

const STATUS_OFFSET: u64 =
    (offset_of!(ResourceTable, rpmsg_vdev) + offset_of!(FwRscVdev, status)) as u64;

const fn vring_offset(i: usize) -> u64 {
    (offset_of!(ResourceTable, vring) + i * size_of::<FwRscVdevVring>()) as u64
}

/// Reads fields of a resource table living at a fixed address.
///
/// Every read is a fresh volatile load because the host writes the status
/// byte behind our back.
#[derive(Clone, Copy, Debug)]
pub struct ResourceTableView {
    addr: u64,
}

impl ResourceTableView {
    pub const fn new(addr: u64) -> Self {
        Self { addr }
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    pub fn status<M: SharedMemory>(&self, mem: &M) -> DeviceStatus {
        DeviceStatus::from_bits_retain(mem.read_u8(self.addr + STATUS_OFFSET))
    }

    /// True once the host driver has set DRIVER_OK.
    pub fn host_ready<M: SharedMemory>(&self, mem: &M) -> bool {
        self.status(mem).contains(DeviceStatus::DRIVER_OK)
    }

    /// Read vring entry `i` as the host left it.
    pub fn vring<M: SharedMemory>(&self, mem: &M, i: usize) -> FwRscVdevVring {
        let base = self.addr + vring_offset(i);
        FwRscVdevVring {
            da: mem.read_u32(base),
            align: mem.read_u32(base + 4),
            num: mem.read_u32(base + 8),
            notifyid: mem.read_u32(base + 12),
            pa: mem.read_u32(base + 16),
        }
    }

    /// Layout of vring `i` from its table entry.
    pub fn vring_layout<M: SharedMemory>(&self, mem: &M, i: usize) -> Result<VringLayout, LayoutError> {
        let entry = self.vring(mem, i);
        VringLayout::new(entry.da as u64, entry.num, entry.align)
    }
}
