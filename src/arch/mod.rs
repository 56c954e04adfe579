//! Hardware access seams
//!
//! The protocol code never dereferences a physical address itself. Register
//! blocks go through `RegisterAccess`, shared-memory structures through
//! `SharedMemory`. The firmware binary plugs in the volatile implementations
//! from `volatile.rs`; host tests plug in a simulated SoC.

pub mod volatile;

pub use volatile::{Mmio, PhysMemory};

/// 32-bit memory-mapped register access at absolute physical addresses.
pub trait RegisterAccess {
    fn read32(&self, addr: usize) -> u32;
    fn write32(&self, addr: usize, value: u32);
}

/// Memory shared with the host core, addressed by physical address.
///
/// Implementations must perform every access exactly once and in program
/// order; the peer may be reading or writing the same bytes concurrently.
pub trait SharedMemory {
    fn read_u8(&self, addr: u64) -> u8;
    fn read_u16(&self, addr: u64) -> u16;
    fn read_u32(&self, addr: u64) -> u32;
    fn read_u64(&self, addr: u64) -> u64;

    fn write_u16(&self, addr: u64, value: u16);
    fn write_u32(&self, addr: u64, value: u32);

    /// Copy `buf.len()` bytes starting at `addr` into `buf`.
    fn read_bytes(&self, addr: u64, buf: &mut [u8]);

    /// Copy `data` to the bytes starting at `addr`.
    fn write_bytes(&self, addr: u64, data: &[u8]);

    /// Full memory barrier: every access issued before it is globally
    /// visible before any access issued after it.
    fn barrier(&self);
}

impl<T: RegisterAccess + ?Sized> RegisterAccess for &T {
    fn read32(&self, addr: usize) -> u32 {
        (**self).read32(addr)
    }

    fn write32(&self, addr: usize, value: u32) {
        (**self).write32(addr, value)
    }
}

impl<T: SharedMemory + ?Sized> SharedMemory for &T {
    fn read_u8(&self, addr: u64) -> u8 {
        (**self).read_u8(addr)
    }

    fn read_u16(&self, addr: u64) -> u16 {
        (**self).read_u16(addr)
    }

    fn read_u32(&self, addr: u64) -> u32 {
        (**self).read_u32(addr)
    }

    fn read_u64(&self, addr: u64) -> u64 {
        (**self).read_u64(addr)
    }

    fn write_u16(&self, addr: u64, value: u16) {
        (**self).write_u16(addr, value)
    }

    fn write_u32(&self, addr: u64, value: u32) {
        (**self).write_u32(addr, value)
    }

    fn read_bytes(&self, addr: u64, buf: &mut [u8]) {
        (**self).read_bytes(addr, buf)
    }

    fn write_bytes(&self, addr: u64, data: &[u8]) {
        (**self).write_bytes(addr, data)
    }

    fn barrier(&self) {
        (**self).barrier()
    }
}
