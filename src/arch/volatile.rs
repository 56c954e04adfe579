//! Volatile implementations of the hardware access traits.
//!
//! Identity mapped: a physical address is used as a pointer as-is. This is the
//! only place in the crate that turns an integer address into a pointer.

use core::ptr;

use super::{RegisterAccess, SharedMemory};

/// Raw MMIO register block access.
#[derive(Clone, Copy, Default)]
pub struct Mmio;

impl RegisterAccess for Mmio {
    #[inline]
    fn read32(&self, addr: usize) -> u32 {
        unsafe { ptr::read_volatile(addr as *const u32) }
    }

    #[inline]
    fn write32(&self, addr: usize, value: u32) {
        unsafe { ptr::write_volatile(addr as *mut u32, value) }
    }
}

/// Physical memory shared with the host core.
///
/// Multi-byte fields of the vring and rpmsg layouts are naturally aligned
/// when the host follows the virtio layout rules, so aligned fields take a
/// single access and the peer never observes a torn index. A misaligned
/// field falls back to byte accesses.
#[derive(Clone, Copy, Default)]
pub struct PhysMemory;

impl PhysMemory {
    #[inline]
    fn ptr<T>(addr: u64) -> *mut T {
        addr as usize as *mut T
    }

    #[inline]
    fn read_array<const N: usize>(&self, addr: u64) -> [u8; N] {
        let mut out = [0u8; N];
        self.read_bytes(addr, &mut out);
        out
    }
}

impl SharedMemory for PhysMemory {
    #[inline]
    fn read_u8(&self, addr: u64) -> u8 {
        unsafe { ptr::read_volatile(Self::ptr::<u8>(addr)) }
    }

    #[inline]
    fn read_u16(&self, addr: u64) -> u16 {
        if addr % 2 == 0 {
            u16::from_le(unsafe { ptr::read_volatile(Self::ptr::<u16>(addr)) })
        } else {
            u16::from_le_bytes(self.read_array(addr))
        }
    }

    #[inline]
    fn read_u32(&self, addr: u64) -> u32 {
        if addr % 4 == 0 {
            u32::from_le(unsafe { ptr::read_volatile(Self::ptr::<u32>(addr)) })
        } else {
            u32::from_le_bytes(self.read_array(addr))
        }
    }

    #[inline]
    fn read_u64(&self, addr: u64) -> u64 {
        if addr % 8 == 0 {
            u64::from_le(unsafe { ptr::read_volatile(Self::ptr::<u64>(addr)) })
        } else {
            u64::from_le_bytes(self.read_array(addr))
        }
    }

    #[inline]
    fn write_u16(&self, addr: u64, value: u16) {
        if addr % 2 == 0 {
            unsafe { ptr::write_volatile(Self::ptr::<u16>(addr), value.to_le()) }
        } else {
            self.write_bytes(addr, &value.to_le_bytes());
        }
    }

    #[inline]
    fn write_u32(&self, addr: u64, value: u32) {
        if addr % 4 == 0 {
            unsafe { ptr::write_volatile(Self::ptr::<u32>(addr), value.to_le()) }
        } else {
            self.write_bytes(addr, &value.to_le_bytes());
        }
    }

    fn read_bytes(&self, addr: u64, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = unsafe { ptr::read_volatile(Self::ptr::<u8>(addr + i as u64)) };
        }
    }

    fn write_bytes(&self, addr: u64, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            unsafe { ptr::write_volatile(Self::ptr::<u8>(addr + i as u64), byte) };
        }
    }

    #[inline]
    fn barrier(&self) {
        full_barrier();
    }
}

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
#[inline]
fn full_barrier() {
    // Orders normal memory against the msgbox MMIO write that follows a publish.
    unsafe { core::arch::asm!("fence iorw, iorw", options(nostack, preserves_flags)) };
}

#[cfg(not(any(target_arch = "riscv32", target_arch = "riscv64")))]
#[inline]
fn full_barrier() {
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}
