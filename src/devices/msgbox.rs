//! Sunxi MSGBOX doorbell driver
//!
//! The msgbox is a set of small hardware FIFOs between cores. A kick is one
//! 32-bit word (by convention the id of the vring that changed); all real data
//! crosses through shared memory.
//!
//! Register map (offsets from a msgbox block base, N = coef channel, P = FIFO):
//!   0x20 + 0x100*N          RD_IRQ_EN      read interrupt enable, bit 2*P
//!   0x24 + 0x100*N          RD_IRQ_STATUS  read pending, bit 2*P, write 1 to clear
//!   0x60 + 0x100*N + 4*P    MSG_STATUS     FIFO occupancy in bits [3:0]
//!   0x70 + 0x100*N + 4*P    MSG_FIFO       FIFO data
//!
//! Every access is checked against the local and remote block windows first.
//! An access outside both is refused: reads yield 0, writes are dropped.

use log::{debug, warn};

use crate::arch::RegisterAccess;

// ── Register offsets ────────────────────────────────────────────────

const fn block_offset(n: u32) -> usize {
    0x100 * n as usize
}

pub const fn read_irq_enable(n: u32) -> usize {
    0x20 + block_offset(n)
}

pub const fn read_irq_status(n: u32) -> usize {
    0x24 + block_offset(n)
}

pub const fn msg_status(n: u32, p: u32) -> usize {
    0x60 + block_offset(n) + 4 * p as usize
}

pub const fn msg_fifo(n: u32, p: u32) -> usize {
    0x70 + block_offset(n) + 4 * p as usize
}

// ── Bit fields ──────────────────────────────────────────────────────

const RD_IRQ_EN_MASK: u32 = 0x1;
const RD_IRQ_PEND_MASK: u32 = 0x1;
const MSG_NUM_MASK: u32 = 0xF;
const MSG_NUM_SHIFT: u32 = 0;

/// Peer FIFO depth; a kick is dropped once this many words are queued.
pub const FIFO_DEPTH: u32 = 8;

const fn chan_shift(p: u32) -> u32 {
    p * 2
}

/// Which msgbox channels this core uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MsgboxConfig {
    /// Register block owned by this core (incoming kicks)
    pub local_base: usize,
    /// Peer-visible register block (outgoing kicks)
    pub remote_base: usize,
    /// Size of each register window
    pub region_size: usize,
    /// Coef channel we receive on
    pub local_n: u32,
    /// Coef channel the peer receives on
    pub remote_n: u32,
    /// FIFO index within the channel
    pub chan_p: u32,
}

/// Doorbell transport over one msgbox channel pair.
pub struct Msgbox<R: RegisterAccess> {
    regs: R,
    cfg: MsgboxConfig,
}

impl<R: RegisterAccess> Msgbox<R> {
    pub const fn new(regs: R, cfg: MsgboxConfig) -> Self {
        Self { regs, cfg }
    }

    pub fn config(&self) -> &MsgboxConfig {
        &self.cfg
    }

    /// True if `addr` falls inside the local or remote register window.
    pub fn validate(&self, addr: usize) -> bool {
        let in_window =
            |base: usize| addr >= base && addr < base.saturating_add(self.cfg.region_size);
        if in_window(self.cfg.local_base) || in_window(self.cfg.remote_base) {
            return true;
        }
        warn!("msgbox: invalid addr {:#010x}", addr);
        false
    }

    fn read(&self, base: usize, offset: usize) -> u32 {
        let addr = base.wrapping_add(offset);
        if !self.validate(addr) {
            warn!("msgbox: refused read at {:#010x}", addr);
            return 0;
        }
        self.regs.read32(addr)
    }

    fn write(&self, base: usize, offset: usize, value: u32) {
        let addr = base.wrapping_add(offset);
        if !self.validate(addr) {
            warn!("msgbox: refused write at {:#010x} value={:#x}", addr, value);
            return;
        }
        self.regs.write32(addr, value);
    }

    fn pending_bit(&self) -> u32 {
        RD_IRQ_PEND_MASK << chan_shift(self.cfg.chan_p)
    }

    /// Enable the receive-pending indication for our channel and clear
    /// anything left over from before we started.
    pub fn init(&self) {
        let local = self.cfg.local_base;
        let n = self.cfg.local_n;

        let mut enable = self.read(local, read_irq_enable(n));
        enable |= RD_IRQ_EN_MASK << chan_shift(self.cfg.chan_p);
        self.write(local, read_irq_enable(n), enable);

        self.write(local, read_irq_status(n), self.pending_bit());
    }

    /// Check for an incoming kick and return its value.
    pub fn poll(&self) -> Option<u32> {
        let local = self.cfg.local_base;
        let n = self.cfg.local_n;
        let p = self.cfg.chan_p;

        let pending = self.read(local, read_irq_status(n));
        if pending & self.pending_bit() == 0 {
            // Hardware quirk: the FIFO must be read even with nothing pending,
            // otherwise the channel stops raising pending altogether. The read
            // discards a word despite the manual calling it a peek. Keep it.
            let _ = self.read(local, msg_fifo(n, p));
            return None;
        }

        let value = self.read(local, msg_fifo(n, p));
        self.write(local, read_irq_status(n), self.pending_bit());
        Some(value)
    }

    /// Post `value` to the peer's FIFO. Dropped silently when the FIFO is full.
    pub fn notify_peer(&self, value: u32) {
        let remote = self.cfg.remote_base;
        let n = self.cfg.remote_n;
        let p = self.cfg.chan_p;

        let queued = (self.read(remote, msg_status(n, p)) >> MSG_NUM_SHIFT) & MSG_NUM_MASK;
        if queued >= FIFO_DEPTH {
            debug!("msgbox: peer fifo full, dropping kick {}", value);
            return;
        }
        self.write(remote, msg_fifo(n, p), value);
    }
}
