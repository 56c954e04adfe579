//! Simulated SoC for host-side tests
//!
//! `SimMemory` stands in for the physical address space shared with the host
//! core, `SimRegs` for the msgbox register blocks, and `SimBoard` plays the
//! host's rpmsg driver: it owns the descriptors, fills buffers and reads back
//! what the remote published.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::mem::size_of;

use log::{Level, LevelFilter, Log, Metadata, Record};
use rpmsg_remote::arch::{RegisterAccess, SharedMemory};
use rpmsg_remote::devices::msgbox::{msg_fifo, msg_status, read_irq_enable, read_irq_status};
use rpmsg_remote::devices::virtio::{DescFlags, VringLayout};
use rpmsg_remote::devices::MsgboxConfig;
use rpmsg_remote::platform::{BoardConfig, C906};
use rpmsg_remote::resource_table::ResourceTable;
use rpmsg_remote::rpmsg::{RpmsgHeader, RPMSG_BUF_SIZE, RPMSG_HDR_SIZE, RX_VQ_ID};

// ── Log capture ──────────────────────────────────────────────────────

thread_local! {
    static CAPTURED: RefCell<Vec<(Level, String)>> = RefCell::new(Vec::new());
}

/// Records every log line on the thread that emitted it; each test runs on
/// its own thread, so tests never see each other's lines.
struct CaptureLogger;

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        CAPTURED.with(|lines| {
            lines
                .borrow_mut()
                .push((record.level(), format!("{}", record.args())))
        });
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger;

/// Start capturing log lines for the calling test.
pub fn capture_logs() {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(LevelFilter::Trace);
    CAPTURED.with(|lines| lines.borrow_mut().clear());
}

/// Lines captured so far at `level` that start with `prefix`.
pub fn logged(level: Level, prefix: &str) -> usize {
    CAPTURED.with(|lines| {
        lines
            .borrow()
            .iter()
            .filter(|(l, msg)| *l == level && msg.starts_with(prefix))
            .count()
    })
}

// ── Shared memory ────────────────────────────────────────────────────

/// Writes and barriers issued through `SharedMemory`, in program order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemEvent {
    Write { addr: u64, len: usize },
    Barrier,
}

struct Region {
    base: u64,
    bytes: Vec<u8>,
}

/// Sparse physical memory. Any access outside a mapped region panics, so a
/// test that passes has proven the code never touched such an address.
pub struct SimMemory {
    regions: RefCell<Vec<Region>>,
    events: RefCell<Vec<MemEvent>>,
}

impl SimMemory {
    pub fn new() -> Self {
        Self {
            regions: RefCell::new(Vec::new()),
            events: RefCell::new(Vec::new()),
        }
    }

    pub fn map(&self, base: u64, size: usize) {
        self.regions.borrow_mut().push(Region {
            base,
            bytes: vec![0; size],
        });
    }

    fn with_bytes<T>(&self, addr: u64, len: usize, f: impl FnOnce(&mut [u8]) -> T) -> T {
        let mut regions = self.regions.borrow_mut();
        let end = addr
            .checked_add(len as u64)
            .unwrap_or_else(|| panic!("access at {:#x} wraps", addr));
        let region = regions
            .iter_mut()
            .find(|r| addr >= r.base && end <= r.base + r.bytes.len() as u64)
            .unwrap_or_else(|| panic!("unmapped access at {:#x} ({} bytes)", addr, len));
        let start = (addr - region.base) as usize;
        f(&mut region.bytes[start..start + len])
    }

    // Host-side accessors; these are not recorded as events.

    pub fn poke(&self, addr: u64, data: &[u8]) {
        self.with_bytes(addr, data.len(), |b| b.copy_from_slice(data));
    }

    pub fn peek(&self, addr: u64, len: usize) -> Vec<u8> {
        self.with_bytes(addr, len, |b| b.to_vec())
    }

    pub fn poke_u8(&self, addr: u64, value: u8) {
        self.poke(addr, &[value]);
    }

    pub fn poke_u16(&self, addr: u64, value: u16) {
        self.poke(addr, &value.to_le_bytes());
    }

    pub fn poke_u32(&self, addr: u64, value: u32) {
        self.poke(addr, &value.to_le_bytes());
    }

    pub fn poke_u64(&self, addr: u64, value: u64) {
        self.poke(addr, &value.to_le_bytes());
    }

    pub fn peek_u16(&self, addr: u64) -> u16 {
        u16::from_le_bytes(self.peek(addr, 2).try_into().unwrap())
    }

    pub fn peek_u32(&self, addr: u64) -> u32 {
        u32::from_le_bytes(self.peek(addr, 4).try_into().unwrap())
    }

    pub fn peek_u64(&self, addr: u64) -> u64 {
        u64::from_le_bytes(self.peek(addr, 8).try_into().unwrap())
    }

    pub fn events(&self) -> Vec<MemEvent> {
        self.events.borrow().clone()
    }

    pub fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }

    fn record(&self, event: MemEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl SharedMemory for SimMemory {
    fn read_u8(&self, addr: u64) -> u8 {
        self.peek(addr, 1)[0]
    }

    fn read_u16(&self, addr: u64) -> u16 {
        self.peek_u16(addr)
    }

    fn read_u32(&self, addr: u64) -> u32 {
        self.peek_u32(addr)
    }

    fn read_u64(&self, addr: u64) -> u64 {
        self.peek_u64(addr)
    }

    fn write_u16(&self, addr: u64, value: u16) {
        self.poke_u16(addr, value);
        self.record(MemEvent::Write { addr, len: 2 });
    }

    fn write_u32(&self, addr: u64, value: u32) {
        self.poke_u32(addr, value);
        self.record(MemEvent::Write { addr, len: 4 });
    }

    fn read_bytes(&self, addr: u64, buf: &mut [u8]) {
        self.with_bytes(addr, buf.len(), |b| buf.copy_from_slice(b));
    }

    fn write_bytes(&self, addr: u64, data: &[u8]) {
        self.poke(addr, data);
        self.record(MemEvent::Write {
            addr,
            len: data.len(),
        });
    }

    fn barrier(&self) {
        self.record(MemEvent::Barrier);
    }
}

// ── Msgbox registers ─────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegAccess {
    Read(usize),
    Write(usize, u32),
}

/// Msgbox register file for one channel pair.
///
/// Words the host posts land in `inbox` and raise the local pending bit;
/// words the remote posts collect in `outbox` until the host takes them.
pub struct SimRegs {
    cfg: MsgboxConfig,
    regs: RefCell<HashMap<usize, u32>>,
    inbox: RefCell<VecDeque<u32>>,
    outbox: RefCell<Vec<u32>>,
    accesses: RefCell<Vec<RegAccess>>,
}

impl SimRegs {
    pub fn new(cfg: MsgboxConfig) -> Self {
        Self {
            cfg,
            regs: RefCell::new(HashMap::new()),
            inbox: RefCell::new(VecDeque::new()),
            outbox: RefCell::new(Vec::new()),
            accesses: RefCell::new(Vec::new()),
        }
    }

    pub fn irq_enable_addr(&self) -> usize {
        self.cfg.local_base + read_irq_enable(self.cfg.local_n)
    }

    pub fn irq_status_addr(&self) -> usize {
        self.cfg.local_base + read_irq_status(self.cfg.local_n)
    }

    pub fn inbox_fifo_addr(&self) -> usize {
        self.cfg.local_base + msg_fifo(self.cfg.local_n, self.cfg.chan_p)
    }

    pub fn peer_status_addr(&self) -> usize {
        self.cfg.remote_base + msg_status(self.cfg.remote_n, self.cfg.chan_p)
    }

    pub fn peer_fifo_addr(&self) -> usize {
        self.cfg.remote_base + msg_fifo(self.cfg.remote_n, self.cfg.chan_p)
    }

    pub fn pending_bit(&self) -> u32 {
        1 << (2 * self.cfg.chan_p)
    }

    /// Host posts a kick to the remote.
    pub fn kick(&self, value: u32) {
        self.inbox.borrow_mut().push_back(value);
    }

    /// Host drains every kick the remote posted.
    pub fn take_kicks(&self) -> Vec<u32> {
        std::mem::take(&mut *self.outbox.borrow_mut())
    }

    /// Leave `n` unconsumed words in the peer FIFO.
    pub fn fill_peer_fifo(&self, n: usize) {
        self.outbox.borrow_mut().extend(std::iter::repeat(0xdead).take(n));
    }

    pub fn set(&self, addr: usize, value: u32) {
        self.regs.borrow_mut().insert(addr, value);
    }

    pub fn get(&self, addr: usize) -> u32 {
        self.regs.borrow().get(&addr).copied().unwrap_or(0)
    }

    pub fn accesses(&self) -> Vec<RegAccess> {
        self.accesses.borrow().clone()
    }

    pub fn clear_accesses(&self) {
        self.accesses.borrow_mut().clear();
    }

    pub fn writes_to(&self, addr: usize) -> usize {
        self.accesses
            .borrow()
            .iter()
            .filter(|a| matches!(a, RegAccess::Write(w, _) if *w == addr))
            .count()
    }
}

impl RegisterAccess for SimRegs {
    fn read32(&self, addr: usize) -> u32 {
        self.accesses.borrow_mut().push(RegAccess::Read(addr));

        if addr == self.irq_status_addr() {
            if self.inbox.borrow().is_empty() {
                0
            } else {
                self.pending_bit()
            }
        } else if addr == self.inbox_fifo_addr() {
            self.inbox.borrow_mut().pop_front().unwrap_or(0)
        } else if addr == self.peer_status_addr() {
            (self.outbox.borrow().len() as u32).min(0xF)
        } else {
            self.get(addr)
        }
    }

    fn write32(&self, addr: usize, value: u32) {
        self.accesses.borrow_mut().push(RegAccess::Write(addr, value));

        if addr == self.peer_fifo_addr() {
            self.outbox.borrow_mut().push(value);
        } else if addr != self.irq_status_addr() {
            // Pending status is write-one-to-clear and derived from the inbox.
            self.set(addr, value);
        }
    }
}

// ── Host driver side ─────────────────────────────────────────────────

/// The host's handle on one vring.
pub struct HostVring {
    pub layout: VringLayout,
}

impl HostVring {
    pub fn new(layout: VringLayout) -> Self {
        Self { layout }
    }

    pub fn set_desc(&self, mem: &SimMemory, idx: u16, addr: u64, len: u32, flags: DescFlags) {
        let base = self.layout.desc_addr(idx);
        mem.poke_u64(base, addr);
        mem.poke_u32(base + 8, len);
        mem.poke_u16(base + 12, flags.bits());
        mem.poke_u16(base + 14, 0);
    }

    pub fn desc_addr_of(&self, mem: &SimMemory, idx: u16) -> u64 {
        mem.peek_u64(self.layout.desc_addr(idx))
    }

    pub fn avail_idx(&self, mem: &SimMemory) -> u16 {
        mem.peek_u16(self.layout.avail_idx_addr())
    }

    pub fn set_avail_idx(&self, mem: &SimMemory, idx: u16) {
        mem.poke_u16(self.layout.avail_idx_addr(), idx);
    }

    /// Make descriptor `desc` available to the remote.
    pub fn offer(&self, mem: &SimMemory, desc: u16) {
        let idx = self.avail_idx(mem);
        mem.poke_u16(self.layout.avail_entry_addr(idx), desc);
        self.set_avail_idx(mem, idx.wrapping_add(1));
    }

    pub fn used_idx(&self, mem: &SimMemory) -> u16 {
        mem.peek_u16(self.layout.used_idx_addr())
    }

    pub fn set_used_idx(&self, mem: &SimMemory, idx: u16) {
        mem.poke_u16(self.layout.used_idx_addr(), idx);
    }

    /// Used element at ring index `idx` as `(id, len)`.
    pub fn used_elem(&self, mem: &SimMemory, idx: u16) -> (u32, u32) {
        let elem = self.layout.used_elem_addr(idx);
        (mem.peek_u32(elem), mem.peek_u32(elem + 4))
    }
}

/// Where the simulated loader places the resource table.
pub const RSC_ADDR: u64 = 0x4080_0000;
/// The host's endpoint address in the tests.
pub const HOST_EPT: u32 = 0x400;
/// Offset of the vdev status byte inside the resource table.
pub const RSC_STATUS_OFFSET: u64 = 44;
/// Offset of the second vring entry inside the resource table.
pub const RSC_VRING1_OFFSET: u64 = 68;

const TX_BUF_OFFSET: u64 = 0x4_0000;
const RX_BUF_OFFSET: u64 = 0x6_0000;

pub fn install_resource_table(mem: &SimMemory, addr: u64, cfg: &BoardConfig) {
    let table = ResourceTable::new(cfg);
    // ResourceTable is repr(C) without padding.
    let bytes = unsafe {
        std::slice::from_raw_parts(
            &table as *const ResourceTable as *const u8,
            size_of::<ResourceTable>(),
        )
    };
    mem.poke(addr, bytes);
}

/// A host core with its rpmsg driver loaded and both vrings allocated.
pub struct SimBoard {
    pub cfg: BoardConfig,
    pub mem: SimMemory,
    pub regs: SimRegs,
    /// vring0, remote -> host
    pub tx: HostVring,
    /// vring1, host -> remote
    pub rx: HostVring,
    tx_next: Cell<u16>,
    rx_next: Cell<u16>,
}

impl SimBoard {
    pub fn new() -> Self {
        Self::with_config(C906)
    }

    pub fn with_config(cfg: BoardConfig) -> Self {
        let mem = SimMemory::new();
        mem.map(RSC_ADDR, 0x1000);
        mem.map(cfg.shm_base, cfg.shm_size as usize);
        install_resource_table(&mem, RSC_ADDR, &cfg);

        let layout = |i: usize| {
            VringLayout::new(cfg.vring_da[i] as u64, cfg.vring_num, cfg.vring_align).unwrap()
        };
        let tx = HostVring::new(layout(0));
        let rx = HostVring::new(layout(1));

        for i in 0..cfg.vring_num as u16 {
            let slot = i as u64 * RPMSG_BUF_SIZE as u64;
            tx.set_desc(
                &mem,
                i,
                cfg.shm_base + TX_BUF_OFFSET + slot,
                RPMSG_BUF_SIZE as u32,
                DescFlags::WRITE,
            );
            rx.set_desc(
                &mem,
                i,
                cfg.shm_base + RX_BUF_OFFSET + slot,
                RPMSG_BUF_SIZE as u32,
                DescFlags::empty(),
            );
        }

        Self {
            cfg,
            regs: SimRegs::new(cfg.msgbox),
            mem,
            tx,
            rx,
            tx_next: Cell::new(0),
            rx_next: Cell::new(0),
        }
    }

    /// Host driver sets ACKNOWLEDGE | DRIVER | DRIVER_OK.
    pub fn set_driver_ok(&self) {
        self.mem.poke_u8(RSC_ADDR + RSC_STATUS_OFFSET, 0x07);
    }

    /// Offer the next `n` tx descriptors to the remote. Returns their indices.
    pub fn offer_tx_buffers(&self, n: u16) -> Vec<u16> {
        (0..n)
            .map(|_| {
                let desc = self.tx_next.get() % self.tx.layout.num;
                self.tx_next.set(self.tx_next.get().wrapping_add(1));
                self.tx.offer(&self.mem, desc);
                desc
            })
            .collect()
    }

    /// Queue one host -> remote message on vring1. Returns the descriptor.
    pub fn host_send(&self, src: u32, dst: u32, payload: &[u8]) -> u16 {
        let hdr = RpmsgHeader {
            src,
            dst,
            reserved: 0,
            len: payload.len() as u16,
            flags: 0,
        };
        self.host_send_raw(&hdr, payload)
    }

    /// Queue a message with an arbitrary header, length field included.
    pub fn host_send_raw(&self, hdr: &RpmsgHeader, payload: &[u8]) -> u16 {
        let desc = self.rx_next.get() % self.rx.layout.num;
        self.rx_next.set(self.rx_next.get().wrapping_add(1));

        let addr = self.rx.desc_addr_of(&self.mem, desc);
        self.mem.poke(addr, &hdr.to_bytes());
        self.mem.poke(addr + RPMSG_HDR_SIZE as u64, payload);
        self.rx.offer(&self.mem, desc);
        desc
    }

    /// Doorbell for vring1.
    pub fn kick_rx(&self) {
        self.regs.kick(RX_VQ_ID);
    }

    /// Message the remote published at tx used index `idx`.
    pub fn tx_message(&self, idx: u16) -> (RpmsgHeader, Vec<u8>) {
        let (id, len) = self.tx.used_elem(&self.mem, idx);
        let addr = self.tx.desc_addr_of(&self.mem, id as u16);
        let raw: [u8; RPMSG_HDR_SIZE] = self.mem.peek(addr, RPMSG_HDR_SIZE).try_into().unwrap();
        let payload = self
            .mem
            .peek(addr + RPMSG_HDR_SIZE as u64, len as usize - RPMSG_HDR_SIZE);
        (RpmsgHeader::from_bytes(&raw), payload)
    }
}
