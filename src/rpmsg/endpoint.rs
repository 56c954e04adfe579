//! rpmsg endpoint: send, name service announcement, receive and echo.
//!
//! `RpmsgDevice` is the whole transport context: the shared memory, the
//! doorbell, both vrings with their private cursors, and the board constants.
//! The service loop owns it and nothing else touches it.
//!
//! vring0 (`tx`) carries remote -> host messages, vring1 (`rx`) carries
//! host -> remote messages. The host donates the buffers on both.

use log::{debug, log_enabled, trace, warn, Level};

use super::{
    HexBytes, NsAnnouncement, NsFlags, RpmsgHeader, RPMSG_HDR_SIZE, RPMSG_NS_ADDR, TX_VQ_ID,
};
use crate::arch::{RegisterAccess, SharedMemory};
use crate::devices::msgbox::Msgbox;
use crate::devices::virtio::{Virtqueue, VirtqDesc, VringLayout};
use crate::platform::BoardConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("no tx buffer available")]
    NoBufferAvailable,
    #[error("tx descriptor index {0} out of range")]
    InvalidDescriptor(u16),
    #[error("tx buffer {addr:#x} outside shared memory")]
    BufferOutOfBounds { addr: u64 },
    #[error("tx buffer of {len} bytes cannot hold a header")]
    BufferTooSmall { len: u32 },
}

/// What one `drain_and_dispatch` pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Buffers returned to the host
    pub processed: u32,
    /// Payloads echoed back to their sender
    pub echoed: u32,
    /// Echoes that could not be sent
    pub echo_failures: u32,
    /// The pass stopped on a buffer outside shared memory
    pub stopped_invalid: bool,
}

/// Bytes moved per step when copying between shared-memory buffers.
const COPY_CHUNK: usize = 64;

fn copy_shm<M: SharedMemory>(mem: &M, src: u64, dst: u64, len: usize) {
    let mut chunk = [0u8; COPY_CHUNK];
    let mut off = 0;
    while off < len {
        let n = (len - off).min(COPY_CHUNK);
        mem.read_bytes(src + off as u64, &mut chunk[..n]);
        mem.write_bytes(dst + off as u64, &chunk[..n]);
        off += n;
    }
}

/// rpmsg transport state for the single local endpoint.
pub struct RpmsgDevice<M: SharedMemory, R: RegisterAccess> {
    mem: M,
    msgbox: Msgbox<R>,
    tx: Virtqueue,
    rx: Virtqueue,
    cfg: BoardConfig,
    rx_invalid_warned: bool,
}

impl<M: SharedMemory, R: RegisterAccess> RpmsgDevice<M, R> {
    pub fn new(mem: M, regs: R, cfg: BoardConfig, tx: VringLayout, rx: VringLayout) -> Self {
        Self {
            mem,
            msgbox: Msgbox::new(regs, cfg.msgbox),
            tx: Virtqueue::new(tx),
            rx: Virtqueue::new(rx),
            cfg,
            rx_invalid_warned: false,
        }
    }

    pub fn memory(&self) -> &M {
        &self.mem
    }

    pub fn msgbox(&self) -> &Msgbox<R> {
        &self.msgbox
    }

    pub fn config(&self) -> &BoardConfig {
        &self.cfg
    }

    pub fn tx(&self) -> &Virtqueue {
        &self.tx
    }

    pub fn rx(&self) -> &Virtqueue {
        &self.rx
    }

    /// Drop every rx buffer the host queued so far; they predate DRIVER_OK.
    ///
    /// Returns the new rx cursor.
    pub fn sync_rx(&mut self) -> u16 {
        self.rx.sync_to_avail(&self.mem)
    }

    /// Bytes of `desc` that lie inside the shared-memory window.
    fn readable_len(&self, desc: &VirtqDesc) -> usize {
        let to_limit = self.cfg.shm_limit().saturating_sub(desc.addr);
        (desc.len as u64).min(to_limit) as usize
    }

    /// Send `payload` from the local endpoint to `dst`.
    ///
    /// Payloads that do not fit the host's buffer are truncated, not
    /// rejected. Returns the number of payload bytes sent.
    pub fn send(&mut self, dst: u32, payload: &[u8]) -> Result<usize, SendError> {
        self.send_with(dst, payload.len(), |mem, addr, len| {
            mem.write_bytes(addr, &payload[..len])
        })
    }

    /// Send `len` bytes that already sit in shared memory at `src`.
    ///
    /// Same truncation rules as `send`; the bytes are copied buffer to buffer
    /// without an intermediate payload-sized copy.
    pub fn send_from_shm(&mut self, dst: u32, src: u64, len: usize) -> Result<usize, SendError> {
        self.send_with(dst, len, |mem, addr, len| copy_shm(mem, src, addr, len))
    }

    fn send_with<F>(&mut self, dst: u32, want: usize, fill: F) -> Result<usize, SendError>
    where
        F: FnOnce(&M, u64, usize),
    {
        let idx = self
            .tx
            .take_available(&self.mem)
            .ok_or(SendError::NoBufferAvailable)?;

        let Some(desc) = self.tx.read_desc(&self.mem, idx) else {
            warn!("rpmsg: tx descriptor {} out of range", idx);
            return Err(SendError::InvalidDescriptor(idx));
        };

        if let Err(err) = self.check_tx_buffer(&desc) {
            warn!("rpmsg: tx desc={} rejected: {}", idx, err);
            // Give the buffer straight back so the host does not lose it.
            self.tx.publish_used(&self.mem, idx, 0);
            self.msgbox.notify_peer(TX_VQ_ID);
            return Err(err);
        }

        let room = self.readable_len(&desc) - RPMSG_HDR_SIZE;
        let len = want.min(room).min(u16::MAX as usize);
        if len < want {
            debug!("rpmsg: truncating {} byte payload to {}", want, len);
        }

        let hdr = RpmsgHeader {
            src: self.cfg.local_addr,
            dst,
            reserved: 0,
            len: len as u16,
            flags: 0,
        };
        self.mem.write_bytes(desc.addr, &hdr.to_bytes());
        fill(&self.mem, desc.addr + RPMSG_HDR_SIZE as u64, len);

        self.tx
            .publish_used(&self.mem, idx, (RPMSG_HDR_SIZE + len) as u32);
        self.msgbox.notify_peer(TX_VQ_ID);
        Ok(len)
    }

    fn check_tx_buffer(&self, desc: &VirtqDesc) -> Result<(), SendError> {
        if !self.cfg.in_shm(desc.addr) {
            return Err(SendError::BufferOutOfBounds { addr: desc.addr });
        }
        if self.readable_len(desc) < RPMSG_HDR_SIZE {
            return Err(SendError::BufferTooSmall { len: desc.len });
        }
        Ok(())
    }

    /// Tell the host's name service that our endpoint exists.
    pub fn announce_local_endpoint(&mut self) -> Result<(), SendError> {
        let ns = NsAnnouncement::new(self.cfg.service_name, self.cfg.local_addr, NsFlags::Create);
        self.send(RPMSG_NS_ADDR, &ns.to_bytes()).map(|_| ())
    }

    /// Process every message the host queued on the rx vring.
    ///
    /// Each payload is echoed to its sender, then the buffer is returned with
    /// its full length and the host is kicked with `notify_id`. A buffer
    /// outside shared memory ends the pass without being touched.
    pub fn drain_and_dispatch(&mut self, notify_id: u32) -> DrainReport {
        let mut report = DrainReport::default();

        while let Some(idx) = self.rx.take_available(&self.mem) {
            let desc = match self.rx.read_desc(&self.mem, idx) {
                Some(desc) if self.cfg.in_shm(desc.addr) => desc,
                desc => {
                    self.report_invalid_rx(idx, desc);
                    report.stopped_invalid = true;
                    break;
                }
            };

            trace!(
                "RX desc={} len={} addr={:#x} flags={:?}",
                idx,
                desc.len,
                desc.addr,
                desc.flags()
            );

            let max_payload = self.readable_len(&desc).saturating_sub(RPMSG_HDR_SIZE);
            if max_payload > 0 {
                let mut raw = [0u8; RPMSG_HDR_SIZE];
                self.mem.read_bytes(desc.addr, &mut raw);
                let hdr = RpmsgHeader::from_bytes(&raw);

                let len = (hdr.len as usize).min(max_payload);
                trace!(
                    "RX hdr: src={:#x} dst={:#x} len={} flags={:#x}",
                    hdr.src,
                    hdr.dst,
                    len,
                    hdr.flags
                );

                if len > 0 {
                    let payload = desc.addr + RPMSG_HDR_SIZE as u64;
                    if log_enabled!(Level::Trace) {
                        self.trace_payload(payload, len);
                    }

                    match self.send_from_shm(hdr.src, payload, len) {
                        Ok(_) => report.echoed += 1,
                        Err(err) => {
                            warn!("rpmsg: echo to {:#x} failed ({} bytes): {}", hdr.src, len, err);
                            report.echo_failures += 1;
                        }
                    }
                }
            }

            self.rx.publish_used(&self.mem, idx, desc.len);
            self.msgbox.notify_peer(notify_id);
            report.processed += 1;
        }

        report
    }

    fn trace_payload(&self, addr: u64, len: usize) {
        let mut chunk = [0u8; COPY_CHUNK];
        let mut off = 0;
        while off < len {
            let n = (len - off).min(COPY_CHUNK);
            self.mem.read_bytes(addr + off as u64, &mut chunk[..n]);
            trace!("RX payload +{:#x}: {}", off, HexBytes(&chunk[..n]));
            off += n;
        }
    }

    fn report_invalid_rx(&mut self, idx: u16, desc: Option<VirtqDesc>) {
        if self.rx_invalid_warned {
            return;
        }
        self.rx_invalid_warned = true;

        match desc {
            Some(desc) => warn!(
                "RX invalid buf: idx={} addr={:#018x} len={}",
                idx, desc.addr, desc.len
            ),
            None => warn!("RX invalid desc idx={} (num={})", idx, self.rx.num()),
        }
        warn!(
            "RX state: avail_idx={} last_avail={}",
            self.rx.avail_idx(&self.mem),
            self.rx.last_avail_idx()
        );
    }

    /// Check the doorbell for a kick from the host.
    pub fn poll_kick(&self) -> Option<u32> {
        self.msgbox.poll()
    }
}
