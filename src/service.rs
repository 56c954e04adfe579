//! rpmsg service loop
//!
//! A single busy-poll loop drives the whole link. Each iteration:
//!
//! 1. reads the vdev status byte from the resource table;
//! 2. on the first iteration that sees DRIVER_OK, moves the rx cursor up to
//!    the host's avail index (anything queued during negotiation is noise);
//! 3. while the name service announcement has not gone out, tries it once;
//! 4. polls the msgbox. A kick that arrives before DRIVER_OK is consumed and
//!    dropped; otherwise the rx vring is drained.
//!
//! The msgbox is drained on every iteration, ready or not, so the host's
//! mailbox TX queue never backs up during negotiation.

use log::{info, warn};

use crate::arch::{RegisterAccess, SharedMemory};
use crate::devices::virtio::LayoutError;
use crate::platform::BoardConfig;
use crate::resource_table::ResourceTableView;
use crate::rpmsg::{DrainReport, RpmsgDevice};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("vring{index}: {source}")]
    Vring {
        index: usize,
        #[source]
        source: LayoutError,
    },
}

/// Handshake progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Host driver has not set DRIVER_OK yet
    WaitHostReady,
    /// Ready and synced, announcement not sent yet
    AnnounceNs,
    /// Steady state
    Running,
}

/// What one loop iteration did with the doorbell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// No kick pending
    Idle,
    /// Kick consumed while the host was not ready
    KickDropped(u32),
    /// Kick handled by draining the rx vring
    Dispatched { vqid: u32, report: DrainReport },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub kicks: u32,
    pub kicks_dropped: u32,
    pub messages_echoed: u32,
    pub echo_failures: u32,
    pub invalid_rx_batches: u32,
    pub ns_attempts: u32,
}

pub struct Service<M: SharedMemory, R: RegisterAccess> {
    dev: RpmsgDevice<M, R>,
    rsc: ResourceTableView,
    vrings_synced: bool,
    ns_sent: bool,
    stats: ServiceStats,
}

impl<M: SharedMemory, R: RegisterAccess> Service<M, R> {
    /// Set up both vrings from the resource table at `rsc_addr` and bring up
    /// the msgbox.
    pub fn new(mem: M, regs: R, cfg: BoardConfig, rsc_addr: u64) -> Result<Self, ConfigError> {
        let rsc = ResourceTableView::new(rsc_addr);
        let tx = rsc
            .vring_layout(&mem, 0)
            .map_err(|source| ConfigError::Vring { index: 0, source })?;
        let rx = rsc
            .vring_layout(&mem, 1)
            .map_err(|source| ConfigError::Vring { index: 1, source })?;

        info!("VRING0_DA={:#010x}, VRING1_DA={:#010x}", tx.desc, rx.desc);

        let dev = RpmsgDevice::new(mem, regs, cfg, tx, rx);
        dev.msgbox().init();

        let mb = dev.msgbox().config();
        info!(
            "MSGBOX_BASE_LOCAL={:#010x} LOCAL_N={} REMOTE_N={} CHAN_P={}",
            mb.local_base, mb.local_n, mb.remote_n, mb.chan_p
        );

        Ok(Self {
            dev,
            rsc,
            vrings_synced: false,
            ns_sent: false,
            stats: ServiceStats::default(),
        })
    }

    pub fn device(&self) -> &RpmsgDevice<M, R> {
        &self.dev
    }

    pub fn stats(&self) -> &ServiceStats {
        &self.stats
    }

    pub fn vrings_synced(&self) -> bool {
        self.vrings_synced
    }

    pub fn ns_sent(&self) -> bool {
        self.ns_sent
    }

    pub fn host_ready(&self) -> bool {
        self.rsc.host_ready(self.dev.memory())
    }

    pub fn phase(&self) -> Phase {
        if !self.vrings_synced {
            Phase::WaitHostReady
        } else if !self.ns_sent {
            Phase::AnnounceNs
        } else {
            Phase::Running
        }
    }

    fn sync_vrings(&mut self) {
        let rx_avail = self.dev.sync_rx();
        let tx_avail = self.dev.tx().avail_idx(self.dev.memory());
        info!("vring sync: avail_rx={} avail_tx={}", rx_avail, tx_avail);
        self.vrings_synced = true;
    }

    /// Send the name service announcement unless it already went out.
    ///
    /// Returns true once it has been sent.
    pub fn try_announce(&mut self) -> bool {
        if self.ns_sent {
            return true;
        }

        self.stats.ns_attempts += 1;
        match self.dev.announce_local_endpoint() {
            Ok(()) => {
                info!("sent NS announcement");
                self.ns_sent = true;
            }
            Err(err) => warn!("rpmsg_send_ns failed: {}", err),
        }
        self.ns_sent
    }

    /// Run one iteration of the service loop.
    pub fn poll_once(&mut self) -> Tick {
        let ready = self.host_ready();

        if ready && !self.vrings_synced {
            self.sync_vrings();
        }

        if ready && !self.ns_sent {
            self.try_announce();
        }

        let Some(vqid) = self.dev.poll_kick() else {
            return Tick::Idle;
        };
        self.stats.kicks += 1;

        if !ready {
            info!("host not ready, drop kick vqid={}", vqid);
            self.stats.kicks_dropped += 1;
            return Tick::KickDropped(vqid);
        }

        let report = self.dev.drain_and_dispatch(vqid);
        self.stats.messages_echoed += report.echoed;
        self.stats.echo_failures += report.echo_failures;
        if report.stopped_invalid {
            self.stats.invalid_rx_batches += 1;
        }
        Tick::Dispatched { vqid, report }
    }

    /// Poll forever.
    pub fn run(&mut self) -> ! {
        info!("rpmsg service start");
        loop {
            self.poll_once();
        }
    }
}
