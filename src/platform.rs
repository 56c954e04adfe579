//! Platform/Board Constants (Allwinner T113 / D1 class SoCs)
//!
//! Everything that differs between the remote cores lives in a `BoardConfig`
//! value so the protocol code is written once. Cargo features pick which
//! profile `BOARD` refers to.
//!
//! Only the C906 has a firmware image (`src/main.rs`, `firmware/c906.ld`).
//! The HIFI4 profile is used by the library and its tests; its `uart_base`
//! is UART0 as seen from the CPUX side and has not been checked on the DSP.

use crate::devices::msgbox::MsgboxConfig;
use crate::rpmsg::RPMSG_NAME_SIZE;

/// Static description of one remote core's view of the SoC.
#[derive(Clone, Copy, Debug)]
pub struct BoardConfig {
    /// Mailbox geometry used for kicks in both directions
    pub msgbox: MsgboxConfig,
    /// Shared-memory window holding the vrings and rpmsg buffers
    pub shm_base: u64,
    pub shm_size: u64,
    /// Device addresses of vring0 (remote -> host) and vring1 (host -> remote)
    pub vring_da: [u32; 2],
    /// Descriptors per vring
    pub vring_num: u32,
    pub vring_align: u32,
    /// Local rpmsg endpoint address
    pub local_addr: u32,
    /// Service name announced to the host's name service
    pub service_name: &'static str,
    /// Console UART (16550 compatible)
    pub uart_base: usize,
}

impl BoardConfig {
    /// First address past the shared-memory window.
    pub const fn shm_limit(&self) -> u64 {
        self.shm_base + self.shm_size
    }

    /// True if `addr` lies inside `[shm_base, shm_limit)`.
    pub const fn in_shm(&self, addr: u64) -> bool {
        addr >= self.shm_base && addr < self.shm_limit()
    }
}

// ── Shared constants ─────────────────────────────────────────────────

/// CPUX-side msgbox block, as seen from either remote core
pub const MSGBOX_CPUX_BASE: usize = 0x0300_3000;
pub const MSGBOX_REGION_SIZE: usize = 0x1000;

pub const VRING_NUM: u32 = 16;
pub const VRING_ALIGN: u32 = 4096;
pub const SHM_SIZE: u64 = 0x0010_0000; // 1MB

const VRING0_OFFSET: u32 = 0x0001_0000;
const VRING1_OFFSET: u32 = 0x0001_2000;

const UART0_BASE: usize = 0x0250_0000;

// ── XuanTie C906 (RISC-V) ────────────────────────────────────────────

const C906_SHM_BASE: u32 = 0x4100_0000;

pub const C906: BoardConfig = BoardConfig {
    msgbox: MsgboxConfig {
        local_base: 0x0601_F000,
        remote_base: MSGBOX_CPUX_BASE,
        region_size: MSGBOX_REGION_SIZE,
        // ARM writes coef_n = 0, seen locally as N = 0
        local_n: 0,
        // C906 -> ARM goes through N = 1 on the CPUX block
        remote_n: 1,
        chan_p: 0,
    },
    shm_base: C906_SHM_BASE as u64,
    shm_size: SHM_SIZE,
    vring_da: [C906_SHM_BASE + VRING0_OFFSET, C906_SHM_BASE + VRING1_OFFSET],
    vring_num: VRING_NUM,
    vring_align: VRING_ALIGN,
    local_addr: 0x1,
    service_name: "c906-echo",
    uart_base: UART0_BASE,
};

// ── HiFi4 DSP (Xtensa) ───────────────────────────────────────────────

const HIFI4_SHM_BASE: u32 = 0x4110_0000;

pub const HIFI4: BoardConfig = BoardConfig {
    msgbox: MsgboxConfig {
        local_base: 0x0170_1000,
        remote_base: MSGBOX_CPUX_BASE,
        region_size: MSGBOX_REGION_SIZE,
        local_n: 0,
        remote_n: 0,
        chan_p: 0,
    },
    shm_base: HIFI4_SHM_BASE as u64,
    shm_size: SHM_SIZE,
    vring_da: [HIFI4_SHM_BASE + VRING0_OFFSET, HIFI4_SHM_BASE + VRING1_OFFSET],
    vring_num: VRING_NUM,
    vring_align: VRING_ALIGN,
    local_addr: 0x2,
    service_name: "hifi4-echo",
    uart_base: UART0_BASE,
};

/// Profile selected at build time.
#[cfg(feature = "board-hifi4")]
pub const BOARD: BoardConfig = HIFI4;
#[cfg(not(feature = "board-hifi4"))]
pub const BOARD: BoardConfig = C906;

// The announced name must leave room for its NUL terminator.
static_assertions::const_assert!(C906.service_name.len() < RPMSG_NAME_SIZE);
static_assertions::const_assert!(HIFI4.service_name.len() < RPMSG_NAME_SIZE);
