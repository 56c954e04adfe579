//! Peripherals and shared-memory devices used by the rpmsg transport.

pub mod msgbox;
pub mod virtio;

pub use msgbox::{Msgbox, MsgboxConfig};
