#![no_std]

//! Remote-side rpmsg transport for auxiliary cores (C906 RISC-V, HiFi4 DSP).
//!
//! The host core runs the Linux remoteproc/rpmsg driver. This crate is the
//! other end: two vrings in shared memory, a msgbox doorbell for kicks, one
//! echo endpoint announced through the name service, all driven by a polling
//! loop with no interrupts and no allocation.

pub mod arch;
pub mod devices;
pub mod logger;
pub mod platform;
pub mod resource_table;
pub mod rpmsg;
pub mod service;
pub mod uart;

pub use service::{Phase, Service, ServiceStats, Tick};
