#![no_std]
#![no_main]

#[cfg(feature = "board-hifi4")]
compile_error!("the firmware image is only built for the C906 core (board-c906)");

use core::panic::PanicInfo;

use rpmsg_remote::arch::{Mmio, PhysMemory};
use rpmsg_remote::platform::BOARD;
use rpmsg_remote::resource_table::{ResourceTable, SharedResourceTable};
use rpmsg_remote::{logger, println, Service};

/// Resource table read by the host's remoteproc loader.
#[used]
#[no_mangle]
#[link_section = ".resource_table"]
pub static RESOURCES: SharedResourceTable = SharedResourceTable::new(ResourceTable::new(&BOARD));

// Minimal RISC-V entry: stack, clear .bss, jump to Rust. Symbols come from
// firmware/c906.ld.
#[cfg(target_arch = "riscv64")]
core::arch::global_asm!(
    ".section .text.entry",
    ".globl _start",
    "_start:",
    "    la sp, __stack_top",
    "    la t0, __bss_start",
    "    la t1, __bss_end",
    "1:  bgeu t0, t1, 2f",
    "    sd zero, 0(t0)",
    "    addi t0, t0, 8",
    "    j 1b",
    "2:  call rust_main",
    "3:  wfi",
    "    j 3b",
);

/// Rust entry point called from the board's startup code
#[no_mangle]
pub extern "C" fn rust_main() -> ! {
    logger::init();

    println!("========================================");
    println!("  {} rpmsg firmware", BOARD.service_name);
    println!("========================================");

    match Service::new(PhysMemory, Mmio, BOARD, RESOURCES.addr()) {
        Ok(mut service) => service.run(),
        Err(err) => {
            log::error!("resource table rejected: {}", err);
            park()
        }
    }
}

fn park() -> ! {
    loop {
        #[cfg(target_arch = "riscv64")]
        unsafe {
            core::arch::asm!("wfi", options(nomem, nostack));
        }
        #[cfg(not(target_arch = "riscv64"))]
        core::hint::spin_loop();
    }
}

/// Panic handler - required for no_std
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    println!("\n!!! PANIC !!!");
    println!("{}", info);
    park()
}
