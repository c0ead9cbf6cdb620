// =============================================================================
// Slate — Kernel Panic Handler
// =============================================================================
//
// Panics in the kernel are FATAL: a violated invariant in the trusted core.
// The message goes straight to the UART (not through the console lock, which
// the panicking context may hold) and the core halts.
// =============================================================================

use core::panic::PanicInfo;

use crate::arch::cpu;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    cpu::disable_interrupts();

    klog::emergency(format_args!("\n==========================================================\n"));
    klog::emergency(format_args!("  KERNEL PANIC — Slate\n"));
    klog::emergency(format_args!("==========================================================\n"));
    match info.location() {
        Some(location) => klog::emergency(format_args!("  Location: {}:{}\n", location.file(), location.line())),
        None => klog::emergency(format_args!("  Location: <unknown>\n")),
    }
    klog::emergency(format_args!("  Message: {}\n", info.message()));
    klog::emergency(format_args!("  System halted.\n"));

    cpu::halt_forever()
}
