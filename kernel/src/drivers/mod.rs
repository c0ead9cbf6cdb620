// =============================================================================
// Slate — Kernel Drivers
// =============================================================================
//
// Device access that needs the kernel's own mappings lives here. Port-based
// and MSR-based hardware (serial, PIC, APIC, keyboard) is in `khal`.
//
//   framebuffer.rs — maps the boot framebuffer and paints it
// =============================================================================

pub mod framebuffer;
