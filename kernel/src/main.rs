// =============================================================================
// Slate — Kernel Entry Point
// =============================================================================
//
// Limine has put the CPU in long mode, mapped the image at the top of the
// address space and all of RAM at the HHDM offset, and jumped to kmain()
// with interrupts disabled on the bootstrap core. Bring-up order:
//
//   1. Serial logging, then the command line (log level, slice, TSC rate)
//   2. Memory: recursive slot, frame arena, virtual reservoir
//   3. Framebuffer mapped through the kernel's tables and painted
//   4. Local APIC mapped and enabled, TSC-deadline support checked
//   5. Trap table, PIC (keyboard only), keyboard decoder, APIC timer
//   6. Threads seeded; the scheduler takes over and never returns
//
// Any failure before step 6 is fatal.
// =============================================================================

#![no_std]
#![no_main]

use slate::arch::{boot, cpu};
use slate::config::{BootOptions, FRAME_SIZE, vectors};
use slate::drivers::framebuffer::{Color, Framebuffer};
use slate::error::KernelError;
use slate::memory::{self, PhysAddr};
use slate::task::{clock, scheduler, workload};
use slate::traps;
use slate::util::fatal::{Fatal, fatal};

#[unsafe(no_mangle)]
extern "C" fn kmain() -> ! {
    cpu::disable_interrupts();

    klog::init(klog::LevelFilter::Info);
    klog::info!("Slate booting");

    if let Err(err) = bring_up() {
        fatal(Fatal::Boot(err));
    }

    klog::info!("starting scheduler");
    scheduler::resume_or_idle()
}

fn bring_up() -> Result<(), KernelError> {
    // ── Options ──
    let options = boot::command_line()
        .map(BootOptions::parse)
        .unwrap_or_default();
    klog::set_level(options.log_level);
    klog::debug!("{:?}", options);

    // ── Memory ──
    boot::check_revision()?;
    let hhdm_offset = boot::hhdm_offset()?;
    let image = boot::kernel_image()?;
    klog::debug!(
        "HHDM at {:#x}, image {} -> {}",
        hhdm_offset,
        image.physical_base,
        image.virtual_base
    );
    // SAFETY: single-threaded bring-up, Limine's tables are live.
    unsafe { memory::init(hhdm_offset, image)? };

    // ── Display ──
    match boot::framebuffer(hhdm_offset) {
        Some(info) => Framebuffer::map(info)?.fill(Color::SLATE),
        None => klog::warn!("no framebuffer"),
    }

    // ── Local APIC ──
    if !khal::apic::supports_tsc_deadline() {
        return Err(KernelError::MissingCpuFeature("TSC-deadline APIC timer"));
    }
    let apic = memory::map_device_window(PhysAddr::new(khal::apic::physical_base()), FRAME_SIZE)?;
    // SAFETY: the register page was just mapped uncached at `apic`.
    let apic_id = unsafe { khal::apic::init(apic.as_u64(), vectors::APIC_SPURIOUS) };
    klog::info!("local APIC {} at {}", apic_id, apic);

    // ── Interrupts ──
    traps::init();
    khal::pic::init(1 << khal::pic::KEYBOARD_IRQ);
    khal::keyboard::init();
    khal::apic::enable_deadline_timer(vectors::TIMER);

    // ── Threads ──
    clock::set_tsc_mhz(options.tsc_mhz);
    scheduler::set_time_slice(options.time_slice);
    workload::seed_all();

    let (frames, pages) = memory::remaining()?;
    klog::info!(
        "{} KiB of frames and {} MiB of address space left",
        frames / 1024,
        pages / (1024 * 1024)
    );
    Ok(())
}
