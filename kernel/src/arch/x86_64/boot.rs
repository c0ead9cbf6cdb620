// =============================================================================
// Slate — Limine Boot Protocol Interface
// =============================================================================
//
// The kernel image carries static "request" structures; Limine finds them by
// their magic bytes, fulfils each one and leaves a response pointer behind.
// Everything the kernel learns about the machine at boot comes through here:
//
//   - HHDM offset      — where Limine mapped all of physical memory
//   - framebuffer      — passed through to the display for mapping
//   - executable address — physical/virtual load base of the kernel image,
//                        used to turn image addresses into physical ones
//   - command line     — boot options (see `config::BootOptions`)
//
// Responses are only valid from `kmain` onwards.
// =============================================================================

use limine::BaseRevision;
use limine::request::{
    ExecutableAddressRequest, ExecutableCmdlineRequest, FramebufferRequest, HhdmRequest,
};

use crate::error::KernelError;
use crate::memory::{PhysAddr, VirtAddr};

// =============================================================================
// Limine Request Declarations
// =============================================================================
//
// `#[used]` keeps the statics alive (nothing in Rust reads their addresses;
// Limine finds them by scanning), and `.limine_requests` places them in the
// loadable segment the linker script reserves for them.
// =============================================================================

#[used]
#[unsafe(link_section = ".limine_requests")]
static BASE_REVISION: BaseRevision = BaseRevision::new();

#[used]
#[unsafe(link_section = ".limine_requests")]
static HHDM_REQUEST: HhdmRequest = HhdmRequest::new();

#[used]
#[unsafe(link_section = ".limine_requests")]
static FRAMEBUFFER_REQUEST: FramebufferRequest = FramebufferRequest::new();

#[used]
#[unsafe(link_section = ".limine_requests")]
static EXECUTABLE_ADDRESS_REQUEST: ExecutableAddressRequest = ExecutableAddressRequest::new();

#[used]
#[unsafe(link_section = ".limine_requests")]
static CMDLINE_REQUEST: ExecutableCmdlineRequest = ExecutableCmdlineRequest::new();

// =============================================================================
// Boot Information API
// =============================================================================

/// Framebuffer geometry, with the pixel memory given as a physical address.
///
/// Limine reports the framebuffer through its direct map; the kernel maps
/// it again through its own page tables, so only the physical base is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferInfo {
    pub phys: PhysAddr,
    pub width: u64,
    pub height: u64,
    /// Bytes per row; may exceed `width * bpp / 8`.
    pub pitch: u64,
    pub bpp: u16,
}

impl FramebufferInfo {
    /// Bytes spanned by the visible rows.
    pub fn byte_len(&self) -> u64 {
        self.pitch * self.height
    }
}

/// Where Limine loaded the kernel image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelImage {
    pub physical_base: PhysAddr,
    pub virtual_base: VirtAddr,
}

impl KernelImage {
    /// Physical address behind an address inside the kernel image.
    pub fn physical_of(&self, virt: VirtAddr) -> PhysAddr {
        self.physical_base + (virt - self.virtual_base)
    }
}

/// Fail early if Limine cannot honour the protocol revision we were
/// built against.
pub fn check_revision() -> Result<(), KernelError> {
    if BASE_REVISION.is_supported() {
        Ok(())
    } else {
        Err(KernelError::UnsupportedBootRevision)
    }
}

/// Offset of Limine's higher-half direct map: physical P is at P + offset.
pub fn hhdm_offset() -> Result<u64, KernelError> {
    HHDM_REQUEST
        .get_response()
        .map(|response| response.offset())
        .ok_or(KernelError::MissingBootResponse("HHDM"))
}

/// Physical and virtual load base of the kernel image.
pub fn kernel_image() -> Result<KernelImage, KernelError> {
    let response = EXECUTABLE_ADDRESS_REQUEST
        .get_response()
        .ok_or(KernelError::MissingBootResponse("executable address"))?;
    Ok(KernelImage {
        physical_base: PhysAddr::new(response.physical_base()),
        virtual_base: VirtAddr::new(response.virtual_base()),
    })
}

/// The first framebuffer, if Limine set one up.
pub fn framebuffer(hhdm_offset: u64) -> Option<FramebufferInfo> {
    let response = FRAMEBUFFER_REQUEST.get_response()?;
    let fb = response.framebuffers().next()?;

    Some(FramebufferInfo {
        phys: PhysAddr::new(fb.addr() as u64 - hhdm_offset),
        width: fb.width(),
        height: fb.height(),
        pitch: fb.pitch(),
        bpp: fb.bpp(),
    })
}

/// The kernel command line, or `None` if absent or not UTF-8.
pub fn command_line() -> Option<&'static str> {
    let response = CMDLINE_REQUEST.get_response()?;
    response.cmdline().to_str().ok()
}
