//! Boot framebuffer.
//!
//! Limine hands over a linear framebuffer; the kernel maps it into its own
//! address space with `map_physical_window` and paints it a solid colour,
//! which shows the mapping path works end to end. No text rendering.

use crate::arch::boot::FramebufferInfo;
use crate::memory::{self, MemoryError, VirtAddr};

/// Color represented as 32-bit RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const BLACK: Color = Color::new(0, 0, 0);
    pub const SLATE: Color = Color::new(0x2F, 0x4F, 0x5F);

    /// Pack as 0x00RRGGBB, the layout of Limine's 32 bpp RGB mode.
    pub const fn packed(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }
}

/// The framebuffer as seen through the kernel's page tables.
#[derive(Debug)]
pub struct Framebuffer {
    base: VirtAddr,
    info: FramebufferInfo,
}

impl Framebuffer {
    /// Map the framebuffer described by `info`.
    pub fn map(info: FramebufferInfo) -> Result<Self, MemoryError> {
        let base = memory::map_physical_window(info.phys, info.byte_len())?;
        klog::debug!(
            "framebuffer {}x{}x{} at {} -> {}",
            info.width,
            info.height,
            info.bpp,
            info.phys,
            base
        );
        Ok(Self { base, info })
    }

    /// Byte offset of pixel (x, y), or `None` outside the visible area.
    pub fn pixel_offset(info: &FramebufferInfo, x: u64, y: u64) -> Option<u64> {
        if x >= info.width || y >= info.height {
            return None;
        }
        Some(y * info.pitch + x * u64::from(info.bpp / 8))
    }

    /// Paint every visible pixel `color`. Only 32 bpp modes are painted.
    pub fn fill(&mut self, color: Color) {
        if self.info.bpp != 32 {
            klog::warn!("framebuffer: {} bpp not supported, left as is", self.info.bpp);
            return;
        }

        let packed = color.packed();
        for y in 0..self.info.height {
            for x in 0..self.info.width {
                let Some(offset) = Self::pixel_offset(&self.info, x, y) else {
                    continue;
                };
                let pixel = (self.base + offset).as_mut_ptr::<u32>();
                // SAFETY: `pixel_offset` keeps the pixel inside the visible
                // area, which lies inside the mapped window.
                unsafe { pixel.write_volatile(packed) };
            }
        }
    }
}
