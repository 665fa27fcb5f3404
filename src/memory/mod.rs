#![doc = r#"
Memory module: address decode, region classification, and the fetch/load/
store surface the decoder and protocol harness use.

Overview
- This directory mirrors the façade-plus-submodule layout used elsewhere in
  this crate: `AddressSpace` owns the raw buffers and pure address decode,
  `peripheral` hosts the memory-mapped peripheral emulation (CRC16
  generator, RNG, fixed hpairs table) that intercepts reads/writes before
  they reach plain memory.

Regions
- IO      [0x0000, 0x001f]
- RAM     [0x0020, 0x0fff]
- XIO     [0x3c00, 0x3dff]
- ROM0    [0x4000, 0xbfff]   (page 0 code)
- FLASH   [0xc000, 0xc7ff]
- ROM1    [0x8000, 0xffff]   (page 1 code; overlaps ROM0's upper half by
  address value, distinguished only by which page is selected)

IO/RAM/XIO are a single shared buffer mirrored into both pages; FLASH is a
dedicated buffer independent of page; ROM0/ROM1 are distinct buffers.
"#]

pub mod peripheral;

use crate::error::{SimError, SimResult};
use peripheral::PeripheralBus;

pub const IO_START: u32 = 0x0000;
pub const IO_END: u32 = 0x001f;
pub const RAM_START: u32 = 0x0020;
pub const RAM_END: u32 = 0x0fff;
pub const XIO_START: u32 = 0x3c00;
pub const XIO_END: u32 = 0x3dff;
pub const ROM0_START: u32 = 0x4000;
pub const ROM0_END: u32 = 0xbfff;
pub const FLASH_START: u32 = 0xc000;
pub const FLASH_END: u32 = 0xc7ff;
pub const ROM1_START: u32 = 0x8000;
pub const ROM1_END: u32 = 0xffff;

const LOWMEM_SIZE: usize = (XIO_END + 1) as usize;
const ROM_SIZE: usize = (ROM0_END - ROM0_START + 1) as usize;
const FLASH_SIZE: usize = (FLASH_END - FLASH_START + 1) as usize;

/// Classification of a 16-bit page offset. Io/Ram/Xio/Flash are the same on
/// both pages; Rom depends on which page is selected, since page 0's code
/// window (`0x4000..=0xBFFF`) and page 1's (`0x8000..=0xFFFF`) only partly
/// overlap in address value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryRegion {
    Io,
    Ram,
    Xio,
    Rom,
    Flash,
    Unmapped,
}

impl MemoryRegion {
    pub fn classify(page: Page, offset: u16) -> MemoryRegion {
        let offset = offset as u32;
        match offset {
            IO_START..=IO_END => MemoryRegion::Io,
            RAM_START..=RAM_END => MemoryRegion::Ram,
            XIO_START..=XIO_END => MemoryRegion::Xio,
            FLASH_START..=FLASH_END => MemoryRegion::Flash,
            _ => {
                let in_rom = match page {
                    Page::Page0 => (ROM0_START..=ROM0_END).contains(&offset),
                    Page::Page1 => (ROM1_START..=ROM1_END).contains(&offset),
                };
                if in_rom {
                    MemoryRegion::Rom
                } else {
                    MemoryRegion::Unmapped
                }
            }
        }
    }

    /// True for regions that can legally hold an instruction stream.
    pub fn is_code(self) -> bool {
        matches!(self, MemoryRegion::Rom | MemoryRegion::Flash)
    }

    /// Upper-case region token used in fatal-fetch diagnostics, matching the
    /// original's `"FETCHING FROM %s REGION"` wording.
    fn diagnostic_label(self) -> &'static str {
        match self {
            MemoryRegion::Io => "IO",
            MemoryRegion::Ram => "RAM",
            MemoryRegion::Xio => "XIO",
            MemoryRegion::Rom => "ROM",
            MemoryRegion::Flash => "FLASH",
            MemoryRegion::Unmapped => "UNMAPPED",
        }
    }
}

/// Which of the two overlapping 64KiB code pages is selected. The low-memory
/// mirror (IO/RAM/XIO) and FLASH are shared between pages; only ROM0 vs ROM1
/// differ by page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Page0,
    Page1,
}

/// Owns the raw memory buffers and the peripheral bus, and exposes the
/// fetch/load/store surface the decoder and protocol harness use.
///
/// `fetch` is instruction-stream access and is fatal outside a code region.
/// `load`/`store` are data access and are routed through the peripheral bus
/// first. `load_raw`/`store_raw` bypass the peripheral bus and any
/// breakpoint bookkeeping; they exist for snapshot I/O and test fixtures.
pub struct AddressSpace {
    lowmem: [u8; LOWMEM_SIZE],
    rom0: [u8; ROM_SIZE],
    rom1: [u8; ROM_SIZE],
    flash: [u8; FLASH_SIZE],
    pub bus: PeripheralBus,
    /// Data accesses recorded by `load`/`store` since the last drain, for
    /// the run loop to feed into the breakpoint engine's data-watch list
    /// after each instruction.
    pending_accesses: Vec<(u16, bool)>,
}

impl Default for AddressSpace {
    fn default() -> Self {
        AddressSpace {
            lowmem: [0u8; LOWMEM_SIZE],
            rom0: [0u8; ROM_SIZE],
            rom1: [0u8; ROM_SIZE],
            flash: [0u8; FLASH_SIZE],
            bus: PeripheralBus::default(),
            pending_accesses: Vec::new(),
        }
    }
}

impl AddressSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.lowmem.fill(0);
        self.rom0.fill(0);
        self.rom1.fill(0);
        self.flash.fill(0);
        self.bus = PeripheralBus::default();
        self.pending_accesses.clear();
    }

    fn rom_slice(&self, page: Page) -> &[u8; ROM_SIZE] {
        match page {
            Page::Page0 => &self.rom0,
            Page::Page1 => &self.rom1,
        }
    }

    fn rom_slice_mut(&mut self, page: Page) -> &mut [u8; ROM_SIZE] {
        match page {
            Page::Page0 => &mut self.rom0,
            Page::Page1 => &mut self.rom1,
        }
    }

    /// First address of the page's code window: `rom0` is indexed from
    /// `ROM0_START`, `rom1` from `ROM1_START` (they're the same size, 32KiB,
    /// but cover different address ranges).
    fn rom_base(page: Page) -> u16 {
        match page {
            Page::Page0 => ROM0_START as u16,
            Page::Page1 => ROM1_START as u16,
        }
    }

    /// Raw, unmediated read: no peripheral interception, no fatal checks.
    /// Used by snapshot I/O and inspection tools.
    pub fn load_raw(&self, page: Page, offset: u16) -> u8 {
        match MemoryRegion::classify(page, offset) {
            MemoryRegion::Io | MemoryRegion::Ram | MemoryRegion::Xio => {
                self.lowmem[offset as usize]
            }
            MemoryRegion::Flash => self.flash[(offset - FLASH_START as u16) as usize],
            MemoryRegion::Rom => self.rom_slice(page)[(offset - Self::rom_base(page)) as usize],
            MemoryRegion::Unmapped => 0,
        }
    }

    pub fn store_raw(&mut self, page: Page, offset: u16, value: u8) {
        match MemoryRegion::classify(page, offset) {
            MemoryRegion::Io | MemoryRegion::Ram | MemoryRegion::Xio => {
                self.lowmem[offset as usize] = value;
            }
            MemoryRegion::Flash => self.flash[(offset - FLASH_START as u16) as usize] = value,
            MemoryRegion::Rom => {
                let base = Self::rom_base(page);
                self.rom_slice_mut(page)[(offset - base) as usize] = value
            }
            MemoryRegion::Unmapped => {}
        }
    }

    /// Instruction fetch. Fatal if the offset does not classify as code.
    pub fn fetch(&mut self, page: Page, addr: u32, offset: u16) -> SimResult<u8> {
        let region = MemoryRegion::classify(page, offset);
        if !region.is_code() {
            log::error!(
                "FETCHING FROM {} REGION at 0x{:06x}",
                region.diagnostic_label(),
                addr
            );
            return Err(SimError::FetchFromNonCodeRegion(addr));
        }
        Ok(self.load_raw(page, offset))
    }

    /// Data read, routed through the peripheral bus first.
    pub fn load(&mut self, offset: u16) -> u8 {
        self.pending_accesses.push((offset, false));
        if let Some(value) = self.bus.read(offset) {
            return value;
        }
        self.load_raw(Page::Page0, offset)
    }

    /// Data write, routed through the peripheral bus first. Writes into a
    /// ROM region are permitted (firmware self-patches at startup) but
    /// logged.
    pub fn store(&mut self, page: Page, offset: u16, value: u8) {
        self.pending_accesses.push((offset, true));
        if self.bus.write(offset, value) {
            return;
        }
        if MemoryRegion::classify(page, offset) == MemoryRegion::Rom {
            log::warn!("write to ROM at 0x{:04x} (page {:?}): 0x{:02x}", offset, page, value);
        }
        self.store_raw(page, offset, value);
    }

    /// Drains the data accesses recorded by `load`/`store` since the last
    /// call, for the run loop to check against the data breakpoint table.
    pub fn take_pending_accesses(&mut self) -> Vec<(u16, bool)> {
        std::mem::take(&mut self.pending_accesses)
    }

    /// Bulk-load helper used by the loaders: writes `bytes` starting at
    /// `offset` on `page`, bypassing the peripheral bus (this is image
    /// loading, not instruction-level I/O).
    pub fn load_image(&mut self, page: Page, offset: u16, bytes: &[u8]) {
        let mut addr = offset;
        for &b in bytes {
            self.store_raw(page, addr, b);
            addr = addr.wrapping_add(1);
        }
    }

    // -----------------------------------------------------------------
    // Whole-buffer access for snapshot save/restore.
    // -----------------------------------------------------------------

    pub fn rom_bytes(&self, page: Page) -> &[u8] {
        self.rom_slice(page)
    }

    pub fn load_rom_bytes(&mut self, page: Page, bytes: &[u8]) {
        let slice = self.rom_slice_mut(page);
        let n = bytes.len().min(slice.len());
        slice[..n].copy_from_slice(&bytes[..n]);
    }

    pub fn lowmem_bytes(&self) -> &[u8] {
        &self.lowmem
    }

    pub fn load_lowmem_bytes(&mut self, bytes: &[u8]) {
        let n = bytes.len().min(self.lowmem.len());
        self.lowmem[..n].copy_from_slice(&bytes[..n]);
    }

    pub fn flash_bytes(&self) -> &[u8] {
        &self.flash
    }

    pub fn load_flash_bytes(&mut self, bytes: &[u8]) {
        let n = bytes.len().min(self.flash.len());
        self.flash[..n].copy_from_slice(&bytes[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_regions() {
        assert_eq!(MemoryRegion::classify(Page::Page0, 0x0010), MemoryRegion::Io);
        assert_eq!(MemoryRegion::classify(Page::Page0, 0x0100), MemoryRegion::Ram);
        assert_eq!(MemoryRegion::classify(Page::Page0, 0x3c10), MemoryRegion::Xio);
        assert_eq!(MemoryRegion::classify(Page::Page0, 0xc010), MemoryRegion::Flash);
        assert_eq!(MemoryRegion::classify(Page::Page0, 0x5000), MemoryRegion::Rom);
    }

    #[test]
    fn rom1_covers_its_own_window_above_rom0() {
        // Page 1's code window is 0x8000..=0xFFFF, not page 0's
        // 0x4000..=0xBFFF; 0xD000 is only code on page 1, and only after
        // flash (0xC000..=0xC7FF) is carved out of it.
        assert_eq!(MemoryRegion::classify(Page::Page1, 0xd000), MemoryRegion::Rom);
        assert_eq!(MemoryRegion::classify(Page::Page0, 0xd000), MemoryRegion::Unmapped);
        assert_eq!(MemoryRegion::classify(Page::Page1, 0xc010), MemoryRegion::Flash);
    }

    #[test]
    fn fetch_from_ram_is_fatal() {
        let mut mem = AddressSpace::new();
        let err = mem.fetch(Page::Page0, 0x0020, 0x0020).unwrap_err();
        assert!(matches!(err, SimError::FetchFromNonCodeRegion(0x0020)));
    }

    #[test]
    fn fetch_above_flash_succeeds_on_page1_only() {
        let mut mem = AddressSpace::new();
        mem.store_raw(Page::Page1, 0xff00, 0xab);
        assert_eq!(mem.fetch(Page::Page1, 0x1ff00, 0xff00).unwrap(), 0xab);
        assert!(mem.fetch(Page::Page0, 0xff00, 0xff00).is_err());
    }

    #[test]
    fn rom_bytes_window_matches_each_page_start() {
        let mut mem = AddressSpace::new();
        mem.store_raw(Page::Page1, ROM1_START as u16, 0x7a);
        assert_eq!(mem.rom_bytes(Page::Page1)[0], 0x7a);
    }

    #[test]
    fn lowmem_mirrors_across_pages() {
        let mut mem = AddressSpace::new();
        mem.store(Page::Page0, 0x0100, 0x42);
        assert_eq!(mem.load_raw(Page::Page1, 0x0100), 0x42);
    }

    #[test]
    fn rom_pages_are_independent() {
        let mut mem = AddressSpace::new();
        // 0x9000 is a legal code address on both pages (page 0's
        // 0x4000..=0xBFFF and page 1's 0x8000..=0xFFFF overlap there) but
        // is backed by distinct buffers.
        mem.store_raw(Page::Page0, 0x9000, 0x11);
        mem.store_raw(Page::Page1, 0x9000, 0x22);
        assert_eq!(mem.load_raw(Page::Page0, 0x9000), 0x11);
        assert_eq!(mem.load_raw(Page::Page1, 0x9000), 0x22);
    }

    #[test]
    fn data_access_is_recorded_for_the_breakpoint_engine() {
        let mut mem = AddressSpace::new();
        mem.store(Page::Page0, 0x0100, 0x01);
        let _ = mem.load(0x0200);
        assert_eq!(mem.take_pending_accesses(), vec![(0x0100, true), (0x0200, false)]);
        assert!(mem.take_pending_accesses().is_empty());
    }
}
