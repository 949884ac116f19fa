// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Memory map and bit layout of the target's flash controller (FPEC).
//!
//! The controller is a normal memory-mapped peripheral on the target,
//! unlike the Debug Module's 7-bit register file — every address here
//! is read and written through [`rv003dbg_target::TargetContext`]'s
//! `get_u32`/`set_u32`, the same as any other word of target memory.

use tock_registers::register_bitfields;

/// Base of the 16 KiB flash region.
pub const FLASH_BASE: u32 = 0x0800_0000;
/// Total flash size in bytes.
pub const FLASH_SIZE: u32 = 0x4000;
/// Bytes per programmable page (one `BUFLOAD`/`STRT` cycle covers one
/// page).
pub const PAGE_SIZE: u32 = 64;
/// Words per page.
pub const PAGE_WORDS: usize = (PAGE_SIZE / 4) as usize;
/// Bytes per erase sector.
pub const SECTOR_SIZE: u32 = 1024;
/// Total number of pages in the flash region.
pub const PAGE_COUNT: usize = (FLASH_SIZE / PAGE_SIZE) as usize;

/// Base address of the FPEC register block.
pub const PERIPH_BASE: u32 = 0x4002_2000;

pub mod addr {
    use super::PERIPH_BASE;
    pub const ACTLR: u32 = PERIPH_BASE;
    pub const KEYR: u32 = PERIPH_BASE + 0x04;
    pub const OBKEYR: u32 = PERIPH_BASE + 0x08;
    pub const STATR: u32 = PERIPH_BASE + 0x0C;
    pub const CTLR: u32 = PERIPH_BASE + 0x10;
    pub const ADDR: u32 = PERIPH_BASE + 0x14;
    pub const OBR: u32 = PERIPH_BASE + 0x18;
    pub const WPR: u32 = PERIPH_BASE + 0x1C;
    pub const MODEKEYR: u32 = PERIPH_BASE + 0x20;
    pub const BOOT_KEYR: u32 = PERIPH_BASE + 0x24;
}

/// First and second words of the two-key unlock sequence, written to
/// either `KEYR` (normal program/erase) or `MODEKEYR` (fast page
/// program) in order.
pub const UNLOCK_KEY1: u32 = 0x4567_0123;
pub const UNLOCK_KEY2: u32 = 0xCDEF_89AB;

register_bitfields![u32,
    pub Ctlr [
        /// Fast page program mode: combine with `BUFLOAD`/`STRT` to
        /// drive the per-word streaming loop.
        FTPG OFFSET(16) NUMBITS(1) [],
        /// Commit the word already latched by `FTPG` into the page
        /// buffer at the current `ADDR`.
        BUFLOAD OFFSET(18) NUMBITS(1) [],
        /// Clear the page buffer after a page has been committed.
        BUFRST OFFSET(19) NUMBITS(1) [],
        /// Standard (non-fast) page erase.
        PER OFFSET(1) NUMBITS(1) [],
        /// Mass (whole-chip) erase.
        MER OFFSET(2) NUMBITS(1) [],
        /// Fast page erase, paired with `STRT`.
        FTER OFFSET(17) NUMBITS(1) [],
        /// Start the operation selected by `PG`/`PER`/`MER`/`FTER`.
        STRT OFFSET(6) NUMBITS(1) [],
        /// Standard word program.
        PG OFFSET(0) NUMBITS(1) [],
        /// Normal-operation lock, cleared by the `KEYR` unlock sequence.
        LOCK OFFSET(7) NUMBITS(1) [],
        /// Fast-programming lock, cleared by the `MODEKEYR` unlock
        /// sequence.
        FLOCK OFFSET(15) NUMBITS(1) [],
        /// Option-byte write enable, cleared by the `OBKEYR` unlock
        /// sequence.
        OBWRE OFFSET(9) NUMBITS(1) []
    ],
    pub Statr [
        /// Set while an erase or program operation is in flight. Placed
        /// at bit 31 so the flash-write resident program can test it
        /// with a plain `bltz` rather than a mask-then-branch pair.
        BUSY OFFSET(31) NUMBITS(1) [],
        WRPRTERR OFFSET(4) NUMBITS(1) [],
        EOP OFFSET(5) NUMBITS(1) [],
        /// Bootloader-area write lock, cleared by the `BOOT_KEYR`
        /// unlock sequence. Unlike the other status bits this one is
        /// software-set as well as hardware-read, mirroring how the
        /// vendor bootloader itself re-locks on the next reset.
        BOOT_LOCK OFFSET(1) NUMBITS(1) []
    ]
];

/// Target memory regions outside the programmable flash array, fixed
/// by the vendor bootloader's own layout.
pub const BOOT_ADDR: u32 = 0x1FFF_F000;
pub const BOOT_SIZE: u32 = 0x780;
pub const VENDOR_ADDR: u32 = 0x1FFF_F7C0;
pub const VENDOR_SIZE: u32 = 0x40;
pub const OPTB_ADDR: u32 = 0x1FFF_F800;
pub const OPTB_SIZE: u32 = 0x40;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_geometry_covers_the_whole_chip() {
        assert_eq!(PAGE_SIZE as usize * PAGE_COUNT, FLASH_SIZE as usize);
    }

    #[test]
    fn register_block_addresses_are_word_spaced() {
        assert_eq!(addr::KEYR - addr::ACTLR, 4);
        assert_eq!(addr::CTLR - addr::STATR, 4);
        assert_eq!(addr::MODEKEYR - addr::WPR, 4);
    }
}
