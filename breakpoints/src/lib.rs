// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Software breakpoints implemented by patching target flash.
//!
//! [`BreakpointEngine`] keeps a shadow of every flash page that has
//! ever held a breakpoint — one snapshot of the original bytes
//! (`flash_clean`) and one with the requested `ebreak` overlays
//! (`flash_dirty`) — and defers the actual erase/program cycle to
//! [`BreakpointEngine::patch_flash`]/[`BreakpointEngine::unpatch_flash`],
//! called around resume and halt respectively. This is the one layer
//! in the stack holding flash-sized buffers, since it runs on the
//! probe's own RAM budget rather than the target's.

#![no_std]

use rv003dbg_dm::time::Clock;
use rv003dbg_dm::Swio;
use rv003dbg_error::{ErrorCode, Result};
use rv003dbg_flash::regs::{FLASH_BASE, FLASH_SIZE, PAGE_COUNT, PAGE_SIZE, PAGE_WORDS};
use rv003dbg_target::{TargetContext, REG_DPC};

/// Maximum number of simultaneously active breakpoints.
pub const MAX_BREAKPOINTS: usize = 32;

/// 16-bit compressed `c.ebreak`.
pub const C_EBREAK: u16 = 0x9002;
/// 32-bit `ebreak`.
pub const EBREAK: u32 = 0x0010_0073;

const FLASH_BYTES: usize = FLASH_SIZE as usize;

/// Outcome of [`BreakpointEngine::resume`]: whether the hart actually
/// started running, or the resume-into-breakpoint optimisation fired
/// and left it halted on a breakpoint it was about to re-execute.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResumeOutcome {
    Resumed,
    StillStopped,
}

/// The breakpoint registry plus the flash-patching state it drives.
pub struct BreakpointEngine {
    slots: [Option<u32>; MAX_BREAKPOINTS],
    sizes: [u8; MAX_BREAKPOINTS],
    count: u8,
    break_map: [u8; PAGE_COUNT],
    flash_map: [u8; PAGE_COUNT],
    dirty_map: [bool; PAGE_COUNT],
    flash_clean: [u8; FLASH_BYTES],
    flash_dirty: [u8; FLASH_BYTES],
    halted: bool,
}

impl BreakpointEngine {
    pub const fn new() -> Self {
        BreakpointEngine {
            slots: [None; MAX_BREAKPOINTS],
            sizes: [0; MAX_BREAKPOINTS],
            count: 0,
            break_map: [0; PAGE_COUNT],
            flash_map: [0; PAGE_COUNT],
            dirty_map: [false; PAGE_COUNT],
            flash_clean: [0; FLASH_BYTES],
            flash_dirty: [0; FLASH_BYTES],
            halted: false,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Number of breakpoints currently installed.
    pub fn count(&self) -> u8 {
        self.count
    }

    fn page_of(addr: u32) -> usize {
        ((addr - FLASH_BASE) / PAGE_SIZE) as usize
    }

    fn validate(addr: u32, size: u8) -> Result<()> {
        if size != 2 && size != 4 {
            return Err(ErrorCode::InvalidRequest);
        }
        if addr % 2 != 0 {
            return Err(ErrorCode::InvalidRequest);
        }
        if addr < FLASH_BASE || addr + size as u32 > FLASH_BASE + FLASH_SIZE {
            return Err(ErrorCode::InvalidRequest);
        }
        Ok(())
    }

    /// Insert a breakpoint. Requires the engine to already be halted.
    pub fn set<S: Swio>(&mut self, ctx: &mut TargetContext<S>, clock: &dyn Clock, addr: u32, size: u8) -> Result<()> {
        if !self.halted {
            return Err(ErrorCode::InvalidRequest);
        }
        Self::validate(addr, size)?;
        if self.slots.iter().flatten().any(|&a| a == addr) {
            return Err(ErrorCode::InvalidRequest);
        }
        let slot = self.slots.iter().position(Option::is_none).ok_or(ErrorCode::ResourceExhausted)?;

        let page = Self::page_of(addr);
        if self.break_map[page] == 0 {
            self.snapshot_page(ctx, clock, page)?;
        }

        self.slots[slot] = Some(addr);
        self.sizes[slot] = size;
        self.count += 1;
        self.break_map[page] += 1;
        self.dirty_map[page] = true;

        let off = (addr - FLASH_BASE) as usize;
        if size == 2 {
            self.flash_dirty[off..off + 2].copy_from_slice(&C_EBREAK.to_le_bytes());
        } else {
            self.flash_dirty[off..off + 4].copy_from_slice(&EBREAK.to_le_bytes());
        }
        Ok(())
    }

    /// Remove a breakpoint previously installed by [`Self::set`].
    pub fn clear(&mut self, addr: u32) -> Result<()> {
        if !self.halted {
            return Err(ErrorCode::InvalidRequest);
        }
        let slot = self.slots.iter().position(|s| *s == Some(addr)).ok_or(ErrorCode::InvalidRequest)?;
        let size = self.sizes[slot] as usize;

        self.slots[slot] = None;
        self.sizes[slot] = 0;
        self.count -= 1;

        let page = Self::page_of(addr);
        self.break_map[page] -= 1;
        self.dirty_map[page] = true;

        let off = (addr - FLASH_BASE) as usize;
        self.flash_dirty[off..off + size].copy_from_slice(&self.flash_clean[off..off + size]);
        Ok(())
    }

    /// Remove every installed breakpoint. Used by the GDB server's
    /// detach handler, which must leave the target clean rather than
    /// aborting with breakpoints still patched into flash.
    pub fn clear_all(&mut self) -> Result<()> {
        if !self.halted {
            return Err(ErrorCode::InvalidRequest);
        }
        for slot in 0..MAX_BREAKPOINTS {
            if let Some(addr) = self.slots[slot] {
                self.clear(addr)?;
            }
        }
        Ok(())
    }

    fn snapshot_page<S: Swio>(&mut self, ctx: &mut TargetContext<S>, clock: &dyn Clock, page: usize) -> Result<()> {
        let page_base = FLASH_BASE + (page as u32) * PAGE_SIZE;
        let mut words = [0u32; PAGE_WORDS];
        ctx.get_block_aligned(clock, page_base, &mut words)?;

        let byte_base = page * PAGE_SIZE as usize;
        let end = byte_base + PAGE_SIZE as usize;
        for (chunk, word) in self.flash_clean[byte_base..end].chunks_exact_mut(4).zip(words.iter()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        self.flash_dirty[byte_base..end].copy_from_slice(&self.flash_clean[byte_base..end]);
        Ok(())
    }

    /// Halt the hart and restore all patched pages to their original
    /// contents. Idempotent.
    pub fn halt<S: Swio>(&mut self, ctx: &mut TargetContext<S>, clock: &dyn Clock) -> Result<()> {
        if self.halted {
            return Ok(());
        }
        ctx.halt(clock)?;
        self.halted = true;
        self.unpatch_flash(ctx, clock)
    }

    /// Single-step past the current instruction, apply the
    /// resume-into-breakpoint optimisation, then patch flash and
    /// resume. Idempotent when already running.
    pub fn resume<S: Swio>(&mut self, ctx: &mut TargetContext<S>, clock: &dyn Clock) -> Result<ResumeOutcome> {
        if !self.halted {
            return Ok(ResumeOutcome::Resumed);
        }
        ctx.step(clock)?;
        let dpc = ctx.read_reg(clock, REG_DPC)?;
        if self.slots.iter().flatten().any(|&a| a == dpc) {
            return Ok(ResumeOutcome::StillStopped);
        }
        self.patch_flash(ctx, clock)?;
        ctx.resume(clock)?;
        self.halted = false;
        Ok(ResumeOutcome::Resumed)
    }

    /// Write every dirty page's overlay image into target flash.
    pub fn patch_flash<S: Swio>(&mut self, ctx: &mut TargetContext<S>, clock: &dyn Clock) -> Result<()> {
        if !self.halted {
            return Err(ErrorCode::InvalidRequest);
        }
        for page in 0..PAGE_COUNT {
            if !self.dirty_map[page] {
                continue;
            }
            self.install_page(ctx, clock, page, false)?;
            self.flash_map[page] = self.break_map[page];
            self.dirty_map[page] = false;
        }
        Ok(())
    }

    /// Restore every previously-patched page to its original contents.
    pub fn unpatch_flash<S: Swio>(&mut self, ctx: &mut TargetContext<S>, clock: &dyn Clock) -> Result<()> {
        if !self.halted {
            return Err(ErrorCode::InvalidRequest);
        }
        for page in 0..PAGE_COUNT {
            if self.flash_map[page] == 0 {
                continue;
            }
            self.install_page(ctx, clock, page, true)?;
            self.flash_map[page] = 0;
            self.dirty_map[page] = true;
        }
        Ok(())
    }

    fn install_page<S: Swio>(&mut self, ctx: &mut TargetContext<S>, clock: &dyn Clock, page: usize, clean: bool) -> Result<()> {
        let page_base = FLASH_BASE + (page as u32) * PAGE_SIZE;
        let byte_base = page * PAGE_SIZE as usize;
        let src = if clean {
            &self.flash_clean[byte_base..byte_base + PAGE_SIZE as usize]
        } else {
            &self.flash_dirty[byte_base..byte_base + PAGE_SIZE as usize]
        };
        let mut words = [0u32; PAGE_WORDS];
        for (word, chunk) in words.iter_mut().zip(src.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        rv003dbg_flash::erase(ctx, clock, page_base, rv003dbg_flash::EraseMode::Page)?;
        rv003dbg_flash::write(ctx, clock, page_base, &words)
    }
}

impl Default for BreakpointEngine {
    fn default() -> Self {
        Self::new()
    }
}
