// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Word-level transport to the target's RISC-V Debug Module (DM).
//!
//! This crate owns exactly two things: the DM's register bit layouts
//! ([`regs`]) and the reset/feature-negotiation sequence that brings a
//! freshly-attached target's DM into a known state ([`DebugModule::reset`]).
//! Everything above a single register read or write — GPR/CSR access,
//! program-buffer loads, memory access — belongs to the `target` crate.

#![no_std]

pub mod regs;
pub mod time;

use regs::{addr, Abstractcs, Cpbr, Hartinfo};
use rv003dbg_error::{ErrorCode, Result};
use time::{Clock, Deadline};

/// The board's single-wire physical transport. A full-duplex,
/// word-at-a-time link to the target's DM register file, plus the raw
/// line-drive primitive the reset sequence needs before the DM
/// responds to anything. Implemented by the board; this crate only
/// ever calls it.
pub trait Swio {
    /// Read the 32-bit value of DM register `addr`.
    fn get(&mut self, addr: u8) -> u32;
    /// Write `value` to DM register `addr`.
    fn put(&mut self, addr: u8, value: u32);
    /// Drive the single-wire line low for the target's reset pulse
    /// width (~8 us), then release it. Must run with interrupts
    /// disabled for the duration; the DM does not respond to `get`/`put`
    /// until this returns.
    fn line_reset(&mut self);
}

/// Capability constants this probe is built against. A target whose
/// `CPBR`/`HARTINFO` disagree is not the 16 KB/64-byte-page chip this
/// stack was written for, and is rejected rather than driven blind.
mod expected {
    pub const CPBR: u32 = (1 << 16) | (1 << 10) | 3; // VERSION=1, OUTSTA=1, TDIV=3
    pub const HARTINFO: u32 = (2 << 20) | (1 << 16) | (2 << 12) | 0xF4;
}

/// The DM transport: raw register access plus the reset/negotiation
/// handshake. Holds no target state of its own (no caching) — that
/// lives one layer up, in `target::TargetContext`.
pub struct DebugModule<S: Swio> {
    swio: S,
}

impl<S: Swio> DebugModule<S> {
    pub fn new(swio: S) -> Self {
        DebugModule { swio }
    }

    pub fn swio_mut(&mut self) -> &mut S {
        &mut self.swio
    }

    pub fn get(&mut self, addr: u8) -> u32 {
        self.swio.get(addr)
    }

    pub fn put(&mut self, addr: u8, value: u32) {
        self.swio.put(addr, value);
    }

    /// Cycle the transport into a known state and verify the target
    /// matches this probe's expected chip family.
    ///
    /// Sequence: hold the line low ~8 us with interrupts disabled,
    /// release, unlock the chip's two shadow-configuration registers,
    /// zero `CONTROL`, then re-assert `DMACTIVE`. Finally read `CPBR`
    /// and `HARTINFO` back and reject anything that doesn't match the
    /// constants this probe was built for.
    pub fn reset(&mut self) -> Result<()> {
        self.swio.line_reset();

        let unlock = regs::CFG_UNLOCK_KEY | (1 << 10); // KEY | OUTEN
        self.put(addr::SHDWCFGR, unlock);
        self.put(addr::CFGR, unlock);

        self.put(addr::CONTROL, 0);
        self.put(addr::CONTROL, 1); // DMACTIVE

        let cpbr = self.get(addr::CPBR);
        if cpbr != expected::CPBR {
            return Err(ErrorCode::UnsupportedTarget);
        }

        let hartinfo = self.get(addr::HARTINFO);
        if hartinfo != expected::HARTINFO {
            return Err(ErrorCode::UnsupportedTarget);
        }

        Ok(())
    }

    /// Read `CPBR` decoded into its bitfields, for diagnostics.
    pub fn cpbr(&mut self) -> tock_registers::LocalRegisterCopy<u32, Cpbr::Register> {
        regs::decode(self.get(addr::CPBR))
    }

    /// Read `HARTINFO` decoded into its bitfields, for diagnostics.
    pub fn hartinfo(&mut self) -> tock_registers::LocalRegisterCopy<u32, Hartinfo::Register> {
        regs::decode(self.get(addr::HARTINFO))
    }

    /// Read `ABSTRACTCS` decoded into its bitfields.
    pub fn abstractcs(&mut self) -> tock_registers::LocalRegisterCopy<u32, Abstractcs::Register> {
        regs::decode(self.get(addr::ABSTRACTCS))
    }

    /// Clear a non-zero `ABSTRACTCS.CMDER` by writing back `OTH_ERR`
    /// (all three bits set), as required after every command error.
    pub fn clear_cmder(&mut self) {
        let mut v = tock_registers::LocalRegisterCopy::<u32, Abstractcs::Register>::new(0);
        v.modify(Abstractcs::CMDER::Other);
        self.put(addr::ABSTRACTCS, v.get());
    }

    /// Wait up to `timeout_us` for `ABSTRACTCS.BUSY` to clear, then
    /// report the command's outcome. Clears `CMDER` on error, per the
    /// paranoia rule every abstract-command caller must honor.
    pub fn wait_command(&mut self, clock: &dyn Clock, timeout_us: u32) -> Result<()> {
        let deadline = Deadline::after(clock, timeout_us);
        loop {
            let cs = self.abstractcs();
            if !cs.is_set(Abstractcs::BUSY) {
                if cs.read(Abstractcs::CMDER) != 0 {
                    self.clear_cmder();
                    return Err(ErrorCode::CommandError);
                }
                return Ok(());
            }
            if deadline.expired(clock) {
                return Err(ErrorCode::TransportTimeout);
            }
        }
    }
}
