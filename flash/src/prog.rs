// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The resident program that turns a stream of `DATA0` writes into a
//! run of flash-programmed words.
//!
//! Register use is fixed by the caller before the program is loaded:
//! `a0` is the destination address (incremented after every word),
//! `a1` the address of `CTLR`, `a2` the address of `STATR`, and `a5`
//! the `FTPG|BUFLOAD` constant to re-arm the controller each pass.
//! Only `a0` and `a4` are written by the program itself.

use rv003dbg_target::isa::{addi, bltz, lw, reg, sw, EBREAK};

const DATA0: i32 = 0xF4;

/// Load the next word from `DATA0`, re-arm fast-page-program mode,
/// write it to the destination, spin on `STATR` until the controller
/// clears `BUSY`, then advance the destination by one word.
pub const WRITE_WORD: [u32; 7] = [
    lw(reg::A4, DATA0, reg::X0), // a4 = next word
    sw(reg::A5, 0, reg::A1),     // CTLR = FTPG|BUFLOAD
    sw(reg::A4, 0, reg::A0),     // flash[a0] = a4 (loads the page buffer)
    lw(reg::A4, 0, reg::A2),     // a4 = STATR
    bltz(reg::A4, -4),           // while STATR.BUSY (bit 31): re-read
    addi(reg::A0, reg::A0, 4),   // a0 += 4
    EBREAK,
];

/// `a0` (destination pointer) and `a4` (scratch) are the only GPRs
/// this program writes.
pub const WRITE_WORD_CLOBBER: u32 = (1 << reg::A0) | (1 << reg::A4);
