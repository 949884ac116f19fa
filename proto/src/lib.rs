// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wire-level protocols the probe speaks to its host: the GDB Remote
//! Serial Protocol, XMODEM-1K firmware upload, and the diagnostic
//! console's command language. Every module here is byte-at-a-time and
//! allocation-free, matching how the scheduler in `rv003dbg-probe`
//! feeds it one byte per tick.

#![no_std]

pub mod console;
pub mod crc16;
pub mod gdb;
pub mod hex;
pub mod memmap;
pub mod packet;
pub mod xmodem;
