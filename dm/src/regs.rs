// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bit layouts for the Debug Module's 7-bit-addressed register file.
//!
//! The DM is not memory-mapped on this transport; every register is a
//! 32-bit value fetched or deposited one word at a time through
//! [`crate::Swio::get`]/[`crate::Swio::put`]. We still decode each
//! value through a `LocalRegisterCopy` rather than hand-rolled shifts
//! and masks, exactly as if it were an MMIO peripheral: the fields are
//! the same either way, only the access path differs.

use tock_registers::{register_bitfields, LocalRegisterCopy};

/// 7-bit DM register addresses.
pub mod addr {
    pub const DATA0: u8 = 0x04;
    pub const DATA1: u8 = 0x05;
    pub const CONTROL: u8 = 0x10;
    pub const STATUS: u8 = 0x11;
    pub const HARTINFO: u8 = 0x12;
    pub const ABSTRACTCS: u8 = 0x16;
    pub const COMMAND: u8 = 0x17;
    pub const ABSTRACTAUTO: u8 = 0x18;
    pub const PROGBUF0: u8 = 0x20;
    pub const HALTSUM0: u8 = 0x40;
    pub const CPBR: u8 = 0x7C;
    pub const CFGR: u8 = 0x7D;
    pub const SHDWCFGR: u8 = 0x7E;
    pub const CHIPID: u8 = 0x7F;

    /// Address of program-buffer word `i`, `i < 8`.
    pub fn progbuf(i: usize) -> u8 {
        PROGBUF0 + i as u8
    }
}

register_bitfields![u32,
    pub Control [
        HALTREQ OFFSET(31) NUMBITS(1) [],
        RESUMEREQ OFFSET(30) NUMBITS(1) [],
        HARTRESET OFFSET(29) NUMBITS(1) [],
        ACKHAVERESET OFFSET(28) NUMBITS(1) [],
        ACKUNAVAIL OFFSET(27) NUMBITS(1) [],
        HASEL OFFSET(26) NUMBITS(1) [],
        HARTSELHI OFFSET(16) NUMBITS(10) [],
        HARTSELLO OFFSET(6) NUMBITS(10) [],
        SETKEEPALIVE OFFSET(5) NUMBITS(1) [],
        CLRKEEPALIVE OFFSET(4) NUMBITS(1) [],
        SETRESETHALTREQ OFFSET(3) NUMBITS(1) [],
        CLRRESETHALTREQ OFFSET(2) NUMBITS(1) [],
        NDMRESET OFFSET(1) NUMBITS(1) [],
        DMACTIVE OFFSET(0) NUMBITS(1) []
    ],
    pub Status [
        ALLHAVERESET OFFSET(19) NUMBITS(1) [],
        ANYHAVERESET OFFSET(18) NUMBITS(1) [],
        ALLRESUMEACK OFFSET(17) NUMBITS(1) [],
        ANYRESUMEACK OFFSET(16) NUMBITS(1) [],
        ALLAVAIL OFFSET(13) NUMBITS(1) [],
        ANYAVAIL OFFSET(12) NUMBITS(1) [],
        ALLRUNNING OFFSET(11) NUMBITS(1) [],
        ANYRUNNING OFFSET(10) NUMBITS(1) [],
        ALLHALTED OFFSET(9) NUMBITS(1) [],
        ANYHALTED OFFSET(8) NUMBITS(1) [],
        AUTHENTICATED OFFSET(7) NUMBITS(1) [],
        VERSION OFFSET(0) NUMBITS(4) []
    ],
    pub Hartinfo [
        NSCRATCH OFFSET(20) NUMBITS(4) [],
        DATAACCESS OFFSET(16) NUMBITS(1) [],
        DATASIZE OFFSET(12) NUMBITS(4) [],
        DATAADDR OFFSET(0) NUMBITS(12) []
    ],
    pub Abstractcs [
        PROGBUFSIZE OFFSET(24) NUMBITS(5) [],
        BUSY OFFSET(12) NUMBITS(1) [],
        CMDER OFFSET(8) NUMBITS(3) [
            Success = 0,
            Busy = 1,
            NotSupported = 2,
            Exception = 3,
            HaltResume = 4,
            Bus = 5,
            Other = 7
        ],
        DATACOUNT OFFSET(0) NUMBITS(4) []
    ],
    pub Command [
        CMDTYPE OFFSET(24) NUMBITS(8) [],
        AARSIZE OFFSET(20) NUMBITS(3) [
            Bits32 = 2
        ],
        AARPOSTINC OFFSET(19) NUMBITS(1) [],
        POSTEXEC OFFSET(18) NUMBITS(1) [],
        TRANSFER OFFSET(17) NUMBITS(1) [],
        WRITE OFFSET(16) NUMBITS(1) [],
        REGNO OFFSET(0) NUMBITS(16) []
    ],
    pub Abstractauto [
        AUTOEXECPROG OFFSET(16) NUMBITS(8) [],
        AUTOEXECDATA OFFSET(0) NUMBITS(12) []
    ],
    pub Cpbr [
        VERSION OFFSET(16) NUMBITS(16) [],
        IOMODE OFFSET(11) NUMBITS(2) [],
        OUTSTA OFFSET(10) NUMBITS(1) [],
        CMDEXTENSTA OFFSET(9) NUMBITS(1) [],
        CHECKSTA OFFSET(8) NUMBITS(1) [],
        SOPN OFFSET(4) NUMBITS(2) [],
        TDIV OFFSET(0) NUMBITS(2) []
    ],
    pub Cfgr [
        KEY OFFSET(16) NUMBITS(16) [],
        IOMODECFG OFFSET(11) NUMBITS(2) [],
        OUTEN OFFSET(10) NUMBITS(1) [],
        CMDEXTEN OFFSET(9) NUMBITS(1) [],
        CHECKEN OFFSET(8) NUMBITS(1) [],
        SOPNCFG OFFSET(4) NUMBITS(2) [],
        TDIVCFG OFFSET(0) NUMBITS(2) []
    ]
];

/// Register class used to reset the shadow/live chip configuration
/// registers; `Cfgr` and `Shdwcfgr` share a layout.
pub type Shdwcfgr = Cfgr::Register;

/// Key written to `CFGR`/`SHDWCFGR` to unlock the chip's shadow
/// configuration for writes, OR'd with the feature bits being set.
pub const CFG_UNLOCK_KEY: u32 = 0x5AA5 << 16;

/// `COMMAND.CMDTYPE` value for an access-register abstract command.
pub const CMDTYPE_ACCESS_REGISTER: u32 = 0;

/// `COMMAND.REGNO` base for GPR `x0..x31`.
pub const REGNO_GPR_BASE: u32 = 0x1000;

/// `COMMAND.REGNO` for the Debug Program Counter (DPC), a CSR.
pub const REGNO_DPC: u32 = 0x7b1;

/// `COMMAND.REGNO` base for CSRs; CSR number `n` lives at
/// `REGNO_CSR_BASE + n`.
pub const REGNO_CSR_BASE: u32 = 0x0000;

/// Decode a raw DM register value into its bitfield view.
pub fn decode<R: tock_registers::RegisterLongName>(raw: u32) -> LocalRegisterCopy<u32, R> {
    LocalRegisterCopy::new(raw)
}
