// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared error taxonomy for the debug probe stack.
//!
//! Every layer from the single-wire transport up through the GDB server
//! and XMODEM uploader reports failures through this one enum so that
//! callers never have to match on layer-specific error types.

#![no_std]

/// Failure reported by any layer of the probe.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    /// A DM status bit did not settle within its deadline. Fails the
    /// current operation only; the engine remains usable.
    TransportTimeout,
    /// An abstract command reported `CMDER != SUCCESS`. The caller's
    /// operation failed and `CMDER` has been cleared.
    CommandError,
    /// A fixed-size table or buffer is full (breakpoint table, packet
    /// buffer).
    ResourceExhausted,
    /// A misaligned address, unknown command, or malformed packet.
    InvalidRequest,
    /// RSP checksum mismatch on a received packet.
    ParityFailed,
    /// Flash readback did not match the data that was written.
    VerifyFailed,
    /// A target GPR was clobbered by a program and no clean backup of
    /// it exists to restore on resume. The operation proceeds without
    /// the save; this is a best-effort degradation, not a hard failure.
    CorruptShadow,
    /// The target did not report the capability and hart-info constants
    /// this probe was built for.
    UnsupportedTarget,
}

/// Convenience alias used throughout the stack.
pub type Result<T> = core::result::Result<T, ErrorCode>;
