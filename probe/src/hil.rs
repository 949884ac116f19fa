// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Hardware-independent-layer traits for the collaborators [`Probe`](crate::Probe)
//! drives but does not own the implementation of: the USB byte pipe,
//! the status LED, and the reset button. These mirror `rv003dbg_dm::Swio`'s
//! shape — a small trait the board crate implements once, in whatever
//! register-poking way its hardware needs, that the rest of the stack
//! never has to know about.

/// The USB-CDC byte pipe between host and probe. Non-blocking: both
/// sides return immediately, leaving the scheduler free to do at most
/// one read and one write per tick.
pub trait UsbByteIo {
    /// Pull the next received byte, if any is buffered.
    fn try_read(&mut self) -> Option<u8>;

    /// Queue one byte for transmission. Returns `false` if the
    /// transmit buffer is full and the byte was dropped.
    fn try_write(&mut self, byte: u8) -> bool;

    /// Whether the host currently has the CDC port open.
    fn connected(&mut self) -> bool;
}

/// The probe's single RGB status indicator. Each firmware outcome from
/// an XMODEM transfer lights a distinct colour so a user without a
/// terminal attached can still tell success from a specific failure.
pub trait StatusLed {
    fn off(&mut self);
    fn green(&mut self);
    fn cyan(&mut self);
    fn red(&mut self);
    fn blue(&mut self);
    fn magenta(&mut self);
}

/// The board's reset/user button, polled once per tick. A press held
/// across ticks is reported once on the leading edge.
pub trait Button {
    fn pressed(&mut self) -> bool;
}
