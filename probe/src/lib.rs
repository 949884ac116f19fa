// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The outer scheduler.
//!
//! Everything below `rv003dbg_proto` is pure state machines fed one
//! byte at a time; this crate is what feeds them. [`Probe`] is the one
//! value that owns every subsystem — the target context's debug-module
//! handle, the breakpoint engine, the GDB server, the XMODEM receiver —
//! and [`Probe::tick`] is the only place that threads them together.
//! There is no global state anywhere in this stack: a board crate
//! builds one `Probe` and calls `tick` in a loop for as long as it
//! runs.

#![no_std]

pub mod hil;

use hil::{Button, StatusLed, UsbByteIo};
use rv003dbg_breakpoints::BreakpointEngine;
use rv003dbg_dm::time::Clock;
use rv003dbg_dm::Swio;
use rv003dbg_proto::console;
use rv003dbg_proto::gdb::{GdbServer, RecvEvent, RunState};
use rv003dbg_proto::xmodem::{Event as XmodemEvent, Outcome as XmodemOutcome, XmodemReceiver};
use rv003dbg_target::TargetContext;

/// Sent by an XMODEM sender's `sx -1k` invocation to kick off a
/// transfer; seeing it while idle is the only thing that switches the
/// scheduler out of console/GDB mode.
const SYN: u8 = 0x16;
const CTRL_C: u8 = 0x03;

const CONSOLE_LINE_CAP: usize = 128;

#[derive(Copy, Clone, PartialEq, Eq)]
enum Mode {
    Console,
    Xmodem,
}

/// A line the user is typing directly at the console, as opposed to a
/// `$`-framed GDB packet arriving on the same byte stream. Only armed
/// while the GDB framer is idle, so the two readers never fight over
/// the same bytes.
struct ConsoleLine {
    buf: [u8; CONSOLE_LINE_CAP],
    len: usize,
}

impl ConsoleLine {
    const fn new() -> Self {
        ConsoleLine { buf: [0; CONSOLE_LINE_CAP], len: 0 }
    }

    fn clear(&mut self) {
        self.len = 0;
    }

    fn push(&mut self, byte: u8) {
        if self.len < self.buf.len() {
            self.buf[self.len] = byte;
            self.len += 1;
        }
    }

    fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// Everything the probe is, threaded explicitly through one `tick`
/// call per host byte rather than hung off module statics.
pub struct Probe {
    mode: Mode,
    gdb: GdbServer,
    xmodem: XmodemReceiver,
    engine: BreakpointEngine,
    line: ConsoleLine,
    connected: bool,
}

impl Probe {
    pub const fn new() -> Self {
        Probe {
            mode: Mode::Console,
            gdb: GdbServer::new(),
            xmodem: XmodemReceiver::new(),
            engine: BreakpointEngine::new(),
            line: ConsoleLine::new(),
            connected: false,
        }
    }

    /// Drive one iteration of the cooperative scheduler: at most one
    /// input byte read, at most one DM operation, at most one output
    /// byte written. XMODEM and the GDB/console path never both run in
    /// the same tick — whichever `mode` is active owns the byte.
    pub fn tick<S, U, L, B>(&mut self, ctx: &mut TargetContext<S>, clock: &dyn Clock, usb: &mut U, led: &mut L, button: &mut B)
    where
        S: Swio,
        U: UsbByteIo,
        L: StatusLed,
        B: Button,
    {
        let _ = button.pressed();

        let now_connected = usb.connected();
        if self.connected && !now_connected {
            self.on_disconnect(ctx, clock);
        }
        self.connected = now_connected;
        if !self.connected {
            return;
        }

        match usb.try_read() {
            Some(byte) => self.handle_byte(byte, ctx, clock, usb, led),
            None => self.handle_idle(ctx, clock, usb, led),
        }
    }

    fn on_disconnect<S: Swio>(&mut self, ctx: &mut TargetContext<S>, clock: &dyn Clock) {
        self.gdb.run = RunState::Disconnected;
        self.xmodem.abort();
        self.mode = Mode::Console;
        self.line.clear();
        let _ = self.engine.clear_all();
        let _ = self.engine.resume(ctx, clock);
    }

    fn handle_byte<S, U, L>(&mut self, byte: u8, ctx: &mut TargetContext<S>, clock: &dyn Clock, usb: &mut U, led: &mut L)
    where
        S: Swio,
        U: UsbByteIo,
        L: StatusLed,
    {
        if self.mode == Mode::Console && byte == SYN && self.gdb.is_idle() {
            self.mode = Mode::Xmodem;
            self.line.clear();
            self.xmodem.start(clock);
            return;
        }

        match self.mode {
            Mode::Xmodem => self.feed_xmodem(byte, ctx, clock, usb, led),
            Mode::Console => self.feed_console_and_gdb(byte, ctx, clock, usb),
        }
    }

    fn feed_xmodem<S, U, L>(&mut self, byte: u8, ctx: &mut TargetContext<S>, clock: &dyn Clock, usb: &mut U, led: &mut L)
    where
        S: Swio,
        U: UsbByteIo,
        L: StatusLed,
    {
        let event = self.xmodem.feed_byte(byte, ctx, clock);
        self.apply_xmodem_event(event, usb, led);
    }

    fn apply_xmodem_event<U: UsbByteIo, L: StatusLed>(&mut self, event: XmodemEvent, usb: &mut U, led: &mut L) {
        match event {
            XmodemEvent::None => {}
            XmodemEvent::Reply(b) => {
                let _ = usb.try_write(b);
            }
            XmodemEvent::Finished(reply, outcome) => {
                if let Some(b) = reply {
                    let _ = usb.try_write(b);
                }
                apply_outcome_led(outcome, led);
                self.mode = Mode::Console;
            }
        }
    }

    /// GDB packets (`$...#cc`) and raw console lines share this one
    /// byte stream. The framer tells them apart: a byte that isn't
    /// Ctrl-C and doesn't start a packet while the framer is idle
    /// belongs to whatever console line is being typed.
    fn feed_console_and_gdb<S, U>(&mut self, byte: u8, ctx: &mut TargetContext<S>, clock: &dyn Clock, usb: &mut U)
    where
        S: Swio,
        U: UsbByteIo,
    {
        if byte == CTRL_C {
            if self.gdb.run == RunState::Running {
                self.gdb.handle_ctrl_c(ctx, clock, &mut self.engine);
                self.drain_gdb(usb);
            }
            return;
        }

        let was_idle = self.gdb.is_idle();
        match self.gdb.feed_byte(byte) {
            RecvEvent::None => {
                if was_idle && byte != b'$' {
                    self.feed_console_byte(byte, ctx, clock, usb);
                }
            }
            RecvEvent::CtrlC => {}
            RecvEvent::PacketOk => {
                self.gdb.ack();
                self.drain_gdb(usb);
                self.gdb.dispatch(ctx, clock, &mut self.engine);
                self.drain_gdb(usb);
            }
            RecvEvent::PacketBad => {
                self.gdb.nak();
                self.drain_gdb(usb);
            }
        }
    }

    fn feed_console_byte<S, U>(&mut self, byte: u8, ctx: &mut TargetContext<S>, clock: &dyn Clock, usb: &mut U)
    where
        S: Swio,
        U: UsbByteIo,
    {
        if byte == b'\r' || byte == b'\n' {
            if self.line.len > 0 {
                let mut out = [0u8; 256];
                let n = console::dispatch_monitor(self.line.as_slice(), ctx, clock, &mut self.engine, &mut out);
                for &b in &out[..n] {
                    let _ = usb.try_write(b);
                }
                let _ = usb.try_write(b'\r');
                let _ = usb.try_write(b'\n');
            }
            self.line.clear();
        } else {
            self.line.push(byte);
        }
    }

    fn drain_gdb<U: UsbByteIo>(&mut self, usb: &mut U) {
        for &b in self.gdb.outgoing() {
            let _ = usb.try_write(b);
        }
        self.gdb.clear_outgoing();
    }

    fn handle_idle<S, U, L>(&mut self, ctx: &mut TargetContext<S>, clock: &dyn Clock, usb: &mut U, led: &mut L)
    where
        S: Swio,
        U: UsbByteIo,
        L: StatusLed,
    {
        match self.mode {
            Mode::Xmodem => {
                if let Some(event) = self.xmodem.poll(clock) {
                    self.apply_xmodem_event(event, usb, led);
                }
            }
            Mode::Console => {
                if self.gdb.poll_running(ctx, clock, &mut self.engine) {
                    self.drain_gdb(usb);
                }
            }
        }
    }
}

fn apply_outcome_led<L: StatusLed>(outcome: XmodemOutcome, led: &mut L) {
    match outcome {
        XmodemOutcome::Success => led.green(),
        XmodemOutcome::VerifyFailed => led.cyan(),
        XmodemOutcome::BlockRetriesExhausted => led.red(),
        XmodemOutcome::HandshakeTimeout => led.blue(),
        XmodemOutcome::FastLockHeld => led.magenta(),
    }
}

impl Default for Probe {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::{Cell, RefCell};
    use rv003dbg_dm::DebugModule;

    struct TickingClock(Cell<u32>);
    impl Clock for TickingClock {
        fn now_us(&self) -> u32 {
            let v = self.0.get();
            self.0.set(v.wrapping_add(1));
            v
        }
    }

    struct FakeSwio {
        regs: RefCell<[u32; 64]>,
    }
    impl FakeSwio {
        fn new() -> Self {
            FakeSwio { regs: RefCell::new([0; 64]) }
        }
    }
    impl Swio for FakeSwio {
        fn get(&mut self, a: u8) -> u32 {
            self.regs.borrow()[a as usize]
        }
        fn put(&mut self, a: u8, value: u32) {
            self.regs.borrow_mut()[a as usize] = value;
        }
        fn line_reset(&mut self) {}
    }

    struct FakeUsb {
        rx: RefCell<ByteQueue>,
        tx: RefCell<[u8; 512]>,
        tx_len: Cell<usize>,
        connected: bool,
    }

    /// A tiny fixed-capacity byte queue, just enough for the scheduler
    /// tests below; not a general-purpose ring buffer.
    struct ByteQueue {
        buf: [u8; 512],
        head: usize,
        len: usize,
    }

    impl ByteQueue {
        fn new() -> Self {
            ByteQueue { buf: [0; 512], head: 0, len: 0 }
        }
        fn push_all(&mut self, bytes: &[u8]) {
            for &b in bytes {
                self.buf[(self.head + self.len) % 512] = b;
                self.len += 1;
            }
        }
        fn pop(&mut self) -> Option<u8> {
            if self.len == 0 {
                return None;
            }
            let b = self.buf[self.head];
            self.head = (self.head + 1) % 512;
            self.len -= 1;
            Some(b)
        }
    }

    impl FakeUsb {
        fn new() -> Self {
            FakeUsb { rx: RefCell::new(ByteQueue::new()), tx: RefCell::new([0; 512]), tx_len: Cell::new(0), connected: true }
        }
        fn feed(&self, bytes: &[u8]) {
            self.rx.borrow_mut().push_all(bytes);
        }
        fn sent(&self) -> [u8; 512] {
            *self.tx.borrow()
        }
    }

    impl UsbByteIo for FakeUsb {
        fn try_read(&mut self) -> Option<u8> {
            self.rx.borrow_mut().pop()
        }
        fn try_write(&mut self, byte: u8) -> bool {
            let n = self.tx_len.get();
            if n >= self.tx.borrow().len() {
                return false;
            }
            self.tx.borrow_mut()[n] = byte;
            self.tx_len.set(n + 1);
            true
        }
        fn connected(&mut self) -> bool {
            self.connected
        }
    }

    struct FakeLed {
        last: Option<&'static str>,
    }
    impl FakeLed {
        fn new() -> Self {
            FakeLed { last: None }
        }
    }
    impl StatusLed for FakeLed {
        fn off(&mut self) {
            self.last = Some("off");
        }
        fn green(&mut self) {
            self.last = Some("green");
        }
        fn cyan(&mut self) {
            self.last = Some("cyan");
        }
        fn red(&mut self) {
            self.last = Some("red");
        }
        fn blue(&mut self) {
            self.last = Some("blue");
        }
        fn magenta(&mut self) {
            self.last = Some("magenta");
        }
    }

    struct FakeButton;
    impl Button for FakeButton {
        fn pressed(&mut self) -> bool {
            false
        }
    }

    fn run_bytes(probe: &mut Probe, ctx: &mut TargetContext<FakeSwio>, clock: &TickingClock, usb: &mut FakeUsb, led: &mut FakeLed, bytes: &[u8]) {
        let mut button = FakeButton;
        for &b in bytes {
            usb.feed(&[b]);
            probe.tick(ctx, clock, usb, led, &mut button);
        }
    }

    #[test]
    fn console_help_line_echoes_a_reply() {
        let mut probe = Probe::new();
        let mut ctx = TargetContext::new(DebugModule::new(FakeSwio::new()));
        let clock = TickingClock(Cell::new(0));
        let mut usb = FakeUsb::new();
        let mut led = FakeLed::new();
        run_bytes(&mut probe, &mut ctx, &clock, &mut usb, &mut led, b"help\r\n");
        let sent = usb.sent();
        assert!(sent.starts_with(b"verbs:"));
    }

    #[test]
    fn syn_byte_switches_into_xmodem_mode_and_polls_nothing_yet() {
        let mut probe = Probe::new();
        let mut ctx = TargetContext::new(DebugModule::new(FakeSwio::new()));
        let clock = TickingClock(Cell::new(0));
        let mut usb = FakeUsb::new();
        let mut led = FakeLed::new();
        run_bytes(&mut probe, &mut ctx, &clock, &mut usb, &mut led, &[SYN]);
        assert!(probe.mode == Mode::Xmodem);
    }

    #[test]
    fn eot_during_xmodem_acks_and_lights_the_success_colour() {
        let mut probe = Probe::new();
        let mut ctx = TargetContext::new(DebugModule::new(FakeSwio::new()));
        let clock = TickingClock(Cell::new(0));
        let mut usb = FakeUsb::new();
        let mut led = FakeLed::new();
        run_bytes(&mut probe, &mut ctx, &clock, &mut usb, &mut led, &[SYN, 0x04]);
        assert!(probe.mode == Mode::Console);
        assert_eq!(led.last, Some("green"));
        assert_eq!(usb.sent()[0], 0x06);
    }

    #[test]
    fn host_disconnect_resets_run_state_and_mode() {
        let mut probe = Probe::new();
        let mut ctx = TargetContext::new(DebugModule::new(FakeSwio::new()));
        let clock = TickingClock(Cell::new(0));
        let mut usb = FakeUsb::new();
        let mut led = FakeLed::new();
        let mut button = FakeButton;
        probe.gdb.run = RunState::Running;
        probe.tick(&mut ctx, &clock, &mut usb, &mut led, &mut button);
        usb.connected = false;
        probe.tick(&mut ctx, &clock, &mut usb, &mut led, &mut button);
        assert_eq!(probe.gdb.run, RunState::Disconnected);
    }
}
