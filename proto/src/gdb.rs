// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! GDB Remote Serial Protocol server.
//!
//! [`GdbServer`] owns packet framing (`$...#cc`, the `}` escape) and
//! command dispatch. It never touches the wire itself — [`GdbServer::feed_byte`]
//! takes one byte at a time from whatever transport the probe layer is
//! running, and [`GdbServer::outgoing`] hands back whatever bytes are
//! queued for transmission after each call.

use rv003dbg_breakpoints::BreakpointEngine;
use rv003dbg_dm::regs::{addr as dm_addr, Status};
use rv003dbg_dm::time::Clock;
use rv003dbg_dm::Swio;
use rv003dbg_flash::regs::{FLASH_BASE, PAGE_SIZE, PAGE_WORDS};
use rv003dbg_target::{TargetContext, GPR_COUNT, REG_DPC};
use tock_registers::LocalRegisterCopy;

use crate::console;
use crate::hex;
use crate::memmap::MEMORY_MAP_XML;
use crate::packet::PacketBuffer;

/// Matches the `qSupported` reply's advertised `PacketSize`.
pub const PACKET_CAP: usize = 32768;

#[derive(Copy, Clone, PartialEq, Eq)]
enum RecvState {
    Idle,
    InPacket { checksum: u8 },
    Escape { checksum: u8 },
    Csum1 { checksum: u8 },
    Csum2 { checksum: u8, hi: Option<u8> },
}

/// What happened to the byte just fed in.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RecvEvent {
    /// Nothing externally visible yet; keep feeding bytes.
    None,
    /// Ctrl-C (`0x03`) arrived outside of a packet.
    CtrlC,
    /// A complete, checksum-valid packet sits in the receive buffer.
    /// The caller should ack with `+` and call [`GdbServer::dispatch`].
    PacketOk,
    /// A complete packet arrived but its checksum did not match. The
    /// caller should send `-` and expect a retransmit.
    PacketBad,
}

/// One pending flash page, buffered across possibly several
/// `vFlashWrite` packets before being committed.
struct VFlashCache {
    page_addr: Option<u32>,
}

impl VFlashCache {
    const fn new() -> Self {
        VFlashCache { page_addr: None }
    }
}

/// The server's run state, driving whether `dispatch` expects a
/// command packet or the target is free-running and only periodic
/// polling (see [`GdbServer::poll_running`]) can produce a reply.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunState {
    Disconnected,
    Idle,
    Running,
    Killed,
}

pub struct GdbServer {
    recv: PacketBuffer<PACKET_CAP>,
    send: PacketBuffer<PACKET_CAP>,
    state: RecvState,
    pub run: RunState,
    vflash: VFlashCache,
}

fn push_checksummed(send: &mut PacketBuffer<PACKET_CAP>, checksum: &mut u8, byte: u8) {
    if byte == b'$' || byte == b'#' || byte == b'}' || byte == b'*' {
        let escaped = byte ^ 0x20;
        let _ = send.push(b'}');
        let _ = send.push(escaped);
        *checksum = checksum.wrapping_add(b'}').wrapping_add(escaped);
    } else {
        let _ = send.push(byte);
        *checksum = checksum.wrapping_add(byte);
    }
}

fn push_hex_byte(send: &mut PacketBuffer<PACKET_CAP>, checksum: &mut u8, byte: u8) {
    let mut buf = [0u8; 2];
    hex::encode_byte(byte, &mut buf);
    push_checksummed(send, checksum, buf[0]);
    push_checksummed(send, checksum, buf[1]);
}

fn push_str(send: &mut PacketBuffer<PACKET_CAP>, checksum: &mut u8, s: &[u8]) {
    for &b in s {
        push_checksummed(send, checksum, b);
    }
}

fn finish_packet(send: &mut PacketBuffer<PACKET_CAP>, checksum: u8) {
    let _ = send.push(b'#');
    let mut buf = [0u8; 2];
    hex::encode_byte(checksum, &mut buf);
    let _ = send.push(buf[0]);
    let _ = send.push(buf[1]);
}

impl GdbServer {
    pub const fn new() -> Self {
        GdbServer {
            recv: PacketBuffer::new(),
            send: PacketBuffer::new(),
            state: RecvState::Idle,
            run: RunState::Disconnected,
            vflash: VFlashCache::new(),
        }
    }

    /// Bytes queued for transmission since the last call; drain and
    /// send these, then call [`Self::clear_outgoing`].
    pub fn outgoing(&self) -> &[u8] {
        self.send.as_slice()
    }

    pub fn clear_outgoing(&mut self) {
        self.send.clear();
    }

    /// Whether the framer is between packets. A byte arriving in this
    /// state that isn't `$` or Ctrl-C is not a GDB packet at all, which
    /// is how the probe tells a typed console line apart from RSP
    /// traffic sharing the same wire.
    pub fn is_idle(&self) -> bool {
        self.state == RecvState::Idle
    }

    /// Feed one received byte through the framer. The checksum covers
    /// the raw wire bytes — an escape marker and its following escaped
    /// byte both count — while `recv` collects the unescaped payload.
    pub fn feed_byte(&mut self, byte: u8) -> RecvEvent {
        match self.state {
            RecvState::Idle => {
                if byte == 0x03 {
                    return RecvEvent::CtrlC;
                }
                if byte == b'$' {
                    self.recv.clear();
                    self.state = RecvState::InPacket { checksum: 0 };
                }
                RecvEvent::None
            }
            RecvState::InPacket { checksum } => {
                if byte == b'#' {
                    self.state = RecvState::Csum1 { checksum };
                } else if byte == b'}' {
                    self.state = RecvState::Escape { checksum: checksum.wrapping_add(byte) };
                } else {
                    let _ = self.recv.push(byte);
                    self.state = RecvState::InPacket { checksum: checksum.wrapping_add(byte) };
                }
                RecvEvent::None
            }
            RecvState::Escape { checksum } => {
                let _ = self.recv.push(byte ^ 0x20);
                self.state = RecvState::InPacket { checksum: checksum.wrapping_add(byte) };
                RecvEvent::None
            }
            RecvState::Csum1 { checksum } => {
                self.state = RecvState::Csum2 { checksum, hi: hex::hex_to_nibble(byte) };
                RecvEvent::None
            }
            RecvState::Csum2 { checksum, hi } => {
                self.state = RecvState::Idle;
                let lo = hex::hex_to_nibble(byte);
                match (hi, lo) {
                    (Some(hi), Some(lo)) if (hi << 4) | lo == checksum => RecvEvent::PacketOk,
                    _ => RecvEvent::PacketBad,
                }
            }
        }
    }

    pub fn nak(&mut self) {
        self.send.clear();
        let _ = self.send.push(b'-');
    }

    pub fn ack(&mut self) {
        self.send.clear();
        let _ = self.send.push(b'+');
    }

    /// Dispatch the packet currently sitting in `recv`, leaving the
    /// reply (unacked, just the packet itself) in `send`.
    ///
    /// The payload is copied out to a local buffer first: every
    /// handler below needs `&mut self` to build its reply, which
    /// would otherwise conflict with a `pkt` slice still borrowed out
    /// of `self.recv`.
    pub fn dispatch<S: Swio>(&mut self, ctx: &mut TargetContext<S>, clock: &dyn Clock, engine: &mut BreakpointEngine) {
        self.send.clear();
        let _ = self.send.push(b'$');
        let mut checksum = 0u8;
        let mut local = [0u8; PACKET_CAP];
        let len = self.recv.len();
        local[..len].copy_from_slice(self.recv.as_slice());
        let pkt = &local[..len];

        if pkt.is_empty() {
            finish_packet(&mut self.send, checksum);
            return;
        }

        match pkt[0] {
            b'?' => push_str(&mut self.send, &mut checksum, b"T05"),
            b'!' => push_str(&mut self.send, &mut checksum, b"OK"),
            b'c' => {
                self.handle_continue(&pkt[1..], ctx, clock, engine, &mut checksum);
                // `handle_continue` clears `send` outright when it enters
                // RUNNING; the stop reply comes later from `poll_running`,
                // so there is nothing to frame here.
                if !self.send.is_empty() {
                    finish_packet(&mut self.send, checksum);
                }
                return;
            }
            b's' => {
                self.handle_step(&pkt[1..], ctx, clock, &mut checksum);
                finish_packet(&mut self.send, checksum);
                return;
            }
            b'D' => self.handle_detach(ctx, clock, engine, &mut checksum),
            b'g' => self.handle_read_regs(ctx, clock, &mut checksum),
            b'G' => self.handle_write_regs(&pkt[1..], ctx, clock, &mut checksum),
            b'H' => push_str(&mut self.send, &mut checksum, b"OK"),
            b'k' => {
                self.run = RunState::Killed;
                self.send.clear();
                return;
            }
            b'm' => self.handle_read_mem(&pkt[1..], ctx, clock, &mut checksum),
            b'M' => self.handle_write_mem(&pkt[1..], ctx, clock, &mut checksum),
            b'p' => self.handle_read_one_reg(&pkt[1..], ctx, clock, &mut checksum),
            b'P' => self.handle_write_one_reg(&pkt[1..], ctx, clock, &mut checksum),
            b'q' => self.handle_query(&pkt[1..], ctx, clock, engine, &mut checksum),
            b'R' => {
                let _ = ctx.reset(clock);
                self.send.clear();
                return;
            }
            b'v' => self.handle_v(&pkt[1..], ctx, clock, engine, &mut checksum),
            b'z' | b'Z' => self.handle_breakpoint(pkt, ctx, clock, engine, &mut checksum),
            _ => {}
        }

        finish_packet(&mut self.send, checksum);
    }

    /// Periodic poll while [`RunState::Running`]: if the hart has
    /// halted (breakpoint hit, or an exception), stop-patch and
    /// synthesize the `T05` stop reply GDB is waiting for.
    pub fn poll_running<S: Swio>(&mut self, ctx: &mut TargetContext<S>, clock: &dyn Clock, engine: &mut BreakpointEngine) -> bool {
        if self.run != RunState::Running {
            return false;
        }
        let status: LocalRegisterCopy<u32, Status::Register> = rv003dbg_dm::regs::decode(ctx.dm_mut().get(dm_addr::STATUS));
        if !status.is_set(Status::ALLHALTED) {
            return false;
        }
        let _ = engine.halt(ctx, clock);
        self.run = RunState::Idle;
        self.send.clear();
        let _ = self.send.push(b'$');
        let mut checksum = 0u8;
        push_str(&mut self.send, &mut checksum, b"T05");
        finish_packet(&mut self.send, checksum);
        true
    }

    /// Ctrl-C while running: halt immediately and reply as a stop.
    pub fn handle_ctrl_c<S: Swio>(&mut self, ctx: &mut TargetContext<S>, clock: &dyn Clock, engine: &mut BreakpointEngine) {
        let _ = engine.halt(ctx, clock);
        self.run = RunState::Idle;
        self.send.clear();
        let _ = self.send.push(b'$');
        let mut checksum = 0u8;
        push_str(&mut self.send, &mut checksum, b"T05");
        finish_packet(&mut self.send, checksum);
    }

    fn handle_continue<S: Swio>(&mut self, rest: &[u8], ctx: &mut TargetContext<S>, clock: &dyn Clock, engine: &mut BreakpointEngine, checksum: &mut u8) {
        if !rest.is_empty() {
            if let Some(addr) = hex::decode_u32(rest) {
                let _ = ctx.write_reg(clock, REG_DPC, addr);
            }
        }
        match engine.resume(ctx, clock) {
            Ok(rv003dbg_breakpoints::ResumeOutcome::Resumed) => {
                self.run = RunState::Running;
                // No immediate reply; the stop reply comes from poll_running.
                self.send.clear();
            }
            Ok(rv003dbg_breakpoints::ResumeOutcome::StillStopped) => {
                push_str(&mut self.send, checksum, b"T05");
            }
            Err(_) => push_str(&mut self.send, checksum, b"E01"),
        }
    }

    fn handle_step<S: Swio>(&mut self, rest: &[u8], ctx: &mut TargetContext<S>, clock: &dyn Clock, checksum: &mut u8) {
        if !rest.is_empty() {
            if let Some(addr) = hex::decode_u32(rest) {
                let _ = ctx.write_reg(clock, REG_DPC, addr);
            }
        }
        match ctx.step(clock) {
            Ok(()) => push_str(&mut self.send, checksum, b"T05"),
            Err(_) => push_str(&mut self.send, checksum, b"E01"),
        }
    }

    fn handle_detach<S: Swio>(&mut self, ctx: &mut TargetContext<S>, clock: &dyn Clock, engine: &mut BreakpointEngine, checksum: &mut u8) {
        // A clean detach drops every breakpoint and lets the target
        // run free, rather than treating detach-while-stopped as an
        // unrecoverable condition.
        let _ = engine.clear_all();
        let _ = engine.resume(ctx, clock);
        self.run = RunState::Disconnected;
        push_str(&mut self.send, checksum, b"OK");
    }

    fn handle_read_regs<S: Swio>(&mut self, ctx: &mut TargetContext<S>, clock: &dyn Clock, checksum: &mut u8) {
        for g in 0..=REG_DPC {
            let val = ctx.read_reg(clock, g).unwrap_or(0);
            for byte in val.to_le_bytes() {
                push_hex_byte(&mut self.send, checksum, byte);
            }
        }
    }

    fn handle_write_regs<S: Swio>(&mut self, rest: &[u8], ctx: &mut TargetContext<S>, clock: &dyn Clock, checksum: &mut u8) {
        let mut buf = [0u8; (GPR_COUNT + 1) * 4];
        match hex::decode_le_bytes(rest, &mut buf) {
            Some(n) if n == buf.len() => {
                for g in 0..=REG_DPC {
                    let off = g * 4;
                    let val = u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]);
                    let _ = ctx.write_reg(clock, g, val);
                }
                push_str(&mut self.send, checksum, b"OK");
            }
            _ => push_str(&mut self.send, checksum, b"E01"),
        }
    }

    fn handle_read_one_reg<S: Swio>(&mut self, rest: &[u8], ctx: &mut TargetContext<S>, clock: &dyn Clock, checksum: &mut u8) {
        match hex::decode_u32(rest) {
            Some(n) if (n as usize) <= REG_DPC => {
                let val = ctx.read_reg(clock, n as usize).unwrap_or(0);
                for byte in val.to_le_bytes() {
                    push_hex_byte(&mut self.send, checksum, byte);
                }
            }
            _ => push_str(&mut self.send, checksum, b"E01"),
        }
    }

    fn handle_write_one_reg<S: Swio>(&mut self, rest: &[u8], ctx: &mut TargetContext<S>, clock: &dyn Clock, checksum: &mut u8) {
        if let Some((n_bytes, val_bytes)) = hex::split_once(rest, b'=') {
            if let (Some(n), Some(val)) = (hex::decode_u32(n_bytes), hex::decode_u32(val_bytes)) {
                if (n as usize) <= REG_DPC && ctx.write_reg(clock, n as usize, val).is_ok() {
                    push_str(&mut self.send, checksum, b"OK");
                    return;
                }
            }
        }
        push_str(&mut self.send, checksum, b"E01");
    }

    fn handle_read_mem<S: Swio>(&mut self, rest: &[u8], ctx: &mut TargetContext<S>, clock: &dyn Clock, checksum: &mut u8) {
        let Some((addr_bytes, len_bytes)) = hex::split_once(rest, b',') else {
            push_str(&mut self.send, checksum, b"E01");
            return;
        };
        let (Some(mut addr), Some(len)) = (hex::decode_u32(addr_bytes), hex::decode_u32(len_bytes)) else {
            push_str(&mut self.send, checksum, b"E01");
            return;
        };
        let mut remaining = len;
        while remaining > 0 {
            let bytes = if addr % 4 == 0 && remaining >= 4 {
                let Ok(word) = ctx.get_u32_aligned(clock, addr) else {
                    push_str(&mut self.send, checksum, b"E01");
                    return;
                };
                addr += 4;
                remaining -= 4;
                (word.to_le_bytes(), 4)
            } else if addr % 2 == 0 && remaining >= 2 {
                let Ok(half) = ctx.get_u16(clock, addr) else {
                    push_str(&mut self.send, checksum, b"E01");
                    return;
                };
                addr += 2;
                remaining -= 2;
                ([half as u8, (half >> 8) as u8, 0, 0], 2)
            } else {
                let Ok(byte) = ctx.get_u8(clock, addr) else {
                    push_str(&mut self.send, checksum, b"E01");
                    return;
                };
                addr += 1;
                remaining -= 1;
                ([byte, 0, 0, 0], 1)
            };
            for &b in &bytes.0[..bytes.1] {
                push_hex_byte(&mut self.send, checksum, b);
            }
        }
    }

    fn handle_write_mem<S: Swio>(&mut self, rest: &[u8], ctx: &mut TargetContext<S>, clock: &dyn Clock, checksum: &mut u8) {
        let Some((head, data_hex)) = hex::split_once(rest, b':') else {
            push_str(&mut self.send, checksum, b"E01");
            return;
        };
        let Some((addr_bytes, len_bytes)) = hex::split_once(head, b',') else {
            push_str(&mut self.send, checksum, b"E01");
            return;
        };
        let (Some(mut addr), Some(len)) = (hex::decode_u32(addr_bytes), hex::decode_u32(len_bytes)) else {
            push_str(&mut self.send, checksum, b"E01");
            return;
        };
        // Bounded: memory pokes in practice are register/variable sized,
        // not bulk loads (those go through vFlashWrite).
        let mut buf = [0u8; 1024];
        if len as usize > buf.len() {
            push_str(&mut self.send, checksum, b"E01");
            return;
        }
        let Some(n) = hex::decode_le_bytes(data_hex, &mut buf[..len as usize]) else {
            push_str(&mut self.send, checksum, b"E01");
            return;
        };
        let mut i = 0usize;
        while i < n {
            let remaining = n - i;
            let ok = if addr % 4 == 0 && remaining >= 4 {
                let word = u32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]);
                let r = ctx.set_u32_aligned(clock, addr, word).is_ok();
                addr += 4;
                i += 4;
                r
            } else {
                let r = ctx.set_u8(clock, addr, buf[i]).is_ok();
                addr += 1;
                i += 1;
                r
            };
            if !ok {
                push_str(&mut self.send, checksum, b"E01");
                return;
            }
        }
        push_str(&mut self.send, checksum, b"OK");
    }

    fn handle_query<S: Swio>(&mut self, rest: &[u8], ctx: &mut TargetContext<S>, clock: &dyn Clock, engine: &mut BreakpointEngine, checksum: &mut u8) {
        if rest.starts_with(b"Supported") {
            push_str(&mut self.send, checksum, b"PacketSize=8000;qXfer:memory-map:read+");
        } else if rest == b"Attached" {
            push_str(&mut self.send, checksum, b"1");
        } else if rest == b"C" {
            push_str(&mut self.send, checksum, b"QC1");
        } else if rest == b"fThreadInfo" {
            push_str(&mut self.send, checksum, b"m1");
        } else if rest == b"sThreadInfo" {
            push_str(&mut self.send, checksum, b"l");
        } else if rest.starts_with(b"Xfer:memory-map:read::") {
            self.handle_memory_map(&rest[b"Xfer:memory-map:read::".len()..], checksum);
        } else if rest.starts_with(b"Rcmd,") {
            self.handle_rcmd(&rest[b"Rcmd,".len()..], ctx, clock, engine, checksum);
        }
        // Anything else: empty reply, meaning "not supported".
    }

    fn handle_memory_map(&mut self, rest: &[u8], checksum: &mut u8) {
        let Some((off_bytes, len_bytes)) = hex::split_once(rest, b',') else {
            push_str(&mut self.send, checksum, b"E01");
            return;
        };
        let (Some(off), Some(len)) = (hex::decode_u32(off_bytes), hex::decode_u32(len_bytes)) else {
            push_str(&mut self.send, checksum, b"E01");
            return;
        };
        let xml = MEMORY_MAP_XML.as_bytes();
        let off = off as usize;
        let len = len as usize;
        if off >= xml.len() {
            push_str(&mut self.send, checksum, b"l");
            return;
        }
        let end = (off + len).min(xml.len());
        let marker: &[u8] = if end >= xml.len() { b"l" } else { b"m" };
        push_str(&mut self.send, checksum, marker);
        push_str(&mut self.send, checksum, &xml[off..end]);
    }

    fn handle_rcmd<S: Swio>(&mut self, hex_cmd: &[u8], ctx: &mut TargetContext<S>, clock: &dyn Clock, engine: &mut BreakpointEngine, checksum: &mut u8) {
        let mut cmd_buf = [0u8; 256];
        let Some(n) = hex::decode_le_bytes(hex_cmd, &mut cmd_buf) else {
            push_str(&mut self.send, checksum, b"E01");
            return;
        };
        let mut out_buf = [0u8; 256];
        let out_len = console::dispatch_monitor(&cmd_buf[..n], ctx, clock, engine, &mut out_buf);
        for &b in &out_buf[..out_len] {
            push_hex_byte(&mut self.send, checksum, b);
        }
        if out_len == 0 {
            push_str(&mut self.send, checksum, b"OK");
        }
    }

    fn handle_v<S: Swio>(&mut self, rest: &[u8], ctx: &mut TargetContext<S>, clock: &dyn Clock, engine: &mut BreakpointEngine, checksum: &mut u8) {
        if rest.starts_with(b"FlashErase:") {
            self.handle_vflash_erase(&rest[b"FlashErase:".len()..], ctx, clock, engine, checksum);
        } else if rest.starts_with(b"FlashWrite:") {
            self.handle_vflash_write(&rest[b"FlashWrite:".len()..], ctx, clock, checksum);
        } else if rest == b"FlashDone" {
            let _ = rv003dbg_flash::lock(ctx, clock);
            self.vflash.page_addr = None;
            push_str(&mut self.send, checksum, b"OK");
        } else if rest.starts_with(b"Kill") {
            self.run = RunState::Killed;
            push_str(&mut self.send, checksum, b"OK");
        } else if rest == b"MustReplyEmpty" {
            // genuinely empty payload
        }
    }

    fn handle_vflash_erase<S: Swio>(&mut self, rest: &[u8], ctx: &mut TargetContext<S>, clock: &dyn Clock, engine: &mut BreakpointEngine, checksum: &mut u8) {
        let Some((addr_bytes, len_bytes)) = hex::split_once(rest, b',') else {
            push_str(&mut self.send, checksum, b"E01");
            return;
        };
        let (Some(addr), Some(len)) = (hex::decode_u32(addr_bytes), hex::decode_u32(len_bytes)) else {
            push_str(&mut self.send, checksum, b"E01");
            return;
        };
        // The server may not yet be halted if GDB loads before the
        // first stop; bring the engine into a known state first.
        if engine.halt(ctx, clock).is_err() || rv003dbg_flash::unlock(ctx, clock).is_err() {
            push_str(&mut self.send, checksum, b"E01");
            return;
        }
        let mut page = addr & !(PAGE_SIZE - 1);
        let end = addr + len;
        while page < end {
            if rv003dbg_flash::erase(ctx, clock, page, rv003dbg_flash::EraseMode::Page).is_err() {
                push_str(&mut self.send, checksum, b"E01");
                return;
            }
            page += PAGE_SIZE;
        }
        push_str(&mut self.send, checksum, b"OK");
    }

    fn handle_vflash_write<S: Swio>(&mut self, rest: &[u8], ctx: &mut TargetContext<S>, clock: &dyn Clock, checksum: &mut u8) {
        let Some((addr_bytes, data)) = hex::split_once(rest, b':') else {
            push_str(&mut self.send, checksum, b"E01");
            return;
        };
        let Some(addr) = hex::decode_u32(addr_bytes) else {
            push_str(&mut self.send, checksum, b"E01");
            return;
        };
        if self.vflash.page_addr == Some(addr) {
            // Same page written twice without an intervening erase.
            push_str(&mut self.send, checksum, b"E01");
            return;
        }
        if data.len() != PAGE_SIZE as usize || addr % PAGE_SIZE != 0 || addr < FLASH_BASE {
            push_str(&mut self.send, checksum, b"E01");
            return;
        }
        let mut words = [0u32; PAGE_WORDS];
        for (w, chunk) in words.iter_mut().zip(data.chunks_exact(4)) {
            *w = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        match rv003dbg_flash::write(ctx, clock, addr, &words) {
            Ok(()) => {
                self.vflash.page_addr = Some(addr);
                push_str(&mut self.send, checksum, b"OK");
            }
            Err(_) => push_str(&mut self.send, checksum, b"E01"),
        }
    }

    fn handle_breakpoint<S: Swio>(&mut self, pkt: &[u8], ctx: &mut TargetContext<S>, clock: &dyn Clock, engine: &mut BreakpointEngine, checksum: &mut u8) {
        let insert = pkt[0] == b'Z';
        // z1/Z1 (hardware breakpoint) is aliased to the same
        // flash-patching handler as z0/Z0: this target has no hardware
        // breakpoint comparators, so GDB's "hardware" request is
        // serviced identically to a software one.
        let rest = &pkt[2..]; // skip "z0"/"Z0"/"z1"/"Z1"
        let rest = if rest.first() == Some(&b',') { &rest[1..] } else { rest };
        let Some((addr_bytes, kind_bytes)) = hex::split_once(rest, b',') else {
            push_str(&mut self.send, checksum, b"E01");
            return;
        };
        let Some(addr) = hex::decode_u32(addr_bytes) else {
            push_str(&mut self.send, checksum, b"E01");
            return;
        };
        let size = match hex::decode_u32(kind_bytes) {
            Some(2) => 2,
            _ => 4,
        };
        let result = if insert { engine.set(ctx, clock, addr, size) } else { engine.clear(addr) };
        match result {
            Ok(()) => push_str(&mut self.send, checksum, b"OK"),
            Err(_) => push_str(&mut self.send, checksum, b"E01"),
        }
    }
}

impl Default for GdbServer {
    fn default() -> Self {
        Self::new()
    }
}
