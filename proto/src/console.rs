// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The diagnostic console: a whitespace-tokenized verb dispatcher
//! reachable both from a direct serial connection and from GDB's
//! `monitor` command (`qRcmd`). The verb table itself is trivial glue;
//! what needs to be right is number parsing, since addresses typed at
//! the console come in decimal, hex, octal, and binary.

use rv003dbg_breakpoints::BreakpointEngine;
use rv003dbg_dm::time::Clock;
use rv003dbg_dm::Swio;
use rv003dbg_target::TargetContext;

const MAX_TOKENS: usize = 4;

/// Parse one numeric token using the console's C-like literal rules:
/// `0x`/`0b` prefixes select hex/binary, a bare leading `0` selects
/// octal unless the digits that follow include an `8` or `9` (in
/// which case it's decimal after all), otherwise decimal.
pub fn parse_number(tok: &[u8]) -> Option<u32> {
    if tok.is_empty() {
        return None;
    }
    if tok.len() > 2 && tok[0] == b'0' && (tok[1] == b'x' || tok[1] == b'X') {
        return parse_radix(&tok[2..], 16);
    }
    if tok.len() > 2 && tok[0] == b'0' && (tok[1] == b'b' || tok[1] == b'B') {
        return parse_radix(&tok[2..], 2);
    }
    if tok.len() > 1 && tok[0] == b'0' {
        if tok[1..].iter().any(|&c| c == b'8' || c == b'9') {
            return parse_radix(tok, 10);
        }
        return parse_radix(&tok[1..], 8);
    }
    parse_radix(tok, 10)
}

fn parse_radix(digits: &[u8], radix: u32) -> Option<u32> {
    if digits.is_empty() {
        return None;
    }
    let mut v: u32 = 0;
    for &c in digits {
        let d = (c as char).to_digit(radix)?;
        v = v.checked_mul(radix)?.checked_add(d)?;
    }
    Some(v)
}

fn is_space(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

fn tokenize(cmd: &[u8]) -> ([&[u8]; MAX_TOKENS], usize) {
    let mut toks: [&[u8]; MAX_TOKENS] = [&[]; MAX_TOKENS];
    let mut n = 0;
    let mut i = 0;
    while i < cmd.len() && n < MAX_TOKENS {
        while i < cmd.len() && is_space(cmd[i]) {
            i += 1;
        }
        if i >= cmd.len() {
            break;
        }
        let start = i;
        while i < cmd.len() && !is_space(cmd[i]) {
            i += 1;
        }
        toks[n] = &cmd[start..i];
        n += 1;
    }
    (toks, n)
}

fn write_out(out: &mut [u8], text: &[u8]) -> usize {
    let n = text.len().min(out.len());
    out[..n].copy_from_slice(&text[..n]);
    n
}

/// Run one console command, writing human-readable output into `out`
/// and returning how many bytes were written.
pub fn dispatch_monitor<S: Swio>(cmd: &[u8], ctx: &mut TargetContext<S>, clock: &dyn Clock, engine: &mut BreakpointEngine, out: &mut [u8]) -> usize {
    let (toks, n) = tokenize(cmd);
    if n == 0 {
        return write_out(out, b"");
    }

    match toks[0] {
        b"help" => write_out(out, b"verbs: boot break core flash info options reset"),
        b"reset" => {
            // Bare `reset` is the one verb `qRcmd` must answer with a
            // literal `OK`, not hex-encoded text: leave `out` empty on
            // success so `handle_rcmd`'s no-output fallback produces it.
            let ok = ctx.reset(clock).is_ok();
            write_out(out, if ok { b"" } else { b"reset failed" })
        }
        b"core" if n >= 2 => match toks[1] {
            b"reset" => {
                let ok = ctx.reset(clock).is_ok();
                write_out(out, if ok { b"core reset" } else { b"core reset failed" })
            }
            b"halt" => {
                let ok = ctx.halt(clock).is_ok();
                write_out(out, if ok { b"core halted" } else { b"core halt failed" })
            }
            b"continue" => {
                let ok = ctx.resume(clock).is_ok();
                write_out(out, if ok { b"core resumed" } else { b"core resume failed" })
            }
            b"step" => {
                let ok = ctx.step(clock).is_ok();
                write_out(out, if ok { b"core stepped" } else { b"core step failed" })
            }
            _ => write_out(out, b"core: unknown sub-command"),
        },
        b"flash" if n >= 2 => match toks[1] {
            b"lock" => {
                let ok = rv003dbg_flash::lock(ctx, clock).is_ok();
                write_out(out, if ok { b"flash locked" } else { b"flash lock failed" })
            }
            b"unlock" => {
                let ok = rv003dbg_flash::unlock(ctx, clock).is_ok();
                write_out(out, if ok { b"flash unlocked" } else { b"flash unlock failed" })
            }
            b"patch" => {
                let ok = engine.patch_flash(ctx, clock).is_ok();
                write_out(out, if ok { b"flash patched" } else { b"flash patch failed" })
            }
            b"unpatch" => {
                let ok = engine.unpatch_flash(ctx, clock).is_ok();
                write_out(out, if ok { b"flash unpatched" } else { b"flash unpatch failed" })
            }
            _ => write_out(out, b"flash: unknown sub-command"),
        },
        b"break" if n >= 2 => match toks[1] {
            b"halt" => {
                let ok = engine.halt(ctx, clock).is_ok();
                write_out(out, if ok { b"breakpoints halted" } else { b"halt failed" })
            }
            b"continue" => {
                let ok = engine.resume(ctx, clock).is_ok();
                write_out(out, if ok { b"breakpoints resumed" } else { b"resume failed" })
            }
            b"set" if n >= 3 => match parse_number(toks[2]) {
                Some(addr) => {
                    let ok = engine.set(ctx, clock, addr, 4).is_ok();
                    write_out(out, if ok { b"breakpoint set" } else { b"breakpoint set failed" })
                }
                None => write_out(out, b"break set: bad address"),
            },
            b"clear" if n >= 3 => match parse_number(toks[2]) {
                Some(addr) => {
                    let ok = engine.clear(addr).is_ok();
                    write_out(out, if ok { b"breakpoint cleared" } else { b"breakpoint clear failed" })
                }
                None => write_out(out, b"break clear: bad address"),
            },
            _ => write_out(out, b"break: unknown sub-command"),
        },
        b"boot" if n >= 2 => match toks[1] {
            b"lock" => {
                let ok = rv003dbg_flash::lock_boot(ctx, clock).is_ok();
                write_out(out, if ok { b"bootloader area locked" } else { b"bootloader lock failed" })
            }
            b"unlock" => {
                let ok = rv003dbg_flash::unlock_boot(ctx, clock).is_ok();
                write_out(out, if ok { b"bootloader area unlocked" } else { b"bootloader unlock failed" })
            }
            b"pico" => write_out(out, b"not available on this build"),
            _ => write_out(out, b"boot: unknown sub-command"),
        },
        b"options" if n >= 2 => match toks[1] {
            b"lock" => {
                let ok = rv003dbg_flash::lock_optb(ctx, clock).is_ok();
                write_out(out, if ok { b"option bytes locked" } else { b"option bytes lock failed" })
            }
            b"unlock" => {
                let ok = rv003dbg_flash::unlock_optb(ctx, clock).is_ok();
                write_out(out, if ok { b"option bytes unlocked" } else { b"option bytes unlock failed" })
            }
            _ => write_out(out, b"options: unknown sub-command"),
        },
        b"info" if n >= 2 => match toks[1] {
            b"break" => write_out(out, b"breakpoints: see `break` verb"),
            b"core" => write_out(out, if ctx.is_halted() { b"core: halted" } else { b"core: running" }),
            b"boot" => match rv003dbg_flash::is_boot_locked(ctx, clock) {
                Ok(true) => write_out(out, b"boot: locked"),
                Ok(false) => write_out(out, b"boot: unlocked"),
                Err(_) => write_out(out, b"boot: query failed"),
            },
            b"flash" => match rv003dbg_flash::is_fast_locked(ctx, clock) {
                Ok(true) => write_out(out, b"flash: fast-programming locked"),
                Ok(false) => write_out(out, b"flash: fast-programming unlocked"),
                Err(_) => write_out(out, b"flash: query failed"),
            },
            b"options" => match rv003dbg_flash::is_optb_locked(ctx, clock) {
                Ok(true) => write_out(out, b"options: locked"),
                Ok(false) => write_out(out, b"options: unlocked"),
                Err(_) => write_out(out, b"options: query failed"),
            },
            b"swio" | b"vendor" => write_out(out, b"info: not available on this build"),
            _ => write_out(out, b"info: unknown sub-command"),
        },
        _ => write_out(out, b"unknown command"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_is_the_default_radix() {
        assert_eq!(parse_number(b"42"), Some(42));
    }

    #[test]
    fn hex_and_binary_prefixes_are_recognised() {
        assert_eq!(parse_number(b"0x2000"), Some(0x2000));
        assert_eq!(parse_number(b"0b101"), Some(0b101));
    }

    #[test]
    fn leading_zero_without_eight_or_nine_is_octal() {
        assert_eq!(parse_number(b"017"), Some(15));
    }

    #[test]
    fn leading_zero_containing_eight_or_nine_falls_back_to_decimal() {
        assert_eq!(parse_number(b"089"), Some(89));
    }

    #[test]
    fn tokenize_splits_on_runs_of_whitespace() {
        let (toks, n) = tokenize(b"break  set   0x100");
        assert_eq!(n, 3);
        assert_eq!(toks[0], b"break");
        assert_eq!(toks[1], b"set");
        assert_eq!(toks[2], b"0x100");
    }

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

    fn ctx_and_clock() -> (TargetContext<FakeSwio>, TickingClock) {
        (TargetContext::new(DebugModule::new(FakeSwio::new())), TickingClock(Cell::new(0)))
    }

    #[test]
    fn unknown_verb_is_reported() {
        let (mut ctx, clock) = ctx_and_clock();
        let mut engine = BreakpointEngine::new();
        let mut out = [0u8; 64];
        let n = dispatch_monitor(b"frobnicate", &mut ctx, &clock, &mut engine, &mut out);
        assert_eq!(&out[..n], b"unknown command");
    }

    #[test]
    fn bare_reset_resets_the_target_and_leaves_output_empty() {
        let (mut ctx, clock) = ctx_and_clock();
        let mut engine = BreakpointEngine::new();
        let mut out = [0u8; 64];
        let n = dispatch_monitor(b"reset", &mut ctx, &clock, &mut engine, &mut out);
        assert_eq!(n, 0);
    }

    #[test]
    fn boot_and_options_verbs_dispatch_without_panicking() {
        let (mut ctx, clock) = ctx_and_clock();
        let mut engine = BreakpointEngine::new();
        let mut out = [0u8; 64];
        let n = dispatch_monitor(b"boot unlock", &mut ctx, &clock, &mut engine, &mut out);
        assert!(&out[..n] != b"boot: unknown sub-command");
        let n = dispatch_monitor(b"options lock", &mut ctx, &clock, &mut engine, &mut out);
        assert!(&out[..n] != b"options: unknown sub-command");
        let n = dispatch_monitor(b"info swio", &mut ctx, &clock, &mut engine, &mut out);
        assert_eq!(&out[..n], b"info: not available on this build");
    }
}
