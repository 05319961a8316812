//! aarch64 context switching (AAPCS64)
//!
//! Preserves sp, the resume address, x19-x30 and the low halves of
//! v8-v15 (d8-d15), which is the full callee-saved set.

use super::{entry_returned, EntryFn};
use std::arch::naked_asm;

/// Saved registers of a suspended context
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct Context {
    pub sp: u64,       // 0x00
    pub pc: u64,       // 0x08
    pub x19_x28: [u64; 10], // 0x10..0x60
    pub fp: u64,       // 0x60 (x29)
    pub lr: u64,       // 0x68 (x30)
    pub d8_d15: [u64; 8], // 0x70..0xb0
}

/// Prepare `ctx` so that switching to it runs `entry(arg)` on the stack
/// ending at `stack_top`
///
/// # Safety
///
/// `stack_top` must be the high end of a writable region large enough for
/// `entry` and everything it calls.
#[inline]
pub unsafe fn init_context(ctx: &mut Context, stack_top: *mut u8, entry: EntryFn, arg: usize) {
    let sp = (stack_top as usize) & !0xF;

    let mut regs = [0u64; 10];
    regs[0] = entry as usize as u64; // x19
    regs[1] = arg as u64; // x20

    *ctx = Context {
        sp: sp as u64,
        pc: fiber_trampoline as usize as u64,
        x19_x28: regs,
        ..Context::default()
    };
}

#[unsafe(naked)]
unsafe extern "C" fn fiber_trampoline() {
    naked_asm!(
        "mov x0, x20",
        "blr x19",
        "bl {returned}",
        "brk #0x1",
        returned = sym entry_returned,
    );
}

/// Save the current context into `old` and resume `new`
///
/// # Safety
///
/// `new` must hold a context produced by `init_context` or by an earlier
/// `switch_context`, whose stack is still mapped.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(_old: *mut Context, _new: *const Context) {
    naked_asm!(
        // Save into old (x0)
        "mov x9, sp",
        "adr x10, 2f",
        "stp x9, x10, [x0, #0x00]",
        "stp x19, x20, [x0, #0x10]",
        "stp x21, x22, [x0, #0x20]",
        "stp x23, x24, [x0, #0x30]",
        "stp x25, x26, [x0, #0x40]",
        "stp x27, x28, [x0, #0x50]",
        "stp x29, x30, [x0, #0x60]",
        "stp d8, d9, [x0, #0x70]",
        "stp d10, d11, [x0, #0x80]",
        "stp d12, d13, [x0, #0x90]",
        "stp d14, d15, [x0, #0xa0]",
        // Load from new (x1)
        "ldp x9, x10, [x1, #0x00]",
        "mov sp, x9",
        "ldp x19, x20, [x1, #0x10]",
        "ldp x21, x22, [x1, #0x20]",
        "ldp x23, x24, [x1, #0x30]",
        "ldp x25, x26, [x1, #0x40]",
        "ldp x27, x28, [x1, #0x50]",
        "ldp x29, x30, [x1, #0x60]",
        "ldp d8, d9, [x1, #0x70]",
        "ldp d10, d11, [x1, #0x80]",
        "ldp d12, d13, [x1, #0x90]",
        "ldp d14, d15, [x1, #0xa0]",
        "br x10",
        // Resumed here
        "2:",
        "ret",
    );
}
