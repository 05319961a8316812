//! x86_64 context switching (System V AMD64)
//!
//! Only callee-saved registers are preserved: a switch is an ordinary
//! function call from the compiler's point of view, so everything else is
//! already clobbered by the call.

use super::{entry_returned, EntryFn};
use std::arch::naked_asm;

/// Saved registers of a suspended context
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct Context {
    pub rsp: u64, // 0x00
    pub rip: u64, // 0x08
    pub rbx: u64, // 0x10
    pub rbp: u64, // 0x18
    pub r12: u64, // 0x20
    pub r13: u64, // 0x28
    pub r14: u64, // 0x30
    pub r15: u64, // 0x38
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
    // The trampoline is entered by jmp with a 16-byte aligned rsp, so its
    // `call` leaves the callee with the usual rsp % 16 == 8.
    let sp = (stack_top as usize) & !0xF;

    *ctx = Context {
        rsp: sp as u64,
        rip: fiber_trampoline as usize as u64,
        r12: entry as usize as u64,
        r13: arg as u64,
        ..Context::default()
    };
}

#[unsafe(naked)]
unsafe extern "C" fn fiber_trampoline() {
    naked_asm!(
        "mov rdi, r13",
        "call r12",
        "call {returned}",
        "ud2",
        returned = sym entry_returned,
    );
}

/// Save the current context into `old` and resume `new`
///
/// Returns when some other context switches back into `old`.
///
/// # Safety
///
/// `new` must hold a context produced by `init_context` or by an earlier
/// `switch_context`, whose stack is still mapped.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(_old: *mut Context, _new: *const Context) {
    naked_asm!(
        // Save into old (rdi)
        "mov [rdi + 0x00], rsp",
        "lea rax, [rip + 2f]",
        "mov [rdi + 0x08], rax",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], rbp",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], r13",
        "mov [rdi + 0x30], r14",
        "mov [rdi + 0x38], r15",
        // Load from new (rsi)
        "mov rsp, [rsi + 0x00]",
        "mov rax, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov rbp, [rsi + 0x18]",
        "mov r12, [rsi + 0x20]",
        "mov r13, [rsi + 0x28]",
        "mov r14, [rsi + 0x30]",
        "mov r15, [rsi + 0x38]",
        "jmp rax",
        // Resumed here
        "2:",
        "ret",
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pair {
        main: Context,
        child: Context,
        hits: u32,
    }

    extern "C" fn bounce(arg: usize) -> ! {
        let pair = arg as *mut Pair;
        loop {
            unsafe {
                (*pair).hits += 1;
                switch_context(&mut (*pair).child, &(*pair).main);
            }
        }
    }

    #[test]
    fn test_switch_round_trips() {
        let mut stack = vec![0u8; 64 * 1024];
        let mut pair = Box::new(Pair {
            main: Context::default(),
            child: Context::default(),
            hits: 0,
        });
        let p: *mut Pair = &mut *pair;

        unsafe {
            let top = stack.as_mut_ptr().add(stack.len());
            init_context(&mut (*p).child, top, bounce, p as usize);
            assert_eq!((*p).child.rsp % 16, 0);

            switch_context(&mut (*p).main, &(*p).child);
            assert_eq!((*p).hits, 1);
            switch_context(&mut (*p).main, &(*p).child);
            assert_eq!((*p).hits, 2);
        }
    }
}
