//! Architecture-specific context switching
//!
//! Each backend provides the same three items:
//!
//! - `Context`: the callee-saved register block of a suspended fiber
//! - `init_context`: prepare a `Context` so switching to it calls
//!   `entry(arg)` on a fresh stack
//! - `switch_context`: save the current registers into `old`, load `new`
//!
//! `entry` must never return; if it does, the trampoline aborts.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub mod x86_64;
        pub use self::x86_64::{init_context, switch_context, Context};
    } else if #[cfg(target_arch = "aarch64")] {
        pub mod aarch64;
        pub use self::aarch64::{init_context, switch_context, Context};
    } else {
        compile_error!("fiberloop supports x86_64 and aarch64 only");
    }
}

/// Entry point a fresh context starts in
pub type EntryFn = extern "C" fn(usize) -> !;

/// Reached only if an entry function returns
pub(crate) extern "C" fn entry_returned() -> ! {
    fiberloop_core::kfatal!("fiber entry function returned")
}
