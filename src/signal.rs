//! Cooperative cancellation: a `ctrlc`-installed SIGINT/SIGQUIT handler
//! flips a shared `AtomicBool`, checked at I/O suspension points and
//! frontier pops in both crawl modes, per §5 and §7's `SignalInterrupt`.
//!
//! The teacher has no signal story of its own (a long-running server is
//! killed, not asked to wind down); this is grounded on `ctrlc`'s own
//! documented usage rather than a pack precedent — see DESIGN.md.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Installs a handler that sets `flag` on SIGINT/SIGQUIT (`ctrlc`
/// normalizes both to its single callback on Unix). Returns the flag so
/// callers can clone it into every component that needs to observe it.
pub fn install() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let flag = Arc::new(AtomicBool::new(false));
    let flag_for_handler = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        flag_for_handler.store(true, Ordering::SeqCst);
    })?;
    Ok(flag)
}

#[inline(always)]
pub fn is_stopping(flag: &AtomicBool) -> bool {
    flag.load(Ordering::SeqCst)
}
