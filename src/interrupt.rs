//! Interrupt handling for a running batch.
//!
//! On unix the analyzer runs in its own process group, so a terminal Ctrl-C
//! no longer reaches it directly. [`install`] turns SIGINT/SIGTERM into a flag
//! that the runner and the analyzer wait loop poll; they kill the analyzer's
//! group and stop. A second signal exits immediately.

use std::sync::atomic::{AtomicBool, Ordering};

static REQUESTED: AtomicBool = AtomicBool::new(false);

pub fn requested() -> bool {
    REQUESTED.load(Ordering::SeqCst)
}

/// Marks the batch as interrupted, exactly as a signal would.
pub fn request() {
    REQUESTED.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
pub fn install() {
    extern "C" fn on_signal(_sig: libc::c_int) {
        // Only async-signal-safe work here: an atomic swap and _exit.
        if REQUESTED.swap(true, Ordering::SeqCst) {
            unsafe { libc::_exit(130) };
        }
    }

    let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
}

#[cfg(not(unix))]
pub fn install() {}
