//! The pipeline's single cancellation flag (§5: "a single `AtomicBool`
//! polled by both decode loops and consulted by sink workers at wake
//! time"). Passed down explicitly as a cloneable handle rather than kept
//! as a `static`, so tests can construct their own and nothing process-
//! wide needs resetting between them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Shutdown {
        Shutdown { flag: Arc::new(AtomicBool::new(false)) }
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// A `should_stop`-shaped closure for the blocking packet readers in
    /// `cdc-mysql-proto` and `cdc-pg-proto`, which poll it once per wake
    /// interval rather than holding a reference to `Shutdown` itself.
    pub fn as_poll_fn(&self) -> impl Fn() -> bool {
        let flag = Arc::clone(&self.flag);
        move || flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_is_visible_through_a_clone() {
        let handle = Shutdown::new();
        let clone = handle.clone();
        assert!(!clone.requested());
        handle.request();
        assert!(clone.requested());
    }

    #[test]
    fn poll_fn_reflects_live_state() {
        let handle = Shutdown::new();
        let poll = handle.as_poll_fn();
        assert!(!poll());
        handle.request();
        assert!(poll());
    }
}
