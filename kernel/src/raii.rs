//! RAII wrappers for kernel resources that must be released on every exit
//! path, not just the happy one.

use core::ops::Deref;

use crate::mm::{frame_allocator, PhysicalAddress};

/// Owns one physical frame and returns it to [`frame_allocator`] when
/// dropped.
pub struct FrameGuard {
    frame: PhysicalAddress,
}

impl FrameGuard {
    pub fn new(frame: PhysicalAddress) -> Self {
        Self { frame }
    }

    pub fn addr(&self) -> PhysicalAddress {
        self.frame
    }

    /// Releases ownership of the frame without freeing it.
    pub fn leak(self) -> PhysicalAddress {
        let frame = self.frame;
        core::mem::forget(self);
        frame
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        // SAFETY: this guard is the frame's sole owner; nothing else holds
        // a mapping to it once the guard is dropped.
        unsafe { frame_allocator::free(self.frame) };
    }
}

impl Deref for FrameGuard {
    type Target = PhysicalAddress;

    fn deref(&self) -> &Self::Target {
        &self.frame
    }
}

/// Generic scope guard that runs cleanup code on drop.
pub struct ScopeGuard<F: FnOnce()> {
    cleanup: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    pub fn new(cleanup: F) -> Self {
        Self { cleanup: Some(cleanup) }
    }

    /// Cancels the cleanup — useful once a fallible sequence reaches the
    /// point where every resource it was guarding has a new, permanent
    /// owner.
    pub fn cancel(mut self) {
        self.cleanup = None;
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_guard_runs_on_drop() {
        let mut cleaned = false;
        {
            let _guard = ScopeGuard::new(|| {
                cleaned = true;
            });
        }
        assert!(cleaned);
    }

    #[test]
    fn scope_guard_cancel_skips_cleanup() {
        let mut cleaned = false;
        {
            let guard = ScopeGuard::new(|| {
                cleaned = true;
            });
            guard.cancel();
        }
        assert!(!cleaned);
    }
}
