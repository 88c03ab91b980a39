//! Weak observation of an owner's lifetime
//!
//! A [`Lifeline`] is held by the owner of some resource. Pending work holds an
//! [`Observer`], which never keeps the owner alive and reports whether the
//! owner is still around and has not retired. Completions of deferred work are
//! routed through [`Observer::deliver`] so they are dropped once the owner is
//! gone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

#[derive(Debug, Default)]
struct LifeState {
    retired: AtomicBool,
}

/// Owner side of the token
#[derive(Debug, Default)]
pub struct Lifeline {
    state: Arc<LifeState>,
}

/// Weak side of the token
#[derive(Clone, Debug)]
pub struct Observer {
    state: Weak<LifeState>,
}

impl Lifeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an observer of this lifeline
    pub fn observe(&self) -> Observer {
        Observer {
            state: Arc::downgrade(&self.state),
        }
    }

    /// Mark the owner as retired; observers stop delivering
    pub fn retire(&self) {
        self.state.retired.store(true, Ordering::Release);
    }

    pub fn is_retired(&self) -> bool {
        self.state.retired.load(Ordering::Acquire)
    }
}

impl Observer {
    /// Whether the owner still exists and has not retired
    pub fn is_live(&self) -> bool {
        self.state
            .upgrade()
            .map(|state| !state.retired.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Run `f` only while the owner is live
    pub fn deliver<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if self.is_live() {
            Some(f())
        } else {
            None
        }
    }
}
