//! Streaming primitives for incremental turn rendering.
//!
//! [`Emitter`] is a write-once-per-update, read-many cell for a value that
//! changes over time and is eventually finalized (generation flag, partial
//! answer text, collapse flag). [`UiStream`] is the append-only sequence of
//! renderable fragments making up one visible conversation turn.
//!
//! Both fail loudly on mutation after `done()` — silently dropping a late
//! update would hide turn-termination bugs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::error::{Error, Result};
use crate::ui::UiFragment;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Emitter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A broadcast cell: observers always see the latest value, and new
/// observers joining after finalization see the final value synchronously.
#[derive(Clone)]
pub struct Emitter<T> {
    inner: Arc<EmitterInner<T>>,
}

struct EmitterInner<T> {
    tx: watch::Sender<T>,
    finalized: AtomicBool,
}

impl<T: Clone + Send + Sync + 'static> Emitter<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            inner: Arc::new(EmitterInner {
                tx,
                finalized: AtomicBool::new(false),
            }),
        }
    }

    /// Replace the current value and notify all observers.
    pub fn update(&self, value: T) -> Result<()> {
        if self.is_done() {
            return Err(Error::Finalized("emitter"));
        }
        self.inner.tx.send_replace(value);
        Ok(())
    }

    /// Final update; the value is immutable afterwards.
    pub fn done(&self, value: T) -> Result<()> {
        if self.inner.finalized.swap(true, Ordering::SeqCst) {
            return Err(Error::Finalized("emitter"));
        }
        self.inner.tx.send_replace(value);
        Ok(())
    }

    /// Finalize with the current value unchanged.
    pub fn done_with_current(&self) -> Result<()> {
        if self.inner.finalized.swap(true, Ordering::SeqCst) {
            return Err(Error::Finalized("emitter"));
        }
        // Wake observers so they can observe the finalized state.
        self.inner.tx.send_replace(self.latest());
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.inner.finalized.load(Ordering::SeqCst)
    }

    pub fn latest(&self) -> T {
        self.inner.tx.borrow().clone()
    }

    /// A receiver whose first borrow is the latest value (final value if
    /// already finalized), followed by every later update.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.inner.tx.subscribe()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// UiStream
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One ordered change to a [`UiStream`].
#[derive(Debug, Clone)]
pub enum UiUpdate {
    Append(UiFragment),
    /// Replaces the *entire* current output with one fragment.
    ReplaceAll(UiFragment),
    Done,
}

/// Ordered, observable sequence of renderable fragments for one turn.
#[derive(Clone)]
pub struct UiStream {
    inner: Arc<Mutex<UiStreamInner>>,
}

struct UiStreamInner {
    fragments: Vec<UiFragment>,
    done: bool,
    observers: Vec<mpsc::UnboundedSender<UiUpdate>>,
}

impl UiStream {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(UiStreamInner {
                fragments: Vec::new(),
                done: false,
                observers: Vec::new(),
            })),
        }
    }

    /// Add a fragment to the end, visible to observers immediately.
    pub fn append(&self, fragment: UiFragment) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.done {
            return Err(Error::Finalized("ui stream"));
        }
        inner.fragments.push(fragment.clone());
        broadcast(&mut inner, UiUpdate::Append(fragment));
        Ok(())
    }

    /// Replace the entire current output with a single fragment (clearing
    /// a spinner, swapping a whole panel).
    pub fn replace_all(&self, fragment: UiFragment) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.done {
            return Err(Error::Finalized("ui stream"));
        }
        inner.fragments.clear();
        inner.fragments.push(fragment.clone());
        broadcast(&mut inner, UiUpdate::ReplaceAll(fragment));
        Ok(())
    }

    /// Finalize. No further append/replace is permitted.
    pub fn done(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.done {
            return Err(Error::Finalized("ui stream"));
        }
        inner.done = true;
        broadcast(&mut inner, UiUpdate::Done);
        inner.observers.clear();
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.inner.lock().done
    }

    /// Snapshot of the current fragment list.
    pub fn fragments(&self) -> Vec<UiFragment> {
        self.inner.lock().fragments.clone()
    }

    /// Subscribe to updates. Catches a late joiner up by replaying the
    /// current fragments as appends (and `Done` if already finalized)
    /// before any live update is delivered.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<UiUpdate> {
        let mut inner = self.inner.lock();
        let (tx, rx) = mpsc::unbounded_channel();
        for fragment in &inner.fragments {
            let _ = tx.send(UiUpdate::Append(fragment.clone()));
        }
        if inner.done {
            let _ = tx.send(UiUpdate::Done);
        } else {
            inner.observers.push(tx);
        }
        rx
    }
}

impl Default for UiStream {
    fn default() -> Self {
        Self::new()
    }
}

fn broadcast(inner: &mut UiStreamInner, update: UiUpdate) {
    inner.observers.retain(|tx| tx.send(update.clone()).is_ok());
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
