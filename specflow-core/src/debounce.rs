//! Trailing-edge debouncer keyed by entity id
//!
//! `arm` schedules an action to run after a quiet period. Arming the same key
//! again replaces the pending action and restarts the clock, so a steady stream
//! of arms runs nothing until it stops. Once the delay has elapsed the action
//! is detached from its key: re-arming or cancelling no longer affects it, but
//! it is counted as running until it completes.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct Slot {
    ticket: u64,
    handle: JoinHandle<()>,
}

type Slots = Arc<Mutex<HashMap<String, Slot>>>;

/// Decrements the running count when a fired action ends, however it ends
struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct Debouncer {
    slots: Slots,
    next_ticket: AtomicU64,
    running: Arc<AtomicUsize>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `action` after `delay` unless `key` is armed again or cancelled first.
    ///
    /// Returns false, scheduling nothing, when called outside a Tokio runtime.
    pub fn arm<F>(&self, key: impl Into<String>, delay: Duration, action: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let Ok(runtime) = Handle::try_current() else {
            warn!(%key, "No async runtime, debounced action dropped");
            return false;
        };
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        let slots = Arc::clone(&self.slots);
        let running = Arc::clone(&self.running);
        let task_key = key.clone();

        // Hold the map while spawning so the task can't look itself up
        // before it has been inserted.
        let mut guard = lock(&self.slots);
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let _running = {
                let mut slots = lock(&slots);
                match slots.get(&task_key) {
                    Some(slot) if slot.ticket == ticket => {
                        // Counted before the slot goes, so `is_idle` never
                        // sees a gap between armed and running.
                        running.fetch_add(1, Ordering::SeqCst);
                        slots.remove(&task_key);
                        RunningGuard(running)
                    }
                    _ => return,
                }
            };
            debug!(key = %task_key, ticket, "Debounced action fired");
            action.await;
        });

        if let Some(previous) = guard.insert(key.clone(), Slot { ticket, handle }) {
            previous.handle.abort();
            debug!(%key, ticket, "Debounce re-armed");
        }
        true
    }

    /// Cancels the pending action for `key`. Returns false if nothing was pending.
    pub fn cancel(&self, key: &str) -> bool {
        match lock(&self.slots).remove(key) {
            Some(slot) => {
                slot.handle.abort();
                true
            }
            None => false,
        }
    }

    /// True while an action for `key` is waiting out its delay
    pub fn is_armed(&self, key: &str) -> bool {
        lock(&self.slots).contains_key(key)
    }

    pub fn armed_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.slots).keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of fired actions that have not completed yet
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// True when nothing is armed and no fired action is still running
    pub fn is_idle(&self) -> bool {
        let slots = lock(&self.slots);
        slots.is_empty() && self.running.load(Ordering::SeqCst) == 0
    }

    pub fn cancel_all(&self) {
        for (_, slot) in lock(&self.slots).drain() {
            slot.handle.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

fn lock(slots: &Mutex<HashMap<String, Slot>>) -> MutexGuard<'_, HashMap<String, Slot>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}
