//! The shared-address thread-park primitive behind wasm's
//! `atomic.wait`/`atomic.wake` instructions.
//!
//! Each "hot" address owns a reference-counted [`WaitList`] holding the wake
//! tokens of the threads parked on it, in registration order. A wait list
//! lives in the address table for exactly as long as its reference count is
//! at least one; teardown re-checks the count under the table lock because a
//! concurrent open may resurrect the entry between the decrement and the
//! lock acquisition.
//!
//! Lock ordering: the address-table mutex is acquired strictly before any
//! wait-list mutex, and never the other way around.

use std::cell::RefCell;
use std::collections::hash_map::{Entry, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

/// The outcome of a wait on a shared-memory address.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum WaitResult {
    /// The thread parked and was woken by another thread.
    Woken = 0,
    /// The value in memory did not match the expected value, so the thread
    /// never parked.
    Mismatch = 1,
    /// The thread parked and its deadline passed without a wake.
    TimedOut = 2,
}

/// A per-thread, auto-reset event used to park and unpark one thread.
///
/// Signaling leaves the event set until its owner consumes the signal by
/// waiting on it; a consuming wait resets it for reuse.
#[derive(Debug, Default)]
struct WakeEvent {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl WakeEvent {
    fn signal(&self) {
        *self.signaled.lock().unwrap() = true;
        self.condvar.notify_one();
    }

    /// Blocks until the event is signaled or `deadline` passes, whichever
    /// comes first. Consumes a pending signal even if the deadline is
    /// already in the past. Returns `false` on timeout.
    fn wait(&self, deadline: Option<Instant>) -> bool {
        let mut signaled = self.signaled.lock().unwrap();
        loop {
            if *signaled {
                *signaled = false;
                return true;
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (guard, _) = self.condvar.wait_timeout(signaled, deadline - now).unwrap();
                    signaled = guard;
                }
                None => signaled = self.condvar.wait(signaled).unwrap(),
            }
        }
    }
}

// One wake event per thread, created the first time the thread parks and
// torn down when the thread exits.
thread_local! {
    static WAKE_EVENT: RefCell<Option<Arc<WakeEvent>>> = const { RefCell::new(None) };
}

fn thread_wake_event() -> Arc<WakeEvent> {
    WAKE_EVENT.with(|slot| {
        slot.borrow_mut()
            .get_or_insert_with(|| Arc::new(WakeEvent::default()))
            .clone()
    })
}

/// The threads parked on one address, in registration order.
#[derive(Debug)]
struct WaitList {
    wake_events: Mutex<Vec<Arc<WakeEvent>>>,
    num_references: AtomicUsize,
}

impl WaitList {
    fn new() -> Self {
        Self {
            wake_events: Mutex::new(Vec::new()),
            num_references: AtomicUsize::new(1),
        }
    }
}

/// The per-runtime table mapping addresses to their live wait lists.
#[derive(Debug, Default)]
pub struct ParkingSpot {
    wait_lists: Mutex<HashMap<usize, Arc<WaitList>>>,
}

impl ParkingSpot {
    /// Atomically validates that `atomic == expected` with a `SeqCst` load
    /// and, if so, parks the current thread until it is notified on the
    /// cell's address or `deadline` passes. A `None` deadline parks forever.
    ///
    /// The check-then-park window is atomic with respect to [`Self::notify`]
    /// on the same address.
    pub fn wait32(
        &self,
        atomic: &AtomicU32,
        expected: u32,
        deadline: Option<Instant>,
    ) -> WaitResult {
        self.wait(
            atomic.as_ptr() as usize,
            || atomic.load(Ordering::SeqCst) == expected,
            deadline,
        )
    }

    /// Same as [`Self::wait32`], but for 64-bit cells.
    pub fn wait64(
        &self,
        atomic: &AtomicU64,
        expected: u64,
        deadline: Option<Instant>,
    ) -> WaitResult {
        self.wait(
            atomic.as_ptr() as usize,
            || atomic.load(Ordering::SeqCst) == expected,
            deadline,
        )
    }

    fn wait(
        &self,
        address: usize,
        validate: impl FnOnce() -> bool,
        deadline: Option<Instant>,
    ) -> WaitResult {
        let wait_list = self.open_wait_list(address);

        // The seq-cst reload under the wait-list lock is what makes the
        // check-then-park window atomic with respect to wakers.
        let mut wake_events = wait_list.wake_events.lock().unwrap();
        if !validate() {
            drop(wake_events);
            self.close_wait_list(address, wait_list);
            return WaitResult::Mismatch;
        }

        let wake_event = thread_wake_event();
        wake_events.push(wake_event.clone());
        drop(wake_events);

        log::trace!("parking on {address:#x} with deadline {deadline:?}");
        let mut timed_out = false;
        if !wake_event.wait(deadline) {
            let mut wake_events = wait_list.wake_events.lock().unwrap();
            if let Some(position) = wake_events
                .iter()
                .position(|event| Arc::ptr_eq(event, &wake_event))
            {
                // Still on the list: nobody woke this thread in time.
                wake_events.remove(position);
                timed_out = true;
            } else {
                // A waker removed the event between the deadline passing and
                // this thread reacquiring the lock, and is obliged to have
                // signaled it. Consume the latent signal with an immediately
                // expiring wait so the event is reset for its next use.
                if !wake_event.wait(Some(Instant::now())) {
                    fatal!("a wake event left its wait list without being signaled");
                }
            }
        }
        log::trace!("unparked from {address:#x}, timed_out = {timed_out}");

        self.close_wait_list(address, wait_list);
        if timed_out {
            WaitResult::TimedOut
        } else {
            WaitResult::Woken
        }
    }

    /// Notifies up to `count` threads parked on `address`, in registration
    /// order. `u32::MAX` means all of them. Returns how many were woken.
    pub fn notify(&self, address: usize, count: u32) -> u32 {
        if count == 0 {
            return 0;
        }

        let wait_list = self.open_wait_list(address);
        let num_woken = {
            let mut wake_events = wait_list.wake_events.lock().unwrap();
            let mut num_to_wake = count as usize;
            if count == u32::MAX || num_to_wake > wake_events.len() {
                num_to_wake = wake_events.len();
            }

            // Signal the events of the oldest waiting threads and remove
            // them from the list; each waiter owes its removal to us now.
            for wake_event in wake_events.drain(..num_to_wake) {
                wake_event.signal();
            }
            num_to_wake
        };
        self.close_wait_list(address, wait_list);

        log::trace!("woke {num_woken} waiters on {address:#x}");
        num_woken as u32
    }

    /// Returns `true` if no wait list is live, i.e. the primitive is
    /// quiescent.
    pub fn is_empty(&self) -> bool {
        self.wait_lists.lock().unwrap().is_empty()
    }

    /// Looks up or creates the wait list for `address`, incrementing its
    /// reference count. Every open must be paired with a
    /// [`Self::close_wait_list`]. The wait list's own mutex is not taken.
    fn open_wait_list(&self, address: usize) -> Arc<WaitList> {
        let mut wait_lists = self.wait_lists.lock().unwrap();
        match wait_lists.entry(address) {
            Entry::Occupied(entry) => {
                let wait_list = entry.get().clone();
                wait_list.num_references.fetch_add(1, Ordering::SeqCst);
                wait_list
            }
            Entry::Vacant(entry) => entry.insert(Arc::new(WaitList::new())).clone(),
        }
    }

    /// Drops one reference to `wait_list`, destroying it and erasing its
    /// table entry if this was the last one.
    fn close_wait_list(&self, address: usize, wait_list: Arc<WaitList>) {
        if wait_list.num_references.fetch_sub(1, Ordering::SeqCst) == 1 {
            let mut wait_lists = self.wait_lists.lock().unwrap();
            // Re-check under the table lock: a concurrent open may have
            // resurrected the entry since the decrement above, in which case
            // it stays.
            if wait_list.num_references.load(Ordering::SeqCst) == 0 {
                assert!(wait_list.wake_events.lock().unwrap().is_empty());
                // A racing closer may have torn the entry down already, and a
                // fresh list may even live at this address by now; only erase
                // our own entry.
                let still_ours = wait_lists
                    .get(&address)
                    .is_some_and(|list| Arc::ptr_eq(list, &wait_list));
                if still_ours {
                    wait_lists.remove(&address);
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn parked_count(&self, address: usize) -> usize {
        self.wait_lists
            .lock()
            .unwrap()
            .get(&address)
            .map_or(0, |list| list.wake_events.lock().unwrap().len())
    }
}
