use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

/// A reentrant mutex where priority acquisitions jump ahead of any waiting
/// normal-mode acquisitions, so a latency-sensitive caller (e.g. a resize or
/// input-flush path) is never starved behind a backlog of routine lockers.
///
/// Grounded on the source terminal's `helpers::PriorityLock`: a thread-id
/// tracked, depth-counted lock with the same two acquisition modes. That
/// lock wraps a raw OS mutex directly; this reimplementation wraps the
/// protected value behind a `parking_lot::Mutex` + `Condvar` pair instead,
/// since Rust has no equivalent of manually detaching a `unique_lock` from
/// its mutex.
pub struct PriorityLock<T> {
    data: UnsafeCell<T>,
    state: Mutex<State>,
    released: Condvar,
    priority_requests: AtomicU32,
}

struct State {
    owner: Option<ThreadId>,
    depth: u32,
}

unsafe impl<T: Send> Send for PriorityLock<T> {}
unsafe impl<T: Send> Sync for PriorityLock<T> {}

impl<T> PriorityLock<T> {
    pub fn new(data: T) -> Self {
        Self {
            data: UnsafeCell::new(data),
            state: Mutex::new(State {
                owner: None,
                depth: 0,
            }),
            released: Condvar::new(),
            priority_requests: AtomicU32::new(0),
        }
    }

    /// Acquire in normal mode. Waits behind any pending priority requests,
    /// even ones made after this call started waiting.
    pub fn lock(&self) -> PriorityLockGuard<'_, T> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner != Some(me) {
            while self.priority_requests.load(Ordering::Acquire) > 0 || state.owner.is_some() {
                self.released.wait(&mut state);
            }
            state.owner = Some(me);
        }
        state.depth += 1;
        PriorityLockGuard { lock: self }
    }

    /// Acquire in priority mode. Registers intent before blocking, so any
    /// normal-mode caller already waiting yields the lock to this one first.
    pub fn priority_lock(&self) -> PriorityLockGuard<'_, T> {
        self.priority_requests.fetch_add(1, Ordering::AcqRel);
        let me = thread::current().id();
        let mut state = self.state.lock();
        if state.owner != Some(me) {
            while state.owner.is_some() {
                self.released.wait(&mut state);
            }
            state.owner = Some(me);
        }
        self.priority_requests.fetch_sub(1, Ordering::AcqRel);
        state.depth += 1;
        PriorityLockGuard { lock: self }
    }

    fn unlock(&self) {
        let mut state = self.state.lock();
        debug_assert_eq!(state.owner, Some(thread::current().id()));
        debug_assert!(state.depth > 0);
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.released.notify_all();
        }
    }
}

/// RAII guard returned by [`PriorityLock::lock`] / [`PriorityLock::priority_lock`].
///
/// Reentrant acquisition means two guards on the same thread may coexist.
/// `DerefMut` is provided for the common case of a single live guard per
/// thread at a time; a caller that reenters the lock and holds two guards
/// simultaneously must not mutate through both at once -- the same
/// discipline the source's raw-mutex-based `PriorityLock` already demands of
/// its callers, just not checked by the type system here either.
pub struct PriorityLockGuard<'a, T> {
    lock: &'a PriorityLock<T>,
}

impl<'a, T> Deref for PriorityLockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for PriorityLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for PriorityLockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn reentrant_lock_on_same_thread_does_not_deadlock() {
        let lock = PriorityLock::new(42u32);
        let outer = lock.lock();
        let inner = lock.lock();
        assert_eq!(*outer, 42);
        assert_eq!(*inner, 42);
    }

    #[test]
    fn priority_lock_is_serviced_before_queued_normal_lock() {
        let lock = Arc::new(PriorityLock::new(AtomicUsize::new(0)));
        let order = Arc::new(Mutex::new(Vec::<&'static str>::new()));

        // Hold the lock on the main thread so both contenders queue up.
        let holder = lock.lock();

        let lock2 = Arc::clone(&lock);
        let order2 = Arc::clone(&order);
        let normal = thread::spawn(move || {
            let _g = lock2.lock();
            order2.lock().push("normal");
        });
        // Give the normal-mode thread time to start waiting first.
        thread::sleep(Duration::from_millis(20));

        let lock3 = Arc::clone(&lock);
        let order3 = Arc::clone(&order);
        let priority = thread::spawn(move || {
            let _g = lock3.priority_lock();
            order3.lock().push("priority");
        });
        thread::sleep(Duration::from_millis(20));

        drop(holder);
        normal.join().unwrap();
        priority.join().unwrap();

        let order = order.lock();
        assert_eq!(order.as_slice(), &["priority", "normal"]);
    }
}
