//! A writer-preferring reader/writer lock.
//!
//! Grounded in zerolib's `storage.locks.Lock`, which achieves writer
//! preference with three raw semaphores acting as a turnstile in front of
//! a counting read lock. That trick relies on a semaphore being released
//! from a different thread than the one that acquired it, which
//! `std::sync::Mutex` deliberately doesn't allow; this reaches the same
//! guarantee (a waiting writer blocks every reader that arrives after it,
//! so writers can never be starved by a steady stream of readers) with a
//! single state `Mutex` and a `Condvar` instead.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard};

struct State {
    readers: usize,
    writer: bool,
    waiting_writers: usize,
}

pub struct RwLock<T> {
    state: Mutex<State>,
    cond: Condvar,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    pub fn new(data: T) -> Self {
        RwLock {
            state: Mutex::new(State {
                readers: 0,
                writer: false,
                waiting_writers: 0,
            }),
            cond: Condvar::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// Blocks until no writer holds or is waiting for the lock, then takes
    /// a shared read slot.
    pub fn read(&self) -> ReadGuard<'_, T> {
        let mut state = self.state.lock().unwrap();
        while state.writer || state.waiting_writers > 0 {
            state = self.cond.wait(state).unwrap();
        }
        state.readers += 1;
        drop(state);
        ReadGuard { lock: self }
    }

    /// Registers as a waiting writer immediately (so it blocks any reader
    /// that tries to start after it), then blocks until every current
    /// reader and writer has finished.
    pub fn write(&self) -> WriteGuard<'_, T> {
        let mut state = self.state.lock().unwrap();
        state.waiting_writers += 1;
        while state.writer || state.readers > 0 {
            state = self.cond.wait(state).unwrap();
        }
        state.waiting_writers -= 1;
        state.writer = true;
        drop(state);
        WriteGuard { lock: self }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

pub struct ReadGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<'a, T> Deref for ReadGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> Drop for ReadGuard<'a, T> {
    fn drop(&mut self) {
        let mut state = self.lock.lock_state();
        state.readers -= 1;
        if state.readers == 0 {
            drop(state);
            self.lock.cond.notify_all();
        }
    }
}

pub struct WriteGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<'a, T> Deref for WriteGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for WriteGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for WriteGuard<'a, T> {
    fn drop(&mut self) {
        let mut state = self.lock.lock_state();
        state.writer = false;
        drop(state);
        self.lock.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn concurrent_reads_see_consistent_value() {
        let lock = RwLock::new(42);
        let a = lock.read();
        let b = lock.read();
        assert_eq!(*a, 42);
        assert_eq!(*b, 42);
    }

    #[test]
    fn write_then_read_sees_the_update() {
        let lock = RwLock::new(0);
        {
            let mut guard = lock.write();
            *guard = 7;
        }
        assert_eq!(*lock.read(), 7);
    }

    /// A writer that starts waiting while a reader still holds the lock
    /// must block every reader that shows up after it, or a steady stream
    /// of readers could starve it forever. Scoped threads (`crossbeam::scope`)
    /// let every thread borrow `lock` directly, no `Arc` needed.
    #[test]
    fn waiting_writer_blocks_new_readers() {
        let lock = RwLock::new(0);
        let writer_started = AtomicUsize::new(0);
        let late_reader_done = AtomicUsize::new(0);

        let first_read = lock.read();

        crossbeam::scope(|scope| {
            scope.spawn(|_| {
                writer_started.store(1, Ordering::SeqCst);
                let mut guard = lock.write();
                *guard = 99;
            });

            while writer_started.load(Ordering::SeqCst) == 0 {
                thread::yield_now();
            }
            thread::sleep(Duration::from_millis(20));

            scope.spawn(|_| {
                let _guard = lock.read();
                late_reader_done.store(1, Ordering::SeqCst);
            });

            thread::sleep(Duration::from_millis(20));
            assert_eq!(late_reader_done.load(Ordering::SeqCst), 0);

            drop(first_read);
        })
        .unwrap();

        assert_eq!(late_reader_done.load(Ordering::SeqCst), 1);
    }
}
