//! Counting semaphore over `Mutex` + `Condvar`.
//!
//! Workers block in [`Semaphore::wait`] until a job (or the stop
//! request) posts a permit. Lock poisoning is ignored: the protected
//! state is a plain counter that cannot be left inconsistent.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

pub struct Semaphore {
    permits: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    pub fn new(initial: usize) -> Self {
        Self {
            permits: Mutex::new(initial),
            condvar: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.permits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until a permit is available, then take it.
    pub fn wait(&self) {
        let mut permits = self.lock();
        while *permits == 0 {
            permits = self
                .condvar
                .wait(permits)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *permits -= 1;
    }

    /// Release one permit, waking one waiter.
    pub fn post(&self) {
        *self.lock() += 1;
        self.condvar.notify_one();
    }

    /// Release `n` permits at once.
    pub fn post_many(&self, n: usize) {
        *self.lock() += n;
        self.condvar.notify_all();
    }
}
