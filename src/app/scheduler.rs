use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::app::error::AppError;

/// Counting semaphore bounding how many devices are driven at once.
pub struct GlobalSemaphore {
    limit: usize,
    used: Mutex<usize>,
    cv: Condvar,
}

impl GlobalSemaphore {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            used: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    pub fn acquire(self: &Arc<Self>) -> GlobalPermit {
        // the counter stays consistent even if a holder panicked
        let mut used = self.used.lock().unwrap_or_else(PoisonError::into_inner);
        while *used >= self.limit {
            used = self.cv.wait(used).unwrap_or_else(PoisonError::into_inner);
        }
        *used += 1;
        GlobalPermit {
            semaphore: Arc::clone(self),
        }
    }

    fn release(&self) {
        let mut used = self.used.lock().unwrap_or_else(PoisonError::into_inner);
        *used = used.saturating_sub(1);
        self.cv.notify_one();
    }
}

pub struct GlobalPermit {
    semaphore: Arc<GlobalSemaphore>,
}

impl Drop for GlobalPermit {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

/// Per-device mutual exclusion plus a global concurrency cap.
///
/// Commands hold the device lock from dump capture until their last gesture, so nothing
/// else can touch the same device in between.
pub struct TaskScheduler {
    global: Arc<GlobalSemaphore>,
    device_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TaskScheduler {
    pub fn new(global_limit: usize) -> Self {
        Self {
            global: Arc::new(GlobalSemaphore::new(global_limit)),
            device_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn acquire_global(&self) -> GlobalPermit {
        self.global.acquire()
    }

    pub fn device_lock(&self, serial: &str) -> Arc<Mutex<()>> {
        let mut guard = self
            .device_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard
            .entry(serial.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs `work` while holding a global permit and the lock for `serial`.
    pub fn run_exclusive<T>(
        &self,
        serial: &str,
        trace_id: &str,
        work: impl FnOnce() -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let _permit = self.acquire_global();
        let lock = self.device_lock(serial);
        let _guard: MutexGuard<'_, ()> = lock.lock().map_err(|_| {
            warn!(trace_id = %trace_id, serial = %serial, "device lock poisoned");
            AppError::system("Failed to access the device. Please try again.", trace_id)
        })?;
        work()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn track(running: &AtomicUsize, max_running: &AtomicUsize) {
        let current = running.fetch_add(1, Ordering::SeqCst) + 1;
        max_running.fetch_max(current, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(15));
        running.fetch_sub(1, Ordering::SeqCst);
    }

    #[test]
    fn global_semaphore_limits_concurrency() {
        let scheduler = Arc::new(TaskScheduler::new(2));
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));

        let handles = (0..8)
            .map(|i| {
                let scheduler = Arc::clone(&scheduler);
                let running = Arc::clone(&running);
                let max_running = Arc::clone(&max_running);
                thread::spawn(move || {
                    scheduler
                        .run_exclusive(&format!("device-{i}"), "trace", || {
                            track(&running, &max_running);
                            Ok(())
                        })
                        .expect("run");
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().expect("join");
        }

        assert!(max_running.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn run_exclusive_serializes_same_device() {
        let scheduler = Arc::new(TaskScheduler::new(8));
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));

        let handles = (0..6)
            .map(|_| {
                let scheduler = Arc::clone(&scheduler);
                let running = Arc::clone(&running);
                let max_running = Arc::clone(&max_running);
                thread::spawn(move || {
                    scheduler
                        .run_exclusive("device-1", "trace", || {
                            track(&running, &max_running);
                            Ok(())
                        })
                        .expect("run");
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().expect("join");
        }

        assert_eq!(max_running.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn poisoned_device_lock_is_reported() {
        let scheduler = Arc::new(TaskScheduler::new(2));
        let lock = scheduler.device_lock("ABC");
        let _ = thread::spawn(move || {
            let _guard = lock.lock().expect("lock");
            panic!("poison the lock");
        })
        .join();

        let err = scheduler
            .run_exclusive("ABC", "trace-poison", || Ok(()))
            .expect_err("expected poisoned lock");
        assert_eq!(err.trace_id, "trace-poison");
        assert!(scheduler.run_exclusive("XYZ", "trace-ok", || Ok(1)).is_ok());
    }
}
