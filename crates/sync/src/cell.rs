//! Mutex-guarded mutable state shared across concurrent tasks.

use std::sync::Arc;

use tokio::sync::Mutex;

/// One mutable value behind a single critical section.
///
/// `with` is the atomic read-modify-write primitive: the closure gets a
/// mutable reference and its return value is handed back to the caller, with
/// the lock released on every exit path (including a panic inside the
/// closure). Not re-entrant: calling back into the same cell from inside
/// `with` is unsupported and will deadlock.
pub struct SharedCell<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for SharedCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send> SharedCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    /// Atomically read and modify the value, returning a caller-chosen result.
    pub async fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock().await;
        f(&mut guard)
    }

    /// Snapshot the current value.
    pub async fn get(&self) -> T
    where
        T: Clone,
    {
        self.inner.lock().await.clone()
    }

    /// Replace the current value.
    pub async fn set(&self, value: T) {
        *self.inner.lock().await = value;
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for SharedCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.try_lock() {
            Ok(guard) => f.debug_tuple("SharedCell").field(&*guard).finish(),
            Err(_) => f.write_str("SharedCell(<locked>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn with_returns_closure_result() {
        let cell = SharedCell::new(41);
        let doubled = cell.with(|v| {
            *v += 1;
            *v * 2
        })
        .await;
        assert_eq!(doubled, 84);
        assert_eq!(cell.get().await, 42);
    }

    #[tokio::test]
    async fn get_and_set() {
        let cell = SharedCell::new(String::from("a"));
        cell.set(String::from("b")).await;
        assert_eq!(cell.get().await, "b");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let cell = SharedCell::new(0u64);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cell = cell.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    cell.with(|v| *v += 1).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cell.get().await, 800);
    }
}
