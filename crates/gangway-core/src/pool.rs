//! Process-wide object pool.
//!
//! Reusable request-scoped objects (buffers, parser state) come out of an
//! explicit pool with scoped acquisition: the guard returns its object to
//! the free list on drop, so a task that errors never leaks its instance.

use std::sync::Arc;

use parking_lot::Mutex;

/// A bounded free-list pool of reusable objects.
///
/// `acquire` pops a pooled instance or constructs a fresh one; the returned
/// guard hands the instance back on drop. The free list never grows past
/// the configured capacity — surplus instances are simply dropped.
///
/// # Example
///
/// ```rust
/// use gangway_core::Pool;
///
/// let pool: Pool<Vec<u8>> = Pool::new(4, Vec::new);
///
/// {
///     let mut buf = pool.acquire();
///     buf.extend_from_slice(b"scratch");
/// } // returned here
///
/// assert_eq!(pool.idle(), 1);
/// ```
pub struct Pool<T: Send + 'static> {
    inner: Arc<PoolInner<T>>,
}

struct PoolInner<T> {
    free: Mutex<Vec<T>>,
    init: Box<dyn Fn() -> T + Send + Sync>,
    capacity: usize,
}

impl<T: Send + 'static> Pool<T> {
    /// Creates a pool that holds at most `capacity` idle instances.
    #[must_use]
    pub fn new(capacity: usize, init: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::new()),
                init: Box::new(init),
                capacity,
            }),
        }
    }

    /// Acquires an instance, reusing a pooled one when available.
    #[must_use]
    pub fn acquire(&self) -> Pooled<T> {
        let value = self
            .inner
            .free
            .lock()
            .pop()
            .unwrap_or_else(|| (self.inner.init)());
        Pooled {
            value: Some(value),
            pool: Arc::clone(&self.inner),
        }
    }

    /// Returns the number of idle instances currently pooled.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.inner.free.lock().len()
    }
}

impl<T: Send + 'static> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.idle())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

/// Scoped handle to a pooled instance.
///
/// Dereferences to the instance; returns it to the pool on drop.
pub struct Pooled<T: Send + 'static> {
    value: Option<T>,
    pool: Arc<PoolInner<T>>,
}

impl<T: Send + 'static> std::ops::Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_ref().expect("pooled value taken")
    }
}

impl<T: Send + 'static> std::ops::DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().expect("pooled value taken")
    }
}

impl<T: Send + 'static> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            let mut free = self.pool.free.lock();
            if free.len() < self.pool.capacity {
                free.push(value);
            }
        }
    }
}
