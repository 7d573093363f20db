//! Point pooling.
//!
//! The factory keeps a lock-free free list of recycled point storage and
//! lazily allocates new storage up to its configured size. Acquisition from
//! an exhausted pool waits until another point is released; releases happen
//! automatically when a [`Point`] is dropped.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use crossbeam_queue::ArrayQueue;
use event_listener::Event;
use thiserror::Error;

use super::{Point, PointInner};

/// Errors that can occur when acquiring a point from the pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AcquireError {
    /// The pool is fully allocated and no point was released within the
    /// requested wait.
    ///
    /// This means point production is outrunning the flush pipeline for a
    /// sustained period. It is fatal to the acquiring call; the caller
    /// decides whether to retry, shed load, or grow the pool.
    #[error("timed out waiting for a free point; pool size {size} exhausted")]
    Exhausted {
        /// Configured pool size.
        size: usize,
    },
}

#[derive(Debug)]
pub(crate) struct PoolShared {
    /// Recycled storage, pushed back on point drop.
    free: ArrayQueue<Box<PointInner>>,
    /// Number of storages allocated so far (up to `size`).
    allocated: AtomicUsize,
    /// Maximum number of storages that can be allocated.
    size: usize,
    /// Signaled once per release to wake a blocked acquirer.
    available: Event,
}

impl PoolShared {
    /// Non-blocking acquisition: a recycled storage if one is free,
    /// otherwise a fresh allocation while below the size limit.
    fn try_acquire(&self) -> Option<Box<PointInner>> {
        if let Some(inner) = self.free.pop() {
            return Some(inner);
        }

        let mut allocated = self.allocated.load(Ordering::Acquire);
        while allocated < self.size {
            match self
                .allocated
                .compare_exchange_weak(allocated, allocated + 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Some(Box::new(PointInner::default())),
                Err(n) => allocated = n,
            }
        }
        None
    }

    async fn acquire(&self) -> Box<PointInner> {
        loop {
            if let Some(inner) = self.try_acquire() {
                return inner;
            }

            let listener = self.available.listen();

            // A release may have slipped in between the failed pop and the
            // listener registration.
            if let Some(inner) = self.try_acquire() {
                return inner;
            }

            listener.await;
        }
    }

    pub(crate) fn release(&self, inner: Box<PointInner>) {
        // Cannot fail: the queue capacity equals the allocation limit.
        let _ = self.free.push(inner);
        self.available.notify(1);
    }
}

/// Factory of reusable [`Point`] instances.
///
/// The factory is cheaply cloneable and shared across producer tasks. Its
/// backing storage is released when the last clone and the last outstanding
/// point are dropped.
///
/// # Examples
///
/// ```no_run
/// # async fn example() {
/// let factory = fluxline::PointFactory::builder().size(1024).build();
/// let mut point = factory.create_point("cpu").await;
/// point.field_f64("usage", 0.42);
/// # }
/// ```
#[derive(Clone)]
pub struct PointFactory {
    shared: Arc<PoolShared>,
}

impl PointFactory {
    /// Returns a builder with the default pool size.
    pub fn builder() -> PointFactoryBuilder {
        PointFactoryBuilder { size: 512 }
    }

    /// Acquires a point for the given measurement, waiting as long as it
    /// takes for one to become available.
    pub async fn create_point(&self, measurement: &str) -> Point {
        let inner = self.shared.acquire().await;
        Point::new(self.shared.clone(), inner, measurement)
    }

    /// Acquires a point for the given measurement, waiting at most
    /// `timeout` for one to become available.
    pub async fn create_point_timeout(&self, measurement: &str, timeout: Duration) -> Result<Point, AcquireError> {
        match tokio::time::timeout(timeout, self.shared.acquire()).await {
            Ok(inner) => Ok(Point::new(self.shared.clone(), inner, measurement)),
            Err(_) => Err(AcquireError::Exhausted {
                size: self.shared.size,
            }),
        }
    }

    /// Configured pool size.
    pub fn size(&self) -> usize {
        self.shared.size
    }
}

/// Builder for a [`PointFactory`].
pub struct PointFactoryBuilder {
    size: usize,
}

impl PointFactoryBuilder {
    /// Sets the maximum number of points the pool may allocate.
    ///
    /// Default: 512
    ///
    /// Allocation is lazy: the pool grows on demand up to this size, then
    /// recycles. The size bounds both memory usage and the number of points
    /// that can be in flight (held by producers or queued) at once.
    #[must_use]
    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Builds the factory.
    #[must_use]
    pub fn build(self) -> PointFactory {
        assert!(self.size > 0, "pool size must be non-zero");
        PointFactory {
            shared: Arc::new(PoolShared {
                free: ArrayQueue::new(self.size),
                allocated: AtomicUsize::new(0),
                size: self.size,
                available: Event::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lazy_allocation_and_recycling() {
        let factory = PointFactory::builder().size(2).build();
        assert_eq!(factory.shared.allocated.load(Ordering::Acquire), 0);

        let a = factory.create_point("a").await;
        let b = factory.create_point("b").await;
        assert_eq!(factory.shared.allocated.load(Ordering::Acquire), 2);

        drop(a);
        drop(b);

        // Reacquisition reuses the released storage without allocating more.
        let _c = factory.create_point("c").await;
        assert_eq!(factory.shared.allocated.load(Ordering::Acquire), 2);
    }

    #[tokio::test]
    async fn test_exhausted_pool_times_out() {
        let factory = PointFactory::builder().size(1).build();
        let held = factory.create_point("held").await;

        let err = factory
            .create_point_timeout("blocked", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err, AcquireError::Exhausted { size: 1 });

        drop(held);
        factory
            .create_point_timeout("ok", Duration::from_millis(20))
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_release_wakes_blocked_acquirer() {
        let factory = PointFactory::builder().size(1).build();
        let held = factory.create_point("held").await;

        let f = factory.clone();
        let waiter = tokio::spawn(async move { f.create_point("waited").await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);

        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_release_discipline_on_every_path() {
        // Dropping a point always returns its storage, whether or not it
        // was ever serialized.
        let factory = PointFactory::builder().size(1).build();

        let untouched = factory.create_point("a").await;
        drop(untouched);

        let mut failed = factory.create_point("b").await;
        let mut buf = crate::buffers::BatchBuf::with_capacity(1);
        failed.field_i64("f", 1);
        assert!(
            failed
                .serialize_into(&mut buf, crate::protocol::Precision::Nanosecond)
                .is_err()
        );
        drop(failed);

        // Storage for both came from the same single slot.
        assert_eq!(factory.shared.allocated.load(Ordering::Acquire), 1);
        factory
            .create_point_timeout("c", Duration::from_millis(20))
            .await
            .unwrap();
    }
}
