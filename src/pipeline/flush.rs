use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_mutex::Mutex;
use thiserror::Error;
use tokio::{select, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use super::{
    LOCAL_EPOCH,
    ringbuf::{RingBufferReader, RingBufferWriter, ringbuffer},
};
use crate::{buffers::BatchBuf, net::Transmit, point::Point, protocol::Precision, sync::AtomicDuration};

/// Cycle remainders at or below this threshold are not worth parking for;
/// the loop runs the next cycle immediately instead.
pub(crate) const SCHEDULING_SLOP: Duration = Duration::from_micros(10);

/// Errors that can occur when submitting a point to the write pipeline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WriteError {
    /// The write queue is at capacity and the point was rejected.
    ///
    /// The point is not retried internally and its storage returns to the
    /// pool; whether to drop, log, or back off is the producer's decision.
    /// This fail-fast behavior bounds both memory usage and producer
    /// latency: a submission never blocks on the flush pipeline.
    ///
    /// A sustained stream of these errors means point production is
    /// outrunning what the flush loop can drain and transmit per cycle.
    #[error("point queue overflow; exceeded capacity of {capacity}")]
    QueueFull {
        /// Fixed capacity of the write queue.
        capacity: usize,
    },

    /// The pipeline has been closed.
    ///
    /// Closing is shared: once any handle of a destination closes the
    /// pipeline, every other handle observes this error. A new client must
    /// be built to resume writing.
    #[error("pipeline closed")]
    Closed,
}

/// Parameters of one destination's flush loop, fixed at pipeline creation.
pub(crate) struct FlushConfig {
    /// Interval between flushes when the queue is idle.
    pub(crate) auto_flush_period: Duration,
    /// Timestamp precision points are serialized with.
    pub(crate) precision: Precision,
    /// Capacity of the write queue (rounded up to a power of two).
    pub(crate) queue_capacity: usize,
    /// Capacity of the transmission buffer.
    pub(crate) buffer_capacity: usize,
    /// Draining stops once remaining buffer capacity falls below this, so a
    /// point never overflows mid-batch.
    pub(crate) max_point_size: usize,
}

/// One destination's write pipeline: the shared queue, the background flush
/// task, and the shutdown coordination around them.
///
/// Shared by every client handle built for the same destination key.
pub(crate) struct Pipeline {
    queue: RingBufferWriter<Point>,
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    /// Connect timeout of this destination's transmitter, shared so every
    /// handle tunes the same knob.
    connect_timeout: Arc<AtomicDuration>,
}

impl Pipeline {
    /// Creates the queue and spawns the flush task for one destination.
    pub(crate) fn spawn<T: Transmit>(
        transmitter: T,
        config: FlushConfig,
        connect_timeout: Arc<AtomicDuration>,
    ) -> Arc<Self> {
        let capacity = config.queue_capacity.next_power_of_two().max(2);
        let (writer, reader) = ringbuffer(capacity);

        let token = CancellationToken::new();
        let handle = tokio::spawn(flush_loop(reader, transmitter, config, token.clone()));

        Arc::new(Self {
            queue: writer,
            token,
            task: Mutex::new(Some(handle)),
            closed: AtomicBool::new(false),
            connect_timeout,
        })
    }

    /// Shared handle to the destination's connect timeout.
    pub(crate) fn connect_timeout(&self) -> Arc<AtomicDuration> {
        self.connect_timeout.clone()
    }

    /// Non-blocking submission; fails immediately on a full queue.
    pub(crate) fn offer(&self, point: Point) -> Result<(), WriteError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WriteError::Closed);
        }

        match self.queue.push(point) {
            None => Ok(()),
            // The rejected point is dropped here, returning its storage to
            // the pool.
            Some(_rejected) => Err(WriteError::QueueFull {
                capacity: self.queue.capacity(),
            }),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Signals the flush loop to stop and waits for it to exit.
    ///
    /// The first caller performs the shutdown; concurrent and later calls
    /// return immediately. Points still queued when the loop observes the
    /// signal are discarded without transmission.
    pub(crate) async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.token.cancel();
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
    }
}

/// The background flush loop of one destination.
///
/// Each cycle drains queued points into the transmission buffer and sends
/// whatever was written as a single batch. Idle cycles park until the next
/// flush deadline; the timer (or shutdown) is the only wakeup, a producer
/// enqueuing a point does not wake the loop.
async fn flush_loop<T: Transmit>(
    mut queue: RingBufferReader<Point>,
    mut transmitter: T,
    config: FlushConfig,
    token: CancellationToken,
) {
    let mut buffer = BatchBuf::with_capacity(config.buffer_capacity);

    while !token.is_cancelled() {
        let start = LOCAL_EPOCH.elapsed();

        // Drain until the queue runs dry or the buffer can no longer be
        // guaranteed to hold one more point.
        while buffer.remaining() > config.max_point_size {
            let Some(mut point) = queue.pull() else { break };

            let mark = buffer.mark();
            if let Err(e) = point.serialize_into(&mut buffer, config.precision) {
                buffer.rewind(mark);
                tracing::warn!(error = %e, "dropping point that failed to serialize");
            }
            // The point is dropped here, releasing its storage to the pool
            // whether or not serialization succeeded.
        }

        if !buffer.is_empty() {
            if let Err(e) = transmitter.send(buffer.as_slice()).await {
                tracing::warn!(error = %e, bytes = buffer.len(), "batch transmission failed; batch discarded");
            }
            // The next cycle starts from a clean buffer regardless of the
            // transmission outcome, and runs immediately to drain backlog.
            buffer.clear();
            continue;
        }

        let elapsed = LOCAL_EPOCH.elapsed().saturating_sub(start);
        let park = config.auto_flush_period.saturating_sub(elapsed);
        if park > SCHEDULING_SLOP {
            select! {
                () = tokio::time::sleep(park) => {}
                () = token.cancelled() => {}
            }
        }
    }

    // Points still queued at this moment are dropped with the queue reader,
    // releasing them to their pool without transmission.
}
