//! Fluxline: a high-throughput line-protocol ingestion client featuring
//! asynchronous batching, object pooling, and per-destination pipeline
//! sharing.
//!
//! Fluxline is designed for applications that emit time-series measurements
//! at high rate. Producers hand points to the client without blocking and
//! without per-write network round trips; a dedicated background task per
//! destination accumulates them into a reusable byte buffer and transmits
//! the batch as a single HTTP request. Points and buffers are pooled, so
//! the steady-state hot path performs no allocation.
//!
//! # Overview
//!
//! ```text
//!  APPLICATION                                            User code  :
//! ┌──────────┐ ┌──────────┐ ┌──────────┐                             :
//! │ task A   │ │ task B   │ │ task C   │   write(point)              :
//! └────┬─────┘ └────┬─────┘ └────┬─────┘                             :
//! ~~~~~▼~~~~~~~~~~~~▼~~~~~~~~~~~~▼~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~  :
//!  WRITE PIPELINE (one per destination)              Fluxline code   :
//! ┌───────────────────────────────────────────────────────────────┐  :
//! │  Write Queue (bounded, lock-free MPSC):  [P][P][P][P]....     │  :
//! │                         │                                     │  :
//! │                         ▼ drain on timer or size trigger      │  :
//! │  Flush Loop:  serialize → release point → repeat              │  :
//! │                         │                                     │  :
//! │  Batch Buffer: [line\n line\n line\n ...]                     │  :
//! │                         │                                     │  :
//! │  Transmitter:  POST /write  (Content-Length declared)         │  :
//! └─────────────────────────┬─────────────────────────────────────┘  :
//!                           ▼ Network                                :
//!                      Destination store                             :
//! ```
//!
//! Points travel through four stages. A producer acquires a [`Point`] from
//! a [`PointFactory`], fills it, and submits it with [`Client::write`]. The
//! submission is a single lock-free queue push; it either succeeds or fails
//! immediately with [`WriteError::QueueFull`], so a producer is never
//! blocked by a slow network. The background flush loop drains the queue into the
//! batch buffer once per flush period (sooner when the buffer fills),
//! releases each point back to its pool, and streams the batch to the
//! destination. A transmission failure discards that batch and the loop
//! moves on: delivery is best effort, at most once.
//!
//! Clients built with identical destination parameters against the same
//! [`Registry`] share one pipeline, so a process talking to one store runs
//! one flush task no matter how many handles it builds.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use fluxline::{Client, PointFactory, Registry, Transport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Registry::new();
//! let client = Client::builder()
//!     .connection("localhost", 8086, Transport::Http)
//!     .database("metrics")
//!     .username("ingest")
//!     .password("hunter2")
//!     .auto_flush_period(Duration::from_millis(500))
//!     .build(&registry)
//!     .await?;
//!
//! let factory = PointFactory::builder().size(1024).build();
//!
//! let mut point = factory.create_point("cpu").await;
//! point
//!     .tag("host", "web01")
//!     .field_f64("usage", 0.93)
//!     .field_i64("cores", 16)
//!     .timestamp_now();
//! client.write(point)?;
//!
//! // ... eventually:
//! client.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Tuning
//!
//! ## Flush Period
//!
//! Configure via [`ClientBuilder::auto_flush_period`] (default 1 s, minimum
//! 100 ms). A queued point reaches the wire within one period. Lower values
//! reduce ingestion latency but produce more, smaller batches; higher
//! values improve batching at the cost of staleness and a larger loss
//! window on shutdown.
//!
//! ## Queue Capacity
//!
//! Configure via [`ClientBuilder::queue_capacity`] (default 65536). When
//! producers outrun the flush loop the queue fills and writes fail fast
//! with [`WriteError::QueueFull`]; the capacity bounds both memory and the
//! burst size the pipeline absorbs. The queue never blocks a producer and
//! never grows.
//!
//! ## Pool Size
//!
//! Configure via [`PointFactoryBuilder::size`] (default 512). The pool
//! grows lazily to this size and then recycles; it bounds how many points
//! can be in flight (held by producers or queued) at once. Acquisition from
//! an exhausted pool waits for a release; this is the one place a producer
//! can wait.
//!
//! ## Buffer Limits
//!
//! The transmission buffer holds one batch (1 MiB send-buffer size minus
//! headroom; override with `FLUXLINE_SEND_BUFFER_SIZE`). Draining stops
//! early when the remaining capacity drops below the maximum serialized
//! point size (32 KiB; override with `FLUXLINE_MAX_POINT_SIZE`), cutting
//! the batch rather than overflowing mid-point.
//!
//! # Delivery semantics
//!
//! Fluxline is an ingestion pipeline, not a transactional log. Points
//! rejected by a full queue are dropped (the caller is told). Batches that
//! fail to transmit are dropped (logged, never retried). Points still
//! queued when a destination is closed are dropped without transmission.
//! Every dropped point returns its storage to the pool.

mod api;
mod buffers;
mod codec;
mod net;
mod pipeline;
mod point;
mod protocol;
mod sync;

pub use api::*;
pub use net::TransmitError;
pub use pipeline::flush::WriteError;
pub use point::{AcquireError, Point, PointFactory, PointFactoryBuilder};
pub use protocol::{Consistency, Precision, Transport};
