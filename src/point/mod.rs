//! Pooled measurement points.
//!
//! A [`Point`] is a reusable record handed out by a [`PointFactory`]. Tag
//! and field data are escaped and encoded into the point's scratch buffers
//! eagerly as they are set, so serializing a drained point into the
//! transmission buffer is a handful of `memcpy`s. Scratch capacity is
//! retained across reuse: once the pool is warm, writing points allocates
//! nothing.

use std::{io::Write, sync::Arc, time::SystemTime};

use thiserror::Error;

use crate::{
    buffers::{BatchBuf, DidntWrite},
    codec,
    protocol::Precision,
};

pub(crate) mod pool;

pub use pool::{AcquireError, PointFactory, PointFactoryBuilder};

/// Errors that can occur when serializing a point into a batch.
#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum SerializeError {
    /// The point has no fields. The line protocol requires at least one
    /// field per record, so the point cannot be encoded.
    #[error("point has no fields")]
    NoFields,

    /// The serialized record did not fit in the remaining buffer capacity.
    #[error("point exceeds remaining buffer capacity")]
    Overflow,
}

impl From<DidntWrite> for SerializeError {
    fn from(_: DidntWrite) -> Self {
        Self::Overflow
    }
}

/// Byte range of one encoded `key=value` tag entry inside the tag scratch.
#[derive(Debug, Clone, Copy)]
struct TagEntry {
    start: u32,
    key_len: u32,
    len: u32,
}

/// Reusable storage behind a [`Point`].
///
/// Owned by the pool between acquisitions; the buffers keep their capacity
/// when cleared.
#[derive(Debug, Default)]
pub(crate) struct PointInner {
    measurement: Vec<u8>,
    tags: Vec<u8>,
    tag_index: Vec<TagEntry>,
    fields: Vec<u8>,
    timestamp: Option<i64>,
}

impl PointInner {
    fn set_measurement(&mut self, measurement: &str) {
        codec::escape_measurement_into(&mut self.measurement, measurement);
    }

    pub(crate) fn clear(&mut self) {
        self.measurement.clear();
        self.tags.clear();
        self.tag_index.clear();
        self.fields.clear();
        self.timestamp = None;
    }
}

/// One measurement to be written to the destination.
///
/// Points are acquired from a [`PointFactory`] and submitted to a
/// [`Client`](crate::Client). Dropping a point on any path, whether it was
/// transmitted, rejected by a full queue, or failed to serialize, returns
/// its storage to the pool exactly once.
///
/// # Examples
///
/// ```no_run
/// # async fn example(factory: &fluxline::PointFactory) {
/// let mut point = factory.create_point("cpu").await;
/// point
///     .tag("host", "web01")
///     .field_f64("usage", 0.93)
///     .field_i64("cores", 16)
///     .timestamp_now();
/// # }
/// ```
#[derive(Debug)]
pub struct Point {
    inner: Option<Box<PointInner>>,
    pool: Arc<pool::PoolShared>,
}

impl Point {
    pub(crate) fn new(pool: Arc<pool::PoolShared>, mut inner: Box<PointInner>, measurement: &str) -> Self {
        inner.set_measurement(measurement);
        Self {
            inner: Some(inner),
            pool,
        }
    }

    fn inner_mut(&mut self) -> &mut PointInner {
        // The slot is only vacated by Drop.
        self.inner.as_mut().expect("point storage already released")
    }

    /// Adds a tag. Tags are emitted in key-sorted order when the point is
    /// serialized, regardless of insertion order.
    pub fn tag(&mut self, key: &str, value: &str) -> &mut Self {
        let inner = self.inner_mut();
        let start = inner.tags.len();
        codec::escape_key_into(&mut inner.tags, key);
        let key_len = inner.tags.len() - start;
        inner.tags.push(b'=');
        codec::escape_key_into(&mut inner.tags, value);
        inner.tag_index.push(TagEntry {
            start: start as u32,
            key_len: key_len as u32,
            len: (inner.tags.len() - start) as u32,
        });
        self
    }

    /// Adds a float field.
    pub fn field_f64(&mut self, key: &str, value: f64) -> &mut Self {
        let inner = self.field_key(key);
        codec::write_f64_into(&mut inner.fields, value);
        self
    }

    /// Adds an integer field.
    pub fn field_i64(&mut self, key: &str, value: i64) -> &mut Self {
        let inner = self.field_key(key);
        codec::write_i64_into(&mut inner.fields, value);
        self
    }

    /// Adds a boolean field.
    pub fn field_bool(&mut self, key: &str, value: bool) -> &mut Self {
        let inner = self.field_key(key);
        codec::write_bool_into(&mut inner.fields, value);
        self
    }

    /// Adds a string field.
    pub fn field_string(&mut self, key: &str, value: &str) -> &mut Self {
        let inner = self.field_key(key);
        codec::write_string_field_into(&mut inner.fields, value);
        self
    }

    /// Sets the timestamp as nanoseconds since the Unix epoch.
    ///
    /// The value is converted into the destination precision when the point
    /// is serialized. Points without a timestamp are stamped by the
    /// destination on arrival.
    pub fn timestamp(&mut self, epoch_nanos: i64) -> &mut Self {
        self.inner_mut().timestamp = Some(epoch_nanos);
        self
    }

    /// Sets the timestamp from the system clock.
    pub fn timestamp_now(&mut self) -> &mut Self {
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        self.timestamp(nanos)
    }

    fn field_key(&mut self, key: &str) -> &mut PointInner {
        let inner = self.inner_mut();
        if !inner.fields.is_empty() {
            inner.fields.push(b',');
        }
        codec::escape_key_into(&mut inner.fields, key);
        inner.fields.push(b'=');
        inner
    }

    /// Serializes this point as one line-protocol record at the buffer's
    /// current position, converting the timestamp into `precision` units.
    ///
    /// On failure the buffer may hold a partial record; the caller rewinds
    /// to its pre-call mark.
    pub(crate) fn serialize_into(&mut self, buf: &mut BatchBuf, precision: Precision) -> Result<(), SerializeError> {
        let inner = self.inner.as_mut().expect("point storage already released");

        if inner.fields.is_empty() {
            return Err(SerializeError::NoFields);
        }

        let tags = &inner.tags;
        inner
            .tag_index
            .sort_unstable_by(|a, b| tags[a.key_range()].cmp(&tags[b.key_range()]));

        buf.write_exact(&inner.measurement)?;
        for entry in &inner.tag_index {
            buf.write_exact(b",")?;
            buf.write_exact(&tags[entry.range()])?;
        }
        buf.write_exact(b" ")?;
        buf.write_exact(&inner.fields)?;
        if let Some(ts) = inner.timestamp {
            write!(buf, " {}", precision.convert(ts)).map_err(|_| SerializeError::Overflow)?;
        }
        buf.write_exact(b"\n")?;
        Ok(())
    }
}

impl TagEntry {
    fn key_range(&self) -> std::ops::Range<usize> {
        self.start as usize..(self.start + self.key_len) as usize
    }

    fn range(&self) -> std::ops::Range<usize> {
        self.start as usize..(self.start + self.len) as usize
    }
}

impl Drop for Point {
    fn drop(&mut self) {
        if let Some(mut inner) = self.inner.take() {
            inner.clear();
            self.pool.release(inner);
        }
    }
}
