//! Client handle and builder.
//!
//! A [`Client`] is a handle onto a shared per-destination write pipeline.
//! [`write()`](Client::write) hands a point to the pipeline's queue and
//! returns immediately; a background flush task owns serialization and
//! transmission. Building a client validates credentials against the
//! destination before any pipeline or task is created.

use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use async_mutex::Mutex;
use thiserror::Error;

use super::registry::{DestinationKey, Registry};
use crate::{
    net::{self, HttpTransmitter, TransmitError},
    pipeline::{
        self,
        flush::{FlushConfig, Pipeline, WriteError},
    },
    point::Point,
    protocol::{Consistency, Precision, Transport},
    sync::AtomicDuration,
};

/// Minimum allowed auto-flush period.
const MIN_AUTO_FLUSH_PERIOD: Duration = Duration::from_millis(100);

/// Errors that can occur when building a [`Client`].
#[derive(Debug, Error)]
pub enum BuildError {
    /// No database name was configured. The destination requires one for
    /// every write.
    #[error("'database' must be specified")]
    MissingDatabase,

    /// No username was configured.
    #[error("'username' must be specified")]
    MissingUsername,

    /// The configured auto-flush period is below the supported minimum.
    /// Very short periods degrade into a busy loop on the flush task.
    #[error("auto flush period must be at least 100ms")]
    FlushPeriodTooShort,

    /// The UDP transport is accepted by the configuration surface but has
    /// no implementation behind it.
    #[error("the udp transport is not supported")]
    UnsupportedTransport,

    /// The host name cannot be used as a TLS server name (HTTPS only).
    #[error("'{host}' is not a valid tls server name")]
    InvalidHost {
        /// The rejected host name.
        host: String,
    },

    /// The destination rejected the configured credentials. No pipeline or
    /// background task was created.
    #[error("access denied to database '{database}' for user '{username}'")]
    AccessDenied {
        /// Database the build targeted.
        database: String,
        /// Username the destination rejected.
        username: String,
    },

    /// Credential validation could not complete: the destination was
    /// unreachable or answered with a status the client does not handle.
    #[error("credential validation failed")]
    Validation(#[source] TransmitError),
}

/// Handle onto a shared write pipeline for one destination.
///
/// Clients built with identical destination parameters against the same
/// [`Registry`] share a single queue, flush task, and transmitter. The
/// handle itself is not cloneable; build another one instead.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use fluxline::{Client, PointFactory, Registry};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = Registry::new();
/// let client = Client::builder()
///     .connection("localhost", 8086, fluxline::Transport::Http)
///     .database("metrics")
///     .username("ingest")
///     .password("hunter2")
///     .auto_flush_period(Duration::from_millis(500))
///     .build(&registry)
///     .await?;
///
/// let factory = PointFactory::builder().build();
/// let mut point = factory.create_point("cpu").await;
/// point.tag("host", "web01").field_f64("usage", 0.93).timestamp_now();
/// client.write(point)?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    pipeline: Arc<Pipeline>,
    registry: Registry,
    key: DestinationKey,
    connect_timeout: Arc<AtomicDuration>,
    admin: Mutex<HttpTransmitter>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// Returns a builder with default connection parameters.
    pub fn builder() -> ClientBuilder {
        ClientBuilder {
            host: "localhost".to_owned(),
            port: 8086,
            transport: Transport::DEFAULT,
            database: None,
            username: None,
            password: String::new(),
            retention_policy: "autogen".to_owned(),
            consistency: Consistency::DEFAULT,
            precision: Precision::DEFAULT,
            auto_flush_period: Duration::from_secs(1),
            queue_capacity: 65_536,
            connect_timeout: net::DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Submits a point to the destination's write queue.
    ///
    /// Never blocks: the point is either queued or rejected immediately.
    /// Queued points are batched and transmitted by the background flush
    /// task within one auto-flush period. Rejected points return their
    /// storage to the pool.
    ///
    /// # Errors
    ///
    /// - [`WriteError::QueueFull`]: the queue is at capacity
    /// - [`WriteError::Closed`]: the shared pipeline has been closed
    pub fn write(&self, point: Point) -> Result<(), WriteError> {
        self.pipeline.offer(point)
    }

    /// Whether the shared pipeline has been closed by any handle.
    pub fn is_closed(&self) -> bool {
        self.pipeline.is_closed()
    }

    /// Adjusts the connect timeout used for subsequent batch transmissions
    /// and admin queries.
    ///
    /// Default: 5 seconds. Shared with every handle of this destination.
    pub fn set_connect_timeout(&self, timeout: Duration) {
        self.connect_timeout.store(timeout, Ordering::Relaxed);
    }

    /// Creates a database on the destination.
    pub async fn create_database(&self, name: &str) -> Result<(), TransmitError> {
        let q = format!("create+database+{}", urlencoding::encode(name));
        let status = self.admin.lock().await.query("POST", &q).await?;
        if status > 299 {
            return Err(TransmitError::UnexpectedStatus(status));
        }
        Ok(())
    }

    /// Closes the shared pipeline.
    ///
    /// The destination is removed from the registry and the flush loop is
    /// signaled to stop; this does not return until the background task has
    /// fully exited. Closing is not reference counted: other handles of the
    /// same destination observe [`WriteError::Closed`] afterwards.
    ///
    /// Points still queued when the loop observes the signal are discarded
    /// without transmission. Callers that need the tail of their data on
    /// the wire should pause one auto-flush period before closing.
    pub async fn close(self) {
        self.registry.remove(&self.key, &self.pipeline);
        self.pipeline.shutdown().await;
    }
}

/// Builder for a [`Client`].
///
/// All parameters except `database` and `username` have defaults. The same
/// builder configuration built twice against one [`Registry`] yields two
/// handles sharing one pipeline.
pub struct ClientBuilder {
    host: String,
    port: u16,
    transport: Transport,
    database: Option<String>,
    username: Option<String>,
    password: String,
    retention_policy: String,
    consistency: Consistency,
    precision: Precision,
    auto_flush_period: Duration,
    queue_capacity: usize,
    connect_timeout: Duration,
}

impl ClientBuilder {
    /// Sets the destination address and transport.
    ///
    /// Default: `localhost:8086` over HTTP.
    #[must_use]
    pub fn connection(mut self, host: &str, port: u16, transport: Transport) -> Self {
        self.host = host.to_owned();
        self.port = port;
        self.transport = transport;
        self
    }

    /// Sets the target database. Required.
    #[must_use]
    pub fn database(mut self, database: &str) -> Self {
        self.database = Some(database.to_owned());
        self
    }

    /// Sets the username presented to the destination. Required.
    #[must_use]
    pub fn username(mut self, username: &str) -> Self {
        self.username = Some(username.to_owned());
        self
    }

    /// Sets the password presented to the destination.
    ///
    /// Default: empty.
    #[must_use]
    pub fn password(mut self, password: &str) -> Self {
        self.password = password.to_owned();
        self
    }

    /// Sets the retention policy written to.
    ///
    /// Default: `"autogen"`
    #[must_use]
    pub fn retention_policy(mut self, retention_policy: &str) -> Self {
        self.retention_policy = retention_policy.to_owned();
        self
    }

    /// Sets the destination-side write consistency level.
    ///
    /// Default: [`Consistency::One`]
    #[must_use]
    pub fn consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Sets the timestamp precision points are serialized with.
    ///
    /// Default: [`Precision::Nanosecond`]
    #[must_use]
    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Sets the interval between flushes when the queue is idle.
    ///
    /// Default: 1 second. Minimum: 100 milliseconds.
    ///
    /// A queued point reaches the wire within one period plus scheduling
    /// slop. Shorter periods lower ingestion latency at the cost of more,
    /// smaller batches.
    #[must_use]
    pub fn auto_flush_period(mut self, period: Duration) -> Self {
        self.auto_flush_period = period;
        self
    }

    /// Sets the write queue capacity.
    ///
    /// Default: 65536 points, rounded up to a power of two.
    ///
    /// The capacity bounds how many points can be awaiting a flush before
    /// submissions fail with [`WriteError::QueueFull`].
    #[must_use]
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the initial connect timeout for transmissions and admin
    /// queries.
    ///
    /// Default: 5 seconds. Tunable later via
    /// [`Client::set_connect_timeout`].
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builds the client, validating the configuration and the credentials.
    ///
    /// Validation issues a synchronous query against the destination before
    /// any pipeline is registered: a rejected credential aborts the build
    /// with [`BuildError::AccessDenied`] and no background task is started.
    pub async fn build(self, registry: &Registry) -> Result<Client, BuildError> {
        let database = self.database.clone().ok_or(BuildError::MissingDatabase)?;
        let username = self.username.clone().ok_or(BuildError::MissingUsername)?;
        if self.auto_flush_period < MIN_AUTO_FLUSH_PERIOD {
            return Err(BuildError::FlushPeriodTooShort);
        }
        if self.transport == Transport::Udp {
            return Err(BuildError::UnsupportedTransport);
        }

        let connect_timeout = Arc::new(AtomicDuration::new(self.connect_timeout));
        let mut validator = self.transmitter(&database, &username, connect_timeout.clone())?;

        // Credential check before any pipeline exists.
        let status = validator
            .query("GET", &urlencoding::encode("SHOW DATABASES"))
            .await
            .map_err(BuildError::Validation)?;
        if status == 401 {
            return Err(BuildError::AccessDenied { database, username });
        }
        if status >= 300 {
            return Err(BuildError::Validation(TransmitError::UnexpectedStatus(status)));
        }

        let transmitter = self.transmitter(&database, &username, connect_timeout.clone())?;
        let flush_config = FlushConfig {
            auto_flush_period: self.auto_flush_period,
            precision: self.precision,
            queue_capacity: self.queue_capacity,
            buffer_capacity: pipeline::send_buffer_size() - pipeline::BUFFER_HEADROOM,
            max_point_size: pipeline::max_point_size(),
        };

        let key = DestinationKey {
            host: self.host.clone(),
            port: self.port,
            transport: self.transport,
            database: database.clone(),
            retention_policy: self.retention_policy.clone(),
            consistency: self.consistency,
            precision: self.precision,
        };

        let pipeline = registry.get_or_create(key.clone(), {
            let connect_timeout = connect_timeout.clone();
            move || Pipeline::spawn(transmitter, flush_config, connect_timeout)
        });

        // Adopt the pipeline's timeout handle: when this build joined an
        // existing pipeline, tuning must reach the transmitter already
        // running, not the one just discarded.
        let connect_timeout = pipeline.connect_timeout();
        let admin = self.transmitter(&database, &username, connect_timeout.clone())?;

        Ok(Client {
            pipeline,
            registry: registry.clone(),
            key,
            connect_timeout,
            admin: Mutex::new(admin),
        })
    }

    /// Creates the configured database on the destination, then builds the
    /// client.
    ///
    /// Creation failures are deliberately ignored; anything fatal resurfaces
    /// as a validation error during the build itself.
    pub async fn create(self, registry: &Registry) -> Result<Client, BuildError> {
        if let (Some(database), Some(username)) = (self.database.clone(), self.username.clone()) {
            if self.transport != Transport::Udp {
                let connect_timeout = Arc::new(AtomicDuration::new(self.connect_timeout));
                if let Ok(mut tx) = self.transmitter(&database, &username, connect_timeout) {
                    let q = format!("create+database+{}", urlencoding::encode(&database));
                    let _ = tx.query("POST", &q).await;
                }
            }
        }
        self.build(registry).await
    }

    fn transmitter(
        &self,
        database: &str,
        username: &str,
        connect_timeout: Arc<AtomicDuration>,
    ) -> Result<HttpTransmitter, BuildError> {
        let base = format!(
            "db={}&u={}&p={}",
            urlencoding::encode(database),
            urlencoding::encode(username),
            urlencoding::encode(&self.password),
        );
        let write_target = format!(
            "/write?{base}&consistency={}&precision={}&rp={}",
            self.consistency,
            self.precision,
            urlencoding::encode(&self.retention_policy),
        );
        let query_target = format!("/query?{base}");

        HttpTransmitter::new(
            self.transport,
            &self.host,
            self.port,
            write_target,
            query_target,
            connect_timeout,
        )
        .map_err(|e| BuildError::InvalidHost { host: e.0 })
    }
}
