use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    pipeline::flush::Pipeline,
    protocol::{Consistency, Precision, Transport},
};

/// Identity of a unique write target.
///
/// Two clients built with an identical key share exactly one write queue,
/// flush loop, and transmitter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct DestinationKey {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) transport: Transport,
    pub(crate) database: String,
    pub(crate) retention_policy: String,
    pub(crate) consistency: Consistency,
    pub(crate) precision: Precision,
}

/// Process-scoped registry of destination pipelines.
///
/// The registry deduplicates pipelines: building several clients with the
/// same destination parameters against the same registry yields handles
/// backed by a single background flush task. It is an explicit service
/// rather than a hidden global; construct one per process (or per test) and
/// pass it to [`ClientBuilder::build`](crate::ClientBuilder::build).
///
/// Cloning is cheap and clones observe the same registrations.
#[derive(Clone, Default)]
pub struct Registry {
    pipelines: Arc<DashMap<DestinationKey, Arc<Pipeline>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic get-or-create: concurrent first-time builds for the same key
    /// invoke `factory` exactly once, and every caller observes the winning
    /// pipeline.
    pub(crate) fn get_or_create(&self, key: DestinationKey, factory: impl FnOnce() -> Arc<Pipeline>) -> Arc<Pipeline> {
        self.pipelines.entry(key).or_insert_with(factory).clone()
    }

    /// Unregisters `pipeline` from `key`, unless the key was already
    /// re-registered to a newer pipeline by a later build.
    pub(crate) fn remove(&self, key: &DestinationKey, pipeline: &Arc<Pipeline>) {
        self.pipelines.remove_if(key, |_, v| Arc::ptr_eq(v, pipeline));
    }

    /// Number of live destination pipelines.
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;
    use crate::{
        net::{Transmit, TransmitError},
        pipeline::flush::FlushConfig,
        sync::AtomicDuration,
    };

    struct NullTransmitter;

    impl Transmit for NullTransmitter {
        async fn send(&mut self, _body: &[u8]) -> Result<(), TransmitError> {
            Ok(())
        }
    }

    fn key(database: &str) -> DestinationKey {
        DestinationKey {
            host: "localhost".to_owned(),
            port: 8086,
            transport: Transport::Http,
            database: database.to_owned(),
            retention_policy: "autogen".to_owned(),
            consistency: Consistency::One,
            precision: Precision::Nanosecond,
        }
    }

    fn spawn_pipeline() -> Arc<Pipeline> {
        Pipeline::spawn(
            NullTransmitter,
            FlushConfig {
                auto_flush_period: Duration::from_secs(1),
                precision: Precision::Nanosecond,
                queue_capacity: 16,
                buffer_capacity: 1024,
                max_point_size: 128,
            },
            Arc::new(AtomicDuration::new(Duration::from_secs(5))),
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_identical_keys_share_one_pipeline() {
        let registry = Registry::new();
        let created = AtomicUsize::new(0);

        let factory = || {
            created.fetch_add(1, Ordering::SeqCst);
            spawn_pipeline()
        };

        let a = registry.get_or_create(key("db"), factory);
        let b = registry.get_or_create(key("db"), factory);

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);

        a.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_distinct_keys_get_distinct_pipelines() {
        let registry = Registry::new();

        let a = registry.get_or_create(key("db1"), spawn_pipeline);
        let b = registry.get_or_create(key("db2"), spawn_pipeline);

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 2);

        a.shutdown().await;
        b.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_remove_ignores_replaced_pipelines() {
        let registry = Registry::new();

        let stale = registry.get_or_create(key("db"), spawn_pipeline);
        registry.remove(&key("db"), &stale);
        assert!(registry.is_empty());

        // Removing again with a handle that is no longer registered must
        // not disturb a newer registration.
        let fresh = registry.get_or_create(key("db"), spawn_pipeline);
        registry.remove(&key("db"), &stale);
        assert_eq!(registry.len(), 1);

        stale.shutdown().await;
        fresh.shutdown().await;
    }
}
