//! Watcher and worker pool
//!
//! Watch events feed the [`TaskQueue`]; a fixed pool of tasks drains it and
//! runs one pass per key. Status-only updates do not bump the generation and
//! are not queued, so writing status never triggers another pass.
//!
//! Every finished pass schedules a delayed requeue: a retry after a
//! retryable failure, otherwise a resync. Delayed requeues go straight to the
//! queue, past the generation check, so drift in owned objects is repaired
//! without a spec change.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::StreamExt;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client, ResourceExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ReconcileConfig;
use crate::crd::ClickHouseInstallation;

use super::queue::{InstallationKey, TaskQueue};
use super::worker::Worker;

/// Watcher timeout (seconds); must stay below the client read timeout
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Delay before a pass that failed with a retryable error runs again
pub const RETRY_DELAY: Duration = Duration::from_secs(30);

/// Latest observed version of every installation
#[derive(Default)]
pub struct InstallationCache {
    objects: DashMap<InstallationKey, Arc<ClickHouseInstallation>>,
}

impl InstallationCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `chi`; returns its key when it is new or its generation changed
    pub fn observe(&self, chi: ClickHouseInstallation) -> Option<InstallationKey> {
        let key = InstallationKey::new(chi.namespace().unwrap_or_default(), chi.name_any());
        let generation = chi.metadata.generation;
        let previous = self.objects.insert(key.clone(), Arc::new(chi));
        match previous {
            Some(previous) if previous.metadata.generation == generation => None,
            _ => Some(key),
        }
    }

    /// Drop a deleted installation
    pub fn remove(&self, key: &InstallationKey) {
        self.objects.remove(key);
    }

    /// Latest version of `key`
    pub fn get(&self, key: &InstallationKey) -> Option<Arc<ClickHouseInstallation>> {
        self.objects.get(key).map(|entry| entry.value().clone())
    }

    /// Number of cached installations
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Apply one watch event to the cache and the queue
pub fn handle_event(
    event: Event<ClickHouseInstallation>,
    cache: &InstallationCache,
    queue: &TaskQueue<InstallationKey>,
) {
    match event {
        Event::Apply(chi) | Event::InitApply(chi) => {
            let name = chi.name_any();
            match cache.observe(chi) {
                Some(key) => {
                    debug!(chi = %name, "installation changed");
                    queue.enqueue(key);
                }
                None => debug!(chi = %name, "generation unchanged"),
            }
        }
        Event::Delete(chi) => {
            let key = InstallationKey::new(chi.namespace().unwrap_or_default(), chi.name_any());
            info!(chi = %key, "installation deleted");
            cache.remove(&key);
            queue.forget(&key);
        }
        Event::Init | Event::InitDone => {
            debug!("watcher initialized");
        }
    }
}

async fn watch(
    api: Api<ClickHouseInstallation>,
    cache: Arc<InstallationCache>,
    queue: Arc<TaskQueue<InstallationKey>>,
    cancel: CancellationToken,
) {
    let stream = watcher::watcher(api, watcher::Config::default().timeout(WATCH_TIMEOUT_SECS))
        .default_backoff();
    tokio::pin!(stream);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = stream.next() => match event {
                Some(Ok(event)) => handle_event(event, &cache, &queue),
                Some(Err(e)) => warn!(error = %e, "watcher error, will retry"),
                None => break,
            },
        }
    }
    debug!("watcher stopped");
}

/// Delayed requeues, at most one live timer per key
#[derive(Default)]
pub struct DelayedRequeue {
    tickets: DashMap<InstallationKey, u64>,
}

impl DelayedRequeue {
    /// No pending requeues
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `key` after `delay`, superseding any earlier schedule for it
    pub fn schedule(
        self: &Arc<Self>,
        queue: Arc<TaskQueue<InstallationKey>>,
        key: InstallationKey,
        delay: Duration,
        cancel: CancellationToken,
    ) {
        let ticket = {
            let mut entry = self.tickets.entry(key.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        let this = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if this.is_current(&key, ticket) {
                        queue.enqueue(key);
                    }
                }
            }
        });
    }

    fn is_current(&self, key: &InstallationKey, ticket: u64) -> bool {
        self.tickets.get(key).is_some_and(|t| *t == ticket)
    }

    /// Drop the pending requeue of `key`
    pub fn forget(&self, key: &InstallationKey) {
        self.tickets.remove(key);
    }

    /// Keys with a pending requeue
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    /// True when nothing is scheduled
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}

/// Run one pass on its own task so a panic or timeout cannot leak the key.
/// Returns whether the pass should be retried.
async fn run_pass(
    worker: &Arc<Worker>,
    key: &InstallationKey,
    chi: Arc<ClickHouseInstallation>,
    config: &ReconcileConfig,
    cancel: &CancellationToken,
) -> bool {
    let pass = cancel.child_token();
    let task = {
        let worker = worker.clone();
        let pass = pass.clone();
        tokio::spawn(async move { worker.reconcile(&pass, &chi).await })
    };
    let abort = task.abort_handle();

    match tokio::time::timeout(config.pass_timeout(), task).await {
        Ok(Ok(Ok(report))) => {
            debug!(
                chi = %key,
                mutations = report.mutations(),
                failures = report.failures.len(),
                "pass finished"
            );
            report.failures.iter().any(|e| e.is_retryable())
        }
        Ok(Ok(Err(e))) => {
            error!(chi = %key, error = %e, "pass failed");
            e.is_retryable()
        }
        Ok(Err(join)) => {
            error!(chi = %key, error = %join, "pass aborted");
            true
        }
        Err(_) => {
            pass.cancel();
            abort.abort();
            warn!(chi = %key, timeout = ?config.pass_timeout(), "pass timed out");
            true
        }
    }
}

/// Drain the queue until it is closed
pub async fn run_worker(
    id: usize,
    worker: Arc<Worker>,
    queue: Arc<TaskQueue<InstallationKey>>,
    cache: Arc<InstallationCache>,
    requeue: Arc<DelayedRequeue>,
    config: ReconcileConfig,
    cancel: CancellationToken,
) {
    debug!(worker = id, "worker started");
    while let Some(key) = queue.next().await {
        let Some(chi) = cache.get(&key) else {
            debug!(chi = %key, "installation gone, nothing to do");
            requeue.forget(&key);
            queue.done(&key);
            continue;
        };
        if chi.metadata.deletion_timestamp.is_some() {
            debug!(chi = %key, "installation is being deleted");
            requeue.forget(&key);
            queue.done(&key);
            continue;
        }

        let retry = run_pass(&worker, &key, chi, &config, &cancel).await;
        queue.done(&key);

        if cancel.is_cancelled() {
            continue;
        }
        let delay = if retry {
            Some(RETRY_DELAY)
        } else {
            config.resync_interval()
        };
        if let Some(delay) = delay {
            debug!(chi = %key, ?delay, retry, "requeue scheduled");
            requeue.schedule(queue.clone(), key, delay, cancel.clone());
        }
    }
    debug!(worker = id, "worker stopped");
}

/// Watcher plus worker pool for one operator process
pub struct Runner {
    worker: Arc<Worker>,
    queue: Arc<TaskQueue<InstallationKey>>,
    cache: Arc<InstallationCache>,
    requeue: Arc<DelayedRequeue>,
    config: ReconcileConfig,
    watch_namespaces: Vec<String>,
}

impl Runner {
    /// Create a runner
    pub fn new(worker: Worker, config: ReconcileConfig, watch_namespaces: Vec<String>) -> Self {
        Self {
            worker: Arc::new(worker),
            queue: Arc::new(TaskQueue::new()),
            cache: Arc::new(InstallationCache::new()),
            requeue: Arc::new(DelayedRequeue::new()),
            config,
            watch_namespaces,
        }
    }

    /// Run until `shutdown` fires, then close the queue and cancel passes
    pub async fn run(self, client: Client, shutdown: CancellationToken) {
        let mut watchers = JoinSet::new();
        if self.watch_namespaces.is_empty() {
            info!("watching installations in all namespaces");
            watchers.spawn(watch(
                Api::all(client.clone()),
                self.cache.clone(),
                self.queue.clone(),
                shutdown.clone(),
            ));
        } else {
            for namespace in &self.watch_namespaces {
                info!(%namespace, "watching installations");
                watchers.spawn(watch(
                    Api::namespaced(client.clone(), namespace),
                    self.cache.clone(),
                    self.queue.clone(),
                    shutdown.clone(),
                ));
            }
        }

        let mut workers = JoinSet::new();
        for id in 0..self.config.workers {
            workers.spawn(run_worker(
                id,
                self.worker.clone(),
                self.queue.clone(),
                self.cache.clone(),
                self.requeue.clone(),
                self.config.clone(),
                shutdown.clone(),
            ));
        }
        info!(workers = self.config.workers, "worker pool started");

        shutdown.cancelled().await;
        info!("shutting down, closing task queue");
        self.queue.close();

        while workers.join_next().await.is_some() {}
        while watchers.join_next().await.is_some() {}
        info!("worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clickhouse::MockClusterAdmin;
    use crate::config::DefaultsConfig;
    use crate::controller::events::NoopEventPublisher;
    use crate::controller::objects::memory::MemoryStores;
    use crate::controller::objects::ObjectStore;
    use crate::controller::status::{MockStatusWriter, StatusWriter};
    use crate::crd::{
        ClickHouseInstallationSpec, ClickHouseInstallationStatus, ClusterSpec, Configuration,
    };
    use crate::generator::ClickHouseFilesGenerator;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chi(name: &str, generation: i64) -> ClickHouseInstallation {
        let mut chi = ClickHouseInstallation::new(
            name,
            ClickHouseInstallationSpec {
                configuration: Configuration {
                    clusters: vec![ClusterSpec {
                        name: "main".to_string(),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
                ..Default::default()
            },
        );
        chi.metadata.namespace = Some("ns".to_string());
        chi.metadata.generation = Some(generation);
        chi
    }

    #[test]
    fn status_only_update_is_not_queued() {
        let cache = InstallationCache::new();
        let queue = TaskQueue::new();

        handle_event(Event::InitApply(chi("demo", 1)), &cache, &queue);
        assert_eq!(queue.len(), 1);

        let mut with_status = chi("demo", 1);
        with_status.status = Some(Default::default());
        handle_event(Event::Apply(with_status), &cache, &queue);
        assert_eq!(queue.len(), 1);
        assert!(cache.get(&InstallationKey::new("ns", "demo")).unwrap().status.is_some());
    }

    #[tokio::test]
    async fn spec_change_is_queued_once() {
        let cache = InstallationCache::new();
        let queue = TaskQueue::new();
        handle_event(Event::Apply(chi("demo", 1)), &cache, &queue);
        let key = queue.next().await.unwrap();

        handle_event(Event::Apply(chi("demo", 2)), &cache, &queue);
        handle_event(Event::Apply(chi("demo", 3)), &cache, &queue);
        queue.done(&key);

        assert_eq!(queue.len(), 1);
        assert_eq!(
            cache.get(&key).unwrap().metadata.generation,
            Some(3),
            "later change wins"
        );
    }

    #[test]
    fn delete_forgets_pending_work() {
        let cache = InstallationCache::new();
        let queue = TaskQueue::new();
        handle_event(Event::Apply(chi("demo", 1)), &cache, &queue);

        handle_event(Event::Delete(chi("demo", 1)), &cache, &queue);

        assert!(queue.is_empty());
        assert!(cache.is_empty());
    }

    fn test_worker(memory: &MemoryStores, status: Arc<dyn StatusWriter>) -> Arc<Worker> {
        let mut admin = MockClusterAdmin::new();
        admin.expect_drop_dns_cache().returning(|_, _| Ok(()));
        admin.expect_forget_host().returning(|_| ());
        Arc::new(Worker::new(
            memory.stores(),
            status,
            Arc::new(NoopEventPublisher),
            Arc::new(admin),
            Arc::new(ClickHouseFilesGenerator),
            DefaultsConfig::default(),
        ))
    }

    fn ok_status() -> Arc<dyn StatusWriter> {
        let mut status = MockStatusWriter::new();
        status.expect_patch_status().returning(|_, _, _| Ok(()));
        Arc::new(status)
    }

    /// Panics on every write
    #[derive(Default)]
    struct ExplodingStatus {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StatusWriter for ExplodingStatus {
        async fn patch_status(
            &self,
            _namespace: &str,
            _name: &str,
            _status: &ClickHouseInstallationStatus,
        ) -> crate::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            panic!("status backend exploded")
        }
    }

    async fn eventually(mut check: impl FnMut() -> bool, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        while tokio::time::Instant::now() < deadline {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        check()
    }

    struct Pool {
        queue: Arc<TaskQueue<InstallationKey>>,
        cache: Arc<InstallationCache>,
        requeue: Arc<DelayedRequeue>,
        cancel: CancellationToken,
        handle: tokio::task::JoinHandle<()>,
    }

    fn spawn_pool(worker: Arc<Worker>, config: ReconcileConfig) -> Pool {
        let queue = Arc::new(TaskQueue::new());
        let cache = Arc::new(InstallationCache::new());
        let requeue = Arc::new(DelayedRequeue::new());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_worker(
            0,
            worker,
            queue.clone(),
            cache.clone(),
            requeue.clone(),
            config,
            cancel.clone(),
        ));
        Pool {
            queue,
            cache,
            requeue,
            cancel,
            handle,
        }
    }

    impl Pool {
        async fn stop(self) {
            self.queue.close();
            self.cancel.cancel();
            tokio::time::timeout(Duration::from_secs(1), self.handle)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn worker_drains_queue_and_stops_on_close() {
        let memory = MemoryStores::new();
        let pool = spawn_pool(test_worker(&memory, ok_status()), ReconcileConfig::default());

        handle_event(Event::Apply(chi("demo", 1)), &pool.cache, &pool.queue);

        let created = eventually(
            || memory.statefulsets.get_now("ns", "chi-demo-main-0-0").is_some(),
            Duration::from_secs(1),
        )
        .await;
        assert!(created);
        assert!(
            eventually(|| pool.requeue.len() == 1, Duration::from_secs(1)).await,
            "finished pass schedules a resync"
        );

        pool.stop().await;
    }

    #[tokio::test]
    async fn resync_repairs_drift_without_a_spec_change() {
        let memory = MemoryStores::new();
        let config = ReconcileConfig {
            resync_interval_secs: 1,
            ..Default::default()
        };
        let pool = spawn_pool(test_worker(&memory, ok_status()), config);
        handle_event(Event::Apply(chi("demo", 1)), &pool.cache, &pool.queue);
        let host_service = || memory.services.get_now("ns", "chi-demo-main-0-0").is_some();
        assert!(eventually(host_service, Duration::from_secs(1)).await);

        // Deleted out of band; the generation does not change
        memory
            .services
            .delete(&CancellationToken::new(), "ns", "chi-demo-main-0-0")
            .await
            .unwrap();
        assert!(!host_service());

        assert!(eventually(host_service, Duration::from_secs(3)).await);
        pool.stop().await;
    }

    #[tokio::test]
    async fn panicking_pass_releases_its_key() {
        let memory = MemoryStores::new();
        let status = Arc::new(ExplodingStatus::default());
        let pool = spawn_pool(test_worker(&memory, status.clone()), ReconcileConfig::default());
        let passes = || status.calls.load(Ordering::SeqCst);

        handle_event(Event::Apply(chi("demo", 1)), &pool.cache, &pool.queue);
        assert!(eventually(|| passes() == 1, Duration::from_secs(1)).await);

        // A spec change after the panic runs a fresh pass instead of parking
        handle_event(Event::Apply(chi("demo", 2)), &pool.cache, &pool.queue);
        assert!(eventually(|| passes() == 2, Duration::from_secs(1)).await);

        pool.stop().await;
    }

    #[tokio::test]
    async fn newer_schedule_supersedes_older_one() {
        let queue = Arc::new(TaskQueue::new());
        let requeue = Arc::new(DelayedRequeue::new());
        let cancel = CancellationToken::new();
        let key = InstallationKey::new("ns", "demo");

        requeue.schedule(queue.clone(), key.clone(), Duration::from_millis(20), cancel.clone());
        requeue.schedule(queue.clone(), key.clone(), Duration::from_millis(300), cancel.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(queue.is_empty(), "first timer was superseded");

        assert!(eventually(|| queue.len() == 1, Duration::from_secs(1)).await);
        assert_eq!(requeue.len(), 1);
    }

    #[tokio::test]
    async fn forgotten_key_is_not_requeued() {
        let queue = Arc::new(TaskQueue::new());
        let requeue = Arc::new(DelayedRequeue::new());
        let key = InstallationKey::new("ns", "gone");

        requeue.schedule(
            queue.clone(),
            key.clone(),
            Duration::from_millis(20),
            CancellationToken::new(),
        );
        requeue.forget(&key);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(queue.is_empty());
        assert!(requeue.is_empty());
    }
}
