//! Integration tests for metadata synchronization.
//!
//! These exercise the public API end to end: a local in-memory cache, a
//! report backend and the synchronization service wired together.

use async_trait::async_trait;
use metasync::{
    DefaultServiceInstance, DefinitionOutcome, DelegateReport, InMemoryMetadataService,
    LocalMetadataService, MemoryMetadataReport, MetadataIdentifier, MetadataRecord,
    MetadataReport, MetadataServiceCell, MetasyncError, MethodDescriptor, PublishOutcome,
    RegisteredService, RemoteMetadataService, ReportConfig, Result, RetryConfig, ServiceRegistry,
    ServiceUrl, Side, SkipReason, SqliteMetadataReport, SubscriberMetadataIdentifier,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Report wrapper counting calls, optionally slow on app publishes.
#[derive(Default)]
struct CountingReport {
    inner: MemoryMetadataReport,
    app_publishes: AtomicUsize,
    provider_stores: AtomicUsize,
    consumer_stores: AtomicUsize,
    publish_delay: Option<Duration>,
}

impl CountingReport {
    fn slow(delay: Duration) -> Self {
        Self {
            publish_delay: Some(delay),
            ..Self::default()
        }
    }

    fn total_stores(&self) -> usize {
        self.provider_stores.load(Ordering::SeqCst) + self.consumer_stores.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataReport for CountingReport {
    async fn publish_app_metadata(
        &self,
        id: &SubscriberMetadataIdentifier,
        record: &MetadataRecord,
    ) -> Result<()> {
        self.app_publishes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.publish_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.publish_app_metadata(id, record).await
    }

    async fn get_app_metadata(&self, id: &SubscriberMetadataIdentifier) -> Result<MetadataRecord> {
        self.inner.get_app_metadata(id).await
    }

    async fn store_provider_metadata(&self, id: &MetadataIdentifier, definition: &str) -> Result<()> {
        self.provider_stores.fetch_add(1, Ordering::SeqCst);
        self.inner.store_provider_metadata(id, definition).await
    }

    async fn store_consumer_metadata(&self, id: &MetadataIdentifier, parameters: &str) -> Result<()> {
        self.consumer_stores.fetch_add(1, Ordering::SeqCst);
        self.inner.store_consumer_metadata(id, parameters).await
    }

    async fn get_service_metadata(&self, id: &MetadataIdentifier) -> Result<String> {
        self.inner.get_service_metadata(id).await
    }
}

fn setup(report: Arc<CountingReport>) -> (Arc<InMemoryMetadataService>, RemoteMetadataService) {
    let local = Arc::new(InMemoryMetadataService::new("greeter-app"));
    let service = RemoteMetadataService::new(
        local.clone(),
        DelegateReport::new(report, RetryConfig::none()),
        ServiceRegistry::new(),
    );
    (local, service)
}

fn greeter_url() -> ServiceUrl {
    ServiceUrl::parse(
        "tri://10.0.0.7:20000/com.demo.Greeter?interface=com.demo.Greeter&version=1.0&side=provider",
    )
    .unwrap()
}

#[tokio::test]
async fn test_publish_is_idempotent() {
    let report = Arc::new(CountingReport::default());
    let (local, service) = setup(report.clone());
    local.export_url(&greeter_url()).unwrap();

    assert!(matches!(
        service.publish_metadata("greeter-app").await,
        PublishOutcome::Published { .. }
    ));
    for _ in 0..3 {
        assert!(matches!(
            service.publish_metadata("greeter-app").await,
            PublishOutcome::AlreadyReported
        ));
    }
    assert_eq!(report.app_publishes.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publish_does_not_double_publish() {
    let report = Arc::new(CountingReport::slow(Duration::from_millis(20)));
    let (local, service) = setup(report.clone());
    local.export_url(&greeter_url()).unwrap();
    let service = Arc::new(service);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.publish_metadata("greeter-app").await })
        })
        .collect();
    let outcomes: Vec<PublishOutcome> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let published = outcomes
        .iter()
        .filter(|o| matches!(o, PublishOutcome::Published { .. }))
        .count();
    assert_eq!(published, 1);
    assert_eq!(report.app_publishes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_revision_is_deterministic_across_instances() {
    let first = InMemoryMetadataService::new("greeter-app");
    let second = InMemoryMetadataService::new("greeter-app");
    let other = ServiceUrl::parse(
        "tri://10.0.0.7:20000/com.demo.Echo?interface=com.demo.Echo&side=provider",
    )
    .unwrap();

    first.export_url(&greeter_url()).unwrap();
    first.export_url(&other).unwrap();
    second.export_url(&other).unwrap();
    second.export_url(&greeter_url()).unwrap();

    let revision = first.info().calc_and_get_revision();
    assert_eq!(revision, second.info().calc_and_get_revision());
    assert_eq!(revision, first.info().calc_and_get_revision());
}

#[test]
fn test_identifier_stability() {
    let a = MetadataIdentifier::from_url(&greeter_url(), Side::Provider);
    let b = MetadataIdentifier::new("com.demo.Greeter", Some("1.0"), None, Side::Provider);
    assert_eq!(a, b);
    assert_eq!(a.identifier_key(), b.identifier_key());
    assert_eq!(a.identifier_key(), "com.demo.Greeter:1.0:dubbo:provider");

    let consumer = MetadataIdentifier::from_url(&greeter_url(), Side::Consumer);
    assert_ne!(a.identifier_key(), consumer.identifier_key());
}

#[tokio::test]
async fn test_generic_provider_is_skipped_without_store() {
    let report = Arc::new(CountingReport::default());
    let (_local, service) = setup(report.clone());
    let url = greeter_url().with_param("generic", "true");
    service.registry().register_for_url(
        &url,
        RegisteredService::new("GreeterImpl", vec![MethodDescriptor::new("SayHello")]),
    );

    let outcome = service.publish_service_definition(&url).await.unwrap();
    assert_eq!(outcome, DefinitionOutcome::Skipped(SkipReason::GenericInterface));

    let anonymous = ServiceUrl::new("tri", "10.0.0.7", Some(20000), "greeter")
        .with_param("side", "provider");
    let outcome = service.publish_service_definition(&anonymous).await.unwrap();
    assert_eq!(outcome, DefinitionOutcome::Skipped(SkipReason::EmptyInterface));

    assert_eq!(report.total_stores(), 0);
}

#[tokio::test]
async fn test_consumer_always_stores_every_param() {
    let report = Arc::new(CountingReport::default());
    let (_local, service) = setup(report.clone());
    // Unknown side values fall back to consumer.
    let url = ServiceUrl::parse(
        "tri://10.0.0.9/com.demo.Greeter?interface=com.demo.Greeter&side=observer&timeout=3000&generic=true",
    )
    .unwrap();

    let outcome = service.publish_service_definition(&url).await.unwrap();
    let DefinitionOutcome::Consumer(id) = outcome else {
        panic!("expected a consumer outcome");
    };
    assert_eq!(id.side, Side::Consumer);
    assert_eq!(report.consumer_stores.load(Ordering::SeqCst), 1);
    assert_eq!(report.provider_stores.load(Ordering::SeqCst), 0);

    let raw = report.inner.get_service_metadata(&id).await.unwrap();
    let stored: BTreeMap<String, String> = serde_json::from_str(&raw).unwrap();
    assert_eq!(&stored, url.params());
}

#[tokio::test]
async fn test_fetch_unknown_revision_is_not_found() {
    let (_local, service) = setup(Arc::new(CountingReport::default()));
    let instance = DefaultServiceInstance::new("greeter-app", "10.0.0.7", 20000)
        .with_revision("deadbeef");
    let err = service.get_metadata(&instance).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_metadata_visible_to_another_node() {
    let temp_dir = TempDir::new().unwrap();
    let address = format!("sqlite://{}", temp_dir.path().join("reports.db").display());

    let provider_local = Arc::new(InMemoryMetadataService::new("greeter-app"));
    provider_local.export_url(&greeter_url()).unwrap();
    let provider = RemoteMetadataService::connect(
        &ReportConfig::new(address.as_str()),
        provider_local.clone(),
        ServiceRegistry::new(),
    )
    .unwrap();
    let revision = provider
        .publish_metadata("greeter-app")
        .await
        .revision()
        .map(str::to_string)
        .unwrap();

    // A second node opening the same store sees the published record.
    let consumer = RemoteMetadataService::connect(
        &ReportConfig::new(address.as_str()),
        Arc::new(InMemoryMetadataService::new("caller-app")),
        ServiceRegistry::new(),
    )
    .unwrap();
    let instance =
        DefaultServiceInstance::new("greeter-app", "10.0.0.7", 20000).with_revision(revision.as_str());
    let info = consumer.get_metadata(&instance).await.unwrap();
    assert_eq!(info.exported_services(), provider_local.info().exported_services());
}

#[tokio::test]
async fn test_failed_publish_is_retried_on_next_call() {
    let temp_dir = TempDir::new().unwrap();
    let local = Arc::new(InMemoryMetadataService::new("greeter-app"));
    local.export_url(&greeter_url()).unwrap();

    let sqlite = SqliteMetadataReport::open(temp_dir.path().join("reports.db")).unwrap();
    let gate = Arc::new(GatedReport {
        inner: sqlite,
        open: std::sync::atomic::AtomicBool::new(false),
    });
    let service = RemoteMetadataService::new(
        local.clone(),
        DelegateReport::new(gate.clone(), RetryConfig::none()),
        ServiceRegistry::new(),
    );

    assert!(service.publish_metadata("greeter-app").await.is_failed());
    assert!(!local.info().has_reported());

    gate.open.store(true, Ordering::SeqCst);
    assert!(matches!(
        service.publish_metadata("greeter-app").await,
        PublishOutcome::Published { .. }
    ));
    assert!(local.info().has_reported());
}

/// Report that rejects app publishes until opened.
struct GatedReport {
    inner: SqliteMetadataReport,
    open: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl MetadataReport for GatedReport {
    async fn publish_app_metadata(
        &self,
        id: &SubscriberMetadataIdentifier,
        record: &MetadataRecord,
    ) -> Result<()> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(MetasyncError::Timeout(Duration::from_secs(3)));
        }
        self.inner.publish_app_metadata(id, record).await
    }

    async fn get_app_metadata(&self, id: &SubscriberMetadataIdentifier) -> Result<MetadataRecord> {
        self.inner.get_app_metadata(id).await
    }

    async fn store_provider_metadata(&self, id: &MetadataIdentifier, definition: &str) -> Result<()> {
        self.inner.store_provider_metadata(id, definition).await
    }

    async fn store_consumer_metadata(&self, id: &MetadataIdentifier, parameters: &str) -> Result<()> {
        self.inner.store_consumer_metadata(id, parameters).await
    }

    async fn get_service_metadata(&self, id: &MetadataIdentifier) -> Result<String> {
        self.inner.get_service_metadata(id).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_initialization_under_concurrency() {
    let cell = Arc::new(MetadataServiceCell::new());
    let constructions = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let cell = Arc::clone(&cell);
            let constructions = Arc::clone(&constructions);
            tokio::spawn(async move {
                cell.get_or_init(|| async move {
                    constructions.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    let local: Arc<dyn LocalMetadataService> =
                        Arc::new(InMemoryMetadataService::new("greeter-app"));
                    RemoteMetadataService::connect(&ReportConfig::default(), local, ServiceRegistry::new())
                })
                .await
            })
        })
        .collect();

    let services: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(constructions.load(Ordering::SeqCst), 1);
    assert!(services.iter().all(|s| Arc::ptr_eq(s, &services[0])));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_initialization_failure_is_shared() {
    let cell = Arc::new(MetadataServiceCell::new());
    let constructions = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cell = Arc::clone(&cell);
            let constructions = Arc::clone(&constructions);
            tokio::spawn(async move {
                cell.get_or_init(|| async move {
                    constructions.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    let local: Arc<dyn LocalMetadataService> =
                        Arc::new(InMemoryMetadataService::new("greeter-app"));
                    RemoteMetadataService::connect(
                        &ReportConfig::new("zookeeper://127.0.0.1:2181"),
                        local,
                        ServiceRegistry::new(),
                    )
                })
                .await
            })
        })
        .collect();

    for joined in futures::future::join_all(tasks).await {
        let err = joined.unwrap().err().unwrap();
        assert!(matches!(err, MetasyncError::Config { .. }));
    }
    assert_eq!(constructions.load(Ordering::SeqCst), 1);

    // Later callers get the cached failure without a new attempt.
    let later = cell
        .get_or_init(|| async { Err(MetasyncError::Other("unreachable".to_string())) })
        .await;
    assert!(matches!(later, Err(MetasyncError::Config { .. })));
    assert_eq!(constructions.load(Ordering::SeqCst), 1);
}
