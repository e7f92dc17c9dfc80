//! Orchestrator flows against in-test backend adapters.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use orbit_application::Orchestrator;
use orbit_core::OrbitError;
use orbit_core::backend::{
    BackendAdapter, BackendId, BackendRegistry, ConnectionState, DispatchContext, OperationType,
};
use orbit_core::config::EngineConfig;
use orbit_core::error::Result;
use orbit_core::event::{EngineEvent, EventBus, EventChannel};
use orbit_core::operation::{
    CancelReason, ExecuteOptions, OperationOutput, OperationRequest, OperationStatus,
};

/// Answers after `delay` unless cancelled first.
///
/// Requests with `fail: true` come back as a failed output, requests with
/// `spawn_error: true` as a spawn error.
struct FakeAdapter {
    id: BackendId,
    delay: Duration,
    connected: bool,
    calls: AtomicUsize,
}

impl FakeAdapter {
    fn new(id: BackendId) -> Arc<Self> {
        Self::with_delay(id, Duration::from_millis(10))
    }

    fn with_delay(id: BackendId, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            id,
            delay,
            connected: true,
            calls: AtomicUsize::new(0),
        })
    }

    fn offline(id: BackendId) -> Arc<Self> {
        Arc::new(Self {
            id,
            delay: Duration::ZERO,
            connected: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendAdapter for FakeAdapter {
    fn id(&self) -> BackendId {
        self.id
    }

    async fn state(&self) -> ConnectionState {
        if self.connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    async fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(OrbitError::unavailable(self.id.to_string(), "connection refused"))
        }
    }

    async fn dispatch(
        &self,
        request: OperationRequest,
        ctx: DispatchContext,
    ) -> Result<OperationOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.flag("spawn_error") {
            return Err(OrbitError::spawn("fake", "executable not found"));
        }

        tokio::select! {
            _ = ctx.cancel.cancelled() => Err(OrbitError::Cancelled {
                operation_id: ctx.operation_id,
            }),
            _ = tokio::time::sleep(self.delay) => {
                let ms = self.delay.as_millis() as u64;
                if request.flag("fail") {
                    Ok(OperationOutput::failure("backend rejected the request", ms))
                } else {
                    let target = request.optional_str("url").unwrap_or("-");
                    Ok(OperationOutput::success(format!("{} {}", request.operation_type, target), ms))
                }
            }
        }
    }
}

fn orchestrator(adapters: &[Arc<FakeAdapter>]) -> (Arc<Orchestrator>, EventBus) {
    orchestrator_with(adapters, EngineConfig::default())
}

fn orchestrator_with(
    adapters: &[Arc<FakeAdapter>],
    config: EngineConfig,
) -> (Arc<Orchestrator>, EventBus) {
    let bus = EventBus::default();
    let mut registry = BackendRegistry::new();
    for adapter in adapters {
        registry.register(adapter.clone());
    }
    (
        Arc::new(Orchestrator::new(registry, config, bus.clone())),
        bus,
    )
}

fn scrape(url: &str) -> OperationRequest {
    OperationRequest::new(BackendId::WebScraper, OperationType::Scrape).with_param("url", url)
}

#[tokio::test(start_paused = true)]
async fn repeated_request_within_ttl_is_served_from_cache() {
    let scraper = FakeAdapter::new(BackendId::WebScraper);
    let (orchestrator, _bus) = orchestrator(&[scraper.clone()]);
    let options = ExecuteOptions::default().with_ttl(Duration::from_secs(10));

    let first = orchestrator
        .execute(scrape("https://example.com"), options.clone())
        .await
        .unwrap();
    assert!(!first.from_cache);
    assert_eq!(first.status, OperationStatus::Completed);

    let second = orchestrator
        .execute(scrape("https://example.com"), options)
        .await
        .unwrap();
    assert!(second.from_cache);
    assert!(second.operation_id.is_none());
    assert_eq!(
        second.result.unwrap().output,
        first.result.unwrap().output
    );
    assert_eq!(scraper.calls(), 1);
    assert_eq!(orchestrator.history().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn expired_entry_dispatches_again() {
    let scraper = FakeAdapter::new(BackendId::WebScraper);
    let (orchestrator, _bus) = orchestrator(&[scraper.clone()]);
    let options = ExecuteOptions::default().with_ttl(Duration::from_secs(10));

    orchestrator
        .execute(scrape("https://example.com"), options.clone())
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(11)).await;

    let again = orchestrator
        .execute(scrape("https://example.com"), options)
        .await
        .unwrap();
    assert!(!again.from_cache);
    assert_eq!(scraper.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn non_cacheable_types_and_opt_outs_always_dispatch() {
    let browser = FakeAdapter::new(BackendId::Browser);
    let scraper = FakeAdapter::new(BackendId::WebScraper);
    let (orchestrator, _bus) = orchestrator(&[browser.clone(), scraper.clone()]);

    let click = OperationRequest::new(BackendId::Browser, OperationType::Click)
        .with_param("selector", "#submit");
    for _ in 0..2 {
        let response = orchestrator
            .execute(click.clone(), ExecuteOptions::default())
            .await
            .unwrap();
        assert!(!response.from_cache);
    }
    assert_eq!(browser.calls(), 2);

    for _ in 0..2 {
        orchestrator
            .execute(scrape("https://example.com"), ExecuteOptions::no_cache())
            .await
            .unwrap();
    }
    assert_eq!(scraper.calls(), 2);
    assert!(orchestrator.cache().is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn failed_output_is_recorded_and_not_cached() {
    let scraper = FakeAdapter::new(BackendId::WebScraper);
    let (orchestrator, _bus) = orchestrator(&[scraper.clone()]);

    let response = orchestrator
        .execute(scrape("https://down.example").with_param("fail", true), ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(response.status, OperationStatus::Failed);
    assert!(!response.is_success());
    assert_eq!(response.error.as_deref(), Some("backend rejected the request"));

    let id = response.operation_id.unwrap();
    let operation = orchestrator.operation(&id).await.unwrap();
    assert_eq!(operation.status, OperationStatus::Failed);
    assert!(operation.result.is_none());
    assert!(orchestrator.cache().is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn timeout_cancels_at_the_deadline() {
    let slow = FakeAdapter::with_delay(BackendId::WebScraper, Duration::from_millis(500));
    let (orchestrator, _bus) = orchestrator(&[slow.clone()]);

    let started = tokio::time::Instant::now();
    let err = orchestrator
        .execute(
            scrape("https://slow.example"),
            ExecuteOptions::default().with_timeout(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(100), "took {elapsed:?}");

    let history = orchestrator.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, OperationStatus::Cancelled);
    assert_eq!(history[0].cancel_reason, Some(CancelReason::Timeout));
}

#[tokio::test(start_paused = true)]
async fn cancel_moves_running_operation_to_cancelled() {
    let slow = FakeAdapter::with_delay(BackendId::WebScraper, Duration::from_secs(30));
    let (orchestrator, bus) = orchestrator(&[slow]);
    let mut lifecycle = bus.subscribe(EventChannel::Lifecycle);

    let running = Arc::clone(&orchestrator);
    let handle = tokio::spawn(async move {
        running
            .execute(scrape("https://slow.example"), ExecuteOptions::default())
            .await
    });

    let id = loop {
        match lifecycle.recv().await {
            Some(EngineEvent::OperationStatusChanged {
                operation_id,
                status: OperationStatus::Running,
                ..
            }) => break operation_id,
            Some(_) => continue,
            None => panic!("bus closed"),
        }
    };

    assert!(orchestrator.cancel(&id).await.unwrap());
    let err = handle.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());

    let operation = orchestrator.operation(&id).await.unwrap();
    assert_eq!(operation.status, OperationStatus::Cancelled);
    assert_eq!(operation.cancel_reason, Some(CancelReason::User));

    // Terminal operations ignore further cancels.
    assert!(!orchestrator.cancel(&id).await.unwrap());
    assert!(orchestrator.cancel("no-such-op").await.unwrap_err().is_not_found());
}

#[tokio::test(start_paused = true)]
async fn cancel_all_signals_every_running_operation() {
    let slow = FakeAdapter::with_delay(BackendId::WebScraper, Duration::from_secs(30));
    let (orchestrator, _bus) = orchestrator(&[slow]);

    let handles: Vec<_> = ["a", "b"]
        .into_iter()
        .map(|url| {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                orchestrator
                    .execute(scrape(url), ExecuteOptions::default())
                    .await
            })
        })
        .collect();

    while orchestrator.running().await.len() < 2 {
        tokio::task::yield_now().await;
    }
    assert_eq!(orchestrator.cancel_all().await, 2);
    for handle in handles {
        assert!(handle.await.unwrap().unwrap_err().is_cancelled());
    }
    assert!(orchestrator.running().await.is_empty());
}

#[tokio::test]
async fn unavailable_backend_fails_fast_without_record() {
    let offline = FakeAdapter::offline(BackendId::CodeHost);
    let (orchestrator, _bus) = orchestrator(&[offline.clone()]);

    let err = orchestrator
        .execute(
            OperationRequest::new(BackendId::CodeHost, OperationType::SearchRepository)
                .with_param("query", "tokio select"),
            ExecuteOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(err.is_availability());
    assert_eq!(offline.calls(), 0);
    assert!(orchestrator.history().await.is_empty());
}

#[tokio::test]
async fn rejected_requests_leave_no_history() {
    let scraper = FakeAdapter::new(BackendId::WebScraper);
    let (orchestrator, bus) = orchestrator(&[scraper.clone()]);
    let mut lifecycle = bus.subscribe(EventChannel::Lifecycle);

    let err = orchestrator
        .execute(
            OperationRequest::new(BackendId::WebScraper, OperationType::Click),
            ExecuteOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OrbitError::UnsupportedOperation { .. }));

    let err = orchestrator
        .execute(
            OperationRequest::new(BackendId::Ide, OperationType::Diagnostics),
            ExecuteOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(err.is_availability());

    let err = orchestrator
        .execute(scrape("x").with_param("spawn_error", true), ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_spawn());
    assert!(orchestrator.history().await.is_empty());

    // The spawn failure was announced and then closed for listeners.
    let mut statuses = Vec::new();
    while let Some(event) = lifecycle.try_recv() {
        if let EngineEvent::OperationStatusChanged { status, .. } = event {
            statuses.push(status);
        }
    }
    assert_eq!(
        statuses,
        vec![
            OperationStatus::Pending,
            OperationStatus::Running,
            OperationStatus::Failed
        ]
    );
}

#[tokio::test]
async fn status_changes_are_published_in_order() {
    let scraper = FakeAdapter::new(BackendId::WebScraper);
    let (orchestrator, bus) = orchestrator(&[scraper]);
    let mut lifecycle = bus.subscribe(EventChannel::Lifecycle);

    let response = orchestrator
        .execute(scrape("https://example.com"), ExecuteOptions::default())
        .await
        .unwrap();
    let id = response.operation_id.unwrap();

    let mut statuses = Vec::new();
    while let Some(event) = lifecycle.try_recv() {
        if let EngineEvent::OperationStatusChanged {
            operation_id,
            backend,
            status,
            ..
        } = event
        {
            assert_eq!(operation_id, id);
            assert_eq!(backend, BackendId::WebScraper);
            statuses.push(status);
        }
    }
    assert_eq!(
        statuses,
        vec![
            OperationStatus::Pending,
            OperationStatus::Running,
            OperationStatus::Completed
        ]
    );
}

#[tokio::test]
async fn retry_submits_a_new_operation() {
    let scraper = FakeAdapter::new(BackendId::WebScraper);
    let (orchestrator, _bus) = orchestrator(&[scraper.clone()]);

    let failed = orchestrator
        .execute(scrape("https://flaky.example").with_param("fail", true), ExecuteOptions::default())
        .await
        .unwrap();
    let failed_id = failed.operation_id.unwrap();

    let retried = orchestrator.retry(&failed_id).await.unwrap();
    let retried_id = retried.operation_id.unwrap();
    assert_ne!(retried_id, failed_id);
    assert_eq!(scraper.calls(), 2);
    assert_eq!(orchestrator.history().await.len(), 2);
    assert_eq!(
        orchestrator.operation(&failed_id).await.unwrap().status,
        OperationStatus::Failed
    );

    let ok = orchestrator
        .execute(scrape("https://example.com"), ExecuteOptions::default())
        .await
        .unwrap();
    let err = orchestrator
        .retry(&ok.operation_id.unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, OrbitError::InvalidState(_)));
}

#[tokio::test]
async fn history_is_bounded_and_clearable() {
    let scraper = FakeAdapter::new(BackendId::WebScraper);
    let mut config = EngineConfig::default();
    config.orchestrator.history_limit = 2;
    let (orchestrator, _bus) = orchestrator_with(&[scraper], config);

    let mut ids = Vec::new();
    for url in ["a", "b", "c"] {
        let response = orchestrator
            .execute(scrape(url), ExecuteOptions::no_cache())
            .await
            .unwrap();
        ids.push(response.operation_id.unwrap());
    }

    let history: Vec<_> = orchestrator
        .history()
        .await
        .into_iter()
        .map(|op| op.id)
        .collect();
    assert_eq!(history, ids[1..].to_vec());
    assert!(orchestrator.operation(&ids[0]).await.is_none());

    assert_eq!(orchestrator.clear_history().await, 2);
    assert!(orchestrator.history().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropped_execute_cancels_its_operation() {
    let scraper = FakeAdapter::with_delay(BackendId::WebScraper, Duration::from_secs(30));
    let (orchestrator, bus) = orchestrator(&[scraper.clone()]);
    let mut lifecycle = bus.subscribe(EventChannel::Lifecycle);

    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        orchestrator.execute(scrape("https://slow.example"), ExecuteOptions::default()),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_secs(1)).await;
    let history = orchestrator.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, OperationStatus::Cancelled);
    assert_eq!(history[0].cancel_reason, Some(CancelReason::User));
    assert!(orchestrator.running().await.is_empty());
    assert!(!orchestrator.cancel(&history[0].id).await.unwrap());

    let mut last = None;
    while let Some(event) = lifecycle.try_recv() {
        if let EngineEvent::OperationStatusChanged { status, .. } = event {
            last = Some(status);
        }
    }
    assert_eq!(last, Some(OperationStatus::Cancelled));
}

#[tokio::test(start_paused = true)]
async fn retry_reuses_the_original_options() {
    let scraper = FakeAdapter::with_delay(BackendId::WebScraper, Duration::from_millis(500));
    let (orchestrator, _bus) = orchestrator(&[scraper.clone()]);
    let options = ExecuteOptions::no_cache().with_timeout(Duration::from_millis(50));

    let err = orchestrator
        .execute(scrape("https://slow.example"), options)
        .await
        .unwrap_err();
    let OrbitError::Timeout { operation_id, .. } = err else {
        panic!("expected timeout, got {err:?}");
    };

    let started = tokio::time::Instant::now();
    let err = orchestrator.retry(&operation_id).await.unwrap_err();
    assert!(matches!(err, OrbitError::Timeout { after_ms: 50, .. }), "{err:?}");
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(scraper.calls(), 2);
}
