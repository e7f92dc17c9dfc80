//! End-to-end flows through the composition root.

use std::sync::Arc;
use std::time::Duration;

use orbit_application::Engine;
use orbit_core::backend::{BackendId, OperationType};
use orbit_core::config::{BackendSettings, CliSettings, EngineConfig};
use orbit_core::event::{EngineEvent, EventBus, EventChannel, EventSubscription};
use orbit_core::operation::{CancelReason, ExecuteOptions, OperationRequest, OperationStatus};
use orbit_infrastructure::process::SimulatedProcessGateway;
use orbit_interaction::SessionManager;

fn missing_program(simulate: bool) -> EngineConfig {
    EngineConfig {
        cli: CliSettings {
            program: "orbit-definitely-missing-binary".to_string(),
            simulate_when_unavailable: simulate,
            simulation_delay_ms: 0,
            ..CliSettings::default()
        },
        ..EngineConfig::default()
    }
}

fn chat(message: &str) -> OperationRequest {
    OperationRequest::new(BackendId::Cli, OperationType::Chat).with_param("message", message)
}

async fn next_running(lifecycle: &mut EventSubscription) -> String {
    loop {
        match lifecycle.recv().await {
            Some(EngineEvent::OperationStatusChanged {
                operation_id,
                status: OperationStatus::Running,
                ..
            }) => return operation_id,
            Some(_) => continue,
            None => panic!("bus closed"),
        }
    }
}

#[tokio::test]
async fn missing_program_without_simulation_fails_fast() {
    let engine = Engine::new(missing_program(false)).unwrap();

    let report = engine.sessions().check_availability().await;
    assert!(!report.available);

    let err = engine
        .orchestrator()
        .execute(chat("hello"), ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_availability(), "unexpected error: {err}");
    assert!(engine.orchestrator().history().await.is_empty());
}

#[tokio::test]
async fn simulated_results_are_flagged_and_cached() {
    let engine = Engine::new(missing_program(true)).unwrap();
    let orchestrator = engine.orchestrator();

    let first = orchestrator
        .execute(chat("explain borrowing"), ExecuteOptions::default())
        .await
        .unwrap();
    let output = first.result.unwrap();
    assert!(output.success);
    assert!(output.simulated);
    assert!(output.tokens.is_none());

    let second = orchestrator
        .execute(chat("explain borrowing"), ExecuteOptions::default())
        .await
        .unwrap();
    assert!(second.from_cache);
    assert!(second.result.unwrap().simulated);

    let insights = engine.insights().await;
    assert_eq!(insights.counts.completed, 1);
    assert_eq!(insights.total_tokens, 0);
    assert_eq!(insights.by_backend[&BackendId::Cli].counts.total, 1);
}

#[tokio::test]
async fn configured_endpoints_register_service_backends() {
    let mut config = missing_program(true);
    config.backends.insert(
        "web_scraper".to_string(),
        BackendSettings {
            endpoint: Some("http://127.0.0.1:9".to_string()),
            ..BackendSettings::default()
        },
    );
    let engine = Engine::new(config).unwrap();

    assert_eq!(
        engine.orchestrator().registry().ids(),
        vec![BackendId::Cli, BackendId::WebScraper]
    );
    let err = engine
        .orchestrator()
        .execute(
            OperationRequest::new(BackendId::Browser, OperationType::Navigate)
                .with_param("url", "https://example.com"),
            ExecuteOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(err.is_availability());
}

#[tokio::test(start_paused = true)]
async fn session_termination_cancels_running_operations() {
    let config = EngineConfig::default();
    let bus = EventBus::default();
    let gateway = Arc::new(
        SimulatedProcessGateway::new(bus.clone(), Duration::from_secs(8))
            .with_signature(config.cli.signature.clone()),
    );
    let sessions = Arc::new(SessionManager::new(config.cli.clone(), gateway, bus.clone()));
    let engine = Engine::with_registry(config, bus, sessions, |_, _| {});
    let mut lifecycle = engine.subscribe(EventChannel::Lifecycle);

    let orchestrator = Arc::clone(engine.orchestrator());
    let handle = tokio::spawn(async move {
        orchestrator
            .execute(chat("long task"), ExecuteOptions::no_cache())
            .await
    });
    let id = next_running(&mut lifecycle).await;

    assert!(engine.sessions().terminate().await.is_some());
    let err = handle.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());

    let operation = engine.orchestrator().operation(&id).await.unwrap();
    assert_eq!(operation.status, OperationStatus::Cancelled);
    assert_eq!(operation.cancel_reason, Some(CancelReason::SessionTerminated));
}

#[tokio::test]
async fn shutdown_drops_watches() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new(missing_program(true)).unwrap();

    engine.watch(&[dir.path().to_path_buf()]).unwrap();
    assert_eq!(engine.watcher().watched().len(), 1);

    engine.shutdown().await.unwrap();
    assert!(engine.watcher().watched().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn cancel_kills_the_cli_process() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("fake-assistant");
    std::fs::write(
        &script,
        "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then echo '1.0.43 (Claude Code)'; exit 0; fi\nsleep 30\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = EngineConfig {
        cli: CliSettings {
            program: script.display().to_string(),
            working_dir: Some(dir.path().to_path_buf()),
            simulate_when_unavailable: false,
            ..CliSettings::default()
        },
        ..EngineConfig::default()
    };
    let engine = Engine::new(config).unwrap();
    let mut lifecycle = engine.subscribe(EventChannel::Lifecycle);

    let orchestrator = Arc::clone(engine.orchestrator());
    let handle = tokio::spawn(async move {
        orchestrator
            .execute(chat("never answers"), ExecuteOptions::no_cache())
            .await
    });

    let (id, pid) = loop {
        match lifecycle.recv().await {
            Some(EngineEvent::ProcessStarted {
                operation_id: Some(id),
                pid: Some(pid),
                ..
            }) => break (id, pid),
            Some(_) => continue,
            None => panic!("bus closed"),
        }
    };

    assert!(engine.orchestrator().cancel(&id).await.unwrap());
    let err = handle.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(
        engine.orchestrator().operation(&id).await.unwrap().status,
        OperationStatus::Cancelled
    );

    let alive = std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .unwrap()
        .success();
    assert!(!alive, "process {pid} still running");
}
