use handle_scout::candidates::CandidateSource;
use handle_scout::proxy::{Proxy, ProxyRegistry, ProxyType, RegistryConfig};
use handle_scout::{
    DispatcherConfig, ProbeDispatcher, ProbeEngine, ProbeEvent, RunOutcome, RunStats,
    SchedulerConfig,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VALIDATE_PATH: &str = "/v1/usernames/validate";

fn endpoint(server: &MockServer) -> String {
    format!("{}{}", server.uri(), VALIDATE_PATH)
}

fn dispatcher(server: &MockServer, registry: Arc<ProxyRegistry>) -> ProbeDispatcher {
    let config = DispatcherConfig::new()
        .with_endpoint(endpoint(server))
        .with_timeout(Duration::from_secs(5))
        .with_local_rate_limit_wait(Duration::from_millis(10));
    ProbeDispatcher::new(config, registry, Arc::new(RunStats::new())).unwrap()
}

#[tokio::test]
async fn test_available_candidate_is_a_hit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(VALIDATE_PATH))
        .and(query_param("Username", "zxqy"))
        .and(query_param("Context", "Signup"))
        .and(header_exists("cookie"))
        .and(header_exists("user-agent"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"code": 0, "message": "Username is valid"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = dispatcher(&server, Arc::new(ProxyRegistry::new()));
    let result = dispatcher.check("zxqy", true).await;

    assert!(result.available);
    assert_eq!(result.message, "Available");
    let stats = dispatcher.stats_snapshot();
    assert_eq!((stats.checks, stats.hits, stats.errors), (1, 1, 0));
}

#[tokio::test]
async fn test_taken_candidate_carries_upstream_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(VALIDATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({"code": 1, "message": "Username is already in use"}),
        ))
        .mount(&server)
        .await;

    let dispatcher = dispatcher(&server, Arc::new(ProxyRegistry::new()));
    let result = dispatcher.check("abcd", false).await;

    assert!(!result.available);
    assert_eq!(result.message, "Username is already in use");
    let stats = dispatcher.stats_snapshot();
    assert_eq!((stats.checks, stats.hits, stats.errors), (1, 0, 0));
}

#[tokio::test]
async fn test_local_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let dispatcher = dispatcher(&server, Arc::new(ProxyRegistry::new()));
    let result = dispatcher.check("abcd", true).await;

    assert!(!result.available);
    assert_eq!(result.message, "Rate limited (local IP)");
    let stats = dispatcher.stats_snapshot();
    assert_eq!((stats.checks, stats.errors), (1, 1));
}

#[tokio::test]
async fn test_server_error_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let dispatcher = dispatcher(&server, Arc::new(ProxyRegistry::new()));
    let result = dispatcher.check("abcd", false).await;

    assert_eq!(result.message, "HTTP 503");
    assert_eq!(dispatcher.stats_snapshot().errors, 1);
}

#[tokio::test]
async fn test_dead_proxy_is_evicted_after_threshold() {
    let server = MockServer::start().await;
    let registry = Arc::new(ProxyRegistry::with_config(
        RegistryConfig::new().with_failure_threshold(2),
    ));
    // Nothing listens on port 1.
    registry.load(vec![Proxy::new("127.0.0.1".to_string(), 1, ProxyType::Http)]);
    let dispatcher = dispatcher(&server, registry.clone());

    let first = dispatcher.check("abcd", true).await;
    assert!(first.message.starts_with("Proxy error ("), "{}", first.message);
    assert_eq!(registry.count(), 1);

    let second = dispatcher.check("efgh", true).await;
    assert!(second.message.starts_with("Proxy removed ("), "{}", second.message);
    assert!(registry.is_empty());

    let stats = dispatcher.stats_snapshot();
    assert_eq!((stats.checks, stats.errors), (0, 2));
}

#[tokio::test]
async fn test_engine_run_over_wordlist() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("Username", "free"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"code": 0})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            serde_json::json!({"code": 1, "message": "Username is already in use"}),
        ))
        .mount(&server)
        .await;

    let engine = ProbeEngine::from_config(
        DispatcherConfig::new().with_endpoint(endpoint(&server)),
        RegistryConfig::default(),
        "",
    )
    .unwrap();

    let words = ["taken1", "free", "taken2", "free"]
        .iter()
        .map(|w| w.to_string())
        .collect();
    let mut rx = engine
        .start_run(
            vec![CandidateSource::from_list(words)],
            SchedulerConfig::new().with_concurrency(3),
            false,
        )
        .unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    let hits: Vec<&ProbeEvent> = events
        .iter()
        .filter(|e| matches!(e, ProbeEvent::Hit { .. }))
        .collect();
    assert_eq!(
        hits,
        vec![&ProbeEvent::Hit {
            candidate: "free".to_string(),
            kind: "list".to_string()
        }]
    );
    assert!(events.contains(&ProbeEvent::SourceExhausted {
        kind: "list".to_string()
    }));
    assert!(events.contains(&ProbeEvent::Finished(RunOutcome::Exhausted)));
    assert_eq!(engine.join().await, Some(RunOutcome::Exhausted));

    let stats = engine.current_stats();
    assert_eq!((stats.checks, stats.hits), (3, 1));
}
