//! End-to-end tests against real sockets.
//!
//! Each test starts two tiny HTTP/1.1 servers standing in for the
//! reference and candidate environments, then drives `HttpProber` or a
//! full `Monitor` against them.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;

use driftwatch_core::{
    BaseUrl, BodyShape, EndpointRegistry, EndpointSpec, Environment, HealthState, MonitorSettings,
    ProbeOutcome,
};
use driftwatch_monitor::{HttpProber, Monitor, Prober, StopReason};

/// Canned response: status and body, keyed by request path.
type Routes = Arc<Mutex<HashMap<String, (u16, String)>>>;

struct FakeEnv {
    addr: SocketAddr,
    routes: Routes,
    seen: Arc<Mutex<Vec<String>>>,
}

impl FakeEnv {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Routes = Arc::default();
        let seen: Arc<Mutex<Vec<String>>> = Arc::default();

        let server_routes = Arc::clone(&routes);
        let server_seen = Arc::clone(&seen);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let routes = Arc::clone(&server_routes);
                let seen = Arc::clone(&server_seen);
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let request = String::from_utf8_lossy(&buf).to_string();
                    let path = request
                        .lines()
                        .next()
                        .and_then(|line| line.split_whitespace().nth(1))
                        .unwrap_or("/")
                        .to_string();
                    seen.lock().unwrap().push(request);

                    let (status, body) = routes
                        .lock()
                        .unwrap()
                        .get(&path)
                        .cloned()
                        .unwrap_or((404, r#"{"error":"not found"}"#.to_string()));
                    let response = format!(
                        "HTTP/1.1 {status} Status\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { addr, routes, seen }
    }

    fn route(&self, path: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body.to_string()));
    }

    fn base_url(&self, prefix: &str) -> BaseUrl {
        BaseUrl::parse("reference_url", &format!("http://{}{prefix}", self.addr)).unwrap()
    }
}

fn settings(reference: &FakeEnv, candidate: &FakeEnv, alert_threshold: u32) -> MonitorSettings {
    MonitorSettings {
        reference_url: reference.base_url(""),
        candidate_url: candidate.base_url(""),
        interval: Duration::from_millis(10),
        timeout: Duration::from_secs(2),
        alert_threshold,
        max_critical_alerts: 10,
        max_concurrency: 4,
        alert_log: None,
        report_path: None,
    }
}

#[tokio::test]
async fn probe_classifies_object_body() {
    let env = FakeEnv::start().await;
    env.route("/api/v1/properties", 200, r#"{"id": 1, "name": "Oak St"}"#);
    let endpoint = EndpointSpec::new("/api/v1/properties", [200, 401, 403]);

    let result = HttpProber::new()
        .probe(&endpoint, Environment::Reference, &env.base_url(""), Duration::from_secs(2))
        .await;

    assert_eq!(
        result.outcome,
        ProbeOutcome::Success {
            status: 200,
            shape: BodyShape::Object(["id", "name"].map(String::from).into()),
        }
    );
}

#[tokio::test]
async fn probe_accepts_auth_statuses_and_rejects_others() {
    let env = FakeEnv::start().await;
    env.route("/api/v1/leases", 401, r#"{"error":"unauthorized"}"#);
    env.route("/api/v1/units", 500, "boom");

    let leases = EndpointSpec::new("/api/v1/leases", [200, 401, 403]);
    let units = EndpointSpec::new("/api/v1/units", [200, 401, 403]);
    let base = env.base_url("");

    let ok = HttpProber::new()
        .probe(&leases, Environment::Candidate, &base, Duration::from_secs(2))
        .await;
    assert!(ok.is_success());

    let bad = HttpProber::new()
        .probe(&units, Environment::Candidate, &base, Duration::from_secs(2))
        .await;
    assert_eq!(
        bad.outcome,
        ProbeOutcome::Failure {
            reason: "unexpected status 500".to_string()
        }
    );
}

#[tokio::test]
async fn probe_sends_prefix_host_and_user_agent() {
    let env = FakeEnv::start().await;
    env.route("/backend/health", 200, "OK");
    let endpoint = EndpointSpec::new("/health", [200]);

    let result = HttpProber::new()
        .probe(
            &endpoint,
            Environment::Reference,
            &env.base_url("/backend"),
            Duration::from_secs(2),
        )
        .await;
    assert_eq!(
        result.outcome,
        ProbeOutcome::Success {
            status: 200,
            shape: BodyShape::Scalar
        }
    );

    let seen = env.seen.lock().unwrap();
    let request = seen[0].to_lowercase();
    assert!(request.starts_with("get /backend/health http/1.1"));
    assert!(request.contains(&format!("host: {}", env.addr)));
    assert!(request.contains("user-agent: driftwatch/"));
}

#[tokio::test]
async fn oversized_bodies_are_classified_not_failed() {
    let env = FakeEnv::start().await;
    let rows: Vec<String> = (0..40_000)
        .map(|i| format!(r#"{{"id": {i}, "name": "unit {i}"}}"#))
        .collect();
    let list = format!("[{}]", rows.join(","));
    assert!(list.len() > 1024 * 1024);
    env.route("/api/v1/units", 200, &list);
    env.route(
        "/api/v1/properties",
        200,
        &format!(r#"{{"items": {list}, "total": 40000, "page": 1}}"#),
    );

    let base = env.base_url("");
    let units = HttpProber::new()
        .probe(
            &EndpointSpec::new("/api/v1/units", [200]),
            Environment::Reference,
            &base,
            Duration::from_secs(5),
        )
        .await;
    assert_eq!(
        units.outcome,
        ProbeOutcome::Success {
            status: 200,
            shape: BodyShape::Array,
        }
    );

    let properties = HttpProber::new()
        .probe(
            &EndpointSpec::new("/api/v1/properties", [200]),
            Environment::Candidate,
            &base,
            Duration::from_secs(5),
        )
        .await;
    assert_eq!(
        properties.outcome,
        ProbeOutcome::Success {
            status: 200,
            shape: BodyShape::Object(["items", "page", "total"].map(String::from).into()),
        }
    );
}

#[tokio::test]
async fn monitor_detects_dropped_field_and_recovery() {
    let reference = FakeEnv::start().await;
    let candidate = FakeEnv::start().await;
    reference.route("/properties", 200, r#"{"id": 1, "name": "a"}"#);
    candidate.route("/properties", 200, r#"{"id": 1}"#);
    reference.route("/health", 200, r#"{"status":"ok"}"#);
    candidate.route("/health", 401, r#"{"status":"ok"}"#);

    let registry = EndpointRegistry::new(vec![
        EndpointSpec::new("/properties", [200]),
        EndpointSpec::new("/health", [200, 401]),
    ])
    .unwrap();
    let mut monitor = Monitor::new(
        settings(&reference, &candidate, 3),
        registry,
        HttpProber::new(),
    );

    for _ in 0..3 {
        monitor.run_tick().await;
    }
    let report = monitor.report();
    assert_eq!(report.endpoints["/properties"].state, HealthState::Alerting);
    assert_eq!(report.endpoints["/health"].state, HealthState::Alerting);
    assert_eq!(report.alert_counts.critical, 2);
    assert!(
        report.endpoints["/health"].last_reasons[0].contains("status mismatch"),
        "{:?}",
        report.endpoints["/health"].last_reasons
    );

    candidate.route("/properties", 200, r#"{"id": 1, "name": "a", "extra": true}"#);
    monitor.run_tick().await;

    let report = monitor.report();
    assert_eq!(report.endpoints["/properties"].state, HealthState::Healthy);
    assert_eq!(report.endpoints["/properties"].consecutive_failures, 0);
    assert_eq!(report.alert_counts.critical, 2);
}

#[tokio::test]
async fn run_writes_alert_log_for_unreachable_candidate() {
    let reference = FakeEnv::start().await;
    reference.route("/health", 200, "{}");

    // Bind and drop to get a port with nothing listening.
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("alerts.jsonl");

    let mut cfg = MonitorSettings {
        candidate_url: BaseUrl::parse("candidate_url", &format!("http://{dead_addr}")).unwrap(),
        alert_log: Some(log.clone()),
        ..settings(&reference, &reference, 2)
    };
    cfg.max_critical_alerts = 1;

    let registry = EndpointRegistry::new(vec![EndpointSpec::new("/health", [200])]).unwrap();
    let (_tx, rx) = watch::channel(false);
    let outcome = Monitor::new(cfg, registry, HttpProber::new()).run(rx).await;

    assert_eq!(outcome.reason, StopReason::CriticalCeiling);
    assert_eq!(outcome.report.total_ticks, 2);
    assert_eq!(outcome.report.alert_counts.critical, 2);

    let content = std::fs::read_to_string(&log).unwrap();
    let alerts: Vec<serde_json::Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(alerts.len(), 3);
    assert_eq!(alerts[0]["severity"], "warning");
    assert_eq!(alerts[1]["severity"], "critical");
    assert_eq!(alerts[1]["endpoint"], "/health");
    assert!(
        alerts[1]["message"]
            .as_str()
            .unwrap()
            .contains("candidate unavailable")
    );
    assert_eq!(alerts[2]["endpoint"], "monitor");
}
