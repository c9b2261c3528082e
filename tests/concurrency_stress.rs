use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tower::{Layer, Service, ServiceExt, service_fn};
use tower_admission_core::{FnResolver, SourceKey};
use tower_admission_pipeline::{AdmissionPipelineLayer, PipelineConfig};

/// Many clients hammering the pipeline concurrently stay within their own
/// buckets: every client gets exactly its burst admitted, no more and no
/// fewer.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn per_key_limits_hold_under_concurrency() {
    const CLIENTS: usize = 16;
    const BURST: usize = 10;
    const REQUESTS_PER_CLIENT: usize = 40;

    let config: PipelineConfig = serde_json::from_str(
        // Refill slow enough that no token returns during the test.
        r#"{ "rate_limit": { "rate_per_sec": 0.001, "burst": 10 } }"#,
    )
    .unwrap();
    let layer = AdmissionPipelineLayer::<&'static str, _>::new(
        config,
        FnResolver::new(|client: &String| SourceKey::new(client, "GET", "/orders")),
    );
    let service =
        layer.layer(service_fn(|req: String| async move { Ok::<_, &'static str>(req) }));

    let admitted = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for client in 0..CLIENTS {
        let mut service = service.clone();
        let admitted = Arc::clone(&admitted);
        handles.push(tokio::spawn(async move {
            let mut ok = 0usize;
            for _ in 0..REQUESTS_PER_CLIENT {
                let result = service
                    .ready()
                    .await
                    .unwrap()
                    .call(format!("10.0.0.{client}"))
                    .await;
                if result.is_ok() {
                    ok += 1;
                }
            }
            admitted.fetch_add(ok, Ordering::SeqCst);
            ok
        }));
    }

    for handle in handles {
        let per_client = handle.await.unwrap();
        assert_eq!(per_client, BURST);
    }
    assert_eq!(admitted.load(Ordering::SeqCst), CLIENTS * BURST);
}

/// A route failing under concurrent load trips its breaker exactly once
/// per window and other routes never see a rejection.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn breaker_isolation_under_concurrency() {
    let config: PipelineConfig = serde_json::from_str(
        r#"{
            "rate_limit": { "rate_per_sec": 100000.0, "burst": 100000 },
            "circuit_breaker": { "min_requests": 20, "failure_ratio": 0.5, "timeout_ms": 60000 },
            "retry": { "max_attempts": 1 }
        }"#,
    )
    .unwrap();
    let layer = AdmissionPipelineLayer::<&'static str, _>::new(
        config,
        FnResolver::new(|route: &String| {
            let (method, path) = route.split_once(':').expect("method:path request");
            SourceKey::new("10.0.0.1", method, path)
        }),
    );
    let service = layer.layer(service_fn(|route: String| async move {
        if route.contains("/reports") {
            Err("query timeout")
        } else {
            Ok(route)
        }
    }));

    let mut handles = Vec::new();
    for task in 0..8 {
        let mut service = service.clone();
        let route = if task % 2 == 0 { "GET:/reports" } else { "GET:/users" };
        handles.push(tokio::spawn(async move {
            let mut healthy_rejections = 0usize;
            for _ in 0..50 {
                let result = service
                    .ready()
                    .await
                    .unwrap()
                    .call(route.to_string())
                    .await;
                if route == "GET:/users" && result.is_err() {
                    healthy_rejections += 1;
                }
            }
            healthy_rejections
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 0);
    }

    // The failing route ended up open; the healthy one stayed closed.
    let reports = layer.registry().get("GET:/reports").expect("breaker exists");
    let users = layer.registry().get("GET:/users").expect("breaker exists");
    assert!(reports.is_open());
    assert!(!users.is_open());
}
