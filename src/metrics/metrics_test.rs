use warp::Filter;

use super::*;

fn scratch_registry() -> Registry {
    let registry = Registry::new_custom(Some("snapengine".to_string()), None).unwrap();
    registry
        .register(Box::new(TRANSFER_BYTES_METRIC.clone()))
        .unwrap();
    registry
        .register(Box::new(RETENTION_QUEUE_DEPTH_METRIC.clone()))
        .unwrap();
    registry
}

#[test]
fn test_custom_registry() {
    let registry = scratch_registry();

    TRANSFER_BYTES_METRIC
        .with_label_values(&["scratch/registry"])
        .inc_by(42);
    let metrics = &registry.gather();
    assert!(!metrics.is_empty());

    // Verify the number of indicators
    let metric_names: Vec<_> = metrics.iter().map(|m| m.get_name()).collect();
    // Verify that key indicators exist
    assert!(
        metric_names.contains(&"snapengine_transfer_bytes"),
        "Missing snapengine_transfer_bytes"
    );
}

// Test the correctness of the indicator update logic
#[test]
fn test_counter_increment() {
    // A label no other test touches keeps the count deterministic.
    FAILED_TRANSFERS
        .with_label_values(&["scratch/counter"])
        .inc();
    FAILED_TRANSFERS
        .with_label_values(&["scratch/counter"])
        .inc();

    // Verify the counter value
    let value = FAILED_TRANSFERS
        .with_label_values(&["scratch/counter"])
        .get();
    assert_eq!(value, 2, "Counter should increment correctly");
}

// Test the correctness of histogram labels
#[test]
fn test_histogram_labels() {
    // Simulate data records with different labels
    TRANSFER_DURATION_METRIC
        .with_label_values(&["scratch/hist-a"])
        .observe(100.0);
    TRANSFER_DURATION_METRIC
        .with_label_values(&["scratch/hist-b"])
        .observe(200.0);

    // Verify label distinguishability
    let a_count = TRANSFER_DURATION_METRIC
        .with_label_values(&["scratch/hist-a"])
        .get_sample_count();
    let b_count = TRANSFER_DURATION_METRIC
        .with_label_values(&["scratch/hist-b"])
        .get_sample_count();

    assert_eq!(a_count, 1);
    assert_eq!(b_count, 1);
}

#[tokio::test]
async fn test_metrics_endpoint_format() {
    // Touching the histogram registers it with the default registry, so
    // the scrape body has at least one family to carry.
    TRANSFER_DURATION_METRIC
        .with_label_values(&["scratch/endpoint"])
        .observe(0.5);

    // Construct test route
    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    // Simulate request
    let response = warp::test::request()
        .method("GET")
        .path("/metrics")
        .reply(&metrics_route)
        .await;

    // Verify basic response properties
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("Content-Type"),
        Some(&"text/plain; charset=utf-8".parse().unwrap())
    );

    // Verify indicator format
    let body = String::from_utf8(response.body().to_vec()).unwrap();
    assert!(body.contains("transfer_duration_seconds"));
}
