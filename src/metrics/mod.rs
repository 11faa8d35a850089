use autometrics::prometheus_exporter::{self, PrometheusResponse};
use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, register_histogram_vec, GaugeVec, HistogramVec, IntCounterVec, Opts,
    Registry,
};
use tokio::sync::watch;
use warp::{Filter, Rejection, Reply};

lazy_static! {
    pub static ref TRANSFER_BYTES_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("transfer_bytes", "Payload bytes pumped per source dataset"),
        &["dataset"]
    )
    .expect("metric can not be created");

    pub static ref TRANSFER_DURATION_METRIC: HistogramVec = register_histogram_vec!(
        "transfer_duration_seconds",
        "Histogram of wall-clock transfer duration in seconds",
        &["dataset"],
        exponential_buckets(0.1, 2.0, 12).unwrap()
    )
    .expect("metric can not be created");

    pub static ref FAILED_TRANSFERS: IntCounterVec = IntCounterVec::new(
        Opts::new("failed_transfers", "failed_transfers"),
        &["dataset"]
    )
    .expect("Should succeed to create metric");

    pub static ref SNAPSHOTS_CREATED_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("snapshots_created", "Snapshots taken on schedule"),
        &["schedule"]
    )
    .expect("Should succeed to create metric");

    pub static ref SNAPSHOTS_DESTROYED_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("snapshots_destroyed", "Snapshots pruned by retention"),
        &["dataset"]
    )
    .expect("Should succeed to create metric");

    pub static ref FAILED_DESTROYS: IntCounterVec = IntCounterVec::new(
        Opts::new("failed_destroys", "Retention deletions given up on"),
        &["dataset"]
    )
    .expect("Should succeed to create metric");

    pub static ref RETENTION_QUEUE_DEPTH_METRIC: GaugeVec = GaugeVec::new(
        Opts::new("retention_queue_depth", "retention_queue_depth"),
        &["queue"]
    )
    .expect("metric can not be created");

    pub static ref RECEIVED_BYTES_METRIC: IntCounterVec = IntCounterVec::new(
        Opts::new("received_bytes", "Payload bytes accepted over the wire"),
        &["dataset"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

fn register_custom_metrics() {
    REGISTRY
        .register(Box::new(TRANSFER_BYTES_METRIC.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(TRANSFER_DURATION_METRIC.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(FAILED_TRANSFERS.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(SNAPSHOTS_CREATED_METRIC.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(SNAPSHOTS_DESTROYED_METRIC.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(FAILED_DESTROYS.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(RETENTION_QUEUE_DEPTH_METRIC.clone()))
        .expect("collector can be registered");
    REGISTRY
        .register(Box::new(RECEIVED_BYTES_METRIC.clone()))
        .expect("collector can be registered");
}

pub async fn start_server(port: u16, mut shutdown_signal: watch::Receiver<()>) {
    register_custom_metrics();

    let metrics_route = warp::path!("metrics").and_then(metrics_handler);

    let (_, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            let _ = shutdown_signal.changed().await;
        });
    server.await;
}

async fn metrics_handler() -> Result<impl Reply, Rejection> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        eprintln!("could not encode custom metrics: {}", e);
    };
    let mut res = match String::from_utf8(buffer.clone()) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    };
    buffer.clear();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        eprintln!("could not encode prometheus metrics: {}", e);
    };
    let res_custom = match String::from_utf8(buffer.clone()) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("prometheus metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    };
    buffer.clear();

    let autometrics_metrics = get_metrics_body();
    res.push_str(&res_custom);
    res.push_str(&autometrics_metrics);
    Ok(res)
}

/// Export metrics for Prometheus to scrape
pub fn get_metrics_body() -> String {
    let autometrics_response = prometheus_exporter::encode_http_response();
    autometrics_response.into_body()
}
/// Export metrics for Prometheus to scrape
pub fn get_metrics() -> PrometheusResponse {
    prometheus_exporter::encode_http_response()
}

#[cfg(test)]
mod metrics_test;
