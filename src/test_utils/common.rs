use std::time::Duration;

/// Polls `cond` every 10ms until it holds, panicking after two seconds.
pub(crate) async fn wait_until<F>(what: &str, cond: F)
where
    F: Fn() -> bool,
{
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

pub fn enable_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
