/// Accepts a bare `host:port` or one already carrying a scheme and
/// returns a single `http://`-prefixed endpoint URI.
pub(crate) fn endpoint_uri(addr: &str) -> String {
    let normalized = addr.trim_start_matches("http://").trim_start_matches("https://");
    format!("http://{}", normalized)
}
