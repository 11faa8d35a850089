use crate::net::endpoint_uri;

#[test]
fn test_endpoint_uri_adds_exactly_one_scheme() {
    assert_eq!(endpoint_uri("127.0.0.1:4242"), "http://127.0.0.1:4242");
    assert_eq!(endpoint_uri("http://node1:4242"), "http://node1:4242");
    assert_eq!(endpoint_uri("https://node1:4242"), "http://node1:4242");
}
