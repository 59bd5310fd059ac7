use wiremock::MockServer;

const REQUIRE_ENV: &str = "V0_SESSION_REQUIRE_SOCKET_TESTS";

/// Starts a mock server, or returns `None` in sandboxes that cannot bind
/// localhost. With `V0_SESSION_REQUIRE_SOCKET_TESTS=1` an unbindable host
/// fails the test instead.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if let Err(error) = std::net::TcpListener::bind("127.0.0.1:0") {
        let required = std::env::var(REQUIRE_ENV).is_ok_and(|value| {
            matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
        });
        assert!(!required, "mock server needs a localhost socket: {error}");
        eprintln!(
            "skipping mock-server test, localhost bind failed: {error} (set {REQUIRE_ENV}=1 to fail)"
        );
        return None;
    }
    Some(MockServer::start().await)
}
