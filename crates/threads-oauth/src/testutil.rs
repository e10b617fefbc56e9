//! Local mock server helpers shared by the HTTP tests in this crate

use axum::Router;
use common::Secret;
use tokio::net::TcpListener;

use crate::config::OAuthConfig;

/// Serve `app` on an ephemeral localhost port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// OAuth config whose every endpoint points at `base_url`.
pub fn test_config(base_url: &str) -> OAuthConfig {
    OAuthConfig::new(
        "test-client",
        Secret::new("test-secret".into()),
        "https://booster.test/callback",
    )
    .unwrap()
    .with_endpoints(format!("{base_url}/authorize"), base_url, base_url)
    .unwrap()
}
