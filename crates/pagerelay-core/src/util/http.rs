use reqwest::Client;
use std::time::Duration;

use crate::config::HttpClientConfig;

/// Build the outbound HTTP client shared by the completion and send paths.
pub fn build_client(cfg: &HttpClientConfig) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(30))
        .user_agent(concat!("pagerelay/", env!("CARGO_PKG_VERSION")))
        .build()
}
