use reqwest::Client;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::error::Result;

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

pub fn create_http_client(config: &GatewayConfig) -> Result<Client> {
    let client = Client::builder()
        .tcp_nodelay(true)
        .http1_title_case_headers()
        .https_only(config.https_only)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(10)
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .build()?;

    Ok(client)
}
