use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::analytics::Stats;
use crate::config::{GatewayConfig, LimiterConfig, SubmitMode};
use crate::error::{AppError, Result};
use crate::http::rate_limiter::PermitPool;
use crate::http::replenisher::{Replenisher, ReplenisherState};
use crate::transport::{HttpTransport, Transport};
use crate::utils::time::elapsed_ms;

// Stored lowercase; the client writes it as `Signature` on the wire.
const SIGNATURE_HEADER: &str = "signature";

/// Rate-limited client for the document-creation endpoint.
///
/// Every submission takes one permit from the pool before it is sent.
/// Permits are never refunded, even when the request fails; they come
/// back only when the replenisher ticks.
pub struct DocumentGateway {
    transport: Arc<dyn Transport>,
    endpoint: Url,
    pool: Arc<PermitPool>,
    replenisher: Replenisher,
    // Present only in `SubmitMode::Serialized`.
    submit_lock: Option<Mutex<()>>,
    stats: Arc<Stats>,
}

impl DocumentGateway {
    /// Starts the replenisher on the current tokio runtime.
    /// Outside a runtime this fails with [`AppError::Init`].
    pub fn new(
        limiter: &LimiterConfig,
        config: &GatewayConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        limiter.validate()?;
        let endpoint = Url::parse(&config.endpoint)?;

        let pool = Arc::new(PermitPool::new(limiter.capacity())?);
        let replenisher = Replenisher::spawn(pool.clone(), limiter.interval, limiter.refill_amount())?;

        let submit_lock = match limiter.submit_mode {
            SubmitMode::AdmissionOnly => None,
            SubmitMode::Serialized => Some(Mutex::new(())),
        };

        info!(
            "Gateway ready: {} requests per {:?} to {} ({:?})",
            limiter.request_limit, limiter.interval, endpoint, limiter.submit_mode
        );

        Ok(Self {
            transport,
            endpoint,
            pool,
            replenisher,
            submit_lock,
            stats: Arc::new(Stats::new()),
        })
    }

    /// Gateway over the real HTTP transport.
    pub fn with_http(limiter: &LimiterConfig, config: &GatewayConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config)?);
        Self::new(limiter, config, transport)
    }

    /// Serializes `payload` as JSON and submits it.
    ///
    /// A payload that fails to serialize is rejected before a permit is taken.
    pub async fn submit<T: Serialize + ?Sized>(&self, payload: &T, signature: &str) -> Result<u16> {
        let body = serde_json::to_vec(payload)?;
        self.submit_raw(body, signature).await
    }

    /// Waits for a permit, then POSTs `body` unchanged.
    ///
    /// Returns the status code on 2xx and [`AppError::Status`] otherwise.
    /// Transport errors are passed through; nothing is retried.
    pub async fn submit_raw(&self, body: Vec<u8>, signature: &str) -> Result<u16> {
        let headers = build_headers(signature)?;
        let start = Instant::now();
        self.stats.inc_submitted();

        let _serial = match &self.submit_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        if let Err(e) = self.pool.acquire().await {
            self.stats.inc_cancelled();
            return Err(e);
        }

        let result = self.transport.send(&self.endpoint, headers, body).await;
        self.stats.update_submit_latency(elapsed_ms(start));

        match result {
            Ok(status) if (200..300).contains(&status) => {
                self.stats.inc_successful();
                debug!("Document accepted with status {}", status);
                Ok(status)
            }
            Ok(status) => {
                self.stats.inc_failed();
                warn!("Document rejected with status {}", status);
                Err(AppError::Status { status })
            }
            Err(e) => {
                self.stats.inc_failed();
                warn!("Document submission failed: {}", e);
                Err(e)
            }
        }
    }

    /// Stops the replenisher and closes the pool. Waiting and later
    /// submissions fail with [`AppError::Cancelled`].
    pub async fn shutdown(&self) {
        self.replenisher.stop().await;
        self.pool.close();
        info!("Gateway shut down");
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn permits(&self) -> &PermitPool {
        &self.pool
    }

    pub fn replenisher_state(&self) -> ReplenisherState {
        self.replenisher.state()
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }
}

fn build_headers(signature: &str) -> Result<HeaderMap> {
    let signature = HeaderValue::from_str(signature)
        .map_err(|e| AppError::Header(format!("signature: {}", e)))?;

    let mut headers = HeaderMap::with_capacity(2);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(HeaderName::from_static(SIGNATURE_HEADER), signature);
    Ok(headers)
}
