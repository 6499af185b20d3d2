//! Best-effort delivery of finished test results to the central gateway.
//!
//! Satellite test runners collect a result locally and hand it off with a
//! single bounded POST; a gateway that is slow, down, or rejecting must
//! never take the runner down with it, so every failure is logged and
//! returned for the caller to shrug off.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

/// Delivery failures. Callers treat these as non-fatal: the result stays
/// with the runner and the session continues.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway rejected submission: {0}")]
    Rejected(reqwest::StatusCode),
}

/// Client used by satellite test runners to post a finished test to the
/// central gateway's ingest endpoint.
#[derive(Debug, Clone)]
pub struct ResultDelivery {
    client: reqwest::Client,
    endpoint: String,
}

impl ResultDelivery {
    /// Default bound on one delivery attempt.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Build a client targeting the gateway at `base_url`, with `timeout`
    /// bounding the whole request.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!(
                "{}/api/save_test_result",
                base_url.trim_end_matches('/')
            ),
        })
    }

    /// Submit one finished-test payload. The payload should carry at least
    /// `test_name` and `patient_name`; remaining keys pass through to the
    /// store untouched.
    ///
    /// A timeout or refused connection surfaces as [`DeliveryError`] after
    /// one attempt; there are no retries.
    pub async fn deliver(&self, result: &Value) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(result)
            .send()
            .await
            .inspect_err(|err| {
                warn!(endpoint = %self.endpoint, error = %err, "could not reach central gateway");
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(endpoint = %self.endpoint, %status, "gateway rejected test result");
            return Err(DeliveryError::Rejected(status));
        }

        info!(endpoint = %self.endpoint, "test result delivered to gateway");
        Ok(())
    }
}
