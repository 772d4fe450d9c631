//! HTTP probe check.

use crate::error::{DrError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Issues a GET and reports the status code.
#[async_trait]
pub trait HttpProber: Send + Sync {
    /// Status code of `GET url`. Connection failures are
    /// [`DrError::ProbeConnection`], never a status code.
    async fn get_status(&self, url: &str) -> Result<u16>;
}

/// [`HttpProber`] backed by `reqwest`. Redirects are not followed so the
/// code compared is the one the endpoint itself returned.
pub struct ReqwestProber {
    client: reqwest::Client,
}

impl ReqwestProber {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| DrError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpProber for ReqwestProber {
    async fn get_status(&self, url: &str) -> Result<u16> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DrError::ProbeConnection(format!("GET {}: {}", url, e)))?;
        Ok(response.status().as_u16())
    }
}
