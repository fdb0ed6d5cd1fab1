//! HTTP transport used for TSA, OCSP, CRL and caIssuers requests.
//!
//! Everything network-bound goes through [`HttpTransport`] so tests can
//! answer requests without touching the network.

use std::time::Duration;

use crate::error::{Error, Result};

/// User agent sent with every request.
pub const USER_AGENT: &str = "PDF Signer v1.0.0";

/// Default deadline for a single request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Basic-auth credentials.
pub type BasicAuth<'a> = Option<(&'a str, &'a str)>;

/// Blocking HTTP client.
///
/// Implementations return [`Error::NetworkTimeout`] when the deadline passes
/// and [`Error::Http`] for every other failure, including non-2xx statuses.
pub trait HttpTransport: Send + Sync {
    /// POST `body` and return the response body.
    fn post(&self, url: &str, content_type: &str, accept: &str, body: &[u8], auth: BasicAuth<'_>) -> Result<Vec<u8>>;

    /// GET `url` and return the response body.
    fn get(&self, url: &str, accept: &str) -> Result<Vec<u8>>;
}

/// [`HttpTransport`] over `reqwest::blocking`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Client with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Http {
                url: String::new(),
                reason: format!("cannot create HTTP client: {}", e),
            })?;
        Ok(Self { client, timeout })
    }

    fn map_error(&self, url: &str, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::NetworkTimeout {
                url: url.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            Error::Http {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }

    fn read(&self, url: &str, response: reqwest::blocking::Response) -> Result<Vec<u8>> {
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            });
        }
        let body = response.bytes().map_err(|e| self.map_error(url, e))?;
        log::debug!("{} -> {} ({} bytes)", url, status, body.len());
        Ok(body.to_vec())
    }
}

impl HttpTransport for ReqwestTransport {
    fn post(&self, url: &str, content_type: &str, accept: &str, body: &[u8], auth: BasicAuth<'_>) -> Result<Vec<u8>> {
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", content_type)
            .header("Accept", accept)
            .body(body.to_vec());
        if let Some((user, pass)) = auth {
            request = request.basic_auth(user, Some(pass));
        }
        let response = request.send().map_err(|e| self.map_error(url, e))?;
        self.read(url, response)
    }

    fn get(&self, url: &str, accept: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .header("Accept", accept)
            .send()
            .map_err(|e| self.map_error(url, e))?;
        self.read(url, response)
    }
}
