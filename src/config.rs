//! Signing configuration.
//!
//! Values come from defaults, optionally overridden by a JSON parameters
//! file, then by command-line switches.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::signatures::{CertificateHolder, DigestAlgorithm, SignatureRequest, TimestampPolicy, TsaConfig};

/// Reason written into /Reason when none is configured.
pub const DEFAULT_REASON: &str = "Approved";
/// Location used when neither the configuration nor the certificate names one.
pub const DEFAULT_LOCATION: &str = "Jakarta";
/// Signer name used when the certificate has no common name.
pub const DEFAULT_SIGNER_NAME: &str = "PDF Signer v1.0.0";
/// Public time-stamp authority used by default.
pub const DEFAULT_TSA_URL: &str = "https://freetsa.org/tsr";
/// Network timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Configuration for signing runs.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SignerConfig {
    /// Keystore entry to use; the first key entry when absent
    pub alias: Option<String>,
    /// Reason for signing
    pub reason: String,
    /// Signing location; the certificate's locality when absent
    pub location: Option<String>,
    /// Signer name; the certificate's common name when absent
    pub signer_name: Option<String>,
    /// TSA endpoint; empty disables timestamping
    pub tsa_url: String,
    /// TSA Basic-auth user
    pub tsa_username: Option<String>,
    /// TSA Basic-auth password
    pub tsa_password: Option<String>,
    /// Produce an LTV copy of every signed file
    pub ltv: bool,
    /// Deadline for each network request
    pub timeout_secs: u64,
    /// Digest algorithm for document and attributes
    pub digest_algorithm: DigestAlgorithm,
    /// Behaviour when the TSA fails
    pub timestamp_policy: TimestampPolicy,
    /// Certify the first signature of a document (DocMDP P=2)
    pub certify: bool,
}

impl fmt::Debug for SignerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerConfig")
            .field("alias", &self.alias)
            .field("reason", &self.reason)
            .field("location", &self.location)
            .field("signer_name", &self.signer_name)
            .field("tsa_url", &self.tsa_url)
            .field("tsa_username", &self.tsa_username)
            .field("tsa_password", &self.tsa_password.as_ref().map(|_| "[REDACTED]"))
            .field("ltv", &self.ltv)
            .field("timeout_secs", &self.timeout_secs)
            .field("digest_algorithm", &self.digest_algorithm)
            .field("timestamp_policy", &self.timestamp_policy)
            .field("certify", &self.certify)
            .finish()
    }
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SignerConfig {
    /// Create new configuration with defaults.
    pub fn new() -> Self {
        Self {
            alias: None,
            reason: DEFAULT_REASON.to_string(),
            location: None,
            signer_name: None,
            tsa_url: DEFAULT_TSA_URL.to_string(),
            tsa_username: None,
            tsa_password: None,
            ltv: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            digest_algorithm: DigestAlgorithm::Sha256,
            timestamp_policy: TimestampPolicy::Continue,
            certify: true,
        }
    }

    /// Load a JSON parameters file. Unknown fields are ignored.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config = Self::from_json_str(&text).map_err(|e| match e {
            Error::Config(reason) => Error::Config(format!("{}: {}", path.display(), reason)),
            other => other,
        })?;
        log::debug!("loaded parameters from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Parse JSON parameters.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Disable timestamping.
    pub fn without_tsa(mut self) -> Self {
        self.tsa_url.clear();
        self
    }

    /// Enable or disable the LTV pass.
    pub fn with_ltv(mut self, enable: bool) -> Self {
        self.ltv = enable;
        self
    }

    /// Set the reason for signing.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Network timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// TSA settings, or None when timestamping is disabled.
    pub fn tsa_config(&self) -> Option<TsaConfig> {
        let url = self.tsa_url.trim();
        if url.is_empty() {
            return None;
        }
        let mut tsa = TsaConfig::new(url).with_timeout(self.timeout());
        if let Some(user) = self.tsa_username.as_deref().filter(|u| !u.is_empty()) {
            tsa = tsa.with_auth(user, self.tsa_password.clone().unwrap_or_default());
        }
        Some(tsa)
    }

    /// A request for `source`, filling location and name from the signer
    /// certificate where the configuration leaves them open.
    pub fn request_for(&self, source: impl Into<PathBuf>, holder: &CertificateHolder) -> SignatureRequest {
        let location = self
            .location
            .clone()
            .or_else(|| holder.location.clone())
            .unwrap_or_else(|| DEFAULT_LOCATION.to_string());
        let signer_name = self
            .signer_name
            .clone()
            .or_else(|| holder.name.clone())
            .unwrap_or_else(|| DEFAULT_SIGNER_NAME.to_string());
        let mut request = SignatureRequest::new(source)
            .with_reason(self.reason.clone())
            .with_location(location)
            .with_signer_name(signer_name)
            .with_timestamp_policy(self.timestamp_policy)
            .with_certify(self.certify);
        if let Some(tsa) = self.tsa_config() {
            request = request.with_tsa(tsa);
        }
        request
    }
}
