//! RFC 3161 time-stamp protocol client.
//!
//! One request per call, no retries: a failed exchange surfaces as
//! [`Error::TimestampUnavailable`] (or [`Error::NetworkTimeout`]) and the
//! caller decides whether to continue without a timestamp.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use der::asn1::{Int, OctetString};
use der::{Decode, Encode};
use x509_tsp::{MessageImprint, TimeStampReq, TimeStampResp, TspVersion, TstInfo};

use crate::error::{Error, Result};
use crate::signatures::cms_builder::{decode_signed_data, digest_algorithm_identifier};
use crate::signatures::transport::{HttpTransport, ReqwestTransport, DEFAULT_TIMEOUT};
use crate::signatures::types::DigestAlgorithm;

const QUERY_CONTENT_TYPE: &str = "application/timestamp-query";
const REPLY_CONTENT_TYPE: &str = "application/timestamp-reply";

/// PKIStatus values that carry a token.
const STATUS_GRANTED: u8 = 0;
const STATUS_GRANTED_WITH_MODS: u8 = 1;

/// Time-stamp authority endpoint and credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct TsaConfig {
    /// TSA URL
    pub url: String,
    /// Basic-auth user
    pub username: Option<String>,
    /// Basic-auth password
    pub password: Option<String>,
    /// Request deadline
    pub timeout: Duration,
    /// Ask the TSA to include its certificate
    pub cert_req: bool,
}

impl fmt::Debug for TsaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TsaConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .field("cert_req", &self.cert_req)
            .finish()
    }
}

impl TsaConfig {
    /// Unauthenticated TSA with the default timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            timeout: DEFAULT_TIMEOUT,
            cert_req: true,
        }
    }

    /// Use HTTP Basic authentication.
    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn auth(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            (Some(user), None) => Some((user.as_str(), "")),
            _ => None,
        }
    }
}

/// A validated time-stamp token.
#[derive(Debug, Clone)]
pub struct TimestampToken {
    /// DER `ContentInfo(SignedData)` carrying the TSTInfo
    pub der: Vec<u8>,
    /// genTime from the TSTInfo
    pub gen_time: DateTime<Utc>,
}

/// RFC 3161 client.
pub struct TimestampClient {
    transport: Arc<dyn HttpTransport>,
}

impl fmt::Debug for TimestampClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimestampClient").finish_non_exhaustive()
    }
}

impl TimestampClient {
    /// Client over a custom transport.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Client over `reqwest` with the config's timeout.
    pub fn for_config(config: &TsaConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(ReqwestTransport::new(config.timeout)?)))
    }

    /// Request a token for `digest`, the hash of the CMS signature value.
    ///
    /// The response must echo our nonce and message imprint.
    pub fn request_timestamp(
        &self,
        digest: &[u8],
        algorithm: DigestAlgorithm,
        config: &TsaConfig,
    ) -> Result<TimestampToken> {
        let unavailable = |reason: String| Error::TimestampUnavailable {
            url: config.url.clone(),
            reason,
        };
        let nonce = random_nonce()?;
        let request = TimeStampReq {
            version: TspVersion::V1,
            message_imprint: MessageImprint {
                hash_algorithm: digest_algorithm_identifier(algorithm),
                hashed_message: OctetString::new(digest)?,
            },
            req_policy: None,
            nonce: Some(Int::new(&nonce)?),
            cert_req: config.cert_req,
            extensions: None,
        };
        let body = request.to_der()?;
        log::debug!("requesting timestamp from {} ({} byte request)", config.url, body.len());

        let response = self
            .transport
            .post(&config.url, QUERY_CONTENT_TYPE, REPLY_CONTENT_TYPE, &body, config.auth())
            .map_err(|e| match e {
                Error::NetworkTimeout { .. } => e,
                Error::Http { reason, .. } => unavailable(reason),
                other => unavailable(other.to_string()),
            })?;

        parse_response(&response, digest, &nonce).map_err(|e| match e {
            Error::TimestampUnavailable { reason, .. } => unavailable(reason),
            other => unavailable(format!("malformed response: {}", other)),
        })
    }
}

/// 64-bit positive nonce with the top bit clear.
fn random_nonce() -> Result<[u8; 8]> {
    let mut nonce = [0u8; 8];
    openssl::rand::rand_bytes(&mut nonce)?;
    nonce[0] = (nonce[0] & 0x7F) | 0x40;
    Ok(nonce)
}

fn parse_response(bytes: &[u8], digest: &[u8], nonce: &[u8]) -> Result<TimestampToken> {
    let rejected = |reason: String| Error::TimestampUnavailable {
        url: String::new(),
        reason,
    };
    let response = TimeStampResp::from_der(bytes)?;
    let status = u8::from_der(&response.status.status.to_der()?)?;
    if status != STATUS_GRANTED && status != STATUS_GRANTED_WITH_MODS {
        return Err(rejected(format!("TSA answered with PKIStatus {}", status)));
    }
    let token = response
        .time_stamp_token
        .ok_or_else(|| rejected("response carries no token".to_string()))?;
    let der = token.to_der()?;
    let tst_info = token_info(&der)?;

    match &tst_info.nonce {
        Some(echoed) if echoed.as_bytes() == nonce => {},
        Some(_) => return Err(rejected("nonce mismatch".to_string())),
        None => return Err(rejected("nonce missing from TSTInfo".to_string())),
    }
    if tst_info.message_imprint.hashed_message.as_bytes() != digest {
        return Err(rejected("message imprint mismatch".to_string()));
    }

    let secs = tst_info.gen_time.to_unix_duration().as_secs() as i64;
    let gen_time = Utc
        .timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| rejected("genTime out of range".to_string()))?;
    log::info!("timestamp granted at {}", gen_time.to_rfc3339());
    Ok(TimestampToken { der, gen_time })
}

/// TSTInfo of a token (`ContentInfo(SignedData)` with an `id-ct-TSTInfo` eContent).
pub fn token_info(token_der: &[u8]) -> Result<TstInfo> {
    let signed = decode_signed_data(token_der)?;
    let econtent = signed
        .encap_content_info
        .econtent
        .as_ref()
        .ok_or_else(|| Error::Encoding("time-stamp token without eContent".to_string()))?;
    let octets = econtent.decode_as::<OctetString>()?;
    Ok(TstInfo::from_der(octets.as_bytes())?)
}
