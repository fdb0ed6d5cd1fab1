//! Digital signature types and data structures.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use der::asn1::ObjectIdentifier;
use serde::Deserialize;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::signatures::identity::CertificateHolder;
use crate::signatures::timestamp::TsaConfig;

/// Digest algorithm used for signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum DigestAlgorithm {
    /// SHA-1 (legacy, accepted for verification of old signatures)
    #[serde(rename = "SHA-1", alias = "SHA1")]
    Sha1,
    /// SHA-256 (recommended)
    #[default]
    #[serde(rename = "SHA-256", alias = "SHA256")]
    Sha256,
    /// SHA-384
    #[serde(rename = "SHA-384", alias = "SHA384")]
    Sha384,
    /// SHA-512
    #[serde(rename = "SHA-512", alias = "SHA512")]
    Sha512,
}

impl DigestAlgorithm {
    /// Algorithm OID as used in AlgorithmIdentifier.
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            DigestAlgorithm::Sha1 => ObjectIdentifier::new_unwrap("1.3.14.3.2.26"),
            DigestAlgorithm::Sha256 => ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1"),
            DigestAlgorithm::Sha384 => ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2"),
            DigestAlgorithm::Sha512 => ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3"),
        }
    }

    /// Map an AlgorithmIdentifier OID back to the algorithm.
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        [Self::Sha1, Self::Sha256, Self::Sha384, Self::Sha512]
            .into_iter()
            .find(|alg| alg.oid() == *oid)
    }

    /// Get the name of this algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "SHA-1",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Digest output length in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            DigestAlgorithm::Sha1 => 20,
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    /// One-shot digest.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        let mut state = self.hasher();
        state.update(data);
        state.finalize()
    }

    /// Incremental hasher.
    pub fn hasher(&self) -> DigestState {
        match self {
            DigestAlgorithm::Sha1 => DigestState::Sha1(Sha1::new()),
            DigestAlgorithm::Sha256 => DigestState::Sha256(Sha256::new()),
            DigestAlgorithm::Sha384 => DigestState::Sha384(Sha384::new()),
            DigestAlgorithm::Sha512 => DigestState::Sha512(Sha512::new()),
        }
    }
}

/// Running digest for any [`DigestAlgorithm`].
#[derive(Clone)]
pub enum DigestState {
    /// SHA-1 state
    Sha1(Sha1),
    /// SHA-256 state
    Sha256(Sha256),
    /// SHA-384 state
    Sha384(Sha384),
    /// SHA-512 state
    Sha512(Sha512),
}

impl DigestState {
    /// Feed bytes.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            DigestState::Sha1(h) => h.update(data),
            DigestState::Sha256(h) => h.update(data),
            DigestState::Sha384(h) => h.update(data),
            DigestState::Sha512(h) => h.update(data),
        }
    }

    /// Consume the state and return the digest.
    pub fn finalize(self) -> Vec<u8> {
        match self {
            DigestState::Sha1(h) => h.finalize().to_vec(),
            DigestState::Sha256(h) => h.finalize().to_vec(),
            DigestState::Sha384(h) => h.finalize().to_vec(),
            DigestState::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

/// Signature algorithm: key type plus the digest it signs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// RSASSA-PKCS1-v1_5
    RsaPkcs1v15(DigestAlgorithm),
    /// ECDSA over P-256
    EcdsaP256(DigestAlgorithm),
}

impl SignatureAlgorithm {
    /// Digest half of the pair.
    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        match self {
            SignatureAlgorithm::RsaPkcs1v15(d) | SignatureAlgorithm::EcdsaP256(d) => *d,
        }
    }

    /// AlgorithmIdentifier OID for `SignerInfo.signatureAlgorithm`.
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            SignatureAlgorithm::RsaPkcs1v15(d) => match d {
                DigestAlgorithm::Sha1 => ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.5"),
                DigestAlgorithm::Sha256 => ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11"),
                DigestAlgorithm::Sha384 => ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12"),
                DigestAlgorithm::Sha512 => ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13"),
            },
            SignatureAlgorithm::EcdsaP256(d) => match d {
                DigestAlgorithm::Sha1 => ObjectIdentifier::new_unwrap("1.2.840.10045.4.1"),
                DigestAlgorithm::Sha256 => ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2"),
                DigestAlgorithm::Sha384 => ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3"),
                DigestAlgorithm::Sha512 => ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.4"),
            },
        }
    }

    /// RSA algorithm identifiers carry explicit NULL parameters, ECDSA ones none.
    pub fn has_null_params(&self) -> bool {
        matches!(self, SignatureAlgorithm::RsaPkcs1v15(_))
    }

    /// Human-readable name, e.g. `SHA256withRSA`.
    pub fn name(&self) -> String {
        let digest = self.digest_algorithm().name().replace('-', "");
        match self {
            SignatureAlgorithm::RsaPkcs1v15(_) => format!("{}withRSA", digest),
            SignatureAlgorithm::EcdsaP256(_) => format!("{}withECDSA", digest),
        }
    }
}

/// Signature sub-filter written to the signature dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureSubFilter {
    /// adbe.pkcs7.detached - PKCS#7 detached signature
    #[default]
    Pkcs7Detached,
    /// ETSI.CAdES.detached - PAdES CAdES signature
    CadesDetached,
}

impl SignatureSubFilter {
    /// Get the PDF name for this sub-filter.
    pub fn as_pdf_name(&self) -> &'static str {
        match self {
            SignatureSubFilter::Pkcs7Detached => "adbe.pkcs7.detached",
            SignatureSubFilter::CadesDetached => "ETSI.CAdES.detached",
        }
    }

    /// Parse a PDF name into a sub-filter type.
    pub fn from_pdf_name(name: &str) -> Option<Self> {
        match name {
            "adbe.pkcs7.detached" => Some(SignatureSubFilter::Pkcs7Detached),
            "ETSI.CAdES.detached" => Some(SignatureSubFilter::CadesDetached),
            _ => None,
        }
    }
}

/// What to do when the time-stamp authority cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum TimestampPolicy {
    /// Keep the signature without a timestamp and report a warning
    #[default]
    #[serde(rename = "continue")]
    Continue,
    /// Fail the whole signing operation
    #[serde(rename = "abort")]
    Abort,
}

/// One signing operation on one document. Immutable once built.
#[derive(Debug, Clone)]
pub struct SignatureRequest {
    /// Document to sign; never modified
    pub source: PathBuf,
    /// Reason for signing (/Reason)
    pub reason: String,
    /// Signing location (/Location)
    pub location: String,
    /// Signer name (/Name)
    pub signer_name: String,
    /// Signing time, used for /M, the signing-time attribute and validity checks
    pub signing_time: DateTime<Utc>,
    /// Time-stamp authority; None disables timestamping
    pub tsa: Option<TsaConfig>,
    /// Behaviour when the TSA fails
    pub timestamp_policy: TimestampPolicy,
    /// Make the first signature a certification signature (DocMDP P=2)
    pub certify: bool,
    /// Signature sub-filter
    pub sub_filter: SignatureSubFilter,
}

impl SignatureRequest {
    /// Request with the default reason, location and signer name.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            reason: crate::config::DEFAULT_REASON.to_string(),
            location: crate::config::DEFAULT_LOCATION.to_string(),
            signer_name: crate::config::DEFAULT_SIGNER_NAME.to_string(),
            signing_time: Utc::now(),
            tsa: None,
            timestamp_policy: TimestampPolicy::Continue,
            certify: true,
            sub_filter: SignatureSubFilter::Pkcs7Detached,
        }
    }

    /// Set the reason for signing.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Set the signing location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Set the signer name.
    pub fn with_signer_name(mut self, name: impl Into<String>) -> Self {
        self.signer_name = name.into();
        self
    }

    /// Pin the signing time.
    pub fn with_signing_time(mut self, time: DateTime<Utc>) -> Self {
        self.signing_time = time;
        self
    }

    /// Enable timestamping.
    pub fn with_tsa(mut self, tsa: TsaConfig) -> Self {
        self.tsa = Some(tsa);
        self
    }

    /// Choose the TSA failure policy.
    pub fn with_timestamp_policy(mut self, policy: TimestampPolicy) -> Self {
        self.timestamp_policy = policy;
        self
    }

    /// Enable or disable certification of the first signature.
    pub fn with_certify(mut self, certify: bool) -> Self {
        self.certify = certify;
        self
    }
}

/// Stage of the signing pipeline, carried in warnings and batch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningStep {
    /// Loading keystore or document
    Load,
    /// DocMDP check and placeholder reservation
    ReservePlaceholder,
    /// ByteRange digest
    Digest,
    /// CMS construction
    BuildCms,
    /// TSA exchange and token embedding
    Timestamp,
    /// Writing signature bytes and renaming into place
    Finalize,
    /// DSS / VRI assembly
    Ltv,
}

impl std::fmt::Display for SigningStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SigningStep::Load => "load",
            SigningStep::ReservePlaceholder => "reserve placeholder",
            SigningStep::Digest => "digest",
            SigningStep::BuildCms => "build CMS",
            SigningStep::Timestamp => "timestamp",
            SigningStep::Finalize => "finalize",
            SigningStep::Ltv => "LTV",
        };
        f.write_str(name)
    }
}

/// A step that was skipped without failing the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignWarning {
    /// Skipped step
    pub step: SigningStep,
    /// Why it was skipped
    pub reason: String,
}

/// Result of a successful signing call.
#[derive(Debug, Clone)]
pub struct SignOutcome {
    /// Signed file
    pub output: PathBuf,
    /// Whether a timestamp token was embedded
    pub timestamped: bool,
    /// Whether the signature certified the document (DocMDP)
    pub certified: bool,
    /// Steps skipped along the way
    pub warnings: Vec<SignWarning>,
}

/// Result of signature verification.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    /// Field name of the signature
    pub field_name: String,
    /// Overall verification status
    pub status: VerificationStatus,
    /// Signer certificate fields
    pub signer: Option<CertificateHolder>,
    /// /ByteRange as found
    pub byte_range: Vec<i64>,
    /// Whether the byte range ends at the end of the file
    pub covers_whole_document: bool,
    /// Whether a signature timestamp token is embedded
    pub timestamped: bool,
    /// Digest algorithm declared by the signer
    pub digest_algorithm: Option<DigestAlgorithm>,
    /// /M entry, raw
    pub signing_time: Option<String>,
    /// Verification messages (errors, warnings)
    pub messages: Vec<String>,
}

/// Verification status of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationStatus {
    /// Signature value and digest match
    Valid,
    /// Signature value or digest mismatch
    Invalid,
    /// Signature could not be evaluated
    Unknown,
}

impl VerificationStatus {
    /// Check if the status indicates a valid signature.
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationStatus::Valid)
    }
}
