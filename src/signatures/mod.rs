//! PDF digital signatures with long-term validation.
//!
//! Signing appends an incremental revision holding a detached CMS signature
//! (`adbe.pkcs7.detached`), optionally extended with an RFC 3161 time-stamp
//! token. A separate pass adds a Document Security Store with the OCSP
//! responses and CRLs a validator needs once the certificates have expired.
//!
//! ## Pipeline
//!
//! - [`IncrementalSigner`] reserves the `/ByteRange` and `/Contents`
//!   placeholders and drives the steps below.
//! - [`ByteRangeDigester`] hashes the file outside the placeholder gap.
//! - [`DetachedSignatureBuilder`] signs the digest into a CMS SignedData.
//! - [`TimestampClient`] and [`TimestampEmbedder`] add the signature
//!   timestamp as an unsigned attribute.
//! - [`ValidationInfoAssembler`] writes `/DSS` in a second revision.
//!
//! ## Example
//!
//! ```ignore
//! use pdf_ltv_signer::signatures::{IncrementalSigner, Keystore, SignatureRequest, DigestAlgorithm};
//!
//! let keystore = Keystore::load("digsig.store", "123456", Some("digsig"))?;
//! let identity = keystore.signing_identity(DigestAlgorithm::Sha256)?;
//! let request = SignatureRequest::new("sign_me.pdf").with_reason("Created and signed");
//! IncrementalSigner::new().sign(&request, identity, "sign_me_signed.pdf")?;
//! ```
//!
//! ## PDF Specification Reference
//!
//! - ISO 32000-1:2008 Section 12.8 - Digital Signatures
//! - ETSI TS 102 778-4 - PAdES Long Term Validation
//! - RFC 3161 (TSP), RFC 6960 (OCSP), RFC 5280 (CRL), RFC 5652 (CMS)

pub mod byterange;
pub mod cms_builder;
pub mod embedder;
pub mod identity;
pub mod ltv;
pub mod revocation;
pub mod signer;
pub mod timestamp;
pub mod transport;
pub mod types;
pub mod verifier;

pub use byterange::{ByteRange, ByteRangeDigester};
pub use cms_builder::DetachedSignatureBuilder;
pub use embedder::TimestampEmbedder;
pub use identity::{CertificateHolder, KeyMaterial, Keystore, SigningIdentity};
pub use ltv::{LtvReport, ValidationInfoAssembler};
pub use revocation::{RevocationFetcher, ValidationEntry};
pub use signer::{IncrementalSigner, SigningState};
pub use timestamp::{TimestampClient, TimestampToken, TsaConfig};
pub use transport::{HttpTransport, ReqwestTransport};
pub use types::{
    DigestAlgorithm, SignOutcome, SignWarning, SignatureAlgorithm, SignatureRequest, SignatureSubFilter,
    SigningStep, TimestampPolicy, VerificationResult, VerificationStatus,
};
pub use verifier::SignatureVerifier;
