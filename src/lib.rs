// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::too_many_arguments)]
#![allow(clippy::enum_variant_names)]
#![allow(clippy::should_implement_trait)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]

//! # PDF LTV Signer
//!
//! Digital signatures for PDF documents that stay verifiable after the
//! signer's certificate has expired.
//!
//! ## Core Features
//!
//! - **Incremental Signing**: the signature is appended as a new revision;
//!   the original bytes are never rewritten
//! - **Detached CMS**: `adbe.pkcs7.detached` SignedData with signing time,
//!   message digest and ESS signing-certificate-v2 signed attributes
//! - **Certification**: the first signature sets DocMDP P=2; documents
//!   locked with P=1 are refused
//! - **Timestamps**: RFC 3161 signature timestamps from any TSA, with
//!   optional Basic authentication
//! - **Long-Term Validation**: OCSP responses and CRLs gathered into a
//!   Document Security Store (`/DSS`, `/VRI`) in a second revision
//! - **Verification**: byte range, digest and signature value checks for
//!   every signature in a document
//!
//! ## Quick Start
//!
//! ```ignore
//! use pdf_ltv_signer::batch::BatchSigner;
//! use pdf_ltv_signer::config::SignerConfig;
//! use pdf_ltv_signer::signatures::Keystore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let keystore = Keystore::load("digsig.store", "123456", Some("digsig"))?;
//! let config = SignerConfig::default().with_reason("Created and signed");
//!
//! // Writes sign_me_signed.pdf and sign_me_signed_LTV.pdf
//! let report = BatchSigner::new(keystore, config)?.sign_path("sign_me.pdf")?;
//! assert!(report.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! Licensed under either of:
//!
//! * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//! * MIT license ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]

// Error handling
pub mod error;

// Core PDF reading
pub mod document;
pub mod lexer;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod xref;

// Stream decoders
pub mod decoders;

// Incremental writing
pub mod writer;

// Signing, timestamps and LTV
pub mod signatures;

// Configuration and batch runs
pub mod batch;
pub mod config;

// Re-exports
pub use batch::{BatchReport, BatchSigner};
pub use config::SignerConfig;
pub use document::PdfDocument;
pub use error::{Error, KeystoreError, Result};
pub use signatures::{
    CertificateHolder, IncrementalSigner, Keystore, SignatureRequest, SignatureVerifier, SigningIdentity,
    ValidationInfoAssembler,
};

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
