//! Error types for the signer.
//!
//! [`Error`] covers PDF parsing, incremental writing and every signing stage.
//! Keystore loading has its own tagged result type, [`KeystoreError`], which
//! converts into [`Error::Keystore`] when it crosses into the signing flow.

use std::path::PathBuf;

/// Result type alias for signer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while reading, signing or extending a PDF.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: expected '%PDF-', found '{0}'")]
    InvalidHeader(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Reason for parse failure
        reason: String,
    },

    /// Invalid cross-reference table
    #[error("Invalid cross-reference table: {0}")]
    InvalidXref(String),

    /// Referenced object not found in cross-reference table
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Unexpected end of file
    #[error("End of file reached unexpectedly")]
    UnexpectedEof,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unsupported feature
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Invalid PDF structure (generic)
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported stream filter
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    /// Circular reference detected in object graph
    #[error("Circular reference detected: object {0}")]
    CircularReference(crate::object::ObjectRef),

    /// Recursion depth limit exceeded
    #[error("Recursion depth limit exceeded (max: {0})")]
    RecursionLimitExceeded(u32),

    /// ByteRange does not describe the file: negative, overlapping or out of bounds
    #[error("Malformed ByteRange {ranges:?} for a file of {file_len} bytes: {reason}")]
    MalformedByteRange {
        /// The four ByteRange integers as found
        ranges: Vec<i64>,
        /// Length of the file being digested
        file_len: u64,
        /// What was wrong
        reason: String,
    },

    /// The private key could not be used to produce a signature
    #[error("Signing key error: {0}")]
    SigningKey(String),

    /// The signer certificate does not permit document signing
    #[error("Certificate '{subject}' does not allow signing: {reason}")]
    CertificateUsage {
        /// Subject of the offending certificate
        subject: String,
        /// Which usage check failed
        reason: String,
    },

    /// The signer certificate is outside its validity window
    #[error("Certificate '{subject}' is not valid at {at}: valid {not_before} to {not_after}")]
    CertificateExpired {
        /// Subject of the offending certificate
        subject: String,
        /// Signing time checked against
        at: String,
        /// Start of validity
        not_before: String,
        /// End of validity
        not_after: String,
    },

    /// A certification signature forbids any further change
    #[error("Document is locked by a certification signature (DocMDP P={permission})")]
    DocumentLocked {
        /// DocMDP permission level found
        permission: i64,
    },

    /// The time-stamp authority did not return a usable token
    #[error("Timestamp unavailable from {url}: {reason}")]
    TimestampUnavailable {
        /// TSA endpoint
        url: String,
        /// Transport failure or PKI status
        reason: String,
    },

    /// A network request exceeded its deadline
    #[error("Network timeout after {timeout_secs}s contacting {url}")]
    NetworkTimeout {
        /// Endpoint that timed out
        url: String,
        /// Configured timeout
        timeout_secs: u64,
    },

    /// Neither OCSP nor CRL evidence could be obtained for a certificate
    #[error("Revocation data unavailable for '{subject}': {reason}")]
    RevocationUnavailable {
        /// Subject of the certificate left uncovered
        subject: String,
        /// Why each source failed
        reason: String,
    },

    /// HTTP transport failure other than a timeout
    #[error("HTTP request to {url} failed: {reason}")]
    Http {
        /// Endpoint
        url: String,
        /// Status or transport message
        reason: String,
    },

    /// The encoded CMS does not fit the reserved /Contents gap
    #[error("Signature of {needed} bytes does not fit the {reserved}-byte placeholder")]
    SignatureTooLarge {
        /// Encoded CMS size
        needed: usize,
        /// Reserved binary capacity
        reserved: usize,
    },

    /// DER/CMS/X.509 encoding or decoding failure
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Keystore could not be used
    #[error("Keystore error: {0}")]
    Keystore(#[from] KeystoreError),

    /// Parameters file is unreadable or not valid JSON
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the signing flow may continue without the failed step.
    ///
    /// Only timestamp and network failures qualify; everything else aborts the
    /// file being signed.
    pub fn is_recoverable_timestamp_failure(&self) -> bool {
        matches!(self, Error::TimestampUnavailable { .. } | Error::NetworkTimeout { .. })
    }
}

impl From<der::Error> for Error {
    fn from(err: der::Error) -> Self {
        Error::Encoding(err.to_string())
    }
}

impl From<openssl::error::ErrorStack> for Error {
    fn from(err: openssl::error::ErrorStack) -> Self {
        Error::Encoding(err.to_string())
    }
}

/// Errors raised while opening a PKCS#12 keystore.
#[derive(Debug, thiserror::Error)]
pub enum KeystoreError {
    /// Keystore file could not be read
    #[error("cannot read keystore {path}: {source}")]
    Io {
        /// Keystore path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Wrong passphrase or corrupt PKCS#12 container
    #[error("cannot decrypt keystore: {0}")]
    Decrypt(String),

    /// No entry with the requested alias
    #[error("alias '{requested}' not found (available: {available:?})")]
    AliasNotFound {
        /// Alias asked for
        requested: String,
        /// Aliases present in the keystore
        available: Vec<String>,
    },

    /// Keystore has no private key
    #[error("keystore contains no private key")]
    MissingPrivateKey,

    /// Keystore has no end-entity certificate
    #[error("keystore contains no certificate")]
    MissingCertificate,

    /// Key algorithm cannot be used for PDF signing
    #[error("unsupported key type: {0}")]
    UnsupportedKey(String),

    /// Key or certificate bytes could not be decoded
    #[error("malformed keystore content: {0}")]
    Malformed(String),
}
