//! Revocation evidence: OCSP responses and CRLs for one certificate.
//!
//! OCSP is tried first for every responder listed in the Authority
//! Information Access extension; CRL distribution points are the fallback.
//! The raw response bytes are kept for embedding, whatever the status.

use std::sync::Arc;

use openssl::hash::MessageDigest;
use openssl::ocsp::{OcspCertId, OcspCertStatus, OcspRequest, OcspResponse, OcspResponseStatus};
use openssl::x509::X509;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::{DistributionPointName, GeneralName, ParsedExtension};
use x509_parser::oid_registry::{OID_PKIX_ACCESS_DESCRIPTOR_CA_ISSUERS, OID_PKIX_ACCESS_DESCRIPTOR_OCSP};
use x509_parser::prelude::FromDer;
use x509_parser::revocation_list::CertificateRevocationList;

use crate::error::{Error, Result};
use crate::signatures::identity::parse_certificate;
use crate::signatures::transport::HttpTransport;

/// Revocation data collected for one certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationEntry {
    /// SHA-1 of the certificate DER
    pub certificate_digest: Vec<u8>,
    /// DER OCSPResponse
    pub ocsp_response: Option<Vec<u8>>,
    /// DER CertificateList
    pub crl: Option<Vec<u8>>,
    /// The evidence says the certificate is revoked
    pub revoked: bool,
}

/// Fetches OCSP responses, CRLs and missing issuer certificates.
pub struct RevocationFetcher {
    transport: Arc<dyn HttpTransport>,
}

impl std::fmt::Debug for RevocationFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevocationFetcher").finish_non_exhaustive()
    }
}

impl RevocationFetcher {
    /// Fetcher over `transport`.
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// Revocation evidence for `cert_der`, issued by `issuer_der`.
    ///
    /// OCSP needs the issuer to name the certificate; without it only the CRL
    /// distribution points are tried. Fails with [`Error::NetworkTimeout`]
    /// when every source timed out, otherwise with
    /// [`Error::RevocationUnavailable`] when none yields a usable answer.
    pub fn fetch(&self, cert_der: &[u8], issuer_der: Option<&[u8]>) -> Result<ValidationEntry> {
        let cert = parse_certificate(cert_der)?;
        let subject = cert.subject().to_string();
        let mut entry = ValidationEntry {
            certificate_digest: crate::signatures::types::DigestAlgorithm::Sha1.digest(cert_der),
            ocsp_response: None,
            crl: None,
            revoked: false,
        };
        let mut attempts = Attempts::default();

        let responders = ocsp_urls(&cert);
        match issuer_der {
            Some(issuer_der) => {
                for url in responders {
                    match self.fetch_ocsp(&url, cert_der, issuer_der) {
                        Ok((response, revoked)) => {
                            if revoked {
                                log::warn!("OCSP responder {} reports '{}' as revoked", url, subject);
                            }
                            entry.ocsp_response = Some(response);
                            entry.revoked = revoked;
                            return Ok(entry);
                        },
                        Err(e) => {
                            log::debug!("OCSP {} failed for '{}': {}", url, subject, e);
                            attempts.record("OCSP", &url, e);
                        },
                    }
                }
            },
            None if !responders.is_empty() => {
                log::debug!("issuer of '{}' unknown, OCSP skipped", subject);
                attempts.skip("OCSP skipped: issuer certificate not available");
            },
            None => {},
        }

        for url in crl_urls(&cert) {
            match self.fetch_crl(&url, &cert) {
                Ok((crl, revoked)) => {
                    if revoked {
                        log::warn!("CRL {} lists '{}' as revoked", url, subject);
                    }
                    entry.crl = Some(crl);
                    entry.revoked = revoked;
                    return Ok(entry);
                },
                Err(e) => {
                    log::debug!("CRL {} failed for '{}': {}", url, subject, e);
                    attempts.record("CRL", &url, e);
                },
            }
        }

        Err(attempts.into_error(subject))
    }

    fn fetch_ocsp(&self, url: &str, cert_der: &[u8], issuer_der: &[u8]) -> Result<(Vec<u8>, bool)> {
        let subject = X509::from_der(cert_der)?;
        let issuer = X509::from_der(issuer_der)?;
        let mut request = OcspRequest::new()?;
        request.add_id(OcspCertId::from_cert(MessageDigest::sha1(), &subject, &issuer)?)?;
        let body = request.to_der()?;

        let bytes = self.transport.post(
            url,
            "application/ocsp-request",
            "application/ocsp-response",
            &body,
            None,
        )?;
        let response = OcspResponse::from_der(&bytes)?;
        if response.status() != OcspResponseStatus::SUCCESSFUL {
            return Err(Error::Http {
                url: url.to_string(),
                reason: format!("OCSP response status {}", response.status().as_raw()),
            });
        }
        let basic = response.basic()?;
        let id = OcspCertId::from_cert(MessageDigest::sha1(), &subject, &issuer)?;
        let status = basic.find_status(&id).ok_or_else(|| Error::Http {
            url: url.to_string(),
            reason: "OCSP response does not cover the certificate".to_string(),
        })?;
        if status.status == OcspCertStatus::UNKNOWN {
            return Err(Error::Http {
                url: url.to_string(),
                reason: "OCSP responder does not know the certificate".to_string(),
            });
        }
        Ok((bytes, status.status == OcspCertStatus::REVOKED))
    }

    fn fetch_crl(&self, url: &str, cert: &X509Certificate<'_>) -> Result<(Vec<u8>, bool)> {
        let bytes = self.transport.get(url, "application/pkix-crl")?;
        let (_, crl) = CertificateRevocationList::from_der(&bytes)
            .map_err(|e| Error::Encoding(format!("CRL from {}: {}", url, e)))?;
        if crl.issuer().as_raw() != cert.issuer().as_raw() {
            return Err(Error::Http {
                url: url.to_string(),
                reason: format!("CRL issued by '{}', not '{}'", crl.issuer(), cert.issuer()),
            });
        }
        let serial = cert.raw_serial();
        let revoked = crl.iter_revoked_certificates().any(|r| r.raw_serial() == serial);
        drop(crl);
        Ok((bytes, revoked))
    }

    /// Download the issuer of `cert_der` through its AIA caIssuers URLs.
    pub fn fetch_issuer(&self, cert_der: &[u8]) -> Result<Option<Vec<u8>>> {
        let cert = parse_certificate(cert_der)?;
        for url in ca_issuer_urls(&cert) {
            let bytes = match self.transport.get(&url, "application/pkix-cert") {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::debug!("caIssuers {} failed: {}", url, e);
                    continue;
                },
            };
            let issuer = match X509::from_der(&bytes).or_else(|_| X509::from_pem(&bytes)) {
                Ok(issuer) => issuer.to_der()?,
                Err(e) => {
                    log::debug!("caIssuers {} returned no certificate: {}", url, e);
                    continue;
                },
            };
            if crate::signatures::identity::issued_by(&cert, &parse_certificate(&issuer)?) {
                log::debug!("fetched issuer of '{}' from {}", cert.subject(), url);
                return Ok(Some(issuer));
            }
        }
        Ok(None)
    }
}

/// Why each revocation source failed for one certificate.
#[derive(Debug, Default)]
struct Attempts {
    notes: Vec<String>,
    timeout: Option<Error>,
    other_failure: bool,
}

impl Attempts {
    fn record(&mut self, source: &str, url: &str, error: Error) {
        self.notes.push(format!("{} {}: {}", source, url, error));
        if matches!(error, Error::NetworkTimeout { .. }) {
            self.timeout = Some(error);
        } else {
            self.other_failure = true;
        }
    }

    fn skip(&mut self, note: &str) {
        self.notes.push(note.to_string());
        self.other_failure = true;
    }

    fn into_error(self, subject: String) -> Error {
        match self.timeout {
            Some(timeout) if !self.other_failure => timeout,
            _ if self.notes.is_empty() => Error::RevocationUnavailable {
                subject,
                reason: "certificate names no OCSP responder and no CRL distribution point".to_string(),
            },
            _ => Error::RevocationUnavailable {
                subject,
                reason: self.notes.join("; "),
            },
        }
    }
}

/// OCSP responder URLs from the AIA extension.
pub fn ocsp_urls(cert: &X509Certificate<'_>) -> Vec<String> {
    aia_urls(cert, true)
}

/// caIssuers URLs from the AIA extension.
pub fn ca_issuer_urls(cert: &X509Certificate<'_>) -> Vec<String> {
    aia_urls(cert, false)
}

fn aia_urls(cert: &X509Certificate<'_>, ocsp: bool) -> Vec<String> {
    let method = if ocsp {
        &OID_PKIX_ACCESS_DESCRIPTOR_OCSP
    } else {
        &OID_PKIX_ACCESS_DESCRIPTOR_CA_ISSUERS
    };
    let mut urls = Vec::new();
    for ext in cert.extensions() {
        if let ParsedExtension::AuthorityInfoAccess(aia) = ext.parsed_extension() {
            for desc in aia.iter() {
                if desc.access_method == *method {
                    if let GeneralName::URI(uri) = &desc.access_location {
                        urls.push(uri.to_string());
                    }
                }
            }
        }
    }
    urls
}

/// HTTP(S) URLs of the CRL distribution points.
pub fn crl_urls(cert: &X509Certificate<'_>) -> Vec<String> {
    let mut urls = Vec::new();
    for ext in cert.extensions() {
        if let ParsedExtension::CRLDistributionPoints(points) = ext.parsed_extension() {
            for point in points.iter() {
                if let Some(DistributionPointName::FullName(names)) = &point.distribution_point {
                    for name in names {
                        if let GeneralName::URI(uri) = name {
                            if uri.starts_with("http") {
                                urls.push(uri.to_string());
                            }
                        }
                    }
                }
            }
        }
    }
    urls
}
