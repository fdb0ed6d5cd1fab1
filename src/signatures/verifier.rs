//! PDF signature verification.
//!
//! Checks what signing produces: the byte range, the `messageDigest` signed
//! attribute against the recomputed digest, and the signature value against
//! the signer certificate's public key. Chain trust is not evaluated.

use std::path::Path;

use cms::signed_data::{SignedData, SignerIdentifier, SignerInfo};
use der::asn1::OctetString;
use der::{Decode, Encode};
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use signature::hazmat::PrehashVerifier;

use super::byterange::{ByteRange, ByteRangeDigester};
use super::cms_builder::{decode_signed_data, embedded_certificates, find_attribute, only_signer, ID_MESSAGE_DIGEST};
use super::embedder::embedded_token;
use super::identity::{parse_certificate, CertificateHolder};
use super::types::{DigestAlgorithm, VerificationResult, VerificationStatus};
use crate::document::PdfDocument;
use crate::error::{Error, Result};
use crate::object::{Dict, Object};

/// rsaEncryption
const RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";
/// id-ecPublicKey
const EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";

/// Verifier for PDF digital signatures.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureVerifier;

impl SignatureVerifier {
    /// Create a new signature verifier.
    pub fn new() -> Self {
        Self
    }

    /// Verify every signature in the document at `path`.
    pub fn verify_document(&self, path: impl AsRef<Path>) -> Result<Vec<VerificationResult>> {
        let mut doc = PdfDocument::open(path.as_ref())?;
        let signatures = doc.existing_signatures()?;
        log::debug!("{}: {} signature(s) to verify", path.as_ref().display(), signatures.len());
        let mut results = Vec::with_capacity(signatures.len());
        for field in signatures {
            if let Some(sig_dict) = &field.value {
                results.push(self.verify(doc.data(), &field.name, sig_dict));
            }
        }
        Ok(results)
    }

    /// Verify one signature dictionary against the file bytes.
    pub fn verify(&self, pdf_data: &[u8], field_name: &str, sig_dict: &Dict) -> VerificationResult {
        let mut result = VerificationResult {
            field_name: field_name.to_string(),
            status: VerificationStatus::Unknown,
            signer: None,
            byte_range: Vec::new(),
            covers_whole_document: false,
            timestamped: false,
            digest_algorithm: None,
            signing_time: sig_dict
                .get("M")
                .and_then(Object::as_string)
                .map(|m| String::from_utf8_lossy(m).into_owned()),
            messages: Vec::new(),
        };

        if let Some(Object::Array(values)) = sig_dict.get("ByteRange") {
            result.byte_range = values.iter().filter_map(Object::as_integer).collect();
        }
        let file_len = pdf_data.len() as u64;
        let range = match ByteRange::from_array(&result.byte_range, file_len) {
            Ok(range) => range,
            Err(e) => {
                result.status = VerificationStatus::Invalid;
                result.messages.push(e.to_string());
                return result;
            },
        };
        result.covers_whole_document = range.covers_to_end(file_len);
        if !result.covers_whole_document {
            result
                .messages
                .push("document was changed after this signature".to_string());
        }
        let (gap_start, gap_end) = range.gap();
        let gap = pdf_data.get(gap_start as usize..gap_end as usize).unwrap_or_default();
        if gap.len() < 2 || gap[0] != b'<' || gap[gap.len() - 1] != b'>' {
            result.status = VerificationStatus::Invalid;
            result
                .messages
                .push("ByteRange gap is not the /Contents hex string".to_string());
            return result;
        }

        let contents = match sig_dict.get("Contents").and_then(Object::as_string) {
            Some(contents) => contents,
            None => {
                result.status = VerificationStatus::Invalid;
                result.messages.push("signature has no /Contents".to_string());
                return result;
            },
        };

        match self.verify_cms(pdf_data, &range, contents, &mut result) {
            Ok(true) => result.status = VerificationStatus::Valid,
            Ok(false) => result.status = VerificationStatus::Invalid,
            Err(e) => {
                result.status = VerificationStatus::Unknown;
                result.messages.push(format!("cannot evaluate signature: {}", e));
            },
        }
        log::debug!("signature {}: {:?}", field_name, result.status);
        result
    }

    fn verify_cms(
        &self,
        pdf_data: &[u8],
        range: &ByteRange,
        contents: &[u8],
        result: &mut VerificationResult,
    ) -> Result<bool> {
        let signed_data = decode_signed_data(contents)?;
        let signer = only_signer(&signed_data)?;
        let algorithm = DigestAlgorithm::from_oid(&signer.digest_alg.oid)
            .ok_or_else(|| Error::Unsupported(format!("digest algorithm {}", signer.digest_alg.oid)))?;
        result.digest_algorithm = Some(algorithm);
        result.timestamped = embedded_token(contents)?.is_some();

        let leaf = signer_certificate(&signed_data, signer)?;
        result.signer = Some(CertificateHolder::from_der(&leaf)?);

        let digest = ByteRangeDigester::new(algorithm).digest_bytes(pdf_data, range)?;
        let signed_attrs = match &signer.signed_attrs {
            Some(attrs) => attrs,
            None => {
                result.messages.push("signature has no signed attributes".to_string());
                return Ok(false);
            },
        };
        let message_digest = find_attribute(Some(signed_attrs), &ID_MESSAGE_DIGEST)
            .map(|value| value.decode_as::<OctetString>())
            .transpose()?;
        match message_digest {
            Some(md) if md.as_bytes() == digest.as_slice() => {},
            Some(_) => {
                result.messages.push("document digest does not match messageDigest".to_string());
                return Ok(false);
            },
            None => {
                result.messages.push("messageDigest attribute missing".to_string());
                return Ok(false);
            },
        }

        let attrs_digest = algorithm.digest(&signed_attrs.to_der()?);
        if verify_signature_value(&leaf, algorithm, &attrs_digest, signer.signature.as_bytes())? {
            Ok(true)
        } else {
            result.messages.push("signature value does not verify".to_string());
            Ok(false)
        }
    }
}

/// DER of the certificate named by the SignerInfo.
fn signer_certificate(signed_data: &SignedData, signer: &SignerInfo) -> Result<Vec<u8>> {
    let certs = embedded_certificates(signed_data)?;
    if let SignerIdentifier::IssuerAndSerialNumber(isn) = &signer.sid {
        for der in &certs {
            let cert = x509_cert::Certificate::from_der(der)?;
            if cert.tbs_certificate.serial_number == isn.serial_number && cert.tbs_certificate.issuer == isn.issuer {
                return Ok(der.clone());
            }
        }
    }
    certs
        .into_iter()
        .next()
        .ok_or_else(|| Error::Encoding("signer certificate not embedded".to_string()))
}

fn verify_signature_value(cert_der: &[u8], algorithm: DigestAlgorithm, digest: &[u8], signature: &[u8]) -> Result<bool> {
    let cert = parse_certificate(cert_der)?;
    let spki = cert.public_key();
    let key_oid = spki.algorithm.algorithm.to_id_string();
    match key_oid.as_str() {
        RSA_ENCRYPTION => {
            let key = RsaPublicKey::from_public_key_der(spki.raw)
                .map_err(|e| Error::Encoding(format!("RSA public key: {}", e)))?;
            let padding = match algorithm {
                DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
                DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
                DigestAlgorithm::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
                DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
            };
            Ok(key.verify(padding, digest, signature).is_ok())
        },
        EC_PUBLIC_KEY => {
            let key = p256::ecdsa::VerifyingKey::from_public_key_der(spki.raw)
                .map_err(|e| Error::Encoding(format!("EC public key: {}", e)))?;
            let signature = match p256::ecdsa::Signature::from_der(signature) {
                Ok(signature) => signature,
                Err(_) => return Ok(false),
            };
            Ok(key.verify_prehash(digest, &signature).is_ok())
        },
        other => Err(Error::Unsupported(format!("public key algorithm {}", other))),
    }
}
