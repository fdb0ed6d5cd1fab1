//! Signing identities: private key, certificate chain and the checks that
//! gate their use.
//!
//! A [`Keystore`] is opened once per run. Every signing call asks it for a
//! fresh [`SigningIdentity`], which owns its own copy of the key material;
//! the key is zeroized when the identity is dropped at the end of the call.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use der::Decode;
use openssl::pkcs12::Pkcs12;
use openssl::x509::X509;
use pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use signature::hazmat::PrehashSigner;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;
use zeroize::Zeroizing;

use crate::error::{Error, KeystoreError, Result};
use crate::signatures::types::{DigestAlgorithm, SignatureAlgorithm};

/// Upper bound of a DER-encoded P-256 ECDSA signature.
const P256_MAX_SIGNATURE_LEN: usize = 72;

/// Subject fields of a certificate, as a plain value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateHolder {
    /// Common name (CN)
    pub name: Option<String>,
    /// Organizational unit (OU)
    pub unit: Option<String>,
    /// Organization (O)
    pub organization: Option<String>,
    /// Locality (L)
    pub location: Option<String>,
    /// State or province (ST)
    pub state: Option<String>,
    /// Country (C)
    pub country: Option<String>,
}

fn first_value<'r, 'a: 'r>(
    mut values: impl Iterator<Item = &'r x509_parser::x509::AttributeTypeAndValue<'a>>,
) -> Option<String> {
    values.next().and_then(|attr| attr.as_str().ok()).map(str::to_string)
}

impl CertificateHolder {
    /// Read the subject RDNs of a DER certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let cert = parse_certificate(der)?;
        let subject = cert.subject();
        Ok(Self {
            name: first_value(subject.iter_common_name()),
            unit: first_value(subject.iter_organizational_unit()),
            organization: first_value(subject.iter_organization()),
            location: first_value(subject.iter_locality()),
            state: first_value(subject.iter_state_or_province()),
            country: first_value(subject.iter_country()),
        })
    }
}

/// Private key usable for PDF signing.
///
/// Both variants zeroize their secret scalars on drop.
pub enum KeyMaterial {
    /// RSA private key
    Rsa(RsaPrivateKey),
    /// ECDSA P-256 private key
    EcP256(p256::ecdsa::SigningKey),
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMaterial::Rsa(key) => write!(f, "KeyMaterial::Rsa({} bits, [REDACTED])", key.size() * 8),
            KeyMaterial::EcP256(_) => f.write_str("KeyMaterial::EcP256([REDACTED])"),
        }
    }
}

impl KeyMaterial {
    /// Decode a PKCS#8 (RSA or P-256) or PKCS#1 (RSA) private key.
    pub fn from_der(der: &[u8]) -> std::result::Result<Self, KeystoreError> {
        if let Ok(key) = RsaPrivateKey::from_pkcs8_der(der) {
            return Ok(KeyMaterial::Rsa(key));
        }
        if let Ok(key) = p256::ecdsa::SigningKey::from_pkcs8_der(der) {
            return Ok(KeyMaterial::EcP256(key));
        }
        if let Ok(key) = RsaPrivateKey::from_pkcs1_der(der) {
            return Ok(KeyMaterial::Rsa(key));
        }
        match pkcs8::PrivateKeyInfo::from_der(der) {
            Ok(info) => Err(KeystoreError::UnsupportedKey(info.algorithm.oid.to_string())),
            Err(e) => Err(KeystoreError::Malformed(e.to_string())),
        }
    }

    /// The natural signature algorithm for this key and digest.
    pub fn signature_algorithm(&self, digest: DigestAlgorithm) -> SignatureAlgorithm {
        match self {
            KeyMaterial::Rsa(_) => SignatureAlgorithm::RsaPkcs1v15(digest),
            KeyMaterial::EcP256(_) => SignatureAlgorithm::EcdsaP256(digest),
        }
    }

    /// Maximum size of a raw signature value.
    pub fn signature_len(&self) -> usize {
        match self {
            KeyMaterial::Rsa(key) => key.size(),
            KeyMaterial::EcP256(_) => P256_MAX_SIGNATURE_LEN,
        }
    }

    /// Whether `algorithm` can be produced with this key.
    pub fn supports(&self, algorithm: SignatureAlgorithm) -> bool {
        matches!(
            (self, algorithm),
            (KeyMaterial::Rsa(_), SignatureAlgorithm::RsaPkcs1v15(_))
                | (KeyMaterial::EcP256(_), SignatureAlgorithm::EcdsaP256(_))
        )
    }

    /// Whether the certificate's SubjectPublicKeyInfo belongs to this key.
    pub fn matches_public_key(&self, spki_der: &[u8]) -> bool {
        match self {
            KeyMaterial::Rsa(key) => RsaPublicKey::from_public_key_der(spki_der)
                .map(|public| public.n() == key.n() && public.e() == key.e())
                .unwrap_or(false),
            KeyMaterial::EcP256(key) => p256::ecdsa::VerifyingKey::from_public_key_der(spki_der)
                .map(|public| &public == key.verifying_key())
                .unwrap_or(false),
        }
    }

    /// Sign an already computed digest.
    pub fn sign_prehashed(&self, algorithm: DigestAlgorithm, digest: &[u8]) -> Result<Vec<u8>> {
        match self {
            KeyMaterial::Rsa(key) => {
                let padding = match algorithm {
                    DigestAlgorithm::Sha1 => Pkcs1v15Sign::new::<sha1::Sha1>(),
                    DigestAlgorithm::Sha256 => Pkcs1v15Sign::new::<sha2::Sha256>(),
                    DigestAlgorithm::Sha384 => Pkcs1v15Sign::new::<sha2::Sha384>(),
                    DigestAlgorithm::Sha512 => Pkcs1v15Sign::new::<sha2::Sha512>(),
                };
                key.sign(padding, digest).map_err(|e| Error::SigningKey(e.to_string()))
            },
            KeyMaterial::EcP256(key) => {
                let signature: p256::ecdsa::Signature =
                    key.sign_prehash(digest).map_err(|e| Error::SigningKey(e.to_string()))?;
                Ok(signature.to_der().as_bytes().to_vec())
            },
        }
    }
}

/// A PKCS#12 keystore opened with its passphrase.
pub struct Keystore {
    alias: Option<String>,
    key_der: Zeroizing<Vec<u8>>,
    chain: Vec<Vec<u8>>,
}

impl fmt::Debug for Keystore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keystore")
            .field("alias", &self.alias)
            .field("key", &"[REDACTED]")
            .field("chain_len", &self.chain.len())
            .finish()
    }
}

impl Keystore {
    /// Open a PKCS#12 file.
    ///
    /// When `alias` is given it must match the friendly name stored with the
    /// certificate. The chain is returned leaf first.
    pub fn load(
        path: impl AsRef<Path>,
        passphrase: &str,
        alias: Option<&str>,
    ) -> std::result::Result<Self, KeystoreError> {
        let path = path.as_ref();
        let der = std::fs::read(path).map_err(|source| KeystoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let keystore = Self::from_pkcs12_der(&der, passphrase, alias)?;
        log::debug!("loaded keystore {} ({} certificates)", path.display(), keystore.chain.len());
        Ok(keystore)
    }

    /// Open PKCS#12 bytes.
    pub fn from_pkcs12_der(
        der: &[u8],
        passphrase: &str,
        alias: Option<&str>,
    ) -> std::result::Result<Self, KeystoreError> {
        let pkcs12 = Pkcs12::from_der(der).map_err(|e| KeystoreError::Malformed(e.to_string()))?;
        let parsed = pkcs12
            .parse2(passphrase)
            .map_err(|e| KeystoreError::Decrypt(e.to_string()))?;

        let leaf = parsed.cert.ok_or(KeystoreError::MissingCertificate)?;
        let stored_alias = leaf.alias().map(|a| String::from_utf8_lossy(a).into_owned());
        if let (Some(requested), Some(stored)) = (alias, stored_alias.as_deref()) {
            if requested != stored {
                return Err(KeystoreError::AliasNotFound {
                    requested: requested.to_string(),
                    available: vec![stored.to_string()],
                });
            }
        }

        let pkey = parsed.pkey.ok_or(KeystoreError::MissingPrivateKey)?;
        let key_der = Zeroizing::new(
            pkey.private_key_to_pkcs8()
                .map_err(|e| KeystoreError::Malformed(e.to_string()))?,
        );
        // Decode once so an unusable key fails at load time
        KeyMaterial::from_der(&key_der)?;

        let extra: Vec<X509> = parsed.ca.map(|stack| stack.into_iter().collect()).unwrap_or_default();
        let leaf_der = leaf.to_der().map_err(|e| KeystoreError::Malformed(e.to_string()))?;
        let mut others = Vec::with_capacity(extra.len());
        for cert in &extra {
            others.push(cert.to_der().map_err(|e| KeystoreError::Malformed(e.to_string()))?);
        }
        let chain = order_chain(leaf_der, others).map_err(|e| KeystoreError::Malformed(e.to_string()))?;

        Ok(Self {
            alias: stored_alias.or_else(|| alias.map(str::to_string)),
            key_der,
            chain,
        })
    }

    /// Friendly name of the entry.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Certificate chain, leaf first, DER encoded.
    pub fn chain(&self) -> &[Vec<u8>] {
        &self.chain
    }

    /// Subject fields of the signer certificate.
    pub fn holder(&self) -> Result<CertificateHolder> {
        CertificateHolder::from_der(&self.chain[0])
    }

    /// A fresh identity with its own key copy, for one signing call.
    pub fn signing_identity(&self, digest: DigestAlgorithm) -> Result<SigningIdentity> {
        SigningIdentity::from_der_parts(&self.key_der, self.chain.clone(), digest)
    }
}

/// Key, chain and algorithms for exactly one signing call.
pub struct SigningIdentity {
    key: KeyMaterial,
    chain_der: Vec<Vec<u8>>,
    digest_algorithm: DigestAlgorithm,
    signature_algorithm: SignatureAlgorithm,
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("key", &self.key)
            .field("chain_len", &self.chain_der.len())
            .field("digest_algorithm", &self.digest_algorithm)
            .field("signature_algorithm", &self.signature_algorithm)
            .finish()
    }
}

impl SigningIdentity {
    /// Build an identity from a private key (PKCS#8 or PKCS#1 DER) and a
    /// leaf-first chain.
    pub fn from_der_parts(key_der: &[u8], chain_der: Vec<Vec<u8>>, digest: DigestAlgorithm) -> Result<Self> {
        let key = KeyMaterial::from_der(key_der)?;
        if chain_der.is_empty() {
            return Err(KeystoreError::MissingCertificate.into());
        }
        check_chain_order(&chain_der)?;
        let leaf = parse_certificate(&chain_der[0])?;
        if !key.matches_public_key(leaf.public_key().raw) {
            return Err(Error::SigningKey(format!(
                "private key does not match certificate '{}'",
                leaf.subject()
            )));
        }
        let signature_algorithm = key.signature_algorithm(digest);
        Ok(Self {
            key,
            chain_der,
            digest_algorithm: digest,
            signature_algorithm,
        })
    }

    /// Declare a different signature algorithm; checked against the key at signing time.
    pub fn with_signature_algorithm(mut self, algorithm: SignatureAlgorithm) -> Self {
        self.signature_algorithm = algorithm;
        self
    }

    /// Digest algorithm for the document digest and signed attributes.
    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    /// Declared signature algorithm.
    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.signature_algorithm
    }

    /// Certificate chain, leaf first.
    pub fn chain_der(&self) -> &[Vec<u8>] {
        &self.chain_der
    }

    /// Signer certificate.
    pub fn leaf_der(&self) -> &[u8] {
        &self.chain_der[0]
    }

    /// Subject fields of the signer certificate.
    pub fn holder(&self) -> Result<CertificateHolder> {
        CertificateHolder::from_der(self.leaf_der())
    }

    /// Raw signature size for this key.
    pub fn signature_len(&self) -> usize {
        self.key.signature_len()
    }

    /// Parsed chain for CMS encoding.
    pub fn chain_certificates(&self) -> Result<Vec<x509_cert::Certificate>> {
        self.chain_der
            .iter()
            .map(|der| x509_cert::Certificate::from_der(der).map_err(Error::from))
            .collect()
    }

    /// Fail fast when the identity cannot produce the declared signature at `at`.
    ///
    /// Checks the key type against the declared algorithm, then the leaf's
    /// validity window and key usage. No cryptographic work happens here.
    pub fn check_usable(&self, at: DateTime<Utc>) -> Result<()> {
        if !self.key.supports(self.signature_algorithm) {
            return Err(Error::SigningKey(format!(
                "{:?} cannot produce {}",
                self.key,
                self.signature_algorithm.name()
            )));
        }
        if self.signature_algorithm.digest_algorithm() != self.digest_algorithm {
            return Err(Error::SigningKey(format!(
                "signature algorithm {} does not use digest {}",
                self.signature_algorithm.name(),
                self.digest_algorithm.name()
            )));
        }
        check_leaf_certificate(self.leaf_der(), at)
    }

    /// Sign a digest with the identity's key.
    pub(crate) fn sign_prehashed(&self, digest: &[u8]) -> Result<Vec<u8>> {
        self.key.sign_prehashed(self.digest_algorithm, digest)
    }
}

/// Validity window and key usage of a signer certificate.
pub fn check_leaf_certificate(der: &[u8], at: DateTime<Utc>) -> Result<()> {
    let cert = parse_certificate(der)?;
    let subject = cert.subject().to_string();
    let validity = cert.validity();
    let now = at.timestamp();
    if now < validity.not_before.timestamp() || now > validity.not_after.timestamp() {
        return Err(Error::CertificateExpired {
            subject,
            at: at.to_rfc3339(),
            not_before: validity.not_before.to_string(),
            not_after: validity.not_after.to_string(),
        });
    }
    match cert.key_usage() {
        Ok(Some(usage)) => {
            if !usage.value.digital_signature() && !usage.value.non_repudiation() {
                return Err(Error::CertificateUsage {
                    subject,
                    reason: "key usage allows neither digitalSignature nor nonRepudiation".to_string(),
                });
            }
        },
        Ok(None) => {},
        Err(e) => {
            return Err(Error::CertificateUsage {
                subject,
                reason: format!("unreadable key usage extension: {}", e),
            })
        },
    }
    Ok(())
}

/// Parse a DER certificate with x509-parser.
pub(crate) fn parse_certificate(der: &[u8]) -> Result<X509Certificate<'_>> {
    X509Certificate::from_der(der)
        .map(|(_, cert)| cert)
        .map_err(|e| Error::Encoding(format!("certificate: {}", e)))
}

/// Whether `cert` was issued by `issuer`, judged by names.
pub(crate) fn issued_by(cert: &X509Certificate<'_>, issuer: &X509Certificate<'_>) -> bool {
    cert.issuer().as_raw() == issuer.subject().as_raw()
}

/// Self-issued certificates terminate a chain walk.
pub(crate) fn is_self_issued(cert: &X509Certificate<'_>) -> bool {
    cert.issuer().as_raw() == cert.subject().as_raw()
}

/// Order certificates leaf to root starting at `leaf`; unrelated certificates are dropped.
fn order_chain(leaf: Vec<u8>, mut others: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>> {
    let mut chain = vec![leaf];
    loop {
        let current = parse_certificate(&chain[chain.len() - 1])?;
        if is_self_issued(&current) {
            break;
        }
        let mut next = None;
        for (i, der) in others.iter().enumerate() {
            if issued_by(&current, &parse_certificate(der)?) {
                next = Some(i);
                break;
            }
        }
        match next {
            Some(i) => {
                let der = others.remove(i);
                chain.push(der);
            },
            None => break,
        }
    }
    if !others.is_empty() {
        log::debug!("ignoring {} keystore certificates outside the signer chain", others.len());
    }
    Ok(chain)
}

fn check_chain_order(chain: &[Vec<u8>]) -> Result<()> {
    for pair in chain.windows(2) {
        let child = parse_certificate(&pair[0])?;
        let parent = parse_certificate(&pair[1])?;
        if !issued_by(&child, &parent) {
            return Err(Error::SigningKey(format!(
                "certificate chain is not ordered leaf to root: '{}' is not issued by '{}'",
                child.subject(),
                parent.subject()
            )));
        }
    }
    Ok(())
}
