//! Detached CMS SignedData construction.
//!
//! The signature covers the DER `SET OF Attribute` of the signed attributes
//! (content type, signing time, message digest, ESS signing-certificate-v2),
//! never the document bytes directly. The encapsulated content is absent.

use std::time::Duration;

use chrono::{DateTime, Utc};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo, SignerInfos,
};
use der::asn1::{GeneralizedTime, ObjectIdentifier, OctetString, SetOfVec, UtcTime};
use der::{Any, Decode, Encode, Sequence, SliceReader};
use spki::AlgorithmIdentifierOwned;
use x509_cert::attr::Attribute;
use x509_cert::time::Time;

use crate::error::{Error, Result};
use crate::signatures::identity::SigningIdentity;
use crate::signatures::types::{DigestAlgorithm, SignatureAlgorithm, SignatureRequest};

/// id-signedData
pub const ID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
/// id-data
pub const ID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
/// id-contentType
pub const ID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");
/// id-messageDigest
pub const ID_MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
/// id-signingTime
pub const ID_SIGNING_TIME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.5");
/// id-aa-signingCertificateV2
pub const ID_SIGNING_CERTIFICATE_V2: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.2.47");

/// ESSCertIDv2; the hash algorithm is omitted when it is the SHA-256 default.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct EssCertIdV2 {
    #[asn1(optional = "true")]
    hash_algorithm: Option<AlgorithmIdentifierOwned>,
    cert_hash: OctetString,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct SigningCertificateV2 {
    certs: Vec<EssCertIdV2>,
}

/// Builds detached CMS signatures.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedSignatureBuilder;

impl DetachedSignatureBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self
    }

    /// Build a DER `ContentInfo(SignedData)` over a precomputed document digest.
    ///
    /// Takes the identity by value: the key is dropped, and zeroized, when
    /// this call returns. Certificate and key checks run before any signing.
    pub fn build(&self, digest: &[u8], identity: SigningIdentity, request: &SignatureRequest) -> Result<Vec<u8>> {
        identity.check_usable(request.signing_time)?;
        let digest_algorithm = identity.digest_algorithm();
        if digest.len() != digest_algorithm.output_len() {
            return Err(Error::SigningKey(format!(
                "{}-byte digest given for {}",
                digest.len(),
                digest_algorithm.name()
            )));
        }

        let chain = identity.chain_certificates()?;
        let leaf = &chain[0];
        let signed_attrs = signed_attributes(digest, digest_algorithm, identity.leaf_der(), request.signing_time)?;
        let to_sign = signed_attrs.to_der()?;
        let signature = identity.sign_prehashed(&digest_algorithm.digest(&to_sign))?;

        let signer_info = SignerInfo {
            version: CmsVersion::V1,
            sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
                issuer: leaf.tbs_certificate.issuer.clone(),
                serial_number: leaf.tbs_certificate.serial_number.clone(),
            }),
            digest_alg: digest_algorithm_identifier(digest_algorithm),
            signed_attrs: Some(signed_attrs),
            signature_algorithm: signature_algorithm_identifier(identity.signature_algorithm()),
            signature: OctetString::new(signature)?,
            unsigned_attrs: None,
        };

        let certificates = SetOfVec::try_from(
            chain
                .into_iter()
                .map(CertificateChoices::Certificate)
                .collect::<Vec<_>>(),
        )?;
        let signed_data = SignedData {
            version: CmsVersion::V1,
            digest_algorithms: SetOfVec::try_from(vec![digest_algorithm_identifier(digest_algorithm)])?,
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: ID_DATA,
                econtent: None,
            },
            certificates: Some(CertificateSet(certificates)),
            crls: None,
            signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info])?),
        };
        let der = encode_signed_data(&signed_data)?;
        log::debug!(
            "built detached CMS: {} bytes, {}, {} certificates",
            der.len(),
            identity.signature_algorithm().name(),
            identity.chain_der().len()
        );
        Ok(der)
    }
}

fn signed_attributes(
    digest: &[u8],
    digest_algorithm: DigestAlgorithm,
    leaf_der: &[u8],
    signing_time: DateTime<Utc>,
) -> Result<SetOfVec<Attribute>> {
    let cert_hash = OctetString::new(DigestAlgorithm::Sha256.digest(leaf_der))?;
    let signing_certificate = SigningCertificateV2 {
        certs: vec![EssCertIdV2 {
            hash_algorithm: None,
            cert_hash,
        }],
    };
    let attrs = vec![
        attribute(ID_CONTENT_TYPE, Any::encode_from(&ID_DATA)?)?,
        attribute(ID_SIGNING_TIME, Any::encode_from(&der_time(signing_time)?)?)?,
        attribute(ID_MESSAGE_DIGEST, Any::encode_from(&OctetString::new(digest)?)?)?,
        attribute(ID_SIGNING_CERTIFICATE_V2, Any::encode_from(&signing_certificate)?)?,
    ];
    log::trace!("signed attributes use {}", digest_algorithm.name());
    Ok(SetOfVec::try_from(attrs)?)
}

/// Single-valued attribute.
pub(crate) fn attribute(oid: ObjectIdentifier, value: Any) -> Result<Attribute> {
    Ok(Attribute {
        oid,
        values: SetOfVec::try_from(vec![value])?,
    })
}

/// UTCTime until 2049, GeneralizedTime afterwards.
pub(crate) fn der_time(time: DateTime<Utc>) -> Result<Time> {
    let since_epoch = Duration::from_secs(time.timestamp().max(0) as u64);
    match UtcTime::from_unix_duration(since_epoch) {
        Ok(utc) => Ok(Time::UtcTime(utc)),
        Err(_) => Ok(Time::GeneralTime(GeneralizedTime::from_unix_duration(since_epoch)?)),
    }
}

/// AlgorithmIdentifier for a digest, without parameters.
pub fn digest_algorithm_identifier(algorithm: DigestAlgorithm) -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: algorithm.oid(),
        parameters: None,
    }
}

/// AlgorithmIdentifier for a signature; RSA carries NULL parameters.
pub fn signature_algorithm_identifier(algorithm: SignatureAlgorithm) -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: algorithm.oid(),
        parameters: algorithm.has_null_params().then(Any::null),
    }
}

/// Wrap SignedData into a DER ContentInfo.
pub fn encode_signed_data(signed_data: &SignedData) -> Result<Vec<u8>> {
    let content_info = ContentInfo {
        content_type: ID_SIGNED_DATA,
        content: Any::encode_from(signed_data)?,
    };
    Ok(content_info.to_der()?)
}

/// Decode a ContentInfo(SignedData), ignoring trailing bytes such as the
/// zero padding of a `/Contents` string.
pub fn decode_signed_data(bytes: &[u8]) -> Result<SignedData> {
    let mut reader = SliceReader::new(bytes)?;
    let content_info = ContentInfo::decode(&mut reader)?;
    if content_info.content_type != ID_SIGNED_DATA {
        return Err(Error::Encoding(format!(
            "expected SignedData, found content type {}",
            content_info.content_type
        )));
    }
    Ok(content_info.content.decode_as::<SignedData>()?)
}

/// The single SignerInfo of a PDF signature.
pub fn only_signer(signed_data: &SignedData) -> Result<&SignerInfo> {
    let signers = signed_data.signer_infos.0.as_slice();
    match signers {
        [signer] => Ok(signer),
        _ => Err(Error::Encoding(format!("expected one SignerInfo, found {}", signers.len()))),
    }
}

/// Raw signature value of the first SignerInfo.
pub fn signature_value(cms_der: &[u8]) -> Result<Vec<u8>> {
    let signed_data = decode_signed_data(cms_der)?;
    Ok(only_signer(&signed_data)?.signature.as_bytes().to_vec())
}

/// First value of an attribute in a set, if present.
pub fn find_attribute<'a>(attrs: Option<&'a SetOfVec<Attribute>>, oid: &ObjectIdentifier) -> Option<&'a Any> {
    attrs?
        .iter()
        .find(|attr| attr.oid == *oid)
        .and_then(|attr| attr.values.iter().next())
}

/// Certificates carried in the SignedData, DER encoded, in stored order.
pub fn embedded_certificates(signed_data: &SignedData) -> Result<Vec<Vec<u8>>> {
    let mut out = Vec::new();
    if let Some(certs) = &signed_data.certificates {
        for choice in certs.0.iter() {
            if let CertificateChoices::Certificate(cert) = choice {
                out.push(cert.to_der()?);
            }
        }
    }
    Ok(out)
}
