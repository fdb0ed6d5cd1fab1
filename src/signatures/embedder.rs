//! Adds a time-stamp token to an existing CMS signature.

use der::asn1::{ObjectIdentifier, SetOfVec};
use der::{Any, Decode};

use crate::error::{Error, Result};
use crate::signatures::cms_builder::{attribute, decode_signed_data, encode_signed_data, find_attribute};
use crate::signatures::timestamp::TimestampToken;

/// id-aa-signatureTimeStampToken
pub const ID_SIGNATURE_TIME_STAMP_TOKEN: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.2.14");

/// Inserts `signatureTimeStampToken` as an unsigned attribute.
///
/// Unsigned attributes sit outside the signed attribute set, so the existing
/// signature value stays valid and is carried over byte for byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampEmbedder;

impl TimestampEmbedder {
    /// Create a new embedder.
    pub fn new() -> Self {
        Self
    }

    /// Return a new CMS encoding with the token attached to the signer.
    pub fn embed(&self, cms_der: &[u8], token: &TimestampToken) -> Result<Vec<u8>> {
        let mut signed_data = decode_signed_data(cms_der)?;
        let mut signers = signed_data.signer_infos.0.into_vec();
        let signer = match signers.as_mut_slice() {
            [signer] => signer,
            other => {
                return Err(Error::Encoding(format!("expected one SignerInfo, found {}", other.len())));
            },
        };

        let token_value = Any::from_der(&token.der)?;
        let mut attrs: Vec<_> = signer
            .unsigned_attrs
            .take()
            .map(SetOfVec::into_vec)
            .unwrap_or_default();
        attrs.retain(|attr| attr.oid != ID_SIGNATURE_TIME_STAMP_TOKEN);
        attrs.push(attribute(ID_SIGNATURE_TIME_STAMP_TOKEN, token_value)?);
        signer.unsigned_attrs = Some(SetOfVec::try_from(attrs)?);

        signed_data.signer_infos.0 = SetOfVec::try_from(signers)?;
        let der = encode_signed_data(&signed_data)?;
        log::debug!("embedded {}-byte timestamp token, CMS now {} bytes", token.der.len(), der.len());
        Ok(der)
    }
}

/// The embedded signature time-stamp token, if any.
pub fn embedded_token(cms_der: &[u8]) -> Result<Option<Vec<u8>>> {
    let signed_data = decode_signed_data(cms_der)?;
    let signer = crate::signatures::cms_builder::only_signer(&signed_data)?;
    match find_attribute(signer.unsigned_attrs.as_ref(), &ID_SIGNATURE_TIME_STAMP_TOKEN) {
        Some(value) => Ok(Some(der::Encode::to_der(value)?)),
        None => Ok(None),
    }
}
