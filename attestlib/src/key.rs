// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

use log::debug;
use openpgp::cert::CertParser;
use openpgp::parse::Parse;
use openpgp::Cert;
use sequoia_openpgp as openpgp;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{Error, Result};

/// The kind of key material held by a [`PublicKey`].
#[derive(EnumString, Display, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    #[strum(serialize = "PGP", ascii_case_insensitive)]
    #[serde(rename = "PGP")]
    Pgp,
    #[strum(serialize = "PKIX", ascii_case_insensitive)]
    #[serde(rename = "PKIX")]
    Pkix,
    #[strum(serialize = "JWT", ascii_case_insensitive)]
    #[serde(rename = "JWT")]
    Jwt,
}

/// Signing and padding algorithm of a PKIX or JWT key.
#[derive(
    EnumString, Display, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default,
)]
#[strum(ascii_case_insensitive)]
pub enum SignatureAlgorithm {
    #[default]
    #[serde(rename = "SIGNATURE_ALGORITHM_UNSPECIFIED")]
    #[strum(serialize = "SIGNATURE_ALGORITHM_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "RSA_PSS_2048_SHA256")]
    #[strum(serialize = "RSA_PSS_2048_SHA256")]
    RsaPss2048Sha256,
    #[serde(rename = "RSA_PSS_3072_SHA256")]
    #[strum(serialize = "RSA_PSS_3072_SHA256")]
    RsaPss3072Sha256,
    #[serde(rename = "RSA_PSS_4096_SHA256")]
    #[strum(serialize = "RSA_PSS_4096_SHA256")]
    RsaPss4096Sha256,
    #[serde(rename = "RSA_PSS_4096_SHA512")]
    #[strum(serialize = "RSA_PSS_4096_SHA512")]
    RsaPss4096Sha512,
    #[serde(rename = "RSA_SIGN_PKCS1_2048_SHA256")]
    #[strum(serialize = "RSA_SIGN_PKCS1_2048_SHA256")]
    RsaSignPkcs12048Sha256,
    #[serde(rename = "RSA_SIGN_PKCS1_3072_SHA256")]
    #[strum(serialize = "RSA_SIGN_PKCS1_3072_SHA256")]
    RsaSignPkcs13072Sha256,
    #[serde(rename = "RSA_SIGN_PKCS1_4096_SHA256")]
    #[strum(serialize = "RSA_SIGN_PKCS1_4096_SHA256")]
    RsaSignPkcs14096Sha256,
    #[serde(rename = "RSA_SIGN_PKCS1_4096_SHA512")]
    #[strum(serialize = "RSA_SIGN_PKCS1_4096_SHA512")]
    RsaSignPkcs14096Sha512,
    #[serde(rename = "ECDSA_P256_SHA256")]
    #[strum(serialize = "ECDSA_P256_SHA256")]
    EcdsaP256Sha256,
    #[serde(rename = "ECDSA_P384_SHA384")]
    #[strum(serialize = "ECDSA_P384_SHA384")]
    EcdsaP384Sha384,
    #[serde(rename = "ECDSA_P521_SHA512")]
    #[strum(serialize = "ECDSA_P521_SHA512")]
    EcdsaP521Sha512,
}

/// Public key material for every supported key type.
///
/// Public keys are trusted input: they come from policy authors, never from
/// an attestation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub key_type: KeyType,
    pub signature_algorithm: SignatureAlgorithm,
    /// Armored keyring for PGP, PEM (or DER) SubjectPublicKeyInfo for PKIX
    /// and JWT.
    pub key_data: Vec<u8>,
    /// OpenPGP v4 fingerprint for PGP keys, a StringOrURI otherwise.
    pub id: String,
}

impl PublicKey {
    /// Creates a new `PublicKey`.
    ///
    /// For PGP keys `key_id` is ignored and the ID is derived from the sole
    /// key in the armored keyring. For PKIX and JWT keys `key_id` is kept
    /// as-is once it is known to be a StringOrURI.
    pub fn new(
        key_type: KeyType,
        signature_algorithm: SignatureAlgorithm,
        key_data: Vec<u8>,
        key_id: &str,
    ) -> Result<Self> {
        let id = match key_type {
            KeyType::Pgp => {
                if !key_id.is_empty() {
                    debug!(
                        "Ignoring key ID {key_id:?} supplied for a PGP key, the fingerprint is used instead."
                    );
                }
                extract_pgp_key_id(&key_data)?
            }
            KeyType::Pkix | KeyType::Jwt => extract_pkix_key_id(key_id)?,
        };

        Ok(Self {
            key_type,
            signature_algorithm,
            key_data,
            id,
        })
    }
}

/// Parses an armored keyring that must hold exactly one certificate.
pub(crate) fn parse_single_cert(key_data: &[u8]) -> Result<Cert> {
    let mut certs = CertParser::from_bytes(key_data)
        .map_err(|e| Error::PgpKeyring(e.to_string()))?
        .collect::<openpgp::Result<Vec<Cert>>>()
        .map_err(|e| Error::PgpKeyring(e.to_string()))?;

    if certs.len() != 1 {
        return Err(Error::PgpKeyCount(certs.len()));
    }

    certs.pop().ok_or(Error::PgpKeyCount(0))
}

fn extract_pgp_key_id(key_data: &[u8]) -> Result<String> {
    let cert = parse_single_cert(key_data)?;
    Ok(cert.fingerprint().to_hex())
}

// TODO: derive an ID from the DER encoding of the key when `key_id` is empty.
fn extract_pkix_key_id(key_id: &str) -> Result<String> {
    if key_id.contains(':') && url::Url::parse(key_id).is_err() {
        return Err(Error::InvalidKeyId(key_id.to_string()));
    }

    Ok(key_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    const PUBLIC_KEY_ONE: &str = include_str!("../test_data/pgp/attestor-one.pub.asc");
    const FINGERPRINT_ONE: &str = include_str!("../test_data/pgp/attestor-one.fpr");
    const TWO_KEYS: &str = include_str!("../test_data/pgp/two-keys.pub.asc");

    #[test]
    fn test_pgp_key_id_is_fingerprint() {
        let key = PublicKey::new(
            KeyType::Pgp,
            SignatureAlgorithm::Unspecified,
            PUBLIC_KEY_ONE.as_bytes().to_vec(),
            "ignored",
        )
        .unwrap();
        assert_eq!(key.id, FINGERPRINT_ONE.trim());
    }

    #[test]
    fn test_pgp_fingerprint_matches_independent_computation() {
        let cert = Cert::from_bytes(PUBLIC_KEY_ONE.as_bytes()).unwrap();
        let key = PublicKey::new(
            KeyType::Pgp,
            SignatureAlgorithm::Unspecified,
            PUBLIC_KEY_ONE.as_bytes().to_vec(),
            "",
        )
        .unwrap();
        assert_eq!(key.id, hex::encode_upper(cert.fingerprint().as_bytes()));
    }

    #[rstest]
    #[case(TWO_KEYS)]
    #[case("invalid-public-key")]
    #[case("")]
    fn test_pgp_keyring_must_hold_one_key(#[case] key_data: &str) {
        assert!(PublicKey::new(
            KeyType::Pgp,
            SignatureAlgorithm::Unspecified,
            key_data.as_bytes().to_vec(),
            "",
        )
        .is_err());
    }

    #[rstest]
    #[case("", true)]
    #[case("my-key", true)]
    #[case("//cloudkms.googleapis.com/v1/projects/p/keys/k", true)]
    #[case("https://example.com/keys/1", true)]
    #[case("not a uri: at all", false)]
    fn test_pkix_key_id(#[case] key_id: &str, #[case] ok: bool) {
        let key = PublicKey::new(
            KeyType::Pkix,
            SignatureAlgorithm::EcdsaP256Sha256,
            b"key".to_vec(),
            key_id,
        );
        assert_eq!(key.is_ok(), ok);
        if ok {
            assert_eq!(key.unwrap().id, key_id);
        }
    }

    #[rstest]
    #[case("PGP", KeyType::Pgp)]
    #[case("pkix", KeyType::Pkix)]
    #[case("Jwt", KeyType::Jwt)]
    fn test_key_type_from_str(#[case] s: &str, #[case] expected: KeyType) {
        assert_eq!(KeyType::from_str(s).unwrap(), expected);
    }

    #[test]
    fn test_signature_algorithm_from_str() {
        assert_eq!(
            SignatureAlgorithm::from_str("ECDSA_P256_SHA256").unwrap(),
            SignatureAlgorithm::EcdsaP256Sha256
        );
        assert_eq!(
            SignatureAlgorithm::from_str("RSA_SIGN_PKCS1_4096_SHA512").unwrap(),
            SignatureAlgorithm::RsaSignPkcs14096Sha512
        );
        assert!(SignatureAlgorithm::from_str("SHA1").is_err());
    }
}
