// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

//! Signatures over a detached payload made with a SubjectPublicKeyInfo key.

use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier as _;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use sha2::{Sha256, Sha512};

use crate::{Error, Result, SignatureAlgorithm};

const PEM_PREFIX: &[u8] = b"-----BEGIN";

#[derive(Clone, Copy)]
enum RsaPadding {
    Pss,
    Pkcs1v15,
}

#[derive(Clone, Copy)]
enum HashAlgorithm {
    Sha256,
    Sha512,
}

/// Verifies `signature` over `payload` with the key in `key_data`, which is a
/// PEM or DER encoded SubjectPublicKeyInfo.
pub fn verify(
    algorithm: SignatureAlgorithm,
    key_data: &[u8],
    signature: &[u8],
    payload: &[u8],
) -> Result<()> {
    use SignatureAlgorithm::*;

    match algorithm {
        RsaPss2048Sha256 => verify_rsa(
            RsaPadding::Pss,
            2048,
            HashAlgorithm::Sha256,
            key_data,
            signature,
            payload,
        ),
        RsaPss3072Sha256 => verify_rsa(
            RsaPadding::Pss,
            3072,
            HashAlgorithm::Sha256,
            key_data,
            signature,
            payload,
        ),
        RsaPss4096Sha256 => verify_rsa(
            RsaPadding::Pss,
            4096,
            HashAlgorithm::Sha256,
            key_data,
            signature,
            payload,
        ),
        RsaPss4096Sha512 => verify_rsa(
            RsaPadding::Pss,
            4096,
            HashAlgorithm::Sha512,
            key_data,
            signature,
            payload,
        ),
        RsaSignPkcs12048Sha256 => verify_rsa(
            RsaPadding::Pkcs1v15,
            2048,
            HashAlgorithm::Sha256,
            key_data,
            signature,
            payload,
        ),
        RsaSignPkcs13072Sha256 => verify_rsa(
            RsaPadding::Pkcs1v15,
            3072,
            HashAlgorithm::Sha256,
            key_data,
            signature,
            payload,
        ),
        RsaSignPkcs14096Sha256 => verify_rsa(
            RsaPadding::Pkcs1v15,
            4096,
            HashAlgorithm::Sha256,
            key_data,
            signature,
            payload,
        ),
        RsaSignPkcs14096Sha512 => verify_rsa(
            RsaPadding::Pkcs1v15,
            4096,
            HashAlgorithm::Sha512,
            key_data,
            signature,
            payload,
        ),
        EcdsaP256Sha256 => verify_p256(key_data, signature, payload),
        EcdsaP384Sha384 => verify_p384(key_data, signature, payload),
        EcdsaP521Sha512 | Unspecified => Err(Error::UnsupportedAlgorithm(
            algorithm.to_string(),
            "PKIX".into(),
        )),
    }
}

fn is_pem(key_data: &[u8]) -> bool {
    key_data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|start| key_data[start..].starts_with(PEM_PREFIX))
        .unwrap_or(false)
}

fn pem_str(key_data: &[u8]) -> Result<&str> {
    std::str::from_utf8(key_data)
        .map(str::trim)
        .map_err(|e| Error::SignatureVerification(format!("PEM key is not UTF-8: {e}")))
}

fn verify_rsa(
    padding: RsaPadding,
    bits: usize,
    hash: HashAlgorithm,
    key_data: &[u8],
    signature: &[u8],
    payload: &[u8],
) -> Result<()> {
    let key = if is_pem(key_data) {
        RsaPublicKey::from_public_key_pem(pem_str(key_data)?)
    } else {
        RsaPublicKey::from_public_key_der(key_data)
    }
    .map_err(|e| Error::SignatureVerification(format!("invalid RSA public key: {e}")))?;

    if key.size() * 8 != bits {
        return Err(Error::SignatureVerification(format!(
            "RSA key is {} bits, the signature algorithm requires {bits}",
            key.size() * 8
        )));
    }

    let res = match (padding, hash) {
        (RsaPadding::Pss, HashAlgorithm::Sha256) => {
            let signature = rsa::pss::Signature::try_from(signature).map_err(verification_error)?;
            rsa::pss::VerifyingKey::<Sha256>::new(key).verify(payload, &signature)
        }
        (RsaPadding::Pss, HashAlgorithm::Sha512) => {
            let signature = rsa::pss::Signature::try_from(signature).map_err(verification_error)?;
            rsa::pss::VerifyingKey::<Sha512>::new(key).verify(payload, &signature)
        }
        (RsaPadding::Pkcs1v15, HashAlgorithm::Sha256) => {
            let signature =
                rsa::pkcs1v15::Signature::try_from(signature).map_err(verification_error)?;
            rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key).verify(payload, &signature)
        }
        (RsaPadding::Pkcs1v15, HashAlgorithm::Sha512) => {
            let signature =
                rsa::pkcs1v15::Signature::try_from(signature).map_err(verification_error)?;
            rsa::pkcs1v15::VerifyingKey::<Sha512>::new(key).verify(payload, &signature)
        }
    };

    res.map_err(verification_error)
}

fn verify_p256(key_data: &[u8], signature: &[u8], payload: &[u8]) -> Result<()> {
    use p256::ecdsa::{Signature, VerifyingKey};

    let key = if is_pem(key_data) {
        VerifyingKey::from_public_key_pem(pem_str(key_data)?)
    } else {
        VerifyingKey::from_public_key_der(key_data)
    }
    .map_err(|e| Error::SignatureVerification(format!("invalid P-256 public key: {e}")))?;

    let signature = Signature::from_der(signature).map_err(verification_error)?;
    key.verify(payload, &signature).map_err(verification_error)
}

fn verify_p384(key_data: &[u8], signature: &[u8], payload: &[u8]) -> Result<()> {
    use p384::ecdsa::{Signature, VerifyingKey};

    let key = if is_pem(key_data) {
        VerifyingKey::from_public_key_pem(pem_str(key_data)?)
    } else {
        VerifyingKey::from_public_key_der(key_data)
    }
    .map_err(|e| Error::SignatureVerification(format!("invalid P-384 public key: {e}")))?;

    let signature = Signature::from_der(signature).map_err(verification_error)?;
    key.verify(payload, &signature).map_err(verification_error)
}

fn verification_error(e: impl std::fmt::Display) -> Error {
    Error::SignatureVerification(e.to_string())
}
