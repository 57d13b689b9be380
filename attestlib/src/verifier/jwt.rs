// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

use jwt_simple::prelude::*;
use serde_json::{Map, Value};

use crate::{Error, Result, SignatureAlgorithm};

type CustomClaims = Map<String, Value>;

/// Verifies a compact JWS and returns its claims set, minus registered
/// claims, as the attestation payload.
pub fn verify(algorithm: SignatureAlgorithm, key_data: &[u8], token: &[u8]) -> Result<Vec<u8>> {
    let token = std::str::from_utf8(token)
        .map_err(|e| Error::SignatureVerification(format!("token is not UTF-8: {e}")))?;
    let pem = std::str::from_utf8(key_data)
        .map_err(|e| Error::SignatureVerification(format!("JWT key is not a PEM: {e}")))?;

    use SignatureAlgorithm::*;
    let claims = match algorithm {
        RsaPss2048Sha256 | RsaPss3072Sha256 | RsaPss4096Sha256 => PS256PublicKey::from_pem(pem)
            .and_then(|key| key.verify_token::<CustomClaims>(token, None)),
        RsaPss4096Sha512 => PS512PublicKey::from_pem(pem)
            .and_then(|key| key.verify_token::<CustomClaims>(token, None)),
        RsaSignPkcs12048Sha256 | RsaSignPkcs13072Sha256 | RsaSignPkcs14096Sha256 => {
            RS256PublicKey::from_pem(pem)
                .and_then(|key| key.verify_token::<CustomClaims>(token, None))
        }
        RsaSignPkcs14096Sha512 => RS512PublicKey::from_pem(pem)
            .and_then(|key| key.verify_token::<CustomClaims>(token, None)),
        EcdsaP256Sha256 => ES256PublicKey::from_pem(pem)
            .and_then(|key| key.verify_token::<CustomClaims>(token, None)),
        EcdsaP384Sha384 => ES384PublicKey::from_pem(pem)
            .and_then(|key| key.verify_token::<CustomClaims>(token, None)),
        EcdsaP521Sha512 | Unspecified => {
            return Err(Error::UnsupportedAlgorithm(
                algorithm.to_string(),
                "JWT".into(),
            ))
        }
    }
    .map_err(|e| Error::SignatureVerification(e.to_string()))?;

    serde_json::to_vec(&claims.custom).map_err(|source| Error::MalformedPayload { source })
}
