// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

/// A signed claim that an image was vouched for by the holder of one key.
///
/// An `Attestation` carries no trust by itself. It only becomes meaningful
/// after a [`crate::Verifier`] has checked both the signature and the
/// image identity inside the payload.
#[serde_as]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    /// ID of the public key that can verify `signature`.
    pub public_key_id: String,

    /// For PGP keys an armored inline-signed message embedding the payload,
    /// for JWT keys a compact JWS, for PKIX keys a raw signature over
    /// `serialized_payload`.
    #[serde_as(as = "Base64")]
    pub signature: Vec<u8>,

    /// The signed payload. Empty when the payload is embedded in
    /// `signature`.
    #[serde_as(as = "Base64")]
    #[serde(default)]
    pub serialized_payload: Vec<u8>,
}
