// Copyright (c) 2024 Alibaba Cloud
//
// SPDX-License-Identifier: Apache-2.0
//

use std::io::Read;

use openpgp::parse::stream::{
    MessageLayer, MessageStructure, VerificationHelper, VerifierBuilder,
};
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use openpgp::{Cert, KeyHandle};
use sequoia_openpgp as openpgp;

use crate::key::parse_single_cert;
use crate::{Error, Result};

// Hands the single trusted certificate to the streaming verifier and accepts
// the message only if at least one signature in it is good.
struct Helper {
    cert: Cert,
}

impl VerificationHelper for Helper {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(vec![self.cert.clone()])
    }

    fn check(&mut self, structure: MessageStructure) -> openpgp::Result<()> {
        let mut good = false;
        for layer in structure.into_iter() {
            match layer {
                MessageLayer::SignatureGroup { results } => {
                    if results.iter().any(|r| r.is_ok()) {
                        good = true;
                    }
                }
                MessageLayer::Compression { .. } => (),
                _ => {
                    return Err(openpgp::Error::InvalidOperation(
                        "unexpected message layer".into(),
                    )
                    .into())
                }
            }
        }

        if good {
            Ok(())
        } else {
            Err(openpgp::Error::InvalidOperation(
                "no valid signature from the trusted key".into(),
            )
            .into())
        }
    }
}

/// Verifies an inline-signed OpenPGP message against the sole key in
/// `key_data` and returns the embedded payload.
pub fn verify(key_data: &[u8], signature: &[u8]) -> Result<Vec<u8>> {
    let cert = parse_single_cert(key_data)?;
    let policy = StandardPolicy::new();

    let mut verifier = VerifierBuilder::from_bytes(signature)
        .and_then(|builder| builder.with_policy(&policy, None, Helper { cert }))
        .map_err(|e| Error::SignatureVerification(e.to_string()))?;

    let mut payload = Vec::new();
    verifier
        .read_to_end(&mut payload)
        .map_err(|e| Error::SignatureVerification(e.to_string()))?;

    if !verifier.message_processed() {
        return Err(Error::SignatureVerification(
            "signed message was not fully processed".into(),
        ));
    }

    Ok(payload)
}
