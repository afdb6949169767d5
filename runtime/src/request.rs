/*++

Licensed under the Apache-2.0 license.

File Name:

    request.rs

Abstract:

    File contains the CA request builder.

--*/

use crate::session::Session;
use alloc::vec::Vec;
use atap_api::{AtapOps, Blob, CaRequest, InnerCaRequest, KeyType, Operation, GCM_IV_LEN};
use atap_error::{AtapError, AtapResult, ErrorKind};
use log::{debug, warn};

/// Steps of the request builder, reported when a request is aborted.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum RequestStage {
    Handshake,
    AuthSign,
    PublicKeys,
    ProductHash,
    Encrypt,
    Serialize,
}

/// Builds a CA request from the CA's operation start message.
///
/// Returns the serialized `CaRequest` together with the session that must be
/// handed to [`crate::set_ca_response`] with the CA's answer.
pub fn get_ca_request<O: AtapOps + ?Sized>(
    ops: &mut O,
    operation_start: &[u8],
) -> AtapResult<(Vec<u8>, Session)> {
    let mut session = Session::new();
    let request = build_ca_request(ops, &mut session, operation_start)?;
    Ok((request, session))
}

/// Builds a CA request into a caller-owned idle session.
///
/// On failure the session is cleared and left spent.
pub fn build_ca_request<O: AtapOps + ?Sized>(
    ops: &mut O,
    session: &mut Session,
    operation_start: &[u8],
) -> AtapResult<Vec<u8>> {
    if !session.is_idle() {
        return Err(AtapError::INVALID_INPUT_SESSION_SPENT);
    }
    let mut stage = RequestStage::Handshake;
    match assemble(ops, session, operation_start, &mut stage) {
        Ok(request) => {
            session.mark_awaiting_response();
            debug!("[atap] CA request ready ({} bytes)", request.len());
            Ok(request)
        }
        Err(err) => {
            session.clear();
            warn!("[atap] CA request failed during {stage:?}: {err}");
            Err(err)
        }
    }
}

fn assemble<O: AtapOps + ?Sized>(
    ops: &mut O,
    session: &mut Session,
    operation_start: &[u8],
    stage: &mut RequestStage,
) -> AtapResult<Vec<u8>> {
    let handshake = session.initialize(ops, operation_start)?;
    let mut inner = InnerCaRequest::default();

    if handshake.auth_key_type != KeyType::None {
        *stage = RequestStage::AuthSign;
        inner.auth_key_cert_chain = ops.read_auth_key_cert_chain()?;
        let nonce = session.auth_nonce(&*ops)?;
        inner.signature = ops.auth_key_sign(&nonce)?;
    }

    if session.operation() == Some(Operation::Certify) {
        *stage = RequestStage::PublicKeys;
        inner.rsa_pubkey = ops.read_attestation_public_key(KeyType::Rsa)?;
        inner.ecdsa_pubkey = ops.read_attestation_public_key(KeyType::Ecdsa)?;
        inner.eddsa_pubkey = read_optional_public_key(ops, KeyType::Eddsa)?;
    }

    *stage = RequestStage::ProductHash;
    let product_id = ops.read_product_id()?;
    inner.product_id_hash = ops.sha256(&product_id)?;

    *stage = RequestStage::Encrypt;
    let plaintext = inner.encode()?;
    let mut iv = [0u8; GCM_IV_LEN];
    ops.get_random_bytes(&mut iv)?;
    let (ciphertext, tag) = ops.aes_gcm_128_encrypt(&plaintext, &iv, session.session_key())?;

    *stage = RequestStage::Serialize;
    CaRequest {
        device_pubkey: handshake.device_pubkey,
        iv,
        encrypted_inner_ca_request: ciphertext,
        tag,
    }
    .encode()
}

/// Reads a public key the device may legitimately lack. An unsupported
/// operation yields an empty blob.
fn read_optional_public_key<O: AtapOps + ?Sized>(
    ops: &O,
    key_type: KeyType,
) -> AtapResult<Blob> {
    match ops.read_attestation_public_key(key_type) {
        Ok(key) => Ok(key),
        Err(err) if err.kind() == ErrorKind::UnsupportedOperation => {
            warn!("[atap] {key_type:?} public key unavailable, sending empty key");
            Ok(Blob::empty())
        }
        Err(err) => Err(err),
    }
}
