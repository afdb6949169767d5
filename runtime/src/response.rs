/*++

Licensed under the Apache-2.0 license.

File Name:

    response.rs

Abstract:

    File contains the CA response processor, which decrypts and validates
    the CA's answer and installs the issued credentials.

--*/

use crate::session::Session;
use alloc::vec::Vec;
use atap_api::{
    validate_inner_ca_response, AtapOps, EncryptedMessage, InnerCaResponse, IssuedKey, KeyType,
    Operation, AES_128_KEY_LEN,
};
use atap_error::{AtapError, AtapResult, ErrorKind};
use log::{debug, warn};
use zeroize::Zeroizing;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum ResponseStage {
    Decrypt,
    UnwrapSocLayer,
    Validate,
    WriteUuid,
    InstallKeys,
}

/// What to do with one (certificate chain, key) pair of a response.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum KeyAction {
    /// Nothing issued for this key type.
    Skip,
    /// Store the chain, and the private key when `with_key` is set.
    Install { with_key: bool },
}

/// Processes the CA's response to the request that produced `session`.
///
/// The session is spent and erased when this returns, whatever the outcome.
pub fn set_ca_response<O: AtapOps + ?Sized>(
    ops: &mut O,
    session: &mut Session,
    ca_response: &[u8],
) -> AtapResult<()> {
    if !session.is_awaiting_response() {
        return Err(AtapError::INVALID_INPUT_SESSION_SPENT);
    }
    let mut stage = ResponseStage::Decrypt;
    let result = process(ops, session, ca_response, &mut stage);
    session.clear();
    match result {
        Ok(()) => debug!("[atap] CA response installed"),
        Err(err) => warn!("[atap] CA response rejected during {stage:?}: {err}"),
    }
    result
}

fn process<O: AtapOps + ?Sized>(
    ops: &mut O,
    session: &Session,
    ca_response: &[u8],
    stage: &mut ResponseStage,
) -> AtapResult<()> {
    let operation = session
        .operation()
        .ok_or(AtapError::INVALID_INPUT_SESSION_SPENT)?;

    let mut inner = decrypt_message(&*ops, ca_response, session.session_key())?;

    if operation == Operation::IssueEncrypted {
        *stage = ResponseStage::UnwrapSocLayer;
        let soc_global_key = ops.read_soc_global_key()?;
        inner = decrypt_message(&*ops, &inner, &soc_global_key)?;
    }

    *stage = ResponseStage::Validate;
    validate_inner_ca_response(&inner, operation)?;
    let response = InnerCaResponse::decode(&inner)?;
    drop(inner);
    let actions = response
        .iter()
        .map(|(key_type, issued)| key_action(operation, key_type, issued))
        .collect::<AtapResult<Vec<_>>>()?;

    *stage = ResponseStage::WriteUuid;
    ops.write_hex_uuid(&response.hex_uuid)?;

    *stage = ResponseStage::InstallKeys;
    for ((key_type, issued), action) in response.iter().zip(actions) {
        install_key(ops, key_type, issued, action)?;
    }
    Ok(())
}

/// Validates `buf` as an encrypted message and decrypts it with `key`.
fn decrypt_message<O: AtapOps + ?Sized>(
    ops: &O,
    buf: &[u8],
    key: &[u8; AES_128_KEY_LEN],
) -> AtapResult<Zeroizing<Vec<u8>>> {
    let message = EncryptedMessage::decode(buf)?;
    ops.aes_gcm_128_decrypt(&message.ciphertext, &message.iv, key, &message.tag)
}

fn key_action(
    operation: Operation,
    key_type: KeyType,
    issued: &IssuedKey,
) -> AtapResult<KeyAction> {
    match (issued.cert_chain.is_empty(), issued.key.is_empty()) {
        (true, true) => Ok(KeyAction::Skip),
        (true, false) => Err(AtapError::INVALID_INPUT_KEY_WITHOUT_CERT),
        (false, true) if operation == Operation::Certify || key_type.is_optional() => {
            Ok(KeyAction::Install { with_key: false })
        }
        (false, true) => Err(AtapError::INVALID_INPUT_CERT_WITHOUT_KEY),
        (false, false) => Ok(KeyAction::Install { with_key: true }),
    }
}

fn install_key<O: AtapOps + ?Sized>(
    ops: &mut O,
    key_type: KeyType,
    issued: &IssuedKey,
    action: KeyAction,
) -> AtapResult<()> {
    let key = match action {
        KeyAction::Skip => return Ok(()),
        KeyAction::Install { with_key } => with_key.then_some(&issued.key),
    };
    match ops.write_attestation_key(key_type, key, &issued.cert_chain) {
        Ok(()) => {
            debug!(
                "[atap] Installed {key_type:?} ({} certs, key: {})",
                issued.cert_chain.len(),
                key.is_some()
            );
            Ok(())
        }
        Err(err)
            if key_type == KeyType::Eddsa
                && matches!(
                    err.kind(),
                    ErrorKind::UnsupportedAlgorithm | ErrorKind::UnsupportedOperation
                ) =>
        {
            warn!("[atap] Device does not support {key_type:?}, skipping: {err}");
            Ok(())
        }
        Err(err) => Err(err),
    }
}
