/*++

Licensed under the Apache-2.0 license.

File Name:

    validate.rs

Abstract:

    File contains the structural checks applied to untrusted CA responses
    before any field is copied out of them.

--*/

use crate::codec::Reader;
use crate::{
    KeyType, Operation, ENCRYPTED_MESSAGE_MIN_LEN, GCM_IV_LEN, GCM_TAG_LEN, HEX_UUID_LEN,
    INNER_CA_RESPONSE_MIN_LEN, KEY_LEN_MAX, LENGTH_FIELD_LEN,
};
use atap_error::{AtapError, AtapResult};

/// Checks that `buf` is a well-formed encrypted message: known version, a
/// message length covering the rest of the buffer and an encrypted length
/// consistent with it.
pub fn validate_encrypted_message(buf: &[u8]) -> AtapResult<()> {
    if buf.len() < ENCRYPTED_MESSAGE_MIN_LEN {
        return Err(AtapError::INVALID_INPUT_TRUNCATED);
    }
    let (header, mut r) = Reader::open_message(buf)?;
    r.take(GCM_IV_LEN)?;
    let encrypted_len = r.read_len()?;
    let expected = header.message_length() - (GCM_IV_LEN + LENGTH_FIELD_LEN + GCM_TAG_LEN);
    if encrypted_len != expected {
        return Err(AtapError::INVALID_INPUT_ENCRYPTED_LENGTH);
    }
    Ok(())
}

/// Checks that `buf` is a well-formed inner CA response for `operation`.
///
/// Every certificate chain and key is bounds-checked, the fields must
/// consume the message exactly, and a certify response must not carry any
/// private key other than the special-purpose one.
pub fn validate_inner_ca_response(buf: &[u8], operation: Operation) -> AtapResult<()> {
    if buf.len() < INNER_CA_RESPONSE_MIN_LEN {
        return Err(AtapError::INVALID_INPUT_TRUNCATED);
    }
    let (_, mut r) = Reader::open_message(buf)?;
    r.take(HEX_UUID_LEN)?;
    for key_type in KeyType::ISSUED {
        r.skip_cert_chain()?;
        let key = r.skip_blob(KEY_LEN_MAX, AtapError::INVALID_INPUT_KEY_TOO_LARGE)?;
        if operation == Operation::Certify && key_type != KeyType::Special && !key.is_empty() {
            return Err(AtapError::INVALID_INPUT_CERTIFY_PRIVATE_KEY);
        }
    }
    r.finish()
}
