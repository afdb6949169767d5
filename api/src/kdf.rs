// Licensed under the Apache-2.0 license

use crate::{ECDH_KEY_LEN, ECDH_SHARED_SECRET_LEN};

/// Bytes of HKDF salt: the coordinate part of both ECDH public keys.
pub const SESSION_SALT_LEN: usize = 2 * ECDH_SHARED_SECRET_LEN;

/// HKDF info strings used by both ends of a session.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum KdfLabel {
    /// AES-GCM-128 session key.
    SessionKey,
    /// Nonce signed by the device authentication key.
    AuthNonce,
}

impl KdfLabel {
    pub fn info(self) -> &'static [u8] {
        match self {
            KdfLabel::SessionKey => b"KEY",
            KdfLabel::AuthNonce => b"SIGN",
        }
    }
}

/// Builds the HKDF salt for a session, CA key first. The leading byte of each
/// 33-byte key (SEC1 tag or X25519 padding) is not part of the salt.
pub fn session_salt(
    ca_pubkey: &[u8; ECDH_KEY_LEN],
    device_pubkey: &[u8; ECDH_KEY_LEN],
) -> [u8; SESSION_SALT_LEN] {
    let mut salt = [0u8; SESSION_SALT_LEN];
    let (ca, device) = salt.split_at_mut(ECDH_SHARED_SECRET_LEN);
    ca.copy_from_slice(&ca_pubkey[1..]);
    device.copy_from_slice(&device_pubkey[1..]);
    salt
}
