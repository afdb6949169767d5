/*++

Licensed under the Apache-2.0 license.

File Name:

    session.rs

Abstract:

    File contains the session state shared by one CA request and its
    response, and the key exchange that establishes it.

--*/

use atap_api::{
    session_salt, AtapOps, CurveType, KdfLabel, KeyType, Operation, OperationStart,
    AES_128_KEY_LEN, ECDH_KEY_LEN, ECDH_SHARED_SECRET_LEN, SESSION_NONCE_LEN, SESSION_SALT_LEN,
};
use atap_error::{AtapError, AtapResult};
use log::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum SessionState {
    /// Fresh session, no key exchange yet.
    Idle,
    /// Request sent, secrets held until the matching response.
    AwaitingResponse,
    /// Secrets erased. Terminal.
    Spent,
}

/// Result of the key exchange that the request builder needs.
pub(crate) struct Handshake {
    pub auth_key_type: KeyType,
    pub device_pubkey: [u8; ECDH_KEY_LEN],
}

/// Secret state of a single provisioning exchange.
///
/// A session is created by [`crate::get_ca_request`], consumed by
/// [`crate::set_ca_response`] and erased on every exit path of both. Dropping
/// it erases it as well.
pub struct Session {
    shared_secret: [u8; ECDH_SHARED_SECRET_LEN],
    session_key: [u8; AES_128_KEY_LEN],
    salt: [u8; SESSION_SALT_LEN],
    operation: Option<Operation>,
    curve: Option<CurveType>,
    state: SessionState,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("operation", &self.operation)
            .field("curve", &self.curve)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub const fn new() -> Self {
        Self {
            shared_secret: [0; ECDH_SHARED_SECRET_LEN],
            session_key: [0; AES_128_KEY_LEN],
            salt: [0; SESSION_SALT_LEN],
            operation: None,
            curve: None,
            state: SessionState::Idle,
        }
    }

    /// Operation negotiated by the operation start message.
    pub fn operation(&self) -> Option<Operation> {
        self.operation
    }

    pub fn curve(&self) -> Option<CurveType> {
        self.curve
    }

    pub fn is_idle(&self) -> bool {
        self.state == SessionState::Idle
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.state == SessionState::AwaitingResponse
    }

    pub fn is_spent(&self) -> bool {
        self.state == SessionState::Spent
    }

    /// True when the shared secret, session key and salt hold only zeros.
    pub fn is_cleared(&self) -> bool {
        self.shared_secret.iter().all(|b| *b == 0)
            && self.session_key.iter().all(|b| *b == 0)
            && self.salt.iter().all(|b| *b == 0)
    }

    /// Erases all secret material and marks the session spent.
    pub fn clear(&mut self) {
        self.zeroize();
    }

    pub(crate) fn session_key(&self) -> &[u8; AES_128_KEY_LEN] {
        &self.session_key
    }

    pub(crate) fn mark_awaiting_response(&mut self) {
        self.state = SessionState::AwaitingResponse;
    }

    /// Parses the operation start message, runs the ECDH exchange with the
    /// CA's key and derives the session key.
    pub(crate) fn initialize<O: AtapOps + ?Sized>(
        &mut self,
        ops: &mut O,
        operation_start: &[u8],
    ) -> AtapResult<Handshake> {
        if !self.is_idle() {
            return Err(AtapError::INVALID_INPUT_SESSION_SPENT);
        }
        let start = OperationStart::parse(operation_start)?;
        let curve = start.curve()?;
        let operation = start.operation()?;
        let ca_pubkey = start.ca_pubkey;
        debug!("[atap] Operation start: {operation:?} over {curve:?}");

        let auth_key_type = ops.get_auth_key_type()?;

        let mut device_pubkey = [0u8; ECDH_KEY_LEN];
        ops.ecdh_shared_secret_compute(
            curve,
            &ca_pubkey,
            &mut device_pubkey,
            &mut self.shared_secret,
        )?;
        self.salt = session_salt(&ca_pubkey, &device_pubkey);
        self.operation = Some(operation);
        self.curve = Some(curve);

        let mut session_key = Zeroizing::new([0u8; AES_128_KEY_LEN]);
        self.derive(&*ops, KdfLabel::SessionKey, &mut session_key[..])?;
        self.session_key = *session_key;

        Ok(Handshake {
            auth_key_type,
            device_pubkey,
        })
    }

    /// Derives the nonce the device authentication key signs.
    pub(crate) fn auth_nonce<O: AtapOps + ?Sized>(
        &self,
        ops: &O,
    ) -> AtapResult<Zeroizing<[u8; SESSION_NONCE_LEN]>> {
        let mut nonce = Zeroizing::new([0u8; SESSION_NONCE_LEN]);
        self.derive(ops, KdfLabel::AuthNonce, &mut nonce[..])?;
        Ok(nonce)
    }

    fn derive<O: AtapOps + ?Sized>(
        &self,
        ops: &O,
        label: KdfLabel,
        okm: &mut [u8],
    ) -> AtapResult<()> {
        ops.hkdf_sha256(&self.salt, &self.shared_secret, label.info(), okm)
    }
}

impl Zeroize for Session {
    fn zeroize(&mut self) {
        self.shared_secret.zeroize();
        self.session_key.zeroize();
        self.salt.zeroize();
        self.state = SessionState::Spent;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for Session {}
