/*++

Licensed under the Apache-2.0 license.

File Name:

    ca.rs

Abstract:

    File contains a software certificate authority speaking the CA side of
    the provisioning protocol.

--*/

use crate::crypto::{self, curve_of, EcdhSecret};
use atap_api::{
    session_salt, CaRequest, CurveType, EncryptedMessage, InnerCaRequest, InnerCaResponse,
    KdfLabel, Operation, OperationStart, AES_128_KEY_LEN, ECDH_KEY_LEN, GCM_IV_LEN,
    SESSION_NONCE_LEN,
};
use atap_error::{AtapError, AtapResult};
use zerocopy::IntoBytes;
use zeroize::Zeroizing;

/// Keys derived by the CA for the request it opened last.
struct CaSession {
    key: Zeroizing<[u8; AES_128_KEY_LEN]>,
    nonce: Zeroizing<[u8; SESSION_NONCE_LEN]>,
}

/// Software CA holding one static ECDH key per curve.
pub struct SoftwareCa {
    p256: EcdhSecret,
    x25519: EcdhSecret,
    session: Option<CaSession>,
}

impl Default for SoftwareCa {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareCa {
    pub fn new() -> Self {
        Self {
            p256: EcdhSecret::generate(CurveType::P256),
            x25519: EcdhSecret::generate(CurveType::X25519),
            session: None,
        }
    }

    fn secret(&self, curve: CurveType) -> &EcdhSecret {
        match curve {
            CurveType::P256 => &self.p256,
            CurveType::X25519 => &self.x25519,
        }
    }

    pub fn public_key(&self, curve: CurveType) -> [u8; ECDH_KEY_LEN] {
        self.secret(curve).public_key()
    }

    /// Serialized operation start message carrying this CA's key for `curve`.
    pub fn operation_start(&self, curve: CurveType, operation: Operation) -> AtapResult<Vec<u8>> {
        let start = OperationStart::new(curve, operation, &self.public_key(curve))?;
        Ok(start.as_bytes().to_vec())
    }

    fn derive<const N: usize>(
        &self,
        curve: CurveType,
        device_pubkey: &[u8; ECDH_KEY_LEN],
        label: KdfLabel,
    ) -> AtapResult<Zeroizing<[u8; N]>> {
        let shared = self.secret(curve).diffie_hellman(device_pubkey)?;
        let salt = session_salt(&self.public_key(curve), device_pubkey);
        let mut out = Zeroizing::new([0u8; N]);
        crypto::hkdf_sha256(&salt, &shared[..], label.info(), &mut out[..])?;
        Ok(out)
    }

    /// Session key shared with the device that sent `device_pubkey`.
    pub fn session_key(
        &self,
        curve: CurveType,
        device_pubkey: &[u8; ECDH_KEY_LEN],
    ) -> AtapResult<Zeroizing<[u8; AES_128_KEY_LEN]>> {
        self.derive(curve, device_pubkey, KdfLabel::SessionKey)
    }

    /// Decrypts a CA request and remembers its session for
    /// [`Self::seal_response`] and [`Self::verify_auth_signature`].
    pub fn open_request(&mut self, request: &[u8]) -> AtapResult<InnerCaRequest> {
        let request = CaRequest::decode(request)?;
        let curve = curve_of(&request.device_pubkey)?;
        let key = self.session_key(curve, &request.device_pubkey)?;
        let nonce = self.derive(curve, &request.device_pubkey, KdfLabel::AuthNonce)?;
        let plaintext = crypto::aes_gcm_128_decrypt(
            &key,
            &request.iv,
            &request.tag,
            &request.encrypted_inner_ca_request,
        )?;
        self.session = Some(CaSession { key, nonce });
        InnerCaRequest::decode(&plaintext)
    }

    fn session(&self) -> AtapResult<&CaSession> {
        self.session
            .as_ref()
            .ok_or(AtapError::INVALID_INPUT_SESSION_SPENT)
    }

    /// Checks the auth key signature over the session nonce.
    pub fn verify_auth_signature(
        &self,
        request: &InnerCaRequest,
        public_key: &[u8],
    ) -> AtapResult<()> {
        let session = self.session()?;
        crypto::verify_signature(public_key, &session.nonce[..], request.signature.as_bytes())
    }

    /// Encrypts `response` for the current session. With `soc_global_key` the
    /// inner response is first wrapped with that key.
    pub fn seal_response(
        &self,
        response: &InnerCaResponse,
        soc_global_key: Option<&[u8; AES_128_KEY_LEN]>,
    ) -> AtapResult<Vec<u8>> {
        let session = self.session()?;
        let mut payload = Zeroizing::new(response.encode()?);
        if let Some(key) = soc_global_key {
            payload = Zeroizing::new(seal(key, &payload)?);
        }
        seal(&session.key, &payload)
    }
}

fn seal(key: &[u8; AES_128_KEY_LEN], plaintext: &[u8]) -> AtapResult<Vec<u8>> {
    let mut iv = [0u8; GCM_IV_LEN];
    crypto::random_bytes(&mut iv)?;
    let (ciphertext, tag) = crypto::aes_gcm_128_encrypt(key, &iv, plaintext)?;
    EncryptedMessage {
        iv,
        ciphertext,
        tag,
    }
    .encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use atap_api::{validate_encrypted_message, HEX_UUID_LEN};

    #[test]
    fn test_operation_start() {
        let ca = SoftwareCa::new();
        let bytes = ca
            .operation_start(CurveType::X25519, Operation::IssueEncrypted)
            .unwrap();
        let start = OperationStart::parse(&bytes).unwrap();
        assert_eq!(start.curve(), Ok(CurveType::X25519));
        assert_eq!(start.operation(), Ok(Operation::IssueEncrypted));
        assert_eq!(start.ca_pubkey, ca.public_key(CurveType::X25519));
    }

    #[test]
    fn test_seal_requires_session() {
        let ca = SoftwareCa::new();
        let response = InnerCaResponse::new([b'0'; HEX_UUID_LEN]);
        assert_eq!(
            ca.seal_response(&response, None),
            Err(AtapError::INVALID_INPUT_SESSION_SPENT)
        );
    }

    #[test]
    fn test_open_rejects_garbage() {
        let mut ca = SoftwareCa::new();
        assert!(ca.open_request(&[1, 0, 0, 0, 0, 0, 0, 0]).is_err());
        assert!(ca.session.is_none());
    }

    #[test]
    fn test_sealed_layers_validate() {
        let mut ca = SoftwareCa::new();
        ca.session = Some(CaSession {
            key: Zeroizing::new([0x11; AES_128_KEY_LEN]),
            nonce: Zeroizing::new([0; SESSION_NONCE_LEN]),
        });
        let response = InnerCaResponse::new([b'f'; HEX_UUID_LEN]);
        let soc_key = [0x22; AES_128_KEY_LEN];
        let sealed = ca.seal_response(&response, Some(&soc_key)).unwrap();
        validate_encrypted_message(&sealed).unwrap();

        let outer = EncryptedMessage::decode(&sealed).unwrap();
        let inner = crypto::aes_gcm_128_decrypt(
            &[0x11; AES_128_KEY_LEN],
            &outer.iv,
            &outer.tag,
            &outer.ciphertext,
        )
        .unwrap();
        let wrapped = EncryptedMessage::decode(&inner).unwrap();
        let plaintext =
            crypto::aes_gcm_128_decrypt(&soc_key, &wrapped.iv, &wrapped.tag, &wrapped.ciphertext)
                .unwrap();
        assert_eq!(InnerCaResponse::decode(&plaintext), Ok(response));
    }
}
