/*++

Licensed under the Apache-2.0 license.

File Name:

    ops.rs

Abstract:

    File contains the platform operations the provisioning engine relies on.

--*/

use crate::{
    Blob, CertChain, CurveType, KeyType, AES_128_KEY_LEN, ECDH_KEY_LEN, ECDH_SHARED_SECRET_LEN,
    GCM_IV_LEN, GCM_TAG_LEN, HEX_UUID_LEN, PRODUCT_ID_LEN, SESSION_NONCE_LEN, SHA256_DIGEST_LEN,
};
use alloc::vec::Vec;
use atap_error::AtapResult;
use zeroize::Zeroizing;

/// Attestation Provisioning Platform Operations
///
/// Private key material (the auth key, the ephemeral ECDH scalar, issued
/// keys once written) stays behind this boundary.
pub trait AtapOps {
    /// Read the 16-byte product id
    fn read_product_id(&self) -> AtapResult<[u8; PRODUCT_ID_LEN]>;

    /// Get the type of the device authentication key, `KeyType::None` if the
    /// device has none
    fn get_auth_key_type(&self) -> AtapResult<KeyType>;

    /// Read the certificate chain of the device authentication key
    fn read_auth_key_cert_chain(&self) -> AtapResult<CertChain>;

    /// Store an attestation key and its certificate chain. `key` is `None`
    /// when only the certificate chain is new.
    fn write_attestation_key(
        &mut self,
        key_type: KeyType,
        key: Option<&Blob>,
        cert_chain: &CertChain,
    ) -> AtapResult<()>;

    /// Read a device-resident attestation public key
    fn read_attestation_public_key(&self, key_type: KeyType) -> AtapResult<Blob>;

    /// Read the SoC global key. Fails with an `UNSUPPORTED_OPERATION` error
    /// on devices without one.
    fn read_soc_global_key(&self) -> AtapResult<Zeroizing<[u8; AES_128_KEY_LEN]>>;

    /// Store the hex UUID issued by the CA
    fn write_hex_uuid(&mut self, uuid: &[u8; HEX_UUID_LEN]) -> AtapResult<()>;

    /// Fill `buf` with random bytes
    fn get_random_bytes(&mut self, buf: &mut [u8]) -> AtapResult<()>;

    /// Sign the session nonce with the device authentication key
    fn auth_key_sign(&self, nonce: &[u8; SESSION_NONCE_LEN]) -> AtapResult<Blob>;

    /// Generate an ephemeral key pair on `curve` and compute the shared
    /// secret with `other_pubkey`
    fn ecdh_shared_secret_compute(
        &mut self,
        curve: CurveType,
        other_pubkey: &[u8; ECDH_KEY_LEN],
        own_pubkey: &mut [u8; ECDH_KEY_LEN],
        shared_secret: &mut [u8; ECDH_SHARED_SECRET_LEN],
    ) -> AtapResult<()>;

    /// AES-GCM-128 encrypt, returning the ciphertext and tag
    fn aes_gcm_128_encrypt(
        &self,
        plaintext: &[u8],
        iv: &[u8; GCM_IV_LEN],
        key: &[u8; AES_128_KEY_LEN],
    ) -> AtapResult<(Vec<u8>, [u8; GCM_TAG_LEN])>;

    /// AES-GCM-128 decrypt. Fails on tag mismatch.
    fn aes_gcm_128_decrypt(
        &self,
        ciphertext: &[u8],
        iv: &[u8; GCM_IV_LEN],
        key: &[u8; AES_128_KEY_LEN],
        tag: &[u8; GCM_TAG_LEN],
    ) -> AtapResult<Zeroizing<Vec<u8>>>;

    /// Calculate SHA-256 digest
    fn sha256(&self, input: &[u8]) -> AtapResult<[u8; SHA256_DIGEST_LEN]>;

    /// HKDF-SHA256, filling all of `okm`
    fn hkdf_sha256(&self, salt: &[u8], ikm: &[u8], info: &[u8], okm: &mut [u8])
        -> AtapResult<()>;
}
