/*++

Licensed under the Apache-2.0 license.

File Name:

    device.rs

Abstract:

    File contains a software device implementing the provisioning platform
    operations in memory.

--*/

use crate::crypto::{self, AuthKey, EcdhSecret};
use atap_api::{
    AtapOps, Blob, CertChain, CurveType, KeyType, AES_128_KEY_LEN, ECDH_KEY_LEN,
    ECDH_SHARED_SECRET_LEN, GCM_IV_LEN, GCM_TAG_LEN, HEX_UUID_LEN, ISSUED_KEY_COUNT,
    PRODUCT_ID_LEN, SESSION_NONCE_LEN, SHA256_DIGEST_LEN,
};
use atap_error::{AtapError, AtapResult};
use log::debug;
use zeroize::Zeroizing;

/// Forces a single platform operation to fail.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TestHook {
    FailProductId,
    FailAuthKeyType,
    FailAuthCertChain,
    FailSign,
    FailEcdh,
    FailHkdf,
    FailSha256,
    FailRandom,
    FailEncrypt,
    FailDecrypt,
    FailSocGlobalKey,
    FailWriteUuid,
    FailWriteKey(KeyType),
}

impl TestHook {
    /// Error reported by the hooked operation.
    pub fn error(self) -> AtapError {
        match self {
            TestHook::FailProductId
            | TestHook::FailAuthKeyType
            | TestHook::FailAuthCertChain
            | TestHook::FailSocGlobalKey => AtapError::IO,
            TestHook::FailSign => AtapError::CRYPTO_SIGN_FAILURE,
            TestHook::FailEcdh => AtapError::CRYPTO_ECDH_FAILURE,
            TestHook::FailHkdf => AtapError::CRYPTO_KDF_FAILURE,
            TestHook::FailSha256 => AtapError::CRYPTO,
            TestHook::FailRandom => AtapError::CRYPTO_RNG_FAILURE,
            TestHook::FailEncrypt => AtapError::CRYPTO_ENCRYPT_FAILURE,
            TestHook::FailDecrypt => AtapError::CRYPTO_TAG_MISMATCH,
            TestHook::FailWriteUuid | TestHook::FailWriteKey(_) => AtapError::STORAGE,
        }
    }
}

/// Credentials written by the provisioning engine for one key type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredKey {
    pub key: Option<Blob>,
    pub cert_chain: CertChain,
}

/// In-memory device.
pub struct SoftwareDevice {
    product_id: [u8; PRODUCT_ID_LEN],
    soc_global_key: Option<Zeroizing<[u8; AES_128_KEY_LEN]>>,
    auth_key: Option<AuthKey>,
    public_keys: [Option<Vec<u8>>; ISSUED_KEY_COUNT],
    eddsa_supported: bool,
    attestation_keys: [Option<StoredKey>; ISSUED_KEY_COUNT],
    hex_uuid: Option<[u8; HEX_UUID_LEN]>,
    write_count: usize,
    test_hook: Option<TestHook>,
}

fn slot(key_type: KeyType) -> AtapResult<usize> {
    KeyType::ISSUED
        .iter()
        .position(|k| *k == key_type)
        .ok_or(AtapError::UNSUPPORTED_ALGORITHM_KEY_TYPE)
}

impl SoftwareDevice {
    pub fn new(product_id: [u8; PRODUCT_ID_LEN]) -> Self {
        Self {
            product_id,
            soc_global_key: None,
            auth_key: None,
            public_keys: Default::default(),
            eddsa_supported: true,
            attestation_keys: Default::default(),
            hex_uuid: None,
            write_count: 0,
            test_hook: None,
        }
    }

    pub fn set_soc_global_key(&mut self, key: [u8; AES_128_KEY_LEN]) {
        self.soc_global_key = Some(Zeroizing::new(key));
    }

    pub fn set_auth_key(&mut self, auth_key: AuthKey) {
        self.auth_key = Some(auth_key);
    }

    /// Provisions a device-resident public key reported for certify requests.
    pub fn set_public_key(&mut self, key_type: KeyType, key: Vec<u8>) {
        if let Ok(i) = slot(key_type) {
            self.public_keys[i] = Some(key);
        }
    }

    pub fn set_eddsa_supported(&mut self, supported: bool) {
        self.eddsa_supported = supported;
    }

    pub fn set_test_hook(&mut self, hook: TestHook) {
        self.test_hook = Some(hook);
    }

    pub fn clear_test_hook(&mut self) {
        self.test_hook = None;
    }

    pub fn product_id(&self) -> &[u8; PRODUCT_ID_LEN] {
        &self.product_id
    }

    /// Uncompressed SEC1 public key of the authentication key, if any.
    pub fn auth_public_key(&self) -> Option<Vec<u8>> {
        self.auth_key.as_ref().map(AuthKey::public_key)
    }

    pub fn hex_uuid(&self) -> Option<&[u8; HEX_UUID_LEN]> {
        self.hex_uuid.as_ref()
    }

    pub fn attestation_key(&self, key_type: KeyType) -> Option<&StoredKey> {
        slot(key_type)
            .ok()
            .and_then(|i| self.attestation_keys[i].as_ref())
    }

    /// Number of successful storage writes (keys and UUID).
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    fn check_hook(&self, hook: TestHook) -> AtapResult<()> {
        match self.test_hook {
            Some(active) if active == hook => Err(hook.error()),
            _ => Ok(()),
        }
    }
}

impl AtapOps for SoftwareDevice {
    fn read_product_id(&self) -> AtapResult<[u8; PRODUCT_ID_LEN]> {
        self.check_hook(TestHook::FailProductId)?;
        Ok(self.product_id)
    }

    fn get_auth_key_type(&self) -> AtapResult<KeyType> {
        self.check_hook(TestHook::FailAuthKeyType)?;
        Ok(match self.auth_key {
            Some(_) => KeyType::Ecdsa,
            None => KeyType::None,
        })
    }

    fn read_auth_key_cert_chain(&self) -> AtapResult<CertChain> {
        self.check_hook(TestHook::FailAuthCertChain)?;
        let auth_key = self
            .auth_key
            .as_ref()
            .ok_or(AtapError::STORAGE_NOT_PROVISIONED)?;
        CertChain::from_certs(auth_key.cert_chain().iter().cloned())
    }

    fn write_attestation_key(
        &mut self,
        key_type: KeyType,
        key: Option<&Blob>,
        cert_chain: &CertChain,
    ) -> AtapResult<()> {
        self.check_hook(TestHook::FailWriteKey(key_type))?;
        if key_type == KeyType::Eddsa && !self.eddsa_supported {
            return Err(AtapError::UNSUPPORTED_ALGORITHM);
        }
        let i = slot(key_type)?;
        self.attestation_keys[i] = Some(StoredKey {
            key: key.cloned(),
            cert_chain: cert_chain.clone(),
        });
        self.write_count += 1;
        debug!(
            "[sw-ops] Stored {key_type:?}: {} certs, key {}",
            cert_chain.len(),
            key.map_or(0, Blob::len)
        );
        Ok(())
    }

    fn read_attestation_public_key(&self, key_type: KeyType) -> AtapResult<Blob> {
        let i = slot(key_type)?;
        let unsupported = key_type == KeyType::Eddsa
            && (!self.eddsa_supported || self.public_keys[i].is_none());
        if unsupported {
            return Err(AtapError::UNSUPPORTED_OPERATION);
        }
        match &self.public_keys[i] {
            Some(key) => Blob::from_slice(key),
            None => Err(AtapError::STORAGE_NOT_PROVISIONED),
        }
    }

    fn read_soc_global_key(&self) -> AtapResult<Zeroizing<[u8; AES_128_KEY_LEN]>> {
        self.check_hook(TestHook::FailSocGlobalKey)?;
        self.soc_global_key
            .clone()
            .ok_or(AtapError::UNSUPPORTED_OPERATION)
    }

    fn write_hex_uuid(&mut self, uuid: &[u8; HEX_UUID_LEN]) -> AtapResult<()> {
        self.check_hook(TestHook::FailWriteUuid)?;
        self.hex_uuid = Some(*uuid);
        self.write_count += 1;
        Ok(())
    }

    fn get_random_bytes(&mut self, buf: &mut [u8]) -> AtapResult<()> {
        self.check_hook(TestHook::FailRandom)?;
        crypto::random_bytes(buf)
    }

    fn auth_key_sign(&self, nonce: &[u8; SESSION_NONCE_LEN]) -> AtapResult<Blob> {
        self.check_hook(TestHook::FailSign)?;
        self.auth_key
            .as_ref()
            .ok_or(AtapError::STORAGE_NOT_PROVISIONED)?
            .sign(nonce)
    }

    fn ecdh_shared_secret_compute(
        &mut self,
        curve: CurveType,
        other_pubkey: &[u8; ECDH_KEY_LEN],
        own_pubkey: &mut [u8; ECDH_KEY_LEN],
        shared_secret: &mut [u8; ECDH_SHARED_SECRET_LEN],
    ) -> AtapResult<()> {
        self.check_hook(TestHook::FailEcdh)?;
        let ephemeral = EcdhSecret::generate(curve);
        let shared = ephemeral.diffie_hellman(other_pubkey)?;
        *own_pubkey = ephemeral.public_key();
        shared_secret.copy_from_slice(&shared[..]);
        Ok(())
    }

    fn aes_gcm_128_encrypt(
        &self,
        plaintext: &[u8],
        iv: &[u8; GCM_IV_LEN],
        key: &[u8; AES_128_KEY_LEN],
    ) -> AtapResult<(Vec<u8>, [u8; GCM_TAG_LEN])> {
        self.check_hook(TestHook::FailEncrypt)?;
        crypto::aes_gcm_128_encrypt(key, iv, plaintext)
    }

    fn aes_gcm_128_decrypt(
        &self,
        ciphertext: &[u8],
        iv: &[u8; GCM_IV_LEN],
        key: &[u8; AES_128_KEY_LEN],
        tag: &[u8; GCM_TAG_LEN],
    ) -> AtapResult<Zeroizing<Vec<u8>>> {
        self.check_hook(TestHook::FailDecrypt)?;
        crypto::aes_gcm_128_decrypt(key, iv, tag, ciphertext)
    }

    fn sha256(&self, input: &[u8]) -> AtapResult<[u8; SHA256_DIGEST_LEN]> {
        self.check_hook(TestHook::FailSha256)?;
        Ok(crypto::sha256(input))
    }

    fn hkdf_sha256(
        &self,
        salt: &[u8],
        ikm: &[u8],
        info: &[u8],
        okm: &mut [u8],
    ) -> AtapResult<()> {
        self.check_hook(TestHook::FailHkdf)?;
        crypto::hkdf_sha256(salt, ikm, info, okm)
    }
}
