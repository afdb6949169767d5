/*++

Licensed under the Apache-2.0 license.

File Name:

    crypto.rs

Abstract:

    File contains the software implementations of the primitives used by the
    provisioning protocol: ECDH on P-256 and X25519, AES-128-GCM, SHA-256,
    HKDF-SHA256 and the P-256 ECDSA authentication key.

--*/

use atap_api::{
    Blob, CurveType, AES_128_KEY_LEN, ECDH_KEY_LEN, ECDH_SHARED_SECRET_LEN, GCM_IV_LEN,
    GCM_TAG_LEN, SHA256_DIGEST_LEN,
};
use atap_error::{AtapError, AtapResult};
use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes128Gcm, Key,
};
use hkdf::Hkdf;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Leading byte of an X25519 key in the 33-byte ECDH key field.
const X25519_KEY_PREFIX: u8 = 0x00;

/// ECDH private key on one of the supported curves.
pub enum EcdhSecret {
    P256(p256::SecretKey),
    X25519(x25519_dalek::StaticSecret),
}

impl EcdhSecret {
    pub fn generate(curve: CurveType) -> Self {
        match curve {
            CurveType::P256 => Self::P256(p256::SecretKey::random(&mut OsRng)),
            CurveType::X25519 => Self::X25519(x25519_dalek::StaticSecret::random_from_rng(OsRng)),
        }
    }

    pub fn curve(&self) -> CurveType {
        match self {
            Self::P256(_) => CurveType::P256,
            Self::X25519(_) => CurveType::X25519,
        }
    }

    /// Public key in the 33-byte wire encoding.
    pub fn public_key(&self) -> [u8; ECDH_KEY_LEN] {
        let mut out = [0u8; ECDH_KEY_LEN];
        match self {
            Self::P256(secret) => {
                let point = secret.public_key().to_encoded_point(true);
                out.copy_from_slice(point.as_bytes());
            }
            Self::X25519(secret) => {
                out[0] = X25519_KEY_PREFIX;
                out[1..].copy_from_slice(x25519_dalek::PublicKey::from(secret).as_bytes());
            }
        }
        out
    }

    pub fn diffie_hellman(
        &self,
        peer: &[u8; ECDH_KEY_LEN],
    ) -> AtapResult<Zeroizing<[u8; ECDH_SHARED_SECRET_LEN]>> {
        let mut out = Zeroizing::new([0u8; ECDH_SHARED_SECRET_LEN]);
        match self {
            Self::P256(secret) => {
                let peer = p256::PublicKey::from_sec1_bytes(peer)
                    .map_err(|_| AtapError::INVALID_INPUT_PUBLIC_KEY)?;
                let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
                out.copy_from_slice(shared.raw_secret_bytes());
            }
            Self::X25519(secret) => {
                if peer[0] != X25519_KEY_PREFIX {
                    return Err(AtapError::INVALID_INPUT_PUBLIC_KEY);
                }
                let mut peer_key = [0u8; ECDH_SHARED_SECRET_LEN];
                peer_key.copy_from_slice(&peer[1..]);
                let shared = secret.diffie_hellman(&x25519_dalek::PublicKey::from(peer_key));
                if !shared.was_contributory() {
                    return Err(AtapError::CRYPTO_ECDH_FAILURE);
                }
                out.copy_from_slice(shared.as_bytes());
            }
        }
        Ok(out)
    }
}

/// Curve of a 33-byte wire public key, judged by its leading byte.
pub fn curve_of(pubkey: &[u8; ECDH_KEY_LEN]) -> AtapResult<CurveType> {
    match pubkey[0] {
        X25519_KEY_PREFIX => Ok(CurveType::X25519),
        0x02 | 0x03 => Ok(CurveType::P256),
        _ => Err(AtapError::INVALID_INPUT_PUBLIC_KEY),
    }
}

/// One-shot AES-128-GCM encryption with an empty AAD.
pub fn aes_gcm_128_encrypt(
    key: &[u8; AES_128_KEY_LEN],
    iv: &[u8; GCM_IV_LEN],
    plaintext: &[u8],
) -> AtapResult<(Vec<u8>, [u8; GCM_TAG_LEN])> {
    let key: &Key<Aes128Gcm> = key.into();
    let cipher = Aes128Gcm::new(key);
    let mut buffer = plaintext.to_vec();
    match cipher.encrypt_in_place_detached(iv.into(), &[], &mut buffer) {
        Ok(tag) => Ok((buffer, tag.into())),
        Err(_) => Err(AtapError::CRYPTO_ENCRYPT_FAILURE),
    }
}

/// One-shot AES-128-GCM decryption with an empty AAD.
pub fn aes_gcm_128_decrypt(
    key: &[u8; AES_128_KEY_LEN],
    iv: &[u8; GCM_IV_LEN],
    tag: &[u8; GCM_TAG_LEN],
    ciphertext: &[u8],
) -> AtapResult<Zeroizing<Vec<u8>>> {
    let key: &Key<Aes128Gcm> = key.into();
    let cipher = Aes128Gcm::new(key);
    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(iv.into(), &[], &mut buffer, tag.into())
        .map_err(|_| AtapError::CRYPTO_TAG_MISMATCH)?;
    Ok(buffer)
}

pub fn sha256(input: &[u8]) -> [u8; SHA256_DIGEST_LEN] {
    Sha256::digest(input).into()
}

pub fn hkdf_sha256(salt: &[u8], ikm: &[u8], info: &[u8], okm: &mut [u8]) -> AtapResult<()> {
    Hkdf::<Sha256>::new(Some(salt), ikm)
        .expand(info, okm)
        .map_err(|_| AtapError::CRYPTO_KDF_FAILURE)
}

pub fn random_bytes(buf: &mut [u8]) -> AtapResult<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|_| AtapError::CRYPTO_RNG_FAILURE)
}

/// P-256 ECDSA device authentication key.
pub struct AuthKey {
    signing_key: SigningKey,
    cert_chain: Vec<Vec<u8>>,
}

impl AuthKey {
    pub fn generate(cert_chain: Vec<Vec<u8>>) -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
            cert_chain,
        }
    }

    /// Builds an auth key from a 32-byte big-endian private scalar.
    pub fn from_private_key(private_key: &[u8], cert_chain: Vec<Vec<u8>>) -> AtapResult<Self> {
        let signing_key =
            SigningKey::from_slice(private_key).map_err(|_| AtapError::INVALID_INPUT)?;
        Ok(Self {
            signing_key,
            cert_chain,
        })
    }

    pub fn cert_chain(&self) -> &[Vec<u8>] {
        &self.cert_chain
    }

    /// Uncompressed SEC1 public key.
    pub fn public_key(&self) -> Vec<u8> {
        p256::PublicKey::from(self.signing_key.verifying_key())
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    /// DER-encoded ECDSA-SHA256 signature over `message`.
    pub fn sign(&self, message: &[u8]) -> AtapResult<Blob> {
        let signature: Signature = self
            .signing_key
            .try_sign(message)
            .map_err(|_| AtapError::CRYPTO_SIGN_FAILURE)?;
        Blob::from_slice(signature.to_der().as_bytes())
    }
}

/// Checks a DER-encoded ECDSA-SHA256 signature against a SEC1 public key.
pub fn verify_signature(public_key: &[u8], message: &[u8], signature: &[u8]) -> AtapResult<()> {
    let verifying_key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|_| AtapError::INVALID_INPUT_PUBLIC_KEY)?;
    let signature =
        Signature::from_der(signature).map_err(|_| AtapError::CRYPTO_SIGN_FAILURE)?;
    verifying_key
        .verify(message, &signature)
        .map_err(|_| AtapError::CRYPTO_SIGN_FAILURE)
}
