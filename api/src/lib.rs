// Licensed under the Apache-2.0 license

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod codec;
mod kdf;
mod messages;
mod ops;
mod types;
mod validate;

pub use atap_error as error;

pub use codec::{MessageHeader, Reader, Writer};
pub use kdf::{session_salt, KdfLabel, SESSION_SALT_LEN};
pub use messages::{
    CaRequest, EncryptedMessage, InnerCaRequest, InnerCaResponse, IssuedKey, OperationStart,
};
pub use ops::AtapOps;
pub use types::{Blob, CertChain, CurveType, KeyType, Operation};
pub use validate::{validate_encrypted_message, validate_inner_ca_response};

/// Version byte carried in every message header.
pub const PROTOCOL_VERSION: u8 = 1;
/// Size of the common message header.
pub const HEADER_LEN: usize = 8;
/// Size of every length field on the wire.
pub const LENGTH_FIELD_LEN: usize = 4;

pub const ECDH_KEY_LEN: usize = 33;
pub const ECDH_SHARED_SECRET_LEN: usize = 32;
pub const GCM_IV_LEN: usize = 12;
pub const GCM_TAG_LEN: usize = 16;
pub const AES_128_KEY_LEN: usize = 16;
pub const SHA256_DIGEST_LEN: usize = 32;
pub const PRODUCT_ID_LEN: usize = 16;
pub const HEX_UUID_LEN: usize = 32;
/// Size of the HKDF-derived nonce signed by the auth key.
pub const SESSION_NONCE_LEN: usize = 16;

pub const KEY_LEN_MAX: usize = 2048;
pub const CERT_LEN_MAX: usize = 2048;
pub const CERT_CHAIN_LEN_MAX: usize = 8192;
pub const CHAIN_ENTRIES_MAX: usize = 8;
pub const BLOB_LEN_MAX: usize = CERT_CHAIN_LEN_MAX;
pub const SIGNATURE_LEN_MAX: usize = 512;

/// Number of (cert chain, key) pairs in an inner CA response.
pub const ISSUED_KEY_COUNT: usize = 5;

/// Largest serialized inner CA request: header, a full auth chain, the
/// signature, the product hash and three public keys.
pub const INNER_CA_REQUEST_LEN_MAX: usize = HEADER_LEN
    + LENGTH_FIELD_LEN
    + CERT_CHAIN_LEN_MAX
    + LENGTH_FIELD_LEN
    + SIGNATURE_LEN_MAX
    + SHA256_DIGEST_LEN
    + 3 * (LENGTH_FIELD_LEN + KEY_LEN_MAX);

/// Header, curve byte, operation byte and the CA's ECDH public key.
pub const OPERATION_START_LEN: usize = HEADER_LEN + 2 + ECDH_KEY_LEN;
/// Header, IV, encrypted length and tag with an empty ciphertext.
pub const ENCRYPTED_MESSAGE_MIN_LEN: usize =
    HEADER_LEN + GCM_IV_LEN + LENGTH_FIELD_LEN + GCM_TAG_LEN;
/// Header, UUID and the ten mandatory length fields.
pub const INNER_CA_RESPONSE_MIN_LEN: usize =
    HEADER_LEN + HEX_UUID_LEN + 2 * ISSUED_KEY_COUNT * LENGTH_FIELD_LEN;

const _: () = assert!(BLOB_LEN_MAX >= KEY_LEN_MAX);
const _: () = assert!(BLOB_LEN_MAX >= SIGNATURE_LEN_MAX);
const _: () = assert!(CERT_CHAIN_LEN_MAX >= CERT_LEN_MAX + LENGTH_FIELD_LEN);
const _: () = assert!(ECDH_KEY_LEN == ECDH_SHARED_SECRET_LEN + 1);
const _: () = assert!(INNER_CA_REQUEST_LEN_MAX > BLOB_LEN_MAX);
const _: () = assert!(INNER_CA_REQUEST_LEN_MAX <= u32::MAX as usize);
