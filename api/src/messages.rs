/*++

Licensed under the Apache-2.0 license.

File Name:

    messages.rs

Abstract:

    File contains the wire messages exchanged with the CA.

--*/

use crate::codec::{MessageHeader, Reader, Writer};
use crate::validate::validate_encrypted_message;
use crate::{
    Blob, CertChain, CurveType, KeyType, Operation, ECDH_KEY_LEN, GCM_IV_LEN, GCM_TAG_LEN,
    HEADER_LEN, HEX_UUID_LEN, INNER_CA_REQUEST_LEN_MAX, ISSUED_KEY_COUNT, KEY_LEN_MAX,
    LENGTH_FIELD_LEN, OPERATION_START_LEN, PROTOCOL_VERSION, SHA256_DIGEST_LEN,
    SIGNATURE_LEN_MAX,
};
use alloc::vec::Vec;
use atap_error::{AtapError, AtapResult};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Message sent by the CA to start a provisioning operation.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct OperationStart {
    pub header: MessageHeader,
    pub curve_type: u8,
    pub operation: u8,
    pub ca_pubkey: [u8; ECDH_KEY_LEN],
}

const _: () = assert!(core::mem::size_of::<OperationStart>() == OPERATION_START_LEN);

impl OperationStart {
    pub fn new(
        curve_type: CurveType,
        operation: Operation,
        ca_pubkey: &[u8; ECDH_KEY_LEN],
    ) -> AtapResult<Self> {
        Ok(Self {
            header: MessageHeader::new(OPERATION_START_LEN - HEADER_LEN)?,
            curve_type: curve_type.into(),
            operation: operation.into(),
            ca_pubkey: *ca_pubkey,
        })
    }

    /// Checks size, version and declared length of an operation start
    /// buffer. The curve and operation bytes are validated by the accessors.
    pub fn parse(buf: &[u8]) -> AtapResult<&Self> {
        if buf.len() != OPERATION_START_LEN {
            return Err(AtapError::INVALID_INPUT_OPERATION_START_SIZE);
        }
        let start =
            Self::ref_from_bytes(buf).map_err(|_| AtapError::INVALID_INPUT_OPERATION_START_SIZE)?;
        if start.header.version != PROTOCOL_VERSION {
            return Err(AtapError::INVALID_INPUT_VERSION);
        }
        if start.header.message_length() != ECDH_KEY_LEN + 2 {
            return Err(AtapError::INVALID_INPUT_MESSAGE_LENGTH);
        }
        Ok(start)
    }

    pub fn curve(&self) -> AtapResult<CurveType> {
        CurveType::try_from(self.curve_type)
    }

    pub fn operation(&self) -> AtapResult<Operation> {
        Operation::try_from(self.operation)
    }
}

/// Encrypted request sent by the device to the CA.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaRequest {
    pub device_pubkey: [u8; ECDH_KEY_LEN],
    pub iv: [u8; GCM_IV_LEN],
    /// AES-GCM ciphertext of a serialized [`InnerCaRequest`], at most
    /// [`INNER_CA_REQUEST_LEN_MAX`] bytes.
    pub encrypted_inner_ca_request: Vec<u8>,
    pub tag: [u8; GCM_TAG_LEN],
}

impl CaRequest {
    pub fn serialized_size(&self) -> usize {
        HEADER_LEN
            + ECDH_KEY_LEN
            + GCM_IV_LEN
            + LENGTH_FIELD_LEN
            + self.encrypted_inner_ca_request.len()
            + GCM_TAG_LEN
    }

    pub fn encode(&self) -> AtapResult<Vec<u8>> {
        if self.encrypted_inner_ca_request.len() > INNER_CA_REQUEST_LEN_MAX {
            return Err(AtapError::INVALID_INPUT_BLOB_TOO_LARGE);
        }
        let size = self.serialized_size();
        let mut w = Writer::with_capacity(size)?;
        w.put_header(size - HEADER_LEN)?;
        w.put_bytes(&self.device_pubkey);
        w.put_bytes(&self.iv);
        w.put_len(self.encrypted_inner_ca_request.len())?;
        w.put_bytes(&self.encrypted_inner_ca_request);
        w.put_bytes(&self.tag);
        debug_assert_eq!(w.len(), size);
        Ok(w.finish())
    }

    pub fn decode(buf: &[u8]) -> AtapResult<Self> {
        let (_, mut r) = Reader::open_message(buf)?;
        let device_pubkey = r.read_array()?;
        let iv = r.read_array()?;
        let len = r.read_len()?;
        if len > INNER_CA_REQUEST_LEN_MAX {
            return Err(AtapError::INVALID_INPUT_BLOB_TOO_LARGE);
        }
        let ciphertext = r.take(len)?;
        let tag = r.read_array()?;
        r.finish()?;
        Ok(Self {
            device_pubkey,
            iv,
            encrypted_inner_ca_request: copy_bytes(ciphertext)?,
            tag,
        })
    }
}

/// Plaintext request payload. Only ever transmitted encrypted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InnerCaRequest {
    pub auth_key_cert_chain: CertChain,
    /// Auth key signature over the session nonce; empty without an auth key.
    pub signature: Blob,
    pub product_id_hash: [u8; SHA256_DIGEST_LEN],
    pub rsa_pubkey: Blob,
    pub ecdsa_pubkey: Blob,
    pub eddsa_pubkey: Blob,
}

impl Default for InnerCaRequest {
    fn default() -> Self {
        Self {
            auth_key_cert_chain: CertChain::new(),
            signature: Blob::empty(),
            product_id_hash: [0; SHA256_DIGEST_LEN],
            rsa_pubkey: Blob::empty(),
            ecdsa_pubkey: Blob::empty(),
            eddsa_pubkey: Blob::empty(),
        }
    }
}

impl InnerCaRequest {
    pub fn serialized_size(&self) -> usize {
        HEADER_LEN
            + self.auth_key_cert_chain.serialized_size()
            + self.signature.serialized_size()
            + SHA256_DIGEST_LEN
            + self.rsa_pubkey.serialized_size()
            + self.ecdsa_pubkey.serialized_size()
            + self.eddsa_pubkey.serialized_size()
    }

    fn check_limits(&self) -> AtapResult<()> {
        if self.signature.len() > SIGNATURE_LEN_MAX {
            return Err(AtapError::INVALID_INPUT_SIGNATURE_TOO_LARGE);
        }
        for key in [&self.rsa_pubkey, &self.ecdsa_pubkey, &self.eddsa_pubkey] {
            if key.len() > KEY_LEN_MAX {
                return Err(AtapError::INVALID_INPUT_KEY_TOO_LARGE);
            }
        }
        Ok(())
    }

    pub fn encode(&self) -> AtapResult<Vec<u8>> {
        self.check_limits()?;
        let size = self.serialized_size();
        let mut w = Writer::with_capacity(size)?;
        w.put_header(size - HEADER_LEN)?;
        w.put_cert_chain(&self.auth_key_cert_chain)?;
        w.put_blob(&self.signature)?;
        w.put_bytes(&self.product_id_hash);
        w.put_blob(&self.rsa_pubkey)?;
        w.put_blob(&self.ecdsa_pubkey)?;
        w.put_blob(&self.eddsa_pubkey)?;
        debug_assert_eq!(w.len(), size);
        Ok(w.finish())
    }

    pub fn decode(buf: &[u8]) -> AtapResult<Self> {
        let (_, mut r) = Reader::open_message(buf)?;
        let request = Self {
            auth_key_cert_chain: r.read_cert_chain()?,
            signature: r.read_blob(
                SIGNATURE_LEN_MAX,
                AtapError::INVALID_INPUT_SIGNATURE_TOO_LARGE,
            )?,
            product_id_hash: r.read_array()?,
            rsa_pubkey: r.read_blob(KEY_LEN_MAX, AtapError::INVALID_INPUT_KEY_TOO_LARGE)?,
            ecdsa_pubkey: r.read_blob(KEY_LEN_MAX, AtapError::INVALID_INPUT_KEY_TOO_LARGE)?,
            eddsa_pubkey: r.read_blob(KEY_LEN_MAX, AtapError::INVALID_INPUT_KEY_TOO_LARGE)?,
        };
        r.finish()?;
        Ok(request)
    }
}

/// AES-GCM envelope used for the CA response and for its optional inner
/// layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedMessage {
    pub iv: [u8; GCM_IV_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; GCM_TAG_LEN],
}

impl EncryptedMessage {
    pub fn serialized_size(&self) -> usize {
        HEADER_LEN + GCM_IV_LEN + LENGTH_FIELD_LEN + self.ciphertext.len() + GCM_TAG_LEN
    }

    pub fn encode(&self) -> AtapResult<Vec<u8>> {
        let size = self.serialized_size();
        let mut w = Writer::with_capacity(size)?;
        w.put_header(size - HEADER_LEN)?;
        w.put_bytes(&self.iv);
        w.put_len(self.ciphertext.len())?;
        w.put_bytes(&self.ciphertext);
        w.put_bytes(&self.tag);
        debug_assert_eq!(w.len(), size);
        Ok(w.finish())
    }

    /// Validates `buf` with [`validate_encrypted_message`] and copies out its
    /// fields.
    pub fn decode(buf: &[u8]) -> AtapResult<Self> {
        validate_encrypted_message(buf)?;
        let (_, mut r) = Reader::open_message(buf)?;
        let iv = r.read_array()?;
        let len = r.read_len()?;
        let ciphertext = r.take(len)?;
        let tag = r.read_array()?;
        r.finish()?;
        Ok(Self {
            iv,
            ciphertext: copy_bytes(ciphertext)?,
            tag,
        })
    }
}

fn copy_bytes(data: &[u8]) -> AtapResult<Vec<u8>> {
    let mut owned = Vec::new();
    owned
        .try_reserve_exact(data.len())
        .map_err(|_| AtapError::OOM)?;
    owned.extend_from_slice(data);
    Ok(owned)
}

/// Credentials issued or certified by the CA for one key type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IssuedKey {
    pub cert_chain: CertChain,
    /// Private key; empty when the key already resides on the device.
    pub key: Blob,
}

impl IssuedKey {
    pub fn serialized_size(&self) -> usize {
        self.cert_chain.serialized_size() + self.key.serialized_size()
    }
}

/// Plaintext CA response payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InnerCaResponse {
    /// Hex UUID placed in the subject of the product key certificate.
    pub hex_uuid: [u8; HEX_UUID_LEN],
    /// One entry per [`KeyType::ISSUED`] type, in the same order.
    pub issued: [IssuedKey; ISSUED_KEY_COUNT],
}

impl InnerCaResponse {
    pub fn new(hex_uuid: [u8; HEX_UUID_LEN]) -> Self {
        Self {
            hex_uuid,
            issued: Default::default(),
        }
    }

    fn index(key_type: KeyType) -> Option<usize> {
        KeyType::ISSUED.iter().position(|k| *k == key_type)
    }

    pub fn issued_key(&self, key_type: KeyType) -> Option<&IssuedKey> {
        Self::index(key_type).map(|i| &self.issued[i])
    }

    pub fn issued_key_mut(&mut self, key_type: KeyType) -> Option<&mut IssuedKey> {
        Self::index(key_type).map(move |i| &mut self.issued[i])
    }

    /// Iterates the (key type, credentials) pairs in wire order.
    pub fn iter(&self) -> impl Iterator<Item = (KeyType, &IssuedKey)> {
        KeyType::ISSUED.into_iter().zip(self.issued.iter())
    }

    pub fn serialized_size(&self) -> usize {
        HEADER_LEN
            + HEX_UUID_LEN
            + self
                .issued
                .iter()
                .map(IssuedKey::serialized_size)
                .sum::<usize>()
    }

    pub fn encode(&self) -> AtapResult<Vec<u8>> {
        if self.issued.iter().any(|issued| issued.key.len() > KEY_LEN_MAX) {
            return Err(AtapError::INVALID_INPUT_KEY_TOO_LARGE);
        }
        let size = self.serialized_size();
        let mut w = Writer::with_capacity(size)?;
        w.put_header(size - HEADER_LEN)?;
        w.put_bytes(&self.hex_uuid);
        for issued in self.issued.iter() {
            w.put_cert_chain(&issued.cert_chain)?;
            w.put_blob(&issued.key)?;
        }
        debug_assert_eq!(w.len(), size);
        Ok(w.finish())
    }

    /// Structural decode. Operation-specific rules are enforced by
    /// [`crate::validate_inner_ca_response`], which must run first on
    /// untrusted input.
    pub fn decode(buf: &[u8]) -> AtapResult<Self> {
        let (_, mut r) = Reader::open_message(buf)?;
        let mut response = Self::new(r.read_array()?);
        for issued in response.issued.iter_mut() {
            issued.cert_chain = r.read_cert_chain()?;
            issued.key = r.read_blob(KEY_LEN_MAX, AtapError::INVALID_INPUT_KEY_TOO_LARGE)?;
        }
        r.finish()?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CERT_CHAIN_LEN_MAX, CERT_LEN_MAX, ENCRYPTED_MESSAGE_MIN_LEN, INNER_CA_RESPONSE_MIN_LEN,
    };
    use alloc::vec;

    fn sample_inner_request() -> InnerCaRequest {
        InnerCaRequest {
            auth_key_cert_chain: CertChain::from_certs([vec![0x30; 300], vec![0x31; 280]])
                .unwrap(),
            signature: Blob::new(vec![0x5a; 71]).unwrap(),
            product_id_hash: [0x11; SHA256_DIGEST_LEN],
            rsa_pubkey: Blob::new(vec![0x01; 270]).unwrap(),
            ecdsa_pubkey: Blob::new(vec![0x02; 91]).unwrap(),
            eddsa_pubkey: Blob::empty(),
        }
    }

    fn sample_inner_response() -> InnerCaResponse {
        let mut response = InnerCaResponse::new(*b"0123456789abcdef0123456789abcdef");
        let rsa = response.issued_key_mut(KeyType::Rsa).unwrap();
        rsa.cert_chain = CertChain::from_certs([vec![0xc1; 120], vec![0xc2; 80]]).unwrap();
        rsa.key = Blob::new(vec![0x4b; 1190]).unwrap();
        let special = response.issued_key_mut(KeyType::Special).unwrap();
        special.cert_chain = CertChain::from_certs([vec![0xc3; 64]]).unwrap();
        response
    }

    #[test]
    fn test_operation_start() {
        let start = OperationStart::new(CurveType::P256, Operation::Certify, &[0x02; 33]).unwrap();
        let bytes = start.as_bytes().to_vec();
        assert_eq!(bytes.len(), OPERATION_START_LEN);
        assert_eq!(bytes[0], PROTOCOL_VERSION);
        assert_eq!(&bytes[4..8], &35u32.to_ne_bytes());
        assert_eq!(bytes[8], 2);
        assert_eq!(bytes[9], 2);

        let parsed = OperationStart::parse(&bytes).unwrap();
        assert_eq!(parsed.curve(), Ok(CurveType::P256));
        assert_eq!(parsed.operation(), Ok(Operation::Certify));
        assert_eq!(parsed.ca_pubkey, [0x02; 33]);

        assert_eq!(
            OperationStart::parse(&bytes[..42]).err(),
            Some(AtapError::INVALID_INPUT_OPERATION_START_SIZE)
        );

        let mut bad = bytes.clone();
        bad[4..8].copy_from_slice(&34u32.to_ne_bytes());
        assert_eq!(
            OperationStart::parse(&bad).err(),
            Some(AtapError::INVALID_INPUT_MESSAGE_LENGTH)
        );

        let mut bad = bytes.clone();
        bad[8] = 0x09;
        assert_eq!(
            OperationStart::parse(&bad).unwrap().curve(),
            Err(AtapError::UNSUPPORTED_ALGORITHM_CURVE)
        );
    }

    #[test]
    fn test_ca_request_round_trip() {
        let request = CaRequest {
            device_pubkey: [0x03; ECDH_KEY_LEN],
            iv: [0x0a; GCM_IV_LEN],
            encrypted_inner_ca_request: vec![0xee; 777],
            tag: [0x7f; GCM_TAG_LEN],
        };
        let bytes = request.encode().unwrap();
        assert_eq!(bytes.len(), request.serialized_size());
        assert_eq!(&bytes[8..41], &[0x03; ECDH_KEY_LEN]);
        assert_eq!(&bytes[53..57], &777u32.to_ne_bytes());
        assert_eq!(CaRequest::decode(&bytes), Ok(request));

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert_eq!(
            CaRequest::decode(&trailing),
            Err(AtapError::INVALID_INPUT_MESSAGE_LENGTH)
        );
    }

    #[test]
    fn test_ca_request_ciphertext_limit() {
        let mut request = CaRequest {
            device_pubkey: [0x02; ECDH_KEY_LEN],
            iv: [0; GCM_IV_LEN],
            encrypted_inner_ca_request: vec![0x5a; INNER_CA_REQUEST_LEN_MAX],
            tag: [0; GCM_TAG_LEN],
        };
        let bytes = request.encode().unwrap();
        assert_eq!(CaRequest::decode(&bytes), Ok(request.clone()));

        request.encrypted_inner_ca_request.push(0);
        assert_eq!(
            request.encode(),
            Err(AtapError::INVALID_INPUT_BLOB_TOO_LARGE)
        );

        // Length field claiming one byte more than the limit.
        let mut oversized = bytes.clone();
        oversized[53..57].copy_from_slice(&(INNER_CA_REQUEST_LEN_MAX as u32 + 1).to_ne_bytes());
        assert_eq!(
            CaRequest::decode(&oversized),
            Err(AtapError::INVALID_INPUT_BLOB_TOO_LARGE)
        );
    }

    #[test]
    fn test_largest_inner_ca_request_fits() {
        let per_cert = CERT_CHAIN_LEN_MAX / 4 - LENGTH_FIELD_LEN;
        let request = InnerCaRequest {
            auth_key_cert_chain: CertChain::from_certs((0..4).map(|i| vec![i as u8; per_cert]))
                .unwrap(),
            signature: Blob::new(vec![0x51; SIGNATURE_LEN_MAX]).unwrap(),
            product_id_hash: [0x48; SHA256_DIGEST_LEN],
            rsa_pubkey: Blob::new(vec![0x30; KEY_LEN_MAX]).unwrap(),
            ecdsa_pubkey: Blob::new(vec![0x04; KEY_LEN_MAX]).unwrap(),
            eddsa_pubkey: Blob::new(vec![0xed; KEY_LEN_MAX]).unwrap(),
        };
        assert_eq!(request.auth_key_cert_chain.payload_len(), CERT_CHAIN_LEN_MAX);
        assert_eq!(request.serialized_size(), INNER_CA_REQUEST_LEN_MAX);
        let bytes = request.encode().unwrap();
        assert_eq!(InnerCaRequest::decode(&bytes), Ok(request));
    }

    #[test]
    fn test_inner_ca_request_round_trip() {
        for request in [InnerCaRequest::default(), sample_inner_request()] {
            let bytes = request.encode().unwrap();
            assert_eq!(bytes.len(), request.serialized_size());
            assert_eq!(InnerCaRequest::decode(&bytes), Ok(request));
        }
    }

    #[test]
    fn test_inner_ca_request_limits() {
        let mut request = sample_inner_request();
        request.signature = Blob::new(vec![0; SIGNATURE_LEN_MAX + 1]).unwrap();
        assert_eq!(
            request.encode(),
            Err(AtapError::INVALID_INPUT_SIGNATURE_TOO_LARGE)
        );

        let mut request = sample_inner_request();
        request.ecdsa_pubkey = Blob::new(vec![0; KEY_LEN_MAX + 1]).unwrap();
        assert_eq!(request.encode(), Err(AtapError::INVALID_INPUT_KEY_TOO_LARGE));
    }

    #[test]
    fn test_encrypted_message_round_trip() {
        let message = EncryptedMessage {
            iv: [1; GCM_IV_LEN],
            ciphertext: vec![0xab; 100],
            tag: [2; GCM_TAG_LEN],
        };
        let bytes = message.encode().unwrap();
        assert_eq!(bytes.len(), message.serialized_size());
        assert_eq!(EncryptedMessage::decode(&bytes), Ok(message));

        let empty = EncryptedMessage {
            iv: [0; GCM_IV_LEN],
            ciphertext: Vec::new(),
            tag: [0; GCM_TAG_LEN],
        };
        assert_eq!(empty.encode().unwrap().len(), ENCRYPTED_MESSAGE_MIN_LEN);
    }

    #[test]
    fn test_inner_ca_response_round_trip() {
        let response = sample_inner_response();
        let bytes = response.encode().unwrap();
        assert_eq!(bytes.len(), response.serialized_size());
        assert_eq!(InnerCaResponse::decode(&bytes), Ok(response));

        let empty = InnerCaResponse::new([b'0'; HEX_UUID_LEN]);
        assert_eq!(empty.encode().unwrap().len(), INNER_CA_RESPONSE_MIN_LEN);
    }

    #[test]
    fn test_inner_ca_response_order() {
        let response = sample_inner_response();
        let order: Vec<KeyType> = response.iter().map(|(k, _)| k).collect();
        assert_eq!(order, KeyType::ISSUED.to_vec());
        assert!(response.issued_key(KeyType::None).is_none());
        assert_eq!(
            response.issued_key(KeyType::Rsa).unwrap().cert_chain.len(),
            2
        );
        // RSA pair is first on the wire, right after header and UUID.
        let bytes = response.encode().unwrap();
        assert_eq!(&bytes[40..44], &208u32.to_ne_bytes());
    }

    #[test]
    fn test_inner_ca_response_oversized_key() {
        let mut response = sample_inner_response();
        response.issued_key_mut(KeyType::Ecdsa).unwrap().key =
            Blob::new(vec![0; KEY_LEN_MAX + 1]).unwrap();
        assert_eq!(response.encode(), Err(AtapError::INVALID_INPUT_KEY_TOO_LARGE));
    }

    #[test]
    fn test_inner_ca_response_oversized_cert_rejected() {
        let mut bytes = sample_inner_response().encode().unwrap();
        // Grow the first RSA certificate length past CERT_LEN_MAX.
        bytes[44..48].copy_from_slice(&(CERT_LEN_MAX as u32 + 1).to_ne_bytes());
        assert_eq!(
            InnerCaResponse::decode(&bytes),
            Err(AtapError::INVALID_INPUT_CERT_TOO_LARGE)
        );
    }
}
