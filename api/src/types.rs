/*++

Licensed under the Apache-2.0 license.

File Name:

    types.rs

Abstract:

    File contains the data model shared by CA requests and CA responses.

--*/

use crate::{BLOB_LEN_MAX, CERT_CHAIN_LEN_MAX, CERT_LEN_MAX, CHAIN_ENTRIES_MAX, LENGTH_FIELD_LEN};
use alloc::vec::Vec;
use atap_error::{AtapError, AtapResult};
use core::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Attestation key algorithm.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum KeyType {
    None = 0,
    Rsa = 1,
    Ecdsa = 2,
    Eddsa = 3,
    Epid = 4,
    Special = 5,
}

impl KeyType {
    /// Key types carried by an inner CA response, in wire order.
    pub const ISSUED: [KeyType; crate::ISSUED_KEY_COUNT] = [
        KeyType::Rsa,
        KeyType::Ecdsa,
        KeyType::Eddsa,
        KeyType::Epid,
        KeyType::Special,
    ];

    /// Capabilities a device may legitimately lack.
    pub fn is_optional(self) -> bool {
        matches!(self, KeyType::Eddsa | KeyType::Epid | KeyType::Special)
    }
}

impl TryFrom<u8> for KeyType {
    type Error = AtapError;

    fn try_from(value: u8) -> AtapResult<Self> {
        match value {
            0 => Ok(KeyType::None),
            1 => Ok(KeyType::Rsa),
            2 => Ok(KeyType::Ecdsa),
            3 => Ok(KeyType::Eddsa),
            4 => Ok(KeyType::Epid),
            5 => Ok(KeyType::Special),
            _ => Err(AtapError::UNSUPPORTED_ALGORITHM_KEY_TYPE),
        }
    }
}

impl From<KeyType> for u8 {
    fn from(value: KeyType) -> Self {
        value as u8
    }
}

/// Curve used for the ephemeral ECDH exchange.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CurveType {
    X25519 = 1,
    P256 = 2,
}

impl TryFrom<u8> for CurveType {
    type Error = AtapError;

    fn try_from(value: u8) -> AtapResult<Self> {
        match value {
            1 => Ok(CurveType::X25519),
            2 => Ok(CurveType::P256),
            _ => Err(AtapError::UNSUPPORTED_ALGORITHM_CURVE),
        }
    }
}

impl From<CurveType> for u8 {
    fn from(value: CurveType) -> Self {
        value as u8
    }
}

/// Provisioning operation requested by the CA.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Operation {
    /// The CA generates and returns new key pairs.
    Issue = 1,
    /// The CA certifies public keys already resident on the device.
    Certify = 2,
    /// Like `Issue`, with the inner response wrapped by the SoC global key.
    IssueEncrypted = 3,
}

impl TryFrom<u8> for Operation {
    type Error = AtapError;

    fn try_from(value: u8) -> AtapResult<Self> {
        match value {
            1 => Ok(Operation::Issue),
            2 => Ok(Operation::Certify),
            3 => Ok(Operation::IssueEncrypted),
            _ => Err(AtapError::UNSUPPORTED_OPERATION_CODE),
        }
    }
}

impl From<Operation> for u8 {
    fn from(value: Operation) -> Self {
        value as u8
    }
}

/// Length-prefixed byte string. Wiped when dropped since blobs carry issued
/// private keys.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Blob {
    data: Vec<u8>,
}

impl Blob {
    pub const fn empty() -> Self {
        Self { data: Vec::new() }
    }

    pub fn new(data: Vec<u8>) -> AtapResult<Self> {
        Self::with_limit(data, BLOB_LEN_MAX, AtapError::INVALID_INPUT_BLOB_TOO_LARGE)
    }

    pub fn from_slice(data: &[u8]) -> AtapResult<Self> {
        if data.len() > BLOB_LEN_MAX {
            return Err(AtapError::INVALID_INPUT_BLOB_TOO_LARGE);
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(data.len())
            .map_err(|_| AtapError::OOM)?;
        buf.extend_from_slice(data);
        Ok(Self { data: buf })
    }

    pub(crate) fn with_limit(mut data: Vec<u8>, max: usize, err: AtapError) -> AtapResult<Self> {
        if data.len() > max.min(BLOB_LEN_MAX) {
            data.zeroize();
            return Err(err);
        }
        Ok(Self { data })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Length field plus payload.
    pub fn serialized_size(&self) -> usize {
        LENGTH_FIELD_LEN + self.data.len()
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob").field("len", &self.data.len()).finish()
    }
}

/// Ordered list of DER certificates, leaf first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CertChain {
    certs: Vec<Blob>,
}

impl CertChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_certs<I>(certs: I) -> AtapResult<Self>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let mut chain = Self::new();
        for cert in certs {
            chain.push(cert)?;
        }
        Ok(chain)
    }

    /// Appends a certificate, enforcing the per-entry, entry-count and total
    /// size limits.
    pub fn push(&mut self, cert: Vec<u8>) -> AtapResult<()> {
        if self.certs.len() >= CHAIN_ENTRIES_MAX {
            return Err(AtapError::INVALID_INPUT_TOO_MANY_CERTS);
        }
        let cert = Blob::with_limit(cert, CERT_LEN_MAX, AtapError::INVALID_INPUT_CERT_TOO_LARGE)?;
        if self.payload_len() + cert.serialized_size() > CERT_CHAIN_LEN_MAX {
            return Err(AtapError::INVALID_INPUT_CHAIN_TOO_LARGE);
        }
        self.certs.try_reserve(1).map_err(|_| AtapError::OOM)?;
        self.certs.push(cert);
        Ok(())
    }

    /// Number of certificates.
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    pub fn certs(&self) -> &[Blob] {
        &self.certs
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.certs.iter().map(Blob::as_bytes)
    }

    /// Value of the `cert_chain_size` field: bytes of all encoded entries.
    pub fn payload_len(&self) -> usize {
        self.certs.iter().map(Blob::serialized_size).sum()
    }

    pub fn serialized_size(&self) -> usize {
        LENGTH_FIELD_LEN + self.payload_len()
    }
}
