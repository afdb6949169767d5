/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains the result codes shared by the attestation provisioning
    crates.

--*/
#![cfg_attr(not(feature = "std"), no_std)]
use core::convert::From;
use core::num::{NonZeroU32, TryFromIntError};

/// Attestation provisioning error code.
///
/// The upper 16 bits select the error class (see [`ErrorKind`]), the lower 16
/// bits identify the specific failure inside that class.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AtapError(pub NonZeroU32);

/// Error class of an [`AtapError`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorKind {
    Io,
    Oom,
    InvalidInput,
    UnsupportedAlgorithm,
    /// An optional capability is absent. Recoverable.
    UnsupportedOperation,
    Crypto,
    Storage,
    Unknown,
}

/// Macro to define error constants ensuring uniqueness
///
/// This macro takes a list of (name, value, doc) tuples and generates
/// constant definitions for each error code.
#[macro_export]
macro_rules! define_error_constants {
    ($(($name:ident, $value:expr, $doc:expr)),* $(,)?) => {
        $(
            #[doc = $doc]
            pub const $name: AtapError = AtapError::new_const($value);
        )*

        #[cfg(test)]
        /// Returns a vector of all defined error constants for testing uniqueness
        pub fn all_constants() -> Vec<(&'static str, u32)> {
            vec![
                $(
                    (stringify!($name), $value),
                )*
            ]
        }
    };
}

const CLASS_IO: u32 = 0x0001;
const CLASS_OOM: u32 = 0x0002;
const CLASS_INVALID_INPUT: u32 = 0x0003;
const CLASS_UNSUPPORTED_ALGORITHM: u32 = 0x0004;
const CLASS_UNSUPPORTED_OPERATION: u32 = 0x0005;
const CLASS_CRYPTO: u32 = 0x0006;
const CLASS_STORAGE: u32 = 0x0007;

impl AtapError {
    /// Create an error; intended to only be used from const contexts, as we don't want
    /// runtime panics if val is zero. The preferred way to get an AtapError from a u32 is to
    /// use `AtapError::try_from()` from the `TryFrom` trait impl.
    const fn new_const(val: u32) -> Self {
        match NonZeroU32::new(val) {
            Some(val) => Self(val),
            None => panic!("AtapError cannot be 0"),
        }
    }

    /// Returns the class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self.0.get() >> 16 {
            CLASS_IO => ErrorKind::Io,
            CLASS_OOM => ErrorKind::Oom,
            CLASS_INVALID_INPUT => ErrorKind::InvalidInput,
            CLASS_UNSUPPORTED_ALGORITHM => ErrorKind::UnsupportedAlgorithm,
            CLASS_UNSUPPORTED_OPERATION => ErrorKind::UnsupportedOperation,
            CLASS_CRYPTO => ErrorKind::Crypto,
            CLASS_STORAGE => ErrorKind::Storage,
            _ => ErrorKind::Unknown,
        }
    }

    define_error_constants![
        (IO, 0x0001_0000, "I/O error"),
        (OOM, 0x0002_0000, "Allocation failure"),
        (INVALID_INPUT, 0x0003_0000, "Invalid input"),
        (
            INVALID_INPUT_TRUNCATED,
            0x0003_0001,
            "Invalid input: buffer ends before the declared field"
        ),
        (
            INVALID_INPUT_VERSION,
            0x0003_0002,
            "Invalid input: unknown protocol version"
        ),
        (
            INVALID_INPUT_MESSAGE_LENGTH,
            0x0003_0003,
            "Invalid input: header message length does not match buffer"
        ),
        (
            INVALID_INPUT_ENCRYPTED_LENGTH,
            0x0003_0004,
            "Invalid input: encrypted length does not match message length"
        ),
        (
            INVALID_INPUT_CERT_TOO_LARGE,
            0x0003_0005,
            "Invalid input: certificate exceeds CERT_LEN_MAX"
        ),
        (
            INVALID_INPUT_CHAIN_TOO_LARGE,
            0x0003_0006,
            "Invalid input: certificate chain exceeds CERT_CHAIN_LEN_MAX"
        ),
        (
            INVALID_INPUT_TOO_MANY_CERTS,
            0x0003_0007,
            "Invalid input: certificate chain exceeds CHAIN_ENTRIES_MAX"
        ),
        (
            INVALID_INPUT_KEY_TOO_LARGE,
            0x0003_0008,
            "Invalid input: key exceeds KEY_LEN_MAX"
        ),
        (
            INVALID_INPUT_BLOB_TOO_LARGE,
            0x0003_0009,
            "Invalid input: blob exceeds its maximum length"
        ),
        (
            INVALID_INPUT_CHAIN_SIZE_MISMATCH,
            0x0003_000a,
            "Invalid input: certificate entries do not add up to the chain size"
        ),
        (
            INVALID_INPUT_TRAILING_DATA,
            0x0003_000b,
            "Invalid input: unconsumed bytes after the last field"
        ),
        (
            INVALID_INPUT_CERTIFY_PRIVATE_KEY,
            0x0003_000c,
            "Invalid input: private key returned for a certify operation"
        ),
        (
            INVALID_INPUT_KEY_WITHOUT_CERT,
            0x0003_000d,
            "Invalid input: key issued without a certificate chain"
        ),
        (
            INVALID_INPUT_CERT_WITHOUT_KEY,
            0x0003_000e,
            "Invalid input: certificate chain issued without a key"
        ),
        (
            INVALID_INPUT_OPERATION_START_SIZE,
            0x0003_000f,
            "Invalid input: operation start has the wrong size"
        ),
        (
            INVALID_INPUT_SESSION_SPENT,
            0x0003_0010,
            "Invalid input: session was already used or torn down"
        ),
        (
            INVALID_INPUT_SIGNATURE_TOO_LARGE,
            0x0003_0011,
            "Invalid input: signature exceeds SIGNATURE_LEN_MAX"
        ),
        (
            INVALID_INPUT_PUBLIC_KEY,
            0x0003_0012,
            "Invalid input: malformed ECDH public key"
        ),
        (
            UNSUPPORTED_ALGORITHM,
            0x0004_0000,
            "Unsupported algorithm"
        ),
        (
            UNSUPPORTED_ALGORITHM_CURVE,
            0x0004_0001,
            "Unsupported algorithm: unknown ECDH curve"
        ),
        (
            UNSUPPORTED_ALGORITHM_KEY_TYPE,
            0x0004_0002,
            "Unsupported algorithm: unknown key type"
        ),
        (
            UNSUPPORTED_OPERATION,
            0x0005_0000,
            "Unsupported operation"
        ),
        (
            UNSUPPORTED_OPERATION_CODE,
            0x0005_0001,
            "Unsupported operation: unknown provisioning operation"
        ),
        (CRYPTO, 0x0006_0000, "Cryptographic failure"),
        (
            CRYPTO_TAG_MISMATCH,
            0x0006_0001,
            "Cryptographic failure: AES-GCM tag mismatch"
        ),
        (
            CRYPTO_SIGN_FAILURE,
            0x0006_0002,
            "Cryptographic failure: auth key signing failed"
        ),
        (
            CRYPTO_ECDH_FAILURE,
            0x0006_0003,
            "Cryptographic failure: ECDH shared secret computation failed"
        ),
        (
            CRYPTO_KDF_FAILURE,
            0x0006_0004,
            "Cryptographic failure: HKDF derivation failed"
        ),
        (
            CRYPTO_RNG_FAILURE,
            0x0006_0005,
            "Cryptographic failure: random number generation failed"
        ),
        (
            CRYPTO_ENCRYPT_FAILURE,
            0x0006_0006,
            "Cryptographic failure: AES-GCM encryption failed"
        ),
        (STORAGE, 0x0007_0000, "Storage failure"),
        (
            STORAGE_NOT_PROVISIONED,
            0x0007_0001,
            "Storage failure: requested item is not provisioned"
        ),
    ];
}

impl From<core::num::NonZeroU32> for crate::AtapError {
    fn from(val: core::num::NonZeroU32) -> Self {
        crate::AtapError(val)
    }
}

impl From<AtapError> for core::num::NonZeroU32 {
    fn from(val: AtapError) -> Self {
        val.0
    }
}

impl From<AtapError> for u32 {
    fn from(val: AtapError) -> Self {
        core::num::NonZeroU32::from(val).get()
    }
}

impl TryFrom<u32> for AtapError {
    type Error = TryFromIntError;
    fn try_from(val: u32) -> Result<Self, TryFromIntError> {
        match NonZeroU32::try_from(val) {
            Ok(val) => Ok(AtapError(val)),
            Err(err) => Err(err),
        }
    }
}

impl core::fmt::Display for AtapError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?} error 0x{:08x}", self.kind(), self.0.get())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AtapError {}

pub type AtapResult<T> = Result<T, AtapError>;
