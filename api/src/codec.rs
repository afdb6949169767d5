/*++

Licensed under the Apache-2.0 license.

File Name:

    codec.rs

Abstract:

    File contains the cursor types used to encode and decode protocol
    messages. All integers are 4-byte fields in host byte order.

--*/

use crate::{
    Blob, CertChain, BLOB_LEN_MAX, CERT_CHAIN_LEN_MAX, CERT_LEN_MAX, CHAIN_ENTRIES_MAX,
    HEADER_LEN, LENGTH_FIELD_LEN, PROTOCOL_VERSION,
};
use alloc::vec::Vec;
use atap_error::{AtapError, AtapResult};
use zerocopy::byteorder::{NativeEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Common header of every protocol message.
#[repr(C)]
#[derive(Clone, Copy, Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct MessageHeader {
    pub version: u8,
    pub reserved: [u8; 3],
    /// Bytes following the header.
    pub message_length: U32<NativeEndian>,
}

const _: () = assert!(core::mem::size_of::<MessageHeader>() == HEADER_LEN);

impl MessageHeader {
    pub fn new(message_length: usize) -> AtapResult<Self> {
        let message_length =
            u32::try_from(message_length).map_err(|_| AtapError::INVALID_INPUT_MESSAGE_LENGTH)?;
        Ok(Self {
            version: PROTOCOL_VERSION,
            reserved: [0; 3],
            message_length: U32::new(message_length),
        })
    }

    pub fn message_length(&self) -> usize {
        self.message_length.get() as usize
    }
}

/// Append-only message encoder.
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Reserves `len` bytes up front; the encoders pass their exact serialized
    /// size so the buffer never grows.
    pub fn with_capacity(len: usize) -> AtapResult<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len).map_err(|_| AtapError::OOM)?;
        Ok(Self { buf })
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_ne_bytes());
    }

    pub fn put_len(&mut self, len: usize) -> AtapResult<()> {
        let len = u32::try_from(len).map_err(|_| AtapError::INVALID_INPUT_BLOB_TOO_LARGE)?;
        self.put_u32(len);
        Ok(())
    }

    pub fn put_header(&mut self, message_length: usize) -> AtapResult<()> {
        let header = MessageHeader::new(message_length)?;
        self.put_bytes(header.as_bytes());
        Ok(())
    }

    pub fn put_blob(&mut self, blob: &Blob) -> AtapResult<()> {
        self.put_len(blob.len())?;
        self.put_bytes(blob.as_bytes());
        Ok(())
    }

    pub fn put_cert_chain(&mut self, chain: &CertChain) -> AtapResult<()> {
        self.put_len(chain.payload_len())?;
        for cert in chain.certs() {
            self.put_blob(cert)?;
        }
        Ok(())
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked cursor over an untrusted buffer. Every read fails closed
/// with an `INVALID_INPUT` error instead of indexing past the end.
pub struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Reads the header of `buf` and checks the version byte and that the
    /// declared message length covers exactly the rest of the buffer.
    pub fn open_message(buf: &'a [u8]) -> AtapResult<(MessageHeader, Self)> {
        let mut reader = Self::new(buf);
        let header = reader.read_header()?;
        if header.message_length() != reader.remaining() {
            return Err(AtapError::INVALID_INPUT_MESSAGE_LENGTH);
        }
        Ok((header, reader))
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn take(&mut self, len: usize) -> AtapResult<&'a [u8]> {
        if len > self.buf.len() {
            return Err(AtapError::INVALID_INPUT_TRUNCATED);
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    pub fn read_u8(&mut self) -> AtapResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> AtapResult<u32> {
        Ok(u32::from_ne_bytes(self.read_array()?))
    }

    pub fn read_len(&mut self) -> AtapResult<usize> {
        Ok(self.read_u32()? as usize)
    }

    pub fn read_array<const N: usize>(&mut self) -> AtapResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_header(&mut self) -> AtapResult<MessageHeader> {
        let (header, rest) = MessageHeader::read_from_prefix(self.buf)
            .map_err(|_| AtapError::INVALID_INPUT_TRUNCATED)?;
        if header.version != PROTOCOL_VERSION {
            return Err(AtapError::INVALID_INPUT_VERSION);
        }
        self.buf = rest;
        Ok(header)
    }

    /// Reads a blob whose length must not exceed `max`. The length is checked
    /// before any allocation.
    pub fn read_blob(&mut self, max: usize, err: AtapError) -> AtapResult<Blob> {
        let data = self.skip_blob(max, err)?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(data.len())
            .map_err(|_| AtapError::OOM)?;
        buf.extend_from_slice(data);
        Blob::with_limit(buf, max, err)
    }

    /// Consumes a blob without copying it and returns its payload.
    pub fn skip_blob(&mut self, max: usize, err: AtapError) -> AtapResult<&'a [u8]> {
        let len = self.read_len()?;
        if len > max || len > BLOB_LEN_MAX {
            return Err(err);
        }
        self.take(len)
    }

    pub fn read_cert_chain(&mut self) -> AtapResult<CertChain> {
        let mut chain = CertChain::new();
        self.walk_cert_chain(|cert| {
            let mut buf = Vec::new();
            buf.try_reserve_exact(cert.len())
                .map_err(|_| AtapError::OOM)?;
            buf.extend_from_slice(cert);
            chain.push(buf)
        })?;
        Ok(chain)
    }

    /// Consumes a certificate chain without copying it and returns the number
    /// of entries.
    pub fn skip_cert_chain(&mut self) -> AtapResult<usize> {
        let mut count = 0;
        self.walk_cert_chain(|_| {
            count += 1;
            Ok(())
        })?;
        Ok(count)
    }

    /// Walks the entries of a certificate chain, checking every entry against
    /// the chain limits before handing it to `visit`. The entries must account
    /// for the declared chain size exactly.
    fn walk_cert_chain<F>(&mut self, mut visit: F) -> AtapResult<()>
    where
        F: FnMut(&'a [u8]) -> AtapResult<()>,
    {
        let chain_size = self.read_len()?;
        if chain_size > CERT_CHAIN_LEN_MAX {
            return Err(AtapError::INVALID_INPUT_CHAIN_TOO_LARGE);
        }
        let mut entries = Reader::new(self.take(chain_size)?);
        let mut count = 0;
        while entries.remaining() > 0 {
            if count == CHAIN_ENTRIES_MAX {
                return Err(AtapError::INVALID_INPUT_TOO_MANY_CERTS);
            }
            if entries.remaining() < LENGTH_FIELD_LEN {
                return Err(AtapError::INVALID_INPUT_CHAIN_SIZE_MISMATCH);
            }
            let cert_len = entries.read_len()?;
            if cert_len > CERT_LEN_MAX {
                return Err(AtapError::INVALID_INPUT_CERT_TOO_LARGE);
            }
            let cert = entries
                .take(cert_len)
                .map_err(|_| AtapError::INVALID_INPUT_CHAIN_SIZE_MISMATCH)?;
            visit(cert)?;
            count += 1;
        }
        Ok(())
    }

    /// Succeeds only if every byte was consumed.
    pub fn finish(self) -> AtapResult<()> {
        if !self.buf.is_empty() {
            return Err(AtapError::INVALID_INPUT_TRAILING_DATA);
        }
        Ok(())
    }
}
