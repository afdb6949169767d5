// Licensed under the Apache-2.0 license

use atap_runtime::api::{
    AtapOps, Blob, CaRequest, CertChain, CurveType, InnerCaRequest, InnerCaResponse, KeyType,
    Operation, AES_128_KEY_LEN, CERT_CHAIN_LEN_MAX, HEX_UUID_LEN, LENGTH_FIELD_LEN,
    PRODUCT_ID_LEN,
};
use atap_runtime::{
    build_ca_request, get_ca_request, set_ca_response, AtapError, ErrorKind, Session,
};
use atap_sw_ops::{AuthKey, SoftwareCa, SoftwareDevice, TestHook};

const PRODUCT_ID: [u8; PRODUCT_ID_LEN] = *b"ATAP-DEVICE-0042";
const UUID: [u8; HEX_UUID_LEN] = *b"7e57c0de7e57c0de7e57c0de7e57c0de";
const SOC_GLOBAL_KEY: [u8; AES_128_KEY_LEN] = [0x3c; AES_128_KEY_LEN];

fn provisioned_device() -> SoftwareDevice {
    let mut device = SoftwareDevice::new(PRODUCT_ID);
    device.set_public_key(KeyType::Rsa, vec![0x30; 270]);
    device.set_public_key(KeyType::Ecdsa, vec![0x04; 65]);
    device.set_public_key(KeyType::Eddsa, vec![0xed; 32]);
    device
}

fn chain(fill: u8, len: usize) -> CertChain {
    CertChain::from_certs([vec![fill; len]]).unwrap()
}

fn issue_response(uuid: [u8; HEX_UUID_LEN]) -> InnerCaResponse {
    let mut response = InnerCaResponse::new(uuid);
    let rsa = response.issued_key_mut(KeyType::Rsa).unwrap();
    rsa.cert_chain = chain(0xa1, 200);
    rsa.key = Blob::new(vec![0x4b; 256]).unwrap();
    response
}

/// Runs the request half of a provisioning operation against `ca`.
fn request(
    device: &mut SoftwareDevice,
    ca: &mut SoftwareCa,
    curve: CurveType,
    operation: Operation,
) -> (InnerCaRequest, Session) {
    let start = ca.operation_start(curve, operation).unwrap();
    let (request, session) = get_ca_request(device, &start).unwrap();
    let inner = ca.open_request(&request).unwrap();
    (inner, session)
}

#[test]
fn test_certify_request_carries_product_hash() {
    let mut device = provisioned_device();
    let mut ca = SoftwareCa::new();
    let start = ca
        .operation_start(CurveType::P256, Operation::Certify)
        .unwrap();

    let (request, session) = get_ca_request(&mut device, &start).unwrap();
    assert!(session.is_awaiting_response());
    assert_eq!(session.operation(), Some(Operation::Certify));

    let parsed = CaRequest::decode(&request).unwrap();
    assert_ne!(parsed.device_pubkey, ca.public_key(CurveType::P256));

    let session_key = ca
        .session_key(CurveType::P256, &parsed.device_pubkey)
        .unwrap();
    let plaintext = device
        .aes_gcm_128_decrypt(
            &parsed.encrypted_inner_ca_request,
            &parsed.iv,
            &session_key,
            &parsed.tag,
        )
        .unwrap();
    let inner = InnerCaRequest::decode(&plaintext).unwrap();
    assert_eq!(inner.product_id_hash, device.sha256(&PRODUCT_ID).unwrap());
    assert_eq!(inner.rsa_pubkey.len(), 270);
    assert_eq!(inner.ecdsa_pubkey.len(), 65);
    assert_eq!(inner.eddsa_pubkey.len(), 32);
    assert!(inner.auth_key_cert_chain.is_empty());
    assert!(inner.signature.is_empty());
}

#[test]
fn test_unknown_curve_is_rejected() {
    let mut device = provisioned_device();
    let ca = SoftwareCa::new();
    let mut start = ca
        .operation_start(CurveType::P256, Operation::Certify)
        .unwrap();
    start[8] = 0x09;

    let mut session = Session::new();
    let err = build_ca_request(&mut device, &mut session, &start).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedAlgorithm);
    assert!(session.is_cleared());
    assert!(get_ca_request(&mut device, &start).is_err());
}

#[test]
fn test_issue_installs_rsa_and_uuid() {
    let mut device = provisioned_device();
    let mut ca = SoftwareCa::new();
    let (_, mut session) = request(&mut device, &mut ca, CurveType::P256, Operation::Issue);
    let sealed = ca.seal_response(&issue_response(UUID), None).unwrap();

    set_ca_response(&mut device, &mut session, &sealed).unwrap();
    assert_eq!(device.hex_uuid(), Some(&UUID));
    // UUID plus the RSA pair.
    assert_eq!(device.write_count(), 2);
    let rsa = device.attestation_key(KeyType::Rsa).unwrap();
    assert_eq!(rsa.cert_chain.certs()[0].as_bytes(), &[0xa1; 200][..]);
    assert_eq!(rsa.key.as_ref().map(Blob::len), Some(256));
    for key_type in [KeyType::Ecdsa, KeyType::Eddsa, KeyType::Epid, KeyType::Special] {
        assert!(device.attestation_key(key_type).is_none());
    }
    assert!(session.is_cleared());
}

#[test]
fn test_truncated_response_is_rejected() {
    let mut device = provisioned_device();
    let mut ca = SoftwareCa::new();
    let (_, mut session) = request(&mut device, &mut ca, CurveType::P256, Operation::Issue);
    let sealed = ca.seal_response(&issue_response(UUID), None).unwrap();

    let err = set_ca_response(&mut device, &mut session, &sealed[..sealed.len() - 1]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(device.write_count(), 0);
    assert!(device.hex_uuid().is_none());
    assert!(session.is_cleared());
}

#[test]
fn test_issue_encrypted_unwraps_soc_layer() {
    let mut device = provisioned_device();
    device.set_soc_global_key(SOC_GLOBAL_KEY);
    let mut ca = SoftwareCa::new();
    let (_, mut session) = request(
        &mut device,
        &mut ca,
        CurveType::X25519,
        Operation::IssueEncrypted,
    );
    let mut response = issue_response(UUID);
    let special = response.issued_key_mut(KeyType::Special).unwrap();
    special.cert_chain = chain(0x5e, 64);

    let sealed = ca
        .seal_response(&response, Some(&SOC_GLOBAL_KEY))
        .unwrap();
    set_ca_response(&mut device, &mut session, &sealed).unwrap();

    let special = device.attestation_key(KeyType::Special).unwrap();
    assert!(special.key.is_none());
    assert_eq!(special.cert_chain, chain(0x5e, 64));
    assert!(device.attestation_key(KeyType::Rsa).is_some());
}

#[test]
fn test_issue_encrypted_with_wrong_soc_key() {
    let mut device = provisioned_device();
    device.set_soc_global_key(SOC_GLOBAL_KEY);
    let mut ca = SoftwareCa::new();
    let (_, mut session) = request(
        &mut device,
        &mut ca,
        CurveType::P256,
        Operation::IssueEncrypted,
    );
    let sealed = ca
        .seal_response(&issue_response(UUID), Some(&[0x77; AES_128_KEY_LEN]))
        .unwrap();
    assert_eq!(
        set_ca_response(&mut device, &mut session, &sealed),
        Err(AtapError::CRYPTO_TAG_MISMATCH)
    );
    assert_eq!(device.write_count(), 0);
}

#[test]
fn test_certify_installs_chains_only() {
    let mut device = provisioned_device();
    let mut ca = SoftwareCa::new();
    let (_, mut session) = request(&mut device, &mut ca, CurveType::P256, Operation::Certify);
    let mut response = InnerCaResponse::new(UUID);
    response.issued_key_mut(KeyType::Rsa).unwrap().cert_chain = chain(0x11, 300);
    response.issued_key_mut(KeyType::Ecdsa).unwrap().cert_chain = chain(0x22, 180);

    let sealed = ca.seal_response(&response, None).unwrap();
    set_ca_response(&mut device, &mut session, &sealed).unwrap();
    for key_type in [KeyType::Rsa, KeyType::Ecdsa] {
        let stored = device.attestation_key(key_type).unwrap();
        assert!(stored.key.is_none());
        assert_eq!(stored.cert_chain.len(), 1);
    }
}

#[test]
fn test_certify_rejects_private_key() {
    let mut device = provisioned_device();
    let mut ca = SoftwareCa::new();
    let (_, mut session) = request(&mut device, &mut ca, CurveType::P256, Operation::Certify);
    let sealed = ca.seal_response(&issue_response(UUID), None).unwrap();
    assert_eq!(
        set_ca_response(&mut device, &mut session, &sealed),
        Err(AtapError::INVALID_INPUT_CERTIFY_PRIVATE_KEY)
    );
    assert_eq!(device.write_count(), 0);
}

#[test]
fn test_auth_key_signature_verifies() {
    let mut device = provisioned_device();
    device.set_auth_key(AuthKey::generate(vec![vec![0xce; 300], vec![0xcf; 280]]));
    let mut ca = SoftwareCa::new();
    let (inner, _session) = request(&mut device, &mut ca, CurveType::X25519, Operation::Issue);

    assert_eq!(inner.auth_key_cert_chain.len(), 2);
    let public_key = device.auth_public_key().unwrap();
    ca.verify_auth_signature(&inner, &public_key).unwrap();

    let other = AuthKey::generate(vec![]);
    assert_eq!(
        ca.verify_auth_signature(&inner, &other.public_key()),
        Err(AtapError::CRYPTO_SIGN_FAILURE)
    );
}

#[test]
fn test_reprovisioning_overwrites() {
    let mut device = provisioned_device();
    let mut ca = SoftwareCa::new();
    for (round, curve) in [CurveType::P256, CurveType::X25519].into_iter().enumerate() {
        let (_, mut session) = request(&mut device, &mut ca, curve, Operation::Issue);
        let mut uuid = UUID;
        uuid[0] = b'0' + round as u8;
        let sealed = ca.seal_response(&issue_response(uuid), None).unwrap();
        set_ca_response(&mut device, &mut session, &sealed).unwrap();
        assert_eq!(device.hex_uuid(), Some(&uuid));
    }
    assert_eq!(device.write_count(), 4);
}

#[test]
fn test_response_for_other_session_fails() {
    let mut device = provisioned_device();
    let mut ca = SoftwareCa::new();
    let (_, mut stale) = request(&mut device, &mut ca, CurveType::P256, Operation::Issue);
    let (_, mut current) = request(&mut device, &mut ca, CurveType::P256, Operation::Issue);
    let sealed = ca.seal_response(&issue_response(UUID), None).unwrap();

    assert_eq!(
        set_ca_response(&mut device, &mut stale, &sealed),
        Err(AtapError::CRYPTO_TAG_MISMATCH)
    );
    set_ca_response(&mut device, &mut current, &sealed).unwrap();
}

#[test]
fn test_certify_with_full_auth_chain() {
    let mut device = provisioned_device();
    let certs = (0..4)
        .map(|i| vec![0xc0 | i; CERT_CHAIN_LEN_MAX / 4 - LENGTH_FIELD_LEN])
        .collect();
    device.set_auth_key(AuthKey::generate(certs));
    let mut ca = SoftwareCa::new();
    let (inner, session) = request(&mut device, &mut ca, CurveType::P256, Operation::Certify);

    assert!(session.is_awaiting_response());
    assert_eq!(inner.auth_key_cert_chain.payload_len(), CERT_CHAIN_LEN_MAX);
    assert_eq!(inner.rsa_pubkey.len(), 270);
    ca.verify_auth_signature(&inner, &device.auth_public_key().unwrap())
        .unwrap();
}

#[test]
fn test_platform_failure_clears_session() {
    let mut device = provisioned_device();
    device.set_auth_key(AuthKey::generate(vec![vec![0xce; 300]]));
    let ca = SoftwareCa::new();
    let start = ca.operation_start(CurveType::P256, Operation::Certify).unwrap();
    for hook in [
        TestHook::FailAuthKeyType,
        TestHook::FailEcdh,
        TestHook::FailHkdf,
        TestHook::FailAuthCertChain,
        TestHook::FailSign,
        TestHook::FailProductId,
        TestHook::FailSha256,
        TestHook::FailRandom,
        TestHook::FailEncrypt,
    ] {
        device.set_test_hook(hook);
        let mut session = Session::new();
        assert_eq!(
            build_ca_request(&mut device, &mut session, &start),
            Err(hook.error())
        );
        assert!(session.is_cleared());
        assert!(session.is_spent());
    }
}

#[test]
fn test_response_platform_failure_writes_nothing() {
    for hook in [
        TestHook::FailDecrypt,
        TestHook::FailSocGlobalKey,
        TestHook::FailWriteUuid,
    ] {
        let mut device = provisioned_device();
        device.set_soc_global_key(SOC_GLOBAL_KEY);
        let mut ca = SoftwareCa::new();
        let (_, mut session) = request(
            &mut device,
            &mut ca,
            CurveType::P256,
            Operation::IssueEncrypted,
        );
        let sealed = ca
            .seal_response(&issue_response(UUID), Some(&SOC_GLOBAL_KEY))
            .unwrap();

        device.set_test_hook(hook);
        assert_eq!(
            set_ca_response(&mut device, &mut session, &sealed),
            Err(hook.error())
        );
        assert!(session.is_cleared());
        assert!(session.is_spent());
        assert_eq!(device.write_count(), 0);
        assert!(device.hex_uuid().is_none());
        assert!(device.attestation_key(KeyType::Rsa).is_none());
    }
}
