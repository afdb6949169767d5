/*++

Licensed under the Apache-2.0 license.

File Name:

   config.rs

Abstract:

    File contains utilities for loading software device profiles

--*/

use crate::crypto::AuthKey;
use crate::device::SoftwareDevice;
use anyhow::{anyhow, Context};
use atap_api::{KeyType, AES_128_KEY_LEN, PRODUCT_ID_LEN};
use serde_derive::{Deserialize, Serialize};
use std::path::Path;

/// Authentication Key Configuration
#[derive(Default, Serialize, Deserialize)]
pub struct AuthKeyConfig {
    /// Hex encoded P-256 private scalar.
    pub private_key: String,

    #[serde(default)]
    pub cert_chain: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Device Profile
#[derive(Serialize, Deserialize)]
pub struct DeviceProfile {
    pub product_id: String,

    pub soc_global_key: Option<String>,

    pub auth_key: Option<AuthKeyConfig>,

    pub rsa_public_key: Option<String>,

    pub ecdsa_public_key: Option<String>,

    pub eddsa_public_key: Option<String>,

    #[serde(default = "default_true")]
    pub eddsa_supported: bool,
}

/// Load Device Profile from file
pub fn load_device_profile(path: &Path) -> anyhow::Result<DeviceProfile> {
    let profile_str = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read the profile {}", path.display()))?;

    let profile: DeviceProfile = toml::from_str(&profile_str)
        .with_context(|| format!("Failed to parse profile {}", path.display()))?;

    Ok(profile)
}

fn decode_array<const N: usize>(name: &str, value: &str) -> anyhow::Result<[u8; N]> {
    let bytes = hex::decode(value).with_context(|| format!("Invalid hex in {name}"))?;
    <[u8; N]>::try_from(bytes.as_slice())
        .map_err(|_| anyhow!("{name} must be {N} bytes, found {}", bytes.len()))
}

impl SoftwareDevice {
    /// Builds a device from a parsed profile.
    pub fn from_profile(profile: &DeviceProfile) -> anyhow::Result<Self> {
        let product_id = decode_array::<PRODUCT_ID_LEN>("product_id", &profile.product_id)?;
        let mut device = SoftwareDevice::new(product_id);

        if let Some(key) = &profile.soc_global_key {
            device.set_soc_global_key(decode_array::<AES_128_KEY_LEN>("soc_global_key", key)?);
        }

        if let Some(auth) = &profile.auth_key {
            let private_key = zeroize::Zeroizing::new(
                hex::decode(&auth.private_key).context("Invalid hex in auth_key.private_key")?,
            );
            let cert_chain = auth
                .cert_chain
                .iter()
                .map(hex::decode)
                .collect::<Result<Vec<_>, _>>()
                .context("Invalid hex in auth_key.cert_chain")?;
            let auth_key = AuthKey::from_private_key(&private_key, cert_chain)
                .context("Invalid auth_key.private_key")?;
            device.set_auth_key(auth_key);
        }

        let public_keys = [
            (KeyType::Rsa, "rsa_public_key", &profile.rsa_public_key),
            (KeyType::Ecdsa, "ecdsa_public_key", &profile.ecdsa_public_key),
            (KeyType::Eddsa, "eddsa_public_key", &profile.eddsa_public_key),
        ];
        for (key_type, name, value) in public_keys {
            if let Some(value) = value {
                let key = hex::decode(value).with_context(|| format!("Invalid hex in {name}"))?;
                device.set_public_key(key_type, key);
            }
        }

        device.set_eddsa_supported(profile.eddsa_supported);
        Ok(device)
    }
}
