/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the software platform used to exercise the
    provisioning engine: an in-memory device and a matching CA.

--*/

mod ca;
mod config;
mod crypto;
mod device;

pub use ca::SoftwareCa;
pub use config::{load_device_profile, AuthKeyConfig, DeviceProfile};
pub use crypto::{curve_of, verify_signature, AuthKey, EcdhSecret};
pub use device::{SoftwareDevice, StoredKey, TestHook};
