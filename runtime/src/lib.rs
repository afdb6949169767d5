/*++

Licensed under the Apache-2.0 license.

File Name:

    lib.rs

Abstract:

    File contains exports for the attestation provisioning engine: the CA
    request builder and the CA response processor.

--*/
#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod request;
mod response;
mod session;

pub use atap_api as api;
pub use atap_error::{AtapError, AtapResult, ErrorKind};
pub use request::{build_ca_request, get_ca_request};
pub use response::set_ca_response;
pub use session::Session;
