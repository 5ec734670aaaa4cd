/// Wishlist Crypto Library
///
/// Verifies the identity payload ("init data") the host chat client hands to
/// the mini-app, and signs payloads the same way for local tooling and tests.
/// No I/O happens here.
pub mod init_data;

pub use init_data::{InitDataError, VerifiedInitData, sign_init_data, validate_init_data};
