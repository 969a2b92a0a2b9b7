//! Card and parameter cryptography used behind the handlers.
//!
//! # Data Flow
//! ```text
//! pvv.rs     PAN + PVKI + PIN → TSP → 3DES (two-key) → decimalised PVV
//! params.rs  JSON parameter group → AES-CBC/PKCS7 → hex (and back)
//! ```

pub mod params;
pub mod pvv;

use thiserror::Error;

use crate::errors::{self, Error};

pub use params::{decrypt_params, encrypt_params};
pub use pvv::generate_pvv;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid hex in {0}")]
    InvalidHex(&'static str),

    #[error("key must be {expected} bytes, got {actual}")]
    InvalidKey { expected: &'static str, actual: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("decryption failed")]
    Decrypt,

    #[error("parameter encoding failed: {0}")]
    Encoding(String),
}

impl From<CryptoError> for Error {
    #[track_caller]
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidInput(_) => Error::bad_request(errors::CRYPTO_ERROR, err.to_string()),
            _ => Error::internal(errors::CRYPTO_ERROR, err.to_string()),
        }
    }
}
