//! AES-CBC encryption of parameter groups.
//!
//! A group is any serializable value; it travels as the hex of the
//! PKCS7-padded ciphertext of its JSON. 16-byte keys select AES-128,
//! 32-byte keys AES-256.

use aes::{Aes128, Aes256};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::crypto::CryptoError;

fn key_and_iv(key_hex: &str, iv_hex: &str) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    let key = hex::decode(key_hex).map_err(|_| CryptoError::InvalidHex("key"))?;
    let iv = hex::decode(iv_hex).map_err(|_| CryptoError::InvalidHex("iv"))?;
    if iv.len() != 16 {
        return Err(CryptoError::InvalidKey {
            expected: "16 (iv)",
            actual: iv.len(),
        });
    }
    Ok((key, iv))
}

fn invalid_key(actual: usize) -> CryptoError {
    CryptoError::InvalidKey {
        expected: "16 or 32",
        actual,
    }
}

/// Encrypt `params` as hex.
pub fn encrypt_params<T: Serialize>(params: &T, key_hex: &str, iv_hex: &str) -> Result<String, CryptoError> {
    let (key, iv) = key_and_iv(key_hex, iv_hex)?;
    let plain = serde_json::to_vec(params).map_err(|e| CryptoError::Encoding(e.to_string()))?;
    let cipher = match key.len() {
        16 => cbc::Encryptor::<Aes128>::new_from_slices(&key, &iv)
            .map_err(|_| invalid_key(key.len()))?
            .encrypt_padded_vec_mut::<Pkcs7>(&plain),
        32 => cbc::Encryptor::<Aes256>::new_from_slices(&key, &iv)
            .map_err(|_| invalid_key(key.len()))?
            .encrypt_padded_vec_mut::<Pkcs7>(&plain),
        n => return Err(invalid_key(n)),
    };
    Ok(hex::encode(cipher))
}

/// Decrypt hex produced by [`encrypt_params`] with the same key and iv.
pub fn decrypt_params<T: DeserializeOwned>(cipher_hex: &str, key_hex: &str, iv_hex: &str) -> Result<T, CryptoError> {
    let (key, iv) = key_and_iv(key_hex, iv_hex)?;
    let cipher = hex::decode(cipher_hex).map_err(|_| CryptoError::InvalidHex("ciphertext"))?;
    let plain = match key.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(&key, &iv)
            .map_err(|_| invalid_key(key.len()))?
            .decrypt_padded_vec_mut::<Pkcs7>(&cipher)
            .map_err(|_| CryptoError::Decrypt)?,
        32 => cbc::Decryptor::<Aes256>::new_from_slices(&key, &iv)
            .map_err(|_| invalid_key(key.len()))?
            .decrypt_padded_vec_mut::<Pkcs7>(&cipher)
            .map_err(|_| CryptoError::Decrypt)?,
        n => return Err(invalid_key(n)),
    };
    serde_json::from_slice(&plain).map_err(|e| CryptoError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::{json, Value};

    const KEY_128: &str = "000102030405060708090a0b0c0d0e0f";
    const KEY_256: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
    const IV: &str = "0f0e0d0c0b0a09080706050403020100";

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct CardParams {
        pan: String,
        cvv2: String,
        expiry: String,
    }

    #[test]
    fn test_group_survives_both_key_sizes() {
        let params = CardParams {
            pan: "6037998700001497".into(),
            cvv2: "123".into(),
            expiry: "2912".into(),
        };
        for key in [KEY_128, KEY_256] {
            let hex = encrypt_params(&params, key, IV).unwrap();
            assert_eq!(hex.len() % 32, 0);
            let back: CardParams = decrypt_params(&hex, key, IV).unwrap();
            assert_eq!(back, params);
        }
    }

    #[test]
    fn test_wrong_key_does_not_decrypt() {
        let hex = encrypt_params(&json!({"pin": "3503"}), KEY_128, IV).unwrap();
        let other = "ffffffffffffffffffffffffffffffff";
        assert!(decrypt_params::<Value>(&hex, other, IV).is_err());
    }

    #[test]
    fn test_key_sizes() {
        let err = encrypt_params(&json!({}), "0001020304050607", IV).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey { actual: 8, .. }));
        let err = encrypt_params(&json!({}), KEY_128, "00").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey { actual: 1, .. }));
    }
}
