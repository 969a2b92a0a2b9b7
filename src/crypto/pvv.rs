//! Visa PIN verification value.

use des::cipher::generic_array::GenericArray;
use des::cipher::{BlockEncrypt, KeyInit};
use des::TdesEde2;

use crate::crypto::CryptoError;

fn all_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

/// Transformed security parameter: the 11 PAN digits before the check
/// digit, the key index and the PIN.
fn tsp(pan: &str, pvki: &str, pin: &str) -> Result<String, CryptoError> {
    if pan.len() < 12 || !all_digits(pan) {
        return Err(CryptoError::InvalidInput("pan must be at least 12 digits".into()));
    }
    if pvki.len() != 1 || !all_digits(pvki) {
        return Err(CryptoError::InvalidInput("pvki must be one digit".into()));
    }
    if pin.len() != 4 || !all_digits(pin) {
        return Err(CryptoError::InvalidInput("pin must be four digits".into()));
    }
    let end = pan.len() - 1;
    Ok(format!("{}{}{}", &pan[end - 11..end], pvki, pin))
}

/// First four decimal digits of the hex block; letters (minus ten) fill up
/// when there are fewer than four.
fn decimalize(block: &str) -> String {
    let mut out: String = block.chars().filter(char::is_ascii_digit).take(4).collect();
    for c in block.chars().filter(|c| !c.is_ascii_digit()) {
        if out.len() == 4 {
            break;
        }
        if let Some(v) = c.to_digit(16) {
            out.push_str(&(v - 10).to_string());
        }
    }
    out
}

/// PVV for `pin` under the two-key 3DES `pvk_hex`.
pub fn generate_pvv(pan: &str, pvk_hex: &str, pvki: &str, pin: &str) -> Result<String, CryptoError> {
    let key = hex::decode(pvk_hex).map_err(|_| CryptoError::InvalidHex("pvk"))?;
    let cipher = TdesEde2::new_from_slice(&key).map_err(|_| CryptoError::InvalidKey {
        expected: "16",
        actual: key.len(),
    })?;

    let tsp = hex::decode(tsp(pan, pvki, pin)?).map_err(|_| CryptoError::InvalidHex("tsp"))?;
    let mut block = GenericArray::clone_from_slice(&tsp);
    cipher.encrypt_block(&mut block);
    Ok(decimalize(&hex::encode_upper(block)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_pvv() {
        let pvv = generate_pvv("6037998700001497", "6E54A2F167F8CDFB292C2CBF5B0B8C34", "1", "3503").unwrap();
        assert_eq!(pvv, "9582");
    }

    #[test]
    fn test_tsp_layout() {
        assert_eq!(tsp("6037998700001497", "1", "3503").unwrap(), "9987000014913503");
    }

    #[test]
    fn test_decimalize_falls_back_to_letters() {
        assert_eq!(decimalize("95A82E5CC94BE5E5"), "9582");
        assert_eq!(decimalize("ABCDEF1FFFFFFFFF"), "1012");
    }

    #[test]
    fn test_rejects_bad_input() {
        let key = "6E54A2F167F8CDFB292C2CBF5B0B8C34";
        assert!(matches!(generate_pvv("6037", key, "1", "3503"), Err(CryptoError::InvalidInput(_))));
        assert!(matches!(generate_pvv("6037998700001497", key, "1", "35a3"), Err(CryptoError::InvalidInput(_))));
        assert!(matches!(generate_pvv("6037998700001497", "zz", "1", "3503"), Err(CryptoError::InvalidHex(_))));
        assert!(matches!(
            generate_pvv("6037998700001497", "6E54A2F167F8CDFB", "1", "3503"),
            Err(CryptoError::InvalidKey { .. })
        ));
    }
}
