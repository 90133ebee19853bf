//! Short code generation.
//!
//! Codes are the low base62 digits of a random 128-bit seed. The same seed
//! and length always give the same code.

use rand::Rng;

const ALPHABET: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Encode `seed` as `length` base62 characters, least significant digit last.
pub fn generate_code(seed: u128, length: usize) -> String {
    let mut digits = vec![ALPHABET[0]; length];
    let mut rest = seed;
    for slot in digits.iter_mut().rev() {
        *slot = ALPHABET[(rest % 62) as usize];
        rest /= 62;
    }
    // ALPHABET is ASCII.
    digits.into_iter().map(char::from).collect()
}

/// Fresh random seed.
pub fn random_seed() -> u128 {
    rand::thread_rng().gen()
}

/// Longest code accepted on lookup. Codes from an older `code_length`
/// setting stay resolvable.
pub const MAX_CODE_LENGTH: usize = 32;

/// Whether `code` is drawn from the code alphabet.
pub fn is_valid_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= MAX_CODE_LENGTH
        && code.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        assert_eq!(generate_code(42, 6), generate_code(42, 6));
        assert_ne!(generate_code(42, 6), generate_code(43, 6));
    }

    #[test]
    fn test_known_values() {
        assert_eq!(generate_code(0, 6), "000000");
        assert_eq!(generate_code(61, 6), "00000Z");
        assert_eq!(generate_code(62, 6), "000010");
    }

    #[test]
    fn test_length_and_alphabet() {
        for seed in [0u128, 1, 999_999, u128::MAX] {
            for length in [4usize, 6, 16] {
                let code = generate_code(seed, length);
                assert_eq!(code.len(), length);
                assert!(is_valid_code(&code), "bad code {code}");
            }
        }
    }

    #[test]
    fn test_is_valid_code() {
        assert!(is_valid_code("abc123"));
        assert!(is_valid_code("abc12"));
        assert!(!is_valid_code(""));
        assert!(!is_valid_code("abc-12"));
        assert!(!is_valid_code("_health"));
        assert!(!is_valid_code(&"a".repeat(33)));
    }
}
