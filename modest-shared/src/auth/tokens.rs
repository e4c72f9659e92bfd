/// Random identifiers and single-use token hashing
///
/// Every secret value handed to a browser (session ids, confirmation and
/// recovery links, magic login codes, OAuth state, form tokens, API keys) is
/// a random base62 string. One-time tokens are persisted only as keyed
/// HMAC-SHA256 hashes, so a leaked table cannot be replayed without the
/// server's session secret.
///
/// # Example
///
/// ```
/// use modest_shared::auth::tokens::{generate_token, hash_token, verify_token};
///
/// let secret = "a-long-session-secret-from-config";
/// let raw = generate_token();
/// let stored = hash_token(secret, &raw);
///
/// assert!(verify_token(secret, &raw, &stored));
/// assert!(!verify_token(secret, "guess", &stored));
/// ```

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Length of one-time tokens and session ids
pub const TOKEN_LENGTH: usize = 43;

/// Length of task ids and other non-secret identifiers
pub const ID_LENGTH: usize = 22;

/// Prefix of generated API keys
const API_KEY_PREFIX: &str = "mdst_";

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Generates a random base62 string of `length` characters
pub fn random_string(length: usize) -> String {
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Generates a secret token (~256 bits of entropy)
pub fn generate_token() -> String {
    random_string(TOKEN_LENGTH)
}

/// Generates a resource identifier
pub fn generate_id() -> String {
    random_string(ID_LENGTH)
}

/// Generates an API key (`mdst_` + 32 base62 characters)
pub fn generate_api_key() -> String {
    format!("{}{}", API_KEY_PREFIX, random_string(32))
}

/// Computes the hex HMAC-SHA256 of `raw` keyed by `secret`
pub fn hash_token(secret: &str, raw: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts keys of any length"),
    };
    mac.update(raw.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Checks `raw` against a stored hash in constant time
pub fn verify_token(secret: &str, raw: &str, stored_hash: &str) -> bool {
    constant_time_compare(&hash_token(secret, raw), stored_hash)
}

/// Compares two strings without short-circuiting on the first difference
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Whether `value` looks like a token this module generated
///
/// Used to reject obviously malformed input before touching storage.
pub fn is_well_formed(value: &str) -> bool {
    !value.is_empty() && value.len() <= 128 && value.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token() {
        let t1 = generate_token();
        let t2 = generate_token();

        assert_eq!(t1.len(), TOKEN_LENGTH);
        assert_ne!(t1, t2);
        assert!(is_well_formed(&t1));
    }

    #[test]
    fn test_generate_id() {
        let id = generate_id();
        assert_eq!(id.len(), ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generate_api_key() {
        let key = generate_api_key();
        assert!(key.starts_with("mdst_"));
        assert_eq!(key.len(), 37);
        assert_ne!(key, generate_api_key());
    }

    #[test]
    fn test_hash_token() {
        let hash = hash_token("secret", "token");

        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_token("secret", "token"));
        assert_ne!(hash, hash_token("other-secret", "token"));
        assert_ne!(hash, hash_token("secret", "other-token"));
    }

    #[test]
    fn test_verify_token() {
        let raw = generate_token();
        let stored = hash_token("k", &raw);

        assert!(verify_token("k", &raw, &stored));
        assert!(!verify_token("k", "", &stored));
        assert!(!verify_token("other", &raw, &stored));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(constant_time_compare("", ""));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hello2"));
        assert!(!constant_time_compare("", "not empty"));
    }

    #[test]
    fn test_is_well_formed() {
        assert!(is_well_formed("abcXYZ019"));
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("has space"));
        assert!(!is_well_formed("../etc/passwd"));
        assert!(!is_well_formed(&"a".repeat(129)));
    }
}
