use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

const TOKEN_BYTES: usize = 16;

/// Upper bound on collision retries when minting a unique token. The random
/// space makes a practical collision negligible; the bound keeps the loop
/// from running unchecked if the table ever degenerates.
pub const MAX_TOKEN_ATTEMPTS: usize = 10;

/// A random URL-safe token (128 bits, base64url, no padding).
pub fn urlsafe_token() -> String {
    let mut buf = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn tokens_are_urlsafe_and_fixed_length() {
        let token = urlsafe_token();
        assert_eq!(token.len(), 22); // 16 bytes, base64url, unpadded
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn tokens_are_pairwise_distinct() {
        let tokens: HashSet<String> = (0..1000).map(|_| urlsafe_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }
}
