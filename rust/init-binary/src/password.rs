//! Generation of one-shot administrative passwords.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand_chacha::{
    rand_core::{RngCore, SeedableRng},
    ChaCha20Rng,
};

/// 24 bytes of OS entropy, base64-encoded to a 32 character password.
pub fn generate() -> String {
    let mut rng = ChaCha20Rng::from_os_rng();
    let mut bytes = [0u8; 24];
    rng.fill_bytes(&mut bytes);

    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_passwords_are_32_characters() {
        assert_eq!(generate().len(), 32);
    }

    #[test]
    fn test_generated_passwords_differ() {
        assert_ne!(generate(), generate());
    }

    #[test]
    fn test_generated_passwords_stay_printable() {
        let password = generate();
        assert!(password
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '='));
    }
}
