//! Human-facing order reference codes.

use rand::Rng;
use serde::{Deserialize, Serialize};

const CODE_LEN: usize = 10;
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Opaque, non-sequential order reference quoted in support tooling.
///
/// Ten characters over a 36-symbol alphabet; uniqueness is enforced by the
/// store, which rejects a colliding code so the caller can draw again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderCode(String);

impl OrderCode {
    /// Draws a fresh random code.
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..CODE_LEN)
            .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
            .collect();
        Self(code)
    }

    /// Wraps a code read back from storage or typed by an operator.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generated_code_shape() {
        let code = OrderCode::generate();
        assert_eq!(code.as_str().len(), CODE_LEN);
        assert!(code.as_str().bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn test_codes_do_not_repeat() {
        let codes: HashSet<_> = (0..1000).map(|_| OrderCode::generate()).collect();
        assert_eq!(codes.len(), 1000);
    }

    #[test]
    fn test_operator_input_is_normalised() {
        assert_eq!(OrderCode::new("ab12cd34ef").as_str(), "AB12CD34EF");
    }
}
