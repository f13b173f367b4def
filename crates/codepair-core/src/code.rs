//! Pairing codes and their generator.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Characters a code may contain.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Longest user input considered as a code at all.
pub const MAX_CODE_INPUT_LEN: usize = 32;

/// A short, human-typeable pairing code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Code(String);

impl Code {
    /// Normalize user input: surrounding whitespace is dropped and letters
    /// are upper-cased. Returns `None` when the result cannot be a code.
    pub fn parse(input: &str) -> Option<Self> {
        let normalized = input.trim().to_ascii_uppercase();
        if normalized.is_empty() || normalized.len() > MAX_CODE_INPUT_LEN {
            return None;
        }
        if !normalized.bytes().all(|b| CODE_ALPHABET.contains(&b)) {
            return None;
        }
        Some(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Draw a code of `length` characters uniformly from [`CODE_ALPHABET`].
///
/// Uses the thread-local CSPRNG: a guessed code is a session ticket, so the
/// sequence must not be predictable. Uniqueness is the caller's problem.
pub fn generate(length: usize) -> Code {
    let mut rng = rand::thread_rng();
    let code: String = (0..length)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    Code(code)
}

/// Fixed-length code source handed to the pairing manager.
#[derive(Debug, Clone, Copy)]
pub struct CodeGenerator {
    length: usize,
}

impl CodeGenerator {
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn generate(&self) -> Code {
        generate(self.length)
    }

    /// Number of distinct codes this generator can produce.
    pub fn code_space(&self) -> u128 {
        (CODE_ALPHABET.len() as u128).saturating_pow(self.length as u32)
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new(4)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn generated_codes_have_requested_length() {
        for length in [3, 4, 6, 12] {
            assert_eq!(generate(length).len(), length);
        }
    }

    #[test]
    fn generated_codes_use_only_the_alphabet() {
        let gen = CodeGenerator::default();
        for _ in 0..500 {
            let code = gen.generate();
            assert!(code.as_str().bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn every_symbol_eventually_appears() {
        let mut seen = HashSet::new();
        for _ in 0..2_000 {
            seen.extend(generate(4).as_str().bytes());
        }
        assert_eq!(seen.len(), CODE_ALPHABET.len());
    }

    #[test]
    fn default_code_space_is_36_to_the_4th() {
        assert_eq!(CodeGenerator::default().code_space(), 1_679_616);
    }

    #[test]
    fn parse_normalizes_case_and_whitespace() {
        let code = Code::parse("  ab12 \n").unwrap();
        assert_eq!(code.as_str(), "AB12");
        assert_eq!(code.to_string(), "AB12");
    }

    #[test]
    fn parse_rejects_foreign_characters() {
        assert!(Code::parse("AB-12").is_none());
        assert!(Code::parse("AB 12").is_none());
        assert!(Code::parse("ÄB12").is_none());
        assert!(Code::parse("").is_none());
        assert!(Code::parse("   ").is_none());
    }

    #[test]
    fn parse_rejects_overlong_input() {
        let long = "A".repeat(MAX_CODE_INPUT_LEN + 1);
        assert!(Code::parse(&long).is_none());
        assert!(Code::parse(&long[1..]).is_some());
    }

    #[test]
    fn zero_length_generator_is_clamped() {
        assert_eq!(CodeGenerator::new(0).length(), 1);
    }
}
