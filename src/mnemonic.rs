//! Mnemonic encoding and the selection metric

use crate::error::EncodeError;
use bip39::{Language, Mnemonic};

/// Turns an entropy block into a phrase
pub trait MnemonicEncoder: Send + Sync {
    /// Encode one block. Pure and deterministic.
    fn encode(&self, block: &[u8]) -> Result<String, EncodeError>;
}

/// BIP39 encoder for a fixed word list
#[derive(Debug, Clone, Copy)]
pub struct Bip39Encoder {
    language: Language,
}

impl Bip39Encoder {
    pub fn english() -> Self {
        Self {
            language: Language::English,
        }
    }
}

impl Default for Bip39Encoder {
    fn default() -> Self {
        Self::english()
    }
}

impl MnemonicEncoder for Bip39Encoder {
    fn encode(&self, block: &[u8]) -> Result<String, EncodeError> {
        // BIP39 accepts 128..=256 bits in 32-bit steps
        if block.len() < 16 || block.len() > 32 || block.len() % 4 != 0 {
            return Err(EncodeError::InvalidLength { len: block.len() });
        }

        Mnemonic::from_entropy_in(self.language, block)
            .map(|m| m.to_string())
            .map_err(|e| EncodeError::Rejected(e.to_string()))
    }
}

/// Total letters in a phrase, spaces excluded
pub fn letter_count(phrase: &str) -> usize {
    phrase.chars().filter(|c| !c.is_whitespace()).count()
}
