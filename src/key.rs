use std::fmt;
use std::str::FromStr;

use itertools::Itertools;

pub const KEY_WORDS: usize = 4;
pub const KEY_BYTES: usize = 4 * KEY_WORDS;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum KeyParseError {
    #[error("expected 32 hex digits or 4 hex words, got {0} tokens")]
    TokenCount(usize),
    #[error("invalid hex key: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("expected 16 key bytes, got {0}")]
    Length(usize),
    #[error("invalid key word {0:?}")]
    Word(String),
}

/// A 16-byte key, viewed as four big-endian 32-bit words `k[0]..k[3]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize)]
pub struct Key {
    words: [u32; KEY_WORDS],
}

impl Key {
    pub fn new(words: [u32; KEY_WORDS]) -> Self {
        Self { words }
    }

    pub fn from_bytes(bytes: &[u8; KEY_BYTES]) -> Self {
        let mut words = [0u32; KEY_WORDS];
        for (w, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *w = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Self { words }
    }

    pub fn to_bytes(&self) -> [u8; KEY_BYTES] {
        let mut bytes = [0u8; KEY_BYTES];
        for (chunk, w) in bytes.chunks_exact_mut(4).zip(self.words) {
            chunk.copy_from_slice(&w.to_be_bytes());
        }
        bytes
    }

    pub fn words(&self) -> &[u32; KEY_WORDS] {
        &self.words
    }

    /// The keygen output line: each word as 8 lowercase hex digits followed by a space.
    pub fn to_line(&self) -> String {
        self.words.iter().map(|w| format!("{:08x} ", w)).collect()
    }

    fn parse_word(token: &str) -> Result<u32, KeyParseError> {
        let digits = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        if digits.is_empty() || digits.len() > 8 {
            return Err(KeyParseError::Word(token.to_owned()));
        }
        u32::from_str_radix(digits, 16).map_err(|_| KeyParseError::Word(token.to_owned()))
    }
}

impl FromStr for Key {
    type Err = KeyParseError;

    /// Accepts either one 32-digit hex string or four hex words.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens = s.split_whitespace().collect_vec();
        match tokens.len() {
            1 => {
                let bytes = hex::decode(tokens[0])?;
                let bytes: [u8; KEY_BYTES] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| KeyParseError::Length(bytes.len()))?;
                Ok(Key::from_bytes(&bytes))
            }
            KEY_WORDS => {
                let mut words = [0u32; KEY_WORDS];
                for (w, t) in words.iter_mut().zip(&tokens) {
                    *w = Key::parse_word(t)?;
                }
                Ok(Key { words })
            }
            n => Err(KeyParseError::TokenCount(n)),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            self.words.iter().map(|w| format!("{:08x}", w)).join(" ")
        )
    }
}
