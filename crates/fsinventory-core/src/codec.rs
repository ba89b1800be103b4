//! Text-safe encoding of raw path bytes.
//!
//! Filesystems hand back names as arbitrary byte strings. Before a name can go
//! into a CSV cell it must become valid UTF-8, and a run must use one policy
//! for every record so consumers can interpret the column.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How raw path bytes are turned into text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathPolicy {
    /// Invalid UTF-8 sequences become U+FFFD. Readable, not reversible.
    #[default]
    Lossy,
    /// Every byte outside printable ASCII, and `%` itself, becomes `%XX`.
    /// `/` is never escaped. Always reversible.
    Percent,
}

/// Errors from decoding an encoded path.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Lossy output cannot be turned back into the original bytes.
    #[error("paths encoded with the lossy policy cannot be decoded")]
    Irreversible,

    /// A `%` was not followed by two hex digits.
    #[error("invalid percent escape at byte {offset}")]
    InvalidEscape { offset: usize },
}

/// Encoder/decoder bound to a single policy for a whole run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathCodec {
    policy: PathPolicy,
}

impl PathCodec {
    /// Create a codec for the given policy.
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }

    /// The policy this codec applies.
    pub fn policy(&self) -> PathPolicy {
        self.policy
    }

    /// Encode raw bytes into display text.
    pub fn encode<'a>(&self, raw: &'a [u8]) -> Cow<'a, str> {
        match self.policy {
            PathPolicy::Lossy => String::from_utf8_lossy(raw),
            PathPolicy::Percent => percent_encode(raw),
        }
    }

    /// Encode a path using its platform byte representation.
    pub fn encode_path(&self, path: &Path) -> String {
        self.encode(path.as_os_str().as_encoded_bytes()).into_owned()
    }

    /// Recover the original bytes from encoded text.
    pub fn decode(&self, encoded: &str) -> Result<Vec<u8>, CodecError> {
        match self.policy {
            PathPolicy::Lossy => Err(CodecError::Irreversible),
            PathPolicy::Percent => percent_decode(encoded),
        }
    }
}

fn needs_escape(byte: u8) -> bool {
    byte == b'%' || !(0x20..=0x7e).contains(&byte)
}

fn percent_encode(raw: &[u8]) -> Cow<'_, str> {
    if !raw.iter().copied().any(needs_escape) {
        // Printable ASCII only, so this cannot fail.
        if let Ok(text) = std::str::from_utf8(raw) {
            return Cow::Borrowed(text);
        }
    }

    let mut out = String::with_capacity(raw.len() + raw.len() / 2);
    for &byte in raw {
        if needs_escape(byte) {
            let _ = write!(out, "%{byte:02X}");
        } else {
            out.push(byte as char);
        }
    }
    Cow::Owned(out)
}

fn percent_decode(encoded: &str) -> Result<Vec<u8>, CodecError> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'%' {
            let hex = bytes
                .get(index + 1..index + 3)
                .and_then(|pair| std::str::from_utf8(pair).ok())
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or(CodecError::InvalidEscape { offset: index })?;
            out.push(hex);
            index += 3;
        } else {
            out.push(bytes[index]);
            index += 1;
        }
    }

    Ok(out)
}
