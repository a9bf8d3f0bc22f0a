use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 20;

/// Raw account addresses are base58 encodings of 32 bytes
pub const ADDRESS_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("not valid base58: {0}")]
    InvalidEncoding(String),

    #[error("expected {ADDRESS_BYTES} bytes, got {0}")]
    InvalidLength(usize),
}

/// Decode a base58 account address into its raw bytes
pub fn decode_address(s: &str) -> Result<[u8; ADDRESS_BYTES], AddressError> {
    let bytes = bs58::decode(s)
        .into_vec()
        .map_err(|e| AddressError::InvalidEncoding(e.to_string()))?;

    bytes
        .as_slice()
        .try_into()
        .map_err(|_| AddressError::InvalidLength(bytes.len()))
}

pub fn encode_address(bytes: &[u8; ADDRESS_BYTES]) -> String {
    bs58::encode(bytes).into_string()
}

pub fn is_valid_address(s: &str) -> bool {
    decode_address(s).is_ok()
}

/// Username shape: 3-20 chars of `[a-z0-9_]`.
///
/// A string of 32+ chars that decodes as an address is never a username,
/// whatever its charset.
pub fn is_username(s: &str) -> bool {
    if s.len() < USERNAME_MIN_LEN || s.len() > USERNAME_MAX_LEN {
        return false;
    }
    if s.len() >= 32 && is_valid_address(s) {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// A payment recipient as supplied by a caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum RecipientRef {
    Username(String),
    Address(String),
}

impl RecipientRef {
    /// Username-shaped input is a username; anything else is taken as an
    /// address and validated when it is used.
    pub fn classify(to: &str) -> Self {
        if is_username(to) {
            RecipientRef::Username(to.to_string())
        } else {
            RecipientRef::Address(to.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RecipientRef::Username(s) | RecipientRef::Address(s) => s,
        }
    }

    pub fn is_username(&self) -> bool {
        matches!(self, RecipientRef::Username(_))
    }
}

impl fmt::Display for RecipientRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A username bound to its owner address, as last seen in the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub username: String,
    pub owner: String,
}
