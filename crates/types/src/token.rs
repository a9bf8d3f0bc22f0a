use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A token the client can move
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Registry key used on intents and pools, e.g. `usdc`
    pub key: String,

    /// On-ledger mint address
    pub mint: String,

    /// Display symbol
    pub symbol: String,

    pub decimals: u8,
}

impl TokenInfo {
    pub fn new(key: &str, mint: &str, symbol: &str, decimals: u8) -> Self {
        Self {
            key: key.to_string(),
            mint: mint.to_string(),
            symbol: symbol.to_string(),
            decimals,
        }
    }

    pub fn format(&self, amount: u64) -> String {
        format_amount(amount, self.decimals)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("token not supported: {0}")]
pub struct UnsupportedToken(pub String);

/// Set of tokens accepted by this client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRegistry {
    tokens: BTreeMap<String, TokenInfo>,
}

impl TokenRegistry {
    pub fn builtin() -> Self {
        let tokens = [
            TokenInfo::new(
                "usdc",
                "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
                "USDC",
                6,
            ),
            TokenInfo::new(
                "usdt",
                "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB",
                "USDT",
                6,
            ),
            // Wormhole-wrapped
            TokenInfo::new(
                "btc",
                "3NZ9JMVBmGAqocybic2c7LQCJScmgsAZ6vQqTDzcqmJh",
                "wBTC",
                8,
            ),
            TokenInfo::new(
                "ltc",
                "HZRCwxP2Vq9PCpPXooayhJ2bxTpo5xfpQrwB1svh332p",
                "wLTC",
                8,
            ),
        ];

        Self {
            tokens: tokens.into_iter().map(|t| (t.key.clone(), t)).collect(),
        }
    }

    /// Built-in tokens restricted to `allowed`; empty means all of them.
    ///
    /// A single-token deployment is `restricted(&["usdc"])`.
    pub fn restricted(allowed: &[String]) -> Result<Self, UnsupportedToken> {
        let builtin = Self::builtin();
        if allowed.is_empty() {
            return Ok(builtin);
        }

        let mut tokens = BTreeMap::new();
        for key in allowed {
            let info = builtin
                .get(key)
                .cloned()
                .ok_or_else(|| UnsupportedToken(key.clone()))?;
            tokens.insert(key.clone(), info);
        }
        Ok(Self { tokens })
    }

    pub fn get(&self, key: &str) -> Option<&TokenInfo> {
        self.tokens.get(key)
    }

    pub fn require(&self, key: &str) -> Result<&TokenInfo, UnsupportedToken> {
        self.get(key).ok_or_else(|| UnsupportedToken(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tokens.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TokenInfo> {
        self.tokens.values()
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Render an amount in smallest units as a decimal string, trimming
/// trailing fractional zeros.
pub fn format_amount(amount: u64, decimals: u8) -> String {
    let divisor = 10u128.pow(decimals as u32);
    let whole = amount as u128 / divisor;
    let frac = amount as u128 % divisor;

    if frac == 0 {
        return whole.to_string();
    }

    let frac = format!("{:0width$}", frac, width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}
