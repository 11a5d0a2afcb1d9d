//! Request and result value types.

use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Which balance a request asks for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Currency {
    /// The ledger's base asset (e.g. ETH on Ethereum mainnet).
    Native,
    /// An ERC20-style token, identified by its contract address.
    Token(String),
}

impl Currency {
    pub fn token(address: impl Into<String>) -> Self {
        Self::Token(address.into())
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Token(address) => write!(f, "{address}"),
        }
    }
}

impl FromStr for Currency {
    type Err = std::convert::Infallible;

    /// `native` and `eth` (any case) select the native balance; anything else
    /// is taken as a token address.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("native") || trimmed.eq_ignore_ascii_case("eth") {
            Ok(Self::Native)
        } else {
            Ok(Self::Token(trimmed.to_string()))
        }
    }
}

// Currencies are map keys in serialized sheets, so they go over the wire as plain strings.
impl Serialize for Currency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A unit of work: one balance of one address at one block.
///
/// Identity is the whole triple. Duplicate triples are allowed; when folded
/// into a [`BalanceSheet`](crate::sheet::BalanceSheet) the later one wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BalanceRequest {
    /// Block reference: `latest`, a hex block number, etc.
    pub block: String,
    pub address: String,
    pub currency: Currency,
}

impl BalanceRequest {
    pub fn new(block: impl Into<String>, address: impl Into<String>, currency: Currency) -> Self {
        Self {
            block: block.into(),
            address: address.into(),
            currency,
        }
    }

    pub fn native(block: impl Into<String>, address: impl Into<String>) -> Self {
        Self::new(block, address, Currency::Native)
    }

    pub fn token(
        block: impl Into<String>,
        address: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self::new(block, address, Currency::Token(token.into()))
    }
}

impl fmt::Display for BalanceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.block, self.address, self.currency)
    }
}

/// A successfully fetched, unparsed balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBalance {
    pub request: BalanceRequest,
    /// Hex string exactly as reported by the backend.
    pub balance: String,
}

/// A raw balance after hex parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntBalance {
    pub request: BalanceRequest,
    pub balance: BigUint,
}
