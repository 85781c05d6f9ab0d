//! Shared types for L1/L2 fee-asset bridging
//!
//! These types travel between the L1 deposit side (portal contract), the L2
//! claim side (fee-asset balance and message tree) and the funding
//! orchestrator's persisted state.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Width of every address and hash on the wire, in bytes
pub const FIELD_BYTES: usize = 32;

/// Errors raised while parsing wire strings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing 0x prefix")]
    MissingPrefix,

    #[error("expected {expected} hex characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid hex digit")]
    InvalidHex,

    #[error("not an unsigned integer: {0:?}")]
    InvalidUint(String),
}

/// Parse a `0x`-prefixed, exactly 64 hex digit string.
fn parse_field(s: &str) -> Result<[u8; FIELD_BYTES], ParseError> {
    let digits = s.strip_prefix("0x").ok_or(ParseError::MissingPrefix)?;
    if digits.len() != FIELD_BYTES * 2 {
        return Err(ParseError::InvalidLength {
            expected: FIELD_BYTES * 2,
            actual: digits.len(),
        });
    }
    let mut out = [0u8; FIELD_BYTES];
    hex::decode_to_slice(digits, &mut out).map_err(|_| ParseError::InvalidHex)?;
    Ok(out)
}

/// Parse a base-10 unsigned integer string.
///
/// Only ASCII digits are accepted: no sign, no whitespace, no empty string.
pub fn parse_uint(s: &str) -> Result<u128, ParseError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidUint(s.to_string()));
    }
    s.parse::<u128>()
        .map_err(|_| ParseError::InvalidUint(s.to_string()))
}

macro_rules! field_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(pub [u8; FIELD_BYTES]);

        impl $name {
            pub const ZERO: Self = Self([0u8; FIELD_BYTES]);

            pub fn new(bytes: [u8; FIELD_BYTES]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; FIELD_BYTES] {
                &self.0
            }

            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; FIELD_BYTES]
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_field(s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

field_type!(
    /// L2 account address (a 32-byte field element)
    Address
);

field_type!(
    /// Opaque fixed-width hash (message hash, secret hash, L1 tx hash)
    Hash32
);

/// Secret needed to consume the cross-layer message on L2.
///
/// Never serialized and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ClaimSecret([u8; FIELD_BYTES]);

impl ClaimSecret {
    pub fn new(bytes: [u8; FIELD_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn expose(&self) -> &[u8; FIELD_BYTES] {
        &self.0
    }
}

impl fmt::Debug for ClaimSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClaimSecret(<REDACTED>)")
    }
}

/// Identifies one cross-layer message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimMaterial {
    pub claim_secret_hash: Hash32,
    pub message_hash: Hash32,
    #[serde(with = "uint_string_u64")]
    pub message_leaf_index: u64,
}

/// Result of one successful L1 deposit
#[derive(Clone, Debug)]
pub struct BridgeDeposit {
    /// Material needed to recognise and claim the message on L2
    pub claim: ClaimMaterial,
    /// The secret behind `claim.claim_secret_hash`
    pub claim_secret: ClaimSecret,
    /// Amount locked on L1
    pub amount: u128,
    /// L1 transaction that emitted the message, when the chain reports one
    pub l1_tx_hash: Option<Hash32>,
}

/// The record of the one bridge currently in flight
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BridgeSubmission {
    /// L2 balance observed immediately before submission
    pub baseline_balance: u128,
    /// Amount requested to bridge (always > 0)
    pub amount: u128,
    pub claim: ClaimMaterial,
    /// Submission time, milliseconds since the unix epoch
    pub submitted_at_ms: u64,
}

impl BridgeSubmission {
    pub fn from_deposit(baseline_balance: u128, deposit: &BridgeDeposit, submitted_at_ms: u64) -> Self {
        Self {
            baseline_balance,
            amount: deposit.amount,
            claim: deposit.claim,
            submitted_at_ms,
        }
    }
}

/// Serde helper for `u128` amounts carried as decimal strings
pub mod uint_string {
    use super::parse_uint;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_uint(&s).map_err(de::Error::custom)
    }
}

/// Serde helper for `u64` values carried as decimal strings
pub mod uint_string_u64 {
    use super::{parse_uint, ParseError};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        let wide = parse_uint(&s).map_err(de::Error::custom)?;
        u64::try_from(wide).map_err(|_| de::Error::custom(ParseError::InvalidUint(s)))
    }
}
