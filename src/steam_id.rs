//! Conversion between the two Steam identifier encodings.
//!
//! The ban file stores 64-bit identifiers (`76561197960265729`) while the
//! SourceBans table stores the textual `STEAM_0:Y:Z` form. The mapping is
//! `numeric = BASE + Z * 2 + Y`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Numeric value of the individual-account universe origin.
pub const STEAM_ID64_BASE: u64 = 76_561_197_960_265_728;

/// Largest offset above [`STEAM_ID64_BASE`] that still names an account.
pub const MAX_ACCOUNT_OFFSET: u64 = 4_294_967_295;

const STEAM2_PREFIX: &str = "STEAM_0";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SteamIdError {
    #[error("'{0}' is not a numeric SteamID64")]
    NotNumeric(String),

    #[error("SteamID64 {0} is outside the individual account range")]
    OutOfRange(u64),

    #[error("'{0}' is not a STEAM_0:Y:Z identifier")]
    Malformed(String),

    #[error("invalid parity '{0}' (expected 0 or 1)")]
    InvalidParity(String),

    #[error("invalid account index '{0}'")]
    InvalidIndex(String),
}

/// A validated 64-bit Steam identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SteamId64(u64);

impl SteamId64 {
    /// Wrap a raw value, rejecting anything outside `(BASE, BASE + MAX_ACCOUNT_OFFSET]`.
    pub fn new(value: u64) -> Result<Self, SteamIdError> {
        match value.checked_sub(STEAM_ID64_BASE) {
            Some(offset) if offset >= 1 && offset <= MAX_ACCOUNT_OFFSET => Ok(Self(value)),
            _ => Err(SteamIdError::OutOfRange(value)),
        }
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn to_steam2(self) -> SteamId2 {
        let offset = self.0 - STEAM_ID64_BASE;
        SteamId2 {
            parity: (offset % 2) as u8,
            index: offset / 2,
        }
    }
}

impl fmt::Display for SteamId64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SteamId64 {
    type Err = SteamIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // u64::from_str accepts a leading '+', which is not a valid line in the ban file
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SteamIdError::NotNumeric(s.to_string()));
        }
        let value: u64 = s
            .parse()
            .map_err(|_| SteamIdError::NotNumeric(s.to_string()))?;
        Self::new(value)
    }
}

impl From<SteamId2> for SteamId64 {
    fn from(id: SteamId2) -> Self {
        id.to_steam64()
    }
}

/// A validated `STEAM_0:Y:Z` identifier.
///
/// Only identifiers that map back into the [`SteamId64`] range can be built,
/// so the conversion in both directions is total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SteamId2 {
    parity: u8,
    index: u64,
}

impl SteamId2 {
    pub fn new(parity: u8, index: u64) -> Result<Self, SteamIdError> {
        if parity > 1 {
            return Err(SteamIdError::InvalidParity(parity.to_string()));
        }
        let offset = index
            .checked_mul(2)
            .and_then(|v| v.checked_add(u64::from(parity)))
            .ok_or_else(|| SteamIdError::InvalidIndex(index.to_string()))?;
        if offset == 0 || offset > MAX_ACCOUNT_OFFSET {
            return Err(SteamIdError::OutOfRange(
                STEAM_ID64_BASE.saturating_add(offset),
            ));
        }
        Ok(Self { parity, index })
    }

    pub fn parity(&self) -> u8 {
        self.parity
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn to_steam64(self) -> SteamId64 {
        SteamId64(STEAM_ID64_BASE + self.index * 2 + u64::from(self.parity))
    }
}

impl fmt::Display for SteamId2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", STEAM2_PREFIX, self.parity, self.index)
    }
}

impl FromStr for SteamId2 {
    type Err = SteamIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 || !parts[0].eq_ignore_ascii_case(STEAM2_PREFIX) {
            return Err(SteamIdError::Malformed(s.to_string()));
        }

        let parity = match parts[1] {
            "0" => 0,
            "1" => 1,
            other => return Err(SteamIdError::InvalidParity(other.to_string())),
        };

        let raw_index = parts[2];
        if raw_index.is_empty() || !raw_index.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SteamIdError::InvalidIndex(raw_index.to_string()));
        }
        let index: u64 = raw_index
            .parse()
            .map_err(|_| SteamIdError::InvalidIndex(raw_index.to_string()))?;

        Self::new(parity, index)
    }
}

impl From<SteamId64> for SteamId2 {
    fn from(id: SteamId64) -> Self {
        id.to_steam2()
    }
}

/// Convert a numeric identifier string to its structured form.
pub fn to_steam2(steam_id64: &str) -> Result<SteamId2, SteamIdError> {
    steam_id64.parse::<SteamId64>().map(SteamId64::to_steam2)
}

/// Convert a structured identifier string to its numeric form.
pub fn to_steam64(steam_id2: &str) -> Result<SteamId64, SteamIdError> {
    steam_id2.parse::<SteamId2>().map(SteamId2::to_steam64)
}

pub fn is_valid_steam64(s: &str) -> bool {
    s.parse::<SteamId64>().is_ok()
}

pub fn is_valid_steam2(s: &str) -> bool {
    s.parse::<SteamId2>().is_ok()
}
