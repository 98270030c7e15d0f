//! Jurisdiction value objects: state codes and tax-registration identifiers.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Two-digit jurisdiction (state) code, e.g. `"27"`.
///
/// Used both as the seller's registered state and as the buyer's place of supply.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StateCode([u8; 2]);

impl StateCode {
    /// Place-of-supply code used for supplies to buyers outside the country.
    pub const FOREIGN: StateCode = StateCode(*b"96");

    pub fn new(code: &str) -> DomainResult<Self> {
        let code = code.trim();
        let bytes = code.as_bytes();
        if bytes.len() != 2 || !bytes.iter().all(u8::is_ascii_digit) {
            return Err(DomainError::validation(format!(
                "state code must be two digits, got '{code}'"
            )));
        }
        if bytes == b"00" {
            return Err(DomainError::validation("state code 00 is not assigned"));
        }
        Ok(Self([bytes[0], bytes[1]]))
    }

    pub fn as_str(&self) -> &str {
        // Constructed only from ASCII digits.
        core::str::from_utf8(&self.0).unwrap_or("??")
    }
}

impl core::fmt::Display for StateCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for StateCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<StateCode> for String {
    fn from(value: StateCode) -> Self {
        value.as_str().to_string()
    }
}

/// Tax-registration identifier of a registered business (15 characters).
///
/// The first two characters are the state code of registration. Normalized to
/// upper case on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Gstin(String);

impl Gstin {
    pub const LEN: usize = 15;

    pub fn new(raw: &str) -> DomainResult<Self> {
        let value = raw.trim().to_ascii_uppercase();
        if value.len() != Self::LEN {
            return Err(DomainError::validation(format!(
                "registration id must be {} characters, got {}",
                Self::LEN,
                value.len()
            )));
        }
        if !value.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(DomainError::validation(
                "registration id must be alphanumeric",
            ));
        }
        StateCode::new(&value[..2])?;
        Ok(Self(value))
    }

    /// Parse an optional, possibly blank identifier. Blank means "unregistered".
    pub fn parse_optional(raw: Option<&str>) -> DomainResult<Option<Self>> {
        match raw.map(str::trim) {
            None | Some("") => Ok(None),
            Some(v) => Self::new(v).map(Some),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// State of registration encoded in the identifier.
    pub fn state_code(&self) -> StateCode {
        // Validated in `new`.
        StateCode([self.0.as_bytes()[0], self.0.as_bytes()[1]])
    }
}

impl core::fmt::Display for Gstin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Gstin {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Gstin {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Gstin> for String {
    fn from(value: Gstin) -> Self {
        value.0
    }
}
