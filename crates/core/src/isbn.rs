//! ISBN value object.
//!
//! Validation is structural (length and character set); no checksum.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Normalized ISBN (natural key of a catalog item).
///
/// Stored uppercase with surrounding whitespace removed. Hyphens are kept as
/// supplied so the value round-trips to what the vendor printed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Isbn(String);

impl Isbn {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl core::fmt::Display for Isbn {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Isbn {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("ISBN must not be empty"));
        }

        let digits = trimmed.chars().filter(|c| c.is_ascii_digit()).count();
        let valid_chars = trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || c == '-' || c == 'x' || c == 'X');

        // ISBN-10 or ISBN-13, with 'X' allowed as the final check character.
        if !valid_chars || !(9..=13).contains(&digits) {
            return Err(DomainError::validation(format!(
                "malformed ISBN: {trimmed}"
            )));
        }

        Ok(Self(trimmed.to_ascii_uppercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_isbn10_and_isbn13() {
        assert!("0306406152".parse::<Isbn>().is_ok());
        assert!("978-0-306-40615-7".parse::<Isbn>().is_ok());
        assert!("113332453X".parse::<Isbn>().is_ok());
    }

    #[test]
    fn trims_and_uppercases() {
        let isbn: Isbn = "  113332453x ".parse().unwrap();
        assert_eq!(isbn.as_str(), "113332453X");
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert!("".parse::<Isbn>().is_err());
        assert!("   ".parse::<Isbn>().is_err());
        assert!("not-an-isbn".parse::<Isbn>().is_err());
        assert!("12345".parse::<Isbn>().is_err());
    }
}
