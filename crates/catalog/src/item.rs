use core::str::FromStr;
use serde::{Deserialize, Serialize};

use stacks_core::{DomainError, Isbn};

/// Categories accepted at the catalog ingestion boundary.
///
/// Items store category as text on the row (promoted order lines pass their
/// category through unvalidated); this set gates only direct catalog
/// ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Science,
    Education,
    BusinessEconomics,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Science => "Science",
            Category::Education => "Education",
            Category::BusinessEconomics => "Business/Economics",
        }
    }
}

impl core::fmt::Display for Category {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Science" => Ok(Category::Science),
            "Education" => Ok(Category::Education),
            "Business/Economics" => Ok(Category::BusinessEconomics),
            other => Err(DomainError::validation(format!(
                "invalid category: {other}"
            ))),
        }
    }
}

/// Catalog item (one title; copies are counted, not tracked individually).
///
/// Invariant: `0 <= copies_available <= total_copies`, and per item
/// `copies_available + active loans == total_copies`. Only checkout,
/// check-in, and promotion move these counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub isbn: Isbn,
    pub title: String,
    pub author: String,
    pub category: String,
    pub edition: String,
    pub publisher: String,
    pub publication_year: i32,
    pub total_copies: i64,
    pub copies_available: i64,
}

impl Item {
    pub fn is_available(&self) -> bool {
        self.copies_available > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parses_the_fixed_set_only() {
        assert_eq!("Science".parse::<Category>().unwrap(), Category::Science);
        assert_eq!(
            "Business/Economics".parse::<Category>().unwrap(),
            Category::BusinessEconomics
        );
        assert!("Fiction".parse::<Category>().is_err());
        // Case-sensitive, matching the ingestion contract.
        assert!("science".parse::<Category>().is_err());
    }

    #[test]
    fn category_round_trips_through_display() {
        for category in [
            Category::Science,
            Category::Education,
            Category::BusinessEconomics,
        ] {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
    }
}
