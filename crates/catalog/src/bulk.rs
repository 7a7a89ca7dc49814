//! Bulk catalog ingestion rules.
//!
//! The whole batch shares one category and lands all-or-nothing: any
//! duplicate ISBN (inside the batch here, against the existing catalog in
//! the store) rejects every row.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use stacks_core::{DomainError, Isbn};

use crate::item::{Category, Item};

/// One uploaded catalog row, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkRow {
    pub title: String,
    pub author: String,
    pub isbn: String,
    #[serde(default)]
    pub edition: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub publication_year: i32,
    #[serde(default = "default_copies")]
    pub copies: i64,
}

fn default_copies() -> i64 {
    1
}

/// Validate a batch and materialize catalog items from it.
///
/// Fails on a malformed ISBN or an ISBN repeated within the batch; the
/// store layer adds the collision check against already-cataloged items.
/// Copies below 1 fall back to 1.
pub fn prepare_batch(category: Category, rows: Vec<BulkRow>) -> Result<Vec<Item>, DomainError> {
    if rows.is_empty() {
        return Err(DomainError::validation("batch has no rows"));
    }

    let mut seen: HashSet<Isbn> = HashSet::new();
    let mut repeated: Vec<String> = Vec::new();
    let mut items = Vec::with_capacity(rows.len());

    for row in rows {
        let isbn: Isbn = row.isbn.parse()?;

        if !seen.insert(isbn.clone()) {
            repeated.push(isbn.into_string());
            continue;
        }

        let copies = if row.copies < 1 { 1 } else { row.copies };
        items.push(Item {
            isbn,
            title: row.title,
            author: row.author,
            category: category.as_str().to_string(),
            edition: row.edition,
            publisher: row.publisher,
            publication_year: row.publication_year,
            total_copies: copies,
            copies_available: copies,
        });
    }

    if !repeated.is_empty() {
        return Err(DomainError::DuplicateIsbn(repeated));
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_row(isbn: &str, copies: i64) -> BulkRow {
        BulkRow {
            title: "Principles of Economics".to_string(),
            author: "Mankiw".to_string(),
            isbn: isbn.to_string(),
            edition: "8th".to_string(),
            publisher: "Cengage".to_string(),
            publication_year: 2017,
            copies,
        }
    }

    #[test]
    fn batch_materializes_shelf_ready_items() {
        let items = prepare_batch(
            Category::BusinessEconomics,
            vec![test_row("978-1-305-58512-6", 4)],
        )
        .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].category, "Business/Economics");
        assert_eq!(items[0].total_copies, 4);
        assert_eq!(items[0].copies_available, 4);
    }

    #[test]
    fn repeated_isbn_rejects_the_batch() {
        let err = prepare_batch(
            Category::Science,
            vec![
                test_row("978-1-305-58512-6", 1),
                test_row("978-0-914098-91-1", 2),
                test_row("978-1-305-58512-6", 3),
            ],
        )
        .unwrap_err();

        match err {
            DomainError::DuplicateIsbn(duplicates) => {
                assert_eq!(duplicates, vec!["978-1-305-58512-6".to_string()]);
            }
            other => panic!("expected DuplicateIsbn, got {other:?}"),
        }
    }

    #[test]
    fn malformed_isbn_rejects_the_batch() {
        let err = prepare_batch(Category::Science, vec![test_row("garbage", 1)]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn copies_below_one_fall_back() {
        let items = prepare_batch(Category::Science, vec![test_row("978-0-914098-91-1", 0)]).unwrap();
        assert_eq!(items[0].total_copies, 1);
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(prepare_batch(Category::Science, vec![]).is_err());
    }
}
