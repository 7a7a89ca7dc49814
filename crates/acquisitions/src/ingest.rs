//! Bulk order ingestion from CSV.
//!
//! Column layout is positional: title, author, isbn, category, edition,
//! publisher, publication_year, quantity, vendor. The first row is a header
//! and is skipped.

use std::io::Read;

use stacks_core::{DomainError, Isbn};

use crate::order::NewOrderLine;

const FALLBACK_CATEGORY: &str = "General";
const FALLBACK_YEAR: i32 = 1900;
const FALLBACK_QUANTITY: i64 = 1;

/// Parse uploaded CSV bytes into order lines.
///
/// Rows without a usable title, author, or ISBN are dropped; malformed
/// year or quantity cells fall back to baseline values rather than failing
/// the batch. Returns `EmptyOrder` when no row survives.
pub fn parse_order_rows<R: Read>(reader: R) -> Result<Vec<NewOrderLine>, DomainError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let mut lines = Vec::new();
    for record in csv_reader.records() {
        let record =
            record.map_err(|e| DomainError::validation(format!("unreadable CSV row: {e}")))?;

        let field = |idx: usize| record.get(idx).unwrap_or("").trim();

        let title = field(0);
        let author = field(1);
        let isbn: Isbn = match field(2).parse() {
            Ok(isbn) => isbn,
            Err(_) => continue,
        };
        if title.is_empty() || author.is_empty() {
            continue;
        }

        let publication_year = field(6).parse::<i32>().unwrap_or(FALLBACK_YEAR);
        let quantity = match field(7).parse::<i64>() {
            Ok(q) if q >= 1 => q,
            _ => FALLBACK_QUANTITY,
        };

        let or_default = |value: &str, fallback: &str| {
            if value.is_empty() {
                fallback.to_string()
            } else {
                value.to_string()
            }
        };

        lines.push(NewOrderLine {
            title: title.to_string(),
            author: author.to_string(),
            isbn,
            category: or_default(field(3), FALLBACK_CATEGORY),
            edition: field(4).to_string(),
            publisher: field(5).to_string(),
            publication_year,
            quantity,
            vendor: field(8).to_string(),
        });
    }

    if lines.is_empty() {
        return Err(DomainError::EmptyOrder);
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str = "title,author,isbn,category,edition,publisher,publication_year,quantity,vendor\n";

    fn parse(body: &str) -> Result<Vec<NewOrderLine>, DomainError> {
        parse_order_rows(Cursor::new(format!("{HEADER}{body}")))
    }

    #[test]
    fn parses_well_formed_rows() {
        let lines = parse(
            "Calculus,Spivak,978-0-914098-91-1,Science,4th,Publish or Perish,2008,3,Campus Books\n\
             Microeconomics,Varian,978-0-393-12396-8,Business/Economics,9th,Norton,2014,2,Campus Books\n",
        )
        .unwrap();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].title, "Calculus");
        assert_eq!(lines[0].quantity, 3);
        assert_eq!(lines[1].category, "Business/Economics");
    }

    #[test]
    fn drops_rows_missing_title_author_or_isbn() {
        let lines = parse(
            ",Spivak,978-0-914098-91-1,Science,,,2008,3,\n\
             Calculus,,978-0-914098-91-1,Science,,,2008,3,\n\
             Calculus,Spivak,,Science,,,2008,3,\n\
             Calculus,Spivak,978-0-914098-91-1,Science,,,2008,3,\n",
        )
        .unwrap();

        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].author, "Spivak");
    }

    #[test]
    fn malformed_year_and_quantity_fall_back() {
        let lines = parse("Calculus,Spivak,978-0-914098-91-1,Science,,,unknown,lots,\n").unwrap();

        assert_eq!(lines[0].publication_year, 1900);
        assert_eq!(lines[0].quantity, 1);
    }

    #[test]
    fn nonpositive_quantity_falls_back() {
        let lines = parse("Calculus,Spivak,978-0-914098-91-1,Science,,,2008,0,\n").unwrap();
        assert_eq!(lines[0].quantity, 1);

        let lines = parse("Calculus,Spivak,978-0-914098-91-1,Science,,,2008,-4,\n").unwrap();
        assert_eq!(lines[0].quantity, 1);
    }

    #[test]
    fn missing_category_defaults() {
        let lines = parse("Calculus,Spivak,978-0-914098-91-1,,,,2008,1,\n").unwrap();
        assert_eq!(lines[0].category, "General");
    }

    #[test]
    fn all_rows_invalid_is_an_empty_order() {
        let err = parse(",,,,,,,,\n,,bad-isbn,,,,,,\n").unwrap_err();
        assert_eq!(err, DomainError::EmptyOrder);
    }

    #[test]
    fn empty_file_is_an_empty_order() {
        let err = parse_order_rows(Cursor::new(HEADER)).unwrap_err();
        assert_eq!(err, DomainError::EmptyOrder);
    }

    #[test]
    fn short_rows_are_padded_with_defaults() {
        // flexible(true): a row with only the first three columns still parses.
        let lines = parse("Calculus,Spivak,978-0-914098-91-1\n").unwrap();
        assert_eq!(lines[0].publication_year, 1900);
        assert_eq!(lines[0].quantity, 1);
        assert_eq!(lines[0].vendor, "");
    }
}
