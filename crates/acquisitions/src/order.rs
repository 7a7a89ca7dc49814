use chrono::{DateTime, Utc};
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use stacks_core::{DomainError, Isbn, LineId, OrderId};

/// Purchase order status lifecycle.
///
/// `Received` is terminal and set only when every line is fully received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Received,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Received => "received",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "received" => Ok(OrderStatus::Received),
            other => Err(DomainError::validation(format!(
                "invalid order status: {other}"
            ))),
        }
    }
}

/// Purchase order header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub placed_at: DateTime<Utc>,
}

/// One ordered title within an order.
///
/// Carries item metadata by value rather than referencing the catalog: the
/// title usually does not exist there yet, and the order must stay readable
/// even if the catalog row later changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: LineId,
    pub order_id: OrderId,
    pub title: String,
    pub author: String,
    pub isbn: Isbn,
    pub category: String,
    pub edition: String,
    pub publisher: String,
    pub publication_year: i32,
    pub vendor: String,
    pub quantity_ordered: i64,
    pub quantity_received: i64,
    pub is_damaged: bool,
    pub comments: Option<String>,
}

impl OrderLine {
    /// A line is complete once the received count reaches the ordered count.
    pub fn is_complete(&self) -> bool {
        self.quantity_received >= self.quantity_ordered
    }

    pub fn outstanding(&self) -> i64 {
        self.quantity_ordered - self.quantity_received
    }
}

/// Validated input for one line of a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub title: String,
    pub author: String,
    pub isbn: Isbn,
    pub category: String,
    pub edition: String,
    pub publisher: String,
    pub publication_year: i32,
    pub quantity: i64,
    pub vendor: String,
}

impl NewOrderLine {
    /// Validate a structured (non-CSV) order line. Bulk ingestion applies
    /// defaults instead; this path rejects.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.title.trim().is_empty() {
            return Err(DomainError::validation("order line title must not be empty"));
        }
        if self.author.trim().is_empty() {
            return Err(DomainError::validation(
                "order line author must not be empty",
            ));
        }
        if self.quantity < 1 {
            return Err(DomainError::validation(
                "order line quantity must be at least 1",
            ));
        }
        Ok(())
    }

    /// Materialize into a stored line with nothing received yet.
    pub fn into_line(self, order_id: OrderId) -> OrderLine {
        OrderLine {
            id: LineId::new(),
            order_id,
            title: self.title,
            author: self.author,
            isbn: self.isbn,
            category: self.category,
            edition: self.edition,
            publisher: self.publisher,
            publication_year: self.publication_year,
            vendor: self.vendor,
            quantity_ordered: self.quantity,
            quantity_received: 0,
            is_damaged: false,
            comments: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_line(quantity: i64) -> NewOrderLine {
        NewOrderLine {
            title: "Linear Algebra Done Right".to_string(),
            author: "Axler".to_string(),
            isbn: "978-3-319-11079-0".parse().unwrap(),
            category: "Science".to_string(),
            edition: "3rd".to_string(),
            publisher: "Springer".to_string(),
            publication_year: 2015,
            quantity,
            vendor: "Campus Books".to_string(),
        }
    }

    #[test]
    fn structured_line_requires_positive_quantity() {
        assert!(test_line(0).validate().is_err());
        assert!(test_line(-2).validate().is_err());
        assert!(test_line(1).validate().is_ok());
    }

    #[test]
    fn structured_line_requires_title_and_author() {
        let mut line = test_line(3);
        line.title = " ".to_string();
        assert!(line.validate().is_err());

        let mut line = test_line(3);
        line.author = String::new();
        assert!(line.validate().is_err());
    }

    #[test]
    fn new_line_starts_with_nothing_received() {
        let order_id = OrderId::new();
        let line = test_line(4).into_line(order_id);

        assert_eq!(line.order_id, order_id);
        assert_eq!(line.quantity_ordered, 4);
        assert_eq!(line.quantity_received, 0);
        assert!(!line.is_complete());
        assert_eq!(line.outstanding(), 4);
    }
}
