use serde::Deserialize;

use chrono::{DateTime, Utc};

use stacks_acquisitions::{NewOrderLine, Order, OrderLine};
use stacks_catalog::BulkRow;
use stacks_circulation::{BorrowRecord, Fine};
use stacks_core::{BorrowerRef, DomainError};
use stacks_infra::OrderSummary;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct BorrowerParty {
    pub kind: String,
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequestBody {
    pub isbn: String,
    pub borrower: BorrowerParty,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CheckInRequestBody {
    pub isbn: String,
    pub borrower: BorrowerParty,
}

#[derive(Debug, Deserialize)]
pub struct ListLoansQuery {
    pub borrower_kind: Option<String>,
    pub borrower_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderLineRequest {
    pub title: String,
    pub author: String,
    pub isbn: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub edition: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default = "default_publication_year")]
    pub publication_year: i32,
    pub quantity: i64,
    #[serde(default)]
    pub vendor: String,
}

fn default_category() -> String {
    "General".to_string()
}

fn default_publication_year() -> i32 {
    1900
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub lines: Vec<OrderLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct ReceiptUpdateRequest {
    pub line_id: String,
    pub quantity_delta: i64,
    #[serde(default)]
    pub is_damaged: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReceiveRequest {
    pub updates: Vec<ReceiptUpdateRequest>,
    #[serde(default)]
    pub comments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CatalogBulkUploadRequest {
    pub category: String,
    pub rows: Vec<BulkRow>,
}

pub fn parse_borrower(party: &BorrowerParty) -> Result<BorrowerRef, DomainError> {
    let kind = party.kind.parse()?;
    BorrowerRef::new(kind, party.id.clone())
}

pub fn to_new_order_line(req: OrderLineRequest) -> Result<NewOrderLine, DomainError> {
    Ok(NewOrderLine {
        title: req.title,
        author: req.author,
        isbn: req.isbn.parse()?,
        category: req.category,
        edition: req.edition,
        publisher: req.publisher,
        publication_year: req.publication_year,
        quantity: req.quantity,
        vendor: req.vendor,
    })
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn loan_to_json(record: BorrowRecord) -> serde_json::Value {
    serde_json::json!({
        "loan_id": record.id.to_string(),
        "isbn": record.isbn.as_str(),
        "borrower": {
            "kind": record.borrower.kind.as_str(),
            "id": record.borrower.id,
        },
        "borrowed_at": record.borrowed_at.to_rfc3339(),
        "due_date": record.due_date.to_rfc3339(),
        "status": record.status.as_str(),
        "fine_cents": record.fine_cents,
        "returned_at": record.returned_at.map(|t| t.to_rfc3339()),
    })
}

pub fn fine_to_json(fine: Fine) -> serde_json::Value {
    serde_json::json!({
        "fine_id": fine.id.to_string(),
        "borrower": {
            "kind": fine.borrower.kind.as_str(),
            "id": fine.borrower.id,
        },
        "isbn": fine.isbn.as_str(),
        "due_date": fine.due_date.to_rfc3339(),
        "amount_cents": fine.amount_cents,
        "status": fine.status.as_str(),
    })
}

pub fn order_to_json(order: Order, line_count: usize) -> serde_json::Value {
    serde_json::json!({
        "order_id": order.id.to_string(),
        "status": order.status.as_str(),
        "placed_at": order.placed_at.to_rfc3339(),
        "line_count": line_count,
    })
}

pub fn order_summary_to_json(summary: OrderSummary) -> serde_json::Value {
    serde_json::json!({
        "order_id": summary.id.to_string(),
        "status": summary.status.as_str(),
        "placed_at": summary.placed_at.to_rfc3339(),
        "line_count": summary.line_count,
    })
}

pub fn order_line_to_json(line: OrderLine) -> serde_json::Value {
    serde_json::json!({
        "line_id": line.id.to_string(),
        "order_id": line.order_id.to_string(),
        "title": line.title,
        "author": line.author,
        "isbn": line.isbn.as_str(),
        "category": line.category,
        "edition": line.edition,
        "publisher": line.publisher,
        "publication_year": line.publication_year,
        "vendor": line.vendor,
        "quantity_ordered": line.quantity_ordered,
        "quantity_received": line.quantity_received,
        "is_damaged": line.is_damaged,
        "comments": line.comments,
    })
}
