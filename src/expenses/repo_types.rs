use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Expense row, also its wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub category: String,
    pub note: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Validated create payload; `date` is filled in by the service when absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseInput {
    pub amount: Decimal,
    pub category: String,
    pub note: Option<String>,
    pub date: Option<OffsetDateTime>,
}

/// What the store inserts.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpense {
    pub amount: Decimal,
    pub category: String,
    pub note: Option<String>,
    pub date: OffsetDateTime,
}

/// Partial update. `None` leaves the column alone; `note: Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseChanges {
    pub amount: Option<Decimal>,
    pub category: Option<String>,
    pub note: Option<Option<String>>,
    pub date: Option<OffsetDateTime>,
}

/// Inclusive date window, already normalised to day boundaries.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DateRange {
    pub start: Option<OffsetDateTime>,
    pub end: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseFilter {
    pub category: Option<String>,
    pub range: DateRange,
}

/// Validated list request.
#[derive(Debug, Clone, PartialEq)]
pub struct ListParams {
    pub filter: ExpenseFilter,
    pub page: i64,
    pub limit: i64,
}

impl ListParams {
    /// Saturates for absurd pages; the store then simply returns no rows.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CategoryTotal {
    pub category: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    pub count: i64,
}
