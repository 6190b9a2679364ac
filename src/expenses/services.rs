use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{ExpensePage, ExpenseSummary, Pagination},
    repo::ExpenseStore,
    repo_types::{DateRange, Expense, ExpenseChanges, ExpenseInput, ListParams, NewExpense},
};
use crate::error::AppError;

fn not_found() -> AppError {
    AppError::NotFound("Expense not found".into())
}

fn forbidden() -> AppError {
    AppError::Forbidden("You do not have permission to modify this expense".into())
}

/// The row is always owned by `owner`; a missing date becomes "now".
pub async fn create(
    store: &dyn ExpenseStore,
    owner: Uuid,
    input: ExpenseInput,
) -> Result<Expense, AppError> {
    let new = NewExpense {
        amount: input.amount,
        category: input.category,
        note: input.note,
        date: input.date.unwrap_or_else(OffsetDateTime::now_utc),
    };
    let expense = store.insert(owner, new).await?;
    info!(user_id = %owner, expense_id = %expense.id, "expense created");
    Ok(expense)
}

pub async fn list(
    store: &dyn ExpenseStore,
    owner: Uuid,
    params: &ListParams,
) -> Result<ExpensePage, AppError> {
    let expenses = store
        .list(owner, &params.filter, params.limit, params.offset())
        .await?;
    let total = store.count(owner, &params.filter).await?;
    Ok(ExpensePage {
        expenses,
        pagination: Pagination::new(total, params.page, params.limit),
    })
}

/// Missing and foreign rows both surface as `NotFound`.
pub async fn get_by_id(
    store: &dyn ExpenseStore,
    owner: Uuid,
    id: Uuid,
) -> Result<Expense, AppError> {
    store.find_owned(owner, id).await?.ok_or_else(not_found)
}

pub async fn summary(
    store: &dyn ExpenseStore,
    owner: Uuid,
    range: &DateRange,
) -> Result<ExpenseSummary, AppError> {
    let summary = store.totals_by_category(owner, range).await?;
    let total = summary
        .iter()
        .try_fold(Decimal::ZERO, |acc, c| acc.checked_add(c.total))
        .ok_or_else(|| anyhow::anyhow!("summary total overflows for user {owner}"))?;
    Ok(ExpenseSummary { summary, total })
}

/// Write paths tell a missing row (`NotFound`) apart from someone else's (`Forbidden`).
async fn ensure_owner(store: &dyn ExpenseStore, owner: Uuid, id: Uuid) -> Result<(), AppError> {
    match store.owner_of(id).await? {
        None => Err(not_found()),
        Some(actual) if actual != owner => {
            warn!(user_id = %owner, expense_id = %id, "write on foreign expense");
            Err(forbidden())
        }
        Some(_) => Ok(()),
    }
}

pub async fn update(
    store: &dyn ExpenseStore,
    owner: Uuid,
    id: Uuid,
    changes: ExpenseChanges,
) -> Result<Expense, AppError> {
    ensure_owner(store, owner, id).await?;
    // The row may vanish between the two statements.
    store.update(owner, id, changes).await?.ok_or_else(not_found)
}

pub async fn delete(store: &dyn ExpenseStore, owner: Uuid, id: Uuid) -> Result<(), AppError> {
    ensure_owner(store, owner, id).await?;
    if !store.delete(owner, id).await? {
        return Err(not_found());
    }
    info!(user_id = %owner, expense_id = %id, "expense deleted");
    Ok(())
}
