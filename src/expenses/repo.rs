use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::repo_types::{CategoryTotal, DateRange, Expense, ExpenseChanges, ExpenseFilter, NewExpense};
use crate::db::StoreError;

const EXPENSE_COLUMNS: &str = "id, user_id, amount, category, note, date, created_at, updated_at";

/// Expense persistence. Every read and write is scoped by `owner`, except
/// [`ExpenseStore::owner_of`], which only reveals who owns a row.
#[async_trait]
pub trait ExpenseStore: Send + Sync {
    async fn insert(&self, owner: Uuid, new: NewExpense) -> Result<Expense, StoreError>;

    /// Newest `date` first.
    async fn list(
        &self,
        owner: Uuid,
        filter: &ExpenseFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Expense>, StoreError>;

    async fn count(&self, owner: Uuid, filter: &ExpenseFilter) -> Result<i64, StoreError>;

    async fn find_owned(&self, owner: Uuid, id: Uuid) -> Result<Option<Expense>, StoreError>;

    async fn owner_of(&self, id: Uuid) -> Result<Option<Uuid>, StoreError>;

    /// Per-category sums, largest first.
    async fn totals_by_category(
        &self,
        owner: Uuid,
        range: &DateRange,
    ) -> Result<Vec<CategoryTotal>, StoreError>;

    /// `None` when no row with `id` belongs to `owner`.
    async fn update(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: ExpenseChanges,
    ) -> Result<Option<Expense>, StoreError>;

    /// `false` when nothing was deleted.
    async fn delete(&self, owner: Uuid, id: Uuid) -> Result<bool, StoreError>;
}

pub struct PgExpenseStore {
    db: PgPool,
}

impl PgExpenseStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn push_range(qb: &mut QueryBuilder<'_, Postgres>, range: &DateRange) {
    if let Some(start) = range.start {
        qb.push(" AND date >= ").push_bind(start);
    }
    if let Some(end) = range.end {
        qb.push(" AND date <= ").push_bind(end);
    }
}

fn push_filter<'a>(qb: &mut QueryBuilder<'a, Postgres>, filter: &'a ExpenseFilter) {
    if let Some(category) = filter.category.as_deref() {
        qb.push(" AND category = ").push_bind(category);
    }
    push_range(qb, &filter.range);
}

#[async_trait]
impl ExpenseStore for PgExpenseStore {
    async fn insert(&self, owner: Uuid, new: NewExpense) -> Result<Expense, StoreError> {
        let expense = sqlx::query_as::<_, Expense>(&format!(
            r#"
            INSERT INTO expenses (user_id, amount, category, note, date)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {EXPENSE_COLUMNS}
            "#
        ))
        .bind(owner)
        .bind(new.amount)
        .bind(new.category)
        .bind(new.note)
        .bind(new.date)
        .fetch_one(&self.db)
        .await?;
        Ok(expense)
    }

    async fn list(
        &self,
        owner: Uuid,
        filter: &ExpenseFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Expense>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE user_id = "
        ));
        qb.push_bind(owner);
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY date DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = qb.build_query_as::<Expense>().fetch_all(&self.db).await?;
        Ok(rows)
    }

    async fn count(&self, owner: Uuid, filter: &ExpenseFilter) -> Result<i64, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM expenses WHERE user_id = ");
        qb.push_bind(owner);
        push_filter(&mut qb, filter);

        let total = qb.build_query_scalar::<i64>().fetch_one(&self.db).await?;
        Ok(total)
    }

    async fn find_owned(&self, owner: Uuid, id: Uuid) -> Result<Option<Expense>, StoreError> {
        let expense = sqlx::query_as::<_, Expense>(&format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.db)
        .await?;
        Ok(expense)
    }

    async fn owner_of(&self, id: Uuid) -> Result<Option<Uuid>, StoreError> {
        let owner = sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM expenses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(owner)
    }

    async fn totals_by_category(
        &self,
        owner: Uuid,
        range: &DateRange,
    ) -> Result<Vec<CategoryTotal>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT category, SUM(amount) AS total, COUNT(*) AS count FROM expenses WHERE user_id = ",
        );
        qb.push_bind(owner);
        push_range(&mut qb, range);
        qb.push(" GROUP BY category ORDER BY total DESC");

        let rows = qb.build_query_as::<CategoryTotal>().fetch_all(&self.db).await?;
        Ok(rows)
    }

    async fn update(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: ExpenseChanges,
    ) -> Result<Option<Expense>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE expenses SET updated_at = now()");
        if let Some(amount) = changes.amount {
            qb.push(", amount = ").push_bind(amount);
        }
        if let Some(category) = changes.category {
            qb.push(", category = ").push_bind(category);
        }
        if let Some(note) = changes.note {
            qb.push(", note = ").push_bind(note);
        }
        if let Some(date) = changes.date {
            qb.push(", date = ").push_bind(date);
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(" AND user_id = ")
            .push_bind(owner)
            .push(format!(" RETURNING {EXPENSE_COLUMNS}"));

        let expense = qb
            .build_query_as::<Expense>()
            .fetch_optional(&self.db)
            .await?;
        Ok(expense)
    }

    async fn delete(&self, owner: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM expenses WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.db)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
