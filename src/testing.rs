//! In-memory stores and request helpers shared by the unit tests.

use std::{collections::BTreeMap, sync::Arc, sync::Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method, Request, StatusCode,
    },
    Router,
};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;
use uuid::Uuid;

use crate::{
    app::build_app,
    auth::{
        dto::PublicUser,
        repo::{User, UserStore},
    },
    client::cache::Clock,
    config::{AppConfig, Environment, JwtConfig},
    db::StoreError,
    expenses::{
        repo::ExpenseStore,
        repo_types::{CategoryTotal, DateRange, Expense, ExpenseChanges, ExpenseFilter, NewExpense},
    },
    state::AppState,
};

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
}

impl MemoryUserStore {
    pub fn len(&self) -> usize {
        self.users.lock().unwrap().len()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_public_by_id(&self, id: Uuid) -> Result<Option<PublicUser>, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.id == id).map(User::to_public))
    }

    async fn create(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
    ) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.email == email) {
            return Err(StoreError::Conflict);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }
}

/// Same predicate the Postgres store expresses in SQL.
pub fn filter_matches(filter: &ExpenseFilter, expense: &Expense) -> bool {
    filter
        .category
        .as_deref()
        .map_or(true, |c| expense.category == c)
        && range_contains(&filter.range, expense.date)
}

pub fn range_contains(range: &DateRange, at: OffsetDateTime) -> bool {
    range.start.map_or(true, |s| at >= s) && range.end.map_or(true, |e| at <= e)
}

#[derive(Default)]
pub struct MemoryExpenseStore {
    rows: Mutex<Vec<Expense>>,
}

impl MemoryExpenseStore {
    fn matching(&self, owner: Uuid, filter: &ExpenseFilter) -> Vec<Expense> {
        let rows = self.rows.lock().unwrap();
        rows.iter()
            .filter(|e| e.user_id == owner && filter_matches(filter, e))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ExpenseStore for MemoryExpenseStore {
    async fn insert(&self, owner: Uuid, new: NewExpense) -> Result<Expense, StoreError> {
        let now = OffsetDateTime::now_utc();
        let expense = Expense {
            id: Uuid::new_v4(),
            user_id: owner,
            amount: new.amount,
            category: new.category,
            note: new.note,
            date: new.date,
            created_at: now,
            updated_at: now,
        };
        self.rows.lock().unwrap().push(expense.clone());
        Ok(expense)
    }

    async fn list(
        &self,
        owner: Uuid,
        filter: &ExpenseFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Expense>, StoreError> {
        let mut rows = self.matching(owner, filter);
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(rows
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }

    async fn count(&self, owner: Uuid, filter: &ExpenseFilter) -> Result<i64, StoreError> {
        Ok(self.matching(owner, filter).len() as i64)
    }

    async fn find_owned(&self, owner: Uuid, id: Uuid) -> Result<Option<Expense>, StoreError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .find(|e| e.id == id && e.user_id == owner)
            .cloned())
    }

    async fn owner_of(&self, id: Uuid) -> Result<Option<Uuid>, StoreError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().find(|e| e.id == id).map(|e| e.user_id))
    }

    async fn totals_by_category(
        &self,
        owner: Uuid,
        range: &DateRange,
    ) -> Result<Vec<CategoryTotal>, StoreError> {
        let filter = ExpenseFilter {
            category: None,
            range: *range,
        };
        let mut groups: BTreeMap<String, (Decimal, i64)> = BTreeMap::new();
        for e in self.matching(owner, &filter) {
            let entry = groups.entry(e.category).or_insert((Decimal::ZERO, 0));
            entry.0 = entry.0.saturating_add(e.amount);
            entry.1 += 1;
        }
        let mut totals: Vec<CategoryTotal> = groups
            .into_iter()
            .map(|(category, (total, count))| CategoryTotal {
                category,
                total,
                count,
            })
            .collect();
        totals.sort_by(|a, b| b.total.cmp(&a.total));
        Ok(totals)
    }

    async fn update(
        &self,
        owner: Uuid,
        id: Uuid,
        changes: ExpenseChanges,
    ) -> Result<Option<Expense>, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.iter_mut().find(|e| e.id == id && e.user_id == owner) else {
            return Ok(None);
        };
        if let Some(amount) = changes.amount {
            row.amount = amount;
        }
        if let Some(category) = changes.category {
            row.category = category;
        }
        if let Some(note) = changes.note {
            row.note = note;
        }
        if let Some(date) = changes.date {
            row.date = date;
        }
        row.updated_at = OffsetDateTime::now_utc();
        Ok(Some(row.clone()))
    }

    async fn delete(&self, owner: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|e| !(e.id == id && e.user_id == owner));
        Ok(rows.len() < before)
    }
}

pub fn fake_config(environment: Environment) -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".into(),
        max_connections: 1,
        jwt: JwtConfig {
            secret: "test-secret".into(),
            issuer: "test-issuer".into(),
            audience: "test-aud".into(),
        },
        environment,
        host: "127.0.0.1".into(),
        port: 0,
    }
}

impl AppState {
    /// Empty in-memory stores with a production config.
    pub fn fake() -> Self {
        fake_state_with_env(Environment::Production)
    }
}

pub fn fake_state_with_env(environment: Environment) -> AppState {
    AppState::from_parts(
        Arc::new(fake_config(environment)),
        Arc::new(MemoryUserStore::default()),
        Arc::new(MemoryExpenseStore::default()),
    )
}

pub fn fake_state() -> AppState {
    AppState::fake()
}

pub fn fake_app() -> Router {
    build_app(fake_state())
}

/// Inserts a user directly, skipping password hashing.
pub async fn seed_user(state: &AppState, email: &str) -> User {
    state
        .users
        .create(email, "Test User", "unused-hash")
        .await
        .unwrap()
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let res = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Registers through the API; returns `(token, user id)`.
pub async fn register(app: &Router, email: &str) -> (String, String) {
    let (status, body) = send(
        app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "name": "Test User", "email": email, "password": "hunter22!" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
    (
        body["data"]["token"].as_str().unwrap().to_string(),
        body["data"]["user"]["id"].as_str().unwrap().to_string(),
    )
}

/// Serves a fresh in-memory app on an ephemeral port.
pub async fn spawn_app() -> (String, AppState) {
    let state = fake_state();
    let app = build_app(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

pub struct ManualClock(Mutex<OffsetDateTime>);

impl ManualClock {
    pub fn new(at: OffsetDateTime) -> Self {
        Self(Mutex::new(at))
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.0.lock().unwrap()
    }
}
