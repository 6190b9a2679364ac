//! Typed HTTP client for the expense API.
//!
//! Every response is parsed once into [`Envelope`]; list results are kept in
//! a short-lived [`ListCache`] that any write clears.

pub mod cache;

use std::sync::Arc;

use reqwest::{RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use time::{Date, Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use self::cache::{Clock, ListCache, SystemClock};
use crate::{
    app::Health,
    auth::dto::{AuthResponse, LoginRequest, MeResponse, PublicUser, RegisterRequest},
    error::FieldError,
    expenses::{
        dto::{ExpensePage, ExpenseResponse, ExpenseSummary},
        repo_types::Expense,
    },
};

pub const LIST_TTL: Duration = Duration::seconds(60);

/// The response envelope, discriminated by `status`.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Envelope<T> {
    Success {
        data: T,
    },
    Fail {
        message: String,
        code: String,
        #[serde(default)]
        errors: Vec<FieldError>,
    },
    Error {
        message: String,
        code: String,
    },
}

impl<T> Envelope<T> {
    pub fn into_result(self, status: StatusCode) -> Result<T, ClientError> {
        match self {
            Envelope::Success { data } => Ok(data),
            Envelope::Fail {
                message,
                code,
                errors,
            } => Err(ClientError::Api {
                status: status.as_u16(),
                code,
                message,
                errors,
            }),
            Envelope::Error { message, code } => Err(ClientError::Api {
                status: status.as_u16(),
                code,
                message,
                errors: Vec::new(),
            }),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
        errors: Vec<FieldError>,
    },
    #[error("unexpected response body (HTTP {status})")]
    Decode {
        status: u16,
        #[source]
        source: serde_json::Error,
    },
    #[error("not logged in")]
    NotLoggedIn,
}

impl ClientError {
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        self.code() == Some("TOKEN_EXPIRED")
    }

    /// The stored token is unusable and the user must sign in again.
    pub fn needs_login(&self) -> bool {
        matches!(self, ClientError::NotLoggedIn)
            || matches!(
                self.code(),
                Some("UNAUTHENTICATED" | "TOKEN_INVALID" | "TOKEN_EXPIRED")
            )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpenseDraft {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub date: Option<OffsetDateTime>,
}

/// Fields left `None` are not sent. An empty `note` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExpensePatch {
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub date: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpenseListQuery {
    pub category: Option<String>,
    pub start_date: Option<Date>,
    pub end_date: Option<Date>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ExpenseListQuery {
    fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(category) = &self.category {
            pairs.push(("category", category.clone()));
        }
        if let Some(start) = self.start_date {
            pairs.push(("startDate", start.to_string()));
        }
        if let Some(end) = self.end_date {
            pairs.push(("endDate", end.to_string()));
        }
        if let Some(page) = self.page {
            pairs.push(("page", page.to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        pairs
    }

    pub fn cache_key(&self) -> String {
        self.pairs()
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

fn date_pairs(start: Option<Date>, end: Option<Date>) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if let Some(start) = start {
        pairs.push(("startDate", start.to_string()));
    }
    if let Some(end) = end {
        pairs.push(("endDate", end.to_string()));
    }
    pairs
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    lists: ListCache<ExpensePage>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_clock(base_url, Arc::new(SystemClock))
    }

    pub fn with_clock(base_url: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            lists: ListCache::new(LIST_TTL, clock),
        }
    }

    /// Resume a session from a previously stored token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn logout(&mut self) {
        self.token = None;
        self.lists.invalidate();
    }

    pub fn cached_lists(&self) -> usize {
        self.lists.len()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, req: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let token = self.token.as_deref().ok_or(ClientError::NotLoggedIn)?;
        Ok(req.bearer_auth(token))
    }

    async fn send<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, ClientError> {
        let res = req.send().await?;
        let status = res.status();
        let bytes = res.bytes().await?;
        let envelope: Envelope<T> = serde_json::from_slice(&bytes)
            .map_err(|source| ClientError::Decode {
                status: status.as_u16(),
                source,
            })?;
        envelope.into_result(status)
    }

    /// For endpoints that answer `204 No Content` on success.
    async fn send_empty(req: RequestBuilder) -> Result<(), ClientError> {
        let res = req.send().await?;
        let status = res.status();
        if status.is_success() {
            return Ok(());
        }
        let bytes = res.bytes().await?;
        let envelope: Envelope<serde_json::Value> = serde_json::from_slice(&bytes)
            .map_err(|source| ClientError::Decode {
                status: status.as_u16(),
                source,
            })?;
        envelope.into_result(status).map(|_| ())
    }

    pub async fn health(&self) -> Result<Health, ClientError> {
        Self::send(self.http.get(self.url("/health"))).await
    }

    pub async fn register(
        &mut self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<PublicUser, ClientError> {
        let body = RegisterRequest {
            name: name.into(),
            email: email.into(),
            password: password.into(),
        };
        let auth: AuthResponse =
            Self::send(self.http.post(self.url("/auth/register")).json(&body)).await?;
        self.start_session(auth)
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<PublicUser, ClientError> {
        let body = LoginRequest {
            email: email.into(),
            password: password.into(),
        };
        let auth: AuthResponse =
            Self::send(self.http.post(self.url("/auth/login")).json(&body)).await?;
        self.start_session(auth)
    }

    fn start_session(&mut self, auth: AuthResponse) -> Result<PublicUser, ClientError> {
        debug!(user_id = %auth.user.id, "session started");
        self.token = Some(auth.token);
        self.lists.invalidate();
        Ok(auth.user)
    }

    pub async fn me(&self) -> Result<PublicUser, ClientError> {
        let req = self.authed(self.http.get(self.url("/auth/me")))?;
        let me: MeResponse = Self::send(req).await?;
        Ok(me.user)
    }

    pub async fn create_expense(&self, draft: &ExpenseDraft) -> Result<Expense, ClientError> {
        let req = self.authed(self.http.post(self.url("/expenses")).json(draft))?;
        let res: ExpenseResponse = Self::send(req).await?;
        self.lists.invalidate();
        Ok(res.expense)
    }

    /// Served from the cache while the entry for this query is fresh.
    pub async fn list_expenses(&self, query: &ExpenseListQuery) -> Result<ExpensePage, ClientError> {
        let key = query.cache_key();
        if let Some(page) = self.lists.get(&key) {
            debug!(%key, "expense list cache hit");
            return Ok(page);
        }
        let page = self.list_expenses_fresh(query).await?;
        self.lists.put(key, page.clone());
        Ok(page)
    }

    pub async fn list_expenses_fresh(
        &self,
        query: &ExpenseListQuery,
    ) -> Result<ExpensePage, ClientError> {
        let req = self.authed(self.http.get(self.url("/expenses")).query(&query.pairs()))?;
        Self::send(req).await
    }

    pub async fn get_expense(&self, id: Uuid) -> Result<Expense, ClientError> {
        let req = self.authed(self.http.get(self.url(&format!("/expenses/{id}"))))?;
        let res: ExpenseResponse = Self::send(req).await?;
        Ok(res.expense)
    }

    pub async fn summary(
        &self,
        start: Option<Date>,
        end: Option<Date>,
    ) -> Result<ExpenseSummary, ClientError> {
        let req = self.authed(
            self.http
                .get(self.url("/expenses/summary"))
                .query(&date_pairs(start, end)),
        )?;
        Self::send(req).await
    }

    pub async fn update_expense(
        &self,
        id: Uuid,
        patch: &ExpensePatch,
    ) -> Result<Expense, ClientError> {
        let req = self.authed(
            self.http
                .patch(self.url(&format!("/expenses/{id}")))
                .json(patch),
        )?;
        let res: ExpenseResponse = Self::send(req).await?;
        self.lists.invalidate();
        Ok(res.expense)
    }

    pub async fn delete_expense(&self, id: Uuid) -> Result<(), ClientError> {
        let req = self.authed(self.http.delete(self.url(&format!("/expenses/{id}"))))?;
        Self::send_empty(req).await?;
        self.lists.invalidate();
        Ok(())
    }
}
