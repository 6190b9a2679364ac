use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, warn};

use super::{
    dto::{AuthResponse, LoginRequest, RegisterRequest},
    jwt::JwtKeys,
    password::{hash_password, verify_password},
    repo::UserStore,
};
use crate::{
    db::StoreError,
    error::{AppError, FieldError},
};

pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex compiles");
    }
    EMAIL_RE.is_match(email)
}

/// Trims name and email in place and collects every violated rule.
pub fn validate_register(payload: &mut RegisterRequest) -> Result<(), AppError> {
    payload.name = payload.name.trim().to_string();
    payload.email = payload.email.trim().to_string();

    let mut errors = Vec::new();
    if payload.name.is_empty() {
        errors.push(FieldError::new("name", "Name is required"));
    }
    if payload.email.is_empty() {
        errors.push(FieldError::new("email", "Email is required"));
    } else if !is_valid_email(&payload.email) {
        errors.push(FieldError::new("email", "Please provide a valid email"));
    }
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError::new(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

pub fn validate_login(payload: &mut LoginRequest) -> Result<(), AppError> {
    payload.email = payload.email.trim().to_string();

    let mut errors = Vec::new();
    if payload.email.is_empty() {
        errors.push(FieldError::new("email", "Email is required"));
    }
    if payload.password.is_empty() {
        errors.push(FieldError::new("password", "Password is required"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

pub async fn register(
    users: &dyn UserStore,
    keys: &JwtKeys,
    mut payload: RegisterRequest,
) -> Result<AuthResponse, AppError> {
    validate_register(&mut payload)?;

    if users.find_by_email(&payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let plain = payload.password;
    let hash = tokio::task::spawn_blocking(move || hash_password(&plain))
        .await
        .context("join hash task")??;

    let user = match users.create(&payload.email, &payload.name, &hash).await {
        Ok(u) => u,
        Err(StoreError::Conflict) => {
            warn!(email = %payload.email, "email registered concurrently");
            return Err(AppError::Conflict("Email already registered".into()));
        }
        Err(e) => {
            error!(error = %e, "create user failed");
            return Err(e.into());
        }
    };

    let token = keys.issue(user.id, &user.email)?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(AuthResponse {
        token,
        user: user.to_public(),
    })
}

pub async fn login(
    users: &dyn UserStore,
    keys: &JwtKeys,
    mut payload: LoginRequest,
) -> Result<AuthResponse, AppError> {
    validate_login(&mut payload)?;

    let Some(user) = users.find_by_email(&payload.email).await? else {
        warn!(email = %payload.email, "login unknown email");
        return Err(AppError::InvalidCredentials);
    };

    let plain = payload.password;
    let hash = user.password_hash.clone();
    let ok = tokio::task::spawn_blocking(move || verify_password(&plain, &hash))
        .await
        .context("join verify task")??;

    if !ok {
        warn!(email = %payload.email, user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let token = keys.issue(user.id, &user.email)?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(AuthResponse {
        token,
        user: user.to_public(),
    })
}
