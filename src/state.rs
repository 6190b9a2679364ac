use std::sync::Arc;

use crate::{
    auth::{
        jwt::JwtKeys,
        repo::{PgUserStore, UserStore},
    },
    config::AppConfig,
    db,
    expenses::repo::{ExpenseStore, PgExpenseStore},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jwt: JwtKeys,
    pub users: Arc<dyn UserStore>,
    pub expenses: Arc<dyn ExpenseStore>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let pool = db::connect(&config).await?;

        let users = Arc::new(PgUserStore::new(pool.clone())) as Arc<dyn UserStore>;
        let expenses = Arc::new(PgExpenseStore::new(pool)) as Arc<dyn ExpenseStore>;

        Ok(Self::from_parts(config, users, expenses))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        expenses: Arc<dyn ExpenseStore>,
    ) -> Self {
        let jwt = JwtKeys::from_config(&config.jwt);
        Self {
            config,
            jwt,
            users,
            expenses,
        }
    }
}
