use std::sync::Arc;

use crate::config::{AppConfig, StoreBackend};
use crate::db;
use crate::users::{
    policy::PasswordPolicy,
    repo::{MemoryUserStore, PgUserStore, UserStore},
};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
    pub password_policy: Arc<PasswordPolicy>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let password_policy = Arc::new(PasswordPolicy::from_config(&config.password_policy)?);

        let users = match config.store {
            StoreBackend::Postgres => {
                let db = db::connect(&config).await?;
                db::migrate(&db).await?;
                Arc::new(PgUserStore::new(db)) as Arc<dyn UserStore>
            }
            StoreBackend::Memory => {
                tracing::warn!("using in-memory user store; accounts are lost on restart");
                Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>
            }
        };

        Ok(Self::from_parts(users, config, password_policy))
    }

    pub fn from_parts(
        users: Arc<dyn UserStore>,
        config: Arc<AppConfig>,
        password_policy: Arc<PasswordPolicy>,
    ) -> Self {
        Self {
            users,
            config,
            password_policy,
        }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        let config = AppConfig::in_memory();
        let password_policy =
            PasswordPolicy::from_config(&config.password_policy).expect("default policy builds");
        Self::from_parts(
            Arc::new(MemoryUserStore::new()),
            Arc::new(config),
            Arc::new(password_policy),
        )
    }
}
